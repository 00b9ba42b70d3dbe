//! Graph Execution Engine: small DAG workflows over a shared state record.
//!
//! A workflow is a directed acyclic graph of `Node`s connected by `Edge`s.
//! Each node runs a `Step` that reads the `State` and returns a
//! `StateUpdate`; the executor folds the update into the state and follows
//! the first outgoing edge whose condition holds. Every agent and the
//! supervisor are built from this engine.

pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use edge::{evaluate_condition, Edge, EdgeCondition};
pub use executor::{ExecutionResult, NodeResult, Workflow, WorkflowBuilder, END};
pub use node::{step_async, step_fn, Node, Step};
pub use state::{MessageLog, State, StateUpdate};
