pub mod agents;
pub mod graph;
pub mod nlu;
pub mod session;
pub mod supervisor;
pub mod sweeper;

pub use agents::{AgentDeps, AgentSet};
pub use graph::{Edge, EdgeCondition, ExecutionResult, Node, NodeResult, State, StateUpdate, Workflow, WorkflowBuilder, END};
pub use nlu::{DomainSchema, Extraction, Extractor, LlmExtractor};
pub use session::{PendingRequest, PendingStore, ResumedRequest};
pub use supervisor::{Supervisor, SupervisorOutput};
pub use sweeper::spawn_sweeper;
