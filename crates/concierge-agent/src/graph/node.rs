use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::state::{State, StateUpdate};

/// The work a node performs.
///
/// A step reads the current state and returns the update to apply. It has
/// no error channel: collaborator failures become messages and cleared
/// fields inside the returned update.
pub trait Step: Send + Sync + 'static {
    fn run<'a>(&'a self, state: &'a State) -> BoxFuture<'a, StateUpdate>;
}

struct SyncStep<F>(F);

impl<F> Step for SyncStep<F>
where
    F: Fn(&State) -> StateUpdate + Send + Sync + 'static,
{
    fn run<'a>(&'a self, state: &'a State) -> BoxFuture<'a, StateUpdate> {
        Box::pin(std::future::ready((self.0)(state)))
    }
}

struct AsyncStep<F>(F);

impl<F> Step for AsyncStep<F>
where
    F: Fn(&State) -> BoxFuture<'static, StateUpdate> + Send + Sync + 'static,
{
    fn run<'a>(&'a self, state: &'a State) -> BoxFuture<'a, StateUpdate> {
        (self.0)(state)
    }
}

/// Wrap a synchronous closure as a step.
pub fn step_fn<F>(f: F) -> Arc<dyn Step>
where
    F: Fn(&State) -> StateUpdate + Send + Sync + 'static,
{
    Arc::new(SyncStep(f))
}

/// Wrap a closure that copies what it needs out of the state and returns
/// an owned future.
pub fn step_async<F>(f: F) -> Arc<dyn Step>
where
    F: Fn(&State) -> BoxFuture<'static, StateUpdate> + Send + Sync + 'static,
{
    Arc::new(AsyncStep(f))
}

/// A named step in a workflow.
#[derive(Clone)]
pub struct Node {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Human-readable name, used in diagrams.
    pub name: String,
    pub step: Arc<dyn Step>,
}

impl Node {
    pub fn new(id: impl Into<String>, step: Arc<dyn Step>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_step() {
        let step = step_fn(|s: &State| StateUpdate::new().set("seen", s.get_str("q").unwrap_or("-")));
        let state = State::new().with("q", "ciao");
        let mut out = state.clone();
        out.apply(step.run(&state).await);
        assert_eq!(out.get_str("seen"), Some("ciao"));
    }

    #[tokio::test]
    async fn test_async_step_owns_its_inputs() {
        let step = step_async(|s: &State| {
            let q = s.get_str("q").unwrap_or_default().to_uppercase();
            Box::pin(async move { StateUpdate::new().say(q) })
        });
        let update = step.run(&State::new().with("q", "milano")).await;
        assert_eq!(update.message_count(), 1);
    }

    #[test]
    fn test_node_defaults_name_to_id() {
        let node = Node::new("extract", step_fn(|_| StateUpdate::new()));
        assert_eq!(node.name, "extract");
        let node = node.with_name("Estrazione");
        assert_eq!(node.name, "Estrazione");
        assert!(format!("{:?}", node).contains("extract"));
    }
}
