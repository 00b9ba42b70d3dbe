use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use concierge_core::error::{ConciergeError, Result};

use super::edge::Edge;
use super::node::{Node, Step};
use super::state::State;

/// Terminal pseudo-node. An edge to `END` finishes the run.
pub const END: &str = "__end__";

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node_id: String,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
    /// Messages the node appended to the log.
    pub messages_appended: usize,
}

/// Result of executing an entire workflow.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// The final state, including the accumulated message log.
    pub state: State,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    /// Ids of the executed nodes, in order.
    pub fn path(&self) -> Vec<&str> {
        self.node_results.iter().map(|r| r.node_id.as_str()).collect()
    }
}

/// Collects nodes and edges and validates them into a [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entry: Option<String>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    pub fn node(self, id: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.add_node(Node::new(id, step))
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Set the entry node. Defaults to the first node added.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Validate the graph.
    ///
    /// Fails on an empty graph, a duplicate node id, an unknown entry, an
    /// edge leaving `END` or touching an undefined node, and any cycle.
    pub fn compile(self) -> Result<Workflow> {
        let invalid = |msg: String| ConciergeError::InvalidGraph(format!("{}: {}", self.name, msg));

        if self.nodes.is_empty() {
            return Err(invalid("workflow has no nodes".into()));
        }

        let mut index = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id == END {
                return Err(invalid(format!("'{}' is reserved", END)));
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(invalid(format!("duplicate node '{}'", node.id)));
            }
        }

        let entry = match self.entry.clone() {
            Some(e) => e,
            None => self.nodes[0].id.clone(),
        };
        if !index.contains_key(&entry) {
            return Err(invalid(format!("entry node '{}' is not defined", entry)));
        }

        for edge in &self.edges {
            if edge.from == END {
                return Err(invalid(format!("edge leaves {} towards '{}'", END, edge.to)));
            }
            if !index.contains_key(&edge.from) {
                return Err(invalid(format!("edge from undefined node '{}'", edge.from)));
            }
            if edge.to != END && !index.contains_key(&edge.to) {
                return Err(invalid(format!("edge to undefined node '{}'", edge.to)));
            }
        }

        if let Some(node) = find_cycle(&self.nodes, &self.edges) {
            return Err(invalid(format!("cycle through node '{}'", node)));
        }

        let seen = reachable(&entry, &self.edges);
        for node in self.nodes.iter().filter(|n| !seen.contains(&n.id)) {
            warn!(workflow = %self.name, node_id = %node.id, "Node is unreachable from the entry");
        }

        Ok(Workflow {
            name: self.name,
            nodes: self.nodes,
            index,
            edges: self.edges,
            entry,
        })
    }
}

/// Depth-first search over every node; returns a node on the first back edge.
fn find_cycle(nodes: &[Node], edges: &[Edge]) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        edges: &'a [Edge],
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Option<String> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(id.to_string()),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        for edge in edges.iter().filter(|e| e.from == id && e.to != END) {
            if let Some(found) = visit(&edge.to, edges, marks) {
                return Some(found);
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    nodes.iter().find_map(|n| visit(&n.id, edges, &mut marks))
}

/// An immutable, validated DAG of steps.
///
/// A workflow holds no per-run state; one instance can be run concurrently
/// from many tasks.
pub struct Workflow {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    entry: String,
}

impl Workflow {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Run the workflow from the entry node.
    ///
    /// After each step the outgoing edges of the current node are evaluated
    /// in declaration order against the updated state and the first match is
    /// followed. No outgoing edge, no match, or an edge to [`END`] ends the
    /// run. At most one step per node is executed.
    pub async fn run(&self, initial: State) -> ExecutionResult {
        let start = Instant::now();
        let mut state = initial;
        let mut node_results = Vec::new();
        let mut current = Some(self.entry.as_str());

        while let Some(node_id) = current {
            if node_results.len() >= self.nodes.len() {
                warn!(workflow = %self.name, node_id, "Step limit reached, stopping");
                break;
            }
            let Some(node) = self.index.get(node_id).map(|&i| &self.nodes[i]) else {
                warn!(workflow = %self.name, node_id, "Unknown node, stopping");
                break;
            };

            info!(workflow = %self.name, node_id = %node.id, "Executing node");
            let node_start = Instant::now();
            let update = node.step.run(&state).await;
            let messages_appended = update.message_count();
            state.apply(update);
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            debug!(node_id = %node.id, elapsed_ms, messages_appended, "Node complete");
            node_results.push(NodeResult {
                node_id: node.id.clone(),
                elapsed_ms,
                messages_appended,
            });

            current = self.next(&node.id, &state);
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(workflow = %self.name, steps = node_results.len(), total_elapsed_ms, "Workflow complete");

        ExecutionResult {
            node_results,
            state,
            total_elapsed_ms,
        }
    }

    fn next(&self, from: &str, state: &State) -> Option<&str> {
        let taken = self
            .edges
            .iter()
            .filter(|e| e.from == from)
            .find(|e| e.condition.evaluate(state));

        match taken {
            Some(edge) if edge.to == END => {
                debug!(node_id = from, "Edge to END, workflow complete");
                None
            }
            Some(edge) => {
                debug!(node_id = from, next = %edge.to, "Following edge");
                Some(edge.to.as_str())
            }
            None => {
                debug!(node_id = from, "No edge matched, workflow complete");
                None
            }
        }
    }

    /// Render the workflow as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        let _ = writeln!(out, "    __start__([start]) --> {}", self.entry);
        for node in &self.nodes {
            let _ = writeln!(out, "    {}[\"{}\"]", node.id, node.name);
        }
        if self.edges.iter().any(|e| e.to == END) {
            let _ = writeln!(out, "    {}([end])", END);
        }
        for edge in &self.edges {
            let label = edge.condition.to_string();
            if label.is_empty() {
                let _ = writeln!(out, "    {} --> {}", edge.from, edge.to);
            } else {
                let _ = writeln!(out, "    {} -->|{}| {}", edge.from, label, edge.to);
            }
        }
        out
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.iter().map(|n| &n.id).collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// Node ids reachable from `entry`.
fn reachable(entry: &str, edges: &[Edge]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![entry.to_string()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        for edge in edges.iter().filter(|e| e.from == id && e.to != END) {
            stack.push(edge.to.clone());
        }
    }
    seen
}
