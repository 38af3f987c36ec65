use crate::context::InvocationContext;
use crate::event::Event;
use crate::model::Llm;
use crate::{CadenceError, Result};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// The fundamental agent contract: a name, a place in the tree, and a lazy
/// event sequence per invocation. The sequence is finite and not
/// restartable.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn sub_agents(&self) -> &[Arc<dyn Agent>];

    /// Model binding declared on this agent, if any. Agents without one
    /// inherit from the nearest ancestor via [`AgentTree::resolve_model`].
    fn model(&self) -> Option<Arc<dyn Llm>> {
        None
    }

    async fn run(&self, ctx: Arc<dyn InvocationContext>) -> Result<EventStream>;

    /// Bidirectional streaming entry point. Agents that only support
    /// request/response turns keep the default.
    async fn run_live(&self, ctx: Arc<dyn InvocationContext>) -> Result<EventStream> {
        let _ = ctx;
        Err(CadenceError::Agent(format!("agent {} does not support live mode", self.name())))
    }
}

/// Index over an agent tree: name → agent and name → parent, built once at
/// invocation setup. Children are owned by their parents' `sub_agents`
/// lists; the arena only holds handles, so ownership stays acyclic.
pub struct AgentTree {
    root: Arc<dyn Agent>,
    agents: HashMap<String, Arc<dyn Agent>>,
    parents: HashMap<String, String>,
}

impl AgentTree {
    /// Walk the tree from `root`. Duplicate agent names are a configuration
    /// error: transfer targets are addressed by name.
    pub fn new(root: Arc<dyn Agent>) -> Result<Self> {
        let mut agents = HashMap::new();
        let mut parents = HashMap::new();
        Self::index(&root, None, &mut agents, &mut parents)?;
        Ok(Self { root, agents, parents })
    }

    fn index(
        agent: &Arc<dyn Agent>,
        parent: Option<&str>,
        agents: &mut HashMap<String, Arc<dyn Agent>>,
        parents: &mut HashMap<String, String>,
    ) -> Result<()> {
        let name = agent.name().to_string();
        if agents.insert(name.clone(), agent.clone()).is_some() {
            return Err(CadenceError::Config(format!("duplicate agent name: {name}")));
        }
        if let Some(parent) = parent {
            parents.insert(name.clone(), parent.to_string());
        }
        for sub in agent.sub_agents() {
            Self::index(sub, Some(&name), agents, parents)?;
        }
        Ok(())
    }

    pub fn root(&self) -> Arc<dyn Agent> {
        self.root.clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn parent_of(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.parents.get(name).and_then(|p| self.agents.get(p)).cloned()
    }

    /// Siblings of `name`: the parent's other sub-agents.
    pub fn peers_of(&self, name: &str) -> Vec<Arc<dyn Agent>> {
        match self.parent_of(name) {
            Some(parent) => parent
                .sub_agents()
                .iter()
                .filter(|a| a.name() != name)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolve the model for `name`: its own binding, else the nearest
    /// ancestor's. No binding on the whole chain is fatal.
    pub fn resolve_model(&self, name: &str) -> Result<Arc<dyn Llm>> {
        let mut current = name.to_string();
        loop {
            let agent = self.agents.get(&current).ok_or_else(|| {
                CadenceError::Config(format!("unknown agent: {current}"))
            })?;
            if let Some(model) = agent.model() {
                return Ok(model);
            }
            match self.parents.get(&current) {
                Some(parent) => current = parent.clone(),
                None => {
                    return Err(CadenceError::Config(format!(
                        "no model found for agent {name} or any of its ancestors"
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_stream::stream;

    struct TestAgent {
        name: String,
        sub_agents: Vec<Arc<dyn Agent>>,
    }

    impl TestAgent {
        fn arc(name: &str, sub_agents: Vec<Arc<dyn Agent>>) -> Arc<dyn Agent> {
            Arc::new(Self { name: name.to_string(), sub_agents })
        }
    }

    #[async_trait]
    impl Agent for TestAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "test agent"
        }

        fn sub_agents(&self) -> &[Arc<dyn Agent>] {
            &self.sub_agents
        }

        async fn run(&self, _ctx: Arc<dyn InvocationContext>) -> Result<EventStream> {
            let name = self.name.clone();
            let s = stream! {
                yield Ok(Event::new("inv-test", name));
            };
            Ok(Box::pin(s))
        }
    }

    fn sample_tree() -> AgentTree {
        let billing = TestAgent::arc("billing", vec![]);
        let support = TestAgent::arc("support", vec![]);
        let root = TestAgent::arc("root", vec![billing, support]);
        AgentTree::new(root).unwrap()
    }

    #[test]
    fn test_tree_indexing() {
        let tree = sample_tree();
        assert!(tree.get("billing").is_some());
        assert_eq!(tree.parent_of("billing").unwrap().name(), "root");
        assert!(tree.parent_of("root").is_none());
    }

    #[test]
    fn test_peers() {
        let tree = sample_tree();
        let peers = tree.peers_of("billing");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name(), "support");
        assert!(tree.peers_of("root").is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let a = TestAgent::arc("dup", vec![]);
        let b = TestAgent::arc("dup", vec![]);
        let root = TestAgent::arc("root", vec![a, b]);
        let err = match AgentTree::new(root) {
            Ok(_) => panic!("expected AgentTree::new to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, CadenceError::Config(_)));
    }

    #[test]
    fn test_resolve_model_missing_is_fatal() {
        let tree = sample_tree();
        let err = match tree.resolve_model("billing") {
            Ok(_) => panic!("expected resolve_model to fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("no model found"));
    }
}
