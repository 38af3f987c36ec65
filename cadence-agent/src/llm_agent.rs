use crate::base::BaseAgent;
use crate::flow;
use cadence_core::{
    AfterAgentCallback, AfterModelCallback, AfterToolCallback, Agent, BeforeAgentCallback,
    BeforeModelCallback, BeforeToolCallback, CadenceError, EventStream, GenerateContentConfig,
    GlobalInstructionProvider, InstructionProvider, InvocationContext, Llm, ReadonlyContext,
    Result, Tool, Toolset,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Which flow drives the model-call loop.
///
/// `Single` runs the processor pipeline once, calls the model, and stops:
/// no function-call loop, no transfer. `Auto` adds the full function-call
/// loop and lets the model hand the invocation off to another agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Single,
    Auto,
}

pub(crate) struct LlmAgentInner {
    pub(crate) base: BaseAgent,
    pub(crate) model: Option<Arc<dyn Llm>>,
    pub(crate) instruction: Option<String>,
    pub(crate) instruction_provider: Option<Arc<InstructionProvider>>,
    pub(crate) global_instruction: Option<String>,
    pub(crate) global_instruction_provider: Option<Arc<GlobalInstructionProvider>>,
    pub(crate) output_schema: Option<serde_json::Value>,
    pub(crate) output_key: Option<String>,
    pub(crate) generate_config: Option<GenerateContentConfig>,
    pub(crate) tools: Vec<Arc<dyn Tool>>,
    pub(crate) toolsets: Vec<Arc<dyn Toolset>>,
    pub(crate) disallow_transfer_to_parent: bool,
    pub(crate) disallow_transfer_to_peers: bool,
    pub(crate) flow_override: Option<FlowKind>,
    pub(crate) before_model_callbacks: Arc<Vec<BeforeModelCallback>>,
    pub(crate) after_model_callbacks: Arc<Vec<AfterModelCallback>>,
    pub(crate) before_tool_callbacks: Arc<Vec<BeforeToolCallback>>,
    pub(crate) after_tool_callbacks: Arc<Vec<AfterToolCallback>>,
}

impl LlmAgentInner {
    pub(crate) fn name(&self) -> &str {
        self.base.name()
    }

    /// Own binding, else the nearest ancestor's. Missing everywhere is
    /// fatal for the invocation.
    pub(crate) fn resolve_model(&self, ctx: &Arc<dyn InvocationContext>) -> Result<Arc<dyn Llm>> {
        match &self.model {
            Some(model) => Ok(model.clone()),
            None => ctx.agent_tree().resolve_model(self.name()),
        }
    }

    /// Declared tools plus toolset contents, resolved fresh per invocation.
    pub(crate) async fn resolve_tools(
        &self,
        ctx: &Arc<dyn InvocationContext>,
    ) -> Result<Vec<Arc<dyn Tool>>> {
        let mut tools = self.tools.clone();
        for toolset in &self.toolsets {
            let readonly = ctx.clone() as Arc<dyn ReadonlyContext>;
            tools.extend(toolset.tools(readonly).await?);
        }
        Ok(tools)
    }

    /// Flow selection, resolved at invocation time: structured output pins
    /// the agent to `Single`; otherwise an agent with sub-agents, or a place
    /// in a larger tree it may transfer within, runs `Auto`.
    pub(crate) fn flow_kind(&self, ctx: &Arc<dyn InvocationContext>) -> FlowKind {
        if let Some(kind) = self.flow_override {
            return kind;
        }
        if self.output_schema.is_some() {
            return FlowKind::Single;
        }
        if !self.base.sub_agents().is_empty() || !self.tools.is_empty() || !self.toolsets.is_empty()
        {
            return FlowKind::Auto;
        }
        let has_parent = ctx.agent_tree().parent_of(self.name()).is_some();
        if has_parent && !(self.disallow_transfer_to_parent && self.disallow_transfer_to_peers) {
            return FlowKind::Auto;
        }
        FlowKind::Single
    }
}

/// A model-bound agent: owns a model binding, instructions, a tool set, and
/// a flow, all resolved at invocation time. Construct via
/// [`LlmAgentBuilder`].
pub struct LlmAgent {
    inner: Arc<LlmAgentInner>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.inner.name())
            .field("model", &self.inner.model.as_ref().map(|m| m.name().to_string()))
            .field("tools", &self.inner.tools.len())
            .field("sub_agents", &self.inner.base.sub_agents().len())
            .finish()
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        self.inner.base.name()
    }

    fn description(&self) -> &str {
        self.inner.base.description()
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        self.inner.base.sub_agents()
    }

    fn model(&self) -> Option<Arc<dyn Llm>> {
        self.inner.model.clone()
    }

    #[tracing::instrument(skip(self, ctx), fields(agent = %self.inner.name(), invocation = %ctx.invocation_id()))]
    async fn run(&self, ctx: Arc<dyn InvocationContext>) -> Result<EventStream> {
        tracing::debug!("starting agent run");
        let inner = self.inner.clone();
        self.inner
            .base
            .run_wrapped(ctx, move |child| async move { Ok(flow::run_flow(inner, child)) })
            .await
    }

    async fn run_live(&self, ctx: Arc<dyn InvocationContext>) -> Result<EventStream> {
        tracing::debug!(agent = %self.inner.name(), "starting live run");
        let inner = self.inner.clone();
        self.inner
            .base
            .run_wrapped(ctx, move |child| async move { Ok(flow::run_live_flow(inner, child)) })
            .await
    }
}

pub struct LlmAgentBuilder {
    name: String,
    description: Option<String>,
    model: Option<Arc<dyn Llm>>,
    instruction: Option<String>,
    instruction_provider: Option<Arc<InstructionProvider>>,
    global_instruction: Option<String>,
    global_instruction_provider: Option<Arc<GlobalInstructionProvider>>,
    output_schema: Option<serde_json::Value>,
    output_key: Option<String>,
    generate_config: Option<GenerateContentConfig>,
    tools: Vec<Arc<dyn Tool>>,
    toolsets: Vec<Arc<dyn Toolset>>,
    sub_agents: Vec<Arc<dyn Agent>>,
    disallow_transfer_to_parent: bool,
    disallow_transfer_to_peers: bool,
    flow_override: Option<FlowKind>,
    before_callbacks: Vec<BeforeAgentCallback>,
    after_callbacks: Vec<AfterAgentCallback>,
    before_model_callbacks: Vec<BeforeModelCallback>,
    after_model_callbacks: Vec<AfterModelCallback>,
    before_tool_callbacks: Vec<BeforeToolCallback>,
    after_tool_callbacks: Vec<AfterToolCallback>,
}

impl LlmAgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            model: None,
            instruction: None,
            instruction_provider: None,
            global_instruction: None,
            global_instruction_provider: None,
            output_schema: None,
            output_key: None,
            generate_config: None,
            tools: Vec::new(),
            toolsets: Vec::new(),
            sub_agents: Vec::new(),
            disallow_transfer_to_parent: false,
            disallow_transfer_to_peers: false,
            flow_override: None,
            before_callbacks: Vec::new(),
            after_callbacks: Vec::new(),
            before_model_callbacks: Vec::new(),
            after_model_callbacks: Vec::new(),
            before_tool_callbacks: Vec::new(),
            after_tool_callbacks: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn model(mut self, model: Arc<dyn Llm>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn instruction_provider(mut self, provider: InstructionProvider) -> Self {
        self.instruction_provider = Some(Arc::new(provider));
        self
    }

    pub fn global_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.global_instruction = Some(instruction.into());
        self
    }

    pub fn global_instruction_provider(mut self, provider: GlobalInstructionProvider) -> Self {
        self.global_instruction_provider = Some(Arc::new(provider));
        self
    }

    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Save the agent's final text into this state key when the turn ends.
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn generate_config(mut self, config: GenerateContentConfig) -> Self {
        self.generate_config = Some(config);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn disallow_transfer_to_parent(mut self, disallow: bool) -> Self {
        self.disallow_transfer_to_parent = disallow;
        self
    }

    pub fn disallow_transfer_to_peers(mut self, disallow: bool) -> Self {
        self.disallow_transfer_to_peers = disallow;
        self
    }

    pub fn flow(mut self, kind: FlowKind) -> Self {
        self.flow_override = Some(kind);
        self
    }

    pub fn before_callback(mut self, callback: BeforeAgentCallback) -> Self {
        self.before_callbacks.push(callback);
        self
    }

    pub fn after_callback(mut self, callback: AfterAgentCallback) -> Self {
        self.after_callbacks.push(callback);
        self
    }

    pub fn before_model_callback(mut self, callback: BeforeModelCallback) -> Self {
        self.before_model_callbacks.push(callback);
        self
    }

    pub fn after_model_callback(mut self, callback: AfterModelCallback) -> Self {
        self.after_model_callbacks.push(callback);
        self
    }

    pub fn before_tool_callback(mut self, callback: BeforeToolCallback) -> Self {
        self.before_tool_callbacks.push(callback);
        self
    }

    pub fn after_tool_callback(mut self, callback: AfterToolCallback) -> Self {
        self.after_tool_callbacks.push(callback);
        self
    }

    /// Validate the configuration and build the agent.
    ///
    /// Structured output is mutually exclusive with anything that feeds the
    /// function-call loop: tools, sub-agents, and transfer. Violations are
    /// configuration errors here, not runtime surprises.
    pub fn build(self) -> Result<LlmAgent> {
        if self.output_schema.is_some() {
            if !self.sub_agents.is_empty() {
                return Err(CadenceError::Config(
                    "output_schema cannot be combined with sub_agents: structured output disables the transfer loop".to_string(),
                ));
            }
            if !self.tools.is_empty() || !self.toolsets.is_empty() {
                return Err(CadenceError::Config(
                    "output_schema cannot be combined with tools: structured output disables the function-call loop".to_string(),
                ));
            }
            if self.flow_override == Some(FlowKind::Auto) {
                return Err(CadenceError::Config(
                    "output_schema cannot be combined with the auto flow: structured output disables transfer".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for agent in &self.sub_agents {
            if !seen.insert(agent.name().to_string()) {
                return Err(CadenceError::Config(format!(
                    "duplicate sub-agent name: {}",
                    agent.name()
                )));
            }
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(CadenceError::Config(format!(
                    "duplicate tool name: {}",
                    tool.name()
                )));
            }
        }

        Ok(LlmAgent {
            inner: Arc::new(LlmAgentInner {
                base: BaseAgent::new(
                    self.name,
                    self.description.unwrap_or_default(),
                    self.sub_agents,
                    self.before_callbacks,
                    self.after_callbacks,
                ),
                model: self.model,
                instruction: self.instruction,
                instruction_provider: self.instruction_provider,
                global_instruction: self.global_instruction,
                global_instruction_provider: self.global_instruction_provider,
                output_schema: self.output_schema,
                output_key: self.output_key,
                generate_config: self.generate_config,
                tools: self.tools,
                toolsets: self.toolsets,
                disallow_transfer_to_parent: self.disallow_transfer_to_parent,
                disallow_transfer_to_peers: self.disallow_transfer_to_peers,
                flow_override: self.flow_override,
                before_model_callbacks: Arc::new(self.before_model_callbacks),
                after_model_callbacks: Arc::new(self.after_model_callbacks),
                before_tool_callbacks: Arc::new(self.before_tool_callbacks),
                after_tool_callbacks: Arc::new(self.after_tool_callbacks),
            }),
        })
    }
}
