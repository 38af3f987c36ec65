use crate::{Result, types::Content};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

pub type LlmResponseStream = Pin<Box<dyn Stream<Item = Result<LlmResponse>> + Send>>;

/// Model adapter seam. Implementations translate [`LlmRequest`] /
/// [`LlmResponse`] to a vendor wire format; the runtime never looks past
/// these normalized types.
///
/// Adapter-side failures are reported through `LlmResponse::error_code` /
/// `error_message` so the flow can decide how to surface them; a transport
/// error may still be returned as `Err` and is not recovered.
#[async_trait]
pub trait Llm: Send + Sync {
    fn name(&self) -> &str;

    /// Non-stream mode yields exactly one response; stream mode yields
    /// partial fragments followed by a terminal response.
    async fn generate_content(&self, req: LlmRequest, stream: bool) -> Result<LlmResponseStream>;

    /// Open a bidirectional live connection. Optional; models that only
    /// support request/response generation keep the default.
    async fn connect(&self, req: LlmRequest) -> Result<Box<dyn LlmConnection>> {
        let _ = req;
        Err(crate::CadenceError::Model(format!(
            "model {} does not support live connections",
            self.name()
        )))
    }
}

/// A live bidirectional model connection used by streaming invocations.
#[async_trait]
pub trait LlmConnection: Send + Sync {
    /// Replay prior conversation turns into the connection.
    async fn send_history(&self, contents: Vec<Content>) -> Result<()>;

    /// Send one user or tool content.
    async fn send_content(&self, content: Content) -> Result<()>;

    /// Send a realtime media chunk (e.g., audio).
    async fn send_realtime(&self, blob: Blob) -> Result<()>;

    /// Receive the next response fragment. `None` once the connection closed.
    async fn receive(&self) -> Option<Result<LlmResponse>>;

    async fn close(&self) -> Result<()>;
}

/// Raw media payload for realtime input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), data }
    }
}

/// Accumulated model request. Request processors append instructions, tool
/// declarations, and contents before the request reaches the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub system_instruction: Option<String>,
    pub config: Option<GenerateContentConfig>,
    #[serde(skip)]
    pub tools: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentConfig {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<i32>,
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Option<Content>,
    pub usage_metadata: Option<UsageMetadata>,
    pub finish_reason: Option<FinishReason>,
    /// Incomplete streaming fragment; never authoritative for the turn.
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: i32,
    pub candidates_token_count: i32,
    pub total_token_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: Vec::new(),
            system_instruction: None,
            config: None,
            tools: HashMap::new(),
        }
    }

    /// Append an instruction paragraph to the system instruction.
    pub fn append_instruction(&mut self, instruction: &str) {
        if instruction.is_empty() {
            return;
        }
        match &mut self.system_instruction {
            Some(existing) => {
                existing.push_str("\n\n");
                existing.push_str(instruction);
            }
            None => self.system_instruction = Some(instruction.to_string()),
        }
    }

    /// Register a tool declaration under its name.
    pub fn add_tool_declaration(&mut self, name: impl Into<String>, declaration: serde_json::Value) {
        self.tools.insert(name.into(), declaration);
    }

    pub fn with_config(mut self, config: GenerateContentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the response schema for structured output.
    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.config.get_or_insert_with(GenerateContentConfig::default).response_schema =
            Some(schema);
        self
    }
}

impl LlmResponse {
    pub fn new(content: Content) -> Self {
        Self {
            content: Some(content),
            usage_metadata: None,
            finish_reason: Some(FinishReason::Stop),
            partial: false,
            turn_complete: true,
            interrupted: false,
            error_code: None,
            error_message: None,
        }
    }

    /// A partial streaming fragment.
    pub fn partial(content: Content) -> Self {
        Self {
            content: Some(content),
            usage_metadata: None,
            finish_reason: None,
            partial: true,
            turn_complete: false,
            interrupted: false,
            error_code: None,
            error_message: None,
        }
    }

    /// An adapter-reported model failure.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            content: None,
            usage_metadata: None,
            finish_reason: None,
            partial: false,
            turn_complete: true,
            interrupted: false,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}
