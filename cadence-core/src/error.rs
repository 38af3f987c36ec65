#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The invocation issued more model calls than `RunConfig::max_llm_calls`
    /// allows. Fatal for the invocation; never converted into an event.
    #[error("LLM call limit of {limit} exceeded for this invocation")]
    LlmCallsLimitExceeded { limit: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CadenceError>;
