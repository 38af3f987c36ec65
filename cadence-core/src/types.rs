use serde::{Deserialize, Serialize};

/// Maximum allowed size for inline binary data (10 MB).
/// Prevents accidental or malicious embedding of oversized payloads in Content parts.
pub const MAX_INLINE_DATA_SIZE: usize = 10 * 1024 * 1024;

/// Conversation roles carried by [`Content`].
pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";
pub const ROLE_TOOL: &str = "tool";

/// One piece of a [`Content`]. Exactly one variant per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    /// Internal reasoning emitted by the model. Never replayed as history.
    Thought {
        thought: String,
    },
    InlineData {
        mime_type: String,
        data: Vec<u8>,
    },
    FunctionCall {
        name: String,
        args: serde_json::Value,
        /// Correlation id linking this call to its function response.
        /// Present on events, stripped from requests sent back to the model.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    FunctionResponse {
        name: String,
        response: serde_json::Value,
        /// Correlation id of the originating function call.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into(), parts: Vec::new() }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text { text: text.into() });
        self
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Add inline binary data (e.g., image bytes).
    ///
    /// # Panics
    /// Panics if `data` exceeds [`MAX_INLINE_DATA_SIZE`] (10 MB).
    pub fn with_inline_data(mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.parts.push(Part::inline_data(mime_type, data));
        self
    }

    /// Build a `tool`-role content from function-response parts.
    ///
    /// Tool-role contents carry function responses only; mixing in any other
    /// part kind violates the content model.
    ///
    /// # Panics
    /// Panics if any part is not a [`Part::FunctionResponse`].
    pub fn function_responses(parts: Vec<Part>) -> Self {
        assert!(
            parts.iter().all(|p| matches!(p, Part::FunctionResponse { .. })),
            "tool-role content may only carry function-response parts"
        );
        Self { role: ROLE_TOOL.to_string(), parts }
    }

    /// Concatenated text of all text parts, ignoring thoughts and other kinds.
    pub fn merged_text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// All function-call parts, in order.
    pub fn function_calls(&self) -> Vec<&Part> {
        self.parts.iter().filter(|p| matches!(p, Part::FunctionCall { .. })).collect()
    }
}

impl Part {
    /// Returns the text content if this is a Text part, None otherwise
    pub fn text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the MIME type if this is an InlineData part
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Part::InlineData { mime_type, .. } => Some(mime_type.as_str()),
            _ => None,
        }
    }

    /// Returns true if this part is a thought marker
    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Thought { .. })
    }

    /// Returns the correlation id for function-call / function-response parts
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Part::FunctionCall { id, .. } | Part::FunctionResponse { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Create a new text part
    pub fn text_part(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Create a new thought part
    pub fn thought(thought: impl Into<String>) -> Self {
        Part::Thought { thought: thought.into() }
    }

    /// Create a new inline data part
    ///
    /// # Panics
    /// Panics if `data` exceeds [`MAX_INLINE_DATA_SIZE`] (10 MB).
    pub fn inline_data(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        assert!(
            data.len() <= MAX_INLINE_DATA_SIZE,
            "Inline data size {} exceeds maximum allowed size of {} bytes",
            data.len(),
            MAX_INLINE_DATA_SIZE
        );
        Part::InlineData { mime_type: mime_type.into(), data }
    }

    /// Create a new function-call part without a correlation id
    pub fn function_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Part::FunctionCall { name: name.into(), args, id: None }
    }

    /// Create a new function-response part without a correlation id
    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Part::FunctionResponse { name: name.into(), response, id: None }
    }

    /// Attach a correlation id to a function-call or function-response part.
    /// No-op for other part kinds.
    pub fn with_id(mut self, call_id: impl Into<String>) -> Self {
        match &mut self {
            Part::FunctionCall { id, .. } | Part::FunctionResponse { id, .. } => {
                *id = Some(call_id.into());
            }
            _ => {}
        }
        self
    }
}
