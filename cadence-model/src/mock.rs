use cadence_core::{
    Blob, CadenceError, Content, Llm, LlmConnection, LlmRequest, LlmResponse, LlmResponseStream,
    Result,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted model adapter for tests and dry runs.
///
/// Each `generate_content` call consumes the next scripted turn (a sequence
/// of response fragments forming one stream) and records the request it
/// received, so tests can assert on what actually reached the model. When
/// the script runs dry, the `repeating` turn (if any) is replayed; otherwise
/// the adapter reports an error response, per the adapter contract.
pub struct MockLlm {
    name: String,
    script: Mutex<VecDeque<Vec<LlmResponse>>>,
    repeating: Option<Vec<LlmResponse>>,
    live_fragments: Option<Vec<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            repeating: None,
            live_fragments: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append a single-response turn to the script.
    pub fn with_response(self, response: LlmResponse) -> Self {
        self.with_turn(vec![response])
    }

    /// Append one scripted turn: the fragments one `generate_content` call
    /// streams back.
    pub fn with_turn(self, responses: Vec<LlmResponse>) -> Self {
        self.script.lock().unwrap().push_back(responses);
        self
    }

    /// Turn replayed forever once the script is exhausted.
    pub fn repeating(mut self, responses: Vec<LlmResponse>) -> Self {
        self.repeating = Some(responses);
        self
    }

    /// Enable `connect` with the given receive-side fragments.
    pub fn with_live_fragments(mut self, fragments: Vec<LlmResponse>) -> Self {
        self.live_fragments = Some(fragments);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(&self, req: LlmRequest, _stream: bool) -> Result<LlmResponseStream> {
        self.requests.lock().unwrap().push(req);

        let turn = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeating.clone())
            .unwrap_or_else(|| {
                vec![LlmResponse::error("MOCK_EXHAUSTED", "mock script has no more turns")]
            });

        let stream = async_stream::stream! {
            for response in turn {
                yield Ok(response);
            }
        };
        Ok(Box::pin(stream))
    }

    async fn connect(&self, req: LlmRequest) -> Result<Box<dyn LlmConnection>> {
        let fragments = self.live_fragments.clone().ok_or_else(|| {
            CadenceError::Model(format!("model {} does not support live connections", self.name))
        })?;
        self.requests.lock().unwrap().push(req);
        Ok(Box::new(MockLlmConnection::new(fragments)))
    }
}

/// Connection half of [`MockLlm`]: replays scripted fragments and records
/// everything sent into it.
pub struct MockLlmConnection {
    fragments: Mutex<VecDeque<LlmResponse>>,
    sent_contents: Arc<Mutex<Vec<Content>>>,
    sent_blobs: Arc<Mutex<Vec<Blob>>>,
}

impl MockLlmConnection {
    pub fn new(fragments: Vec<LlmResponse>) -> Self {
        Self {
            fragments: Mutex::new(fragments.into()),
            sent_contents: Arc::new(Mutex::new(Vec::new())),
            sent_blobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent_contents(&self) -> Vec<Content> {
        self.sent_contents.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmConnection for MockLlmConnection {
    async fn send_history(&self, contents: Vec<Content>) -> Result<()> {
        self.sent_contents.lock().unwrap().extend(contents);
        Ok(())
    }

    async fn send_content(&self, content: Content) -> Result<()> {
        self.sent_contents.lock().unwrap().push(content);
        Ok(())
    }

    async fn send_realtime(&self, blob: Blob) -> Result<()> {
        self.sent_blobs.lock().unwrap().push(blob);
        Ok(())
    }

    async fn receive(&self) -> Option<Result<LlmResponse>> {
        self.fragments.lock().unwrap().pop_front().map(Ok)
    }

    async fn close(&self) -> Result<()> {
        self.fragments.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_turns_consumed_in_order() {
        let mock = MockLlm::new("mock")
            .with_response(LlmResponse::new(Content::new("model").with_text("first")))
            .with_response(LlmResponse::new(Content::new("model").with_text("second")));

        for expected in ["first", "second"] {
            let mut stream =
                mock.generate_content(LlmRequest::new("mock"), false).await.unwrap();
            let response = stream.next().await.unwrap().unwrap();
            assert_eq!(response.content.unwrap().merged_text(), expected);
        }

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_reports_error_response() {
        let mock = MockLlm::new("mock");
        let mut stream = mock.generate_content(LlmRequest::new("mock"), false).await.unwrap();
        let response = stream.next().await.unwrap().unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_connect_requires_live_script() {
        let mock = MockLlm::new("mock");
        assert!(mock.connect(LlmRequest::new("mock")).await.is_err());

        let mock = MockLlm::new("mock").with_live_fragments(vec![LlmResponse::new(
            Content::new("model").with_text("hi"),
        )]);
        let conn = mock.connect(LlmRequest::new("mock")).await.unwrap();
        assert!(conn.receive().await.is_some());
        assert!(conn.receive().await.is_none());
    }
}
