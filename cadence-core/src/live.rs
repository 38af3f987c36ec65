use crate::model::Blob;
use crate::types::Content;
use tokio::sync::{Mutex, mpsc};

/// One record handed to a live invocation: user content, a realtime media
/// chunk, or a close signal.
#[derive(Debug, Clone, Default)]
pub struct LiveRequest {
    pub content: Option<Content>,
    pub blob: Option<Blob>,
    pub close: bool,
}

impl LiveRequest {
    pub fn content(content: Content) -> Self {
        Self { content: Some(content), ..Default::default() }
    }

    pub fn blob(blob: Blob) -> Self {
        Self { blob: Some(blob), ..Default::default() }
    }

    pub fn close() -> Self {
        Self { close: true, ..Default::default() }
    }
}

/// Async hand-off queue feeding a live invocation.
///
/// Senders never block and are safe to call from outside the cooperative
/// loop; `get` suspends until a record is available. Single consumer.
pub struct LiveRequestQueue {
    tx: mpsc::UnboundedSender<LiveRequest>,
    rx: Mutex<mpsc::UnboundedReceiver<LiveRequest>>,
}

impl LiveRequestQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Mutex::new(rx) }
    }

    pub fn send_content(&self, content: Content) {
        self.send(LiveRequest::content(content));
    }

    pub fn send_blob(&self, blob: Blob) {
        self.send(LiveRequest::blob(blob));
    }

    pub fn send_close(&self) {
        self.send(LiveRequest::close());
    }

    fn send(&self, request: LiveRequest) {
        if self.tx.send(request).is_err() {
            tracing::debug!("live request dropped: queue consumer is gone");
        }
    }

    /// Receive the next record. `None` once all senders are dropped.
    pub async fn get(&self) -> Option<LiveRequest> {
        self.rx.lock().await.recv().await
    }
}

impl Default for LiveRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
