//! Bounded chunk channel between a blocking producer and an async consumer.
//!
//! The producer runs on a blocking-pool thread and pushes fragments with
//! backpressure. Dropping the consumer cancels the producer's token, which
//! the producer checks before each unit of backend work. Every stream ends
//! with an explicit completion or failure event, so a producer that dies
//! silently still surfaces as an error.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::CoreError;

#[derive(Debug)]
enum StreamEvent {
    Chunk(String),
    Done,
    Failed(String),
}

/// Consumer half: an ordered, finite, non-restartable chunk sequence.
pub struct ChunkStream {
    receiver: mpsc::Receiver<StreamEvent>,
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
    finished: bool,
}

impl ChunkStream {
    /// Create a channel holding at most `capacity` undelivered chunks.
    pub fn channel(capacity: usize, token: CancellationToken) -> (ChunkSender, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stream = Self {
            receiver,
            token: token.clone(),
            _cancel_on_drop: token.clone().drop_guard(),
            finished: false,
        };
        (ChunkSender { sender, token }, stream)
    }

    /// Receive the next chunk. `None` after normal completion.
    pub async fn next_chunk(&mut self) -> Option<Result<String, CoreError>> {
        if self.finished {
            return None;
        }
        let event = self.receiver.recv().await;
        self.on_event(event)
    }

    /// Drain the stream into one string, failing on the first error.
    pub async fn collect_text(mut self) -> Result<String, CoreError> {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    /// Ask the producer to stop. Already-queued chunks remain readable.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn on_event(&mut self, event: Option<StreamEvent>) -> Option<Result<String, CoreError>> {
        match event {
            Some(StreamEvent::Chunk(text)) => Some(Ok(text)),
            Some(StreamEvent::Done) => {
                self.finished = true;
                None
            }
            Some(StreamEvent::Failed(message)) => {
                self.finished = true;
                Some(Err(CoreError::Backend(message)))
            }
            None => {
                self.finished = true;
                Some(Err(CoreError::Backend(
                    "generation ended without completing".into(),
                )))
            }
        }
    }
}

impl Stream for ChunkStream {
    type Item = Result<String, CoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(event) => Poll::Ready(self.on_event(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl std::fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream closed")
    }
}

impl std::error::Error for StreamClosed {}

/// Producer half. All sends block and must run off the async executor.
pub struct ChunkSender {
    sender: mpsc::Sender<StreamEvent>,
    token: CancellationToken,
}

impl ChunkSender {
    /// True once the consumer dropped the stream or cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.sender.is_closed()
    }

    /// Push one chunk, waiting for channel capacity.
    pub fn send(&self, chunk: String) -> Result<(), StreamClosed> {
        self.sender
            .blocking_send(StreamEvent::Chunk(chunk))
            .map_err(|_| StreamClosed)
    }

    /// Signal normal completion.
    pub fn finish(self) {
        let _ = self.sender.blocking_send(StreamEvent::Done);
    }

    /// Terminate the stream with an error.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.sender.blocking_send(StreamEvent::Failed(message.into()));
    }
}
