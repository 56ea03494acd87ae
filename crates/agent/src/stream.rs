//! Caller-facing fragment delivery.
//!
//! A relay task pulls from the model stream and forwards each fragment through a
//! bounded channel as soon as it arrives, so the caller can start consuming before
//! generation finishes. The sequence always terminates: on completion, on the
//! first producer error (after one error fragment), on cancellation, or as soon as the
//! caller stops listening.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::FragmentStream;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
    pub is_error: bool,
}

impl StreamFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { text: message.into(), is_error: true }
    }
}

pub type FragmentReceiver = ReceiverStream<StreamFragment>;

#[derive(Clone, Debug)]
pub struct StreamTransport {
    capacity: usize,
}

impl Default for StreamTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl StreamTransport {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1) }
    }

    /// Forwards `source` to the returned receiver. A producer error ends the
    /// sequence with one fragment holding `failure_message` and the error text.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn relay(
        &self,
        mut source: FragmentStream,
        failure_message: impl Into<String>,
        cancel: CancellationToken,
    ) -> FragmentReceiver {
        let failure_message = failure_message.into();
        let (sender, receiver) = mpsc::channel(self.capacity);

        tokio::spawn(async move {
            let mut forwarded = 0_usize;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(event_name = "agent.stream.cancelled", forwarded, "stream relay cancelled");
                        break;
                    }
                    _ = sender.closed() => {
                        debug!(event_name = "agent.stream.receiver_dropped", forwarded, "caller stopped listening");
                        break;
                    }
                    next = source.next() => next,
                };

                match next {
                    Some(Ok(text)) if text.is_empty() => {}
                    Some(Ok(text)) => {
                        if sender.send(StreamFragment::text(text)).await.is_err() {
                            debug!(event_name = "agent.stream.receiver_dropped", forwarded, "caller stopped listening");
                            break;
                        }
                        forwarded += 1;
                    }
                    Some(Err(error)) => {
                        warn!(
                            event_name = "agent.stream.failed",
                            forwarded,
                            error = %error,
                            "generation stream failed"
                        );
                        let _ = sender.send(StreamFragment::error(error.wrapped_in(&failure_message))).await;
                        break;
                    }
                    None => {
                        debug!(event_name = "agent.stream.completed", forwarded, "generation stream completed");
                        break;
                    }
                }
            }
        });

        ReceiverStream::new(receiver)
    }

    /// A sequence holding exactly one error fragment.
    pub fn failure(&self, message: impl Into<String>) -> FragmentReceiver {
        let (sender, receiver) = mpsc::channel(1);
        // Capacity 1 and a fresh receiver: this send cannot fail.
        let _ = sender.try_send(StreamFragment::error(message));
        ReceiverStream::new(receiver)
    }
}
