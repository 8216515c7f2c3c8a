//! Tutor Protocol Client
//!
//! Sends a [`TutorRequest`] to the tutor service and exposes the answer
//! either as one complete message or as a stream of text fragments. The
//! [`exchange`] helper flattens both shapes, and any failure, into the
//! ordered [`TutorEvent`] sequence the session consumes.

use crate::chat::{TutorRequest, TutorResponse};
use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use reqwest::{StatusCode, header};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TutorClientError {
    #[error("Tutor service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Tutor service rejected the request with status {0}")]
    Status(StatusCode),
    #[error("Tutor service sent an unreadable reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A stream of reply text fragments, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TutorClientError>> + Send>>;

/// The two reply shapes the tutor service may answer with.
pub enum TutorReply {
    Complete(String),
    Streaming(FragmentStream),
}

impl std::fmt::Debug for TutorReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TutorReply::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            TutorReply::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TutorClient: Send + Sync {
    /// Issues one tutor request and returns as soon as the reply starts.
    async fn send(&self, request: &TutorRequest) -> Result<TutorReply, TutorClientError>;
}

/// One step of a tutor reply as seen by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TutorEvent {
    Fragment(String),
    /// The reply finished normally.
    Closed,
    /// The request or the stream failed; no further events follow.
    Failed(String),
}

pub type TutorEventStream = Pin<Box<dyn Stream<Item = TutorEvent> + Send>>;

/// Runs one request and yields its reply as events.
///
/// The stream always ends with exactly one `Closed` or `Failed`, so the
/// caller can release its request lock on the terminal event.
pub fn exchange(client: Arc<dyn TutorClient>, request: TutorRequest) -> TutorEventStream {
    let reply = stream::once(async move { client.send(&request).await });
    let events = reply.flat_map(|result| -> TutorEventStream {
        match result {
            Ok(TutorReply::Complete(text)) => Box::pin(stream::iter([
                TutorEvent::Fragment(text),
                TutorEvent::Closed,
            ])),
            Ok(TutorReply::Streaming(fragments)) => {
                let mut failed = false;
                let body = fragments
                    .map(|item| match item {
                        Ok(text) => TutorEvent::Fragment(text),
                        Err(e) => TutorEvent::Failed(e.to_string()),
                    })
                    .take_while(move |event| {
                        // Stop after the first failure, but let it through.
                        let keep = !failed;
                        failed |= matches!(event, TutorEvent::Failed(_));
                        futures::future::ready(keep)
                    });
                Box::pin(body.chain(stream::once(async { TutorEvent::Closed })).scan(
                    false,
                    |done, event| {
                        if *done {
                            return futures::future::ready(None);
                        }
                        *done = !matches!(event, TutorEvent::Fragment(_));
                        futures::future::ready(Some(event))
                    },
                ))
            }
            Err(e) => {
                warn!(error = %e, "Tutor request failed");
                Box::pin(stream::iter([TutorEvent::Failed(e.to_string())]))
            }
        }
    });
    Box::pin(events)
}

/// Reassembles UTF-8 text from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct Utf8Assembler {
    pending: Vec<u8>,
}

impl Utf8Assembler {
    /// Returns all complete characters seen so far, holding back a trailing
    /// partial sequence until the next chunk. Invalid bytes are replaced.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// Flushes whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Talks to the tutor service's `/api/chat` endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTutorClient {
    client: reqwest::Client,
    endpoint: String,
}

/// Upper bound for one whole exchange, streamed body included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

impl HttpTutorClient {
    /// Creates a client for the service rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, TutorClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// A request still unfinished after `timeout` fails, so the session's
    /// request lock is always released.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TutorClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TutorClient for HttpTutorClient {
    async fn send(&self, request: &TutorRequest) -> Result<TutorReply, TutorClientError> {
        debug!(context_type = request.context_type(), messages = request.messages.len(), "Sending tutor request");
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TutorClientError::Status(status));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let body = response.bytes().await?;
            let parsed: TutorResponse = serde_json::from_slice(&body)?;
            return Ok(TutorReply::Complete(parsed.message.content));
        }

        let chunks = Box::pin(response.bytes_stream());
        let fragments = stream::unfold(
            (chunks, Utf8Assembler::default(), false),
            |(mut chunks, mut assembler, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match chunks.next().await {
                        Some(Ok(bytes)) => {
                            let text = assembler.push(&bytes);
                            if !text.is_empty() {
                                return Some((Ok(text), (chunks, assembler, false)));
                            }
                        }
                        Some(Err(e)) => {
                            return Some((Err(TutorClientError::from(e)), (chunks, assembler, true)));
                        }
                        None => {
                            let rest = assembler.finish();
                            if rest.is_empty() {
                                return None;
                            }
                            return Some((Ok(rest), (chunks, assembler, true)));
                        }
                    }
                }
            },
        );
        Ok(TutorReply::Streaming(Box::pin(fragments)))
    }
}
