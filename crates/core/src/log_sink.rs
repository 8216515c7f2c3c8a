//! Participant log sink.
//!
//! Writes are upserts on the service side, so resubmitting an entry is
//! harmless. From the session's point of view they are fire-and-forget: a
//! failed write is logged and otherwise ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which part of the participant document an entry updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogKind {
    Learn,
    Test,
    Other(String),
}

impl From<String> for LogKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "learn" => LogKind::Learn,
            "test" => LogKind::Test,
            _ => LogKind::Other(value),
        }
    }
}

impl From<LogKind> for String {
    fn from(kind: LogKind) -> Self {
        match kind {
            LogKind::Learn => "learn".to_string(),
            LogKind::Test => "test".to_string(),
            LogKind::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub participant_id: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum LogSinkError {
    #[error("Log service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Log service rejected the entry with status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, entry: &LogEntry) -> Result<(), LogSinkError>;
}

/// Submits `entry` in the background; failures are only logged.
pub fn submit(sink: Arc<dyn LogSink>, entry: LogEntry) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match sink.record(&entry).await {
            Ok(()) => debug!(participant = %entry.participant_id, kind = ?entry.kind, "Log entry recorded"),
            Err(e) => warn!(participant = %entry.participant_id, error = %e, "Failed to record log entry"),
        }
    })
}

/// Posts entries to the tutor service's `/api/log` endpoint.
#[derive(Debug, Clone)]
pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogSink {
    pub fn new(base_url: &str) -> Result<Self, LogSinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/log", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn record(&self, entry: &LogEntry) -> Result<(), LogSinkError> {
        let response = self.client.post(&self.endpoint).json(entry).send().await?;
        if !response.status().is_success() {
            return Err(LogSinkError::Status(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink {
        entries: Mutex<Vec<LogEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn record(&self, entry: &LogEntry) -> Result<(), LogSinkError> {
            if self.fail {
                return Err(LogSinkError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = LogEntry {
            participant_id: "p-01".into(),
            kind: LogKind::Learn,
            data: json!({"score": 3}),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"participantId": "p-01", "type": "learn", "data": {"score": 3}}));

        let other: LogEntry =
            serde_json::from_value(json!({"participantId": "p", "type": "survey", "data": {}})).unwrap();
        assert_eq!(other.kind, LogKind::Other("survey".into()));
    }

    #[tokio::test]
    async fn test_submit_records_in_background() {
        let sink = Arc::new(RecordingSink {
            entries: Mutex::new(vec![]),
            fail: false,
        });
        let entry = LogEntry {
            participant_id: "p-02".into(),
            kind: LogKind::Test,
            data: json!({}),
        };
        submit(sink.clone(), entry.clone()).await.unwrap();
        assert_eq!(sink.entries.lock().unwrap().as_slice(), &[entry]);
    }

    #[tokio::test]
    async fn test_submit_swallows_failures() {
        let sink = Arc::new(RecordingSink {
            entries: Mutex::new(vec![]),
            fail: true,
        });
        let entry = LogEntry {
            participant_id: "p-03".into(),
            kind: LogKind::Learn,
            data: json!({}),
        };
        // The task completes normally even though the write failed.
        assert!(submit(sink.clone(), entry).await.is_ok());
        assert!(sink.entries.lock().unwrap().is_empty());
    }
}
