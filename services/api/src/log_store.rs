//! Participant Log Store
//!
//! One pretty-printed JSON document per participant under the logs
//! directory. Every write is a read-merge-write upsert: `learn` and `test`
//! entries are merged into their own timestamped sub-object, anything else is
//! merged into the top level.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::map::Entry;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use tutor_core::log_sink::{LogEntry, LogKind};

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("Participant ID '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidParticipantId(String),
    #[error("Failed to access log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode log document: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct LogStore {
    root: PathBuf,
    // Serializes read-merge-write cycles.
    write_lock: Mutex<()>,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn document_path(&self, participant_id: &str) -> Result<PathBuf, LogStoreError> {
        let valid = !participant_id.is_empty()
            && participant_id.len() <= 128
            && participant_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(LogStoreError::InvalidParticipantId(participant_id.to_string()));
        }
        Ok(self.root.join(format!("{participant_id}.json")))
    }

    /// Reads a participant's document. A missing document is `None`.
    pub async fn read(&self, participant_id: &str) -> Result<Option<Value>, LogStoreError> {
        let path = self.document_path(participant_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Merges `entry` into the participant's document and returns the result.
    pub async fn upsert(&self, entry: &LogEntry) -> Result<Value, LogStoreError> {
        let path = self.document_path(&entry.participant_id)?;
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root).await?;

        let mut document = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) | Err(_) => {
                    warn!(path = %path.display(), "Log document is not a JSON object; replacing it");
                    Value::Object(Map::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };

        apply_entry(&mut document, entry, Utc::now());
        tokio::fs::write(&path, serde_json::to_string_pretty(&document)?).await?;
        debug!(participant = %entry.participant_id, kind = ?entry.kind, "Log document updated");
        Ok(document)
    }
}

fn apply_entry(document: &mut Value, entry: &LogEntry, now: DateTime<Utc>) {
    let section = match entry.kind {
        LogKind::Learn => "learnSession",
        LogKind::Test => "testSession",
        LogKind::Other(_) => {
            merge(document, entry.data.clone());
            return;
        }
    };

    let mut patch = match &entry.data {
        Value::Object(fields) => fields.clone(),
        Value::Null => Map::new(),
        other => {
            let mut fields = Map::new();
            fields.insert("value".to_string(), other.clone());
            fields
        }
    };
    patch.insert(
        "timestamp".to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    let mut wrapper = Map::new();
    wrapper.insert(section.to_string(), Value::Object(patch));
    merge(document, Value::Object(wrapper));
}

/// Deep merge: objects are merged key by key, anything else replaces.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.entry(key) {
                    Entry::Occupied(mut existing) => merge(existing.get_mut(), value),
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
