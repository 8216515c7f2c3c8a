//! History Store
//!
//! A fixed-size arena of optional records, one slot per question, plus the
//! frontier watermark (`max_index_reached`). Recording a completed question
//! is the only way the frontier moves.

use crate::attempt::{AttemptState, HistoryRecord};
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Question index {index} is out of range (session has {len} questions)")]
    OutOfRange { index: usize, len: usize },
    #[error("Cannot move question {index} from '{from}' to '{to}'")]
    InvalidTransition {
        index: usize,
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    records: Vec<Option<HistoryRecord>>,
    max_index_reached: usize,
}

impl HistoryStore {
    pub fn new(question_count: usize) -> Self {
        Self {
            records: vec![None; question_count],
            max_index_reached: 0,
        }
    }

    /// The record for `index`, or `None` if the question is unvisited.
    pub fn get(&self, index: usize) -> Option<&HistoryRecord> {
        self.records.get(index).and_then(Option::as_ref)
    }

    /// Current attempt state, treating an unvisited question as a first try.
    pub fn attempt_state(&self, index: usize) -> AttemptState {
        self.get(index)
            .map(|r| r.attempt_state.clone())
            .unwrap_or_default()
    }

    /// Writes the attempt state for `index`.
    ///
    /// Rejects transitions that would move the question backwards or rewrite
    /// an answered outcome. A completed question advances the frontier past
    /// itself.
    pub fn write(&mut self, index: usize, state: AttemptState) -> Result<(), HistoryError> {
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(index)
            .ok_or(HistoryError::OutOfRange { index, len })?;

        let current = slot
            .as_ref()
            .map(|r| &r.attempt_state)
            .unwrap_or(&AttemptState::FirstTry);
        if !current.can_advance_to(&state) {
            return Err(HistoryError::InvalidTransition {
                index,
                from: current.name(),
                to: state.name(),
            });
        }

        debug!(question_index = index, from = current.name(), to = state.name(), "History record written");
        let completed = state.is_completed();
        *slot = Some(HistoryRecord::new(state));

        if completed && index >= self.max_index_reached {
            self.max_index_reached = index + 1;
        }
        Ok(())
    }

    /// Furthest question index the learner has been permitted to pass.
    pub fn max_index_reached(&self) -> usize {
        self.max_index_reached
    }

    /// A question behind the frontier with a record is shown read-only.
    pub fn is_review(&self, index: usize) -> bool {
        self.get(index).is_some() && index < self.max_index_reached
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (usize, Option<&HistoryRecord>)> {
        self.records.iter().enumerate().map(|(i, r)| (i, r.as_ref()))
    }
}
