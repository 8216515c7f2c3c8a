use serde::{Deserialize, Serialize};

/// Per-question phase in the retry/reflection lifecycle.
///
/// Every combination the session can be in is one variant here; the derived
/// flags (`is_answered`, `is_correct`, `selected_option`) are computed from
/// it, so a question can never be pending an explanation while marked as
/// answered correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptState {
    /// No answer has been submitted yet.
    #[default]
    FirstTry,
    /// The first answer was wrong; the learner owes the tutor a reflection.
    ReflectionPending { wrong_answer: String },
    /// Reflection given; one more attempt is allowed.
    Retrying { first_wrong: String },
    /// The second answer was wrong; the learner owes the tutor an explanation.
    ExplanationPending { wrong_answer: String },
    /// Terminal.
    Completed {
        correct: bool,
        selected: Option<String>,
        attempts: u8,
    },
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptState::FirstTry => "first_try",
            AttemptState::ReflectionPending { .. } => "reflection_pending",
            AttemptState::Retrying { .. } => "retrying",
            AttemptState::ExplanationPending { .. } => "explanation_pending",
            AttemptState::Completed { .. } => "completed",
        }
    }

    /// Position in the lifecycle; states only ever move to a higher rank.
    fn rank(&self) -> u8 {
        match self {
            AttemptState::FirstTry => 0,
            AttemptState::ReflectionPending { .. } => 1,
            AttemptState::Retrying { .. } => 2,
            AttemptState::ExplanationPending { .. } => 3,
            AttemptState::Completed { .. } => 4,
        }
    }

    /// Whether the learner must reply to the tutor before anything else.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            AttemptState::ReflectionPending { .. } | AttemptState::ExplanationPending { .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AttemptState::Completed { .. })
    }

    /// The question's outcome is fixed (even if an explanation is still owed).
    pub fn is_answered(&self) -> bool {
        matches!(
            self,
            AttemptState::ExplanationPending { .. } | AttemptState::Completed { .. }
        )
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, AttemptState::Completed { correct: true, .. })
    }

    /// The option shown as the learner's choice for this question.
    pub fn selected_option(&self) -> Option<&str> {
        match self {
            AttemptState::FirstTry => None,
            AttemptState::ReflectionPending { wrong_answer }
            | AttemptState::ExplanationPending { wrong_answer } => Some(wrong_answer),
            AttemptState::Retrying { first_wrong } => Some(first_wrong),
            AttemptState::Completed { selected, .. } => selected.as_deref(),
        }
    }

    /// Number of answers submitted so far.
    pub fn attempts(&self) -> u8 {
        match self {
            AttemptState::FirstTry => 0,
            AttemptState::ReflectionPending { .. } | AttemptState::Retrying { .. } => 1,
            AttemptState::ExplanationPending { .. } => 2,
            AttemptState::Completed { attempts, .. } => *attempts,
        }
    }

    /// Checks that moving from `self` to `next` respects the lifecycle.
    ///
    /// Besides the rank ordering, an answered question keeps its selection
    /// and correctness; the only exception is an explanation being resolved
    /// into the matching incorrect completion.
    pub fn can_advance_to(&self, next: &AttemptState) -> bool {
        if next.rank() < self.rank() {
            return false;
        }
        match (self, next) {
            (AttemptState::Completed { .. }, _) => self == next,
            (
                AttemptState::ExplanationPending { wrong_answer },
                AttemptState::Completed {
                    correct, selected, ..
                },
            ) => !correct && selected.as_deref() == Some(wrong_answer.as_str()),
            (AttemptState::ExplanationPending { .. }, other) => self == other,
            _ => true,
        }
    }
}

/// The outcome of the attempt(s) made on one question so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub attempt_state: AttemptState,
}

impl HistoryRecord {
    pub fn new(attempt_state: AttemptState) -> Self {
        Self { attempt_state }
    }

    pub fn selected_option(&self) -> Option<&str> {
        self.attempt_state.selected_option()
    }

    pub fn is_correct(&self) -> bool {
        self.attempt_state.is_correct()
    }

    pub fn is_answered(&self) -> bool {
        self.attempt_state.is_answered()
    }
}
