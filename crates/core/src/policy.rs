//! Session modes and the attempt policy each one selects.
//!
//! The controller asks the policy what a wrong answer means instead of
//! branching on the mode at every call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    /// Single attempt, no mandatory reflection.
    A,
    /// Two attempts with reflection and explanation exchanges.
    B,
}

impl SessionMode {
    pub fn policy(self) -> &'static dyn AttemptPolicy {
        match self {
            SessionMode::A => &SingleAttempt,
            SessionMode::B => &ReflectiveRetry,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::A => write!(f, "A"),
            SessionMode::B => write!(f, "B"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(SessionMode::A),
            "B" => Ok(SessionMode::B),
            other => Err(format!("'{other}' is not a session mode (expected A or B)")),
        }
    }
}

/// What the session does after a wrong first answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstFailure {
    /// Finalize the question as incorrect; no tutor call.
    Finalize,
    /// Require a reflection exchange before a retry.
    Reflect,
}

/// What the session does after a wrong second answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFailure {
    /// The mode never grants a second attempt.
    Unreachable,
    /// Finalize as incorrect and require an explanation exchange.
    RequestExplanation,
}

pub trait AttemptPolicy: Send + Sync {
    fn mode(&self) -> SessionMode;
    fn on_wrong_first_attempt(&self) -> FirstFailure;
    fn on_wrong_second_attempt(&self) -> SecondFailure;
    /// Whether a pending tutor exchange blocks forward navigation.
    fn gates_navigation(&self) -> bool;
    /// Whether a correct answer triggers tutor feedback.
    fn success_feedback(&self) -> bool;
    /// Whether the learner may ask for an explanation after a final failure.
    fn explains_on_request(&self) -> bool;
}

#[derive(Debug)]
pub struct SingleAttempt;

impl AttemptPolicy for SingleAttempt {
    fn mode(&self) -> SessionMode {
        SessionMode::A
    }
    fn on_wrong_first_attempt(&self) -> FirstFailure {
        FirstFailure::Finalize
    }
    fn on_wrong_second_attempt(&self) -> SecondFailure {
        SecondFailure::Unreachable
    }
    fn gates_navigation(&self) -> bool {
        false
    }
    fn success_feedback(&self) -> bool {
        false
    }
    fn explains_on_request(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct ReflectiveRetry;

impl AttemptPolicy for ReflectiveRetry {
    fn mode(&self) -> SessionMode {
        SessionMode::B
    }
    fn on_wrong_first_attempt(&self) -> FirstFailure {
        FirstFailure::Reflect
    }
    fn on_wrong_second_attempt(&self) -> SecondFailure {
        SecondFailure::RequestExplanation
    }
    fn gates_navigation(&self) -> bool {
        true
    }
    fn success_feedback(&self) -> bool {
        true
    }
    fn explains_on_request(&self) -> bool {
        false
    }
}
