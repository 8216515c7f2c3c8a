//! Session Controller
//!
//! The finite-state machine for one learn session. It owns the cursor, the
//! history, the chat log and the single-flight request lock, and never talks
//! to the network itself: operations that need the tutor return the
//! [`TutorRequest`] to issue, and the caller feeds the reply back through
//! `begin_reply` / `apply_fragment` / `close_reply` / `fail_reply`.
//!
//! Gating violations are reported as a [`Notice`] and leave the state
//! untouched.

use crate::attempt::{AttemptState, HistoryRecord};
use crate::chat::{ChatContext, ChatLog, ChatMessage, FALLBACK_MESSAGE, TutorRequest};
use crate::history::{HistoryError, HistoryStore};
use crate::policy::{AttemptPolicy, FirstFailure, SecondFailure, SessionMode};
use crate::question::{Question, QuestionBank};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A user-facing reason why an action was not carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Notice {
    #[error("Please wait for the tutor to finish responding.")]
    TutorBusy,
    #[error("Please answer the tutor's question first!")]
    ReflectionRequired,
    #[error("You are reviewing an earlier question; answers can't be changed.")]
    ReviewMode,
    #[error("This is the first question.")]
    AtFirstQuestion,
    #[error("Please answer the question before moving on.")]
    NotAnswered,
    #[error("The session has ended.")]
    SessionFinished,
    #[error("'{0}' is not one of the options.")]
    UnknownOption(String),
    #[error("Please type a message first.")]
    EmptyMessage,
    #[error("An explanation is only available for a question you answered incorrectly.")]
    ExplanationUnavailable,
    #[error("That answer can't be accepted right now.")]
    InvalidAttemptState,
}

impl From<HistoryError> for Notice {
    fn from(e: HistoryError) -> Self {
        warn!(error = %e, "Rejected history write");
        Notice::InvalidAttemptState
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The learner moved past the last question.
    Completed,
    /// The countdown reached zero.
    TimeExpired,
}

/// Outcome of a successful `request_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerSummary {
    pub question_id: String,
    pub selected: Option<String>,
    pub correct: bool,
    pub attempts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub mode: SessionMode,
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub longest_streak: usize,
    pub finish_reason: Option<FinishReason>,
    pub answers: Vec<AnswerSummary>,
}

pub struct SessionController {
    bank: QuestionBank,
    policy: &'static dyn AttemptPolicy,
    history: HistoryStore,
    current_index: usize,
    chat: ChatLog,
    busy: bool,
    finished: Option<FinishReason>,
}

impl SessionController {
    pub fn new(bank: QuestionBank, mode: SessionMode) -> Self {
        let history = HistoryStore::new(bank.len());
        Self {
            bank,
            policy: mode.policy(),
            history,
            current_index: 0,
            chat: ChatLog::with_intro(),
            busy: false,
            finished: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.policy.mode()
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.bank.get(self.current_index)
    }

    pub fn max_index_reached(&self) -> usize {
        self.history.max_index_reached()
    }

    pub fn record(&self, index: usize) -> Option<&HistoryRecord> {
        self.history.get(index)
    }

    pub fn attempt_state(&self, index: usize) -> AttemptState {
        self.history.attempt_state(index)
    }

    pub fn is_review(&self, index: usize) -> bool {
        self.history.is_review(index)
    }

    /// Whether the current question owes the tutor a reply before the
    /// learner may move on.
    pub fn reflection_required(&self) -> bool {
        self.policy.gates_navigation() && self.attempt_state(self.current_index).is_pending()
    }

    /// Whether a tutor request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finished
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    fn ensure_active(&self) -> Result<(), Notice> {
        if self.finished.is_some() {
            return Err(Notice::SessionFinished);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), Notice> {
        if self.busy {
            return Err(Notice::TutorBusy);
        }
        Ok(())
    }

    /// A request carrying only the context, no prior turns.
    fn issue_contextual(&mut self, context: ChatContext) -> TutorRequest {
        self.busy = true;
        info!(question_index = self.current_index, context_type = context.type_name(), "Issuing tutor request");
        TutorRequest {
            messages: Vec::new(),
            context: Some(context),
            mode: self.mode(),
        }
    }

    /// Evaluates the learner's choice for the current question.
    ///
    /// Returns the tutor request to issue, if the outcome calls for one.
    pub fn submit_answer(&mut self, option_key: &str) -> Result<Option<TutorRequest>, Notice> {
        self.ensure_active()?;
        self.ensure_idle()?;
        let index = self.current_index;
        if self.history.is_review(index) {
            return Err(Notice::ReviewMode);
        }
        let state = self.history.attempt_state(index);
        if state.is_pending() {
            return Err(Notice::ReflectionRequired);
        }
        let question = self
            .bank
            .get(index)
            .ok_or(Notice::InvalidAttemptState)?
            .clone();
        let Some(option_text) = question.option_text(option_key).map(str::to_string) else {
            return Err(Notice::UnknownOption(option_key.to_string()));
        };

        if question.is_correct(option_key) {
            let attempts = match state {
                AttemptState::FirstTry | AttemptState::Retrying { .. } => state.attempts() + 1,
                _ => return Err(Notice::InvalidAttemptState),
            };
            self.history.write(
                index,
                AttemptState::Completed {
                    correct: true,
                    selected: Some(option_key.to_string()),
                    attempts,
                },
            )?;
            info!(question_index = index, attempts, "Correct answer");
            let request = self
                .policy
                .success_feedback()
                .then(|| self.issue_contextual(ChatContext::success_feedback(&question)));
            return Ok(request);
        }

        info!(question_index = index, selected = option_key, state = state.name(), "Wrong answer");
        match state {
            AttemptState::FirstTry => match self.policy.on_wrong_first_attempt() {
                FirstFailure::Finalize => {
                    self.history.write(
                        index,
                        AttemptState::Completed {
                            correct: false,
                            selected: Some(option_key.to_string()),
                            attempts: 1,
                        },
                    )?;
                    Ok(None)
                }
                FirstFailure::Reflect => {
                    self.history.write(
                        index,
                        AttemptState::ReflectionPending {
                            wrong_answer: option_key.to_string(),
                        },
                    )?;
                    Ok(Some(self.issue_contextual(ChatContext::failure_reflection(
                        &question,
                        &option_text,
                    ))))
                }
            },
            AttemptState::Retrying { .. } => match self.policy.on_wrong_second_attempt() {
                SecondFailure::RequestExplanation => {
                    self.history.write(
                        index,
                        AttemptState::ExplanationPending {
                            wrong_answer: option_key.to_string(),
                        },
                    )?;
                    Ok(Some(self.issue_contextual(
                        ChatContext::failure_explanation_request(&question, &option_text),
                    )))
                }
                SecondFailure::Unreachable => Err(Notice::InvalidAttemptState),
            },
            _ => Err(Notice::InvalidAttemptState),
        }
    }

    /// Appends the learner's chat message and resolves a pending exchange on
    /// the current question.
    ///
    /// The returned request forwards the full visible history.
    pub fn receive_user_reply(&mut self, text: &str) -> Result<TutorRequest, Notice> {
        self.ensure_active()?;
        self.ensure_idle()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Notice::EmptyMessage);
        }

        self.chat
            .push(ChatMessage::learner(text))
            .map_err(|_| Notice::TutorBusy)?;

        let index = self.current_index;
        let next_state = match self.history.attempt_state(index) {
            AttemptState::ReflectionPending { wrong_answer } => Some(AttemptState::Retrying {
                first_wrong: wrong_answer,
            }),
            AttemptState::ExplanationPending { wrong_answer } => Some(AttemptState::Completed {
                correct: false,
                selected: Some(wrong_answer),
                attempts: 2,
            }),
            _ => None,
        };
        if let Some(state) = next_state {
            self.history.write(index, state)?;
            info!(question_index = index, state = self.history.attempt_state(index).name(), "Pending exchange resolved");
        }

        self.busy = true;
        Ok(TutorRequest {
            messages: self.chat.messages().to_vec(),
            context: Some(ChatContext::GeneralChat),
            mode: self.mode(),
        })
    }

    pub fn request_next(&mut self) -> Result<Navigation, Notice> {
        self.ensure_active()?;
        let target = self.current_index + 1;
        if target >= self.history.max_index_reached() {
            if self.reflection_required() {
                return Err(Notice::ReflectionRequired);
            }
            if !self.history.attempt_state(self.current_index).is_answered() {
                return Err(Notice::NotAnswered);
            }
        }

        if target >= self.bank.len() {
            self.finish(FinishReason::Completed);
            return Ok(Navigation::Finished);
        }
        self.current_index = target;
        debug!(question_index = target, review = self.history.is_review(target), "Moved forward");
        Ok(Navigation::Moved(target))
    }

    pub fn request_back(&mut self) -> Result<usize, Notice> {
        self.ensure_active()?;
        self.ensure_idle()?;
        if self.current_index == 0 {
            return Err(Notice::AtFirstQuestion);
        }
        self.current_index -= 1;
        debug!(question_index = self.current_index, "Moved back");
        Ok(self.current_index)
    }

    /// Mode A only: asks the tutor why the current question's final answer
    /// was wrong.
    pub fn request_explanation(&mut self) -> Result<TutorRequest, Notice> {
        self.ensure_active()?;
        if !self.policy.explains_on_request() {
            return Err(Notice::ExplanationUnavailable);
        }
        self.ensure_idle()?;
        let index = self.current_index;
        let AttemptState::Completed {
            correct: false,
            selected: Some(selected),
            ..
        } = self.history.attempt_state(index)
        else {
            return Err(Notice::ExplanationUnavailable);
        };
        let question = self
            .bank
            .get(index)
            .ok_or(Notice::ExplanationUnavailable)?
            .clone();
        let user_answer = question.option_text(&selected).unwrap_or(&selected).to_string();
        Ok(self.issue_contextual(ChatContext::mode_a_failure_explanation(
            &question,
            &user_answer,
        )))
    }

    /// Countdown reached zero: the open question is submitted as incorrect
    /// and the session is finalized, whatever gate is active.
    ///
    /// Returns `false` if the session had already finished.
    pub fn expire(&mut self) -> bool {
        if self.finished.is_some() {
            return false;
        }
        let index = self.history.max_index_reached();
        if index < self.bank.len() {
            let forced = match self.history.attempt_state(index) {
                AttemptState::FirstTry => Some((None, 0)),
                AttemptState::ReflectionPending { wrong_answer } => Some((Some(wrong_answer), 1)),
                AttemptState::Retrying { first_wrong } => Some((Some(first_wrong), 1)),
                AttemptState::ExplanationPending { wrong_answer } => Some((Some(wrong_answer), 2)),
                AttemptState::Completed { .. } => None,
            };
            if let Some((selected, attempts)) = forced {
                let state = AttemptState::Completed {
                    correct: false,
                    selected,
                    attempts,
                };
                if let Err(e) = self.history.write(index, state) {
                    warn!(question_index = index, error = %e, "Could not force-submit open question");
                }
            }
        }
        self.finish(FinishReason::TimeExpired);
        true
    }

    fn finish(&mut self, reason: FinishReason) {
        if self.chat.is_streaming() {
            // Keep whatever already arrived.
            let _ = self.chat.close_reply();
        }
        self.busy = false;
        self.finished = Some(reason);
        info!(reason = ?reason, answered = self.answered_count(), "Session finished");
    }

    fn answered_count(&self) -> usize {
        self.history
            .records()
            .filter(|(_, r)| r.is_some_and(HistoryRecord::is_answered))
            .count()
    }

    /// Opens the message slot the next reply streams into. Ignored once the
    /// session has finished.
    pub fn begin_reply(&mut self) -> bool {
        if self.finished.is_some() || self.chat.is_streaming() {
            return false;
        }
        self.chat.open_reply().is_ok()
    }

    pub fn apply_fragment(&mut self, fragment: &str) -> bool {
        if self.finished.is_some() {
            return false;
        }
        if !self.chat.is_streaming() && !self.begin_reply() {
            return false;
        }
        self.chat.append_fragment(fragment).is_ok()
    }

    /// Seals the streamed reply and releases the request lock.
    pub fn close_reply(&mut self) -> Option<&ChatMessage> {
        if self.finished.is_some() {
            debug!("Discarding reply that ended after the session finished");
            return None;
        }
        self.busy = false;
        self.chat.close_reply().ok().flatten()
    }

    /// Replaces a failed reply with the fallback message and releases the
    /// request lock.
    pub fn fail_reply(&mut self) {
        if self.finished.is_some() {
            return;
        }
        self.chat.abandon_reply();
        if let Err(e) = self.chat.push(ChatMessage::tutor(FALLBACK_MESSAGE)) {
            warn!(error = %e, "Could not append fallback message");
        }
        self.busy = false;
    }

    pub fn summary(&self) -> SessionSummary {
        let mut answers = Vec::with_capacity(self.bank.len());
        let mut streak = 0;
        let mut longest_streak = 0;
        for (question, (_, record)) in self.bank.questions().iter().zip(self.history.records()) {
            let state = record.map(|r| &r.attempt_state);
            let correct = state.is_some_and(AttemptState::is_correct);
            if correct {
                streak += 1;
                longest_streak = longest_streak.max(streak);
            } else {
                streak = 0;
            }
            answers.push(AnswerSummary {
                question_id: question.id.clone(),
                selected: state.and_then(|s| s.selected_option()).map(str::to_string),
                correct,
                attempts: state.map_or(0, AttemptState::attempts),
            });
        }

        SessionSummary {
            mode: self.mode(),
            total: self.bank.len(),
            answered: self.answered_count(),
            correct: answers.iter().filter(|a| a.correct).count(),
            longest_streak,
            finish_reason: self.finished,
            answers,
        }
    }
}
