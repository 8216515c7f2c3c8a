//! Chat log, context tags and the tutor request wire format.

use crate::policy::SessionMode;
use crate::question::Question;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INTRO_MESSAGE: &str =
    "Hi! I'm here to help you reflect on your learning. You can ask me questions anytime!";
pub const FALLBACK_MESSAGE: &str = "Sorry, I'm having trouble connecting right now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Learner,
    #[serde(alias = "bot", alias = "assistant")]
    Tutor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Learner => write!(f, "learner"),
            Role::Tutor => write!(f, "tutor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(alias = "text")]
    pub content: String,
}

impl ChatMessage {
    pub fn learner(content: impl Into<String>) -> Self {
        Self {
            role: Role::Learner,
            content: content.into(),
        }
    }

    pub fn tutor(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tutor,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatLogError {
    #[error("A tutor reply is already being streamed")]
    ReplyInProgress,
    #[error("No tutor reply is being streamed")]
    NoReplyInProgress,
}

/// Append-only conversation with at most one tutor message still streaming.
///
/// The streaming message is always the last entry; no other message can be
/// appended until it is closed.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    streaming: bool,
}

impl ChatLog {
    /// A log that opens with the tutor's greeting.
    pub fn with_intro() -> Self {
        Self {
            messages: vec![ChatMessage::tutor(INTRO_MESSAGE)],
            streaming: false,
        }
    }

    pub fn push(&mut self, message: ChatMessage) -> Result<(), ChatLogError> {
        if self.streaming {
            return Err(ChatLogError::ReplyInProgress);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Opens an empty tutor message that fragments are appended to.
    pub fn open_reply(&mut self) -> Result<(), ChatLogError> {
        self.push(ChatMessage::tutor(String::new()))?;
        self.streaming = true;
        Ok(())
    }

    pub fn append_fragment(&mut self, fragment: &str) -> Result<(), ChatLogError> {
        match self.messages.last_mut() {
            Some(last) if self.streaming => {
                last.content.push_str(fragment);
                Ok(())
            }
            _ => Err(ChatLogError::NoReplyInProgress),
        }
    }

    /// Seals the streaming message. An empty reply is dropped and `None`
    /// returned.
    pub fn close_reply(&mut self) -> Result<Option<&ChatMessage>, ChatLogError> {
        if !self.streaming {
            return Err(ChatLogError::NoReplyInProgress);
        }
        self.streaming = false;
        if self.messages.last().is_some_and(|m| m.content.is_empty()) {
            self.messages.pop();
            return Ok(None);
        }
        Ok(self.messages.last())
    }

    /// Drops the streaming message, whatever has arrived of it.
    pub fn abandon_reply(&mut self) {
        if self.streaming {
            self.streaming = false;
            self.messages.pop();
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Why a tutor request was issued, with the fields relevant to that event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContext {
    #[serde(rename = "failure_reflection_1")]
    FailureReflection {
        question_text: String,
        user_answer: String,
        #[serde(default)]
        correct_answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    FailureExplanationRequest {
        question_text: String,
        user_answer: String,
        correct_answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    SuccessFeedback {
        question_text: String,
        correct_answer: String,
    },
    #[serde(rename = "mode_a_failure_explanation")]
    ModeAFailureExplanation {
        question_text: String,
        user_answer: String,
        correct_answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    /// Also used for any tag this build does not know.
    #[serde(other)]
    GeneralChat,
}

impl ChatContext {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChatContext::FailureReflection { .. } => "failure_reflection_1",
            ChatContext::FailureExplanationRequest { .. } => "failure_explanation_request",
            ChatContext::SuccessFeedback { .. } => "success_feedback",
            ChatContext::ModeAFailureExplanation { .. } => "mode_a_failure_explanation",
            ChatContext::GeneralChat => "general_chat",
        }
    }

    pub fn failure_reflection(question: &Question, user_answer: &str) -> Self {
        ChatContext::FailureReflection {
            question_text: question.text.clone(),
            user_answer: user_answer.to_string(),
            correct_answer: question.correct_answer().to_string(),
            explanation: Some("Review the passage carefully.".to_string()),
        }
    }

    pub fn failure_explanation_request(question: &Question, user_answer: &str) -> Self {
        ChatContext::FailureExplanationRequest {
            question_text: question.text.clone(),
            user_answer: user_answer.to_string(),
            correct_answer: question.correct_answer().to_string(),
            explanation: question.explanation.clone(),
        }
    }

    pub fn success_feedback(question: &Question) -> Self {
        ChatContext::SuccessFeedback {
            question_text: question.text.clone(),
            correct_answer: question.correct_answer().to_string(),
        }
    }

    pub fn mode_a_failure_explanation(question: &Question, user_answer: &str) -> Self {
        ChatContext::ModeAFailureExplanation {
            question_text: question.text.clone(),
            user_answer: user_answer.to_string(),
            correct_answer: question.correct_answer().to_string(),
            explanation: question.explanation.clone(),
        }
    }
}

/// The JSON body sent to the tutor service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ChatContext>,
    pub mode: SessionMode,
}

impl TutorRequest {
    pub fn context_type(&self) -> &'static str {
        self.context
            .as_ref()
            .map(ChatContext::type_name)
            .unwrap_or("general_chat")
    }
}

/// The single-shot reply body: `{ "message": { "content": ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorResponse {
    pub message: TutorResponseMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorResponseMessage {
    pub content: String,
}
