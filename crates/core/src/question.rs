//! Question Bank
//!
//! The static, ordered set of multiple-choice questions a session runs over,
//! together with the reading passage they refer to. The bank is loaded once
//! and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading or validating a question bank.
#[derive(Debug, thiserror::Error)]
pub enum QuestionBankError {
    #[error("Failed to read question bank: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed question bank: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Question bank contains no questions")]
    Empty,
    #[error("Question {id} has no options")]
    NoOptions { id: String },
    #[error("Question {id} lists option '{key}' more than once")]
    DuplicateOption { id: String, key: String },
    #[error("Question {id} names correct option '{key}' which is not among its options")]
    UnknownCorrectOption { id: String, key: String },
}

/// A single multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "question")]
    pub text: String,
    /// Option key (e.g. "A") to option text. Ordered by key for display.
    pub options: BTreeMap<String, String>,
    pub correct_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    pub fn is_correct(&self, option_key: &str) -> bool {
        self.correct_option == option_key
    }

    pub fn option_text(&self, option_key: &str) -> Option<&str> {
        self.options.get(option_key).map(String::as_str)
    }

    /// The text of the correct option.
    pub fn correct_answer(&self) -> &str {
        self.option_text(&self.correct_option).unwrap_or_default()
    }
}

/// Accepts both numeric and string identifiers in the source file.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// The read-only question sequence plus its passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub passage: String,
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Builds a validated bank from already-parsed questions.
    pub fn new(passage: String, questions: Vec<Question>) -> Result<Self, QuestionBankError> {
        Self { passage, questions }.prepare()
    }

    pub fn from_json_str(json: &str) -> Result<Self, QuestionBankError> {
        let bank: QuestionBank = serde_json::from_str(json)?;
        bank.prepare()
    }

    pub fn from_path(path: &Path) -> Result<Self, QuestionBankError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Upper-cases option keys so "a" and "A" name the same option, then
    /// validates.
    fn prepare(mut self) -> Result<Self, QuestionBankError> {
        if self.questions.is_empty() {
            return Err(QuestionBankError::Empty);
        }
        for question in &mut self.questions {
            let mut options = BTreeMap::new();
            for (key, text) in std::mem::take(&mut question.options) {
                let key = key.trim().to_ascii_uppercase();
                if options.insert(key.clone(), text).is_some() {
                    return Err(QuestionBankError::DuplicateOption {
                        id: question.id.clone(),
                        key,
                    });
                }
            }
            question.options = options;
            question.correct_option = question.correct_option.trim().to_ascii_uppercase();

            if question.options.is_empty() {
                return Err(QuestionBankError::NoOptions {
                    id: question.id.clone(),
                });
            }
            if !question.options.contains_key(&question.correct_option) {
                return Err(QuestionBankError::UnknownCorrectOption {
                    id: question.id.clone(),
                    key: question.correct_option.clone(),
                });
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}
