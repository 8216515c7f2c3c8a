//! Knowledge check: every question answered without tutoring, then scored
//! once.

use crate::question::QuestionBank;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssessmentError {
    #[error("Question {0} does not exist")]
    UnknownQuestion(usize),
    #[error("'{key}' is not an option of question {index}")]
    UnknownOption { index: usize, key: String },
    #[error("The check has already been submitted")]
    AlreadySubmitted,
    #[error("{missing} question(s) still need an answer")]
    Incomplete { missing: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentResult {
    pub score: usize,
    pub total: usize,
    pub answers: Vec<AssessmentAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentAnswer {
    pub question_id: String,
    pub selected: String,
    pub correct: bool,
}

pub struct Assessment<'a> {
    bank: &'a QuestionBank,
    selections: BTreeMap<usize, String>,
    result: Option<AssessmentResult>,
}

impl<'a> Assessment<'a> {
    pub fn new(bank: &'a QuestionBank) -> Self {
        Self {
            bank,
            selections: BTreeMap::new(),
            result: None,
        }
    }

    /// Selects (or changes) the answer for one question until submission.
    pub fn select(&mut self, index: usize, key: &str) -> Result<(), AssessmentError> {
        if self.result.is_some() {
            return Err(AssessmentError::AlreadySubmitted);
        }
        let question = self
            .bank
            .get(index)
            .ok_or(AssessmentError::UnknownQuestion(index))?;
        if !question.options.contains_key(key) {
            return Err(AssessmentError::UnknownOption {
                index,
                key: key.to_string(),
            });
        }
        self.selections.insert(index, key.to_string());
        Ok(())
    }

    pub fn selection(&self, index: usize) -> Option<&str> {
        self.selections.get(&index).map(String::as_str)
    }

    pub fn unanswered(&self) -> usize {
        self.bank.len() - self.selections.len()
    }

    pub fn submit(&mut self) -> Result<&AssessmentResult, AssessmentError> {
        if self.result.is_some() {
            return Err(AssessmentError::AlreadySubmitted);
        }
        let missing = self.unanswered();
        if missing > 0 {
            return Err(AssessmentError::Incomplete { missing });
        }

        let answers: Vec<AssessmentAnswer> = self
            .bank
            .questions()
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let selected = self.selections.get(&index).cloned().unwrap_or_default();
                AssessmentAnswer {
                    question_id: question.id.clone(),
                    correct: question.is_correct(&selected),
                    selected,
                }
            })
            .collect();
        let score = answers.iter().filter(|a| a.correct).count();

        Ok(self.result.insert(AssessmentResult {
            score,
            total: self.bank.len(),
            answers,
        }))
    }

    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    /// Number of correct answers, once submitted.
    pub fn score(&self) -> Option<usize> {
        self.result.as_ref().map(|r| r.score)
    }

    /// Clears all selections for another try.
    pub fn reset(&mut self) {
        self.selections.clear();
        self.result = None;
    }
}
