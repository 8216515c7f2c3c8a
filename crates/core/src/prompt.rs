//! Prompt Policy
//!
//! Maps a session mode and a chat context to the system instruction sent to
//! the completion service. Templates are Markdown files loaded from a prompts
//! directory; any template that is missing falls back to a short built-in
//! text, so a prompt is always produced.
//!
//! Placeholders: `{question_text}`, `{user_answer}`, `{correct_answer}`,
//! `{explanation}` and `{language}`.

use crate::chat::ChatContext;
use crate::policy::SessionMode;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const MODE_A: &str = "mode_a";
const MODE_B: &str = "mode_b";
const FAILURE_REFLECTION: &str = "failure_reflection_1";
const FAILURE_EXPLANATION: &str = "failure_explanation_request";
const SUCCESS_FEEDBACK: &str = "success_feedback";
const MODE_A_FAILURE: &str = "mode_a_failure_explanation";

const TEMPLATE_KEYS: [&str; 6] = [
    MODE_A,
    MODE_B,
    FAILURE_REFLECTION,
    FAILURE_EXPLANATION,
    SUCCESS_FEEDBACK,
    MODE_A_FAILURE,
];

fn builtin_template(key: &str) -> &'static str {
    match key {
        MODE_A => {
            "You are a helpful assistant. Answer questions if the user types in a question. \
             Do not provide unsolicited feedback."
        }
        MODE_B => {
            "You are a helpful and friendly AI tutor for a reading-comprehension lesson. \
             Be encouraging and concise."
        }
        FAILURE_REFLECTION => {
            "The learner answered \"{question_text}\" incorrectly with \"{user_answer}\" (attempt 1). \
             Ignore earlier conversation about other topics. \
             Ask one short Socratic question that helps them reflect on their choice. \
             Never reveal the correct answer. Respond in {language}."
        }
        FAILURE_EXPLANATION => {
            "The learner answered \"{question_text}\" incorrectly twice. \
             The correct answer is \"{correct_answer}\". Explanation: {explanation} \
             Ask the learner to explain in their own words why \"{correct_answer}\" is correct."
        }
        SUCCESS_FEEDBACK => {
            "The learner answered \"{question_text}\" correctly with \"{correct_answer}\". \
             Give a very brief positive reinforcement."
        }
        MODE_A_FAILURE => {
            "The learner answered \"{question_text}\" incorrectly with \"{user_answer}\" and will not retry. \
             The correct answer is \"{correct_answer}\". Explanation: {explanation} \
             Explain directly and briefly why it is correct."
        }
        _ => "You are a helpful assistant.",
    }
}

#[derive(Debug, Clone)]
pub struct PromptPolicy {
    templates: HashMap<String, String>,
    language: String,
}

impl PromptPolicy {
    /// A policy using only the built-in templates.
    pub fn builtin(language: impl Into<String>) -> Self {
        Self {
            templates: HashMap::new(),
            language: language.into(),
        }
    }

    /// Loads `*.md` templates from `prompts_path`, keyed by file stem.
    ///
    /// An unreadable directory or file is logged and the affected templates
    /// fall back to the built-in text.
    pub fn from_dir(prompts_path: &Path, language: impl Into<String>) -> Self {
        let mut policy = Self::builtin(language);
        match load_templates(prompts_path) {
            Ok(templates) => {
                for key in TEMPLATE_KEYS {
                    if !templates.contains_key(key) {
                        warn!(template = key, "Prompt template missing; using built-in default");
                    }
                }
                info!(count = templates.len(), path = %prompts_path.display(), "Loaded prompt templates");
                policy.templates = templates;
            }
            Err(e) => {
                warn!(path = %prompts_path.display(), error = %e, "Could not read prompts directory; using built-in defaults");
            }
        }
        policy
    }

    fn template(&self, key: &str) -> &str {
        self.templates
            .get(key)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| builtin_template(key))
    }

    /// Builds the system prompt for one tutor request.
    ///
    /// Mode A is a plain helper and only honours the on-demand explanation
    /// context; mode B appends the block for whichever context was sent.
    pub fn build(&self, mode: SessionMode, context: Option<&ChatContext>) -> String {
        let base = match mode {
            SessionMode::A => self.template(MODE_A),
            SessionMode::B => self.template(MODE_B),
        };
        let block = match (mode, context) {
            (SessionMode::A, Some(ctx @ ChatContext::ModeAFailureExplanation { .. })) => {
                Some(self.render(MODE_A_FAILURE, ctx))
            }
            (SessionMode::A, _) => None,
            (SessionMode::B, Some(ctx)) => match ctx {
                ChatContext::FailureReflection { .. } => Some(self.render(FAILURE_REFLECTION, ctx)),
                ChatContext::FailureExplanationRequest { .. } => {
                    Some(self.render(FAILURE_EXPLANATION, ctx))
                }
                ChatContext::SuccessFeedback { .. } => Some(self.render(SUCCESS_FEEDBACK, ctx)),
                ChatContext::ModeAFailureExplanation { .. } => {
                    Some(self.render(MODE_A_FAILURE, ctx))
                }
                ChatContext::GeneralChat => None,
            },
            (SessionMode::B, None) => None,
        };

        let base = base.trim_end();
        match block {
            Some(block) => format!("{base}\n\n{}", block.trim()),
            None => base.to_string(),
        }
    }

    fn render(&self, key: &str, context: &ChatContext) -> String {
        let (question_text, user_answer, correct_answer, explanation) = match context {
            ChatContext::FailureReflection {
                question_text,
                user_answer,
                correct_answer,
                explanation,
            }
            | ChatContext::FailureExplanationRequest {
                question_text,
                user_answer,
                correct_answer,
                explanation,
            }
            | ChatContext::ModeAFailureExplanation {
                question_text,
                user_answer,
                correct_answer,
                explanation,
            } => (
                question_text.as_str(),
                user_answer.as_str(),
                correct_answer.as_str(),
                explanation.as_deref().unwrap_or("Review the passage."),
            ),
            ChatContext::SuccessFeedback {
                question_text,
                correct_answer,
            } => (question_text.as_str(), "", correct_answer.as_str(), ""),
            ChatContext::GeneralChat => ("", "", "", ""),
        };

        self.template(key)
            .replace("{question_text}", question_text)
            .replace("{user_answer}", user_answer)
            .replace("{correct_answer}", correct_answer)
            .replace("{explanation}", explanation)
            .replace("{language}", &self.language)
    }
}

fn load_templates(prompts_path: &Path) -> std::io::Result<HashMap<String, String>> {
    let mut templates = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                templates.insert(key.to_string(), std::fs::read_to_string(&path)?);
            }
        }
    }
    Ok(templates)
}
