//! Turns typed terminal lines into learner inputs.

use std::collections::BTreeSet;
use tutor_core::driver::LearnerInput;
use tutor_core::question::QuestionBank;

pub const HELP: &str = "\
Type an option letter to answer, or write to the tutor.
  /next     go to the next question
  /back     review the previous question
  /explain  ask why your answer was wrong (mode A)
  /quit     end the session
  /help     show this message";

#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Input(LearnerInput),
    Help,
    Unknown(String),
    Blank,
}

/// Every option key used anywhere in the bank, upper-cased.
pub fn option_keys(bank: &QuestionBank) -> BTreeSet<String> {
    bank.questions()
        .iter()
        .flat_map(|q| q.options.keys())
        .map(|k| k.to_ascii_uppercase())
        .collect()
}

/// A bare option key selects it; a slash starts a command; anything else is
/// a chat message.
pub fn parse_line(line: &str, option_keys: &BTreeSet<String>) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }

    if let Some(command) = line.strip_prefix('/') {
        return match command.trim().to_ascii_lowercase().as_str() {
            "next" | "n" => Line::Input(LearnerInput::Next),
            "back" | "b" => Line::Input(LearnerInput::Back),
            "explain" | "why" => Line::Input(LearnerInput::Explain),
            "quit" | "q" | "exit" => Line::Input(LearnerInput::Quit),
            "help" | "h" | "?" => Line::Help,
            _ => Line::Unknown(line.to_string()),
        };
    }

    let upper = line.to_ascii_uppercase();
    if option_keys.contains(&upper) {
        return Line::Input(LearnerInput::Select(upper));
    }
    Line::Input(LearnerInput::Reply(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_bank;

    fn keys() -> BTreeSet<String> {
        option_keys(&sample_bank())
    }

    #[test]
    fn test_option_keys_cover_the_bank() {
        let keys = keys();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains("B"));
    }

    #[test]
    fn test_bare_letter_selects_case_insensitively() {
        assert_eq!(
            parse_line("b", &keys()),
            Line::Input(LearnerInput::Select("B".to_string()))
        );
        assert_eq!(
            parse_line("  C ", &keys()),
            Line::Input(LearnerInput::Select("C".to_string()))
        );
    }

    #[test]
    fn test_lowercase_bank_keys_are_selectable() {
        let bank = QuestionBank::from_json_str(
            r#"{"questions": [{"id": 1, "question": "?", "options": {"a": "x", "b": "y"}, "correct_option": "b"}]}"#,
        )
        .unwrap();
        let keys = option_keys(&bank);
        let Line::Input(LearnerInput::Select(key)) = parse_line("b", &keys) else {
            panic!("expected a selection");
        };
        assert!(bank.get(0).unwrap().is_correct(&key));
    }

    #[test]
    fn test_letters_outside_the_bank_are_chat() {
        assert_eq!(
            parse_line("E", &keys()),
            Line::Input(LearnerInput::Reply("E".to_string()))
        );
    }

    #[test]
    fn test_free_text_is_a_reply() {
        assert_eq!(
            parse_line("I thought the passage said apples", &keys()),
            Line::Input(LearnerInput::Reply(
                "I thought the passage said apples".to_string()
            ))
        );
    }

    #[test]
    fn test_commands() {
        let keys = keys();
        assert_eq!(parse_line("/next", &keys), Line::Input(LearnerInput::Next));
        assert_eq!(parse_line("/BACK", &keys), Line::Input(LearnerInput::Back));
        assert_eq!(parse_line("/explain", &keys), Line::Input(LearnerInput::Explain));
        assert_eq!(parse_line("/q", &keys), Line::Input(LearnerInput::Quit));
        assert_eq!(parse_line("/help", &keys), Line::Help);
        assert_eq!(parse_line("/skip", &keys), Line::Unknown("/skip".to_string()));
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        assert_eq!(parse_line("   ", &keys()), Line::Blank);
    }
}
