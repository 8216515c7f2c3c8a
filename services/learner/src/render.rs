//! Terminal rendering of session updates.

use tutor_core::assessment::AssessmentResult;
use tutor_core::attempt::AttemptState;
use tutor_core::driver::{QuestionView, SessionUpdate};
use tutor_core::question::Question;
use tutor_core::session::{FinishReason, SessionSummary};

/// Text to print for an update, without a trailing newline for streamed
/// chunks. `None` means nothing is shown.
pub fn render(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::Question(view) => Some(question_view(view)),
        SessionUpdate::Answered { correct, state } => Some(answered(*correct, state)),
        SessionUpdate::Notice { message } => Some(format!("! {message}\n")),
        SessionUpdate::ResponseStart => Some("\nTutor: ".to_string()),
        SessionUpdate::ResponseChunk { chunk } => Some(chunk.clone()),
        SessionUpdate::ResponseEnd => Some("\n\n".to_string()),
        SessionUpdate::ResponseFailed { message } => Some(format!("\nTutor: {message}\n\n")),
        SessionUpdate::Tick { remaining_secs } => tick(*remaining_secs),
        SessionUpdate::Finished(summary) => Some(summary_text(summary)),
    }
}

pub fn options(question: &Question, marked: Option<&str>) -> String {
    question
        .options
        .iter()
        .map(|(key, text)| {
            let marker = if marked == Some(key.as_str()) { "  <" } else { "" };
            format!("  {key}) {text}{marker}\n")
        })
        .collect()
}

fn question_view(view: &QuestionView) -> String {
    let mut out = format!(
        "\nQuestion {}/{}{}\n{}\n",
        view.index + 1,
        view.total,
        if view.review { " (review)" } else { "" },
        view.question.text
    );
    out.push_str(&options(&view.question, view.state.selected_option()));
    if view.review {
        let verdict = if view.state.is_correct() { "correct" } else { "incorrect" };
        out.push_str(&format!("Your answer was {verdict}. /next to continue.\n"));
    }
    out
}

fn answered(correct: bool, state: &AttemptState) -> String {
    if correct {
        return "Correct!\n".to_string();
    }
    match state {
        AttemptState::ReflectionPending { .. } => {
            "Not quite. Tell the tutor what led you to that answer, then try again.\n".to_string()
        }
        AttemptState::ExplanationPending { .. } => {
            "Still not right. Read the tutor's explanation and reply before moving on.\n".to_string()
        }
        _ => "Incorrect. Type /explain to find out why, or /next to continue.\n".to_string(),
    }
}

/// Shows whole minutes and the final ten seconds.
fn tick(remaining_secs: u64) -> Option<String> {
    if remaining_secs == 0 {
        return Some("! Time is up.\n".to_string());
    }
    if remaining_secs % 60 == 0 || remaining_secs <= 10 {
        return Some(format!(
            "[{}:{:02} remaining]\n",
            remaining_secs / 60,
            remaining_secs % 60
        ));
    }
    None
}

fn summary_text(summary: &SessionSummary) -> String {
    let ending = match summary.finish_reason {
        Some(FinishReason::Completed) => "Session complete",
        Some(FinishReason::TimeExpired) => "Time expired",
        None => "Session ended",
    };
    format!(
        "\n{ending}. {} of {} answered, {} correct, longest streak {}.\n",
        summary.answered, summary.total, summary.correct, summary.longest_streak
    )
}

pub fn assessment_result(result: &AssessmentResult) -> String {
    let mut out = format!("\nScore: {}/{}\n", result.score, result.total);
    for (n, answer) in result.answers.iter().enumerate() {
        let mark = if answer.correct { "correct" } else { "incorrect" };
        out.push_str(&format!("  {}. {} ({mark})\n", n + 1, answer.selected));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_bank;
    use tutor_core::policy::SessionMode;

    fn view(state: AttemptState, review: bool) -> QuestionView {
        let bank = sample_bank();
        QuestionView {
            index: 0,
            total: bank.len(),
            question: bank.questions()[0].clone(),
            state,
            review,
        }
    }

    #[test]
    fn test_question_lists_options_in_key_order() {
        let text = render(&SessionUpdate::Question(view(AttemptState::FirstTry, false))).unwrap();
        assert!(text.starts_with("\nQuestion 1/4\n"));
        let a = text.find("  A) ").unwrap();
        let d = text.find("  D) ").unwrap();
        assert!(a < d);
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_review_marks_recorded_answer() {
        let state = AttemptState::Completed {
            correct: true,
            selected: Some("B".to_string()),
            attempts: 1,
        };
        let text = render(&SessionUpdate::Question(view(state, true))).unwrap();
        assert!(text.contains("(review)"));
        assert!(text.contains("  B) It got the most sunlight  <\n"));
        assert!(text.contains("was correct"));
    }

    #[test]
    fn test_wrong_answer_hints_depend_on_state() {
        let reflect = render(&SessionUpdate::Answered {
            correct: false,
            state: AttemptState::ReflectionPending {
                wrong_answer: "A".to_string(),
            },
        })
        .unwrap();
        assert!(reflect.contains("try again"));

        let final_wrong = render(&SessionUpdate::Answered {
            correct: false,
            state: AttemptState::Completed {
                correct: false,
                selected: Some("A".to_string()),
                attempts: 1,
            },
        })
        .unwrap();
        assert!(final_wrong.contains("/explain"));
    }

    #[test]
    fn test_ticks_are_throttled() {
        assert_eq!(
            render(&SessionUpdate::Tick { remaining_secs: 120 }).as_deref(),
            Some("[2:00 remaining]\n")
        );
        assert_eq!(render(&SessionUpdate::Tick { remaining_secs: 95 }), None);
        assert_eq!(
            render(&SessionUpdate::Tick { remaining_secs: 7 }).as_deref(),
            Some("[0:07 remaining]\n")
        );
        assert_eq!(
            render(&SessionUpdate::Tick { remaining_secs: 0 }).as_deref(),
            Some("! Time is up.\n")
        );
    }

    #[test]
    fn test_streamed_reply_is_framed() {
        let text: String = [
            SessionUpdate::ResponseStart,
            SessionUpdate::ResponseChunk {
                chunk: "Look at ".to_string(),
            },
            SessionUpdate::ResponseChunk {
                chunk: "the fence.".to_string(),
            },
            SessionUpdate::ResponseEnd,
        ]
        .iter()
        .filter_map(render)
        .collect();
        assert_eq!(text, "\nTutor: Look at the fence.\n\n");
    }

    #[test]
    fn test_summary_names_the_ending() {
        let summary = SessionSummary {
            mode: SessionMode::B,
            total: 4,
            answered: 2,
            correct: 1,
            longest_streak: 1,
            finish_reason: Some(FinishReason::TimeExpired),
            answers: Vec::new(),
        };
        let text = render(&SessionUpdate::Finished(summary)).unwrap();
        assert_eq!(
            text,
            "\nTime expired. 2 of 4 answered, 1 correct, longest streak 1.\n"
        );
    }
}
