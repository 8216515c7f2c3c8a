//! The knowledge check: every question answered without the tutor, then
//! scored once.

use crate::input::option_keys;
use crate::render;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tutor_core::assessment::{Assessment, AssessmentResult};
use tutor_core::question::QuestionBank;

const HELP: &str = "\
Type an option letter to answer. Type a question number to jump to it.
  /submit   score the check (every question needs an answer)
  /retry    clear the answers and start over after scoring
  /quit     leave";

fn show(
    out: &mut impl Write,
    bank: &QuestionBank,
    assessment: &Assessment<'_>,
    index: usize,
) -> std::io::Result<()> {
    let Some(question) = bank.get(index) else {
        return Ok(());
    };
    write!(
        out,
        "\nQuestion {}/{}\n{}\n{}",
        index + 1,
        bank.len(),
        question.text,
        render::options(question, assessment.selection(index))
    )
}

/// Runs the check over `lines` until it is submitted and the learner leaves.
///
/// Returns the last submitted result, or `None` when the learner left before
/// submitting.
pub async fn run_check(
    bank: &QuestionBank,
    lines: &mut mpsc::Receiver<String>,
    out: &mut impl Write,
) -> anyhow::Result<Option<AssessmentResult>> {
    let keys = option_keys(bank);
    let mut assessment = Assessment::new(bank);
    let mut index = 0;

    writeln!(out, "{HELP}")?;
    show(out, bank, &assessment, index)?;

    while let Some(line) = lines.recv().await {
        let line = line.trim().to_ascii_uppercase();
        match line.as_str() {
            "" => {}
            "/QUIT" | "/Q" => break,
            "/HELP" => writeln!(out, "{HELP}")?,
            "/SUBMIT" => match assessment.submit() {
                Ok(result) => {
                    info!(score = result.score, total = result.total, "Knowledge check submitted");
                    write!(out, "{}", render::assessment_result(result))?;
                    writeln!(out, "Type /retry to try again or /quit to leave.")?;
                }
                Err(e) => writeln!(out, "! {e}")?,
            },
            "/RETRY" => {
                if assessment.result().is_some() {
                    assessment.reset();
                    index = 0;
                    show(out, bank, &assessment, index)?;
                } else {
                    writeln!(out, "! Submit the check before starting over")?;
                }
            }
            key if keys.contains(key) => match assessment.select(index, key) {
                Ok(()) => {
                    debug!(question_index = index, %key, "Answer selected");
                    if index + 1 < bank.len() {
                        index += 1;
                        show(out, bank, &assessment, index)?;
                    } else {
                        writeln!(
                            out,
                            "Type /submit to finish, or a question number to change an answer."
                        )?;
                    }
                }
                Err(e) => writeln!(out, "! {e}")?,
            },
            other => match other.parse::<usize>() {
                Ok(n) if (1..=bank.len()).contains(&n) => {
                    index = n - 1;
                    show(out, bank, &assessment, index)?;
                }
                _ => writeln!(out, "! Unrecognised input. Type /help for the commands.")?,
            },
        }
    }

    Ok(assessment.result().cloned())
}
