use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tutor_core::policy::SessionMode;

#[derive(Parser, Debug)]
#[command(version, about = "Terminal client for the reading-comprehension tutor")]
pub struct Args {
    /// Base URL of the tutor service.
    #[arg(long, env = "TUTOR_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Question bank JSON file.
    #[arg(long, env = "TUTOR_QUESTIONS", default_value = "questions.json")]
    pub questions: PathBuf,

    /// Participant ID to log results under. Nothing is logged without one.
    #[arg(long, env = "TUTOR_PARTICIPANT")]
    pub participant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Work through the questions with the tutor.
    Learn {
        /// A: single attempt, tutor on request. B: reflection and retry.
        #[arg(long, default_value = "B")]
        mode: SessionMode,

        /// Session length in seconds.
        #[arg(long, default_value_t = 600)]
        time_limit: u64,
    },
    /// Answer every question without the tutor and get a score.
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_defaults() {
        let args = Args::try_parse_from(["learner", "--questions", "bank.json", "learn"]).unwrap();
        assert_eq!(args.questions, PathBuf::from("bank.json"));
        assert_eq!(
            args.command,
            Command::Learn {
                mode: SessionMode::B,
                time_limit: 600
            }
        );
    }

    #[test]
    fn test_learn_mode_a_with_limit() {
        let args = Args::try_parse_from([
            "learner",
            "--participant",
            "p-3",
            "learn",
            "--mode",
            "a",
            "--time-limit",
            "90",
        ])
        .unwrap();
        assert_eq!(args.participant.as_deref(), Some("p-3"));
        assert_eq!(
            args.command,
            Command::Learn {
                mode: SessionMode::A,
                time_limit: 90
            }
        );
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["learner", "learn", "--mode", "c"]).is_err());
    }

    #[test]
    fn test_test_subcommand() {
        let args = Args::try_parse_from(["learner", "test"]).unwrap();
        assert_eq!(args.command, Command::Test);
    }
}
