//! Terminal client for the reading-comprehension tutor.
//!
//! `learn` runs a tutored session against the tutor service; `test` runs the
//! knowledge check. Both report their outcome to the service's participant
//! log when a participant ID is given.

mod check;
mod cli;
mod input;
mod render;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tutor_core::driver::{LearnerInput, SessionUpdate, run_session};
use tutor_core::log_sink::{self, HttpLogSink, LogEntry, LogKind, LogSink};
use tutor_core::policy::SessionMode;
use tutor_core::question::QuestionBank;
use tutor_core::session::SessionController;
use tutor_core::tutor_client::HttpTutorClient;

use cli::{Args, Command};
use input::Line;

/// Reads stdin on a dedicated thread so a pending read never holds up exit.
fn spawn_line_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Records `entry` and waits for the attempt to finish.
async fn report(sink: &Arc<dyn LogSink>, entry: LogEntry) {
    if let Err(e) = log_sink::submit(sink.clone(), entry).await {
        warn!(error = %e, "Log task did not complete");
    }
}

async fn learn(
    args: &Args,
    bank: QuestionBank,
    mode: SessionMode,
    time_limit: Duration,
    sink: Option<Arc<dyn LogSink>>,
) -> anyhow::Result<()> {
    if let (Some(sink), Some(participant)) = (&sink, &args.participant) {
        report(
            sink,
            LogEntry {
                participant_id: participant.clone(),
                kind: LogKind::Other("other".to_string()),
                data: json!({ "participantId": participant, "mode": mode }),
            },
        )
        .await;
    }

    let keys = input::option_keys(&bank);
    let controller = SessionController::new(bank, mode);

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}\n", controller.bank().passage)?;
    if let Some(intro) = controller.chat().last() {
        writeln!(stdout, "Tutor: {}\n", intro.content)?;
    }
    writeln!(stdout, "{}", input::HELP)?;

    let client = Arc::new(
        HttpTutorClient::new(&args.api_url).context("Failed to build the tutor client")?,
    );
    let (input_tx, input_rx) = mpsc::channel(32);
    let (update_tx, mut update_rx) = mpsc::channel(256);
    let session = tokio::spawn(run_session(
        controller,
        client,
        input_rx,
        update_tx,
        time_limit,
    ));

    let mut lines = spawn_line_reader();
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            match input::parse_line(&line, &keys) {
                Line::Input(input) => {
                    let quit = input == LearnerInput::Quit;
                    if input_tx.send(input).await.is_err() || quit {
                        break;
                    }
                }
                Line::Help => println!("{}", input::HELP),
                Line::Unknown(command) => {
                    println!("! Unknown command {command}. Type /help for the list.")
                }
                Line::Blank => {}
            }
        }
    });

    let mut summary = None;
    while let Some(update) = update_rx.recv().await {
        if let Some(text) = render::render(&update) {
            write!(stdout, "{text}")?;
            stdout.flush()?;
        }
        if let SessionUpdate::Finished(finished) = update {
            summary = Some(finished);
        }
    }
    session.await.context("Session task failed")?;

    if let (Some(sink), Some(participant), Some(summary)) = (&sink, &args.participant, summary) {
        info!(
            answered = summary.answered,
            correct = summary.correct,
            "Reporting session summary"
        );
        report(
            sink,
            LogEntry {
                participant_id: participant.clone(),
                kind: LogKind::Learn,
                data: serde_json::to_value(&summary)?,
            },
        )
        .await;
    }
    Ok(())
}

async fn knowledge_check(
    args: &Args,
    bank: QuestionBank,
    sink: Option<Arc<dyn LogSink>>,
) -> anyhow::Result<()> {
    let mut lines = spawn_line_reader();
    let mut stdout = std::io::stdout();
    let result = check::run_check(&bank, &mut lines, &mut stdout).await?;

    match (result, &sink, &args.participant) {
        (Some(result), Some(sink), Some(participant)) => {
            report(
                sink,
                LogEntry {
                    participant_id: participant.clone(),
                    kind: LogKind::Test,
                    data: serde_json::to_value(&result)?,
                },
            )
            .await;
        }
        (None, _, _) => info!("Knowledge check left without submitting"),
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let bank = QuestionBank::from_path(&args.questions).with_context(|| {
        format!("Failed to load questions from {}", args.questions.display())
    })?;
    info!(questions = bank.len(), api_url = %args.api_url, "Question bank loaded");

    let sink: Option<Arc<dyn LogSink>> = match &args.participant {
        Some(_) => Some(Arc::new(
            HttpLogSink::new(&args.api_url).context("Failed to build the log client")?,
        )),
        None => None,
    };

    match args.command {
        Command::Learn { mode, time_limit } => {
            learn(&args, bank, mode, Duration::from_secs(time_limit), sink).await
        }
        Command::Test => knowledge_check(&args, bank, sink).await,
    }
}

#[cfg(test)]
pub(crate) fn sample_bank() -> QuestionBank {
    QuestionBank::from_json_str(include_str!("../../../questions.json"))
        .expect("bundled question bank is valid")
}
