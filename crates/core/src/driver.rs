//! Session Driver
//!
//! Runs a [`SessionController`] against a live [`TutorClient`]: learner
//! inputs, the in-flight tutor reply and the countdown are multiplexed in one
//! `select!` loop, and every visible change is pushed to the front end as a
//! [`SessionUpdate`].

use crate::attempt::AttemptState;
use crate::chat::TutorRequest;
use crate::question::Question;
use crate::session::{Navigation, SessionController, SessionSummary};
use crate::tutor_client::{TutorClient, TutorEvent, TutorEventStream, exchange};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// Something the learner did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnerInput {
    /// Picked an option key for the current question.
    Select(String),
    /// Typed a chat message.
    Reply(String),
    Next,
    Back,
    /// Mode A: asked why the final answer was wrong.
    Explain,
    Quit,
}

/// What the front end should render for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub index: usize,
    pub total: usize,
    pub question: Question,
    pub state: AttemptState,
    /// Inputs are disabled; the recorded answer is shown read-only.
    pub review: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Question(QuestionView),
    /// Feedback on the learner's last choice.
    Answered { correct: bool, state: AttemptState },
    /// A transient advisory; nothing changed.
    Notice { message: String },
    /// Signals the beginning of a streamed tutor reply.
    ResponseStart,
    ResponseChunk { chunk: String },
    ResponseEnd,
    /// The reply failed; `message` is the fallback shown instead.
    ResponseFailed { message: String },
    Tick { remaining_secs: u64 },
    Finished(SessionSummary),
}

struct Outbox(mpsc::Sender<SessionUpdate>);

impl Outbox {
    async fn emit(&self, update: SessionUpdate) {
        if self.0.send(update).await.is_err() {
            debug!("Front end went away; dropping update");
        }
    }

    async fn question(&self, controller: &SessionController) {
        let index = controller.current_index();
        if let Some(question) = controller.current_question() {
            self.emit(SessionUpdate::Question(QuestionView {
                index,
                total: controller.bank().len(),
                question: question.clone(),
                state: controller.attempt_state(index),
                review: controller.is_review(index),
            }))
            .await;
        }
    }

    async fn notice(&self, message: impl ToString) {
        self.emit(SessionUpdate::Notice {
            message: message.to_string(),
        })
        .await;
    }
}

/// Waits for the next reply event, or forever when nothing is in flight.
async fn next_event(in_flight: &mut Option<TutorEventStream>) -> Option<TutorEvent> {
    match in_flight {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

/// Drives one session to completion.
///
/// Ends when the learner finishes the last question, the countdown reaches
/// zero, the learner quits or the input channel closes. The final
/// [`SessionSummary`] is emitted last, and the controller is handed back.
#[instrument(skip_all, fields(mode = %controller.mode(), time_limit_secs = time_limit.as_secs()))]
pub async fn run_session(
    mut controller: SessionController,
    client: Arc<dyn TutorClient>,
    mut inputs: mpsc::Receiver<LearnerInput>,
    updates: mpsc::Sender<SessionUpdate>,
    time_limit: Duration,
) -> SessionController {
    let outbox = Outbox(updates);
    let deadline = Instant::now() + time_limit;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Option<TutorEventStream> = None;

    info!(questions = controller.bank().len(), "Session started");
    outbox.question(&controller).await;

    loop {
        tokio::select! {
            event = next_event(&mut in_flight) => {
                match event {
                    Some(TutorEvent::Fragment(chunk)) => {
                        if controller.apply_fragment(&chunk) {
                            outbox.emit(SessionUpdate::ResponseChunk { chunk }).await;
                        }
                    }
                    Some(TutorEvent::Closed) | None => {
                        in_flight = None;
                        controller.close_reply();
                        outbox.emit(SessionUpdate::ResponseEnd).await;
                    }
                    Some(TutorEvent::Failed(reason)) => {
                        in_flight = None;
                        info!(%reason, "Tutor reply failed; showing fallback");
                        controller.fail_reply();
                        let message = controller
                            .chat()
                            .last()
                            .map(|m| m.content.clone())
                            .unwrap_or_default();
                        outbox.emit(SessionUpdate::ResponseFailed { message }).await;
                    }
                }
            }
            input = inputs.recv() => {
                let Some(input) = input else {
                    info!("Input channel closed; ending session");
                    break;
                };
                if input == LearnerInput::Quit {
                    info!("Learner quit the session");
                    break;
                }
                if let Some(request) = handle_input(&mut controller, input, &outbox).await {
                    // The single-flight lock guarantees nothing else is streaming.
                    in_flight = Some(exchange(client.clone(), request));
                    controller.begin_reply();
                    outbox.emit(SessionUpdate::ResponseStart).await;
                }
            }
            _ = ticker.tick() => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                outbox.emit(SessionUpdate::Tick { remaining_secs: remaining.as_secs() }).await;
                if remaining.is_zero() {
                    info!("Time limit reached");
                    controller.expire();
                }
            }
        }

        if controller.is_finished() {
            break;
        }
    }

    // A reply still in flight is dropped; the controller would discard it.
    drop(in_flight);
    outbox.emit(SessionUpdate::Finished(controller.summary())).await;
    controller
}

/// Applies one learner input; returns the tutor request to issue, if any.
async fn handle_input(
    controller: &mut SessionController,
    input: LearnerInput,
    outbox: &Outbox,
) -> Option<TutorRequest> {
    match input {
        LearnerInput::Select(key) => match controller.submit_answer(&key) {
            Ok(request) => {
                let index = controller.current_index();
                let state = controller.attempt_state(index);
                outbox
                    .emit(SessionUpdate::Answered {
                        correct: state.is_correct(),
                        state,
                    })
                    .await;
                request
            }
            Err(notice) => {
                outbox.notice(notice).await;
                None
            }
        },
        LearnerInput::Reply(text) => match controller.receive_user_reply(&text) {
            Ok(request) => Some(request),
            Err(notice) => {
                outbox.notice(notice).await;
                None
            }
        },
        LearnerInput::Next => {
            match controller.request_next() {
                Ok(Navigation::Moved(_)) => outbox.question(controller).await,
                Ok(Navigation::Finished) => {}
                Err(notice) => outbox.notice(notice).await,
            }
            None
        }
        LearnerInput::Back => {
            match controller.request_back() {
                Ok(_) => outbox.question(controller).await,
                Err(notice) => outbox.notice(notice).await,
            }
            None
        }
        LearnerInput::Explain => match controller.request_explanation() {
            Ok(request) => Some(request),
            Err(notice) => {
                outbox.notice(notice).await;
                None
            }
        },
        LearnerInput::Quit => None,
    }
}
