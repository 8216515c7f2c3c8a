use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tutor_core::attempt::AttemptState;
use tutor_core::chat::{ChatContext, TutorRequest};
use tutor_core::driver::{LearnerInput, SessionUpdate, run_session};
use tutor_core::policy::SessionMode;
use tutor_core::question::QuestionBank;
use tutor_core::session::{FinishReason, Navigation, SessionController};
use tutor_core::tutor_client::{TutorClient, TutorClientError, TutorReply};

const BANK: &str = r#"{
    "passage": "Mina bought bananas at the market.",
    "questions": [
        {"id": 1, "category": "detail", "question": "What did Mina buy?",
         "options": {"A": "Apples", "B": "Bananas", "C": "Bread", "D": "Beans"},
         "correct_option": "B", "explanation": "The passage says bananas."},
        {"id": 2, "category": "detail", "question": "Where did she go?",
         "options": {"A": "School", "B": "Market"},
         "correct_option": "B"}
    ]
}"#;

/// Records every request and answers each with a fixed reply.
#[derive(Default)]
struct RecordingTutor {
    requests: Mutex<Vec<TutorRequest>>,
}

#[async_trait]
impl TutorClient for RecordingTutor {
    async fn send(&self, request: &TutorRequest) -> Result<TutorReply, TutorClientError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(TutorReply::Complete(format!("reply to {}", request.context_type())))
    }
}

fn bank() -> QuestionBank {
    QuestionBank::from_json_str(BANK).unwrap()
}

#[test]
fn test_mode_b_walkthrough_on_controller() {
    let mut session = SessionController::new(bank(), SessionMode::B);
    let mut frontier = vec![session.max_index_reached()];

    let request = session.submit_answer("A").unwrap().unwrap();
    assert!(matches!(request.context, Some(ChatContext::FailureReflection { ref user_answer, .. }) if user_answer == "Apples"));
    session.apply_fragment("Why apples?");
    session.close_reply();
    frontier.push(session.max_index_reached());

    session.receive_user_reply("They were red").unwrap();
    session.close_reply();
    assert!(matches!(session.attempt_state(0), AttemptState::Retrying { .. }));

    session.submit_answer("C").unwrap().unwrap();
    session.close_reply();
    assert!(matches!(session.attempt_state(0), AttemptState::ExplanationPending { .. }));
    frontier.push(session.max_index_reached());

    session.receive_user_reply("Because the text says bananas").unwrap();
    session.close_reply();
    frontier.push(session.max_index_reached());

    assert_eq!(session.request_next(), Ok(Navigation::Moved(1)));
    let request = session.submit_answer("B").unwrap().unwrap();
    assert_eq!(request.context_type(), "success_feedback");
    assert!(request.messages.is_empty());
    session.close_reply();
    frontier.push(session.max_index_reached());

    assert_eq!(session.request_next(), Ok(Navigation::Finished));
    assert!(frontier.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(frontier.last(), Some(&2));

    let summary = session.summary();
    assert_eq!(summary.correct, 1);
    assert_eq!(summary.answers[0].attempts, 2);
    assert_eq!(summary.finish_reason, Some(FinishReason::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_driver_issues_one_request_per_gate() {
    let tutor = Arc::new(RecordingTutor::default());
    let (input_tx, input_rx) = mpsc::channel(16);
    let (update_tx, mut update_rx) = mpsc::channel(256);
    let handle = tokio::spawn(run_session(
        SessionController::new(bank(), SessionMode::B),
        tutor.clone(),
        input_rx,
        update_tx,
        Duration::from_secs(600),
    ));

    let script = [
        LearnerInput::Select("A".into()),
        LearnerInput::Reply("I misread it".into()),
        LearnerInput::Select("B".into()),
        LearnerInput::Next,
        LearnerInput::Back,
        LearnerInput::Next,
        LearnerInput::Select("B".into()),
        LearnerInput::Next,
    ];
    // Each step waits for the tutor to go quiet before the next input, so the
    // busy lock never rejects anything.
    for input in script {
        let expects_reply = matches!(input, LearnerInput::Select(_) | LearnerInput::Reply(_));
        input_tx.send(input).await.unwrap();
        if expects_reply {
            loop {
                match update_rx.recv().await.unwrap() {
                    SessionUpdate::ResponseEnd => break,
                    SessionUpdate::Notice { message } => panic!("unexpected notice: {message}"),
                    _ => {}
                }
            }
        }
    }

    let mut summary = None;
    while let Some(update) = update_rx.recv().await {
        if let SessionUpdate::Finished(s) = update {
            summary = Some(s);
        }
    }
    let summary = summary.expect("session should finish");
    assert_eq!(summary.correct, 2);
    assert_eq!(summary.longest_streak, 2);

    let controller = handle.await.unwrap();
    assert_eq!(controller.finish_reason(), Some(FinishReason::Completed));

    let contexts: Vec<&str> = tutor
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(TutorRequest::context_type)
        .collect();
    // Review navigation (Back, Next) added no requests.
    assert_eq!(
        contexts,
        vec!["failure_reflection_1", "general_chat", "success_feedback", "success_feedback"]
    );
}
