use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tutor_core::chat::{ChatMessage, FALLBACK_MESSAGE, TutorRequest};
use tutor_core::driver::{LearnerInput, SessionUpdate, run_session};
use tutor_core::policy::SessionMode;
use tutor_core::question::QuestionBank;
use tutor_core::session::SessionController;
use tutor_core::tutor_client::{HttpTutorClient, TutorClient, TutorEvent, TutorReply, exchange};

fn request() -> TutorRequest {
    TutorRequest {
        messages: vec![ChatMessage::learner("Why is it B?")],
        context: None,
        mode: SessionMode::B,
    }
}

/// Reads until the headers and the announced body have arrived.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}

/// Serves one connection: reads the request, then writes `pieces` one at a
/// time. With no pieces the connection stays open and silent.
async fn serve_once(pieces: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        if pieces.is_empty() {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return;
        }
        for piece in pieces {
            if socket.write_all(&piece).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}")
}

fn response(status: &str, content_type: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

fn chunk(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", bytes.len()).into_bytes();
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
    out
}

async fn events_from(base_url: &str) -> Vec<TutorEvent> {
    let client = HttpTutorClient::new(base_url).unwrap();
    exchange(Arc::new(client), request()).collect().await
}

#[tokio::test]
async fn test_json_reply_is_one_complete_message() {
    let base = serve_once(vec![response(
        "200 OK",
        "application/json",
        r#"{"message": {"role": "assistant", "content": "Great job!"}}"#,
    )])
    .await;

    let client = HttpTutorClient::new(&base).unwrap();
    match client.send(&request()).await.unwrap() {
        TutorReply::Complete(text) => assert_eq!(text, "Great job!"),
        other => panic!("expected a complete reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chunked_text_is_reassembled_in_order() {
    let text = "Why pick 안녕?";
    let bytes = text.as_bytes();
    // Cut inside the first multi-byte character.
    let cut = "Why pick ".len() + 1;
    let base = serve_once(vec![
        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n"
            .to_vec(),
        chunk(&bytes[..cut]),
        chunk(&bytes[cut..]),
        b"0\r\n\r\n".to_vec(),
    ])
    .await;

    let events = events_from(&base).await;

    assert_eq!(events.last(), Some(&TutorEvent::Closed));
    let assembled: String = events
        .iter()
        .filter_map(|event| match event {
            TutorEvent::Fragment(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(assembled, text);
}

#[tokio::test]
async fn test_error_statuses_fail_the_exchange() {
    for status in ["400 Bad Request", "500 Internal Server Error"] {
        let base = serve_once(vec![response(
            status,
            "application/json",
            r#"{"message": "nope"}"#,
        )])
        .await;

        let events = events_from(&base).await;

        assert_eq!(events.len(), 1, "{status}: {events:?}");
        let code = &status[..3];
        assert!(
            matches!(&events[0], TutorEvent::Failed(reason) if reason.contains(code)),
            "{status}: {events:?}"
        );
    }
}

#[tokio::test]
async fn test_silent_service_times_out_instead_of_hanging() {
    let base = serve_once(Vec::new()).await;
    let client = HttpTutorClient::with_timeout(&base, Duration::from_millis(300)).unwrap();

    let events = tokio::time::timeout(
        Duration::from_secs(10),
        exchange(Arc::new(client), request()).collect::<Vec<_>>(),
    )
    .await
    .expect("exchange should end on its own");

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TutorEvent::Failed(_)));
}

#[tokio::test]
async fn test_session_shows_fallback_and_unlocks_after_service_error() {
    let base = serve_once(vec![response(
        "503 Service Unavailable",
        "text/plain",
        "down",
    )])
    .await;
    let bank = QuestionBank::from_json_str(
        r#"{"passage": "Mina bought bananas.", "questions": [
            {"id": 1, "question": "What did Mina buy?",
             "options": {"A": "Apples", "B": "Bananas"}, "correct_option": "B"}
        ]}"#,
    )
    .unwrap();
    let client = Arc::new(HttpTutorClient::new(&base).unwrap());
    let (input_tx, input_rx) = mpsc::channel(8);
    let (update_tx, mut update_rx) = mpsc::channel(64);
    let handle = tokio::spawn(run_session(
        SessionController::new(bank, SessionMode::B),
        client,
        input_rx,
        update_tx,
        Duration::from_secs(600),
    ));

    input_tx.send(LearnerInput::Select("A".into())).await.unwrap();
    let fallback = loop {
        match update_rx.recv().await.unwrap() {
            SessionUpdate::ResponseFailed { message } => break message,
            SessionUpdate::ResponseEnd => panic!("reply should have failed"),
            _ => {}
        }
    };
    assert_eq!(fallback, FALLBACK_MESSAGE);

    input_tx.send(LearnerInput::Quit).await.unwrap();
    while update_rx.recv().await.is_some() {}
    let controller = handle.await.unwrap();
    assert!(!controller.is_busy());
    assert_eq!(controller.chat().last().unwrap().content, FALLBACK_MESSAGE);
}
