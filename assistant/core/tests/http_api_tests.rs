//! HTTP backend against a loopback server speaking canned HTTP/1.1

use std::sync::Arc;
use std::time::Duration;

use assistant_core::{
    ApiError, AssistantApi, ChatRequest, ChatService, ChatSettings, ChatState,
    CreateSessionRequest, FragmentReader, HttpAssistantApi, SendOutcome, SessionId,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================
// Loopback Server
// ============================================

/// One canned answer, written part by part
struct Canned {
    parts: Vec<Vec<u8>>,
}

impl Canned {
    fn json(status: u16, body: &str) -> Self {
        let head = format!(
            "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            reason(status),
            body.len()
        );
        Self {
            parts: vec![[head.as_bytes(), body.as_bytes()].concat()],
        }
    }

    fn chunked(chunks: &[&[u8]]) -> Self {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain;charset=UTF-8\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        let mut parts = vec![head.as_bytes().to_vec()];
        for chunk in chunks {
            let mut part = format!("{:x}\r\n", chunk.len()).into_bytes();
            part.extend_from_slice(chunk);
            part.extend_from_slice(b"\r\n");
            parts.push(part);
        }
        parts.push(b"0\r\n\r\n".to_vec());
        Self { parts }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Serve one canned answer per connection, returning the raw requests
async fn serve(answers: Vec<Canned>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let mut requests = Vec::new();
        for answer in answers {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            for part in answer.parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.shutdown().await;
        }
        requests
    });
    (format!("http://{addr}/"), task)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        raw.extend_from_slice(&buf[..n]);

        let Some(head_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&raw[..head_end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map_or(0, |v| v.trim().parse::<usize>().unwrap());
        if raw.len() >= head_end + 4 + body_len {
            return String::from_utf8_lossy(&raw).into_owned();
        }
    }
}

fn client(base_url: &str) -> HttpAssistantApi {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpAssistantApi::with_client(base_url, http, Duration::from_secs(5)).unwrap()
}

async fn read_all(mut reader: FragmentReader) -> String {
    let mut text = String::new();
    while let Some(fragment) = reader.next_fragment().await.unwrap() {
        text.push_str(&fragment);
    }
    text
}

// ============================================
// Endpoints
// ============================================

#[tokio::test]
async fn test_create_session_decodes_envelope() {
    let (base, server) = serve(vec![Canned::json(
        200,
        r#"{"success":true,"data":{"id":123,"title":"New chat","createdAt":1700000000000},"message":"ok"}"#,
    )])
    .await;
    let api = client(&base);

    let info = api
        .create_session(&CreateSessionRequest::new("user-1").with_title("New chat"))
        .await
        .unwrap();

    assert_eq!(info.id, "123");
    assert_eq!(info.title.as_deref(), Some("New chat"));
    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /api/ai/chat/new "));
    assert!(requests[0].contains(r#""userId":"user-1""#));
}

#[tokio::test]
async fn test_rejected_envelope_becomes_error() {
    let (base, _server) = serve(vec![Canned::json(
        200,
        r#"{"success":false,"data":null,"message":"unknown user"}"#,
    )])
    .await;
    let api = client(&base);

    let err = api
        .create_session(&CreateSessionRequest::new("ghost"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Rejected { message: Some(ref m) } if m == "unknown user"
    ));
}

#[tokio::test]
async fn test_chat_stream_yields_decoded_text() {
    // "wörld" with the two bytes of 'ö' in separate chunks
    let (base, server) = serve(vec![Canned::chunked(&[
        b"Hel",
        b"lo, w\xC3",
        b"\xB6rld",
    ])])
    .await;
    let api = client(&base);

    let request = ChatRequest::new(SessionId::new("s-1"), "Buy milk tomorrow").with_user("user-1");
    let body = api.open_chat_stream(&request).await.unwrap();
    let text = read_all(FragmentReader::new(body, 256)).await;

    assert_eq!(text, "Hello, wörld");
    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /api/ai/chat "));
    assert!(requests[0].contains(r#""sessionId":"s-1""#));
    assert!(requests[0].contains(r#""message":"Buy milk tomorrow""#));
}

#[tokio::test]
async fn test_chat_stream_http_error() {
    let (base, _server) = serve(vec![Canned::json(500, "boom")]).await;
    let api = client(&base);

    let err = api
        .open_chat_stream(&ChatRequest::new(SessionId::new("s-1"), "hi"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ApiError::Http { status: 500, ref body } if body == "boom"));
}

#[tokio::test]
async fn test_list_conversations_path_and_decoding() {
    let (base, server) = serve(vec![Canned::json(
        200,
        r#"{"success":true,"data":[{"id":"c-1","title":"Groceries","lastMessage":"Buy milk","messageCount":2}]}"#,
    )])
    .await;
    let api = client(&base);

    let conversations = api.list_conversations("user-1").await.unwrap();

    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].title, "Groceries");
    assert_eq!(conversations[0].message_count, 2);
    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("GET /api/conversation/list/user-1 "));
}

#[tokio::test]
async fn test_schedules_in_range_query() {
    let (base, server) = serve(vec![Canned::json(
        200,
        r#"{"success":true,"data":[{"id":7,"title":"Dentist","date":"2026-10-20","time":"15:00:00"}]}"#,
    )])
    .await;
    let api = client(&base);

    let schedules = api
        .schedules_in_range(
            "user-1",
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(schedules[0].id, "7");
    assert_eq!(schedules[0].time, "15:00:00");
    let requests = server.await.unwrap();
    assert!(requests[0]
        .starts_with("GET /api/schedule/range?userId=user-1&startDate=2026-10-01&endDate=2026-10-31 "));
}

#[tokio::test]
async fn test_delete_conversation_acknowledged() {
    let (base, server) = serve(vec![Canned::json(200, r#"{"success":true,"data":null}"#)]).await;
    let api = client(&base);

    api.delete_conversation("c-1").await.unwrap();

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("DELETE /api/conversation/delete/c-1 "));
}

#[tokio::test]
async fn test_history_not_found() {
    let (base, _server) = serve(vec![Canned::json(404, r#"{"error":"no such conversation"}"#)]).await;
    let api = client(&base);

    let err = api.conversation_messages("missing").await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status: 404, .. }));
}

// ============================================
// Full Send
// ============================================

#[tokio::test]
async fn test_send_over_http_creates_session_then_streams() {
    let (base, server) = serve(vec![
        Canned::json(200, r#"{"success":true,"data":{"id":"s-9"}}"#),
        Canned::chunked(&[b"Added ", b"\"Buy milk\" ", b"for tomorrow."]),
        Canned::json(200, r#"{"success":true,"data":[{"id":"s-9","title":"New chat"}]}"#),
    ])
    .await;
    let state = Arc::new(ChatState::new());
    let service = ChatService::new(
        Arc::new(client(&base)),
        Arc::clone(&state),
        ChatSettings::for_user("user-1"),
    );

    let outcome = service.send_message("Buy milk tomorrow").await;

    assert!(matches!(
        outcome,
        SendOutcome::Completed { ref content, warning: None, .. }
            if content == "Added \"Buy milk\" for tomorrow."
    ));
    assert_eq!(state.session_id(), Some(SessionId::new("s-9")));
    assert_eq!(state.conversations()[0].id, "s-9");

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /api/ai/chat/new "));
    assert!(requests[1].contains(r#""sessionId":"s-9""#));
    assert!(requests[2].starts_with("GET /api/conversation/list/user-1 "));
}
