//! Shared fixtures for tests: configs, SSE bodies and a tiny HTTP server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::config::{Channel, Config};

pub const TEST_CHANNEL_ID: &str = "test";
pub const CHAT_PATH: &str = "/v1/chat/completions";

/// Config with a single selected channel pointing at `api_url`.
pub fn channel_config(api_url: &str, api_key: &str) -> Config {
    Config {
        channels: vec![Channel {
            id: TEST_CHANNEL_ID.to_string(),
            name: "Test".to_string(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: "test-model".to_string(),
            is_default: false,
        }],
        current_channel_id: TEST_CHANNEL_ID.to_string(),
        model: None,
        ..Config::empty()
    }
}

pub fn sse_delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "choices": [{"delta": {"content": content}, "index": 0, "finish_reason": null}]
        })
    )
}

/// An SSE body carrying `deltas` followed by the sentinel frame.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body: String = deltas.iter().map(|delta| sse_delta(delta)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn http_response(status: u16, content_type: &str, body: &str) -> MockReply {
    MockReply {
        raw: format!(
            "HTTP/1.1 {status} {}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            reason_phrase(status),
            body.len()
        ),
        hold_open: false,
    }
}

pub fn sse_response(body: &str) -> MockReply {
    http_response(200, "text/event-stream", body)
}

/// Headers plus `partial_body`, then the connection stays open until the client hangs up.
pub fn stalled_sse_response(partial_body: &str) -> MockReply {
    MockReply {
        raw: format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{partial_body}"
        ),
        hold_open: true,
    }
}

/// Declares a longer body than it sends, so the client sees the stream break.
pub fn truncated_sse_response(partial_body: &str) -> MockReply {
    MockReply {
        raw: format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{partial_body}",
            partial_body.len() + 64
        ),
        hold_open: false,
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// URL on localhost where nothing is listening.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    drop(listener);
    format!("http://{addr}{CHAT_PATH}")
}

pub struct MockReply {
    raw: String,
    hold_open: bool,
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serves one canned reply per incoming connection, in order.
pub struct MockServer {
    addr: std::net::SocketAddr,
    task: JoinHandle<Result<Vec<CapturedRequest>, String>>,
}

impl MockServer {
    pub async fn spawn(replies: Vec<MockReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");

        let task = tokio::spawn(async move {
            let mut captured = Vec::new();
            for reply in replies {
                let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
                captured.push(read_http_request(&mut stream).await?);
                stream
                    .write_all(reply.raw.as_bytes())
                    .await
                    .map_err(|err| err.to_string())?;
                stream.flush().await.map_err(|err| err.to_string())?;
                if reply.hold_open {
                    wait_for_hangup(&mut stream).await;
                }
            }
            Ok(captured)
        });

        Self { addr, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}{CHAT_PATH}", self.addr)
    }

    /// Wait for every reply to be served and return the requests seen.
    pub async fn finish(self) -> Vec<CapturedRequest> {
        self.task
            .await
            .expect("mock server task should join")
            .expect("mock server should succeed")
    }
}

async fn wait_for_hangup(stream: &mut TcpStream) {
    let mut scratch = [0_u8; 256];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
