#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use coze_api::{CozeApiClient, CozeApiConfig, PollPolicy};

#[derive(Clone)]
pub struct ResponseChunk {
    pub delay_ms: u64,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ResponseChunk>,
    },
    /// Send headers and the given chunks, then hang until the client gives up.
    Stall {
        chunks: Vec<ResponseChunk>,
    },
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body should be JSON")
    }
}

/// Local HTTP/1.1 server answering each request with the next scripted response.
pub struct ScriptedServer {
    pub base_url: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let requests = Arc::clone(&requests);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, requests).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            requests,
            handle,
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn client(&self) -> CozeApiClient {
        self.client_with(|config| config)
    }

    pub fn client_with(&self, configure: impl FnOnce(CozeApiConfig) -> CozeApiConfig) -> CozeApiClient {
        let config = CozeApiConfig::new("pat-test")
            .with_base_url(&self.base_url)
            .with_default_bot_id("bot-1")
            .with_max_retries(0)
            .with_poll_policy(PollPolicy::new(Duration::from_millis(5), 30));
        CozeApiClient::new(configure(config)).expect("client")
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

pub fn response_envelope(data: serde_json::Value) -> ScriptedResponse {
    response_json(
        200,
        &serde_json::json!({"code": 0, "msg": "", "data": data}).to_string(),
    )
}

/// Event stream sent as one chunk per record.
pub fn response_sse(records: &[(&str, &str)]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: records
            .iter()
            .map(|(event, data)| ResponseChunk {
                delay_ms: 0,
                bytes: sse_record(event, data).into_bytes(),
            })
            .collect(),
    }
}

pub fn response_raw_sse(body: &[u8], chunk_size: usize) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: body
            .chunks(chunk_size.max(1))
            .map(|bytes| ResponseChunk {
                delay_ms: 0,
                bytes: bytes.to_vec(),
            })
            .collect(),
    }
}

pub fn sse_record(event: &str, data: &str) -> String {
    format!("event:{event}\ndata:{data}\n\n")
}

pub fn chat_json(status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chat-1",
        "conversation_id": "conv-1",
        "bot_id": "bot-1",
        "status": status,
        "created_at": 1718000000,
    })
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let request = match read_request(&mut socket).await {
        Ok(Some(request)) => request,
        _ => return,
    };
    requests.lock().expect("requests lock").push(request);

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"code":500,"msg":"unexpected request"}"#));

    let (status, content_type, chunks, stall) = match response {
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => (status, content_type, chunks, false),
        ScriptedResponse::Stall { chunks } => (200, "text/event-stream", chunks, true),
    };

    let headers = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        status_reason(status),
        content_type,
    );
    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    for chunk in chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
        let _ = socket.flush().await;
    }

    if stall {
        sleep(Duration::from_secs(30)).await;
        return;
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Option<RecordedRequest>> {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        raw.extend_from_slice(&buffer[..n]);
        if let Some(position) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buffer[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_owned();
    let target = request_line.next().unwrap_or_default().to_owned();
    let body_end = raw.len().min(header_end + content_length);

    Ok(Some(RecordedRequest {
        method,
        target,
        headers: head.to_ascii_lowercase(),
        body: String::from_utf8_lossy(&raw[header_end..body_end]).into_owned(),
    }))
}
