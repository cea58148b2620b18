//! Test doubles: a one-shot local HTTP server and stub providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::model::{CompletionProvider, CompletionReply, DispatchError};
use crate::prompt::CompletionRequest;
use crate::search::{SearchError, SearchProvider, SearchResultBundle};

pub struct CannedServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl CannedServer {
    /// Waits for the single request and returns it as raw text (head and body).
    pub async fn request(self) -> String {
        self.handle.await.expect("canned server task completes")
    }

    pub fn abort(self) {
        self.handle.abort();
    }
}

pub async fn serve_once(status: u16, body: &str) -> CannedServer {
    serve_once_after(status, body, Duration::ZERO).await
}

/// Like [`serve_once`] but holds the response back for `delay`.
pub async fn serve_once_after(status: u16, body: &str, delay: Duration) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let request = read_request(&mut socket).await;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason(status),
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        request
    });

    CannedServer {
        url: format!("http://{}", addr),
        handle,
    }
}

/// Base URL of a local port with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.expect("read request");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

pub enum SearchBehavior {
    Bundle(SearchResultBundle),
    Fail(&'static str),
}

pub struct StubSearch {
    behavior: SearchBehavior,
    calls: AtomicUsize,
}

impl StubSearch {
    pub fn new(behavior: SearchBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(
        &self,
        query: &str,
        _result_count: usize,
    ) -> Result<SearchResultBundle, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SearchBehavior::Bundle(bundle) => Ok(SearchResultBundle {
                query: query.to_string(),
                ..bundle.clone()
            }),
            SearchBehavior::Fail(text) => Err(SearchError::Provider(text.to_string())),
        }
    }
}

/// Replies with the content of the last message it was sent, optionally after a delay.
#[derive(Default)]
pub struct EchoCompletion {
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Duration,
}

impl EchoCompletion {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for EchoCompletion {
    async fn dispatch(
        &self,
        request: &CompletionRequest,
        _api_key: &str,
    ) -> Result<CompletionReply, DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = request
            .last_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(CompletionReply {
            content,
            model: None,
        })
    }
}

/// Always fails with a rate-limit error.
pub struct FailingCompletion;

#[async_trait]
impl CompletionProvider for FailingCompletion {
    async fn dispatch(
        &self,
        _request: &CompletionRequest,
        _api_key: &str,
    ) -> Result<CompletionReply, DispatchError> {
        Err(DispatchError::RateLimited("HTTP 429: quota".to_string()))
    }
}
