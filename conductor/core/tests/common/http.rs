//! One-shot HTTP fixture for exercising the real adapters
//!
//! Serves canned responses in order, one per connection, and keeps the raw
//! text of every request it read.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A canned HTTP response
#[derive(Clone, Debug)]
pub struct CannedResponse {
    status: u16,
    content_type: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
    /// Byte pieces sent with chunked transfer encoding, one write each
    chunks: Vec<Vec<u8>>,
    /// Bytes promised by `content-length` but never sent
    missing: usize,
}

impl CannedResponse {
    /// `200 OK` server-sent events, one `data:` line per payload
    pub fn sse(payloads: &[&str]) -> Self {
        let body = payloads
            .iter()
            .map(|p| format!("data: {p}\n\n"))
            .collect::<String>();
        Self {
            status: 200,
            content_type: "text/event-stream",
            headers: Vec::new(),
            body,
            chunks: Vec::new(),
            missing: 0,
        }
    }

    /// Newline-delimited JSON
    pub fn ndjson(lines: &[&str]) -> Self {
        Self {
            status: 200,
            content_type: "application/x-ndjson",
            headers: Vec::new(),
            body: lines.iter().map(|l| format!("{l}\n")).collect(),
            chunks: Vec::new(),
            missing: 0,
        }
    }

    /// A JSON body with the given status
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body: body.to_string(),
            chunks: Vec::new(),
            missing: 0,
        }
    }

    /// Newline-delimited JSON delivered in the given byte pieces
    ///
    /// The pieces are written separately with a pause between them, so a
    /// split may fall anywhere, including inside a UTF-8 character.
    pub fn ndjson_chunked(pieces: Vec<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "application/x-ndjson",
            headers: Vec::new(),
            body: String::new(),
            chunks: pieces,
            missing: 0,
        }
    }

    /// Close the connection before the announced body length is reached
    pub fn truncated(mut self) -> Self {
        self.missing = 1024;
        self
    }

    /// Add a response header
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    fn head(&self) -> String {
        let reason = if self.status < 400 { "OK" } else { "Error" };
        let length = if self.chunks.is_empty() {
            format!("content-length: {}", self.body.len() + self.missing)
        } else {
            "transfer-encoding: chunked".to_string()
        };
        let mut head = format!(
            "HTTP/1.1 {} {reason}\r\ncontent-type: {}\r\n{length}\r\nconnection: close\r\n",
            self.status, self.content_type,
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        head
    }

    async fn write_to(&self, socket: &mut TcpStream) -> std::io::Result<()> {
        socket.write_all(self.head().as_bytes()).await?;
        if self.chunks.is_empty() {
            return socket.write_all(self.body.as_bytes()).await;
        }
        for piece in &self.chunks {
            socket
                .write_all(format!("{:x}\r\n", piece.len()).as_bytes())
                .await?;
            socket.write_all(piece).await?;
            socket.write_all(b"\r\n").await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        socket.write_all(b"0\r\n\r\n").await
    }
}

/// Local server answering with canned responses
pub struct CannedServer {
    /// `http://127.0.0.1:<port>`
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    /// Start serving `responses`, one per accepted connection
    pub async fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                seen.lock().push(request);
                let _ = response.write_to(&mut socket).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    /// Raw requests received so far (header names lower-cased by the client)
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

/// An address nothing listens on
pub async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
