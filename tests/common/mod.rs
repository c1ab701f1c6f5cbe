//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use peer_selector::net::{ConnectError, ConnectionFactory};

/// A request received by the mock registry.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or("")
    }
}

/// What the mock registry sends back for one request.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    /// Leave the body unterminated and hold the connection until the client
    /// hangs up, like a streaming endpoint.
    pub keep_open: bool,
}

impl MockReply {
    pub fn stream(body: String) -> Self {
        Self {
            status: 200,
            body,
            keep_open: true,
        }
    }
}

impl From<(u16, String)> for MockReply {
    fn from((status, body): (u16, String)) -> Self {
        Self {
            status,
            body,
            keep_open: false,
        }
    }
}

/// Start a programmable HTTP registry on an ephemeral port.
///
/// Every request gets one reply. Unless the reply is a stream, the
/// connection is closed right after it.
pub async fn start_mock_registry<F, R>(handler: F) -> SocketAddr
where
    F: Fn(MockRequest) -> R + Send + Sync + 'static,
    R: Into<MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let Some(request) = read_request(&mut reader).await else {
                            return;
                        };

                        let reply: MockReply = handler(request).into();
                        let status_text = match reply.status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let mut socket = reader.into_inner();
                        if reply.keep_open {
                            let response = format!(
                                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                                status_text, reply.body
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.flush().await;
                            let mut scratch = [0u8; 512];
                            while let Ok(n) = socket.read(&mut scratch).await {
                                if n == 0 {
                                    break;
                                }
                            }
                            return;
                        }

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            reply.body.len(),
                            reply.body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request(reader: &mut BufReader<tokio::net::TcpStream>) -> Option<MockRequest> {
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let (name, value) = (name.trim().to_string(), value.trim().to_string());
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((name, value));
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;

    Some(MockRequest { method, path, headers, body })
}

/// Start a TCP listener that accepts and holds connections.
pub async fn start_peer() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Connection factory that records every dial and never touches the network.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    pub dials: Mutex<Vec<(String, String, Duration)>>,
    unreachable: Vec<String>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail dials to these addresses with "connection refused".
    pub fn with_unreachable(addresses: &[&str]) -> Self {
        Self {
            dials: Mutex::new(Vec::new()),
            unreachable: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dials.lock().unwrap().iter().map(|(_, a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl ConnectionFactory for RecordingFactory {
    type Connection = String;

    async fn open(&self, network: &str, address: &str, dial_timeout: Duration) -> Result<String, ConnectError> {
        self.dials
            .lock()
            .unwrap()
            .push((network.to_string(), address.to_string(), dial_timeout));

        if self.unreachable.iter().any(|a| a == address) {
            return Err(ConnectError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)));
        }
        Ok(format!("{}@{}", network, address))
    }
}
