//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use blitz_fetch::config::EngineConfig;
use blitz_fetch::transport::{Exchange, Target, Transport, TransportError};

/// What a scripted transport does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Body(u16, &'static str),
    RetryAfter(u16, &'static str),
    Error(TransportError),
    /// Never answer.
    Hang,
    Panic(&'static str),
}

type Script = Box<dyn Fn(&Target, u32) -> Reply + Send + Sync>;

/// In-process transport answering from a script of `(target, call number)`.
/// Call numbers start at 1 per distinct target URL.
pub struct FakeTransport {
    script: Script,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    total: AtomicU32,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTransport {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&Target, u32) -> Reply + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, script)
    }

    pub fn with_delay<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&Target, u32) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay,
            calls: Mutex::new(HashMap::new()),
            total: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Always 200 with an empty JSON object.
    pub fn ok() -> Arc<Self> {
        Self::new(|_, _| Reply::Body(200, "{}"))
    }

    pub fn calls_for(&self, target: &Target) -> u32 {
        let calls = self.calls.lock().unwrap();
        calls.get(target.to_url().as_str()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently executing calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, target: &Target) -> Result<Exchange, TransportError> {
        let start = Instant::now();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(target.to_url().to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.total.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match (self.script)(target, call) {
            Reply::Status(status) => Ok(Exchange::new(status, Vec::new(), start.elapsed())),
            Reply::Body(status, body) => Ok(Exchange::new(status, body, start.elapsed())),
            Reply::RetryAfter(status, value) => {
                Ok(Exchange::new(status, Vec::new(), start.elapsed()).with_retry_after(value))
            }
            Reply::Error(err) => Err(err),
            Reply::Hang => std::future::pending().await,
            Reply::Panic(message) => panic!("{}", message),
        }
    }
}

/// Target `http://fake.test/item/{n}`.
pub fn target(n: u64) -> Target {
    Target::parse(&format!("http://fake.test/item/{}", n)).unwrap()
}

/// `(n, target(n))` for every `n` in `range`.
pub fn requests(range: std::ops::Range<u64>) -> Vec<(u64, Target)> {
    range.map(|n| (n, target(n))).collect()
}

/// A config that paces nothing noticeably and retries almost immediately.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.governor.min_rate = 1.0;
    config.governor.max_rate = 10_000.0;
    config.governor.initial_rate = 10_000.0;
    config.governor.burst = 1_000.0;
    config.governor.max_concurrency = 64;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 10;
    config.retry.jitter = 0.0;
    config.transport.timeout_ms = 2_000;
    config
}

/// A canned HTTP response from the mock backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub retry_after: Option<String>,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn status_line(status: u16) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Status",
    };
    format!("{} {}", status, reason)
}

/// Start a programmable raw-TCP HTTP backend. Each connection gets one
/// response produced by `f`.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let response = f().await;
                        if !response.delay.is_zero() {
                            tokio::time::sleep(response.delay).await;
                        }

                        let mut head = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\n",
                            status_line(response.status)
                        );
                        if let Some(value) = &response.retry_after {
                            head.push_str(&format!("Retry-After: {}\r\n", value));
                        }
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            response.body.len()
                        ));

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    return;
                }
            }
        }
    }
}
