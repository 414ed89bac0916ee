//! Shared test helpers: a scripted in-memory broadcast server

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use harbor_relay::client::UpstreamStream;
use harbor_relay::session::{spawn_session, SessionContext, SessionHandle};
use harbor_relay::{Connector, Notification, RelayConfig, StartStream};

/// How the fake server answers one connect attempt
#[derive(Debug, Clone)]
pub enum Reply {
    /// `HTTP/1.0 200 OK`, then take audio until the relay hangs up
    Accept,
    /// Never answer; take audio until the relay hangs up
    Silent,
    /// Send this status line and close
    Reject(&'static str),
    /// Refuse the TCP connection
    Refuse,
    /// Accept, take this many audio bytes, then close
    DropAfter(usize),
}

/// What the fake server saw on one connection
#[derive(Debug, Default)]
pub struct Attempt {
    /// Request line and headers, up to the blank line
    pub request: String,
    /// Audio bytes received after the request
    pub audio: Vec<u8>,
}

/// Connector answering each attempt from a script.
///
/// Once the script runs out, every further attempt gets `fallback`.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    attempts: Arc<Mutex<Vec<Arc<Mutex<Attempt>>>>>,
    connects: Mutex<usize>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Self::with_fallback(script, Reply::Refuse)
    }

    /// Connector that refuses every attempt
    pub fn refusing() -> Arc<Self> {
        Self::with_fallback(Vec::<Reply>::new(), Reply::Refuse)
    }

    pub fn with_fallback(script: impl IntoIterator<Item = Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: Arc::new(Mutex::new(Vec::new())),
            connects: Mutex::new(0),
        })
    }

    /// Connect calls made, refused ones included
    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }

    /// Request heads of the connections that were accepted at TCP level
    pub fn requests(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.lock().unwrap().request.clone())
            .collect()
    }

    /// Audio received on connection `index`
    pub fn audio(&self, index: usize) -> Vec<u8> {
        self.attempts.lock().unwrap()[index].lock().unwrap().audio.clone()
    }

    /// Wait until at least `count` connections have sent a full request head
    pub async fn wait_for_requests(&self, count: usize) -> Vec<String> {
        loop {
            let requests = self.requests();
            if requests.iter().filter(|r| !r.is_empty()).count() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until connection `index` has received at least `len` audio bytes
    pub async fn wait_for_audio(&self, index: usize, len: usize) -> Vec<u8> {
        loop {
            {
                let attempts = self.attempts.lock().unwrap();
                if let Some(attempt) = attempts.get(index) {
                    let attempt = attempt.lock().unwrap();
                    if attempt.audio.len() >= len {
                        return attempt.audio.clone();
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<UpstreamStream> {
        *self.connects.lock().unwrap() += 1;

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let Reply::Refuse = reply {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }

        let attempt = Arc::new(Mutex::new(Attempt::default()));
        self.attempts.lock().unwrap().push(Arc::clone(&attempt));

        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, reply, attempt));
        Ok(Box::new(client))
    }
}

async fn serve(mut server: DuplexStream, reply: Reply, attempt: Arc<Mutex<Attempt>>) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match server.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return,
        }
    }
    attempt.lock().unwrap().request = String::from_utf8_lossy(&head).into_owned();

    let limit = match reply {
        Reply::Accept => {
            let _ = server.write_all(b"HTTP/1.0 200 OK\r\nServer: Icecast 2.4.4\r\n\r\n").await;
            usize::MAX
        }
        Reply::Silent => usize::MAX,
        Reply::Reject(status) => {
            let _ = server.write_all(format!("{}\r\n\r\n", status).as_bytes()).await;
            return;
        }
        Reply::DropAfter(n) => {
            let _ = server.write_all(b"HTTP/1.0 200 OK\r\n\r\n").await;
            n
        }
        Reply::Refuse => return,
    };

    let mut buf = [0u8; 4096];
    loop {
        match server.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let mut attempt = attempt.lock().unwrap();
                attempt.audio.extend_from_slice(&buf[..n]);
                if attempt.audio.len() >= limit {
                    return;
                }
            }
        }
    }
}

pub fn start_stream(user: &str, password: &str) -> StartStream {
    StartStream {
        user: user.to_string(),
        password: password.to_string(),
        mime: "audio/mpeg".to_string(),
        mount: None,
        ice_metadata: None,
    }
}

/// Spawn a session against `connector`
pub fn spawn(
    config: RelayConfig,
    connector: Arc<ScriptedConnector>,
) -> (SessionHandle, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let context = SessionContext::from_start(1, 1, start_stream("source", "hackme"), &config);
    let handle = spawn_session(context, Arc::new(config), connector, tx);
    (handle, rx)
}

/// Next notification, failing the test if none arrives within a minute
pub async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("no notification within 60s")
        .expect("notification channel closed")
}

/// Skip notifications until one matches
pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<Notification>, mut pred: F) -> Vec<Notification>
where
    F: FnMut(&Notification) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let notification = next(rx).await;
        let done = pred(&notification);
        seen.push(notification);
        if done {
            return seen;
        }
    }
}

/// `n` chunks of `len` bytes, chunk `i` filled with byte `i` (1-based)
pub fn chunks(n: u8, len: usize) -> Vec<bytes::Bytes> {
    (1..=n).map(|i| bytes::Bytes::from(vec![i; len])).collect()
}
