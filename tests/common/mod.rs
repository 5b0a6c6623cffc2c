//! Shared test utilities: a local feed server, a scripted history source and
//! a one-shot HTTP responder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use candlesync::history::HistorySource;
use candlesync::models::{Candle, InstrumentKey, Timeframe};
use candlesync::orchestrator::Orchestrator;
use candlesync::{Result, SyncError};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tungstenite::Message;

/// Upper bound for any single wait in these tests.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One-minute key for `symbol`.
pub fn key(symbol: &str) -> InstrumentKey {
    InstrumentKey::from_symbol(symbol, Timeframe::from_millis(60_000).unwrap()).unwrap()
}

/// A flat bar at `time` closing at `close`.
pub fn bar(time: i64, close: Decimal) -> Candle {
    Candle {
        time,
        open: close,
        high: close,
        low: close,
        close,
        volume: Some(Decimal::ONE),
    }
}

/// A single-record update frame in the feed's wire format.
pub fn update_frame(symbol: &str, time_ms: i64, close: &str) -> String {
    format!(r#"[{{"i":"{symbol}","t":{time_ms},"f":60000,"o":1,"h":9,"l":0.5,"c":{close},"v":3}}]"#)
}

/// Steps `orchestrator` until `done` holds, panicking after [`TIMEOUT`].
pub async fn drive_until<H, F>(orchestrator: &mut Orchestrator<H>, mut done: F)
where
    H: HistorySource,
    F: FnMut(&Orchestrator<H>) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        while !done(orchestrator) {
            orchestrator.step().await;
        }
    })
    .await
    .expect("timed out driving orchestrator");
}

/// Steps `orchestrator` until `done` holds, without arming any timer.
///
/// For tests on a paused clock, where a pending timeout would be
/// auto-advanced to while the runtime waits on socket I/O.
pub async fn step_until<H, F>(orchestrator: &mut Orchestrator<H>, mut done: F)
where
    H: HistorySource,
    F: FnMut(&Orchestrator<H>) -> bool,
{
    for _ in 0..10_000 {
        if done(orchestrator) {
            return;
        }
        orchestrator.step().await;
    }
    panic!("condition not reached after 10000 steps");
}

/// A `ws://` URL on a local port with nothing listening.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/stream")
}

/// Local WebSocket server standing in for the push feed.
///
/// Every text frame received from a client is decoded as JSON and queued for
/// inspection; [`push`](Self::push) broadcasts a frame to every connected
/// client. A closed gate holds accepted sockets before the WebSocket
/// handshake, simulating a slow connection.
pub struct MockFeed {
    pub url: String,
    commands: mpsc::UnboundedReceiver<serde_json::Value>,
    push: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    gate: watch::Sender<bool>,
    handshakes: Arc<AtomicUsize>,
    server: JoinHandle<()>,
}

impl MockFeed {
    /// Starts a feed that completes handshakes immediately.
    pub async fn start() -> Self {
        Self::bind(true).await
    }

    /// Starts a feed that holds handshakes until [`open_gate`](Self::open_gate).
    pub async fn gated() -> Self {
        Self::bind(false).await
    }

    async fn bind(open: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock feed");
        let url = format!("ws://{}/stream", listener.local_addr().unwrap());

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel::<String>(64);
        let (kick, _) = broadcast::channel::<()>(4);
        let (gate, gate_rx) = watch::channel(open);
        let handshakes = Arc::new(AtomicUsize::new(0));

        let server = {
            let push = push.clone();
            let kick = kick.clone();
            let handshakes = Arc::clone(&handshakes);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let commands_tx = commands_tx.clone();
                    let mut gate_rx = gate_rx.clone();
                    let mut push_rx = push.subscribe();
                    let mut kick_rx = kick.subscribe();
                    let handshakes = Arc::clone(&handshakes);

                    tokio::spawn(async move {
                        if gate_rx.wait_for(|open| *open).await.is_err() {
                            return;
                        }
                        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                            return;
                        };
                        handshakes.fetch_add(1, Ordering::SeqCst);
                        // Frames pushed while this connection was gated are not replayed.
                        push_rx = push_rx.resubscribe();

                        let (mut write, mut read) = ws.split();
                        loop {
                            tokio::select! {
                                msg = read.next() => match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let value = serde_json::from_str(&text)
                                            .expect("client sent invalid JSON");
                                        let _ = commands_tx.send(value);
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                Ok(text) = push_rx.recv() => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(()) = kick_rx.recv() => {
                                    let _ = write.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                    });
                }
            })
        };

        Self {
            url,
            commands,
            push,
            kick,
            gate,
            handshakes,
            server,
        }
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Broadcasts a text frame to every connected client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push.send(text.into());
    }

    /// Closes every live connection from the server side.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    /// Number of completed WebSocket handshakes.
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Next command received from any client, panicking after [`TIMEOUT`].
    pub async fn next_command(&mut self) -> serde_json::Value {
        tokio::time::timeout(TIMEOUT, self.commands.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("mock feed stopped")
    }

    /// Waits briefly and returns any command received in that window.
    pub async fn quiet_for(&mut self, window: Duration) -> Option<serde_json::Value> {
        tokio::time::timeout(window, self.commands.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for MockFeed {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Expected wire form of a protocol command.
pub fn command(tpe: &str, symbol: &str) -> serde_json::Value {
    serde_json::json!({ "type": tpe, "instrument": symbol, "timeframe": 60000 })
}

/// Canned answer for one symbol.
#[derive(Clone)]
pub enum Reply {
    Candles(Vec<Candle>),
    Fail,
    /// Never resolves.
    Hang,
}

/// History source answering from a per-symbol script and recording calls.
#[derive(Clone, Default)]
pub struct ScriptedHistory {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<(String, i64, i64)>>>,
}

impl ScriptedHistory {
    pub fn reply(self, symbol: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(symbol.to_string(), reply);
        self
    }

    /// `(symbol, from, to)` for every load so far.
    pub fn calls(&self) -> Vec<(String, i64, i64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl HistorySource for ScriptedHistory {
    async fn load(&self, key: &InstrumentKey, from: i64, to: i64) -> Result<Vec<Candle>> {
        let symbol = key.symbol();
        self.calls.lock().unwrap().push((symbol.clone(), from, to));
        let reply = self.replies.lock().unwrap().get(&symbol).cloned();

        match reply {
            Some(Reply::Candles(candles)) => Ok(candles),
            None => Ok(Vec::new()),
            Some(Reply::Fail) => Err(retrieval_error().await),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

/// A genuine retrieval error, produced without touching the network.
pub async fn retrieval_error() -> SyncError {
    let err = reqwest::Client::new()
        .get("not a url")
        .send()
        .await
        .expect_err("relative URL must be rejected");
    SyncError::Retrieval(err)
}

/// Serves exactly one HTTP response and returns the base URL plus a handle
/// resolving to the raw request head.
pub async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind http responder");
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("no http client");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.expect("read failed");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write failed");
        let _ = socket.shutdown().await;

        String::from_utf8_lossy(&request).into_owned()
    });

    (base_url, handle)
}
