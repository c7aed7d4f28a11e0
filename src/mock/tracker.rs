use anyhow::{Context, Result};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::fixtures::frame_line;
use crate::config::TrackerConfig;

/// How the simulated server answers `get` requests other than `frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Handshake {
    #[default]
    Normal,
    /// Answer with this failure status.
    Reject(u16),
    /// Answer with a line that is not JSON.
    Garbage,
    /// Never answer.
    Silent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockTrackerConfig {
    pub heartbeat_interval_ms: u64,
    pub calibrated: bool,
    pub version: u32,
    /// Delay between pushed frames.
    pub push_interval_ms: u64,
    /// Drop the connection after this many frames have been sent on it.
    pub disconnect_after: Option<u64>,
    pub handshake: Handshake,
    /// Answer `get frame` requests; when false they are recorded and ignored.
    pub answer_frames: bool,
    /// Hold the answer to the first `get frame` request for this long.
    pub first_frame_delay_ms: Option<u64>,
    /// Write one frame ahead of the acknowledgement when push is enabled.
    pub frame_before_push_ack: bool,
}

impl Default for MockTrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 250,
            calibrated: true,
            version: 1,
            push_interval_ms: 5,
            disconnect_after: None,
            handshake: Handshake::Normal,
            answer_frames: true,
            first_frame_delay_ms: None,
            frame_before_push_ack: false,
        }
    }
}

enum Command {
    Send(String),
    Disconnect,
}

/// Simulated tracker server on a loopback port.
///
/// Serves one client at a time, answering the negotiation, `get frame`,
/// `set push` and heartbeats the way a real server does, and records every
/// request it receives. The server task is aborted on drop.
pub struct MockTracker {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    commands: mpsc::UnboundedSender<Command>,
    server: JoinHandle<()>,
}

impl MockTracker {
    pub async fn start() -> Result<Self> {
        Self::start_with(MockTrackerConfig::default()).await
    }

    pub async fn start_with(config: MockTrackerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind mock tracker")?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let server = tokio::spawn(serve(listener, config, Arc::clone(&requests), command_rx));
        debug!("mock tracker listening on {}", addr);

        Ok(Self {
            addr,
            requests,
            commands,
            server,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration pointing at this server, with short timeouts.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            connect_timeout_ms: 2000,
            request_timeout_ms: 2000,
            shutdown_timeout_ms: 2000,
            ..TrackerConfig::new(self.addr.ip().to_string(), self.addr.port())
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_requests(&self, predicate: impl Fn(&Value) -> bool) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| predicate(r))
            .count()
    }

    pub fn frame_requests(&self) -> usize {
        self.count_requests(is_frame_request)
    }

    pub fn heartbeats(&self) -> usize {
        self.count_requests(|r| r["category"] == "heartbeat")
    }

    /// Number of `set push` requests with the given value.
    pub fn push_requests(&self, enabled: bool) -> usize {
        self.count_requests(|r| r["request"] == "set" && r["values"]["push"] == enabled)
    }

    /// Write a raw line to the connected client.
    pub fn inject(&self, line: impl Into<String>) {
        if self.commands.send(Command::Send(line.into())).is_err() {
            debug!("mock tracker server has stopped; dropping injected line");
        }
    }

    /// Drop the current client connection; the server keeps accepting.
    pub fn disconnect(&self) {
        if self.commands.send(Command::Disconnect).is_err() {
            debug!("mock tracker server has stopped; nothing to disconnect");
        }
    }
}

impl Drop for MockTracker {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn is_frame_request(request: &Value) -> bool {
    request["request"] == "get"
        && request["values"]
            .as_array()
            .is_some_and(|keys| keys.iter().any(|k| k == "frame"))
}

async fn serve(
    listener: TcpListener,
    config: MockTrackerConfig,
    requests: Arc<Mutex<Vec<Value>>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!("mock tracker accept failed: {}", e);
                continue;
            }
        };
        debug!("mock tracker accepted {}", peer);

        // Commands meant for an earlier client are stale
        while commands.try_recv().is_ok() {}

        let mut session = Session::new(&config, &requests);
        if let Err(e) = session.run(stream, &mut commands).await {
            debug!("mock tracker session with {} ended: {}", peer, e);
        }
    }
}

struct Session<'a> {
    config: &'a MockTrackerConfig,
    requests: &'a Mutex<Vec<Value>>,
    push: bool,
    seq: u64,
    sent: u64,
}

enum Next {
    Continue,
    Hangup,
}

impl<'a> Session<'a> {
    fn new(config: &'a MockTrackerConfig, requests: &'a Mutex<Vec<Value>>) -> Self {
        Self {
            config,
            requests,
            push: false,
            seq: 0,
            sent: 0,
        }
    }

    async fn run(
        &mut self,
        stream: TcpStream,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> std::io::Result<()> {
        let (read_half, mut writer) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.push_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => self.handle_line(line.trim(), &mut writer).await?,
                    None => return Ok(()),
                },
                _ = ticker.tick(), if self.push => self.send_frame(&mut writer).await?,
                Some(command) = commands.recv() => match command {
                    Command::Send(line) => {
                        write_line(&mut writer, &line).await?;
                        Next::Continue
                    }
                    Command::Disconnect => Next::Hangup,
                },
            };

            if let Next::Hangup = next {
                if let Err(e) = writer.shutdown().await {
                    debug!("mock tracker shutdown failed: {}", e);
                }
                return Ok(());
            }
        }
    }

    async fn handle_line(&mut self, line: &str, writer: &mut OwnedWriteHalf) -> std::io::Result<Next> {
        if line.is_empty() {
            return Ok(Next::Continue);
        }
        trace!("mock tracker <- {}", line);

        let request: Value = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(_) => {
                let reply = failure("tracker", None, 400, "request is not valid JSON");
                write_line(writer, &reply).await?;
                return Ok(Next::Continue);
            }
        };
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let category = request["category"].as_str().unwrap_or_default();
        let verb = request["request"].as_str();

        match (category, verb) {
            ("heartbeat", _) => {
                write_line(writer, &json!({ "category": "heartbeat", "statuscode": 200 }).to_string()).await?;
            }
            ("tracker", Some("get")) if is_frame_request(&request) => {
                if self.config.answer_frames {
                    if let Some(delay) = self.config.first_frame_delay_ms.filter(|_| self.sent == 0) {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    return self.send_frame(writer).await;
                }
            }
            ("tracker", Some("get")) => match self.config.handshake {
                Handshake::Normal => {
                    let values = self.values_for(&request["values"]);
                    let reply = json!({
                        "category": "tracker",
                        "request": "get",
                        "statuscode": 200,
                        "values": values
                    });
                    write_line(writer, &reply.to_string()).await?;
                }
                Handshake::Reject(code) => {
                    write_line(writer, &failure("tracker", Some("get"), code, "rejected by mock")).await?;
                }
                Handshake::Garbage => write_line(writer, "this is not json").await?,
                Handshake::Silent => {}
            },
            ("tracker", Some("set")) => {
                if let Some(push) = request["values"]["push"].as_bool() {
                    if push && !self.push && self.config.frame_before_push_ack {
                        if let Next::Hangup = self.send_frame(writer).await? {
                            return Ok(Next::Hangup);
                        }
                    }
                    self.push = push;
                }
                let reply = json!({ "category": "tracker", "request": "set", "statuscode": 200 });
                write_line(writer, &reply.to_string()).await?;
            }
            (category, verb) => {
                write_line(writer, &failure(category, verb, 400, "unsupported request")).await?;
            }
        }
        Ok(Next::Continue)
    }

    fn values_for(&self, keys: &Value) -> Value {
        let mut values = serde_json::Map::new();
        for key in keys.as_array().into_iter().flatten().filter_map(Value::as_str) {
            let value = match key {
                "heartbeatinterval" => json!(self.config.heartbeat_interval_ms),
                "iscalibrated" => json!(self.config.calibrated),
                "version" => json!(self.config.version),
                "push" => json!(self.push),
                _ => continue,
            };
            values.insert(key.to_string(), value);
        }
        Value::Object(values)
    }

    async fn send_frame(&mut self, writer: &mut OwnedWriteHalf) -> std::io::Result<Next> {
        write_line(writer, &frame_line(self.seq)).await?;
        self.seq += 1;
        self.sent += 1;

        match self.config.disconnect_after {
            Some(limit) if self.sent >= limit => Ok(Next::Hangup),
            _ => Ok(Next::Continue),
        }
    }
}

fn failure(category: &str, verb: Option<&str>, code: u16, message: &str) -> String {
    json!({
        "category": category,
        "request": verb,
        "statuscode": code,
        "values": { "statusmessage": message }
    })
    .to_string()
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    trace!("mock tracker -> {}", line);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_after_server_stops_are_dropped() {
        let mut mock = MockTracker::start().await.unwrap();
        mock.server.abort();
        let joined = (&mut mock.server).await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
        assert!(mock.commands.is_closed());

        mock.inject(frame_line(0));
        mock.disconnect();
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_stale_commands_do_not_reach_the_next_client() {
        let mock = MockTracker::start().await.unwrap();
        mock.disconnect();
        mock.inject("stale line");

        let stream = TcpStream::connect(mock.addr()).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half
            .write_all(b"{\"category\":\"heartbeat\"}\n")
            .await
            .unwrap();

        let reply = lines.next_line().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["category"], "heartbeat");
        assert_eq!(mock.heartbeats(), 1);
    }
}
