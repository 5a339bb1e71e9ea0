//! STOMP 1.2 transport.
//!
//! A minimal STOMP client sufficient for point-to-point agent messaging:
//! CONNECT with credentials from the `STOMP_USER` / `STOMP_PASSWORD`
//! environment variables, a single SUBSCRIBE on the agent's own queue, SEND
//! frames carrying the serialized [`Message`] body, and a reader task that
//! dispatches MESSAGE and ERROR frames into the receiver callbacks.
//!
//! The frame kind (request vs. response) rides in a single custom header,
//! `message-kind`, so any broker with named queues can carry the traffic.
//!
//! Heart-beating is disabled (`heart-beat:0,0`); receipts are not requested.
//! That keeps the protocol surface to the five frames this client actually
//! exchanges: CONNECT/CONNECTED, SUBSCRIBE, SEND, MESSAGE/ERROR, DISCONNECT.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::{FrameKind, MessageTransport, TransportError, TransportReceiver};
use crate::agentmesh::message::{AgentEvent, Message};

/// Environment variable holding the broker login.
pub const STOMP_USER_ENV: &str = "STOMP_USER";
/// Environment variable holding the broker passcode.
pub const STOMP_PASSWORD_ENV: &str = "STOMP_PASSWORD";

const KIND_HEADER: &str = "message-kind";

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

/// A single STOMP frame: command line, headers, body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of the named header, unescaped.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Encode the frame for the wire. A `content-length` header is always
    /// emitted so bodies may contain NUL bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            out.extend_from_slice(escape_header(name).as_bytes());
            out.push(b':');
            out.extend_from_slice(escape_header(value).as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(b'\0');
        out
    }
}

/// Escape a header token per STOMP 1.2 (backslash, newline, carriage
/// return, colon).
fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape_header`]. Unknown escape sequences are a decode error.
fn unescape_header(raw: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Decode(format!(
                    "bad header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Read one frame from the stream.
///
/// Returns `Ok(None)` on a clean end of stream. Bare newlines between frames
/// (heart-beats) are skipped. Bodies are read to the `content-length` when
/// present, otherwise up to the NUL terminator.
pub(crate) async fn read_frame<R>(
    reader: &mut BufReader<R>,
) -> Result<Option<StompFrame>, TransportError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = Vec::new();

    // Command line; skip heart-beat newlines.
    let command = loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| TransportError::Decode(format!("read failed: {}", e)))?;
        if n == 0 {
            return Ok(None);
        }
        let text = trim_line(&line)?;
        if !text.is_empty() {
            break text.to_string();
        }
    };

    // Header lines until the blank separator.
    let mut headers = Vec::new();
    let mut content_length: Option<usize> = None;
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| TransportError::Decode(format!("read failed: {}", e)))?;
        if n == 0 {
            return Err(TransportError::Decode(
                "connection closed mid-frame".to_string(),
            ));
        }
        let text = trim_line(&line)?;
        if text.is_empty() {
            break;
        }
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| TransportError::Decode(format!("malformed header line '{}'", text)))?;
        let name = unescape_header(name)?;
        let value = unescape_header(value)?;
        if name == "content-length" {
            content_length = Some(value.parse::<usize>().map_err(|_| {
                TransportError::Decode(format!("bad content-length '{}'", value))
            })?);
        }
        headers.push((name, value));
    }

    // Body: fixed length plus the NUL, or scan to the NUL.
    let mut body = Vec::new();
    if let Some(len) = content_length {
        body.resize(len, 0);
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| TransportError::Decode(format!("short body: {}", e)))?;
        let mut terminator = [0u8; 1];
        reader
            .read_exact(&mut terminator)
            .await
            .map_err(|e| TransportError::Decode(format!("missing terminator: {}", e)))?;
        if terminator[0] != 0 {
            return Err(TransportError::Decode(
                "frame body not NUL-terminated".to_string(),
            ));
        }
    } else {
        reader
            .read_until(0, &mut body)
            .await
            .map_err(|e| TransportError::Decode(format!("read failed: {}", e)))?;
        if body.pop() != Some(0) {
            return Err(TransportError::Decode(
                "frame body not NUL-terminated".to_string(),
            ));
        }
    }

    Ok(Some(StompFrame {
        command,
        headers,
        body,
    }))
}

/// Strip the trailing `\n` (and optional `\r`) from a raw line.
fn trim_line(line: &[u8]) -> Result<&str, TransportError> {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    std::str::from_utf8(&line[..end])
        .map_err(|_| TransportError::Decode("non-UTF-8 frame header".to_string()))
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct StompState {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    reader_task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// A STOMP 1.2 client transport bound to one queue.
pub struct StompTransport {
    host: String,
    port: u16,
    address: String,
    state: Mutex<Option<StompState>>,
}

impl StompTransport {
    /// Create a transport that will connect to `host:port` and subscribe to
    /// the queue named by `address` on start.
    pub fn new(host: impl Into<String>, port: u16, address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            address: address.into(),
            state: Mutex::new(None),
        }
    }

    fn queue_destination(name: &str) -> String {
        format!("/queue/{}", name)
    }

    async fn write_frame(
        writer: &Arc<Mutex<OwnedWriteHalf>>,
        frame: StompFrame,
        destination: &str,
    ) -> Result<(), TransportError> {
        let bytes = frame.encode();
        let mut writer = writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| TransportError::Send {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;
        writer.flush().await.map_err(|e| TransportError::Send {
            destination: destination.to_string(),
            reason: e.to_string(),
        })
    }

    async fn send(
        &self,
        kind: FrameKind,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError> {
        let state = self.state.lock().await;
        let state = state.as_ref().ok_or(TransportError::NotStarted)?;
        let body = message.to_wire().map_err(|e| TransportError::Send {
            destination: destination.to_string(),
            reason: format!("encode failed: {}", e),
        })?;
        let frame = StompFrame::new("SEND")
            .header("destination", &Self::queue_destination(destination))
            .header("content-type", "application/json")
            .header(KIND_HEADER, kind.as_str())
            .body(body.into_bytes());
        let result = Self::write_frame(&state.writer, frame, destination).await;
        if let Err(e) = &result {
            log::error!("[{}] {}", self.address, e);
        }
        result
    }

    /// Dispatch loop for inbound frames, run as a dedicated task.
    async fn read_loop(
        address: String,
        mut reader: BufReader<OwnedReadHalf>,
        receiver: Arc<dyn TransportReceiver>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut reader) => frame,
                _ = shutdown.notified() => break,
            };
            match frame {
                Ok(Some(frame)) => match frame.command.as_str() {
                    "MESSAGE" => {
                        let kind = frame
                            .header_value(KIND_HEADER)
                            .and_then(FrameKind::parse)
                            .unwrap_or(FrameKind::Request);
                        match std::str::from_utf8(&frame.body)
                            .map_err(|e| e.to_string())
                            .and_then(|text| Message::from_wire(text).map_err(|e| e.to_string()))
                        {
                            Ok(message) => match kind {
                                FrameKind::Request => receiver.on_request(message).await,
                                FrameKind::Response => receiver.on_response(message).await,
                            },
                            Err(e) => {
                                log::warn!("[{}] dropping undecodable frame: {}", address, e);
                                receiver.on_error(TransportError::Decode(e)).await;
                            }
                        }
                    }
                    "ERROR" => {
                        let detail = frame
                            .header_value("message")
                            .map(str::to_string)
                            .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).into_owned());
                        log::error!("[{}] broker error: {}", address, detail);
                        receiver.on_error(TransportError::Broker(detail)).await;
                    }
                    "RECEIPT" => {}
                    other => {
                        log::debug!("[{}] ignoring {} frame", address, other);
                    }
                },
                Ok(None) => {
                    receiver
                        .on_event(AgentEvent::Disconnected {
                            address: address.clone(),
                            reason: "connection closed by broker".to_string(),
                        })
                        .await;
                    break;
                }
                Err(e) => {
                    receiver.on_error(e).await;
                    receiver
                        .on_event(AgentEvent::Disconnected {
                            address: address.clone(),
                            reason: "unreadable stream".to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageTransport for StompTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn start(&self, receiver: Arc<dyn TransportReceiver>) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(TransportError::Connect(format!(
                "transport for '{}' already started",
                self.address
            )));
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let writer = Arc::new(Mutex::new(write_half));

        let mut connect = StompFrame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", &self.host)
            .header("heart-beat", "0,0");
        if let Ok(user) = std::env::var(STOMP_USER_ENV) {
            connect = connect.header("login", &user);
        }
        if let Ok(password) = std::env::var(STOMP_PASSWORD_ENV) {
            connect = connect.header("passcode", &password);
        }
        Self::write_frame(&writer, connect, &self.address)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        match read_frame(&mut reader).await? {
            Some(frame) if frame.command == "CONNECTED" => {}
            Some(frame) if frame.command == "ERROR" => {
                return Err(TransportError::Auth(
                    frame
                        .header_value("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).into_owned()),
                ));
            }
            Some(frame) => {
                return Err(TransportError::Connect(format!(
                    "unexpected {} frame during handshake",
                    frame.command
                )));
            }
            None => {
                return Err(TransportError::Connect(
                    "connection closed during handshake".to_string(),
                ));
            }
        }

        let subscribe = StompFrame::new("SUBSCRIBE")
            .header("id", "0")
            .header("destination", &Self::queue_destination(&self.address))
            .header("ack", "auto");
        Self::write_frame(&writer, subscribe, &self.address)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        receiver
            .on_event(AgentEvent::Connected {
                address: self.address.clone(),
            })
            .await;

        let shutdown = Arc::new(Notify::new());
        let reader_task = tokio::spawn(Self::read_loop(
            self.address.clone(),
            reader,
            receiver,
            shutdown.clone(),
        ));

        *state = Some(StompState {
            writer,
            reader_task,
            shutdown,
        });
        log::info!(
            "[{}] connected to stomp broker {}:{}",
            self.address,
            self.host,
            self.port
        );
        Ok(())
    }

    async fn send_request(&self, message: &Message, destination: &str) -> Result<(), TransportError> {
        self.send(FrameKind::Request, message, destination).await
    }

    async fn send_response(&self, message: &Message, destination: &str) -> Result<(), TransportError> {
        self.send(FrameKind::Response, message, destination).await
    }

    async fn stop(&self) {
        let state = {
            let mut state = self.state.lock().await;
            state.take()
        };
        if let Some(state) = state {
            let disconnect = StompFrame::new("DISCONNECT");
            if let Err(e) = Self::write_frame(&state.writer, disconnect, &self.address).await {
                log::debug!("[{}] disconnect frame not delivered: {}", self.address, e);
            }
            // The in-flight dispatch (if any) completes before the task
            // observes the notification.
            state.shutdown.notify_one();
            if let Err(e) = state.reader_task.await {
                log::warn!("[{}] reader task ended abnormally: {}", self.address, e);
            }
            let mut writer = state.writer.lock().await;
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(bytes: &[u8]) -> StompFrame {
        let mut reader = BufReader::new(bytes);
        read_frame(&mut reader)
            .await
            .expect("decode")
            .expect("frame present")
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let frame = StompFrame::new("SEND")
            .header("destination", "/queue/Agent1")
            .header("message-kind", "request")
            .body(br#"{"payload":"hi"}"#.to_vec());

        let decoded = decode(&frame.encode()).await;
        assert_eq!(decoded.command, "SEND");
        assert_eq!(decoded.header_value("destination"), Some("/queue/Agent1"));
        assert_eq!(decoded.header_value("message-kind"), Some("request"));
        assert_eq!(decoded.body, frame.body);
    }

    #[tokio::test]
    async fn header_values_survive_escaping() {
        let frame = StompFrame::new("SEND")
            .header("destination", "/queue/a:b")
            .header("note", "line1\nline2\\end");
        let decoded = decode(&frame.encode()).await;
        assert_eq!(decoded.header_value("destination"), Some("/queue/a:b"));
        assert_eq!(decoded.header_value("note"), Some("line1\nline2\\end"));
    }

    #[tokio::test]
    async fn body_with_nul_bytes_reads_to_content_length() {
        let frame = StompFrame::new("MESSAGE").body(vec![1, 0, 2, 0, 3]);
        let decoded = decode(&frame.encode()).await;
        assert_eq!(decoded.body, vec![1, 0, 2, 0, 3]);
    }

    #[tokio::test]
    async fn heartbeat_newlines_between_frames_are_skipped() {
        let mut bytes = b"\n\n".to_vec();
        bytes.extend_from_slice(&StompFrame::new("CONNECTED").header("version", "1.2").encode());
        let decoded = decode(&bytes).await;
        assert_eq!(decoded.command, "CONNECTED");
        assert_eq!(decoded.header_value("version"), Some("1.2"));
    }

    #[tokio::test]
    async fn end_of_stream_yields_none() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_without_content_length_reads_to_nul() {
        let bytes = b"MESSAGE\ndestination:/queue/x\n\nhello\0".to_vec();
        let decoded = decode(&bytes).await;
        assert_eq!(decoded.command, "MESSAGE");
        assert_eq!(decoded.body, b"hello".to_vec());
    }
}
