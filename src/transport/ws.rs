//! WebSocket duplex transport.
//!
//! Implements the streaming task protocol over a single WebSocket
//! connection:
//!
//! 1. **Connect** — open the WebSocket with bearer authentication
//! 2. **Start** — send a `run-task` control frame carrying the session
//!    parameters and the request id, wait for `task-started`
//! 3. **Stream** — send audio as binary frames; receive `result-generated`
//!    events as JSON text frames
//! 4. **Finish** — send `finish-task`; the server answers `task-finished`
//!    (or `task-failed`) after flushing its remaining results
//!
//! Control frames are JSON with a `header` (action/event, task id, error
//! fields) and an optional `payload`. Some peers deliver JSON in Binary
//! frames; those are detected (leading `{`) and parsed the same way.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{DuplexChannel, DuplexTransport, FrameSink, InboundEvent, OpenRequest};
use crate::error::{Result, VocalinkError};
use crate::result::{SessionResult, Transcript, Translation, Usage};

// ── Constants ──────────────────────────────────────────────────────

/// Default duplex streaming endpoint.
const DEFAULT_ENDPOINT: &str = "wss://api.vocalink.dev/v1/duplex";

/// How long to wait for the server's `task-started` acknowledgement.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;
type WsSource =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

// ── Configuration ──────────────────────────────────────────────────

/// Connection settings for [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub endpoint: String,
    /// Bearer token sent in the `Authorization` header.
    pub api_key: String,
    /// Timeout on the `task-started` handshake.
    pub connect_timeout: Duration,
    /// Inbound event channel capacity.
    pub event_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_buffer: 256,
        }
    }
}

// ── Control frame builders ─────────────────────────────────────────

/// Build the `run-task` frame opening a streaming session.
fn build_run_task(request: &OpenRequest) -> Result<serde_json::Value> {
    // `extra` is flattened into the parameter object by the params serde.
    let mut parameters = serde_json::to_value(&request.params).map_err(|e| {
        VocalinkError::transport_with_source("failed to serialize session parameters", e)
    })?;
    if let Some(map) = parameters.as_object_mut() {
        // The model travels in the payload header, not the parameter object.
        map.remove("model");
    }
    Ok(serde_json::json!({
        "header": {
            "action": "run-task",
            "task_id": request.request_id,
            "streaming": "duplex",
        },
        "payload": {
            "task_group": "audio",
            "task": "asr",
            "function": "recognition",
            "model": request.params.model,
            "parameters": parameters,
            "input": {},
        }
    }))
}

/// Build the `finish-task` frame signalling end of the audio stream.
fn build_finish_task(request_id: &str) -> serde_json::Value {
    serde_json::json!({
        "header": {
            "action": "finish-task",
            "task_id": request_id,
        },
        "payload": {
            "input": {},
        }
    })
}

// ── Server frame parsing ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ServerFrame {
    header: ServerHeader,
    #[serde(default)]
    payload: Option<ServerPayload>,
}

#[derive(Debug, Deserialize)]
struct ServerHeader {
    event: String,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPayload {
    #[serde(default)]
    output: Option<ServerOutput>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerOutput {
    #[serde(default)]
    transcription: Option<Transcript>,
    #[serde(default)]
    translations: Option<Vec<Translation>>,
}

/// Parse one JSON frame from the server.
///
/// Returns `None` for event types this client does not consume. A frame that
/// fails to parse is surfaced as [`InboundEvent::Failed`]: the protocol is
/// JSON-per-frame, so garbage means the stream is unusable.
pub(crate) fn parse_server_event(text: &str) -> Option<InboundEvent> {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            return Some(InboundEvent::Failed(VocalinkError::transport_with_source(
                "unparseable server frame",
                e,
            )));
        }
    };

    match frame.header.event.as_str() {
        "task-started" => Some(InboundEvent::Started),
        "result-generated" => {
            let payload = frame.payload.unwrap_or_default();
            let output = payload.output.unwrap_or_default();
            Some(InboundEvent::Result(SessionResult {
                request_id: frame.header.task_id,
                transcription: output.transcription,
                translations: output.translations,
                usage: payload.usage,
            }))
        }
        "task-finished" => Some(InboundEvent::Completed),
        "task-failed" => {
            let code = frame
                .header
                .error_code
                .unwrap_or_else(|| "UnknownError".to_string());
            let message = frame
                .header
                .error_message
                .unwrap_or_else(|| "task failed without a message".to_string());
            Some(InboundEvent::Failed(VocalinkError::remote(code, message)))
        }
        other => {
            tracing::debug!(event = other, "ignoring unknown server event");
            None
        }
    }
}

// ── Outbound sink ──────────────────────────────────────────────────

#[derive(Debug)]
enum OutboundItem {
    Frame(Vec<u8>),
    Finish,
}

struct WsFrameSink {
    tx: mpsc::UnboundedSender<OutboundItem>,
}

impl FrameSink for WsFrameSink {
    fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(OutboundItem::Frame(frame))
            .map_err(|_| VocalinkError::transport("outbound channel closed"))
    }

    fn finish(&self) {
        let _ = self.tx.send(OutboundItem::Finish);
    }
}

// ── Transport ──────────────────────────────────────────────────────

/// Production WebSocket implementation of [`DuplexTransport`].
pub struct WsTransport {
    config: WsConfig,
}

impl WsTransport {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Read `VOCALINK_API_KEY` (required) and `VOCALINK_WS_URL` (optional).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("VOCALINK_API_KEY")
            .map_err(|_| VocalinkError::invalid_argument("VOCALINK_API_KEY is not set"))?;
        let mut config = WsConfig {
            api_key,
            ..WsConfig::default()
        };
        if let Ok(url) = std::env::var("VOCALINK_WS_URL") {
            config.endpoint = url;
        }
        Ok(Self::new(config))
    }
}

#[async_trait::async_trait]
impl DuplexTransport for WsTransport {
    async fn open(&self, request: OpenRequest) -> Result<DuplexChannel> {
        let request_id = request.request_id.clone();

        let mut ws_request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| VocalinkError::transport_with_source("invalid websocket endpoint", e))?;
        if !self.config.api_key.is_empty() {
            let value = format!("Bearer {}", self.config.api_key)
                .parse()
                .map_err(|e| VocalinkError::transport_with_source("invalid api key header", e))?;
            ws_request.headers_mut().insert("authorization", value);
        }

        tracing::info!(
            request_id = %request_id,
            model = %request.params.model,
            "Connecting duplex websocket"
        );

        let (mut ws_stream, _response) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| VocalinkError::transport_with_source("websocket connect failed", e))?;

        // Start the task on the unsplit stream.
        let run_task = build_run_task(&request)?;
        let run_task_json = serde_json::to_string(&run_task)
            .map_err(|e| VocalinkError::transport_with_source("failed to encode run-task", e))?;
        tracing::debug!(request_id = %request_id, frame = %run_task_json, "Sending run-task");
        ws_stream
            .send(WsMessage::Text(run_task_json.into()))
            .await
            .map_err(|e| VocalinkError::transport_with_source("failed to send run-task", e))?;

        // Wait for task-started before splitting the stream.
        let started = tokio::time::timeout(self.config.connect_timeout, async {
            while let Some(msg_result) = ws_stream.next().await {
                match msg_result {
                    Ok(WsMessage::Text(text)) => match parse_server_event(&text) {
                        Some(InboundEvent::Started) => return Ok(()),
                        Some(InboundEvent::Failed(e)) => return Err(e),
                        _ => {}
                    },
                    Ok(WsMessage::Binary(data)) if data.first() == Some(&b'{') => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            match parse_server_event(text) {
                                Some(InboundEvent::Started) => return Ok(()),
                                Some(InboundEvent::Failed(e)) => return Err(e),
                                _ => {}
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        return Err(VocalinkError::transport(format!(
                            "connection closed before task-started: {frame:?}"
                        )));
                    }
                    Err(e) => {
                        return Err(VocalinkError::transport_with_source(
                            "websocket error before task-started",
                            e,
                        ));
                    }
                    _ => {}
                }
            }
            Err(VocalinkError::transport("stream ended before task-started"))
        })
        .await;

        match started {
            Ok(Ok(())) => {
                tracing::info!(request_id = %request_id, "Task started — ready to stream");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(VocalinkError::transport(format!(
                    "task-started timeout ({}s)",
                    self.config.connect_timeout.as_secs()
                )));
            }
        }

        let (ws_sink, ws_source) = ws_stream.split();

        let (op_tx, op_rx) = mpsc::unbounded_channel::<OutboundItem>();
        let (event_tx, event_rx) = mpsc::channel::<InboundEvent>(self.config.event_buffer);

        let rid_out = request_id.clone();
        tokio::spawn(async move {
            outbound_loop(op_rx, ws_sink, rid_out).await;
        });

        tokio::spawn(async move {
            inbound_loop(ws_source, event_tx, request_id).await;
        });

        Ok(DuplexChannel {
            sink: Arc::new(WsFrameSink { tx: op_tx }),
            events: event_rx,
        })
    }
}

// ── Internal loops ─────────────────────────────────────────────────

/// Drain the outbound channel into the WebSocket write half.
async fn outbound_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundItem>,
    mut ws_sink: WsSink,
    request_id: String,
) {
    let mut frame_count: u64 = 0;
    let mut total_bytes: u64 = 0;

    while let Some(item) = rx.recv().await {
        match item {
            OutboundItem::Frame(frame) => {
                frame_count += 1;
                total_bytes += frame.len() as u64;
                if frame_count == 1 || frame_count.is_multiple_of(100) {
                    tracing::debug!(
                        request_id = %request_id,
                        frame = frame_count,
                        bytes = frame.len(),
                        total_bytes = total_bytes,
                        "Sending audio frame"
                    );
                }
                if ws_sink.send(WsMessage::Binary(frame.into())).await.is_err() {
                    tracing::warn!(
                        request_id = %request_id,
                        "WebSocket send failed, closing outbound loop"
                    );
                    break;
                }
            }
            OutboundItem::Finish => {
                let finish = build_finish_task(&request_id);
                match serde_json::to_string(&finish) {
                    Ok(json) => {
                        tracing::info!(
                            request_id = %request_id,
                            frames = frame_count,
                            "Sending finish-task"
                        );
                        if ws_sink.send(WsMessage::Text(json.into())).await.is_err() {
                            tracing::warn!(
                                request_id = %request_id,
                                "WebSocket send failed for finish-task"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            request_id = %request_id,
                            error = %e,
                            "Failed to encode finish-task"
                        );
                    }
                }
                break;
            }
        }
    }

    tracing::debug!(request_id = %request_id, "Outbound loop terminated");
}

/// Read server frames, parse, and forward ordered events until a terminal
/// one. Guarantees exactly one of `Completed` / `Failed` on the channel.
async fn inbound_loop(
    mut ws_source: WsSource,
    event_tx: mpsc::Sender<InboundEvent>,
    request_id: String,
) {
    let mut terminal_sent = false;

    while let Some(msg_result) = ws_source.next().await {
        let text = match msg_result {
            Ok(WsMessage::Text(text)) => text.to_string(),
            Ok(WsMessage::Binary(data)) if data.first() == Some(&b'{') => {
                match std::str::from_utf8(&data) {
                    Ok(text) => text.to_string(),
                    Err(_) => {
                        tracing::warn!(
                            request_id = %request_id,
                            len = data.len(),
                            "Non-UTF8 binary frame — skipping"
                        );
                        continue;
                    }
                }
            }
            Ok(WsMessage::Binary(data)) => {
                tracing::warn!(
                    request_id = %request_id,
                    len = data.len(),
                    "Unexpected non-JSON binary frame — skipping"
                );
                continue;
            }
            Ok(WsMessage::Close(frame)) => {
                tracing::info!(request_id = %request_id, close_frame = ?frame, "Connection closed");
                if !terminal_sent {
                    let _ = event_tx
                        .send(InboundEvent::Failed(VocalinkError::transport(
                            "connection closed before task-finished",
                        )))
                        .await;
                    terminal_sent = true;
                }
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "WebSocket error");
                if !terminal_sent {
                    let _ = event_tx
                        .send(InboundEvent::Failed(VocalinkError::transport_with_source(
                            "websocket error",
                            e,
                        )))
                        .await;
                    terminal_sent = true;
                }
                break;
            }
        };

        if let Some(event) = parse_server_event(&text) {
            let is_terminal = event.is_terminal();
            if event_tx.send(event).await.is_err() {
                tracing::debug!(
                    request_id = %request_id,
                    "Event receiver dropped, closing inbound loop"
                );
                return;
            }
            if is_terminal {
                terminal_sent = true;
                break;
            }
        }
    }

    if !terminal_sent {
        let _ = event_tx
            .send(InboundEvent::Failed(VocalinkError::transport(
                "stream ended before task-finished",
            )))
            .await;
    }

    tracing::debug!(request_id = %request_id, "Inbound loop terminated");
}

// ── Tests ──────────────────────────────────────────────────────────
