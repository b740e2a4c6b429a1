//! Vocalink — full-duplex streaming speech recognition and translation
//! client.
//!
//! Audio flows out while results flow back in over one duplex connection:
//!
//! ```text
//!             ┌────────────────────── session controller ──────────────────┐
//! mic/file ─▸ │ send_audio_frame ─▸ FrameBridge ─▸ DuplexTransport (ws) ─▸ │ ─▸ server
//!             │                                                            │
//! listener ◂─ │ ResultDispatcher ◂───────────── inbound events ◂────────── │ ◂─ server
//!             │        │                                                   │
//!             │   CompletionGate ◂── stop() / batch call block here        │
//!             └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pick a controller for the server behavior you talk to:
//!
//! - [`RealtimeSession`] — continuous transcription until the client stops;
//!   also carries the stream surface ([`RealtimeSession::stream_call`]) and
//!   the batch file surface ([`RealtimeSession::call_file`]).
//! - [`ChatSession`] — one utterance, closed by the server at sentence end.
//!
//! Both run over any [`DuplexTransport`]; [`WsTransport`] is the production
//! websocket implementation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vocalink::{RealtimeSession, SessionParams, SessionResult, WsTransport};
//!
//! struct Printer;
//!
//! impl vocalink::SessionListener for Printer {
//!     fn on_event(&mut self, result: SessionResult) {
//!         if let Some(t) = result.transcription {
//!             println!("{}", t.text);
//!         }
//!     }
//! }
//!
//! # async fn run() -> vocalink::Result<()> {
//! let transport = Arc::new(WsTransport::from_env()?);
//! let session = RealtimeSession::new(transport);
//! let params = SessionParams::new("gummy-realtime-v1", "zh").with_target_languages(["en"]);
//!
//! session.start(&params, Printer)?;
//! session.send_audio_frame(vec![0u8; 3200])?;
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod latency;
pub mod params;
pub mod result;
pub mod session;
pub mod transport;

pub use dispatcher::SessionListener;
pub use error::{Result, VocalinkError};
pub use latency::LatencyTracker;
pub use params::{AudioFormat, SessionParams};
pub use result::{ResultPack, SessionResult, Transcript, Translation, Usage};
pub use session::{ChatSession, RealtimeSession, ResultStream, SessionState};
pub use transport::ws::{WsConfig, WsTransport};
pub use transport::{DuplexChannel, DuplexTransport, FrameSink, InboundEvent, OpenRequest};
