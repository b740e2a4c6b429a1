//! Realtime session variant.
//!
//! The server transcribes/translates for as long as audio keeps flowing; it
//! never terminates the utterance on its own. Three usage modes share one
//! controller:
//!
//! 1. **Callback live streaming** — `start` / `send_audio_frame` / `stop`
//!    with a [`SessionListener`].
//! 2. **Stream live streaming** — [`RealtimeSession::stream_call`] takes the
//!    whole outbound audio stream and returns a lazy, finite,
//!    non-restartable [`ResultStream`].
//! 3. **Batch file streaming** — [`RealtimeSession::call_file`] paces a file
//!    through the same pipeline and returns the accumulated [`ResultPack`].

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::SessionCore;
use crate::dispatcher::SessionListener;
use crate::error::{Result, VocalinkError};
use crate::params::SessionParams;
use crate::result::{ResultPack, SessionResult};
use crate::transport::DuplexTransport;

/// Default batch chunk: 100 ms of 16 kHz mono PCM16.
const DEFAULT_CHUNK_BYTES: usize = 3200;

/// Default inter-chunk delay emulating realtime arrival.
const DEFAULT_CHUNK_PACE: Duration = Duration::from_millis(100);

/// Streaming session without server-driven early termination.
pub struct RealtimeSession {
    core: SessionCore,
}

impl RealtimeSession {
    pub fn new(transport: Arc<dyn DuplexTransport>) -> Self {
        Self {
            core: SessionCore::new(transport),
        }
    }

    /// Start a live session. Returns once the session is accepted; the
    /// transport handshake continues in the background and frames sent in
    /// the meantime are queued, in order, until it finishes.
    ///
    /// Must run inside a Tokio runtime. Safe to call again after the
    /// previous session fully completed.
    pub fn start(&self, params: &SessionParams, listener: impl SessionListener) -> Result<()> {
        self.core.begin(params, Box::new(listener)).map(|_| ())
    }

    /// Push one audio frame. Never blocks: the frame is forwarded to the
    /// transport or queued if the handshake is still in flight.
    pub fn send_audio_frame(&self, frame: Vec<u8>) -> Result<()> {
        self.core.push_frame(frame, "send_audio_frame")
    }

    /// Signal end-of-stream and block until the server finishes delivering
    /// results (or fails). Errors with `InvalidState` while idle — including
    /// a second call after the session already completed.
    pub async fn stop(&self) -> Result<()> {
        self.core.lifecycle.ensure_started("stop")?;
        self.core.finish_and_wait().await
    }

    // ── Stream mode ───────────────────────────────────────────────

    /// Declarative alternative to the callback surface: consumes the entire
    /// outbound audio stream and returns the inbound results as a lazy,
    /// finite stream. Not restartable — issue a new call to stream again.
    pub fn stream_call<S>(&self, params: &SessionParams, audio: S) -> Result<ResultStream>
    where
        S: futures_util::Stream<Item = Vec<u8>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.core.begin(params, Box::new(StreamListener { tx }))?;

        let bridge = Arc::clone(&self.core.bridge);
        let latency = Arc::clone(&self.core.latency);
        let cancel = self.core.cancel_token();

        tokio::spawn(async move {
            tokio::pin!(audio);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = audio.next() => match frame {
                        Some(frame) => {
                            latency.mark_start();
                            if bridge.push(frame).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            latency.mark_stop_requested();
            bridge.push_stop();
        });

        Ok(ResultStream {
            inner: UnboundedReceiverStream::new(rx),
        })
    }

    // ── Batch mode ────────────────────────────────────────────────

    /// Stream a whole audio file with realtime pacing and block until the
    /// transfer and the server-side stream both complete.
    pub async fn call_file(&self, params: &SessionParams, path: impl AsRef<Path>) -> Result<ResultPack> {
        self.call_file_paced(params, path, DEFAULT_CHUNK_BYTES, DEFAULT_CHUNK_PACE)
            .await
    }

    /// [`call_file`](Self::call_file) with explicit chunk size and pacing.
    pub async fn call_file_paced(
        &self,
        params: &SessionParams,
        path: impl AsRef<Path>,
        chunk_bytes: usize,
        pace: Duration,
    ) -> Result<ResultPack> {
        if chunk_bytes == 0 {
            return Err(VocalinkError::invalid_argument("chunk_bytes must be > 0"));
        }
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            VocalinkError::invalid_argument(format!("cannot open {}: {e}", path.display()))
        })?;

        let pack = Arc::new(Mutex::new(ResultPack::default()));
        let request_id = self
            .core
            .begin(params, Box::new(PackListener(Arc::clone(&pack))))?;
        pack.lock().request_id = request_id.clone();

        let bridge = Arc::clone(&self.core.bridge);
        let latency = Arc::clone(&self.core.latency);
        let cancel = self.core.cancel_token();
        let io_error: Arc<Mutex<Option<VocalinkError>>> = Arc::new(Mutex::new(None));
        let io_slot = Arc::clone(&io_error);

        // Dedicated reader: fixed-size chunks, inter-chunk pacing, stops
        // issuing chunks once the session's cancel token fires.
        let reader = tokio::spawn(async move {
            let mut file = file;
            let mut buf = vec![0u8; chunk_bytes];
            loop {
                let n = tokio::select! {
                    _ = cancel.cancelled() => break,
                    read = file.read(&mut buf) => match read {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) => {
                            *io_slot.lock() =
                                Some(VocalinkError::transport_with_source("file read failed", e));
                            break;
                        }
                    },
                };
                latency.mark_start();
                if bridge.push(buf[..n].to_vec()).is_err() {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pace) => {}
                }
            }
            latency.mark_stop_requested();
            bridge.push_stop();
        });

        let outcome = self.core.gate.wait().await;
        let _ = reader.await;
        outcome?;
        if let Some(error) = io_error.lock().take() {
            return Err(error);
        }

        let pack = pack.lock().clone();
        tracing::info!(
            request_id = %request_id,
            sentences = pack.sentence_count(),
            "Batch call finished"
        );
        Ok(pack)
    }

    // ── Diagnostics ───────────────────────────────────────────────

    /// Stream start to first inbound result, milliseconds.
    pub fn first_package_delay(&self) -> Option<i64> {
        self.core.latency.first_package_delay()
    }

    /// Stop request to stream completion, milliseconds.
    pub fn last_package_delay(&self) -> Option<i64> {
        self.core.latency.last_package_delay()
    }

    /// Correlation token of the most recently started session.
    pub fn last_request_id(&self) -> Option<String> {
        self.core.latency.last_request_id()
    }
}

// ── Stream surface ─────────────────────────────────────────────────

/// Lazy, finite sequence of session results. Ends when the server-side
/// stream completes; yields the failure as its last item when it errors.
pub struct ResultStream {
    inner: UnboundedReceiverStream<Result<SessionResult>>,
}

impl futures_util::Stream for ResultStream {
    type Item = Result<SessionResult>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct StreamListener {
    tx: mpsc::UnboundedSender<Result<SessionResult>>,
}

impl SessionListener for StreamListener {
    fn on_event(&mut self, result: SessionResult) {
        let _ = self.tx.send(Ok(result));
    }

    fn on_error(&mut self, error: VocalinkError) {
        let _ = self.tx.send(Err(error));
    }

    // on_complete: dropping the sender when the dispatcher ends closes
    // the stream.
}

// ── Batch accumulation ─────────────────────────────────────────────

struct PackListener(Arc<Mutex<ResultPack>>);

impl SessionListener for PackListener {
    fn on_event(&mut self, result: SessionResult) {
        self.0.lock().absorb(&result);
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{
        final_result, init_logging, marker_result, params, partial_result, MockTransport,
        OpenScript, RecordingListener, SinkOp,
    };
    use crate::transport::InboundEvent;
    use std::io::Write;

    #[tokio::test]
    async fn frames_queued_during_handshake_arrive_in_order() {
        init_logging();
        let transport = MockTransport::scripted(OpenScript {
            delay: Duration::from_millis(50),
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport.clone());
        let (listener, recorded) = RecordingListener::new();

        session.start(&params(), listener).unwrap();
        session.send_audio_frame(vec![1]).unwrap();
        session.send_audio_frame(vec![2]).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        session.stop().await.unwrap();

        assert_eq!(
            transport.sent(0),
            vec![
                SinkOp::Frame(vec![1]),
                SinkOp::Frame(vec![2]),
                SinkOp::Finish
            ]
        );
        let recorded = recorded.lock();
        assert_eq!(recorded.completes, 1);
        assert!(recorded.errors.is_empty());
    }

    #[tokio::test]
    async fn stop_with_zero_frames_yields_one_terminal() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport);
        let (listener, recorded) = RecordingListener::new();

        session.start(&params(), listener).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.unwrap();

        let recorded = recorded.lock();
        assert_eq!(recorded.completes, 1);
        assert!(recorded.errors.is_empty());
        assert!(recorded.events.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_calls_while_idle_are_invalid_state() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport);

        assert!(matches!(
            session.send_audio_frame(vec![1]),
            Err(VocalinkError::InvalidState(_))
        ));
        assert!(matches!(
            session.stop().await,
            Err(VocalinkError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn second_stop_after_completion_is_invalid_state() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport);
        let (listener, _) = RecordingListener::new();

        session.start(&params(), listener).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.unwrap();
        assert!(matches!(
            session.stop().await,
            Err(VocalinkError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn start_while_started_is_invalid_state() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport);
        let (listener, _) = RecordingListener::new();
        let (second, _) = RecordingListener::new();

        session.start(&params(), listener).unwrap();
        assert!(matches!(
            session.start(&params(), second),
            Err(VocalinkError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn restart_does_not_leak_queued_frames() {
        let transport = Arc::new(MockTransport::default());
        transport.push_script(OpenScript {
            delay: Duration::from_millis(30),
            fail: Some(VocalinkError::transport("connect refused")),
            ..OpenScript::default()
        });
        transport.push_script(OpenScript::default());
        let session = RealtimeSession::new(transport.clone());

        // First session: frames queue, then the open fails.
        let (listener, recorded) = RecordingListener::new();
        session.start(&params(), listener).unwrap();
        session.send_audio_frame(vec![0xAA]).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(recorded.lock().errors.len(), 1);

        // Second session: only its own frames reach the transport.
        let (listener, _) = RecordingListener::new();
        session.start(&params(), listener).unwrap();
        session.send_audio_frame(vec![0xBB]).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.unwrap();

        assert_eq!(transport.open_count(), 1);
        assert_eq!(
            transport.sent(0),
            vec![SinkOp::Frame(vec![0xBB]), SinkOp::Finish]
        );
    }

    #[tokio::test]
    async fn transport_error_unblocks_stop_and_resets_state() {
        let transport = MockTransport::scripted(OpenScript {
            on_finish: vec![InboundEvent::Failed(VocalinkError::remote(
                "NetworkError",
                "connection reset",
            ))],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport);
        let (listener, recorded) = RecordingListener::new();

        session.start(&params(), listener).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = session.stop().await.unwrap_err();
        assert_eq!(err.code(), Some("NetworkError"));

        let recorded = recorded.lock();
        assert_eq!(recorded.errors.len(), 1);
        assert_eq!(recorded.completes, 0);
    }

    #[tokio::test]
    async fn stream_call_yields_filtered_results_then_ends() {
        let transport = MockTransport::scripted(OpenScript {
            on_finish: vec![
                partial_result("he"),
                marker_result(),
                final_result(0, "hello", true),
                InboundEvent::Completed,
            ],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport.clone());

        let audio = futures_util::stream::iter(vec![vec![1u8], vec![2u8]]);
        let mut results = session.stream_call(&params(), audio).unwrap();

        let mut texts = Vec::new();
        while let Some(item) = results.next().await {
            texts.push(item.unwrap().transcription.unwrap().text);
        }
        assert_eq!(texts, vec!["he", "hello"]);
        assert_eq!(
            transport.sent(0),
            vec![
                SinkOp::Frame(vec![1]),
                SinkOp::Frame(vec![2]),
                SinkOp::Finish
            ]
        );
    }

    #[tokio::test]
    async fn stream_call_surfaces_error_as_last_item() {
        let transport = MockTransport::scripted(OpenScript {
            on_finish: vec![InboundEvent::Failed(VocalinkError::transport("boom"))],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport);

        let audio = futures_util::stream::iter(vec![vec![1u8]]);
        let mut results = session.stream_call(&params(), audio).unwrap();

        let first = results.next().await.unwrap();
        assert!(first.is_err());
        assert!(results.next().await.is_none());
    }

    #[tokio::test]
    async fn call_file_accumulates_per_sentence_results() {
        let transport = MockTransport::scripted(OpenScript {
            on_finish: vec![
                partial_result("one"),
                final_result(0, "one.", true),
                final_result(1, "two.", true),
                final_result(2, "three.", true),
                marker_result(),
                InboundEvent::Completed,
            ],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport.clone());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 10]).unwrap();

        let pack = session
            .call_file_paced(&params(), file.path(), 4, Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(pack.sentence_count(), 3);
        assert_eq!(pack.transcriptions[2].text, "three.");
        assert!(pack.translations.iter().all(|t| t.is_some()));
        assert!(pack.usages.iter().all(|u| u.is_some()));
        assert_eq!(pack.request_id, session.last_request_id().unwrap());

        // 10 bytes in 4-byte chunks: 4 + 4 + 2, then the stop marker.
        assert_eq!(
            transport.sent(0),
            vec![
                SinkOp::Frame(vec![0; 4]),
                SinkOp::Frame(vec![0; 4]),
                SinkOp::Frame(vec![0; 2]),
                SinkOp::Finish
            ]
        );
    }

    #[tokio::test]
    async fn call_file_aborts_reader_on_transport_error() {
        let transport = MockTransport::scripted(OpenScript {
            immediate: vec![InboundEvent::Failed(VocalinkError::remote(
                "Throttled", "slow down",
            ))],
            on_finish: vec![],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport.clone());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 4000]).unwrap();

        let err = session
            .call_file_paced(&params(), file.path(), 4, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("Throttled"));

        // The cancel flag stopped the reader long before the file was done.
        assert!(transport.sent(0).len() < 1000);
    }

    #[tokio::test]
    async fn call_file_rejects_missing_file() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport);
        let err = session
            .call_file(&params(), "/no/such/file.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, VocalinkError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn diagnostics_populated_after_full_run() {
        let transport = MockTransport::scripted(OpenScript {
            on_finish: vec![final_result(0, "hi.", false), InboundEvent::Completed],
            ..OpenScript::default()
        });
        let session = RealtimeSession::new(transport);
        let (listener, _) = RecordingListener::new();

        assert!(session.last_request_id().is_none());
        session.start(&params(), listener).unwrap();
        session.send_audio_frame(vec![1]).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.unwrap();

        assert!(session.first_package_delay().unwrap() >= 0);
        assert!(session.last_package_delay().unwrap() >= 0);
        assert!(session.last_request_id().is_some());
    }

    #[tokio::test]
    async fn invalid_params_fail_fast_without_state_change() {
        let transport = MockTransport::scripted(OpenScript::default());
        let session = RealtimeSession::new(transport.clone());
        let (listener, _) = RecordingListener::new();

        let bad = SessionParams::new("", "zh");
        assert!(matches!(
            session.start(&bad, listener),
            Err(VocalinkError::InvalidArgument(_))
        ));
        assert_eq!(transport.open_count(), 0);

        // The controller is still usable.
        let (listener, _) = RecordingListener::new();
        session.start(&params(), listener).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.unwrap();
    }
}
