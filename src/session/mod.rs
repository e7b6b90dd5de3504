//! RT Session (component D): owns the WebSocket connection and its state
//! machine. The hardest component — grounded on the teacher's
//! `messaging::slack::socket_mode::start_socket_mode` loop (connect, then
//! `while let Some(msg) = ws_stream.next().await`) generalized into a
//! dedicated task that also accepts outbound traffic, instead of only
//! reading.
//!
//! A single spawned task owns the `WebSocketStream`; the public
//! [`RtSession`] handle only ever talks to it through channels, so there
//! is exactly one task ever calling `.next()`/`.send()` on the socket —
//! no contested ownership, no interleaving races (§5).

pub mod queue;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::auth::AuthProvider;
use crate::config::{ConnectionConfig, RecognitionConfig, TurnConfig};
use crate::error::{RtError, RtResult};
use crate::types::SessionState;
use crate::wire::{self, AudioEncoding, AudioFormat, DownstreamFrame, TranscriptionConfig, UpstreamFrame};

use queue::AudioSeqTracker;
use state::validate_transition;

/// Drive the session's state watch channel through a validated
/// transition, logging (not panicking) if the loop's own bookkeeping
/// ever attempts an illegal one — a bug in the loop, not a caller error.
fn transition(state_tx: &watch::Sender<SessionState>, next: SessionState) {
    let current = *state_tx.borrow();
    if let Err(e) = validate_transition(current, next) {
        warn!(error = %e, "session loop attempted an invalid state transition");
        return;
    }
    let _ = state_tx.send(next);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything the session loop hands upward, consumed by the facade to
/// drive the transcript assembler, segmentation engine, turn detector and
/// speaker registry.
#[derive(Debug)]
pub enum SessionMessage {
    Downstream(DownstreamFrame),
    StateChanged(SessionState),
}

enum OutboundControl {
    Frame(UpstreamFrame),
    Close,
}

/// A live connection to the recognition service. Cheap to clone; clones
/// share the same underlying task and channels.
#[derive(Clone)]
pub struct RtSession {
    control_tx: mpsc::Sender<OutboundControl>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    state_rx: watch::Receiver<SessionState>,
    seq_tracker: Arc<std::sync::Mutex<AudioSeqTracker>>,
    close_timeout: Duration,
}

impl RtSession {
    /// Open a connection, perform the `StartRecognition` handshake, and
    /// spawn the owning task. Returns the handle plus the channel the
    /// caller drains for downstream traffic.
    pub async fn connect(
        endpoint: &str,
        auth: Arc<dyn AuthProvider>,
        recognition: &RecognitionConfig,
        turn: &TurnConfig,
        connection: &ConnectionConfig,
    ) -> RtResult<(Self, mpsc::Receiver<SessionMessage>)> {
        let mut url = build_connect_url(endpoint, connection, None)?;
        let credential = auth.credential().await?;
        if connection.auth_via_query_param {
            url.query_pairs_mut().append_pair("jwt", &credential.token);
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(RtError::Transport)?;
        if !connection.auth_via_query_param {
            let header_value = HeaderValue::from_str(&format!("Bearer {}", credential.token))
                .map_err(|e| RtError::Auth(format!("invalid bearer token: {e}")))?;
            request.headers_mut().insert("Authorization", header_value);
        }

        let connect_fut = connect_async(request);
        let (ws_stream, _response) = timeout(Duration::from_millis(connection.open_timeout_ms), connect_fut)
            .await
            .map_err(|_| RtError::Timeout("connect".into()))?
            .map_err(RtError::Transport)?;

        let (control_tx, control_rx) = mpsc::channel(32);
        let (audio_tx, audio_rx) = mpsc::channel(connection.max_inflight_audio_frames as usize);
        let (message_tx, message_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let seq_tracker = Arc::new(std::sync::Mutex::new(AudioSeqTracker::new()));

        let audio_format = AudioFormat {
            kind: "raw",
            encoding: AudioEncoding::PcmS16le,
            sample_rate: recognition.sample_rate,
        };
        let transcription_config = build_transcription_config(recognition, turn);

        let session = Self {
            control_tx: control_tx.clone(),
            audio_tx,
            state_rx: state_rx.clone(),
            seq_tracker: seq_tracker.clone(),
            close_timeout: Duration::from_millis(connection.close_timeout_ms),
        };

        let loop_config = LoopConfig {
            ping_interval: Duration::from_millis(connection.ping_interval_ms),
            ping_timeout: Duration::from_millis(connection.ping_timeout_ms),
        };

        tokio::spawn(run_session_loop(
            ws_stream,
            control_rx,
            audio_rx,
            message_tx,
            state_tx,
            loop_config,
        ));

        session
            .send_control(UpstreamFrame::StartRecognition {
                audio_format,
                transcription_config,
            })
            .await?;

        // Block until the handshake completes (or fails) so the returned
        // handle is immediately usable for `send_audio` — the loop only
        // forwards audio once it has seen `RecognitionStarted` (see the
        // `audio_rx` select arm's state guard). Watching the state
        // channel directly, rather than draining `message_rx` here,
        // leaves the `RecognitionStarted` message itself in the queue for
        // the caller (typically the facade) to consume and emit on the
        // bus.
        let mut handshake_watch = state_rx.clone();
        timeout(
            Duration::from_millis(connection.open_timeout_ms),
            handshake_watch.wait_for(|s| matches!(s, SessionState::Started | SessionState::Failed)),
        )
        .await
        .map_err(|_| RtError::Timeout("handshake".into()))?
        .map_err(|_| RtError::InvalidState("session loop exited during handshake".into()))?;

        if *handshake_watch.borrow() == SessionState::Failed {
            return Err(RtError::Auth("connection failed during handshake".into()));
        }

        Ok((session, message_rx))
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes; the returned receiver yields the
    /// current value immediately, then every subsequent change.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Enqueue one audio frame. Rejects with `Backpressure` immediately
    /// if the outbound queue is full rather than blocking the caller
    /// (§5: "send_audio never blocks past the configured bound").
    pub fn send_audio(&self, samples: &[i16]) -> RtResult<u64> {
        if !self.state().accepts_traffic() {
            return Err(RtError::InvalidState(format!(
                "cannot send audio while session is {:?}",
                self.state()
            )));
        }
        let seq = self
            .seq_tracker
            .lock()
            .expect("seq tracker mutex poisoned")
            .allocate();
        let bytes = wire::encode_samples_i16le(samples);
        self.audio_tx
            .try_send(bytes)
            .map_err(|_| RtError::Backpressure)?;
        Ok(seq)
    }

    /// Send a control frame (`SetRecognitionConfig`, `GetSpeakers`).
    /// Control traffic is always prioritized over audio inside the
    /// session loop (§5).
    pub async fn send_control(&self, frame: UpstreamFrame) -> RtResult<()> {
        self.control_tx
            .send(OutboundControl::Frame(frame))
            .await
            .map_err(|_| RtError::InvalidState("session loop has already exited".into()))
    }

    /// Signal end of audio input. Sends `EndOfStream { last_seq }` and
    /// moves the session to `draining`; the loop transitions to `closed`
    /// once `EndOfTranscript` arrives or `close_timeout` elapses.
    pub async fn finalize(&self) -> RtResult<()> {
        let last_seq = self
            .seq_tracker
            .lock()
            .expect("seq tracker mutex poisoned")
            .last_allocated();
        self.send_control(UpstreamFrame::EndOfStream { last_seq }).await
    }

    /// Feed an `AudioAdded { seq_no }` acknowledgment back into the
    /// sequence tracker (property 1). Called by the facade as it drains
    /// `SessionMessage::Downstream`.
    pub fn acknowledge_audio(&self, seq_no: u64) -> RtResult<()> {
        self.seq_tracker
            .lock()
            .expect("seq tracker mutex poisoned")
            .acknowledge(seq_no)
    }

    /// Close the connection immediately, bounded by `close_timeout`.
    pub async fn close(&self) -> RtResult<()> {
        let _ = timeout(self.close_timeout, self.control_tx.send(OutboundControl::Close)).await;
        Ok(())
    }
}

fn build_transcription_config(recognition: &RecognitionConfig, turn: &TurnConfig) -> TranscriptionConfig {
    TranscriptionConfig {
        language: recognition.language.clone(),
        operating_point: recognition.operating_point,
        domain: recognition.domain.clone(),
        output_locale: recognition.output_locale.clone(),
        max_delay: turn.max_delay,
        end_of_utterance_silence_trigger: turn.end_of_utterance_silence_trigger,
        end_of_utterance_max_delay: Some(turn.end_of_utterance_max_delay),
        enable_diarization: recognition.enable_diarization,
        speaker_sensitivity: recognition.speaker_sensitivity,
        max_speakers: recognition.max_speakers,
        prefer_current_speaker: recognition.prefer_current_speaker,
        additional_vocab: recognition.additional_vocab.clone(),
        punctuation_overrides: recognition.punctuation_overrides.clone(),
        include_results: recognition.include_results,
    }
}

/// Build the upgrade request URL: validates the scheme, annotates with
/// `app_id` when configured (§4.D), and appends `?jwt=<token>` when
/// header auth is unavailable (§6). `jwt` is `Some` only when
/// `auth_via_query_param` is set.
fn build_connect_url(endpoint: &str, connection: &ConnectionConfig, jwt: Option<&str>) -> RtResult<url::Url> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| RtError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(RtError::Configuration(format!(
            "endpoint '{endpoint}' must use the ws:// or wss:// scheme"
        )));
    }
    if let Some(app_id) = &connection.app_id {
        url.query_pairs_mut().append_pair("sm-app", app_id);
    }
    if let Some(token) = jwt {
        url.query_pairs_mut().append_pair("jwt", token);
    }
    Ok(url)
}

struct LoopConfig {
    ping_interval: Duration,
    ping_timeout: Duration,
}

/// The task that owns the socket. Biased `select!` always drains control
/// traffic ahead of audio, matching §5's priority rule.
async fn run_session_loop(
    mut ws: WsStream,
    mut control_rx: mpsc::Receiver<OutboundControl>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    message_tx: mpsc::Sender<SessionMessage>,
    state_tx: watch::Sender<SessionState>,
    loop_config: LoopConfig,
) {
    let mut ping_ticker = interval(loop_config.ping_interval);
    let mut last_pong = tokio::time::Instant::now();

    loop {
        tokio::select! {
            biased;

            maybe_ctrl = control_rx.recv() => {
                match maybe_ctrl {
                    Some(OutboundControl::Frame(frame)) => {
                        if let Err(e) = send_frame(&mut ws, &frame).await {
                            report_failure(&message_tx, &state_tx, e).await;
                            break;
                        }
                        if matches!(frame, UpstreamFrame::EndOfStream { .. }) {
                            transition(&state_tx, SessionState::Draining);
                            let _ = message_tx.send(SessionMessage::StateChanged(SessionState::Draining)).await;
                        }
                    }
                    Some(OutboundControl::Close) => break,
                    None => break,
                }
            }

            // Draining still drains already-queued frames (§4.D: "continues
            // delivering already-queued frames until audio_seq_acked ==
            // last_seq"); `send_audio`'s own `accepts_traffic` check is what
            // stops new frames from being enqueued once draining starts.
            maybe_audio = audio_rx.recv(), if matches!(*state_tx.borrow(), SessionState::Started | SessionState::Draining) => {
                match maybe_audio {
                    Some(bytes) => {
                        if let Err(e) = ws.send(WsMessage::Binary(bytes.into())).await {
                            report_failure(&message_tx, &state_tx, RtError::Transport(e)).await;
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_ticker.tick() => {
                if last_pong.elapsed() > loop_config.ping_timeout {
                    report_failure(&message_tx, &state_tx, RtError::Timeout("ping".into())).await;
                    break;
                }
                if ws.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            incoming = ws.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match wire::decode_downstream(&text) {
                            Ok(frame) => {
                                let is_end = matches!(frame, DownstreamFrame::EndOfTranscript);
                                if matches!(frame, DownstreamFrame::RecognitionStarted { .. }) {
                                    transition(&state_tx, SessionState::Started);
                                }
                                if message_tx.send(SessionMessage::Downstream(frame)).await.is_err() {
                                    break;
                                }
                                if is_end {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "dropping malformed downstream frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        last_pong = tokio::time::Instant::now();
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        report_failure(&message_tx, &state_tx, RtError::Transport(e)).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = ws.close(None).await;
    if *state_tx.borrow() != SessionState::Failed {
        transition(&state_tx, SessionState::Closed);
        let _ = message_tx
            .send(SessionMessage::StateChanged(SessionState::Closed))
            .await;
    }
    trace!("session loop exited");
}

async fn send_frame(ws: &mut WsStream, frame: &UpstreamFrame) -> RtResult<()> {
    let text = wire::encode_upstream(frame)?;
    ws.send(WsMessage::Text(text.into())).await.map_err(RtError::Transport)
}

async fn report_failure(message_tx: &mpsc::Sender<SessionMessage>, state_tx: &watch::Sender<SessionState>, err: RtError) {
    error!(error = %err, "session transport failure");
    transition(state_tx, SessionState::Failed);
    let _ = message_tx
        .send(SessionMessage::StateChanged(SessionState::Failed))
        .await;
}
