//! Voice Agent Facade (component H): the single ergonomic entry point
//! wiring the session, transcript assembler, segmentation engine, turn
//! detector and speaker registry together, and exposing the public
//! `on`/`once`/`off` event surface.
//!
//! Grounded on the teacher's `socket_mode::start_socket_mode` "connect,
//! then drain a loop" shape (§ session module docs), generalized one
//! level up: the facade's driver task drains `SessionMessage`s from the
//! session and fans each one out across E -> F -> G -> I before emitting
//! on the bus, the same way `start_socket_mode` drains Slack envelopes
//! and dispatches to `handle_event`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::AuthProvider;
use crate::bus::{EventBus, RtEvent, RtEventKind, ListenerId};
use crate::config::{RtConfig, TurnPolicyKind};
use crate::error::RtResult;
use crate::segmentation::{SegmentEvent, SegmentationConfig, SegmentationEngine};
use crate::session::{RtSession, SessionMessage};
use crate::speaker::SpeakerRegistry;
use crate::transcript::TranscriptAssembler;
use crate::turn::{SmartPolicy, SmartTurnClassifier, TurnContext, TurnDetector, TurnDetectorEvent, TurnPolicyChoice};
use crate::types::{FocusConfig, Segment, SessionState};
use crate::wire::{DownstreamFrame, UpstreamFrame};

/// The Δ applied per disfluency/punctuation signal under the adaptive
/// policy (§4.G). Not currently exposed as a config knob — the preset
/// table only varies timing, not this constant.
const ADAPTIVE_DELTA: f64 = 0.15;

/// Turn-closing debounce (§4.G): no word for this long after a close
/// decision before the turn is actually considered closed.
const MIN_QUIESCENCE_SECS: f64 = 0.05;

struct Inner {
    assembler: TranscriptAssembler,
    segmentation: SegmentationEngine,
    turn_detector: TurnDetector,
    speakers: SpeakerRegistry,
    last_segment: Option<Segment>,
    pcm_ring: VecDeque<i16>,
    pcm_ring_capacity: usize,
    sample_rate: u32,
    started_at: Instant,
}

impl Inner {
    fn now(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn push_audio(&mut self, samples: &[i16]) {
        if self.pcm_ring_capacity == 0 {
            return;
        }
        self.pcm_ring.extend(samples.iter().copied());
        while self.pcm_ring.len() > self.pcm_ring_capacity {
            self.pcm_ring.pop_front();
        }
    }
}

/// The primary client entry point.
#[derive(Clone)]
pub struct VoiceAgent {
    config: RtConfig,
    bus: EventBus,
    session: RtSession,
    inner: Arc<Mutex<Inner>>,
    driver: Arc<JoinHandle<()>>,
    turn_bounds: TurnBounds,
}

/// `end_of_utterance_silence_trigger`/`max_delay` snapshotted at connect
/// time, threaded into every `TurnContext` built by the driver task so
/// the adaptive policy's window clamp matches the configured bounds.
#[derive(Clone, Copy)]
struct TurnBounds {
    silence_trigger: f64,
    max_delay: f64,
}

impl VoiceAgent {
    /// Connect and begin streaming. `classifier` is only consulted when
    /// `config.turn.policy == Smart`; passing `None` there falls back to
    /// adaptive on first `EndOfUtterance` with a one-time warning (§4.G).
    pub async fn connect(
        config: RtConfig,
        auth: Arc<dyn AuthProvider>,
        classifier: Option<Arc<dyn SmartTurnClassifier>>,
    ) -> RtResult<Self> {
        config.validate()?;
        let endpoint = RtConfig::resolve_endpoint(None);

        let (session, mut message_rx) =
            RtSession::connect(&endpoint, auth, &config.recognition, &config.turn, &config.connection).await?;

        let bus = EventBus::new();

        let turn_choice = match config.turn.policy {
            TurnPolicyKind::Fixed => TurnPolicyChoice::Fixed,
            TurnPolicyKind::Adaptive => TurnPolicyChoice::Adaptive(ADAPTIVE_DELTA),
            TurnPolicyKind::External => TurnPolicyChoice::External,
            TurnPolicyKind::Smart => {
                TurnPolicyChoice::Smart(SmartPolicy::new(classifier, config.turn.smart_threshold as f64))
            }
        };

        let inner = Arc::new(Mutex::new(Inner {
            assembler: TranscriptAssembler::new(),
            segmentation: SegmentationEngine::new(
                SegmentationConfig {
                    max_intra_gap: config.turn.max_delay,
                    ..SegmentationConfig::default()
                },
                config.focus.clone(),
            ),
            turn_detector: TurnDetector::new(turn_choice, MIN_QUIESCENCE_SECS, config.turn.end_of_utterance_max_delay),
            speakers: SpeakerRegistry::with_known_speakers(config.recognition.known_speakers.clone()),
            last_segment: None,
            pcm_ring: VecDeque::new(),
            pcm_ring_capacity: (config.turn.smart_window_secs * config.recognition.sample_rate as f64) as usize,
            sample_rate: config.recognition.sample_rate,
            started_at: Instant::now(),
        }));

        let turn_bounds = TurnBounds {
            silence_trigger: config.turn.end_of_utterance_silence_trigger,
            max_delay: config.turn.max_delay,
        };

        let driver_inner = inner.clone();
        let driver_bus = bus.clone();
        let driver_session = session.clone();
        let driver = tokio::spawn(async move {
            let mut ceiling_ticker = tokio::time::interval(std::time::Duration::from_millis(50));
            loop {
                tokio::select! {
                    msg = message_rx.recv() => {
                        match msg {
                            Some(msg) => handle_session_message(&driver_inner, &driver_bus, &driver_session, msg, turn_bounds).await,
                            None => break,
                        }
                    }
                    _ = ceiling_ticker.tick() => {
                        check_timers(&driver_inner, &driver_bus, turn_bounds).await;
                    }
                }
            }
        });

        Ok(Self {
            config,
            bus,
            session,
            inner,
            driver: Arc::new(driver),
            turn_bounds,
        })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn config(&self) -> &RtConfig {
        &self.config
    }

    /// Stream one chunk of 16-bit PCM audio.
    pub async fn send_audio(&self, samples: &[i16]) -> RtResult<()> {
        self.inner.lock().await.push_audio(samples);
        self.session.send_audio(samples)?;
        Ok(())
    }

    /// Send a control frame not covered by a dedicated method
    /// (`SetRecognitionConfig`, `GetSpeakers`).
    pub async fn send_control(&self, frame: UpstreamFrame) -> RtResult<()> {
        self.session.send_control(frame).await
    }

    /// Update the per-speaker focus policy. Takes effect for segments
    /// opened after this call; never retroactively relabels already
    /// emitted segments (§4.I).
    pub async fn update_focus(&self, focus: FocusConfig) {
        self.inner.lock().await.segmentation.set_focus(focus);
    }

    /// Signal end of audio. When `end_of_turn` is true, also forces the
    /// current turn closed immediately regardless of policy — the only
    /// way to close a turn under the `external` policy.
    pub async fn finalize(&self, end_of_turn: bool) -> RtResult<()> {
        self.session.finalize().await?;
        if end_of_turn {
            let mut guard = self.inner.lock().await;
            let now = guard.now();
            let ctx = TurnContext {
                now,
                silence_trigger: self.turn_bounds.silence_trigger,
                max_delay: self.turn_bounds.max_delay,
                last_segment: guard.last_segment.as_ref(),
            };
            let events = guard.turn_detector.force_close(&ctx);
            drop(guard);
            for event in events {
                emit_turn_event(&self.bus, event).await;
            }
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> RtResult<()> {
        self.session.close().await
    }

    pub async fn on<F>(&self, kind: RtEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RtEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, listener).await
    }

    pub async fn once<F>(&self, kind: RtEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RtEvent) + Send + Sync + 'static,
    {
        self.bus.once(kind, listener).await
    }

    pub async fn off(&self, id: ListenerId) {
        self.bus.off(id).await
    }
}

async fn handle_session_message(
    inner: &Arc<Mutex<Inner>>,
    bus: &EventBus,
    session: &RtSession,
    msg: SessionMessage,
    turn_bounds: TurnBounds,
) {
    match msg {
        SessionMessage::StateChanged(state) => {
            bus.emit(RtEvent::SessionStateChanged { state }).await;
        }
        SessionMessage::Downstream(frame) => handle_downstream(inner, bus, session, frame, turn_bounds).await,
    }
}

async fn handle_downstream(
    inner: &Arc<Mutex<Inner>>,
    bus: &EventBus,
    session: &RtSession,
    frame: DownstreamFrame,
    turn_bounds: TurnBounds,
) {
    match frame {
        DownstreamFrame::RecognitionStarted { id, .. } => {
            bus.emit(RtEvent::RecognitionStarted { session_id: id }).await;
        }
        DownstreamFrame::AudioAdded { seq_no } => {
            if let Err(e) = session.acknowledge_audio(seq_no) {
                warn!(error = %e, seq_no, "audio sequence accounting mismatch");
            }
        }
        DownstreamFrame::AddPartialTranscript { results } => {
            apply_words(inner, bus, results, false, turn_bounds).await;
        }
        DownstreamFrame::AddTranscript { results } => {
            apply_words(inner, bus, results, true, turn_bounds).await;
        }
        DownstreamFrame::EndOfUtterance => {
            let mut guard = inner.lock().await;
            let now = guard.now();
            let last_segment = guard.last_segment.clone();
            let pcm: Vec<i16> = guard.pcm_ring.iter().copied().collect();
            let sample_rate = guard.sample_rate;
            drop(guard);

            let ctx = TurnContext {
                now,
                silence_trigger: turn_bounds.silence_trigger,
                max_delay: turn_bounds.max_delay,
                last_segment: last_segment.as_ref(),
            };

            let mut guard = inner.lock().await;
            let events = guard.turn_detector.on_end_of_utterance(&ctx, &pcm, sample_rate).await;
            drop(guard);
            for event in events {
                emit_turn_event(bus, event).await;
            }
        }
        DownstreamFrame::SpeakersResult { speakers } => {
            inner.lock().await.speakers.apply_speakers_result(speakers.clone());
            bus.emit(RtEvent::SpeakersResult { speakers }).await;
        }
        DownstreamFrame::Warning { reason, .. } => {
            bus.emit(RtEvent::Warning {
                reason: reason.unwrap_or_default(),
            })
            .await;
        }
        DownstreamFrame::Error { reason, .. } => {
            bus.emit(RtEvent::Error {
                reason: reason.unwrap_or_default(),
            })
            .await;
        }
        DownstreamFrame::EndOfTranscript => {
            let events = inner.lock().await.segmentation.finalize_all();
            for event in events {
                emit_segment_event(bus, event).await;
            }
        }
        DownstreamFrame::Unknown => {
            debug!("ignoring frame with unrecognized discriminator");
        }
    }
}

async fn apply_words(
    inner: &Arc<Mutex<Inner>>,
    bus: &EventBus,
    results: Vec<crate::types::Word>,
    is_final: bool,
    turn_bounds: TurnBounds,
) {
    if results.is_empty() {
        return;
    }
    let mut guard = inner.lock().await;
    let update = if is_final {
        guard.assembler.apply_final(results)
    } else {
        guard.assembler.apply_partial(results)
    };
    let segment_events = guard.segmentation.on_words_updated(&update);

    for event in &segment_events {
        let segment = match event {
            SegmentEvent::Partial(s) | SegmentEvent::Final(s) => s,
        };
        guard.last_segment = Some(segment.clone());
    }

    let now = guard.now();
    let last_segment = guard.last_segment.clone();
    let ctx = TurnContext {
        now,
        silence_trigger: turn_bounds.silence_trigger,
        max_delay: turn_bounds.max_delay,
        last_segment: last_segment.as_ref(),
    };
    let turn_events = guard.turn_detector.on_word(&ctx);
    drop(guard);

    for event in segment_events {
        emit_segment_event(bus, event).await;
    }
    for event in turn_events {
        emit_turn_event(bus, event).await;
    }
}

async fn check_timers(inner: &Arc<Mutex<Inner>>, bus: &EventBus, turn_bounds: TurnBounds) {
    let mut guard = inner.lock().await;
    let now = guard.now();
    let ceiling_events = guard.turn_detector.check_ceiling(now);
    let last_segment = guard.last_segment.clone();
    let timer_fired_events = guard.turn_detector.on_timer_fired(&TurnContext {
        now,
        silence_trigger: turn_bounds.silence_trigger,
        max_delay: turn_bounds.max_delay,
        last_segment: last_segment.as_ref(),
    });
    let segment_events = guard.segmentation.on_timer_tick(now);
    drop(guard);

    for event in ceiling_events.into_iter().chain(timer_fired_events) {
        emit_turn_event(bus, event).await;
    }
    for event in segment_events {
        emit_segment_event(bus, event).await;
    }
}

async fn emit_segment_event(bus: &EventBus, event: SegmentEvent) {
    match event {
        SegmentEvent::Partial(segment) => bus.emit(RtEvent::AddPartialSegment { segment }).await,
        SegmentEvent::Final(segment) => bus.emit(RtEvent::AddSegment { segment }).await,
    }
}

async fn emit_turn_event(bus: &EventBus, event: TurnDetectorEvent) {
    match event {
        TurnDetectorEvent::EndOfTurn { turn_id } => bus.emit(RtEvent::EndOfTurn { turn_id }).await,
        TurnDetectorEvent::EndOfTurnPrediction { turn_id, window_secs } => {
            bus.emit(RtEvent::EndOfTurnPrediction { turn_id, window_secs }).await
        }
    }
}
