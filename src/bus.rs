//! Typed event bus (component B): register/dispatch listeners with
//! `on`/`once`/`off` semantics.
//!
//! Grounded on `src/orchestrator/bus.rs`'s channel-backed message registry
//! and `src/server/voice_ws.rs`'s tagged event enums, generalized into a
//! typed pub/sub registry keyed by event discriminant rather than a single
//! mpsc channel — the facade has many independent listener slots (segments,
//! turns, warnings, state changes) that callers register/unregister
//! independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::types::{Segment, SessionState, SpeakerIdentifier};

/// Events the facade can emit. String discriminators stay at the wire
/// boundary (`wire.rs`); this is the typed public boundary (Design Notes §9).
#[derive(Debug, Clone)]
pub enum RtEvent {
    RecognitionStarted { session_id: String },
    AddPartialSegment { segment: Segment },
    AddSegment { segment: Segment },
    EndOfTurn { turn_id: u64 },
    EndOfTurnPrediction { turn_id: u64, window_secs: f64 },
    SpeakersResult { speakers: Vec<SpeakerIdentifier> },
    Warning { reason: String },
    Error { reason: String },
    SessionStateChanged { state: SessionState },
}

/// Discriminant used to key listener registration, independent of any
/// particular event's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtEventKind {
    RecognitionStarted,
    AddPartialSegment,
    AddSegment,
    EndOfTurn,
    EndOfTurnPrediction,
    SpeakersResult,
    Warning,
    Error,
    SessionStateChanged,
}

impl RtEvent {
    pub fn kind(&self) -> RtEventKind {
        match self {
            RtEvent::RecognitionStarted { .. } => RtEventKind::RecognitionStarted,
            RtEvent::AddPartialSegment { .. } => RtEventKind::AddPartialSegment,
            RtEvent::AddSegment { .. } => RtEventKind::AddSegment,
            RtEvent::EndOfTurn { .. } => RtEventKind::EndOfTurn,
            RtEvent::EndOfTurnPrediction { .. } => RtEventKind::EndOfTurnPrediction,
            RtEvent::SpeakersResult { .. } => RtEventKind::SpeakersResult,
            RtEvent::Warning { .. } => RtEventKind::Warning,
            RtEvent::Error { .. } => RtEventKind::Error,
            RtEvent::SessionStateChanged { .. } => RtEventKind::SessionStateChanged,
        }
    }
}

/// Opaque handle returned by `on`/`once`, accepted by `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Listener = Arc<dyn Fn(&RtEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

/// Typed listener registry. Cheap to clone — internally `Arc`-backed.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<HashMap<RtEventKind, Vec<Registration>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent listener for `kind`.
    pub async fn on<F>(&self, kind: RtEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RtEvent) + Send + Sync + 'static,
    {
        self.register(kind, listener, false).await
    }

    /// Register a listener that self-deregisters after its first invocation.
    pub async fn once<F>(&self, kind: RtEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RtEvent) + Send + Sync + 'static,
    {
        self.register(kind, listener, true).await
    }

    async fn register<F>(&self, kind: RtEventKind, listener: F, once: bool) -> ListenerId
    where
        F: Fn(&RtEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        let mut guard = self.listeners.lock().await;
        guard.entry(kind).or_default().push(Registration {
            id,
            listener: Arc::new(listener),
            once,
        });
        id
    }

    /// Deregister a listener previously returned by `on`/`once`.
    pub async fn off(&self, id: ListenerId) {
        let mut guard = self.listeners.lock().await;
        for regs in guard.values_mut() {
            regs.retain(|r| r.id != id);
        }
    }

    /// Dispatch `event` to every listener registered for its kind, in
    /// registration order. `once` listeners are removed after firing.
    pub async fn emit(&self, event: RtEvent) {
        let kind = event.kind();
        let mut guard = self.listeners.lock().await;
        let Some(regs) = guard.get_mut(&kind) else {
            trace!(?kind, "event emitted with no registered listeners");
            return;
        };
        if regs.is_empty() {
            trace!(?kind, "event emitted with no registered listeners");
        }
        for reg in regs.iter() {
            (reg.listener)(&event);
        }
        regs.retain(|r| !r.once);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn on_receives_every_emission() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.on(RtEventKind::EndOfTurn, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        bus.emit(RtEvent::EndOfTurn { turn_id: 0 }).await;
        bus.emit(RtEvent::EndOfTurn { turn_id: 1 }).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn once_fires_exactly_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.once(RtEventKind::EndOfTurn, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        bus.emit(RtEvent::EndOfTurn { turn_id: 0 }).await;
        bus.emit(RtEvent::EndOfTurn { turn_id: 1 }).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_deregisters_listener() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let id = bus
            .on(RtEventKind::Warning, move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        bus.off(id).await;
        bus.emit(RtEvent::Warning {
            reason: "test".into(),
        })
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
