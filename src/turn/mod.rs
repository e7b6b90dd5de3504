//! Turn detector (component G): four interchangeable policies decide
//! when the current speaker has finished a conversational turn, emitting
//! `EndOfTurn` exactly once per turn.

pub mod adaptive;
pub mod external;
pub mod fixed;
pub mod smart;

use std::time::Duration;

use tracing::warn;

use crate::types::Segment;

pub use adaptive::AdaptivePolicy;
pub use external::ExternalPolicy;
pub use fixed::FixedPolicy;
pub use smart::{SmartPolicy, SmartTurnClassifier};

/// Everything a policy needs to make a decision, snapshotted at call time
/// (§5: "within an event, all fields are observed atomically").
pub struct TurnContext<'a> {
    pub now: f64,
    pub silence_trigger: f64,
    pub max_delay: f64,
    pub last_segment: Option<&'a Segment>,
}

/// A policy's decision for one callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnAction {
    None,
    OpenPrediction(Duration),
    CancelPrediction,
    CloseTurn,
}

/// One of the three purely-synchronous policies (`Smart` is handled
/// separately in `TurnDetector` since it requires an async classifier
/// call — see module docs on `smart`).
pub trait TurnPolicy: Send {
    fn on_end_of_utterance(&mut self, ctx: &TurnContext) -> TurnAction;
    fn on_word(&mut self, ctx: &TurnContext) -> TurnAction;
    fn on_timer_fired(&mut self, ctx: &TurnContext) -> TurnAction;
}

/// Events the detector emits, handed to the facade for bus dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnDetectorEvent {
    EndOfTurn { turn_id: u64 },
    EndOfTurnPrediction { turn_id: u64, window_secs: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closing,
}

enum Engine {
    Policy(Box<dyn TurnPolicy>),
    Smart(SmartPolicy),
}

/// Dedup/closing state machine shared by every policy: `open → closing`
/// at policy decision, `closing → closed` once no word has arrived for
/// `min_quiescence`. `EndOfTurn` fires exactly once per `closed`
/// transition, `turn_id` monotonically increasing from 0.
pub struct TurnDetector {
    engine: Engine,
    lifecycle: Lifecycle,
    turn_id: u64,
    turn_opened_at: f64,
    last_word_at: f64,
    closing_decided_at: Option<f64>,
    min_quiescence: f64,
    ceiling: f64,
    warned_capability_absent: bool,
}

impl TurnDetector {
    pub fn new(engine_kind: TurnPolicyChoice, min_quiescence: f64, ceiling: f64) -> Self {
        let engine = match engine_kind {
            TurnPolicyChoice::Fixed => Engine::Policy(Box::new(FixedPolicy::new())),
            TurnPolicyChoice::Adaptive(delta) => Engine::Policy(Box::new(AdaptivePolicy::new(delta))),
            TurnPolicyChoice::External => Engine::Policy(Box::new(ExternalPolicy::new())),
            TurnPolicyChoice::Smart(policy) => Engine::Smart(policy),
        };
        Self {
            engine,
            lifecycle: Lifecycle::Open,
            turn_id: 0,
            turn_opened_at: 0.0,
            last_word_at: 0.0,
            closing_decided_at: None,
            min_quiescence,
            ceiling,
            warned_capability_absent: false,
        }
    }

    pub fn current_turn_id(&self) -> u64 {
        self.turn_id
    }

    /// A new word arrived. Cancels any pending prediction window.
    pub fn on_word(&mut self, ctx: &TurnContext) -> Vec<TurnDetectorEvent> {
        self.last_word_at = ctx.now;
        let action = match &mut self.engine {
            Engine::Policy(p) => p.on_word(ctx),
            Engine::Smart(p) => p.on_word(ctx),
        };
        self.apply(action, ctx)
    }

    /// The server's own silence-based endpointing fired. For `Smart`
    /// this awaits the classifier; for the other three it's a pure,
    /// synchronous decision.
    pub async fn on_end_of_utterance(&mut self, ctx: &TurnContext, pcm: &[i16], sample_rate: u32) -> Vec<TurnDetectorEvent> {
        let action = match &mut self.engine {
            Engine::Policy(p) => p.on_end_of_utterance(ctx),
            Engine::Smart(p) => {
                match p.decide(ctx, pcm, sample_rate).await {
                    Ok(action) => action,
                    Err(_) => {
                        if !self.warned_capability_absent {
                            warn!("smart-turn classifier unavailable, falling back to adaptive");
                            self.warned_capability_absent = true;
                        }
                        self.engine = Engine::Policy(Box::new(AdaptivePolicy::new(0.15)));
                        match &mut self.engine {
                            Engine::Policy(p) => p.on_end_of_utterance(ctx),
                            Engine::Smart(_) => unreachable!(),
                        }
                    }
                }
            }
        };
        self.apply(action, ctx)
    }

    /// A scheduled timer fired (adaptive prediction window expiry, smart
    /// window not applicable). Drives the policy's own timer logic and
    /// the shared quiescence check.
    pub fn on_timer_fired(&mut self, ctx: &TurnContext) -> Vec<TurnDetectorEvent> {
        let action = match &mut self.engine {
            Engine::Policy(p) => p.on_timer_fired(ctx),
            Engine::Smart(p) => p.on_timer_fired(ctx),
        };
        let mut events = self.apply(action, ctx);
        events.extend(self.check_quiescence(ctx.now));
        events
    }

    /// Explicit client-driven close (facade `finalize(end_of_turn=true)`,
    /// used directly by the `External` policy and available to any
    /// policy as an override).
    pub fn force_close(&mut self, ctx: &TurnContext) -> Vec<TurnDetectorEvent> {
        self.apply(TurnAction::CloseTurn, ctx)
    }

    /// Hard ceiling (`end_of_utterance_max_delay`): any open turn closes
    /// regardless of policy once it has been open this long.
    pub fn check_ceiling(&mut self, now: f64) -> Vec<TurnDetectorEvent> {
        if self.lifecycle == Lifecycle::Open && now - self.turn_opened_at > self.ceiling {
            let ctx = TurnContext {
                now,
                silence_trigger: 0.0,
                max_delay: self.ceiling,
                last_segment: None,
            };
            return self.apply(TurnAction::CloseTurn, &ctx);
        }
        Vec::new()
    }

    /// Periodic check for the closing→closed debounce; call after any
    /// time has elapsed without necessarily having a new event.
    pub fn check_quiescence(&mut self, now: f64) -> Vec<TurnDetectorEvent> {
        if self.lifecycle != Lifecycle::Closing {
            return Vec::new();
        }
        let quiet_since = self.closing_decided_at.unwrap_or(now).max(self.last_word_at);
        if now - quiet_since >= self.min_quiescence {
            return self.close_now();
        }
        Vec::new()
    }

    fn apply(&mut self, action: TurnAction, ctx: &TurnContext) -> Vec<TurnDetectorEvent> {
        match action {
            TurnAction::None => Vec::new(),
            TurnAction::OpenPrediction(window) => {
                vec![TurnDetectorEvent::EndOfTurnPrediction {
                    turn_id: self.turn_id,
                    window_secs: window.as_secs_f64(),
                }]
            }
            TurnAction::CancelPrediction => {
                if self.lifecycle == Lifecycle::Closing {
                    self.lifecycle = Lifecycle::Open;
                    self.closing_decided_at = None;
                }
                Vec::new()
            }
            TurnAction::CloseTurn => {
                if self.lifecycle == Lifecycle::Open {
                    self.lifecycle = Lifecycle::Closing;
                    self.closing_decided_at = Some(ctx.now);
                }
                self.check_quiescence(ctx.now)
            }
        }
    }

    fn close_now(&mut self) -> Vec<TurnDetectorEvent> {
        let turn_id = self.turn_id;
        self.turn_id += 1;
        self.lifecycle = Lifecycle::Open;
        self.closing_decided_at = None;
        self.turn_opened_at = self.last_word_at;
        vec![TurnDetectorEvent::EndOfTurn { turn_id }]
    }
}

/// Selects which policy a `TurnDetector` runs.
pub enum TurnPolicyChoice {
    Fixed,
    /// `delta` is the adjustment applied per disfluency/punctuation signal
    /// (§4.G Adaptive).
    Adaptive(f64),
    External,
    Smart(SmartPolicy),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(now: f64) -> TurnContext<'static> {
        TurnContext {
            now,
            silence_trigger: 0.2,
            max_delay: 1.0,
            last_segment: None,
        }
    }

    #[test]
    fn fixed_policy_closes_immediately_after_quiescence() {
        let mut detector = TurnDetector::new(TurnPolicyChoice::Fixed, 0.05, 10.0);
        let events = futures_block_on_end_of_utterance(&mut detector, &ctx(1.0));
        assert!(events.is_empty(), "CloseTurn without elapsed quiescence emits nothing yet");
        let events = detector.check_quiescence(1.06);
        assert_eq!(events, vec![TurnDetectorEvent::EndOfTurn { turn_id: 0 }]);
        assert_eq!(detector.current_turn_id(), 1);
    }

    #[test]
    fn external_policy_ignores_server_eou_until_forced() {
        let mut detector = TurnDetector::new(TurnPolicyChoice::External, 0.05, 10.0);
        for t in [1.0, 2.0, 3.0] {
            let events = futures_block_on_end_of_utterance(&mut detector, &ctx(t));
            assert!(events.is_empty());
            assert!(detector.check_quiescence(t + 0.1).is_empty());
        }
        let events = detector.force_close(&ctx(4.0));
        let events = if events.is_empty() {
            detector.check_quiescence(4.06)
        } else {
            events
        };
        assert_eq!(events, vec![TurnDetectorEvent::EndOfTurn { turn_id: 0 }]);
    }

    #[test]
    fn turn_ids_increase_monotonically_with_no_gaps() {
        let mut detector = TurnDetector::new(TurnPolicyChoice::Fixed, 0.0, 10.0);
        let mut ids = Vec::new();
        for t in 0..5 {
            let now = t as f64 * 2.0;
            futures_block_on_end_of_utterance(&mut detector, &ctx(now));
            let events = detector.check_quiescence(now);
            for e in events {
                if let TurnDetectorEvent::EndOfTurn { turn_id } = e {
                    ids.push(turn_id);
                }
            }
        }
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ceiling_force_closes_a_stuck_open_turn() {
        let mut detector = TurnDetector::new(TurnPolicyChoice::External, 0.0, 2.0);
        assert!(detector.check_ceiling(1.0).is_empty());
        let events = detector.check_ceiling(2.5);
        assert_eq!(events, vec![TurnDetectorEvent::EndOfTurn { turn_id: 0 }]);
    }

    /// Drives the async `on_end_of_utterance` path for policies that never
    /// actually await (Fixed/Adaptive/External), without pulling in a full
    /// executor for unit tests.
    fn futures_block_on_end_of_utterance(detector: &mut TurnDetector, ctx: &TurnContext) -> Vec<TurnDetectorEvent> {
        let fut = detector.on_end_of_utterance(ctx, &[], 16_000);
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
