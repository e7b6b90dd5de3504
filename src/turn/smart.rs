//! Smart policy: delegate the close/no-close decision to a pluggable
//! classifier fed the trailing audio around an `EndOfUtterance` (§4.G
//! Smart). Mirrors the teacher's `async_trait`-based pluggable-backend
//! pattern used for chat providers — callers bring their own model, the
//! crate only defines the contract.
//!
//! `SmartPolicy` is deliberately not a [`super::TurnPolicy`]: classifying
//! requires an async model call, so [`TurnDetector`](super::TurnDetector)
//! awaits it directly rather than through the synchronous trait.

use async_trait::async_trait;

use crate::error::{RtError, RtResult};

use super::{TurnAction, TurnContext};

/// A pluggable turn-completion classifier. Implementations typically wrap
/// a local ONNX/Candle model or a remote inference endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmartTurnClassifier: Send + Sync {
    /// Warm up the classifier (load weights, open a connection). Called
    /// once, lazily, on first use.
    async fn load(&self) -> RtResult<()>;

    /// Returns the probability in `[0, 1]` that the turn has completed,
    /// given the trailing PCM audio around the `EndOfUtterance` boundary.
    async fn infer(&self, pcm: &[i16], sample_rate: u32) -> RtResult<f64>;
}

pub struct SmartPolicy {
    classifier: Option<std::sync::Arc<dyn SmartTurnClassifier>>,
    threshold: f64,
    loaded: bool,
}

impl SmartPolicy {
    pub fn new(classifier: Option<std::sync::Arc<dyn SmartTurnClassifier>>, threshold: f64) -> Self {
        Self {
            classifier,
            threshold,
            loaded: false,
        }
    }

    pub fn on_word(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }

    pub fn on_timer_fired(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }

    /// Runs on every `EndOfUtterance`. Returns `Err(CapabilityAbsent)` if
    /// no classifier was configured, letting the caller fall back.
    pub async fn decide(&mut self, _ctx: &TurnContext, pcm: &[i16], sample_rate: u32) -> RtResult<TurnAction> {
        let classifier = self
            .classifier
            .clone()
            .ok_or(RtError::CapabilityAbsent)?;

        if !self.loaded {
            classifier.load().await?;
            self.loaded = true;
        }

        let probability = classifier.infer(pcm, sample_rate).await?;
        if probability >= self.threshold {
            Ok(TurnAction::CloseTurn)
        } else {
            Ok(TurnAction::None)
        }
    }
}
