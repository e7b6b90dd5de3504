//! voice-rt-core — streaming transcription session, segmentation, and
//! turn-detection core for a real-time voice agent.
//!
//! Wires a WebSocket-based real-time speech recognition service into a
//! coherent, ordered stream of segments and turn boundaries:
//!
//! - [`session`] owns the connection and its state machine (component D)
//! - [`wire`] is the frame codec, JSON control frames plus raw PCM (A)
//! - [`bus`] is the typed listener registry the facade dispatches on (B)
//! - [`auth`] supplies bearer credentials per connection (C)
//! - [`transcript`] reconciles partial/final words into an ordered buffer (E)
//! - [`segmentation`] groups words into per-speaker segments (F)
//! - [`turn`] decides when a speaker's turn has ended (G)
//! - [`facade`] is the ergonomic entry point wiring all of the above (H)
//! - [`speaker`] maps engine speaker ids onto user-visible labels (I)
//! - [`config`] is strongly-typed configuration plus five named presets (J)
//!
//! # Example
//!
//! ```ignore
//! use voice_rt_core::auth::StaticAuthProvider;
//! use voice_rt_core::bus::RtEventKind;
//! use voice_rt_core::config::{Preset, RtConfig};
//! use voice_rt_core::facade::VoiceAgent;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> voice_rt_core::RtResult<()> {
//!     let config = RtConfig::preset(Preset::Adaptive);
//!     let auth = Arc::new(StaticAuthProvider::from_env()?);
//!     let agent = VoiceAgent::connect(config, auth, None).await?;
//!     agent.on(RtEventKind::AddSegment, |event| {
//!         println!("{event:?}");
//!     }).await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod facade;
pub mod segmentation;
pub mod session;
pub mod speaker;
pub mod transcript;
pub mod turn;
pub mod types;
pub mod wire;

pub use bus::{EventBus, ListenerId, RtEvent, RtEventKind};
pub use config::{Preset, RtConfig};
pub use error::{RtError, RtResult};
pub use facade::VoiceAgent;
pub use session::{RtSession, SessionMessage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
