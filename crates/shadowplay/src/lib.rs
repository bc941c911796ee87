//! # Shadowplay
//!
//! Two independent, intermittently-synchronized remote peers ("device
//! shadows") co-driving a single authoritative two-player Connect-4
//! game. Each peer only ever sees an eventually-consistent,
//! asynchronously-delivered copy of a shared desired/reported state
//! document; there is no direct peer-to-peer channel.
//!
//! This meta-crate ties the layers together:
//!
//! - [`engine`] — the pure, synchronous Connect-4 rules engine.
//! - [`sync`] — the per-peer shadow coordinator (echo suppression,
//!   timestamp-gated input detection, settle-waited fetches).
//! - [`transport`] — the [`ShadowTransport`](transport::ShadowTransport)
//!   trait plus an in-memory emulation of the shadow service.
//! - [`protocol`] — the wire document shapes.
//! - [`SessionOrchestrator`] — the game loop merging two coordinators
//!   into one consistent session (readiness handshake, turn gating,
//!   game-over/reset cycle).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shadowplay::protocol::PeerId;
//! use shadowplay::sync::{spawn_coordinator, ShadowConfig};
//! use shadowplay::transport::ShadowHub;
//! use shadowplay::{SessionConfig, SessionOrchestrator};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # async fn run() -> Result<(), shadowplay::ShadowplayError> {
//! let hub = Arc::new(ShadowHub::new());
//! let one = PeerId::new("device-1");
//! let two = PeerId::new("device-2");
//! let player_one =
//!     spawn_coordinator(ShadowConfig::new(one.clone()), hub.register(one)).await?;
//! let player_two =
//!     spawn_coordinator(ShadowConfig::new(two.clone()), hub.register(two)).await?;
//!
//! let (_quit, quit_rx) = watch::channel(false);
//! SessionOrchestrator::new(SessionConfig::default(), player_one, player_two)
//!     .run(quit_rx)
//!     .await
//! # }
//! ```

mod error;
mod session;

pub use error::ShadowplayError;
pub use session::{SessionConfig, SessionOrchestrator, SessionState};

pub use shadowplay_engine as engine;
pub use shadowplay_protocol as protocol;
pub use shadowplay_sync as sync;
pub use shadowplay_transport as transport;
