//! Per-peer shadow synchronization for Shadowplay.
//!
//! Each remote peer gets one [`ShadowCoordinator`] — an isolated Tokio
//! task that owns the local cached view of that peer's remote document
//! and reconciles it against delta/accepted/rejected notifications.
//! The outside world talks to it through a cheap clonable
//! [`ShadowHandle`]; no coordinator state is ever shared directly.
//!
//! # Key behaviors
//!
//! - **Echo suppression** — a requested change whose target-property
//!   value deep-equals the cache is dropped before publishing, which is
//!   what keeps the remote's mirror-back of our own update from
//!   looping forever.
//! - **Input detection** — genuinely new remote input is distinguished
//!   from stale echoes by the per-field timestamp metadata attached to
//!   delta notifications, not by the value itself.
//! - **Settle-gated fetches** — at most one get request is in flight
//!   per peer; later [`ShadowHandle::fetch_current`] calls queue behind
//!   it and each caller's future resolves when its response has been
//!   fully processed.
//!
//! [`ShadowCoordinator`]: spawn_coordinator

mod config;
mod coordinator;
mod error;

pub use config::ShadowConfig;
pub use coordinator::{spawn_coordinator, InputSnapshot, ShadowHandle};
pub use error::SyncError;
