//! Unified error type for the Shadowplay meta crate.

use shadowplay_protocol::ProtocolError;
use shadowplay_sync::SyncError;
use shadowplay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `shadowplay` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ShadowplayError {
    /// A transport-level error (connect, subscribe, publish).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed document).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A sync-level error (rejected request, coordinator gone).
    #[error(transparent)]
    Sync(#[from] SyncError),
}
