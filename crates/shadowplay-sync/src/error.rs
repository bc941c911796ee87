//! Error types for the sync layer.

use shadowplay_protocol::PeerId;
use shadowplay_transport::TransportError;

/// Errors surfaced to callers of the coordinator handle.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The underlying transport failed (connect, subscribe, publish).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The shadow service refused a request. Carries the service's
    /// HTTP-style status code (404 = no document exists yet).
    #[error("request rejected by shadow service ({code}): {message}")]
    Rejected {
        /// Status code from the reject response.
        code: u16,
        /// Human-readable reason from the service.
        message: String,
    },

    /// The coordinator task is no longer running — its command channel
    /// or event stream closed.
    #[error("coordinator for {0} is gone")]
    CoordinatorGone(PeerId),
}
