/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An operation was attempted before `connect()` (or after
    /// `disconnect()`).
    #[error("transport is not connected")]
    NotConnected,

    /// Enabling a subscription channel failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Publishing a request failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The event stream was already handed out — there is exactly one
    /// ordered delivery path per peer.
    #[error("event stream already taken")]
    EventsTaken,

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
