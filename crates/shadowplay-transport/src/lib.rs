//! Transport abstraction for the shadow-document service.
//!
//! Provides the [`ShadowTransport`] trait the sync layer is written
//! against, and [`MemoryTransport`]/[`ShadowHub`] — an in-process
//! implementation emulating the remote service's merge/delta/metadata
//! behavior, used by tests and the demo host.
//!
//! The real secure pub/sub transport (connection setup, TLS,
//! certificates, proxies) is supplied externally by implementing this
//! trait; nothing in the core depends on how the bytes move.

mod error;
mod memory;

pub use error::TransportError;
pub use memory::{MemoryTransport, ShadowHub};

use std::future::Future;

use shadowplay_protocol::{
    DeltaEvent, GetResponse, RejectResponse, UpdateRequest, UpdateResponse,
};
use tokio::sync::mpsc;

/// A notification delivered on a peer's event stream.
///
/// All five channels of the request-response pattern funnel into one
/// ordered stream per peer — within a peer, events are processed in
/// delivery order, which is the only ordering guarantee the sync layer
/// relies on.
#[derive(Debug, Clone)]
pub enum ShadowEvent {
    /// An update request (from any client of this document) was applied.
    UpdateAccepted(UpdateResponse),
    /// An update request was refused.
    UpdateRejected(RejectResponse),
    /// Response to a get request.
    GetAccepted(GetResponse),
    /// A get request was refused (e.g. no document exists yet).
    GetRejected(RejectResponse),
    /// The document's `desired` section diverged from `reported`.
    DeltaUpdated(DeltaEvent),
}

/// One peer's connection to the shadow-document service.
///
/// All calls are asynchronous-result; responses and notifications are
/// delivered on the stream returned by [`take_events`](Self::take_events),
/// never as direct return values — publishing a get and receiving its
/// response are decoupled, exactly like the underlying pub/sub pattern.
///
/// Methods are declared as `impl Future + Send` (rather than plain
/// `async fn`) so the coordinator task that drives a generic transport
/// can be spawned onto the runtime; implementations can still be
/// written with ordinary `async fn`.
pub trait ShadowTransport: Send + Sync + 'static {
    /// Establishes the connection.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears the connection down. Publishes after this fail with
    /// [`TransportError::NotConnected`].
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enables delivery of update-accepted/rejected events.
    fn subscribe_update(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enables delivery of get-accepted/rejected events.
    fn subscribe_get(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enables delivery of delta-updated events.
    fn subscribe_delta(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Takes this peer's single ordered event stream.
    ///
    /// May be called once; a second call returns
    /// [`TransportError::EventsTaken`].
    fn take_events(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<ShadowEvent>, TransportError>;

    /// Requests the current document. The response arrives as a
    /// [`ShadowEvent::GetAccepted`]/[`ShadowEvent::GetRejected`]
    /// carrying the same client token.
    fn publish_get(
        &self,
        client_token: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publishes a document update.
    fn publish_update(
        &self,
        request: UpdateRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
