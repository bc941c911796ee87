//! Shadow coordinator actor: an isolated Tokio task that owns one
//! peer's local view of its remote document.
//!
//! Each coordinator runs in its own task, communicating with the
//! outside world through an mpsc channel. This is the "actor model" —
//! no shared mutable state, just message passing. Transport
//! notifications arrive on the peer's single ordered event stream and
//! are interleaved with handle commands via `select!`, so within one
//! peer everything is processed in delivery order.

use std::collections::VecDeque;

use rand::Rng;
use serde_json::{Map, Value};
use shadowplay_protocol::{
    DeltaEvent, GetResponse, PeerId, RejectResponse, ShadowStateDoc,
    UpdateRequest, UpdateResponse,
};
use shadowplay_transport::{ShadowEvent, ShadowTransport};
use tokio::sync::{mpsc, oneshot};

use crate::{ShadowConfig, SyncError};

/// Command channel depth. Senders wait when it fills up.
const COMMAND_CHANNEL_SIZE: usize = 32;

/// A caller waiting for an in-flight get request to settle.
type FetchWaiter = oneshot::Sender<Result<(), SyncError>>;

/// Commands sent to a coordinator actor through its channel.
///
/// The `oneshot::Sender` in most variants is a reply channel — the
/// caller sends a command and waits for the response on it.
enum SyncCommand {
    /// Adopt (and publish) a new document, unless it echoes the cache.
    RequestChange {
        document: Option<Value>,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },

    /// Request the current remote document; the reply resolves when the
    /// response has been fully processed (the settle point).
    FetchCurrent { reply: FetchWaiter },

    /// Snapshot of the last recorded player input.
    LastInput {
        reply: oneshot::Sender<Option<InputSnapshot>>,
    },

    /// Mark the last recorded input as consumed.
    MarkInputConsumed,

    /// Set the observational readiness flag.
    SetReady { ready: bool },

    /// Snapshot of the cached target-property value.
    CachedValue { reply: oneshot::Sender<Option<Value>> },

    /// Disconnect the transport and stop the actor.
    Shutdown {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

/// A snapshot of the coordinator's player-input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSnapshot {
    /// The raw wire value of the last recorded input.
    pub value: i32,
    /// The per-field metadata timestamp that came with it.
    pub timestamp: i64,
    /// Whether the orchestrator has already consumed it.
    pub consumed: bool,
}

/// Handle to a running coordinator actor.
///
/// Cheap to clone — it's just an `mpsc::Sender` wrapper. The
/// orchestrator holds one of these per peer and never touches the
/// coordinator's state directly.
#[derive(Clone)]
pub struct ShadowHandle {
    peer: PeerId,
    sender: mpsc::Sender<SyncCommand>,
}

impl ShadowHandle {
    /// The peer this coordinator reconciles.
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Requests a document change.
    ///
    /// No-op if the document's target-property value deep-equals the
    /// cache (echo suppression). Otherwise the cache is updated and the
    /// document is published as both `desired` and `reported`. A
    /// publish failure is returned to the caller; the cache mutation is
    /// not rolled back.
    pub async fn request_change(
        &self,
        document: Option<Value>,
    ) -> Result<(), SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::RequestChange {
                document,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Requests the current remote document and waits until the
    /// response has been fully processed.
    ///
    /// At most one get request is in flight per peer; concurrent calls
    /// queue behind it in order. Dropping the returned future cancels
    /// only this caller's wait — the in-flight request still settles
    /// inside the actor.
    pub async fn fetch_current(&self) -> Result<(), SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::FetchCurrent { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Snapshot of the last recorded player input, or `None` if no
    /// input has ever been detected for this peer.
    pub async fn last_input(&self) -> Result<Option<InputSnapshot>, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::LastInput { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Marks the last recorded input as consumed (fire-and-forget).
    pub async fn mark_input_consumed(&self) -> Result<(), SyncError> {
        self.sender
            .send(SyncCommand::MarkInputConsumed)
            .await
            .map_err(|_| self.gone())
    }

    /// Sets the peer's readiness flag (fire-and-forget, observational).
    pub async fn set_ready(&self, ready: bool) -> Result<(), SyncError> {
        self.sender
            .send(SyncCommand::SetReady { ready })
            .await
            .map_err(|_| self.gone())
    }

    /// Snapshot of the cached target-property value.
    pub async fn cached_value(&self) -> Result<Option<Value>, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::CachedValue { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Disconnects the transport and stops the coordinator.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> SyncError {
        SyncError::CoordinatorGone(self.peer.clone())
    }
}

/// The internal coordinator state. Runs inside a Tokio task.
struct CoordinatorActor<T: ShadowTransport> {
    config: ShadowConfig,
    transport: T,
    commands: mpsc::Receiver<SyncCommand>,
    events: mpsc::UnboundedReceiver<ShadowEvent>,
    /// Local cache of the target property's value. `None` until the
    /// first adopted change.
    cached: Option<Value>,
    /// Last recorded player input: (raw wire value, metadata timestamp).
    last_input: Option<(i32, i64)>,
    input_consumed: bool,
    ready: bool,
    /// The caller whose get request is currently in flight. At most one
    /// — the per-peer serialization point.
    in_flight: Option<FetchWaiter>,
    /// Callers waiting for their turn to fetch.
    fetch_queue: VecDeque<FetchWaiter>,
}

impl<T: ShadowTransport> CoordinatorActor<T> {
    /// Runs the actor loop, processing commands and transport events
    /// until shutdown.
    async fn run(mut self) {
        tracing::debug!(peer = %self.config.peer, "shadow coordinator started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                break;
                            }
                        }
                        // All handles dropped.
                        None => break,
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::warn!(
                                peer = %self.config.peer,
                                "event stream closed, stopping coordinator"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // Anyone still waiting on a fetch gets a channel-closed error
        // when their oneshot drops here.
        self.in_flight.take();
        self.fetch_queue.clear();
        tracing::debug!(peer = %self.config.peer, "shadow coordinator stopped");
    }

    /// Returns `true` when the actor should stop.
    async fn handle_command(&mut self, cmd: SyncCommand) -> bool {
        match cmd {
            SyncCommand::RequestChange { document, reply } => {
                let result = self.request_change(document).await;
                let _ = reply.send(result);
            }
            SyncCommand::FetchCurrent { reply } => {
                self.fetch_queue.push_back(reply);
                self.pump_fetch_queue().await;
            }
            SyncCommand::LastInput { reply } => {
                let snapshot = self.last_input.map(|(value, timestamp)| InputSnapshot {
                    value,
                    timestamp,
                    consumed: self.input_consumed,
                });
                let _ = reply.send(snapshot);
            }
            SyncCommand::MarkInputConsumed => {
                self.input_consumed = true;
            }
            SyncCommand::SetReady { ready } => {
                self.ready = ready;
                tracing::debug!(
                    peer = %self.config.peer,
                    ready = self.ready,
                    "readiness flag set"
                );
            }
            SyncCommand::CachedValue { reply } => {
                let _ = reply.send(self.cached.clone());
            }
            SyncCommand::Shutdown { reply } => {
                tracing::debug!(peer = %self.config.peer, "coordinator shutting down");
                let result = self.transport.disconnect().await.map_err(SyncError::from);
                let _ = reply.send(result);
                return true;
            }
        }
        false
    }

    async fn handle_event(&mut self, event: ShadowEvent) {
        match event {
            ShadowEvent::UpdateAccepted(resp) => self.on_update_accepted(resp),
            ShadowEvent::UpdateRejected(resp) => self.on_update_rejected(resp).await,
            ShadowEvent::GetAccepted(resp) => self.on_get_accepted(resp).await,
            ShadowEvent::GetRejected(resp) => self.on_get_rejected(resp).await,
            ShadowEvent::DeltaUpdated(event) => self.on_delta(event).await,
        }
    }

    // -- request handling ---------------------------------------------------

    /// The echo-suppressed change path.
    ///
    /// The cache is mutated before the publish attempt and deliberately
    /// not rolled back on failure: the next delta against the remote
    /// will re-converge the two, and rolling back would make the cache
    /// disagree with what the caller believes was requested.
    async fn request_change(
        &mut self,
        document: Option<Value>,
    ) -> Result<(), SyncError> {
        if let Some(doc) = &document {
            if doc.get(&self.config.target_property) == self.cached.as_ref() {
                tracing::debug!(
                    peer = %self.config.peer,
                    "change matches cached value, suppressing echo"
                );
                return Ok(());
            }
            self.cached = doc.get(&self.config.target_property).cloned();
        } else {
            self.cached = None;
        }
        tracing::debug!(peer = %self.config.peer, "changed local shadow value");
        self.publish(document).await
    }

    /// Publishes a document as both `desired` and `reported`. `None`
    /// publishes an explicit null, which deletes the remote document.
    async fn publish(&self, document: Option<Value>) -> Result<(), SyncError> {
        let token = client_token();
        let state = document.unwrap_or(Value::Null);
        let request = UpdateRequest {
            client_token: Some(token.clone()),
            state: ShadowStateDoc {
                desired: Some(state.clone()),
                reported: Some(state),
                delta: None,
            },
        };
        self.transport.publish_update(request).await?;
        tracing::debug!(peer = %self.config.peer, token, "update request published");
        Ok(())
    }

    /// Starts the next queued get request, unless one is in flight.
    async fn pump_fetch_queue(&mut self) {
        while self.in_flight.is_none() {
            let Some(waiter) = self.fetch_queue.pop_front() else {
                return;
            };
            let token = client_token();
            tracing::debug!(
                peer = %self.config.peer,
                token,
                "requesting current shadow state"
            );
            match self.transport.publish_get(&token).await {
                Ok(()) => self.in_flight = Some(waiter),
                Err(err) => {
                    // This fetch never started; report and try the next.
                    let _ = waiter.send(Err(err.into()));
                }
            }
        }
    }

    /// Settles the in-flight fetch and starts the next queued one.
    async fn settle(&mut self, result: Result<(), SyncError>) {
        if let Some(waiter) = self.in_flight.take() {
            let _ = waiter.send(result);
        }
        self.pump_fetch_queue().await;
    }

    // -- event handling -----------------------------------------------------

    fn on_update_accepted(&self, resp: UpdateResponse) {
        match resp.client_token {
            Some(token) => tracing::debug!(
                peer = %self.config.peer,
                token,
                "shadow update accepted"
            ),
            None => tracing::debug!(peer = %self.config.peer, "shadow update accepted"),
        }
    }

    /// A reject on the update channel surfaces as a failure to the
    /// in-flight fetch caller, if any; otherwise it is only logged.
    async fn on_update_rejected(&mut self, resp: RejectResponse) {
        tracing::warn!(
            peer = %self.config.peer,
            code = resp.code,
            message = %resp.message,
            "shadow update rejected"
        );
        if self.in_flight.is_some() {
            self.settle(Err(SyncError::Rejected {
                code: resp.code,
                message: resp.message,
            }))
            .await;
        }
    }

    async fn on_get_accepted(&mut self, resp: GetResponse) {
        if let Some(state) = &resp.state {
            if let Some(delta) = &state.delta {
                tracing::info!(
                    peer = %self.config.peer,
                    delta = %delta,
                    "shadow contains a delta value"
                );
                // An outstanding difference between desired and
                // reported is treated exactly like an externally-driven
                // change request. Publish failures don't fail the
                // fetch; the delta will be re-delivered.
                if let Err(err) = self.request_change(Some(delta.clone())).await {
                    tracing::warn!(
                        peer = %self.config.peer,
                        error = %err,
                        "failed to publish delta adoption"
                    );
                }
            }
            if let Some(reported) = &state.reported {
                if reported.get(&self.config.target_property).is_some() {
                    tracing::info!(peer = %self.config.peer, "received shadow state");
                } else {
                    tracing::info!(
                        peer = %self.config.peer,
                        property = %self.config.target_property,
                        "shadow does not contain the target property"
                    );
                }
            }
        }
        self.settle(Ok(())).await;
    }

    async fn on_get_rejected(&mut self, resp: RejectResponse) {
        tracing::warn!(
            peer = %self.config.peer,
            code = resp.code,
            message = %resp.message,
            "shadow get rejected"
        );
        self.settle(Err(SyncError::Rejected {
            code: resp.code,
            message: resp.message,
        }))
        .await;
    }

    async fn on_delta(&mut self, event: DeltaEvent) {
        tracing::debug!(peer = %self.config.peer, "received shadow delta event");

        let state = match &event.state {
            Some(state) if !state.is_null() => state,
            // A null/absent delta document means the target property
            // was deleted remotely. Restore it from the cache,
            // bypassing echo suppression.
            _ => {
                let Some(cached) = self.cached.clone() else {
                    tracing::warn!(
                        peer = %self.config.peer,
                        "delta reports deletion but nothing is cached, dropping"
                    );
                    return;
                };
                tracing::info!(
                    peer = %self.config.peer,
                    property = %self.config.target_property,
                    "delta reports deletion, restoring cached value"
                );
                let document = self.wrap(cached);
                if let Err(err) = self.publish(Some(document)).await {
                    tracing::warn!(
                        peer = %self.config.peer,
                        error = %err,
                        "failed to restore deleted shadow value"
                    );
                }
                return;
            }
        };

        let Some(new_value) = state.get(&self.config.target_property) else {
            tracing::warn!(
                peer = %self.config.peer,
                property = %self.config.target_property,
                "target property not found in delta, skipping"
            );
            return;
        };

        if Some(new_value) == self.cached.as_ref() {
            tracing::debug!(
                peer = %self.config.peer,
                "delta did not change the target property"
            );
            return;
        }

        // Per-field timestamps are what distinguish genuinely new input
        // from a stale echo of an old value; a delta without them is
        // malformed and must not touch the cache.
        let Some(metadata) = &event.metadata else {
            tracing::warn!(
                peer = %self.config.peer,
                "delta carries no metadata, dropping"
            );
            return;
        };

        tracing::info!(
            peer = %self.config.peer,
            value = %new_value,
            "delta reports a new desired value, adopting"
        );
        self.detect_input(new_value, metadata);

        let new_value = new_value.clone();
        self.cached = Some(new_value.clone());
        let document = self.wrap(new_value);
        // Republish unchanged, acknowledging the delta (this is what
        // converges `reported` back onto `desired`).
        if let Err(err) = self.publish(Some(document)).await {
            tracing::warn!(
                peer = %self.config.peer,
                error = %err,
                "failed to acknowledge delta"
            );
        }
    }

    /// Records a new player input when the input sub-property's
    /// metadata timestamp differs from the last recorded one.
    fn detect_input(&mut self, new_value: &Value, metadata: &Value) {
        let timestamp = metadata
            .get(&self.config.target_property)
            .and_then(|m| m.get(&self.config.input_property))
            .and_then(|m| m.get("timestamp"))
            .and_then(Value::as_i64);
        let value = new_value
            .get(&self.config.input_property)
            .and_then(Value::as_i64);
        let (Some(timestamp), Some(value)) = (timestamp, value) else {
            // Not an input-bearing delta; nothing to record.
            return;
        };

        if self.last_input.map(|(_, ts)| ts) != Some(timestamp) {
            tracing::info!(
                peer = %self.config.peer,
                input = value,
                timestamp,
                "new player input detected"
            );
            self.last_input = Some((value as i32, timestamp));
            self.input_consumed = false;
        }
    }

    /// Nests a value under the configured target property.
    fn wrap(&self, value: Value) -> Value {
        let mut document = Map::new();
        document.insert(self.config.target_property.clone(), value);
        Value::Object(document)
    }
}

/// Connects the transport, enables all three subscription channels, and
/// spawns the coordinator actor. Returns a handle to communicate with it.
pub async fn spawn_coordinator<T: ShadowTransport>(
    config: ShadowConfig,
    transport: T,
) -> Result<ShadowHandle, SyncError> {
    transport.connect().await?;
    transport.subscribe_update().await?;
    transport.subscribe_get().await?;
    transport.subscribe_delta().await?;
    let events = transport.take_events()?;

    let peer = config.peer.clone();
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

    let actor = CoordinatorActor {
        config,
        transport,
        commands: rx,
        events,
        cached: None,
        last_input: None,
        input_consumed: true,
        ready: false,
        in_flight: None,
        fetch_queue: VecDeque::new(),
    };

    tokio::spawn(actor.run());

    Ok(ShadowHandle { peer, sender: tx })
}

/// Generates a 16-character hex client token for request/response
/// correlation in logs. Not a secret — just unique enough to match a
/// response to the request that caused it.
fn client_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
