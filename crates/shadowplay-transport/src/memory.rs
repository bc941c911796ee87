//! In-process emulation of the shadow-document service.
//!
//! [`ShadowHub`] plays the role of the remote service: it owns one
//! desired/reported document per peer, merges updates, computes deltas
//! and per-field timestamp metadata, and fans events out to each peer's
//! subscription stream. [`MemoryTransport`] is one peer's handle to the
//! hub, implementing [`ShadowTransport`].
//!
//! Timestamps are a strictly monotonic logical clock rather than wall
//! time — consumers only ever compare them for inequality, and a
//! logical clock keeps tests deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use shadowplay_protocol::{
    DeltaEvent, GetResponse, PeerId, RejectResponse, ShadowStateDoc,
    UpdateRequest, UpdateResponse,
};
use tokio::sync::mpsc;

use crate::{ShadowEvent, ShadowTransport, TransportError};

// ---------------------------------------------------------------------------
// Document tree helpers
// ---------------------------------------------------------------------------

/// Merges `patch` into `base` the way the service does: objects merge
/// key-wise, `null` deletes a key, anything else replaces.
fn merge_value(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_val) in patch_map {
                if patch_val.is_null() {
                    base_map.remove(key);
                } else if patch_val.is_object()
                    && base_map.get(key).is_some_and(Value::is_object)
                {
                    merge_value(base_map.get_mut(key).expect("checked above"), patch_val);
                } else {
                    base_map.insert(key.clone(), patch_val.clone());
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Writes `{"timestamp": ts}` leaves into the metadata mirror for every
/// field touched by `patch`.
fn stamp_metadata(meta: &mut Value, patch: &Value, ts: i64) {
    match patch {
        Value::Object(fields) => {
            if !meta.is_object() {
                *meta = Value::Object(Map::new());
            }
            let meta_map = meta.as_object_mut().expect("set above");
            for (key, patch_val) in fields {
                if patch_val.is_null() {
                    meta_map.remove(key);
                } else {
                    let slot = meta_map.entry(key.clone()).or_insert(Value::Null);
                    stamp_metadata(slot, patch_val, ts);
                }
            }
        }
        _ => *meta = json!({ "timestamp": ts }),
    }
}

/// Computes the fields of `desired` not yet reflected in `reported`.
/// Returns `None` when the two agree.
fn diff_value(desired: &Value, reported: &Value) -> Option<Value> {
    match (desired, reported) {
        (Value::Object(des), Value::Object(rep)) => {
            let mut out = Map::new();
            for (key, des_val) in des {
                match rep.get(key) {
                    Some(rep_val) => {
                        if let Some(sub) = diff_value(des_val, rep_val) {
                            out.insert(key.clone(), sub);
                        }
                    }
                    None => {
                        out.insert(key.clone(), des_val.clone());
                    }
                }
            }
            if out.is_empty() { None } else { Some(Value::Object(out)) }
        }
        _ => {
            if desired == reported {
                None
            } else {
                Some(desired.clone())
            }
        }
    }
}

/// Cuts the metadata mirror down to the shape of a delta document.
fn prune_metadata(meta: &Value, shape: &Value) -> Value {
    match shape {
        Value::Object(fields) => {
            let mut out = Map::new();
            for (key, sub_shape) in fields {
                let sub_meta = meta.get(key).unwrap_or(&Value::Null);
                out.insert(key.clone(), prune_metadata(sub_meta, sub_shape));
            }
            Value::Object(out)
        }
        _ => meta.clone(),
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// One peer's document and delivery state inside the hub.
struct PeerShadow {
    desired: Option<Value>,
    reported: Option<Value>,
    /// Per-field timestamp mirror of `desired`.
    metadata: Value,
    connected: bool,
    sub_update: bool,
    sub_get: bool,
    sub_delta: bool,
    events: mpsc::UnboundedSender<ShadowEvent>,
    /// Receiver parked here until `take_events` claims it.
    pending_events: Option<mpsc::UnboundedReceiver<ShadowEvent>>,
    update_publishes: u64,
    get_publishes: u64,
}

struct HubInner {
    peers: HashMap<PeerId, PeerShadow>,
    clock: i64,
}

/// The in-process shadow-document service.
///
/// Shared by every [`MemoryTransport`] registered against it. Tests and
/// the demo also use it as the "device side": [`update_desired`]
/// injects a remote desired-state change, which flows back to the
/// server peer as a delta notification.
///
/// [`update_desired`]: Self::update_desired
pub struct ShadowHub {
    inner: Mutex<HubInner>,
}

impl Default for ShadowHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                peers: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Registers a peer and returns its transport handle.
    ///
    /// Re-registering a peer id replaces the previous registration and
    /// its (possibly untaken) event stream; the document survives.
    pub fn register(self: &Arc<Self>, peer: PeerId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        let shadow = inner.peers.entry(peer.clone()).or_insert_with(|| PeerShadow {
            desired: None,
            reported: None,
            metadata: Value::Null,
            connected: false,
            sub_update: false,
            sub_get: false,
            sub_delta: false,
            events: tx.clone(),
            pending_events: None,
            update_publishes: 0,
            get_publishes: 0,
        });
        shadow.connected = false;
        shadow.sub_update = false;
        shadow.sub_get = false;
        shadow.sub_delta = false;
        shadow.events = tx;
        shadow.pending_events = Some(rx);
        drop(inner);

        MemoryTransport {
            hub: Arc::clone(self),
            peer,
        }
    }

    /// Device-side entry point: merges a patch into the peer's
    /// `desired` section only, as if the remote device published it.
    /// Emits update-accepted and (when desired now diverges from
    /// reported) delta-updated events to the peer's subscribers.
    pub fn update_desired(&self, peer: &PeerId, patch: Value) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.clock += 1;
        let ts = inner.clock;
        let Some(shadow) = inner.peers.get_mut(peer) else {
            return;
        };

        let base = shadow.desired.get_or_insert_with(|| Value::Object(Map::new()));
        merge_value(base, &patch);
        stamp_metadata(&mut shadow.metadata, &patch, ts);
        if matches!(shadow.desired, Some(Value::Null)) {
            shadow.desired = None;
        }

        if shadow.sub_update {
            let _ = shadow.events.send(ShadowEvent::UpdateAccepted(UpdateResponse {
                client_token: None,
                state: Some(ShadowStateDoc {
                    desired: Some(patch),
                    reported: None,
                    delta: None,
                }),
                timestamp: ts,
            }));
        }
        Self::emit_delta(shadow, ts);
    }

    /// Current `reported` section of a peer's document (test hook).
    pub fn reported(&self, peer: &PeerId) -> Option<Value> {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.peers.get(peer).and_then(|s| s.reported.clone())
    }

    /// Current `desired` section of a peer's document (test hook).
    pub fn desired(&self, peer: &PeerId) -> Option<Value> {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.peers.get(peer).and_then(|s| s.desired.clone())
    }

    /// How many update requests this peer has published (test hook).
    pub fn update_publishes(&self, peer: &PeerId) -> u64 {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.peers.get(peer).map_or(0, |s| s.update_publishes)
    }

    /// How many get requests this peer has published (test hook).
    pub fn get_publishes(&self, peer: &PeerId) -> u64 {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.peers.get(peer).map_or(0, |s| s.get_publishes)
    }

    fn emit_delta(shadow: &mut PeerShadow, ts: i64) {
        if !shadow.sub_delta {
            return;
        }
        let desired = shadow.desired.as_ref().unwrap_or(&Value::Null);
        let reported = shadow.reported.as_ref().unwrap_or(&Value::Null);
        if let Some(delta) = diff_value(desired, reported) {
            let metadata = prune_metadata(&shadow.metadata, &delta);
            let _ = shadow.events.send(ShadowEvent::DeltaUpdated(DeltaEvent {
                client_token: None,
                state: Some(delta),
                metadata: Some(metadata),
                timestamp: ts,
            }));
        }
    }

    fn with_peer<R>(
        &self,
        peer: &PeerId,
        f: impl FnOnce(&mut HubInner, &PeerId) -> R,
    ) -> R {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        f(&mut inner, peer)
    }
}

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

/// One peer's [`ShadowTransport`] backed by a [`ShadowHub`].
pub struct MemoryTransport {
    hub: Arc<ShadowHub>,
    peer: PeerId,
}

impl MemoryTransport {
    /// The peer this transport belongs to.
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }
}

impl ShadowTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            let shadow = inner.peers.get_mut(peer).ok_or(TransportError::Shutdown)?;
            shadow.connected = true;
            tracing::debug!(peer = %peer, "memory transport connected");
            Ok(())
        })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            if let Some(shadow) = inner.peers.get_mut(peer) {
                shadow.connected = false;
            }
            tracing::debug!(peer = %peer, "memory transport disconnected");
            Ok(())
        })
    }

    async fn subscribe_update(&self) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            let shadow = connected_peer(inner, peer)?;
            shadow.sub_update = true;
            Ok(())
        })
    }

    async fn subscribe_get(&self) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            let shadow = connected_peer(inner, peer)?;
            shadow.sub_get = true;
            Ok(())
        })
    }

    async fn subscribe_delta(&self) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            let shadow = connected_peer(inner, peer)?;
            shadow.sub_delta = true;
            Ok(())
        })
    }

    fn take_events(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<ShadowEvent>, TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            inner
                .peers
                .get_mut(peer)
                .and_then(|s| s.pending_events.take())
                .ok_or(TransportError::EventsTaken)
        })
    }

    async fn publish_get(&self, client_token: &str) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            inner.clock += 1;
            let ts = inner.clock;
            let shadow = connected_peer(inner, peer)?;
            shadow.get_publishes += 1;
            if !shadow.sub_get {
                // Nobody is listening for the response; the request
                // still counts as published.
                return Ok(());
            }

            let token = Some(client_token.to_string());
            if shadow.desired.is_none() && shadow.reported.is_none() {
                let _ = shadow.events.send(ShadowEvent::GetRejected(RejectResponse {
                    client_token: token,
                    code: 404,
                    message: format!("no document exists for {peer}"),
                }));
                return Ok(());
            }

            let desired = shadow.desired.clone();
            let reported = shadow.reported.clone();
            let delta = diff_value(
                desired.as_ref().unwrap_or(&Value::Null),
                reported.as_ref().unwrap_or(&Value::Null),
            );
            let _ = shadow.events.send(ShadowEvent::GetAccepted(GetResponse {
                client_token: token,
                state: Some(ShadowStateDoc {
                    desired,
                    reported,
                    delta,
                }),
                metadata: Some(json!({ "desired": shadow.metadata })),
                timestamp: ts,
            }));
            Ok(())
        })
    }

    async fn publish_update(
        &self,
        request: UpdateRequest,
    ) -> Result<(), TransportError> {
        self.hub.with_peer(&self.peer, |inner, peer| {
            inner.clock += 1;
            let ts = inner.clock;
            let shadow = connected_peer(inner, peer)?;
            shadow.update_publishes += 1;

            if let Some(patch) = &request.state.desired {
                if patch.is_null() {
                    shadow.desired = None;
                    shadow.metadata = Value::Null;
                } else {
                    let base = shadow
                        .desired
                        .get_or_insert_with(|| Value::Object(Map::new()));
                    merge_value(base, patch);
                    stamp_metadata(&mut shadow.metadata, patch, ts);
                }
            }
            if let Some(patch) = &request.state.reported {
                if patch.is_null() {
                    shadow.reported = None;
                } else {
                    let base = shadow
                        .reported
                        .get_or_insert_with(|| Value::Object(Map::new()));
                    merge_value(base, patch);
                }
            }

            if shadow.sub_update {
                let _ = shadow.events.send(ShadowEvent::UpdateAccepted(UpdateResponse {
                    client_token: request.client_token.clone(),
                    state: Some(request.state.clone()),
                    timestamp: ts,
                }));
            }
            ShadowHub::emit_delta(shadow, ts);
            Ok(())
        })
    }
}

fn connected_peer<'a>(
    inner: &'a mut HubInner,
    peer: &PeerId,
) -> Result<&'a mut PeerShadow, TransportError> {
    let shadow = inner
        .peers
        .get_mut(peer)
        .ok_or(TransportError::Shutdown)?;
    if !shadow.connected {
        return Err(TransportError::NotConnected);
    }
    Ok(shadow)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId::new("device-1")
    }

    async fn connected_transport() -> (Arc<ShadowHub>, MemoryTransport) {
        let hub = Arc::new(ShadowHub::new());
        let transport = hub.register(peer());
        transport.connect().await.unwrap();
        transport.subscribe_update().await.unwrap();
        transport.subscribe_get().await.unwrap();
        transport.subscribe_delta().await.unwrap();
        (hub, transport)
    }

    fn update(doc: Value) -> UpdateRequest {
        UpdateRequest {
            client_token: Some("tok".into()),
            state: ShadowStateDoc {
                desired: Some(doc.clone()),
                reported: Some(doc),
                delta: None,
            },
        }
    }

    // -- document tree helpers --

    #[test]
    fn test_merge_replaces_scalars_and_merges_objects() {
        let mut base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        merge_value(&mut base, &json!({"a": 5, "nested": {"y": 9}}));
        assert_eq!(base, json!({"a": 5, "nested": {"x": 1, "y": 9}}));
    }

    #[test]
    fn test_merge_null_deletes_key() {
        let mut base = json!({"a": 1, "b": 2});
        merge_value(&mut base, &json!({"a": null}));
        assert_eq!(base, json!({"b": 2}));
    }

    #[test]
    fn test_diff_returns_only_differing_leaves() {
        let desired = json!({"GameData": {"Board": "111", "PlayerInput": 3}});
        let reported = json!({"GameData": {"Board": "111", "PlayerInput": 0}});
        let delta = diff_value(&desired, &reported).unwrap();
        assert_eq!(delta, json!({"GameData": {"PlayerInput": 3}}));
    }

    #[test]
    fn test_diff_equal_documents_is_none() {
        let doc = json!({"GameData": {"Board": "000"}});
        assert!(diff_value(&doc, &doc.clone()).is_none());
    }

    #[test]
    fn test_diff_includes_missing_keys() {
        let desired = json!({"GameData": {"PlayerInput": 4}});
        let reported = json!({});
        let delta = diff_value(&desired, &reported).unwrap();
        assert_eq!(delta, json!({"GameData": {"PlayerInput": 4}}));
    }

    #[test]
    fn test_stamp_and_prune_metadata() {
        let mut meta = Value::Null;
        stamp_metadata(&mut meta, &json!({"GameData": {"PlayerInput": 3, "Board": "0"}}), 7);
        stamp_metadata(&mut meta, &json!({"GameData": {"PlayerInput": 5}}), 9);

        let pruned = prune_metadata(&meta, &json!({"GameData": {"PlayerInput": 0}}));
        assert_eq!(pruned["GameData"]["PlayerInput"]["timestamp"], 9);
        assert!(pruned["GameData"].get("Board").is_none());
    }

    // -- hub behavior --

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let hub = Arc::new(ShadowHub::new());
        let transport = hub.register(peer());
        let err = transport.publish_get("tok").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_take_events_only_once() {
        let hub = Arc::new(ShadowHub::new());
        let transport = hub.register(peer());
        assert!(transport.take_events().is_ok());
        assert!(matches!(
            transport.take_events(),
            Err(TransportError::EventsTaken)
        ));
    }

    #[tokio::test]
    async fn test_update_then_get_round_trip() {
        let (_hub, transport) = connected_transport().await;
        let mut events = transport.take_events().unwrap();

        let doc = json!({"GameData": {"Board": "000", "PlayerInput": 0}});
        transport.publish_update(update(doc.clone())).await.unwrap();

        match events.recv().await.unwrap() {
            ShadowEvent::UpdateAccepted(resp) => {
                assert_eq!(resp.client_token.as_deref(), Some("tok"));
            }
            other => panic!("expected UpdateAccepted, got {other:?}"),
        }

        transport.publish_get("get-1").await.unwrap();
        match events.recv().await.unwrap() {
            ShadowEvent::GetAccepted(resp) => {
                assert_eq!(resp.client_token.as_deref(), Some("get-1"));
                let state = resp.state.unwrap();
                assert_eq!(state.desired.unwrap(), doc);
                assert_eq!(state.reported.unwrap(), doc);
                // desired == reported, so no delta section.
                assert!(state.delta.is_none());
            }
            other => panic!("expected GetAccepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_without_document_is_rejected() {
        let (_hub, transport) = connected_transport().await;
        let mut events = transport.take_events().unwrap();

        transport.publish_get("get-404").await.unwrap();
        match events.recv().await.unwrap() {
            ShadowEvent::GetRejected(resp) => {
                assert_eq!(resp.code, 404);
                assert_eq!(resp.client_token.as_deref(), Some("get-404"));
            }
            other => panic!("expected GetRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_device_desired_change_produces_delta_with_metadata() {
        let (hub, transport) = connected_transport().await;
        let mut events = transport.take_events().unwrap();

        // Server seeds the document (desired == reported, no delta).
        let doc = json!({"GameData": {"Board": "000", "PlayerInput": 0}});
        transport.publish_update(update(doc)).await.unwrap();
        let _ = events.recv().await.unwrap(); // UpdateAccepted

        // Device reports input by changing desired only.
        hub.update_desired(&peer(), json!({"GameData": {"PlayerInput": 3}}));

        let _ = events.recv().await.unwrap(); // device's UpdateAccepted
        match events.recv().await.unwrap() {
            ShadowEvent::DeltaUpdated(delta) => {
                let state = delta.state.unwrap();
                assert_eq!(state, json!({"GameData": {"PlayerInput": 3}}));
                let meta = delta.metadata.unwrap();
                assert!(meta["GameData"]["PlayerInput"]["timestamp"].is_i64());
            }
            other => panic!("expected DeltaUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acknowledging_delta_clears_it() {
        let (hub, transport) = connected_transport().await;
        let mut events = transport.take_events().unwrap();

        let doc = json!({"GameData": {"PlayerInput": 0}});
        transport.publish_update(update(doc)).await.unwrap();
        let _ = events.recv().await.unwrap();

        hub.update_desired(&peer(), json!({"GameData": {"PlayerInput": 5}}));
        let _ = events.recv().await.unwrap(); // UpdateAccepted
        let _ = events.recv().await.unwrap(); // DeltaUpdated

        // Server acknowledges by writing desired == reported.
        let ack = json!({"GameData": {"PlayerInput": 5}});
        transport.publish_update(update(ack)).await.unwrap();
        let _ = events.recv().await.unwrap(); // UpdateAccepted

        // No further delta: desired and reported agree again.
        transport.publish_get("after-ack").await.unwrap();
        loop {
            match events.recv().await.unwrap() {
                ShadowEvent::GetAccepted(resp) => {
                    assert!(resp.state.unwrap().delta.is_none());
                    break;
                }
                ShadowEvent::DeltaUpdated(_) => panic!("delta after acknowledgment"),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_publish_counters() {
        let (hub, transport) = connected_transport().await;
        let _events = transport.take_events().unwrap();

        transport
            .publish_update(update(json!({"GameData": {"PlayerInput": 0}})))
            .await
            .unwrap();
        transport.publish_get("t1").await.unwrap();
        transport.publish_get("t2").await.unwrap();

        assert_eq!(hub.update_publishes(&peer()), 1);
        assert_eq!(hub.get_publishes(&peer()), 2);
    }
}
