//! Document types for the shadow service wire format.
//!
//! A peer's remote document is a JSON tree with `desired` / `reported`
//! sub-trees under `state`, plus per-field `{"timestamp": n}` metadata
//! mirrors. The game payload itself lives under a configurable
//! top-level property (default [`DEFAULT_TARGET_PROPERTY`]) inside
//! those sub-trees. Everything outside [`GameDoc`] is therefore kept as
//! opaque [`serde_json::Value`] — the sync layer reconciles whole
//! documents without caring what is inside them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Top-level property the game document is nested under, unless the
/// host configures a different one.
pub const DEFAULT_TARGET_PROPERTY: &str = "GameData";

/// Sub-property of the target property that carries player input.
pub const DEFAULT_INPUT_PROPERTY: &str = "PlayerInput";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a peer (one remote device shadow).
///
/// Newtype over the remote document's name so a peer id can't be mixed
/// up with an arbitrary string. Serializes as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Creates a peer id from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The underlying document name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game document
// ---------------------------------------------------------------------------

/// The game payload published under the target property.
///
/// Field names are part of the wire contract consumed by the devices —
/// the board is a fixed 42-character digit string (row-major, top row
/// first, `0`/`1`/`2` per cell) so constrained firmware can parse it
/// without a JSON library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameDoc {
    /// 42-character row-major board rendering.
    pub board: String,
    /// Whose turn it is: 1 or 2.
    pub current_turn: u8,
    /// 0 = undecided, 1 or 2 = that player won, -1 = tie.
    pub winner: i8,
    /// Acknowledgment of the last consumed input (0 when none).
    pub player_input: i32,
    /// 0 = reserved, 1 = game over, 2 = playing.
    pub game_state: u8,
}

// ---------------------------------------------------------------------------
// Shadow request/response shells
// ---------------------------------------------------------------------------

/// The `desired` / `reported` / `delta` sections of a shadow document.
///
/// `delta` only ever appears in responses — it is computed by the
/// service as the difference between `desired` and `reported`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowStateDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Value>,
}

/// An update request published to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    pub state: ShadowStateDoc,
}

/// Delivered on the update-accepted channel after a successful update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ShadowStateDoc>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Delivered on the get-accepted channel in response to a get request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ShadowStateDoc>,
    /// Per-field `{"timestamp": n}` mirror of `state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Pushed on the delta channel whenever `desired` diverges from
/// `reported`. `state` holds only the differing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Per-field `{"timestamp": n}` mirror of `state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Delivered on a rejected channel when the service refuses a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    /// HTTP-style status code (400 = bad request, 404 = no document).
    pub code: u16,
    pub message: String,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The devices parse these documents with exact key names, so the
    //! serde attributes are verified against literal JSON shapes.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerId::new("device-1")).unwrap();
        assert_eq!(json, "\"device-1\"");
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId::new("device-2").to_string(), "device-2");
    }

    #[test]
    fn test_game_doc_uses_pascal_case_keys() {
        let doc = GameDoc {
            board: "0".repeat(42),
            current_turn: 1,
            winner: 0,
            player_input: 0,
            game_state: 1,
        };
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["Board"], "0".repeat(42));
        assert_eq!(json["CurrentTurn"], 1);
        assert_eq!(json["Winner"], 0);
        assert_eq!(json["PlayerInput"], 0);
        assert_eq!(json["GameState"], 1);
    }

    #[test]
    fn test_game_doc_tie_winner_is_negative_one() {
        let doc = GameDoc {
            board: "1".repeat(42),
            current_turn: 2,
            winner: -1,
            player_input: 3,
            game_state: 1,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["Winner"], -1);
    }

    #[test]
    fn test_game_doc_round_trip() {
        let doc = GameDoc {
            board: "012".repeat(14),
            current_turn: 2,
            winner: 1,
            player_input: 7,
            game_state: 2,
        };
        let bytes = serde_json::to_vec(&doc).unwrap();
        let decoded: GameDoc = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn test_update_request_shape() {
        let req = UpdateRequest {
            client_token: Some("tok-1".into()),
            state: ShadowStateDoc {
                desired: Some(json!({"GameData": {"PlayerInput": 3}})),
                reported: Some(json!({"GameData": {"PlayerInput": 3}})),
                delta: None,
            },
        };
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["clientToken"], "tok-1");
        assert_eq!(json["state"]["desired"]["GameData"]["PlayerInput"], 3);
        // Absent sections are omitted entirely, not serialized as null.
        assert!(json["state"].get("delta").is_none());
    }

    #[test]
    fn test_get_response_tolerates_missing_sections() {
        let resp: GetResponse = serde_json::from_value(json!({
            "clientToken": "tok-2",
            "state": { "reported": { "GameData": {} } },
            "timestamp": 12
        }))
        .unwrap();

        assert_eq!(resp.client_token.as_deref(), Some("tok-2"));
        let state = resp.state.unwrap();
        assert!(state.desired.is_none());
        assert!(state.reported.is_some());
        assert!(resp.metadata.is_none());
    }

    #[test]
    fn test_delta_event_round_trip() {
        let event = DeltaEvent {
            client_token: None,
            state: Some(json!({"GameData": {"PlayerInput": 4}})),
            metadata: Some(json!({"GameData": {"PlayerInput": {"timestamp": 9}}})),
            timestamp: 9,
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: DeltaEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_reject_response_decodes() {
        let resp: RejectResponse = serde_json::from_value(json!({
            "clientToken": "tok-3",
            "code": 404,
            "message": "No shadow exists with name: device-1"
        }))
        .unwrap();
        assert_eq!(resp.code, 404);
        assert!(resp.message.contains("device-1"));
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let garbage = b"not json at all";
        let result: Result<GetResponse, _> = serde_json::from_slice(garbage);
        assert!(result.is_err());
    }
}
