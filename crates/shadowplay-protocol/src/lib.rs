//! Wire shapes for Shadowplay.
//!
//! This crate defines everything that travels between a peer and the
//! remote shadow-document service:
//!
//! - **Document types** ([`GameDoc`], [`ShadowStateDoc`], the
//!   request/response shells) — the structures that get serialized to
//!   JSON and published or delivered on a subscription.
//! - **Input encoding** ([`PlayerAction`]) — how a player's single
//!   integer input is interpreted.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding documents.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw pub/sub
//! request-response) and the sync layer (per-peer reconciliation). It
//! doesn't know about connections or game rules — it only knows the
//! shape of the documents.

mod error;
mod input;
mod types;

pub use error::ProtocolError;
pub use input::PlayerAction;
pub use types::{
    DeltaEvent, GameDoc, GetResponse, PeerId, RejectResponse,
    ShadowStateDoc, UpdateRequest, UpdateResponse,
    DEFAULT_INPUT_PROPERTY, DEFAULT_TARGET_PROPERTY,
};
