//! The Connect-4 rules engine: the single source of truth for board
//! state in a Shadowplay session.
//!
//! This crate is deliberately pure and synchronous — no I/O, no
//! logging, no async. The orchestrator drives it and broadcasts the
//! results; the engine only knows the rules.

mod game;

pub use game::{Connect4, Phase, COLS, ROWS};
