//! The session orchestrator: merges two shadow coordinators and one
//! rules engine into a single consistent two-player session.
//!
//! The orchestrator runs a fixed-cadence tick loop. Each tick it polls
//! the coordinators for newly-arrived, previously-unconsumed player
//! input, applies accepted moves to the engine, and serializes the
//! resulting state back out through both coordinators. The two peers
//! are fully independent — either one's view may lag the other's by a
//! tick, and the loop tolerates that.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use shadowplay_engine::{Connect4, Phase};
use shadowplay_protocol::{PeerId, PlayerAction, ProtocolError, DEFAULT_TARGET_PROPERTY};
use shadowplay_sync::{ShadowHandle, SyncError};
use tokio::sync::watch;

use crate::ShadowplayError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Top-level property the game document is published under. Must
    /// match the coordinators' target property.
    pub target_property: String,

    /// Delay between loop iterations. This is a deliberate rate limit
    /// on remote traffic, not a correctness requirement.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_property: DEFAULT_TARGET_PROPERTY.to_string(),
            tick_interval: Duration::from_millis(500),
        }
    }
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// The orchestrator's lifecycle state.
///
/// ```text
/// AwaitingReadiness → Playing → GameOver ─┐
///         ↑                               │
///         └───────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Collecting readiness signals from both peers.
    AwaitingReadiness,
    /// A match is in progress; moves are turn-gated.
    Playing,
    /// The final state has been pushed; a new handshake is required.
    GameOver,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingReadiness => write!(f, "AwaitingReadiness"),
            Self::Playing => write!(f, "Playing"),
            Self::GameOver => write!(f, "GameOver"),
        }
    }
}

/// Bitmask over the two players' readiness contributions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ReadinessVector(u8);

impl ReadinessVector {
    fn mark(&mut self, player: u8) {
        self.0 |= 1 << (player - 1);
    }

    fn contains(self, player: u8) -> bool {
        self.0 & (1 << (player - 1)) != 0
    }

    fn both(self) -> bool {
        self.0 == 0b11
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns one rules engine and two shadow coordinators; runs the game
/// loop until told to quit.
pub struct SessionOrchestrator {
    config: SessionConfig,
    engine: Connect4,
    /// Coordinator handles, indexed by player number - 1.
    peers: [ShadowHandle; 2],
    state: SessionState,
    readiness: ReadinessVector,
    /// Guards the final game-over push so it happens exactly once.
    game_over_sent: bool,
    /// Suppresses repeated "waiting for ..." lines between events.
    status_logged: bool,
}

impl SessionOrchestrator {
    /// Creates an orchestrator over two coordinator handles. The first
    /// handle is player 1, the second player 2.
    pub fn new(
        config: SessionConfig,
        player_one: ShadowHandle,
        player_two: ShadowHandle,
    ) -> Self {
        Self {
            config,
            engine: Connect4::new(),
            peers: [player_one, player_two],
            state: SessionState::AwaitingReadiness,
            readiness: ReadinessVector::default(),
            game_over_sent: false,
            status_logged: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until `quit` flips to true (or its sender is
    /// dropped), or an unrecoverable error occurs. Either way both
    /// coordinators are shut down before returning.
    pub async fn run(
        mut self,
        mut quit: watch::Receiver<bool>,
    ) -> Result<(), ShadowplayError> {
        tracing::info!("session starting");

        // Initial sync: learn whatever the shadows currently hold, then
        // seed both with a fresh not-yet-started game.
        let result = async {
            for handle in &self.peers {
                if let Err(err) = handle.fetch_current().await {
                    Self::recover(handle.peer(), err)?;
                }
            }
            self.engine.reset();
            self.push_state(0).await
        }
        .await;

        let result = match result {
            Err(err) => Err(err),
            Ok(()) => loop {
                tokio::select! {
                    changed = quit.changed() => {
                        if changed.is_err() || *quit.borrow_and_update() {
                            break Ok(());
                        }
                    }
                    _ = tokio::time::sleep(self.config.tick_interval) => {
                        if let Err(err) = self.tick().await {
                            break Err(err);
                        }
                    }
                }
            },
        };

        self.shutdown().await;
        result
    }

    /// One loop iteration.
    async fn tick(&mut self) -> Result<(), ShadowplayError> {
        if !self.status_logged {
            match self.state {
                SessionState::AwaitingReadiness => {
                    tracing::info!("waiting for both players to be ready");
                }
                SessionState::Playing => {
                    tracing::info!(
                        player = self.engine.current_player(),
                        "waiting for player to move"
                    );
                }
                SessionState::GameOver => {}
            }
            self.status_logged = true;
        }

        match self.state {
            SessionState::AwaitingReadiness => self.tick_awaiting().await,
            SessionState::Playing => self.tick_playing().await,
            SessionState::GameOver => {
                self.state = SessionState::AwaitingReadiness;
                self.status_logged = false;
                Ok(())
            }
        }
    }

    /// Samples both peers for the ready sentinel and starts a match
    /// once both have contributed.
    async fn tick_awaiting(&mut self) -> Result<(), ShadowplayError> {
        for player in [1u8, 2u8] {
            if self.readiness.contains(player) {
                continue;
            }
            let handle = &self.peers[usize::from(player - 1)];
            let Some(input) = handle.last_input().await? else {
                continue;
            };
            if input.consumed
                || PlayerAction::decode(input.value) != PlayerAction::Ready
            {
                continue;
            }
            // The contribution consumes the input immediately so the
            // same ready press can't count twice.
            handle.mark_input_consumed().await?;
            handle.set_ready(true).await?;
            self.readiness.mark(player);
            self.status_logged = false;
            tracing::info!(player, "player is ready");
        }

        if self.readiness.both() {
            tracing::info!("both players ready, starting match");
            self.engine.reset();
            self.engine.set_phase(Phase::Playing);
            self.push_state(0).await?;
            self.readiness.clear();
            self.game_over_sent = false;
            self.state = SessionState::Playing;
            self.status_logged = false;
        }
        Ok(())
    }

    /// Turn-gated move ingestion, plus the game-over transition.
    async fn tick_playing(&mut self) -> Result<(), ShadowplayError> {
        if self.engine.is_over() && !self.game_over_sent {
            match self.engine.winner() {
                -1 => tracing::info!("game over: tie"),
                winner => tracing::info!(winner, "game over"),
            }
            self.engine.set_phase(Phase::GameOver);
            self.push_state(0).await?;
            self.game_over_sent = true;
            self.readiness.clear();
            for handle in &self.peers {
                handle.set_ready(false).await?;
            }
            self.state = SessionState::GameOver;
            return Ok(());
        }

        let mover = self.engine.current_player();
        let handle = &self.peers[usize::from(mover - 1)];
        let Some(input) = handle.last_input().await? else {
            return Ok(());
        };
        if input.consumed {
            return Ok(());
        }
        handle.mark_input_consumed().await?;

        match PlayerAction::decode(input.value) {
            // Sentinels carry no move; nothing to apply or broadcast.
            PlayerAction::NoInput | PlayerAction::Ready => {}
            PlayerAction::Column(column) => {
                if self.engine.apply_move(column) {
                    tracing::info!(player = mover, column, "move applied");
                    if self.engine.is_over() {
                        self.engine.set_phase(Phase::GameOver);
                    }
                    self.push_state(input.value).await?;
                    self.status_logged = false;
                } else {
                    tracing::warn!(player = mover, column, "invalid move");
                    self.push_state(input.value).await?;
                }
            }
            PlayerAction::Invalid(raw) => {
                tracing::warn!(player = mover, input = raw, "invalid input");
                self.push_state(input.value).await?;
            }
        }
        Ok(())
    }

    /// Serializes the engine state (with `ack` echoing the consumed
    /// input) and pushes it through both coordinators: a change request
    /// on each, then a settle-waited fetch on each.
    async fn push_state(&mut self, ack: i32) -> Result<(), ShadowplayError> {
        let doc = serde_json::to_value(self.engine.serialize(ack))
            .map_err(ProtocolError::Encode)?;
        let mut document = Map::new();
        document.insert(self.config.target_property.clone(), doc);
        let document = Value::Object(document);

        for handle in &self.peers {
            if let Err(err) = handle.request_change(Some(document.clone())).await {
                Self::recover(handle.peer(), err)?;
            }
        }
        for handle in &self.peers {
            if let Err(err) = handle.fetch_current().await {
                Self::recover(handle.peer(), err)?;
            }
        }
        Ok(())
    }

    /// Transport-level failures leave the peer temporarily stale and
    /// the tick is skipped; only a dead coordinator ends the session.
    fn recover(peer: &PeerId, err: SyncError) -> Result<(), ShadowplayError> {
        match err {
            SyncError::CoordinatorGone(_) => Err(err.into()),
            err => {
                tracing::warn!(
                    peer = %peer,
                    error = %err,
                    "peer temporarily stale, skipping"
                );
                Ok(())
            }
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("session shutting down");
        for handle in &self.peers {
            if let Err(err) = handle.shutdown().await {
                tracing::warn!(
                    peer = %handle.peer(),
                    error = %err,
                    "coordinator shutdown failed"
                );
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_vector_marks_players_independently() {
        let mut readiness = ReadinessVector::default();
        assert!(!readiness.both());

        readiness.mark(1);
        assert!(readiness.contains(1));
        assert!(!readiness.contains(2));
        assert!(!readiness.both());

        readiness.mark(2);
        assert!(readiness.both());
    }

    #[test]
    fn test_readiness_vector_marking_twice_is_idempotent() {
        let mut readiness = ReadinessVector::default();
        readiness.mark(1);
        readiness.mark(1);
        assert!(!readiness.both());
    }

    #[test]
    fn test_readiness_vector_clear() {
        let mut readiness = ReadinessVector::default();
        readiness.mark(1);
        readiness.mark(2);
        readiness.clear();
        assert!(!readiness.contains(1));
        assert!(!readiness.contains(2));
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::AwaitingReadiness.to_string(), "AwaitingReadiness");
        assert_eq!(SessionState::Playing.to_string(), "Playing");
        assert_eq!(SessionState::GameOver.to_string(), "GameOver");
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.target_property, "GameData");
        assert_eq!(config.tick_interval, Duration::from_millis(500));
    }
}
