//! Two scripted "devices" playing a game of Connect-4 against each
//! other through the in-memory shadow hub.
//!
//! Each device only ever touches the `desired` section of its own
//! shadow document, exactly like real hardware would; the session
//! orchestrator sees their input arrive as delta notifications, drives
//! the rules engine, and mirrors the authoritative state back out.
//! Press ctrl-c to stop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shadowplay::protocol::PeerId;
use shadowplay::sync::{spawn_coordinator, ShadowConfig};
use shadowplay::transport::ShadowHub;
use shadowplay::{SessionConfig, SessionOrchestrator, ShadowplayError};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), ShadowplayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hub = Arc::new(ShadowHub::new());
    let one = PeerId::new("device-1");
    let two = PeerId::new("device-2");

    let player_one = spawn_coordinator(
        ShadowConfig::new(one.clone()),
        hub.register(one.clone()),
    )
    .await?;
    let player_two = spawn_coordinator(
        ShadowConfig::new(two.clone()),
        hub.register(two.clone()),
    )
    .await?;

    // Player 1 goes for the bottom row; player 2 stacks column 7.
    tokio::spawn(device_script(
        Arc::clone(&hub),
        one,
        1,
        vec![1, 2, 3, 4],
    ));
    tokio::spawn(device_script(
        Arc::clone(&hub),
        two,
        2,
        vec![7, 7, 7, 7],
    ));

    let (quit_tx, quit_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, quitting");
            let _ = quit_tx.send(true);
        }
    });

    let orchestrator = SessionOrchestrator::new(
        SessionConfig::default(),
        player_one,
        player_two,
    );
    orchestrator.run(quit_rx).await
}

/// Plays one scripted game: waits for the session to come up, signals
/// readiness, then plays each move as soon as it is this player's turn.
async fn device_script(
    hub: Arc<ShadowHub>,
    peer: PeerId,
    player: u8,
    moves: Vec<i32>,
) {
    let game = |hub: &ShadowHub| -> Option<Value> {
        hub.reported(&peer).map(|reported| reported["GameData"].clone())
    };

    // Wait for the orchestrator's initial push.
    while game(&hub).is_none() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    tracing::info!(%peer, "device ready");
    hub.update_desired(&peer, json!({ "GameData": { "PlayerInput": -1 } }));

    for column in moves {
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let Some(game) = game(&hub) else { continue };
            if game["Winner"] != 0 {
                tracing::info!(%peer, winner = %game["Winner"], "device sees game over");
                return;
            }
            if game["GameState"] == 2 && game["CurrentTurn"] == i64::from(player) {
                break;
            }
        }
        tracing::info!(%peer, column, "device plays");
        hub.update_desired(&peer, json!({ "GameData": { "PlayerInput": column } }));
    }

    // Let the final board arrive, then report it.
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Some(game) = game(&hub) {
            if game["Winner"] != 0 {
                tracing::info!(%peer, winner = %game["Winner"], "device sees game over");
                return;
            }
        }
    }
}
