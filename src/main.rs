//! Essence Board Host
//!
//! `essence-board-host` runs a scripted demo match and checks it replays to
//! the same state hash.
//! `essence-board-host serve [config.json] [board.json] [cards.json]` hosts
//! matches over WebSocket.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use essence_board::{
    VERSION,
    core::StateHash,
    game::{
        board::{Board, TileEffect},
        cards::{CardCatalog, CardId, CardRegistry},
        coordinator::{MatchConfig, MatchCoordinator},
        events::{MatchEventData, TracingSink},
        state::{PlayerId, RosterEntry, TurnPhase},
    },
    network::{GameServer, ServerConfig},
};

/// Demo tick length (ms).
const DEMO_TICK_MS: u32 = 50;

/// Demo stops after this many turns even without a winner.
const DEMO_TURN_CAP: u32 = 120;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Essence Board Host v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("serve") => serve(&args[1..]).await,
        Some(other) => anyhow::bail!("Unknown command: {}", other),
        None => demo(),
    }
}

async fn serve(args: &[String]) -> Result<()> {
    let config = match args.first() {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            ServerConfig::from_json(&json).with_context(|| format!("parsing {}", path))?
        }
        None => ServerConfig::default(),
    };

    let board = match args.get(1) {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            Board::from_json(&json).with_context(|| format!("loading board {}", path))?
        }
        None => demo_board()?,
    };

    let catalog = match args.get(2) {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            CardCatalog::from_json(&json).with_context(|| format!("loading cards {}", path))?
        }
        None => CardCatalog::starter(),
    };

    info!("Board: {} tiles, catalog: {} cards", board.len(), catalog.len());
    info!("Tick Rate: {} Hz", config.tick_rate);

    let server = Arc::new(GameServer::new(config, board, Arc::new(catalog)));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}

fn demo_board() -> Result<Board> {
    let effects = vec![
        TileEffect::None,
        TileEffect::Bonus(3),
        TileEffect::None,
        TileEffect::CardDraw { pool: vec![CardId(1), CardId(3), CardId(5), CardId(6)] },
        TileEffect::Damage,
        TileEffect::None,
        TileEffect::Penalty(2),
        TileEffect::ExtraTurn,
        TileEffect::None,
        TileEffect::CardDraw { pool: vec![CardId(2), CardId(4), CardId(5)] },
        TileEffect::Damage,
        TileEffect::Penalty(4),
        TileEffect::None,
        TileEffect::Bonus(2),
        TileEffect::Damage,
        TileEffect::None,
    ];
    Ok(Board::ring(effects)?)
}

/// Run the demo match and then replay it from the same seed.
fn demo() -> Result<()> {
    info!("=== Starting Demo Match ===");

    let match_id = [1u8; 16];
    let rng_seed = 12345u64;
    info!("Match ID: {}", hex::encode(match_id));
    info!("RNG Seed: {}", rng_seed);

    let hash = play_demo(match_id, rng_seed, true)?;
    info!("Final State Hash: {}", hex::encode(hash));

    info!("=== Verifying Determinism ===");
    let replay_hash = play_demo(match_id, rng_seed, false)?;
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }

    Ok(())
}

/// Drive a scripted four-player match: each turn plays the first card in
/// hand (aiming at the next surviving player), then rolls.
fn play_demo(match_id: [u8; 16], seed: u64, report: bool) -> Result<StateHash> {
    let names = ["Ana", "Bo", "Cy", "Di"];
    let roster: Vec<RosterEntry> = names
        .iter()
        .enumerate()
        .map(|(i, name)| RosterEntry::new(PlayerId::new([i as u8 + 1; 16]), *name))
        .collect();

    let catalog: Arc<dyn CardRegistry> = Arc::new(CardCatalog::starter());
    let config = MatchConfig {
        starting_hand: vec![CardId(1), CardId(6)],
        ..MatchConfig::default()
    };

    let mut coordinator = MatchCoordinator::new(
        match_id,
        roster,
        demo_board()?,
        catalog,
        Arc::new(TracingSink),
        config,
        seed,
    )?;

    let mut total_events = 0;

    while !coordinator.is_ended() && coordinator.state().cursor.turn_number < DEMO_TURN_CAP {
        if coordinator.state().turn_phase == TurnPhase::AwaitingAction {
            take_turn(&mut coordinator)?;
        }

        let result = coordinator.tick(DEMO_TICK_MS);
        total_events += result.events.len();

        if report {
            for event in &result.events {
                match &event.data {
                    MatchEventData::PlayerEliminated { player_id, placement } => {
                        info!("Player {} eliminated (placement: {})", player_id.short(), placement);
                    }
                    MatchEventData::MatchEnded { winner_id: Some(winner), turns } => {
                        info!("Match ended after {} turns! Winner: {}", turns, winner.short());
                    }
                    _ => {}
                }
            }
        }
    }

    if report {
        info!("=== Match Results ===");
        for (id, place) in coordinator.state().standings() {
            let essence = coordinator.token(&id).map(|t| t.essence()).unwrap_or(0);
            info!("#{}: Player {} - Essence: {}", place, id.short(), essence);
        }
        info!("Total events: {}", total_events);
    }

    Ok(coordinator.patch().state_hash)
}

fn take_turn(coordinator: &mut MatchCoordinator) -> Result<()> {
    let Some(current) = coordinator.current_player() else {
        return Ok(());
    };

    let state = coordinator.state();
    if state.cursor.cards_played == 0 {
        let card = state.current_player().and_then(|p| p.hand.cards().first().copied());
        let target = state
            .players
            .iter()
            .cycle()
            .skip(state.cursor.index + 1)
            .take(state.players.len())
            .find(|p| !p.eliminated && p.id != current)
            .map(|p| p.id);

        if let Some(card) = card {
            match coordinator.play_card(&current, card, target) {
                Ok(_) => return Ok(()),
                Err(e) => info!("{} could not play {}: {}", current.short(), card, e),
            }
        }
    }

    if coordinator.state().turn_phase == TurnPhase::AwaitingAction && !coordinator.state().cursor.has_rolled {
        coordinator.request_roll(&current)?;
    }
    Ok(())
}
