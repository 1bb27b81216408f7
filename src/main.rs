//! Runs a complete local session end to end: one host engine and a handful
//! of scripted players, all talking through the in-memory channel.

use clap::Parser;
use client::{ClientEngine, ClientEvent};
use host::{HostConfig, HostEngine, Session, TimerConfig};
use log::{error, warn};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use shared::{ClientChannel, EchoGenerator, InMemoryChannel, Phase, VariantKind};
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Play a scripted party-game session locally")]
struct Args {
    /// Number of scripted players
    #[clap(short, long, default_value = "3")]
    players: usize,
    /// Rounds to play
    #[clap(short, long, default_value = "1")]
    rounds: u32,
    /// Game variant: image, text or list
    #[clap(short, long, default_value = "text")]
    variant: String,
    /// Per-phase time limit in milliseconds (0 disables the timer)
    #[clap(short, long, default_value = "10000")]
    timer_ms: u64,
}

const PLAYER_NAMES: [&str; 8] = ["ada", "bob", "cleo", "dot", "eve", "fox", "gus", "hal"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let variant = match args.variant.as_str() {
        "image" => VariantKind::Image,
        "text" => VariantKind::Text,
        "list" => VariantKind::List,
        other => return Err(format!("unknown variant '{}'", other).into()),
    };
    if args.players < 2 {
        return Err("a session needs at least 2 players".into());
    }

    let channel = InMemoryChannel::new();
    let mut rng = StdRng::from_entropy();
    let session = Session::new(Uuid::new_v4(), variant, &mut rng);
    println!(
        "session {} ({}), {} players, {} round(s)",
        session.join_code,
        shared::variant_spec(variant).display_name,
        args.players,
        args.rounds
    );

    let config = HostConfig {
        rounds: args.rounds,
        timer: if args.timer_ms == 0 {
            TimerConfig::disabled()
        } else {
            TimerConfig {
                enabled: true,
                writing: Duration::from_millis(args.timer_ms),
                lies: Duration::from_millis(args.timer_ms),
                voting: Duration::from_millis(args.timer_ms),
                start_delay: Duration::ZERO,
                grace: Duration::ZERO,
            }
        },
        auto_continue: Some(Duration::from_millis(750)),
    };
    let (engine, handle) = HostEngine::new(session, channel.clone(), config);
    let host_task = tokio::spawn(engine.run());

    let mut player_tasks = Vec::new();
    for i in 0..args.players {
        let base = PLAYER_NAMES[i % PLAYER_NAMES.len()];
        let name = if i < PLAYER_NAMES.len() {
            base.to_string()
        } else {
            format!("{}-{}", base, i)
        };
        player_tasks.push(tokio::spawn(run_player(channel.clone(), variant, name)));
    }

    // Start once everyone is on the roster.
    loop {
        if ClientChannel::fetch_roster(&channel)?.len() >= args.players {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.start_game(None)?;

    let final_snapshot = host_task.await?;
    for task in player_tasks {
        let _ = task.await;
    }

    println!("\nfinal scores:");
    let roster = ClientChannel::fetch_roster(&channel)?;
    let mut standings: Vec<_> = roster
        .iter()
        .map(|p| (p.display_name(), final_snapshot.score(p.id).copied().unwrap_or_default()))
        .collect();
    standings.sort_by_key(|(_, score)| std::cmp::Reverse(score.current));
    for (name, score) in standings {
        println!(
            "  {:<10} {:>6} points (found the truth {}x, fooled others {}x)",
            name, score.current, score.i_vote_truth, score.my_lies_voted
        );
    }

    Ok(())
}

/// A scripted player: writes a prompt, lies about everyone else's
/// generations, and votes for a random caption it didn't write.
async fn run_player(channel: InMemoryChannel, variant: VariantKind, name: String) {
    let generator = EchoGenerator::new(channel.clone());
    let mut engine = match ClientEngine::join(channel, generator, variant, &name, None) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{} could not join: {}", name, e);
            return;
        }
    };
    let mut rng = StdRng::from_entropy();

    while let Some(event) = engine.next_event().await {
        match event {
            ClientEvent::PhaseEntered(Phase::WritingPrompts) => {
                let round = engine.snapshot().round;
                let prompt = format!("{} dreams of rain, take {}", name, round);
                if let Err(e) = engine.submit_generation(&prompt) {
                    warn!("{} could not submit a prompt: {}", name, e);
                }
            }
            ClientEvent::PhaseEntered(Phase::CreatingLies) => {
                if !engine.is_current_author() {
                    let lie = format!("{} swears it was about soup", name);
                    if let Err(e) = engine.submit_caption(&lie) {
                        warn!("{} could not submit a caption: {}", name, e);
                    }
                }
            }
            ClientEvent::PhaseEntered(Phase::Voting) => {
                if !engine.is_current_author() {
                    let own_id = engine.id();
                    let accused = engine
                        .snapshot()
                        .captions
                        .iter()
                        .filter(|c| c.author != own_id)
                        .choose(&mut rng)
                        .map(|c| c.author);
                    if let Some(accused) = accused {
                        if let Err(e) = engine.submit_vote(accused) {
                            warn!("{} could not vote: {}", name, e);
                        }
                    }
                }
            }
            ClientEvent::PhaseEntered(Phase::Finished) => break,
            _ => {}
        }
    }
}
