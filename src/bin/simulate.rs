// Plays random-policy games headless to shake out rule bugs.
//
// Bots only see snapshots and only act through process_action, exactly
// like a network client would.

use clap::Parser;
use log::debug;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use std::collections::HashMap;

use powergrid::enums::{GamePhase, GameStatus, ResourceType};
use powergrid::map::germany;
use powergrid::{Game, GameRules, GameSnapshot, PlayerAction};

#[derive(Debug, Parser)]
#[command(name = "simulate", about = "Run random Power Grid games in parallel")]
struct Args {
    /// Number of games to play
    #[arg(short = 'n', long, default_value_t = 100)]
    games: usize,

    /// Players per game
    #[arg(short, long, default_value_t = 4)]
    players: usize,

    /// Base seed; game i uses seed + i
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Give up on a game after this many actions
    #[arg(long, default_value_t = 20_000)]
    max_actions: usize,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct GameReport {
    winner: Option<String>,
    rounds: u32,
    actions: usize,
    rejected: usize,
    finished: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    println!("⚡ Power Grid simulation");
    println!("========================");
    println!("  - Games: {}", args.games);
    println!("  - Players: {}", args.players);
    println!("  - Seed: {}", args.seed);

    let reports: Vec<GameReport> = (0..args.games)
        .into_par_iter()
        .map(|i| play_game(args.seed + i as u64, args.players, args.max_actions))
        .collect();

    let mut wins: HashMap<String, usize> = HashMap::new();
    for (i, report) in reports.iter().enumerate() {
        if args.verbose {
            println!(
                "  Game {}: winner {:?} after {} rounds ({} actions, {} rejected)",
                i + 1,
                report.winner,
                report.rounds,
                report.actions,
                report.rejected
            );
        }
        if let Some(winner) = &report.winner {
            *wins.entry(winner.clone()).or_default() += 1;
        }
    }

    let finished: Vec<&GameReport> = reports.iter().filter(|r| r.finished).collect();
    let rejected: usize = reports.iter().map(|r| r.rejected).sum();
    println!("\n📊 Results");
    println!("==========");
    println!("Completed games: {}/{}", finished.len(), reports.len());
    if !finished.is_empty() {
        let rounds: u32 = finished.iter().map(|r| r.rounds).sum();
        println!(
            "Average rounds per game: {:.1}",
            rounds as f64 / finished.len() as f64
        );
    }
    let mut seats: Vec<_> = wins.into_iter().collect();
    seats.sort();
    for (seat, count) in seats {
        println!("{}: {} wins", seat, count);
    }
    println!("Rejected actions: {}", rejected);
}

fn play_game(seed: u64, players: usize, max_actions: usize) -> GameReport {
    let rules = GameRules {
        seed: Some(seed),
        ..GameRules::default()
    };
    let mut report = GameReport::default();
    let Ok(mut game) = Game::new(format!("sim-{}", seed), "Simulation".into(), germany(), players, rules)
    else {
        return report;
    };
    for seat in 0..players {
        let id = format!("bot_{}", seat);
        if game.add_player(&id, &id, None).is_err() {
            return report;
        }
    }
    if game.start().is_err() {
        return report;
    }

    let mut rng = XorShiftRng::seed_from_u64(seed ^ 0x5eed);
    while report.actions < max_actions {
        let snapshot = game.snapshot();
        if snapshot.status != GameStatus::Playing {
            break;
        }
        let Some(player_id) = snapshot.current_player_id.clone() else {
            break;
        };

        let action = choose_action(&snapshot, &player_id, &mut rng);
        report.actions += 1;
        if let Err(e) = game.process_action(&player_id, action) {
            debug!("{} rejected: {}", player_id, e);
            report.rejected += 1;
            // fall back to the move that is always legal
            let fallback = if running_auction(&snapshot) {
                PlayerAction::PassBid
            } else {
                PlayerAction::EndTurn
            };
            report.actions += 1;
            if game.process_action(&player_id, fallback).is_err() {
                report.rejected += 1;
                break;
            }
        }
    }

    let snapshot = game.snapshot();
    report.finished = snapshot.status == GameStatus::Finished;
    report.winner = snapshot.winner;
    report.rounds = snapshot.round;
    report
}

fn running_auction(snapshot: &GameSnapshot) -> bool {
    snapshot
        .auction
        .as_ref()
        .is_some_and(|a| a.current_plant.is_some())
}

fn choose_action(snapshot: &GameSnapshot, player_id: &str, rng: &mut XorShiftRng) -> PlayerAction {
    let Some(player) = snapshot.players.get(player_id) else {
        return PlayerAction::EndTurn;
    };

    match snapshot.phase {
        GamePhase::PlayerOrder => PlayerAction::EndTurn,
        GamePhase::Auction => {
            if let Some(auction) = snapshot.auction.as_ref().filter(|a| a.current_plant.is_some()) {
                let plant_id = auction.plant_id().unwrap_or_default();
                let raise = auction.current_bid + rng.gen_range(1..=5);
                if raise <= player.money && rng.gen_bool(0.4) {
                    PlayerAction::BidPlant {
                        plant_id,
                        bid: raise,
                    }
                } else {
                    PlayerAction::PassBid
                }
            } else {
                let affordable: Vec<u32> = snapshot
                    .power_plant_market
                    .current
                    .iter()
                    .filter(|p| p.cost <= player.money)
                    .map(|p| p.id)
                    .collect();
                match affordable.choose(rng) {
                    Some(&plant_id) if rng.gen_bool(0.7) => PlayerAction::StartAuction { plant_id },
                    _ => PlayerAction::EndTurn,
                }
            }
        }
        GamePhase::BuyResources => {
            let fuels: Vec<ResourceType> = player
                .power_plants
                .iter()
                .flat_map(|p| p.kind.fuels().iter().copied())
                .collect();
            match fuels.choose(rng) {
                Some(&resource) if rng.gen_bool(0.6) => PlayerAction::BuyResources {
                    resources: HashMap::from([(resource, rng.gen_range(1..=2))]),
                },
                _ => PlayerAction::EndTurn,
            }
        }
        GamePhase::BuildCities => {
            let mut cities: Vec<&String> = snapshot.map.cities.keys().collect();
            cities.sort();
            match cities.choose(rng) {
                Some(city) if rng.gen_bool(0.5) => PlayerAction::BuildCity {
                    city_id: (*city).clone(),
                },
                _ => PlayerAction::EndTurn,
            }
        }
        GamePhase::Bureaucracy => {
            if player.power_plants.is_empty() {
                PlayerAction::EndTurn
            } else {
                PlayerAction::PowerCities {
                    power_plants: player.power_plants.iter().map(|p| p.id).collect(),
                }
            }
        }
        GamePhase::GameEnd => PlayerAction::EndTurn,
    }
}
