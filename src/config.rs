// Server configuration
//
// Every knob can be set with a flag or a POWERGRID_* environment variable.
// The parsed ServerConfig is split into the rules a Game is created with and
// the limits the session layer runs under.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::player::DEFAULT_MAX_PLANTS;

#[derive(Debug, Clone, Parser)]
#[command(name = "powergrid", version, about = "Power Grid multiplayer game server")]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    #[arg(long, env = "POWERGRID_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Dispatch workers processing inbound messages
    #[arg(long, env = "POWERGRID_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Capacity of each worker's dispatch queue
    #[arg(long, env = "POWERGRID_DISPATCH_QUEUE", default_value_t = 1024)]
    pub dispatch_queue: usize,

    /// Capacity of each session's outbound queue
    #[arg(long, env = "POWERGRID_OUTBOUND_QUEUE", default_value_t = 256)]
    pub outbound_queue: usize,

    #[arg(long, env = "POWERGRID_PING_INTERVAL_SECS", default_value_t = 20)]
    pub ping_interval_secs: u64,

    /// A connection with no inbound frame for this long is dropped
    #[arg(long, env = "POWERGRID_PONG_TIMEOUT_SECS", default_value_t = 60)]
    pub pong_timeout_secs: u64,

    /// Idle sessions are removed after this long
    #[arg(long, env = "POWERGRID_SESSION_TIMEOUT_SECS", default_value_t = 300)]
    pub session_timeout_secs: u64,

    #[arg(long, env = "POWERGRID_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub sweep_interval_secs: u64,

    /// Directory of extra JSON maps
    #[arg(long, env = "POWERGRID_MAPS_DIR")]
    pub maps_dir: Option<PathBuf>,

    #[arg(long, env = "POWERGRID_STARTING_MONEY", default_value_t = 50)]
    pub starting_money: u32,

    /// Cities that end the game
    #[arg(long, env = "POWERGRID_WIN_CITIES", default_value_t = 17)]
    pub win_cities: usize,

    #[arg(long, env = "POWERGRID_MAX_ROUNDS", default_value_t = 20)]
    pub max_rounds: u32,

    /// Fixed RNG seed for reproducible games
    #[arg(long, env = "POWERGRID_SEED")]
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn game_rules(&self) -> GameRules {
        GameRules {
            starting_money: self.starting_money,
            win_cities: self.win_cities,
            max_rounds: self.max_rounds,
            seed: self.seed,
            ..GameRules::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            workers: self.workers.max(1),
            dispatch_queue: self.dispatch_queue.max(1),
            outbound_queue: self.outbound_queue.max(1),
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs.max(1)),
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

/// Rule parameters fixed at game creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    pub starting_money: u32,
    pub win_cities: usize,
    pub max_rounds: u32,
    pub min_players: usize,
    pub max_players: usize,
    pub max_power_plants: usize,
    pub seed: Option<u64>,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_money: 50,
            win_cities: 17,
            max_rounds: 20,
            min_players: 2,
            max_players: 6,
            max_power_plants: DEFAULT_MAX_PLANTS,
            seed: None,
        }
    }
}

impl GameRules {
    /// Cities that trigger Step 2: 10 with two players, 7 otherwise
    pub fn step_two_cities(&self, players: usize) -> usize {
        if players <= 2 {
            10
        } else {
            7
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub workers: usize,
    pub dispatch_queue: usize,
    pub outbound_queue: usize,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            dispatch_queue: 1024,
            outbound_queue: 256,
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(60),
            session_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}
