// Power Grid Server Library - Core Module Organization
//
// The game engine (market, map, plants, players, phase machine) sits at the
// bottom; the session layer multiplexes client connections onto games above
// it; the axum adapter and HTTP routes are a thin shell on top.

// Core game data structures and enums
pub mod actions;
pub mod enums;
pub mod errors;

// Game logic implementation
pub mod game;
pub mod map;
pub mod market;
pub mod player;
pub mod power_plant;

// Server implementation
pub mod analytics;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod websocket;

// Re-export common types for convenient access
pub use crate::actions::{GameEvent, GameId, PlayerAction, PlayerId, SessionId};
pub use crate::config::{GameRules, ServerConfig, SessionConfig};
pub use crate::enums::{GamePhase, GameStatus, PlantKind, ResourceType};
pub use crate::errors::{PowerGridError, PowerGridResult};
pub use crate::game::{ActionOutcome, Committed, Game, GameManager, GameSnapshot};
pub use crate::map::{Map, MapLoader, MapRegistry};
pub use crate::protocol::{Message, MessageType};
pub use crate::session::{Frame, SessionManager};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
