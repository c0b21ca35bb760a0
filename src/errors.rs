use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{GameId, PlayerId};
use crate::enums::{GamePhase, GameStatus, ResourceType};

/// Top-level error type for the entire Power Grid server
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PowerGridError {
    #[error("{0}")]
    Validation(#[from] GameError),

    #[error("{0}")]
    Economic(#[from] EconomicError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Server busy, retry later")]
    ServerBusy,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rule and protocol violations. Always recoverable, never mutate state.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameError {
    #[error("Game is not in progress: {game_id} is {status:?}")]
    GameNotInProgress { game_id: GameId, status: GameStatus },

    #[error("Game {game_id} has already started")]
    AlreadyStarted { game_id: GameId },

    #[error("Minimum players not met: {min_players}")]
    MinPlayersNotMet { min_players: usize },

    #[error("Maximum players reached: {max_players}")]
    MaxPlayersReached { max_players: usize },

    #[error("Max players must be between {min} and {max}, got {requested}")]
    InvalidMaxPlayers {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("Player {player_id} already joined")]
    PlayerAlreadyJoined { player_id: PlayerId },

    #[error("Color {color} is already taken")]
    ColorTaken { color: String },

    #[error("Action '{action}' is not allowed during {phase:?}")]
    WrongPhase { action: String, phase: GamePhase },

    #[error("Not player's turn: current={current_player}, attempted={attempted_player}")]
    NotPlayerTurn {
        current_player: PlayerId,
        attempted_player: PlayerId,
    },

    #[error("No auction is running")]
    NoActiveAuction,

    #[error("An auction for plant {plant_id} is already running")]
    AuctionInProgress { plant_id: u32 },

    #[error("Plant {plant_id} is not the plant under auction ({current_plant})")]
    PlantMismatch { plant_id: u32, current_plant: u32 },

    #[error("Plant {plant_id} is not available in the market")]
    PlantNotInMarket { plant_id: u32 },

    #[error("Bid {bid} must exceed the current bid of {current_bid}")]
    BidTooLow { bid: u32, current_bid: u32 },

    #[error("Opening bid {bid} is below the face value {minimum}")]
    OpeningBidTooLow { bid: u32, minimum: u32 },

    #[error("Player {player_id} already bought a plant this round")]
    AlreadyBoughtPlant { player_id: PlayerId },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: u32 },

    #[error("Player {player_id} already owns city {city_id}")]
    CityAlreadyOwned { player_id: PlayerId, city_id: String },

    #[error("City {city_id} has no free slot in step {step}")]
    CityFull { city_id: String, step: u8 },

    #[error("City {city_id} cannot be reached from the player's network")]
    CityUnreachable { city_id: String },

    #[error("Player does not own plant {plant_id}")]
    PlantNotOwned { plant_id: u32 },

    #[error("Plant {plant_id} listed more than once")]
    DuplicatePlant { plant_id: u32 },

    #[error("Invalid message: {details}")]
    InvalidMessage { details: String },

    #[error("Game rule violation: {rule}")]
    RuleViolation { rule: String },
}

/// Insufficient money or goods for a purchase, bid or firing a plant
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EconomicError {
    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u32, available: u32 },

    #[error("Insufficient {resource:?}: requested {requested}, available {available}")]
    InsufficientResources {
        resource: ResourceType,
        requested: u32,
        available: u32,
    },

    #[error("Not enough storage for {resource:?}: requested {requested}, free {free}")]
    StorageFull {
        resource: ResourceType,
        requested: u32,
        free: u32,
    },
}

/// Unknown identifiers
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotFoundError {
    #[error("Game not found: {game_id}")]
    Game { game_id: GameId },

    #[error("Player not found: {player_id}")]
    Player { player_id: PlayerId },

    #[error("City not found: {city_id}")]
    City { city_id: String },

    #[error("Map not found: {map}")]
    Map { map: String },

    #[error("Session not found: {session_id}")]
    Session { session_id: String },
}

/// Transport errors. These only ever trigger session cleanup.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("Outbound queue full for session {session_id}")]
    QueueFull { session_id: String },

    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: String },

    #[error("Message serialization failed: {details}")]
    SerializationFailed { details: String },

    #[error("Connection timed out for session {session_id}")]
    Timeout { session_id: String },

    #[error("Connection closed unexpectedly: {details}")]
    ConnectionClosed { details: String },
}

/// Result type alias for convenience
pub type PowerGridResult<T> = Result<T, PowerGridError>;

impl PowerGridError {
    /// Stable code sent in `ERROR{code,message}` payloads
    pub fn code(&self) -> &'static str {
        match self {
            PowerGridError::Validation(err) => err.code(),
            PowerGridError::Economic(err) => match err {
                EconomicError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
                EconomicError::InsufficientResources { .. } => "INSUFFICIENT_RESOURCES",
                EconomicError::StorageFull { .. } => "STORAGE_FULL",
            },
            PowerGridError::NotFound(err) => match err {
                NotFoundError::Game { .. } => "GAME_NOT_FOUND",
                NotFoundError::Player { .. } => "PLAYER_NOT_FOUND",
                NotFoundError::City { .. } => "CITY_NOT_FOUND",
                NotFoundError::Map { .. } => "MAP_NOT_FOUND",
                NotFoundError::Session { .. } => "SESSION_NOT_FOUND",
            },
            PowerGridError::Network(_) => "NETWORK_ERROR",
            PowerGridError::ServerBusy => "SERVER_BUSY",
            PowerGridError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::GameNotInProgress { .. } => "GAME_NOT_IN_PROGRESS",
            GameError::AlreadyStarted { .. } => "GAME_ALREADY_STARTED",
            GameError::MinPlayersNotMet { .. } => "NOT_ENOUGH_PLAYERS",
            GameError::MaxPlayersReached { .. } => "GAME_FULL",
            GameError::InvalidMaxPlayers { .. } => "INVALID_MAX_PLAYERS",
            GameError::PlayerAlreadyJoined { .. } => "ALREADY_JOINED",
            GameError::ColorTaken { .. } => "COLOR_TAKEN",
            GameError::WrongPhase { .. } => "WRONG_PHASE",
            GameError::NotPlayerTurn { .. } => "NOT_YOUR_TURN",
            GameError::NoActiveAuction => "NO_ACTIVE_AUCTION",
            GameError::AuctionInProgress { .. } => "AUCTION_IN_PROGRESS",
            GameError::PlantMismatch { .. } => "PLANT_MISMATCH",
            GameError::PlantNotInMarket { .. } => "PLANT_NOT_IN_MARKET",
            GameError::BidTooLow { .. } | GameError::OpeningBidTooLow { .. } => "BID_TOO_LOW",
            GameError::AlreadyBoughtPlant { .. } => "ALREADY_BOUGHT_PLANT",
            GameError::InvalidAmount { .. } => "INVALID_AMOUNT",
            GameError::CityAlreadyOwned { .. } => "CITY_ALREADY_OWNED",
            GameError::CityFull { .. } => "CITY_FULL",
            GameError::CityUnreachable { .. } => "CITY_UNREACHABLE",
            GameError::PlantNotOwned { .. } => "PLANT_NOT_OWNED",
            GameError::DuplicatePlant { .. } => "DUPLICATE_PLANT",
            GameError::InvalidMessage { .. } => "INVALID_MESSAGE",
            GameError::RuleViolation { .. } => "RULE_VIOLATION",
        }
    }
}

/// Helper methods for creating common errors
impl GameError {
    pub fn not_player_turn(current: impl Into<PlayerId>, attempted: impl Into<PlayerId>) -> Self {
        Self::NotPlayerTurn {
            current_player: current.into(),
            attempted_player: attempted.into(),
        }
    }

    pub fn wrong_phase(action: impl Into<String>, phase: GamePhase) -> Self {
        Self::WrongPhase {
            action: action.into(),
            phase,
        }
    }

    pub fn invalid_message(details: impl Into<String>) -> Self {
        Self::InvalidMessage {
            details: details.into(),
        }
    }

    pub fn rule_violation(rule: impl Into<String>) -> Self {
        Self::RuleViolation { rule: rule.into() }
    }

    pub fn missing_game_id() -> Self {
        Self::invalid_message("game_id is required")
    }
}

impl NotFoundError {
    pub fn game(game_id: impl Into<GameId>) -> Self {
        Self::Game {
            game_id: game_id.into(),
        }
    }

    pub fn player(player_id: impl Into<PlayerId>) -> Self {
        Self::Player {
            player_id: player_id.into(),
        }
    }
}

impl From<serde_json::Error> for PowerGridError {
    fn from(err: serde_json::Error) -> Self {
        PowerGridError::Validation(GameError::invalid_message(err.to_string()))
    }
}
