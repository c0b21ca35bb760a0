use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Coal,
    Oil,
    Garbage,
    Uranium,
}

pub const RESOURCE_TYPES: [ResourceType; 4] = [
    ResourceType::Coal,
    ResourceType::Oil,
    ResourceType::Garbage,
    ResourceType::Uranium,
];

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Coal => "coal",
            ResourceType::Oil => "oil",
            ResourceType::Garbage => "garbage",
            ResourceType::Uranium => "uranium",
        };
        f.write_str(name)
    }
}

/// What a power plant burns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantKind {
    Coal,
    Oil,
    /// Burns any mix of coal and oil
    Hybrid,
    Garbage,
    Uranium,
    /// Wind/solar/fusion, burns nothing
    Ecological,
}

impl PlantKind {
    /// Resource types this plant can burn
    pub fn fuels(&self) -> &'static [ResourceType] {
        match self {
            PlantKind::Coal => &[ResourceType::Coal],
            PlantKind::Oil => &[ResourceType::Oil],
            PlantKind::Hybrid => &[ResourceType::Coal, ResourceType::Oil],
            PlantKind::Garbage => &[ResourceType::Garbage],
            PlantKind::Uranium => &[ResourceType::Uranium],
            PlantKind::Ecological => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    PlayerOrder,
    Auction,
    BuyResources,
    BuildCities,
    Bureaucracy,
    GameEnd,
}

impl GamePhase {
    /// The phase that follows this one within a round. Bureaucracy and
    /// GameEnd are resolved by the game itself.
    pub fn next(&self) -> Option<GamePhase> {
        match self {
            GamePhase::PlayerOrder => Some(GamePhase::Auction),
            GamePhase::Auction => Some(GamePhase::BuyResources),
            GamePhase::BuyResources => Some(GamePhase::BuildCities),
            GamePhase::BuildCities => Some(GamePhase::Bureaucracy),
            GamePhase::Bureaucracy | GamePhase::GameEnd => None,
        }
    }

    /// Phases played in reverse turn order
    pub fn is_reverse_order(&self) -> bool {
        matches!(self, GamePhase::BuyResources | GamePhase::BuildCities)
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::PlayerOrder => "PLAYER_ORDER",
            GamePhase::Auction => "AUCTION",
            GamePhase::BuyResources => "BUY_RESOURCES",
            GamePhase::BuildCities => "BUILD_CITIES",
            GamePhase::Bureaucracy => "BUREAUCRACY",
            GamePhase::GameEnd => "GAME_END",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Lobby,
    Playing,
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Lobby => write!(f, "lobby"),
            GameStatus::Playing => write!(f, "playing"),
            GameStatus::Finished => write!(f, "finished"),
        }
    }
}

pub const COLORS: [&str; 6] = ["red", "blue", "green", "yellow", "purple", "black"];
