use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::enums::{GamePhase, ResourceType};

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for games
pub type GameId = String;

/// Unique identifier for sessions
pub type SessionId = String;

/// In-game actions a seated player can take once the game is running
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Nominate a plant from the market for auction
    StartAuction { plant_id: u32 },
    /// Raise the bid on the plant under auction; a bid of 0 passes
    BidPlant { plant_id: u32, bid: u32 },
    /// Drop out of the running auction
    PassBid,
    BuyResources { resources: HashMap<ResourceType, u32> },
    BuildCity { city_id: String },
    PowerCities { power_plants: Vec<u32> },
    EndTurn,
}

impl PlayerAction {
    /// Wire name, used in logs and error payloads
    pub fn name(&self) -> &'static str {
        match self {
            PlayerAction::StartAuction { .. } => "START_AUCTION",
            PlayerAction::BidPlant { .. } => "BID_PLANT",
            PlayerAction::PassBid => "PASS_BID",
            PlayerAction::BuyResources { .. } => "BUY_RESOURCES",
            PlayerAction::BuildCity { .. } => "BUILD_CITY",
            PlayerAction::PowerCities { .. } => "POWER_CITIES",
            PlayerAction::EndTurn => "END_TURN",
        }
    }

    /// Phases during which the action is accepted
    pub fn allowed_phases(&self) -> &'static [GamePhase] {
        match self {
            // The first nomination closes the player-order phase
            PlayerAction::StartAuction { .. } | PlayerAction::BidPlant { .. } => {
                &[GamePhase::PlayerOrder, GamePhase::Auction]
            }
            PlayerAction::PassBid => &[GamePhase::Auction],
            PlayerAction::BuyResources { .. } => &[GamePhase::BuyResources],
            PlayerAction::BuildCity { .. } => &[GamePhase::BuildCities],
            PlayerAction::PowerCities { .. } => &[GamePhase::Bureaucracy],
            PlayerAction::EndTurn => &[
                GamePhase::PlayerOrder,
                GamePhase::Auction,
                GamePhase::BuyResources,
                GamePhase::BuildCities,
                GamePhase::Bureaucracy,
            ],
        }
    }
}

/// Events produced by a committed mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
        color: String,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    GameStarted {
        game_id: GameId,
        turn_order: Vec<PlayerId>,
    },
    PhaseChanged {
        phase: GamePhase,
        round: u32,
    },
    TurnChanged {
        current_player_id: PlayerId,
        turn: usize,
    },
    AuctionStarted {
        plant_id: u32,
        opening_bid: u32,
        participants: Vec<PlayerId>,
    },
    BidPlaced {
        player_id: PlayerId,
        plant_id: u32,
        bid: u32,
    },
    BidPassed {
        player_id: PlayerId,
        plant_id: u32,
    },
    AuctionWon {
        player_id: PlayerId,
        plant_id: u32,
        price: u32,
        discarded_plant: Option<u32>,
    },
    /// Every bidder dropped out and nobody could pay for the plant
    AuctionClosed {
        plant_id: u32,
    },
    AuctionSkipped {
        player_id: PlayerId,
    },
    ResourcesBought {
        player_id: PlayerId,
        resources: HashMap<ResourceType, u32>,
        cost: u32,
    },
    CityBuilt {
        player_id: PlayerId,
        city_id: String,
        cost: u32,
    },
    CitiesPowered {
        player_id: PlayerId,
        powered: u32,
        income: u32,
    },
    StepChanged {
        step: u8,
    },
    GameEnded {
        winner_id: Option<PlayerId>,
    },
}
