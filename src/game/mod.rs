// Game engine - one Power Grid match
//
// Every mutation enters through process_action, which checks the game
// status, then the phase, then whose turn it is. Handlers validate fully
// before they change anything, so a rejected action leaves the game
// exactly as it was.

mod auction;
pub mod manager;
mod moves;
mod phases;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::actions::{GameEvent, GameId, PlayerAction, PlayerId};
use crate::config::GameRules;
use crate::enums::{GamePhase, GameStatus, COLORS};
use crate::errors::{GameError, NotFoundError, PowerGridResult};
use crate::map::Map;
use crate::market::ResourceMarket;
use crate::player::Player;
use crate::power_plant::{standard_plants, PowerPlant, PowerPlantDeck};

pub use auction::AuctionState;
pub use manager::{ActionOutcome, Committed, GameManager, GameSummary, SharedGame};

#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub max_players: usize,
    pub status: GameStatus,
    pub current_phase: GamePhase,
    pub current_round: u32,
    /// Index into the acting order of the current phase
    pub current_turn: usize,
    pub step: u8,
    /// Join order while in the lobby, play order afterwards
    pub turn_order: Vec<PlayerId>,
    pub players: HashMap<PlayerId, Player>,
    pub map: Map,
    pub market: ResourceMarket,
    pub power_plants: PowerPlantDeck,
    pub auction: Option<AuctionState>,
    pub winner: Option<PlayerId>,
    pub rules: GameRules,
    pub created_at: DateTime<Utc>,
    /// Bumped by the manager on every committed mutation
    pub version: u64,
    rng: XorShiftRng,
}

/// Plant market as players see it; the draw pile stays face down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantMarketView {
    pub current: Vec<PowerPlant>,
    pub future: Vec<PowerPlant>,
    pub deck_size: usize,
    pub step_three: bool,
}

/// Read-only copy of everything a client needs to render the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub name: String,
    pub status: GameStatus,
    pub phase: GamePhase,
    pub round: u32,
    pub turn: usize,
    pub step: u8,
    pub current_player_id: Option<PlayerId>,
    pub turn_order: Vec<PlayerId>,
    pub players: HashMap<PlayerId, Player>,
    pub map: Map,
    pub resource_market: ResourceMarket,
    pub power_plant_market: PlantMarketView,
    pub auction: Option<AuctionState>,
    pub winner: Option<PlayerId>,
    pub max_players: usize,
    pub version: u64,
}

impl Game {
    pub fn new(
        id: GameId,
        name: String,
        map: Map,
        max_players: usize,
        rules: GameRules,
    ) -> PowerGridResult<Self> {
        if !(rules.min_players..=rules.max_players).contains(&max_players) {
            return Err(GameError::InvalidMaxPlayers {
                requested: max_players,
                min: rules.min_players,
                max: rules.max_players,
            }
            .into());
        }
        let seed = rules.seed.unwrap_or_else(rand::random);
        Ok(Self {
            id,
            name,
            max_players,
            status: GameStatus::Lobby,
            current_phase: GamePhase::PlayerOrder,
            current_round: 0,
            current_turn: 0,
            step: 1,
            turn_order: Vec::new(),
            players: HashMap::new(),
            map,
            market: ResourceMarket::new(),
            power_plants: PowerPlantDeck::default(),
            auction: None,
            winner: None,
            rules,
            created_at: Utc::now(),
            version: 0,
            rng: XorShiftRng::seed_from_u64(seed),
        })
    }

    pub fn player(&self, player_id: &str) -> PowerGridResult<&Player> {
        self.players
            .get(player_id)
            .ok_or_else(|| NotFoundError::player(player_id).into())
    }

    fn player_mut(&mut self, player_id: &str) -> PowerGridResult<&mut Player> {
        self.players
            .get_mut(player_id)
            .ok_or_else(|| NotFoundError::player(player_id).into())
    }

    /// Seat a player in the lobby. Without a color the first free one is used.
    pub fn add_player(
        &mut self,
        player_id: &str,
        name: &str,
        color: Option<&str>,
    ) -> PowerGridResult<GameEvent> {
        if self.status != GameStatus::Lobby {
            return Err(GameError::AlreadyStarted {
                game_id: self.id.clone(),
            }
            .into());
        }
        if self.players.contains_key(player_id) {
            return Err(GameError::PlayerAlreadyJoined {
                player_id: player_id.to_string(),
            }
            .into());
        }
        if self.players.len() >= self.max_players {
            return Err(GameError::MaxPlayersReached {
                max_players: self.max_players,
            }
            .into());
        }

        let taken = |c: &str| self.players.values().any(|p| p.color == c);
        let color = match color {
            Some(c) if taken(c) => {
                return Err(GameError::ColorTaken {
                    color: c.to_string(),
                }
                .into())
            }
            Some(c) => c.to_string(),
            None => COLORS
                .iter()
                .find(|c| !taken(**c))
                .map(|c| c.to_string())
                .unwrap_or_else(|| format!("color-{}", self.players.len() + 1)),
        };

        let player = Player::new(
            player_id.to_string(),
            name.to_string(),
            color.clone(),
            self.rules.starting_money,
        );
        self.players.insert(player_id.to_string(), player);
        self.turn_order.push(player_id.to_string());
        info!("👤 {} joined game {} as {}", name, self.id, color);

        Ok(GameEvent::PlayerJoined {
            player_id: player_id.to_string(),
            player_name: name.to_string(),
            color,
        })
    }

    /// Leaving the lobby frees the seat. Once play has begun the seat is
    /// kept and only marked disconnected.
    pub fn remove_player(&mut self, player_id: &str) -> PowerGridResult<GameEvent> {
        self.player(player_id)?;
        if self.status == GameStatus::Lobby {
            self.players.remove(player_id);
            self.turn_order.retain(|id| id != player_id);
            self.map.vacate(player_id);
        } else {
            self.player_mut(player_id)?.connected = false;
        }
        info!("👋 {} left game {}", player_id, self.id);
        Ok(GameEvent::PlayerLeft {
            player_id: player_id.to_string(),
        })
    }

    pub fn set_connected(&mut self, player_id: &str, connected: bool) -> PowerGridResult<()> {
        self.player_mut(player_id)?.connected = connected;
        Ok(())
    }

    /// Shuffle the seats, lay out the plant market and open round one
    pub fn start(&mut self) -> PowerGridResult<Vec<GameEvent>> {
        if self.status != GameStatus::Lobby {
            return Err(GameError::AlreadyStarted {
                game_id: self.id.clone(),
            }
            .into());
        }
        if self.players.len() < self.rules.min_players {
            return Err(GameError::MinPlayersNotMet {
                min_players: self.rules.min_players,
            }
            .into());
        }

        self.turn_order.shuffle(&mut self.rng);
        self.power_plants = PowerPlantDeck::new(standard_plants(), &mut self.rng);
        self.status = GameStatus::Playing;
        self.current_round = 1;
        self.step = 1;
        for player in self.players.values_mut() {
            player.reset_round();
        }
        info!(
            "🚀 Game {} started with {} players",
            self.id,
            self.turn_order.len()
        );

        let mut events = vec![GameEvent::GameStarted {
            game_id: self.id.clone(),
            turn_order: self.turn_order.clone(),
        }];
        self.enter_phase(GamePhase::PlayerOrder, &mut events);
        Ok(events)
    }

    /// Validate and apply one player action
    pub fn process_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
    ) -> PowerGridResult<Vec<GameEvent>> {
        if self.status != GameStatus::Playing {
            return Err(GameError::GameNotInProgress {
                game_id: self.id.clone(),
                status: self.status,
            }
            .into());
        }
        if !action.allowed_phases().contains(&self.current_phase) {
            return Err(GameError::wrong_phase(action.name(), self.current_phase).into());
        }
        self.player(player_id)?;

        debug!(
            "🎮 {} plays {} in game {} ({})",
            player_id,
            action.name(),
            self.id,
            self.current_phase
        );
        match action {
            PlayerAction::StartAuction { plant_id } => self.start_auction(player_id, plant_id),
            PlayerAction::BidPlant { plant_id, bid } => self.bid_plant(player_id, plant_id, bid),
            PlayerAction::PassBid => self.pass_on_bid(player_id),
            PlayerAction::BuyResources { resources } => self.buy_resources(player_id, &resources),
            PlayerAction::BuildCity { city_id } => self.build_city(player_id, &city_id),
            PlayerAction::PowerCities { power_plants } => {
                self.power_cities(player_id, &power_plants)
            }
            PlayerAction::EndTurn => self.end_turn(player_id),
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            phase: self.current_phase,
            round: self.current_round,
            turn: self.current_turn,
            step: self.step,
            current_player_id: self.current_player_id().cloned(),
            turn_order: self.turn_order.clone(),
            players: self.players.clone(),
            map: self.map.clone(),
            resource_market: self.market.clone(),
            power_plant_market: PlantMarketView {
                current: self.power_plants.current.clone(),
                future: self.power_plants.future.clone(),
                deck_size: self.power_plants.draw_pile_len(),
                step_three: self.power_plants.step_three,
            },
            auction: self.auction.clone(),
            winner: self.winner.clone(),
            max_players: self.max_players,
            version: self.version,
        }
    }
}
