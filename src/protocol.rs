// Wire protocol - JSON envelopes exchanged over the WebSocket
//
// Every frame is one Message: {"type", "timestamp", "session_id"?,
// "game_id"?, "payload"?}. Inbound messages decode into a Command; game
// events map onto outbound broadcast types.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::actions::{GameEvent, GameId, PlayerAction, PlayerId, SessionId};
use crate::enums::{GamePhase, ResourceType};
use crate::errors::{GameError, NetworkError, PowerGridError, PowerGridResult};
use crate::game::{GameSnapshot, GameSummary};
use crate::map::DEFAULT_MAP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // client -> server
    Connect,
    CreateGame,
    JoinGame,
    LeaveGame,
    StartGame,
    ListGames,
    GetGameState,
    StartAuction,
    BidPlant,
    PassBid,
    BuyResources,
    BuildCity,
    PowerCities,
    EndTurn,
    // server -> client
    Connected,
    GameCreated,
    GameList,
    GameState,
    PlayerJoined,
    PlayerLeft,
    PhaseChange,
    TurnChange,
    AuctionWon,
    GameOver,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            timestamp: Utc::now().timestamp_millis(),
            session_id: None,
            game_id: None,
            payload: None,
        }
    }

    pub fn with_game(mut self, game_id: impl Into<GameId>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).ok();
        self
    }

    pub fn decode(text: &str) -> PowerGridResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> PowerGridResult<String> {
        serde_json::to_string(self).map_err(|e| {
            NetworkError::SerializationFailed {
                details: e.to_string(),
            }
            .into()
        })
    }

    /// Typed view of the payload; a missing payload reads as `{}`
    pub fn payload_as<T: DeserializeOwned>(&self) -> PowerGridResult<T> {
        let value = self
            .payload
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        serde_json::from_value(value).map_err(|e| {
            GameError::invalid_message(format!("bad {:?} payload: {}", self.kind, e)).into()
        })
    }

    pub fn error(err: &PowerGridError) -> Self {
        Message::new(MessageType::Error).with_payload(&ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        })
    }

    pub fn game_state(snapshot: &GameSnapshot) -> Self {
        Message::new(MessageType::GameState)
            .with_game(snapshot.id.clone())
            .with_payload(snapshot)
    }

    /// Broadcast form of a game event. Events without a wire counterpart
    /// are covered by the GAME_STATE that follows them.
    pub fn from_event(game_id: &str, event: &GameEvent) -> Option<Self> {
        let message = match event {
            GameEvent::PlayerJoined {
                player_id,
                player_name,
                color,
            } => Message::new(MessageType::PlayerJoined).with_payload(&PlayerJoinedPayload {
                player_id: player_id.clone(),
                player_name: player_name.clone(),
                color: color.clone(),
            }),
            GameEvent::PlayerLeft { player_id } => {
                Message::new(MessageType::PlayerLeft).with_payload(&PlayerLeftPayload {
                    player_id: player_id.clone(),
                })
            }
            GameEvent::PhaseChanged { phase, round } => Message::new(MessageType::PhaseChange)
                .with_payload(&PhaseChangePayload {
                    phase: *phase,
                    round: *round,
                }),
            GameEvent::TurnChanged {
                current_player_id,
                turn,
            } => Message::new(MessageType::TurnChange).with_payload(&TurnChangePayload {
                current_player_id: current_player_id.clone(),
                turn: *turn,
            }),
            GameEvent::AuctionWon {
                player_id,
                plant_id,
                price,
                ..
            } => Message::new(MessageType::AuctionWon).with_payload(&AuctionWonPayload {
                player_id: player_id.clone(),
                plant_id: *plant_id,
                price: *price,
            }),
            GameEvent::GameEnded { winner_id } => {
                Message::new(MessageType::GameOver).with_payload(&GameOverPayload {
                    winner_id: winner_id.clone(),
                })
            }
            _ => return None,
        };
        Some(message.with_game(game_id))
    }
}

// Inbound payloads

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectPayload {
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGamePayload {
    pub name: String,
    #[serde(default = "default_map")]
    pub map: String,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
}

fn default_map() -> String {
    DEFAULT_MAP.to_string()
}

fn default_max_players() -> usize {
    6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinGamePayload {
    /// Used when the envelope carries no game_id
    #[serde(default)]
    pub game_id: Option<GameId>,
    /// Falls back to the name given in CONNECT
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAuctionPayload {
    pub plant_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidPlantPayload {
    pub plant_id: u32,
    pub bid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyResourcesPayload {
    pub resources: HashMap<ResourceType, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCityPayload {
    pub city_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerCitiesPayload {
    pub power_plants: Vec<u32>,
}

// Outbound payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub reconnected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCreatedPayload {
    pub game_id: GameId,
    pub name: String,
    pub map: String,
    pub max_players: usize,
}

impl From<&GameSummary> for GameCreatedPayload {
    fn from(summary: &GameSummary) -> Self {
        Self {
            game_id: summary.id.clone(),
            name: summary.name.clone(),
            map: summary.map.clone(),
            max_players: summary.max_players,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameListPayload {
    pub games: Vec<GameSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinedPayload {
    pub player_id: PlayerId,
    pub player_name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeftPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChangePayload {
    pub phase: GamePhase,
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnChangePayload {
    pub current_player_id: PlayerId,
    pub turn: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionWonPayload {
    pub player_id: PlayerId,
    pub plant_id: u32,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub winner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(ConnectPayload),
    CreateGame(CreateGamePayload),
    JoinGame(JoinGamePayload),
    LeaveGame,
    StartGame,
    ListGames,
    GetGameState,
    Action(PlayerAction),
}

impl Command {
    pub fn from_message(message: &Message) -> PowerGridResult<Self> {
        let command = match message.kind {
            MessageType::Connect => Command::Connect(message.payload_as()?),
            MessageType::CreateGame => Command::CreateGame(message.payload_as()?),
            MessageType::JoinGame => Command::JoinGame(message.payload_as()?),
            MessageType::LeaveGame => Command::LeaveGame,
            MessageType::StartGame => Command::StartGame,
            MessageType::ListGames => Command::ListGames,
            MessageType::GetGameState => Command::GetGameState,
            MessageType::StartAuction => {
                let p: StartAuctionPayload = message.payload_as()?;
                Command::Action(PlayerAction::StartAuction {
                    plant_id: p.plant_id,
                })
            }
            MessageType::BidPlant => {
                let p: BidPlantPayload = message.payload_as()?;
                Command::Action(PlayerAction::BidPlant {
                    plant_id: p.plant_id,
                    bid: p.bid,
                })
            }
            MessageType::PassBid => Command::Action(PlayerAction::PassBid),
            MessageType::BuyResources => {
                let p: BuyResourcesPayload = message.payload_as()?;
                Command::Action(PlayerAction::BuyResources {
                    resources: p.resources,
                })
            }
            MessageType::BuildCity => {
                let p: BuildCityPayload = message.payload_as()?;
                Command::Action(PlayerAction::BuildCity { city_id: p.city_id })
            }
            MessageType::PowerCities => {
                let p: PowerCitiesPayload = message.payload_as()?;
                Command::Action(PlayerAction::PowerCities {
                    power_plants: p.power_plants,
                })
            }
            MessageType::EndTurn => Command::Action(PlayerAction::EndTurn),
            kind => {
                return Err(GameError::invalid_message(format!(
                    "{:?} is not accepted from clients",
                    kind
                ))
                .into())
            }
        };
        Ok(command)
    }

    /// The game a command addresses: the envelope's game_id first, then one
    /// carried in a JOIN_GAME payload
    pub fn game_id(&self, message: &Message) -> Option<GameId> {
        message.game_id.clone().or_else(|| match self {
            Command::JoinGame(payload) => payload.game_id.clone(),
            _ => None,
        })
    }

    /// Whether the command needs a game_id
    pub fn needs_game(&self) -> bool {
        matches!(
            self,
            Command::JoinGame(_)
                | Command::LeaveGame
                | Command::StartGame
                | Command::GetGameState
                | Command::Action(_)
        )
    }
}
