use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{Game, GameSnapshot};
use crate::actions::{GameEvent, GameId, PlayerAction};
use crate::analytics::{AnalyticsHook, NoopAnalytics};
use crate::config::GameRules;
use crate::enums::GameStatus;
use crate::errors::{NotFoundError, PowerGridResult};
use crate::map::MapLoader;

/// A game behind its own lock. Actions on different games never contend.
pub type SharedGame = Arc<Mutex<Game>>;

/// What a committed mutation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub events: Vec<GameEvent>,
    pub snapshot: GameSnapshot,
}

/// A committed mutation. The game stays locked until this is dropped, so
/// the holder can fan the outcome out before any later mutation of the same
/// game commits.
#[derive(Debug)]
pub struct Committed {
    pub outcome: ActionOutcome,
    _game: OwnedMutexGuard<Game>,
}

impl Committed {
    /// Release the game, keeping the outcome
    pub fn into_outcome(self) -> ActionOutcome {
        self.outcome
    }
}

/// Lobby listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    pub name: String,
    pub map: String,
    pub status: GameStatus,
    pub players: usize,
    pub max_players: usize,
    pub created_at: DateTime<Utc>,
}

impl GameSummary {
    fn of(game: &Game) -> Self {
        Self {
            id: game.id.clone(),
            name: game.name.clone(),
            map: game.map.name.clone(),
            status: game.status,
            players: game.players.len(),
            max_players: game.max_players,
            created_at: game.created_at,
        }
    }
}

/// Registry of running games. The registry lock is only held to look a game
/// up; all game work happens under that game's own mutex.
#[derive(Clone)]
pub struct GameManager {
    games: Arc<RwLock<HashMap<GameId, SharedGame>>>,
    maps: Arc<dyn MapLoader>,
    rules: GameRules,
    analytics: Arc<dyn AnalyticsHook>,
}

impl GameManager {
    pub fn new(maps: Arc<dyn MapLoader>, rules: GameRules) -> Self {
        Self {
            games: Arc::new(RwLock::new(HashMap::new())),
            maps,
            rules,
            analytics: Arc::new(NoopAnalytics),
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsHook>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn map_names(&self) -> Vec<String> {
        self.maps.names()
    }

    pub async fn create_game(
        &self,
        name: &str,
        map_name: &str,
        max_players: usize,
    ) -> PowerGridResult<GameSummary> {
        let map = self.maps.load(map_name)?;
        let game_id = Uuid::new_v4().to_string();
        let game = Game::new(
            game_id.clone(),
            name.to_string(),
            map,
            max_players,
            self.rules.clone(),
        )?;
        let summary = GameSummary::of(&game);

        let mut games = self.games.write().await;
        games.insert(game_id.clone(), Arc::new(Mutex::new(game)));
        info!("🎲 Created game {} '{}' on {}", game_id, name, map_name);
        Ok(summary)
    }

    pub async fn get_game(&self, game_id: &str) -> PowerGridResult<SharedGame> {
        let games = self.games.read().await;
        games
            .get(game_id)
            .cloned()
            .ok_or_else(|| NotFoundError::game(game_id).into())
    }

    pub async fn game_exists(&self, game_id: &str) -> bool {
        self.games.read().await.contains_key(game_id)
    }

    pub async fn snapshot(&self, game_id: &str) -> PowerGridResult<GameSnapshot> {
        let game = self.get_game(game_id).await?;
        let game = game.lock().await;
        Ok(game.snapshot())
    }

    pub async fn list_games(&self) -> Vec<GameSummary> {
        let handles: Vec<SharedGame> = self.games.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(GameSummary::of(&*handle.lock().await));
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn remove_game(&self, game_id: &str) -> PowerGridResult<()> {
        let mut games = self.games.write().await;
        games
            .remove(game_id)
            .map(|_| info!("🗑️ Removed game {}", game_id))
            .ok_or_else(|| NotFoundError::game(game_id).into())
    }

    /// Run `f` against the locked game, bump its version and snapshot the
    /// result. The lock travels with the returned [`Committed`].
    async fn commit<F>(&self, game_id: &str, f: F) -> PowerGridResult<Committed>
    where
        F: FnOnce(&mut Game) -> PowerGridResult<Vec<GameEvent>>,
    {
        let handle = self.get_game(game_id).await?;
        let mut game = handle.lock_owned().await;
        let events = f(&mut *game)?;
        game.version += 1;
        let outcome = ActionOutcome {
            events,
            snapshot: game.snapshot(),
        };
        self.notify(game_id, &outcome);
        Ok(Committed {
            outcome,
            _game: game,
        })
    }

    pub async fn join_game(
        &self,
        game_id: &str,
        player_id: &str,
        player_name: &str,
        color: Option<&str>,
    ) -> PowerGridResult<Committed> {
        self.commit(game_id, |game| {
            game.add_player(player_id, player_name, color).map(|e| vec![e])
        })
        .await
    }

    pub async fn leave_game(&self, game_id: &str, player_id: &str) -> PowerGridResult<Committed> {
        self.commit(game_id, |game| game.remove_player(player_id).map(|e| vec![e]))
            .await
    }

    /// Only a seated player may start the game
    pub async fn start_game(&self, game_id: &str, player_id: &str) -> PowerGridResult<Committed> {
        self.commit(game_id, |game| {
            game.player(player_id)?;
            game.start()
        })
        .await
    }

    pub async fn process_action(
        &self,
        game_id: &str,
        player_id: &str,
        action: PlayerAction,
    ) -> PowerGridResult<Committed> {
        let name = action.name();
        let result = self
            .commit(game_id, |game| game.process_action(player_id, action))
            .await;
        if let Err(e) = &result {
            warn!("❌ {} rejected for {} in {}: {}", name, player_id, game_id, e);
        }
        result
    }

    pub async fn set_connected(
        &self,
        game_id: &str,
        player_id: &str,
        connected: bool,
    ) -> PowerGridResult<Committed> {
        self.commit(game_id, |game| {
            game.set_connected(player_id, connected)?;
            Ok(Vec::new())
        })
        .await
    }

    /// Whether `player_id` holds a seat in `game_id`
    pub async fn is_seated(&self, game_id: &str, player_id: &str) -> PowerGridResult<bool> {
        let handle = self.get_game(game_id).await?;
        let game = handle.lock().await;
        Ok(game.players.contains_key(player_id))
    }

    pub async fn status(&self, game_id: &str) -> PowerGridResult<GameStatus> {
        let handle = self.get_game(game_id).await?;
        let game = handle.lock().await;
        Ok(game.status)
    }

    /// Fire-and-forget analytics on a task of its own
    fn notify(&self, game_id: &str, outcome: &ActionOutcome) {
        let started = outcome
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::GameStarted { .. }));
        let ended = outcome
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::GameEnded { .. }));
        let data = serde_json::to_value(&outcome.snapshot).unwrap_or_default();
        let hook = self.analytics.clone();
        let game_id = game_id.to_string();

        tokio::spawn(async move {
            if started {
                hook.on_game_start(&game_id, data.clone()).await;
            }
            hook.on_state_update(&game_id, data.clone()).await;
            if ended {
                hook.on_game_end(&game_id, data).await;
            }
        });
    }
}
