use futures::{Sink, Stream};
use log::{debug, error, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{read_pump, router, write_pump, Frame, Session};
use crate::actions::{GameId, PlayerId, SessionId};
use crate::config::SessionConfig;
use crate::enums::GameStatus;
use crate::errors::{NotFoundError, PowerGridError, PowerGridResult};
use crate::game::{ActionOutcome, GameManager};
use crate::protocol::{ConnectedPayload, Message, MessageType};

/// One inbound message waiting for a worker
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub session_id: SessionId,
    pub message: Message,
}

/// What is left of a swept session that held a seat in a running game
#[derive(Debug, Clone)]
struct Retired {
    player_id: PlayerId,
    player_name: Option<String>,
    rooms: Vec<GameId>,
}

/// Session registry, dispatcher and room broadcaster.
///
/// Each worker drains its own bounded queue and a session always lands on
/// the same one, so a client's messages are handled in the order it sent
/// them. Sessions only know games by ID; all game state lives in the
/// [`GameManager`].
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    retired: Arc<RwLock<HashMap<SessionId, Retired>>>,
    games: GameManager,
    config: SessionConfig,
    dispatch_tx: Vec<mpsc::Sender<Dispatch>>,
    dispatch_rx: Vec<Arc<Mutex<mpsc::Receiver<Dispatch>>>>,
    shutdown: broadcast::Sender<()>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SessionManager {
    pub fn new(games: GameManager, config: SessionConfig) -> Self {
        let (dispatch_tx, dispatch_rx): (Vec<_>, Vec<_>) = (0..config.workers.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(config.dispatch_queue.max(1));
                (tx, Arc::new(Mutex::new(rx)))
            })
            .unzip();
        let (shutdown, _) = broadcast::channel(1);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            retired: Arc::new(RwLock::new(HashMap::new())),
            games,
            config,
            dispatch_tx,
            dispatch_rx,
            shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn games(&self) -> &GameManager {
        &self.games
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the worker pool and the inactivity sweeper
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        for (worker, queue) in self.dispatch_rx.iter().enumerate() {
            tasks.push(tokio::spawn(self.clone().run_worker(worker, queue.clone())));
        }
        tasks.push(tokio::spawn(self.clone().run_sweeper()));
        info!(
            "🚀 Session manager started with {} workers",
            self.dispatch_rx.len()
        );
    }

    /// Stop workers and sweeper, and cancel every attached transport
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Session task failed during shutdown: {}", e);
            }
        }
        for session in self.sessions.read().await.values() {
            session.close();
        }
        info!("🛑 Session manager stopped");
    }

    async fn run_worker(self, worker: usize, queue: Arc<Mutex<mpsc::Receiver<Dispatch>>>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut queue = queue.lock().await;
        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => None,
                next = queue.recv() => next,
            };
            match next {
                Some(dispatch) => router::process_game_message(&self, dispatch).await,
                None => break,
            }
        }
        debug!("Worker {} exiting", worker);
    }

    async fn run_sweeper(self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    self.sweep_inactive().await;
                }
            }
        }
    }

    /// Look up a session to resume, or open a fresh one. The flag tells
    /// whether an existing session was found. A session swept while seated
    /// in a running game comes back with its player and rooms.
    pub async fn connect(&self, session_id: Option<&str>) -> (Arc<Session>, bool) {
        if let Some(id) = session_id {
            if let Some(session) = self.sessions.read().await.get(id) {
                info!("🔁 Session {} reconnecting", id);
                return (session.clone(), true);
            }
            let retired = self.retired.write().await.remove(id);
            if let Some(retired) = retired {
                let session = Arc::new(Session::new(
                    id.to_string(),
                    retired.player_id,
                    self.config.outbound_queue,
                ));
                if let Some(name) = &retired.player_name {
                    session.set_player_name(name).await;
                }
                for game_id in &retired.rooms {
                    session.join_room(game_id).await;
                }
                self.sessions
                    .write()
                    .await
                    .insert(session.id.clone(), session.clone());
                info!("♻️ Session {} restored for player {}", id, session.player_id);
                return (session, true);
            }
            debug!("Unknown session {}, opening a new one", id);
        }

        let session = Arc::new(Session::new(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            self.config.outbound_queue,
        ));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        info!("🔌 Session {} opened for player {}", session.id, session.player_id);
        (session, false)
    }

    pub async fn get_session(&self, session_id: &str) -> PowerGridResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                NotFoundError::Session {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(session) = &removed {
            session.close();
            info!("➖ Session {} removed", session_id);
        }
        removed
    }

    /// Run a transport for `session` until it closes or is replaced
    pub async fn serve<S, K, E>(&self, session: Arc<Session>, stream: S, sink: K, reconnected: bool)
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        K: Sink<Frame> + Unpin + Send + 'static,
        K::Error: std::fmt::Display,
    {
        let generation = session.attach().await;
        let mut cancelled = session.cancelled();
        if reconnected {
            let dropped = session.drain_pending().await;
            if dropped > 0 {
                debug!("Dropped {} stale messages for {}", dropped, session.id);
            }
        }

        let hello = Message::new(MessageType::Connected)
            .with_session(session.id.clone())
            .with_payload(&ConnectedPayload {
                session_id: session.id.clone(),
                player_id: session.player_id.clone(),
                reconnected,
            });
        let _ = session.send(hello);
        if reconnected {
            self.mark_connected(&session, true).await;
        }

        let mut reader = {
            let manager = self.clone();
            let session = session.clone();
            let pong_timeout = self.config.pong_timeout;
            tokio::spawn(async move {
                let session_id = session.id.clone();
                let result = read_pump(&session, stream, pong_timeout, |text| {
                    let manager = manager.clone();
                    let session_id = session_id.clone();
                    async move {
                        let _ = manager.submit_text(&session_id, &text).await;
                    }
                })
                .await;
                if let Err(e) = result {
                    warn!("⏱️ Session {} reader stopped: {}", session_id, e);
                }
            })
        };
        let mut writer = {
            let session = session.clone();
            let ping_interval = self.config.ping_interval;
            tokio::spawn(async move { write_pump(&session, sink, ping_interval).await })
        };

        tokio::select! {
            _ = &mut reader => writer.abort(),
            _ = &mut writer => reader.abort(),
            _ = cancelled.recv() => {
                reader.abort();
                writer.abort();
            }
        }

        if session.detach(generation).await {
            info!("🔌 Session {} disconnected", session.id);
            self.mark_connected(&session, false).await;
        }
    }

    /// Flag the session's player in each of its games and tell the rooms
    async fn mark_connected(&self, session: &Session, connected: bool) {
        for game_id in session.rooms().await {
            match self
                .games
                .set_connected(&game_id, &session.player_id, connected)
                .await
            {
                Ok(committed) => self.publish(&game_id, &committed.outcome).await,
                Err(e) => debug!("Could not update {} in {}: {}", session.player_id, game_id, e),
            }
        }
    }

    /// Queue a decoded message for the workers. A full queue answers
    /// SERVER_BUSY to the sender straight away.
    pub async fn submit(&self, session_id: &str, mut message: Message) -> PowerGridResult<()> {
        message.session_id = Some(session_id.to_string());
        let dispatch = Dispatch {
            session_id: session_id.to_string(),
            message,
        };
        match self.dispatch_tx[self.shard(session_id)].try_send(dispatch) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dispatch)) => {
                warn!("🚦 Dispatch queue full, rejecting {:?}", dispatch.message.kind);
                let err = PowerGridError::ServerBusy;
                self.reply(session_id, Message::error(&err)).await;
                Err(err)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PowerGridError::Internal("dispatcher is shut down".into()))
            }
        }
    }

    fn shard(&self, session_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        (hasher.finish() % self.dispatch_tx.len() as u64) as usize
    }

    /// Decode a text frame and submit it; malformed input is answered with
    /// an ERROR to the sender only
    pub async fn submit_text(&self, session_id: &str, text: &str) -> PowerGridResult<()> {
        match Message::decode(text) {
            Ok(message) => self.submit(session_id, message).await,
            Err(e) => {
                debug!("Undecodable frame from {}: {}", session_id, e);
                self.reply(session_id, Message::error(&e)).await;
                Err(e)
            }
        }
    }

    /// Send to a single session
    pub async fn reply(&self, session_id: &str, message: Message) {
        match self.get_session(session_id).await {
            Ok(session) => {
                if let Err(e) = session.send(message) {
                    warn!("📭 {}", e);
                }
            }
            Err(e) => debug!("Reply dropped: {}", e),
        }
    }

    /// Send to every attached session in the room of `game_id`. A slow
    /// client only loses its own messages.
    pub async fn broadcast(&self, game_id: &str, message: Message) {
        let members: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };
        for session in members {
            if !session.in_room(game_id).await || !session.is_connected().await {
                continue;
            }
            if let Err(e) = session.send(message.clone()) {
                warn!("📭 {}", e);
            }
        }
    }

    /// Broadcast what a committed mutation produced: the mapped events,
    /// then the new GAME_STATE. Callers hold the
    /// [`Committed`](crate::game::Committed) while this runs, so rooms see
    /// outcomes in commit order.
    pub async fn publish(&self, game_id: &str, outcome: &ActionOutcome) {
        for event in &outcome.events {
            if let Some(message) = Message::from_event(game_id, event) {
                self.broadcast(game_id, message).await;
            }
        }
        self.broadcast(game_id, Message::game_state(&outcome.snapshot))
            .await;
    }

    /// Drop sessions idle for longer than the session timeout. Their lobby
    /// seats are given up; seats in running games are kept but flagged, and
    /// the session can still be resumed by its ID.
    pub async fn sweep_inactive(&self) -> usize {
        let timeout = self.config.session_timeout;
        let candidates: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut expired = Vec::new();
        for session in candidates {
            if session.idle_for().await >= timeout {
                expired.push(session);
            }
        }

        for session in &expired {
            self.remove_session(&session.id).await;
            let mut seated = Vec::new();
            for game_id in session.rooms().await {
                session.leave_room(&game_id).await;
                let result = match self.games.status(&game_id).await {
                    Ok(GameStatus::Lobby) => self
                        .games
                        .leave_game(&game_id, &session.player_id)
                        .await
                        .map(Some),
                    Ok(GameStatus::Playing) => {
                        seated.push(game_id.clone());
                        self.games
                            .set_connected(&game_id, &session.player_id, false)
                            .await
                            .map(Some)
                    }
                    Ok(GameStatus::Finished) | Err(_) => Ok(None),
                };
                match result {
                    Ok(Some(committed)) => self.publish(&game_id, &committed.outcome).await,
                    Ok(None) => {}
                    Err(e) => debug!("Sweep of {} in {} failed: {}", session.id, game_id, e),
                }
            }
            if !seated.is_empty() {
                let retired = Retired {
                    player_id: session.player_id.clone(),
                    player_name: session.player_name().await,
                    rooms: seated,
                };
                self.retired.write().await.insert(session.id.clone(), retired);
            }
        }
        self.prune_retired().await;
        if !expired.is_empty() {
            info!("🧹 Swept {} inactive sessions", expired.len());
        }
        expired.len()
    }

    /// Forget retired sessions whose games are all over or gone
    async fn prune_retired(&self) {
        let retired: Vec<(SessionId, Vec<GameId>)> = self
            .retired
            .read()
            .await
            .iter()
            .map(|(id, r)| (id.clone(), r.rooms.clone()))
            .collect();
        for (session_id, rooms) in retired {
            let mut running = false;
            for game_id in &rooms {
                if matches!(self.games.status(game_id).await, Ok(GameStatus::Playing)) {
                    running = true;
                    break;
                }
            }
            if !running {
                self.retired.write().await.remove(&session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameRules;
    use crate::map::MapRegistry;

    fn manager(config: SessionConfig) -> SessionManager {
        let games = GameManager::new(Arc::new(MapRegistry::builtin()), GameRules::default());
        SessionManager::new(games, config)
    }

    #[tokio::test]
    async fn test_connect_and_resume() {
        let sessions = manager(SessionConfig::default());
        let (first, resumed) = sessions.connect(None).await;
        assert!(!resumed);

        let (again, resumed) = sessions.connect(Some(&first.id)).await;
        assert!(resumed);
        assert_eq!(again.player_id, first.player_id);

        let (other, resumed) = sessions.connect(Some("unknown")).await;
        assert!(!resumed);
        assert_ne!(other.id, first.id);
        assert_eq!(sessions.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_full_dispatch_queue_answers_busy() {
        let config = SessionConfig {
            dispatch_queue: 1,
            ..SessionConfig::default()
        };
        // no workers started, so the queue stays full
        let sessions = manager(config);
        let (session, _) = sessions.connect(None).await;

        sessions
            .submit(&session.id, Message::new(MessageType::ListGames))
            .await
            .unwrap();
        let err = sessions
            .submit(&session.id, Message::new(MessageType::ListGames))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVER_BUSY");
        assert_eq!(session.drain_pending().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_skips_other_rooms_and_detached() {
        let sessions = manager(SessionConfig::default());
        let (a, _) = sessions.connect(None).await;
        let (b, _) = sessions.connect(None).await;
        let (c, _) = sessions.connect(None).await;
        for s in [&a, &b, &c] {
            s.attach().await;
        }
        a.join_room("g1").await;
        b.join_room("g2").await;
        c.join_room("g1").await;
        let generation = c.attach().await;
        c.detach(generation).await;

        sessions
            .broadcast("g1", Message::new(MessageType::GameState))
            .await;
        assert_eq!(a.drain_pending().await, 1);
        assert_eq!(b.drain_pending().await, 0);
        assert_eq!(c.drain_pending().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_sessions() {
        let config = SessionConfig {
            session_timeout: std::time::Duration::ZERO,
            ..SessionConfig::default()
        };
        let sessions = manager(config);
        sessions.connect(None).await;
        sessions.connect(None).await;
        assert_eq!(sessions.sweep_inactive().await, 2);
        assert_eq!(sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_swept_player_in_running_game_can_resume() {
        let config = SessionConfig {
            session_timeout: std::time::Duration::ZERO,
            ..SessionConfig::default()
        };
        let sessions = manager(config);
        let games = sessions.games().clone();
        let running = games.create_game("running", "germany", 4).await.unwrap().id;
        let lobby = games.create_game("lobby", "germany", 4).await.unwrap().id;

        let (a, _) = sessions.connect(None).await;
        let (b, _) = sessions.connect(None).await;
        let (c, _) = sessions.connect(None).await;
        for s in [&a, &b] {
            games.join_game(&running, &s.player_id, &s.player_id, None).await.unwrap();
            s.join_room(&running).await;
        }
        a.set_player_name("Ada").await;
        games.join_game(&lobby, &c.player_id, "Cy", None).await.unwrap();
        c.join_room(&lobby).await;
        games.start_game(&running, &a.player_id).await.unwrap();

        assert_eq!(sessions.sweep_inactive().await, 3);
        let snapshot = games.snapshot(&running).await.unwrap();
        assert!(!snapshot.players[&a.player_id].connected);
        assert!(games.snapshot(&lobby).await.unwrap().players.is_empty());

        let (back, resumed) = sessions.connect(Some(&a.id)).await;
        assert!(resumed);
        assert_eq!(back.player_id, a.player_id);
        assert_eq!(back.player_name().await.as_deref(), Some("Ada"));
        assert_eq!(back.rooms().await, vec![running.clone()]);

        // lobby seats are gone for good
        let (fresh, resumed) = sessions.connect(Some(&c.id)).await;
        assert!(!resumed);
        assert_ne!(fresh.player_id, c.player_id);
    }

    #[tokio::test]
    async fn test_retired_sessions_pruned_with_their_game() {
        let config = SessionConfig {
            session_timeout: std::time::Duration::ZERO,
            ..SessionConfig::default()
        };
        let sessions = manager(config);
        let games = sessions.games().clone();
        let id = games.create_game("g", "germany", 4).await.unwrap().id;
        let (a, _) = sessions.connect(None).await;
        let (b, _) = sessions.connect(None).await;
        for s in [&a, &b] {
            games.join_game(&id, &s.player_id, &s.player_id, None).await.unwrap();
            s.join_room(&id).await;
        }
        games.start_game(&id, &a.player_id).await.unwrap();
        sessions.sweep_inactive().await;
        assert_eq!(sessions.retired.read().await.len(), 2);

        games.remove_game(&id).await.unwrap();
        sessions.sweep_inactive().await;
        assert!(sessions.retired.read().await.is_empty());
        assert!(!sessions.connect(Some(&a.id)).await.1);
    }

    #[test]
    fn test_session_always_lands_on_one_shard() {
        let config = SessionConfig {
            workers: 8,
            ..SessionConfig::default()
        };
        let games = GameManager::new(Arc::new(MapRegistry::builtin()), GameRules::default());
        let sessions = SessionManager::new(games, config);
        assert_eq!(sessions.dispatch_tx.len(), 8);
        let first = sessions.shard("session-1");
        for _ in 0..10 {
            assert_eq!(sessions.shard("session-1"), first);
        }
        let spread: std::collections::HashSet<usize> =
            (0..64).map(|i| sessions.shard(&format!("s{}", i))).collect();
        assert!(spread.len() > 1);
    }
}
