//! Session layer driven over in-memory transports: routing, broadcast,
//! backpressure, reconnection and the inactivity sweep.

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use powergrid::game::GameSnapshot;
use powergrid::protocol::{ConnectedPayload, ErrorPayload, GameCreatedPayload};
use powergrid::{
    Frame, GameManager, GameRules, GameStatus, MapRegistry, Message, MessageType, SessionConfig,
    SessionManager,
};

struct Client {
    session_id: String,
    player_id: String,
    inbound: UnboundedSender<Result<Frame, String>>,
    outbound: UnboundedReceiver<Frame>,
    task: JoinHandle<()>,
}

impl Client {
    async fn connect(sessions: &SessionManager, resume: Option<&str>) -> Client {
        let (session, reconnected) = sessions.connect(resume).await;
        let (inbound, stream) = unbounded();
        let (sink, outbound) = unbounded();
        let task = {
            let sessions = sessions.clone();
            let session = session.clone();
            tokio::spawn(async move { sessions.serve(session, stream, sink, reconnected).await })
        };
        let mut client = Client {
            session_id: session.id.clone(),
            player_id: session.player_id.clone(),
            inbound,
            outbound,
            task,
        };
        client.expect(MessageType::Connected).await;
        client
    }

    fn send(&self, message: Value) {
        self.inbound
            .unbounded_send(Ok(Frame::Text(message.to_string())))
            .unwrap();
    }

    fn send_raw(&self, text: &str) {
        self.send_frame(Frame::Text(text.into()));
    }

    fn send_frame(&self, frame: Frame) {
        self.inbound.unbounded_send(Ok(frame)).unwrap();
    }

    async fn recv(&mut self) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.outbound.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("transport closed");
            if let Frame::Text(text) = frame {
                return Message::decode(&text).unwrap();
            }
        }
    }

    /// Skip ahead to the next message of `kind`
    async fn expect(&mut self, kind: MessageType) -> Message {
        loop {
            let message = self.recv().await;
            if message.kind == kind {
                return message;
            }
        }
    }

    /// Everything received up to and including the next GAME_LIST
    async fn until_game_list(&mut self) -> Vec<Message> {
        let mut seen = Vec::new();
        loop {
            let message = self.recv().await;
            let done = message.kind == MessageType::GameList;
            seen.push(message);
            if done {
                return seen;
            }
        }
    }

    /// Close the transport and wait for the server side to notice
    async fn disconnect(self) {
        self.inbound.close_channel();
        self.task.await.unwrap();
    }
}

fn sessions(config: SessionConfig) -> SessionManager {
    let rules = GameRules {
        seed: Some(17),
        ..GameRules::default()
    };
    let games = GameManager::new(Arc::new(MapRegistry::builtin()), rules);
    SessionManager::new(games, config)
}

async fn create_game(client: &mut Client) -> String {
    client.send(json!({"type": "CREATE_GAME", "payload": {"name": "Friday", "max_players": 4}}));
    let created = client.expect(MessageType::GameCreated).await;
    let payload: GameCreatedPayload = created.payload_as().unwrap();
    assert_eq!(payload.map, "germany");
    payload.game_id
}

async fn join(client: &mut Client, game_id: &str, name: &str) -> GameSnapshot {
    client.send(json!({
        "type": "JOIN_GAME",
        "game_id": game_id,
        "payload": {"player_name": name}
    }));
    client.expect(MessageType::PlayerJoined).await;
    client.expect(MessageType::GameState).await.payload_as().unwrap()
}

#[tokio::test]
async fn routes_actions_and_broadcasts_to_the_room() {
    let sessions = sessions(SessionConfig::default());
    sessions.start().await;

    let mut alice = Client::connect(&sessions, None).await;
    let mut bob = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut alice).await;
    join(&mut alice, &game_id, "Alice").await;
    let state = join(&mut bob, &game_id, "Bob").await;
    assert_eq!(state.players.len(), 2);

    // alice hears about bob too
    let joined = alice.expect(MessageType::PlayerJoined).await;
    assert_eq!(joined.payload.unwrap()["player_id"], bob.player_id.as_str());

    alice.send(json!({"type": "START_GAME", "game_id": game_id}));
    let phase = bob.expect(MessageType::PhaseChange).await;
    assert_eq!(phase.payload.unwrap()["phase"], "PLAYER_ORDER");
    alice.expect(MessageType::PhaseChange).await;
    let state: GameSnapshot = alice.expect(MessageType::GameState).await.payload_as().unwrap();
    assert_eq!(state.status, GameStatus::Playing);
    bob.expect(MessageType::GameState).await;

    let first = state.turn_order[0].clone();
    let (on_turn, waiting) = if first == alice.player_id {
        (&mut alice, &mut bob)
    } else {
        (&mut bob, &mut alice)
    };

    // the rejection goes to the sender only
    waiting.send(json!({"type": "END_TURN", "game_id": game_id}));
    let error = waiting.expect(MessageType::Error).await;
    let payload: ErrorPayload = error.payload_as().unwrap();
    assert_eq!(payload.code, "NOT_YOUR_TURN");
    assert_eq!(error.game_id.as_deref(), Some(game_id.as_str()));

    on_turn.send(json!({"type": "END_TURN", "game_id": game_id}));
    let next = on_turn.recv().await;
    assert_eq!(next.kind, MessageType::PhaseChange);
    let next = waiting.recv().await;
    assert_eq!(next.kind, MessageType::PhaseChange);
    assert_eq!(next.payload.unwrap()["phase"], "AUCTION");

    sessions.shutdown().await;
}

#[tokio::test]
async fn join_takes_game_id_from_payload() {
    let sessions = sessions(SessionConfig::default());
    sessions.start().await;

    let mut alice = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut alice).await;
    alice.send(json!({
        "type": "JOIN_GAME",
        "payload": {"game_id": game_id, "player_name": "Alice", "color": "green"}
    }));
    let joined = alice.expect(MessageType::PlayerJoined).await;
    assert_eq!(joined.game_id.as_deref(), Some(game_id.as_str()));
    let payload = joined.payload.unwrap();
    assert_eq!(payload["player_name"], "Alice");
    assert_eq!(payload["color"], "green");

    // the name given in CONNECT is used when JOIN_GAME has none
    let mut bob = Client::connect(&sessions, None).await;
    bob.send(json!({"type": "CONNECT", "payload": {"player_name": "Bob"}}));
    bob.expect(MessageType::Connected).await;
    bob.send(json!({"type": "JOIN_GAME", "payload": {"game_id": game_id}}));
    let state: GameSnapshot = bob.expect(MessageType::GameState).await.payload_as().unwrap();
    assert_eq!(state.players[&bob.player_id].name, "Bob");
    assert_eq!(state.players.len(), 2);

    let mut carol = Client::connect(&sessions, None).await;
    carol.send(json!({"type": "JOIN_GAME", "payload": {"game_id": game_id}}));
    let error = carol.expect(MessageType::Error).await;
    assert_eq!(error.game_id.as_deref(), Some(game_id.as_str()));
    let payload: ErrorPayload = error.payload_as().unwrap();
    assert_eq!(payload.code, "INVALID_MESSAGE");
    sessions.shutdown().await;
}

#[tokio::test]
async fn create_game_rejects_oversized_table() {
    let sessions = sessions(SessionConfig::default());
    sessions.start().await;
    let mut client = Client::connect(&sessions, None).await;
    client.send(json!({"type": "CREATE_GAME", "payload": {"name": "Huge", "max_players": 10}}));
    let error: ErrorPayload = client.expect(MessageType::Error).await.payload_as().unwrap();
    assert_eq!(error.code, "INVALID_MAX_PLAYERS");
    client.send(json!({"type": "LIST_GAMES"}));
    let list = client.expect(MessageType::GameList).await;
    assert_eq!(list.payload.unwrap()["games"], json!([]));
    sessions.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rooms_see_states_in_commit_order() {
    const ROUNDS: usize = 20;
    let config = SessionConfig {
        workers: 4,
        outbound_queue: 4096,
        ..SessionConfig::default()
    };
    let sessions = sessions(config);
    sessions.start().await;

    let mut host = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut host).await;
    let seated = join(&mut host, &game_id, "Host").await;

    let mut tasks = Vec::new();
    for name in ["Bea", "Cal", "Dee"] {
        let mut client = Client::connect(&sessions, None).await;
        // fire everything without waiting; each client's order must hold
        for _ in 0..ROUNDS {
            client.send(json!({
                "type": "JOIN_GAME",
                "game_id": game_id,
                "payload": {"player_name": name}
            }));
            client.send(json!({"type": "LEAVE_GAME", "game_id": game_id}));
        }
        client.send(json!({"type": "LIST_GAMES"}));
        tasks.push(tokio::spawn(async move { client.until_game_list().await }));
    }

    for task in tasks {
        let seen = task.await.unwrap();
        assert!(seen.iter().all(|m| m.kind != MessageType::Error), "{:?}", seen);
        let versions = state_versions(&seen);
        assert!(versions.windows(2).all(|w| w[0] < w[1]), "{:?}", versions);
    }

    // every commit reached the host, in order
    host.send(json!({"type": "LIST_GAMES"}));
    let versions = state_versions(&host.until_game_list().await);
    let expected: Vec<u64> = (seated.version + 1..=seated.version + (ROUNDS * 6) as u64).collect();
    assert_eq!(versions, expected);

    host.send(json!({"type": "GET_GAME_STATE", "game_id": game_id}));
    let state: GameSnapshot = host.expect(MessageType::GameState).await.payload_as().unwrap();
    assert_eq!(state.players.len(), 1);
    sessions.shutdown().await;
}

fn state_versions(messages: &[Message]) -> Vec<u64> {
    messages
        .iter()
        .filter(|m| m.kind == MessageType::GameState)
        .map(|m| m.payload_as::<GameSnapshot>().unwrap().version)
        .collect()
}

#[tokio::test]
async fn malformed_input_is_answered_not_fatal() {
    let sessions = sessions(SessionConfig::default());
    sessions.start().await;
    let mut client = Client::connect(&sessions, None).await;

    client.send_raw("{definitely not json");
    let error: ErrorPayload = client.expect(MessageType::Error).await.payload_as().unwrap();
    assert_eq!(error.code, "INVALID_MESSAGE");

    client.send(json!({"type": "JOIN_GAME", "payload": {"player_name": "x"}}));
    let error: ErrorPayload = client.expect(MessageType::Error).await.payload_as().unwrap();
    assert_eq!(error.code, "INVALID_MESSAGE");

    client.send(json!({"type": "GET_GAME_STATE", "game_id": "nope"}));
    let error: ErrorPayload = client.expect(MessageType::Error).await.payload_as().unwrap();
    assert_eq!(error.code, "GAME_NOT_FOUND");

    // still alive
    client.send(json!({"type": "LIST_GAMES"}));
    client.expect(MessageType::GameList).await;
    sessions.shutdown().await;
}

#[tokio::test]
async fn full_dispatch_queue_answers_server_busy() {
    let config = SessionConfig {
        dispatch_queue: 1,
        ..SessionConfig::default()
    };
    // workers are never started, so the first message sits in the queue
    let sessions = sessions(config);
    let mut client = Client::connect(&sessions, None).await;

    client.send(json!({"type": "LIST_GAMES"}));
    client.send(json!({"type": "LIST_GAMES"}));
    let error: ErrorPayload = client.expect(MessageType::Error).await.payload_as().unwrap();
    assert_eq!(error.code, "SERVER_BUSY");
}

#[tokio::test]
async fn reconnect_resumes_the_same_seat() {
    let sessions = sessions(SessionConfig::default());
    sessions.start().await;

    let mut alice = Client::connect(&sessions, None).await;
    let mut bob = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut alice).await;
    join(&mut alice, &game_id, "Alice").await;
    join(&mut bob, &game_id, "Bob").await;
    alice.send(json!({"type": "START_GAME", "game_id": game_id}));
    let before: GameSnapshot = bob.expect(MessageType::GameState).await.payload_as().unwrap();
    assert_eq!(before.status, GameStatus::Playing);

    let session_id = alice.session_id.clone();
    let player_id = alice.player_id.clone();
    alice.disconnect().await;

    let dropped: GameSnapshot = bob.expect(MessageType::GameState).await.payload_as().unwrap();
    assert!(!dropped.players[&player_id].connected);

    let (session, resumed) = sessions.connect(Some(&session_id)).await;
    assert!(resumed);
    let (inbound, stream) = unbounded::<Result<Frame, String>>();
    let (sink, mut outbound) = unbounded();
    let task = {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.serve(session, stream, sink, true).await })
    };

    let mut replay = Vec::new();
    while replay.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), outbound.next())
            .await
            .expect("timed out waiting for the replay");
        if let Some(Frame::Text(text)) = frame {
            replay.push(Message::decode(&text).unwrap());
        }
    }
    assert_eq!(replay[0].kind, MessageType::Connected);
    let hello: ConnectedPayload = replay[0].payload_as().unwrap();
    assert_eq!(hello.player_id, player_id);
    assert!(hello.reconnected);

    assert_eq!(replay[1].kind, MessageType::GameState);
    let after: GameSnapshot = replay[1].payload_as().unwrap();
    assert!(after.players[&player_id].connected);
    assert_eq!(after.phase, before.phase);
    assert_eq!(after.turn_order, before.turn_order);
    assert_eq!(after.players[&player_id].money, before.players[&player_id].money);

    inbound.close_channel();
    task.await.unwrap();
    sessions.shutdown().await;
}

#[tokio::test]
async fn keepalives_do_not_hold_off_the_sweep() {
    let config = SessionConfig {
        session_timeout: Duration::from_millis(200),
        sweep_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    };
    let sessions = sessions(config);
    sessions.start().await;

    let client = Client::connect(&sessions, None).await;
    for _ in 0..6 {
        client.send_frame(Frame::Pong(Vec::new()));
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    assert_eq!(sessions.sweep_inactive().await, 1);
    assert_eq!(sessions.session_count().await, 0);
    // the swept session's transport is cancelled
    tokio::time::timeout(Duration::from_secs(5), client.task)
        .await
        .expect("transport still attached")
        .unwrap();
    sessions.shutdown().await;
}

#[tokio::test]
async fn swept_player_resumes_running_seat() {
    let config = SessionConfig {
        session_timeout: Duration::from_millis(200),
        sweep_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    };
    let sessions = sessions(config);
    sessions.start().await;

    let mut alice = Client::connect(&sessions, None).await;
    let mut bob = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut alice).await;
    join(&mut alice, &game_id, "Alice").await;
    join(&mut bob, &game_id, "Bob").await;
    alice.send(json!({"type": "START_GAME", "game_id": game_id}));
    bob.expect(MessageType::GameState).await;
    let (session_id, player_id) = (alice.session_id.clone(), alice.player_id.clone());
    alice.disconnect().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    bob.send(json!({"type": "LIST_GAMES"}));
    bob.expect(MessageType::GameList).await;
    assert_eq!(sessions.sweep_inactive().await, 1);

    let mut again = Client::connect(&sessions, Some(&session_id)).await;
    assert_eq!(again.player_id, player_id);
    let state: GameSnapshot = again.expect(MessageType::GameState).await.payload_as().unwrap();
    assert!(state.players[&player_id].connected);
    assert_eq!(state.status, GameStatus::Playing);
    sessions.shutdown().await;
}

#[tokio::test]
async fn sweeper_frees_lobby_seats_of_idle_sessions() {
    let config = SessionConfig {
        session_timeout: Duration::from_millis(200),
        sweep_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    };
    let sessions = sessions(config);
    sessions.start().await;

    let mut alice = Client::connect(&sessions, None).await;
    let mut bob = Client::connect(&sessions, None).await;
    let game_id = create_game(&mut alice).await;
    join(&mut alice, &game_id, "Alice").await;
    join(&mut bob, &game_id, "Bob").await;
    let alice_id = alice.player_id.clone();
    alice.disconnect().await;
    bob.expect(MessageType::GameState).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    // bob stays active
    bob.send(json!({"type": "LIST_GAMES"}));
    bob.expect(MessageType::GameList).await;

    assert_eq!(sessions.sweep_inactive().await, 1);
    assert_eq!(sessions.session_count().await, 1);

    let left = bob.expect(MessageType::PlayerLeft).await;
    assert_eq!(left.payload.unwrap()["player_id"], alice_id.as_str());
    let state: GameSnapshot = bob.expect(MessageType::GameState).await.payload_as().unwrap();
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.status, GameStatus::Lobby);
    sessions.shutdown().await;
}
