// Sessions: one per client, outliving any single transport
//
// A Session owns a bounded outbound queue. Transports come and go: each one
// gets a read pump and a write pump, and attaching a new transport cancels
// the pumps of the previous one.

mod manager;
pub mod router;

pub use manager::{Dispatch, SessionManager};

use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, warn};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::Instant;

use crate::actions::{GameId, PlayerId, SessionId};
use crate::errors::{NetworkError, PowerGridResult};
use crate::protocol::Message;

/// Transport-neutral WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug)]
struct SessionState {
    player_name: Option<String>,
    rooms: HashSet<GameId>,
    last_activity: Instant,
    connected: bool,
    generation: u64,
}

pub struct Session {
    pub id: SessionId,
    pub player_id: PlayerId,
    state: RwLock<SessionState>,
    outbound: mpsc::Sender<Message>,
    outbox: Mutex<mpsc::Receiver<Message>>,
    cancel: broadcast::Sender<()>,
}

impl Session {
    pub fn new(id: SessionId, player_id: PlayerId, queue: usize) -> Self {
        let (outbound, outbox) = mpsc::channel(queue.max(1));
        let (cancel, _) = broadcast::channel(1);
        Self {
            id,
            player_id,
            state: RwLock::new(SessionState {
                player_name: None,
                rooms: HashSet::new(),
                last_activity: Instant::now(),
                connected: false,
                generation: 0,
            }),
            outbound,
            outbox: Mutex::new(outbox),
            cancel,
        }
    }

    /// Queue a message without waiting. A full queue is reported, never
    /// waited on.
    pub fn send(&self, message: Message) -> PowerGridResult<()> {
        self.outbound.try_send(message).map_err(|e| {
            let session_id = self.id.clone();
            match e {
                mpsc::error::TrySendError::Full(_) => NetworkError::QueueFull { session_id },
                mpsc::error::TrySendError::Closed(_) => NetworkError::SessionClosed { session_id },
            }
            .into()
        })
    }

    /// Bind a new transport. Pumps of the previous one are told to stop.
    /// Returns the generation the new transport runs under.
    pub async fn attach(&self) -> u64 {
        let _ = self.cancel.send(());
        let mut state = self.state.write().await;
        state.generation += 1;
        state.connected = true;
        state.last_activity = Instant::now();
        state.generation
    }

    /// Unbind the transport of `generation`. A stale generation is ignored
    /// so a replaced transport cannot disconnect its successor.
    pub async fn detach(&self, generation: u64) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.connected = false;
        true
    }

    /// Cancel whatever transport is attached
    pub fn close(&self) {
        let _ = self.cancel.send(());
    }

    pub fn cancelled(&self) -> broadcast::Receiver<()> {
        self.cancel.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    pub async fn touch(&self) {
        self.state.write().await.last_activity = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.state.read().await.last_activity.elapsed()
    }

    /// Name given in CONNECT or the last JOIN_GAME
    pub async fn player_name(&self) -> Option<String> {
        self.state.read().await.player_name.clone()
    }

    pub async fn set_player_name(&self, name: &str) {
        self.state.write().await.player_name = Some(name.to_string());
    }

    pub async fn join_room(&self, game_id: &str) {
        self.state.write().await.rooms.insert(game_id.to_string());
    }

    pub async fn leave_room(&self, game_id: &str) {
        self.state.write().await.rooms.remove(game_id);
    }

    pub async fn rooms(&self) -> Vec<GameId> {
        let mut rooms: Vec<GameId> = self.state.read().await.rooms.iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub async fn in_room(&self, game_id: &str) -> bool {
        self.state.read().await.rooms.contains(game_id)
    }

    /// Throw away messages queued for a transport that is gone
    pub async fn drain_pending(&self) -> usize {
        let mut outbox = self.outbox.lock().await;
        let mut dropped = 0;
        while outbox.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Read frames until the peer goes away, stays silent past `pong_timeout`
/// or errors. Any frame refreshes the deadline, but only text frames count
/// as session activity; they are handed to `on_text`. A close from either
/// side ends the pump with `Ok`.
pub async fn read_pump<S, E, F, Fut>(
    session: &Session,
    mut stream: S,
    pong_timeout: Duration,
    mut on_text: F,
) -> PowerGridResult<()>
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: std::fmt::Display,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let frame = match tokio::time::timeout(pong_timeout, stream.next()).await {
            Err(_) => {
                return Err(NetworkError::Timeout {
                    session_id: session.id.clone(),
                }
                .into())
            }
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => {
                return Err(NetworkError::ConnectionClosed {
                    details: e.to_string(),
                }
                .into())
            }
            Ok(Some(Ok(frame))) => frame,
        };
        match frame {
            Frame::Text(text) => {
                session.touch().await;
                on_text(text).await;
            }
            Frame::Close => return Ok(()),
            Frame::Ping(_) | Frame::Pong(_) => {}
        }
    }
}

/// Drain the outbound queue onto the sink and ping on an interval
pub async fn write_pump<K>(session: &Session, mut sink: K, ping_interval: Duration)
where
    K: Sink<Frame> + Unpin,
    K::Error: std::fmt::Display,
{
    let mut outbox = session.outbox.lock().await;
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        let frame = tokio::select! {
            message = outbox.recv() => match message {
                Some(message) => match message.encode() {
                    Ok(text) => Frame::Text(text),
                    Err(e) => {
                        warn!("Dropping unencodable message for {}: {}", session.id, e);
                        continue;
                    }
                },
                None => break,
            },
            _ = ticker.tick() => Frame::Ping(Vec::new()),
        };
        if let Err(e) = sink.send(frame).await {
            debug!("Session {} write error: {}", session.id, e);
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let session = Session::new("s1".into(), "p1".into(), 2);
        session.send(Message::new(MessageType::GameState)).unwrap();
        session.send(Message::new(MessageType::GameState)).unwrap();
        let err = session.send(Message::new(MessageType::GameState)).unwrap_err();
        assert_eq!(err.code(), "NETWORK_ERROR");
        assert_eq!(session.drain_pending().await, 2);
        assert!(session.send(Message::new(MessageType::GameState)).is_ok());
    }

    #[tokio::test]
    async fn test_stale_transport_cannot_detach() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        let first = session.attach().await;
        let second = session.attach().await;
        assert!(!session.detach(first).await);
        assert!(session.is_connected().await);
        assert!(session.detach(second).await);
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_attach_cancels_previous_transport() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        session.attach().await;
        let mut cancelled = session.cancelled();
        session.attach().await;
        assert!(cancelled.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_rooms() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        session.join_room("g2").await;
        session.join_room("g1").await;
        assert_eq!(session.rooms().await, vec!["g1", "g2"]);
        session.leave_room("g2").await;
        assert!(!session.in_room("g2").await);
    }

    #[tokio::test]
    async fn test_write_pump_encodes_queue() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        session.send(Message::new(MessageType::GameList)).unwrap();
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Frame>();

        let pump = write_pump(&session, tx, Duration::from_secs(60));
        tokio::select! {
            _ = pump => panic!("pump stopped early"),
            frame = rx.next() => {
                let Some(Frame::Text(text)) = frame else { panic!("expected text") };
                assert!(text.contains("GAME_LIST"));
            }
        }
    }

    #[tokio::test]
    async fn test_read_pump_forwards_text_until_close() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        let frames = futures::stream::iter(vec![
            Ok::<_, String>(Frame::Text("one".into())),
            Ok(Frame::Pong(Vec::new())),
            Ok(Frame::Text("two".into())),
            Ok(Frame::Close),
            Ok(Frame::Text("never".into())),
        ]);
        let mut seen = Vec::new();
        read_pump(&session, frames, Duration::from_secs(5), |text| {
            seen.push(text);
            async {}
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalives_are_not_activity() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        let frames = futures::stream::iter(vec![
            Ok::<_, String>(Frame::Pong(Vec::new())),
            Ok(Frame::Ping(Vec::new())),
        ])
        .then(|frame| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            frame
        });
        read_pump(&session, Box::pin(frames), Duration::from_secs(60), |_| async {})
            .await
            .unwrap();
        assert!(session.idle_for().await >= Duration::from_secs(20));

        let frames = futures::stream::iter(vec![Ok::<_, String>(Frame::Text("hi".into()))]);
        read_pump(&session, frames, Duration::from_secs(60), |_| async {})
            .await
            .unwrap();
        assert!(session.idle_for().await < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let session = Session::new("s1".into(), "p1".into(), 8);
        let err = read_pump(
            &session,
            futures::stream::pending::<Result<Frame, String>>(),
            Duration::from_secs(5),
            |_| async {},
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "NETWORK_ERROR");
        assert!(err.to_string().contains("timed out"));
    }
}
