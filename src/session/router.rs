// Routes one inbound message from a session to the game layer and fans the
// result out. Failures are answered to the originating session only.
//
// A mutation's Committed is held until its broadcast is queued, which keeps
// the game locked and every room's view in commit order.

use log::{debug, info};

use super::{Dispatch, Session, SessionManager};
use crate::errors::{GameError, PowerGridResult};
use crate::protocol::{
    Command, ConnectedPayload, GameCreatedPayload, GameListPayload, Message, MessageType,
};

pub async fn process_game_message(manager: &SessionManager, dispatch: Dispatch) {
    let Dispatch {
        session_id,
        message,
    } = dispatch;
    let session = match manager.get_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            debug!("Dropping {:?} from closed session: {}", message.kind, e);
            return;
        }
    };

    if let Err(e) = route(manager, &session, &message).await {
        let mut reply = Message::error(&e);
        reply.game_id = Command::from_message(&message)
            .ok()
            .and_then(|command| command.game_id(&message))
            .or_else(|| message.game_id.clone());
        manager.reply(&session.id, reply).await;
    }
}

async fn route(manager: &SessionManager, session: &Session, message: &Message) -> PowerGridResult<()> {
    let command = Command::from_message(message)?;
    let game_id = if command.needs_game() {
        command
            .game_id(message)
            .ok_or_else(GameError::missing_game_id)?
    } else {
        String::new()
    };
    let games = manager.games();
    let player_id = session.player_id.as_str();

    match command {
        Command::Connect(payload) => {
            if let Some(name) = &payload.player_name {
                session.set_player_name(name).await;
            }
            let reply = Message::new(MessageType::Connected)
                .with_session(session.id.clone())
                .with_payload(&ConnectedPayload {
                    session_id: session.id.clone(),
                    player_id: session.player_id.clone(),
                    reconnected: false,
                });
            manager.reply(&session.id, reply).await;
        }
        Command::CreateGame(payload) => {
            let summary = games
                .create_game(&payload.name, &payload.map, payload.max_players)
                .await?;
            let reply = Message::new(MessageType::GameCreated)
                .with_game(summary.id.clone())
                .with_payload(&GameCreatedPayload::from(&summary));
            manager.reply(&session.id, reply).await;
        }
        Command::ListGames => {
            let reply = Message::new(MessageType::GameList).with_payload(&GameListPayload {
                games: games.list_games().await,
            });
            manager.reply(&session.id, reply).await;
        }
        Command::GetGameState => {
            let snapshot = games.snapshot(&game_id).await?;
            manager.reply(&session.id, Message::game_state(&snapshot)).await;
        }
        Command::JoinGame(payload) => {
            let player_name = match payload.player_name {
                Some(name) => name,
                None => session
                    .player_name()
                    .await
                    .ok_or_else(|| GameError::invalid_message("player_name is required"))?,
            };
            let committed = games
                .join_game(&game_id, player_id, &player_name, payload.color.as_deref())
                .await?;
            session.set_player_name(&player_name).await;
            session.join_room(&game_id).await;
            info!("🪑 Session {} joined room {}", session.id, game_id);
            manager.publish(&game_id, &committed.outcome).await;
        }
        Command::LeaveGame => {
            let committed = games.leave_game(&game_id, player_id).await?;
            manager.publish(&game_id, &committed.outcome).await;
            session.leave_room(&game_id).await;
        }
        Command::StartGame => {
            let committed = games.start_game(&game_id, player_id).await?;
            manager.publish(&game_id, &committed.outcome).await;
        }
        Command::Action(action) => {
            let committed = games.process_action(&game_id, player_id, action).await?;
            manager.publish(&game_id, &committed.outcome).await;
        }
    }
    Ok(())
}
