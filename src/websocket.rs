use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{future, SinkExt, StreamExt};
use log::info;
use serde::Deserialize;

use crate::actions::SessionId;
use crate::server::AppState;
use crate::session::Frame;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Present when a client resumes an earlier session
    pub session_id: Option<SessionId>,
}

/// `GET /ws`: upgrade and hand the socket to the session layer
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let sessions = state.sessions;
    ws.on_upgrade(move |socket| async move {
        let (session, reconnected) = sessions.connect(query.session_id.as_deref()).await;
        info!(
            "🔌 WebSocket attached to session {} (reconnect: {})",
            session.id, reconnected
        );
        let (sink, stream) = split(socket);
        sessions.serve(session, stream, sink, reconnected).await;
    })
}

/// Adapt an axum socket to the transport-neutral [`Frame`] stream and sink
fn split(
    socket: WebSocket,
) -> (
    impl futures::Sink<Frame, Error = axum::Error> + Unpin + Send + 'static,
    impl futures::Stream<Item = Result<Frame, axum::Error>> + Unpin + Send + 'static,
) {
    let (sink, stream) = socket.split();

    let sink = Box::pin(sink.with(|frame: Frame| {
        future::ready(Ok::<_, axum::Error>(match frame {
            Frame::Text(text) => WsFrame::Text(text.into()),
            Frame::Ping(data) => WsFrame::Ping(data.into()),
            Frame::Pong(data) => WsFrame::Pong(data.into()),
            Frame::Close => WsFrame::Close(None),
        }))
    }));

    let stream = Box::pin(stream.filter_map(|frame| {
        future::ready(match frame {
            Ok(WsFrame::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
            Ok(WsFrame::Ping(data)) => Some(Ok(Frame::Ping(data.to_vec()))),
            Ok(WsFrame::Pong(data)) => Some(Ok(Frame::Pong(data.to_vec()))),
            Ok(WsFrame::Close(_)) => Some(Ok(Frame::Close)),
            Ok(WsFrame::Binary(_)) => None,
            Err(e) => Some(Err(e)),
        })
    }));

    (sink, stream)
}
