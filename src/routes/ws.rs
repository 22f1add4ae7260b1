//! WebSocket upgrade + message loop. Each connection owns at most one quiz
//! session; it is dropped when the socket closes. We reply with a single JSON
//! message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug, warn};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{session_view, AnswerIn, ClientWsMessage, ServerWsMessage};
use crate::session::QuizSession;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "nihongo_quiz", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "nihongo_quiz", "WebSocket connected");
  let mut session: Option<QuizSession> = None;

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "nihongo_quiz", len = txt.len(), "WS message received");
            handle_client_ws(incoming, &state, &mut session).await
          }
          Err(e) => ServerWsMessage::Error { code: "invalid_message".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "nihongo_quiz", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "nihongo_quiz", had_session = session.is_some(), "WebSocket disconnected");
}

fn error_reply(e: ApiError) -> ServerWsMessage {
  warn!(target: "quiz", code = e.code(), error = %e, "WS request rejected");
  ServerWsMessage::Error { code: e.code().into(), message: e.to_string() }
}

fn no_session() -> ServerWsMessage {
  ServerWsMessage::Error { code: "no_session".into(), message: "Start a quiz first.".into() }
}

#[instrument(level = "info", skip_all)]
pub(crate) async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &mut Option<QuizSession>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Start { category_id, chapter_id } => {
      match start_session(state, &category_id, chapter_id).await {
        Ok(s) => {
          let view = session_view(None, &s);
          info!(target: "quiz", %category_id, state = view.state, "WS session started");
          *session = Some(s);
          ServerWsMessage::Session { session: Some(view) }
        }
        Err(e) => error_reply(e),
      }
    }

    ClientWsMessage::Answer { option, text } => {
      let Some(s) = session.as_mut() else { return no_session() };
      match apply_answer(s, &AnswerIn { option, text }) {
        Ok(outcome) => {
          info!(target: "quiz", correct = outcome.correct, score = outcome.score, "WS answer evaluated");
          ServerWsMessage::AnswerResult {
            correct: outcome.correct,
            expected: outcome.expected,
            score: outcome.score,
            session: session_view(None, s),
          }
        }
        Err(e) => error_reply(e),
      }
    }

    ClientWsMessage::Next => {
      let Some(s) = session.as_mut() else { return no_session() };
      match s.advance() {
        Ok(()) => ServerWsMessage::Session { session: Some(session_view(None, s)) },
        Err(e) => error_reply(e.into()),
      }
    }

    ClientWsMessage::Restart => {
      let Some(s) = session.as_mut() else { return no_session() };
      match s.restart(&state.loader).await {
        Ok(()) => ServerWsMessage::Session { session: Some(session_view(None, s)) },
        Err(e) => error_reply(e.into()),
      }
    }

    ClientWsMessage::Summary => {
      let Some(s) = session.as_ref() else { return no_session() };
      match s.summary() {
        Ok(summary) => ServerWsMessage::Summary { summary },
        Err(e) => error_reply(e.into()),
      }
    }

    ClientWsMessage::Leave => {
      *session = None;
      ServerWsMessage::Session { session: None }
    }
  }
}
