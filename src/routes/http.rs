//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs ids and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::admin;
use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::session::Summary;
use crate::state::AppState;
use crate::store::QuestionRecord;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryListOut> {
  Json(list_categories(&state).await)
}

#[instrument(level = "info", skip(state), fields(%category_id))]
pub async fn http_list_chapters(
  State(state): State<Arc<AppState>>,
  Path(category_id): Path<String>,
) -> Json<ChapterListOut> {
  Json(list_chapters(&state, &category_id).await)
}

//
// Learner sessions
//

#[instrument(level = "info", skip(state, body), fields(category_id = %body.category_id, chapter_id = ?body.chapter_id))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
  let session = start_session(&state, &body.category_id, body.chapter_id).await?;
  let view = session_view(None, &session);
  let id = state.insert_session(session).await;
  info!(target: "quiz", %id, state = view.state, total = ?view.total, "HTTP session created");
  Ok((StatusCode::CREATED, Json(SessionView { session_id: Some(id), ..view })))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  let view = state.sessions.with_session(id, |session| Ok(session_view(Some(id), session))).await?;
  Ok(Json(view))
}

#[instrument(level = "info", skip(state, body), fields(%id, has_option = body.option.is_some(), text_len = body.text.as_ref().map(|t| t.len())))]
pub async fn http_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, ApiError> {
  let out = state
    .sessions
    .with_session(id, |session| {
      let outcome = apply_answer(session, &body)?;
      Ok(AnswerOut {
        correct: outcome.correct,
        expected: outcome.expected,
        score: outcome.score,
        session: session_view(Some(id), session),
      })
    })
    .await?;
  info!(target: "quiz", %id, correct = out.correct, score = out.score, "HTTP answer evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  let view = state
    .sessions
    .with_session(id, |session| {
      session.advance()?;
      Ok(session_view(Some(id), session))
    })
    .await?;
  Ok(Json(view))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_restart(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(restart_registered_session(&state, id).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_summary(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Summary>, ApiError> {
  let summary = state.sessions.with_session(id, |session| Ok(session.summary()?)).await?;
  Ok(Json(summary))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.remove_session(id).await.ok_or_else(|| session_not_found(id))?;
  info!(target: "quiz", %id, "HTTP session closed");
  Ok(StatusCode::NO_CONTENT)
}

//
// Admin
//

#[instrument(level = "info", skip(state, body), fields(category_id = %body.category_id))]
pub async fn http_create_chapter(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChapterIn>,
) -> Result<(StatusCode, Json<ChapterCreatedOut>), ApiError> {
  Ok((StatusCode::CREATED, Json(admin::create_chapter(&state, body).await?)))
}

#[instrument(level = "info", skip(state), fields(category_id = %q.category_id))]
pub async fn http_list_questions(
  State(state): State<Arc<AppState>>,
  Query(q): Query<AdminQuestionQuery>,
) -> Json<AdminQuestionListOut> {
  Json(admin::list_questions(&state, q).await)
}

#[instrument(level = "info", skip(state, body), fields(category_id = %body.category_id))]
pub async fn http_create_question(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuestionIn>,
) -> Result<(StatusCode, Json<QuestionRecord>), ApiError> {
  Ok((StatusCode::CREATED, Json(admin::create_question(&state, body).await?)))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_update_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<QuestionUpdateIn>,
) -> Result<Json<QuestionRecord>, ApiError> {
  Ok(Json(admin::update_question(&state, &id, body).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  admin::delete_question(&state, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}
