//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Listing the category and chapter catalogs (store failures become empty lists)
//!   - Starting a session for a (category, chapter) selection
//!   - Routing an answer payload to the right submit operation
//!   - Restarting a registered HTTP session without holding the registry lock across the load

use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::OptionKey;
use crate::error::{ApiError, ValidationError};
use crate::protocol::{session_view, AnswerIn, CategoryListOut, ChapterListOut, SessionView};
use crate::session::{AnswerOutcome, QuizSession, SessionError};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn list_categories(state: &AppState) -> CategoryListOut {
  match state.store.list_categories().await {
    Ok(categories) => CategoryListOut { categories, load_failed: false },
    Err(e) => {
      error!(target: "quiz", error = %e, "Could not load categories");
      CategoryListOut { categories: vec![], load_failed: true }
    }
  }
}

#[instrument(level = "info", skip(state), fields(%category_id))]
pub async fn list_chapters(state: &AppState, category_id: &str) -> ChapterListOut {
  match state.store.list_chapters(category_id).await {
    Ok(chapters) => ChapterListOut { chapters, load_failed: false },
    Err(e) => {
      error!(target: "quiz", %category_id, error = %e, "Could not load chapters");
      ChapterListOut { chapters: vec![], load_failed: true }
    }
  }
}

/// Look up the category and run the first load. The returned session is
/// `Empty` or `Active`; the learner cannot see anything before that.
#[instrument(level = "info", skip(state), fields(%category_id, chapter_id = ?chapter_id))]
pub async fn start_session(state: &AppState, category_id: &str, chapter_id: Option<String>) -> Result<QuizSession, ApiError> {
  let category = state
    .store
    .get_category(category_id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("category {category_id}")))?;

  let chapter_id = chapter_id.filter(|c| !c.trim().is_empty());
  let mut session = QuizSession::new(category, chapter_id);
  session.start(&state.loader).await?;
  info!(target: "quiz", %category_id, state = session_view(None, &session).state, "Session started");
  Ok(session)
}

/// Exactly one of `option` / `text` must be present.
pub fn apply_answer(session: &mut QuizSession, answer: &AnswerIn) -> Result<AnswerOutcome, ApiError> {
  match (answer.option.as_deref(), answer.text.as_deref()) {
    (Some(option), None) => {
      let key = OptionKey::parse(option)
        .ok_or_else(|| ValidationError::new("option", "must be one of a, b, c, d"))?;
      Ok(session.submit_multiple_choice(key)?)
    }
    (None, Some(text)) => Ok(session.submit_free_text(text)?),
    (Some(_), Some(_)) => Err(ValidationError::new("answer", "send either option or text, not both").into()),
    (None, None) => Err(ValidationError::new("answer", "option or text is required").into()),
  }
}

/// Restart a registered session. The registry lock is released while the pool
/// loads; a load overtaken by a newer restart is dropped.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn restart_registered_session(state: &AppState, id: Uuid) -> Result<SessionView, ApiError> {
  let (ticket, category, chapter_id) = state
    .sessions
    .with_session(id, |session| {
      let ticket = session.begin_load();
      Ok((ticket, session.category().clone(), session.chapter_id().map(str::to_owned)))
    })
    .await?;

  let outcome = state.loader.load(&category, chapter_id.as_deref()).await;

  state
    .sessions
    .with_session(id, |session| {
      match session.finish_load(ticket, outcome) {
        Ok(()) => {}
        Err(SessionError::StaleLoad { ticket, current }) => {
          debug!(target: "quiz", %id, ticket, current, "Dropped superseded load");
        }
        Err(e) => return Err(e.into()),
      }
      Ok(session_view(Some(id), session))
    })
    .await
}

pub fn session_not_found(id: Uuid) -> ApiError {
  ApiError::NotFound(format!("session {id}"))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::domain::QuestionBody;
  use crate::pool::PoolOutcome;
  use crate::seeds::seed_bank;
  use crate::session::SessionState;
  use crate::store::MemoryStore;
  use crate::testing::{category, choice_question, FailingStore};

  fn seeded() -> AppState {
    AppState::with_store(Arc::new(MemoryStore::new(seed_bank())), None)
  }

  #[tokio::test]
  async fn grammar_chapter_session_is_active() {
    let state = seeded();
    let s = start_session(&state, "cat-bunpo", Some("bunpo-1".into())).await.unwrap();
    match s.state() {
      SessionState::Active { questions, .. } => {
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.chapter_id.as_deref() == Some("bunpo-1")));
      }
      other => panic!("expected active, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn grammar_without_chapter_is_empty() {
    let state = seeded();
    let s = start_session(&state, "cat-bunpo", Some(" ".into())).await.unwrap();
    assert!(matches!(s.state(), SessionState::Empty { load_failed: false }));
  }

  #[tokio::test]
  async fn unknown_category_is_not_found() {
    let state = seeded();
    let err = start_session(&state, "cat-nope", None).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
  }

  #[tokio::test]
  async fn catalog_failure_is_an_empty_flagged_list() {
    let state = AppState::with_store(Arc::new(FailingStore), None);
    let out = list_categories(&state).await;
    assert!(out.categories.is_empty());
    assert!(out.load_failed);
    assert!(list_chapters(&state, "cat-bunpo").await.load_failed);
  }

  #[tokio::test]
  async fn chapters_come_back_in_order() {
    let out = list_chapters(&seeded(), "cat-bunpo").await;
    let numbers: Vec<u32> = out.chapters.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![1, 2]);
  }

  #[test]
  fn answer_payload_must_name_one_kind() {
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    let ticket = s.begin_load();
    s.finish_load(ticket, PoolOutcome { questions: vec![choice_question("q1", OptionKey::C)], load_failed: false })
      .unwrap();

    let both = AnswerIn { option: Some("c".into()), text: Some("c".into()) };
    assert!(matches!(apply_answer(&mut s, &both), Err(ApiError::Validation(_))));
    assert!(matches!(apply_answer(&mut s, &AnswerIn::default()), Err(ApiError::Validation(_))));
    let bad_key = AnswerIn { option: Some("e".into()), text: None };
    assert!(matches!(apply_answer(&mut s, &bad_key), Err(ApiError::Validation(_))));

    let good = AnswerIn { option: Some("C".into()), text: None };
    assert!(apply_answer(&mut s, &good).unwrap().correct);
  }

  #[tokio::test]
  async fn restart_resets_a_registered_session() {
    let state = seeded();
    let mut s = start_session(&state, "cat-kanji", None).await.unwrap();
    let q = s.current_question().unwrap().clone();
    let answer = match &q.body {
      QuestionBody::MultipleChoice { correct, .. } => AnswerIn { option: Some(correct.to_string()), text: None },
      QuestionBody::FreeText { correct_text } => AnswerIn { option: None, text: Some(correct_text.clone()) },
    };
    apply_answer(&mut s, &answer).unwrap();
    let id = state.insert_session(s).await;

    let view = restart_registered_session(&state, id).await.unwrap();
    assert_eq!(view.state, "active");
    assert_eq!(view.score, 0);
    assert_eq!(view.question_number, Some(1));
    assert_eq!(view.total, Some(3));

    state.remove_session(id).await;
    assert!(matches!(restart_registered_session(&state, id).await, Err(ApiError::NotFound(_))));
  }
}
