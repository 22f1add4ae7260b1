//! Quiz session state machine.
//!
//! ```text
//! Loading ──► Empty                      (no eligible questions / store failure)
//!    │
//!    └──────► Active ──advance──► Active ──advance on last──► Completed
//! ```
//!
//! `Empty` and `Completed` only leave through a restart, which goes back to
//! `Loading`. Every answer is revealed before the learner may move on, and a
//! revealed answer is locked: submitting again returns the recorded result
//! and never scores twice.
//!
//! Loads are keyed by a generation number: `begin_load` hands out a ticket and
//! `finish_load` ignores tickets from superseded loads, so a slow fetch can never
//! overwrite a newer session.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{Category, OptionKey, Question, QuestionBody, QuestionType};
use crate::pool::{PoolOutcome, QuestionPoolLoader};
use crate::util::normalize_answer;

/// Percentage at or above which a finished quiz counts as passed.
pub const PASS_THRESHOLD_PERCENT: f64 = 70.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
  Choice(OptionKey),
  /// Trimmed free-text input.
  Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reveal {
  pub response: Response,
  pub correct: bool,
}

#[derive(Clone, Debug)]
pub enum SessionState {
  Loading,
  Empty { load_failed: bool },
  Active { questions: Vec<Question>, index: usize, score: usize, reveal: Option<Reveal> },
  Completed { score: usize, total: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
  pub correct: bool,
  pub expected: String,
  pub score: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub score: usize,
  pub total: usize,
  pub percentage: f64,
  pub passed: bool,
}

impl Summary {
  pub fn new(score: usize, total: usize) -> Self {
    let percentage = if total == 0 { 0.0 } else { 100.0 * score as f64 / total as f64 };
    Self { score, total, percentage, passed: percentage >= PASS_THRESHOLD_PERCENT }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket {
  generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
  #[error("questions are still loading")]
  Loading,
  #[error("there are no questions for this selection")]
  NoQuestions,
  #[error("the quiz is already completed")]
  Completed,
  #[error("this is a {actual} question, not {attempted}")]
  WrongQuestionType { attempted: QuestionType, actual: QuestionType },
  #[error("answer must not be blank")]
  BlankAnswer,
  #[error("answer the current question before moving on")]
  NotRevealed,
  #[error("the quiz is not finished yet")]
  NotCompleted,
  #[error("load {ticket} was superseded by load {current}")]
  StaleLoad { ticket: u64, current: u64 },
}

/// Error for an answer/advance attempted outside `Active`.
fn inactive_error(state: &SessionState) -> SessionError {
  match state {
    SessionState::Loading => SessionError::Loading,
    SessionState::Empty { .. } => SessionError::NoQuestions,
    SessionState::Completed { .. } => SessionError::Completed,
    SessionState::Active { .. } => SessionError::NotRevealed,
  }
}

/// One learner's run through a question pool for a (category, chapter) selection.
#[derive(Clone, Debug)]
pub struct QuizSession {
  category: Category,
  chapter_id: Option<String>,
  generation: u64,
  state: SessionState,
}

impl QuizSession {
  pub fn new(category: Category, chapter_id: Option<String>) -> Self {
    Self { category, chapter_id, generation: 0, state: SessionState::Loading }
  }

  pub fn category(&self) -> &Category {
    &self.category
  }

  pub fn chapter_id(&self) -> Option<&str> {
    self.chapter_id.as_deref()
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  /// Question currently presented, if any.
  pub fn current_question(&self) -> Option<&Question> {
    match &self.state {
      SessionState::Active { questions, index, .. } => questions.get(*index),
      _ => None,
    }
  }

  /// Enter `Loading` and invalidate any load still in flight.
  pub fn begin_load(&mut self) -> LoadTicket {
    self.generation += 1;
    self.state = SessionState::Loading;
    LoadTicket { generation: self.generation }
  }

  /// Apply a finished load. Results from superseded loads are rejected untouched.
  pub fn finish_load(&mut self, ticket: LoadTicket, outcome: PoolOutcome) -> Result<(), SessionError> {
    if ticket.generation != self.generation {
      return Err(SessionError::StaleLoad { ticket: ticket.generation, current: self.generation });
    }
    if outcome.questions.is_empty() {
      info!(target: "quiz", category_id = %self.category.id, load_failed = outcome.load_failed, "Session has no questions");
      self.state = SessionState::Empty { load_failed: outcome.load_failed };
    } else {
      debug!(target: "quiz", category_id = %self.category.id, total = outcome.questions.len(), "Session active");
      self.state = SessionState::Active { questions: outcome.questions, index: 0, score: 0, reveal: None };
    }
    Ok(())
  }

  /// Load a fresh pool and begin at the first question.
  #[instrument(level = "info", skip_all, fields(category_id = %self.category.id, chapter_id = ?self.chapter_id))]
  pub async fn start(&mut self, loader: &QuestionPoolLoader) -> Result<(), SessionError> {
    let ticket = self.begin_load();
    let outcome = loader.load(&self.category, self.chapter_id.as_deref()).await;
    self.finish_load(ticket, outcome)
  }

  /// Same selection, new shuffle, score reset.
  pub async fn restart(&mut self, loader: &QuestionPoolLoader) -> Result<(), SessionError> {
    self.start(loader).await
  }

  pub fn submit_multiple_choice(&mut self, key: OptionKey) -> Result<AnswerOutcome, SessionError> {
    match &mut self.state {
      SessionState::Active { questions, index, score, reveal } => {
        let Some(question) = questions.get(*index) else { return Err(SessionError::NoQuestions) };
        if let Some(recorded) = reveal {
          return Ok(AnswerOutcome { correct: recorded.correct, expected: question.body.expected_answer(), score: *score });
        }
        let correct = match &question.body {
          QuestionBody::MultipleChoice { correct, .. } => *correct == key,
          QuestionBody::FreeText { .. } => {
            return Err(SessionError::WrongQuestionType {
              attempted: QuestionType::MultipleChoice,
              actual: QuestionType::Input,
            })
          }
        };
        if correct {
          *score += 1;
        }
        *reveal = Some(Reveal { response: Response::Choice(key), correct });
        debug!(target: "quiz", question_id = %question.id, %key, correct, score = *score, "Multiple-choice answer revealed");
        Ok(AnswerOutcome { correct, expected: question.body.expected_answer(), score: *score })
      }
      other => Err(inactive_error(other)),
    }
  }

  pub fn submit_free_text(&mut self, text: &str) -> Result<AnswerOutcome, SessionError> {
    match &mut self.state {
      SessionState::Active { questions, index, score, reveal } => {
        let Some(question) = questions.get(*index) else { return Err(SessionError::NoQuestions) };
        if let Some(recorded) = reveal {
          return Ok(AnswerOutcome { correct: recorded.correct, expected: question.body.expected_answer(), score: *score });
        }
        let correct_text = match &question.body {
          QuestionBody::FreeText { correct_text } => correct_text,
          QuestionBody::MultipleChoice { .. } => {
            return Err(SessionError::WrongQuestionType {
              attempted: QuestionType::Input,
              actual: QuestionType::MultipleChoice,
            })
          }
        };
        let input = text.trim();
        if input.is_empty() {
          return Err(SessionError::BlankAnswer);
        }
        let correct = normalize_answer(input) == normalize_answer(correct_text);
        if correct {
          *score += 1;
        }
        *reveal = Some(Reveal { response: Response::Text(input.to_string()), correct });
        debug!(target: "quiz", question_id = %question.id, input_len = input.len(), correct, score = *score, "Free-text answer revealed");
        Ok(AnswerOutcome { correct, expected: correct_text.clone(), score: *score })
      }
      other => Err(inactive_error(other)),
    }
  }

  /// Move past a revealed answer; past the last question the session completes.
  pub fn advance(&mut self) -> Result<(), SessionError> {
    let finished = match &mut self.state {
      SessionState::Active { questions, index, score, reveal } => {
        if reveal.is_none() {
          return Err(SessionError::NotRevealed);
        }
        if *index + 1 >= questions.len() {
          Some(Summary::new(*score, questions.len()))
        } else {
          *index += 1;
          *reveal = None;
          None
        }
      }
      other => return Err(inactive_error(other)),
    };

    if let Some(summary) = finished {
      info!(
        target: "quiz",
        category_id = %self.category.id,
        score = summary.score,
        total = summary.total,
        passed = summary.passed,
        "Quiz completed"
      );
      self.state = SessionState::Completed { score: summary.score, total: summary.total };
    }
    Ok(())
  }

  pub fn summary(&self) -> Result<Summary, SessionError> {
    match &self.state {
      SessionState::Completed { score, total } => Ok(Summary::new(*score, *total)),
      _ => Err(SessionError::NotCompleted),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::store::{DocumentStore as _, MemoryStore};
  use crate::testing::{category, choice_question, choice_record, text_question, FailingStore};

  fn active(questions: Vec<Question>) -> QuizSession {
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    let ticket = s.begin_load();
    s.finish_load(ticket, PoolOutcome { questions, load_failed: false }).unwrap();
    s
  }

  fn score(s: &QuizSession) -> usize {
    match s.state() {
      SessionState::Active { score, .. } | SessionState::Completed { score, .. } => *score,
      _ => 0,
    }
  }

  #[test]
  fn all_correct_multiple_choice_scores_full_marks() {
    let mut s = active(vec![
      choice_question("q1", OptionKey::A),
      choice_question("q2", OptionKey::B),
      choice_question("q3", OptionKey::D),
    ]);
    for _ in 0..3 {
      let key = match &s.current_question().unwrap().body {
        QuestionBody::MultipleChoice { correct, .. } => *correct,
        _ => unreachable!(),
      };
      assert!(s.submit_multiple_choice(key).unwrap().correct);
      s.advance().unwrap();
    }
    assert_eq!(s.summary().unwrap(), Summary { score: 3, total: 3, percentage: 100.0, passed: true });
  }

  #[test]
  fn free_text_is_trimmed_and_case_insensitive() {
    for input in ["Arigatou ", "arigatou", " ARIGATOU"] {
      let mut s = active(vec![text_question("t", "arigatou")]);
      assert!(s.submit_free_text(input).unwrap().correct, "{input:?} should match");
    }
    let mut s = active(vec![text_question("t", "arigatou")]);
    let out = s.submit_free_text("arigato").unwrap();
    assert!(!out.correct);
    assert_eq!(out.expected, "arigatou");
    assert_eq!(score(&s), 0);

    for input in ["Neko", "neko", " neko "] {
      let mut s = active(vec![text_question("n", "neko")]);
      assert!(s.submit_free_text(input).unwrap().correct);
    }
  }

  #[test]
  fn second_submit_does_not_rescore() {
    let mut s = active(vec![choice_question("q1", OptionKey::C), choice_question("q2", OptionKey::A)]);
    let first = s.submit_multiple_choice(OptionKey::C).unwrap();
    assert!(first.correct);
    assert_eq!(s.submit_multiple_choice(OptionKey::C).unwrap(), first);
    // A different key after reveal changes nothing either.
    assert_eq!(s.submit_multiple_choice(OptionKey::B).unwrap(), first);
    assert_eq!(score(&s), 1);
    assert!(matches!(
      s.state(),
      SessionState::Active { reveal: Some(Reveal { response: Response::Choice(OptionKey::C), correct: true }), .. }
    ));
  }

  #[test]
  fn wrong_answer_type_is_rejected_without_reveal() {
    let mut s = active(vec![choice_question("q1", OptionKey::A), text_question("t", "yama")]);
    assert_eq!(
      s.submit_free_text("a"),
      Err(SessionError::WrongQuestionType { attempted: QuestionType::Input, actual: QuestionType::MultipleChoice })
    );
    assert_eq!(s.advance(), Err(SessionError::NotRevealed));
    s.submit_multiple_choice(OptionKey::B).unwrap();
    s.advance().unwrap();

    assert!(matches!(s.submit_multiple_choice(OptionKey::A), Err(SessionError::WrongQuestionType { .. })));
    assert_eq!(s.submit_free_text("   "), Err(SessionError::BlankAnswer));
    assert!(s.submit_free_text("Yama").unwrap().correct);
  }

  #[test]
  fn advance_on_last_question_completes_with_real_total() {
    let mut s = active(vec![
      choice_question("q1", OptionKey::A),
      choice_question("q2", OptionKey::A),
      choice_question("q3", OptionKey::A),
      choice_question("q4", OptionKey::A),
    ]);
    for (i, key) in [OptionKey::A, OptionKey::B, OptionKey::A, OptionKey::A].into_iter().enumerate() {
      assert_eq!(s.summary(), Err(SessionError::NotCompleted));
      s.submit_multiple_choice(key).unwrap();
      s.advance().unwrap();
      if i < 3 {
        assert!(matches!(s.state(), SessionState::Active { index, reveal: None, .. } if *index == i + 1));
      }
    }
    let summary = s.summary().unwrap();
    assert_eq!((summary.score, summary.total), (3, 4));
    assert_eq!(summary.percentage, 75.0);
    assert!(summary.passed);
    assert_eq!(s.advance(), Err(SessionError::Completed));
    assert_eq!(s.submit_multiple_choice(OptionKey::A), Err(SessionError::Completed));
  }

  #[test]
  fn pass_threshold_is_seventy_percent() {
    assert!(Summary::new(7, 10).passed);
    assert!(!Summary::new(6, 10).passed);
    assert!(!Summary::new(2, 3).passed);
    assert_eq!(Summary::new(0, 0).percentage, 0.0);
  }

  #[test]
  fn score_stays_within_bounds_and_never_drops() {
    let questions: Vec<Question> = (0..10).map(|i| choice_question(&format!("q{i}"), OptionKey::B)).collect();
    let total = questions.len();
    let mut s = active(questions);
    let mut last = 0;
    for i in 0..total {
      let key = if i % 3 == 0 { OptionKey::A } else { OptionKey::B };
      s.submit_multiple_choice(key).unwrap();
      let _ = s.submit_multiple_choice(OptionKey::B);
      let now = score(&s);
      assert!(now >= last && now <= total);
      last = now;
      s.advance().unwrap();
    }
    assert_eq!(s.summary().unwrap().score, 6);
  }

  #[test]
  fn index_past_the_pool_is_rejected_not_a_panic() {
    let mut s = active(vec![choice_question("q1", OptionKey::A)]);
    if let SessionState::Active { index, .. } = &mut s.state {
      *index = 3;
    }
    assert_eq!(s.submit_multiple_choice(OptionKey::A), Err(SessionError::NoQuestions));
    assert_eq!(s.submit_free_text("a"), Err(SessionError::NoQuestions));
    assert!(s.current_question().is_none());
  }

  #[test]
  fn nothing_is_answerable_while_loading() {
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    assert!(s.current_question().is_none());
    assert_eq!(s.submit_multiple_choice(OptionKey::A), Err(SessionError::Loading));
    assert_eq!(s.submit_free_text("x"), Err(SessionError::Loading));
    assert_eq!(s.advance(), Err(SessionError::Loading));
    assert_eq!(s.summary(), Err(SessionError::NotCompleted));
  }

  #[test]
  fn stale_load_is_ignored() {
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    let first = s.begin_load();
    let second = s.begin_load();

    let slow = PoolOutcome { questions: vec![choice_question("old", OptionKey::A)], load_failed: false };
    assert_eq!(s.finish_load(first, slow), Err(SessionError::StaleLoad { ticket: 1, current: 2 }));
    assert!(matches!(s.state(), SessionState::Loading));

    let fresh = PoolOutcome { questions: vec![choice_question("new", OptionKey::A)], load_failed: false };
    s.finish_load(second, fresh).unwrap();
    assert_eq!(s.current_question().unwrap().id, "new");
  }

  #[tokio::test]
  async fn empty_chapter_pool_never_becomes_active() {
    let store = MemoryStore::default();
    store.create_question(choice_record("", "g", Some("ch1"), OptionKey::A)).await.unwrap();
    let loader = QuestionPoolLoader::new(Arc::new(store));

    let mut s = QuizSession::new(category("g", "bunpo"), Some("ch-empty".into()));
    s.start(&loader).await.unwrap();
    assert!(matches!(s.state(), SessionState::Empty { load_failed: false }));
    assert_eq!(s.summary(), Err(SessionError::NotCompleted));
    assert_eq!(s.submit_multiple_choice(OptionKey::A), Err(SessionError::NoQuestions));
  }

  #[tokio::test]
  async fn store_failure_ends_in_empty_state() {
    let loader = QuestionPoolLoader::new(Arc::new(FailingStore));
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    s.start(&loader).await.unwrap();
    assert!(matches!(s.state(), SessionState::Empty { load_failed: true }));
  }

  #[tokio::test]
  async fn restart_draws_a_new_sample_and_resets_score() {
    let store = MemoryStore::default();
    for i in 0..30 {
      store.create_question(choice_record(&format!("q{i}"), "k", None, OptionKey::A)).await.unwrap();
    }
    let loader = QuestionPoolLoader::new(Arc::new(store));
    let mut s = QuizSession::new(category("k", "kotoba"), None);
    s.start(&loader).await.unwrap();
    s.submit_multiple_choice(OptionKey::A).unwrap();
    assert_eq!(score(&s), 1);

    let ids = |s: &QuizSession| match s.state() {
      SessionState::Active { questions, .. } => questions.iter().map(|q| q.id.clone()).collect::<Vec<_>>(),
      _ => vec![],
    };
    s.restart(&loader).await.unwrap();
    let first = ids(&s);
    s.restart(&loader).await.unwrap();
    let second = ids(&s);

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert_ne!(first, second, "two restarts produced the identical ordered sample");
    assert!(matches!(s.state(), SessionState::Active { index: 0, score: 0, reveal: None, .. }));
  }
}
