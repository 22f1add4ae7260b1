//! Document store seam: the collections the quiz reads from and the admin writes to.
//!
//! Three logical collections mirror the hosted database:
//!   - `categories` ordered by name
//!   - `chapters` filtered by category, ordered by chapter number
//!   - `questions` filtered by category and (optionally) chapter
//!
//! Backends are injected as `Arc<dyn DocumentStore>` so the pool loader and the
//! admin surface never reach for a global client.

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, Chapter, QuestionBody, QuestionType};

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store request failed: {0}")]
  Transport(String),
  #[error("store returned HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("malformed {collection} document: {message}")]
  Decode { collection: &'static str, message: String },
  #[error("{collection} document not found: {id}")]
  NotFound { collection: &'static str, id: String },
}

/// How the `chapterId` field of a question is matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChapterFilter {
  /// No constraint on the chapter.
  Any,
  /// Only questions without a chapter.
  Null,
  Equals(String),
}

impl ChapterFilter {
  pub fn matches(&self, chapter_id: Option<&str>) -> bool {
    match self {
      ChapterFilter::Any => true,
      ChapterFilter::Null => chapter_id.is_none(),
      ChapterFilter::Equals(id) => chapter_id == Some(id.as_str()),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionFilter {
  pub category_id: String,
  pub chapter: ChapterFilter,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewChapter {
  pub category_id: String,
  pub title: String,
  pub chapter_number: u32,
}

/// Question document as stored. Option fields only mean something for
/// multiple-choice rows; rows written before free-text questions existed carry
/// no `questionType` at all.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
  #[serde(default)]
  pub id: String,
  pub category_id: String,
  #[serde(default)]
  pub chapter_id: Option<String>,
  #[serde(default)]
  pub question_text: String,
  #[serde(default)]
  pub image_url: Option<String>,
  #[serde(default)]
  pub question_type: Option<String>,
  #[serde(default)]
  pub option_a: Option<String>,
  #[serde(default)]
  pub option_b: Option<String>,
  #[serde(default)]
  pub option_c: Option<String>,
  #[serde(default)]
  pub option_d: Option<String>,
  #[serde(default)]
  pub correct_answer: String,
  #[serde(default = "Utc::now")]
  pub created_at: DateTime<Utc>,
}

impl QuestionRecord {
  /// Fresh record for a validated body; id and timestamp are assigned by the store.
  pub fn new(
    category_id: String,
    chapter_id: Option<String>,
    question_text: String,
    image_url: Option<String>,
    body: &QuestionBody,
  ) -> Self {
    let mut rec = QuestionRecord {
      id: String::new(),
      category_id,
      chapter_id,
      question_text,
      image_url,
      question_type: None,
      option_a: None,
      option_b: None,
      option_c: None,
      option_d: None,
      correct_answer: String::new(),
      created_at: Utc::now(),
    };
    rec.set_body(body);
    rec
  }

  /// Overwrite the type-dependent fields.
  pub fn set_body(&mut self, body: &QuestionBody) {
    match body {
      QuestionBody::MultipleChoice { options, correct } => {
        let [a, b, c, d] = options.clone();
        self.question_type = Some(QuestionType::MultipleChoice.as_str().to_string());
        self.option_a = Some(a);
        self.option_b = Some(b);
        self.option_c = Some(c);
        self.option_d = Some(d);
        self.correct_answer = correct.as_str().to_string();
      }
      QuestionBody::FreeText { correct_text } => {
        self.question_type = Some(QuestionType::Input.as_str().to_string());
        self.option_a = None;
        self.option_b = None;
        self.option_c = None;
        self.option_d = None;
        self.correct_answer = correct_text.clone();
      }
    }
  }
}

pub trait DocumentStore: Send + Sync {
  /// All categories, ordered by name.
  fn list_categories(&self) -> StoreFuture<'_, Vec<Category>>;

  fn get_category<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Category>> {
    Box::pin(async move {
      let categories = self.list_categories().await?;
      Ok(categories.into_iter().find(|c| c.id == id))
    })
  }

  /// Chapters of one category, ordered by chapter number ascending.
  fn list_chapters<'a>(&'a self, category_id: &'a str) -> StoreFuture<'a, Vec<Chapter>>;

  /// Matching questions, newest first.
  fn list_questions<'a>(&'a self, filter: &'a QuestionFilter) -> StoreFuture<'a, Vec<QuestionRecord>>;

  fn get_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<QuestionRecord>>;

  fn create_chapter(&self, chapter: NewChapter) -> StoreFuture<'_, Chapter>;

  /// Insert a question; the returned record carries the assigned id.
  fn create_question(&self, question: QuestionRecord) -> StoreFuture<'_, QuestionRecord>;

  /// Replace the editable fields (text, image, type, options, answer) of an existing question.
  fn update_question(&self, question: QuestionRecord) -> StoreFuture<'_, QuestionRecord>;

  fn delete_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::OptionKey;

  #[test]
  fn chapter_filter_matching() {
    assert!(ChapterFilter::Any.matches(None));
    assert!(ChapterFilter::Any.matches(Some("ch1")));
    assert!(ChapterFilter::Null.matches(None));
    assert!(!ChapterFilter::Null.matches(Some("ch1")));
    assert!(ChapterFilter::Equals("ch1".into()).matches(Some("ch1")));
    assert!(!ChapterFilter::Equals("ch1".into()).matches(None));
  }

  #[test]
  fn switching_to_free_text_clears_options() {
    let mc = QuestionBody::MultipleChoice {
      options: ["w".into(), "x".into(), "y".into(), "z".into()],
      correct: OptionKey::C,
    };
    let mut rec = QuestionRecord::new("cat".into(), None, "q".into(), None, &mc);
    assert_eq!(rec.correct_answer, "c");
    assert_eq!(rec.option_c.as_deref(), Some("y"));

    rec.set_body(&QuestionBody::FreeText { correct_text: "neko".into() });
    assert_eq!(rec.question_type.as_deref(), Some("input"));
    assert!(rec.option_a.is_none());
    assert_eq!(rec.correct_answer, "neko");
  }

  #[test]
  fn legacy_record_deserializes_without_type_or_timestamp() {
    let rec: QuestionRecord = serde_json::from_str(
      r#"{"categoryId":"kotoba","questionText":"犬","optionA":"dog","optionB":"cat","optionC":"bird","optionD":"fish","correctAnswer":"a"}"#,
    )
    .unwrap();
    assert!(rec.question_type.is_none());
    assert!(rec.chapter_id.is_none());
    assert!(rec.image_url.is_none());
  }
}
