//! Test helpers: record builders and a store double whose every call fails.

use chrono::Utc;

use crate::domain::{Category, Chapter, OptionKey, Question, QuestionBody};
use crate::pool::normalize_record;
use crate::store::{DocumentStore, NewChapter, QuestionFilter, QuestionRecord, StoreError, StoreFuture};

pub fn category(id: &str, slug: &str) -> Category {
  Category { id: id.into(), name: id.to_uppercase(), slug: slug.into(), created_at: Utc::now() }
}

pub fn choice_record(id: &str, category_id: &str, chapter_id: Option<&str>, correct: OptionKey) -> QuestionRecord {
  let body = QuestionBody::MultipleChoice {
    options: ["satu".into(), "dua".into(), "tiga".into(), "empat".into()],
    correct,
  };
  let mut rec = QuestionRecord::new(
    category_id.into(),
    chapter_id.map(str::to_owned),
    format!("question {id}"),
    None,
    &body,
  );
  rec.id = id.into();
  rec
}

pub fn text_record(id: &str, category_id: &str, answer: &str) -> QuestionRecord {
  let mut rec = QuestionRecord::new(
    category_id.into(),
    None,
    format!("question {id}"),
    None,
    &QuestionBody::FreeText { correct_text: String::new() },
  );
  rec.id = id.into();
  rec.correct_answer = answer.into();
  rec
}

pub fn choice_question(id: &str, correct: OptionKey) -> Question {
  normalize_record(choice_record(id, "k", None, correct)).expect("valid multiple-choice record")
}

pub fn text_question(id: &str, answer: &str) -> Question {
  normalize_record(text_record(id, "k", answer)).expect("valid free-text record")
}

/// Every call fails like an unreachable database.
pub struct FailingStore;

fn refused<T: Send + 'static>() -> StoreFuture<'static, T> {
  Box::pin(async { Err(StoreError::Transport("connection refused".into())) })
}

impl DocumentStore for FailingStore {
  fn list_categories(&self) -> StoreFuture<'_, Vec<Category>> {
    refused()
  }

  fn list_chapters<'a>(&'a self, _category_id: &'a str) -> StoreFuture<'a, Vec<Chapter>> {
    refused()
  }

  fn list_questions<'a>(&'a self, _filter: &'a QuestionFilter) -> StoreFuture<'a, Vec<QuestionRecord>> {
    refused()
  }

  fn get_question<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, Option<QuestionRecord>> {
    refused()
  }

  fn create_chapter(&self, _chapter: NewChapter) -> StoreFuture<'_, Chapter> {
    refused()
  }

  fn create_question(&self, _question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    refused()
  }

  fn update_question(&self, _question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    refused()
  }

  fn delete_question<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, ()> {
    refused()
  }
}
