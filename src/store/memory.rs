//! In-process document store, seeded from the TOML content bank or the built-in seeds.
//!
//! Also the store used by tests.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{DocumentStore, NewChapter, QuestionFilter, QuestionRecord, StoreError, StoreFuture};
use crate::config::ContentBank;
use crate::domain::{Category, Chapter};

#[derive(Clone, Default)]
pub struct MemoryStore {
  categories: Arc<RwLock<Vec<Category>>>,
  chapters: Arc<RwLock<Vec<Chapter>>>,
  questions: Arc<RwLock<Vec<QuestionRecord>>>,
}

impl MemoryStore {
  #[instrument(level = "info", skip_all)]
  pub fn new(bank: ContentBank) -> Self {
    let ContentBank { categories, chapters, mut questions } = bank;

    // Bank entries may omit ids.
    for q in questions.iter_mut() {
      if q.id.is_empty() {
        q.id = Uuid::new_v4().to_string();
      }
    }

    info!(
      target: "nihongo_quiz",
      categories = categories.len(),
      chapters = chapters.len(),
      questions = questions.len(),
      "Memory store inventory"
    );

    Self {
      categories: Arc::new(RwLock::new(categories)),
      chapters: Arc::new(RwLock::new(chapters)),
      questions: Arc::new(RwLock::new(questions)),
    }
  }
}

impl DocumentStore for MemoryStore {
  fn list_categories(&self) -> StoreFuture<'_, Vec<Category>> {
    Box::pin(async move {
      let mut out = self.categories.read().await.clone();
      out.sort_by(|a, b| a.name.cmp(&b.name));
      Ok(out)
    })
  }

  fn list_chapters<'a>(&'a self, category_id: &'a str) -> StoreFuture<'a, Vec<Chapter>> {
    Box::pin(async move {
      let mut out: Vec<Chapter> = self
        .chapters
        .read()
        .await
        .iter()
        .filter(|c| c.category_id == category_id)
        .cloned()
        .collect();
      out.sort_by_key(|c| c.chapter_number);
      Ok(out)
    })
  }

  fn list_questions<'a>(&'a self, filter: &'a QuestionFilter) -> StoreFuture<'a, Vec<QuestionRecord>> {
    Box::pin(async move {
      let mut out: Vec<QuestionRecord> = self
        .questions
        .read()
        .await
        .iter()
        .filter(|q| q.category_id == filter.category_id && filter.chapter.matches(q.chapter_id.as_deref()))
        .cloned()
        .collect();
      out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
      Ok(out)
    })
  }

  fn get_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<QuestionRecord>> {
    Box::pin(async move { Ok(self.questions.read().await.iter().find(|q| q.id == id).cloned()) })
  }

  fn create_chapter(&self, chapter: NewChapter) -> StoreFuture<'_, Chapter> {
    Box::pin(async move {
      let ch = Chapter {
        id: Uuid::new_v4().to_string(),
        category_id: chapter.category_id,
        title: chapter.title,
        chapter_number: chapter.chapter_number,
        created_at: Utc::now(),
      };
      self.chapters.write().await.push(ch.clone());
      Ok(ch)
    })
  }

  fn create_question(&self, mut question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    Box::pin(async move {
      question.id = Uuid::new_v4().to_string();
      question.created_at = Utc::now();
      self.questions.write().await.push(question.clone());
      Ok(question)
    })
  }

  fn update_question(&self, question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    Box::pin(async move {
      let mut questions = self.questions.write().await;
      let existing = questions
        .iter_mut()
        .find(|q| q.id == question.id)
        .ok_or_else(|| StoreError::NotFound { collection: "questions", id: question.id.clone() })?;

      existing.question_text = question.question_text;
      existing.image_url = question.image_url;
      existing.question_type = question.question_type;
      existing.option_a = question.option_a;
      existing.option_b = question.option_b;
      existing.option_c = question.option_c;
      existing.option_d = question.option_d;
      existing.correct_answer = question.correct_answer;
      Ok(existing.clone())
    })
  }

  fn delete_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
    Box::pin(async move {
      let mut questions = self.questions.write().await;
      let before = questions.len();
      questions.retain(|q| q.id != id);
      if questions.len() == before {
        return Err(StoreError::NotFound { collection: "questions", id: id.to_string() });
      }
      Ok(())
    })
  }
}
