//! Question pool loading: fetch the eligible questions for a (category, chapter)
//! selection, normalize the stored records, shuffle, and keep at most ten.
//!
//! Chapter policy: a category organized in chapters (grammar) yields nothing
//! without a chapter, and the store is not queried at all. Other categories
//! serve their chapterless questions.

use std::sync::Arc;

use rand::{seq::SliceRandom, Rng};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Category, OptionKey, Question, QuestionBody, QuestionType};
use crate::store::{ChapterFilter, DocumentStore, QuestionFilter, QuestionRecord};

pub const MAX_QUESTIONS_PER_SESSION: usize = 10;

/// Result of one pool load. `load_failed` is set when the store could not be read;
/// the questions are then empty.
#[derive(Clone, Debug, Default)]
pub struct PoolOutcome {
  pub questions: Vec<Question>,
  pub load_failed: bool,
}

#[derive(Clone)]
pub struct QuestionPoolLoader {
  store: Arc<dyn DocumentStore>,
}

impl QuestionPoolLoader {
  pub fn new(store: Arc<dyn DocumentStore>) -> Self {
    Self { store }
  }

  #[instrument(level = "info", skip_all, fields(category_id = %category.id, chapter_id = ?chapter_id))]
  pub async fn load(&self, category: &Category, chapter_id: Option<&str>) -> PoolOutcome {
    let Some(chapter) = chapter_filter(category, chapter_id) else {
      info!(target: "quiz", category_id = %category.id, "Chapter required for this category; empty pool");
      return PoolOutcome::default();
    };

    let filter = QuestionFilter { category_id: category.id.clone(), chapter };
    match self.store.list_questions(&filter).await {
      Ok(records) => {
        let fetched = records.len();
        let questions = sample_pool(normalize_records(records), &mut rand::thread_rng());
        debug!(target: "quiz", fetched, selected = questions.len(), "Question pool ready");
        PoolOutcome { questions, load_failed: false }
      }
      Err(e) => {
        error!(target: "quiz", category_id = %category.id, error = %e, "Could not load questions");
        PoolOutcome { questions: vec![], load_failed: true }
      }
    }
  }
}

/// Store filter for a selection, or None when the selection can never have questions.
pub fn chapter_filter(category: &Category, chapter_id: Option<&str>) -> Option<ChapterFilter> {
  match chapter_id.map(str::trim).filter(|id| !id.is_empty()) {
    Some(id) => Some(ChapterFilter::Equals(id.to_string())),
    None if category.kind().supports_chapters() => None,
    None => Some(ChapterFilter::Null),
  }
}

/// Uniform shuffle, then keep the first `MAX_QUESTIONS_PER_SESSION`.
pub fn sample_pool<R: Rng + ?Sized>(mut questions: Vec<Question>, rng: &mut R) -> Vec<Question> {
  questions.shuffle(rng);
  questions.truncate(MAX_QUESTIONS_PER_SESSION);
  questions
}

pub fn normalize_records(records: Vec<QuestionRecord>) -> Vec<Question> {
  records.into_iter().filter_map(normalize_record).collect()
}

/// Turn a stored record into a typed question. Missing optional fields default;
/// records that cannot be asked at all are skipped.
pub fn normalize_record(rec: QuestionRecord) -> Option<Question> {
  if rec.question_text.trim().is_empty() {
    warn!(target: "quiz", id = %rec.id, "Skipping question without text");
    return None;
  }

  // Rows written before free-text questions existed have no type.
  let question_type = match rec.question_type.as_deref() {
    None | Some("") => QuestionType::MultipleChoice,
    Some(t) => match QuestionType::parse(t) {
      Some(t) => t,
      None => {
        warn!(target: "quiz", id = %rec.id, question_type = %t, "Skipping question of unknown type");
        return None;
      }
    },
  };

  let body = match question_type {
    QuestionType::MultipleChoice => {
      let Some(correct) = OptionKey::parse(&rec.correct_answer) else {
        warn!(target: "quiz", id = %rec.id, "Skipping multiple-choice question with invalid answer key");
        return None;
      };
      QuestionBody::MultipleChoice {
        options: [
          rec.option_a.unwrap_or_default(),
          rec.option_b.unwrap_or_default(),
          rec.option_c.unwrap_or_default(),
          rec.option_d.unwrap_or_default(),
        ],
        correct,
      }
    }
    QuestionType::Input => {
      let correct_text = rec.correct_answer.trim().to_string();
      if correct_text.is_empty() {
        warn!(target: "quiz", id = %rec.id, "Skipping free-text question without an answer");
        return None;
      }
      QuestionBody::FreeText { correct_text }
    }
  };

  Some(Question {
    id: rec.id,
    category_id: rec.category_id,
    chapter_id: rec.chapter_id.filter(|c| !c.is_empty()),
    question_text: rec.question_text,
    image_url: rec.image_url.filter(|u| !u.trim().is_empty()),
    body,
    created_at: rec.created_at,
  })
}
