//! Authoring operations: chapters and questions, with optional images.
//!
//! Every write is validated before anything leaves the process. An image is
//! uploaded before the question is saved; if the upload fails nothing is written.

use std::collections::HashMap;

use tracing::{error, info, instrument, warn};

use crate::domain::{Category, OptionKey, QuestionBody, QuestionType};
use crate::error::{ApiError, ValidationError};
use crate::protocol::{
  AdminQuestionListOut, AdminQuestionOut, AdminQuestionQuery, ChapterCreatedOut, ChapterIn, ImageIn,
  NumberOrText, QuestionFieldsIn, QuestionIn, QuestionUpdateIn,
};
use crate::state::AppState;
use crate::store::{ChapterFilter, NewChapter, QuestionFilter, QuestionRecord, StoreError};
use crate::upload::{ImageUpload, UploadError};

const UNKNOWN_CATEGORY: &str = "Tidak diketahui";
const NO_CHAPTER: &str = "Tidak ada bab";

/// Chapter numbers must be positive whole numbers.
pub fn parse_chapter_number(raw: &NumberOrText) -> Result<u32, ValidationError> {
  let invalid = || ValidationError::new("chapterNumber", "must be a positive whole number");
  let n = match raw {
    NumberOrText::Int(n) => *n,
    NumberOrText::Float(f) if f.fract() == 0.0 => *f as i64,
    NumberOrText::Float(_) => return Err(invalid()),
    NumberOrText::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
  };
  if n < 1 {
    return Err(invalid());
  }
  u32::try_from(n).map_err(|_| invalid())
}

/// Check the editable fields and build the typed body they describe.
pub fn validate_fields(fields: &QuestionFieldsIn) -> Result<QuestionBody, ValidationError> {
  if fields.question_text.trim().is_empty() {
    return Err(ValidationError::new("questionText", "is required"));
  }

  let question_type = match fields.question_type.as_deref().map(str::trim) {
    None | Some("") => QuestionType::MultipleChoice,
    Some(t) => QuestionType::parse(t)
      .ok_or_else(|| ValidationError::new("questionType", "must be multiple-choice or input"))?,
  };

  match question_type {
    QuestionType::MultipleChoice => {
      let option = |field: &'static str, value: &Option<String>| -> Result<String, ValidationError> {
        match value.as_deref().map(str::trim) {
          Some(v) if !v.is_empty() => Ok(v.to_string()),
          _ => Err(ValidationError::new(field, "is required for multiple-choice questions")),
        }
      };
      let options = [
        option("optionA", &fields.option_a)?,
        option("optionB", &fields.option_b)?,
        option("optionC", &fields.option_c)?,
        option("optionD", &fields.option_d)?,
      ];
      let correct = OptionKey::parse(&fields.correct_answer)
        .ok_or_else(|| ValidationError::new("correctAnswer", "must be one of a, b, c, d"))?;
      Ok(QuestionBody::MultipleChoice { options, correct })
    }
    QuestionType::Input => {
      let correct_text = fields.correct_answer.trim();
      if correct_text.is_empty() {
        return Err(ValidationError::new("correctAnswer", "is required"));
      }
      Ok(QuestionBody::FreeText { correct_text: correct_text.to_string() })
    }
  }
}

async fn require_category(state: &AppState, category_id: &str) -> Result<Category, ApiError> {
  state
    .store
    .get_category(category_id)
    .await?
    .ok_or_else(|| ValidationError::new("categoryId", "unknown category").into())
}

/// Decode and upload an image; the durable URL is returned.
async fn upload_image(state: &AppState, image: &ImageIn) -> Result<String, ApiError> {
  let upload = ImageUpload::from_base64(&image.data, image.filename.as_deref(), &image.mime)?;
  let host = state.images.as_ref().ok_or(UploadError::NotConfigured)?;
  Ok(host.upload(upload).await?)
}

#[instrument(level = "info", skip(state, input), fields(category_id = %input.category_id))]
pub async fn create_chapter(state: &AppState, input: ChapterIn) -> Result<ChapterCreatedOut, ApiError> {
  let title = input.title.trim();
  if title.is_empty() {
    return Err(ValidationError::new("title", "is required").into());
  }
  let chapter_number = parse_chapter_number(&input.chapter_number)?;
  let category = require_category(state, &input.category_id).await?;

  let chapter = state
    .store
    .create_chapter(NewChapter { category_id: category.id.clone(), title: title.to_string(), chapter_number })
    .await?;
  info!(target: "admin", id = %chapter.id, category_id = %category.id, chapter_number, "Chapter created");

  let chapters = match state.store.list_chapters(&category.id).await {
    Ok(list) => list,
    Err(e) => {
      warn!(target: "admin", error = %e, "Chapter saved but the chapter list could not be reloaded");
      vec![chapter.clone()]
    }
  };
  Ok(ChapterCreatedOut { chapter, chapters })
}

/// Questions of a category (optionally one chapter), newest first, with display labels.
#[instrument(level = "info", skip(state, query), fields(category_id = %query.category_id, chapter_id = ?query.chapter_id))]
pub async fn list_questions(state: &AppState, query: AdminQuestionQuery) -> AdminQuestionListOut {
  let chapter = match query.chapter_id.as_deref().map(str::trim) {
    Some(id) if !id.is_empty() => ChapterFilter::Equals(id.to_string()),
    _ => ChapterFilter::Any,
  };
  let filter = QuestionFilter { category_id: query.category_id.clone(), chapter };

  let records = match state.store.list_questions(&filter).await {
    Ok(records) => records,
    Err(e) => {
      error!(target: "admin", category_id = %query.category_id, error = %e, "Could not load questions");
      return AdminQuestionListOut { questions: vec![], load_failed: true };
    }
  };

  // Labels are best-effort; a failed lookup falls back to the defaults.
  let category_name = match state.store.get_category(&query.category_id).await {
    Ok(Some(c)) => Some(c.name),
    Ok(None) => None,
    Err(e) => {
      warn!(target: "admin", error = %e, "Could not load category label");
      None
    }
  };
  let chapter_titles: HashMap<String, String> = match state.store.list_chapters(&query.category_id).await {
    Ok(chapters) => chapters.into_iter().map(|c| (c.id, c.title)).collect(),
    Err(e) => {
      warn!(target: "admin", error = %e, "Could not load chapter labels");
      HashMap::new()
    }
  };

  let questions = records
    .into_iter()
    .map(|question| {
      let chapter_title = question
        .chapter_id
        .as_ref()
        .and_then(|id| chapter_titles.get(id))
        .cloned()
        .unwrap_or_else(|| NO_CHAPTER.to_string());
      AdminQuestionOut {
        category_name: category_name.clone().unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
        chapter_title,
        question,
      }
    })
    .collect();
  AdminQuestionListOut { questions, load_failed: false }
}

#[instrument(level = "info", skip(state, input), fields(category_id = %input.category_id, chapter_id = ?input.chapter_id, has_image = input.image.is_some()))]
pub async fn create_question(state: &AppState, input: QuestionIn) -> Result<QuestionRecord, ApiError> {
  let body = validate_fields(&input.fields)?;
  let category = require_category(state, &input.category_id).await?;

  let chapter_id = input.chapter_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
  match &chapter_id {
    Some(id) => {
      let chapters = state.store.list_chapters(&category.id).await?;
      if !chapters.iter().any(|c| &c.id == id) {
        return Err(ValidationError::new("chapterId", "chapter does not belong to this category").into());
      }
    }
    // Grammar quizzes only draw from a chapter, so a chapterless grammar question could never be asked.
    None if category.kind().supports_chapters() => {
      return Err(ValidationError::new("chapterId", "is required for this category").into());
    }
    None => {}
  }

  let image_url = match &input.image {
    Some(image) => Some(upload_image(state, image).await?),
    None => None,
  };

  let record = QuestionRecord::new(
    category.id.clone(),
    chapter_id,
    input.fields.question_text.trim().to_string(),
    image_url,
    &body,
  );
  let saved = state.store.create_question(record).await?;
  info!(target: "admin", id = %saved.id, category_id = %saved.category_id, question_type = %body.question_type(), "Question created");
  Ok(saved)
}

#[instrument(level = "info", skip(state, input), fields(%id, has_image = input.image.is_some(), remove_image = input.remove_image))]
pub async fn update_question(state: &AppState, id: &str, input: QuestionUpdateIn) -> Result<QuestionRecord, ApiError> {
  let body = validate_fields(&input.fields)?;
  let mut record = state
    .store
    .get_question(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("question {id}")))?;

  if let Some(image) = &input.image {
    record.image_url = Some(upload_image(state, image).await?);
  } else if input.remove_image {
    record.image_url = None;
  }
  record.question_text = input.fields.question_text.trim().to_string();
  record.set_body(&body);

  let saved = state.store.update_question(record).await?;
  info!(target: "admin", id = %saved.id, question_type = %body.question_type(), "Question updated");
  Ok(saved)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn delete_question(state: &AppState, id: &str) -> Result<(), ApiError> {
  match state.store.delete_question(id).await {
    Ok(()) => {
      info!(target: "admin", %id, "Question deleted");
      Ok(())
    }
    Err(StoreError::NotFound { .. }) => Err(ApiError::NotFound(format!("question {id}"))),
    Err(e) => Err(e.into()),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{routing::post, Json, Router};
  use serde_json::json;
  use tokio::net::TcpListener;

  use super::*;
  use crate::seeds::seed_bank;
  use crate::store::{DocumentStore as _, MemoryStore};
  use crate::upload::ImageHost;

  fn seeded() -> (AppState, MemoryStore) {
    let store = MemoryStore::new(seed_bank());
    (AppState::with_store(Arc::new(store.clone()), None), store)
  }

  fn mc_fields(text: &str) -> QuestionFieldsIn {
    QuestionFieldsIn {
      question_text: text.into(),
      question_type: Some("multiple-choice".into()),
      option_a: Some("は".into()),
      option_b: Some("を".into()),
      option_c: Some("に".into()),
      option_d: Some("で".into()),
      correct_answer: "a".into(),
    }
  }

  async fn count(store: &MemoryStore, category_id: &str) -> usize {
    let filter = QuestionFilter { category_id: category_id.into(), chapter: ChapterFilter::Any };
    store.list_questions(&filter).await.unwrap().len()
  }

  #[test]
  fn chapter_numbers_must_be_positive_integers() {
    assert_eq!(parse_chapter_number(&NumberOrText::Text(" 3 ".into())), Ok(3));
    assert_eq!(parse_chapter_number(&NumberOrText::Int(12)), Ok(12));
    assert_eq!(parse_chapter_number(&NumberOrText::Float(4.0)), Ok(4));
    for bad in [
      NumberOrText::Text("0".into()),
      NumberOrText::Text("-2".into()),
      NumberOrText::Text("tiga".into()),
      NumberOrText::Text("".into()),
      NumberOrText::Float(1.5),
      NumberOrText::Int(-1),
    ] {
      assert!(parse_chapter_number(&bad).is_err(), "{bad:?} should be rejected");
    }
  }

  #[test]
  fn field_validation() {
    assert!(matches!(validate_fields(&mc_fields("わたし ___ ミラーです。")), Ok(QuestionBody::MultipleChoice { correct: OptionKey::A, .. })));

    let mut blank_option = mc_fields("q");
    blank_option.option_c = Some("  ".into());
    assert_eq!(validate_fields(&blank_option).unwrap_err().field, "optionC");

    let mut bad_key = mc_fields("q");
    bad_key.correct_answer = "e".into();
    assert_eq!(validate_fields(&bad_key).unwrap_err().field, "correctAnswer");

    assert_eq!(validate_fields(&mc_fields(" ")).unwrap_err().field, "questionText");

    let text = QuestionFieldsIn {
      question_text: "ねこ".into(),
      question_type: Some("input".into()),
      correct_answer: " neko ".into(),
      ..Default::default()
    };
    assert_eq!(validate_fields(&text), Ok(QuestionBody::FreeText { correct_text: "neko".into() }));

    let unknown = QuestionFieldsIn { question_type: Some("essay".into()), ..mc_fields("q") };
    assert_eq!(validate_fields(&unknown).unwrap_err().field, "questionType");
  }

  #[tokio::test]
  async fn chapter_create_returns_ordered_list() {
    let (state, _) = seeded();
    let out = create_chapter(
      &state,
      ChapterIn { category_id: "cat-bunpo".into(), title: "Kata Kerja".into(), chapter_number: NumberOrText::Text("3".into()) },
    )
    .await
    .unwrap();
    assert_eq!(out.chapter.chapter_number, 3);
    let numbers: Vec<u32> = out.chapters.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let err = create_chapter(
      &state,
      ChapterIn { category_id: "cat-nope".into(), title: "x".into(), chapter_number: NumberOrText::Int(1) },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
  }

  #[tokio::test]
  async fn chapter_must_belong_to_category() {
    let (state, store) = seeded();
    let before = count(&store, "cat-kotoba").await;
    let input = QuestionIn {
      category_id: "cat-kotoba".into(),
      chapter_id: Some("bunpo-1".into()),
      fields: mc_fields("q"),
      image: None,
    };
    let err = create_question(&state, input).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(ValidationError { field: "chapterId", .. })));
    assert_eq!(count(&store, "cat-kotoba").await, before);

    let no_chapter = QuestionIn { category_id: "cat-bunpo".into(), chapter_id: None, fields: mc_fields("q"), image: None };
    assert!(matches!(create_question(&state, no_chapter).await, Err(ApiError::Validation(_))));
  }

  #[tokio::test]
  async fn failed_upload_writes_nothing() {
    let (state, store) = seeded();
    let before = count(&store, "cat-kanji").await;
    let input = QuestionIn {
      category_id: "cat-kanji".into(),
      chapter_id: None,
      fields: mc_fields("山"),
      image: Some(ImageIn { data: "aGVsbG8=".into(), filename: Some("yama.png".into()), mime: "image/png".into() }),
    };
    let err = create_question(&state, input).await.unwrap_err();
    assert!(matches!(err, ApiError::Upload(UploadError::NotConfigured)));
    assert_eq!(count(&store, "cat-kanji").await, before);
  }

  #[tokio::test]
  async fn create_with_image_stores_the_hosted_url() {
    let app = Router::new().route(
      "/v1_1/demo/image/upload",
      post(|| async { Json(json!({ "secure_url": "https://res.example/yama.png" })) }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });

    let store = MemoryStore::new(seed_bank());
    let host = ImageHost::new(&format!("http://{addr}"), "demo", "unsigned").unwrap();
    let state = AppState::with_store(Arc::new(store.clone()), Some(host));
    let input = QuestionIn {
      category_id: "cat-kanji".into(),
      chapter_id: None,
      fields: mc_fields("山"),
      image: Some(ImageIn { data: "aGVsbG8=".into(), filename: None, mime: "image/png".into() }),
    };
    let saved = create_question(&state, input).await.unwrap();
    assert_eq!(saved.image_url.as_deref(), Some("https://res.example/yama.png"));
    assert!(!saved.id.is_empty());
  }

  #[tokio::test]
  async fn update_switches_type_and_keeps_image_unless_removed() {
    let (state, store) = seeded();
    let mut rec = store.get_question("k1").await.unwrap().unwrap();
    rec.image_url = Some("https://res.example/inu.png".into());
    store.update_question(rec).await.unwrap();

    let fields = QuestionFieldsIn {
      question_text: "いぬ (romaji)".into(),
      question_type: Some("input".into()),
      correct_answer: "inu".into(),
      ..Default::default()
    };
    let saved = update_question(&state, "k1", QuestionUpdateIn { fields, image: None, remove_image: false })
      .await
      .unwrap();
    assert_eq!(saved.question_type.as_deref(), Some("input"));
    assert!(saved.option_a.is_none());
    assert_eq!(saved.image_url.as_deref(), Some("https://res.example/inu.png"));

    let saved = update_question(&state, "k1", QuestionUpdateIn { fields: mc_fields("いぬ"), image: None, remove_image: true })
      .await
      .unwrap();
    assert!(saved.image_url.is_none());
    assert_eq!(saved.correct_answer, "a");

    let missing = update_question(&state, "nope", QuestionUpdateIn { fields: mc_fields("q"), image: None, remove_image: false }).await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
  }

  #[tokio::test]
  async fn listing_is_labelled_and_newest_first() {
    let (state, _) = seeded();
    let input = QuestionIn {
      category_id: "cat-bunpo".into(),
      chapter_id: Some("bunpo-2".into()),
      fields: mc_fields("newest"),
      image: None,
    };
    create_question(&state, input).await.unwrap();

    let out = list_questions(&state, AdminQuestionQuery { category_id: "cat-bunpo".into(), chapter_id: None }).await;
    assert!(!out.load_failed);
    assert_eq!(out.questions.len(), 4);
    assert_eq!(out.questions[0].question.question_text, "newest");
    assert_eq!(out.questions[0].category_name, "Bunpo");
    assert_eq!(out.questions[0].chapter_title, "Kata Tunjuk");

    let out =
      list_questions(&state, AdminQuestionQuery { category_id: "cat-kotoba".into(), chapter_id: None }).await;
    assert!(out.questions.iter().all(|q| q.chapter_title == NO_CHAPTER));

    let out = list_questions(&state, AdminQuestionQuery { category_id: "cat-gone".into(), chapter_id: None }).await;
    assert!(out.questions.is_empty());
  }

  #[tokio::test]
  async fn delete_reports_missing_questions() {
    let (state, store) = seeded();
    delete_question(&state, "j1").await.unwrap();
    assert!(store.get_question("j1").await.unwrap().is_none());
    assert!(matches!(delete_question(&state, "j1").await, Err(ApiError::NotFound(_))));
  }
}
