//! Firestore REST adapter.
//!
//! Reads use `documents:runQuery` with equality / IS_NULL filters; writes use the
//! plain document endpoints. Firestore wraps every field in a typed value
//! (`{"stringValue": ..}`, `{"integerValue": "3"}`, `{"timestampValue": ..}`);
//! decoding is tolerant: a missing timestamp becomes "now" and a document that
//! cannot be decoded is skipped with a warning instead of failing the listing.
//!
//! NOTE: the API key is sent as the `key` query parameter and never logged.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header::USER_AGENT, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use super::{
  ChapterFilter, DocumentStore, NewChapter, QuestionFilter, QuestionRecord, StoreError, StoreFuture,
};
use crate::domain::{Category, Chapter};
use crate::util::trunc_for_log;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Question fields an edit may replace.
const QUESTION_EDIT_FIELDS: [&str; 8] = [
  "questionText",
  "imageUrl",
  "questionType",
  "optionA",
  "optionB",
  "optionC",
  "optionD",
  "correctAnswer",
];

#[derive(Clone)]
pub struct FirestoreStore {
  client: reqwest::Client,
  documents_url: String,
  api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
  name: String,
  #[serde(default)]
  fields: Map<String, Value>,
  #[serde(default)]
  create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
  #[serde(default)]
  document: Option<Document>,
}

impl FirestoreStore {
  /// Construct the adapter if FIRESTORE_PROJECT_ID is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let project_id = std::env::var("FIRESTORE_PROJECT_ID").ok()?;
    let api_key = std::env::var("FIRESTORE_API_KEY").ok();
    let base_url = std::env::var("FIRESTORE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let store = Self::new(&base_url, &project_id, api_key).ok()?;
    info!(target: "nihongo_quiz", %project_id, %base_url, "Firestore store configured");
    Some(store)
  }

  pub fn new(base_url: &str, project_id: &str, api_key: Option<String>) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| StoreError::Transport(e.to_string()))?;
    let documents_url = format!(
      "{}/projects/{}/databases/(default)/documents",
      base_url.trim_end_matches('/'),
      project_id
    );
    Ok(Self { client, documents_url, api_key })
  }

  fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
    let req = req.header(USER_AGENT, "nihongo-quiz-backend/0.1");
    match &self.api_key {
      Some(key) => req.query(&[("key", key.as_str())]),
      None => req,
    }
  }

  /// Send and map non-2xx into `StoreError`. 404 becomes `NotFound` for `collection/id`.
  async fn send(
    &self,
    req: RequestBuilder,
    collection: &'static str,
    id: &str,
  ) -> Result<reqwest::Response, StoreError> {
    let res = self.with_key(req).send().await.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = res.status();
    if status.is_success() {
      return Ok(res);
    }
    if status == StatusCode::NOT_FOUND && !id.is_empty() {
      return Err(StoreError::NotFound { collection, id: id.to_string() });
    }
    let body = res.text().await.unwrap_or_default();
    let message = extract_google_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
    Err(StoreError::Http { status: status.as_u16(), message })
  }

  #[instrument(level = "debug", skip(self, query), fields(%collection))]
  async fn run_query(&self, collection: &'static str, query: Value) -> Result<Vec<Document>, StoreError> {
    let url = format!("{}:runQuery", self.documents_url);
    let res = self.send(self.client.post(&url).json(&query), collection, "").await?;
    let items: Vec<RunQueryItem> =
      res.json().await.map_err(|e| StoreError::Decode { collection, message: e.to_string() })?;
    Ok(items.into_iter().filter_map(|i| i.document).collect())
  }

  async fn read_document(&self, collection: &'static str, id: &str) -> Result<Option<Document>, StoreError> {
    let url = format!("{}/{}/{}", self.documents_url, collection, id);
    match self.send(self.client.get(&url), collection, id).await {
      Ok(res) => {
        let doc = res.json().await.map_err(|e| StoreError::Decode { collection, message: e.to_string() })?;
        Ok(Some(doc))
      }
      Err(StoreError::NotFound { .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

impl DocumentStore for FirestoreStore {
  fn list_categories(&self) -> StoreFuture<'_, Vec<Category>> {
    Box::pin(async move {
      let query = structured_query("categories", vec![], Some("name"));
      let docs = self.run_query("categories", query).await?;
      Ok(decode_all(docs, decode_category))
    })
  }

  fn get_category<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Category>> {
    Box::pin(async move {
      match self.read_document("categories", id).await? {
        Some(doc) => decode_category(doc).map(Some),
        None => Ok(None),
      }
    })
  }

  fn list_chapters<'a>(&'a self, category_id: &'a str) -> StoreFuture<'a, Vec<Chapter>> {
    Box::pin(async move {
      let filters = vec![field_equals("categoryId", string_value(category_id))];
      let query = structured_query("chapters", filters, Some("chapterNumber"));
      let docs = self.run_query("chapters", query).await?;
      Ok(decode_all(docs, decode_chapter))
    })
  }

  fn list_questions<'a>(&'a self, filter: &'a QuestionFilter) -> StoreFuture<'a, Vec<QuestionRecord>> {
    Box::pin(async move {
      let query = question_query(filter);
      let docs = self.run_query("questions", query).await?;
      let mut questions = decode_all(docs, decode_question);
      sort_newest_first(&mut questions);
      Ok(questions)
    })
  }

  fn get_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<QuestionRecord>> {
    Box::pin(async move {
      match self.read_document("questions", id).await? {
        Some(doc) => decode_question(doc).map(Some),
        None => Ok(None),
      }
    })
  }

  fn create_chapter(&self, chapter: NewChapter) -> StoreFuture<'_, Chapter> {
    Box::pin(async move {
      let url = format!("{}/chapters", self.documents_url);
      let body = json!({ "fields": chapter_fields(&chapter, Utc::now()) });
      let res = self.send(self.client.post(&url).json(&body), "chapters", "").await?;
      let doc: Document =
        res.json().await.map_err(|e| StoreError::Decode { collection: "chapters", message: e.to_string() })?;
      decode_chapter(doc)
    })
  }

  fn create_question(&self, mut question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    Box::pin(async move {
      question.created_at = Utc::now();
      let url = format!("{}/questions", self.documents_url);
      let body = json!({ "fields": question_fields(&question) });
      let res = self.send(self.client.post(&url).json(&body), "questions", "").await?;
      let doc: Document =
        res.json().await.map_err(|e| StoreError::Decode { collection: "questions", message: e.to_string() })?;
      decode_question(doc)
    })
  }

  fn update_question(&self, question: QuestionRecord) -> StoreFuture<'_, QuestionRecord> {
    Box::pin(async move {
      let url = format!("{}/questions/{}", self.documents_url, question.id);
      let mut params: Vec<(&str, &str)> =
        QUESTION_EDIT_FIELDS.iter().map(|f| ("updateMask.fieldPaths", *f)).collect();
      params.push(("currentDocument.exists", "true"));

      let mut fields = question_fields(&question);
      fields.retain(|k, _| QUESTION_EDIT_FIELDS.contains(&k.as_str()));
      let body = json!({ "fields": fields });

      let req = self.client.patch(&url).query(&params).json(&body);
      let res = self.send(req, "questions", &question.id).await?;
      let doc: Document =
        res.json().await.map_err(|e| StoreError::Decode { collection: "questions", message: e.to_string() })?;
      decode_question(doc)
    })
  }

  fn delete_question<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
    Box::pin(async move {
      let url = format!("{}/questions/{}", self.documents_url, id);
      let req = self.client.delete(&url).query(&[("currentDocument.exists", "true")]);
      self.send(req, "questions", id).await?;
      Ok(())
    })
  }
}

// --- Query building ---

fn structured_query(collection: &str, filters: Vec<Value>, order_by: Option<&str>) -> Value {
  let mut query = Map::new();
  query.insert("from".into(), json!([{ "collectionId": collection }]));

  let mut filters = filters;
  match filters.len() {
    0 => {}
    1 => {
      query.insert("where".into(), filters.remove(0));
    }
    _ => {
      query.insert("where".into(), json!({ "compositeFilter": { "op": "AND", "filters": filters } }));
    }
  }

  if let Some(field) = order_by {
    query.insert("orderBy".into(), json!([{ "field": { "fieldPath": field }, "direction": "ASCENDING" }]));
  }

  json!({ "structuredQuery": Value::Object(query) })
}

fn question_query(filter: &QuestionFilter) -> Value {
  let mut filters = vec![field_equals("categoryId", string_value(&filter.category_id))];
  match &filter.chapter {
    ChapterFilter::Any => {}
    ChapterFilter::Null => filters.push(json!({
      "unaryFilter": { "op": "IS_NULL", "field": { "fieldPath": "chapterId" } }
    })),
    ChapterFilter::Equals(id) => filters.push(field_equals("chapterId", string_value(id))),
  }
  // Equality / null filters only; ordering happens after decoding.
  structured_query("questions", filters, None)
}

fn sort_newest_first(questions: &mut [QuestionRecord]) {
  questions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn field_equals(path: &str, value: Value) -> Value {
  json!({ "fieldFilter": { "field": { "fieldPath": path }, "op": "EQUAL", "value": value } })
}

// --- Value encoding ---

fn string_value(s: &str) -> Value {
  json!({ "stringValue": s })
}

fn optional_string_value(s: Option<&str>) -> Value {
  match s {
    Some(s) => string_value(s),
    None => json!({ "nullValue": null }),
  }
}

fn timestamp_value(t: DateTime<Utc>) -> Value {
  json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

fn chapter_fields(chapter: &NewChapter, created_at: DateTime<Utc>) -> Map<String, Value> {
  let mut m = Map::new();
  m.insert("categoryId".into(), string_value(&chapter.category_id));
  m.insert("title".into(), string_value(&chapter.title));
  m.insert("chapterNumber".into(), json!({ "integerValue": chapter.chapter_number.to_string() }));
  m.insert("createdAt".into(), timestamp_value(created_at));
  m
}

fn question_fields(q: &QuestionRecord) -> Map<String, Value> {
  let mut m = Map::new();
  m.insert("categoryId".into(), string_value(&q.category_id));
  m.insert("chapterId".into(), optional_string_value(q.chapter_id.as_deref()));
  m.insert("questionText".into(), string_value(&q.question_text));
  m.insert("imageUrl".into(), optional_string_value(q.image_url.as_deref()));
  m.insert("questionType".into(), optional_string_value(q.question_type.as_deref()));
  m.insert("optionA".into(), optional_string_value(q.option_a.as_deref()));
  m.insert("optionB".into(), optional_string_value(q.option_b.as_deref()));
  m.insert("optionC".into(), optional_string_value(q.option_c.as_deref()));
  m.insert("optionD".into(), optional_string_value(q.option_d.as_deref()));
  m.insert("correctAnswer".into(), string_value(&q.correct_answer));
  m.insert("createdAt".into(), timestamp_value(q.created_at));
  m
}

// --- Value decoding ---

fn doc_id(name: &str) -> String {
  name.rsplit('/').next().unwrap_or(name).to_string()
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
  fields.get(key)?.get("stringValue")?.as_str().map(str::to_owned)
}

fn int_field(fields: &Map<String, Value>, key: &str) -> Option<i64> {
  let v = fields.get(key)?;
  if let Some(s) = v.get("integerValue").and_then(Value::as_str) {
    return s.parse().ok();
  }
  v.get("doubleValue").and_then(Value::as_f64).map(|f| f as i64)
}

fn time_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
  let s = fields.get(key)?.get("timestampValue")?.as_str()?;
  DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// `createdAt` field, then the document create time, then now.
fn created_at(doc: &Document) -> DateTime<Utc> {
  time_field(&doc.fields, "createdAt")
    .or_else(|| {
      doc
        .create_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
    })
    .unwrap_or_else(Utc::now)
}

fn decode_all<T>(docs: Vec<Document>, decode: fn(Document) -> Result<T, StoreError>) -> Vec<T> {
  docs
    .into_iter()
    .filter_map(|doc| match decode(doc) {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(target: "nihongo_quiz", error = %e, "Skipping undecodable document");
        None
      }
    })
    .collect()
}

fn decode_category(doc: Document) -> Result<Category, StoreError> {
  Ok(Category {
    id: doc_id(&doc.name),
    name: string_field(&doc.fields, "name").unwrap_or_default(),
    slug: string_field(&doc.fields, "slug").unwrap_or_default(),
    created_at: created_at(&doc),
  })
}

fn decode_chapter(doc: Document) -> Result<Chapter, StoreError> {
  let id = doc_id(&doc.name);
  let category_id = string_field(&doc.fields, "categoryId").ok_or_else(|| StoreError::Decode {
    collection: "chapters",
    message: format!("{id}: missing categoryId"),
  })?;
  let chapter_number = int_field(&doc.fields, "chapterNumber")
    .and_then(|n| u32::try_from(n).ok())
    .filter(|n| *n >= 1)
    .ok_or_else(|| StoreError::Decode {
      collection: "chapters",
      message: format!("{id}: chapterNumber must be a positive integer"),
    })?;
  Ok(Chapter {
    title: string_field(&doc.fields, "title").unwrap_or_default(),
    created_at: created_at(&doc),
    id,
    category_id,
    chapter_number,
  })
}

fn decode_question(doc: Document) -> Result<QuestionRecord, StoreError> {
  let id = doc_id(&doc.name);
  let f = &doc.fields;
  let category_id = string_field(f, "categoryId").ok_or_else(|| StoreError::Decode {
    collection: "questions",
    message: format!("{id}: missing categoryId"),
  })?;
  Ok(QuestionRecord {
    chapter_id: string_field(f, "chapterId").filter(|s| !s.is_empty()),
    question_text: string_field(f, "questionText").unwrap_or_default(),
    image_url: string_field(f, "imageUrl"),
    question_type: string_field(f, "questionType"),
    option_a: string_field(f, "optionA"),
    option_b: string_field(f, "optionB"),
    option_c: string_field(f, "optionC"),
    option_d: string_field(f, "optionD"),
    correct_answer: string_field(f, "correctAnswer").unwrap_or_default(),
    created_at: created_at(&doc),
    id,
    category_id,
  })
}

/// Try to extract a clean error message from a Google API error body.
fn extract_google_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
