//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Field names are camelCase on the wire, matching the stored documents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Category, Chapter, OptionKey, Question, QuestionBody, QuestionType};
use crate::session::{QuizSession, Response, SessionState, Summary};
use crate::store::QuestionRecord;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Start {
        #[serde(rename = "categoryId")]
        category_id: String,
        #[serde(rename = "chapterId", default)]
        chapter_id: Option<String>,
    },
    Answer {
        #[serde(default)]
        option: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    Next,
    Restart,
    Summary,
    /// Drop the current session but keep the socket open.
    Leave,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: Option<SessionView>,
    },
    AnswerResult {
        correct: bool,
        expected: String,
        score: usize,
        session: SessionView,
    },
    Summary {
        summary: Summary,
    },
    Error {
        code: String,
        message: String,
    },
}

//
// Session view shared by WS and HTTP
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionOut {
    pub key: OptionKey,
    pub text: String,
}

/// A question as shown to the learner: never carries the correct answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: String,
    pub question_type: QuestionType,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionOut>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealOut {
    pub correct: bool,
    pub expected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<OptionKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// `loading`, `empty`, `active` or `completed`.
    pub state: &'static str,
    pub category_id: String,
    pub chapter_id: Option<String>,
    pub load_failed: bool,
    /// 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// questionNumber / total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub score: usize,
    pub answered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RevealOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

pub fn question_out(q: &Question) -> QuestionOut {
    let options = match &q.body {
        QuestionBody::MultipleChoice { options, .. } => Some(
            OptionKey::ALL
                .iter()
                .map(|k| OptionOut { key: *k, text: options[k.index()].clone() })
                .collect(),
        ),
        QuestionBody::FreeText { .. } => None,
    };
    QuestionOut {
        id: q.id.clone(),
        question_type: q.body.question_type(),
        question_text: q.question_text.clone(),
        image_url: q.image_url.clone(),
        options,
    }
}

/// Project the session into what the client may see.
pub fn session_view(session_id: Option<Uuid>, s: &QuizSession) -> SessionView {
    let mut view = SessionView {
        session_id,
        state: "loading",
        category_id: s.category().id.clone(),
        chapter_id: s.chapter_id().map(str::to_owned),
        load_failed: false,
        question_number: None,
        total: None,
        progress: None,
        score: 0,
        answered: 0,
        question: None,
        result: None,
        summary: None,
    };

    match s.state() {
        SessionState::Loading => {}
        SessionState::Empty { load_failed } => {
            view.state = "empty";
            view.load_failed = *load_failed;
            view.total = Some(0);
        }
        SessionState::Active { questions, index, score, reveal } => {
            let question = &questions[*index];
            view.state = "active";
            view.question_number = Some(index + 1);
            view.total = Some(questions.len());
            view.progress = Some((index + 1) as f64 / questions.len() as f64);
            view.score = *score;
            view.answered = index + usize::from(reveal.is_some());
            view.question = Some(question_out(question));
            view.result = reveal.as_ref().map(|r| {
                let (selected, input) = match &r.response {
                    Response::Choice(key) => (Some(*key), None),
                    Response::Text(text) => (None, Some(text.clone())),
                };
                RevealOut { correct: r.correct, expected: question.body.expected_answer(), selected, input }
            });
        }
        SessionState::Completed { score, total } => {
            view.state = "completed";
            view.total = Some(*total);
            view.score = *score;
            view.answered = *total;
            view.summary = Some(Summary::new(*score, *total));
        }
    }
    view
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionIn {
    pub category_id: String,
    #[serde(default)]
    pub chapter_id: Option<String>,
}

/// Exactly one of `option` (multiple-choice key) or `text` (free text).
#[derive(Debug, Default, Deserialize)]
pub struct AnswerIn {
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
    pub correct: bool,
    pub expected: String,
    pub score: usize,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListOut {
    pub categories: Vec<Category>,
    pub load_failed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterListOut {
    pub chapters: Vec<Chapter>,
    pub load_failed: bool,
}

//
// Admin DTOs
//

/// Chapter numbers arrive from a text field or as a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterIn {
    pub category_id: String,
    #[serde(default)]
    pub title: String,
    pub chapter_number: NumberOrText,
}

#[derive(Debug, Serialize)]
pub struct ChapterCreatedOut {
    pub chapter: Chapter,
    /// All chapters of the category after the insert.
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIn {
    /// Base64 bytes, optionally as a `data:` URL.
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub mime: String,
}

/// Editable question fields, shared by create and update.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFieldsIn {
    #[serde(default)]
    pub question_text: String,
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
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionIn {
    pub category_id: String,
    #[serde(default)]
    pub chapter_id: Option<String>,
    #[serde(flatten)]
    pub fields: QuestionFieldsIn,
    #[serde(default)]
    pub image: Option<ImageIn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdateIn {
    #[serde(flatten)]
    pub fields: QuestionFieldsIn,
    /// Replaces the current image.
    #[serde(default)]
    pub image: Option<ImageIn>,
    /// Drop the current image when no new one is given.
    #[serde(default)]
    pub remove_image: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuestionQuery {
    pub category_id: String,
    #[serde(default)]
    pub chapter_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuestionOut {
    #[serde(flatten)]
    pub question: QuestionRecord,
    pub category_name: String,
    pub chapter_title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuestionListOut {
    pub questions: Vec<AdminQuestionOut>,
    pub load_failed: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub message: String,
}
