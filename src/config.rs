//! Runtime configuration: store backend selection and the optional TOML content bank.
//!
//! The content bank seeds the in-memory store. Keys follow the document field
//! names used by the hosted database:
//!
//! ```toml
//! [[categories]]
//! id = "cat-bunpo"
//! name = "Bunpo"
//! slug = "bunpo"
//!
//! [[chapters]]
//! id = "bunpo-1"
//! categoryId = "cat-bunpo"
//! title = "Perkenalan Diri"
//! chapterNumber = 1
//!
//! [[questions]]
//! categoryId = "cat-bunpo"
//! chapterId = "bunpo-1"
//! questionText = "わたし ___ ミラーです。"
//! questionType = "multiple-choice"
//! optionA = "は"
//! optionB = "を"
//! optionC = "に"
//! optionD = "で"
//! correctAnswer = "a"
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Category, Chapter};
use crate::store::QuestionRecord;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ContentBank {
  #[serde(default)]
  pub categories: Vec<Category>,
  #[serde(default)]
  pub chapters: Vec<Chapter>,
  #[serde(default)]
  pub questions: Vec<QuestionRecord>,
}

/// Which document store backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
  Memory,
  Firestore,
}

/// QUIZ_STORE=firestore selects the Firestore adapter; anything else keeps the memory store.
pub fn store_backend_from_env() -> StoreBackend {
  match std::env::var("QUIZ_STORE").as_deref().map(str::trim) {
    Ok("firestore") => StoreBackend::Firestore,
    Ok("memory") | Err(_) => StoreBackend::Memory,
    Ok(other) => {
      warn!(target: "nihongo_quiz", backend = %other, "Unknown QUIZ_STORE; using memory store");
      StoreBackend::Memory
    }
  }
}

/// Attempt to load the content bank from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
/// Idle HTTP sessions live this long without a request.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// SESSION_IDLE_SECS as a positive number of seconds, else the default.
pub fn session_idle_from_env() -> Duration {
  parse_session_idle(std::env::var("SESSION_IDLE_SECS").ok().as_deref())
}

fn parse_session_idle(raw: Option<&str>) -> Duration {
  let secs = match raw.map(str::trim) {
    None => DEFAULT_SESSION_IDLE_SECS,
    Some(s) => match s.parse::<u64>() {
      Ok(n) if n > 0 => n,
      _ => {
        warn!(target: "nihongo_quiz", value = %s, "Invalid SESSION_IDLE_SECS; using default");
        DEFAULT_SESSION_IDLE_SECS
      }
    },
  };
  Duration::from_secs(secs)
}

pub fn load_content_bank_from_env() -> Option<ContentBank> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_content_bank(&s) {
      Ok(bank) => {
        info!(target: "nihongo_quiz", %path, "Loaded content bank (TOML)");
        Some(bank)
      }
      Err(e) => {
        error!(target: "nihongo_quiz", %path, error = %e, "Failed to parse TOML content bank");
        None
      }
    },
    Err(e) => {
      error!(target: "nihongo_quiz", %path, error = %e, "Failed to read TOML content bank");
      None
    }
  }
}

pub fn parse_content_bank(s: &str) -> Result<ContentBank, toml::de::Error> {
  toml::from_str::<ContentBank>(s)
}
