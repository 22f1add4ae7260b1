//! Domain models: categories, chapters, questions and the answer keys they are scored against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which subject area a category covers. Derived from the category slug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryKind {
  /// Vocabulary.
  Kotoba,
  /// Grammar, split into numbered chapters.
  Bunpo,
  Kanji,
  Other,
}

impl CategoryKind {
  pub fn from_slug(slug: &str) -> Self {
    match slug.trim() {
      "kotoba" => CategoryKind::Kotoba,
      "bunpo" => CategoryKind::Bunpo,
      "kanji" => CategoryKind::Kanji,
      _ => CategoryKind::Other,
    }
  }

  /// Only grammar content is organized in chapters; a grammar quiz needs one.
  pub fn supports_chapters(self) -> bool {
    matches!(self, CategoryKind::Bunpo)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: String,
  pub name: String,
  pub slug: String,
  #[serde(default = "Utc::now")]
  pub created_at: DateTime<Utc>,
}

impl Category {
  pub fn kind(&self) -> CategoryKind {
    CategoryKind::from_slug(&self.slug)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub id: String,
  pub category_id: String,
  pub title: String,
  /// Positive, used for ordering.
  pub chapter_number: u32,
  #[serde(default = "Utc::now")]
  pub created_at: DateTime<Utc>,
}

/// Multiple-choice answer key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKey {
  A,
  B,
  C,
  D,
}

impl OptionKey {
  pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

  /// Accepts `a`..`d` in either case, ignoring surrounding whitespace.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim() {
      "a" | "A" => Some(OptionKey::A),
      "b" | "B" => Some(OptionKey::B),
      "c" | "C" => Some(OptionKey::C),
      "d" | "D" => Some(OptionKey::D),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OptionKey::A => "a",
      OptionKey::B => "b",
      OptionKey::C => "c",
      OptionKey::D => "d",
    }
  }

  pub fn index(self) -> usize {
    match self {
      OptionKey::A => 0,
      OptionKey::B => 1,
      OptionKey::C => 2,
      OptionKey::D => 3,
    }
  }
}

impl std::fmt::Display for OptionKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Discriminator stored alongside each question document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
  #[default]
  #[serde(rename = "multiple-choice")]
  MultipleChoice,
  /// Free-text answer typed by the learner.
  #[serde(rename = "input")]
  Input,
}

impl QuestionType {
  pub fn as_str(self) -> &'static str {
    match self {
      QuestionType::MultipleChoice => "multiple-choice",
      QuestionType::Input => "input",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim() {
      "multiple-choice" => Some(QuestionType::MultipleChoice),
      "input" => Some(QuestionType::Input),
      _ => None,
    }
  }
}

impl std::fmt::Display for QuestionType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What the learner answers and what it is checked against.
#[derive(Clone, Debug, PartialEq)]
pub enum QuestionBody {
  MultipleChoice { options: [String; 4], correct: OptionKey },
  FreeText { correct_text: String },
}

impl QuestionBody {
  pub fn question_type(&self) -> QuestionType {
    match self {
      QuestionBody::MultipleChoice { .. } => QuestionType::MultipleChoice,
      QuestionBody::FreeText { .. } => QuestionType::Input,
    }
  }

  /// The stored correct answer as shown after reveal: an option key or the expected text.
  pub fn expected_answer(&self) -> String {
    match self {
      QuestionBody::MultipleChoice { correct, .. } => correct.as_str().to_string(),
      QuestionBody::FreeText { correct_text } => correct_text.clone(),
    }
  }
}

/// A question ready to be asked in a session.
#[derive(Clone, Debug, PartialEq)]
pub struct Question {
  pub id: String,
  pub category_id: String,
  pub chapter_id: Option<String>,
  pub question_text: String,
  pub image_url: Option<String>,
  pub body: QuestionBody,
  pub created_at: DateTime<Utc>,
}
