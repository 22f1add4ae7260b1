//! Built-in content so the app is usable without a content bank or a hosted database.

use chrono::Utc;

use crate::config::ContentBank;
use crate::domain::{Category, Chapter, OptionKey, QuestionBody};
use crate::store::QuestionRecord;

fn category(id: &str, name: &str, slug: &str) -> Category {
  Category { id: id.into(), name: name.into(), slug: slug.into(), created_at: Utc::now() }
}

fn chapter(id: &str, number: u32, title: &str) -> Chapter {
  Chapter {
    id: id.into(),
    category_id: "cat-bunpo".into(),
    title: title.into(),
    chapter_number: number,
    created_at: Utc::now(),
  }
}

fn choice(id: &str, category_id: &str, chapter_id: Option<&str>, text: &str, options: [&str; 4], correct: OptionKey) -> QuestionRecord {
  let body = QuestionBody::MultipleChoice { options: options.map(String::from), correct };
  let mut q = QuestionRecord::new(category_id.into(), chapter_id.map(String::from), text.into(), None, &body);
  q.id = id.into();
  q
}

fn typed(id: &str, category_id: &str, text: &str, answer: &str) -> QuestionRecord {
  let body = QuestionBody::FreeText { correct_text: answer.into() };
  let mut q = QuestionRecord::new(category_id.into(), None, text.into(), None, &body);
  q.id = id.into();
  q
}

/// Three categories, two grammar chapters and a handful of questions of both types.
pub fn seed_bank() -> ContentBank {
  ContentBank {
    categories: vec![
      category("cat-kotoba", "Kotoba", "kotoba"),
      category("cat-bunpo", "Bunpo", "bunpo"),
      category("cat-kanji", "Kanji", "kanji"),
    ],
    chapters: vec![
      chapter("bunpo-1", 1, "Perkenalan Diri"),
      chapter("bunpo-2", 2, "Kata Tunjuk"),
    ],
    questions: vec![
      choice("k1", "cat-kotoba", None, "いぬ artinya?", ["anjing", "kucing", "burung", "ikan"], OptionKey::A),
      choice("k2", "cat-kotoba", None, "みず artinya?", ["api", "air", "angin", "tanah"], OptionKey::B),
      typed("k3", "cat-kotoba", "Tulis romaji untuk ありがとう", "arigatou"),
      typed("k4", "cat-kotoba", "Tulis romaji untuk ねこ", "neko"),
      choice("j1", "cat-kanji", None, "山 dibaca?", ["かわ", "やま", "き", "ひ"], OptionKey::B),
      choice("j2", "cat-kanji", None, "日 artinya?", ["bulan", "api", "matahari", "air"], OptionKey::C),
      typed("j3", "cat-kanji", "Bacaan kun 木 (romaji)", "ki"),
      choice("b1", "cat-bunpo", Some("bunpo-1"), "わたし ___ ミラーです。", ["は", "を", "に", "で"], OptionKey::A),
      choice("b2", "cat-bunpo", Some("bunpo-1"), "あの人 ___ だれですか。", ["を", "に", "は", "へ"], OptionKey::C),
      choice("b3", "cat-bunpo", Some("bunpo-2"), "___ は本です。(benda dekat pembicara)", ["あれ", "それ", "どれ", "これ"], OptionKey::D),
    ],
  }
}
