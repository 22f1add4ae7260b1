//! Small utility helpers used across modules.

/// Canonical form of a typed answer: surrounding whitespace trimmed, lower-cased.
pub fn normalize_answer(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_ignores_case_and_outer_spaces() {
    assert_eq!(normalize_answer(" Neko "), "neko");
    assert_eq!(normalize_answer("ARIGATOU\n"), "arigatou");
    assert_eq!(normalize_answer("o genki"), "o genki");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let s = "ありがとう";
    let t = trunc_for_log(s, 4);
    assert!(t.starts_with("あ…"));
    assert!(t.ends_with("(15 bytes total)"));
  }
}
