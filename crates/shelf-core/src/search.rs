//! Search heuristics shared by every backend.
//!
//! Two strategies answer the same keyword query. Which one runs is a pure
//! function of record volume and the derived-index state, so it can be tested
//! without building a large store. Strategy choice changes cost, never the
//! set of substring matches.

use serde::Serialize;

use crate::phonetic;

/// How a keyword query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
  /// `LIKE` over source columns for the literal keyword and its phonetic
  /// keys, plus an in-process initials check over all records for
  /// initials-like keywords.
  Scan,
  /// `LIKE` over source columns, with initials-like keywords matched against
  /// the derived shadow columns instead of recomputing keys per row.
  Index,
}

/// Choose a strategy for a store holding `record_count` records.
pub fn select_strategy(
  record_count: usize,
  small_threshold: usize,
  derived_enabled: bool,
) -> SearchStrategy {
  if record_count <= small_threshold || !derived_enabled {
    SearchStrategy::Scan
  } else {
    SearchStrategy::Index
  }
}

/// Escape `%`, `_` and `\` and wrap in wildcards, for use with
/// `LIKE ? ESCAPE '\'`.
pub fn like_pattern(text: &str) -> String {
  let mut pattern = String::with_capacity(text.len() + 2);
  pattern.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

/// A keyword and the phonetic variants derived from it, computed once per
/// query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordVariants {
  pub literal:        String,
  /// Full-pinyin key, if it differs from the literal.
  pub full:           Option<String>,
  /// Initials key, if it differs from the literal.
  pub initials:       Option<String>,
  /// The keyword looks like a pinyin abbreviation (e.g. `"zs"` for "张三").
  pub initials_query: bool,
}

impl KeywordVariants {
  pub fn analyze(keyword: &str) -> Self {
    let literal = keyword.trim().to_owned();
    let distinct = |key: String| (!key.is_empty() && key != literal).then_some(key);

    Self {
      full:           distinct(phonetic::full_key(&literal)),
      initials:       distinct(phonetic::initials_key(&literal)),
      initials_query: looks_like_initials(&literal),
      literal,
    }
  }

  /// Literal, full and initials variants, deduplicated, in that order.
  pub fn variants(&self) -> Vec<&str> {
    let mut out: Vec<&str> = vec![self.literal.as_str()];
    for v in [self.full.as_deref(), self.initials.as_deref()].into_iter().flatten() {
      if !out.contains(&v) {
        out.push(v);
      }
    }
    out
  }

  /// `LIKE` patterns for [`Self::variants`].
  pub fn like_patterns(&self) -> Vec<String> {
    self.variants().into_iter().map(like_pattern).collect()
  }

  /// The needle compared against initials keys.
  pub fn initials_needle(&self) -> String { self.literal.to_lowercase() }

  /// In-process initials check: does the initials key of any of `texts`
  /// contain the keyword?
  pub fn matches_initials<'r>(&self, texts: impl IntoIterator<Item = &'r str>) -> bool {
    let needle = self.initials_needle();
    texts
      .into_iter()
      .any(|text| phonetic::initials_key(text).contains(&needle))
  }
}

/// Short, purely alphabetic, vowel-free keywords are ambiguous between
/// literal text and a pinyin abbreviation.
pub fn looks_like_initials(keyword: &str) -> bool {
  let len = keyword.chars().count();
  (2..=6).contains(&len)
    && keyword.chars().all(|c| c.is_ascii_alphabetic())
    && !keyword
      .chars()
      .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::{Record, RecordId, Value};

  #[test]
  fn strategy_follows_volume_and_index_state() {
    assert_eq!(select_strategy(0, 100, true), SearchStrategy::Scan);
    assert_eq!(select_strategy(100, 100, true), SearchStrategy::Scan);
    assert_eq!(select_strategy(101, 100, true), SearchStrategy::Index);
    assert_eq!(select_strategy(10_000, 100, false), SearchStrategy::Scan);
    assert_eq!(select_strategy(3, 2, true), SearchStrategy::Index);
  }

  #[test]
  fn like_metacharacters_are_escaped() {
    assert_eq!(like_pattern("50%"), "%50\\%%");
    assert_eq!(like_pattern("a_b"), "%a\\_b%");
    assert_eq!(like_pattern("c:\\x"), "%c:\\\\x%");
  }

  #[test]
  fn han_keyword_yields_phonetic_variants() {
    let kw = KeywordVariants::analyze("北京");
    assert_eq!(kw.full.as_deref(), Some("beijing"));
    assert_eq!(kw.initials.as_deref(), Some("bj"));
    assert_eq!(kw.variants(), ["北京", "beijing", "bj"]);
    assert!(!kw.initials_query);
  }

  #[test]
  fn ascii_keyword_has_only_literal_variant() {
    let kw = KeywordVariants::analyze("widget");
    assert_eq!(kw.full, None);
    assert_eq!(kw.initials, None);
    assert_eq!(kw.variants(), ["widget"]);
  }

  #[test]
  fn uppercase_keyword_keeps_lowercase_variant() {
    let kw = KeywordVariants::analyze("ZS");
    assert_eq!(kw.variants(), ["ZS", "zs"]);
    assert!(kw.initials_query);
  }

  #[test]
  fn initials_detection() {
    assert!(looks_like_initials("zs"));
    assert!(looks_like_initials("BJDX"));
    assert!(!looks_like_initials("z"));
    assert!(!looks_like_initials("bcdfghj"));
    assert!(!looks_like_initials("zhang"));
    assert!(!looks_like_initials("z1"));
    assert!(!looks_like_initials("张三"));
  }

  #[test]
  fn matches_initials_of_text_values() {
    let record = Record {
      id:     RecordId(1),
      values: vec![
        ("name".into(), Value::from("张三丰")),
        ("qty".into(), Value::Integer(3)),
      ],
    };
    assert!(KeywordVariants::analyze("zsf").matches_initials(record.text_values()));
    assert!(KeywordVariants::analyze("SF").matches_initials(record.text_values()));
    assert!(!KeywordVariants::analyze("ww").matches_initials(record.text_values()));
  }
}
