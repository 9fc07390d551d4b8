//! Phonetic keys for fuzzy search over CJK text.
//!
//! Han characters are transliterated to toneless pinyin via the [`pinyin`]
//! crate. Every other character passes through unchanged. Keys are
//! lowercased so that `LIKE` and in-process containment agree.
//!
//! Derivation is pure and deterministic: the same text always yields the same
//! key, and non-text or empty values yield the empty key.

use pinyin::ToPinyin;

use crate::record::Value;

/// Toneless pinyin for every Han character; other characters kept.
///
/// `"北京abc"` → `"beijingabc"`.
pub fn full_key(text: &str) -> String {
  let mut key = String::with_capacity(text.len() * 2);
  for c in text.chars() {
    match c.to_pinyin() {
      Some(p) => key.push_str(p.plain()),
      None => key.extend(c.to_lowercase()),
    }
  }
  key
}

/// First pinyin letter of every Han character; runs of other characters are
/// kept whole.
///
/// `"北京abc"` → `"bjabc"`, `"张三"` → `"zs"`.
pub fn initials_key(text: &str) -> String {
  let mut key = String::with_capacity(text.len());
  for c in text.chars() {
    match c.to_pinyin() {
      Some(p) => {
        if let Some(first) = p.plain().chars().next() {
          key.push(first);
        }
      }
      None => key.extend(c.to_lowercase()),
    }
  }
  key
}

/// The key stored in a derived-index column for `value`.
pub fn value_key(value: &Value) -> String {
  match value {
    Value::Text(s) if !s.trim().is_empty() => initials_key(s),
    _ => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_key_transliterates_han_only() {
    assert_eq!(full_key("北京"), "beijing");
    assert_eq!(full_key("北京ABC-1"), "beijingabc-1");
    assert_eq!(full_key("plain"), "plain");
  }

  #[test]
  fn initials_key_abbreviates_han_only() {
    assert_eq!(initials_key("张三"), "zs");
    assert_eq!(initials_key("北京abc"), "bjabc");
    assert_eq!(initials_key("Hello"), "hello");
  }

  #[test]
  fn keys_are_deterministic() {
    for text in ["中华人民共和国", "mixed 混合 text", ""] {
      assert_eq!(initials_key(text), initials_key(text));
      assert_eq!(full_key(text), full_key(text));
    }
  }

  #[test]
  fn non_text_values_have_empty_key() {
    assert_eq!(value_key(&Value::Null), "");
    assert_eq!(value_key(&Value::Integer(12)), "");
    assert_eq!(value_key(&Value::from("  ")), "");
    assert_eq!(value_key(&Value::from("王五")), "ww");
  }
}
