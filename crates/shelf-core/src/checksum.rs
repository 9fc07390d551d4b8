//! 13-digit check-digit validation (EAN-13) for `CHECKSUMMED_13` columns.

/// Number of digits in a checksummed code, check digit included.
pub const CODE_LEN: usize = 13;

/// Compute the check digit for the first twelve digits of a code.
///
/// Digits at even indices weigh 1, odd indices weigh 3. Returns `None` if the
/// input is not exactly twelve ASCII digits.
pub fn check_digit(payload: &str) -> Option<u8> {
  if payload.len() != CODE_LEN - 1 || !payload.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let sum: u32 = payload
    .bytes()
    .enumerate()
    .map(|(i, b)| {
      let digit = u32::from(b - b'0');
      if i % 2 == 0 { digit } else { digit * 3 }
    })
    .sum();
  Some(((10 - sum % 10) % 10) as u8)
}

/// `true` iff `code` is thirteen ASCII digits ending in the correct check
/// digit.
pub fn is_valid(code: &str) -> bool {
  if code.len() != CODE_LEN || !code.is_ascii() {
    return false;
  }
  let (payload, last) = code.split_at(CODE_LEN - 1);
  match (check_digit(payload), last.bytes().next()) {
    (Some(expected), Some(b)) if b.is_ascii_digit() => b - b'0' == expected,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_codes() {
    assert!(is_valid("4006381333931"));
    assert!(is_valid("9780201379624"));
    assert!(is_valid("6901234567892"));
  }

  #[test]
  fn tampered_last_digit_always_fails() {
    for code in ["4006381333931", "9780201379624", "6901234567892"] {
      let (payload, last) = code.split_at(12);
      let good = last.parse::<u8>().unwrap();
      for d in (0..10u8).filter(|d| *d != good) {
        let tampered = format!("{payload}{d}");
        assert!(!is_valid(&tampered), "{tampered} should fail");
      }
    }
  }

  #[test]
  fn computed_check_digit_always_passes() {
    for payload in ["000000000000", "123456789012", "999999999999", "690123456789"] {
      let digit = check_digit(payload).unwrap();
      assert!(is_valid(&format!("{payload}{digit}")));
    }
  }

  #[test]
  fn rejects_wrong_shape() {
    assert!(!is_valid(""));
    assert!(!is_valid("400638133393"));
    assert!(!is_valid("40063813339310"));
    assert!(!is_valid("40063813339a1"));
    assert!(!is_valid("４００６３８１３３３９３１"));
    assert_eq!(check_digit("12345678901a"), None);
  }
}
