//! Phone-number canonicalisation to E.164 (`+<country code><number>`).
//!
//! Two numbers refer to the same line exactly when their normalized forms are
//! equal as strings. Normalization is idempotent.

use crate::{Error, NormalizationError, Result};

/// Shortest plausible number, counting country code digits.
const MIN_DIGITS: usize = 7;
/// E.164 upper bound.
const MAX_DIGITS: usize = 15;

/// Canonicalises raw phone strings against a default country.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
  country_code: String,
}

impl PhoneNormalizer {
  /// `country_code` is the calling code without `+` (e.g. `"90"`).
  pub fn new(country_code: impl Into<String>) -> Result<Self> {
    let country_code = country_code.into();
    let valid = (1..=3).contains(&country_code.len())
      && country_code.chars().all(|c| c.is_ascii_digit())
      && !country_code.starts_with('0');
    if !valid {
      return Err(Error::InvalidConfig(format!(
        "default country code must be 1-3 digits without a leading zero, got {country_code:?}"
      )));
    }
    Ok(Self { country_code })
  }

  pub fn country_code(&self) -> &str { &self.country_code }

  /// Normalize `raw` into E.164.
  ///
  /// Separators (whitespace, parentheses, dashes) are dropped first. Then:
  ///
  /// | Input starts with | Result |
  /// |-------------------|--------|
  /// | `+` or `00`       | kept as an international number |
  /// | `0`               | trunk prefix replaced by `+<cc>` |
  /// | `<cc>`            | `+` prepended |
  /// | anything else     | national number, `+<cc>` prepended |
  pub fn normalize(&self, raw: &str) -> Result<String, NormalizationError> {
    let stripped: String = raw
      .chars()
      .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-'))
      .collect();
    if stripped.is_empty() {
      return Err(NormalizationError::Empty);
    }

    let (international, digits) = if let Some(rest) = stripped.strip_prefix('+') {
      (true, rest)
    } else if let Some(rest) = stripped.strip_prefix("00") {
      (true, rest)
    } else {
      (false, stripped.as_str())
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
      return Err(NormalizationError::InvalidCharacter);
    }

    let full = if international {
      digits.to_owned()
    } else if let Some(national) = digits.strip_prefix('0') {
      format!("{}{national}", self.country_code)
    } else if digits.starts_with(&self.country_code) {
      digits.to_owned()
    } else {
      format!("{}{digits}", self.country_code)
    };

    let count = full.len();
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&count) {
      return Err(NormalizationError::DigitCount { count });
    }

    Ok(format!("+{full}"))
  }
}
