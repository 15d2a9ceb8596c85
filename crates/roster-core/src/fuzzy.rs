//! Fuzzy name similarity and best-candidate selection.
//!
//! Names are folded before comparison: Unicode-decomposed, stripped of
//! combining marks, lowercased, with a few letters that have no decomposition
//! (`ı`, `ß`, `ø`, ...) mapped to ASCII, and whitespace collapsed. The score
//! is the normalized Levenshtein ratio of the folded strings.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{Error, Result};

pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Diacritic- and case-insensitive similarity in `[0, 1]`.
///
/// `1.0` for strings that fold to the same text. Two empty strings are
/// identical; an empty string against a non-empty one scores `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
  let a = fold(a);
  let b = fold(b);
  if a == b {
    return 1.0;
  }
  strsim::normalized_levenshtein(&a, &b)
}

/// Comparison form of a name.
pub fn fold(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut pending_space = false;
  for ch in s.nfd().filter(|&c| !is_combining_mark(c)) {
    if ch.is_whitespace() {
      pending_space = !out.is_empty();
      continue;
    }
    if pending_space {
      out.push(' ');
      pending_space = false;
    }
    match ch {
      'ı' | 'I' => out.push('i'),
      'ß' => out.push_str("ss"),
      'æ' | 'Æ' => out.push_str("ae"),
      'ø' | 'Ø' => out.push('o'),
      'đ' | 'Đ' => out.push('d'),
      'ł' | 'Ł' => out.push('l'),
      _ => out.extend(ch.to_lowercase()),
    }
  }
  out
}

// ─── Matcher ─────────────────────────────────────────────────────────────────

/// A candidate that cleared the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameHit<'a> {
  pub id:    &'a str,
  pub score: f64,
}

/// Selects the most similar candidate name at or above a threshold.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
  threshold: f64,
}

impl Default for FuzzyMatcher {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
    }
  }
}

impl FuzzyMatcher {
  /// `threshold` must lie in `(0, 1]`.
  pub fn new(threshold: f64) -> Result<Self> {
    if !(threshold > 0.0 && threshold <= 1.0) {
      return Err(Error::InvalidConfig(format!(
        "match threshold must be in (0, 1], got {threshold}"
      )));
    }
    Ok(Self { threshold })
  }

  pub fn threshold(&self) -> f64 { self.threshold }

  /// Score `query` against every `(id, name)` pair and return the best.
  ///
  /// Ties go to the earliest candidate. `None` when the best score is below
  /// the threshold or there are no candidates.
  pub fn best_match<'a, I>(&self, query: &str, candidates: I) -> Option<NameHit<'a>>
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let query = fold(query);
    let mut best: Option<NameHit<'a>> = None;

    for (id, name) in candidates {
      let name = fold(name);
      let score = if query == name {
        1.0
      } else {
        strsim::normalized_levenshtein(&query, &name)
      };
      if best.is_none_or(|b| score > b.score) {
        best = Some(NameHit { id, score });
      }
    }

    best.filter(|b| b.score >= self.threshold)
  }
}
