//! Candidate person names pulled out of free-form text.
//!
//! The heuristic is purely lexical:
//!
//! 1. Words are maximal runs of letters (combining marks stay attached).
//!    Everything else separates words.
//! 2. A word is a *name token* when it has at least two letters, the first is
//!    uppercase and every other letter is lowercase. Accented and
//!    locale-specific letters (`Ç`, `ğ`, `İ`, `ı`, ...) count as letters.
//! 3. Consecutive name tokens separated only by whitespace form a run. Any
//!    non-name word, or a separator containing anything other than whitespace
//!    (punctuation, digits), ends the run. A capitalized greeting stays in the
//!    run ("Merhaba Ahmet Yılmaz"); the resolver retries shorter suffixes.
//! 4. Runs of 2 to 4 tokens are yielded, joined by single spaces, in order of
//!    appearance. Shorter and longer runs are dropped.
//!
//! Text without capitalized runs yields nothing; there is no lowercase
//! fallback.

use unicode_normalization::char::is_combining_mark;

const MIN_RUN: usize = 2;
const MAX_RUN: usize = 4;
const MIN_TOKEN_LETTERS: usize = 2;

/// Lazily scan `text` for candidate names. See the module docs for the rules.
pub fn extract_name_candidates(text: &str) -> NameCandidates<'_> {
  NameCandidates { text, pos: 0 }
}

/// Iterator returned by [`extract_name_candidates`].
#[derive(Debug, Clone)]
pub struct NameCandidates<'a> {
  text: &'a str,
  /// Byte offset just past the last consumed word.
  pos:  usize,
}

impl<'a> NameCandidates<'a> {
  /// Byte range of the next word at or after `from`.
  fn next_word(&self, from: usize) -> Option<(usize, usize)> {
    let rest = &self.text[from..];
    let (offset, _) = rest.char_indices().find(|&(_, c)| is_word_char(c))?;
    let start = from + offset;
    let end = self.text[start..]
      .char_indices()
      .find(|&(_, c)| !is_word_char(c))
      .map_or(self.text.len(), |(i, _)| start + i);
    Some((start, end))
  }
}

impl Iterator for NameCandidates<'_> {
  type Item = String;

  fn next(&mut self) -> Option<String> {
    let mut run: Vec<&str> = Vec::with_capacity(MAX_RUN + 1);

    loop {
      let Some((start, end)) = self.next_word(self.pos) else {
        self.pos = self.text.len();
        return accepted(&run);
      };

      let separator = &self.text[self.pos..start];
      if !run.is_empty() && !separator.chars().all(char::is_whitespace) {
        if let Some(candidate) = accepted(&run) {
          // Leave the current word unconsumed for the next call.
          self.pos = start;
          return Some(candidate);
        }
        run.clear();
      }

      let word = &self.text[start..end];
      self.pos = end;

      if is_name_token(word) {
        run.push(word);
      } else if !run.is_empty() {
        if let Some(candidate) = accepted(&run) {
          return Some(candidate);
        }
        run.clear();
      }
    }
  }
}

fn is_word_char(c: char) -> bool { c.is_alphabetic() || is_combining_mark(c) }

fn is_name_token(word: &str) -> bool {
  let mut letters = word.chars().filter(|&c| !is_combining_mark(c));
  let Some(first) = letters.next() else {
    return false;
  };
  let mut count = 1;
  for c in letters {
    if !c.is_lowercase() {
      return false;
    }
    count += 1;
  }
  first.is_uppercase() && count >= MIN_TOKEN_LETTERS
}

fn accepted(run: &[&str]) -> Option<String> {
  (MIN_RUN..=MAX_RUN)
    .contains(&run.len())
    .then(|| run.join(" "))
}
