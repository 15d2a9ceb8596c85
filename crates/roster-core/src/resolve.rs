//! [`PersonResolver`] picks the person a chat message is about.
//!
//! Matching runs in strict priority order and stops at the first hit:
//!
//! 1. phone hint, exact match on normalized numbers;
//! 2. name hint, fuzzy match against `full_name`, then `preferred_name`;
//! 3. names extracted from the message, each tried like a name hint; when a
//!    phrase misses, its trailing sub-phrases of two or more words are tried
//!    too, so a capitalized greeting ("Merhaba Ahmet Yılmaz") still matches;
//! 4. otherwise [`ResolutionResult::NotFound`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Result, SourceError,
  cache::CachedRepository,
  config::EngineConfig,
  extract::extract_name_candidates,
  fuzzy::FuzzyMatcher,
  person::{PersonRecord, PersonSnapshot},
  phone::PhoneNormalizer,
  source::DataSource,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// Optional caller-supplied hints about who is writing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hint {
  pub phone:  Option<String>,
  pub name:   Option<String>,
  /// Preferred response locale; does not affect matching.
  pub locale: Option<String>,
}

impl Hint {
  fn usable_phone(&self) -> Option<&str> { non_blank(self.phone.as_deref()) }

  fn usable_name(&self) -> Option<&str> { non_blank(self.name.as_deref()) }
}

/// Which signal produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedVia {
  Phone,
  FullName,
  PreferredName,
  ExtractedName,
}

/// A scored reference to a record in the snapshot being searched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
  pub person_id:   String,
  pub score:       f64,
  pub matched_via: MatchedVia,
}

/// Outcome of [`PersonResolver::resolve`]. `NotFound` is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResult {
  Found {
    person:      PersonRecord,
    matched_via: MatchedVia,
    score:       f64,
  },
  NotFound,
}

impl ResolutionResult {
  pub fn person(&self) -> Option<&PersonRecord> {
    match self {
      Self::Found { person, .. } => Some(person),
      Self::NotFound => None,
    }
  }

  pub fn is_found(&self) -> bool { matches!(self, Self::Found { .. }) }

  /// Locale to answer in: the hint's, else the found record's, else
  /// `default`.
  pub fn locale_for<'a>(&'a self, hint: &'a Hint, default: &'a str) -> &'a str {
    non_blank(hint.locale.as_deref())
      .or_else(|| self.person().and_then(|p| non_blank(Some(p.locale.as_str()))))
      .unwrap_or(default)
  }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves messages to people using a cached snapshot.
///
/// Cloning is cheap; clones share the cache.
pub struct PersonResolver<S> {
  repository:     CachedRepository<S>,
  phones:         PhoneNormalizer,
  matcher:        FuzzyMatcher,
  default_locale: String,
}

impl<S> Clone for PersonResolver<S> {
  fn clone(&self) -> Self {
    Self {
      repository:     self.repository.clone(),
      phones:         self.phones.clone(),
      matcher:        self.matcher,
      default_locale: self.default_locale.clone(),
    }
  }
}

impl<S> PersonResolver<S>
where
  S: DataSource + 'static,
{
  /// Build a resolver over `repository` using the matching settings in
  /// `config`.
  pub fn new(repository: CachedRepository<S>, config: &EngineConfig) -> Result<Self> {
    Ok(Self::from_parts(
      repository,
      config.phone_normalizer()?,
      config.fuzzy_matcher()?,
      config.default_locale.clone(),
    ))
  }

  pub fn from_parts(
    repository: CachedRepository<S>,
    phones: PhoneNormalizer,
    matcher: FuzzyMatcher,
    default_locale: impl Into<String>,
  ) -> Self {
    Self {
      repository,
      phones,
      matcher,
      default_locale: default_locale.into(),
    }
  }

  pub fn repository(&self) -> &CachedRepository<S> { &self.repository }

  pub fn default_locale(&self) -> &str { &self.default_locale }

  /// Resolve `message` and `hint` against the current snapshot.
  ///
  /// Fails only when no snapshot can be loaded at all.
  pub async fn resolve(
    &self,
    message: &str,
    hint: &Hint,
  ) -> Result<ResolutionResult, SourceError> {
    let snapshot = self.repository.get_snapshot().await?;
    Ok(self.resolve_in(&snapshot, message, hint))
  }

  /// Resolve against a given snapshot. Pure; performs no I/O.
  pub fn resolve_in(
    &self,
    snapshot: &PersonSnapshot,
    message: &str,
    hint: &Hint,
  ) -> ResolutionResult {
    if let Some(raw) = hint.usable_phone() {
      match self.phones.normalize(raw) {
        Ok(wanted) => {
          if let Some(person) = self.find_by_phone(snapshot, &wanted) {
            info!(person_id = %person.id, "matched person by phone");
            return ResolutionResult::Found {
              person:      person.clone(),
              matched_via: MatchedVia::Phone,
              score:       1.0,
            };
          }
          debug!("no person with the hinted phone");
        }
        Err(e) => warn!(error = %e, "ignoring unusable phone hint"),
      }
    }

    if let Some(name) = hint.usable_name() {
      if let Some(candidate) = self.match_name(snapshot, name) {
        return found(snapshot, candidate);
      }
      debug!(name, "no person matches the name hint");
    }

    for extracted in extract_name_candidates(message) {
      for phrase in trailing_windows(&extracted) {
        if let Some(mut candidate) = self.match_name(snapshot, phrase) {
          debug!(name = %phrase, "matched a name extracted from the message");
          candidate.matched_via = MatchedVia::ExtractedName;
          return found(snapshot, candidate);
        }
      }
    }

    debug!("no person matched");
    ResolutionResult::NotFound
  }

  fn find_by_phone<'a>(
    &self,
    snapshot: &'a PersonSnapshot,
    wanted: &str,
  ) -> Option<&'a PersonRecord> {
    snapshot.iter().find(|p| {
      !p.phone.trim().is_empty()
        && self
          .phones
          .normalize(&p.phone)
          .is_ok_and(|phone| phone == wanted)
    })
  }

  /// Fuzzy-match `name` against full names first, then preferred names.
  fn match_name(&self, snapshot: &PersonSnapshot, name: &str) -> Option<MatchCandidate> {
    let full_names = snapshot
      .iter()
      .filter(|p| !p.full_name.is_empty())
      .map(|p| (p.id.as_str(), p.full_name.as_str()));
    if let Some(hit) = self.matcher.best_match(name, full_names) {
      return Some(MatchCandidate {
        person_id:   hit.id.to_owned(),
        score:       hit.score,
        matched_via: MatchedVia::FullName,
      });
    }

    let preferred_names = snapshot
      .iter()
      .filter_map(|p| p.preferred_name.as_deref().map(|n| (p.id.as_str(), n)));
    self
      .matcher
      .best_match(name, preferred_names)
      .map(|hit| MatchCandidate {
        person_id:   hit.id.to_owned(),
        score:       hit.score,
        matched_via: MatchedVia::PreferredName,
      })
  }
}

/// `phrase`, then each suffix of it that still has at least two words,
/// longest first.
fn trailing_windows(phrase: &str) -> impl Iterator<Item = &str> {
  std::iter::once(phrase).chain(
    phrase
      .match_indices(' ')
      .map(move |(i, _)| &phrase[i + 1..])
      .filter(|rest| rest.contains(' ')),
  )
}

fn found(snapshot: &PersonSnapshot, candidate: MatchCandidate) -> ResolutionResult {
  match snapshot.get(&candidate.person_id) {
    Some(person) => {
      info!(
        person_id = %person.id,
        matched_via = ?candidate.matched_via,
        score = candidate.score,
        "matched person by name"
      );
      ResolutionResult::Found {
        person:      person.clone(),
        matched_via: candidate.matched_via,
        score:       candidate.score,
      }
    }
    None => ResolutionResult::NotFound,
  }
}
