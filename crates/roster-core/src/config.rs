//! Engine configuration, deserialised from the `[engine]` table of the server
//! config.

use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result, fuzzy::FuzzyMatcher, phone::PhoneNormalizer};

/// Settings for the resolution engine and its cached data source.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Identifier of the external dataset (e.g. a spreadsheet id).
  pub dataset_id:           String,
  /// Cell range holding the person rows, header excluded.
  #[serde(default = "default_range")]
  pub range:                String,
  #[serde(default = "default_cache_ttl_ms")]
  pub cache_ttl_ms:         u64,
  /// Calling code used for local-format phone numbers, without `+`.
  #[serde(default = "default_country_code")]
  pub default_country_code: String,
  #[serde(default = "default_threshold")]
  pub match_threshold:      f64,
  #[serde(default = "default_locale")]
  pub default_locale:       String,
}

fn default_range() -> String { "People!A2:K".to_owned() }
fn default_cache_ttl_ms() -> u64 { 60_000 }
fn default_country_code() -> String { "90".to_owned() }
fn default_threshold() -> f64 { crate::fuzzy::DEFAULT_THRESHOLD }
fn default_locale() -> String { "tr-TR".to_owned() }

impl EngineConfig {
  /// A config for `dataset_id` with every other field at its default.
  pub fn new(dataset_id: impl Into<String>) -> Self {
    Self {
      dataset_id:           dataset_id.into(),
      range:                default_range(),
      cache_ttl_ms:         default_cache_ttl_ms(),
      default_country_code: default_country_code(),
      match_threshold:      default_threshold(),
      default_locale:       default_locale(),
    }
  }

  /// Reject values the engine cannot run with.
  pub fn validate(&self) -> Result<()> {
    if self.dataset_id.trim().is_empty() {
      return Err(Error::InvalidConfig("dataset_id must not be empty".into()));
    }
    if self.range.trim().is_empty() {
      return Err(Error::InvalidConfig("range must not be empty".into()));
    }
    if self.default_locale.trim().is_empty() {
      return Err(Error::InvalidConfig("default_locale must not be empty".into()));
    }
    self.phone_normalizer()?;
    self.fuzzy_matcher()?;
    Ok(())
  }

  pub fn cache_ttl(&self) -> Duration { Duration::from_millis(self.cache_ttl_ms) }

  pub fn phone_normalizer(&self) -> Result<PhoneNormalizer> {
    PhoneNormalizer::new(self.default_country_code.clone())
  }

  pub fn fuzzy_matcher(&self) -> Result<FuzzyMatcher> {
    FuzzyMatcher::new(self.match_threshold)
  }
}
