//! Error types for `roster-core`.

use thiserror::Error;

/// A raw phone string could not be canonicalised.
///
/// Non-fatal: callers treat it as "no usable phone hint".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
  #[error("phone number is empty")]
  Empty,

  /// The raw input is not kept; phone numbers stay out of logs.
  #[error("phone number contains non-digit characters")]
  InvalidCharacter,

  #[error("phone number has an implausible digit count: {count}")]
  DigitCount { count: usize },
}

/// Failure to read the person table from the external provider.
///
/// Cloneable so a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  #[error("transport failure: {0}")]
  Transport(String),

  #[error("authentication failed: {0}")]
  Auth(String),

  #[error("malformed data: {0}")]
  Malformed(String),

  /// The refresh task ended without reporting an outcome (e.g. it panicked).
  #[error("refresh aborted before completion")]
  RefreshAborted,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("normalization error: {0}")]
  Normalization(#[from] NormalizationError),

  #[error("data source error: {0}")]
  Source(#[from] SourceError),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
