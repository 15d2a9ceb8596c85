//! The read-only data source abstraction and positional row mapping.
//!
//! A [`TabularProvider`] knows how to fetch raw string rows for a dataset and
//! range (Google Sheets, a fixture, ...). [`TableSource`] binds a provider to
//! a configured dataset and maps its rows into a [`PersonSnapshot`].

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  SourceError,
  person::{PersonRecord, PersonSnapshot},
};

// ─── Traits ──────────────────────────────────────────────────────────────────

/// An external table of string cells, addressed by dataset id and range.
pub trait TabularProvider: Send + Sync {
  /// Return every row in `range`, each row a list of column values.
  ///
  /// Providers may omit trailing empty cells.
  fn read_range<'a>(
    &'a self,
    dataset_id: &'a str,
    range: &'a str,
  ) -> impl Future<Output = Result<Vec<Vec<String>>, SourceError>> + Send + 'a;
}

/// Anything that can produce a full, fresh [`PersonSnapshot`].
pub trait DataSource: Send + Sync {
  fn fetch_all(
    &self,
  ) -> impl Future<Output = Result<PersonSnapshot, SourceError>> + Send + '_;
}

// ─── TableSource ─────────────────────────────────────────────────────────────

/// [`DataSource`] reading one configured range from a [`TabularProvider`].
#[derive(Debug, Clone)]
pub struct TableSource<P> {
  provider:   P,
  dataset_id: String,
  range:      String,
}

impl<P: TabularProvider> TableSource<P> {
  pub fn new(provider: P, dataset_id: impl Into<String>, range: impl Into<String>) -> Self {
    Self {
      provider,
      dataset_id: dataset_id.into(),
      range: range.into(),
    }
  }

  pub fn provider(&self) -> &P { &self.provider }
}

impl<P: TabularProvider> DataSource for TableSource<P> {
  async fn fetch_all(&self) -> Result<PersonSnapshot, SourceError> {
    let rows = self
      .provider
      .read_range(&self.dataset_id, &self.range)
      .await?;
    debug!(
      dataset = %self.dataset_id,
      range = %self.range,
      rows = rows.len(),
      "read person rows"
    );
    rows_to_snapshot(rows, Utc::now())
  }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

/// Column order of the person table. This is a fixed external contract.
mod col {
  pub const ID: usize = 0;
  pub const FULL_NAME: usize = 1;
  pub const PREFERRED_NAME: usize = 2;
  pub const SCHOOL: usize = 3;
  pub const DEPARTMENT: usize = 4;
  pub const EMAIL: usize = 5;
  pub const PHONE: usize = 6;
  pub const LOCALE: usize = 7;
  pub const PROFILE_DOC_ID: usize = 8;
  pub const PROFILE_TEXT: usize = 9;
  pub const LAST_UPDATED: usize = 10;
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

#[derive(Debug, Error)]
enum RowError {
  #[error("row has no cells")]
  NoCells,

  #[error("unparseable last_updated {0:?}")]
  BadDate(String),

  #[error("duplicate id {0:?}")]
  DuplicateId(String),
}

/// Map raw rows into a snapshot.
///
/// Rows with an empty id are skipped. Malformed rows are logged and skipped;
/// if every row is malformed the whole read fails.
pub fn rows_to_snapshot(
  rows: Vec<Vec<String>>,
  fetched_at: DateTime<Utc>,
) -> Result<PersonSnapshot, SourceError> {
  let total = rows.len();
  let mut malformed = 0usize;
  let mut seen = HashSet::with_capacity(total);
  let mut records = Vec::with_capacity(total);

  for (index, row) in rows.iter().enumerate() {
    let parsed = parse_row(row).and_then(|record| match record {
      Some(r) if !seen.insert(r.id.clone()) => Err(RowError::DuplicateId(r.id)),
      other => Ok(other),
    });
    match parsed {
      Ok(Some(record)) => records.push(record),
      Ok(None) => debug!(row = index, "skipping row with empty id"),
      Err(e) => {
        malformed += 1;
        warn!(row = index, error = %e, "skipping malformed person row");
      }
    }
  }

  if total > 0 && malformed == total {
    return Err(SourceError::Malformed(format!(
      "all {total} person rows are malformed"
    )));
  }

  Ok(PersonSnapshot::new(records, fetched_at))
}

fn parse_row(row: &[String]) -> Result<Option<PersonRecord>, RowError> {
  if row.is_empty() {
    return Err(RowError::NoCells);
  }
  let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or_default();
  let optional = |i: usize| Some(cell(i)).filter(|s| !s.is_empty()).map(str::to_owned);

  let id = cell(col::ID);
  if id.is_empty() {
    return Ok(None);
  }

  let last_updated = match cell(col::LAST_UPDATED) {
    "" => None,
    raw => Some(parse_date(raw).ok_or_else(|| RowError::BadDate(raw.to_owned()))?),
  };

  Ok(Some(PersonRecord {
    id: id.to_owned(),
    full_name: cell(col::FULL_NAME).to_owned(),
    preferred_name: optional(col::PREFERRED_NAME),
    school: cell(col::SCHOOL).to_owned(),
    department: cell(col::DEPARTMENT).to_owned(),
    email: cell(col::EMAIL).to_owned(),
    phone: cell(col::PHONE).to_owned(),
    locale: cell(col::LOCALE).to_owned(),
    profile_doc_id: optional(col::PROFILE_DOC_ID),
    profile_text: cell(col::PROFILE_TEXT).to_owned(),
    last_updated,
  }))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
