//! Person records and the immutable snapshots that group them.
//!
//! A snapshot is captured at one data-source read and never mutated. Newer
//! reads produce a new snapshot which replaces the old one wholesale.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── PersonRecord ────────────────────────────────────────────────────────────

/// One row of the person table. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
  pub id:             String,
  pub full_name:      String,
  pub preferred_name: Option<String>,
  pub school:         String,
  pub department:     String,
  pub email:          String,
  /// Raw phone as stored in the table, before normalization.
  pub phone:          String,
  pub locale:         String,
  pub profile_doc_id: Option<String>,
  pub profile_text:   String,
  pub last_updated:   Option<NaiveDate>,
}

impl PersonRecord {
  /// A record with only `id` and `full_name` set; other fields empty.
  pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
    Self {
      id:             id.into(),
      full_name:      full_name.into(),
      preferred_name: None,
      school:         String::new(),
      department:     String::new(),
      email:          String::new(),
      phone:          String::new(),
      locale:         String::new(),
      profile_doc_id: None,
      profile_text:   String::new(),
      last_updated:   None,
    }
  }
}

// ─── PersonSnapshot ──────────────────────────────────────────────────────────

/// An ordered, immutable set of [`PersonRecord`]s read at `fetched_at`.
///
/// Safe to share between concurrent readers; the cache hands it out behind an
/// `Arc`.
#[derive(Debug, Clone)]
pub struct PersonSnapshot {
  records:    Vec<PersonRecord>,
  by_id:      HashMap<String, usize>,
  fetched_at: DateTime<Utc>,
}

impl PersonSnapshot {
  /// Build a snapshot from records whose ids are already unique.
  ///
  /// If a duplicate id slips through, the first occurrence stays addressable
  /// via [`get`](Self::get) and later ones are dropped.
  pub fn new(records: Vec<PersonRecord>, fetched_at: DateTime<Utc>) -> Self {
    let mut by_id = HashMap::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
      if by_id.contains_key(&record.id) {
        continue;
      }
      by_id.insert(record.id.clone(), kept.len());
      kept.push(record);
    }
    Self {
      records: kept,
      by_id,
      fetched_at,
    }
  }

  /// An empty snapshot, e.g. for a table with no data rows.
  pub fn empty(fetched_at: DateTime<Utc>) -> Self {
    Self::new(Vec::new(), fetched_at)
  }

  pub fn fetched_at(&self) -> DateTime<Utc> { self.fetched_at }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Records in table order.
  pub fn iter(&self) -> std::slice::Iter<'_, PersonRecord> {
    self.records.iter()
  }

  pub fn records(&self) -> &[PersonRecord] { &self.records }

  pub fn get(&self, id: &str) -> Option<&PersonRecord> {
    self.by_id.get(id).map(|&i| &self.records[i])
  }
}

impl<'a> IntoIterator for &'a PersonSnapshot {
  type IntoIter = std::slice::Iter<'a, PersonRecord>;
  type Item = &'a PersonRecord;

  fn into_iter(self) -> Self::IntoIter { self.records.iter() }
}
