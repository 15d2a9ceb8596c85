//! [`CachedRepository`]: a TTL-bounded, read-through cache over a
//! [`DataSource`].
//!
//! The cache holds at most one live [`PersonSnapshot`]. A fresh snapshot is
//! served without I/O. When the entry is missing or older than the TTL, one
//! refresh task is spawned and every caller that arrives while it runs waits
//! on the same outcome. The task is not owned by any caller: if they all go
//! away it still completes and populates the cache.
//!
//! A failed refresh falls back to the previous snapshot when there is one and
//! only surfaces the error when the cache is cold.

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{SourceError, person::PersonSnapshot, source::DataSource};

type RefreshOutcome = Result<Arc<PersonSnapshot>, SourceError>;

// ─── State ───────────────────────────────────────────────────────────────────

struct CacheEntry {
  snapshot:  Arc<PersonSnapshot>,
  loaded_at: Instant,
  /// Set by [`CachedRepository::invalidate`]; forces the next read to refresh.
  expired:   bool,
}

#[derive(Default)]
struct State {
  entry:      Option<CacheEntry>,
  /// Receiver for the refresh currently running, if any.
  in_flight:  Option<watch::Receiver<Option<RefreshOutcome>>>,
  last_error: Option<SourceError>,
}

struct Inner<S> {
  source: S,
  ttl:    Duration,
  state:  Mutex<State>,
}

impl<S> Inner<S> {
  fn lock(&self) -> MutexGuard<'_, State> {
    // Critical sections never panic midway, so a poisoned lock still guards
    // consistent data.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    !entry.expired && entry.loaded_at.elapsed() < self.ttl
  }

  /// Swap in the outcome of a finished refresh and clear the in-flight slot.
  fn complete_refresh(&self, result: Result<PersonSnapshot, SourceError>) -> RefreshOutcome {
    let mut state = self.lock();
    state.in_flight = None;

    match result {
      Ok(snapshot) => {
        let snapshot = Arc::new(snapshot);
        info!(records = snapshot.len(), "person snapshot refreshed");
        state.entry = Some(CacheEntry {
          snapshot:  Arc::clone(&snapshot),
          loaded_at: Instant::now(),
          expired:   false,
        });
        state.last_error = None;
        Ok(snapshot)
      }
      Err(e) => {
        state.last_error = Some(e.clone());
        match &state.entry {
          Some(entry) => {
            warn!(
              error = %e,
              age_ms = millis(entry.loaded_at.elapsed()),
              "refresh failed; serving stale person snapshot"
            );
            Ok(Arc::clone(&entry.snapshot))
          }
          None => {
            error!(error = %e, "refresh failed and no person snapshot is cached");
            Err(e)
          }
        }
      }
    }
  }
}

/// Whether the refresh behind `rx` can still report. A closed channel means
/// the task died without reporting.
fn is_live(rx: &watch::Receiver<Option<RefreshOutcome>>) -> bool { rx.has_changed().is_ok() }

fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }

// ─── Status ──────────────────────────────────────────────────────────────────

/// Point-in-time view of the cache, for health and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
  /// Number of records in the cached snapshot, if any.
  pub records:    Option<usize>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub age_ms:     Option<u64>,
  /// Whether the next read would be served without I/O.
  pub fresh:      bool,
  pub refreshing: bool,
  /// Error from the most recent refresh, cleared by the next success.
  pub last_error: Option<String>,
}

// ─── Repository ──────────────────────────────────────────────────────────────

/// TTL cache in front of a [`DataSource`].
///
/// Cloning is cheap; clones share the same cache entry.
pub struct CachedRepository<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for CachedRepository<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S> CachedRepository<S>
where
  S: DataSource + 'static,
{
  /// Wrap `source`; the cache starts empty.
  pub fn new(source: S, ttl: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        ttl,
        state: Mutex::new(State::default()),
      }),
    }
  }

  pub fn ttl(&self) -> Duration { self.inner.ttl }

  pub fn source(&self) -> &S { &self.inner.source }

  /// Return the current snapshot, refreshing it first if it is missing or
  /// older than the TTL.
  ///
  /// Errors only when no snapshot has ever been loaded and the refresh fails.
  pub async fn get_snapshot(&self) -> Result<Arc<PersonSnapshot>, SourceError> {
    let mut rx = {
      let mut state = self.inner.lock();
      if let Some(entry) = &state.entry
        && self.inner.is_fresh(entry)
      {
        return Ok(Arc::clone(&entry.snapshot));
      }
      let joinable = state.in_flight.as_ref().filter(|rx| is_live(rx)).cloned();
      match joinable {
        Some(rx) => {
          debug!("joining in-flight person refresh");
          rx
        }
        None => self.spawn_refresh(&mut state),
      }
    };

    let outcome = match rx.wait_for(Option::is_some).await {
      Ok(outcome) => outcome.clone(),
      Err(_) => None,
    };
    outcome.unwrap_or(Err(SourceError::RefreshAborted))
  }

  /// Mark the cached snapshot as expired. It stays available as a fallback.
  pub fn invalidate(&self) {
    if let Some(entry) = self.inner.lock().entry.as_mut() {
      entry.expired = true;
    }
  }

  /// Describe the cache without triggering a refresh.
  pub fn status(&self) -> CacheStatus {
    let state = self.inner.lock();
    let entry = state.entry.as_ref();
    CacheStatus {
      records:    entry.map(|e| e.snapshot.len()),
      fetched_at: entry.map(|e| e.snapshot.fetched_at()),
      age_ms:     entry.map(|e| millis(e.loaded_at.elapsed())),
      fresh:      entry.is_some_and(|e| self.inner.is_fresh(e)),
      refreshing: state.in_flight.as_ref().is_some_and(is_live),
      last_error: state.last_error.as_ref().map(ToString::to_string),
    }
  }

  /// Start a refresh task and register it as in flight. Caller holds the lock.
  fn spawn_refresh(
    &self,
    state: &mut State,
  ) -> watch::Receiver<Option<RefreshOutcome>> {
    debug!("starting person refresh");
    let (tx, rx) = watch::channel(None);
    state.in_flight = Some(rx.clone());

    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      let result = inner.source.fetch_all().await;
      let outcome = inner.complete_refresh(result);
      // Every waiter may have gone away; the cache is updated regardless.
      let _ = tx.send(Some(outcome));
    });

    rx
  }
}
