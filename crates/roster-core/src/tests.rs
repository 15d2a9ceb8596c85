//! Engine tests: the cache against a scripted data source, and the resolver
//! end to end.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::Utc;

use crate::{
  SourceError,
  cache::CachedRepository,
  config::EngineConfig,
  person::{PersonRecord, PersonSnapshot},
  resolve::{Hint, MatchedVia, PersonResolver, ResolutionResult},
  source::{TableSource, TabularProvider},
};

// ─── Fake provider ───────────────────────────────────────────────────────────

/// In-memory table that counts reads and can be told to fail.
#[derive(Clone, Default)]
struct FakeTable {
  rows:    Arc<Mutex<Vec<Vec<String>>>>,
  calls:   Arc<AtomicUsize>,
  failing: Arc<AtomicBool>,
  /// Makes the next read panic, as a crashing provider would.
  crash:   Arc<AtomicBool>,
  latency: Duration,
}

impl FakeTable {
  fn with_people(people: &[&[&str]]) -> Self {
    let table = Self {
      latency: Duration::from_millis(50),
      ..Self::default()
    };
    table.set_rows(people);
    table
  }

  fn set_rows(&self, people: &[&[&str]]) {
    *self.rows.lock().unwrap() = people
      .iter()
      .map(|row| row.iter().map(|c| (*c).to_owned()).collect())
      .collect();
  }

  fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  fn fail(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }
}

impl TabularProvider for FakeTable {
  async fn read_range(
    &self,
    _dataset_id: &str,
    _range: &str,
  ) -> Result<Vec<Vec<String>>, SourceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(self.latency).await;
    if self.crash.swap(false, Ordering::SeqCst) {
      panic!("provider crashed mid-read");
    }
    if self.failing.load(Ordering::SeqCst) {
      return Err(SourceError::Transport("connection reset".into()));
    }
    Ok(self.rows.lock().unwrap().clone())
  }
}

const TTL: Duration = Duration::from_secs(60);

fn repo(table: &FakeTable) -> CachedRepository<TableSource<FakeTable>> {
  CachedRepository::new(TableSource::new(table.clone(), "sheet", "People!A2:K"), TTL)
}

fn resolver(table: &FakeTable) -> PersonResolver<TableSource<FakeTable>> {
  PersonResolver::new(repo(table), &EngineConfig::new("sheet")).unwrap()
}

// Columns: id, full_name, preferred_name, school, department, email, phone,
// locale, profile_doc_id, profile_text, last_updated.
const AHMET: &[&str] = &[
  "p1", "Ahmet Yılmaz", "", "ODTÜ", "Fizik", "ahmet@example.com", "+905551234567", "tr-TR",
];
const FATMA: &[&str] = &[
  "p2", "Fatma Demir", "Fatma", "Boğaziçi", "Tarih", "fatma@example.com", "0532 765 43 21",
  "en-US",
];
const MEHMET: &[&str] = &["p3", "Mehmet Kaya", "Memo", "İTÜ", "Mimarlık", "", "bad phone"];

fn hint(phone: Option<&str>, name: Option<&str>) -> Hint {
  Hint {
    phone:  phone.map(str::to_owned),
    name:   name.map(str::to_owned),
    locale: None,
  }
}

fn found_id(result: &ResolutionResult) -> Option<&str> {
  result.person().map(|p| p.id.as_str())
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fresh_snapshot_is_served_without_io() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);

  let first = repo.get_snapshot().await.unwrap();
  tokio::time::advance(Duration::from_secs(30)).await;
  let second = repo.get_snapshot().await.unwrap();

  assert_eq!(table.calls(), 1);
  assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test(start_paused = true)]
async fn expired_snapshot_is_refreshed() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);

  repo.get_snapshot().await.unwrap();
  table.set_rows(&[AHMET, FATMA]);
  tokio::time::advance(TTL + Duration::from_millis(1)).await;

  let refreshed = repo.get_snapshot().await.unwrap();
  assert_eq!(table.calls(), 2);
  assert_eq!(refreshed.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_reads_share_one_fetch() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);

  let (a, b) = tokio::join!(repo.get_snapshot(), repo.get_snapshot());
  let (a, b) = (a.unwrap(), b.unwrap());

  assert_eq!(table.calls(), 1);
  assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test(start_paused = true)]
async fn concurrent_expired_reads_share_one_fetch() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);
  repo.get_snapshot().await.unwrap();
  tokio::time::advance(TTL * 2).await;

  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let repo = repo.clone();
      tokio::spawn(async move { repo.get_snapshot().await })
    })
    .collect();
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_serves_stale_snapshot() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);
  let original = repo.get_snapshot().await.unwrap();

  table.fail(true);
  tokio::time::advance(TTL * 2).await;
  let stale = repo.get_snapshot().await.unwrap();

  assert_eq!(table.calls(), 2);
  assert!(Arc::ptr_eq(&original, &stale));
  assert!(repo.status().last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn cold_failure_propagates_to_every_waiter() {
  let table = FakeTable::with_people(&[AHMET]);
  table.fail(true);
  let repo = repo(&table);

  let (a, b, c) = tokio::join!(repo.get_snapshot(), repo.get_snapshot(), repo.get_snapshot());
  for result in [a, b, c] {
    assert_eq!(
      result.unwrap_err(),
      SourceError::Transport("connection reset".into())
    );
  }
  assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cold_failure_recovers_on_next_call() {
  let table = FakeTable::with_people(&[AHMET]);
  table.fail(true);
  let repo = repo(&table);
  assert!(repo.get_snapshot().await.is_err());

  table.fail(false);
  let snapshot = repo.get_snapshot().await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_refresh_still_populates_cache() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);

  let caller = {
    let repo = repo.clone();
    tokio::spawn(async move { repo.get_snapshot().await })
  };
  tokio::time::sleep(Duration::from_millis(10)).await;
  caller.abort();
  tokio::time::sleep(Duration::from_millis(100)).await;

  let snapshot = repo.get_snapshot().await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn crashed_refresh_is_aborted_and_retried() {
  let table = FakeTable::with_people(&[AHMET]);
  table.crash.store(true, Ordering::SeqCst);
  let repo = repo(&table);

  assert_eq!(repo.get_snapshot().await.unwrap_err(), SourceError::RefreshAborted);
  let status = repo.status();
  assert!(!status.refreshing);
  assert_eq!(status.records, None);

  let snapshot = repo.get_snapshot().await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(table.calls(), 2);
  assert!(!repo.status().refreshing);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_refresh() {
  let table = FakeTable::with_people(&[AHMET]);
  let repo = repo(&table);
  repo.get_snapshot().await.unwrap();

  repo.invalidate();
  repo.get_snapshot().await.unwrap();
  assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn all_rows_malformed_is_a_cold_error() {
  let table = FakeTable::with_people(&[&[], &[]]);
  let repo = repo(&table);
  assert!(matches!(
    repo.get_snapshot().await,
    Err(SourceError::Malformed(_))
  ));
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn phone_hint_matches_exactly() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r.resolve("Merhaba", &hint(Some("05551234567"), None)).await.unwrap();
  match result {
    ResolutionResult::Found {
      person,
      matched_via,
      score,
    } => {
      assert_eq!(person.id, "p1");
      assert_eq!(matched_via, MatchedVia::Phone);
      assert_eq!(score, 1.0);
    }
    ResolutionResult::NotFound => panic!("expected a phone match"),
  }
}

#[tokio::test(start_paused = true)]
async fn record_phones_are_normalized_too() {
  let table = FakeTable::with_people(&[AHMET, FATMA, MEHMET]);
  let r = resolver(&table);

  let result = r.resolve("", &hint(Some("+90 532 765 4321"), None)).await.unwrap();
  assert_eq!(found_id(&result), Some("p2"));
}

#[tokio::test(start_paused = true)]
async fn phone_wins_over_a_conflicting_name() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("Ben Fatma Demir", &hint(Some("05551234567"), Some("Fatma Demir")))
    .await
    .unwrap();
  assert_eq!(found_id(&result), Some("p1"));
}

#[tokio::test(start_paused = true)]
async fn unusable_phone_falls_through_to_name() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("", &hint(Some("call me maybe"), Some("Fatma Demir")))
    .await
    .unwrap();
  assert_eq!(found_id(&result), Some("p2"));
}

#[tokio::test(start_paused = true)]
async fn unknown_phone_falls_through_to_name() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("", &hint(Some("0500 000 00 00"), Some("ahmet yilmaz")))
    .await
    .unwrap();
  assert_eq!(
    result,
    ResolutionResult::Found {
      person:      r.repository().get_snapshot().await.unwrap().get("p1").unwrap().clone(),
      matched_via: MatchedVia::FullName,
      score:       1.0,
    }
  );
}

#[tokio::test(start_paused = true)]
async fn short_name_hint_matches_preferred_name() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r.resolve("", &hint(None, Some("Fatma"))).await.unwrap();
  match result {
    ResolutionResult::Found {
      person,
      matched_via,
      score,
    } => {
      assert_eq!(person.id, "p2");
      assert_eq!(matched_via, MatchedVia::PreferredName);
      assert_eq!(score, 1.0);
    }
    ResolutionResult::NotFound => panic!("expected a preferred-name match"),
  }
}

#[tokio::test(start_paused = true)]
async fn full_name_is_checked_before_preferred_name() {
  // p4's preferred name is an exact hit, but p3's full name already clears
  // the threshold and full names are searched first.
  let table = FakeTable::with_people(&[
    &["p3", "Mehmet Kayaa", "Memo"],
    &["p4", "Zeynep Arslan", "Mehmet Kaya"],
  ]);
  let r = resolver(&table);

  let result = r.resolve("", &hint(None, Some("Mehmet Kaya"))).await.unwrap();
  match result {
    ResolutionResult::Found {
      person,
      matched_via,
      score,
    } => {
      assert_eq!(person.id, "p3");
      assert_eq!(matched_via, MatchedVia::FullName);
      assert!(score < 1.0);
    }
    ResolutionResult::NotFound => panic!("expected a full-name match"),
  }
}

#[tokio::test(start_paused = true)]
async fn name_is_extracted_from_message() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("Merhaba, ben Ahmet Yilmaz. Kayıt durumumu öğrenebilir miyim?", &Hint::default())
    .await
    .unwrap();
  match result {
    ResolutionResult::Found {
      person,
      matched_via,
      ..
    } => {
      assert_eq!(person.id, "p1");
      assert_eq!(matched_via, MatchedVia::ExtractedName);
    }
    ResolutionResult::NotFound => panic!("expected an extracted-name match"),
  }
}

#[tokio::test(start_paused = true)]
async fn capitalized_greeting_before_the_name_is_skipped() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("Merhaba Ahmet Yılmaz, bir sorum var", &Hint::default())
    .await
    .unwrap();
  assert_eq!(found_id(&result), Some("p1"));
  assert!(matches!(
    result,
    ResolutionResult::Found {
      matched_via: MatchedVia::ExtractedName,
      ..
    }
  ));
}

#[tokio::test(start_paused = true)]
async fn first_extracted_candidate_that_clears_wins() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("Okan Bayülgen değil, Fatma Demir yazıyor. Ahmet Yılmaz da selam söyledi", &Hint::default())
    .await
    .unwrap();
  assert_eq!(found_id(&result), Some("p2"));
}

#[tokio::test(start_paused = true)]
async fn explicit_name_hint_beats_extracted_names() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r
    .resolve("Ahmet Yılmaz hakkında soru", &hint(None, Some("Fatma Demir")))
    .await
    .unwrap();
  assert_eq!(found_id(&result), Some("p2"));
}

#[tokio::test(start_paused = true)]
async fn lowercase_message_without_hints_is_not_found() {
  let table = FakeTable::with_people(&[AHMET, FATMA]);
  let r = resolver(&table);

  let result = r.resolve("merhaba ben ahmet yılmaz", &Hint::default()).await.unwrap();
  assert_eq!(result, ResolutionResult::NotFound);
}

#[tokio::test(start_paused = true)]
async fn empty_snapshot_is_not_found() {
  let table = FakeTable::with_people(&[]);
  let r = resolver(&table);

  for h in [
    Hint::default(),
    hint(Some("05551234567"), None),
    hint(None, Some("Ahmet Yılmaz")),
    hint(Some("garbage"), Some("")),
  ] {
    let result = r.resolve("Merhaba, ben Ahmet Yılmaz", &h).await.unwrap();
    assert_eq!(result, ResolutionResult::NotFound);
  }
}

#[tokio::test(start_paused = true)]
async fn cold_source_failure_is_the_only_error() {
  let table = FakeTable::with_people(&[AHMET]);
  table.fail(true);
  let r = resolver(&table);

  let err = r.resolve("Merhaba", &Hint::default()).await.unwrap_err();
  assert!(matches!(err, SourceError::Transport(_)));
}

#[test]
fn resolve_in_is_pure() {
  let snapshot = PersonSnapshot::new(
    vec![{
      let mut p = PersonRecord::new("p1", "Ahmet Yılmaz");
      p.phone = "+905551234567".into();
      p
    }],
    Utc::now(),
  );
  let r = PersonResolver::new(
    CachedRepository::new(
      TableSource::new(FakeTable::default(), "sheet", "A:K"),
      TTL,
    ),
    &EngineConfig::new("sheet"),
  )
  .unwrap();

  let h = hint(Some("05551234567"), None);
  assert_eq!(r.resolve_in(&snapshot, "Merhaba", &h), r.resolve_in(&snapshot, "Merhaba", &h));
  assert!(r.resolve_in(&snapshot, "Merhaba", &h).is_found());
}

#[test]
fn locale_prefers_hint_then_record_then_default() {
  let mut person = PersonRecord::new("p2", "Fatma Demir");
  person.locale = "en-US".into();
  let found = ResolutionResult::Found {
    person,
    matched_via: MatchedVia::FullName,
    score: 1.0,
  };

  let with_locale = Hint {
    locale: Some("de-DE".into()),
    ..Hint::default()
  };
  assert_eq!(found.locale_for(&with_locale, "tr-TR"), "de-DE");
  assert_eq!(found.locale_for(&Hint::default(), "tr-TR"), "en-US");
  assert_eq!(ResolutionResult::NotFound.locale_for(&Hint::default(), "tr-TR"), "tr-TR");
}
