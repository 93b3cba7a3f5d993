//! Show catalogue behavior over the in-memory stores.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

mod common;

use chrono::{DateTime, Utc};
use common::TestApp;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use theater_core::TheaterError;
use theater_core::environment::Clock;
use theater_core::index::{IndexBatch, IndexStore, keys};
use theater_core::search::{SearchCriteria, StatisticsSource};
use theater_core::show::{ShowId, ShowPatch, ShowRecord};
use theater_core::store::{PrimaryStatistics, RecordStore, ShowStore, StoreFuture};
use theater_testing::{InMemoryShowStore, fixtures, test_clock};

/// Show store that books seats right after the next `fetch` returns, the way
/// a booking committing between a read and a write would.
struct BookAfterRead {
    inner: InMemoryShowStore,
    armed: AtomicBool,
    tickets: u32,
}

impl BookAfterRead {
    fn new(inner: InMemoryShowStore, tickets: u32) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            tickets,
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl RecordStore<ShowRecord> for BookAfterRead {
    fn insert<'a>(&'a self, show: &'a ShowRecord) -> StoreFuture<'a, ()> {
        self.inner.insert(show)
    }

    fn update<'a>(&'a self, show: &'a ShowRecord) -> StoreFuture<'a, ()> {
        self.inner.update(show)
    }

    fn fetch<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, Option<ShowRecord>> {
        Box::pin(async move {
            let show = self.inner.fetch(id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.inner
                    .reserve_tickets(id, self.tickets, test_clock().now())
                    .await?;
            }
            Ok(show)
        })
    }

    fn remove<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, ()> {
        self.inner.remove(id)
    }
}

impl ShowStore for BookAfterRead {
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> StoreFuture<'a, (Vec<ShowRecord>, u64)> {
        self.inner.search(criteria)
    }

    fn by_location<'a>(
        &'a self,
        location: &'a str,
        only_available: bool,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        self.inner.by_location(location, only_available)
    }

    fn by_price_range<'a>(
        &'a self,
        min: u32,
        max: u32,
        location: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        self.inner.by_price_range(min, max, location)
    }

    fn update_attributes<'a>(
        &'a self,
        show: &'a ShowRecord,
        booked: Option<u32>,
    ) -> StoreFuture<'a, ShowRecord> {
        self.inner.update_attributes(show, booked)
    }

    fn reserve_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        self.inner.reserve_tickets(id, tickets, now)
    }

    fn release_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        self.inner.release_tickets(id, tickets, now)
    }

    fn set_booked_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        booked: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        self.inner.set_booked_tickets(id, booked, now)
    }

    fn statistics(&self) -> StoreFuture<'_, PrimaryStatistics> {
        self.inner.statistics()
    }
}

fn app_booking_after_read(tickets: u32) -> (TestApp, Arc<BookAfterRead>) {
    let shows = InMemoryShowStore::new();
    let store = Arc::new(BookAfterRead::new(shows.clone(), tickets));
    let app = TestApp::with_show_store(shows, store.clone());
    (app, store)
}

#[tokio::test]
async fn create_show_persists_and_projects() {
    let app = TestApp::new();
    let show = app
        .services
        .shows
        .create_show(fixtures::new_show("Swan Lake", "Downtown", 120, 300))
        .await
        .unwrap();

    assert_eq!(show.booked_tickets, 0);
    assert!(app.shows.snapshot(&show.id).is_some());

    let id = show.id.to_string();
    let index = app.raw_index();
    assert!(index.members(keys::ALL_SHOWS).contains(&id));
    assert!(index.members(&keys::location("downtown")).contains(&id));
    assert!(index.members(&keys::term("swan")).contains(&id));
    assert_eq!(index.score(keys::PRICE, &id), Some(120.0));
    assert_eq!(index.score(keys::AVAILABILITY, &id), Some(300.0));
    assert!(index.contains_key(&keys::snapshot(show.id)));
}

#[tokio::test]
async fn create_show_rejects_blank_name() {
    let app = TestApp::new();
    let err = app
        .services
        .shows
        .create_show(fixtures::new_show("   ", "Downtown", 120, 300))
        .await
        .unwrap_err();

    assert!(matches!(err, TheaterError::Validation(_)));
    assert!(app.shows.is_empty());
}

#[tokio::test]
async fn create_show_succeeds_while_index_is_down() {
    let app = TestApp::new();
    app.index.set_failing(true);

    let show = app
        .services
        .shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 80))
        .await
        .unwrap();

    assert!(app.shows.snapshot(&show.id).is_some());
    assert!(app.index.rejected_calls() > 0);

    // Reads still work through the primary store
    let fetched = app.services.shows.get_show(&show.id).await.unwrap();
    assert_eq!(fetched, show);
}

#[tokio::test]
async fn get_unknown_show_is_not_found() {
    let app = TestApp::new();
    let err = app
        .services
        .shows
        .get_show(&theater_core::show::ShowId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { entity: "show", .. }));
}

#[tokio::test]
async fn update_moves_location_and_drops_stale_terms() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Opera Night", "Downtown", 120, 100))
        .await
        .unwrap();

    let patch = ShowPatch {
        name: Some("Jazz Night".to_string()),
        location: Some("Harbor".to_string()),
        ..ShowPatch::default()
    };
    let updated = shows.update_show(&show.id, patch).await.unwrap();
    assert_eq!(updated.name, "Jazz Night");
    assert_eq!(updated.price, 120);

    let id = show.id.to_string();
    let index = app.raw_index();
    assert!(!index.members(&keys::location("Downtown")).contains(&id));
    assert!(index.members(&keys::location("harbor")).contains(&id));
    assert!(!index.members(&keys::term("opera")).contains(&id));
    assert!(index.members(&keys::term("jazz")).contains(&id));
    assert!(index.members(&keys::term("night")).contains(&id));
}

#[tokio::test]
async fn update_rejects_total_below_booked() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();
    shows.update_ticket_availability(&show.id, 8).await.unwrap();

    let patch = ShowPatch {
        total_tickets: Some(5),
        ..ShowPatch::default()
    };
    let err = shows.update_show(&show.id, patch).await.unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
    assert_eq!(app.shows.snapshot(&show.id).unwrap().total_tickets, 10);
}

#[tokio::test]
async fn availability_update_rewrites_score() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    let record = shows.update_ticket_availability(&show.id, 7).await.unwrap();
    assert_eq!(record.available_tickets(), 3);
    assert_eq!(
        app.raw_index().score(keys::AVAILABILITY, &show.id.to_string()),
        Some(3.0)
    );

    let err = shows
        .update_ticket_availability(&show.id, 11)
        .await
        .unwrap_err();
    assert!(matches!(err, TheaterError::CapacityExceeded { .. }));
}

#[tokio::test]
async fn delete_removes_record_and_projection() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    shows.delete_show(&show.id).await.unwrap();

    assert!(app.shows.snapshot(&show.id).is_none());
    let id = show.id.to_string();
    let index = app.raw_index();
    assert!(!index.members(keys::ALL_SHOWS).contains(&id));
    assert!(!index.members(&keys::location("uptown")).contains(&id));
    assert_eq!(index.score(keys::PRICE, &id), None);
    assert!(!index.contains_key(&keys::snapshot(show.id)));

    let err = shows.delete_show(&show.id).await.unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { .. }));
}

#[tokio::test]
async fn search_survives_index_outage() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    shows
        .create_show(fixtures::new_show("Opera Night", "Downtown", 120, 100))
        .await
        .unwrap();
    shows
        .create_show(fixtures::new_show("Jazz Evening", "Uptown", 80, 50))
        .await
        .unwrap();

    let criteria = SearchCriteria {
        location: Some("downtown".to_string()),
        ..SearchCriteria::default()
    };
    let indexed = shows.search_shows(criteria.clone()).await.unwrap();
    assert_eq!(indexed.total, 1);

    app.index.set_failing(true);
    let fallback = shows.search_shows(criteria).await.unwrap();
    assert_eq!(fallback.total, 1);
    assert_eq!(fallback.items[0].name, "Opera Night");

    let stats = shows.get_search_statistics().await.unwrap();
    assert_eq!(stats.source, StatisticsSource::PrimaryStore);
    assert_eq!(stats.total_shows, 2);
    assert_eq!(stats.indexed_in_price, None);
}

#[tokio::test]
async fn reindex_all_rebuilds_flushed_index_and_sweeps_orphans() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    for i in 0..5 {
        shows
            .create_show(fixtures::new_show(&format!("Show {i}"), "Downtown", 50 + i, 20))
            .await
            .unwrap();
    }

    app.raw_index().clear();
    app.raw_index()
        .execute(IndexBatch::new().set_add(keys::term("ghost"), "not-a-show"))
        .await
        .unwrap();

    let report = shows.reindex_all().await.unwrap();
    assert_eq!(report.shows_seen, 5);
    assert_eq!(report.shows_indexed, 5);
    assert_eq!(report.orphaned_terms_removed, Some(1));

    let index = app.raw_index();
    assert_eq!(index.members(keys::ALL_SHOWS).len(), 5);
    assert!(index.members(&keys::term("ghost")).is_empty());

    let stats = shows.get_search_statistics().await.unwrap();
    assert_eq!(stats.source, StatisticsSource::Index);
    assert_eq!(stats.indexed_in_price, Some(5));
}

#[tokio::test]
async fn reindex_all_reports_sweep_failure() {
    let app = TestApp::new();
    app.services
        .shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    app.index.set_failing(true);
    let report = app.services.shows.reindex_all().await.unwrap();
    assert_eq!(report.shows_seen, 1);
    assert_eq!(report.shows_indexed, 0);
    assert_eq!(report.orphaned_terms_removed, None);
}

#[tokio::test]
async fn cached_read_survives_primary_removal() {
    let app = TestApp::new();
    let show = app
        .services
        .shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    // Bypass the service so only the primary store forgets the show
    app.shows.remove(&show.id).await.unwrap();
    let cached = app.services.shows.get_show(&show.id).await.unwrap();
    assert_eq!(cached.id, show.id);
}

#[tokio::test]
async fn update_keeps_booking_committed_after_read() {
    let (app, store) = app_booking_after_read(5);
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    store.arm();
    let patch = ShowPatch {
        price: Some(120),
        ..ShowPatch::default()
    };
    let updated = shows.update_show(&show.id, patch).await.unwrap();

    assert_eq!(updated.price, 120);
    assert_eq!(updated.booked_tickets, 5);
    let stored = app.shows.snapshot(&show.id).unwrap();
    assert_eq!((stored.price, stored.booked_tickets), (120, 5));
    assert_eq!(shows.get_show(&show.id).await.unwrap(), stored);
    assert_eq!(
        app.raw_index().score(keys::AVAILABILITY, &show.id.to_string()),
        Some(5.0)
    );
}

#[tokio::test]
async fn shrinking_total_under_fresh_bookings_conflicts() {
    let (app, store) = app_booking_after_read(6);
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 10))
        .await
        .unwrap();

    store.arm();
    let patch = ShowPatch {
        total_tickets: Some(5),
        ..ShowPatch::default()
    };
    let err = shows.update_show(&show.id, patch).await.unwrap_err();

    assert!(matches!(err, TheaterError::Conflict(_)));
    let stored = app.shows.snapshot(&show.id).unwrap();
    assert_eq!((stored.total_tickets, stored.booked_tickets), (10, 6));
}

#[tokio::test]
async fn bookings_racing_updates_are_all_counted() {
    let app = TestApp::new();
    let show = app
        .services
        .shows
        .create_show(fixtures::new_show("Cats", "Uptown", 90, 40))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let services = app.services.clone();
        let id = show.id;
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                services
                    .bookings
                    .create_booking(fixtures::booking_request(id, 2))
                    .await
                    .map(|_| 2)
            } else {
                let patch = ShowPatch {
                    price: Some(100 + i),
                    ..ShowPatch::default()
                };
                services.shows.update_show(&id, patch).await.map(|_| 0)
            }
        }));
    }

    let mut booked = 0;
    for handle in handles {
        booked += handle.await.unwrap().unwrap();
    }

    assert_eq!(booked, 20);
    assert_eq!(app.shows.snapshot(&show.id).unwrap().booked_tickets, 20);
}

#[tokio::test]
async fn freed_seats_reappear_in_available_listings() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("Late Show", "Harbor", 100, 50))
        .await
        .unwrap();
    shows.update_ticket_availability(&show.id, 50).await.unwrap();
    let patch = ShowPatch {
        price: Some(110),
        ..ShowPatch::default()
    };
    shows.update_show(&show.id, patch).await.unwrap();
    shows.update_ticket_availability(&show.id, 0).await.unwrap();

    let result = shows
        .search_shows(SearchCriteria {
            location: Some("harbor".to_string()),
            only_available: true,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].available_tickets, 50);

    let listed = shows.get_shows_by_location("Harbor", true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].price, 110);
}

#[tokio::test]
async fn downtown_show_lifecycle() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let show = shows
        .create_show(fixtures::new_show("A", "Downtown", 100, 50))
        .await
        .unwrap();
    let downtown = |only_available| SearchCriteria {
        location: Some("Downtown".to_string()),
        only_available,
        ..SearchCriteria::default()
    };

    let found = shows.search_shows(downtown(false)).await.unwrap();
    let ids: Vec<ShowId> = found.items.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![show.id]);

    shows.update_ticket_availability(&show.id, 50).await.unwrap();
    let available = shows.search_shows(downtown(true)).await.unwrap();
    assert!(available.items.is_empty());
    assert_eq!(available.total, 0);

    shows.delete_show(&show.id).await.unwrap();
    let err = shows.get_show(&show.id).await.unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { entity: "show", .. }));
}

#[tokio::test]
async fn concurrent_availability_updates_leave_one_winner() {
    let app = TestApp::new();
    let shows = &app.services.shows;
    let target = shows
        .create_show(fixtures::new_show("Target", "Harbor", 40, 50))
        .await
        .unwrap();
    let other = shows
        .create_show(fixtures::new_show("Other", "Harbor", 60, 70))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        shows.update_ticket_availability(&target.id, 10),
        shows.update_ticket_availability(&target.id, 20),
    );
    first.unwrap();
    second.unwrap();

    let index = app.raw_index();
    let score = index.score(keys::AVAILABILITY, &target.id.to_string());
    assert!(matches!(score, Some(s) if s == 40.0 || s == 30.0), "got {score:?}");

    let other_id = other.id.to_string();
    assert_eq!(index.score(keys::AVAILABILITY, &other_id), Some(70.0));
    assert_eq!(index.score(keys::PRICE, &other_id), Some(60.0));
    assert!(index.members(&keys::location("harbor")).contains(&other_id));
    assert_eq!(
        index.raw(&keys::snapshot(other.id)),
        Some(serde_json::to_string(&other.view()).unwrap())
    );
}
