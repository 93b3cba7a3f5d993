//! Search executor behavior over the in-memory stores.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use theater_core::TheaterError;
use theater_core::environment::Clock;
use theater_core::index::{IndexStore, keys};
use theater_core::search::{SearchCriteria, StatisticsSource};
use theater_core::show::{ShowId, ShowRecord, ShowView};
use theater_core::store::{RecordStore, ShowStore};
use theater_projections::{
    RefreshConfig, RefreshQueue, SearchConfig, SearchExecutor, SearchPath, ShowIndexer,
    UnfilteredStrategy,
};
use theater_testing::{
    FlakyIndexStore, InMemoryIndexStore, InMemoryShowStore, fixtures, properties, test_clock,
};

struct Harness {
    index: FlakyIndexStore,
    shows: InMemoryShowStore,
    indexer: ShowIndexer,
    refresh: RefreshQueue,
    executor: SearchExecutor,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SearchConfig::default())
    }

    fn with_config(config: SearchConfig) -> Self {
        let index = FlakyIndexStore::new(InMemoryIndexStore::new());
        let shows = InMemoryShowStore::new();
        let indexer = ShowIndexer::new(Arc::new(index.clone()));
        let (refresh, _handle) = RefreshQueue::spawn(RefreshConfig::default());
        let primary: Arc<dyn ShowStore> = Arc::new(shows.clone());
        let executor = SearchExecutor::new(Arc::new(index.clone()), primary, refresh.clone(), config);
        Self {
            index,
            shows,
            indexer,
            refresh,
            executor,
        }
    }

    async fn add(&self, show: ShowRecord) -> ShowRecord {
        self.shows.insert(&show).await.unwrap();
        self.indexer.index_show(&show).await;
        show
    }

    async fn seed(&self) {
        let mut opera = fixtures::show("Opera Night", "Downtown", 120, 100);
        opera.details = "A grand evening of opera".to_string();
        self.add(opera).await;
        self.add(fixtures::show("Jazz Evening", "Downtown", 80, 50)).await;
        self.add(fixtures::show("Rock Opera", "Uptown", 150, 200)).await;
        let mut sold_out = fixtures::show("Ballet Gala", "Downtown", 200, 40);
        sold_out.booked_tickets = 40;
        self.add(sold_out).await;
    }
}

fn names(items: &[ShowView]) -> Vec<&str> {
    items.iter().map(|v| v.name.as_str()).collect()
}

/// Every key with its set size, sorted-set size and string value.
async fn fingerprint(index: &InMemoryIndexStore) -> Vec<(String, u64, u64, Option<String>)> {
    let mut entries = Vec::new();
    for key in index.keys() {
        let set = index.set_card(&key).await.unwrap();
        let sorted = index.sorted_card(&key).await.unwrap();
        entries.push((key.clone(), set, sorted, index.raw(&key)));
    }
    entries
}

fn ids(items: &[ShowView]) -> BTreeSet<ShowId> {
    items.iter().map(|v| v.id).collect()
}

fn sorted_names(items: &[ShowView]) -> Vec<String> {
    let mut names: Vec<String> = items.iter().map(|v| v.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn location_search_uses_index_and_orders_by_name() {
    let h = Harness::new();
    h.seed().await;

    let (result, path) = h
        .executor
        .search_with_path(SearchCriteria {
            location: Some("  DOWNTOWN ".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(path, SearchPath::Index);
    assert_eq!(names(&result.items), vec!["Ballet Gala", "Jazz Evening", "Opera Night"]);
    assert_eq!(result.total, 3);
    assert_eq!(result.page, 1);
    assert_eq!(result.page_size, 20);
    assert_eq!(result.total_pages, 1);
}

#[tokio::test]
async fn combined_filters_intersect() {
    let h = Harness::new();
    h.seed().await;

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("downtown".to_string()),
            min_price: Some(100),
            max_price: Some(250),
            only_available: true,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(names(&result.items), vec!["Opera Night"]);
}

#[tokio::test]
async fn terms_use_and_semantics() {
    let h = Harness::new();
    h.seed().await;

    let opera = h
        .executor
        .search(SearchCriteria {
            term: Some("Opera!".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&opera.items), vec!["Opera Night", "Rock Opera"]);

    let both = h
        .executor
        .search(SearchCriteria {
            term: Some("opera grand".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&both.items), vec!["Opera Night"]);
}

#[tokio::test]
async fn term_without_usable_tokens_matches_nothing() {
    let h = Harness::new();
    h.seed().await;

    let result = h
        .executor
        .search(SearchCriteria {
            term: Some("a an ok".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert!(result.items.is_empty());
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn unknown_location_is_empty_not_fallback() {
    let h = Harness::new();
    h.seed().await;

    let (result, path) = h
        .executor
        .search_with_path(SearchCriteria {
            location: Some("Atlantis".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(path, SearchPath::Index);
    assert_eq!(result.total, 0);
    assert_eq!(result.total_pages, 0);
}

#[tokio::test]
async fn contradictory_price_range_is_rejected_before_any_lookup() {
    let h = Harness::new();
    h.index.set_failing(true);

    let err = h
        .executor
        .search(SearchCriteria {
            min_price: Some(300),
            max_price: Some(100),
            ..SearchCriteria::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TheaterError::Validation(_)));
    assert_eq!(h.index.rejected_calls(), 0);
}

#[tokio::test]
async fn pagination_reports_totals() {
    let h = Harness::new();
    for i in 0..25 {
        h.add(fixtures::show(&format!("Show {i:02}"), "Harbor", 50, 10)).await;
    }

    let criteria = |page| SearchCriteria {
        location: Some("harbor".to_string()),
        page,
        page_size: 10,
        ..SearchCriteria::default()
    };

    let third = h.executor.search(criteria(3)).await.unwrap();
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.total, 25);
    assert_eq!(third.total_pages, 3);
    assert_eq!(third.items[0].name, "Show 20");

    let past_end = h.executor.search(criteria(9)).await.unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 25);
}

#[tokio::test]
async fn page_size_is_capped() {
    let h = Harness::new();
    h.seed().await;

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("downtown".to_string()),
            page: 0,
            page_size: 5_000,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(result.page, 1);
    assert_eq!(result.page_size, 100);
}

#[tokio::test]
async fn index_failure_falls_back_with_same_membership() {
    let h = Harness::new();
    h.seed().await;
    let criteria = SearchCriteria {
        location: Some("downtown".to_string()),
        max_price: Some(150),
        ..SearchCriteria::default()
    };

    let (fast, fast_path) = h.executor.search_with_path(criteria.clone()).await.unwrap();
    h.index.set_failing(true);
    let (slow, slow_path) = h.executor.search_with_path(criteria).await.unwrap();

    assert_eq!(fast_path, SearchPath::Index);
    assert_eq!(slow_path, SearchPath::Fallback);
    assert_eq!(sorted_names(&fast.items), sorted_names(&slow.items));
    assert_eq!(fast.total, slow.total);
}

#[tokio::test]
async fn fallback_reprojects_what_it_loaded() {
    let h = Harness::new();
    h.seed().await;
    h.index.inner().clear();

    let result = h
        .executor
        .search(SearchCriteria {
            min_price: Some(0),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 0, "flushed index answers with nothing");

    let by_location = h.executor.by_location("Downtown", false).await.unwrap();
    assert_eq!(by_location.len(), 3);

    h.refresh.wait_idle().await;
    assert_eq!(h.index.inner().members("shows:location:downtown").len(), 3);

    let (again, path) = h
        .executor
        .search_with_path(SearchCriteria {
            location: Some("downtown".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(path, SearchPath::Index);
    assert_eq!(again.total, 3);
}

#[tokio::test]
async fn missing_snapshot_is_skipped() {
    let h = Harness::new();
    let kept = h.add(fixtures::show("Kept", "Harbor", 10, 10)).await;
    let lost = h.add(fixtures::show("Lost", "Harbor", 10, 10)).await;
    h.index.inner().delete(&keys::snapshot(&lost.id)).await.unwrap();

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("harbor".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, kept.id);
}

#[tokio::test]
async fn corrupt_snapshot_falls_back() {
    let h = Harness::new();
    let show = h.add(fixtures::show("Broken", "Harbor", 10, 10)).await;
    h.index
        .inner()
        .put(&keys::snapshot(&show.id), "{oops")
        .await
        .unwrap();

    let (result, path) = h
        .executor
        .search_with_path(SearchCriteria {
            location: Some("harbor".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(path, SearchPath::Fallback);
    assert_eq!(result.items[0].id, show.id);
}

#[tokio::test]
async fn only_available_follows_availability_score() {
    let h = Harness::new();
    let show = h.add(fixtures::show("Matinee", "Harbor", 10, 10)).await;
    h.indexer.update_availability(&show.id, 0).await;

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("harbor".to_string()),
            only_available: true,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert!(result.items.is_empty());
}

#[tokio::test]
async fn unfiltered_query_uses_primary_store_by_default() {
    let h = Harness::new();
    h.seed().await;

    let (result, path) = h
        .executor
        .search_with_path(SearchCriteria::default())
        .await
        .unwrap();

    assert_eq!(path, SearchPath::Fallback);
    assert_eq!(result.total, 4);
}

#[tokio::test]
async fn unfiltered_query_can_use_global_set() {
    let h = Harness::with_config(SearchConfig {
        unfiltered: UnfilteredStrategy::GlobalSet,
        ..SearchConfig::default()
    });
    h.seed().await;

    let (result, path) = h
        .executor
        .search_with_path(SearchCriteria {
            only_available: true,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(path, SearchPath::Index);
    assert_eq!(names(&result.items), vec!["Jazz Evening", "Opera Night", "Rock Opera"]);
}

#[tokio::test]
async fn by_location_rejects_blank_location() {
    let h = Harness::new();
    let err = h.executor.by_location("   ", false).await.unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
}

#[tokio::test]
async fn by_location_filters_sold_out() {
    let h = Harness::new();
    h.seed().await;

    let all = h.executor.by_location("downtown", false).await.unwrap();
    let available = h.executor.by_location("downtown", true).await.unwrap();

    assert_eq!(all.len(), 3);
    assert_eq!(names(&available), vec!["Jazz Evening", "Opera Night"]);
}

#[tokio::test]
async fn price_range_is_cheapest_first() {
    let h = Harness::new();
    h.seed().await;

    let views = h.executor.by_price_range(80, 150, None).await.unwrap();
    assert_eq!(names(&views), vec!["Jazz Evening", "Opera Night", "Rock Opera"]);

    let uptown = h.executor.by_price_range(80, 150, Some("Uptown")).await.unwrap();
    assert_eq!(names(&uptown), vec!["Rock Opera"]);

    h.index.set_failing(true);
    let fallback = h.executor.by_price_range(80, 150, None).await.unwrap();
    assert_eq!(names(&fallback), vec!["Jazz Evening", "Opera Night", "Rock Opera"]);
}

#[tokio::test]
async fn price_range_rejects_inverted_bounds() {
    let h = Harness::new();
    let err = h.executor.by_price_range(10, 5, None).await.unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
}

#[tokio::test]
async fn statistics_from_index_then_primary() {
    let h = Harness::new();
    h.seed().await;

    let stats = h.executor.statistics().await.unwrap();
    assert_eq!(stats.source, StatisticsSource::Index);
    assert_eq!(stats.total_shows, 4);
    assert_eq!(stats.indexed_in_price, Some(4));
    assert_eq!(stats.by_location.get("downtown"), Some(&3));
    assert_eq!(stats.by_location.get("uptown"), Some(&1));

    h.index.set_failing(true);
    let stats = h.executor.statistics().await.unwrap();
    assert_eq!(stats.source, StatisticsSource::PrimaryStore);
    assert_eq!(stats.total_shows, 4);
    assert_eq!(stats.indexed_in_price, None);
}

#[tokio::test]
async fn indexing_twice_changes_nothing() {
    let h = Harness::new();
    h.seed().await;
    let mut show = fixtures::show("Opera Opera", "Harbor", 60, 30);
    show.details = "opera for everyone".to_string();
    let show = h.add(show).await;
    let before = fingerprint(h.index.inner()).await;

    h.indexer.index_show(&show).await;
    h.indexer.index_show(&show).await;

    assert_eq!(fingerprint(h.index.inner()).await, before);
}

#[tokio::test]
async fn hydrated_view_matches_indexed_record() {
    let h = Harness::new();
    let mut show = fixtures::show("Swan Lake", "Old Town", 95, 120);
    show.details = "Ballet in four acts".to_string();
    show.booked_tickets = 20;
    let show = h.add(show).await;

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("old town".to_string()),
            ..SearchCriteria::default()
        })
        .await
        .unwrap();

    assert_eq!(result.items.len(), 1);
    let view = &result.items[0];
    assert_eq!(view.id, show.id);
    assert_eq!(view.name, "Swan Lake");
    assert_eq!(view.location, "Old Town");
    assert_eq!(view.price, 95);
    assert_eq!(view.available_tickets, 100);
    assert_eq!(view, &show.view());
}

#[tokio::test]
async fn freed_seats_show_up_despite_sold_out_snapshot() {
    let h = Harness::new();
    let mut show = fixtures::show("Late Show", "Harbor", 40, 50);
    show.booked_tickets = 50;
    let show = h.add(show).await;

    // Seats freed later only move the availability score.
    h.indexer.update_availability(&show.id, 50).await;

    let result = h
        .executor
        .search(SearchCriteria {
            location: Some("harbor".to_string()),
            only_available: true,
            ..SearchCriteria::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].available_tickets, 50);

    let by_location = h.executor.by_location("Harbor", true).await.unwrap();
    assert_eq!(ids(&by_location), BTreeSet::from([show.id]));
    assert_eq!(by_location[0].available_tickets, 50);
}

#[tokio::test]
async fn concurrent_availability_updates_stay_on_their_show() {
    let h = Harness::new();
    let target = h.add(fixtures::show("Target", "Harbor", 40, 50)).await;
    let other = h.add(fixtures::show("Other", "Harbor", 40, 70)).await;
    let before = fingerprint(h.index.inner()).await;

    tokio::join!(
        h.indexer.update_availability(&target.id, 40),
        h.indexer.update_availability(&target.id, 30),
    );

    let index = h.index.inner();
    let score = index.score(keys::AVAILABILITY, &target.id.to_string());
    assert!(matches!(score, Some(s) if s == 40.0 || s == 30.0), "got {score:?}");
    assert_eq!(index.score(keys::AVAILABILITY, &other.id.to_string()), Some(70.0));

    // No key was added or dropped and no snapshot was rewritten.
    assert_eq!(fingerprint(index).await, before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_location_paths_agree(
        shows in prop::collection::vec((properties::new_show(), any::<bool>()), 1..8),
        location in properties::location(),
        only_available in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            for (request, sold_out) in shows {
                let mut record = request.into_record(ShowId::new(), test_clock().now()).unwrap();
                if sold_out {
                    record.booked_tickets = record.total_tickets;
                }
                h.add(record).await;
            }

            let fast = h.executor.by_location(&location, only_available).await.unwrap();
            h.index.set_failing(true);
            let slow = h.executor.by_location(&location, only_available).await.unwrap();

            prop_assert_eq!(ids(&fast), ids(&slow));
            for view in &fast {
                let twin = slow.iter().find(|v| v.id == view.id).unwrap();
                prop_assert_eq!(view, twin);
            }
            Ok(())
        })?;
    }
}
