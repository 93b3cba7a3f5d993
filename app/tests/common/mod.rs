//! Shared harness: services wired over in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;
use theater::{Services, Stores, build_services};
use theater_core::store::ShowStore;
use theater_projections::{RefreshConfig, SearchConfig};
use theater_testing::{
    FlakyIndexStore, InMemoryBookingStore, InMemoryIndexStore, InMemoryShowStore, test_clock,
};
use tokio::task::JoinHandle;

pub struct TestApp {
    pub services: Services,
    pub shows: InMemoryShowStore,
    pub bookings: InMemoryBookingStore,
    pub index: FlakyIndexStore,
    pub dispatcher: JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        let shows = InMemoryShowStore::new();
        Self::with_show_store(shows.clone(), Arc::new(shows))
    }

    /// Services over `primary`, a store wrapping `shows`.
    pub fn with_show_store(shows: InMemoryShowStore, primary: Arc<dyn ShowStore>) -> Self {
        theater_testing::init_test_tracing();

        let bookings = InMemoryBookingStore::new();
        let index = FlakyIndexStore::new(InMemoryIndexStore::new());
        let stores = Stores {
            shows: primary,
            bookings: Arc::new(bookings.clone()),
            index: Arc::new(index.clone()),
            clock: Arc::new(test_clock()),
        };
        let (services, dispatcher) =
            build_services(stores, SearchConfig::default(), RefreshConfig::default());

        Self {
            services,
            shows,
            bookings,
            index,
            dispatcher,
        }
    }

    /// The index behind the failure switch.
    pub fn raw_index(&self) -> &InMemoryIndexStore {
        self.index.inner()
    }
}
