//! Booking lifecycle over the in-memory stores.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

mod common;

use common::TestApp;
use theater_core::TheaterError;
use theater_core::booking::{BookingFilter, BookingId, BookingStatus, ContactType, NewBooking};
use theater_core::index::keys;
use theater_core::show::{ShowId, ShowRecord};
use theater_testing::fixtures;

async fn seeded(app: &TestApp, total_tickets: u32) -> ShowRecord {
    app.services
        .shows
        .create_show(fixtures::new_show("Swan Lake", "Downtown", 100, total_tickets))
        .await
        .unwrap()
}

fn booked(app: &TestApp, id: &ShowId) -> u32 {
    app.shows.snapshot(id).unwrap().booked_tickets
}

#[tokio::test]
async fn booking_reserves_seats_and_prices_tickets() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;

    let booking = app
        .services
        .bookings
        .create_booking(fixtures::booking_request(show.id, 3))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total_amount, 300);
    assert!(booking.id.as_str().starts_with("BK-"));
    assert_eq!(booked(&app, &show.id), 3);
    assert_eq!(
        app.raw_index()
            .score(keys::AVAILABILITY, &show.id.to_string()),
        Some(7.0)
    );

    // The cached show reflects the reservation
    let cached = app.services.shows.get_show(&show.id).await.unwrap();
    assert_eq!(cached.booked_tickets, 3);
}

#[tokio::test]
async fn booking_beyond_capacity_is_rejected() {
    let app = TestApp::new();
    let show = seeded(&app, 4).await;
    let bookings = &app.services.bookings;

    bookings
        .create_booking(fixtures::booking_request(show.id, 3))
        .await
        .unwrap();
    let err = bookings
        .create_booking(fixtures::booking_request(show.id, 2))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TheaterError::CapacityExceeded {
            requested: 2,
            available: 1
        }
    ));
    assert_eq!(booked(&app, &show.id), 3);
    assert_eq!(app.bookings.len(), 1);
}

#[tokio::test]
async fn booking_unknown_show_is_not_found() {
    let app = TestApp::new();
    let err = app
        .services
        .bookings
        .create_booking(fixtures::booking_request(ShowId::new(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { .. }));
}

#[tokio::test]
async fn booking_validates_request() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    let bookings = &app.services.bookings;

    let zero = fixtures::booking_request(show.id, 0);
    assert!(matches!(
        bookings.create_booking(zero).await.unwrap_err(),
        TheaterError::Validation(_)
    ));

    let bad_email = NewBooking {
        contact_value: "not-an-email".to_string(),
        ..fixtures::booking_request(show.id, 1)
    };
    assert!(matches!(
        bookings.create_booking(bad_email).await.unwrap_err(),
        TheaterError::Validation(_)
    ));

    assert_eq!(booked(&app, &show.id), 0);
}

#[tokio::test]
async fn concurrent_bookings_never_oversell() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let bookings = app.services.bookings.clone();
        let request = fixtures::booking_request(show.id, 1);
        handles.push(tokio::spawn(async move {
            bookings.create_booking(request).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(TheaterError::CapacityExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 15);
    assert_eq!(booked(&app, &show.id), 10);
    assert_eq!(app.bookings.len(), 10);
}

#[tokio::test]
async fn failed_booking_write_releases_seats() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    app.bookings.fail_inserts(true);

    let err = app
        .services
        .bookings
        .create_booking(fixtures::booking_request(show.id, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, TheaterError::Store(_)));
    assert_eq!(booked(&app, &show.id), 0);
    assert!(app.bookings.is_empty());
}

#[tokio::test]
async fn cancel_releases_seats_once() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    let bookings = &app.services.bookings;
    let booking = bookings
        .create_booking(fixtures::booking_request(show.id, 4))
        .await
        .unwrap();

    let cancelled = bookings.cancel(&booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(booked(&app, &show.id), 0);

    let err = bookings.cancel(&booking.id).await.unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
    let err = bookings.confirm(&booking.id).await.unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
    assert_eq!(booked(&app, &show.id), 0);
}

#[tokio::test]
async fn confirm_keeps_seats_and_is_idempotent() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    let bookings = &app.services.bookings;
    let booking = bookings
        .create_booking(fixtures::booking_request(show.id, 2))
        .await
        .unwrap();

    let confirmed = bookings.confirm(&booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    let again = bookings.confirm(&booking.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Confirmed);
    assert_eq!(booked(&app, &show.id), 2);

    let fetched = bookings.get_booking(&booking.id).await.unwrap();
    assert_eq!(fetched.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn deleting_active_booking_releases_seats() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    let bookings = &app.services.bookings;
    let booking = bookings
        .create_booking(fixtures::booking_request(show.id, 5))
        .await
        .unwrap();

    bookings.delete_booking(&booking.id).await.unwrap();
    assert_eq!(booked(&app, &show.id), 0);
    assert!(app.bookings.is_empty());

    let err = bookings.get_booking(&booking.id).await.unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { .. }));
}

#[tokio::test]
async fn deleting_cancelled_booking_leaves_seats_alone() {
    let app = TestApp::new();
    let show = seeded(&app, 10).await;
    let bookings = &app.services.bookings;
    let first = bookings
        .create_booking(fixtures::booking_request(show.id, 3))
        .await
        .unwrap();
    bookings
        .create_booking(fixtures::booking_request(show.id, 2))
        .await
        .unwrap();

    bookings.cancel(&first.id).await.unwrap();
    bookings.delete_booking(&first.id).await.unwrap();
    assert_eq!(booked(&app, &show.id), 2);
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let app = TestApp::new();
    let id = BookingId::new("BK-0000000000000000");
    let err = app.services.bookings.cancel(&id).await.unwrap_err();
    assert!(matches!(err, TheaterError::NotFound { entity: "booking", .. }));
}

#[tokio::test]
async fn summary_counts_active_revenue() {
    let app = TestApp::new();
    let show = seeded(&app, 50).await;
    let bookings = &app.services.bookings;

    let mut created = Vec::new();
    for tickets in 1..=7 {
        created.push(
            bookings
                .create_booking(fixtures::booking_request(show.id, tickets))
                .await
                .unwrap(),
        );
    }
    bookings.confirm(&created[0].id).await.unwrap();
    bookings.cancel(&created[1].id).await.unwrap();

    let summary = bookings.show_booking_summary(&show.id).await.unwrap();
    assert_eq!(summary.show_name, "Swan Lake");
    assert_eq!(summary.total_bookings, 7);
    assert_eq!(summary.by_status.confirmed, 1);
    assert_eq!(summary.by_status.cancelled, 1);
    assert_eq!(summary.by_status.pending, 5);
    // 1..=7 is 28 tickets, minus the cancelled 2
    assert_eq!(summary.tickets_sold, 26);
    assert_eq!(summary.tickets_available, 24);
    assert_eq!(summary.total_revenue, 2600);
    assert_eq!(summary.recent.len(), 5);
}

#[tokio::test]
async fn validate_capacity_reads_primary_store() {
    let app = TestApp::new();
    let show = seeded(&app, 5).await;
    let bookings = &app.services.bookings;

    bookings.validate_capacity(&show.id, 5).await.unwrap();

    app.services
        .shows
        .update_ticket_availability(&show.id, 4)
        .await
        .unwrap();
    let err = bookings.validate_capacity(&show.id, 2).await.unwrap_err();
    assert!(matches!(
        err,
        TheaterError::CapacityExceeded {
            requested: 2,
            available: 1
        }
    ));

    assert!(matches!(
        bookings.validate_capacity(&show.id, 0).await.unwrap_err(),
        TheaterError::Validation(_)
    ));
}

#[tokio::test]
async fn search_and_contact_lookups() {
    let app = TestApp::new();
    let show = seeded(&app, 50).await;
    let other = seeded(&app, 50).await;
    let bookings = &app.services.bookings;

    let mine = NewBooking {
        contact_value: "ada@example.com".to_string(),
        ..fixtures::booking_request(show.id, 1)
    };
    bookings.create_booking(mine).await.unwrap();
    for _ in 0..3 {
        bookings
            .create_booking(fixtures::booking_request(other.id, 2))
            .await
            .unwrap();
    }

    let found = bookings
        .bookings_by_contact(ContactType::Email, "ada@example.com")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(
        bookings
            .bookings_by_contact(ContactType::Email, "  ")
            .await
            .unwrap_err(),
        TheaterError::Validation(_)
    ));

    let filter = BookingFilter {
        show_id: Some(other.id),
        limit: Some(2),
        ..BookingFilter::default()
    };
    let (page, total) = bookings.search_bookings(filter).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);

    let stats = bookings.booking_stats().await.unwrap();
    assert_eq!(stats.total_bookings, 4);
    assert_eq!(stats.total_tickets, 7);

    assert_eq!(bookings.bookings_by_show(&other.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn inverted_date_range_is_rejected() {
    let app = TestApp::new();
    let now = chrono::Utc::now();
    let filter = BookingFilter {
        date_from: Some(now),
        date_to: Some(now - chrono::Duration::days(1)),
        ..BookingFilter::default()
    };
    let err = app
        .services
        .bookings
        .search_bookings(filter)
        .await
        .unwrap_err();
    assert!(matches!(err, TheaterError::Validation(_)));
}
