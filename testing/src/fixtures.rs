//! Show and booking fixtures.
//!
//! Every fixture is stamped relative to [`test_clock`](crate::test_clock) so
//! results are reproducible.

use crate::mocks::test_clock;
use chrono::Duration;
use theater_core::booking::{Booking, ContactType, NewBooking};
use theater_core::environment::Clock;
use theater_core::show::{NewShow, ShowId, ShowRecord};

/// Attributes for a show with an empty description.
#[must_use]
pub fn new_show(name: &str, location: &str, price: u32, total_tickets: u32) -> NewShow {
    NewShow {
        name: name.to_string(),
        details: String::new(),
        price,
        total_tickets,
        location: location.to_string(),
    }
}

/// A stored show with nothing booked, created at the test epoch.
#[must_use]
pub fn show(name: &str, location: &str, price: u32, total_tickets: u32) -> ShowRecord {
    show_at(name, location, price, total_tickets, 0)
}

/// Like [`show`], created `seconds` after the test epoch.
#[must_use]
pub fn show_at(
    name: &str,
    location: &str,
    price: u32,
    total_tickets: u32,
    seconds: i64,
) -> ShowRecord {
    let at = test_clock().now() + Duration::seconds(seconds);
    ShowRecord {
        id: ShowId::new(),
        name: name.to_string(),
        details: String::new(),
        price,
        total_tickets,
        booked_tickets: 0,
        location: location.to_string(),
        created_at: at,
        updated_at: at,
    }
}

/// Booking request for `tickets` seats with a unique email contact.
#[must_use]
pub fn booking_request(show_id: ShowId, tickets: u32) -> NewBooking {
    NewBooking {
        show_id,
        contact_type: ContactType::Email,
        contact_value: format!("guest-{}@example.com", ShowId::new()),
        tickets,
        customer_name: None,
    }
}

/// A pending booking for `tickets` seats at `price`, placed at the test epoch.
#[must_use]
pub fn booking(show_id: ShowId, tickets: u32, price: u32) -> Booking {
    booking_request(show_id, tickets).into_booking(price, test_clock().now())
}
