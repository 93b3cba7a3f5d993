//! `bookings` table.

use crate::{amount_to_db, db_error, from_db, to_db};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use theater_core::booking::{
    Booking, BookingFilter, BookingId, BookingStats, BookingStatus, ContactType, ShowBookingCount,
    StatusCounts,
};
use theater_core::show::ShowId;
use theater_core::store::{BookingStore, RecordStore, StoreError, StoreFuture, StoreResult};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, show_id, contact_type, contact_value, customer_name, tickets, \
     total_amount, status, booked_at, created_at, updated_at";

const TOP_SHOWS: i64 = 10;
const RECENT_BOOKINGS: i64 = 10;

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: String,
    show_id: Uuid,
    contact_type: String,
    contact_value: String,
    customer_name: Option<String>,
    tickets: i64,
    total_amount: i64,
    status: String,
    booked_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> StoreResult<Booking> {
        let contact_type: ContactType = self
            .contact_type
            .parse()
            .map_err(|e| StoreError::Serialization(format!("booking {}: {e}", self.id)))?;
        let status: BookingStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Serialization(format!("booking {}: {e}", self.id)))?;

        Ok(Booking {
            id: BookingId::new(self.id),
            show_id: ShowId::from_uuid(self.show_id),
            contact_type,
            contact_value: self.contact_value,
            customer_name: self.customer_name,
            tickets: from_db("tickets", self.tickets)?,
            total_amount: from_db("total_amount", self.total_amount)?,
            status,
            booked_at: self.booked_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(BookingRow::into_booking).collect()
}

/// PostgreSQL-backed booking ledger.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: &BookingId) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("load booking", &e))?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn status_counts(&self, show_id: Option<&ShowId>) -> StoreResult<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r"
            SELECT status, COUNT(*)
            FROM bookings
            WHERE ($1::UUID IS NULL OR show_id = $1)
            GROUP BY status
            ",
        )
        .bind(show_id.map(ShowId::as_uuid))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("booking status counts", &e))?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count: u64 = from_db("count", count)?;
            match status.parse::<BookingStatus>() {
                Ok(BookingStatus::Pending) => counts.pending = count,
                Ok(BookingStatus::Confirmed) => counts.confirmed = count,
                Ok(BookingStatus::Cancelled) => counts.cancelled = count,
                Err(e) => return Err(StoreError::Serialization(e.to_string())),
            }
        }
        Ok(counts)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    qb.push(" WHERE TRUE");

    if let Some(show_id) = filter.show_id {
        qb.push(" AND show_id = ").push_bind(*show_id.as_uuid());
    }
    if let Some(contact_type) = filter.contact_type {
        qb.push(" AND contact_type = ").push_bind(contact_type.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND booked_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND booked_at <= ").push_bind(to);
    }
}

impl RecordStore<Booking> for PostgresBookingStore {
    fn insert<'a>(&'a self, booking: &'a Booking) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO bookings (
                    id, show_id, contact_type, contact_value, customer_name, tickets,
                    total_amount, status, booked_at, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ",
            )
            .bind(booking.id.as_str())
            .bind(booking.show_id.as_uuid())
            .bind(booking.contact_type.as_str())
            .bind(&booking.contact_value)
            .bind(booking.customer_name.as_deref())
            .bind(to_db(booking.tickets))
            .bind(amount_to_db(booking.total_amount)?)
            .bind(booking.status.as_str())
            .bind(booking.booked_at)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("insert booking", &e))?;

            tracing::debug!(booking_id = %booking.id, show_id = %booking.show_id, "Booking row inserted");
            Ok(())
        })
    }

    fn update<'a>(&'a self, booking: &'a Booking) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE bookings
                SET contact_type = $2, contact_value = $3, customer_name = $4, tickets = $5,
                    total_amount = $6, status = $7, updated_at = $8
                WHERE id = $1
                ",
            )
            .bind(booking.id.as_str())
            .bind(booking.contact_type.as_str())
            .bind(&booking.contact_value)
            .bind(booking.customer_name.as_deref())
            .bind(to_db(booking.tickets))
            .bind(amount_to_db(booking.total_amount)?)
            .bind(booking.status.as_str())
            .bind(booking.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update booking", &e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("booking", &booking.id));
            }
            Ok(())
        })
    }

    fn fetch<'a>(&'a self, id: &'a BookingId) -> StoreFuture<'a, Option<Booking>> {
        Box::pin(self.load(id))
    }

    fn remove<'a>(&'a self, id: &'a BookingId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete booking", &e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("booking", id));
            }
            Ok(())
        })
    }
}

impl BookingStore for PostgresBookingStore {
    fn search<'a>(&'a self, filter: &'a BookingFilter) -> StoreFuture<'a, (Vec<Booking>, u64)> {
        Box::pin(async move {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count
                .build_query_as()
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("count bookings", &e))?;

            let mut page =
                QueryBuilder::<Postgres>::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings"));
            push_filters(&mut page, filter);
            page.push(" ORDER BY booked_at DESC, id LIMIT ")
                .push_bind(i64::from(filter.limit()))
                .push(" OFFSET ")
                .push_bind(i64::from(filter.offset()));
            let rows: Vec<BookingRow> = page
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("search bookings", &e))?;

            Ok((into_bookings(rows)?, from_db("count", total)?))
        })
    }

    fn by_show<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE show_id = $1 ORDER BY booked_at DESC, id"
            ))
            .bind(show_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("bookings by show", &e))?;

            into_bookings(rows)
        })
    }

    fn by_contact<'a>(
        &'a self,
        contact_type: ContactType,
        contact_value: &'a str,
    ) -> StoreFuture<'a, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE contact_type = $1 AND contact_value = $2
                 ORDER BY booked_at DESC, id"
            ))
            .bind(contact_type.as_str())
            .bind(contact_value.trim())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("bookings by contact", &e))?;

            into_bookings(rows)
        })
    }

    fn tickets_sold<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let (sold,): (i64,) = sqlx::query_as(
                r"
                SELECT COALESCE(SUM(tickets), 0)::BIGINT
                FROM bookings
                WHERE show_id = $1 AND status IN ('pending', 'confirmed')
                ",
            )
            .bind(show_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("tickets sold", &e))?;

            from_db("tickets_sold", sold)
        })
    }

    fn stats(&self) -> StoreFuture<'_, BookingStats> {
        Box::pin(async move {
            let (total_bookings, total_tickets, total_revenue): (i64, i64, i64) = sqlx::query_as(
                r"
                SELECT COUNT(*),
                       COALESCE(SUM(tickets), 0)::BIGINT,
                       COALESCE(SUM(total_amount), 0)::BIGINT
                FROM bookings
                ",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("booking totals", &e))?;

            let by_status = self.status_counts(None).await?;

            let top: Vec<(Uuid, i64)> = sqlx::query_as(
                r"
                SELECT show_id, COUNT(*) AS bookings
                FROM bookings
                GROUP BY show_id
                ORDER BY bookings DESC, show_id
                LIMIT $1
                ",
            )
            .bind(TOP_SHOWS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("top shows", &e))?;

            let top_shows = top
                .into_iter()
                .map(|(show_id, bookings)| {
                    Ok(ShowBookingCount {
                        show_id: ShowId::from_uuid(show_id),
                        bookings: from_db("bookings", bookings)?,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;

            let recent: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY booked_at DESC, id LIMIT $1"
            ))
            .bind(RECENT_BOOKINGS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("recent bookings", &e))?;

            Ok(BookingStats {
                total_bookings: from_db("total_bookings", total_bookings)?,
                total_tickets: from_db("total_tickets", total_tickets)?,
                total_revenue: from_db("total_revenue", total_revenue)?,
                by_status,
                top_shows,
                recent: into_bookings(recent)?,
            })
        })
    }

    fn transition_status<'a>(
        &'a self,
        id: &'a BookingId,
        from: BookingStatus,
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Booking> {
        Box::pin(async move {
            let row: Option<BookingRow> = sqlx::query_as(&format!(
                "UPDATE bookings SET status = $3, updated_at = $4
                 WHERE id = $1 AND status = $2
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(id.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("transition booking", &e))?;

            if let Some(row) = row {
                return row.into_booking();
            }
            match self.load(id).await? {
                Some(current) => Err(StoreError::Conflict(format!(
                    "booking {id} is {}, expected {from}",
                    current.status
                ))),
                None => Err(StoreError::not_found("booking", id)),
            }
        })
    }
}
