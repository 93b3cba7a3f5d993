//! `shows` table.

use crate::{db_error, from_db, to_db};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use theater_core::search::SearchCriteria;
use theater_core::show::{ShowId, ShowRecord};
use theater_core::store::{
    PrimaryStatistics, RecordStore, ShowStore, StoreError, StoreFuture, StoreResult,
};
use uuid::Uuid;

const SHOW_COLUMNS: &str =
    "id, name, details, price, total_tickets, booked_tickets, location, created_at, updated_at";

/// Characters the tokenizer trims from both ends of a word.
const ASCII_PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

#[derive(sqlx::FromRow)]
struct ShowRow {
    id: Uuid,
    name: String,
    details: String,
    price: i64,
    total_tickets: i64,
    booked_tickets: i64,
    location: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ShowRow {
    fn into_record(self) -> StoreResult<ShowRecord> {
        Ok(ShowRecord {
            id: ShowId::from_uuid(self.id),
            name: self.name,
            details: self.details,
            price: from_db("price", self.price)?,
            total_tickets: from_db("total_tickets", self.total_tickets)?,
            booked_tickets: from_db("booked_tickets", self.booked_tickets)?,
            location: self.location,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_records(rows: Vec<ShowRow>) -> StoreResult<Vec<ShowRecord>> {
    rows.into_iter().map(ShowRow::into_record).collect()
}

/// PostgreSQL-backed show inventory.
#[derive(Clone)]
pub struct PostgresShowStore {
    pool: PgPool,
}

impl PostgresShowStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load(&self, id: &ShowId) -> StoreResult<Option<ShowRecord>> {
        let row: Option<ShowRow> =
            sqlx::query_as(&format!("SELECT {SHOW_COLUMNS} FROM shows WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("load show", &e))?;
        row.map(ShowRow::into_record).transpose()
    }

    /// Explain why a conditional ticket update matched no row.
    async fn rejected_update(&self, id: &ShowId, requested: u32) -> StoreError {
        match self.load(id).await {
            Ok(Some(show)) => StoreError::CapacityExceeded {
                requested,
                available: show.available_tickets(),
            },
            Ok(None) => StoreError::not_found("show", id),
            Err(e) => e,
        }
    }
}

/// Append the `WHERE` clause shared by the page and count queries.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, criteria: &SearchCriteria) {
    qb.push(" WHERE TRUE");

    if let Some(location) = criteria.normalized_location() {
        qb.push(" AND LOWER(BTRIM(location)) = ").push_bind(location);
    }
    if let Some(min) = criteria.min_price {
        qb.push(" AND price >= ").push_bind(to_db(min));
    }
    if let Some(max) = criteria.max_price {
        qb.push(" AND price <= ").push_bind(to_db(max));
    }
    if let Some(min) = criteria.min_available {
        qb.push(" AND total_tickets - booked_tickets >= ")
            .push_bind(to_db(min));
    }
    if criteria.only_available {
        qb.push(" AND booked_tickets < total_tickets");
    }
    if let Some(tokens) = criteria.term_tokens() {
        if tokens.is_empty() {
            qb.push(" AND FALSE");
        }
        // Whole-word match with the tokenizer's splitting and trimming rules.
        for token in tokens {
            qb.push(
                r" AND EXISTS (SELECT 1 FROM regexp_split_to_table(LOWER(name || ' ' || details), '\s+') AS word WHERE BTRIM(word, ",
            )
            .push_bind(ASCII_PUNCTUATION)
            .push(") = ")
            .push_bind(token)
            .push(")");
        }
    }
}

impl RecordStore<ShowRecord> for PostgresShowStore {
    fn insert<'a>(&'a self, show: &'a ShowRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO shows (
                    id, name, details, price, total_tickets, booked_tickets,
                    location, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(show.id.as_uuid())
            .bind(&show.name)
            .bind(&show.details)
            .bind(to_db(show.price))
            .bind(to_db(show.total_tickets))
            .bind(to_db(show.booked_tickets))
            .bind(&show.location)
            .bind(show.created_at)
            .bind(show.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("insert show", &e))?;

            tracing::debug!(show_id = %show.id, "Show row inserted");
            Ok(())
        })
    }

    fn update<'a>(&'a self, show: &'a ShowRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update_attributes(show, None).await?;
            Ok(())
        })
    }

    fn fetch<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, Option<ShowRecord>> {
        Box::pin(self.load(id))
    }

    fn remove<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM shows WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete show", &e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("show", id));
            }
            Ok(())
        })
    }
}

impl ShowStore for PostgresShowStore {
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> StoreFuture<'a, (Vec<ShowRecord>, u64)> {
        Box::pin(async move {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM shows");
            push_filters(&mut count, criteria);
            let (total,): (i64,) = count
                .build_query_as()
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("count shows", &e))?;

            let mut page = QueryBuilder::<Postgres>::new(format!("SELECT {SHOW_COLUMNS} FROM shows"));
            push_filters(&mut page, criteria);
            page.push(" ORDER BY created_at DESC, id LIMIT ")
                .push_bind(i64::from(criteria.page_size))
                .push(" OFFSET ")
                .push_bind(i64::try_from(criteria.offset()).unwrap_or(i64::MAX));
            let rows: Vec<ShowRow> = page
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("search shows", &e))?;

            Ok((into_records(rows)?, from_db("count", total)?))
        })
    }

    fn by_location<'a>(
        &'a self,
        location: &'a str,
        only_available: bool,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        Box::pin(async move {
            let rows: Vec<ShowRow> = sqlx::query_as(&format!(
                "SELECT {SHOW_COLUMNS} FROM shows
                 WHERE LOWER(BTRIM(location)) = $1
                   AND (NOT $2 OR booked_tickets < total_tickets)
                 ORDER BY created_at DESC, id"
            ))
            .bind(location.trim().to_lowercase())
            .bind(only_available)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("shows by location", &e))?;

            into_records(rows)
        })
    }

    fn by_price_range<'a>(
        &'a self,
        min: u32,
        max: u32,
        location: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        Box::pin(async move {
            let rows: Vec<ShowRow> = sqlx::query_as(&format!(
                "SELECT {SHOW_COLUMNS} FROM shows
                 WHERE price BETWEEN $1 AND $2
                   AND ($3::TEXT IS NULL OR LOWER(BTRIM(location)) = $3)
                 ORDER BY price, name, id"
            ))
            .bind(to_db(min))
            .bind(to_db(max))
            .bind(location.map(|l| l.trim().to_lowercase()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("shows by price", &e))?;

            into_records(rows)
        })
    }

    fn update_attributes<'a>(
        &'a self,
        show: &'a ShowRecord,
        booked: Option<u32>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            // The booked count is never copied from the caller's read; a
            // reservation committed since then stays intact.
            let row: Option<ShowRow> = sqlx::query_as(&format!(
                "UPDATE shows
                 SET name = $2, details = $3, price = $4, total_tickets = $5,
                     booked_tickets = COALESCE($6, booked_tickets),
                     location = $7, updated_at = $8
                 WHERE id = $1 AND COALESCE($6, booked_tickets) <= $5
                 RETURNING {SHOW_COLUMNS}"
            ))
            .bind(show.id.as_uuid())
            .bind(&show.name)
            .bind(&show.details)
            .bind(to_db(show.price))
            .bind(to_db(show.total_tickets))
            .bind(booked.map(to_db))
            .bind(&show.location)
            .bind(show.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("update show", &e))?;

            match row {
                Some(row) => row.into_record(),
                None => match self.load(&show.id).await? {
                    Some(current) => Err(StoreError::Conflict(format!(
                        "{} booked tickets exceed the new total of {}",
                        booked.unwrap_or(current.booked_tickets),
                        show.total_tickets
                    ))),
                    None => Err(StoreError::not_found("show", show.id)),
                },
            }
        })
    }

    fn reserve_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            let row: Option<ShowRow> = sqlx::query_as(&format!(
                "UPDATE shows
                 SET booked_tickets = booked_tickets + $2, updated_at = $3
                 WHERE id = $1 AND booked_tickets + $2 <= total_tickets
                 RETURNING {SHOW_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(to_db(tickets))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("reserve tickets", &e))?;

            match row {
                Some(row) => row.into_record(),
                None => Err(self.rejected_update(id, tickets).await),
            }
        })
    }

    fn release_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            let row: Option<ShowRow> = sqlx::query_as(&format!(
                "UPDATE shows
                 SET booked_tickets = GREATEST(booked_tickets - $2, 0), updated_at = $3
                 WHERE id = $1
                 RETURNING {SHOW_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(to_db(tickets))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("release tickets", &e))?;

            row.ok_or_else(|| StoreError::not_found("show", id))?
                .into_record()
        })
    }

    fn set_booked_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        booked: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            let row: Option<ShowRow> = sqlx::query_as(&format!(
                "UPDATE shows
                 SET booked_tickets = $2, updated_at = $3
                 WHERE id = $1 AND $2 <= total_tickets
                 RETURNING {SHOW_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(to_db(booked))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("set booked tickets", &e))?;

            match row {
                Some(row) => row.into_record(),
                None => match self.load(id).await? {
                    Some(show) => Err(StoreError::CapacityExceeded {
                        requested: booked,
                        available: show.total_tickets,
                    }),
                    None => Err(StoreError::not_found("show", id)),
                },
            }
        })
    }

    fn statistics(&self) -> StoreFuture<'_, PrimaryStatistics> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT LOWER(BTRIM(location)), COUNT(*) FROM shows GROUP BY 1 ORDER BY 1",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("show statistics", &e))?;

            let mut by_location = BTreeMap::new();
            let mut total_shows = 0u64;
            for (location, count) in rows {
                let count: u64 = from_db("count", count)?;
                total_shows += count;
                by_location.insert(location, count);
            }

            Ok(PrimaryStatistics {
                total_shows,
                by_location,
            })
        })
    }
}
