//! # Reservation Repository
//!
//! Soft holds on stock for orders in checkout.
//!
//! ## Lifecycle
//! ```text
//!                reserve()
//!                   │
//!                   ▼
//!               ┌────────┐  settle (same tx)   ┌───────────┐
//!               │ ACTIVE │ ──────────────────► │ CONFIRMED │
//!               └───┬────┘                     └───────────┘
//!        release()  │   expire_lapsed(now)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!     ┌──────────┐     ┌─────────┐
//!     │ RELEASED │     │ EXPIRED │
//!     └──────────┘     └─────────┘
//! ```
//!
//! A hold reduces *available* stock only; on-hand changes at settlement.
//! An ACTIVE hold past its deadline keeps holding stock until
//! [`ReservationRepository::expire_lapsed`] runs.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::stock::{level_in, tracks_inventory};
use super::{item_from_columns, variant_column};
use crate::error::{DbError, DbResult};
use tally_core::{ReservationFilter, ReservationRequest, ReservationStatus, StockReservation};

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: String,
    product_id: String,
    variant_id: String,
    quantity: i64,
    status: ReservationStatus,
    order_ref: Option<String>,
    reserved_at_ms: i64,
    expires_at_ms: i64,
}

impl TryFrom<ReservationRow> for StockReservation {
    type Error = DbError;

    fn try_from(row: ReservationRow) -> DbResult<Self> {
        let reserved_at = from_millis(row.reserved_at_ms)?;
        let expires_at = from_millis(row.expires_at_ms)?;
        Ok(StockReservation {
            id: row.id,
            item: item_from_columns(row.product_id, row.variant_id),
            quantity: row.quantity,
            status: row.status,
            order_ref: row.order_ref,
            reserved_at,
            expires_at,
        })
    }
}

fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Internal(format!("timestamp out of range: {ms}")))
}

const SELECT_RESERVATION: &str = r#"
    SELECT id, product_id, variant_id, quantity, status, order_ref,
           reserved_at_ms, expires_at_ms
    FROM reservations
"#;

/// Repository for reservations.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
}

impl ReservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReservationRepository { pool }
    }

    /// Places a hold if enough stock is available.
    ///
    /// ## Returns
    /// * `Err(DbError::InsufficientStock)` - tracked item, `available < quantity`
    pub async fn reserve(&self, request: &ReservationRequest, now: DateTime<Utc>) -> DbResult<StockReservation> {
        if request.quantity <= 0 {
            return Err(DbError::QueryFailed("reservation quantity must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let track_inventory = tracks_inventory(&mut tx, &request.item).await?;
        if track_inventory {
            let level = level_in(&mut tx, &request.item).await?;
            if level.available < request.quantity {
                return Err(DbError::InsufficientStock {
                    item: request.item.to_string(),
                    available: level.available,
                    requested: request.quantity,
                });
            }
        }

        let reservation = StockReservation {
            id: Uuid::new_v4().to_string(),
            item: request.item.clone(),
            quantity: request.quantity,
            status: ReservationStatus::Active,
            order_ref: Some(request.order_ref.clone()),
            reserved_at: now,
            expires_at: request.expires_at,
        };

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, product_id, variant_id, quantity, status, order_ref,
                reserved_at_ms, expires_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.item.product_id)
        .bind(variant_column(&reservation.item))
        .bind(reservation.quantity)
        .bind(reservation.status)
        .bind(&reservation.order_ref)
        .bind(reservation.reserved_at.timestamp_millis())
        .bind(reservation.expires_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            reservation_id = %reservation.id,
            item = %reservation.item,
            quantity = reservation.quantity,
            "Reservation placed"
        );
        Ok(reservation)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockReservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!("{SELECT_RESERVATION} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(StockReservation::try_from).transpose()
    }

    /// Releases an ACTIVE hold.
    ///
    /// Releasing an already RELEASED or EXPIRED hold is a no-op that returns
    /// it unchanged; a CONFIRMED hold cannot be released.
    pub async fn release(&self, id: &str) -> DbResult<StockReservation> {
        let updated = sqlx::query("UPDATE reservations SET status = 'RELEASED' WHERE id = ?1 AND status = 'ACTIVE'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let reservation = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Reservation", id))?;

        if updated.rows_affected() == 0 && reservation.status == ReservationStatus::Confirmed {
            return Err(DbError::invalid_state("Reservation", id, "CONFIRMED"));
        }

        Ok(reservation)
    }

    /// Lists reservations as stored. No expiry classification happens here.
    pub async fn list(&self, filter: &ReservationFilter) -> DbResult<Vec<StockReservation>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_RESERVATION);
        query.push(" WHERE 1 = 1");

        if let Some(item) = &filter.item {
            query.push(" AND product_id = ").push_bind(item.product_id.clone());
            query.push(" AND variant_id = ").push_bind(variant_column(item).to_string());
        }
        if let Some(order_ref) = &filter.order_ref {
            query.push(" AND order_ref = ").push_bind(order_ref.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY reserved_at_ms, rowid");

        let rows: Vec<ReservationRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(StockReservation::try_from).collect()
    }

    /// Persists EXPIRED for every ACTIVE hold whose deadline is before `now`.
    ///
    /// Returns how many holds were expired.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE reservations SET status = 'EXPIRED' WHERE status = 'ACTIVE' AND expires_at_ms < ?1",
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        info!(expired, "Expired lapsed reservations");
        Ok(expired)
    }
}

/// Confirms the given ACTIVE holds inside the settlement transaction.
///
/// Returns how many were confirmed.
pub(crate) async fn confirm_in(conn: &mut SqliteConnection, ids: &[String]) -> DbResult<u64> {
    let mut confirmed = 0;
    for id in ids {
        let result = sqlx::query("UPDATE reservations SET status = 'CONFIRMED' WHERE id = ?1 AND status = 'ACTIVE'")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        confirmed += result.rows_affected();
    }
    Ok(confirmed)
}
