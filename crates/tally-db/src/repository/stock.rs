//! # Stock Repository
//!
//! Stock counters and their adjustment audit trail.
//!
//! ## Delta Updates Only
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ❌ WRONG: Absolute update (lost update between terminals)          │
//! │     UPDATE stock_levels SET on_hand = 7 WHERE ...                  │
//! │                                                                     │
//! │  ✅ CORRECT: Delta update, applied in one statement                 │
//! │     ... SET on_hand = on_hand + excluded.on_hand RETURNING on_hand │
//! │                                                                     │
//! │  Terminal A: sells 3 → -3                                          │
//! │  Terminal B: transfer debit 2 → -2                                 │
//! │  Both land: -5 total, no read-modify-write on the client           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A debit that would take a tracked product below zero is rejected and
//! its transaction rolled back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{item_from_columns, variant_column};
use crate::error::{DbError, DbResult};
use tally_core::{AdjustmentReason, AdjustmentRecord, ItemKey, StockAdjustment};

/// Stock position of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub on_hand: i64,
    /// Held by ACTIVE reservations.
    pub reserved: i64,
    /// `on_hand - reserved`
    pub available: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: String,
    product_id: String,
    variant_id: String,
    quantity_change: i64,
    reason: AdjustmentReason,
    notes: Option<String>,
    reference: Option<String>,
    resulting_stock: i64,
    created_at: DateTime<Utc>,
}

impl From<AdjustmentRow> for AdjustmentRecord {
    fn from(row: AdjustmentRow) -> Self {
        AdjustmentRecord {
            id: row.id,
            item: item_from_columns(row.product_id, row.variant_id),
            quantity_change: row.quantity_change,
            reason: row.reason,
            notes: row.notes,
            reference: row.reference,
            resulting_stock: row.resulting_stock,
            created_at: row.created_at,
        }
    }
}

/// Repository for stock counters.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Applies one adjustment atomically and records it.
    pub async fn adjust(&self, adjustment: &StockAdjustment) -> DbResult<AdjustmentRecord> {
        let mut tx = self.pool.begin().await?;
        let record = apply_delta(&mut tx, adjustment, Utc::now()).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Current on-hand count (0 for an item never stocked).
    pub async fn on_hand(&self, item: &ItemKey) -> DbResult<i64> {
        let on_hand: Option<i64> = sqlx::query_scalar(
            "SELECT on_hand FROM stock_levels WHERE product_id = ?1 AND variant_id = ?2",
        )
        .bind(&item.product_id)
        .bind(variant_column(item))
        .fetch_optional(&self.pool)
        .await?;

        Ok(on_hand.unwrap_or(0))
    }

    /// On hand, reserved and available for one item.
    pub async fn level(&self, item: &ItemKey) -> DbResult<StockLevel> {
        let mut conn = self.pool.acquire().await?;
        level_in(&mut conn, item).await
    }

    /// Adjustment history for an item, oldest first.
    pub async fn history(&self, item: &ItemKey) -> DbResult<Vec<AdjustmentRecord>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, variant_id, quantity_change, reason, notes,
                   reference, resulting_stock, created_at
            FROM stock_adjustments
            WHERE product_id = ?1 AND variant_id = ?2
            ORDER BY rowid
            "#,
        )
        .bind(&item.product_id)
        .bind(variant_column(item))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AdjustmentRecord::from).collect())
    }

    /// Adjustments whose reference starts with `prefix` (e.g. `transfer:<id>:`).
    pub async fn by_reference_prefix(&self, prefix: &str) -> DbResult<Vec<AdjustmentRecord>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, variant_id, quantity_change, reason, notes,
                   reference, resulting_stock, created_at
            FROM stock_adjustments
            WHERE substr(reference, 1, length(?1)) = ?1
            ORDER BY rowid
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AdjustmentRecord::from).collect())
    }
}

/// Applies a delta inside the caller's transaction.
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    adjustment: &StockAdjustment,
    now: DateTime<Utc>,
) -> DbResult<AdjustmentRecord> {
    let item = &adjustment.item;
    let track_inventory = tracks_inventory(conn, item).await?;

    debug!(
        item = %item,
        delta = adjustment.quantity_change,
        reason = %adjustment.reason,
        "Applying stock delta"
    );

    let resulting_stock: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stock_levels (product_id, variant_id, on_hand, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (product_id, variant_id) DO UPDATE SET
            on_hand = on_hand + excluded.on_hand,
            updated_at = excluded.updated_at
        RETURNING on_hand
        "#,
    )
    .bind(&item.product_id)
    .bind(variant_column(item))
    .bind(adjustment.quantity_change)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    if adjustment.quantity_change < 0 && track_inventory && resulting_stock < 0 {
        return Err(DbError::InsufficientStock {
            item: item.to_string(),
            available: resulting_stock - adjustment.quantity_change,
            requested: -adjustment.quantity_change,
        });
    }

    let record = AdjustmentRecord {
        id: Uuid::new_v4().to_string(),
        item: item.clone(),
        quantity_change: adjustment.quantity_change,
        reason: adjustment.reason,
        notes: adjustment.notes.clone(),
        reference: adjustment.reference.clone(),
        resulting_stock,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO stock_adjustments (
            id, product_id, variant_id, quantity_change, reason,
            notes, reference, resulting_stock, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&record.id)
    .bind(&item.product_id)
    .bind(variant_column(item))
    .bind(record.quantity_change)
    .bind(record.reason)
    .bind(&record.notes)
    .bind(&record.reference)
    .bind(record.resulting_stock)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(record)
}

/// Stock position read inside the caller's connection or transaction.
pub(crate) async fn level_in(conn: &mut SqliteConnection, item: &ItemKey) -> DbResult<StockLevel> {
    let (on_hand, reserved): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE((SELECT on_hand FROM stock_levels
                      WHERE product_id = ?1 AND variant_id = ?2), 0),
            COALESCE((SELECT SUM(quantity) FROM reservations
                      WHERE product_id = ?1 AND variant_id = ?2 AND status = 'ACTIVE'), 0)
        "#,
    )
    .bind(&item.product_id)
    .bind(variant_column(item))
    .fetch_one(&mut *conn)
    .await?;

    Ok(StockLevel {
        on_hand,
        reserved,
        available: on_hand - reserved,
    })
}

/// Resolves the item against the catalog. Fails with NotFound for unknown
/// products or variants.
pub(crate) async fn tracks_inventory(conn: &mut SqliteConnection, item: &ItemKey) -> DbResult<bool> {
    let track: Option<bool> = sqlx::query_scalar("SELECT track_inventory FROM products WHERE id = ?1")
        .bind(&item.product_id)
        .fetch_optional(&mut *conn)
        .await?;
    let track = track.ok_or_else(|| DbError::not_found("Product", &item.product_id))?;

    if let Some(variant_id) = &item.variant_id {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM product_variants WHERE product_id = ?1 AND id = ?2",
        )
        .bind(&item.product_id)
        .bind(variant_id)
        .fetch_one(&mut *conn)
        .await?;
        if exists == 0 {
            return Err(DbError::not_found("Variant", item.to_string()));
        }
    }

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::{PricingMode, Product};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products()
            .insert(&Product {
                id: "cola".into(),
                sku: "COLA".into(),
                name: "Cola".into(),
                price_cents: 150,
                pricing_mode: PricingMode::Unit,
                variants: vec![],
                track_inventory: true,
                is_active: true,
            })
            .await
            .unwrap();
        db
    }

    fn adjustment(delta: i64, reason: AdjustmentReason) -> StockAdjustment {
        StockAdjustment {
            item: ItemKey::product("cola"),
            quantity_change: delta,
            reason,
            notes: None,
            reference: Some(format!("test:{delta}")),
        }
    }

    #[tokio::test]
    async fn test_deltas_accumulate() {
        let db = setup().await;
        let stock = db.stock();

        let first = stock.adjust(&adjustment(10, AdjustmentReason::Receipt)).await.unwrap();
        assert_eq!(first.resulting_stock, 10);
        let second = stock.adjust(&adjustment(-3, AdjustmentReason::Transfer)).await.unwrap();
        assert_eq!(second.resulting_stock, 7);

        assert_eq!(stock.on_hand(&ItemKey::product("cola")).await.unwrap(), 7);
        assert_eq!(stock.history(&ItemKey::product("cola")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_debit_below_zero_rolls_back() {
        let db = setup().await;
        let stock = db.stock();
        stock.adjust(&adjustment(2, AdjustmentReason::Receipt)).await.unwrap();

        let err = stock.adjust(&adjustment(-5, AdjustmentReason::Sale)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InsufficientStock {
                available: 2,
                requested: 5,
                ..
            }
        ));
        assert_eq!(stock.on_hand(&ItemKey::product("cola")).await.unwrap(), 2);
        assert_eq!(stock.history(&ItemKey::product("cola")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product_not_found() {
        let db = setup().await;
        let mut adj = adjustment(1, AdjustmentReason::Receipt);
        adj.item = ItemKey::product("ghost");
        assert!(matches!(
            db.stock().adjust(&adj).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_by_reference_prefix() {
        let db = setup().await;
        let stock = db.stock();
        let mut adj = adjustment(4, AdjustmentReason::Transfer);
        adj.reference = Some("transfer:t-1:credit".into());
        stock.adjust(&adj).await.unwrap();
        stock.adjust(&adjustment(1, AdjustmentReason::Receipt)).await.unwrap();

        let found = stock.by_reference_prefix("transfer:t-1:").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quantity_change, 4);
    }
}
