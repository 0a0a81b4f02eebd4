//! # Order Repository
//!
//! Settlement: the one remote operation that finalizes an order.
//!
//! ## Settlement Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── order id already stored?  → return stored order (replay)         │
//! │   ├── per line: apply_delta(-stock_units, SALE, "order:<id>")          │
//! │   │        └── below zero on a tracked item → ROLLBACK                 │
//! │   ├── confirm ACTIVE reservations listed in the request                │
//! │   ├── INSERT orders / order_lines / payments                           │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replaying a settled order id returns the stored order without touching
//! stock again, so a client retrying after a lost response cannot sell the
//! same cart twice.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reservation::confirm_in;
use super::stock::apply_delta;
use super::{item_from_columns, variant_column};
use crate::error::{DbError, DbResult};
use tally_core::{
    AdjustmentReason, Money, Order, OrderLine, OrderRequest, PaymentMethod, PaymentRecord, PricingMode, Quantity,
    StockAdjustment, TaxRate,
};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    receipt_number: String,
    store_id: String,
    subtotal_cents: i64,
    tax_cents: i64,
    tax_rate_bps: i64,
    total_cents: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    product_id: String,
    variant_id: String,
    name: String,
    pricing_mode: PricingMode,
    quantity_milli: i64,
    weight_milli: Option<i64>,
    unit_price_cents: i64,
    total_price_cents: i64,
    stock_units: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    method: PaymentMethod,
    amount_cents: i64,
    tendered_cents: Option<i64>,
    change_cents: Option<i64>,
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        OrderLine {
            item: item_from_columns(row.product_id, row.variant_id),
            name: row.name,
            pricing_mode: row.pricing_mode,
            quantity: Quantity::from_milli(row.quantity_milli),
            weight: row.weight_milli.map(Quantity::from_milli),
            unit_price: Money::from_cents(row.unit_price_cents),
            total_price: Money::from_cents(row.total_price_cents),
            stock_units: row.stock_units,
        }
    }
}

/// Repository for orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Settles an order: stock decrement, reservation confirmation and order
    /// rows in a single transaction.
    pub async fn settle(&self, request: &OrderRequest) -> DbResult<Order> {
        if let Some(existing) = self.get_by_id(&request.order_id).await? {
            info!(order_id = %existing.id, "Order already settled, returning stored order");
            return Ok(existing);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for line in &request.lines {
            if line.stock_units == 0 {
                continue;
            }
            apply_delta(
                &mut tx,
                &StockAdjustment {
                    item: line.item.clone(),
                    quantity_change: -line.stock_units,
                    reason: AdjustmentReason::Sale,
                    notes: None,
                    reference: Some(format!("order:{}", request.order_id)),
                },
                now,
            )
            .await?;
        }

        let confirmed = confirm_in(&mut tx, &request.reservation_ids).await?;
        if confirmed as usize != request.reservation_ids.len() {
            warn!(
                order_id = %request.order_id,
                requested = request.reservation_ids.len(),
                confirmed,
                "Some reservations were no longer active at settlement"
            );
        }

        let order = Order {
            id: request.order_id.clone(),
            receipt_number: generate_receipt_number(&request.store_id, now),
            store_id: request.store_id.clone(),
            lines: request.lines.clone(),
            subtotal: request.subtotal,
            tax: request.tax,
            tax_rate: request.tax_rate,
            total: request.total,
            payment: request.payment.clone(),
            created_at: now,
        };

        insert_order(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            receipt_number = %order.receipt_number,
            total = %order.total,
            lines = order.lines.len(),
            "Order settled"
        );
        Ok(order)
    }

    /// Gets a settled order with its lines and payment.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, receipt_number, store_id, subtotal_cents, tax_cents,
                   tax_rate_bps, total_cents, created_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT product_id, variant_id, name, pricing_mode, quantity_milli,
                   weight_milli, unit_price_cents, total_price_cents, stock_units
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let payment: PaymentRow = sqlx::query_as(
            r#"
            SELECT method, amount_cents, tendered_cents, change_cents
            FROM payments
            WHERE order_id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Payment for order", id))?;

        Ok(Some(Order {
            id: row.id,
            receipt_number: row.receipt_number,
            store_id: row.store_id,
            lines: lines.into_iter().map(OrderLine::from).collect(),
            subtotal: Money::from_cents(row.subtotal_cents),
            tax: Money::from_cents(row.tax_cents),
            tax_rate: TaxRate::from_bps(row.tax_rate_bps as u32),
            total: Money::from_cents(row.total_cents),
            payment: PaymentRecord {
                method: payment.method,
                amount: Money::from_cents(payment.amount_cents),
                tendered: payment.tendered_cents.map(Money::from_cents),
                change: payment.change_cents.map(Money::from_cents),
            },
            created_at: row.created_at,
        }))
    }
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(order_id = %order.id, "Inserting order rows");

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, receipt_number, store_id, subtotal_cents, tax_cents,
            tax_rate_bps, total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&order.id)
    .bind(&order.receipt_number)
    .bind(&order.store_id)
    .bind(order.subtotal.cents())
    .bind(order.tax.cents())
    .bind(order.tax_rate.bps())
    .bind(order.total.cents())
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;

    for (position, line) in order.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, position, product_id, variant_id, name, pricing_mode,
                quantity_milli, weight_milli, unit_price_cents, total_price_cents, stock_units
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&order.id)
        .bind(position as i64)
        .bind(&line.item.product_id)
        .bind(variant_column(&line.item))
        .bind(&line.name)
        .bind(line.pricing_mode)
        .bind(line.quantity.milli())
        .bind(line.weight.map(|w| w.milli()))
        .bind(line.unit_price.cents())
        .bind(line.total_price.cents())
        .bind(line.stock_units)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, method, amount_cents, tendered_cents, change_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&order.id)
    .bind(order.payment.method)
    .bind(order.payment.amount.cents())
    .bind(order.payment.tendered.map(|m| m.cents()))
    .bind(order.payment.change.map(|m| m.cents()))
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Receipt number: `YYYYMMDD-SS-NNNNNN` (date, store code, sub-second sequence).
pub(crate) fn generate_receipt_number(store_id: &str, now: DateTime<Utc>) -> String {
    let store_code: String = store_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<Vec<_>>()
        .iter()
        .rev()
        .take(2)
        .rev()
        .collect();
    let store_code = if store_code.len() < 2 {
        "00".to_string()
    } else {
        store_code.to_uppercase()
    };

    let seq = now.timestamp_subsec_micros() % 1_000_000;
    format!("{}-{}-{:06}", now.format("%Y%m%d"), store_code, seq)
}
