//! # Product Repository
//!
//! Catalog rows the store needs for pricing, stock tracking and the
//! product-name uniqueness check.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{PricingMode, Product, ProductVariant};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    sku: String,
    name: String,
    price_cents: i64,
    pricing_mode: PricingMode,
    track_inventory: bool,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String,
    name: String,
    sku: Option<String>,
    price_cents: Option<i64>,
}

impl ProductRow {
    fn into_product(self, variants: Vec<VariantRow>) -> Product {
        Product {
            id: self.id,
            sku: self.sku,
            name: self.name,
            price_cents: self.price_cents,
            pricing_mode: self.pricing_mode,
            variants: variants
                .into_iter()
                .map(|v| ProductVariant {
                    id: v.id,
                    name: v.name,
                    sku: v.sku,
                    price_cents: v.price_cents,
                })
                .collect(),
            track_inventory: self.track_inventory,
            is_active: self.is_active,
        }
    }
}

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product and its variants in one transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(sku = %product.sku, "Inserting product");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, pricing_mode,
                track_inventory, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.pricing_mode)
        .bind(product.track_inventory)
        .bind(product.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_variants (product_id, id, name, sku, price_cents, position)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&product.id)
            .bind(&variant.id)
            .bind(&variant.name)
            .bind(&variant.sku)
            .bind(variant.price_cents)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(product.clone())
    }

    /// Gets a product (with variants) by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, sku, name, price_cents, pricing_mode, track_inventory, is_active
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let variants = self.variants_for(&row.id).await?;
                Ok(Some(row.into_product(variants)))
            }
            None => Ok(None),
        }
    }

    /// Gets a product by ID or fails with NotFound.
    pub async fn require(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Lists active products by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, sku, name, price_cents, pricing_mode, track_inventory, is_active
            FROM products
            WHERE is_active = 1
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let variants = self.variants_for(&row.id).await?;
            products.push(row.into_product(variants));
        }
        Ok(products)
    }

    /// True when another product already uses `name` (case-insensitive,
    /// surrounding whitespace ignored).
    pub async fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM products
            WHERE lower(trim(name)) = lower(trim(?1))
            AND id != ?2
            "#,
        )
        .bind(name)
        .bind(exclude_id.unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn variants_for(&self, product_id: &str) -> DbResult<Vec<VariantRow>> {
        let variants = sqlx::query_as(
            r#"
            SELECT id, name, sku, price_cents
            FROM product_variants
            WHERE product_id = ?1
            ORDER BY position
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn sample(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: name.to_string(),
            price_cents: 250,
            pricing_mode: PricingMode::Weight,
            variants: vec![ProductVariant {
                id: "organic".to_string(),
                name: "Organic".to_string(),
                sku: None,
                price_cents: Some(320),
            }],
            track_inventory: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&sample("apples", "Apples")).await.unwrap();
        let loaded = repo.get_by_id("apples").await.unwrap().unwrap();

        assert_eq!(loaded, sample("apples", "Apples"));
        assert!(repo.get_by_id("pears").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.insert(&sample("apples", "Apples")).await.unwrap();

        let mut dup = sample("apples-2", "Other");
        dup.sku = "APPLES".to_string();
        let err = repo.insert(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_name_exists_is_case_insensitive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.insert(&sample("apples", "Gala Apples")).await.unwrap();

        assert!(repo.name_exists("  gala apples ", None).await.unwrap());
        assert!(!repo.name_exists("Gala Apples", Some("apples")).await.unwrap());
        assert!(!repo.name_exists("Pears", None).await.unwrap());
    }
}
