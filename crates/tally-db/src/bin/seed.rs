//! # Seed Data Generator
//!
//! Populates a store database with a demo catalog and opening stock.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path and opening stock per item
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --stock 50
//! ```
//!
//! ## Generated Catalog
//! - Unit-priced drinks and snacks, some with size variants
//! - Loose produce sold by weight (stock counted in grams)
//! - Open-priced items (deli counter, gift wrap) keyed at the till
//!
//! Opening stock is written as RECEIPT adjustments so the audit trail
//! starts from a known count.

use std::env;
use tally_core::{AdjustmentReason, ItemKey, PricingMode, Product, ProductVariant, StockAdjustment};
use tally_db::{Database, DbConfig};

/// Unit-priced products: (sku, name, price cents, variants as (name, price override)).
const UNIT_PRODUCTS: &[(&str, &str, i64, &[(&str, Option<i64>)])] = &[
    ("BEV-COLA", "Cola", 150, &[("330ml", None), ("500ml", Some(199)), ("2L", Some(349))]),
    ("BEV-WATER", "Spring Water", 99, &[]),
    ("BEV-OJ", "Orange Juice", 299, &[("1L", None), ("2L", Some(499))]),
    ("SNK-CHIPS", "Salted Chips", 249, &[]),
    ("SNK-CHOC", "Dark Chocolate", 325, &[]),
    ("DRY-MILK", "Whole Milk", 189, &[]),
];

/// Weight-priced products: (sku, name, price cents per kg).
const WEIGHT_PRODUCTS: &[(&str, &str, i64)] = &[
    ("PRD-APPLE", "Gala Apples", 400),
    ("PRD-BANANA", "Bananas", 219),
    ("PRD-GRAPES", "Red Grapes", 699),
];

/// Open-priced products: (sku, name).
const OPEN_PRODUCTS: &[(&str, &str)] = &[("DLI-COUNTER", "Deli Counter"), ("SVC-WRAP", "Gift Wrap")];

/// Grams on hand per weighed product for every unit of `--stock`.
const GRAMS_PER_STOCK_UNIT: i64 = 1000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut opening_stock: i64 = 25;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    opening_stock = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --stock <N>    Opening stock per item (default: 25)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Opening stock: {}", opening_stock);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating catalog...");
    let start = std::time::Instant::now();
    let mut products = 0;
    let mut receipts = 0;

    for (sku, name, price_cents, variants) in UNIT_PRODUCTS {
        let product = unit_product(sku, name, *price_cents, variants);
        let keys: Vec<ItemKey> = if product.variants.is_empty() {
            vec![product.key_for(None)]
        } else {
            product.variants.iter().map(|v| product.key_for(Some(v))).collect()
        };
        db.products().insert(&product).await?;
        products += 1;

        for key in keys {
            receive(&db, key, opening_stock).await?;
            receipts += 1;
        }
    }

    for (sku, name, price_cents) in WEIGHT_PRODUCTS {
        let product = simple_product(sku, name, *price_cents, PricingMode::Weight, true);
        db.products().insert(&product).await?;
        products += 1;

        receive(&db, product.key_for(None), opening_stock * GRAMS_PER_STOCK_UNIT).await?;
        receipts += 1;
    }

    for (sku, name) in OPEN_PRODUCTS {
        db.products()
            .insert(&simple_product(sku, name, 0, PricingMode::Open, false))
            .await?;
        products += 1;
    }

    println!();
    println!(
        "✓ Generated {} products and {} stock receipts in {:?}",
        products,
        receipts,
        start.elapsed()
    );

    let sample = db.products().list_active(1).await?;
    if let Some(first) = sample.first() {
        let level = db.stock().level(&first.key_for(first.variants.first())).await?;
        println!("  {}: {} on hand", first.name, level.on_hand);
    }

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

fn unit_product(sku: &str, name: &str, price_cents: i64, variants: &[(&str, Option<i64>)]) -> Product {
    let mut product = simple_product(sku, name, price_cents, PricingMode::Unit, true);
    product.variants = variants
        .iter()
        .map(|(variant_name, price)| ProductVariant {
            id: variant_name.to_lowercase(),
            name: variant_name.to_string(),
            sku: Some(format!("{}-{}", sku, variant_name.to_uppercase())),
            price_cents: *price,
        })
        .collect();
    product
}

fn simple_product(sku: &str, name: &str, price_cents: i64, mode: PricingMode, track: bool) -> Product {
    Product {
        id: tally_db::repository::product::generate_product_id(),
        sku: sku.to_string(),
        name: name.to_string(),
        price_cents,
        pricing_mode: mode,
        variants: vec![],
        track_inventory: track,
        is_active: true,
    }
}

async fn receive(db: &Database, item: ItemKey, quantity: i64) -> Result<(), Box<dyn std::error::Error>> {
    db.stock()
        .adjust(&StockAdjustment {
            item,
            quantity_change: quantity,
            reason: AdjustmentReason::Receipt,
            notes: Some("Opening count".to_string()),
            reference: Some("seed".to_string()),
        })
        .await?;
    Ok(())
}
