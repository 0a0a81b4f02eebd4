//! # tally-db: Remote Stock Store for Tally POS
//!
//! The store that owns stock counters, reservations and settled orders,
//! and the async contract the terminal talks to it through.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  tally-engine (checkout, transfer saga, reservation client)            │
//! │       │                                                                 │
//! │       │  Arc<dyn StockStore>                                            │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  StockStore   │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (store.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ SqliteStore ──┼───►│ StockRepo     │    │ 001_init.sql │  │   │
//! │  │   │ MemoryStore   │    │ ReservationRepo│   │              │  │   │
//! │  │   │               │    │ OrderRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The [`StockStore`] contract and its SQLite backend
//! - [`memory`] - In-memory backend with failure injection
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_db::{Database, DbConfig, SqliteStore, StockStore};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! let store: Arc<dyn StockStore> = Arc::new(SqliteStore::new(db));
//!
//! let level = store.stock_level(&ItemKey::product("cola")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::{MemoryStore, StoreOp};
pub use pool::{Database, DbConfig};
pub use store::{SqliteStore, StockStore};

// Repository re-exports for convenience
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::reservation::ReservationRepository;
pub use repository::stock::{StockLevel, StockRepository};
