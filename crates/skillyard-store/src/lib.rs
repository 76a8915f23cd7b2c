//! # skillyard-store
//!
//! Persistent state for Skillyard.
//!
//! A single SQLite database (WAL mode) holds a string key-value table. The
//! skills crate keeps its enable-state map under one key of this table; the
//! store itself treats every value as an opaque string.
//!
//! ```ignore
//! use skillyard_store::{Database, KvStore};
//!
//! let db = Database::open_and_migrate("data/skillyard.db").await?;
//! let kv = KvStore::new(db);
//! kv.set("skills_state", "{}").await?;
//! ```

pub mod db;
pub mod error;
pub mod kv;
pub mod migration;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use kv::KvStore;
