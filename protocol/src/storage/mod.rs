//! # Storage Module
//!
//! Persistent storage for the settlement server. One sled database, four
//! trees, bincode values.
//!
//! ## Design Decisions
//!
//! 1. **sled transactions for coupled state.** An order and its coin change
//!    together or not at all, so every write that touches both goes through
//!    a multi-tree transaction.
//!
//! 2. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for the wire; bincode is for storage.

pub mod db;

pub use db::{DbError, DbResult, OrderDb};
