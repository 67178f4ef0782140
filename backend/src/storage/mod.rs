//! # Storage Module
//!
//! Handles persistence of the counter state.
//!
//! The domain layer only ever sees the [`KeyValueStorage`] trait: string
//! values under the fixed identifiers in [`StorageKey`]. On device the values
//! live in a single SQLite table; when that cannot be opened the backend
//! falls back to [`MemoryStorage`] for the rest of the session.
//!
//! ## Persisted values
//!
//! - `counterStartDate`: ISO-8601 instant of the local midnight the counter started
//! - `counterDailyAmount`: decimal non-negative integer
//! - `counterWithdrawalHistory`: JSON array of `{amount, createdAtIso, id}`, newest first
//! - `themeMode`: `dark`, `light` or `system`

pub mod db;
pub mod keys;
pub mod memory;
pub mod traits;

#[cfg(test)]
pub mod test_utils;

pub use db::DbConnection;
pub use keys::StorageKey;
pub use memory::MemoryStorage;
pub use traits::KeyValueStorage;
