//! Shared records and storage for relaybase
//!
//! Record types, the `RecordStore` interface and its Postgres and in-memory
//! implementations.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod db;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use memory::MemoryStore;
pub use postgres::PgRecordStore;
pub use store::{new_record_id, RecordStore, StoreError, StoreResult, RECORD_ID_LEN};
pub use types::*;
