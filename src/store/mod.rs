//! Persistent record store.

mod postgres;

pub use postgres::{PgRecordStore, StoreSettings};
