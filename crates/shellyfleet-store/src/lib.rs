pub mod error;
pub mod filter;
pub mod memory;
pub mod postgres_store;
pub mod redb_store;
pub mod store;

pub use error::StoreError;
pub use filter::{DeliveryEventFilter, DeviceFilter, SyncRunFilter};
pub use memory::MemoryStore;
pub use postgres_store::PostgresStore;
pub use redb_store::RedbStore;
pub use store::Storage;
