pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_storage, connect_with_settings, DbPool};
pub use store::SqliteKeyValueStore;
