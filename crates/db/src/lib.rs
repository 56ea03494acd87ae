pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod source;

pub use connection::{connect_writable, database_file, read_only_options, DbPool};
pub use fixtures::{SeedResult, VerificationResult};
pub use source::{DataSourceError, SqliteDataSource};
