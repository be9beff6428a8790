//! Core library that turns loose file references into validated, tenant-scoped file objects.

pub mod config;
pub mod error;
pub mod files;
pub mod telemetry;

pub use config::FactoryConfig;
pub use error::{FileError, Result};
pub use files::{
    File, FileDescriptor, FileFactory, FileType, FileUploadConfig, HmacUrlSigner, HttpMetadataProbe,
    InMemoryRecordStore, RecordStore, SqliteRecordStore, StorageKeyLoader, TransferMethod,
};
pub use telemetry::init_tracing;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};

/// Opens the configured SQLite database, creates the record tables and
/// returns a factory and the store backing it.
pub async fn connect(config: &FactoryConfig) -> Result<(FileFactory, Arc<SqliteRecordStore>)> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to open file record database: {}", e);
            FileError::from(e)
        })?;

    let store = Arc::new(SqliteRecordStore::new(pool));
    store.create_tables().await?;
    info!("File record store ready at {}", config.database.url);

    let factory = FileFactory::from_config(config, store.clone())?;
    Ok((factory, store))
}
