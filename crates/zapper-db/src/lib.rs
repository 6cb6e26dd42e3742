//! # zapper-db
//!
//! PostgreSQL and filesystem storage layer for file-zapper.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for attachments and artifact families
//! - Term resolution and organisational lookups
//! - A filesystem content store keyed by attachment id
//!
//! ## Example
//!
//! ```rust,ignore
//! use zapper_db::{Database, FilesystemContentStore};
//!
//! let db = Database::connect("postgres://localhost/zapper").await?;
//! let content = FilesystemContentStore::new("/var/zapper/content");
//! let att = db.attachments.get(id).await?;
//! ```

pub mod artifacts;
pub mod attachment_filter;
pub mod attachments;
pub mod directory;
pub mod file_storage;
mod outcome;
pub mod pool;

// Always compiled so integration tests (in tests/) can use the fixtures.
pub mod test_fixtures;

pub use zapper_core::*;

pub use artifacts::PgArtifactRepository;
pub use attachment_filter::{AttachmentFilterQueryBuilder, QueryParam};
pub use attachments::PgAttachmentRepository;
pub use directory::PgContextDirectory;
pub use file_storage::{generate_storage_path, generate_thumbnail_path, FilesystemContentStore};
pub use pool::{create_pool, PoolConfig};

/// Database bundle providing access to every repository.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub attachments: PgAttachmentRepository,
    pub artifacts: PgArtifactRepository,
    /// Term resolution and organisational lookups.
    pub directory: PgContextDirectory,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            attachments: PgAttachmentRepository::new(pool.clone()),
            artifacts: PgArtifactRepository::new(pool.clone()),
            directory: PgContextDirectory::new(pool.clone()),
            pool,
        }
    }

    /// Connect with pool settings read from the environment.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
