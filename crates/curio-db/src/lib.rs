//! # curio-db
//!
//! PostgreSQL database layer for curio.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for workspaces, items, sessions, turns, jobs
//! - Full-text lexical ranking with PostgreSQL tsvector
//! - Vector-similarity ranking with pgvector
//!
//! ## Example
//!
//! ```rust,ignore
//! use curio_db::Database;
//! use curio_core::{CreateItemRequest, ItemKind, ItemRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/curio").await?;
//!     let item_id = db.items.insert(workspace_id, CreateItemRequest {
//!         kind: ItemKind::Note,
//!         title: "Hello".into(),
//!         body: Some("world".into()),
//!         tags: vec![],
//!         metadata: serde_json::json!({}),
//!     }).await?;
//!     println!("Created item: {}", item_id);
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod items;
pub mod jobs;
pub mod pool;
pub mod search;
pub mod sessions;
pub mod workspaces;

// Re-export core types
pub use curio_core::*;

pub use embeddings::PgVectorSearch;
pub use items::PgItemRepository;
pub use jobs::PgJobQueue;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use search::PgFtsSearch;
pub use sessions::{PgSessionRepository, PgTurnRepository};
pub use workspaces::PgWorkspaceRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Workspace repository.
    pub workspaces: PgWorkspaceRepository,
    /// Item repository for CRUD and embedding persistence.
    pub items: PgItemRepository,
    /// Session repository.
    pub sessions: PgSessionRepository,
    /// Turn repository.
    pub turns: PgTurnRepository,
    /// Full-text search provider.
    pub search: PgFtsSearch,
    /// Vector-similarity search provider.
    pub vectors: PgVectorSearch,
    /// Job queue for background processing.
    pub jobs: PgJobQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            workspaces: PgWorkspaceRepository::new(pool.clone()),
            items: PgItemRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool.clone()),
            turns: PgTurnRepository::new(pool.clone()),
            search: PgFtsSearch::new(pool.clone()),
            vectors: PgVectorSearch::new(pool.clone()),
            jobs: PgJobQueue::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
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

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
