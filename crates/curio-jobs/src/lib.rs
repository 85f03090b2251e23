//! # curio-jobs
//!
//! Background job system for curio's indexing pipeline.
//!
//! This crate provides:
//! - A polling job worker with bounded concurrency and broadcast events
//! - The two-phase indexing handlers (enrich external content, then embed)
//! - Graceful shutdown via a worker handle
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use curio_jobs::{EmbedItemHandler, EnrichItemHandler, HttpContentFetcher, JobWorker, WorkerConfig};
//! use curio_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let worker = JobWorker::new(db.clone(), WorkerConfig::from_env());
//! worker.register_handler(EnrichItemHandler::new(items.clone(), jobs.clone(),
//!     Arc::new(HttpContentFetcher::new()))).await;
//! worker.register_handler(EmbedItemHandler::new(items, encoder)).await;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod indexer;
pub mod worker;

// Re-export core types
pub use curio_core::*;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use indexer::{
    queue_indexing, ContentFetcher, EmbedItemHandler, EnrichItemHandler, EnrichedContent,
    HttpContentFetcher,
};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
