//! # curio-search
//!
//! Ranking and projection algorithms for curio:
//! - Reciprocal Rank Fusion of lexical and vector rankings
//! - The hybrid ranker orchestrating both sources with graceful degradation
//! - Power-iteration PCA projection into a navigable 3D space
//! - Similarity-graph edge construction over original embeddings

pub mod graph;
pub mod hybrid;
pub mod projection;
pub mod rrf;

// Re-export core types
pub use curio_core::*;

pub use graph::{build_default_edges, build_edges, cosine_similarity};
pub use hybrid::{HybridRanker, RankerConfig};
pub use projection::project;
pub use rrf::{rrf_fuse, RankerWeights};
