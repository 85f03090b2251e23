//! Similarity-graph edge construction for the 3D map.
//!
//! Edges are computed on the *original* embeddings, not the projected
//! coordinates, so semantically close items stay connected even when the
//! lossy projection pushes them apart.

use pgvector::Vector;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::SimilarityEdge;

/// Cosine similarity between two vectors. Returns 0 for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Emit an edge for every item pair whose cosine similarity strictly exceeds
/// the threshold.
pub fn build_edges(items: &[(Uuid, Vector)], threshold: f32) -> Vec<SimilarityEdge> {
    let mut edges = Vec::new();
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let similarity = cosine_similarity(items[i].1.as_slice(), items[j].1.as_slice());
            if similarity > threshold {
                edges.push(SimilarityEdge {
                    from: items[i].0,
                    to: items[j].0,
                    similarity,
                });
            }
        }
    }
    edges
}

/// [`build_edges`] with the default map threshold.
pub fn build_default_edges(items: &[(Uuid, Vector)]) -> Vec<SimilarityEdge> {
    build_edges(items, defaults::EDGE_SIMILARITY_THRESHOLD)
}
