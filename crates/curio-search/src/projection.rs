//! Power-iteration PCA for placing items in a navigable 3D space.
//!
//! Works on the N×N Gram matrix (`X·Xᵗ`) instead of the D×D covariance
//! matrix, since the number of items N is typically far smaller than the
//! embedding dimension D. The top three eigenvectors are extracted by
//! deflated power iteration with a fixed iteration count.

use pgvector::Vector;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::ProjectedPoint;

/// Project item embeddings onto three principal components.
///
/// Each item's coordinate on component `c` is `v_c[i] · sqrt(λ_c)`, then all
/// coordinates are rescaled uniformly so the maximum absolute coordinate maps
/// to `defaults::PROJECTION_BOUND`. Fewer than three meaningful components
/// (small N, or an eigenvalue at numerical zero) leave the affected axes at 0.
pub fn project(items: &[(Uuid, Vector)]) -> Vec<ProjectedPoint> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let dim = items[0].1.as_slice().len();

    // Center the embedding matrix.
    let mut mean = vec![0.0f32; dim];
    for (_, v) in items {
        for (m, x) in mean.iter_mut().zip(v.as_slice()) {
            *m += x;
        }
    }
    for m in mean.iter_mut() {
        *m /= n as f32;
    }
    let centered: Vec<Vec<f32>> = items
        .iter()
        .map(|(_, v)| {
            v.as_slice()
                .iter()
                .zip(&mean)
                .map(|(x, m)| x - m)
                .collect()
        })
        .collect();

    // N×N Gram matrix, row-major.
    let mut gram = vec![0.0f32; n * n];
    for i in 0..n {
        for j in i..n {
            let dot = dot(&centered[i], &centered[j]);
            gram[i * n + j] = dot;
            gram[j * n + i] = dot;
        }
    }

    // Deflated power iteration for the top components.
    let mut coords = vec![[0.0f32; 3]; n];
    for c in 0..defaults::PROJECTION_COMPONENTS {
        if c >= n {
            break;
        }
        let (eigenvector, eigenvalue) = power_iterate(&gram, n, c);
        if eigenvalue <= defaults::EIGENVALUE_EPSILON {
            // No signal on this axis (and none on later ones either).
            break;
        }
        let scale = eigenvalue.sqrt();
        for (i, coord) in coords.iter_mut().enumerate() {
            coord[c] = eigenvector[i] * scale;
        }
        deflate(&mut gram, n, &eigenvector, eigenvalue);
    }

    // Uniform rescale so the extreme coordinate sits on the visual bound.
    let max_abs = coords
        .iter()
        .flat_map(|c| c.iter())
        .fold(0.0f32, |acc, x| acc.max(x.abs()));
    if max_abs > 0.0 {
        let scale = defaults::PROJECTION_BOUND / max_abs;
        for coord in coords.iter_mut() {
            for x in coord.iter_mut() {
                *x *= scale;
            }
        }
    }

    items
        .iter()
        .zip(coords)
        .map(|((id, _), position)| ProjectedPoint {
            item_id: *id,
            position,
        })
        .collect()
}

/// Run fixed-count power iteration on the (possibly deflated) Gram matrix.
/// Returns the normalized eigenvector and its Rayleigh-quotient eigenvalue.
fn power_iterate(gram: &[f32], n: usize, component: usize) -> (Vec<f32>, f32) {
    // Deterministic start vector; varying by index and component keeps it
    // from being orthogonal to the dominant eigenvector.
    let mut v: Vec<f32> = (0..n)
        .map(|i| 1.0 + ((i + component + 1) as f32).recip())
        .collect();
    normalize(&mut v);

    let mut next = vec![0.0f32; n];
    for _ in 0..defaults::POWER_ITERATIONS {
        for (i, slot) in next.iter_mut().enumerate() {
            *slot = dot(&gram[i * n..(i + 1) * n], &v);
        }
        let norm = next.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= defaults::EIGENVALUE_EPSILON {
            return (v, 0.0);
        }
        for (slot, x) in v.iter_mut().zip(&next) {
            *slot = x / norm;
        }
    }

    // Rayleigh quotient: λ = vᵗ·G·v for unit v.
    let mut gv = vec![0.0f32; n];
    for (i, slot) in gv.iter_mut().enumerate() {
        *slot = dot(&gram[i * n..(i + 1) * n], &v);
    }
    let eigenvalue = dot(&gv, &v);
    (v, eigenvalue)
}

/// Subtract `λ · v·vᵗ` so the next power iteration converges to the next
/// eigenvector.
fn deflate(gram: &mut [f32], n: usize, v: &[f32], eigenvalue: f32) {
    for i in 0..n {
        for j in 0..n {
            gram[i * n + j] -= eigenvalue * v[i] * v[j];
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_core::defaults::PROJECTION_BOUND;

    fn vectors(rows: &[&[f32]]) -> Vec<(Uuid, Vector)> {
        rows.iter()
            .map(|r| (Uuid::new_v4(), Vector::from(r.to_vec())))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(project(&[]).is_empty());
    }

    #[test]
    fn test_single_item_sits_at_origin() {
        let items = vectors(&[&[1.0, 2.0, 3.0, 4.0]]);
        let points = project(&items);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_two_items_use_one_axis() {
        let items = vectors(&[&[1.0, 0.0, 0.0, 0.0], &[-1.0, 0.0, 0.0, 0.0]]);
        let points = project(&items);
        assert_eq!(points.len(), 2);
        // One direction of variance: second and third axes are silent.
        for p in &points {
            assert!(p.position[1].abs() < 1e-4, "axis 1 should be ~0");
            assert!(p.position[2].abs() < 1e-4, "axis 2 should be ~0");
        }
        // The two points sit at opposite ends of the bound.
        assert!((points[0].position[0] + points[1].position[0]).abs() < 1e-3);
        assert!((points[0].position[0].abs() - PROJECTION_BOUND).abs() < 1e-3);
    }

    #[test]
    fn test_max_coordinate_hits_bound() {
        let items = vectors(&[
            &[5.0, 0.0, 0.0, 0.0],
            &[0.0, 3.0, 0.0, 0.0],
            &[0.0, 0.0, 1.0, 0.0],
            &[-5.0, -3.0, -1.0, 0.0],
        ]);
        let points = project(&items);
        let max_abs = points
            .iter()
            .flat_map(|p| p.position.iter())
            .fold(0.0f32, |acc, x| acc.max(x.abs()));
        assert!((max_abs - PROJECTION_BOUND).abs() < 1e-3);
    }

    #[test]
    fn test_identical_embeddings_have_no_signal() {
        let items = vectors(&[&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]]);
        let points = project(&items);
        for p in points {
            assert_eq!(p.position, [0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_separated_clusters_separate_in_projection() {
        // Two tight clusters far apart along one axis must land on opposite
        // sides of the first component.
        let items = vectors(&[
            &[10.0, 0.1, 0.0, 0.0],
            &[10.0, -0.1, 0.0, 0.0],
            &[-10.0, 0.1, 0.0, 0.0],
            &[-10.0, -0.1, 0.0, 0.0],
        ]);
        let points = project(&items);
        assert!(points[0].position[0] * points[2].position[0] < 0.0);
        assert!(points[0].position[0] * points[1].position[0] > 0.0);
    }

    #[test]
    fn test_component_count_bounded_by_item_count() {
        // N=2 yields at most one meaningful component even in high dimension.
        let items = vectors(&[&[3.0, 1.0, 4.0, 1.0, 5.0], &[2.0, 7.0, 1.0, 8.0, 2.0]]);
        let points = project(&items);
        for p in &points {
            assert!(p.position[1].abs() < 1e-4);
            assert!(p.position[2].abs() < 1e-4);
        }
    }
}
