//! 2D k-d tree over area centroids
//!
//! Used by the kriging predictor to select the known areas whose centroid
//! lies within the search radius of an unknown area.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use std::cmp::Ordering;

/// A 2D k-d tree indexing centroid coordinates by their position in the
/// slice it was built from.
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    coords: Vec<(f64, f64)>,
}

#[derive(Debug, Clone)]
struct KdNode {
    /// Index into `coords`
    coord_idx: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// A centroid found by a radius query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the centroid in the slice the tree was built from
    pub index: usize,
    pub distance: f64,
}

impl KdTree {
    /// Build a k-d tree from centroid coordinates.
    ///
    /// Construction is O(n log n) using median-of-coordinate splitting.
    pub fn build(coords: &[(f64, f64)]) -> Self {
        let coords = coords.to_vec();
        let mut nodes = Vec::with_capacity(coords.len());
        if !coords.is_empty() {
            let mut indices: Vec<usize> = (0..coords.len()).collect();
            build_recursive(&coords, &mut indices, 0, &mut nodes);
        }
        Self { nodes, coords }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// All centroids within `radius` of (qx, qy), boundary included.
    ///
    /// A zero radius still returns centroids located exactly at the query.
    /// Results are in no particular order.
    pub fn within_radius(&self, qx: f64, qy: f64, radius: f64) -> Vec<Neighbor> {
        if self.nodes.is_empty() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        let mut results = Vec::new();
        self.radius_recursive(0, qx, qy, radius_sq, &mut results);
        results
    }

    /// The `k` closest centroids within `radius`, nearest first.
    ///
    /// Equal distances are ordered by index, so the selection only depends
    /// on the input order.
    pub fn nearest_within(&self, qx: f64, qy: f64, radius: f64, k: usize) -> Vec<Neighbor> {
        let mut found = self.within_radius(qx, qy, radius);
        found.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        found.truncate(k);
        found
    }

    fn radius_recursive(
        &self,
        node_idx: usize,
        qx: f64,
        qy: f64,
        radius_sq: f64,
        results: &mut Vec<Neighbor>,
    ) {
        let node = &self.nodes[node_idx];
        let (px, py) = self.coords[node.coord_idx];

        let dx = qx - px;
        let dy = qy - py;
        let dist_sq = dx * dx + dy * dy;

        if dist_sq <= radius_sq {
            results.push(Neighbor {
                index: node.coord_idx,
                distance: dist_sq.sqrt(),
            });
        }

        let diff = if node.split_dim == 0 { dx } else { dy };

        // Descend into a side when the query is on it or the splitting
        // line is within reach
        if let Some(left) = node.left
            && (diff <= 0.0 || diff * diff <= radius_sq)
        {
            self.radius_recursive(left, qx, qy, radius_sq, results);
        }
        if let Some(right) = node.right
            && (diff >= 0.0 || diff * diff <= radius_sq)
        {
            self.radius_recursive(right, qx, qy, radius_sq, results);
        }
    }
}

fn build_recursive(
    coords: &[(f64, f64)],
    indices: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let n = indices.len();
    let split_dim = (depth % 2) as u8;
    let key = |i: usize| if split_dim == 0 { coords[i].0 } else { coords[i].1 };

    indices.sort_by(|&a, &b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));

    let median = n / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        coord_idx: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    if median > 0 {
        let left_idx = build_recursive(coords, &mut indices[..median], depth + 1, nodes);
        nodes[node_idx].left = Some(left_idx);
    }
    if median + 1 < n {
        let right_idx = build_recursive(coords, &mut indices[median + 1..], depth + 1, nodes);
        nodes[node_idx].right = Some(right_idx);
    }

    node_idx
}
