use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::GeometryError;

/// A neighbor returned by a [`KdTree`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the cloud the tree was built from.
    pub index: usize,
    /// Euclidean distance between the query and the point.
    pub distance: f64,
}

/// An immutable kd-tree over a set of 3D points.
pub struct KdTree {
    tree: ImmutableKdTree<f64, u32, 3, 32>,
    len: usize,
}

impl KdTree {
    /// Build a kd-tree from a set of points.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::EmptyCloud`] if there are no points.
    pub fn new(points: &[[f64; 3]]) -> Result<Self, GeometryError> {
        if points.is_empty() {
            return Err(GeometryError::EmptyCloud);
        }
        let tree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(points);
        Ok(Self {
            tree,
            len: points.len(),
        })
    }

    /// Number of points indexed by the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree is empty. Always `false` for a successfully built tree.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the closest point to `query`.
    pub fn nearest_one(&self, query: &[f64; 3]) -> Neighbor {
        let nn = self.tree.nearest_one::<kiddo::SquaredEuclidean>(query);
        Neighbor {
            index: nn.item as usize,
            distance: nn.distance.sqrt(),
        }
    }

    /// Find up to `k` closest points to `query`, sorted by increasing distance.
    pub fn nearest_n(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let Some(k) = NonZeroUsize::new(k.min(self.len)) else {
            return Vec::new();
        };
        self.tree
            .nearest_n::<kiddo::SquaredEuclidean>(query, k)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item as usize,
                distance: nn.distance.sqrt(),
            })
            .collect()
    }

    /// Find all points within `radius` of `query`, sorted by increasing distance.
    pub fn within_radius(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        if radius <= 0.0 {
            return Vec::new();
        }
        let mut neighbors = self
            .tree
            .within_unsorted::<kiddo::SquaredEuclidean>(query, radius * radius)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item as usize,
                distance: nn.distance.sqrt(),
            })
            .collect::<Vec<_>>();
        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.index.cmp(&b.index))
        });
        neighbors
    }
}

impl std::fmt::Debug for KdTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdTree").field("len", &self.len).finish()
    }
}
