//! KD-tree over the discrete belief points.
//!
//! Splits on the coordinate of widest spread at the median; leaves hold at
//! most `leaf_size` points and are scanned linearly. Queries return the
//! point with the smallest squared Euclidean distance, breaking exact ties
//! towards the smaller point index.

use std::cmp::Ordering;

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::belief::Belief;
use crate::error::{DoxaError, Result};

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct NearestNeighborIndex {
    points: Array2<f64>,
    /// Point indices, permuted so every node covers a contiguous range
    order: Vec<usize>,
    nodes: Vec<Node>,
    leaf_size: usize,
}

impl NearestNeighborIndex {
    pub fn new(points: Array2<f64>, leaf_size: usize) -> Result<Self> {
        if points.nrows() == 0 || points.ncols() == 0 {
            return Err(DoxaError::invalid_parameter(
                "points".to_string(),
                format!("index needs at least one non-empty point, got shape {:?}", points.shape()),
            ));
        }
        if leaf_size == 0 {
            return Err(DoxaError::invalid_parameter("leaf_size", "must be at least 1"));
        }
        let mut index = NearestNeighborIndex {
            order: (0..points.nrows()).collect(),
            points,
            nodes: Vec::new(),
            leaf_size,
        };
        let n = index.order.len();
        index.build(0, n);
        Ok(index)
    }

    /// Index over belief vectors of a common length
    pub fn from_beliefs(beliefs: &[Belief], leaf_size: usize) -> Result<Self> {
        let dim = beliefs.first().map(Belief::len).unwrap_or(0);
        let mut points = Array2::zeros((beliefs.len(), dim));
        for (i, belief) in beliefs.iter().enumerate() {
            if belief.len() != dim {
                return Err(DoxaError::dimension_mismatch(
                    format!("belief of length {}", dim),
                    format!("belief {} of length {}", i, belief.len()),
                ));
            }
            points.row_mut(i).assign(belief.probs());
        }
        Self::new(points, leaf_size)
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    pub fn points(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    pub fn point(&self, i: usize) -> ArrayView1<'_, f64> {
        self.points.row(i)
    }

    fn build(&mut self, start: usize, end: usize) -> usize {
        let id = self.nodes.len();
        if end - start <= self.leaf_size {
            self.nodes.push(Node::Leaf { start, end });
            return id;
        }

        let axis = self.widest_axis(start, end);
        let points = &self.points;
        self.order[start..end].sort_by(|&a, &b| {
            points[[a, axis]]
                .total_cmp(&points[[b, axis]])
                .then(a.cmp(&b))
        });
        let mid = start + (end - start) / 2;
        let value = self.points[[self.order[mid], axis]];

        // placeholder, patched once both children exist
        self.nodes.push(Node::Leaf { start, end });
        let left = self.build(start, mid);
        let right = self.build(mid, end);
        self.nodes[id] = Node::Split {
            axis,
            value,
            left,
            right,
        };
        id
    }

    fn widest_axis(&self, start: usize, end: usize) -> usize {
        let mut best = (0, f64::NEG_INFINITY);
        for axis in 0..self.dim() {
            let (lo, hi) = self.order[start..end].iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &i| {
                    let v = self.points[[i, axis]];
                    (lo.min(v), hi.max(v))
                },
            );
            if hi - lo > best.1 {
                best = (axis, hi - lo);
            }
        }
        best.0
    }

    /// Index of the point nearest to `query`
    pub fn nearest(&self, query: ArrayView1<'_, f64>) -> usize {
        let mut best = (f64::INFINITY, usize::MAX);
        self.search(0, query, &mut best);
        best.1
    }

    pub fn snap(&self, belief: &Belief) -> usize {
        self.nearest(belief.view())
    }

    /// Nearest point for every row of `queries`
    pub fn nearest_batch(&self, queries: ArrayView2<'_, f64>, parallel: bool) -> Vec<usize> {
        if parallel {
            queries
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(|q| self.nearest(q))
                .collect()
        } else {
            queries.axis_iter(Axis(0)).map(|q| self.nearest(q)).collect()
        }
    }

    pub fn snap_batch(&self, beliefs: &[Belief], parallel: bool) -> Vec<usize> {
        if parallel {
            beliefs.par_iter().map(|b| self.snap(b)).collect()
        } else {
            beliefs.iter().map(|b| self.snap(b)).collect()
        }
    }

    fn search(&self, node: usize, query: ArrayView1<'_, f64>, best: &mut (f64, usize)) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &i in &self.order[start..end] {
                    let d = squared_distance(self.points.row(i), query);
                    let closer = match d.total_cmp(&best.0) {
                        Ordering::Less => true,
                        Ordering::Equal => i < best.1,
                        Ordering::Greater => false,
                    };
                    if closer {
                        *best = (d, i);
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = query[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.search(near, query, best);
                // equal distances may still hold a smaller index
                if diff * diff <= best.0 {
                    self.search(far, query, best);
                }
            }
        }
    }
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(points: &Array2<f64>, query: ArrayView1<'_, f64>) -> usize {
        let mut best = (f64::INFINITY, usize::MAX);
        for (i, row) in points.axis_iter(Axis(0)).enumerate() {
            let d = squared_distance(row, query);
            if d < best.0 {
                best = (d, i);
            }
        }
        best.1
    }

    #[test]
    fn test_exact_points_snap_to_themselves() {
        let points = array![[1.0, 0.0], [0.5, 0.5], [0.0, 1.0]];
        let index = NearestNeighborIndex::new(points.clone(), 1).unwrap();
        for i in 0..3 {
            assert_eq!(index.nearest(points.row(i)), i);
        }
        assert_eq!(index.nearest(array![0.7, 0.3].view()), 1);
        assert_eq!(index.nearest(array![0.9, 0.1].view()), 0);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 500;
        let dim = 4;
        let mut points = Array2::zeros((n, dim));
        for mut row in points.axis_iter_mut(Axis(0)) {
            let raw: Vec<f64> = (0..dim).map(|_| rng.gen::<f64>()).collect();
            let total: f64 = raw.iter().sum();
            for (j, v) in raw.iter().enumerate() {
                row[j] = v / total;
            }
        }
        let index = NearestNeighborIndex::new(points.clone(), 8).unwrap();

        let mut queries = Array2::zeros((200, dim));
        for mut row in queries.axis_iter_mut(Axis(0)) {
            for j in 0..dim {
                row[j] = rng.gen::<f64>();
            }
        }
        let snapped = index.nearest_batch(queries.view(), false);
        for (q, &i) in queries.axis_iter(Axis(0)).zip(snapped.iter()) {
            assert_eq!(i, brute_force(&points, q));
        }
        assert_eq!(index.nearest_batch(queries.view(), true), snapped);
    }

    #[test]
    fn test_ties_prefer_smaller_index() {
        let points = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let index = NearestNeighborIndex::new(points, 1).unwrap();
        assert_eq!(index.nearest(array![0.0, 1.0].view()), 0);
        assert_eq!(index.nearest(array![0.5, 0.5].view()), 0);
    }

    #[test]
    fn test_from_beliefs() {
        let beliefs = vec![Belief::uniform(2), Belief::new(vec![1.0, 0.0]).unwrap()];
        let index = NearestNeighborIndex::from_beliefs(&beliefs, 16).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dim(), 2);
        assert_eq!(index.snap(&Belief::new(vec![0.8, 0.2]).unwrap()), 1);
        assert_eq!(index.snap_batch(&beliefs, true), vec![0, 1]);

        let mixed = vec![Belief::uniform(2), Belief::uniform(3)];
        assert!(NearestNeighborIndex::from_beliefs(&mixed, 16).is_err());
        assert!(NearestNeighborIndex::from_beliefs(&[], 16).is_err());
    }
}
