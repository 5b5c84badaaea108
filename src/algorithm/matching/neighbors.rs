//! Nearest-neighbour search over control vectors
//!
//! The search is a pluggable collaborator: any index that can answer "the k
//! nearest controls to this point" works. `LinearScan` is the built-in
//! exhaustive implementation.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::algorithm::matching::stratify::Sample;
use crate::algorithm::matching::types::{CaseMatch, Neighbor};
use crate::error::{MatchError, Result};

const COLLABORATOR: &str = "nearest-neighbour search";

/// A k-nearest-neighbour index over fixed-dimension points
pub trait NeighborSearch: Send + Sync {
    /// Index built once per stratum
    type Index: Send + Sync;

    /// Build an index over the control points
    fn build_index(&self, points: Vec<Vec<f64>>) -> Result<Self::Index>;

    /// The `k` points nearest to `query`, nearest first
    ///
    /// Returns fewer than `k` neighbours when the index is smaller.
    fn nearest(&self, index: &Self::Index, query: &[f64], k: usize) -> Result<Vec<Neighbor>>;
}

/// Exhaustive Euclidean search
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

/// Points held by a `LinearScan`
#[derive(Debug, Clone)]
pub struct LinearIndex {
    points: Vec<Vec<f64>>,
    dimensions: usize,
}

impl NeighborSearch for LinearScan {
    type Index = LinearIndex;

    fn build_index(&self, points: Vec<Vec<f64>>) -> Result<LinearIndex> {
        let dimensions = points.first().map_or(0, Vec::len);
        if let Some(position) = points.iter().position(|p| p.len() != dimensions) {
            return Err(MatchError::collaborator(
                COLLABORATOR,
                "index construction",
                format!(
                    "point {position} has {} dimensions, expected {dimensions}",
                    points[position].len()
                ),
            ));
        }
        Ok(LinearIndex { points, dimensions })
    }

    fn nearest(&self, index: &LinearIndex, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        if !index.points.is_empty() && query.len() != index.dimensions {
            return Err(MatchError::collaborator(
                COLLABORATOR,
                "query",
                format!(
                    "query has {} dimensions, index has {}",
                    query.len(),
                    index.dimensions
                ),
            ));
        }

        let mut neighbors: Vec<Neighbor> = index
            .points
            .iter()
            .enumerate()
            .map(|(id, point)| Neighbor {
                id,
                distance: euclidean(point, query),
            })
            .collect();
        // Stable sort keeps insertion order among equidistant points
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// Euclidean distance between two points of equal dimension
#[must_use]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Find the `k` nearest controls for every case, in case order
///
/// Distinct cases may share candidates; duplicates are resolved later.
pub fn naive_matches<S: NeighborSearch>(
    search: &S,
    cases: &[Sample],
    controls: &[Sample],
    k: usize,
) -> Result<Vec<CaseMatch>> {
    let index = search.build_index(controls.iter().map(|c| c.vector.clone()).collect())?;

    cases
        .par_iter()
        .enumerate()
        .map(|(case, sample)| {
            let found = search.nearest(&index, &sample.vector, k)?;
            check_neighbors(&found, &sample.id, controls.len(), k)?;
            Ok(CaseMatch {
                case,
                controls: found,
            })
        })
        .collect()
}

/// Reject search results that do not describe `k` or fewer known controls in distance order
fn check_neighbors(found: &[Neighbor], case_id: &str, control_count: usize, k: usize) -> Result<()> {
    let fail = |message: String| {
        Err(MatchError::collaborator(
            COLLABORATOR,
            format!("query for case '{case_id}'"),
            message,
        ))
    };

    if found.len() > k {
        return fail(format!("returned {} neighbours, at most {k} requested", found.len()));
    }
    if let Some(neighbor) = found.iter().find(|n| n.id >= control_count) {
        return fail(format!(
            "neighbour id {} is outside the {control_count} indexed controls",
            neighbor.id
        ));
    }
    if let Some(pair) = found
        .windows(2)
        .find(|w| w[0].distance.total_cmp(&w[1].distance) == Ordering::Greater)
    {
        return fail(format!(
            "neighbours not ordered by distance ({} before {})",
            pair[0].distance, pair[1].distance
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, vector: &[f64]) -> Sample {
        Sample {
            id: id.to_string(),
            vector: vector.to_vec(),
        }
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let index = LinearScan
            .build_index(vec![vec![10.0, 0.0], vec![1.0, 0.0], vec![0.0, 3.0]])
            .unwrap();
        let found = LinearScan.nearest(&index, &[0.0, 0.0], 2).unwrap();
        assert_eq!(found.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!((found[1].distance - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = LinearScan
            .build_index(vec![vec![1.0], vec![-1.0], vec![1.0]])
            .unwrap();
        let found = LinearScan.nearest(&index, &[0.0], 3).unwrap();
        assert_eq!(found.iter().map(|n| n.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = LinearScan.build_index(vec![vec![1.0]]).unwrap();
        assert_eq!(LinearScan.nearest(&index, &[0.0], 5).unwrap().len(), 1);

        let empty = LinearScan.build_index(Vec::new()).unwrap();
        assert!(LinearScan.nearest(&empty, &[0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_a_collaborator_error() {
        let err = LinearScan
            .build_index(vec![vec![1.0], vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(err, MatchError::Collaborator { .. }));

        let index = LinearScan.build_index(vec![vec![1.0]]).unwrap();
        assert!(LinearScan.nearest(&index, &[1.0, 2.0], 1).is_err());
    }

    #[test]
    fn test_naive_matches_allow_shared_candidates() {
        let cases = vec![sample("c1", &[0.0]), sample("c2", &[0.1])];
        let controls = vec![sample("k1", &[0.05]), sample("k2", &[5.0])];
        let matches = naive_matches(&LinearScan, &cases, &controls, 1).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].case, 0);
        assert_eq!(matches[0].controls[0].id, 0);
        assert_eq!(matches[1].controls[0].id, 0);
    }

    /// Search that answers every query with the same neighbours
    struct FixedSearch(Vec<Neighbor>);

    impl NeighborSearch for FixedSearch {
        type Index = ();

        fn build_index(&self, _points: Vec<Vec<f64>>) -> Result<()> {
            Ok(())
        }

        fn nearest(&self, _index: &(), _query: &[f64], _k: usize) -> Result<Vec<Neighbor>> {
            Ok(self.0.clone())
        }
    }

    fn neighbor(id: usize, distance: f64) -> Neighbor {
        Neighbor { id, distance }
    }

    #[test]
    fn test_unknown_control_id_is_rejected() {
        let cases = vec![sample("c1", &[0.0])];
        let controls = vec![sample("k1", &[0.0]), sample("k2", &[1.0])];
        let search = FixedSearch(vec![neighbor(0, 0.0), neighbor(7, 1.0)]);

        let err = naive_matches(&search, &cases, &controls, 2).unwrap_err();
        assert!(matches!(err, MatchError::Collaborator { .. }));
        assert!(err.to_string().contains("neighbour id 7"));
    }

    #[test]
    fn test_too_many_neighbours_are_rejected() {
        let cases = vec![sample("c1", &[0.0])];
        let controls = vec![sample("k1", &[0.0]), sample("k2", &[1.0])];
        let search = FixedSearch(vec![neighbor(0, 0.0), neighbor(1, 1.0)]);

        let err = naive_matches(&search, &cases, &controls, 1).unwrap_err();
        assert!(matches!(err, MatchError::Collaborator { .. }));
        assert!(naive_matches(&search, &cases, &controls, 2).is_ok());
    }

    #[test]
    fn test_unordered_neighbours_are_rejected() {
        let cases = vec![sample("c1", &[0.0])];
        let controls = vec![sample("k1", &[0.0]), sample("k2", &[1.0])];
        let search = FixedSearch(vec![neighbor(1, 1.0), neighbor(0, 0.0)]);

        assert!(naive_matches(&search, &cases, &controls, 2).is_err());
    }
}
