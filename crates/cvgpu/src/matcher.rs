//! Brute-force descriptor matching

use crate::context::GpuContext;
use crate::engine::{ComputeEngine, MatcherHandle};
use crate::error::{GpuError, GpuResult};
use crate::mat::GpuMat;
use crate::ops::{engine_for, mask_handle, require_channels, require_type};
use crate::types::{Depth, DistanceType, MatType, Size};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// One match between a query descriptor and a train descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Row of the query descriptor
    pub query_idx: i32,
    /// Row of the matched train descriptor
    pub train_idx: i32,
    /// Distance between the two descriptors
    pub distance: f32,
}

/// Device-resident result of [`BruteForceMatcher::knn_match`]
#[derive(Debug)]
pub struct KnnMatches {
    /// Train indices, 32SC1, `query.rows x k`; -1 marks no match
    pub train_idx: GpuMat,
    /// Distances, 32FC1, `query.rows x k`
    pub distance: GpuMat,
    k: i32,
}

impl KnnMatches {
    /// Neighbours requested per query row
    pub fn k(&self) -> i32 {
        self.k
    }

    /// Download both result matrices and group them by query row
    pub fn download(&self) -> GpuResult<Vec<Vec<Match>>> {
        let indices = self.train_idx.to_host()?.to_elements::<i32>()?;
        let distances = self.distance.to_host()?.to_elements::<f32>()?;
        Ok(collect_matches(&indices, &distances, self.k as usize))
    }
}

/// Group row-major `k`-wide index/distance tables by query, skipping -1 indices
fn collect_matches(indices: &[i32], distances: &[f32], k: usize) -> Vec<Vec<Match>> {
    if k == 0 {
        return Vec::new();
    }
    indices
        .chunks(k)
        .zip(distances.chunks(k))
        .enumerate()
        .map(|(query, (row_idx, row_dist))| {
            row_idx
                .iter()
                .zip(row_dist)
                .filter(|(idx, _)| **idx >= 0)
                .map(|(&train_idx, &distance)| Match {
                    query_idx: query as i32,
                    train_idx,
                    distance,
                })
                .collect()
        })
        .collect()
}

/// Brute-force matcher owning one native matcher handle
pub struct BruteForceMatcher {
    engine: Arc<dyn ComputeEngine>,
    handle: Option<MatcherHandle>,
    distance: DistanceType,
}

impl BruteForceMatcher {
    /// Create a native matcher on the engine of `ctx`
    pub fn new(ctx: &GpuContext, distance: DistanceType) -> GpuResult<Self> {
        let engine = ctx.engine().clone();
        let handle = engine.matcher_create(distance)?;
        trace!(?handle, ?distance, "matcher created");
        Ok(Self {
            engine,
            handle: Some(handle),
            distance,
        })
    }

    /// Distance metric chosen at creation
    pub fn distance_type(&self) -> DistanceType {
        self.distance
    }

    /// Find the `k` nearest train rows for every query row.
    ///
    /// `query` and `train` are single-channel with the same depth and column
    /// count. Hamming needs 8U, 16U or 32S descriptors; L1 and L2 take any
    /// depth but 64F. A `mask` is 8UC1 with one row per query and one column per
    /// train descriptor; zero entries exclude a pair.
    pub fn knn_match(
        &mut self,
        query: &GpuMat,
        train: &GpuMat,
        k: i32,
        mask: Option<&GpuMat>,
    ) -> GpuResult<KnnMatches> {
        const OP: &str = "knn_match";
        let handle = self.handle.ok_or(GpuError::Released { operation: OP })?;
        let (query_h, train_h) = (query.handle(OP)?, train.handle(OP)?);
        let engine = engine_for(OP, query, &[train])?;
        if !crate::mat::same_engine(engine, &self.engine) {
            return Err(GpuError::EngineMismatch { operation: OP });
        }

        if k < 1 {
            return Err(GpuError::InvalidParameter {
                parameter: "k",
                reason: format!("{k} must be at least 1"),
            });
        }
        require_channels(OP, query, 1)?;
        require_channels(OP, train, 1)?;
        self.check_depth(query)?;
        require_type(OP, train, &[query.mat_type()])?;
        if train.cols() != query.cols() {
            return Err(GpuError::SizeMismatch {
                operation: OP,
                expected: Size::new(query.cols(), train.rows()),
                actual: train.dims(),
            });
        }
        let mask_h = mask_handle(OP, engine, mask, Size::new(train.rows(), query.rows()))?;

        let mut train_idx = query.new_on_same_engine(query.rows(), k, MatType::CV_32SC1)?;
        let mut distance = query.new_on_same_engine(query.rows(), k, MatType::CV_32FC1)?;
        let idx_h = train_idx.handle(OP)?;
        let dist_h = distance.handle(OP)?;

        if let Err(err) = engine.matcher_knn_match(handle, query_h, train_h, idx_h, dist_h, k, mask_h) {
            train_idx.release();
            distance.release();
            return Err(err);
        }
        Ok(KnnMatches {
            train_idx,
            distance,
            k,
        })
    }

    /// Release the native matcher. Later calls do nothing.
    pub fn release(&mut self) {
        self.engine.matcher_release(&mut self.handle);
    }

    /// Whether the native matcher has been released
    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    fn check_depth(&self, query: &GpuMat) -> GpuResult<()> {
        let depth = query.depth();
        let accepted = match self.distance {
            DistanceType::Hamming => matches!(depth, Depth::U8 | Depth::U16 | Depth::S32),
            DistanceType::L1 | DistanceType::L2 => depth != Depth::F64,
        };
        if accepted {
            Ok(())
        } else {
            Err(GpuError::UnsupportedType {
                operation: "knn_match",
                mat_type: query.mat_type(),
            })
        }
    }
}

impl Drop for BruteForceMatcher {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BruteForceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BruteForceMatcher")
            .field("engine", &self.engine.name())
            .field("distance", &self.distance)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_matches_groups_rows() {
        let indices = [4, 1, 0, -1];
        let distances = [0.5, 1.5, 2.0, 0.0];
        let matches = collect_matches(&indices, &distances, 2);

        assert_eq!(matches.len(), 2);
        assert_eq!(
            matches[0],
            vec![
                Match { query_idx: 0, train_idx: 4, distance: 0.5 },
                Match { query_idx: 0, train_idx: 1, distance: 1.5 },
            ]
        );
        assert_eq!(matches[1], vec![Match { query_idx: 1, train_idx: 0, distance: 2.0 }]);
    }

    #[test]
    fn test_collect_matches_all_missing() {
        let matches = collect_matches(&[-1, -1, -1], &[0.0; 3], 3);
        assert_eq!(matches, vec![Vec::<Match>::new()]);
    }

    #[test]
    fn test_collect_matches_zero_k() {
        assert!(collect_matches(&[], &[], 0).is_empty());
    }
}
