/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::coord::Coord;

/// The type of error for topology operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TopologyError {
    #[error("label/size arity mismatch: {labels} labels, {sizes} sizes")]
    ArityMismatch { labels: usize, sizes: usize },

    #[error("duplicate axis `{label}`")]
    DuplicateAxis { label: String },

    #[error("axis `{label}` must have nonzero size")]
    EmptyAxis { label: String },

    #[error("unknown axis `{label}`")]
    UnknownAxis { label: String },

    #[error("rank {rank} out of range for world size {world_size}")]
    RankOutOfRange { rank: usize, world_size: usize },

    #[error("index {index} out of range for axis `{label}` of size {size}")]
    IndexOutOfRange {
        label: String,
        index: usize,
        size: usize,
    },

    #[error("coordinate has {got} components, topology has {expected} axes")]
    DimMismatch { expected: usize, got: usize },
}

/// A bijection between flat global ranks and labeled multidimensional
/// coordinates.
///
/// A topology is built once from an ordered list of `(label, size)`
/// axes and is read-only thereafter. Ranks are assigned in row-major
/// order over the axis list (the last axis varies fastest), so the rank
/// of a coordinate is
///
/// ```text
///     rank = Σ coord[i] × strides[i],    strides[i] = ∏ sizes[j] for j > i
/// ```
///
/// and both conversions are O(number of axes) radix arithmetic; no
/// world-sized table is kept.
///
/// ```
/// let t = ndtopo::topo!(data = 2, pipe = 2);
/// assert_eq!(t.world_size(), 4);
/// assert_eq!(t.coord_of(3).unwrap().values(), &[1, 1]);
/// ```
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Topology {
    labels: Arc<Vec<String>>,
    sizes: Vec<usize>,
    strides: Vec<usize>,
    world_size: usize,
}

impl Topology {
    /// Create a new topology from ordered axis labels and sizes.
    /// Validation requires the two lists to have the same length,
    /// labels to be unique, and every size to be nonzero. An empty axis
    /// list is allowed and describes a single-process world.
    pub fn new(labels: Vec<String>, sizes: Vec<usize>) -> Result<Self, TopologyError> {
        if labels.len() != sizes.len() {
            return Err(TopologyError::ArityMismatch {
                labels: labels.len(),
                sizes: sizes.len(),
            });
        }
        for (dim, label) in labels.iter().enumerate() {
            if labels[..dim].contains(label) {
                return Err(TopologyError::DuplicateAxis {
                    label: label.clone(),
                });
            }
        }
        for (label, &size) in labels.iter().zip(sizes.iter()) {
            if size == 0 {
                return Err(TopologyError::EmptyAxis {
                    label: label.clone(),
                });
            }
        }

        let mut strides = vec![1; sizes.len()];
        for dim in (0..sizes.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * sizes[dim + 1];
        }
        let world_size = sizes.iter().product();

        Ok(Self {
            labels: Arc::new(labels),
            sizes,
            strides,
            world_size,
        })
    }

    /// The per-axis labels, in configuration order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The number of configured axes.
    pub fn num_axes(&self) -> usize {
        self.sizes.len()
    }

    /// The size of the labeled axis.
    pub fn size(&self, label: &str) -> Result<usize, TopologyError> {
        Ok(self.sizes[self.dim(label)?])
    }

    /// The total number of ranks; the product of all axis sizes.
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// The coordinate of the provided rank.
    pub fn coord_of(&self, rank: usize) -> Result<Coord, TopologyError> {
        if rank >= self.world_size {
            return Err(TopologyError::RankOutOfRange {
                rank,
                world_size: self.world_size,
            });
        }
        let values = self
            .strides
            .iter()
            .zip(self.sizes.iter())
            .map(|(&stride, &size)| (rank / stride) % size)
            .collect();
        Ok(Coord::new(Arc::clone(&self.labels), values))
    }

    /// The rank of the provided coordinate. The coordinate must carry
    /// this topology's axes, in order, with every component in range.
    pub fn rank_of(&self, coord: &Coord) -> Result<usize, TopologyError> {
        if coord.values().len() != self.sizes.len() {
            return Err(TopologyError::DimMismatch {
                expected: self.sizes.len(),
                got: coord.values().len(),
            });
        }
        for (label, ours) in coord.labels().iter().zip(self.labels.iter()) {
            if label != ours {
                return Err(TopologyError::UnknownAxis {
                    label: label.clone(),
                });
            }
        }
        let mut rank = 0;
        for (dim, &value) in coord.values().iter().enumerate() {
            if value >= self.sizes[dim] {
                return Err(TopologyError::IndexOutOfRange {
                    label: self.labels[dim].clone(),
                    index: value,
                    size: self.sizes[dim],
                });
            }
            rank += value * self.strides[dim];
        }
        Ok(rank)
    }

    /// All ranks whose coordinate has `index` at the labeled axis,
    /// ascending. The result spans every combination of the other axes;
    /// its length is `world_size / size(label)`.
    pub fn ranks_at(&self, label: &str, index: usize) -> Result<Vec<usize>, TopologyError> {
        let dim = self.dim(label)?;
        if index >= self.sizes[dim] {
            return Err(TopologyError::IndexOutOfRange {
                label: label.to_string(),
                index,
                size: self.sizes[dim],
            });
        }
        let fixed = index * self.strides[dim];
        let mut ranks: Vec<usize> = self
            .complement_bases(dim)
            .into_iter()
            .map(|base| base + fixed)
            .collect();
        ranks.sort_unstable();
        Ok(ranks)
    }

    /// Partition the full rank space into communication groups along
    /// the labeled axis: within each group every other coordinate
    /// component is held fixed while the labeled component ranges over
    /// its full domain. Each group is ordered ascending by the labeled
    /// component (group index 0 holds coordinate value 0, and so on);
    /// the group list itself is ordered row-major over the other axes.
    /// Every rank appears in exactly one group.
    pub fn axis_groups(&self, label: &str) -> Result<Vec<Vec<usize>>, TopologyError> {
        let dim = self.dim(label)?;
        let stride = self.strides[dim];
        let size = self.sizes[dim];
        Ok(self
            .complement_bases(dim)
            .into_iter()
            .map(|base| (0..size).map(|value| base + value * stride).collect())
            .collect())
    }

    /// The rank whose coordinate equals `base_rank`'s except that the
    /// labeled component is `index`.
    pub fn rank_with(
        &self,
        base_rank: usize,
        label: &str,
        index: usize,
    ) -> Result<usize, TopologyError> {
        let coord = self.coord_of(base_rank)?.replace(label, index)?;
        self.rank_of(&coord)
    }

    fn dim(&self, label: &str) -> Result<usize, TopologyError> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| TopologyError::UnknownAxis {
                label: label.to_string(),
            })
    }

    /// Rank contributions of every combination of the axes other than
    /// `dim`, enumerated row-major over those axes in configuration
    /// order.
    fn complement_bases(&self, dim: usize) -> Vec<usize> {
        let others: Vec<usize> = (0..self.sizes.len()).filter(|&d| d != dim).collect();
        if others.is_empty() {
            return vec![0];
        }
        others
            .iter()
            .map(|&d| 0..self.sizes[d])
            .multi_cartesian_product()
            .map(|combo| {
                combo
                    .iter()
                    .zip(others.iter())
                    .map(|(&value, &d)| value * self.strides[d])
                    .sum()
            })
            .collect()
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for dim in 0..self.labels.len() {
            write!(f, "{}={}", self.labels[dim], self.sizes[dim])?;
            if dim < self.labels.len() - 1 {
                write!(f, ",")?;
            }
        }
        write!(f, "}}")
    }
}

/// Construct a new topology with the given set of axis-size pairs in
/// row-major order.
///
/// ```
/// let t = ndtopo::topo!(data = 2, pipe = 4);
/// assert_eq!(t.labels(), &["data".to_string(), "pipe".to_string()]);
/// assert_eq!(t.world_size(), 8);
/// ```
#[macro_export]
macro_rules! topo {
    ( $( $label:ident = $size:expr ),* $(,)? ) => {
        {
            let mut labels = Vec::new();
            let mut sizes = Vec::new();

            $(
                labels.push(stringify!($label).to_string());
                sizes.push($size);
            )*

            $crate::topology::Topology::new(labels, sizes).unwrap()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let t = topo!(data = 2, pipe = 2, sharding = 1, model = 1);
        assert_eq!(
            t.labels(),
            &[
                "data".to_string(),
                "pipe".to_string(),
                "sharding".to_string(),
                "model".to_string()
            ]
        );
        assert_eq!(t.num_axes(), 4);
        assert_eq!(t.world_size(), 4);
        assert_eq!(t.size("data").unwrap(), 2);
        assert_eq!(t.size("model").unwrap(), 1);
        assert_eq!(t.to_string(), "{data=2,pipe=2,sharding=1,model=1}");

        assert!(matches!(
            t.size("expert").unwrap_err(),
            TopologyError::UnknownAxis { label } if label == "expert"
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            Topology::new(vec!["data".to_string()], vec![2, 2]).unwrap_err(),
            TopologyError::ArityMismatch { labels: 1, sizes: 2 }
        ));
        assert!(matches!(
            Topology::new(
                vec!["data".to_string(), "data".to_string()],
                vec![2, 2]
            )
            .unwrap_err(),
            TopologyError::DuplicateAxis { label } if label == "data"
        ));
        assert!(matches!(
            Topology::new(vec!["data".to_string(), "pipe".to_string()], vec![2, 0])
                .unwrap_err(),
            TopologyError::EmptyAxis { label } if label == "pipe"
        ));

        // no axes: a single-process world
        let t = Topology::new(vec![], vec![]).unwrap();
        assert_eq!(t.world_size(), 1);
        assert_eq!(t.coord_of(0).unwrap().values(), &[] as &[usize]);
    }

    #[test]
    fn test_coord_of() {
        let t = topo!(data = 2, pipe = 2, sharding = 1, model = 1);
        let c = t.coord_of(0).unwrap();
        assert_eq!(c.values(), &[0, 0, 0, 0]);
        let c = t.coord_of(3).unwrap();
        assert_eq!(c.get("data"), Some(1));
        assert_eq!(c.get("pipe"), Some(1));
        assert_eq!(c.get("sharding"), Some(0));
        assert_eq!(c.get("model"), Some(0));

        assert!(matches!(
            t.coord_of(4).unwrap_err(),
            TopologyError::RankOutOfRange {
                rank: 4,
                world_size: 4
            }
        ));
    }

    #[test]
    fn test_rank_coord_round_trip() {
        let t = topo!(data = 2, model = 3, pipe = 4);
        for rank in 0..t.world_size() {
            let coord = t.coord_of(rank).unwrap();
            assert_eq!(t.rank_of(&coord).unwrap(), rank);
        }
    }

    #[test]
    fn test_rank_of_validation() {
        let t = topo!(data = 2, pipe = 2);

        let narrow = topo!(data = 2);
        let c = narrow.coord_of(1).unwrap();
        assert!(matches!(
            t.rank_of(&c).unwrap_err(),
            TopologyError::DimMismatch {
                expected: 2,
                got: 1
            }
        ));

        let renamed = topo!(data = 2, model = 2);
        let c = renamed.coord_of(1).unwrap();
        assert!(matches!(
            t.rank_of(&c).unwrap_err(),
            TopologyError::UnknownAxis { label } if label == "model"
        ));

        let c = t.coord_of(1).unwrap().replace("pipe", 5).unwrap();
        assert!(matches!(
            t.rank_of(&c).unwrap_err(),
            TopologyError::IndexOutOfRange {
                label,
                index: 5,
                size: 2
            } if label == "pipe"
        ));
    }

    #[test]
    fn test_ranks_at() {
        let t = topo!(data = 2, pipe = 2, sharding = 1, model = 1);
        assert_eq!(t.ranks_at("data", 1).unwrap(), vec![2, 3]);
        assert_eq!(t.ranks_at("pipe", 0).unwrap(), vec![0, 2]);

        assert!(matches!(
            t.ranks_at("data", 2).unwrap_err(),
            TopologyError::IndexOutOfRange {
                label,
                index: 2,
                size: 2
            } if label == "data"
        ));
    }

    #[test]
    fn test_axis_groups() {
        let t = topo!(data = 2, pipe = 2, sharding = 1, model = 1);
        // one group per data value, ordered within by pipe value
        assert_eq!(
            t.axis_groups("pipe").unwrap(),
            vec![vec![0, 1], vec![2, 3]]
        );
        assert_eq!(
            t.axis_groups("data").unwrap(),
            vec![vec![0, 2], vec![1, 3]]
        );
    }

    #[test]
    fn test_axis_groups_partition() {
        let t = topo!(data = 2, pipe = 3, model = 2);
        for label in ["data", "pipe", "model"] {
            let groups = t.axis_groups(label).unwrap();
            let degree = t.size(label).unwrap();
            assert_eq!(groups.len(), t.world_size() / degree);

            let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..t.world_size()).collect::<Vec<_>>());
            for group in &groups {
                assert_eq!(group.len(), degree);
                // ordered by the labeled coordinate
                for (value, &rank) in group.iter().enumerate() {
                    assert_eq!(t.coord_of(rank).unwrap().get(label), Some(value));
                }
            }
        }
    }

    #[test]
    fn test_single_axis_groups() {
        let t = topo!(pipe = 4);
        assert_eq!(t.axis_groups("pipe").unwrap(), vec![vec![0, 1, 2, 3]]);
        assert_eq!(t.ranks_at("pipe", 2).unwrap(), vec![2]);
    }

    #[test]
    fn test_rank_with() {
        let t = topo!(data = 2, pipe = 4, model = 2);
        // rank 5 = (data=0, pipe=2, model=1)
        assert_eq!(t.rank_with(5, "pipe", 0).unwrap(), 1);
        assert_eq!(t.rank_with(5, "data", 1).unwrap(), 13);
        // replacing with the original value is the identity
        assert_eq!(t.rank_with(5, "pipe", 2).unwrap(), 5);

        assert!(t.rank_with(5, "expert", 0).is_err());
        assert!(t.rank_with(5, "pipe", 4).is_err());
    }
}
