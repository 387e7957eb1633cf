/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`Topology`] and related types.
//!
//! These strategies are used in `proptest`-based tests to construct
//! randomized axis configurations for testing the rank↔coordinate
//! bijection and the group-partition algebra.
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::Topology;

/// Axis names drawn for generated topologies, in configuration order.
const LABELS: &[&str] = &["data", "model", "pipe", "sharding", "expert", "context"];

/// Generates a random [`Topology`] with between 1 and `max_axes` axes,
/// where each axis has a size between 1 and `max_size` (inclusive).
/// Axis names are drawn in order from a fixed pool, so labels are
/// always unique.
pub fn gen_topology(max_axes: usize, max_size: usize) -> impl Strategy<Value = Topology> {
    assert!(max_axes <= LABELS.len());
    prop::collection::vec(1..=max_size, 1..=max_axes).prop_map(|sizes| {
        let labels = LABELS[..sizes.len()]
            .iter()
            .map(|l| l.to_string())
            .collect();
        Topology::new(labels, sizes).expect("valid axis config")
    })
}

/// Generates a topology together with a rank valid in it.
pub fn gen_topology_and_rank(
    max_axes: usize,
    max_size: usize,
) -> impl Strategy<Value = (Topology, usize)> {
    gen_topology(max_axes, max_size)
        .prop_flat_map(|topo| {
            let world_size = topo.world_size();
            (Just(topo), 0..world_size)
        })
}

/// Generates a topology together with an axis label and an index valid
/// on that axis.
pub fn gen_topology_axis_index(
    max_axes: usize,
    max_size: usize,
) -> impl Strategy<Value = (Topology, String, usize)> {
    gen_topology(max_axes, max_size).prop_flat_map(|topo| {
        let num_axes = topo.num_axes();
        (Just(topo), 0..num_axes).prop_flat_map(|(topo, dim)| {
            let label = topo.labels()[dim].clone();
            let size = topo.size(&label).unwrap();
            (Just(topo), Just(label), 0..size)
        })
    })
}

mod tests {
    use super::*;

    proptest! {
        // ∀ ranks r, rank_of(coord_of(r)) == r; every component in range.
        #[test]
        fn test_bijection((topo, rank) in gen_topology_and_rank(4, 4)) {
            let coord = topo.coord_of(rank).unwrap();
            for (label, &value) in coord.labels().iter().zip(coord.values().iter()) {
                prop_assert!(value < topo.size(label).unwrap());
            }
            prop_assert_eq!(topo.rank_of(&coord).unwrap(), rank);
        }
    }

    proptest! {
        // axis_groups partitions the rank space: every rank appears in
        // exactly one group, every group has the axis's size, and group
        // members are ordered by their coordinate on that axis.
        #[test]
        fn test_axis_groups_partition((topo, label, _) in gen_topology_axis_index(4, 4)) {
            let degree = topo.size(&label).unwrap();
            let groups = topo.axis_groups(&label).unwrap();
            prop_assert_eq!(groups.len(), topo.world_size() / degree);

            let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..topo.world_size()).collect::<Vec<_>>());

            for group in &groups {
                prop_assert_eq!(group.len(), degree);
                for (value, &rank) in group.iter().enumerate() {
                    prop_assert_eq!(topo.coord_of(rank).unwrap().get(&label), Some(value));
                }
            }
        }
    }

    proptest! {
        // ranks_at over all values of an axis also partitions the rank
        // space, with each set spanning the complement of the axis.
        #[test]
        fn test_ranks_at_partition((topo, label, _) in gen_topology_axis_index(4, 4)) {
            let degree = topo.size(&label).unwrap();
            let mut seen = Vec::new();
            for index in 0..degree {
                let ranks = topo.ranks_at(&label, index).unwrap();
                prop_assert_eq!(ranks.len(), topo.world_size() / degree);
                prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]));
                for &rank in &ranks {
                    prop_assert_eq!(topo.coord_of(rank).unwrap().get(&label), Some(index));
                }
                seen.extend(ranks);
            }
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..topo.world_size()).collect::<Vec<_>>());
        }
    }

    proptest! {
        // rank_with replaces exactly one component, and replacing it
        // back restores the original rank.
        #[test]
        fn test_rank_with_involution(
            ((topo, label, index), seed) in (gen_topology_axis_index(4, 4), any::<prop::sample::Index>())
        ) {
            let rank = seed.index(topo.world_size());
            let moved = topo.rank_with(rank, &label, index).unwrap();

            let base = topo.coord_of(rank).unwrap();
            let coord = topo.coord_of(moved).unwrap();
            for (l, (&a, &b)) in base
                .labels()
                .iter()
                .zip(base.values().iter().zip(coord.values().iter()))
            {
                if *l == label {
                    prop_assert_eq!(b, index);
                } else {
                    prop_assert_eq!(a, b);
                }
            }

            let original = base.get(&label).unwrap();
            prop_assert_eq!(topo.rank_with(moved, &label, original).unwrap(), rank);
        }
    }
}
