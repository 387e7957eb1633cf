/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Communication-group formation for hybrid parallel training.
//!
//! Given a [`Topology`](ndtopo::Topology) and this process's global
//! rank, [`HybridParallelGroups`] derives one communication group per
//! parallelism axis, one check group per value of a chosen axis, and
//! the ring neighbors used for pipeline stage-to-stage handoff. Group
//! creation itself is delegated to a [`CollectiveBackend`]; this crate
//! only decides which ranks belong together and in what order groups
//! must be formed.

/// The group-creation seam to the collective communication layer.
pub mod comm;

/// The per-process group registry.
pub mod group;

/// Advisory classification of a job's parallelism style.
pub mod mode;

/// Backends for exercising group formation without a transport.
pub mod test_utils;

pub use comm::CollectiveBackend;
pub use group::AxisGroup;
pub use group::GroupError;
pub use group::HybridParallelGroups;
pub use group::RingNeighbors;
pub use mode::ParallelMode;

use ndtopo::Topology;
use ndtopo::TopologyError;

/// The canonical axis names used by hybrid parallel training jobs.
pub mod axis {
    /// Data parallelism: input batches are split across replicas.
    pub const DATA: &str = "data";
    /// Tensor (model) parallelism: layer tensors are split.
    pub const MODEL: &str = "model";
    /// Pipeline parallelism: layers are split into stages.
    pub const PIPE: &str = "pipe";
    /// Sharding parallelism: optimizer state is split.
    pub const SHARDING: &str = "sharding";
}

/// Build the canonical four-axis topology, in the conventional order
/// data, pipe, sharding, model.
///
/// ```
/// let t = hybrid_comm::hybrid_topology(2, 2, 1, 1).unwrap();
/// assert_eq!(t.world_size(), 4);
/// assert_eq!(t.size(hybrid_comm::axis::PIPE).unwrap(), 2);
/// ```
pub fn hybrid_topology(
    data: usize,
    pipe: usize,
    sharding: usize,
    model: usize,
) -> Result<Topology, TopologyError> {
    Topology::new(
        vec![
            axis::DATA.to_string(),
            axis::PIPE.to_string(),
            axis::SHARDING.to_string(),
            axis::MODEL.to_string(),
        ],
        vec![data, pipe, sharding, model],
    )
}
