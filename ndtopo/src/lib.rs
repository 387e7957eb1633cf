/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Topology components for hybrid parallel training.
//!
//! Provides [`Topology`], a bijective mapping between flat global ranks
//! and labeled multidimensional coordinates, together with the rank-set
//! partitions used to form communication groups along each parallelism
//! axis. The crate is pure integer computation with no runtime
//! dependencies, enabling reuse from both process-setup and test
//! contexts.

mod coord;
pub use coord::Coord;

/// The topology type and its rank/coordinate/group queries.
pub mod topology;

pub use topology::Topology;
/// Errors that can occur during topology construction or queries.
pub use topology::TopologyError;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;
