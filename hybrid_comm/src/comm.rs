/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

/// Creates communication groups on behalf of the registry.
///
/// `new_group` is a collective call: every process in the job must
/// invoke it the same number of times, in the same order, with the same
/// rank sets, or the underlying handshake deadlocks or forms mismatched
/// groups. [`HybridParallelGroups`] upholds this by iterating axes in
/// configuration order and rank sets in [`Topology::axis_groups`]
/// order, identically on every process. Calls are synchronous; any
/// blocking happens inside the backend.
///
/// [`HybridParallelGroups`]: crate::group::HybridParallelGroups
/// [`Topology::axis_groups`]: ndtopo::Topology::axis_groups
pub trait CollectiveBackend {
    /// Handle to a formed group. Opaque to the registry: it is never
    /// inspected, only stored and handed back to consumers.
    type Group;

    /// Form the group whose members are `ranks` (ascending global
    /// ranks, no duplicates). A failure here is fatal to the job and is
    /// propagated unchanged; group formation is never retried.
    fn new_group(&self, ranks: &[usize]) -> anyhow::Result<Self::Group>;
}
