/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;

use ndtopo::Topology;
use ndtopo::TopologyError;

use crate::axis;
use crate::comm::CollectiveBackend;
use crate::mode::ParallelMode;

/// The type of error for group formation and registry queries.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GroupError {
    #[error("axis sizes multiply to {world_size}, but the job has {nranks} processes")]
    WorldSizeMismatch { world_size: usize, nranks: usize },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("no communication group formed for axis `{label}`")]
    UngroupedAxis { label: String },

    #[error("no check axis configured")]
    CheckUnavailable,

    #[error("pipeline ring neighbors not initialized: axis `pipe` has degree 1 or is absent")]
    RingUnavailable,

    #[error("creating a group on axis `{label}` failed")]
    GroupCreation {
        label: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Communication state a process holds for one group it belongs to:
/// the member count, the process's 0-indexed position among the
/// members, the ascending global ranks of the members, and the backend
/// handle formed for them.
#[derive(Debug)]
pub struct AxisGroup<G> {
    degree: usize,
    local_id: usize,
    ranks: Vec<usize>,
    group: G,
}

impl<G> AxisGroup<G> {
    /// The number of members.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// This process's 0-indexed position among the members. For an
    /// axis group this equals the process's coordinate on that axis.
    pub fn local_id(&self) -> usize {
        self.local_id
    }

    /// The members' global ranks, ascending.
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// The backend handle for this group.
    pub fn group(&self) -> &G {
        &self.group
    }

    /// The designated source (root) rank: the lowest global rank.
    pub fn source_rank(&self) -> usize {
        self.ranks[0]
    }
}

/// Ring successor and predecessor global ranks along the pipeline axis.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingNeighbors {
    pub next: usize,
    pub prev: usize,
}

/// Per-process registry of hybrid parallel communication groups.
///
/// Constructed once, after the [`Topology`], and read-only for the
/// process lifetime; reconfiguring parallelism means building a new
/// topology and a new registry. Construction requests creation of
/// *every* rank set of every axis — not only the sets this process
/// belongs to — because group creation is a collective call (see
/// [`CollectiveBackend`]); only the handles for the local process's own
/// sets are retained.
#[derive(Debug)]
pub struct HybridParallelGroups<G> {
    topo: Topology,
    global_rank: usize,
    nranks: usize,
    axes: HashMap<String, AxisGroup<G>>,
    check_axis: Option<String>,
    check: Option<AxisGroup<G>>,
    ring: Option<RingNeighbors>,
}

impl<G> HybridParallelGroups<G> {
    /// Form this process's communication groups for every axis of
    /// `topo`. Check groups are formed over the `data` axis when one is
    /// configured; see [`HybridParallelGroups::with_check_axis`] to
    /// choose another axis.
    pub fn new<B>(
        topo: Topology,
        global_rank: usize,
        nranks: usize,
        backend: &B,
    ) -> Result<Self, GroupError>
    where
        B: CollectiveBackend<Group = G>,
    {
        let check_axis = topo
            .labels()
            .iter()
            .find(|l| l.as_str() == axis::DATA)
            .cloned();
        Self::build(topo, global_rank, nranks, backend, check_axis)
    }

    /// Like [`HybridParallelGroups::new`], but with check groups formed
    /// over the given axis: one group per value of that axis, each
    /// spanning every combination of the remaining axes.
    pub fn with_check_axis<B>(
        topo: Topology,
        global_rank: usize,
        nranks: usize,
        backend: &B,
        check_axis: &str,
    ) -> Result<Self, GroupError>
    where
        B: CollectiveBackend<Group = G>,
    {
        Self::build(
            topo,
            global_rank,
            nranks,
            backend,
            Some(check_axis.to_string()),
        )
    }

    fn build<B>(
        topo: Topology,
        global_rank: usize,
        nranks: usize,
        backend: &B,
        check_axis: Option<String>,
    ) -> Result<Self, GroupError>
    where
        B: CollectiveBackend<Group = G>,
    {
        // Both checks must fail before the first collective call: a
        // process that dies mid-sequence leaves the rest of the job
        // blocked in a partial barrier.
        if topo.world_size() != nranks {
            return Err(GroupError::WorldSizeMismatch {
                world_size: topo.world_size(),
                nranks,
            });
        }
        topo.coord_of(global_rank)?;

        // One pass per axis, in configuration order; every process
        // walks the same axes and the same rank sets in the same
        // order.
        let mut axes = HashMap::new();
        for label in topo.labels() {
            let sets = topo.axis_groups(label)?;
            let num_sets = sets.len();
            let mut own = None;
            for ranks in sets {
                let group =
                    backend
                        .new_group(&ranks)
                        .map_err(|source| GroupError::GroupCreation {
                            label: label.clone(),
                            source,
                        })?;
                if let Some(local_id) = ranks.iter().position(|&r| r == global_rank) {
                    own = Some(AxisGroup {
                        degree: ranks.len(),
                        local_id,
                        ranks,
                        group,
                    });
                }
            }
            // axis_groups partitions the rank space, so exactly one
            // set contains this process
            let own = own.ok_or_else(|| GroupError::UngroupedAxis {
                label: label.clone(),
            })?;
            tracing::debug!(
                axis = %label,
                groups = num_sets,
                degree = own.degree(),
                "formed communication groups"
            );
            axes.insert(label.clone(), own);
        }

        // Check groups: one per value of the checked axis, spanning
        // all combinations of the remaining axes.
        let check = match &check_axis {
            Some(label) => {
                let degree = topo.size(label)?;
                let mut own = None;
                for index in 0..degree {
                    let ranks = topo.ranks_at(label, index)?;
                    let group =
                        backend
                            .new_group(&ranks)
                            .map_err(|source| GroupError::GroupCreation {
                                label: label.clone(),
                                source,
                            })?;
                    if let Some(local_id) = ranks.iter().position(|&r| r == global_rank) {
                        own = Some(AxisGroup {
                            degree: ranks.len(),
                            local_id,
                            ranks,
                            group,
                        });
                    }
                }
                Some(own.ok_or_else(|| GroupError::UngroupedAxis {
                    label: label.clone(),
                })?)
            }
            None => None,
        };

        // Ring neighbors along the local pipe group. Derived for the
        // local process only; no collective call is involved. A degree
        // of 1 leaves the state absent rather than self-referential.
        let ring = match axes.get(axis::PIPE) {
            Some(pipe) if pipe.degree() > 1 => {
                let i = pipe.local_id();
                let p = pipe.degree();
                Some(RingNeighbors {
                    next: pipe.ranks()[(i + 1) % p],
                    prev: pipe.ranks()[(i + p - 1) % p],
                })
            }
            _ => None,
        };

        let registry = Self {
            topo,
            global_rank,
            nranks,
            axes,
            check_axis,
            check,
            ring,
        };
        tracing::info!(
            rank = registry.global_rank,
            world_size = registry.nranks,
            topology = %registry.topo,
            mode = %registry.parallel_mode(),
            "hybrid parallel communication groups ready"
        );
        Ok(registry)
    }

    /// The full group entry for the labeled axis.
    pub fn axis_group(&self, label: &str) -> Result<&AxisGroup<G>, GroupError> {
        self.axes
            .get(label)
            .ok_or_else(|| GroupError::UngroupedAxis {
                label: label.to_string(),
            })
    }

    /// The backend handle for this process's group on the labeled axis.
    pub fn group(&self, label: &str) -> Result<&G, GroupError> {
        Ok(self.axis_group(label)?.group())
    }

    /// The members of this process's group on the labeled axis.
    pub fn group_ranks(&self, label: &str) -> Result<&[usize], GroupError> {
        Ok(self.axis_group(label)?.ranks())
    }

    /// This process's 0-indexed rank within its group on the labeled
    /// axis.
    pub fn local_rank(&self, label: &str) -> Result<usize, GroupError> {
        Ok(self.axis_group(label)?.local_id())
    }

    /// The size of the labeled axis.
    pub fn degree(&self, label: &str) -> Result<usize, GroupError> {
        Ok(self.axis_group(label)?.degree())
    }

    /// The source (root) rank of this process's group on the labeled
    /// axis: the group's lowest global rank.
    pub fn source_rank(&self, label: &str) -> Result<usize, GroupError> {
        Ok(self.axis_group(label)?.source_rank())
    }

    /// The axis check groups were formed over, if any.
    pub fn check_axis(&self) -> Option<&str> {
        self.check_axis.as_deref()
    }

    /// The backend handle for this process's check group.
    pub fn check_group(&self) -> Result<&G, GroupError> {
        Ok(self.check_entry()?.group())
    }

    /// The members of this process's check group.
    pub fn check_group_ranks(&self) -> Result<&[usize], GroupError> {
        Ok(self.check_entry()?.ranks())
    }

    fn check_entry(&self) -> Result<&AxisGroup<G>, GroupError> {
        self.check.as_ref().ok_or(GroupError::CheckUnavailable)
    }

    /// The ring successor along the pipeline axis.
    pub fn next_rank(&self) -> Result<usize, GroupError> {
        self.ring
            .map(|r| r.next)
            .ok_or(GroupError::RingUnavailable)
    }

    /// The ring predecessor along the pipeline axis.
    pub fn prev_rank(&self) -> Result<usize, GroupError> {
        self.ring
            .map(|r| r.prev)
            .ok_or(GroupError::RingUnavailable)
    }

    /// Both ring neighbors; absent when the pipe degree is 1.
    pub fn ring(&self) -> Option<RingNeighbors> {
        self.ring
    }

    /// This process's pipeline stage.
    pub fn stage_id(&self) -> Result<usize, GroupError> {
        self.local_rank(axis::PIPE)
    }

    /// Whether this process runs the first pipeline stage.
    pub fn is_first_stage(&self) -> Result<bool, GroupError> {
        Ok(self.stage_id()? == 0)
    }

    /// Whether this process runs the last pipeline stage.
    pub fn is_last_stage(&self) -> Result<bool, GroupError> {
        Ok(self.stage_id()? + 1 == self.degree(axis::PIPE)?)
    }

    /// The rank whose coordinate matches this process's, except with
    /// the labeled component set to `index`. Used to address a peer in
    /// another pipeline stage (or another slice of any axis) without
    /// hand-computing offsets.
    pub fn rank_at(&self, label: &str, index: usize) -> Result<usize, GroupError> {
        Ok(self.topo.rank_with(self.global_rank, label, index)?)
    }

    /// This process's global rank.
    pub fn global_rank(&self) -> usize {
        self.global_rank
    }

    /// The total process count.
    pub fn world_size(&self) -> usize {
        self.nranks
    }

    /// The topology the groups were derived from.
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// Advisory parallelism classification from the canonical axis
    /// degrees; an axis missing from the topology counts as degree 1.
    pub fn parallel_mode(&self) -> ParallelMode {
        let degree_of = |label: &str| self.axes.get(label).map_or(1, |g| g.degree());
        ParallelMode::from_degrees(
            degree_of(axis::DATA),
            degree_of(axis::MODEL),
            degree_of(axis::PIPE),
            degree_of(axis::SHARDING),
        )
    }
}
