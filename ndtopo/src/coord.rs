/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::topology::TopologyError;

/// A position along every axis of a [`Topology`], in axis order.
///
/// Coordinates are immutable value objects. The axis labels are fixed at
/// topology construction time and shared with the owning topology; a
/// component is read by label via [`Coord::get`] or positionally via
/// [`Coord::values`].
///
/// [`Topology`]: crate::Topology
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Coord {
    labels: Arc<Vec<String>>,
    values: Vec<usize>,
}

impl Coord {
    pub(crate) fn new(labels: Arc<Vec<String>>, values: Vec<usize>) -> Self {
        debug_assert_eq!(labels.len(), values.len());
        Self { labels, values }
    }

    /// The component along the labeled axis, or `None` if the axis is
    /// not part of this coordinate's topology.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|dim| self.values[dim])
    }

    /// The per-axis components, in axis order.
    pub fn values(&self) -> &[usize] {
        &self.values
    }

    /// The axis labels, in axis order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// A copy of this coordinate with the labeled component set to
    /// `value`, all others unchanged. The value's range is checked when
    /// the coordinate is converted back to a rank.
    pub fn replace(&self, label: &str, value: usize) -> Result<Coord, TopologyError> {
        let dim = self
            .labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| TopologyError::UnknownAxis {
                label: label.to_string(),
            })?;
        let mut values = self.values.clone();
        values[dim] = value;
        Ok(Self {
            labels: Arc::clone(&self.labels),
            values,
        })
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for dim in 0..self.values.len() {
            write!(f, "{}={}", self.labels[dim], self.values[dim])?;
            if dim < self.values.len() - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, ")")
    }
}
