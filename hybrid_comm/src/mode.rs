/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// How a training job is parallelized, judged from its canonical axis
/// degrees. Advisory metadata for consumers; group formation does not
/// depend on it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ParallelMode {
    /// Only optimizer-state sharding is active.
    Sharding,
    /// Input data is distributed across replicas.
    Data,
    /// Layer tensors are sharded across devices.
    Tensor,
    /// Layers are placed on different devices as pipeline stages.
    Pipeline,
}

impl ParallelMode {
    /// Classify from the four canonical degrees. Rules are evaluated in
    /// order and the first match wins: sharding-only, then data, then
    /// tensor, then pipeline.
    pub fn from_degrees(data: usize, model: usize, pipe: usize, sharding: usize) -> Self {
        if sharding > 1 && data == 1 && model == 1 && pipe == 1 {
            ParallelMode::Sharding
        } else if model == 1 && pipe == 1 {
            ParallelMode::Data
        } else if model > 1 && pipe == 1 {
            ParallelMode::Tensor
        } else {
            ParallelMode::Pipeline
        }
    }
}

impl fmt::Display for ParallelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParallelMode::Sharding => "sharding_parallel",
            ParallelMode::Data => "data_parallel",
            ParallelMode::Tensor => "tensor_parallel",
            ParallelMode::Pipeline => "pipeline_parallel",
        };
        write!(f, "{}", name)
    }
}
