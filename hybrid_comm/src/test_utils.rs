/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Mutex;

use crate::comm::CollectiveBackend;

/// Handle type returned by [`RecordingBackend`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedGroup {
    /// Position of this group in the backend's creation order.
    pub seq: usize,
    /// The members' global ranks.
    pub ranks: Vec<usize>,
}

/// Records every `new_group` call, in order. Each simulated process
/// gets its own instance; agreement of the recorded sequences across
/// processes is exactly the lock-step contract the registry must
/// uphold.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Vec<usize>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rank set passed to `new_group`, in call order.
    pub fn calls(&self) -> Vec<Vec<usize>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CollectiveBackend for RecordingBackend {
    type Group = RecordedGroup;

    fn new_group(&self, ranks: &[usize]) -> anyhow::Result<RecordedGroup> {
        let mut calls = self.calls.lock().unwrap();
        let seq = calls.len();
        calls.push(ranks.to_vec());
        Ok(RecordedGroup {
            seq,
            ranks: ranks.to_vec(),
        })
    }
}

/// Succeeds for the first `allow` calls and fails afterwards, for
/// exercising failure propagation out of group formation.
#[derive(Debug)]
pub struct FailingBackend {
    allow: usize,
    made: Mutex<usize>,
}

impl FailingBackend {
    pub fn after(allow: usize) -> Self {
        Self {
            allow,
            made: Mutex::new(0),
        }
    }
}

impl CollectiveBackend for FailingBackend {
    type Group = ();

    fn new_group(&self, _ranks: &[usize]) -> anyhow::Result<()> {
        let mut made = self.made.lock().unwrap();
        if *made < self.allow {
            *made += 1;
            Ok(())
        } else {
            anyhow::bail!("transport refused to form group")
        }
    }
}
