// FabricSim: Training Fabric Performance Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing the ready-time queue of the dispatch loop.

use crate::types::{SchedulerError, SimTime, TaskId};

use ordered_float::NotNan;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

/// Min-queue of schedulable tasks, keyed by (ready time, insertion order). The insertion counter
/// makes ties deterministic: tasks that become ready at the same time are dispatched in the
/// order they were enqueued.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReadyQueue {
    queue: PriorityQueue<TaskId, Reverse<(NotNan<f64>, u64)>>,
    counter: u64,
}

impl ReadyQueue {
    /// Enqueue a task at the given ready time.
    pub(crate) fn push(&mut self, time: SimTime, task: TaskId) -> Result<(), SchedulerError> {
        let time = NotNan::new(time).map_err(|_| SchedulerError::InvalidReadyTime(task))?;
        self.queue.push(task, Reverse((time, self.counter)));
        self.counter += 1;
        Ok(())
    }

    /// Pop the task with the smallest (ready time, insertion order) key.
    pub(crate) fn pop(&mut self) -> Option<(SimTime, TaskId)> {
        self.queue
            .pop()
            .map(|(task, Reverse((time, _)))| (time.into_inner(), task))
    }

    /// The number of enqueued tasks.
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
