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

//! Module containing all type definitions

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Element identification (and index into the topology graph)
pub type ElementId = NodeIndex<IndexType>;
/// Link identification (and index into the topology graph edges)
pub type LinkId = EdgeIndex<IndexType>;

/// Simulated time, in microseconds.
pub type SimTime = f64;

/// Layer identification within a training plan.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LayerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<u32> for LayerId {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

impl From<usize> for LayerId {
    fn from(x: usize) -> Self {
        Self(x as u32)
    }
}

impl From<i32> for LayerId {
    fn from(x: i32) -> Self {
        Self(x as u32)
    }
}

/// Task identification (and index into the task arena of a simulation)
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Get the index into the task arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Half of one training iteration, used to key compute-cost profiles.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Phase {
    /// Forward pass
    Forward,
    /// Backward pass
    Backward,
}

impl Phase {
    /// Index into per-phase tables (`[forward, backward]`).
    pub fn index(&self) -> usize {
        match self {
            Phase::Forward => 0,
            Phase::Backward => 1,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Forward => write!(f, "forward"),
            Phase::Backward => write!(f, "backward"),
        }
    }
}

/// Topology Errors
#[derive(Error, Debug, PartialEq, Serialize, Deserialize)]
pub enum TopologyError {
    /// An element handle does not exist in the topology.
    #[error("Element was not found in the topology: {0:?}")]
    ElementNotFound(ElementId),
    /// An element was expected to be an accelerator, but is not.
    #[error("Element is not an accelerator: {0:?}")]
    NotAnAccelerator(ElementId),
    /// No direct link exists between the two elements.
    #[error("Link does not exist: {0:?} -> {1:?}")]
    LinkNotFound(ElementId, ElementId),
    /// A link id does not exist in the topology.
    #[error("Link id was not found in the topology: {0:?}")]
    UnknownLink(LinkId),
    /// A link must connect two distinct elements.
    #[error("Link must connect two distinct elements: {0:?}")]
    SelfLoop(ElementId),
    /// No path is known between the two elements.
    #[error("Pair is unreachable: {0:?} -> {1:?}")]
    Unreachable(ElementId, ElementId),
    /// The path table was queried before it was computed.
    #[error("Shortest paths have not been computed yet")]
    PathsNotReady,
    /// The topology can no longer be modified once the path table is ready.
    #[error("The path table is already computed; the topology is frozen")]
    PathsFrozen,
}

/// Training-plan Errors
#[derive(Error, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlanError {
    /// The plan contains no layers.
    #[error("The training plan is empty")]
    EmptyPlan,
    /// The same layer id appears twice in the plan.
    #[error("Duplicate layer id in the plan: {0}")]
    DuplicateLayer(LayerId),
    /// A predecessor reference names a layer that does not appear earlier in the plan.
    #[error("Layer {layer} references unknown predecessor layer {prev}")]
    UnknownPrevLayer {
        /// The referencing layer
        layer: LayerId,
        /// The unknown predecessor
        prev: LayerId,
    },
    /// A layer and one of its predecessors disagree on the global batch size.
    #[error("Layer {layer} has batch size {batch}, but predecessor {prev} has {prev_batch}")]
    BatchMismatch {
        /// The downstream layer
        layer: LayerId,
        /// Batch size of the downstream layer
        batch: u64,
        /// The predecessor layer
        prev: LayerId,
        /// Batch size of the predecessor layer
        prev_batch: u64,
    },
    /// A layer has no replica assignments.
    #[error("Layer {0} has no replica assignments")]
    NoReplicas(LayerId),
    /// A replica id cannot be resolved to an accelerator.
    #[error("Layer {layer} assigns replica id {id}, which is not a known accelerator")]
    ReplicaOutOfRange {
        /// The layer carrying the assignment
        layer: LayerId,
        /// The unresolvable replica id
        id: u32,
    },
    /// Two replicas of the same layer resolve to the same accelerator.
    #[error("Layer {layer} assigns accelerator {accelerator:?} twice")]
    DuplicateReplica {
        /// The layer carrying the assignments
        layer: LayerId,
        /// The accelerator assigned twice
        accelerator: ElementId,
    },
    /// A non-terminal layer has no consumers.
    #[error("Layer {0} has no consumers, but is not the last layer of the plan")]
    DanglingLayer(LayerId),
}

/// Compute-cost profile Errors
#[derive(Error, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProfileError {
    /// No profile is recorded for the accelerator model.
    #[error("No profile is recorded for accelerator model {0:?}")]
    UnknownModel(String),
    /// The profile has no series for the layer.
    #[error("Profile has no {0} datapoints for layer {1}")]
    UnknownLayer(Phase, LayerId),
    /// The series for the layer is empty.
    #[error("Profile has an empty {0} series for layer {1}")]
    NoDatapoints(Phase, LayerId),
    /// The queried batch size exceeds every recorded datapoint.
    #[error("Batch size {batch} exceeds all recorded {phase} datapoints of layer {layer} (largest is {max})")]
    BatchTooLarge {
        /// The queried phase
        phase: Phase,
        /// The queried layer
        layer: LayerId,
        /// The queried batch size
        batch: f64,
        /// The largest recorded batch size
        max: f64,
    },
}

/// Scheduler Errors
#[derive(Error, Debug, PartialEq, Serialize, Deserialize)]
pub enum SchedulerError {
    /// A task was popped from the ready queue twice.
    #[error("Task {0} was dispatched twice")]
    DispatchedTwice(TaskId),
    /// The queue key of a popped task disagrees with its recorded ready time.
    #[error("Task {task} was queued at time {queued}, but is ready at {expected}")]
    ReadyTimeMismatch {
        /// The popped task
        task: TaskId,
        /// The key it was queued under
        queued: SimTime,
        /// Its recorded ready time
        expected: SimTime,
    },
    /// A predecessor count was decremented below zero.
    #[error("Predecessor count of task {0} dropped below zero")]
    PredecessorUnderflow(TaskId),
    /// A transfer task carries no bytes.
    #[error("Transfer task {0} carries zero or negative bytes")]
    EmptyTransfer(TaskId),
    /// A task produced a ready time that is not a number.
    #[error("Task {0} produced an invalid ready time")]
    InvalidReadyTime(TaskId),
    /// A task was never dispatched by the run.
    #[error("Task {0} was never dispatched")]
    NotDispatched(TaskId),
}

/// Simulator Errors
#[derive(Error, Debug)]
pub enum SimError {
    /// Topology error
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// Training-plan error
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
    /// Compute-cost profile error
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// Json error
    #[error("{0}")]
    JsonError(Box<serde_json::Error>),
    /// IO error
    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for SimError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(Box::new(value))
    }
}

impl PartialEq for SimError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Topology(l0), Self::Topology(r0)) => l0 == r0,
            (Self::Plan(l0), Self::Plan(r0)) => l0 == r0,
            (Self::Profile(l0), Self::Profile(r0)) => l0 == r0,
            (Self::Scheduler(l0), Self::Scheduler(r0)) => l0 == r0,
            (Self::JsonError(l), Self::JsonError(r)) => l.to_string() == r.to_string(),
            (Self::IoError(l), Self::IoError(r)) => l.kind() == r.kind(),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
