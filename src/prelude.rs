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

//! Module containing the most important structures and functions.

pub use crate::dag::{build_training_dag, simulate_iteration, TrainingDag};
pub use crate::network::{Element, Link, Network};
pub use crate::plan::{
    Layer, LayerFlow, ReplicaAssignment, ReplicaIdMode, ResolvedPlan, TrainingPlan,
};
pub use crate::profile::{CostProfile, Datapoint, ProfileLibrary};
pub use crate::report::{Report, TaskRecord};
pub use crate::sim::{Simulation, Task, TaskKind};
pub use crate::types::{
    ElementId, LayerId, LinkId, Phase, PlanError, ProfileError, SchedulerError, SimError,
    SimTime, TaskId, TopologyError,
};
