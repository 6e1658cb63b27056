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

//! Module translating a resolved training plan into a task DAG.
//!
//! The forward pass walks the layers in plan order and creates one compute task per
//! (layer, replica). Whenever the sample ranges of a replica and an upstream replica intersect,
//! the activation bytes for the shared samples are moved by a transfer chain (one task per hop
//! of the shortest path) that depends on the upstream compute task and gates the downstream one.
//! The backward pass mirrors this in reverse plan order, using the derived successor adjacency;
//! on the terminal layer, each replica's backward task additionally waits for its own forward
//! task.

use crate::network::Network;
use crate::plan::{ReplicaIdMode, ResolvedPlan, TrainingPlan};
use crate::profile::ProfileLibrary;
use crate::report::Report;
use crate::sim::Simulation;
use crate::types::{ElementId, LayerId, Phase, PlanError, SimError, TaskId};

use log::*;
use std::collections::HashMap;

/// The compute-task tables of one training iteration, produced by [`build_training_dag`].
#[derive(Debug, Clone, Default)]
pub struct TrainingDag {
    forward: HashMap<(LayerId, ElementId), TaskId>,
    backward: HashMap<(LayerId, ElementId), TaskId>,
    makespan_tasks: Vec<TaskId>,
}

impl TrainingDag {
    /// The forward compute task of the given layer on the given accelerator.
    pub fn forward_task(&self, layer: LayerId, accelerator: ElementId) -> Option<TaskId> {
        self.forward.get(&(layer, accelerator)).copied()
    }

    /// The backward compute task of the given layer on the given accelerator.
    pub fn backward_task(&self, layer: LayerId, accelerator: ElementId) -> Option<TaskId> {
        self.backward.get(&(layer, accelerator)).copied()
    }

    /// The terminal task set of the iteration: the backward compute tasks of the first layer in
    /// plan order. The makespan is the largest finish time among them.
    pub fn makespan_tasks(&self) -> &[TaskId] {
        &self.makespan_tasks
    }
}

/// Translate a resolved plan into compute and transfer tasks on the given simulation. Returns
/// the compute-task tables of the iteration.
pub fn build_training_dag(
    sim: &mut Simulation<'_>,
    plan: &ResolvedPlan,
    profiles: &ProfileLibrary,
) -> Result<TrainingDag, SimError> {
    let mut forward: HashMap<(LayerId, ElementId), TaskId> = HashMap::new();
    let mut backward: HashMap<(LayerId, ElementId), TaskId> = HashMap::new();

    // forward pass, in plan order
    for layer in plan.layers() {
        for replica in &layer.replicas {
            let (a, b) = (replica.samples.start, replica.samples.end);
            let model = sim.network().accelerator_model(replica.accelerator)?;
            let duration =
                profiles
                    .get(model)?
                    .cost(Phase::Forward, layer.id, replica.local_batch as f64)?;
            let mut preds = Vec::new();
            for flow in &layer.prev {
                let upstream = &plan[flow.layer];
                for up in &upstream.replicas {
                    let (ua, ub) = (up.samples.start, up.samples.end);
                    if ua >= b {
                        break;
                    }
                    if a < ub {
                        let shared = b.min(ub) - a.max(ua);
                        if shared > 0 {
                            let bytes = shared as f64 * flow.bytes_per_sample;
                            let upstream_task = forward[&(flow.layer, up.accelerator)];
                            preds.push(chain(
                                sim,
                                up.accelerator,
                                replica.accelerator,
                                bytes,
                                upstream_task,
                            )?);
                        }
                    }
                }
            }
            let task = sim.schedule_compute(
                replica.accelerator,
                layer.id,
                Phase::Forward,
                duration,
                &preds,
            );
            if forward.insert((layer.id, replica.accelerator), task).is_some() {
                return Err(PlanError::DuplicateReplica {
                    layer: layer.id,
                    accelerator: replica.accelerator,
                }
                .into());
            }
        }
    }

    // backward pass, in reverse plan order; the gradients flow along the successor adjacency
    for layer in plan.layers().iter().rev() {
        for replica in &layer.replicas {
            let (a, b) = (replica.samples.start, replica.samples.end);
            let model = sim.network().accelerator_model(replica.accelerator)?;
            let duration =
                profiles
                    .get(model)?
                    .cost(Phase::Backward, layer.id, replica.local_batch as f64)?;
            let mut preds = Vec::new();
            for flow in &layer.next {
                let upstream = &plan[flow.layer];
                for up in &upstream.replicas {
                    let (ua, ub) = (up.samples.start, up.samples.end);
                    if ua >= b {
                        break;
                    }
                    if a < ub {
                        let shared = b.min(ub) - a.max(ua);
                        if shared > 0 {
                            let bytes = shared as f64 * flow.bytes_per_sample;
                            let upstream_task = backward[&(flow.layer, up.accelerator)];
                            preds.push(chain(
                                sim,
                                up.accelerator,
                                replica.accelerator,
                                bytes,
                                upstream_task,
                            )?);
                        }
                    }
                }
            }
            if layer.next.is_empty() {
                // terminal layer: the forward pass must have finished before gradients exist
                preds.push(forward[&(layer.id, replica.accelerator)]);
            }
            let task = sim.schedule_compute(
                replica.accelerator,
                layer.id,
                Phase::Backward,
                duration,
                &preds,
            );
            if backward.insert((layer.id, replica.accelerator), task).is_some() {
                return Err(PlanError::DuplicateReplica {
                    layer: layer.id,
                    accelerator: replica.accelerator,
                }
                .into());
            }
        }
    }

    let first = plan.first();
    let makespan_tasks = first
        .replicas
        .iter()
        .map(|r| backward[&(first.id, r.accelerator)])
        .collect();

    debug!(
        "Built task DAG: {} tasks ({} compute) over {} layers",
        sim.num_tasks(),
        forward.len() + backward.len(),
        plan.layers().len()
    );
    Ok(TrainingDag {
        forward,
        backward,
        makespan_tasks,
    })
}

/// Moves activation bytes between two replicas: a transfer chain when they live on different
/// accelerators, or the upstream task itself when no data leaves the device.
fn chain(
    sim: &mut Simulation<'_>,
    src: ElementId,
    dst: ElementId,
    bytes: f64,
    upstream: TaskId,
) -> Result<TaskId, SimError> {
    if src == dst {
        Ok(upstream)
    } else {
        sim.schedule_transfer(src, dst, bytes, Some(upstream))
    }
}

/// Simulate one training iteration (forward + backward) of `plan` on `net` and report the
/// resulting schedule.
pub fn simulate_iteration(
    net: &Network,
    plan: &TrainingPlan,
    profiles: &ProfileLibrary,
    mode: ReplicaIdMode,
) -> Result<Report, SimError> {
    let resolved = plan.resolve(net, mode)?;
    let mut sim = Simulation::new(net)?;
    let dag = build_training_dag(&mut sim, &resolved, profiles)?;
    sim.run()?;
    Report::new(&sim, &dag)
}
