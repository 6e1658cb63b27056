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

//! Module containing the task arena and the event-driven scheduler.
//!
//! A [`Simulation`] owns a DAG of [`Task`]s over a frozen [`Network`]. Compute tasks occupy one
//! accelerator for their duration; transfer tasks occupy one link each. The
//! [dispatch loop](Simulation::run) assigns start and finish times under per-resource
//! serialization: each accelerator runs one compute task at a time, and each link admits a new
//! transfer once the previous one's last byte has *entered* the link (its busy-until is the
//! finish time minus the latency), so back-to-back ingress overlaps in-flight egress.

mod queue;

use crate::network::Network;
use crate::types::{
    ElementId, LayerId, LinkId, Phase, SchedulerError, SimError, SimTime, TaskId, TopologyError,
};
use queue::ReadyQueue;

use log::*;

/// Ready time of a task whose predecessors have not completed yet.
const UNSET: SimTime = -1.0;

/// The payload of a task: one unit of simulated work on an accelerator, or one unit of data
/// movement over a single link hop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskKind {
    /// One phase of one layer replica, executed on one accelerator.
    Compute {
        /// The accelerator this task occupies.
        accelerator: ElementId,
        /// The layer being computed.
        layer: LayerId,
        /// Forward or backward.
        phase: Phase,
        /// Duration of the computation, in microseconds.
        compute_time: SimTime,
    },
    /// A transfer over a single link.
    Transfer {
        /// The link this task occupies.
        link: LinkId,
        /// The number of bytes transferred. Every hop of a multi-hop chain carries the same
        /// value.
        bytes: f64,
    },
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Compute {
                accelerator,
                layer,
                phase,
                compute_time,
            } => write!(
                f,
                "compute[{}] layer {} on {} ({} us)",
                phase,
                layer,
                accelerator.index(),
                compute_time
            ),
            TaskKind::Transfer { link, bytes } => {
                write!(f, "xfer {} B on link {}", bytes, link.index())
            }
        }
    }
}

/// A node of the task DAG.
///
/// A task is created with its predecessor count; it becomes schedulable when the count reaches
/// zero, is dispatched exactly once, and is immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    kind: TaskKind,
    /// Latest completion time over the predecessors seen so far; `-1` until the first one
    /// completes (or `0` for initial tasks).
    ready: SimTime,
    start: Option<SimTime>,
    finish: Option<SimTime>,
    successors: Vec<TaskId>,
    open_preds: usize,
}

impl Task {
    /// The payload of this task.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// The earliest moment all predecessors have completed, or `-1.0` while unset.
    pub fn ready_time(&self) -> SimTime {
        self.ready
    }

    /// The assigned start time, once dispatched.
    pub fn start_time(&self) -> Option<SimTime> {
        self.start
    }

    /// The assigned finish time, once dispatched.
    pub fn finish_time(&self) -> Option<SimTime> {
        self.finish
    }

    /// The tasks depending on this one.
    pub fn successors(&self) -> &[TaskId] {
        &self.successors
    }

    /// The number of predecessors that have not completed yet.
    pub fn open_predecessors(&self) -> usize {
        self.open_preds
    }
}

/// # Simulation
///
/// The task arena and dispatch loop over a frozen fabric. Tasks are scheduled with
/// [`Simulation::schedule_compute`] and [`Simulation::schedule_transfer`] (usually via the
/// [DAG builder](crate::dag)), then [`Simulation::run`] assigns start and finish times to every
/// task.
///
/// ```
/// use fabricsim::builder::FabricBuilder;
/// use fabricsim::prelude::*;
///
/// # fn main() -> Result<(), SimError> {
/// let net = Network::build_single_switch_fabric(2)?;
/// let (g1, g2) = (net.accelerators()[0], net.accelerators()[1]);
///
/// let mut sim = Simulation::new(&net)?;
/// let a = sim.schedule_compute(g1, LayerId(1), Phase::Forward, 100.0, &[]);
/// let x = sim.schedule_transfer(g1, g2, 1000.0, Some(a))?;
/// let b = sim.schedule_compute(g2, LayerId(2), Phase::Forward, 100.0, &[x]);
/// sim.run()?;
///
/// assert_eq!(sim.task(a).finish_time(), Some(100.0));
/// assert!(sim.task(b).start_time() > Some(100.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Simulation<'n> {
    net: &'n Network,
    tasks: Vec<Task>,
    initial: Vec<TaskId>,
}

impl<'n> Simulation<'n> {
    /// Create an empty simulation over the given fabric. The fabric's path table must be
    /// computed already.
    pub fn new(net: &'n Network) -> Result<Self, TopologyError> {
        if !net.paths_ready() {
            return Err(TopologyError::PathsNotReady);
        }
        Ok(Self {
            net,
            tasks: Vec::new(),
            initial: Vec::new(),
        })
    }

    /// The fabric this simulation runs on.
    pub fn network(&self) -> &'n Network {
        self.net
    }

    /// The number of tasks in the arena.
    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Returns a reference to the task with the given id.
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    /// Iterate over all tasks with their ids, in creation order.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (TaskId(i), t))
    }

    /// The tasks seeded on the initial ready set (ready time 0).
    pub fn initial_tasks(&self) -> &[TaskId] {
        &self.initial
    }

    fn add_task(&mut self, kind: TaskKind, predecessors: &[TaskId]) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            kind,
            ready: UNSET,
            start: None,
            finish: None,
            successors: Vec::new(),
            open_preds: predecessors.len(),
        });
        for &p in predecessors {
            self.tasks[p.0].successors.push(id);
        }
        if predecessors.is_empty() {
            self.tasks[id.0].ready = 0.0;
            self.initial.push(id);
        }
        id
    }

    /// Schedule one compute task on the given accelerator, depending on the given predecessors.
    /// A task without predecessors is seeded on the initial ready set.
    pub fn schedule_compute(
        &mut self,
        accelerator: ElementId,
        layer: LayerId,
        phase: Phase,
        compute_time: SimTime,
        predecessors: &[TaskId],
    ) -> TaskId {
        self.add_task(
            TaskKind::Compute {
                accelerator,
                layer,
                phase,
                compute_time,
            },
            predecessors,
        )
    }

    /// Schedule a transfer of `bytes` from `src` to `dst`, expanded into a chain of one transfer
    /// task per hop along the shortest path. The chain head depends on `upstream` (or is seeded
    /// on the initial ready set if `None`); every further hop depends on the previous one. The
    /// chain tail is returned, to be used as the predecessor of the downstream compute task.
    pub fn schedule_transfer(
        &mut self,
        src: ElementId,
        dst: ElementId,
        bytes: f64,
        upstream: Option<TaskId>,
    ) -> Result<TaskId, SimError> {
        let net = self.net;
        let path = net.path(src, dst)?;
        let mut prev_node = src;
        let mut last = upstream;
        for &hop in path {
            let link = net.find_link(prev_node, hop)?;
            let task = match last {
                Some(t) => self.add_task(TaskKind::Transfer { link, bytes }, &[t]),
                None => self.add_task(TaskKind::Transfer { link, bytes }, &[]),
            };
            prev_node = hop;
            last = Some(task);
        }
        last.ok_or_else(|| TopologyError::Unreachable(src, dst).into())
    }

    /// Run the dispatch loop until the queue is empty, assigning start and finish times to every
    /// task.
    pub fn run(&mut self) -> Result<(), SimError> {
        let net = self.net;
        let mut queue = ReadyQueue::default();
        let mut accel_busy = vec![0.0_f64; net.num_elements()];
        let mut link_busy = vec![0.0_f64; net.num_links()];
        for &t in &self.initial {
            queue.push(self.tasks[t.0].ready, t)?;
        }
        debug!(
            "Dispatch loop starting: {} tasks, {} initially ready",
            self.tasks.len(),
            queue.len()
        );

        let mut dispatched = 0_usize;
        while let Some((queued, id)) = queue.pop() {
            let task = &self.tasks[id.0];
            if task.start.is_some() || task.finish.is_some() {
                return Err(SchedulerError::DispatchedTwice(id).into());
            }
            if queued != task.ready {
                return Err(SchedulerError::ReadyTimeMismatch {
                    task: id,
                    queued,
                    expected: task.ready,
                }
                .into());
            }
            let kind = task.kind;
            let successors = task.successors.clone();
            match kind {
                TaskKind::Compute {
                    accelerator,
                    compute_time,
                    ..
                } => {
                    let start = queued.max(accel_busy[accelerator.index()]);
                    let finish = start + compute_time;
                    accel_busy[accelerator.index()] = finish;
                    self.record(id, start, finish);
                    for s in successors {
                        self.complete_predecessor(s, finish, &mut queue)?;
                    }
                }
                TaskKind::Transfer { link, bytes } => {
                    if bytes <= 0.0 {
                        return Err(SchedulerError::EmptyTransfer(id).into());
                    }
                    let l = net.link(link).ok_or(TopologyError::UnknownLink(link))?;
                    let latency = l.latency;
                    let start = queued.max(link_busy[link.index()]);
                    let finish = start + l.xfer_time(bytes);
                    // The link can take new ingress data before it is done with egress work.
                    link_busy[link.index()] = finish - latency;
                    self.record(id, start, finish);
                    for s in successors {
                        let ready = match self.tasks[s.0].kind {
                            // the next hop may begin once the first byte got across
                            TaskKind::Transfer { .. } => start + latency,
                            TaskKind::Compute { .. } => finish,
                        };
                        self.complete_predecessor(s, ready, &mut queue)?;
                    }
                }
            }
            dispatched += 1;
        }

        info!(
            "Simulation completed: {} of {} tasks dispatched",
            dispatched,
            self.tasks.len()
        );
        Ok(())
    }

    fn record(&mut self, id: TaskId, start: SimTime, finish: SimTime) {
        let task = &mut self.tasks[id.0];
        task.start = Some(start);
        task.finish = Some(finish);
        trace!("{}: {} [{} - {}]", id, task.kind, start, finish);
    }

    fn complete_predecessor(
        &mut self,
        succ: TaskId,
        ready: SimTime,
        queue: &mut ReadyQueue,
    ) -> Result<(), SimError> {
        let task = &mut self.tasks[succ.0];
        task.ready = task.ready.max(ready);
        if task.open_preds == 0 {
            return Err(SchedulerError::PredecessorUnderflow(succ).into());
        }
        task.open_preds -= 1;
        if task.open_preds == 0 {
            queue.push(task.ready, succ)?;
        }
        Ok(())
    }
}
