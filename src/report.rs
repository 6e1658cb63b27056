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

//! Module deriving the schedule report from a completed simulation: the makespan, the full task
//! record table, and per-element task logs.

use crate::dag::TrainingDag;
use crate::sim::{Simulation, TaskKind};
use crate::types::{ElementId, SchedulerError, SimError, SimTime, TaskId};

use itertools::Itertools;
use std::collections::BTreeMap;

/// The timing record of one dispatched task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// The task id.
    pub id: TaskId,
    /// The task payload.
    pub kind: TaskKind,
    /// The ready time at dispatch.
    pub ready: SimTime,
    /// The assigned start time.
    pub start: SimTime,
    /// The assigned finish time.
    pub finish: SimTime,
    /// The tasks that depended on this one.
    pub successors: Vec<TaskId>,
}

/// # Schedule report
///
/// Derived from a completed [`Simulation`]: the makespan of the iteration (largest finish time
/// over the terminal task set of the [`TrainingDag`]), the record of every task, and for each
/// element the start-time-ordered list of tasks that touched it. A transfer task appears in the
/// logs of both of its link's endpoints.
///
/// The [`Display`](std::fmt::Display) implementation renders the task record table.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    makespan: SimTime,
    records: Vec<TaskRecord>,
    element_logs: BTreeMap<ElementId, Vec<TaskId>>,
}

impl Report {
    /// Derive the report of a completed run. Fails with
    /// [`SchedulerError::NotDispatched`] if any task has no assigned times.
    pub fn new(sim: &Simulation<'_>, dag: &TrainingDag) -> Result<Self, SimError> {
        let mut records = Vec::with_capacity(sim.num_tasks());
        for (id, task) in sim.tasks() {
            let start = task
                .start_time()
                .ok_or(SchedulerError::NotDispatched(id))?;
            let finish = task
                .finish_time()
                .ok_or(SchedulerError::NotDispatched(id))?;
            records.push(TaskRecord {
                id,
                kind: task.kind(),
                ready: task.ready_time(),
                start,
                finish,
                successors: task.successors().to_vec(),
            });
        }

        let makespan = dag
            .makespan_tasks()
            .iter()
            .map(|t| records[t.index()].finish)
            .fold(0.0_f64, f64::max);

        let mut element_logs: BTreeMap<ElementId, Vec<TaskId>> = BTreeMap::new();
        for rec in &records {
            match rec.kind {
                TaskKind::Compute { accelerator, .. } => {
                    element_logs.entry(accelerator).or_default().push(rec.id)
                }
                TaskKind::Transfer { link, .. } => {
                    if let Some(l) = sim.network().link(link) {
                        element_logs.entry(l.src).or_default().push(rec.id);
                        element_logs.entry(l.dst).or_default().push(rec.id);
                    }
                }
            }
        }
        for log in element_logs.values_mut() {
            log.sort_by(|a, b| {
                records[a.index()]
                    .start
                    .total_cmp(&records[b.index()].start)
                    .then(a.cmp(b))
            });
        }

        Ok(Self {
            makespan,
            records,
            element_logs,
        })
    }

    /// The end-to-end makespan of the iteration, in microseconds.
    pub fn makespan(&self) -> SimTime {
        self.makespan
    }

    /// The records of all tasks, in creation order.
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// The record of the given task.
    pub fn record(&self, id: TaskId) -> &TaskRecord {
        &self.records[id.index()]
    }

    /// The tasks that touched the given element, ordered by start time.
    pub fn element_log(&self, id: ElementId) -> &[TaskId] {
        self.element_logs
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate over the elements that were touched by at least one task.
    pub fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.element_logs.keys().copied()
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:>5} {:>10} {:>10} {:>10}  {:<44} successors",
            "#", "ready", "start", "finish", "task"
        )?;
        for rec in &self.records {
            writeln!(
                f,
                "{:>5} {:>10.2} {:>10.2} {:>10.2}  {:<44} {}",
                rec.id.to_string(),
                rec.ready,
                rec.start,
                rec.finish,
                rec.kind.to_string(),
                rec.successors.iter().map(TaskId::to_string).join(" ")
            )?;
        }
        Ok(())
    }
}
