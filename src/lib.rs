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

#![deny(missing_docs, missing_debug_implementations)]

//! # FabricSim
//!
//! This is a library for predicting the duration of one distributed deep-learning training
//! iteration on a heterogeneous accelerator fabric, using discrete-event simulation.
//!
//! ## Main Concepts
//!
//! The [`network::Network`] is the fabric description: accelerators, hosts, and switches,
//! connected by directed links with bandwidth and latency. After
//! [`network::Network::compute_shortest_paths`], it exposes a hop list for every reachable pair
//! of elements. Common shapes can be generated with the [`builder::FabricBuilder`] trait.
//!
//! A [`plan::TrainingPlan`] describes the layered model: each layer is replicated across
//! accelerators, and each replica owns a contiguous range of the global batch. Plans are
//! [resolved](plan::TrainingPlan::resolve) against a fabric, which validates them and maps
//! replica ids to element handles. Compute durations come from recorded
//! [`profile::CostProfile`]s, interpolated over the local batch size.
//!
//! The [DAG builder](dag::build_training_dag) turns a resolved plan into compute and transfer
//! tasks on a [`sim::Simulation`], whose dispatch loop assigns start and finish times under
//! per-accelerator and per-link serialization (links are pipelined: new ingress is admitted a
//! latency before the previous egress completes). The [`report::Report`] derives the makespan
//! and per-element task logs.
//!
//! ## Example usage
//!
//! ```
//! use fabricsim::prelude::*;
//!
//! fn main() -> Result<(), SimError> {
//!     // a fabric with one switch and two GPUs
//!     let mut net = Network::default();
//!     let sw = net.add_switch();
//!     let g1 = net.add_accelerator("V100");
//!     let g2 = net.add_accelerator("V100");
//!     for gpu in [g1, g2] {
//!         net.add_link(sw, gpu, 1000.0, 17.0)?;
//!         net.add_link(gpu, sw, 1000.0, 17.0)?;
//!     }
//!     net.compute_shortest_paths();
//!
//!     // a two-layer plan: layer 1 on the first GPU feeds layer 2 on the second
//!     let plan = TrainingPlan(vec![
//!         Layer {
//!             layer_id: LayerId(1),
//!             name: "input".into(),
//!             model_bytes: 1000.0,
//!             prev_layers: vec![],
//!             replicas: vec![ReplicaAssignment { id: 1, local_batch: 64 }],
//!         },
//!         Layer {
//!             layer_id: LayerId(2),
//!             name: "fc".into(),
//!             model_bytes: 10000.0,
//!             prev_layers: vec![LayerFlow { layer: LayerId(1), bytes_per_sample: 100.0 }],
//!             replicas: vec![ReplicaAssignment { id: 2, local_batch: 64 }],
//!         },
//!     ]);
//!
//!     // recorded compute costs of the V100
//!     let mut profile = CostProfile::new();
//!     profile.add_datapoint_pair(LayerId(1), 64.0, 100.0, 180.0);
//!     profile.add_datapoint_pair(LayerId(2), 64.0, 120.0, 200.0);
//!     let mut profiles = ProfileLibrary::new();
//!     profiles.insert("V100", profile);
//!
//!     let report = simulate_iteration(&net, &plan, &profiles, ReplicaIdMode::Rank)?;
//!     assert!(report.makespan() > 0.0);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod dag;
pub mod network;
pub mod plan;
pub mod prelude;
pub mod profile;
pub mod report;
pub mod sim;
pub mod types;

#[cfg(test)]
mod test;
