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

//! Module containing the training-plan model.
//!
//! A plan is an ordered list of layers in a topological order of the layer DAG. Each layer is
//! replicated across accelerators; replica `i` owns the contiguous half-open sample range
//! `[sum of earlier local batches, plus its own)` within the layer's global batch.
//!
//! Plans are loaded from JSON and then [resolved](TrainingPlan::resolve) against a
//! [`Network`]: resolution maps replica ids to element handles, derives the successor adjacency,
//! and validates every structural invariant before a single task is created.

use crate::network::Network;
use crate::types::{ElementId, LayerId, PlanError, SimError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Index, Range};
use std::path::Path;

/// A directed edge of the layer DAG, carrying the activation size exchanged per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerFlow {
    /// The layer on the other side of the edge.
    #[serde(rename = "LayerId")]
    pub layer: LayerId,
    /// Bytes exchanged per sample along this edge.
    #[serde(rename = "InputBytesPerSample")]
    pub bytes_per_sample: f64,
}

/// One replica of a layer: an accelerator id (interpreted per [`ReplicaIdMode`]) and the number
/// of samples it processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaAssignment {
    /// The accelerator id, as spelled in the plan file.
    pub id: u32,
    /// The number of samples this replica processes.
    #[serde(rename = "localBatch")]
    pub local_batch: u64,
}

/// One layer of a training plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique, positive layer id.
    #[serde(rename = "layerId")]
    pub layer_id: LayerId,
    /// Human-readable layer name.
    #[serde(default)]
    pub name: String,
    /// Size of the layer parameters in bytes. Carried for parameter-sync accounting; the
    /// simulated iteration does not consume it.
    #[serde(rename = "modelBytes", default)]
    pub model_bytes: f64,
    /// The predecessor layers, with input bytes per sample.
    #[serde(rename = "prevLayers", default)]
    pub prev_layers: Vec<LayerFlow>,
    /// The ordered replica assignments of this layer.
    #[serde(rename = "assignedAccelerators")]
    pub replicas: Vec<ReplicaAssignment>,
}

impl Layer {
    /// The global batch size of this layer (sum of the replicas' local batches).
    pub fn batch_size(&self) -> u64 {
        self.replicas.iter().map(|r| r.local_batch).sum()
    }

    /// Iterate over the replicas together with their sample ranges.
    pub fn replica_ranges(
        &self,
    ) -> impl Iterator<Item = (&ReplicaAssignment, Range<u64>)> {
        self.replicas.iter().scan(0_u64, |cursor, r| {
            let start = *cursor;
            *cursor += r.local_batch;
            Some((r, start..*cursor))
        })
    }
}

/// How the `id` field of a [`ReplicaAssignment`] is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaIdMode {
    /// The id is the 1-based rank into the topology's accelerator list (the default).
    #[default]
    Rank,
    /// The id is the element handle of the accelerator.
    Handle,
}

/// An ordered training plan, as loaded from a plan file.
///
/// The JSON representation is an array of layer objects:
///
/// ```json
/// [{
///     "layerId": 2,
///     "name": "conv1",
///     "modelBytes": 10000,
///     "prevLayers": [{"LayerId": 1, "InputBytesPerSample": 100}],
///     "assignedAccelerators": [{"id": 2, "localBatch": 32}, {"id": 3, "localBatch": 32}]
/// }]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingPlan(pub Vec<Layer>);

impl TrainingPlan {
    /// The layers of the plan, in topological order.
    pub fn layers(&self) -> &[Layer] {
        &self.0
    }

    /// Parse a plan from its JSON representation.
    pub fn from_json(s: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a plan from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Render the plan as JSON.
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve the plan against a fabric and validate it.
    ///
    /// This maps every replica id to an element handle (per `mode`), computes sample ranges and
    /// batch sizes, derives the successor adjacency (the inverse of `prevLayers`, with
    /// bytes-per-sample copied), and checks all structural invariants:
    ///
    /// - the plan is not empty, layer ids are unique, and every layer has replicas;
    /// - every predecessor reference names a layer defined *earlier* in the plan;
    /// - every predecessor has the same global batch size as the referencing layer;
    /// - no accelerator appears twice within one layer;
    /// - exactly the last layer of the plan has no consumers.
    pub fn resolve(
        &self,
        net: &Network,
        mode: ReplicaIdMode,
    ) -> Result<ResolvedPlan, PlanError> {
        if self.0.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        let mut index: HashMap<LayerId, usize> = HashMap::new();
        let mut layers: Vec<ResolvedLayer> = Vec::with_capacity(self.0.len());
        for layer in &self.0 {
            if index.contains_key(&layer.layer_id) {
                return Err(PlanError::DuplicateLayer(layer.layer_id));
            }
            if layer.replicas.is_empty() {
                return Err(PlanError::NoReplicas(layer.layer_id));
            }
            let mut replicas: Vec<ResolvedReplica> = Vec::with_capacity(layer.replicas.len());
            let mut cursor = 0_u64;
            for assign in &layer.replicas {
                let accelerator = resolve_replica_id(net, mode, assign.id)
                    .ok_or(PlanError::ReplicaOutOfRange {
                        layer: layer.layer_id,
                        id: assign.id,
                    })?;
                if replicas.iter().any(|r| r.accelerator == accelerator) {
                    return Err(PlanError::DuplicateReplica {
                        layer: layer.layer_id,
                        accelerator,
                    });
                }
                let start = cursor;
                cursor += assign.local_batch;
                replicas.push(ResolvedReplica {
                    accelerator,
                    local_batch: assign.local_batch,
                    samples: start..cursor,
                });
            }
            let batch_size = cursor;
            for flow in &layer.prev_layers {
                let prev = index
                    .get(&flow.layer)
                    .map(|&pos| &layers[pos])
                    .ok_or(PlanError::UnknownPrevLayer {
                        layer: layer.layer_id,
                        prev: flow.layer,
                    })?;
                if prev.batch_size != batch_size {
                    return Err(PlanError::BatchMismatch {
                        layer: layer.layer_id,
                        batch: batch_size,
                        prev: prev.id,
                        prev_batch: prev.batch_size,
                    });
                }
            }
            index.insert(layer.layer_id, layers.len());
            layers.push(ResolvedLayer {
                id: layer.layer_id,
                name: layer.name.clone(),
                model_bytes: layer.model_bytes,
                batch_size,
                prev: layer.prev_layers.clone(),
                next: Vec::new(),
                replicas,
            });
        }
        // derive the successor adjacency
        for i in 0..layers.len() {
            let id = layers[i].id;
            let prevs = layers[i].prev.clone();
            for flow in prevs {
                let pos = index[&flow.layer];
                layers[pos].next.push(LayerFlow {
                    layer: id,
                    bytes_per_sample: flow.bytes_per_sample,
                });
            }
        }
        // exactly the last layer may be without consumers
        for (i, layer) in layers.iter().enumerate() {
            if layer.next.is_empty() && i + 1 != layers.len() {
                return Err(PlanError::DanglingLayer(layer.id));
            }
        }
        Ok(ResolvedPlan { layers, index })
    }
}

fn resolve_replica_id(net: &Network, mode: ReplicaIdMode, id: u32) -> Option<ElementId> {
    match mode {
        ReplicaIdMode::Rank => {
            if id == 0 {
                return None;
            }
            net.accelerators().get(id as usize - 1).copied()
        }
        ReplicaIdMode::Handle => {
            let handle = ElementId::new(id as usize);
            net.element(handle)
                .filter(|e| e.is_accelerator())
                .map(|_| handle)
        }
    }
}

/// A replica of a [`ResolvedLayer`], bound to an accelerator handle and a sample range.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReplica {
    /// The accelerator running this replica.
    pub accelerator: ElementId,
    /// The number of samples this replica processes.
    pub local_batch: u64,
    /// The half-open sample range owned by this replica.
    pub samples: Range<u64>,
}

/// A layer of a [`ResolvedPlan`], with handles resolved, ranges computed, and the successor
/// adjacency derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    /// The layer id.
    pub id: LayerId,
    /// Human-readable layer name.
    pub name: String,
    /// Size of the layer parameters in bytes (parameter-sync hook; unused by the iteration).
    pub model_bytes: f64,
    /// The global batch size.
    pub batch_size: u64,
    /// Predecessor edges, with input bytes per sample.
    pub prev: Vec<LayerFlow>,
    /// Successor edges (derived), with output bytes per sample.
    pub next: Vec<LayerFlow>,
    /// The ordered, resolved replicas.
    pub replicas: Vec<ResolvedReplica>,
}

/// A validated plan with element handles resolved, ready for DAG construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    layers: Vec<ResolvedLayer>,
    index: HashMap<LayerId, usize>,
}

impl ResolvedPlan {
    /// The layers in plan order.
    pub fn layers(&self) -> &[ResolvedLayer] {
        &self.layers
    }

    /// Look up a layer by id.
    pub fn get(&self, id: LayerId) -> Option<&ResolvedLayer> {
        self.index.get(&id).map(|&pos| &self.layers[pos])
    }

    /// The first layer in plan order.
    pub fn first(&self) -> &ResolvedLayer {
        &self.layers[0]
    }

    /// The terminal layer (the last in plan order; the only one without consumers).
    pub fn terminal(&self) -> &ResolvedLayer {
        &self.layers[self.layers.len() - 1]
    }
}

impl Index<LayerId> for ResolvedPlan {
    type Output = ResolvedLayer;

    fn index(&self, id: LayerId) -> &Self::Output {
        &self.layers[self.index[&id]]
    }
}
