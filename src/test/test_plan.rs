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

//! Test the training-plan model, its file format, and its validation.

use crate::builder::FabricBuilder;
use crate::network::Network;
use crate::plan::{Layer, LayerFlow, ReplicaAssignment, ReplicaIdMode, TrainingPlan};
use crate::types::{LayerId, PlanError};

use pretty_assertions::assert_eq;

fn layer(
    id: u32,
    prev: &[(u32, f64)],
    replicas: &[(u32, u64)],
) -> Layer {
    Layer {
        layer_id: LayerId(id),
        name: format!("layer{id}"),
        model_bytes: 1000.0,
        prev_layers: prev
            .iter()
            .map(|&(layer, bytes_per_sample)| LayerFlow {
                layer: LayerId(layer),
                bytes_per_sample,
            })
            .collect(),
        replicas: replicas
            .iter()
            .map(|&(id, local_batch)| ReplicaAssignment { id, local_batch })
            .collect(),
    }
}

/// Two layers over four GPUs: layer 1 on the first, layer 2 split over the next two.
fn simple_plan() -> TrainingPlan {
    TrainingPlan(vec![
        layer(1, &[], &[(1, 64)]),
        layer(2, &[(1, 100.0)], &[(2, 32), (3, 32)]),
    ])
}

fn fabric() -> Network {
    Network::build_single_switch_fabric(4).unwrap()
}

#[test]
fn parse_plan_format() {
    let raw = r#"[
        {
            "layerId": 1,
            "name": "input",
            "modelBytes": 1000,
            "prevLayers": [],
            "assignedAccelerators": [{"id": 1, "localBatch": 64}]
        },
        {
            "layerId": 2,
            "name": "fc1",
            "modelBytes": 10000,
            "prevLayers": [{"LayerId": 1, "InputBytesPerSample": 100}],
            "assignedAccelerators": [{"id": 2, "localBatch": 32}, {"id": 3, "localBatch": 32}]
        }
    ]"#;
    let plan = TrainingPlan::from_json(raw).unwrap();
    assert_eq!(plan.layers().len(), 2);
    assert_eq!(plan.layers()[0].layer_id, LayerId(1));
    assert_eq!(plan.layers()[0].batch_size(), 64);
    assert_eq!(plan.layers()[1].prev_layers[0].layer, LayerId(1));
    assert_eq!(plan.layers()[1].prev_layers[0].bytes_per_sample, 100.0);
    assert_eq!(plan.layers()[1].replicas[1].local_batch, 32);

    // the rendered form parses back to the same plan
    let reparsed = TrainingPlan::from_json(&plan.to_json().unwrap()).unwrap();
    assert_eq!(plan, reparsed);
}

#[test]
fn replica_ranges() {
    let plan = simple_plan();
    let ranges: Vec<_> = plan.layers()[1]
        .replica_ranges()
        .map(|(r, range)| (r.id, range))
        .collect();
    assert_eq!(ranges, [(2, 0..32), (3, 32..64)]);
}

#[test]
fn resolve_rank_mode() {
    let net = fabric();
    let resolved = simple_plan().resolve(&net, ReplicaIdMode::Rank).unwrap();
    // rank 1 is the first accelerator in creation order
    assert_eq!(
        resolved.first().replicas[0].accelerator,
        net.accelerators()[0]
    );
    assert_eq!(
        resolved[LayerId(2)].replicas[1].accelerator,
        net.accelerators()[2]
    );
    assert_eq!(resolved[LayerId(2)].replicas[1].samples, 32..64);
    assert_eq!(resolved.terminal().id, LayerId(2));
}

#[test]
fn resolve_handle_mode() {
    let net = fabric();
    // element 0 is the switch; the GPUs are handles 1..=4
    let plan = TrainingPlan(vec![
        layer(1, &[], &[(1, 64)]),
        layer(2, &[(1, 100.0)], &[(2, 32), (3, 32)]),
    ]);
    let resolved = plan.resolve(&net, ReplicaIdMode::Handle).unwrap();
    assert_eq!(
        resolved.first().replicas[0].accelerator,
        net.accelerators()[0]
    );
    assert_eq!(
        resolved[LayerId(2)].replicas[0].accelerator,
        net.accelerators()[1]
    );
    // the switch handle is not an accelerator
    let bad = TrainingPlan(vec![layer(1, &[], &[(0, 64)])]);
    assert_eq!(
        bad.resolve(&net, ReplicaIdMode::Handle).unwrap_err(),
        PlanError::ReplicaOutOfRange {
            layer: LayerId(1),
            id: 0,
        }
    );
}

#[test]
fn derived_successors() {
    let net = fabric();
    let resolved = simple_plan().resolve(&net, ReplicaIdMode::Rank).unwrap();
    // layer 1 feeds layer 2, with the bytes-per-sample value copied
    assert_eq!(
        resolved.first().next,
        [LayerFlow {
            layer: LayerId(2),
            bytes_per_sample: 100.0,
        }]
    );
    assert!(resolved.terminal().next.is_empty());
}

#[test]
fn batch_mismatch() {
    let net = fabric();
    // layer 2 only covers half of layer 1's batch
    let plan = TrainingPlan(vec![
        layer(1, &[], &[(1, 64)]),
        layer(2, &[(1, 100.0)], &[(2, 32)]),
    ]);
    assert_eq!(
        plan.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::BatchMismatch {
            layer: LayerId(2),
            batch: 32,
            prev: LayerId(1),
            prev_batch: 64,
        }
    );
}

#[test]
fn structural_errors() {
    let net = fabric();

    assert_eq!(
        TrainingPlan::default()
            .resolve(&net, ReplicaIdMode::Rank)
            .unwrap_err(),
        PlanError::EmptyPlan
    );

    let duplicate = TrainingPlan(vec![
        layer(1, &[], &[(1, 64)]),
        layer(1, &[(1, 10.0)], &[(2, 64)]),
    ]);
    assert_eq!(
        duplicate.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::DuplicateLayer(LayerId(1))
    );

    // a predecessor must appear earlier in the plan
    let unknown = TrainingPlan(vec![layer(2, &[(1, 10.0)], &[(1, 64)])]);
    assert_eq!(
        unknown.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::UnknownPrevLayer {
            layer: LayerId(2),
            prev: LayerId(1),
        }
    );

    let no_replicas = TrainingPlan(vec![layer(1, &[], &[])]);
    assert_eq!(
        no_replicas.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::NoReplicas(LayerId(1))
    );

    // rank 5 does not exist in a four-GPU fabric, and rank 0 never does
    let out_of_range = TrainingPlan(vec![layer(1, &[], &[(5, 64)])]);
    assert_eq!(
        out_of_range.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::ReplicaOutOfRange {
            layer: LayerId(1),
            id: 5,
        }
    );
    let rank_zero = TrainingPlan(vec![layer(1, &[], &[(0, 64)])]);
    assert_eq!(
        rank_zero.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::ReplicaOutOfRange {
            layer: LayerId(1),
            id: 0,
        }
    );

    let twice = TrainingPlan(vec![layer(1, &[], &[(1, 32), (1, 32)])]);
    assert_eq!(
        twice.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::DuplicateReplica {
            layer: LayerId(1),
            accelerator: net.accelerators()[0],
        }
    );
}

#[test]
fn dangling_layer() {
    let net = fabric();
    // layer 2 feeds nothing, but layer 3 is the terminal layer
    let plan = TrainingPlan(vec![
        layer(1, &[], &[(1, 64)]),
        layer(2, &[], &[(2, 64)]),
        layer(3, &[(1, 10.0)], &[(3, 64)]),
    ]);
    assert_eq!(
        plan.resolve(&net, ReplicaIdMode::Rank).unwrap_err(),
        PlanError::DanglingLayer(LayerId(2))
    );
}
