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

//! Test the compute-cost profiles and their interpolation.

use crate::profile::{CostProfile, ProfileLibrary};
use crate::types::{LayerId, Phase, ProfileError};

use maplit::hashmap;
use pretty_assertions::assert_eq;

fn two_point_profile() -> CostProfile {
    let mut profile = CostProfile::new();
    profile.add_datapoint(Phase::Forward, LayerId(1), 32.0, 100.0);
    profile.add_datapoint(Phase::Forward, LayerId(1), 64.0, 164.0);
    profile
}

#[test]
fn interpolation() {
    let profile = two_point_profile();
    // between the two recorded points
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 48.0).unwrap(), 132.0);
    // below the smallest recorded batch, the implicit (0, 0) anchor is used
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 16.0).unwrap(), 50.0);
    // recorded batches return the recorded times exactly
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 32.0).unwrap(), 100.0);
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 64.0).unwrap(), 164.0);
}

#[test]
fn batch_above_all_datapoints() {
    let profile = two_point_profile();
    assert_eq!(
        profile.cost(Phase::Forward, LayerId(1), 65.0).unwrap_err(),
        ProfileError::BatchTooLarge {
            phase: Phase::Forward,
            layer: LayerId(1),
            batch: 65.0,
            max: 64.0,
        }
    );
}

#[test]
fn unknown_layer_and_phase() {
    let profile = two_point_profile();
    assert_eq!(
        profile.cost(Phase::Forward, LayerId(2), 32.0).unwrap_err(),
        ProfileError::UnknownLayer(Phase::Forward, LayerId(2))
    );
    // nothing was recorded for the backward phase
    assert_eq!(
        profile.cost(Phase::Backward, LayerId(1), 32.0).unwrap_err(),
        ProfileError::UnknownLayer(Phase::Backward, LayerId(1))
    );
}

#[test]
fn insertion_keeps_series_sorted() {
    let mut profile = CostProfile::new();
    profile.add_datapoint(Phase::Forward, LayerId(1), 64.0, 164.0);
    profile.add_datapoint(Phase::Forward, LayerId(1), 16.0, 50.0);
    profile.add_datapoint(Phase::Forward, LayerId(1), 32.0, 100.0);
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 24.0).unwrap(), 75.0);
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 48.0).unwrap(), 132.0);
}

#[test]
fn interpolation_is_monotone() {
    let profile = two_point_profile();
    let mut last = 0.0;
    for batch in 1..=64 {
        let cost = profile.cost(Phase::Forward, LayerId(1), batch as f64).unwrap();
        assert!(cost >= last, "cost({batch}) = {cost} < {last}");
        last = cost;
    }
}

#[test]
fn datapoint_pairs_fill_both_phases() {
    let mut profile = CostProfile::new();
    profile.add_datapoint_pair(LayerId(3), 64.0, 120.0, 200.0);
    assert_eq!(profile.cost(Phase::Forward, LayerId(3), 32.0).unwrap(), 60.0);
    assert_eq!(profile.cost(Phase::Backward, LayerId(3), 32.0).unwrap(), 100.0);
    assert_eq!(profile.layers(Phase::Forward).collect::<Vec<_>>(), [LayerId(3)]);
}

#[test]
fn json_format() {
    // a two-element array [forwardMap, backwardMap]; layer ids are string keys
    let raw = r#"[{"1": [[32, 100], [64, 164]]}, {"1": [[32, 80], [64, 120]]}]"#;
    let profile = CostProfile::from_json(raw).unwrap();
    assert_eq!(profile.cost(Phase::Forward, LayerId(1), 48.0).unwrap(), 132.0);
    assert_eq!(profile.cost(Phase::Backward, LayerId(1), 48.0).unwrap(), 100.0);

    let reparsed = CostProfile::from_json(&profile.to_json().unwrap()).unwrap();
    assert_eq!(profile, reparsed);
}

#[test]
fn library_lookup() {
    let mut profile = CostProfile::new();
    profile.add_datapoint_pair(LayerId(1), 64.0, 100.0, 180.0);
    let library = ProfileLibrary::from(hashmap! {
        "V100".to_string() => profile,
    });
    assert!(library.get("V100").is_ok());
    assert_eq!(
        library.get("A100").unwrap_err(),
        ProfileError::UnknownModel("A100".to_string())
    );
}
