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

//! Module containing the recorded compute-cost profiles.
//!
//! A [`CostProfile`] maps `(phase, layer, local batch size)` to a compute time by linear
//! interpolation over recorded datapoints. One profile is recorded per accelerator model; the
//! [`ProfileLibrary`] holds them keyed by model name.
//!
//! The on-disk format is a two-element JSON array `[forwardMap, backwardMap]`; each map keys the
//! layer id (as a string) to a list of `[batch, time]` pairs sorted by batch ascending.

use crate::types::{LayerId, Phase, ProfileError, SimError, SimTime};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One recorded measurement: a local batch size and the compute time it took, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint(pub f64, pub f64);

impl Datapoint {
    /// The recorded local batch size.
    pub fn batch(&self) -> f64 {
        self.0
    }

    /// The recorded compute time, in microseconds.
    pub fn time(&self) -> SimTime {
        self.1
    }
}

/// Recorded compute costs of one accelerator model: per phase and layer, a batch-sorted series
/// of datapoints.
///
/// Queries interpolate linearly between the bracketing datapoints. Below the smallest recorded
/// batch, the implicit anchor `(0, 0)` is used; above the largest recorded batch, the query is
/// an error.
///
/// ```
/// use fabricsim::prelude::*;
///
/// # fn main() -> Result<(), SimError> {
/// let mut profile = CostProfile::new();
/// profile.add_datapoint(Phase::Forward, LayerId(1), 32.0, 100.0);
/// profile.add_datapoint(Phase::Forward, LayerId(1), 64.0, 164.0);
/// assert_eq!(profile.cost(Phase::Forward, LayerId(1), 48.0)?, 132.0);
/// assert_eq!(profile.cost(Phase::Forward, LayerId(1), 16.0)?, 50.0);
/// # Ok(())
/// # }
/// ```
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostProfile(
    #[serde_as(as = "[BTreeMap<DisplayFromStr, _>; 2]")] [BTreeMap<LayerId, Vec<Datapoint>>; 2],
);

impl CostProfile {
    /// Create an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one datapoint, keeping the series sorted by batch size. Duplicate batch values are
    /// allowed; queries take the first bracketing pair encountered.
    pub fn add_datapoint(&mut self, phase: Phase, layer: LayerId, batch: f64, time: SimTime) {
        let series = self.0[phase.index()].entry(layer).or_default();
        series.push(Datapoint(batch, time));
        series.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    /// Record one datapoint for both phases at once, the way profiler output is usually shaped.
    pub fn add_datapoint_pair(
        &mut self,
        layer: LayerId,
        batch: f64,
        forward_time: SimTime,
        backward_time: SimTime,
    ) {
        self.add_datapoint(Phase::Forward, layer, batch, forward_time);
        self.add_datapoint(Phase::Backward, layer, batch, backward_time);
    }

    /// The compute time for the given phase, layer, and local batch size.
    ///
    /// Finds the smallest recorded batch `B >= batch`; the previous entry (or the implicit
    /// `(0, 0)`) is `A`. Returns `A.time + (batch - A.batch) * (B.time - A.time) / (B.batch -
    /// A.batch)`. Fails if the layer is unknown or `batch` exceeds every recorded datapoint.
    pub fn cost(&self, phase: Phase, layer: LayerId, batch: f64) -> Result<SimTime, ProfileError> {
        let series = self.0[phase.index()]
            .get(&layer)
            .ok_or(ProfileError::UnknownLayer(phase, layer))?;
        if series.is_empty() {
            return Err(ProfileError::NoDatapoints(phase, layer));
        }
        let mut prev = Datapoint(0.0, 0.0);
        for dp in series {
            if batch <= dp.batch() {
                return Ok(prev.time()
                    + (batch - prev.batch()) * (dp.time() - prev.time())
                        / (dp.batch() - prev.batch()));
            }
            prev = *dp;
        }
        Err(ProfileError::BatchTooLarge {
            phase,
            layer,
            batch,
            max: prev.batch(),
        })
    }

    /// Iterate over the layers recorded for the given phase.
    pub fn layers(&self, phase: Phase) -> impl Iterator<Item = LayerId> + '_ {
        self.0[phase.index()].keys().copied()
    }

    /// Parse a profile from its JSON representation.
    pub fn from_json(s: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a profile from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Render the profile as JSON.
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// All recorded profiles, keyed by accelerator model name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileLibrary(HashMap<String, CostProfile>);

impl From<HashMap<String, CostProfile>> for ProfileLibrary {
    fn from(profiles: HashMap<String, CostProfile>) -> Self {
        Self(profiles)
    }
}

impl ProfileLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the profile of an accelerator model, replacing any previous one.
    pub fn insert(&mut self, model: impl Into<String>, profile: CostProfile) -> Option<CostProfile> {
        self.0.insert(model.into(), profile)
    }

    /// The profile of the given accelerator model.
    pub fn get(&self, model: &str) -> Result<&CostProfile, ProfileError> {
        self.0
            .get(model)
            .ok_or_else(|| ProfileError::UnknownModel(model.to_string()))
    }

    /// Iterate over the registered model names.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
