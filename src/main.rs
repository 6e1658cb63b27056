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

use clap::Parser;
use std::path::PathBuf;

use fabricsim::builder::{FabricBuilder, DEFAULT_ACCELERATOR_MODEL};
use fabricsim::prelude::*;

/// Predict the duration of one training iteration on an accelerator fabric.
///
/// Without arguments, a built-in demo plan is simulated on the generated fabric. With a profile
/// and a plan file, those are loaded instead.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to a recorded compute-cost profile (JSON).
    #[clap(requires = "plan")]
    profile: Option<PathBuf>,
    /// Path to a training plan (JSON).
    plan: Option<PathBuf>,
    /// Treat replica ids in the plan as element handles instead of 1-based accelerator ranks.
    #[clap(long)]
    handle_ids: bool,
    /// Accelerator model that the loaded profile belongs to.
    #[clap(long, default_value = DEFAULT_ACCELERATOR_MODEL)]
    model: String,
    /// Number of hosts in the generated fabric.
    #[clap(long, default_value_t = 2)]
    hosts: usize,
    /// Accelerators per host in the generated fabric.
    #[clap(long, default_value_t = 2)]
    gpus_per_host: usize,
    /// Host-to-ToR bandwidth in Gbps.
    #[clap(long, default_value_t = 10.0)]
    tor_bandwidth: f64,
    /// Host-to-ToR latency in microseconds.
    #[clap(long, default_value_t = 10.0)]
    tor_latency: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();
    let args = Cli::parse();

    let net = Network::build_host_fabric(
        args.hosts,
        args.gpus_per_host,
        args.tor_bandwidth,
        args.tor_latency,
    )?;
    log::debug!("fabric: {}", net.config_json()?);
    println!("{}", net.format_paths());

    let mode = if args.handle_ids {
        ReplicaIdMode::Handle
    } else {
        ReplicaIdMode::Rank
    };
    let (plan, profiles) = match (&args.profile, &args.plan) {
        (Some(profile_path), Some(plan_path)) => {
            let mut profiles = ProfileLibrary::new();
            profiles.insert(args.model.as_str(), CostProfile::from_file(profile_path)?);
            (TrainingPlan::from_file(plan_path)?, profiles)
        }
        _ => demo_inputs(),
    };
    println!("{}", plan.to_json()?);

    let report = simulate_iteration(&net, &plan, &profiles, mode)?;
    print!("{report}");
    println!("makespan: {:.2} us", report.makespan());
    Ok(())
}

/// The built-in demo: a two-layer plan where an input layer on the first GPU feeds a layer
/// replicated over the next two GPUs, with synthetic V100 costs.
fn demo_inputs() -> (TrainingPlan, ProfileLibrary) {
    let plan = TrainingPlan(vec![
        Layer {
            layer_id: LayerId(1),
            name: "input".to_string(),
            model_bytes: 1000.0,
            prev_layers: vec![],
            replicas: vec![ReplicaAssignment {
                id: 1,
                local_batch: 64,
            }],
        },
        Layer {
            layer_id: LayerId(2),
            name: "fc1".to_string(),
            model_bytes: 10000.0,
            prev_layers: vec![LayerFlow {
                layer: LayerId(1),
                bytes_per_sample: 100.0,
            }],
            replicas: vec![
                ReplicaAssignment {
                    id: 2,
                    local_batch: 32,
                },
                ReplicaAssignment {
                    id: 3,
                    local_batch: 32,
                },
            ],
        },
    ]);

    let mut profile = CostProfile::new();
    profile.add_datapoint_pair(LayerId(1), 32.0, 420.0, 700.0);
    profile.add_datapoint_pair(LayerId(1), 64.0, 800.0, 1300.0);
    profile.add_datapoint_pair(LayerId(2), 32.0, 510.0, 860.0);
    profile.add_datapoint_pair(LayerId(2), 64.0, 980.0, 1650.0);
    let mut profiles = ProfileLibrary::new();
    profiles.insert(DEFAULT_ACCELERATOR_MODEL, profile);

    (plan, profiles)
}
