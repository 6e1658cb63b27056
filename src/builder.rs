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

//! Module for generating common fabric shapes.

use crate::network::Network;
use crate::types::{ElementId, TopologyError};

/// Accelerator model used by the builders.
pub const DEFAULT_ACCELERATOR_MODEL: &str = "V100";
/// PCIe bandwidth between an accelerator and its switch or host, in Gbps.
pub const DEFAULT_PCIE_BANDWIDTH: f64 = 1000.0;
/// PCIe latency between an accelerator and its switch or host, in microseconds.
pub const DEFAULT_PCIE_LATENCY: f64 = 10.0;

/// Trait for generating common fabric shapes quickly. The constructors return a fabric with the
/// path table already computed, ready to be simulated on:
///
/// ```
/// use fabricsim::builder::FabricBuilder;
/// use fabricsim::prelude::*;
///
/// # fn main() -> Result<(), SimError> {
/// // two hosts behind one ToR switch, two GPUs each
/// let net = Network::build_host_fabric(2, 2, 10.0, 10.0)?;
/// assert_eq!(net.accelerators().len(), 4);
/// # Ok(())
/// # }
/// ```
pub trait FabricBuilder: Sized {
    /// Build a fabric with a single switch and `num_accelerators` GPUs attached to it by one
    /// PCIe link pair each (no hosts). Shortest paths are computed before returning.
    fn build_single_switch_fabric(num_accelerators: usize) -> Result<Self, TopologyError>;

    /// Build a fabric with one ToR switch and `num_hosts` hosts, each connected to the switch by
    /// a NIC link pair of the given bandwidth (Gbps) and latency (microseconds), and each
    /// carrying `accelerators_per_host` GPUs on PCIe link pairs. Shortest paths are computed
    /// before returning.
    fn build_host_fabric(
        num_hosts: usize,
        accelerators_per_host: usize,
        tor_bandwidth: f64,
        tor_latency: f64,
    ) -> Result<Self, TopologyError>;

    /// Attach `count` accelerators of the default model to the given switch or host, each with
    /// one link pair of the given bandwidth and latency. Returns the new handles.
    fn attach_accelerators(
        &mut self,
        attach_to: ElementId,
        count: usize,
        bandwidth: f64,
        latency: f64,
    ) -> Result<Vec<ElementId>, TopologyError>;
}

impl FabricBuilder for Network {
    fn build_single_switch_fabric(num_accelerators: usize) -> Result<Self, TopologyError> {
        let mut net = Network::new();
        let root = net.add_switch();
        net.attach_accelerators(
            root,
            num_accelerators,
            DEFAULT_PCIE_BANDWIDTH,
            DEFAULT_PCIE_LATENCY,
        )?;
        net.compute_shortest_paths();
        Ok(net)
    }

    fn build_host_fabric(
        num_hosts: usize,
        accelerators_per_host: usize,
        tor_bandwidth: f64,
        tor_latency: f64,
    ) -> Result<Self, TopologyError> {
        let mut net = Network::new();
        let root = net.add_switch();
        for _ in 0..num_hosts {
            let host = net.add_host();
            net.add_link(root, host, tor_bandwidth, tor_latency)?;
            net.add_link(host, root, tor_bandwidth, tor_latency)?;
            net.attach_accelerators(
                host,
                accelerators_per_host,
                DEFAULT_PCIE_BANDWIDTH,
                DEFAULT_PCIE_LATENCY,
            )?;
        }
        net.compute_shortest_paths();
        Ok(net)
    }

    fn attach_accelerators(
        &mut self,
        attach_to: ElementId,
        count: usize,
        bandwidth: f64,
        latency: f64,
    ) -> Result<Vec<ElementId>, TopologyError> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let gpu = self.add_accelerator(DEFAULT_ACCELERATOR_MODEL);
            self.add_link(attach_to, gpu, bandwidth, latency)?;
            self.add_link(gpu, attach_to, bandwidth, latency)?;
            ids.push(gpu);
        }
        Ok(ids)
    }
}
