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

//! Test the fabric topology and the shortest-path table.

use crate::builder::FabricBuilder;
use crate::network::{Link, Network};
use crate::types::{ElementId, TopologyError};

use lazy_static::lazy_static;
use pretty_assertions::assert_eq;

lazy_static! {
    static ref SW1: ElementId = 0.into();
    static ref SW2: ElementId = 1.into();
    static ref G1: ElementId = 2.into();
    static ref G2: ElementId = 3.into();
    static ref G3: ElementId = 4.into();
    static ref G4: ElementId = 5.into();
}

/// Two interconnected switches with two GPUs each:
///
/// ```text
/// G1 -- SW1 ==== SW2 -- G3
/// G2 -'              '- G4
/// ```
fn ring_fabric() -> Network {
    let mut net = Network::new();
    let sw1 = net.add_switch();
    let sw2 = net.add_switch();
    assert_eq!(sw1, *SW1);
    assert_eq!(sw2, *SW2);
    net.add_link(sw1, sw2, 100.0, 5.0).unwrap();
    net.add_link(sw2, sw1, 100.0, 5.0).unwrap();
    net.attach_accelerators(sw1, 2, 1000.0, 10.0).unwrap();
    net.attach_accelerators(sw2, 2, 1000.0, 10.0).unwrap();
    net.compute_shortest_paths();
    net
}

#[test]
fn ring_paths() {
    let net = ring_fabric();
    // accelerators on different switches are three hops apart
    assert_eq!(net.path(*G1, *G3).unwrap(), [*SW1, *SW2, *G3]);
    assert_eq!(net.path(*G2, *G4).unwrap(), [*SW1, *SW2, *G4]);
    assert_eq!(net.path(*G3, *G1).unwrap(), [*SW2, *SW1, *G1]);
    // accelerators on the same switch are two hops apart
    assert_eq!(net.path(*G1, *G2).unwrap(), [*SW1, *G2]);
    assert_eq!(net.path(*G4, *G3).unwrap(), [*SW2, *G3]);
    // direct neighbors
    assert_eq!(net.path(*G1, *SW1).unwrap(), [*SW1]);
    assert_eq!(net.path(*SW1, *SW2).unwrap(), [*SW2]);
}

#[test]
fn paths_are_valid_and_minimal() {
    let net = ring_fabric();
    for src in (0..net.num_elements()).map(ElementId::new) {
        for (dst, hops) in net.reachable_from(src) {
            // no self pairs
            assert_ne!(src, dst);
            // the hop list ends at the destination and every step is a direct link
            assert_eq!(*hops.last().unwrap(), dst);
            let mut prev = src;
            for &hop in hops {
                net.find_link(prev, hop).unwrap();
                prev = hop;
            }
        }
    }
    // in this fabric, the diameter is three hops
    let longest = (0..net.num_elements())
        .map(ElementId::new)
        .flat_map(|src| net.reachable_from(src).map(|(_, hops)| hops.len()))
        .max()
        .unwrap();
    assert_eq!(longest, 3);
}

#[test]
fn host_fabric_paths() {
    let net = Network::build_host_fabric(2, 2, 10.0, 10.0).unwrap();
    // 1 switch, 2 hosts, 4 accelerators
    assert_eq!(net.switches().len(), 1);
    assert_eq!(net.hosts().len(), 2);
    assert_eq!(net.accelerators().len(), 4);
    let (sw, h1, h2) = (net.switches()[0], net.hosts()[0], net.hosts()[1]);
    let gpus = net.accelerators();
    // same host: two hops through the local host
    assert_eq!(net.path(gpus[0], gpus[1]).unwrap(), [h1, gpus[1]]);
    // different hosts: four hops through both hosts and the ToR switch
    assert_eq!(net.path(gpus[0], gpus[2]).unwrap(), [h1, sw, h2, gpus[2]]);
}

#[test]
fn unreachable_pairs_are_absent() {
    let mut net = Network::new();
    let a = net.add_accelerator("V100");
    let b = net.add_accelerator("V100");
    let c = net.add_accelerator("V100");
    // a and b are connected both ways, c only receives
    net.add_link(a, b, 1000.0, 10.0).unwrap();
    net.add_link(b, a, 1000.0, 10.0).unwrap();
    net.add_link(b, c, 1000.0, 10.0).unwrap();
    net.compute_shortest_paths();
    assert_eq!(net.path(a, b).unwrap(), [b]);
    assert_eq!(net.path(a, c).unwrap(), [b, c]);
    // self pairs are never recorded, not even over the round trip a -> b -> a
    assert_eq!(net.path(a, a).unwrap_err(), TopologyError::Unreachable(a, a));
    assert_eq!(net.path(b, b).unwrap_err(), TopologyError::Unreachable(b, b));
    // c has no outgoing links at all
    assert_eq!(net.path(c, a).unwrap_err(), TopologyError::Unreachable(c, a));
    assert_eq!(net.reachable_from(c).count(), 0);
}

#[test]
fn parallel_links_last_wins() {
    let mut net = Network::new();
    let a = net.add_switch();
    let b = net.add_accelerator("V100");
    let first = net.add_link(a, b, 100.0, 10.0).unwrap();
    let second = net.add_link(a, b, 1000.0, 1.0).unwrap();
    assert_ne!(first, second);
    assert_eq!(net.find_link(a, b).unwrap(), second);
    assert_eq!(net.num_links(), 2);
}

#[test]
fn add_link_errors() {
    let mut net = Network::new();
    let a = net.add_switch();
    let ghost = ElementId::new(99);
    assert_eq!(
        net.add_link(a, ghost, 100.0, 10.0).unwrap_err(),
        TopologyError::ElementNotFound(ghost)
    );
    assert_eq!(
        net.add_link(a, a, 100.0, 10.0).unwrap_err(),
        TopologyError::SelfLoop(a)
    );
    let b = net.add_accelerator("V100");
    net.add_link(a, b, 100.0, 10.0).unwrap();
    net.compute_shortest_paths();
    assert_eq!(
        net.add_link(b, a, 100.0, 10.0).unwrap_err(),
        TopologyError::PathsFrozen
    );
}

#[test]
fn paths_are_deterministic() {
    let a = ring_fabric();
    let b = ring_fabric();
    for src in (0..a.num_elements()).map(ElementId::new) {
        let pa: Vec<_> = a.reachable_from(src).collect();
        let pb: Vec<_> = b.reachable_from(src).collect();
        assert_eq!(pa, pb);
    }
}

#[test]
fn xfer_time_formula() {
    let link = Link {
        src: ElementId::new(0),
        dst: ElementId::new(1),
        bandwidth: 1000.0,
        latency: 17.0,
    };
    assert_eq!(link.xfer_time(1000.0), 18.0);
    assert_eq!(link.xfer_time(2000.0), 19.0);
}

#[test]
fn accelerator_ranks_and_models() {
    let mut net = Network::new();
    let host = net.add_host();
    let a = net.add_accelerator("V100");
    let b = net.add_accelerator("A100");
    assert_eq!(net.accelerators(), [a, b]);
    assert_eq!(net.accelerator_model(a).unwrap(), "V100");
    assert_eq!(net.accelerator_model(b).unwrap(), "A100");
    assert_eq!(
        net.accelerator_model(host).unwrap_err(),
        TopologyError::NotAnAccelerator(host)
    );
}
