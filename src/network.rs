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

//! # Top-level Network module
//!
//! This module represents the accelerator fabric: elements (accelerators, hosts, and switches),
//! the directed links between them, and the all-pairs shortest-path table derived from the links.

use crate::types::{ElementId, IndexType, LinkId, SimError, SimTime, TopologyError};

use itertools::Itertools;
use log::*;
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A node of the fabric. Accelerators do the computing; hosts and switches only relay traffic
/// over their links (neither imposes an aggregate bandwidth cap of its own).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    /// A compute device (e.g., a GPU).
    Accelerator {
        /// Model name, used as the key into the profile library.
        model: String,
        /// Dense index into the ordered accelerator list, used by rank-based plans.
        rank: usize,
    },
    /// A machine that accelerators are attached to.
    Host,
    /// A switch interconnecting hosts or accelerators.
    Switch,
}

impl Element {
    /// Returns true if and only if the element is an accelerator.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Element::Accelerator { .. })
    }

    /// The kind of the element as a static string.
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Accelerator { .. } => "Accelerator",
            Element::Host => "Host",
            Element::Switch => "Switch",
        }
    }
}

/// A directed, point-to-point connection between two elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Source element
    pub src: ElementId,
    /// Destination element
    pub dst: ElementId,
    /// Bandwidth in Gbps
    pub bandwidth: f64,
    /// Latency in microseconds
    pub latency: f64,
}

impl Link {
    /// Time for `bytes` to fully traverse this link, in microseconds.
    ///
    /// The formula is `latency + bytes / bandwidth`, with latency in microseconds and bandwidth
    /// in Gbps. Keep it exactly as written; downstream numbers depend on it.
    pub fn xfer_time(&self, bytes: f64) -> SimTime {
        self.latency + bytes / self.bandwidth
    }
}

/// # Network
///
/// The struct contains all elements of the fabric and the directed links between them. Elements
/// and links are stored on a graph; node indices are the stable element handles and edge indices
/// are the stable link ids, both assigned densely in creation order.
///
/// ```rust
/// use fabricsim::prelude::*;
///
/// fn main() -> Result<(), SimError> {
///     let mut net = Network::default();
///     let sw = net.add_switch();
///     let gpu = net.add_accelerator("V100");
///     net.add_link(sw, gpu, 1000.0, 10.0)?;
///     net.add_link(gpu, sw, 1000.0, 10.0)?;
///     net.compute_shortest_paths();
///     assert_eq!(net.path(sw, gpu)?, [gpu]);
///     Ok(())
/// }
/// ```
///
/// After [`Network::compute_shortest_paths`] the path table is frozen: adding further links is
/// an error, and every reachable ordered pair `(src, dst)` with `src != dst` exposes a hop list
/// `[h1, ..., hk = dst]` along a shortest (fewest-hops) path.
#[derive(Debug)]
pub struct Network {
    graph: StableGraph<Element, Link, Directed, IndexType>,
    accelerators: Vec<ElementId>,
    hosts: Vec<ElementId>,
    switches: Vec<ElementId>,
    /// Direct-link lookup. When parallel links exist, the most recently added one wins.
    direct_links: HashMap<(ElementId, ElementId), LinkId>,
    /// Out-links per element, in link creation order.
    out_links: HashMap<ElementId, Vec<LinkId>>,
    /// Hop lists per source. The inner map is ordered so that relaxation is deterministic.
    paths: HashMap<ElementId, BTreeMap<ElementId, Vec<ElementId>>>,
    paths_ready: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Generate an empty fabric.
    pub fn new() -> Self {
        Self {
            graph: StableGraph::default(),
            accelerators: Vec::new(),
            hosts: Vec::new(),
            switches: Vec::new(),
            direct_links: HashMap::new(),
            out_links: HashMap::new(),
            paths: HashMap::new(),
            paths_ready: false,
        }
    }

    /// Add a new switch to the fabric, returning its handle.
    pub fn add_switch(&mut self) -> ElementId {
        let id = self.graph.add_node(Element::Switch);
        self.switches.push(id);
        id
    }

    /// Add a new host to the fabric, returning its handle.
    pub fn add_host(&mut self) -> ElementId {
        let id = self.graph.add_node(Element::Host);
        self.hosts.push(id);
        id
    }

    /// Add a new accelerator of the given model to the fabric, returning its handle. The
    /// accelerator's rank is its position in the ordered accelerator list.
    pub fn add_accelerator(&mut self, model: impl Into<String>) -> ElementId {
        let rank = self.accelerators.len();
        let id = self.graph.add_node(Element::Accelerator {
            model: model.into(),
            rank,
        });
        self.accelerators.push(id);
        id
    }

    /// Add a directed link between two existing, distinct elements. Bandwidth is in Gbps and
    /// latency in microseconds. Returns the stable link id.
    ///
    /// Once [`Self::compute_shortest_paths`] has run, the topology is frozen and this function
    /// returns [`TopologyError::PathsFrozen`].
    pub fn add_link(
        &mut self,
        src: ElementId,
        dst: ElementId,
        bandwidth: f64,
        latency: f64,
    ) -> Result<LinkId, TopologyError> {
        if self.paths_ready {
            return Err(TopologyError::PathsFrozen);
        }
        if src == dst {
            return Err(TopologyError::SelfLoop(src));
        }
        for id in [src, dst] {
            if self.graph.node_weight(id).is_none() {
                return Err(TopologyError::ElementNotFound(id));
            }
        }
        let link = self.graph.add_edge(
            src,
            dst,
            Link {
                src,
                dst,
                bandwidth,
                latency,
            },
        );
        self.direct_links.insert((src, dst), link);
        self.out_links.entry(src).or_default().push(link);
        // seed the path table with the one-hop path
        self.paths.entry(src).or_default().insert(dst, vec![dst]);
        Ok(link)
    }

    /// Compute the all-pairs shortest-path table by iterative relaxation. Every reachable
    /// ordered pair `(src, dst)` with `src != dst` gets a hop list of minimal length; ties are
    /// broken by the traversal order (elements and links in creation order, destinations in
    /// ascending handle order). Afterwards the table is frozen.
    pub fn compute_shortest_paths(&mut self) {
        let nodes: Vec<ElementId> = self.graph.node_indices().collect();
        for round in 0..nodes.len() {
            let mut updated = 0_usize;
            for &src in &nodes {
                let neighbors: Vec<ElementId> = self
                    .out_links
                    .get(&src)
                    .map(|links| links.iter().map(|l| self.graph[*l].dst).collect())
                    .unwrap_or_default();
                for n in neighbors {
                    let mut found: Vec<(ElementId, Vec<ElementId>)> = Vec::new();
                    if let Some(np) = self.paths.get(&n) {
                        let sp = self.paths.get(&src);
                        for (&r, hops) in np.iter() {
                            if r == src {
                                continue;
                            }
                            if sp.map_or(false, |m| m.contains_key(&r)) {
                                continue;
                            }
                            let mut path = Vec::with_capacity(hops.len() + 1);
                            path.push(n);
                            path.extend_from_slice(hops);
                            found.push((r, path));
                        }
                    }
                    if !found.is_empty() {
                        let sp = self.paths.entry(src).or_default();
                        for (r, path) in found {
                            sp.insert(r, path);
                            updated += 1;
                        }
                    }
                }
            }
            trace!("Path relaxation round {}: {} new pairs", round, updated);
            if updated == 0 {
                break;
            }
        }
        self.paths_ready = true;
        debug!(
            "Shortest paths ready: {} reachable pairs",
            self.paths.values().map(|m| m.len()).sum::<usize>()
        );
    }

    /// Returns `true` once the path table has been computed.
    pub fn paths_ready(&self) -> bool {
        self.paths_ready
    }

    /// The hop list from `src` to `dst`, ordered from the first element after `src` to `dst`
    /// inclusive. Unreachable pairs (including `src == dst`) raise an error.
    pub fn path(&self, src: ElementId, dst: ElementId) -> Result<&[ElementId], TopologyError> {
        self.paths
            .get(&src)
            .and_then(|m| m.get(&dst))
            .map(|p| p.as_slice())
            .ok_or(TopologyError::Unreachable(src, dst))
    }

    /// Iterate over all destinations reachable from `src`, with their hop lists, in ascending
    /// destination order.
    pub fn reachable_from(
        &self,
        src: ElementId,
    ) -> impl Iterator<Item = (ElementId, &[ElementId])> {
        self.paths
            .get(&src)
            .into_iter()
            .flat_map(|m| m.iter().map(|(&dst, p)| (dst, p.as_slice())))
    }

    /// The direct link from `src` to `dst`. When parallel links exist, the most recently added
    /// one is returned.
    pub fn find_link(&self, src: ElementId, dst: ElementId) -> Result<LinkId, TopologyError> {
        self.direct_links
            .get(&(src, dst))
            .copied()
            .ok_or(TopologyError::LinkNotFound(src, dst))
    }

    /// Returns a reference to the link with the given id.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.graph.edge_weight(id)
    }

    /// Returns a reference to the element with the given handle.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.graph.node_weight(id)
    }

    /// The model name of the accelerator with the given handle.
    pub fn accelerator_model(&self, id: ElementId) -> Result<&str, TopologyError> {
        match self.graph.node_weight(id) {
            Some(Element::Accelerator { model, .. }) => Ok(model),
            Some(_) => Err(TopologyError::NotAnAccelerator(id)),
            None => Err(TopologyError::ElementNotFound(id)),
        }
    }

    /// The number of elements in the fabric.
    pub fn num_elements(&self) -> usize {
        self.graph.node_count()
    }

    /// The number of links in the fabric.
    pub fn num_links(&self) -> usize {
        self.graph.edge_count()
    }

    /// The ordered list of accelerator handles (index = rank).
    pub fn accelerators(&self) -> &[ElementId] {
        &self.accelerators
    }

    /// The ordered list of host handles.
    pub fn hosts(&self) -> &[ElementId] {
        &self.hosts
    }

    /// The ordered list of switch handles.
    pub fn switches(&self) -> &[ElementId] {
        &self.switches
    }

    /// Render the fabric configuration (elements and links) as a JSON string, for debugging.
    pub fn config_json(&self) -> Result<String, SimError> {
        #[derive(Serialize)]
        struct AcceleratorDump<'a> {
            id: usize,
            model: &'a str,
            rank: usize,
        }
        #[derive(Serialize)]
        struct LinkDump {
            id: usize,
            src: usize,
            dst: usize,
            bandwidth: f64,
            latency: f64,
        }
        #[derive(Serialize)]
        struct ConfigDump<'a> {
            switches: Vec<usize>,
            hosts: Vec<usize>,
            accelerators: Vec<AcceleratorDump<'a>>,
            links: Vec<LinkDump>,
        }

        let accelerators = self
            .accelerators
            .iter()
            .filter_map(|&id| match self.graph.node_weight(id) {
                Some(Element::Accelerator { model, rank }) => Some(AcceleratorDump {
                    id: id.index(),
                    model,
                    rank: *rank,
                }),
                _ => None,
            })
            .collect();
        let links = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                self.graph.edge_weight(e).map(|l| LinkDump {
                    id: e.index(),
                    src: l.src.index(),
                    dst: l.dst.index(),
                    bandwidth: l.bandwidth,
                    latency: l.latency,
                })
            })
            .collect();
        let dump = ConfigDump {
            switches: self.switches.iter().map(|id| id.index()).collect(),
            hosts: self.hosts.iter().map(|id| id.index()).collect(),
            accelerators,
            links,
        };
        Ok(serde_json::to_string(&dump)?)
    }

    /// Render the all-pairs path table as human-readable text, one block per source element.
    pub fn format_paths(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for src in self.graph.node_indices() {
            let kind = self.graph[src].kind();
            let _ = writeln!(out, "From {:3} ({}) ===> to", src.index(), kind);
            for (dst, hops) in self.reachable_from(src) {
                let kind = self
                    .graph
                    .node_weight(dst)
                    .map(Element::kind)
                    .unwrap_or("?");
                let _ = writeln!(
                    out,
                    "             {:3} ({}) :  [{}]",
                    dst.index(),
                    kind,
                    hops.iter().map(|h| h.index().to_string()).join(", ")
                );
            }
        }
        out
    }
}
