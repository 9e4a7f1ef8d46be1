// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::Error;
use crate::graph::Edge;
use crate::graph::GraphProvider;

/// An in-memory mutable directed graph.
///
/// Vertex ids are dense: `num_nodes` is one past the largest id ever
/// referenced, and ids are never reassigned. Duplicate arcs are ignored, so
/// [`num_arcs`](Self::num_arcs) counts distinct `(from, to)` pairs.
///
/// Successor sets are kept ordered, which gives iteration a stable order
/// and keeps the transpose deterministic.
///
/// # Examples
///
/// ```
/// # use danf::graph::{Edge, MutableGraph};
/// let mut graph = MutableGraph::new();
/// graph.add_edge(Edge::new(0, 2));
/// graph.add_edge(Edge::new(2, 1));
///
/// assert_eq!(graph.num_nodes(), 3);
/// assert_eq!(graph.num_arcs(), 2);
/// assert_eq!(graph.successors(0).collect::<Vec<_>>(), vec![2]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MutableGraph {
    neighbours: BTreeMap<u64, BTreeSet<u64>>,
    num_nodes: u64,
    num_arcs: u64,
}

impl MutableGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `node` (and every smaller id) part of the graph.
    pub fn add_node(&mut self, node: u64) {
        self.num_nodes = self.num_nodes.max(node + 1);
    }

    pub fn contains_node(&self, node: u64) -> bool {
        node < self.num_nodes
    }

    /// Inserts an edge, implicitly creating its endpoints. Returns whether
    /// the arc was new.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.add_node(edge.from);
        self.add_node(edge.to);

        let added = self.neighbours.entry(edge.from).or_default().insert(edge.to);
        if added {
            self.num_arcs += 1;
        }
        added
    }

    /// Inserts a batch of edges. Returns whether every arc was new.
    pub fn add_edges(&mut self, edges: &[Edge]) -> bool {
        let mut all_inserted = true;
        for &edge in edges {
            all_inserted &= self.add_edge(edge);
        }
        all_inserted
    }

    /// Removes an edge. Returns whether it was present. Endpoints stay part
    /// of the graph.
    pub fn delete_edge(&mut self, edge: Edge) -> bool {
        if let Some(neighbours) = self.neighbours.get_mut(&edge.from) {
            let removed = neighbours.remove(&edge.to);
            if removed {
                self.num_arcs -= 1;
            }
            removed
        } else {
            false
        }
    }

    pub fn num_nodes(&self) -> u64 {
        self.num_nodes
    }

    pub fn num_arcs(&self) -> u64 {
        self.num_arcs
    }

    pub fn outdegree(&self, node: u64) -> u64 {
        self.neighbours
            .get(&node)
            .map_or(0, |neighbours| neighbours.len() as u64)
    }

    /// The successors of a node in ascending order.
    pub fn successors(&self, node: u64) -> impl Iterator<Item = u64> + '_ {
        self.neighbours
            .get(&node)
            .into_iter()
            .flat_map(|neighbours| neighbours.iter().copied())
    }

    /// A cursor over the nodes of the graph in id order, starting at
    /// `from`. Each position exposes the node's outdegree and successors.
    pub fn node_iterator(&self, from: u64) -> NodeCursor<'_> {
        NodeCursor {
            graph: self,
            next: from,
            current: None,
        }
    }

    /// A new graph with every arc reversed.
    pub fn transpose(&self) -> MutableGraph {
        let mut transpose = MutableGraph::new();
        if self.num_nodes > 0 {
            transpose.add_node(self.num_nodes - 1);
        }
        self.iterate_all_edges(&mut |edge: Edge| {
            transpose.add_edge(edge.flipped());
        });
        transpose
    }

    /// All arcs of the graph, in `(from, to)` order.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.num_arcs as usize);
        self.iterate_all_edges(&mut |edge| edges.push(edge));
        edges
    }

    /// Calls `f` once for every arc.
    pub fn iterate_all_edges(&self, mut f: impl FnMut(Edge)) {
        for (&from, neighbours) in &self.neighbours {
            for &to in neighbours {
                f(Edge::new(from, to));
            }
        }
    }
}

impl GraphProvider for MutableGraph {
    fn num_nodes(&self) -> u64 {
        MutableGraph::num_nodes(self)
    }

    fn num_arcs(&self) -> u64 {
        MutableGraph::num_arcs(self)
    }

    fn outdegree(&self, node: u64) -> u64 {
        MutableGraph::outdegree(self, node)
    }

    fn successors(&self, node: u64) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(MutableGraph::successors(self, node))
    }

    fn iterate_all_edges(&self, f: &mut dyn FnMut(Edge)) {
        MutableGraph::iterate_all_edges(self, f)
    }

    fn random_access(&self) -> bool {
        true
    }
}

/// A forward cursor over the nodes of a [`MutableGraph`].
///
/// [`next_node`](Self::next_node) advances to the next id;
/// [`successors`](Self::successors) and [`outdegree`](Self::outdegree)
/// describe the current position and fail with
/// [`ErrorKind::InvalidState`](crate::ErrorKind) before the first advance.
pub struct NodeCursor<'a> {
    graph: &'a MutableGraph,
    next: u64,
    current: Option<u64>,
}

impl<'a> NodeCursor<'a> {
    /// Advances to the next node and returns its id, or `None` past the
    /// last node.
    pub fn next_node(&mut self) -> Option<u64> {
        if self.next >= self.graph.num_nodes() {
            return None;
        }
        let node = self.next;
        self.next += 1;
        self.current = Some(node);
        Some(node)
    }

    /// The outdegree of the current node.
    pub fn outdegree(&self) -> Result<u64, Error> {
        let node = self.position()?;
        Ok(self.graph.outdegree(node))
    }

    /// The successors of the current node.
    pub fn successors(&self) -> Result<impl Iterator<Item = u64> + 'a, Error> {
        let node = self.position()?;
        Ok(self.graph.successors(node))
    }

    fn position(&self) -> Result<u64, Error> {
        self.current
            .ok_or_else(|| Error::invalid_state("node cursor was never advanced"))
    }
}
