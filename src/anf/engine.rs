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

use std::collections::HashSet;

use crate::anf::TopNodeWatcher;
use crate::bfs::MsBfs;
use crate::bfs::VisitMask;
use crate::cover::DynamicVertexCover;
use crate::error::Error;
use crate::graph::Edge;
use crate::graph::MutableGraph;
use crate::hll::CounterArray;
use crate::hll::CounterShape;

/// Number of affected vertices whose recomputation shares one BFS pass.
const RECOMPUTE_BATCH: usize = u64::BITS as usize;

/// Sentinel for a vertex without a counter slot.
const NO_SLOT: i64 = -1;

/// The dynamic approximate-neighbourhood engine.
///
/// For a maximum hop distance `H`, the engine answers estimates of
/// `|B(v, h)|` for every vertex `v` and every `0 <= h <= H` while edges are
/// inserted (and occasionally deleted) online.
///
/// The engine owns the graph, its transpose, a dynamic 2-approximate
/// vertex cover and one packed counter array per hop. Only vertices in the
/// cover are permanently backed by counters: since every edge has a covered
/// endpoint, the `h`-hop counter of an uncovered vertex can always be
/// rebuilt on demand from the `(h-1)`-hop counters of its successors.
///
/// On an edge batch, the cover reports which vertices entered or left it;
/// those vertices — plus covered source endpoints of the new arcs — have
/// their counters regenerated hop by hop, sharing successor traversal
/// through a multi-source BFS over up to 64 vertices per pass.
///
/// # Examples
///
/// ```
/// # use danf::anf::Danf;
/// # use danf::graph::{Edge, MutableGraph};
/// let mut graph = MutableGraph::new();
/// graph.add_edges(&[Edge::new(0, 1), Edge::new(1, 2), Edge::new(2, 0)]);
///
/// let engine = Danf::new(2, 7, graph, 0).unwrap();
/// // Each triangle vertex reaches the other two within two hops.
/// let estimate = engine.count(0, 2).unwrap();
/// assert!((estimate - 3.0).abs() < 0.5);
/// ```
pub struct Danf {
    max_hop: u64,
    shape: CounterShape,
    graph: MutableGraph,
    transpose: MutableGraph,
    cover: DynamicVertexCover,
    /// `arrays[i]` holds the `(i + 1)`-hop counters of the covered
    /// vertices, indexed by slot.
    arrays: Vec<CounterArray>,
    /// Vertex id to counter slot; slots are never reclaimed.
    slots: Vec<i64>,
    slot_count: u64,
}

impl Danf {
    /// Builds an engine over `graph` answering hops up to `max_hop`.
    ///
    /// Counters use `2^log2m` registers each and hash through `seed`; the
    /// register size is derived from the number of nodes of the starting
    /// graph.
    ///
    /// Construction runs the static HyperBall iteration `max_hop` times
    /// over the starting graph, then keeps per-hop state for the covered
    /// vertices only.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind) when
    /// `max_hop` is zero or `log2m` is out of range.
    pub fn new(max_hop: u64, log2m: u32, graph: MutableGraph, seed: u64) -> Result<Self, Error> {
        if max_hop == 0 {
            return Err(Error::invalid_argument("max hop distance must be positive"));
        }

        let num_nodes = graph.num_nodes();
        let shape = CounterShape::new(log2m, num_nodes.max(16), seed)?;
        let transpose = graph.transpose();
        let cover = DynamicVertexCover::new(&graph);

        let mut slots = vec![NO_SLOT; num_nodes as usize];
        let mut slot_count = 0u64;
        for vertex in cover.cover_vertices() {
            slots[vertex as usize] = slot_count as i64;
            slot_count += 1;
        }

        let mut arrays = Vec::with_capacity(max_hop as usize);
        for _ in 0..max_hop {
            arrays.push(CounterArray::with_shape(slot_count, shape.clone())?);
        }

        let mut engine = Self {
            max_hop,
            shape,
            graph,
            transpose,
            cover,
            arrays,
            slots,
            slot_count,
        };
        engine.run_static_iteration()?;
        Ok(engine)
    }

    /// The maximum hop distance this engine answers.
    pub fn max_hop(&self) -> u64 {
        self.max_hop
    }

    /// The seed shared by every counter of the engine.
    pub fn seed(&self) -> u64 {
        self.shape.seed()
    }

    pub fn graph(&self) -> &MutableGraph {
        &self.graph
    }

    pub fn transpose(&self) -> &MutableGraph {
        &self.transpose
    }

    pub fn vertex_cover(&self) -> &DynamicVertexCover {
        &self.cover
    }

    /// The static HyperBall iteration over the starting graph: two
    /// full-width arrays rotate through the hops, and after each hop the
    /// covered vertices' counters are retained.
    fn run_static_iteration(&mut self) -> Result<(), Error> {
        let num_nodes = self.graph.num_nodes();
        if num_nodes == 0 {
            return Ok(());
        }

        let longwords = self.shape.counter_longwords();
        let mut accumulator = vec![0u64; longwords];
        let mut neighbour = vec![0u64; longwords];

        let mut previous = CounterArray::with_shape(num_nodes, self.shape.clone())?;
        for vertex in 0..num_nodes {
            previous.add(vertex, vertex);
        }

        for hop in 1..=self.max_hop {
            let mut current = CounterArray::with_shape(num_nodes, self.shape.clone())?;
            for vertex in 0..num_nodes {
                previous.get_counter(vertex, &mut accumulator);
                for successor in self.graph.successors(vertex) {
                    previous.get_counter(successor, &mut neighbour);
                    self.shape.max_into(&mut accumulator, &neighbour);
                }
                current.set_counter(&accumulator, vertex);
            }

            let target = &mut self.arrays[hop as usize - 1];
            for vertex in self.cover.cover_vertices() {
                current.get_counter(vertex, &mut accumulator);
                target.set_counter(&accumulator, self.slots[vertex as usize] as u64);
            }
            previous = current;
        }
        Ok(())
    }

    /// Estimates `|B(v, h)|`, the number of distinct vertices reachable
    /// from `v` within `h` hops.
    ///
    /// A vertex outside the graph yields the zero estimate; `h = 0` yields
    /// one (the vertex itself). Covered vertices answer from their stored
    /// counters; uncovered vertices rebuild the estimate from their
    /// successors' `(h-1)`-hop counters.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind) when `h`
    /// exceeds the engine's maximum hop.
    pub fn count(&self, vertex: u64, hop: u64) -> Result<f64, Error> {
        if hop > self.max_hop {
            return Err(Error::invalid_argument("hop exceeds the engine maximum")
                .with_context("hop", hop)
                .with_context("max_hop", self.max_hop));
        }
        if vertex >= self.graph.num_nodes() {
            return Ok(0.0);
        }
        if hop == 0 {
            return Ok(1.0);
        }
        if let Some(slot) = slot_of(&self.cover, &self.slots, vertex) {
            return Ok(self.arrays[hop as usize - 1].count(slot));
        }

        let mut buffer = vec![0u64; self.shape.counter_longwords()];
        counter_bits(
            &self.graph,
            &self.cover,
            &self.slots,
            &self.arrays,
            &self.shape,
            vertex,
            hop,
            &mut buffer,
        );
        Ok(self.shape.count_longwords(&buffer))
    }

    /// Inserts a batch of edges and regenerates the counters of every
    /// affected covered vertex, hop by hop.
    ///
    /// New vertices are created implicitly; duplicate arcs are ignored.
    pub fn add_edges(&mut self, edges: &[Edge]) -> Result<(), Error> {
        let mut affected = HashSet::new();
        for &edge in edges {
            self.ensure_node(edge.from);
            self.ensure_node(edge.to);
            if self.graph.add_edge(edge) {
                self.transpose.add_edge(edge.flipped());
                for (&vertex, _) in self.cover.insert_edge(edge).iter() {
                    affected.insert(vertex);
                }
                // The source endpoint's neighbourhood changed; when it is
                // backed by counters they must absorb the new arc.
                if self.cover.is_in_vertex_cover(edge.from) {
                    affected.insert(edge.from);
                }
            }
        }
        self.recompute(affected)
    }

    /// Inserts a batch of edges, reporting before/after counts at the
    /// maximum hop to `watcher`, whose callback runs inline before this
    /// method returns.
    pub fn add_edges_watched(
        &mut self,
        edges: &[Edge],
        watcher: &mut TopNodeWatcher,
    ) -> Result<(), Error> {
        watcher.snapshot_before(self, edges)?;
        self.add_edges(edges)?;
        watcher.record_after(self, edges)
    }

    /// Deletes an edge. The vertex cover reconciles through the transpose,
    /// and every vertex that stayed covered with a changed neighbourhood is
    /// regenerated. Unknown edges are ignored.
    pub fn delete_edge(&mut self, edge: Edge) -> Result<(), Error> {
        if !self.graph.delete_edge(edge) {
            return Ok(());
        }
        self.transpose.delete_edge(edge.flipped());

        let mut affected = HashSet::new();
        let states = self
            .cover
            .delete_edge(edge, &self.graph, Some(&self.transpose))?;
        for (&vertex, _) in states.iter() {
            affected.insert(vertex);
        }
        if self.cover.is_in_vertex_cover(edge.from) {
            affected.insert(edge.from);
        }
        self.recompute(affected)
    }

    fn ensure_node(&mut self, vertex: u64) {
        if !self.graph.contains_node(vertex) {
            self.graph.add_node(vertex);
            self.transpose.add_node(vertex);
        }
        if self.slots.len() < self.graph.num_nodes() as usize {
            self.slots.resize(self.graph.num_nodes() as usize, NO_SLOT);
        }
    }

    /// Regenerates the counters of the affected vertices that are
    /// currently covered, in strictly ascending hop order: every `C_h`
    /// rebuild reads only `C_(h-1)` values that already reflect the
    /// post-update graph.
    fn recompute(&mut self, affected: HashSet<u64>) -> Result<(), Error> {
        let mut members: Vec<u64> = affected
            .into_iter()
            .filter(|&vertex| self.cover.is_in_vertex_cover(vertex))
            .collect();
        members.sort_unstable();
        if members.is_empty() {
            return Ok(());
        }

        // Vertices new to the cover get a slot, grown storage, and the
        // identity seed before any union touches them.
        for &vertex in &members {
            if self.slots[vertex as usize] == NO_SLOT {
                let slot = self.slot_count;
                self.slots[vertex as usize] = slot as i64;
                self.slot_count += 1;
                for array in &mut self.arrays {
                    array.add_counters(1);
                    array.add(slot, vertex);
                }
            }
        }

        let longwords = self.shape.counter_longwords();
        for hop in 1..=self.max_hop {
            let (lower, upper) = self.arrays.split_at_mut(hop as usize - 1);
            let lower: &[CounterArray] = lower;
            let target = &mut upper[0];

            for batch in members.chunks(RECOMPUTE_BATCH) {
                let bfs: MsBfs<u64> = MsBfs::new(batch)?;

                // Each source starts from its own (h-1)-hop counter; the
                // depth-one sweep unions in each successor's (h-1)-hop
                // counter, one successor-list traversal for all sources.
                let mut accumulators: Vec<Vec<u64>> = batch
                    .iter()
                    .map(|&vertex| {
                        let mut buffer = vec![0u64; longwords];
                        counter_bits(
                            &self.graph,
                            &self.cover,
                            &self.slots,
                            lower,
                            &self.shape,
                            vertex,
                            hop - 1,
                            &mut buffer,
                        );
                        buffer
                    })
                    .collect();

                let graph = &self.graph;
                let cover = &self.cover;
                let slots = &self.slots;
                let shape = &self.shape;
                let mut neighbour = vec![0u64; longwords];
                bfs.run(graph, 1, &mut |depth: u64, node: u64, mask: &mut u64| {
                    if depth != 1 {
                        return;
                    }
                    counter_bits(
                        graph,
                        cover,
                        slots,
                        lower,
                        shape,
                        node,
                        hop - 1,
                        &mut neighbour,
                    );
                    for bit in mask.ones() {
                        shape.max_into(&mut accumulators[bit as usize], &neighbour);
                    }
                })?;

                for (index, &vertex) in batch.iter().enumerate() {
                    let slot = self.slots[vertex as usize] as u64;
                    target.set_counter(&accumulators[index], slot);
                }
            }
        }
        Ok(())
    }
}

fn slot_of(cover: &DynamicVertexCover, slots: &[i64], vertex: u64) -> Option<u64> {
    if !cover.is_in_vertex_cover(vertex) {
        return None;
    }
    match slots.get(vertex as usize) {
        Some(&slot) if slot != NO_SLOT => Some(slot as u64),
        _ => None,
    }
}

/// Writes the `hop`-hop counter of `vertex` into `dest`.
///
/// Hop zero is the identity singleton; covered vertices read their stored
/// counter; uncovered vertices rebuild from their successors' `(hop-1)`
/// counters. The recursion bottoms out because every successor of an
/// uncovered vertex is covered.
#[allow(clippy::too_many_arguments)]
fn counter_bits(
    graph: &MutableGraph,
    cover: &DynamicVertexCover,
    slots: &[i64],
    arrays: &[CounterArray],
    shape: &CounterShape,
    vertex: u64,
    hop: u64,
    dest: &mut [u64],
) {
    if hop == 0 {
        shape.identity_into(dest, vertex);
        return;
    }
    if let Some(slot) = slot_of(cover, slots, vertex) {
        arrays[hop as usize - 1].get_counter(slot, dest);
        return;
    }

    shape.identity_into(dest, vertex);
    let mut neighbour = vec![0u64; shape.counter_longwords()];
    for successor in graph.successors(vertex) {
        counter_bits(
            graph,
            cover,
            slots,
            arrays,
            shape,
            successor,
            hop - 1,
            &mut neighbour,
        );
        shape.max_into(dest, &neighbour);
    }
}
