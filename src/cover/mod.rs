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

//! An incrementally maintained 2-approximate vertex cover.
//!
//! The cover is derived from a greedily maintained maximal matching: both
//! endpoints of every matched edge are in the cover, which bounds the cover
//! at twice the optimum. The scheme follows the "simple implementation" of
//! fully dynamic vertex cover maintenance by Ivković and Lloyd.
//!
//! Updates report which vertices entered or left the cover; that affected
//! set is the authoritative list of vertices whose per-hop counters the
//! neighbourhood engine must regenerate.

use std::collections::HashMap;

use crate::common::grown_capacity;
use crate::common::LongBitSet;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::graph::Edge;
use crate::graph::GraphProvider;

/// How a vertex cover update affected a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AffectedState {
    /// The vertex entered the cover.
    Added,
    /// The vertex left the cover.
    Removed,
}

/// Sentinel for an unmatched vertex.
const UNMATCHED: i64 = -1;

/// A 2-approximate vertex cover over a directed graph, maintained online.
///
/// # Examples
///
/// ```
/// # use danf::cover::DynamicVertexCover;
/// # use danf::graph::{Edge, MutableGraph};
/// let mut graph = MutableGraph::new();
/// graph.add_edge(Edge::new(0, 1));
///
/// let mut cover = DynamicVertexCover::new(&graph);
/// assert!(cover.is_in_vertex_cover(0) && cover.is_in_vertex_cover(1));
///
/// graph.add_edge(Edge::new(1, 2));
/// let affected = cover.insert_edge(Edge::new(1, 2));
/// assert!(affected.is_empty()); // (1, 2) is already covered by 1
/// ```
#[derive(Debug)]
pub struct DynamicVertexCover {
    /// Maximal matching as a dense from-vertex -> to-vertex map.
    matching: Vec<i64>,
    cover: LongBitSet,
}

impl DynamicVertexCover {
    /// Builds a cover for the current arcs of `graph`.
    pub fn new<G: GraphProvider>(graph: &G) -> Self {
        let mut cover = Self {
            matching: vec![UNMATCHED; graph.num_nodes().max(1) as usize],
            cover: LongBitSet::with_len(1),
        };
        graph.iterate_all_edges(&mut |edge: Edge| {
            cover.insert_edge(edge);
        });
        cover
    }

    /// Records an inserted edge.
    ///
    /// If either endpoint is already covered nothing changes and the
    /// affected map is empty; otherwise the edge joins the matching and
    /// both endpoints enter the cover as [`AffectedState::Added`].
    pub fn insert_edge(&mut self, edge: Edge) -> HashMap<u64, AffectedState> {
        let mut affected = HashMap::new();
        if self.is_in_vertex_cover(edge.from) || self.is_in_vertex_cover(edge.to) {
            return affected;
        }

        self.add_edge_to_matching(edge);
        self.add_edge_to_cover(edge);

        update_affected(edge.from, AffectedState::Added, &mut affected);
        update_affected(edge.to, AffectedState::Added, &mut affected);
        affected
    }

    /// Records a deleted edge.
    ///
    /// The edge must already have been removed from `graph` and
    /// `transpose`. If the edge was not in the matching nothing changes.
    /// Otherwise both endpoints leave the matching and the cover, each
    /// endpoint rescans its outgoing edges for the first uncovered
    /// successor, and the incoming edges of each still-uncovered endpoint
    /// are scanned through the transpose for a replacement matching edge.
    /// A vertex that leaves and re-enters the cover in the same call
    /// cancels out of the affected map.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::MissingTranspose`] when no transpose is
    /// supplied; the cover is left untouched.
    pub fn delete_edge<G: GraphProvider>(
        &mut self,
        edge: Edge,
        graph: &G,
        transpose: Option<&G>,
    ) -> Result<HashMap<u64, AffectedState>, Error> {
        let transpose = transpose.ok_or_else(|| {
            Error::new(
                ErrorKind::MissingTranspose,
                "edge deletion requires the transpose graph",
            )
        })?;

        let mut affected = HashMap::new();
        if !self.is_in_maximal_matching(edge) {
            return Ok(affected);
        }

        self.matching[edge.from as usize] = UNMATCHED;
        self.cover.set(edge.from, false);
        self.cover.set(edge.to, false);

        let removed = [edge.from, edge.to];
        let mut added = Vec::new();

        self.check_outgoing_edges(graph, edge.from, &mut added);
        if edge.from != edge.to {
            self.check_outgoing_edges(graph, edge.to, &mut added);
        }
        self.check_incoming_edges(transpose, edge.from, &mut added);
        if edge.from != edge.to {
            self.check_incoming_edges(transpose, edge.to, &mut added);
        }

        for &node in &removed {
            update_affected(node, AffectedState::Removed, &mut affected);
        }
        for &node in &added {
            update_affected(node, AffectedState::Added, &mut affected);
        }
        Ok(affected)
    }

    /// A node freshly deleted from the cover may leave its successors
    /// uncovered; the first uncovered successor rejoins the matching with
    /// it.
    fn check_outgoing_edges<G: GraphProvider>(
        &mut self,
        graph: &G,
        node: u64,
        added: &mut Vec<u64>,
    ) {
        for successor in graph.successors(node) {
            if !self.is_in_vertex_cover(successor) {
                let edge = Edge::new(node, successor);
                self.add_edge_to_matching(edge);
                self.add_edge_to_cover(edge);
                added.push(edge.from);
                added.push(edge.to);
                break;
            }
        }
    }

    /// The deleted endpoints may have covered incoming edges; the first
    /// uncovered in-neighbour of a still-uncovered endpoint rejoins the
    /// matching with it.
    fn check_incoming_edges<G: GraphProvider>(
        &mut self,
        transpose: &G,
        node: u64,
        added: &mut Vec<u64>,
    ) {
        if transpose.random_access() {
            for neighbour in transpose.successors(node) {
                if self.is_in_vertex_cover(node) {
                    break;
                }
                if self.is_in_vertex_cover(neighbour) {
                    continue;
                }
                let edge = Edge::new(neighbour, node);
                self.add_edge_to_matching(edge);
                self.add_edge_to_cover(edge);
                added.push(neighbour);
                added.push(node);
                break;
            }
        } else {
            // No per-node successor lookup: fall back to one scan over all
            // arcs of the transpose.
            let mut done = false;
            transpose.iterate_all_edges(&mut |arc| {
                if done || arc.from != node {
                    return;
                }
                if self.is_in_vertex_cover(node) || self.is_in_vertex_cover(arc.to) {
                    done = self.is_in_vertex_cover(node);
                    return;
                }
                let edge = Edge::new(arc.to, node);
                self.add_edge_to_matching(edge);
                self.add_edge_to_cover(edge);
                added.push(arc.to);
                added.push(node);
                done = true;
            });
        }
    }

    /// Whether a vertex is currently in the cover. Ids past the end answer
    /// `false` without growing anything.
    pub fn is_in_vertex_cover(&self, node: u64) -> bool {
        self.cover.get(node)
    }

    pub fn is_in_maximal_matching(&self, edge: Edge) -> bool {
        let index = edge.from as usize;
        if index >= self.matching.len() {
            return false;
        }
        self.matching[index] == edge.to as i64
    }

    /// The number of vertices in the cover.
    pub fn cover_size(&self) -> u64 {
        self.cover.count()
    }

    /// The number of edges in the matching. Runs in O(n).
    pub fn matching_size(&self) -> u64 {
        self.matching
            .iter()
            .filter(|&&entry| entry != UNMATCHED)
            .count() as u64
    }

    /// The vertices of the cover in ascending id order.
    pub fn cover_vertices(&self) -> impl Iterator<Item = u64> + '_ {
        let mut next = Some(0u64);
        std::iter::from_fn(move || {
            let found = self.cover.next_one(next?)?;
            next = found.checked_add(1);
            Some(found)
        })
    }

    /// The memory held by the matching and the cover bitset, in bytes.
    pub fn used_bytes(&self) -> u64 {
        self.matching.len() as u64 * 8 + (self.cover.len() + 63) / 64 * 8
    }

    fn add_edge_to_matching(&mut self, edge: Edge) {
        let index = edge.from as usize;
        if index >= self.matching.len() {
            let new_len = grown_capacity(self.matching.len() as u64, edge.from + 1) as usize;
            self.matching.resize(new_len, UNMATCHED);
        }
        self.matching[index] = edge.to as i64;
    }

    fn add_edge_to_cover(&mut self, edge: Edge) {
        self.cover.set(edge.from, true);
        self.cover.set(edge.to, true);
    }
}

/// Applies the cancellation rule: a vertex marked both added and removed is
/// not affected at all.
fn update_affected(node: u64, state: AffectedState, affected: &mut HashMap<u64, AffectedState>) {
    match affected.get(&node) {
        Some(&existing) if existing == state => {}
        Some(_) => {
            affected.remove(&node);
        }
        None => {
            affected.insert(node, state);
        }
    }
}
