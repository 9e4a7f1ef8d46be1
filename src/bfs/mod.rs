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

//! Multi-source breadth-first search.
//!
//! Up to one machine word of BFS sources advance in lockstep: every source
//! is assigned a bit position, and for each vertex `v` the search keeps a
//! mask whose bit `b` is set while source `b` sits on `v`'s frontier.
//! Vertices reached by several sources at the same depth are expanded once,
//! which amortises successor-list traversal across the whole batch.
//!
//! Within a depth, visits are delivered in ascending vertex-id order, and a
//! depth is fully drained before the next one begins. The visitor receives
//! the frontier mask mutably and may clear bits to cancel those sources'
//! further expansion from that vertex.

use crate::error::Error;
use crate::graph::GraphProvider;

/// A machine word used as a per-vertex visit mask. Implemented for `u64`
/// (64 lockstep sources) and `u128` (128 lockstep sources).
pub trait VisitMask: Copy + PartialEq {
    const BITS: u32;
    const ZERO: Self;

    fn bit(index: u32) -> Self;
    fn or(self, other: Self) -> Self;
    fn and(self, other: Self) -> Self;
    fn not(self) -> Self;
    fn is_zero(self) -> bool;
    /// The indices of the set bits, in ascending order.
    fn ones(self) -> impl Iterator<Item = u32>;
}

macro_rules! impl_visit_mask {
    ($ty:ty) => {
        impl VisitMask for $ty {
            const BITS: u32 = <$ty>::BITS;
            const ZERO: Self = 0;

            fn bit(index: u32) -> Self {
                1 << index
            }

            fn or(self, other: Self) -> Self {
                self | other
            }

            fn and(self, other: Self) -> Self {
                self & other
            }

            fn not(self) -> Self {
                !self
            }

            fn is_zero(self) -> bool {
                self == 0
            }

            fn ones(self) -> impl Iterator<Item = u32> {
                let mut rest = self;
                std::iter::from_fn(move || {
                    if rest == 0 {
                        return None;
                    }
                    let index = rest.trailing_zeros();
                    rest &= rest - 1;
                    Some(index)
                })
            }
        }
    };
}

impl_visit_mask!(u64);
impl_visit_mask!(u128);

/// Receives one callback per (depth, vertex) the search reaches.
///
/// Clearing bits of `mask` cancels those sources at this vertex: they are
/// neither recorded as having seen it nor expanded from it.
pub trait BfsVisitor<W: VisitMask> {
    fn visit(&mut self, depth: u64, node: u64, mask: &mut W);
}

/// A visitor that does nothing; useful when only the traversal itself is
/// wanted.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopVisitor;

impl<W: VisitMask> BfsVisitor<W> for NoopVisitor {
    fn visit(&mut self, _depth: u64, _node: u64, _mask: &mut W) {}
}

impl<W: VisitMask, F: FnMut(u64, u64, &mut W)> BfsVisitor<W> for F {
    fn visit(&mut self, depth: u64, node: u64, mask: &mut W) {
        self(depth, node, mask)
    }
}

/// A lockstep breadth-first search from up to `W::BITS` sources.
///
/// # Examples
///
/// ```
/// # use danf::bfs::MsBfs;
/// # use danf::graph::{Edge, MutableGraph};
/// let mut graph = MutableGraph::new();
/// graph.add_edges(&[Edge::new(0, 1), Edge::new(1, 2)]);
///
/// let bfs: MsBfs = MsBfs::new(&[0]).unwrap();
/// let mut visited = Vec::new();
/// bfs.run(&graph, u64::MAX, &mut |depth: u64, node: u64, _mask: &mut u64| {
///     visited.push((depth, node));
/// })
/// .unwrap();
/// assert_eq!(visited, vec![(0, 0), (1, 1), (2, 2)]);
/// ```
#[derive(Debug)]
pub struct MsBfs<W = u64> {
    sources: Vec<u64>,
    _mask: std::marker::PhantomData<W>,
}

impl<W: VisitMask> MsBfs<W> {
    /// Creates a search over the given sources, each assigned the bit
    /// position matching its index.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind) when
    /// there are more sources than mask bits.
    pub fn new(sources: &[u64]) -> Result<Self, Error> {
        if sources.len() as u64 > W::BITS as u64 {
            return Err(Error::invalid_argument("too many sources for the mask word")
                .with_context("sources", sources.len())
                .with_context("mask_bits", W::BITS));
        }
        Ok(Self {
            sources: sources.to_vec(),
            _mask: std::marker::PhantomData,
        })
    }

    /// The sources of this search.
    pub fn sources(&self) -> &[u64] {
        &self.sources
    }

    /// Runs the search over `graph` up to `max_depth`, delivering every
    /// reached (depth, vertex) pair to `visitor`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind) when a
    /// source id is outside the graph.
    pub fn run<G, V>(&self, graph: &G, max_depth: u64, visitor: &mut V) -> Result<(), Error>
    where
        G: GraphProvider,
        V: BfsVisitor<W>,
    {
        let num_nodes = graph.num_nodes();
        let mut frontier = vec![W::ZERO; num_nodes as usize];
        let mut next_frontier = vec![W::ZERO; num_nodes as usize];
        let mut seen = vec![W::ZERO; num_nodes as usize];

        for (index, &source) in self.sources.iter().enumerate() {
            if source >= num_nodes {
                return Err(Error::invalid_argument("bfs source is outside the graph")
                    .with_context("source", source)
                    .with_context("num_nodes", num_nodes));
            }
            frontier[source as usize] = frontier[source as usize].or(W::bit(index as u32));
        }

        let mut depth = 0u64;
        loop {
            // Visit phase: deliver the current depth in ascending id order
            // and record what each source has now seen.
            let mut live = false;
            for node in 0..frontier.len() {
                if frontier[node].is_zero() {
                    continue;
                }
                visitor.visit(depth, node as u64, &mut frontier[node]);
                if !frontier[node].is_zero() {
                    seen[node] = seen[node].or(frontier[node]);
                    live = true;
                }
            }
            if !live || depth == max_depth {
                break;
            }

            // Expansion phase: propagate each surviving mask to successors
            // that its sources have not reached yet.
            let mut expanded = false;
            for node in 0..frontier.len() {
                let mask = frontier[node];
                if mask.is_zero() {
                    continue;
                }
                for successor in graph.successors(node as u64) {
                    let fresh = mask.and(seen[successor as usize].not());
                    if !fresh.is_zero() {
                        next_frontier[successor as usize] =
                            next_frontier[successor as usize].or(fresh);
                        expanded = true;
                    }
                }
            }
            if !expanded {
                break;
            }

            std::mem::swap(&mut frontier, &mut next_frontier);
            for mask in next_frontier.iter_mut() {
                *mask = W::ZERO;
            }
            depth += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::graph::MutableGraph;
    use crate::ErrorKind;

    fn line(n: u64) -> MutableGraph {
        let mut graph = MutableGraph::new();
        for v in 0..n - 1 {
            graph.add_edge(Edge::new(v, v + 1));
        }
        graph
    }

    #[test]
    fn test_too_many_sources() {
        let sources: Vec<u64> = (0..65).collect();
        let err = MsBfs::<u64>::new(&sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(MsBfs::<u128>::new(&sources).is_ok());
    }

    #[test]
    fn test_source_outside_graph() {
        let graph = line(3);
        let bfs: MsBfs = MsBfs::new(&[7]).unwrap();
        let err = bfs.run(&graph, 1, &mut NoopVisitor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_depth_limit() {
        let graph = line(10);
        let bfs: MsBfs = MsBfs::new(&[0]).unwrap();
        let mut deepest = 0;
        bfs.run(&graph, 3, &mut |depth: u64, _node: u64, _mask: &mut u64| {
            deepest = deepest.max(depth);
        })
        .unwrap();
        assert_eq!(deepest, 3);
    }

    #[test]
    fn test_two_sources_share_bits() {
        // 0 -> 2 <- 1: both sources reach 2 at depth 1 in a single visit.
        let mut graph = MutableGraph::new();
        graph.add_edges(&[Edge::new(0, 2), Edge::new(1, 2)]);

        let bfs: MsBfs = MsBfs::new(&[0, 1]).unwrap();
        let mut at_two = Vec::new();
        bfs.run(&graph, u64::MAX, &mut |depth: u64, node: u64, mask: &mut u64| {
            if node == 2 {
                at_two.push((depth, *mask));
            }
        })
        .unwrap();
        assert_eq!(at_two, vec![(1, 0b11)]);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = line(4);
        graph.add_edge(Edge::new(3, 0));
        let bfs: MsBfs = MsBfs::new(&[0]).unwrap();
        let mut visits = 0;
        bfs.run(&graph, u64::MAX, &mut |_: u64, _: u64, _: &mut u64| {
            visits += 1;
        })
        .unwrap();
        assert_eq!(visits, 4);
    }

    #[test]
    fn test_cancellation_stops_expansion() {
        let graph = line(5);
        let bfs: MsBfs = MsBfs::new(&[0]).unwrap();
        let mut visited = Vec::new();
        bfs.run(&graph, u64::MAX, &mut |_depth: u64, node: u64, mask: &mut u64| {
            visited.push(node);
            if node == 2 {
                *mask = 0;
            }
        })
        .unwrap();
        assert_eq!(visited, vec![0, 1, 2]);
    }

    #[test]
    fn test_mask_ones() {
        let mask: u64 = 0b1010_0001;
        assert_eq!(mask.ones().collect::<Vec<_>>(), vec![0, 5, 7]);
        assert_eq!(0u64.ones().count(), 0);
    }
}
