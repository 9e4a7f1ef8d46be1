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

//! Dynamic approximate neighbourhood functions over streaming graphs.
//!
//! This crate maintains, for every vertex `v` of a directed graph that is
//! mutated online, an estimate of `|B(v, h)|` — the number of distinct
//! vertices reachable from `v` within `h` hops — for every hop distance
//! `1 <= h <= H`.
//!
//! The building blocks are exposed as independent modules:
//!
//! - [`hll`]: a bit-packed array of HyperLogLog counters with in-place
//!   register-wise union, dynamic growth, cloning and sub-array extraction.
//! - [`graph`]: a mutable in-memory directed graph and the minimal
//!   [`GraphProvider`] capability the algorithms need.
//! - [`cover`]: an incrementally maintained 2-approximate vertex cover
//!   backed by a maximal matching.
//! - [`bfs`]: a multi-source breadth-first search that advances up to one
//!   machine word of sources in lockstep.
//! - [`anf`]: the neighbourhood engine tying the pieces together, plus a
//!   watcher that detects vertices whose neighbourhood grows rapidly.
//!
//! # Usage
//!
//! ```rust
//! # use danf::anf::Danf;
//! # use danf::graph::{Edge, MutableGraph};
//! let mut graph = MutableGraph::new();
//! graph.add_edge(Edge::new(0, 1));
//! graph.add_edge(Edge::new(1, 2));
//!
//! let mut engine = Danf::new(3, 7, graph, 0).unwrap();
//! assert!(engine.count(0, 2).unwrap() >= 1.0);
//!
//! engine.add_edges(&[Edge::new(2, 3)]).unwrap();
//! assert!(engine.count(2, 1).unwrap() >= 1.0);
//! ```

pub mod anf;
pub mod bfs;
pub(crate) mod codec;
pub(crate) mod common;
pub mod cover;
pub mod error;
pub mod graph;
pub mod hash;
pub mod hll;

pub use crate::anf::Danf;
pub use crate::anf::TopNodeWatcher;
pub use crate::bfs::MsBfs;
pub use crate::cover::DynamicVertexCover;
pub use crate::error::Error;
pub use crate::error::ErrorKind;
pub use crate::graph::Edge;
pub use crate::graph::GraphProvider;
pub use crate::graph::MutableGraph;
pub use crate::hll::CounterArray;
