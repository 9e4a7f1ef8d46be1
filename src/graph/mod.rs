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

//! Directed graphs: the minimal provider capability, a mutable in-memory
//! implementation, and an arc-list ASCII loader.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use crate::error::Error;
use crate::error::ErrorKind;

mod mutable;

pub use mutable::MutableGraph;
pub use mutable::NodeCursor;

/// A directed edge between two vertex ids. Self-loops are allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: u64,
    pub to: u64,
}

impl Edge {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// The same edge with its direction reversed.
    pub fn flipped(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

/// The minimal read-only capability the algorithms in this crate need from
/// a graph.
///
/// Vertex ids are dense in `[0, num_nodes)`. Successor iteration must yield
/// every out-neighbour of a node exactly once, in a consistent order.
/// Providers without random access answer `false` from
/// [`random_access`](Self::random_access), which makes consumers fall back
/// to full scans instead of per-node successor lookups.
pub trait GraphProvider {
    /// The number of nodes.
    fn num_nodes(&self) -> u64;

    /// The number of distinct arcs.
    fn num_arcs(&self) -> u64;

    /// The out-degree of a node; zero for ids past the end.
    fn outdegree(&self, node: u64) -> u64;

    /// The successors of a node.
    fn successors(&self, node: u64) -> Box<dyn Iterator<Item = u64> + '_>;

    /// Calls `f` once for every arc of the graph.
    fn iterate_all_edges(&self, f: &mut dyn FnMut(Edge));

    /// Whether per-node successor lookup is cheap.
    fn random_access(&self) -> bool;
}

/// Reads a graph in arc-list ASCII format: one `u v` pair per line,
/// whitespace-tolerant; empty lines and `#` comment lines are skipped.
///
/// # Errors
///
/// Fails with [`ErrorKind::Io`] if the file cannot be read and with
/// [`ErrorKind::InvalidArgument`] on a malformed line.
pub fn load_arc_list(path: &Path) -> Result<MutableGraph, Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io, "cannot open arc list")
            .with_context("path", path.display())
            .set_source(err)
    })?;

    let mut graph = MutableGraph::new();
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io, "cannot read arc list")
                .with_context("path", path.display())
                .set_source(err)
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let edge = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(from), Some(to), None) => {
                let from = from.parse::<u64>();
                let to = to.parse::<u64>();
                match (from, to) {
                    (Ok(from), Ok(to)) => Edge::new(from, to),
                    _ => {
                        return Err(Error::invalid_argument("malformed arc list line")
                            .with_context("path", path.display())
                            .with_context("line", line_number + 1))
                    }
                }
            }
            _ => {
                return Err(Error::invalid_argument("malformed arc list line")
                    .with_context("path", path.display())
                    .with_context("line", line_number + 1))
            }
        };
        graph.add_edge(edge);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_edge_flipped() {
        assert_eq!(Edge::new(1, 2).flipped(), Edge::new(2, 1));
    }

    #[test]
    fn test_load_arc_list() {
        let dir = std::env::temp_dir();
        let path = dir.join("danf_arclist_test.txt");
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "# a comment").unwrap();
            writeln!(file, "0 1").unwrap();
            writeln!(file, "  1\t2  ").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "2 0").unwrap();
        }

        let graph = load_arc_list(&path).unwrap();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_arcs(), 3);
        assert_eq!(graph.successors(1).collect::<Vec<_>>(), vec![2]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_arc_list_rejects_garbage() {
        let dir = std::env::temp_dir();
        let path = dir.join("danf_arclist_bad_test.txt");
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "0 one").unwrap();
        }

        let err = load_arc_list(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_arc_list_missing_file() {
        let err = load_arc_list(Path::new("/nonexistent/danf.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
