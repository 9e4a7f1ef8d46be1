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

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;
use std::time::Instant;

use crate::anf::Danf;
use crate::error::Error;
use crate::graph::Edge;

/// A `(ratio, vertex)` pair ordered by descending ratio, then ascending
/// vertex id.
#[derive(Clone, Copy, Debug)]
pub struct RatioEntry {
    /// `count_after / count_before` at the engine's maximum hop.
    pub ratio: f64,
    pub node: u64,
}

impl PartialEq for RatioEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RatioEntry {}

impl PartialOrd for RatioEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RatioEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ratio
            .total_cmp(&self.ratio)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Detects vertices whose neighbourhood size grows rapidly between update
/// batches.
///
/// Around each edge batch the watcher snapshots the maximum-hop counts of
/// the touched vertices, computes the growth ratio afterwards (a before
/// count of zero is coerced to one), and keeps the qualifying `(ratio,
/// vertex)` pairs in a descending set capped at a configured capacity.
/// When the set is non-empty and the update interval has elapsed since the
/// last firing, the registered callback receives the set inline and the
/// set is cleared.
///
/// Use it through [`Danf::add_edges_watched`], which wraps the batch in the
/// before/after bookkeeping.
pub struct TopNodeWatcher {
    update_interval: Duration,
    percentage_change: f64,
    min_node_count: f64,
    capacity: usize,
    before: HashMap<u64, f64>,
    sorted: BTreeSet<RatioEntry>,
    last_fired: Instant,
    callback: Option<Box<dyn FnMut(&BTreeSet<RatioEntry>)>>,
}

impl TopNodeWatcher {
    /// Creates a watcher.
    ///
    /// A vertex qualifies when its ratio is at least `percentage_change`
    /// and its new count is at least `min_node_count`; at most `capacity`
    /// entries with the largest ratios are retained.
    pub fn new(
        update_interval: Duration,
        percentage_change: f64,
        min_node_count: f64,
        capacity: usize,
    ) -> Self {
        Self {
            update_interval,
            percentage_change,
            min_node_count,
            capacity,
            before: HashMap::new(),
            sorted: BTreeSet::new(),
            // The first firing becomes possible one interval after
            // construction.
            last_fired: Instant::now(),
            callback: None,
        }
    }

    /// Registers the rapid-change callback. It runs inline on the updating
    /// thread, before the batch call returns.
    pub fn set_rapid_change_callback(
        &mut self,
        callback: impl FnMut(&BTreeSet<RatioEntry>) + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    /// The current `(ratio, vertex)` set, largest ratios first.
    pub fn nodes_sorted_by_ratio(&self) -> &BTreeSet<RatioEntry> {
        &self.sorted
    }

    /// Snapshots the maximum-hop counts of the vertices touched by
    /// `edges`, before the batch is applied.
    pub fn snapshot_before(&mut self, engine: &Danf, edges: &[Edge]) -> Result<(), Error> {
        self.before.clear();
        for vertex in touched_vertices(edges) {
            let count = engine.count(vertex, engine.max_hop())?;
            self.before.insert(vertex, count);
        }
        Ok(())
    }

    /// Computes the growth ratios of the touched vertices after the batch
    /// was applied, and fires the callback when due.
    pub fn record_after(&mut self, engine: &Danf, edges: &[Edge]) -> Result<(), Error> {
        for vertex in touched_vertices(edges) {
            let after = engine.count(vertex, engine.max_hop())?;
            let mut before = self.before.get(&vertex).copied().unwrap_or(0.0);
            if before == 0.0 {
                before = 1.0;
            }
            let ratio = after / before;
            if ratio >= self.percentage_change && after >= self.min_node_count {
                self.sorted.insert(RatioEntry {
                    ratio,
                    node: vertex,
                });
                while self.sorted.len() > self.capacity {
                    self.sorted.pop_last();
                }
            }
        }
        self.maybe_fire();
        Ok(())
    }

    fn maybe_fire(&mut self) {
        if self.sorted.is_empty() || self.last_fired.elapsed() < self.update_interval {
            return;
        }
        if let Some(callback) = &mut self.callback {
            callback(&self.sorted);
        }
        self.sorted.clear();
        self.last_fired = Instant::now();
    }
}

fn touched_vertices(edges: &[Edge]) -> impl Iterator<Item = u64> + '_ {
    let mut seen = HashSet::new();
    edges
        .iter()
        .flat_map(|edge| [edge.from, edge.to])
        .filter(move |&vertex| seen.insert(vertex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_entry_orders_descending() {
        let mut set = BTreeSet::new();
        set.insert(RatioEntry { ratio: 1.5, node: 3 });
        set.insert(RatioEntry { ratio: 4.0, node: 1 });
        set.insert(RatioEntry { ratio: 2.0, node: 2 });

        let ratios: Vec<f64> = set.iter().map(|entry| entry.ratio).collect();
        assert_eq!(ratios, vec![4.0, 2.0, 1.5]);
    }

    #[test]
    fn test_ratio_entry_ties_break_on_node() {
        let mut set = BTreeSet::new();
        set.insert(RatioEntry { ratio: 2.0, node: 9 });
        set.insert(RatioEntry { ratio: 2.0, node: 4 });

        let nodes: Vec<u64> = set.iter().map(|entry| entry.node).collect();
        assert_eq!(nodes, vec![4, 9]);
    }

    #[test]
    fn test_touched_vertices_dedupes() {
        let edges = [Edge::new(0, 1), Edge::new(1, 2), Edge::new(0, 2)];
        let touched: Vec<u64> = touched_vertices(&edges).collect();
        assert_eq!(touched, vec![0, 1, 2]);
    }
}
