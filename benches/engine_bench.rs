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

use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use danf::anf::Danf;
use danf::graph::Edge;
use danf::graph::MutableGraph;
use danf::hll::CounterArray;

fn pseudo_random_edges(nodes: u64, count: usize, mut state: u64) -> Vec<Edge> {
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        state >> 33
    };
    (0..count)
        .map(|_| Edge::new(next() % nodes, next() % nodes))
        .collect()
}

fn bench_counter_union(c: &mut Criterion) {
    let mut left = CounterArray::new(1024, 1 << 20, 7, 0).unwrap();
    let mut right = CounterArray::new(1024, 1 << 20, 7, 0).unwrap();
    for k in 0..1024u64 {
        for v in 0..32u64 {
            left.add(k, k * 31 + v);
            right.add(k, k * 37 + v);
        }
    }

    c.bench_function("union_all_1024_counters", |b| {
        b.iter(|| {
            left.union_all(black_box(&right)).unwrap();
        })
    });
}

fn bench_counter_add(c: &mut Criterion) {
    let mut counters = CounterArray::new(1, 1 << 20, 7, 0).unwrap();
    let mut value = 0u64;
    c.bench_function("counter_add", |b| {
        b.iter(|| {
            value = value.wrapping_add(0x9e3779b97f4a7c15);
            counters.add(0, black_box(value));
        })
    });
}

fn bench_add_edges(c: &mut Criterion) {
    let base = pseudo_random_edges(2000, 4000, 1);
    let updates = pseudo_random_edges(2000, 64, 2);

    c.bench_function("add_edges_batch_of_64", |b| {
        b.iter_with_setup(
            || {
                let mut graph = MutableGraph::new();
                graph.add_edges(&base);
                Danf::new(3, 7, graph, 0).unwrap()
            },
            |mut engine| {
                engine.add_edges(black_box(&updates)).unwrap();
                engine
            },
        )
    });
}

criterion_group!(
    benches,
    bench_counter_union,
    bench_counter_add,
    bench_add_edges
);
criterion_main!(benches);
