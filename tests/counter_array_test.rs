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

use byteorder::ByteOrder;
use byteorder::LE;
use googletest::assert_that;
use googletest::prelude::near;

use danf::hll;
use danf::hll::CounterArray;

const LOG2M: u32 = 7;
const N: u64 = 30;
const SEED: u64 = 0;

fn array_of(size: u64) -> CounterArray {
    CounterArray::new(size, N, LOG2M, SEED).unwrap()
}

#[test]
fn test_estimates_track_set_sizes() {
    let mut counters = array_of(4);
    for v in 0..10u64 {
        counters.add(0, v);
    }
    for v in 0..100u64 {
        counters.add(1, v);
    }
    for v in 0..1000u64 {
        counters.add(2, v);
    }

    assert_that!(counters.count(0), near(10.0, 2.0));
    assert_that!(counters.count(1), near(100.0, 20.0));
    assert_that!(counters.count(2), near(1000.0, 200.0));
    assert_eq!(counters.count(3), 0.0);
}

#[test]
fn test_union_equals_count_of_joint_set() {
    // Register-wise max over counters of the same shape and seed must
    // behave exactly like counting the union of the underlying sets.
    let mut left = array_of(1);
    let mut right = array_of(1);
    let mut joint = array_of(1);
    for v in 0..400u64 {
        left.add(0, v);
        joint.add(0, v);
    }
    for v in 300..700u64 {
        right.add(0, v);
        joint.add(0, v);
    }

    left.union_counter(0, &right, 0).unwrap();
    assert_eq!(left.count(0), joint.count(0));
}

#[test]
fn test_extract_then_union_round_trip() {
    // Extract {3, 7, 11} into a small array, union it back into a fresh
    // empty array at the same indices, and expect identical counts.
    let indices = [3u64, 7, 11];
    let mut source = array_of(16);
    for k in 0..16u64 {
        for v in 0..(k + 1) * 25 {
            source.add(k, v.wrapping_mul(2654435761).wrapping_add(k));
        }
    }

    let extracted = source.extract(&indices).unwrap();
    assert_eq!(extracted.size(), 3);
    assert_eq!(extracted.seed(), source.seed());

    let mut rebuilt = array_of(16);
    for (position, &index) in indices.iter().enumerate() {
        rebuilt
            .union_counter(index, &extracted, position as u64)
            .unwrap();
    }
    for &index in &indices {
        assert_eq!(rebuilt.count(index), source.count(index), "counter {index}");
    }
    assert_eq!(rebuilt.count(0), 0.0);
}

#[test]
fn test_extract_rejects_out_of_range() {
    let source = array_of(4);
    assert!(source.extract(&[9]).is_err());
}

#[test]
fn test_clone_then_diverge() {
    let mut original = array_of(2);
    for v in 0..128u64 {
        original.add(0, v);
    }
    let mut clone = original.clone();
    assert_eq!(clone.count(0), original.count(0));

    clone.add(0, u64::MAX);
    clone.add(1, 5);
    original.add(1, 6);

    // The two arrays evolved independently after the clone.
    assert_ne!(clone.count(1), 0.0);
    assert_ne!(original.count(1), 0.0);
    assert!(original.count(0) <= clone.count(0));
}

#[test]
fn test_whole_array_union_is_idempotent() {
    let mut left = array_of(8);
    let mut right = array_of(8);
    for k in 0..8u64 {
        for v in 0..60u64 {
            left.add(k, v * 3 + k);
            right.add(k, v * 5 + k);
        }
    }

    left.union_all(&right).unwrap();
    let first: Vec<f64> = (0..8).map(|k| left.count(k)).collect();
    left.union_all(&right).unwrap();
    let second: Vec<f64> = (0..8).map(|k| left.count(k)).collect();
    assert_eq!(first, second);
}

#[test]
fn test_union_after_symmetric_growth() {
    let mut left = array_of(2);
    let mut right = array_of(2);
    left.add_counters(100);
    right.add_counters(100);
    for v in 0..30u64 {
        left.add(50, v);
        right.add(50, v + 15);
    }

    left.union_all(&right).unwrap();
    assert_that!(left.count(50), near(45.0, 7.0));
}

#[test]
fn test_serialized_header_layout() {
    // The on-disk header is {log2m: u8, register_size: u8, seed: u64,
    // size: u64, chunk_count: u32}, little-endian.
    let mut counters = array_of(3);
    counters.add(1, 17);

    let bytes = hll::serialize(&counters);
    assert_eq!(bytes[0], LOG2M as u8);
    assert_eq!(bytes[1], hll::register_size(N) as u8);
    assert_eq!(LE::read_u64(&bytes[2..10]), SEED);
    assert_eq!(LE::read_u64(&bytes[10..18]), 3);
    assert_eq!(LE::read_u32(&bytes[18..22]), 1);

    let restored = hll::deserialize(&bytes).unwrap();
    for k in 0..3u64 {
        assert_eq!(restored.count(k), counters.count(k));
    }
}

#[test]
fn test_serialization_survives_union() {
    // A deserialized array keeps the seed, so it can still be unioned
    // with the original.
    let mut counters = array_of(2);
    for v in 0..50u64 {
        counters.add(0, v);
    }
    let mut restored = hll::deserialize(&hll::serialize(&counters)).unwrap();
    for v in 25..75u64 {
        restored.add(0, v);
    }
    counters.union_all(&restored).unwrap();
    assert_that!(counters.count(0), near(75.0, 12.0));
}
