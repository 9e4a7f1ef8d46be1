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

//! A dynamic array of HyperLogLog counters with bit-level packing.
//!
//! Each counter is composed of `m = 2^log2m` registers of `register_size`
//! bits, where `register_size` depends on an upper bound on the number of
//! distinct elements to be counted. All counters of an array share one
//! seeded hash function, so arrays created with the same parameters and
//! seed can be combined register-wise.
//!
//! Registers are packed back-to-back into chunks of at most [`CHUNK_SIZE`]
//! registers, which keeps individual allocations bounded no matter how many
//! counters the array holds. Counters need not start on a longword
//! boundary; all copy paths handle both the aligned and the bit-shifted
//! case.
//!
//! The array is increment-only and grows geometrically; see
//! [`CounterArray::add_counters`].

mod broadword;
mod counter_array;
mod serialization;

pub use counter_array::CounterArray;
pub use counter_array::CounterShape;
pub use serialization::deserialize;
pub use serialization::serialize;

/// The logarithm of the maximum size in registers of a chunk.
pub const CHUNK_SHIFT: u32 = 30;
/// The maximum size in registers of a chunk.
pub const CHUNK_SIZE: u64 = 1 << CHUNK_SHIFT;
/// The mask used to obtain a register offset in a chunk.
pub const CHUNK_MASK: u64 = CHUNK_SIZE - 1;

/// Smallest admissible `log2m`.
pub const MIN_LOG2M: u32 = 4;
/// Largest admissible `log2m` (a single counter then fills a whole chunk).
pub const MAX_LOG2M: u32 = 30;

/// Returns the logarithm of the number of registers per counter that are
/// necessary to attain a given relative standard deviation.
pub fn log2_number_of_registers(rsd: f64) -> u32 {
    // 1.106 is valid for 16 registers or more.
    ((1.106 / rsd) * (1.106 / rsd)).log2().ceil() as u32
}

/// Returns the relative standard deviation corresponding to a given
/// logarithm of the number of registers per counter.
pub fn relative_standard_deviation(log2m: u32) -> f64 {
    let constant = match log2m {
        4 => 1.106,
        5 => 1.070,
        6 => 1.054,
        7 => 1.046,
        _ => 1.04,
    };
    constant / ((1u64 << log2m) as f64).sqrt()
}

/// Returns the register size in bits, given an upper bound on the number of
/// distinct elements.
pub fn register_size(n: u64) -> u32 {
    if n < 2 {
        return 5;
    }
    let log2_log2 = (n as f64).log2().log2().ceil();
    (log2_log2 as u32).max(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_size() {
        assert_eq!(register_size(0), 5);
        assert_eq!(register_size(1), 5);
        assert_eq!(register_size(30), 5);
        assert_eq!(register_size(1u64 << 32), 5);
        assert_eq!(register_size(u64::MAX), 6);
    }

    #[test]
    fn test_rsd_round_trip() {
        for log2m in MIN_LOG2M..=10 {
            let rsd = relative_standard_deviation(log2m);
            assert!(log2_number_of_registers(rsd) <= log2m + 1);
        }
    }

    #[test]
    fn test_rsd_shrinks_with_registers() {
        assert!(relative_standard_deviation(7) < relative_standard_deviation(4));
    }
}
