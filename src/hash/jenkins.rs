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

/// The golden ratio; an arbitrary value.
const GOLDEN_RATIO: u64 = 0x9e3779b97f4a7c13;

/// Bob Jenkins's 96-bit mix over a single 64-bit input and a seed.
///
/// Every counter array hashes elements through this function; two arrays
/// whose counters will ever be unioned or compared must be created with the
/// same seed.
pub fn jenkins_mix(x: u64, seed: u64) -> u64 {
    let mut a = seed.wrapping_add(x);
    let mut b = seed;
    let mut c = GOLDEN_RATIO;

    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 43;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 9;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 8;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 38;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 23;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 5;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 35;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 49;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 11;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 12;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 18;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 22;

    c
}
