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

use crate::common::grown_capacity;
use crate::error::Error;
use crate::hash::jenkins_mix;
use crate::hll::broadword;
use crate::hll::register_size;
use crate::hll::CHUNK_MASK;
use crate::hll::CHUNK_SHIFT;
use crate::hll::CHUNK_SIZE;
use crate::hll::MAX_LOG2M;
use crate::hll::MIN_LOG2M;

/// Register sizes above 6 bits are pointless for a 64-bit hash: the rank of
/// a hashed value never exceeds 64.
const MAX_REGISTER_SIZE: u32 = 6;

/// The register-level layout and hash parameters shared by every counter of
/// an array.
///
/// The shape owns everything that is derived from `(log2m, register_size,
/// seed)`: the α_m·m² estimation constant, the sentinel mask, and the
/// msb/lsb mask arrays for the broadword maximum. All of it is rebuilt in
/// one place, on construction, growth and cloning; nothing is memoised at
/// module scope.
///
/// Counter-local buffers of [`counter_longwords`](Self::counter_longwords)
/// longwords can be manipulated through the shape without an array at hand,
/// which is how the engine computes identity counters and on-demand unions.
#[derive(Debug, Clone)]
pub struct CounterShape {
    log2m: u32,
    m: u64,
    m_minus_1: u64,
    register_size: u32,
    counter_size: u64,
    counter_longwords: usize,
    counter_residual_mask: u64,
    longword_aligned: bool,
    sentinel_mask: u64,
    alpha_mm: f64,
    seed: u64,
    /// Expanded msb mask, one entry per counter longword.
    msb_mask: Vec<u64>,
    /// Expanded lsb mask, one entry per counter longword.
    lsb_mask: Vec<u64>,
    /// One full period of the msb pattern (`register_size` longwords).
    msb_base: Vec<u64>,
    /// One full period of the lsb pattern.
    lsb_base: Vec<u64>,
}

impl CounterShape {
    /// Creates a shape for an expected-element upper bound `n`.
    pub fn new(log2m: u32, n: u64, seed: u64) -> Result<Self, Error> {
        Self::with_register_size(log2m, register_size(n), seed)
    }

    /// Creates a shape with an explicit register size.
    pub(crate) fn with_register_size(
        log2m: u32,
        register_size: u32,
        seed: u64,
    ) -> Result<Self, Error> {
        if !(MIN_LOG2M..=MAX_LOG2M).contains(&log2m) {
            return Err(Error::invalid_argument(format!(
                "log2m {log2m} is out of range [{MIN_LOG2M}, {MAX_LOG2M}]"
            )));
        }
        if !(5..=MAX_REGISTER_SIZE).contains(&register_size) {
            return Err(Error::invalid_argument(format!(
                "register size {register_size} is out of range [5, {MAX_REGISTER_SIZE}]"
            )));
        }

        let m = 1u64 << log2m;
        let counter_size = (register_size as u64) << log2m;
        let counter_longwords = ((counter_size + 63) / 64) as usize;
        let counter_residual_mask = (1u64 << (counter_size % 64)) - 1;

        // See the Flajolet–Fusy–Gandouet–Meunier paper.
        let alpha_mm = match log2m {
            4 => 0.673 * (m * m) as f64,
            5 => 0.697 * (m * m) as f64,
            6 => 0.709 * (m * m) as f64,
            _ => (0.7213 / (1.0 + 1.079 / m as f64)) * (m * m) as f64,
        };

        let (msb_mask, lsb_mask) = build_masks(counter_longwords, register_size);
        let (msb_base, lsb_base) = build_masks(register_size as usize, register_size);

        Ok(Self {
            log2m,
            m,
            m_minus_1: m - 1,
            register_size,
            counter_size,
            counter_longwords,
            counter_residual_mask,
            longword_aligned: counter_size % 64 == 0,
            sentinel_mask: 1u64 << ((1u64 << register_size) - 2),
            alpha_mm,
            seed,
            msb_mask,
            lsb_mask,
            msb_base,
            lsb_base,
        })
    }

    /// The logarithm of the number of registers per counter.
    pub fn log2m(&self) -> u32 {
        self.log2m
    }

    /// The number of registers per counter.
    pub fn m(&self) -> u64 {
        self.m
    }

    /// The size in bits of each register.
    pub fn register_size(&self) -> u32 {
        self.register_size
    }

    /// The size in bits of each counter.
    pub fn counter_size(&self) -> u64 {
        self.counter_size
    }

    /// The size of a counter-local buffer in longwords.
    pub fn counter_longwords(&self) -> usize {
        self.counter_longwords
    }

    /// The seed of the hash function.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn same_layout(&self, other: &CounterShape) -> bool {
        self.register_size == other.register_size && self.m == other.m
    }

    /// Hashes `v` and returns the register index and rank to record.
    fn register_parts(&self, v: u64) -> (u64, u64) {
        let hash = jenkins_mix(v, self.seed);
        let index = hash & self.m_minus_1;
        let rank = ((hash >> self.log2m) | self.sentinel_mask).trailing_zeros() as u64 + 1;
        (index, rank)
    }

    /// Adds an element to a counter held in a counter-local buffer.
    pub fn add_into(&self, bits: &mut [u64], v: u64) {
        let (index, rank) = self.register_parts(v);
        self.write_register_max(bits, index, rank);
    }

    /// Fills a counter-local buffer with the single-element set `{v}`.
    pub fn identity_into(&self, bits: &mut [u64], v: u64) {
        bits[..self.counter_longwords].fill(0);
        self.add_into(bits, v);
    }

    pub(crate) fn read_register(&self, bits: &[u64], index: u64) -> u64 {
        let pos = index * self.register_size as u64;
        let word = (pos / 64) as usize;
        let shift = (pos % 64) as u32;
        let mask = (1u64 << self.register_size) - 1;
        let mut value = bits[word] >> shift;
        if shift + self.register_size > 64 {
            value |= bits[word + 1] << (64 - shift);
        }
        value & mask
    }

    pub(crate) fn write_register_max(&self, bits: &mut [u64], index: u64, value: u64) {
        let pos = index * self.register_size as u64;
        let word = (pos / 64) as usize;
        let shift = (pos % 64) as u32;
        let mask = (1u64 << self.register_size) - 1;

        let mut current = bits[word] >> shift;
        if shift + self.register_size > 64 {
            current |= bits[word + 1] << (64 - shift);
        }
        current &= mask;
        if value <= current {
            return;
        }

        bits[word] = bits[word] & !(mask << shift) | value << shift;
        if shift + self.register_size > 64 {
            let high = shift + self.register_size - 64;
            bits[word + 1] = bits[word + 1] & !((1u64 << high) - 1) | value >> (64 - shift);
        }
    }

    /// Estimates the number of distinct elements recorded in the counter
    /// starting at bit `offset` of `bits`.
    pub fn count_at(&self, bits: &[u64], offset: u64) -> f64 {
        let mut remaining = 64 - (offset % 64) as u32;
        let mut word = (offset / 64) as usize;
        let mut current = bits[word] >> (offset % 64);

        let register_size = self.register_size;
        let mask = (1u64 << register_size) - 1;

        let mut harmonic = 0.0;
        let mut zeroes = 0u64;

        for _ in 0..self.m {
            let register;
            if remaining >= register_size {
                register = current & mask;
                current >>= register_size;
                remaining -= register_size;
            } else {
                word += 1;
                register = (current | bits[word] << remaining) & mask;
                current = bits[word] >> (register_size - remaining);
                remaining += 64 - register_size;
            }

            if register == 0 {
                zeroes += 1;
            }
            harmonic += 1.0 / (1u64 << register) as f64;
        }

        let raw = self.alpha_mm / harmonic;
        if zeroes != 0 && raw < 5.0 * self.m as f64 / 2.0 {
            // Small range correction.
            self.m as f64 * (self.m as f64 / zeroes as f64).ln()
        } else {
            raw
        }
    }

    /// Estimates the cardinality of a counter held in a counter-local
    /// buffer.
    pub fn count_longwords(&self, bits: &[u64]) -> f64 {
        self.count_at(bits, 0)
    }

    /// Register-wise maximum of two counter-local buffers, left in `x`.
    pub fn max_into(&self, x: &mut [u64], y: &[u64]) {
        broadword::max_registers(x, y, &self.msb_mask, &self.lsb_mask, self.register_size);
    }

    /// Register-wise maximum over two whole chunks. The masks wrap every
    /// `register_size` longwords, so one period suffices here.
    fn max_chunk(&self, x: &mut [u64], y: &[u64]) {
        broadword::max_registers(x, y, &self.msb_base, &self.lsb_base, self.register_size);
    }

    /// Copies the counter starting at bit `offset` of `chunk` into a
    /// counter-local buffer.
    fn copy_out(&self, chunk: &[u64], offset: u64, dest: &mut [u64]) {
        let longwords = self.counter_longwords;
        if self.longword_aligned {
            let word = (offset / 64) as usize;
            dest[..longwords].copy_from_slice(&chunk[word..word + longwords]);
            return;
        }

        let word = (offset / 64) as usize;
        let bit = (offset % 64) as u32;
        let last = longwords - 1;

        if bit == 0 {
            dest[..last].copy_from_slice(&chunk[word..word + last]);
            dest[last] = chunk[word + last] & self.counter_residual_mask;
        } else {
            for i in 0..last {
                dest[i] = chunk[word + i] >> bit | chunk[word + i + 1] << (64 - bit);
            }
            let mut top = chunk[word + last] >> bit;
            if self.counter_size % 64 + bit as u64 > 64 {
                top |= chunk[word + last + 1] << (64 - bit);
            }
            dest[last] = top & self.counter_residual_mask;
        }
    }

    /// Writes a counter-local buffer into the counter starting at bit
    /// `offset` of `chunk`, preserving the surrounding bits.
    fn copy_in(&self, chunk: &mut [u64], offset: u64, source: &[u64]) {
        let longwords = self.counter_longwords;
        if self.longword_aligned {
            let word = (offset / 64) as usize;
            chunk[word..word + longwords].copy_from_slice(&source[..longwords]);
            return;
        }

        let word = (offset / 64) as usize;
        let bit = (offset % 64) as u32;
        let last = longwords - 1;

        if bit == 0 {
            chunk[word..word + last].copy_from_slice(&source[..last]);
            chunk[word + last] = chunk[word + last] & !self.counter_residual_mask
                | source[last] & self.counter_residual_mask;
        } else {
            chunk[word] = chunk[word] & ((1u64 << bit) - 1) | source[0] << bit;
            for i in 1..last {
                chunk[word + i] = source[i - 1] >> (64 - bit) | source[i] << bit;
            }

            let remaining = self.counter_size % 64 + bit as u64;
            let mask = !0u64 >> (64 - remaining.min(64));
            chunk[word + last] = chunk[word + last] & !mask
                | mask & (source[last - 1] >> (64 - bit) | source[last] << bit);

            // Only reachable with seven or more bits per register.
            if remaining > 64 {
                let mask = (1u64 << (remaining - 64)) - 1;
                chunk[word + last + 1] =
                    chunk[word + last + 1] & !mask | mask & (source[last] >> (64 - bit));
            }
        }
    }

    /// Copies the counter starting at bit `offset` between two parallel
    /// chunks, preserving the destination's surrounding bits.
    fn transfer(&self, source: &[u64], dest: &mut [u64], offset: u64) {
        let longwords = self.counter_longwords;
        let word = (offset / 64) as usize;
        if self.longword_aligned {
            dest[word..word + longwords].copy_from_slice(&source[word..word + longwords]);
            return;
        }

        let bit = (offset % 64) as u32;
        let last = longwords - 1;

        if bit == 0 {
            dest[word..word + last].copy_from_slice(&source[word..word + last]);
            dest[word + last] = dest[word + last] & !self.counter_residual_mask
                | source[word + last] & self.counter_residual_mask;
        } else {
            let mask = !0u64 << bit;
            dest[word] = dest[word] & !mask | source[word] & mask;
            dest[word + 1..word + last].copy_from_slice(&source[word + 1..word + last]);

            let remaining = (self.counter_size + bit as u64) % 64;
            if remaining == 0 {
                dest[word + last] = source[word + last];
            } else {
                let mask = (1u64 << remaining) - 1;
                dest[word + last] = dest[word + last] & !mask | source[word + last] & mask;
            }
        }
    }

    /// Zeroes the `counter_size` bits starting at bit `offset` of `chunk`,
    /// leaving the surrounding bits intact.
    fn clear_at(&self, chunk: &mut [u64], offset: u64) {
        let mut remaining = self.counter_size;
        let mut from_right = offset % 64;
        // All ones below from_right, zeroes above: the bits to keep in the
        // first word.
        let mut mask = (1u64 << from_right) - 1;
        let mut word = (offset / 64) as usize;

        while remaining > 0 {
            if remaining < 64 - from_right {
                // The counter ends inside this word; keep the bits above it
                // as well.
                mask |= !((1u64 << (from_right + remaining)) - 1);
            }
            chunk[word] &= mask;
            word += 1;
            remaining = remaining.saturating_sub(64 - from_right);
            mask = 0;
            from_right = 0;
        }
    }
}

fn build_masks(words: usize, register_size: u32) -> (Vec<u64>, Vec<u64>) {
    let mut msb = vec![0u64; words];
    let mut lsb = vec![0u64; words];
    let total_bits = words * 64;
    let mut bit = register_size as usize - 1;
    while bit < total_bits {
        msb[bit / 64] |= 1u64 << (bit % 64);
        bit += register_size as usize;
    }
    let mut bit = 0;
    while bit < total_bits {
        lsb[bit / 64] |= 1u64 << (bit % 64);
        bit += register_size as usize;
    }
    (msb, lsb)
}

/// An increment-only dynamic array of HyperLogLog counters.
///
/// Each counter is an approximate set; [`add`](Self::add) inserts an
/// element and [`count`](Self::count) estimates how many distinct elements
/// a counter has absorbed. Counters can be combined register-wise with
/// [`union_counter`](Self::union_counter) and whole arrays with
/// [`union_all`](Self::union_all); both require identical shape and, for
/// meaningful results, the same seed.
///
/// The array grows on demand through [`add_counters`](Self::add_counters)
/// using a compounded 1.1x policy and never shrinks.
///
/// # Examples
///
/// ```
/// # use danf::hll::CounterArray;
/// let mut counters = CounterArray::new(2, 1000, 7, 0).unwrap();
/// for v in 0..500u64 {
///     counters.add(0, v);
/// }
/// counters.add(1, 1);
///
/// let estimate = counters.count(0);
/// assert!((estimate - 500.0).abs() < 100.0);
/// assert!((counters.count(1) - 1.0).abs() < 0.01);
/// ```
#[derive(Debug)]
pub struct CounterArray {
    shape: CounterShape,
    /// The shift that selects the chunk corresponding to a counter.
    counter_shift: u32,
    chunks: Vec<Vec<u64>>,
    size: u64,
    limit: u64,
}

impl CounterArray {
    /// Creates a new array of `size` counters for an expected-element upper
    /// bound `n`.
    pub fn new(size: u64, n: u64, log2m: u32, seed: u64) -> Result<Self, Error> {
        Self::with_shape(size, CounterShape::new(log2m, n, seed)?)
    }

    /// Creates a new array of `size` counters targeting the given relative
    /// standard deviation.
    pub fn with_rsd(size: u64, n: u64, rsd: f64, seed: u64) -> Result<Self, Error> {
        Self::with_shape(
            size,
            CounterShape::new(crate::hll::log2_number_of_registers(rsd), n, seed)?,
        )
    }

    pub(crate) fn with_shape(size: u64, shape: CounterShape) -> Result<Self, Error> {
        let limit = if size == 0 { 1 } else { size };
        let chunks = build_chunks(limit, &shape);
        Ok(Self {
            counter_shift: CHUNK_SHIFT - shape.log2m(),
            shape,
            chunks,
            size,
            limit,
        })
    }

    /// The number of counters currently addressable.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The seed of the hash function.
    pub fn seed(&self) -> u64 {
        self.shape.seed()
    }

    /// The register-level layout of this array.
    pub fn shape(&self) -> &CounterShape {
        &self.shape
    }

    /// The chunk of a given counter.
    fn chunk(&self, counter: u64) -> usize {
        (counter >> self.counter_shift) as usize
    }

    /// The bit offset of a given counter in its chunk.
    fn offset(&self, counter: u64) -> u64 {
        ((counter << self.shape.log2m()) & CHUNK_MASK) * self.shape.register_size() as u64
    }

    /// Adds an element to a counter. No effect if the register already
    /// holds an equal or higher rank.
    pub fn add(&mut self, k: u64, v: u64) {
        debug_assert!(k < self.size, "counter {k} out of bounds ({})", self.size);
        let (index, rank) = self.shape.register_parts(v);
        let register = ((k << self.shape.log2m()).wrapping_add(index)) & CHUNK_MASK;
        let chunk = self.chunk(k);
        self.shape
            .write_register_max(&mut self.chunks[chunk], register, rank);
    }

    /// Estimates the number of distinct elements that have been added to a
    /// counter. Indices at or beyond [`size`](Self::size) read as an empty
    /// set, so the answer is the zero estimate rather than an error.
    pub fn count(&self, k: u64) -> f64 {
        if k >= self.size {
            return 0.0;
        }
        self.shape.count_at(&self.chunks[self.chunk(k)], self.offset(k))
    }

    /// Whether two counter indices hash to the same register slot. Mainly
    /// useful to build collision-free test fixtures.
    pub fn has_same_registers(&self, i: u64, j: u64) -> bool {
        self.shape.register_parts(i).0 == self.shape.register_parts(j).0
    }

    /// Copies counter `k` into `dest`, which must hold at least
    /// [`CounterShape::counter_longwords`] longwords.
    pub fn get_counter(&self, k: u64, dest: &mut [u64]) {
        debug_assert!(k < self.limit);
        self.shape
            .copy_out(&self.chunks[self.chunk(k)], self.offset(k), dest);
    }

    /// Overwrites counter `k` with the contents of `source`, preserving the
    /// surrounding bits of the chunk.
    pub fn set_counter(&mut self, source: &[u64], k: u64) {
        debug_assert!(k < self.limit);
        let chunk = self.chunk(k);
        let offset = self.offset(k);
        self.shape.copy_in(&mut self.chunks[chunk], offset, source);
    }

    /// Copies counter `k` of `from` into counter `k` of `self`, preserving
    /// surrounding bits on both sides.
    pub fn transfer_from(&mut self, from: &CounterArray, k: u64) -> Result<(), Error> {
        if !self.shape.same_layout(&from.shape) {
            return Err(shape_mismatch(&self.shape, &from.shape));
        }
        let chunk = self.chunk(k);
        let offset = self.offset(k);
        self.shape
            .transfer(&from.chunks[chunk], &mut self.chunks[chunk], offset);
        Ok(())
    }

    /// Zeroes the bits of counter `k`, leaving the rest of its chunk
    /// intact.
    pub fn clear_counter(&mut self, k: u64) {
        let chunk = self.chunk(k);
        let offset = self.offset(k);
        self.shape.clear_at(&mut self.chunks[chunk], offset);
    }

    /// Takes the register-wise union of counter `from_k` of `from` into
    /// counter `k` of this array.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::IncompatibleShape`](crate::ErrorKind) if the
    /// two arrays do not share `m` and the register size. Both arrays must
    /// also have been created with the same seed for the result to estimate
    /// the union of the underlying sets.
    pub fn union_counter(&mut self, k: u64, from: &CounterArray, from_k: u64) -> Result<(), Error> {
        if !self.shape.same_layout(&from.shape) {
            return Err(shape_mismatch(&self.shape, &from.shape));
        }
        let longwords = self.shape.counter_longwords();
        let mut target = vec![0u64; longwords];
        let mut other = vec![0u64; longwords];
        self.get_counter(k, &mut target);
        from.get_counter(from_k, &mut other);
        self.shape.max_into(&mut target, &other);
        self.set_counter(&target, k);
        Ok(())
    }

    /// Takes the register-wise union of the entire array `from` into this
    /// array (`self <- max(self, from)`).
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::IncompatibleShape`](crate::ErrorKind) if the
    /// arrays differ in register layout or chunk geometry.
    pub fn union_all(&mut self, from: &CounterArray) -> Result<(), Error> {
        if !self.shape.same_layout(&from.shape) {
            return Err(shape_mismatch(&self.shape, &from.shape));
        }
        if self.chunks.len() != from.chunks.len()
            || self
                .chunks
                .iter()
                .zip(&from.chunks)
                .any(|(a, b)| a.len() != b.len())
        {
            return Err(Error::incompatible_shape(
                "arrays have different chunk geometry",
            )
            .with_context("left_chunks", self.chunks.len())
            .with_context("right_chunks", from.chunks.len()));
        }
        for (chunk, other) in self.chunks.iter_mut().zip(&from.chunks) {
            self.shape.max_chunk(chunk, other);
        }
        Ok(())
    }

    /// Requests room for `n` more counters, growing the backing chunks by
    /// the compounded 1.1x policy when the current capacity is exceeded.
    /// New counters read as empty sets.
    pub fn add_counters(&mut self, n: u64) {
        if self.size + n > self.limit {
            let new_limit = grown_capacity(self.limit, self.limit + n);
            self.resize(new_limit);
            self.limit = new_limit;
        }
        self.size += n;
    }

    fn resize(&mut self, new_limit: u64) {
        let mut chunks = build_chunks(new_limit, &self.shape);
        for (new_chunk, old_chunk) in chunks.iter_mut().zip(&self.chunks) {
            new_chunk[..old_chunk.len()].copy_from_slice(old_chunk);
        }
        self.chunks = chunks;
        // Masks are a function of the shape alone, but they are rebuilt on
        // every geometry change together with the rest of the derived
        // state.
        self.shape = CounterShape::with_register_size(
            self.shape.log2m(),
            self.shape.register_size(),
            self.shape.seed(),
        )
        .expect("shape parameters were validated at construction");
    }

    /// Builds a fresh array of `indices.len()` counters populated from this
    /// array at the given indices. The new array shares shape and seed, so
    /// its counters can later be unioned back.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind) if any
    /// index is at or beyond the current size.
    pub fn extract(&self, indices: &[u64]) -> Result<CounterArray, Error> {
        let mut extracted = CounterArray::with_shape(indices.len() as u64, self.shape.clone())?;
        if indices.is_empty() {
            return Ok(extracted);
        }

        let mut buffer = vec![0u64; self.shape.counter_longwords()];
        for (i, &index) in indices.iter().enumerate() {
            if index >= self.size {
                return Err(Error::invalid_argument("extract index out of bounds")
                    .with_context("index", index)
                    .with_context("size", self.size));
            }
            self.get_counter(index, &mut buffer);
            extracted.set_counter(&buffer, i as u64);
        }
        Ok(extracted)
    }

    /// Clears all registers.
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            chunk.fill(0);
        }
    }

    /// Clears all registers and sets a new seed.
    pub fn clear_with_seed(&mut self, seed: u64) {
        self.clear();
        self.shape.seed = seed;
    }

    /// The memory backing the registers, in bytes.
    pub fn used_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.len() as u64 * 8).sum()
    }

    pub(crate) fn chunks(&self) -> &[Vec<u64>] {
        &self.chunks
    }

    pub(crate) fn replace_chunks(&mut self, chunks: Vec<Vec<u64>>) {
        debug_assert_eq!(chunks.len(), self.chunks.len());
        self.chunks = chunks;
    }
}

impl Clone for CounterArray {
    fn clone(&self) -> Self {
        // The derived shape state, masks included, is rebuilt rather than
        // copied.
        let shape = CounterShape::with_register_size(
            self.shape.log2m(),
            self.shape.register_size(),
            self.shape.seed(),
        )
        .expect("shape parameters were validated at construction");
        Self {
            shape,
            counter_shift: self.counter_shift,
            chunks: self.chunks.clone(),
            size: self.size,
            limit: self.limit,
        }
    }
}

fn shape_mismatch(left: &CounterShape, right: &CounterShape) -> Error {
    Error::incompatible_shape("the counters have different register layouts")
        .with_context("left_m", left.m())
        .with_context("right_m", right.m())
        .with_context("left_register_size", left.register_size())
        .with_context("right_register_size", right.register_size())
}

fn build_chunks(limit: u64, shape: &CounterShape) -> Vec<Vec<u64>> {
    let size_in_registers = limit * shape.m();
    let num_chunks = ((size_in_registers + CHUNK_MASK) >> CHUNK_SHIFT) as usize;
    let mut chunks = Vec::with_capacity(num_chunks);
    for i in 0..num_chunks {
        let registers = CHUNK_SIZE.min(size_in_registers - ((i as u64) << CHUNK_SHIFT));
        let bits = registers * shape.register_size() as u64;
        chunks.push(vec![0u64; ((bits + 63) / 64) as usize]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u64 = 0;

    fn small_array(size: u64) -> CounterArray {
        CounterArray::new(size, 30, 7, SEED).unwrap()
    }

    #[test]
    fn test_log2m_bounds() {
        assert!(CounterArray::new(1, 30, 3, SEED).is_err());
        assert!(CounterArray::new(1, 30, 31, SEED).is_err());
        assert!(CounterArray::new(1, 30, 4, SEED).is_ok());
    }

    #[test]
    fn test_empty_counter_counts_zero() {
        let counters = small_array(4);
        assert_eq!(counters.count(0), 0.0);
    }

    #[test]
    fn test_count_past_size_is_zero() {
        let counters = small_array(2);
        assert_eq!(counters.count(17), 0.0);
    }

    #[test]
    fn test_single_element() {
        let mut counters = small_array(4);
        counters.add(2, 1234);
        assert!((counters.count(2) - 1.0).abs() < 0.01);
        assert_eq!(counters.count(1), 0.0);
    }

    #[test]
    fn test_duplicates_do_not_count() {
        let mut counters = small_array(1);
        for _ in 0..100 {
            counters.add(0, 42);
        }
        assert!((counters.count(0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_neighbouring_counters_are_independent() {
        let mut counters = small_array(3);
        for v in 0..100u64 {
            counters.add(1, v);
        }
        assert_eq!(counters.count(0), 0.0);
        assert_eq!(counters.count(2), 0.0);
    }

    #[test]
    fn test_get_set_round_trip() {
        let mut counters = small_array(8);
        for v in 0..200u64 {
            counters.add(3, v * 31);
        }
        let longwords = counters.shape().counter_longwords();
        let mut buffer = vec![0u64; longwords];
        counters.get_counter(3, &mut buffer);
        counters.set_counter(&buffer, 6);
        assert_eq!(counters.count(6), counters.count(3));
    }

    #[test]
    fn test_clear_counter_leaves_neighbours() {
        let mut counters = small_array(3);
        for v in 0..50u64 {
            counters.add(0, v);
            counters.add(1, v + 1000);
            counters.add(2, v + 2000);
        }
        let before_0 = counters.count(0);
        let before_2 = counters.count(2);
        counters.clear_counter(1);
        assert_eq!(counters.count(1), 0.0);
        assert_eq!(counters.count(0), before_0);
        assert_eq!(counters.count(2), before_2);
    }

    #[test]
    fn test_union_counter_matches_joint_set() {
        let mut a = small_array(2);
        let mut joint = small_array(1);
        for v in 0..300u64 {
            a.add(0, v);
            joint.add(0, v);
        }
        for v in 200..500u64 {
            a.add(1, v);
            joint.add(0, v);
        }

        let mut union = a.clone();
        let other = a.clone();
        union.union_counter(0, &other, 1).unwrap();
        assert_eq!(union.count(0), joint.count(0));
    }

    #[test]
    fn test_union_all() {
        let mut a = small_array(4);
        let mut b = small_array(4);
        for v in 0..100u64 {
            a.add(0, v);
            b.add(0, v + 50);
            b.add(3, v);
        }
        let mut joint = small_array(4);
        for v in 0..150u64 {
            joint.add(0, v);
        }
        for v in 0..100u64 {
            joint.add(3, v);
        }

        a.union_all(&b).unwrap();
        assert_eq!(a.count(0), joint.count(0));
        assert_eq!(a.count(3), joint.count(3));
        assert_eq!(a.count(1), 0.0);
    }

    #[test]
    fn test_union_rejects_different_layout() {
        let mut a = small_array(1);
        let b = CounterArray::new(1, 30, 6, SEED).unwrap();
        let err = a.union_counter(0, &b, 0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IncompatibleShape);
    }

    #[test]
    fn test_transfer_from() {
        let mut a = small_array(4);
        let mut b = small_array(4);
        for v in 0..80u64 {
            b.add(2, v);
            b.add(1, v + 7);
        }
        a.add(1, 9999);
        let own = a.count(1);
        a.transfer_from(&b, 2).unwrap();
        assert_eq!(a.count(2), b.count(2));
        // Transfer only touches the requested counter.
        assert_eq!(a.count(1), own);
    }

    #[test]
    fn test_growth_preserves_counters() {
        let mut counters = small_array(2);
        for v in 0..150u64 {
            counters.add(0, v);
            counters.add(1, v * 3);
        }
        let count_0 = counters.count(0);
        let count_1 = counters.count(1);

        counters.add_counters(1000);
        assert_eq!(counters.size(), 1002);
        assert_eq!(counters.count(0), count_0);
        assert_eq!(counters.count(1), count_1);
        assert_eq!(counters.count(500), 0.0);

        counters.add(500, 1);
        assert!((counters.count(500) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = small_array(2);
        for v in 0..100u64 {
            original.add(0, v);
        }
        let mut copy = original.clone();
        assert_eq!(copy.count(0), original.count(0));

        copy.add(0, 12345678);
        for v in 100..200u64 {
            original.add(1, v);
        }
        assert_eq!(copy.count(1), 0.0);
    }

    #[test]
    fn test_clear_with_seed() {
        let mut counters = small_array(1);
        counters.add(0, 1);
        counters.clear_with_seed(99);
        assert_eq!(counters.count(0), 0.0);
        assert_eq!(counters.seed(), 99);
    }

    #[test]
    fn test_accuracy_within_rsd() {
        let mut counters = small_array(1);
        let n = 10_000u64;
        for v in 0..n {
            counters.add(0, v);
        }
        let rsd = crate::hll::relative_standard_deviation(7);
        let estimate = counters.count(0);
        let relative_error = (estimate - n as f64).abs() / n as f64;
        assert!(
            relative_error < 4.0 * rsd,
            "estimate {estimate} for {n} (relative error {relative_error})"
        );
    }

    #[test]
    fn test_used_bytes_grows() {
        let mut counters = small_array(1);
        let before = counters.used_bytes();
        counters.add_counters(10_000);
        assert!(counters.used_bytes() > before);
    }

    #[test]
    fn test_unaligned_layout_round_trip() {
        // log2m = 4 with 5-bit registers gives 80-bit counters, which do
        // not start on longword boundaries.
        let mut counters = CounterArray::new(16, 30, 4, SEED).unwrap();
        for k in 0..16u64 {
            for v in 0..40u64 {
                counters.add(k, v * 17 + k);
            }
        }
        let longwords = counters.shape().counter_longwords();
        let mut buffer = vec![0u64; longwords];
        for k in 0..16u64 {
            let direct = counters.count(k);
            counters.get_counter(k, &mut buffer);
            let from_buffer = counters.shape().count_longwords(&buffer);
            assert_eq!(direct, from_buffer, "counter {k}");
        }
    }
}
