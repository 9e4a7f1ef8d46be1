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

//! Binary serialization of counter arrays.
//!
//! The layout is explicit and fixed: a header
//! `{log2m: u8, register_size: u8, seed: u64, size: u64, chunk_count: u32}`
//! followed by the raw chunk longwords, all little-endian. The capacity of
//! the source array is normalised to its size on the way out, so the byte
//! image is a function of the counter contents alone.

use crate::codec::ByteReader;
use crate::codec::ByteWriter;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::hll::counter_array::CounterShape;
use crate::hll::CounterArray;

/// Serializes a counter array into the fixed little-endian layout.
pub fn serialize(array: &CounterArray) -> Vec<u8> {
    // Normalise capacity to size so the image carries no growth slack.
    let shape = array.shape();
    let mut normalised = CounterArray::with_shape(array.size(), shape.clone())
        .expect("shape was validated when the source array was built");
    let mut buffer = vec![0u64; shape.counter_longwords()];
    for k in 0..array.size() {
        array.get_counter(k, &mut buffer);
        normalised.set_counter(&buffer, k);
    }

    let chunks = normalised.chunks();
    let words: usize = chunks.iter().map(Vec::len).sum();
    let mut writer = ByteWriter::with_capacity(22 + words * 8);
    writer.put_u8(shape.log2m() as u8);
    writer.put_u8(shape.register_size() as u8);
    writer.put_u64(shape.seed());
    writer.put_u64(array.size());
    writer.put_u32(chunks.len() as u32);
    for chunk in chunks {
        for &word in chunk {
            writer.put_u64(word);
        }
    }
    writer.into_vec()
}

/// Deserializes a counter array from the fixed little-endian layout.
///
/// # Errors
///
/// Fails with [`ErrorKind::Io`] on a truncated image and with
/// [`ErrorKind::InvalidArgument`] on parameters no array could have been
/// built with.
pub fn deserialize(bytes: &[u8]) -> Result<CounterArray, Error> {
    let mut reader = ByteReader::new(bytes);
    let truncated = |field: &'static str| {
        move |_| Error::new(ErrorKind::Io, "serialized counter array is truncated")
            .with_context("field", field)
    };

    let log2m = reader.get_u8().map_err(truncated("log2m"))? as u32;
    let register_size = reader.get_u8().map_err(truncated("register_size"))? as u32;
    let seed = reader.get_u64().map_err(truncated("seed"))?;
    let size = reader.get_u64().map_err(truncated("size"))?;
    let chunk_count = reader.get_u32().map_err(truncated("chunk_count"))?;

    let shape = CounterShape::with_register_size(log2m, register_size, seed)?;
    let mut array = CounterArray::with_shape(size, shape)?;

    if array.chunks().len() != chunk_count as usize {
        return Err(
            Error::invalid_argument("chunk count does not match the declared size")
                .with_context("declared", chunk_count)
                .with_context("expected", array.chunks().len()),
        );
    }

    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for chunk in array.chunks() {
        let mut words = vec![0u64; chunk.len()];
        for word in words.iter_mut() {
            *word = reader.get_u64().map_err(truncated("chunk_word"))?;
        }
        chunks.push(words);
    }
    if reader.remaining() != 0 {
        return Err(Error::invalid_argument(
            "serialized counter array has trailing bytes",
        )
        .with_context("trailing", reader.remaining()));
    }

    array.replace_chunks(chunks);
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut array = CounterArray::new(5, 30, 7, 42).unwrap();
        for k in 0..5u64 {
            for v in 0..(k + 1) * 20 {
                array.add(k, v);
            }
        }

        let bytes = serialize(&array);
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored.size(), array.size());
        assert_eq!(restored.seed(), array.seed());
        for k in 0..5u64 {
            assert_eq!(restored.count(k), array.count(k), "counter {k}");
        }
    }

    #[test]
    fn test_round_trip_after_growth() {
        let mut array = CounterArray::new(1, 30, 5, 0).unwrap();
        array.add(0, 77);
        array.add_counters(64);
        array.add(40, 99);

        let restored = deserialize(&serialize(&array)).unwrap();
        assert_eq!(restored.size(), 65);
        assert_eq!(restored.count(0), array.count(0));
        assert_eq!(restored.count(40), array.count(40));
    }

    #[test]
    fn test_truncated_image_fails() {
        let array = CounterArray::new(3, 30, 7, 0).unwrap();
        let bytes = serialize(&array);
        let err = deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_bad_parameters_fail() {
        let array = CounterArray::new(1, 30, 7, 0).unwrap();
        let mut bytes = serialize(&array);
        bytes[0] = 63; // absurd log2m
        let err = deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let array = CounterArray::new(1, 30, 7, 0).unwrap();
        let mut bytes = serialize(&array);
        bytes.push(0);
        assert!(deserialize(&bytes).is_err());
    }
}
