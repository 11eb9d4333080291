// SPDX-License-Identifier: AGPL-3.0-or-later
// StrataDB - Columnar Analytical Storage Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Mergeable aggregate states
//!
//! The union-style column aggregations carry sketch state through the
//! memtable and serialize it at finalize time:
//!
//! - [`HllSketch`]: dense HyperLogLog registers, xxHash64 elements,
//!   register-wise max on merge
//! - [`BitmapState`]: exact distinct set of `u64` values, set union on merge
//!
//! Wire forms are little-endian and self-describing; `from_bytes` is the
//! ingest-side constructor, `to_bytes` the finalize-side serializer.

use std::collections::BTreeSet;
use std::hash::Hasher;

use byteorder::{ByteOrder, LittleEndian};
use stratadb_core::{Result, StrataError};
use twox_hash::XxHash64;

/// Default HLL precision: 2^12 registers, ~1.6% standard error.
pub const DEFAULT_HLL_PRECISION: u8 = 12;

/// Dense HyperLogLog cardinality sketch.
///
/// Standard error is `1.04 / sqrt(2^precision)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HllSketch {
    precision: u8,
    registers: Vec<u8>,
}

impl HllSketch {
    pub fn new(precision: u8) -> Self {
        assert!((4..=16).contains(&precision), "precision must be 4-16");
        Self {
            precision,
            registers: vec![0u8; 1 << precision],
        }
    }

    pub fn default_precision() -> Self {
        Self::new(DEFAULT_HLL_PRECISION)
    }

    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Observe one element.
    pub fn add(&mut self, value: &[u8]) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(value);
        let hash = hasher.finish();

        let idx = (hash >> (64 - self.precision)) as usize;
        let rest = hash << self.precision;
        // Rank of the first set bit in the remaining hash bits.
        let rho = (rest.leading_zeros() as u8).min(64 - self.precision) + 1;
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    /// Register-wise max with another sketch of the same precision.
    pub fn merge(&mut self, other: &HllSketch) -> Result<()> {
        if self.precision != other.precision {
            return Err(StrataError::InvalidArgument(format!(
                "hll precision mismatch: {} vs {}",
                self.precision, other.precision
            )));
        }
        for (dst, src) in self.registers.iter_mut().zip(&other.registers) {
            if *src > *dst {
                *dst = *src;
            }
        }
        Ok(())
    }

    /// Estimated cardinality with the standard small-range correction.
    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 1.0 / (1u64 << u32::from(r.min(63))) as f64)
            .sum();
        let raw = alpha * m * m / sum;

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                return (m * (m / zeros as f64).ln()).round() as u64;
            }
        }
        raw.round() as u64
    }

    /// Wire form: `[precision: u8][registers: 2^precision bytes]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.registers.len());
        out.push(self.precision);
        out.extend_from_slice(&self.registers);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(StrataError::InvalidArgument("empty hll payload".into()));
        }
        let precision = bytes[0];
        if !(4..=16).contains(&precision) {
            return Err(StrataError::InvalidArgument(format!(
                "hll precision {precision} out of range"
            )));
        }
        let m = 1usize << precision;
        if bytes.len() != 1 + m {
            return Err(StrataError::InvalidArgument(format!(
                "hll payload of {} bytes, expected {}",
                bytes.len(),
                1 + m
            )));
        }
        Ok(Self {
            precision,
            registers: bytes[1..].to_vec(),
        })
    }
}

/// Exact distinct-value bitmap state.
///
/// Kept as a sorted set in memory; the wire form is the sorted value list,
/// so finalizing also compacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitmapState {
    values: BTreeSet<u64>,
}

impl BitmapState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: u64) {
        self.values.insert(value);
    }

    pub fn merge(&mut self, other: &BitmapState) {
        self.values.extend(other.values.iter().copied());
    }

    #[inline]
    pub fn cardinality(&self) -> u64 {
        self.values.len() as u64
    }

    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        self.values.contains(&value)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.values.iter().copied()
    }

    /// Wire form: `[count: u64][values: count * u64]`, values ascending.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; 8 + 8 * self.values.len()];
        LittleEndian::write_u64(&mut out, self.values.len() as u64);
        for (i, v) in self.values.iter().enumerate() {
            LittleEndian::write_u64(&mut out[8 + 8 * i..], *v);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(StrataError::InvalidArgument("short bitmap payload".into()));
        }
        let count = LittleEndian::read_u64(bytes) as usize;
        if bytes.len() != 8 + 8 * count {
            return Err(StrataError::InvalidArgument(format!(
                "bitmap payload of {} bytes, expected {}",
                bytes.len(),
                8 + 8 * count
            )));
        }
        let mut values = BTreeSet::new();
        for i in 0..count {
            values.insert(LittleEndian::read_u64(&bytes[8 + 8 * i..]));
        }
        Ok(Self { values })
    }
}
