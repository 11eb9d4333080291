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

//! Decoded cell values
//!
//! `Datum` is the boundary representation: the ingest layer builds tuples
//! from datums, and row views decode cells back into them. Aggregate-state
//! columns travel as `Bytes` (their serialized sketch form).

use crate::schema::ColumnType;

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
}

impl Datum {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Little-endian image of a fixed-width datum: `(buffer, width)`.
    /// Returns `None` for `Null` and `Bytes`.
    pub fn fixed_le_bytes(&self) -> Option<([u8; 8], usize)> {
        let mut buf = [0u8; 8];
        let width = match self {
            Datum::Null | Datum::Bytes(_) => return None,
            Datum::Int8(v) => {
                buf[..1].copy_from_slice(&v.to_le_bytes());
                1
            }
            Datum::Int16(v) => {
                buf[..2].copy_from_slice(&v.to_le_bytes());
                2
            }
            Datum::Int32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Datum::Int64(v) => {
                buf[..8].copy_from_slice(&v.to_le_bytes());
                8
            }
            Datum::UInt8(v) => {
                buf[..1].copy_from_slice(&v.to_le_bytes());
                1
            }
            Datum::UInt16(v) => {
                buf[..2].copy_from_slice(&v.to_le_bytes());
                2
            }
            Datum::UInt32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Datum::UInt64(v) => {
                buf[..8].copy_from_slice(&v.to_le_bytes());
                8
            }
            Datum::Float32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Datum::Float64(v) => {
                buf[..8].copy_from_slice(&v.to_le_bytes());
                8
            }
        };
        Some((buf, width))
    }

    /// Decode a little-endian fixed value slot back into a datum.
    pub fn from_fixed_le_bytes(ty: ColumnType, bytes: &[u8]) -> Datum {
        match ty {
            ColumnType::Int8 => Datum::Int8(i8::from_le_bytes([bytes[0]])),
            ColumnType::Int16 => Datum::Int16(i16::from_le_bytes([bytes[0], bytes[1]])),
            ColumnType::Int32 => {
                Datum::Int32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ColumnType::Int64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes[..8]);
                Datum::Int64(i64::from_le_bytes(b))
            }
            ColumnType::UInt8 => Datum::UInt8(bytes[0]),
            ColumnType::UInt16 => Datum::UInt16(u16::from_le_bytes([bytes[0], bytes[1]])),
            ColumnType::UInt32 => {
                Datum::UInt32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ColumnType::UInt64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes[..8]);
                Datum::UInt64(u64::from_le_bytes(b))
            }
            ColumnType::Float32 => {
                Datum::Float32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ColumnType::Float64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes[..8]);
                Datum::Float64(f64::from_le_bytes(b))
            }
            ColumnType::Varchar | ColumnType::Hll | ColumnType::Bitmap => {
                unreachable!("indirect cells are not fixed values")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_round_trip() {
        let cases = [
            (Datum::Int32(-7), ColumnType::Int32),
            (Datum::Int64(i64::MIN), ColumnType::Int64),
            (Datum::UInt8(255), ColumnType::UInt8),
            (Datum::Float64(3.5), ColumnType::Float64),
        ];
        for (datum, ty) in cases {
            let (buf, width) = datum.fixed_le_bytes().unwrap();
            assert_eq!(width, ty.value_width());
            assert_eq!(Datum::from_fixed_le_bytes(ty, &buf[..width]), datum);
        }
    }

    #[test]
    fn test_null_and_bytes_have_no_fixed_image() {
        assert!(Datum::Null.fixed_le_bytes().is_none());
        assert!(Datum::Bytes(vec![1, 2]).fixed_le_bytes().is_none());
    }
}
