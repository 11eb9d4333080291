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

//! Key comparators
//!
//! A comparator is a pure, total, three-way order over encoded rows; one
//! instance is owned per memtable and never shared across threads.
//!
//! - **Lexicographic**: key columns in schema order, per-type ordering,
//!   nulls sort low.
//! - **Z-order**: the first `sort_col_num` key columns are mapped to
//!   order-preserving left-aligned 64-bit images and compared in bit
//!   interleaving order (first column's bit wins at each rank). Ties fall
//!   back to full lexicographic comparison, which also absorbs the rare
//!   image collisions (null vs. minimum value), keeping the order total.
//!
//! The interleaved comparison never materializes the Z-value: it finds the
//! dimension holding the most significant differing bit and compares that
//! dimension directly.

use std::cmp::Ordering;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use smallvec::SmallVec;
use stratadb_core::{ColumnType, Result, Schema, SortSpec, StrataError};

use crate::row::RowView;

/// Total order over encoded rows, selected by the tablet's sort spec.
#[derive(Debug)]
pub enum KeyComparator {
    Lexicographic(LexicographicComparator),
    ZOrder(ZOrderComparator),
}

impl KeyComparator {
    pub fn for_schema(schema: Arc<Schema>, sort: SortSpec) -> Result<Self> {
        match sort {
            SortSpec::Lexicographic => {
                Ok(KeyComparator::Lexicographic(LexicographicComparator { schema }))
            }
            SortSpec::ZOrder { sort_col_num } => {
                if sort_col_num == 0 || sort_col_num > schema.num_key_columns() {
                    return Err(StrataError::InvalidArgument(format!(
                        "z-order over {sort_col_num} columns, schema has {} key columns",
                        schema.num_key_columns()
                    )));
                }
                for idx in 0..sort_col_num {
                    let col = schema.column(idx);
                    if !col.ty.is_zorder_capable() {
                        return Err(StrataError::InvalidArgument(format!(
                            "column '{}' of type {:?} cannot be z-order encoded",
                            col.name, col.ty
                        )));
                    }
                }
                Ok(KeyComparator::ZOrder(ZOrderComparator {
                    schema,
                    sort_col_num,
                }))
            }
        }
    }

    #[inline]
    pub fn compare(&self, a: &RowView<'_>, b: &RowView<'_>) -> Ordering {
        match self {
            KeyComparator::Lexicographic(c) => c.compare(a, b),
            KeyComparator::ZOrder(c) => c.compare(a, b),
        }
    }
}

#[derive(Debug)]
pub struct LexicographicComparator {
    schema: Arc<Schema>,
}

impl LexicographicComparator {
    fn compare(&self, a: &RowView<'_>, b: &RowView<'_>) -> Ordering {
        compare_key_columns(&self.schema, a, b)
    }
}

#[derive(Debug)]
pub struct ZOrderComparator {
    schema: Arc<Schema>,
    sort_col_num: usize,
}

impl ZOrderComparator {
    fn compare(&self, a: &RowView<'_>, b: &RowView<'_>) -> Ordering {
        let mut za: SmallVec<[u64; 8]> = SmallVec::new();
        let mut zb: SmallVec<[u64; 8]> = SmallVec::new();
        for idx in 0..self.sort_col_num {
            let ty = self.schema.column(idx).ty;
            za.push(z_image(a, idx, ty));
            zb.push(z_image(b, idx, ty));
        }

        // Dimension owning the most significant differing bit; earlier
        // dimensions win rank ties, matching the interleave schedule.
        let mut msd: Option<usize> = None;
        let mut best = 0u64;
        for idx in 0..self.sort_col_num {
            let x = za[idx] ^ zb[idx];
            if less_msb(best, x) {
                best = x;
                msd = Some(idx);
            }
        }
        match msd {
            Some(idx) => za[idx].cmp(&zb[idx]),
            None => compare_key_columns(&self.schema, a, b),
        }
    }
}

/// True when the most significant set bit of `y` outranks `x`'s.
#[inline]
fn less_msb(x: u64, y: u64) -> bool {
    x < y && x < (x ^ y)
}

/// Order-preserving left-aligned 64-bit image of a sort column value.
/// Null maps to the all-zero image (sorts low; collisions are resolved by
/// the lexicographic fallback).
fn z_image(view: &RowView<'_>, idx: usize, ty: ColumnType) -> u64 {
    if view.is_null(idx) {
        return 0;
    }
    let bytes = view.fixed_value(idx);
    match ty {
        ColumnType::UInt8 => u64::from(bytes[0]) << 56,
        ColumnType::UInt16 => u64::from(LittleEndian::read_u16(bytes)) << 48,
        ColumnType::UInt32 => u64::from(LittleEndian::read_u32(bytes)) << 32,
        ColumnType::UInt64 => LittleEndian::read_u64(bytes),
        ColumnType::Int8 => u64::from(bytes[0] ^ 0x80) << 56,
        ColumnType::Int16 => u64::from(LittleEndian::read_u16(bytes) ^ 0x8000) << 48,
        ColumnType::Int32 => u64::from(LittleEndian::read_u32(bytes) ^ 0x8000_0000) << 32,
        ColumnType::Int64 => LittleEndian::read_u64(bytes) ^ (1 << 63),
        ColumnType::Float32 => {
            u64::from(f32_order_bits(f32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))) << 32
        }
        ColumnType::Float64 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(bytes);
            f64_order_bits(f64::from_le_bytes(b))
        }
        ColumnType::Varchar | ColumnType::Hll | ColumnType::Bitmap => {
            unreachable!("validated as z-order capable")
        }
    }
}

#[inline]
fn f32_order_bits(v: f32) -> u32 {
    let b = v.to_bits();
    if b & (1 << 31) != 0 {
        !b
    } else {
        b | (1 << 31)
    }
}

#[inline]
fn f64_order_bits(v: f64) -> u64 {
    let b = v.to_bits();
    if b & (1 << 63) != 0 {
        !b
    } else {
        b | (1 << 63)
    }
}

/// Lexicographic comparison over all key columns, nulls low.
pub(crate) fn compare_key_columns(
    schema: &Schema,
    a: &RowView<'_>,
    b: &RowView<'_>,
) -> Ordering {
    for idx in 0..schema.num_key_columns() {
        let ord = compare_cell(schema, idx, a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Three-way comparison of one cell across two rows, nulls low.
pub(crate) fn compare_cell(
    schema: &Schema,
    idx: usize,
    a: &RowView<'_>,
    b: &RowView<'_>,
) -> Ordering {
    match (a.is_null(idx), b.is_null(idx)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let ty = schema.column(idx).ty;
    match ty {
        ColumnType::Varchar => a.var_bytes(idx).cmp(b.var_bytes(idx)),
        ColumnType::Hll | ColumnType::Bitmap => {
            debug_assert!(false, "aggregate state cells are not comparable");
            Ordering::Equal
        }
        _ => compare_fixed(ty, a.fixed_value(idx), b.fixed_value(idx)),
    }
}

fn compare_fixed(ty: ColumnType, a: &[u8], b: &[u8]) -> Ordering {
    match ty {
        ColumnType::Int8 => (a[0] as i8).cmp(&(b[0] as i8)),
        ColumnType::Int16 => {
            (LittleEndian::read_u16(a) as i16).cmp(&(LittleEndian::read_u16(b) as i16))
        }
        ColumnType::Int32 => {
            (LittleEndian::read_u32(a) as i32).cmp(&(LittleEndian::read_u32(b) as i32))
        }
        ColumnType::Int64 => {
            (LittleEndian::read_u64(a) as i64).cmp(&(LittleEndian::read_u64(b) as i64))
        }
        ColumnType::UInt8 => a[0].cmp(&b[0]),
        ColumnType::UInt16 => LittleEndian::read_u16(a).cmp(&LittleEndian::read_u16(b)),
        ColumnType::UInt32 => LittleEndian::read_u32(a).cmp(&LittleEndian::read_u32(b)),
        ColumnType::UInt64 => LittleEndian::read_u64(a).cmp(&LittleEndian::read_u64(b)),
        ColumnType::Float32 => {
            let fa = f32::from_le_bytes([a[0], a[1], a[2], a[3]]);
            let fb = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            fa.total_cmp(&fb)
        }
        ColumnType::Float64 => {
            let mut ba = [0u8; 8];
            let mut bb = [0u8; 8];
            ba.copy_from_slice(a);
            bb.copy_from_slice(b);
            f64::from_le_bytes(ba).total_cmp(&f64::from_le_bytes(bb))
        }
        ColumnType::Varchar | ColumnType::Hll | ColumnType::Bitmap => {
            unreachable!("indirect cells handled by the caller")
        }
    }
}
