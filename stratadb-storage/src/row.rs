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

//! Row codec
//!
//! Translates between the three row representations on the write path:
//!
//! 1. **Input tuple** (upstream buffer, never retained), consumed by
//!    [`encode_tuple`] into
//! 2. **Encoded row** (cells in an arena; var-len payloads out-of-band in
//!    the *same* arena, aggregate state by pool handle), relocated across
//!    arenas by [`copy_row`] on the new-key path, and read through
//! 3. [`RowView`], a cheap `(schema, arena, offset)` cursor used by the
//!    comparator, the aggregator and the row-set writer.
//!
//! Cell layout is fixed by [`Schema`]; see its module docs.

use stratadb_core::{ColumnType, Datum, Result, Schema, TupleRef};

use crate::agg_pool::{AggObjectPool, AggState};
use crate::arena::RowArena;

/// Borrowed cursor over one encoded row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a Schema,
    arena: &'a RowArena,
    off: u32,
}

impl<'a> RowView<'a> {
    #[inline]
    pub fn new(schema: &'a Schema, arena: &'a RowArena, off: u32) -> Self {
        Self { schema, arena, off }
    }

    #[inline]
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.off
    }

    /// Absolute arena offset of column `idx`'s cell.
    #[inline]
    pub fn cell(&self, idx: usize) -> u32 {
        self.off + self.schema.cell_offset(idx) as u32
    }

    #[inline]
    pub fn is_null(&self, idx: usize) -> bool {
        self.arena.read_u8(self.cell(idx)) != 0
    }

    /// Value bytes of a fixed-width cell.
    #[inline]
    pub fn fixed_value(&self, idx: usize) -> &'a [u8] {
        let width = self.schema.column(idx).ty.value_width();
        self.arena.slice(self.cell(idx) + 1, width)
    }

    /// The `(offset-or-handle, len)` pair of an indirect cell.
    #[inline]
    pub fn indirect_parts(&self, idx: usize) -> (u32, u32) {
        let cell = self.cell(idx);
        (self.arena.read_u32(cell + 1), self.arena.read_u32(cell + 5))
    }

    /// Payload of a var-len cell (or a finalized aggregate-state cell).
    pub fn var_bytes(&self, idx: usize) -> &'a [u8] {
        let (off, len) = self.indirect_parts(idx);
        if len == 0 {
            return &[];
        }
        self.arena.slice(off, len as usize)
    }

    /// Pool handle of a non-finalized aggregate-state cell.
    #[inline]
    pub fn agg_handle(&self, idx: usize) -> u32 {
        debug_assert!(self.schema.column(idx).ty.is_aggregate_state());
        debug_assert!(!self.is_agg_finalized(idx));
        self.indirect_parts(idx).0
    }

    /// Aggregate-state cells carry `len == 0` until finalize rewrites them
    /// into serialized `(offset, len)` form.
    #[inline]
    pub fn is_agg_finalized(&self, idx: usize) -> bool {
        self.indirect_parts(idx).1 != 0
    }

    /// The fixed row block.
    #[inline]
    pub fn raw(&self) -> &'a [u8] {
        self.arena.slice(self.off, self.schema.row_width())
    }

    /// Decode one cell. Aggregate-state cells must be finalized first.
    pub fn datum(&self, idx: usize) -> Datum {
        if self.is_null(idx) {
            return Datum::Null;
        }
        let ty = self.schema.column(idx).ty;
        match ty {
            ColumnType::Varchar => Datum::Bytes(self.var_bytes(idx).to_vec()),
            ColumnType::Hll | ColumnType::Bitmap => {
                debug_assert!(self.is_agg_finalized(idx), "decoding unfinalized state");
                Datum::Bytes(self.var_bytes(idx).to_vec())
            }
            _ => Datum::from_fixed_le_bytes(ty, self.fixed_value(idx)),
        }
    }

    /// Fixed block plus every out-of-band payload currently referenced.
    pub fn encoded_size(&self) -> usize {
        let mut size = self.schema.row_width();
        for idx in 0..self.schema.num_columns() {
            let ty = self.schema.column(idx).ty;
            if (ty == ColumnType::Varchar || ty.is_aggregate_state()) && !self.is_null(idx) {
                size += self.indirect_parts(idx).1 as usize;
            }
        }
        size
    }
}

/// Encode an input tuple into the row block at `row_off`.
///
/// Var-len payloads go out-of-band into `arena` (the same arena that owns
/// the block); aggregate-state values are constructed in `agg_pool` and the
/// cell stores their handle.
pub fn encode_tuple(
    schema: &Schema,
    tuple: &TupleRef<'_>,
    arena: &mut RowArena,
    row_off: u32,
    agg_pool: &mut AggObjectPool,
) -> Result<()> {
    for idx in 0..schema.num_columns() {
        let cell = row_off + schema.cell_offset(idx) as u32;
        if tuple.is_null(idx) {
            arena.write_u8(cell, 1);
            continue;
        }
        arena.write_u8(cell, 0);
        let ty = schema.column(idx).ty;
        match ty {
            ColumnType::Varchar => {
                let payload = tuple.var_bytes(idx);
                let len = payload.len() as u32;
                let off = arena.allocate_copy(payload)?;
                arena.write_u32(cell + 1, off);
                arena.write_u32(cell + 5, len);
            }
            ColumnType::Hll | ColumnType::Bitmap => {
                let state = AggState::from_serialized(ty, tuple.var_bytes(idx))?;
                let handle = agg_pool.add(state);
                arena.write_u32(cell + 1, handle);
                arena.write_u32(cell + 5, 0);
            }
            _ => {
                arena.write_bytes(cell + 1, tuple.fixed_bytes(idx));
            }
        }
    }
    Ok(())
}

/// Relocate an encoded row into another arena (buffer → table on the
/// new-key path).
///
/// Var-len payloads are deep-copied into `dst`; aggregate-state handles are
/// rebased by `agg_base`, the offset returned by the durable pool's
/// `acquire_from`.
pub fn copy_row(
    schema: &Schema,
    src: &RowView<'_>,
    dst: &mut RowArena,
    dst_off: u32,
    agg_base: u32,
) -> Result<()> {
    dst.write_bytes(dst_off, src.raw());
    for idx in 0..schema.num_columns() {
        if src.is_null(idx) {
            continue;
        }
        let cell = dst_off + schema.cell_offset(idx) as u32;
        match schema.column(idx).ty {
            ColumnType::Varchar => {
                let payload = src.var_bytes(idx);
                let len = payload.len() as u32;
                let off = dst.allocate_copy(payload)?;
                dst.write_u32(cell + 1, off);
                dst.write_u32(cell + 5, len);
            }
            ColumnType::Hll | ColumnType::Bitmap => {
                debug_assert!(!src.is_agg_finalized(idx));
                let handle = src.indirect_parts(idx).0 + agg_base;
                dst.write_u32(cell + 1, handle);
            }
            _ => {}
        }
    }
    Ok(())
}
