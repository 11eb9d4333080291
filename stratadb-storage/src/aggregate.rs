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

//! Row-level aggregation
//!
//! In-place merge of a freshly encoded probe row (`src`, buffer arena) into
//! an existing row (`dst_row`, table arena):
//!
//! - [`agg_update_row`]: each value column applies its own aggregation kind
//!   (`Aggregate` model, and `Unique` without a sequence column where every
//!   value column is `Replace`).
//! - [`agg_update_row_with_sequence`]: `Unique` with a sequence column.
//!   The probe overwrites every value column iff its sequence value is
//!   `>=` the incumbent's, so ties resolve to the last arrival.
//! - [`agg_finalize_row`]: converts aggregate-state cells into their
//!   serialized wire form before a row leaves the memtable. Idempotent:
//!   finalized cells (`len != 0`) are skipped.
//!
//! Side allocations (replaced var-len payloads, serialized states) go into
//! the table arena passed explicitly by the caller.

use std::cmp::Ordering;

use byteorder::{ByteOrder, LittleEndian};
use stratadb_core::{AggregationKind, ColumnType, Result, Schema};

use crate::agg_pool::AggObjectPool;
use crate::arena::RowArena;
use crate::comparator::compare_cell;
use crate::row::RowView;

/// Merge `src` into the existing row column-wise by aggregation kind.
pub fn agg_update_row(
    schema: &Schema,
    arena: &mut RowArena,
    durable: &mut AggObjectPool,
    dst_row: u32,
    src: &RowView<'_>,
    src_pool: &AggObjectPool,
) -> Result<()> {
    for idx in schema.num_key_columns()..schema.num_columns() {
        update_cell(schema, arena, durable, dst_row, idx, src, src_pool)?;
    }
    Ok(())
}

/// Sequence-gated overwrite: when `src`'s sequence cell is `>=` the
/// incumbent's, every value column (the sequence column included) is
/// replaced from `src`; otherwise the row is left untouched.
pub fn agg_update_row_with_sequence(
    schema: &Schema,
    arena: &mut RowArena,
    durable: &mut AggObjectPool,
    dst_row: u32,
    src: &RowView<'_>,
    src_pool: &AggObjectPool,
    seq_idx: usize,
) -> Result<()> {
    let src_wins = {
        let dst = RowView::new(schema, &*arena, dst_row);
        compare_cell(schema, seq_idx, src, &dst) != Ordering::Less
    };
    if !src_wins {
        return Ok(());
    }
    for idx in schema.num_key_columns()..schema.num_columns() {
        replace_cell(schema, arena, durable, dst_row, idx, src, src_pool)?;
    }
    Ok(())
}

/// Rewrite every non-finalized aggregate-state cell into its serialized
/// `(offset, len)` form, allocating the payload from the row's arena.
pub fn agg_finalize_row(
    schema: &Schema,
    arena: &mut RowArena,
    durable: &AggObjectPool,
    row: u32,
) -> Result<()> {
    for idx in 0..schema.num_columns() {
        if !schema.column(idx).ty.is_aggregate_state() {
            continue;
        }
        let handle = {
            let view = RowView::new(schema, &*arena, row);
            if view.is_null(idx) || view.is_agg_finalized(idx) {
                continue;
            }
            view.agg_handle(idx)
        };
        let bytes = durable.get(handle).serialize();
        let cell = row + schema.cell_offset(idx) as u32;
        let off = arena.allocate_copy(&bytes)?;
        arena.write_u32(cell + 1, off);
        arena.write_u32(cell + 5, bytes.len() as u32);
    }
    Ok(())
}

fn update_cell(
    schema: &Schema,
    arena: &mut RowArena,
    durable: &mut AggObjectPool,
    dst_row: u32,
    idx: usize,
    src: &RowView<'_>,
    src_pool: &AggObjectPool,
) -> Result<()> {
    let col = schema.column(idx);
    let cell = dst_row + schema.cell_offset(idx) as u32;
    match col.agg {
        AggregationKind::None => Ok(()),

        AggregationKind::Sum => {
            if src.is_null(idx) {
                return Ok(());
            }
            let width = col.ty.value_width();
            let mut out = [0u8; 8];
            {
                let dst = RowView::new(schema, &*arena, dst_row);
                if dst.is_null(idx) {
                    out[..width].copy_from_slice(src.fixed_value(idx));
                } else {
                    sum_fixed(col.ty, dst.fixed_value(idx), src.fixed_value(idx), &mut out);
                }
            }
            arena.write_u8(cell, 0);
            arena.write_bytes(cell + 1, &out[..width]);
            Ok(())
        }

        AggregationKind::Min | AggregationKind::Max => {
            if src.is_null(idx) {
                return Ok(());
            }
            let take_src = {
                let dst = RowView::new(schema, &*arena, dst_row);
                if dst.is_null(idx) {
                    true
                } else {
                    let ord = compare_cell(schema, idx, src, &dst);
                    match col.agg {
                        AggregationKind::Min => ord == Ordering::Less,
                        _ => ord == Ordering::Greater,
                    }
                }
            };
            if take_src {
                replace_cell(schema, arena, durable, dst_row, idx, src, src_pool)?;
            }
            Ok(())
        }

        AggregationKind::Replace => {
            replace_cell(schema, arena, durable, dst_row, idx, src, src_pool)
        }

        AggregationKind::HllUnion | AggregationKind::BitmapUnion => {
            if src.is_null(idx) {
                return Ok(());
            }
            let src_handle = src.agg_handle(idx);
            let dst_state = {
                let dst = RowView::new(schema, &*arena, dst_row);
                if dst.is_null(idx) {
                    None
                } else {
                    Some(dst.agg_handle(idx))
                }
            };
            match dst_state {
                Some(dst_handle) => durable.get_mut(dst_handle).merge(src_pool.get(src_handle)),
                None => {
                    let handle = durable.add(src_pool.get(src_handle).clone());
                    arena.write_u8(cell, 0);
                    arena.write_u32(cell + 1, handle);
                    arena.write_u32(cell + 5, 0);
                    Ok(())
                }
            }
        }
    }
}

/// Overwrite one cell from `src`, nullness included.
fn replace_cell(
    schema: &Schema,
    arena: &mut RowArena,
    durable: &mut AggObjectPool,
    dst_row: u32,
    idx: usize,
    src: &RowView<'_>,
    src_pool: &AggObjectPool,
) -> Result<()> {
    let cell = dst_row + schema.cell_offset(idx) as u32;
    if src.is_null(idx) {
        arena.write_u8(cell, 1);
        return Ok(());
    }
    match schema.column(idx).ty {
        ColumnType::Varchar => {
            let payload = src.var_bytes(idx);
            let len = payload.len() as u32;
            let off = arena.allocate_copy(payload)?;
            arena.write_u8(cell, 0);
            arena.write_u32(cell + 1, off);
            arena.write_u32(cell + 5, len);
            Ok(())
        }
        ColumnType::Hll | ColumnType::Bitmap => {
            let src_handle = src.agg_handle(idx);
            let dst_handle = {
                let dst = RowView::new(schema, &*arena, dst_row);
                if dst.is_null(idx) {
                    None
                } else {
                    Some(dst.agg_handle(idx))
                }
            };
            match dst_handle {
                Some(handle) => {
                    *durable.get_mut(handle) = src_pool.get(src_handle).clone();
                }
                None => {
                    let handle = durable.add(src_pool.get(src_handle).clone());
                    arena.write_u8(cell, 0);
                    arena.write_u32(cell + 1, handle);
                    arena.write_u32(cell + 5, 0);
                }
            }
            Ok(())
        }
        _ => {
            arena.write_u8(cell, 0);
            let value = src.fixed_value(idx);
            arena.write_bytes(cell + 1, value);
            Ok(())
        }
    }
}

/// Little-endian fixed-width addition; integers wrap on overflow.
fn sum_fixed(ty: ColumnType, a: &[u8], b: &[u8], out: &mut [u8; 8]) {
    match ty {
        ColumnType::Int8 | ColumnType::UInt8 => out[0] = a[0].wrapping_add(b[0]),
        ColumnType::Int16 | ColumnType::UInt16 => {
            let sum = LittleEndian::read_u16(a).wrapping_add(LittleEndian::read_u16(b));
            LittleEndian::write_u16(&mut out[..2], sum);
        }
        ColumnType::Int32 | ColumnType::UInt32 => {
            let sum = LittleEndian::read_u32(a).wrapping_add(LittleEndian::read_u32(b));
            LittleEndian::write_u32(&mut out[..4], sum);
        }
        ColumnType::Int64 | ColumnType::UInt64 => {
            let sum = LittleEndian::read_u64(a).wrapping_add(LittleEndian::read_u64(b));
            LittleEndian::write_u64(&mut out[..8], sum);
        }
        ColumnType::Float32 => {
            let sum = f32::from_le_bytes([a[0], a[1], a[2], a[3]])
                + f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            out[..4].copy_from_slice(&sum.to_le_bytes());
        }
        ColumnType::Float64 => {
            let mut ba = [0u8; 8];
            let mut bb = [0u8; 8];
            ba.copy_from_slice(a);
            bb.copy_from_slice(b);
            let sum = f64::from_le_bytes(ba) + f64::from_le_bytes(bb);
            out.copy_from_slice(&sum.to_le_bytes());
        }
        ColumnType::Varchar | ColumnType::Hll | ColumnType::Bitmap => {
            unreachable!("sum applies to numeric columns only")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemTracker;
    use crate::row::encode_tuple;
    use crate::sketches::BitmapState;
    use std::sync::Arc;
    use stratadb_core::{Datum, SchemaBuilder, TupleBuilder, TupleDescriptor, TupleRef};

    struct Fixture {
        schema: Arc<Schema>,
        table: RowArena,
        buffer: RowArena,
        durable: AggObjectPool,
        scratch: AggObjectPool,
        dst_row: u32,
    }

    impl Fixture {
        fn new(schema: Schema, first: &[Datum]) -> Self {
            let schema = Arc::new(schema);
            let mut table = RowArena::new(MemTracker::root("table", None));
            let buffer = RowArena::new(MemTracker::root("buffer", None));
            let mut durable = AggObjectPool::new();
            let dst_row = table.allocate(schema.row_width()).unwrap();
            let desc = TupleDescriptor::for_schema(&schema);
            let buf = TupleBuilder::row(&desc, first).unwrap();
            let tuple = TupleRef::new(&desc, &buf).unwrap();
            encode_tuple(&schema, &tuple, &mut table, dst_row, &mut durable).unwrap();
            Self {
                schema,
                table,
                buffer,
                durable,
                scratch: AggObjectPool::new(),
                dst_row,
            }
        }

        fn probe(&mut self, values: &[Datum]) -> u32 {
            self.buffer.reset();
            self.scratch.reset();
            let desc = TupleDescriptor::for_schema(&self.schema);
            let buf = TupleBuilder::row(&desc, values).unwrap();
            let tuple = TupleRef::new(&desc, &buf).unwrap();
            let off = self.buffer.allocate(self.schema.row_width()).unwrap();
            encode_tuple(&self.schema, &tuple, &mut self.buffer, off, &mut self.scratch).unwrap();
            off
        }

        fn update(&mut self, values: &[Datum]) {
            let off = self.probe(values);
            let src = RowView::new(&self.schema, &self.buffer, off);
            agg_update_row(
                &self.schema,
                &mut self.table,
                &mut self.durable,
                self.dst_row,
                &src,
                &self.scratch,
            )
            .unwrap();
        }

        fn update_with_seq(&mut self, values: &[Datum], seq_idx: usize) {
            let off = self.probe(values);
            let src = RowView::new(&self.schema, &self.buffer, off);
            agg_update_row_with_sequence(
                &self.schema,
                &mut self.table,
                &mut self.durable,
                self.dst_row,
                &src,
                &self.scratch,
                seq_idx,
            )
            .unwrap();
        }

        fn dst(&self, idx: usize) -> Datum {
            RowView::new(&self.schema, &self.table, self.dst_row).datum(idx)
        }
    }

    #[test]
    fn test_sum_min_max() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("s", ColumnType::Int64, AggregationKind::Sum)
            .value("lo", ColumnType::Int32, AggregationKind::Min)
            .value("hi", ColumnType::Int32, AggregationKind::Max)
            .build()
            .unwrap();
        let mut fx = Fixture::new(
            schema,
            &[Datum::Int32(1), Datum::Int64(5), Datum::Int32(5), Datum::Int32(5)],
        );
        fx.update(&[Datum::Int32(1), Datum::Int64(3), Datum::Int32(3), Datum::Int32(9)]);
        fx.update(&[Datum::Int32(1), Datum::Int64(7), Datum::Int32(7), Datum::Int32(6)]);

        assert_eq!(fx.dst(1), Datum::Int64(15));
        assert_eq!(fx.dst(2), Datum::Int32(3));
        assert_eq!(fx.dst(3), Datum::Int32(9));
    }

    #[test]
    fn test_sum_treats_null_as_absent() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("s", ColumnType::Int32, AggregationKind::Sum)
            .build()
            .unwrap();
        let mut fx = Fixture::new(schema, &[Datum::Int32(1), Datum::Null]);
        fx.update(&[Datum::Int32(1), Datum::Null]);
        assert_eq!(fx.dst(1), Datum::Null);
        fx.update(&[Datum::Int32(1), Datum::Int32(4)]);
        assert_eq!(fx.dst(1), Datum::Int32(4));
        fx.update(&[Datum::Int32(1), Datum::Int32(2)]);
        assert_eq!(fx.dst(1), Datum::Int32(6));
    }

    #[test]
    fn test_replace_varchar_reallocates_payload() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("s", ColumnType::Varchar, AggregationKind::Replace)
            .build()
            .unwrap();
        let mut fx = Fixture::new(schema, &[Datum::Int32(1), Datum::Bytes(b"old".to_vec())]);
        fx.update(&[Datum::Int32(1), Datum::Bytes(b"a much longer payload".to_vec())]);
        // The probe and its payload are gone after the insert returns.
        fx.buffer.reset();
        assert_eq!(fx.dst(1), Datum::Bytes(b"a much longer payload".to_vec()));

        fx.update(&[Datum::Int32(1), Datum::Null]);
        assert_eq!(fx.dst(1), Datum::Null);
    }

    #[test]
    fn test_bitmap_union_merges_states() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("b", ColumnType::Bitmap, AggregationKind::BitmapUnion)
            .build()
            .unwrap();
        let mut first = BitmapState::new();
        first.insert(1);
        let mut fx = Fixture::new(schema, &[Datum::Int32(1), Datum::Bytes(first.to_bytes())]);

        let mut second = BitmapState::new();
        second.insert(2);
        second.insert(3);
        fx.update(&[Datum::Int32(1), Datum::Bytes(second.to_bytes())]);

        agg_finalize_row(&fx.schema, &mut fx.table, &fx.durable, fx.dst_row).unwrap();
        let decoded = match fx.dst(1) {
            Datum::Bytes(bytes) => BitmapState::from_bytes(&bytes).unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(decoded.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_sequence_update_keeps_larger_and_last_tie() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int32, AggregationKind::Replace)
            .value("seq", ColumnType::Int32, AggregationKind::Replace)
            .sequence_column("seq")
            .build()
            .unwrap();
        let seq_idx = schema.sequence_col().unwrap();
        let mut fx = Fixture::new(
            schema,
            &[Datum::Int32(1), Datum::Int32(100), Datum::Int32(5)],
        );

        // Smaller sequence: ignored.
        fx.update_with_seq(&[Datum::Int32(1), Datum::Int32(200), Datum::Int32(3)], seq_idx);
        assert_eq!(fx.dst(1), Datum::Int32(100));
        assert_eq!(fx.dst(2), Datum::Int32(5));

        // Larger sequence: wins.
        fx.update_with_seq(&[Datum::Int32(1), Datum::Int32(150), Datum::Int32(7)], seq_idx);
        assert_eq!(fx.dst(1), Datum::Int32(150));

        // Equal sequence: last arrival wins.
        fx.update_with_seq(&[Datum::Int32(1), Datum::Int32(999), Datum::Int32(7)], seq_idx);
        assert_eq!(fx.dst(1), Datum::Int32(999));
        assert_eq!(fx.dst(2), Datum::Int32(7));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("b", ColumnType::Bitmap, AggregationKind::BitmapUnion)
            .build()
            .unwrap();
        let mut state = BitmapState::new();
        state.insert(9);
        let mut fx = Fixture::new(schema, &[Datum::Int32(1), Datum::Bytes(state.to_bytes())]);

        agg_finalize_row(&fx.schema, &mut fx.table, &fx.durable, fx.dst_row).unwrap();
        let first = fx.dst(1);
        agg_finalize_row(&fx.schema, &mut fx.table, &fx.durable, fx.dst_row).unwrap();
        assert_eq!(fx.dst(1), first);
    }
}
