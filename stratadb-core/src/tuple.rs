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

//! Input tuple contract
//!
//! The ingest layer hands the memtable rows as *tuples*: one contiguous
//! buffer per row, described by a [`TupleDescriptor`]. Each slot exposes a
//! null bit (by bit offset) and a value (by byte offset). Variable-length
//! slots hold `(offset: u32, len: u32)` into the same buffer, with payloads
//! packed after the fixed region.
//!
//! The memtable never retains pointers into a tuple buffer beyond a single
//! `insert` call; everything it keeps is copied into its own arenas.
//!
//! ```text
//! ┌────────────┬───────────────────────────┬──────────────────┐
//! │ null bits  │ fixed slots (schema order) │ var-len payloads │
//! └────────────┴───────────────────────────┴──────────────────┘
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StrataError};
use crate::schema::Schema;
use crate::value::Datum;

/// Shape of one slot's value region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Fixed-width value of the given byte width.
    Fixed(usize),
    /// `(offset, len)` indirection to a payload inside the tuple buffer.
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDescriptor {
    /// Bit offset of the slot's null indicator.
    pub null_bit: usize,
    /// Byte offset of the slot's value region.
    pub value_offset: usize,
    pub kind: SlotKind,
}

/// Layout of a tuple buffer: derived once per schema, shared by all rows of
/// a load.
#[derive(Debug, Clone)]
pub struct TupleDescriptor {
    slots: Vec<SlotDescriptor>,
    fixed_len: usize,
}

impl TupleDescriptor {
    /// One slot per schema column, in schema order. Aggregate-state columns
    /// arrive as variable-length serialized sketches.
    pub fn for_schema(schema: &Schema) -> Self {
        let n = schema.num_columns();
        let null_bytes = (n + 7) / 8;
        let mut slots = Vec::with_capacity(n);
        let mut offset = null_bytes;
        for (idx, col) in schema.columns().iter().enumerate() {
            let kind = if col.ty.is_integer() || col.ty.is_float() {
                SlotKind::Fixed(col.ty.value_width())
            } else {
                SlotKind::Var
            };
            let width = match kind {
                SlotKind::Fixed(w) => w,
                SlotKind::Var => 8,
            };
            slots.push(SlotDescriptor {
                null_bit: idx,
                value_offset: offset,
                kind,
            });
            offset += width;
        }
        Self {
            slots,
            fixed_len: offset,
        }
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slot(&self, idx: usize) -> &SlotDescriptor {
        &self.slots[idx]
    }

    /// Length of the null-bit region plus all fixed slots.
    #[inline]
    pub fn fixed_len(&self) -> usize {
        self.fixed_len
    }
}

/// Borrowed view over one tuple buffer.
#[derive(Debug, Clone, Copy)]
pub struct TupleRef<'a> {
    desc: &'a TupleDescriptor,
    data: &'a [u8],
}

impl<'a> TupleRef<'a> {
    pub fn new(desc: &'a TupleDescriptor, data: &'a [u8]) -> Result<Self> {
        if data.len() < desc.fixed_len() {
            return Err(StrataError::InvalidArgument(format!(
                "tuple buffer of {} bytes shorter than fixed region of {}",
                data.len(),
                desc.fixed_len()
            )));
        }
        Ok(Self { desc, data })
    }

    #[inline]
    pub fn is_null(&self, slot: usize) -> bool {
        let bit = self.desc.slot(slot).null_bit;
        self.data[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Value bytes of a fixed-width slot.
    #[inline]
    pub fn fixed_bytes(&self, slot: usize) -> &'a [u8] {
        let s = self.desc.slot(slot);
        match s.kind {
            SlotKind::Fixed(w) => &self.data[s.value_offset..s.value_offset + w],
            SlotKind::Var => unreachable!("fixed_bytes on var-len slot"),
        }
    }

    /// Payload of a variable-length slot.
    #[inline]
    pub fn var_bytes(&self, slot: usize) -> &'a [u8] {
        let s = self.desc.slot(slot);
        debug_assert_eq!(s.kind, SlotKind::Var);
        let off = LittleEndian::read_u32(&self.data[s.value_offset..]) as usize;
        let len = LittleEndian::read_u32(&self.data[s.value_offset + 4..]) as usize;
        &self.data[off..off + len]
    }
}

/// Builds tuple buffers, mostly for ingestion shims and tests.
#[derive(Debug)]
pub struct TupleBuilder {
    desc: TupleDescriptor,
    fixed: Vec<u8>,
    tail: Vec<u8>,
}

impl TupleBuilder {
    pub fn new(desc: &TupleDescriptor) -> Self {
        Self {
            desc: desc.clone(),
            fixed: vec![0u8; desc.fixed_len()],
            tail: Vec::new(),
        }
    }

    pub fn set(&mut self, slot: usize, value: &Datum) -> Result<()> {
        let s = *self.desc.slot(slot);
        match value {
            Datum::Null => {
                self.fixed[s.null_bit / 8] |= 1 << (s.null_bit % 8);
                Ok(())
            }
            Datum::Bytes(payload) => match s.kind {
                SlotKind::Var => {
                    let off = (self.desc.fixed_len() + self.tail.len()) as u32;
                    LittleEndian::write_u32(&mut self.fixed[s.value_offset..], off);
                    LittleEndian::write_u32(
                        &mut self.fixed[s.value_offset + 4..],
                        payload.len() as u32,
                    );
                    self.tail.extend_from_slice(payload);
                    Ok(())
                }
                SlotKind::Fixed(_) => Err(StrataError::InvalidArgument(format!(
                    "byte payload written to fixed slot {slot}"
                ))),
            },
            fixed => {
                let (buf, width) = fixed
                    .fixed_le_bytes()
                    .expect("non-null fixed datum has an image");
                match s.kind {
                    SlotKind::Fixed(w) if w == width => {
                        self.fixed[s.value_offset..s.value_offset + w]
                            .copy_from_slice(&buf[..w]);
                        Ok(())
                    }
                    _ => Err(StrataError::InvalidArgument(format!(
                        "datum width {width} does not match slot {slot}"
                    ))),
                }
            }
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.fixed.append(&mut self.tail);
        self.fixed
    }

    /// Build a complete tuple buffer from one datum per slot.
    pub fn row(desc: &TupleDescriptor, values: &[Datum]) -> Result<Vec<u8>> {
        debug_assert_eq!(values.len(), desc.num_slots());
        let mut b = TupleBuilder::new(desc);
        for (idx, value) in values.iter().enumerate() {
            b.set(idx, value)?;
        }
        Ok(b.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AggregationKind, ColumnType, SchemaBuilder};

    fn test_schema() -> Schema {
        SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int64, AggregationKind::Sum)
            .value("name", ColumnType::Varchar, AggregationKind::Replace)
            .build()
            .unwrap()
    }

    #[test]
    fn test_tuple_round_trip() {
        let schema = test_schema();
        let desc = TupleDescriptor::for_schema(&schema);
        let buf = TupleBuilder::row(
            &desc,
            &[
                Datum::Int32(42),
                Datum::Int64(-9),
                Datum::Bytes(b"strata".to_vec()),
            ],
        )
        .unwrap();
        let tuple = TupleRef::new(&desc, &buf).unwrap();

        assert!(!tuple.is_null(0));
        assert_eq!(tuple.fixed_bytes(0), 42i32.to_le_bytes());
        assert_eq!(tuple.fixed_bytes(1), (-9i64).to_le_bytes());
        assert_eq!(tuple.var_bytes(2), b"strata");
    }

    #[test]
    fn test_null_bits() {
        let schema = test_schema();
        let desc = TupleDescriptor::for_schema(&schema);
        let buf = TupleBuilder::row(
            &desc,
            &[Datum::Int32(1), Datum::Null, Datum::Null],
        )
        .unwrap();
        let tuple = TupleRef::new(&desc, &buf).unwrap();
        assert!(!tuple.is_null(0));
        assert!(tuple.is_null(1));
        assert!(tuple.is_null(2));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let schema = test_schema();
        let desc = TupleDescriptor::for_schema(&schema);
        assert!(TupleRef::new(&desc, &[0u8; 3]).is_err());
    }
}
