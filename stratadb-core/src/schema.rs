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

//! Tablet schema model
//!
//! A tablet schema is an ordered list of columns where the first
//! `num_key_columns` form the sort key. The schema fixes the encoded row
//! layout used throughout the write path: one cell per column, each cell a
//! null byte followed by a fixed-width value slot. Variable-length and
//! aggregate-state cells store `(u32, u32)` indirections resolved against
//! the arena that owns the row.
//!
//! ## Cell layout
//!
//! ```text
//! ┌──────┬─────────────────────────────┐
//! │ null │ value slot (type-dependent) │
//! │ 1 B  │ 1..8 B                      │
//! └──────┴─────────────────────────────┘
//! Varchar slot:  offset: u32, len: u32      (payload in owning arena)
//! Hll/Bitmap:    handle: u32, len: u32      (len == 0 until finalized;
//!                                            finalize rewrites to offset/len)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Column value types understood by the row codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Varchar,
    /// HyperLogLog aggregate state.
    Hll,
    /// Bitmap aggregate state.
    Bitmap,
}

impl ColumnType {
    /// Width of the value slot inside a cell (excluding the null byte).
    #[inline]
    pub fn value_width(self) -> usize {
        match self {
            ColumnType::Int8 | ColumnType::UInt8 => 1,
            ColumnType::Int16 | ColumnType::UInt16 => 2,
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Float32 => 4,
            ColumnType::Int64 | ColumnType::UInt64 | ColumnType::Float64 => 8,
            // (offset, len) / (handle, len) indirections
            ColumnType::Varchar | ColumnType::Hll | ColumnType::Bitmap => 8,
        }
    }

    /// Cell width: null byte plus value slot.
    #[inline]
    pub fn cell_width(self) -> usize {
        1 + self.value_width()
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Int8
                | ColumnType::Int16
                | ColumnType::Int32
                | ColumnType::Int64
                | ColumnType::UInt8
                | ColumnType::UInt16
                | ColumnType::UInt32
                | ColumnType::UInt64
        )
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    /// True for columns whose cells hold handles into the aggregate object
    /// pool until finalized.
    #[inline]
    pub fn is_aggregate_state(self) -> bool {
        matches!(self, ColumnType::Hll | ColumnType::Bitmap)
    }

    /// Types that can participate in the sort key.
    #[inline]
    pub fn is_key_capable(self) -> bool {
        !self.is_aggregate_state()
    }

    /// Types whose bit image can be interleaved by the Z-order comparator.
    #[inline]
    pub fn is_zorder_capable(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

/// Per-column merge function applied when equal-key rows meet under the
/// `Aggregate` or `Unique` key models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationKind {
    /// No merge function. Key columns, and all columns under `Duplicate`.
    None,
    Sum,
    Min,
    Max,
    /// Last write wins.
    Replace,
    HllUnion,
    BitmapUnion,
}

impl AggregationKind {
    fn accepts(self, ty: ColumnType) -> bool {
        match self {
            AggregationKind::None | AggregationKind::Replace => !ty.is_aggregate_state(),
            AggregationKind::Sum => ty.is_integer() || ty.is_float(),
            AggregationKind::Min | AggregationKind::Max => !ty.is_aggregate_state(),
            AggregationKind::HllUnion => ty == ColumnType::Hll,
            AggregationKind::BitmapUnion => ty == ColumnType::Bitmap,
        }
    }
}

/// How equal-key rows combine inside one memtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyModel {
    /// Keep every row; iteration is stable among equal keys.
    Duplicate,
    /// Merge equal-key rows column-wise by each column's aggregation kind.
    Aggregate,
    /// Replace: latest arrival wins, or the largest sequence-column value
    /// when the schema carries one.
    Unique,
}

/// Sort discipline over the key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortSpec {
    Lexicographic,
    /// Interleave the bit images of the first `sort_col_num` key columns;
    /// ties fall back to lexicographic order.
    ZOrder { sort_col_num: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
    pub agg: AggregationKind,
    pub is_key: bool,
    pub nullable: bool,
}

/// Immutable tablet schema with the precomputed encoded-row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
    sequence_col: Option<usize>,
    cell_offsets: Vec<usize>,
    row_width: usize,
}

impl Schema {
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    #[inline]
    pub fn column(&self, idx: usize) -> &ColumnSchema {
        &self.columns[idx]
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Byte offset of column `idx`'s cell inside the encoded row block.
    #[inline]
    pub fn cell_offset(&self, idx: usize) -> usize {
        self.cell_offsets[idx]
    }

    /// Total width of the fixed encoded row block.
    #[inline]
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Index of the sequence column, if the schema carries one.
    #[inline]
    pub fn sequence_col(&self) -> Option<usize> {
        self.sequence_col
    }

    /// True if any column stores aggregate state.
    pub fn has_aggregate_state(&self) -> bool {
        self.columns.iter().any(|c| c.ty.is_aggregate_state())
    }
}

/// Builder for [`Schema`]. Key columns must be declared before value columns.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
    sequence_col_name: Option<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key column. Key columns carry no aggregation.
    pub fn key(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            ty,
            agg: AggregationKind::None,
            is_key: true,
            nullable: true,
        });
        self.num_key_columns += 1;
        self
    }

    /// Append a value column with its merge function.
    pub fn value(mut self, name: impl Into<String>, ty: ColumnType, agg: AggregationKind) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            ty,
            agg,
            is_key: false,
            nullable: true,
        });
        self
    }

    /// Mark a previously declared value column as the sequence column.
    pub fn sequence_column(mut self, name: impl Into<String>) -> Self {
        self.sequence_col_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Schema> {
        if self.num_key_columns == 0 {
            return Err(StrataError::InvalidArgument(
                "schema requires at least one key column".into(),
            ));
        }
        // Key columns must form a prefix of the column list.
        for (idx, col) in self.columns.iter().enumerate() {
            if col.is_key != (idx < self.num_key_columns) {
                return Err(StrataError::InvalidArgument(format!(
                    "key column '{}' declared after a value column",
                    col.name
                )));
            }
            if col.is_key && !col.ty.is_key_capable() {
                return Err(StrataError::InvalidArgument(format!(
                    "column '{}' cannot participate in the sort key",
                    col.name
                )));
            }
            if !col.agg.accepts(col.ty) {
                return Err(StrataError::InvalidArgument(format!(
                    "aggregation {:?} does not apply to column '{}' of type {:?}",
                    col.agg, col.name, col.ty
                )));
            }
        }

        let sequence_col = match &self.sequence_col_name {
            None => None,
            Some(name) => {
                let idx = self
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| {
                        StrataError::InvalidArgument(format!("unknown sequence column '{name}'"))
                    })?;
                let col = &self.columns[idx];
                if col.is_key || !col.ty.is_integer() {
                    return Err(StrataError::InvalidArgument(format!(
                        "sequence column '{name}' must be a non-key integer column"
                    )));
                }
                Some(idx)
            }
        };

        let mut cell_offsets = Vec::with_capacity(self.columns.len());
        let mut offset = 0usize;
        for col in &self.columns {
            cell_offsets.push(offset);
            offset += col.ty.cell_width();
        }

        Ok(Schema {
            columns: self.columns,
            num_key_columns: self.num_key_columns,
            sequence_col,
            cell_offsets,
            row_width: offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_layout() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int64, AggregationKind::Sum)
            .value("s", ColumnType::Varchar, AggregationKind::Replace)
            .build()
            .unwrap();

        assert_eq!(schema.num_columns(), 3);
        assert_eq!(schema.num_key_columns(), 1);
        assert_eq!(schema.cell_offset(0), 0);
        assert_eq!(schema.cell_offset(1), 5);
        assert_eq!(schema.cell_offset(2), 14);
        assert_eq!(schema.row_width(), 23);
    }

    #[test]
    fn test_key_after_value_rejected() {
        let err = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int32, AggregationKind::Sum)
            .key("k2", ColumnType::Int32)
            .build()
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_agg_type_mismatch_rejected() {
        let err = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Varchar, AggregationKind::Sum)
            .build()
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_sequence_column_resolution() {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int32, AggregationKind::Replace)
            .value("seq", ColumnType::Int64, AggregationKind::Replace)
            .sequence_column("seq")
            .build()
            .unwrap();
        assert_eq!(schema.sequence_col(), Some(2));

        let err = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int32, AggregationKind::Replace)
            .sequence_column("missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_hll_key_rejected() {
        let err = SchemaBuilder::new()
            .key("k", ColumnType::Hll)
            .build()
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }
}
