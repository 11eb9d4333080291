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

//! Write-path memtable
//!
//! The in-memory, ordered, row-addressed buffer for one tablet: absorbs
//! input tuples, optionally pre-aggregates equal-key rows according to the
//! tablet's key model, and flushes the sorted result into an immutable row
//! set through the [`RowSetWriter`] seam.
//!
//! ## Write flow
//!
//! ```text
//!            insert(tuple)
//!                 │
//!        ┌────────┴─────────┐
//!        │ Duplicate        │ Aggregate / Unique
//!        ▼                  ▼
//!  encode into         encode into buffer arena (scratch)
//!  table arena              │
//!        │             find(probe) ──────────┐
//!        ▼                  │                │ not found:
//!  index.insert        found: merge in       │ copy row into table arena,
//!  (allow dups)        place (update /       │ hand scratch agg objects to
//!                      update_with_sequence) │ the durable pool, splice via
//!                                            │ insert_with_hint
//!                      reset buffer arena + scratch pool (always)
//! ```
//!
//! One memtable is owned by one writer thread; ingest parallelism comes
//! from sharding into many memtables. Nothing here blocks except the
//! row-set writer calls inside `flush`.
//!
//! ## Memory
//!
//! Two arenas with different lifetimes (scratch vs. memtable), both
//! reporting to a child tracker labeled after the tablet. The buffer
//! arena's high-water stays bounded by one encoded row because it is reset
//! unconditionally before every `insert` returns.
//!
//! ## Lifecycle
//!
//! `Open → Flushing → Closed`. `insert` is legal only while `Open`; the
//! first `flush` moves through `Flushing` to `Closed`; `close` is
//! flush-if-needed plus release of both arenas, and re-raises a previously
//! failed flush.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use stratadb_core::{AggregationKind, KeyModel, Result, Schema, SortSpec, StrataError, TupleRef};

use crate::agg_pool::AggObjectPool;
use crate::aggregate::{agg_finalize_row, agg_update_row, agg_update_row_with_sequence};
use crate::arena::RowArena;
use crate::comparator::KeyComparator;
use crate::memory::MemTracker;
use crate::row::{copy_row, encode_tuple, RowView};
use crate::rowset::RowSetWriter;
use crate::skiplist::{FindHint, SkipIndex, NIL};

/// Tuning knobs for one memtable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemTableOptions {
    /// Initial chunk of the scratch arena; one encoded row must fit
    /// comfortably, anything larger is wasted high-water.
    pub buffer_arena_chunk_bytes: usize,
    /// Initial chunk of the table arena.
    pub table_arena_chunk_bytes: usize,
    /// Skip-list height RNG seed; derived from the tablet id when absent.
    pub index_seed: Option<u64>,
}

impl Default for MemTableOptions {
    fn default() -> Self {
        Self {
            buffer_arena_chunk_bytes: 16 * 1024,
            table_arena_chunk_bytes: 1024 * 1024,
            index_seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemTableState {
    Open,
    Flushing,
    Closed,
}

/// Ordered write buffer for one tablet.
pub struct MemTable {
    tablet_id: u64,
    schema: Arc<Schema>,
    key_model: KeyModel,
    tracker: Arc<MemTracker>,
    buffer_arena: RowArena,
    table_arena: RowArena,
    scratch_agg: AggObjectPool,
    durable_agg: AggObjectPool,
    index: SkipIndex,
    hint: FindHint,
    writer: Option<Box<dyn RowSetWriter>>,
    rows_inserted: u64,
    flush_size: u64,
    state: MemTableState,
    flush_error: Option<StrataError>,
}

impl MemTable {
    pub fn new(
        tablet_id: u64,
        schema: Arc<Schema>,
        key_model: KeyModel,
        sort_spec: SortSpec,
        writer: Box<dyn RowSetWriter>,
        parent_tracker: &Arc<MemTracker>,
    ) -> Result<Self> {
        Self::with_options(
            tablet_id,
            schema,
            key_model,
            sort_spec,
            writer,
            parent_tracker,
            MemTableOptions::default(),
        )
    }

    pub fn with_options(
        tablet_id: u64,
        schema: Arc<Schema>,
        key_model: KeyModel,
        sort_spec: SortSpec,
        writer: Box<dyn RowSetWriter>,
        parent_tracker: &Arc<MemTracker>,
        options: MemTableOptions,
    ) -> Result<Self> {
        validate_model(&schema, key_model)?;

        let tracker = MemTracker::child(
            format!("memtable-tablet-{tablet_id}"),
            parent_tracker,
            None,
        );
        let buffer_arena = RowArena::with_min_chunk(
            Arc::clone(&tracker),
            options.buffer_arena_chunk_bytes,
        );
        let mut table_arena = RowArena::with_min_chunk(
            Arc::clone(&tracker),
            options.table_arena_chunk_bytes,
        );

        let comparator = KeyComparator::for_schema(Arc::clone(&schema), sort_spec)?;
        let seed = options
            .index_seed
            .unwrap_or_else(|| tablet_id.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let index = SkipIndex::new(
            comparator,
            Arc::clone(&schema),
            key_model == KeyModel::Duplicate,
            &mut table_arena,
            seed,
        )?;

        Ok(Self {
            tablet_id,
            schema,
            key_model,
            tracker,
            buffer_arena,
            table_arena,
            scratch_agg: AggObjectPool::new(),
            durable_agg: AggObjectPool::new(),
            index,
            hint: FindHint::default(),
            writer: Some(writer),
            rows_inserted: 0,
            flush_size: 0,
            state: MemTableState::Open,
            flush_error: None,
        })
    }

    /// Absorb one input tuple.
    ///
    /// On `MemoryLimitExceeded` the memtable stays well-defined: the index
    /// is untouched, the partial scratch allocation is discarded, and the
    /// row counter is not advanced.
    pub fn insert(&mut self, tuple: &TupleRef<'_>) -> Result<()> {
        if self.state != MemTableState::Open {
            return Err(StrataError::InvariantViolation(
                "insert on a memtable that is no longer open".into(),
            ));
        }
        let result = match self.key_model {
            KeyModel::Duplicate => self.insert_duplicate(tuple),
            KeyModel::Aggregate | KeyModel::Unique => {
                let result = self.insert_merge(tuple);
                // Bounds the buffer arena's high-water to one row, and makes
                // any partially encoded probe unreachable.
                self.buffer_arena.reset();
                self.scratch_agg.reset();
                result
            }
        };
        if result.is_ok() {
            self.rows_inserted += 1;
        }
        result
    }

    /// Duplicate model: every row goes straight into the table arena.
    fn insert_duplicate(&mut self, tuple: &TupleRef<'_>) -> Result<()> {
        let row = self.table_arena.allocate(self.schema.row_width())?;
        encode_tuple(
            &self.schema,
            tuple,
            &mut self.table_arena,
            row,
            &mut self.durable_agg,
        )?;
        let overwritten = self.index.insert(&mut self.table_arena, row)?;
        if overwritten {
            return Err(StrataError::InvariantViolation(
                "duplicate key model observed an overwrite in the index".into(),
            ));
        }
        Ok(())
    }

    /// Aggregate/Unique models: probe via the buffer arena, then merge in
    /// place or copy into the table arena with the find's hint.
    fn insert_merge(&mut self, tuple: &TupleRef<'_>) -> Result<()> {
        let scratch = self.buffer_arena.allocate(self.schema.row_width())?;
        encode_tuple(
            &self.schema,
            tuple,
            &mut self.buffer_arena,
            scratch,
            &mut self.scratch_agg,
        )?;

        let found = {
            let probe = RowView::new(&self.schema, &self.buffer_arena, scratch);
            self.index.find(&self.table_arena, &probe, &mut self.hint)
        };

        if found {
            let dst_row = self.index.row(&self.table_arena, self.hint.curr);
            let probe = RowView::new(&self.schema, &self.buffer_arena, scratch);
            match self.schema.sequence_col() {
                Some(seq_idx) => agg_update_row_with_sequence(
                    &self.schema,
                    &mut self.table_arena,
                    &mut self.durable_agg,
                    dst_row,
                    &probe,
                    &self.scratch_agg,
                    seq_idx,
                )?,
                None => agg_update_row(
                    &self.schema,
                    &mut self.table_arena,
                    &mut self.durable_agg,
                    dst_row,
                    &probe,
                    &self.scratch_agg,
                )?,
            }
        } else {
            let dst = self.table_arena.allocate(self.schema.row_width())?;
            let agg_base = self.durable_agg.acquire_from(&mut self.scratch_agg);
            {
                let probe = RowView::new(&self.schema, &self.buffer_arena, scratch);
                copy_row(&self.schema, &probe, &mut self.table_arena, dst, agg_base)?;
            }
            self.index
                .insert_with_hint(&mut self.table_arena, dst, found, &self.hint)?;
        }
        Ok(())
    }

    /// Flush the memtable into the row-set writer.
    ///
    /// Tries the writer's `flush_single_memtable` fast path first and falls
    /// back to streaming finalized rows one at a time when the writer
    /// declines with `WriterNotImplemented`. Writer errors are propagated
    /// unchanged; the memtable then stays in the flushing state and must be
    /// destroyed (`close` re-raises the error).
    pub fn flush(&mut self) -> Result<()> {
        if self.state != MemTableState::Open {
            return Err(StrataError::InvariantViolation(
                "flush on a memtable that is no longer open".into(),
            ));
        }
        self.state = MemTableState::Flushing;
        debug!(
            tablet_id = self.tablet_id,
            rows = self.rows_inserted,
            memory_bytes = self.memory_usage(),
            "flushing memtable"
        );
        let start = Instant::now();

        let Some(mut writer) = self.writer.take() else {
            return Err(StrataError::InvariantViolation(
                "memtable has no row set writer".into(),
            ));
        };
        let mut flushed: u64 = 0;
        let result = match writer.flush_single_memtable(self, &mut flushed) {
            Err(StrataError::WriterNotImplemented) => {
                self.flush_streaming(writer.as_mut(), &mut flushed)
            }
            other => other,
        };
        self.writer = Some(writer);

        match result {
            Ok(()) => {
                self.flush_size = flushed;
                self.state = MemTableState::Closed;
                debug!(
                    tablet_id = self.tablet_id,
                    flushed_bytes = flushed,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "memtable flush complete"
                );
                Ok(())
            }
            Err(err) => {
                self.flush_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn flush_streaming(
        &mut self,
        writer: &mut dyn RowSetWriter,
        flushed: &mut u64,
    ) -> Result<()> {
        let mut node = self.index.first(&self.table_arena);
        while node != NIL {
            let row = self.index.row(&self.table_arena, node);
            agg_finalize_row(&self.schema, &mut self.table_arena, &self.durable_agg, row)?;
            let view = RowView::new(&self.schema, &self.table_arena, row);
            *flushed += view.encoded_size() as u64;
            writer.add_row(&view)?;
            node = self.index.next(&self.table_arena, node);
        }
        writer.flush()
    }

    /// Flush if still open, then release both arenas. Idempotent; after a
    /// failed flush it releases and re-raises the original error.
    pub fn close(&mut self) -> Result<()> {
        if let Some(err) = self.flush_error.clone() {
            self.release();
            self.state = MemTableState::Closed;
            return Err(err);
        }
        if self.state == MemTableState::Open {
            if let Err(err) = self.flush() {
                self.release();
                self.state = MemTableState::Closed;
                return Err(err);
            }
        }
        self.release();
        self.state = MemTableState::Closed;
        Ok(())
    }

    fn release(&mut self) {
        self.durable_agg.release();
        self.scratch_agg.reset();
        self.buffer_arena.release();
        self.table_arena.release();
    }

    /// Forward iterator over finalized rows in comparator order, for the
    /// writer fast path. Must not outlive the memtable and is only
    /// meaningful before the arenas are released by `close`.
    pub fn iterator(&mut self) -> MemTableIterator<'_> {
        let node = self.index.first(&self.table_arena);
        MemTableIterator { memtable: self, node }
    }

    #[inline]
    pub fn tablet_id(&self) -> u64 {
        self.tablet_id
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[inline]
    pub fn key_model(&self) -> KeyModel {
        self.key_model
    }

    /// Number of successful `insert` calls (not distinct keys).
    #[inline]
    pub fn rows(&self) -> u64 {
        self.rows_inserted
    }

    /// Bytes reported by the last completed flush.
    #[inline]
    pub fn flush_size(&self) -> u64 {
        self.flush_size
    }

    /// Bytes accounted to this memtable's tracker (both arenas).
    #[inline]
    pub fn memory_usage(&self) -> u64 {
        self.tracker.consumed()
    }

    #[inline]
    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.tracker
    }
}

fn validate_model(schema: &Schema, key_model: KeyModel) -> Result<()> {
    if schema.sequence_col().is_some() && key_model != KeyModel::Unique {
        return Err(StrataError::InvalidArgument(
            "sequence column requires the unique key model".into(),
        ));
    }
    for idx in schema.num_key_columns()..schema.num_columns() {
        let col = schema.column(idx);
        let ok = match key_model {
            KeyModel::Duplicate => col.agg == AggregationKind::None,
            KeyModel::Aggregate => col.agg != AggregationKind::None,
            KeyModel::Unique => col.agg == AggregationKind::Replace,
        };
        if !ok {
            return Err(StrataError::InvalidArgument(format!(
                "column '{}' aggregation {:?} is invalid under {:?}",
                col.name, col.agg, key_model
            )));
        }
    }
    Ok(())
}

/// Explicit cursor-style iterator: `valid` / `next` / `current_row`.
/// `current_row` finalizes the row lazily, so rows handed out are always in
/// wire form.
pub struct MemTableIterator<'a> {
    memtable: &'a mut MemTable,
    node: u32,
}

impl<'a> MemTableIterator<'a> {
    pub fn seek_to_first(&mut self) {
        self.node = self.memtable.index.first(&self.memtable.table_arena);
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.node != NIL
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.node = self
            .memtable
            .index
            .next(&self.memtable.table_arena, self.node);
    }

    /// Finalize and return the current row.
    pub fn current_row(&mut self) -> Result<RowView<'_>> {
        debug_assert!(self.valid());
        let row = self
            .memtable
            .index
            .row(&self.memtable.table_arena, self.node);
        agg_finalize_row(
            &self.memtable.schema,
            &mut self.memtable.table_arena,
            &self.memtable.durable_agg,
            row,
        )?;
        Ok(RowView::new(
            &self.memtable.schema,
            &self.memtable.table_arena,
            row,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratadb_core::{ColumnType, Datum, SchemaBuilder, TupleBuilder, TupleDescriptor};

    struct NullWriter;

    impl RowSetWriter for NullWriter {
        fn add_row(&mut self, _row: &RowView<'_>) -> Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn build(model: KeyModel, agg: AggregationKind) -> MemTable {
        let schema = SchemaBuilder::new()
            .key("k", ColumnType::Int32)
            .value("v", ColumnType::Int32, agg)
            .build()
            .unwrap();
        let parent = MemTracker::root("test", None);
        MemTable::new(
            1,
            Arc::new(schema),
            model,
            SortSpec::Lexicographic,
            Box::new(NullWriter),
            &parent,
        )
        .unwrap()
    }

    fn insert_row(mt: &mut MemTable, k: i32, v: i32) {
        let desc = TupleDescriptor::for_schema(mt.schema());
        let buf = TupleBuilder::row(&desc, &[Datum::Int32(k), Datum::Int32(v)]).unwrap();
        let tuple = TupleRef::new(&desc, &buf).unwrap();
        mt.insert(&tuple).unwrap();
    }

    #[test]
    fn test_buffer_arena_live_allocation_zero_after_each_insert() {
        // Merge branch: the key sequence drives both the not-found path
        // (copy + hinted insert) and the found path (in-place update), and
        // the scratch arena must be empty as soon as insert returns either
        // way.
        let mut mt = build(KeyModel::Aggregate, AggregationKind::Sum);
        for (k, v) in [(1, 10), (2, 5), (1, 20), (2, 1), (3, 9), (1, 7)] {
            insert_row(&mut mt, k, v);
            assert_eq!(mt.buffer_arena.live_bytes(), 0, "after ({k}, {v})");
        }

        let mut mt = build(KeyModel::Unique, AggregationKind::Replace);
        for (k, v) in [(1, 100), (1, 200), (2, 1), (1, 150)] {
            insert_row(&mut mt, k, v);
            assert_eq!(mt.buffer_arena.live_bytes(), 0, "after ({k}, {v})");
        }

        // Duplicate branch encodes straight into the table arena and must
        // leave the scratch arena untouched.
        let mut mt = build(KeyModel::Duplicate, AggregationKind::None);
        for (k, v) in [(1, 10), (1, 20), (2, 30)] {
            insert_row(&mut mt, k, v);
            assert_eq!(mt.buffer_arena.live_bytes(), 0, "after ({k}, {v})");
        }
    }
}
