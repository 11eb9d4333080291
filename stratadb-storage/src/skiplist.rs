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

//! Ordered row index
//!
//! A probabilistic multi-level ordered map (skip list) over row handles,
//! owned by exactly one memtable and mutated by one writer.
//!
//! ## Memory
//!
//! Nodes live in the table arena alongside the rows they point at, so the
//! whole index is freed by one arena release and needs no per-node
//! destructor. A node is a little-endian record:
//!
//! ```text
//! ┌──────────┬────────────┬──────────────────────────┐
//! │ row: u32 │ height: u32│ next[height]: u32 each   │
//! └──────────┴────────────┴──────────────────────────┘
//! ```
//!
//! `NIL` (`u32::MAX`) terminates chains; offset 0 is a valid node, so the
//! sentinel is explicit.
//!
//! ## Duplicate modes
//!
//! - **allow-duplicates** (`Duplicate` key model): equal keys are legal and
//!   kept in arrival order; the splice search advances *past* equal keys so
//!   a new equal key lands after the ones already present.
//! - **reject-duplicates** (`Aggregate`/`Unique`): the caller is expected to
//!   `find` first and merge in place; inserting an equal key is a caller
//!   bug and reported as an invariant violation.
//!
//! ## Hints
//!
//! `find` returns the predecessor chain it traversed. `insert_with_hint`
//! splices at that chain without re-searching, which is what makes the
//! lookup-then-insert pattern of the merge models O(log n) once instead of
//! twice. A hint is valid only if no mutation happened since the `find`
//! that produced it; under the single-writer model this is a plain calling
//! contract, checked with debug assertions.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use stratadb_core::{Result, Schema, StrataError};

use crate::arena::RowArena;
use crate::comparator::KeyComparator;
use crate::row::RowView;

/// Height cap for towers.
pub const MAX_HEIGHT: usize = 12;

/// Geometric height parameter: P(level up) = 1/4.
const BRANCHING_FACTOR: u32 = 4;

/// Chain terminator. Offset 0 is valid, so the null handle is the max.
pub const NIL: u32 = u32::MAX;

const NODE_ROW: u32 = 0;
const NODE_HEIGHT: u32 = 4;
const NODE_NEXT: u32 = 8;

/// Predecessor chain captured by `find`, replayed by `insert_with_hint`.
#[derive(Debug, Clone)]
pub struct FindHint {
    prev: [u32; MAX_HEIGHT],
    /// First node at level 0 not before the probe; the equal node when
    /// `find` returned true.
    pub curr: u32,
}

impl Default for FindHint {
    fn default() -> Self {
        Self {
            prev: [NIL; MAX_HEIGHT],
            curr: NIL,
        }
    }
}

/// Skip list over arena row offsets.
#[derive(Debug)]
pub struct SkipIndex {
    cmp: KeyComparator,
    schema: Arc<Schema>,
    head: u32,
    max_height: usize,
    len: usize,
    allow_duplicates: bool,
    rng: SmallRng,
}

impl SkipIndex {
    /// Create an empty index; the head sentinel is allocated from `arena`.
    pub fn new(
        cmp: KeyComparator,
        schema: Arc<Schema>,
        allow_duplicates: bool,
        arena: &mut RowArena,
        seed: u64,
    ) -> Result<Self> {
        let head = Self::alloc_node(arena, NIL, MAX_HEIGHT)?;
        Ok(Self {
            cmp,
            schema,
            head,
            max_height: 1,
            len: 0,
            allow_duplicates,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    fn alloc_node(arena: &mut RowArena, row: u32, height: usize) -> Result<u32> {
        let node = arena.allocate(NODE_NEXT as usize + 4 * height)?;
        arena.write_u32(node + NODE_ROW, row);
        arena.write_u32(node + NODE_HEIGHT, height as u32);
        for level in 0..height {
            arena.write_u32(node + NODE_NEXT + 4 * level as u32, NIL);
        }
        Ok(node)
    }

    #[inline]
    fn node_row(arena: &RowArena, node: u32) -> u32 {
        arena.read_u32(node + NODE_ROW)
    }

    #[inline]
    fn node_next(arena: &RowArena, node: u32, level: usize) -> u32 {
        arena.read_u32(node + NODE_NEXT + 4 * level as u32)
    }

    #[inline]
    fn set_next(arena: &mut RowArena, node: u32, level: usize, target: u32) {
        arena.write_u32(node + NODE_NEXT + 4 * level as u32, target);
    }

    fn compare_node(&self, arena: &RowArena, node: u32, key: &RowView<'_>) -> std::cmp::Ordering {
        let row = RowView::new(&self.schema, arena, Self::node_row(arena, node));
        self.cmp.compare(&row, key)
    }

    /// Descend towards `key`, recording the predecessor at every level.
    /// With `after_equal`, the search passes equal keys (duplicate mode).
    /// Returns the level-0 successor.
    fn find_splice(
        &self,
        arena: &RowArena,
        key: &RowView<'_>,
        after_equal: bool,
        prev: &mut [u32; MAX_HEIGHT],
    ) -> u32 {
        *prev = [self.head; MAX_HEIGHT];
        let mut node = self.head;
        let mut level = self.max_height - 1;
        loop {
            let next = Self::node_next(arena, node, level);
            let advance = next != NIL && {
                let ord = self.compare_node(arena, next, key);
                ord == std::cmp::Ordering::Less
                    || (after_equal && ord == std::cmp::Ordering::Equal)
            };
            if advance {
                node = next;
            } else {
                prev[level] = node;
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Look up `key`, filling `hint` with the traversal state. Returns
    /// whether an equal key exists; `hint.curr` is that node when it does.
    pub fn find(&self, arena: &RowArena, key: &RowView<'_>, hint: &mut FindHint) -> bool {
        let succ = self.find_splice(arena, key, false, &mut hint.prev);
        hint.curr = succ;
        succ != NIL && self.compare_node(arena, succ, key) == std::cmp::Ordering::Equal
    }

    /// Row offset held by a node (e.g. `hint.curr` after a successful find).
    #[inline]
    pub fn row(&self, arena: &RowArena, node: u32) -> u32 {
        Self::node_row(arena, node)
    }

    /// Insert without a hint. Returns the overwritten flag, which is always
    /// `false`: the duplicate-mode index keeps every key, and in
    /// reject-duplicates mode an equal key is a caller error.
    pub fn insert(&mut self, arena: &mut RowArena, row: u32) -> Result<bool> {
        let mut prev = [NIL; MAX_HEIGHT];
        {
            let key = RowView::new(&self.schema, arena, row);
            let succ = self.find_splice(arena, &key, self.allow_duplicates, &mut prev);
            if !self.allow_duplicates
                && succ != NIL
                && self.compare_node(arena, succ, &key) == std::cmp::Ordering::Equal
            {
                return Err(StrataError::InvariantViolation(
                    "insert of an existing key into a reject-duplicates index".into(),
                ));
            }
        }
        self.splice(arena, row, &prev)?;
        Ok(false)
    }

    /// Insert at the position identified by a hint from the most recent
    /// `find` for this key, with no intervening mutation.
    pub fn insert_with_hint(
        &mut self,
        arena: &mut RowArena,
        row: u32,
        found: bool,
        hint: &FindHint,
    ) -> Result<()> {
        if found {
            return Err(StrataError::InvariantViolation(
                "insert_with_hint for a key reported as existing".into(),
            ));
        }
        #[cfg(debug_assertions)]
        self.debug_check_hint(arena, row, hint);
        self.splice(arena, row, &hint.prev)
    }

    fn splice(&mut self, arena: &mut RowArena, row: u32, prev: &[u32; MAX_HEIGHT]) -> Result<()> {
        let height = self.random_height();
        if height > self.max_height {
            self.max_height = height;
        }
        let node = Self::alloc_node(arena, row, height)?;
        for level in 0..height {
            let next = Self::node_next(arena, prev[level], level);
            Self::set_next(arena, node, level, next);
            Self::set_next(arena, prev[level], level, node);
        }
        self.len += 1;
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn debug_check_hint(&self, arena: &RowArena, row: u32, hint: &FindHint) {
        let key = RowView::new(&self.schema, arena, row);
        for level in 0..self.max_height {
            let prev = hint.prev[level];
            debug_assert_ne!(prev, NIL, "hint missing level {level}");
            if prev != self.head {
                debug_assert_eq!(
                    self.compare_node(arena, prev, &key),
                    std::cmp::Ordering::Less,
                    "stale hint: predecessor not less than key at level {level}"
                );
            }
        }
        debug_assert_eq!(
            Self::node_next(arena, hint.prev[0], 0),
            hint.curr,
            "stale hint: successor changed since find"
        );
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING_FACTOR) {
            height += 1;
        }
        height
    }

    /// First node in comparator order, or `NIL` when empty.
    #[inline]
    pub fn first(&self, arena: &RowArena) -> u32 {
        Self::node_next(arena, self.head, 0)
    }

    /// Successor of `node`, or `NIL` at the end.
    #[inline]
    pub fn next(&self, arena: &RowArena, node: u32) -> u32 {
        Self::node_next(arena, node, 0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg_pool::AggObjectPool;
    use crate::memory::MemTracker;
    use crate::row::encode_tuple;
    use stratadb_core::{
        AggregationKind, ColumnType, Datum, SchemaBuilder, SortSpec, TupleBuilder,
        TupleDescriptor, TupleRef,
    };

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .key("k", ColumnType::Int32)
                .value("v", ColumnType::Int32, AggregationKind::Sum)
                .build()
                .unwrap(),
        )
    }

    fn encode(schema: &Arc<Schema>, arena: &mut RowArena, k: i32, v: i32) -> u32 {
        let desc = TupleDescriptor::for_schema(schema);
        let buf = TupleBuilder::row(&desc, &[Datum::Int32(k), Datum::Int32(v)]).unwrap();
        let tuple = TupleRef::new(&desc, &buf).unwrap();
        let off = arena.allocate(schema.row_width()).unwrap();
        let mut pool = AggObjectPool::new();
        encode_tuple(schema, &tuple, arena, off, &mut pool).unwrap();
        off
    }

    fn index(schema: &Arc<Schema>, arena: &mut RowArena, allow_dup: bool) -> SkipIndex {
        let cmp = KeyComparator::for_schema(Arc::clone(schema), SortSpec::Lexicographic).unwrap();
        SkipIndex::new(cmp, Arc::clone(schema), allow_dup, arena, 7).unwrap()
    }

    fn collect_keys(idx: &SkipIndex, schema: &Arc<Schema>, arena: &RowArena) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        let mut node = idx.first(arena);
        while node != NIL {
            let view = RowView::new(schema, arena, idx.row(arena, node));
            match (view.datum(0), view.datum(1)) {
                (Datum::Int32(k), Datum::Int32(v)) => out.push((k, v)),
                other => panic!("unexpected datums {other:?}"),
            }
            node = idx.next(arena, node);
        }
        out
    }

    #[test]
    fn test_sorted_iteration() {
        let schema = schema();
        let mut arena = RowArena::new(MemTracker::root("test", None));
        let mut idx = index(&schema, &mut arena, false);
        for k in [5, 1, 9, 3, 7, 0, 8] {
            let row = encode(&schema, &mut arena, k, k * 10);
            idx.insert(&mut arena, row).unwrap();
        }
        let keys: Vec<i32> = collect_keys(&idx, &schema, &arena).iter().map(|p| p.0).collect();
        assert_eq!(keys, vec![0, 1, 3, 5, 7, 8, 9]);
        assert_eq!(idx.len(), 7);
    }

    #[test]
    fn test_duplicates_keep_arrival_order() {
        let schema = schema();
        let mut arena = RowArena::new(MemTracker::root("test", None));
        let mut idx = index(&schema, &mut arena, true);
        for (k, v) in [(1, 10), (2, 1), (1, 20), (1, 30), (2, 2)] {
            let row = encode(&schema, &mut arena, k, v);
            let overwritten = idx.insert(&mut arena, row).unwrap();
            assert!(!overwritten);
        }
        assert_eq!(
            collect_keys(&idx, &schema, &arena),
            vec![(1, 10), (1, 20), (1, 30), (2, 1), (2, 2)]
        );
    }

    #[test]
    fn test_reject_duplicates_insert_errors() {
        let schema = schema();
        let mut arena = RowArena::new(MemTracker::root("test", None));
        let mut idx = index(&schema, &mut arena, false);
        let row = encode(&schema, &mut arena, 1, 10);
        idx.insert(&mut arena, row).unwrap();
        let dup = encode(&schema, &mut arena, 1, 20);
        assert!(matches!(
            idx.insert(&mut arena, dup),
            Err(StrataError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_find_then_insert_with_hint() {
        let schema = schema();
        let mut table = RowArena::new(MemTracker::root("table", None));
        let mut buffer = RowArena::new(MemTracker::root("buffer", None));
        let mut idx = index(&schema, &mut table, false);
        let mut hint = FindHint::default();

        for k in [4, 2, 8] {
            let row = encode(&schema, &mut table, k, 0);
            idx.insert(&mut table, row).unwrap();
        }

        // Probe from a different arena, as the merge path does.
        let probe_off = encode(&schema, &mut buffer, 6, 0);
        let found = {
            let probe = RowView::new(&schema, &buffer, probe_off);
            idx.find(&table, &probe, &mut hint)
        };
        assert!(!found);

        let row = encode(&schema, &mut table, 6, 0);
        idx.insert_with_hint(&mut table, row, found, &hint).unwrap();
        let keys: Vec<i32> = collect_keys(&idx, &schema, &table).iter().map(|p| p.0).collect();
        assert_eq!(keys, vec![2, 4, 6, 8]);

        // An existing key is found and its node row is reachable.
        buffer.reset();
        let probe_off = encode(&schema, &mut buffer, 4, 0);
        let found = {
            let probe = RowView::new(&schema, &buffer, probe_off);
            idx.find(&table, &probe, &mut hint)
        };
        assert!(found);
        let row = idx.row(&table, hint.curr);
        let view = RowView::new(&schema, &table, row);
        assert_eq!(view.datum(0), Datum::Int32(4));
    }

    #[test]
    fn test_many_inserts_stay_sorted() {
        let schema = schema();
        let mut arena = RowArena::new(MemTracker::root("test", None));
        let mut idx = index(&schema, &mut arena, true);
        // Pseudo-random insertion order.
        let mut k = 1u32;
        for _ in 0..500 {
            k = k.wrapping_mul(1103515245).wrapping_add(12345);
            let row = encode(&schema, &mut arena, (k % 1000) as i32, 0);
            idx.insert(&mut arena, row).unwrap();
        }
        let keys: Vec<i32> = collect_keys(&idx, &schema, &arena).iter().map(|p| p.0).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(idx.len(), 500);
    }
}
