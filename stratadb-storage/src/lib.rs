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

//! StrataDB write path
//!
//! The per-tablet ingest pipeline: input tuples are absorbed into an
//! ordered in-memory buffer, optionally pre-aggregated by key model, and
//! flushed in sort order into an immutable row set.
//!
//! ## Components
//!
//! - **MemTable** (`memtable`): the façade: insert / flush / close and the
//!   lazy-finalizing iterator
//! - **Ordered index** (`skiplist`): arena-backed skip list over row
//!   handles with hinted insertion
//! - **Arenas** (`arena`): bump pools with `u32` offset handles and O(1)
//!   bulk reset
//! - **Memory tracking** (`memory`): hierarchical byte accounting with
//!   limits
//! - **Row codec** (`row`): tuple → encoded row, cross-arena relocation,
//!   row views
//! - **Comparators** (`comparator`): lexicographic and Z-order key orders
//! - **Aggregation** (`aggregate`, `agg_pool`, `sketches`): per-column
//!   merge functions, the two-scope aggregate object pool, HLL/bitmap
//!   states
//! - **Writer seam** (`rowset`): the row-set writer collaborator trait

pub mod agg_pool;
pub mod aggregate;
pub mod arena;
pub mod comparator;
pub mod memory;
pub mod memtable;
pub mod row;
pub mod rowset;
pub mod sketches;
pub mod skiplist;

pub use agg_pool::{AggObjectPool, AggState};
pub use arena::RowArena;
pub use comparator::KeyComparator;
pub use memory::MemTracker;
pub use memtable::{MemTable, MemTableIterator, MemTableOptions};
pub use row::RowView;
pub use rowset::RowSetWriter;
pub use sketches::{BitmapState, HllSketch};
pub use skiplist::{FindHint, SkipIndex};
