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

//! Row set writer seam
//!
//! A flushed memtable becomes an immutable on-disk row set; the writer that
//! builds it is a collaborator behind this trait. Column encoding, page
//! layout and compression live entirely on the writer's side of the seam;
//! the memtable only streams finalized rows in comparator order.

use stratadb_core::{Result, StrataError};

use crate::memtable::MemTable;
use crate::row::RowView;

/// Consumer of a memtable flush.
pub trait RowSetWriter {
    /// Consume one finalized row. Rows arrive in comparator order.
    fn add_row(&mut self, row: &RowView<'_>) -> Result<()>;

    /// Optional fast path: take over the whole traversal via
    /// [`MemTable::iterator`], reporting flushed bytes through
    /// `flushed_bytes`. The default declines with
    /// [`StrataError::WriterNotImplemented`], which the memtable recovers
    /// locally by streaming rows through [`RowSetWriter::add_row`].
    fn flush_single_memtable(
        &mut self,
        _memtable: &mut MemTable,
        _flushed_bytes: &mut u64,
    ) -> Result<()> {
        Err(StrataError::WriterNotImplemented)
    }

    /// Finalize the row set.
    fn flush(&mut self) -> Result<()>;
}
