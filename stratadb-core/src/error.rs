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

//! Error types for StrataDB
//!
//! Every variant carries a machine-readable kind plus enough context to be
//! actionable in a log line. The enum is `Clone` because a failed flush is
//! re-raised by `close()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrataError {
    #[error(
        "memory limit exceeded on tracker '{tracker}': \
         consumed {consumed} + requested {requested} > limit {limit}"
    )]
    MemoryLimitExceeded {
        tracker: String,
        consumed: u64,
        requested: u64,
        limit: u64,
    },

    #[error("row set writer error: {0}")]
    Writer(String),

    /// Distinguished status from `RowSetWriter::flush_single_memtable`.
    /// Recovered locally by the memtable's streaming fallback; never
    /// surfaced to callers.
    #[error("row set writer does not implement this operation")]
    WriterNotImplemented,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StrataError>;
