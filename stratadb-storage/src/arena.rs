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

//! Bump arena with offset handles
//!
//! ## Problem
//!
//! The write path allocates one encoded row block plus a handful of
//! variable-length payloads per insert. Per-object heap allocation would
//! dominate the insert cost and make teardown O(rows).
//!
//! ## Solution
//!
//! A bump allocator over one contiguous backing store. Allocations return
//! `u32` byte offsets, never pointers: the backing store may reallocate when
//! it doubles, offsets stay valid, and a row handle transitively owns its
//! out-of-band payloads because they live in the same arena.
//!
//! - `allocate`: O(1) bump, pointer-width aligned, zero-initialized
//! - `reset`: O(1), keeps capacity (the scratch-arena discipline)
//! - `release`: returns capacity to the allocator and the tracker
//!
//! Growth is tracker-gated: the arena asks its [`MemTracker`] *before*
//! reserving, so a denied request leaves the arena untouched.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use stratadb_core::Result;

use crate::memory::MemTracker;

/// Allocation alignment: the platform pointer width.
pub const ARENA_ALIGN: usize = std::mem::size_of::<usize>();

/// Smallest chunk an empty arena grows to.
pub const MIN_CHUNK_BYTES: usize = 4 * 1024;

/// Bump arena handing out `u32` offsets into a growable backing store.
#[derive(Debug)]
pub struct RowArena {
    data: Vec<u8>,
    tracker: Arc<MemTracker>,
    /// Bytes of capacity accounted to the tracker.
    tracked: usize,
    min_chunk: usize,
}

impl RowArena {
    pub fn new(tracker: Arc<MemTracker>) -> Self {
        Self::with_min_chunk(tracker, MIN_CHUNK_BYTES)
    }

    pub fn with_min_chunk(tracker: Arc<MemTracker>, min_chunk: usize) -> Self {
        Self {
            data: Vec::new(),
            tracker,
            tracked: 0,
            min_chunk: min_chunk.max(ARENA_ALIGN),
        }
    }

    /// Allocate `size` zero-initialized bytes, aligned to [`ARENA_ALIGN`].
    ///
    /// Fails only when the tracker denies the growth; the arena is left
    /// unchanged in that case.
    pub fn allocate(&mut self, size: usize) -> Result<u32> {
        let off = (self.data.len() + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1);
        let end = off + size;
        debug_assert!(end <= u32::MAX as usize, "arena exceeds u32 offset space");
        if end > self.tracked {
            self.grow(end)?;
        }
        self.data.resize(end, 0);
        Ok(off as u32)
    }

    /// Allocate and fill from `src`.
    pub fn allocate_copy(&mut self, src: &[u8]) -> Result<u32> {
        let off = self.allocate(src.len())?;
        self.slice_mut(off, src.len()).copy_from_slice(src);
        Ok(off)
    }

    #[cold]
    fn grow(&mut self, needed: usize) -> Result<()> {
        let target = needed
            .next_power_of_two()
            .max(self.tracked * 2)
            .max(self.min_chunk);
        self.tracker.try_consume((target - self.tracked) as u64)?;
        self.data.reserve_exact(target - self.data.len());
        self.tracked = target;
        Ok(())
    }

    /// Drop every allocation without returning capacity. O(1); offsets handed
    /// out before the reset must not be used again.
    #[inline]
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Return all capacity to the allocator and the tracker.
    pub fn release(&mut self) {
        self.tracker.release(self.tracked as u64);
        self.tracked = 0;
        self.data = Vec::new();
    }

    /// Bytes live in the arena right now.
    #[inline]
    pub fn live_bytes(&self) -> usize {
        self.data.len()
    }

    /// Capacity high-water accounted to the tracker.
    #[inline]
    pub fn tracked_bytes(&self) -> usize {
        self.tracked
    }

    #[inline]
    pub fn slice(&self, off: u32, len: usize) -> &[u8] {
        &self.data[off as usize..off as usize + len]
    }

    #[inline]
    pub fn slice_mut(&mut self, off: u32, len: usize) -> &mut [u8] {
        &mut self.data[off as usize..off as usize + len]
    }

    #[inline]
    pub fn read_u8(&self, off: u32) -> u8 {
        self.data[off as usize]
    }

    #[inline]
    pub fn write_u8(&mut self, off: u32, v: u8) {
        self.data[off as usize] = v;
    }

    #[inline]
    pub fn read_u32(&self, off: u32) -> u32 {
        LittleEndian::read_u32(self.slice(off, 4))
    }

    #[inline]
    pub fn write_u32(&mut self, off: u32, v: u32) {
        LittleEndian::write_u32(self.slice_mut(off, 4), v);
    }

    #[inline]
    pub fn write_bytes(&mut self, off: u32, src: &[u8]) {
        self.slice_mut(off, src.len()).copy_from_slice(src);
    }
}

impl Drop for RowArena {
    fn drop(&mut self) {
        if self.tracked > 0 {
            self.tracker.release(self.tracked as u64);
            self.tracked = 0;
        }
    }
}
