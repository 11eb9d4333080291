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

//! Aggregate object pool
//!
//! Aggregate-state cells (HLL, bitmap) do not live inside the row block:
//! the cell stores a `u32` handle into an [`AggObjectPool`]. Each memtable
//! owns two pools with different scopes:
//!
//! - a **scratch** pool, co-scoped with the buffer arena and reset after
//!   every insert;
//! - a **durable** pool, co-scoped with the table arena.
//!
//! When a probe row turns out to be a brand-new key, its scratch objects are
//! moved wholesale into the durable pool with [`AggObjectPool::acquire_from`].
//! The move preserves object order, so a scratch handle `h` becomes the
//! durable handle `base + h`, where `base` is the returned rebasing offset;
//! the row copy rewrites its cells accordingly. The subsequent scratch
//! `reset` drops only bookkeeping, never the transferred objects.

use crate::sketches::{BitmapState, HllSketch};
use stratadb_core::{ColumnType, Result, StrataError};

/// One in-flight aggregate state object.
#[derive(Debug, Clone, PartialEq)]
pub enum AggState {
    Hll(HllSketch),
    Bitmap(BitmapState),
}

impl AggState {
    /// Construct from the ingest wire form of the given column type.
    pub fn from_serialized(ty: ColumnType, bytes: &[u8]) -> Result<Self> {
        match ty {
            ColumnType::Hll => Ok(AggState::Hll(HllSketch::from_bytes(bytes)?)),
            ColumnType::Bitmap => Ok(AggState::Bitmap(BitmapState::from_bytes(bytes)?)),
            other => Err(StrataError::InvalidArgument(format!(
                "column type {other:?} carries no aggregate state"
            ))),
        }
    }

    /// Merge another state of the same variant into this one.
    pub fn merge(&mut self, other: &AggState) -> Result<()> {
        match (self, other) {
            (AggState::Hll(dst), AggState::Hll(src)) => dst.merge(src),
            (AggState::Bitmap(dst), AggState::Bitmap(src)) => {
                dst.merge(src);
                Ok(())
            }
            _ => Err(StrataError::InvariantViolation(
                "mismatched aggregate state variants".into(),
            )),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            AggState::Hll(h) => h.to_bytes(),
            AggState::Bitmap(b) => b.to_bytes(),
        }
    }
}

/// Index-addressed pool of aggregate state objects.
#[derive(Default)]
pub struct AggObjectPool {
    objects: Vec<AggState>,
    cleanups: Vec<Box<dyn FnOnce()>>,
}

impl std::fmt::Debug for AggObjectPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggObjectPool")
            .field("objects", &self.objects.len())
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

impl AggObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, returning its handle.
    pub fn add(&mut self, state: AggState) -> u32 {
        let handle = self.objects.len() as u32;
        self.objects.push(state);
        handle
    }

    #[inline]
    pub fn get(&self, handle: u32) -> &AggState {
        &self.objects[handle as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: u32) -> &mut AggState {
        &mut self.objects[handle as usize]
    }

    /// Take ownership of every object in `scratch`, preserving order.
    /// Returns the rebasing offset: scratch handle `h` is now `base + h`.
    pub fn acquire_from(&mut self, scratch: &mut AggObjectPool) -> u32 {
        let base = self.objects.len() as u32;
        self.objects.append(&mut scratch.objects);
        self.cleanups.append(&mut scratch.cleanups);
        base
    }

    /// Register a callback run once at pool release, for the rare state
    /// whose finalization needs an explicit teardown.
    pub fn register_cleanup(&mut self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.push(cleanup);
    }

    /// Drop all objects without running cleanups: the scratch discipline.
    /// After `acquire_from`, this clears only bookkeeping.
    pub fn reset(&mut self) {
        self.objects.clear();
        debug_assert!(
            self.cleanups.is_empty(),
            "cleanup registered on a scratch pool"
        );
    }

    /// Run cleanups and drop all objects: the durable discipline.
    pub fn release(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
        self.objects.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Drop for AggObjectPool {
    fn drop(&mut self) {
        self.release();
    }
}
