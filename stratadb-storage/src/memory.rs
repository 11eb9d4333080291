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

//! Hierarchical memory tracking
//!
//! Every arena reports growth to a [`MemTracker`]; trackers form a tree so
//! one load-level (or process-level) tracker can bound many memtables at
//! once. Consumption propagates to the root; a limit anywhere along the
//! chain denies the allocation and the partial consumption is rolled back.
//!
//! Trackers are the only state shared across memtables; all synchronization
//! is internal (plain atomics, no locks).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stratadb_core::{Result, StrataError};

/// Hierarchical byte counter with an optional limit.
#[derive(Debug)]
pub struct MemTracker {
    label: String,
    limit: Option<u64>,
    consumed: AtomicU64,
    parent: Option<Arc<MemTracker>>,
}

impl MemTracker {
    /// Create a root tracker. `limit = None` means unbounded.
    pub fn root(label: impl Into<String>, limit: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            consumed: AtomicU64::new(0),
            parent: None,
        })
    }

    /// Create a child tracker reporting into `parent`.
    pub fn child(
        label: impl Into<String>,
        parent: &Arc<MemTracker>,
        limit: Option<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            consumed: AtomicU64::new(0),
            parent: Some(Arc::clone(parent)),
        })
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Bytes currently accounted to this tracker (including descendants).
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Try to account `bytes` against this tracker and every ancestor.
    ///
    /// On a limit breach anywhere along the chain, the consumption applied
    /// so far is rolled back and `MemoryLimitExceeded` is returned.
    pub fn try_consume(&self, bytes: u64) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let mut applied: Vec<&MemTracker> = Vec::new();
        let mut node = Some(self);
        while let Some(t) = node {
            let new = t.consumed.fetch_add(bytes, Ordering::Relaxed) + bytes;
            if let Some(limit) = t.limit {
                if new > limit {
                    t.consumed.fetch_sub(bytes, Ordering::Relaxed);
                    for a in applied {
                        a.consumed.fetch_sub(bytes, Ordering::Relaxed);
                    }
                    return Err(StrataError::MemoryLimitExceeded {
                        tracker: t.label.clone(),
                        consumed: new - bytes,
                        requested: bytes,
                        limit,
                    });
                }
            }
            applied.push(t);
            node = t.parent.as_deref();
        }
        Ok(())
    }

    /// Return `bytes` to this tracker and every ancestor.
    pub fn release(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut node = Some(self);
        while let Some(t) = node {
            let _prev = t.consumed.fetch_sub(bytes, Ordering::Relaxed);
            debug_assert!(
                _prev >= bytes,
                "tracker '{}' released more than consumed",
                t.label
            );
            node = t.parent.as_deref();
        }
    }
}
