// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Deterministic reassembly of pages produced by several operators.
//!
//! Pages may arrive in any order across shards. `ReorderBuffer` releases them
//! strictly by `(shard, sequence)`: every page of shard 0, then shard 1, and
//! so on. A shard is complete once its `Exhausted` page has been released.

use std::collections::BTreeMap;

use crate::error::{GapFillError, Result};
use crate::operator::Page;

#[derive(Debug)]
pub struct ReorderBuffer {
    shards: usize,
    current_shard: usize,
    next_sequence: u64,
    pending: BTreeMap<(usize, u64), Page>,
}

impl ReorderBuffer {
    #[must_use]
    pub fn new(shards: usize) -> Self {
        Self {
            shards,
            current_shard: 0,
            next_sequence: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept a page from `shard`
    pub fn insert(&mut self, shard: usize, page: Page) -> Result<()> {
        if shard >= self.shards {
            return Err(GapFillError::InvalidState(format!(
                "page from shard {shard}, but only {} shards exist",
                self.shards
            )));
        }
        let key = (shard, page.sequence);
        if key < (self.current_shard, self.next_sequence) {
            return Err(GapFillError::InvalidState(format!(
                "page {} of shard {shard} was already released",
                page.sequence
            )));
        }
        if self.pending.contains_key(&key) {
            return Err(GapFillError::InvalidState(format!(
                "duplicate page {} from shard {shard}",
                page.sequence
            )));
        }
        let _ = self.pending.insert(key, page);
        Ok(())
    }

    /// Release the next page in order, if it has arrived
    pub fn pop_ready(&mut self) -> Option<Page> {
        let page = self
            .pending
            .remove(&(self.current_shard, self.next_sequence))?;
        if page.is_last() {
            self.current_shard += 1;
            self.next_sequence = 0;
        } else {
            self.next_sequence += 1;
        }
        Some(page)
    }

    /// Release every page that is ready
    pub fn drain_ready(&mut self) -> Vec<Page> {
        std::iter::from_fn(|| self.pop_ready()).collect()
    }

    /// True once the last page of every shard has been released
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_shard >= self.shards
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
