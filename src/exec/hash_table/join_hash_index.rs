// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Multi-set hash index over build rows for join probing.
//!
//! Responsibilities:
//! - Groups build row references by key tuple equality (`stores_nulls` decides
//!   whether null keys are indexed and whether null equals null).
//! - Answers keyed scans and full scans with one iterator type.
//!
//! Layout:
//! - `groups` maps a key to a group id; a group remembers one representative row
//!   whose build keys are re-evaluated for equality checks, and the cached hash.
//! - `group_head[group]` is the newest entry of the group and `entry_next[entry]`
//!   links to the previous entry of the same group. `entry_rows` stays in insertion
//!   order and backs full scans.
//!
//! Key exported interfaces:
//! - Types: `JoinHashIndex`, `JoinHashIterator`, `JoinMatches`.

use std::iter::FusedIterator;
use std::mem;
use std::sync::Arc;

use arrow::datatypes::DataType;
use hashbrown::DefaultHashBuilder;
use hashbrown::HashTable;
use hashbrown::hash_table::Entry;

use crate::common::app_config::{self, JoinIndexConfig};
use crate::common::ids::RowRef;
use crate::exec::expr::{KeyExprSet, KeyTuple};
use crate::exec::row_desc::RowDescriptor;
use crate::join_index_logging::{debug, trace};
use crate::runtime::mem_tracker::MemTracker;

use super::build_rows::{BuildRowArena, ProbeChunk, ProbeRow};
use super::hash::seed_from_hasher;
use super::key_policy::KeyPolicy;

const ENTRY_NONE: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct GroupEntry {
    group_id: u32,
    hash: u64,
    representative: RowRef,
}

/// Hash index from join key tuples to the build rows carrying them.
///
/// Inserting needs `&mut self` and scanning needs `&self`, so every outstanding
/// [`JoinHashIterator`] is invalidated (statically) by the next insert, and scans
/// can run from several threads once the build phase is over.
pub struct JoinHashIndex<'a> {
    policy: KeyPolicy<'a>,
    probe_exprs: KeyExprSet,
    groups: HashTable<GroupEntry>,
    group_head: Vec<u32>,
    entry_rows: Vec<RowRef>,
    entry_next: Vec<u32>,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

fn is_plain_integer(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
    )
}

/// Build and probe keys must read into the same value domain. Integers of any width
/// widen to i64 so they may pair; every other type must match exactly.
fn key_types_compatible(build: &DataType, probe: &DataType) -> bool {
    build == probe || (is_plain_integer(build) && is_plain_integer(probe))
}

impl<'a> JoinHashIndex<'a> {
    /// Build an index sized and seeded by the `[join_index]` table of the loaded
    /// process config, or by `JoinIndexConfig::default()` when none is loaded.
    pub fn try_new(
        rows: &'a BuildRowArena,
        build_exprs: KeyExprSet,
        probe_exprs: KeyExprSet,
        probe_desc: &RowDescriptor,
        stores_nulls: bool,
    ) -> Result<Self, String> {
        let config = app_config::loaded()
            .map(|cfg| cfg.join_index.clone())
            .unwrap_or_default();
        Self::try_new_with_config(
            rows,
            build_exprs,
            probe_exprs,
            probe_desc,
            stores_nulls,
            &config,
        )
    }

    pub fn try_new_with_config(
        rows: &'a BuildRowArena,
        build_exprs: KeyExprSet,
        probe_exprs: KeyExprSet,
        probe_desc: &RowDescriptor,
        stores_nulls: bool,
        config: &JoinIndexConfig,
    ) -> Result<Self, String> {
        if build_exprs.is_empty() {
            return Err("join hash index requires join keys".to_string());
        }
        if build_exprs.len() != probe_exprs.len() {
            return Err(format!(
                "join key count mismatch: build={} probe={}",
                build_exprs.len(),
                probe_exprs.len()
            ));
        }
        let build_types = build_exprs
            .bind(rows.descriptor())
            .map_err(|e| format!("join build keys: {}", e))?;
        let probe_types = probe_exprs
            .bind(probe_desc)
            .map_err(|e| format!("join probe keys: {}", e))?;
        for (idx, (build, probe)) in build_types.iter().zip(&probe_types).enumerate() {
            if !key_types_compatible(build, probe) {
                return Err(format!(
                    "join key {} type mismatch: build={:?} probe={:?}",
                    idx, build, probe
                ));
            }
        }
        config.validate().map_err(|e| e.to_string())?;

        let seed = config
            .hash_seed
            .unwrap_or_else(|| seed_from_hasher(&DefaultHashBuilder::default()));
        debug!(
            keys = build_types.len(),
            stores_nulls,
            build_rows = rows.num_rows(),
            "create join hash index"
        );
        Ok(Self {
            policy: KeyPolicy::new(rows, build_exprs, stores_nulls, seed),
            probe_exprs,
            groups: HashTable::with_capacity(config.initial_group_capacity),
            group_head: Vec::with_capacity(config.initial_group_capacity),
            entry_rows: Vec::with_capacity(config.initial_entry_capacity),
            entry_next: Vec::with_capacity(config.initial_entry_capacity),
            mem_tracker: None,
            accounted_bytes: 0,
        })
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.tracked_bytes();
        tracker.consume(bytes);
        self.mem_tracker = Some(tracker);
        self.accounted_bytes = bytes;
    }

    pub fn stores_nulls(&self) -> bool {
        self.policy.stores_nulls()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entry_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_rows.is_empty()
    }

    /// Number of distinct key tuples.
    pub fn group_count(&self) -> usize {
        self.group_head.len()
    }

    /// True if any build key of `row` is null.
    pub fn has_nulls(&self, row: RowRef) -> Result<bool, String> {
        let build_row = self.policy.rows().row(row)?;
        Ok(self.policy.build_exprs().has_nulls(build_row))
    }

    /// Index `row` under its build key tuple.
    ///
    /// A row with a null key is skipped without error when the index does not store
    /// nulls. Errors only when `row` is not a row of the arena.
    pub fn insert(&mut self, row: RowRef) -> Result<(), String> {
        let policy = &self.policy;
        let build_row = policy.rows().row(row)?;
        let key = policy.build_exprs().evaluate(build_row);
        if !policy.stores_nulls() && key.has_null() {
            trace!(row = %row, "join hash index skip build row with null key");
            return Ok(());
        }
        let entry_id = u32::try_from(self.entry_rows.len())
            .ok()
            .filter(|id| *id != ENTRY_NONE)
            .ok_or_else(|| "join hash index entry count overflow".to_string())?;

        let hash = policy.hash(&key);
        let group_id = match self.groups.entry(
            hash,
            |group| {
                group.hash == hash && policy.equals(&key, group.representative)
            },
            |group| group.hash,
        ) {
            Entry::Occupied(entry) => entry.get().group_id,
            Entry::Vacant(entry) => {
                let group_id = u32::try_from(self.group_head.len())
                    .map_err(|_| "join hash index group count overflow".to_string())?;
                entry.insert(GroupEntry {
                    group_id,
                    hash,
                    representative: row,
                });
                self.group_head.push(ENTRY_NONE);
                group_id
            }
        };

        let slot = group_id as usize;
        let head = self
            .group_head
            .get(slot)
            .copied()
            .ok_or_else(|| "join group id out of bounds".to_string())?;
        self.entry_rows.push(row);
        self.entry_next.push(head);
        self.group_head[slot] = entry_id;
        self.refresh_accounting();
        Ok(())
    }

    /// Insert every row of arena chunk `chunk_id`. Returns how many were indexed.
    pub fn insert_chunk(&mut self, chunk_id: u32) -> Result<usize, String> {
        let rows = self.policy.rows();
        let before = self.entry_rows.len();
        let mut seen = 0usize;
        for row in rows.chunk_row_refs(chunk_id)? {
            self.insert(row)?;
            seen += 1;
        }
        let inserted = self.entry_rows.len() - before;
        debug!(
            chunk_id,
            rows = seen,
            inserted,
            rejected = seen - inserted,
            "join hash index insert build chunk"
        );
        Ok(inserted)
    }

    /// Insert every row of the arena. Returns how many were indexed.
    pub fn insert_all(&mut self) -> Result<usize, String> {
        let num_chunks = u32::try_from(self.policy.rows().num_chunks())
            .map_err(|_| "build arena chunk count overflow".to_string())?;
        let mut inserted = 0usize;
        for chunk_id in 0..num_chunks {
            inserted += self.insert_chunk(chunk_id)?;
        }
        Ok(inserted)
    }

    /// Start a scan. `None` scans every entry; `Some(probe)` scans the entries whose
    /// build keys equal the probe keys of `probe`.
    pub fn scan(&self, probe: Option<ProbeRow<'_>>) -> JoinHashIterator<'_> {
        let Some(probe) = probe else {
            return JoinHashIterator::full(&self.entry_rows, &self.entry_next);
        };
        let key = self.probe_exprs.evaluate(probe.chunk_row());
        self.scan_key(&key)
    }

    /// Scan the entries whose build keys equal an already evaluated key tuple.
    pub fn scan_key(&self, key: &KeyTuple<'_>) -> JoinHashIterator<'_> {
        match self.find_group(key) {
            Some(group) => {
                let head = self
                    .group_head
                    .get(group.group_id as usize)
                    .copied()
                    .unwrap_or(ENTRY_NONE);
                JoinHashIterator::chain(&self.entry_rows, &self.entry_next, head)
            }
            None => JoinHashIterator::empty(&self.entry_rows, &self.entry_next),
        }
    }

    /// Probe every row of `probe` and collect the matching (probe row, build row) pairs.
    pub fn probe_chunk(&self, probe: &ProbeChunk) -> Result<JoinMatches, String> {
        if u32::try_from(probe.len()).is_err() {
            return Err(format!("probe chunk has too many rows: {}", probe.len()));
        }
        let mut matches = JoinMatches::default();
        for probe_row in probe.rows() {
            let probe_idx = probe_row.row() as u32;
            for build_row in self.scan(Some(probe_row)) {
                matches.probe_rows.push(probe_idx);
                matches.build_rows.push(build_row);
            }
        }
        Ok(matches)
    }

    fn find_group(&self, key: &KeyTuple<'_>) -> Option<&GroupEntry> {
        if key.len() != self.policy.arity() {
            return None;
        }
        // Null never matches when null keys are not indexed.
        if !self.policy.stores_nulls() && key.has_null() {
            return None;
        }
        let hash = self.policy.hash(key);
        self.groups.find(hash, |group| {
            group.hash == hash && self.policy.equals(key, group.representative)
        })
    }

    fn refresh_accounting(&mut self) {
        let Some(tracker) = self.mem_tracker.as_ref() else {
            return;
        };
        let bytes = self.tracked_bytes();
        let delta = bytes - self.accounted_bytes;
        if delta > 0 {
            tracker.consume(delta);
        } else if delta < 0 {
            tracker.release(-delta);
        }
        self.accounted_bytes = bytes;
    }

    fn tracked_bytes(&self) -> i64 {
        fn vec_bytes<T>(v: &Vec<T>) -> i64 {
            let bytes = v.capacity().saturating_mul(mem::size_of::<T>());
            i64::try_from(bytes).unwrap_or(i64::MAX)
        }
        // One control byte per bucket on top of the entry itself.
        let group_bytes = self
            .groups
            .capacity()
            .saturating_mul(mem::size_of::<GroupEntry>() + 1);

        vec_bytes(&self.group_head)
            .saturating_add(vec_bytes(&self.entry_rows))
            .saturating_add(vec_bytes(&self.entry_next))
            .saturating_add(i64::try_from(group_bytes).unwrap_or(i64::MAX))
    }
}

impl Drop for JoinHashIndex<'_> {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Cursor {
    /// Walks one group through `entry_next`.
    Chain(u32),
    /// Walks `entry_rows[pos..end]`.
    Range { pos: usize, end: usize },
}

/// Forward-only cursor over the result of one [`JoinHashIndex::scan`].
#[derive(Clone, Debug)]
pub struct JoinHashIterator<'i> {
    entry_rows: &'i [RowRef],
    entry_next: &'i [u32],
    cursor: Cursor,
}

impl<'i> JoinHashIterator<'i> {
    fn full(entry_rows: &'i [RowRef], entry_next: &'i [u32]) -> Self {
        Self {
            entry_rows,
            entry_next,
            cursor: Cursor::Range {
                pos: 0,
                end: entry_rows.len(),
            },
        }
    }

    fn chain(entry_rows: &'i [RowRef], entry_next: &'i [u32], head: u32) -> Self {
        Self {
            entry_rows,
            entry_next,
            cursor: Cursor::Chain(head),
        }
    }

    fn empty(entry_rows: &'i [RowRef], entry_next: &'i [u32]) -> Self {
        Self::chain(entry_rows, entry_next, ENTRY_NONE)
    }

    pub fn has_next(&self) -> bool {
        match self.cursor {
            Cursor::Chain(entry) => entry != ENTRY_NONE,
            Cursor::Range { pos, end } => pos < end,
        }
    }

    /// Next matching row, or `None` once the range is exhausted (on every later call too).
    pub fn get_next(&mut self) -> Option<RowRef> {
        match self.cursor {
            Cursor::Chain(entry) => {
                if entry == ENTRY_NONE {
                    return None;
                }
                let slot = entry as usize;
                match (self.entry_rows.get(slot), self.entry_next.get(slot)) {
                    (Some(row), Some(next)) => {
                        self.cursor = Cursor::Chain(*next);
                        Some(*row)
                    }
                    _ => {
                        self.cursor = Cursor::Chain(ENTRY_NONE);
                        None
                    }
                }
            }
            Cursor::Range { pos, end } => {
                if pos >= end {
                    return None;
                }
                let row = self.entry_rows.get(pos).copied();
                self.cursor = match row {
                    Some(_) => Cursor::Range { pos: pos + 1, end },
                    None => Cursor::Range { pos: end, end },
                };
                row
            }
        }
    }

    /// Drop the remaining matches.
    pub fn skip_to_end(&mut self) {
        self.cursor = match self.cursor {
            Cursor::Chain(_) => Cursor::Chain(ENTRY_NONE),
            Cursor::Range { end, .. } => Cursor::Range { pos: end, end },
        };
    }
}

impl Iterator for JoinHashIterator<'_> {
    type Item = RowRef;

    fn next(&mut self) -> Option<RowRef> {
        self.get_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.cursor {
            Cursor::Range { pos, end } => {
                let remaining = end.saturating_sub(pos);
                (remaining, Some(remaining))
            }
            Cursor::Chain(entry) if entry == ENTRY_NONE => (0, Some(0)),
            Cursor::Chain(_) => (1, Some(self.entry_rows.len())),
        }
    }
}

impl FusedIterator for JoinHashIterator<'_> {}

/// Matches of a chunk probe as parallel vectors: `probe_rows[i]` matched `build_rows[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinMatches {
    pub probe_rows: Vec<u32>,
    pub build_rows: Vec<RowRef>,
}

impl JoinMatches {
    pub fn len(&self) -> usize {
        self.probe_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probe_rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, RowRef)> + '_ {
        self.probe_rows
            .iter()
            .copied()
            .zip(self.build_rows.iter().copied())
    }
}
