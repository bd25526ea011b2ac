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
//! Owners of the rows a join hash index refers to.
//!
//! `BuildRowArena` owns every build chunk and hands out stable [`RowRef`]s. The
//! index only borrows the arena, so the arena outlives the index and its iterators.

use crate::common::ids::RowRef;
use crate::exec::chunk::{Chunk, ChunkRow};
use crate::exec::row_desc::RowDescriptor;

/// Append-only store of build chunks that share one row descriptor.
#[derive(Debug)]
pub struct BuildRowArena {
    desc: RowDescriptor,
    chunks: Vec<Chunk>,
    num_rows: usize,
}

impl BuildRowArena {
    pub fn new(desc: RowDescriptor) -> Self {
        Self {
            desc,
            chunks: Vec::new(),
            num_rows: 0,
        }
    }

    pub fn descriptor(&self) -> &RowDescriptor {
        &self.desc
    }

    /// Validate `chunk` against the build descriptor and take ownership of it.
    /// Returns the chunk id used in [`RowRef::chunk`].
    pub fn push_chunk(&mut self, chunk: Chunk) -> Result<u32, String> {
        self.desc
            .validate_chunk(&chunk)
            .map_err(|e| format!("build chunk rejected: {}", e))?;
        let chunk_id = u32::try_from(self.chunks.len())
            .map_err(|_| "build arena chunk count overflow".to_string())?;
        if u32::try_from(chunk.len()).is_err() {
            return Err(format!(
                "build chunk has too many rows: {} (max={})",
                chunk.len(),
                u32::MAX
            ));
        }
        self.num_rows = self
            .num_rows
            .checked_add(chunk.len())
            .ok_or_else(|| "build arena row count overflow".to_string())?;
        self.chunks.push(chunk);
        Ok(chunk_id)
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn chunk(&self, chunk_id: u32) -> Option<&Chunk> {
        self.chunks.get(chunk_id as usize)
    }

    pub fn row(&self, row_ref: RowRef) -> Result<ChunkRow<'_>, String> {
        let chunk = self
            .chunks
            .get(row_ref.chunk as usize)
            .ok_or_else(|| format!("build row {} references unknown chunk", row_ref))?;
        if row_ref.row as usize >= chunk.len() {
            return Err(format!(
                "build row {} out of bounds (chunk rows={})",
                row_ref,
                chunk.len()
            ));
        }
        Ok(ChunkRow::new(chunk, row_ref.row as usize))
    }

    /// Row references of one chunk, in row order.
    pub fn chunk_row_refs(
        &self,
        chunk_id: u32,
    ) -> Result<impl Iterator<Item = RowRef> + '_, String> {
        let chunk = self
            .chunk(chunk_id)
            .ok_or_else(|| format!("unknown build chunk {}", chunk_id))?;
        let rows = chunk.len() as u32;
        Ok((0..rows).map(move |row| RowRef::new(chunk_id, row)))
    }

    /// Every row reference of the arena, chunk by chunk.
    pub fn row_refs(&self) -> impl Iterator<Item = RowRef> + '_ {
        self.chunks.iter().enumerate().flat_map(|(chunk_id, chunk)| {
            let chunk_id = chunk_id as u32;
            (0..chunk.len() as u32).map(move |row| RowRef::new(chunk_id, row))
        })
    }
}

/// A probe-side chunk that has been checked against the probe row descriptor.
#[derive(Debug, Clone)]
pub struct ProbeChunk {
    chunk: Chunk,
}

impl ProbeChunk {
    pub fn try_new(chunk: Chunk, desc: &RowDescriptor) -> Result<Self, String> {
        desc.validate_chunk(&chunk)
            .map_err(|e| format!("probe chunk rejected: {}", e))?;
        Ok(Self { chunk })
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    pub fn row(&self, row: usize) -> Result<ProbeRow<'_>, String> {
        if row >= self.chunk.len() {
            return Err(format!(
                "probe row {} out of bounds (chunk rows={})",
                row,
                self.chunk.len()
            ));
        }
        Ok(ProbeRow(ChunkRow::new(&self.chunk, row)))
    }

    pub fn rows(&self) -> impl Iterator<Item = ProbeRow<'_>> + '_ {
        (0..self.chunk.len()).map(|row| ProbeRow(ChunkRow::new(&self.chunk, row)))
    }
}

/// One row of a [`ProbeChunk`], the argument of a keyed scan.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRow<'p>(ChunkRow<'p>);

impl<'p> ProbeRow<'p> {
    pub fn row(&self) -> usize {
        self.0.row()
    }

    pub(crate) fn chunk_row(&self) -> ChunkRow<'p> {
        self.0
    }
}
