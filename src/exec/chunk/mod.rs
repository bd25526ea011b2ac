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
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema, SchemaRef};
use hashbrown::HashMap;

use crate::common::ids::SlotId;

/// A chunk of data, consisting of multiple rows.
/// Wrapper around an Arrow `RecordBatch` whose fields carry slot ids.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
    slot_id_to_index: Arc<HashMap<SlotId, usize>>,
}

impl Chunk {
    pub fn try_new(batch: RecordBatch) -> Result<Self, String> {
        let slot_id_to_index = slot_id_to_index_from_schema(batch.schema().as_ref())?;
        Ok(Self {
            batch,
            slot_id_to_index: Arc::new(slot_id_to_index),
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn slot_id_to_index(&self) -> &HashMap<SlotId, usize> {
        &self.slot_id_to_index
    }

    pub fn column_index(&self, slot_id: SlotId) -> Option<usize> {
        self.slot_id_to_index.get(&slot_id).copied()
    }

    pub fn column_by_slot_id(&self, slot_id: SlotId) -> Result<&ArrayRef, String> {
        let idx = self.column_index(slot_id).ok_or_else(|| {
            format!(
                "slot id {} not found in chunk (num_columns={}, slot_ids={:?})",
                slot_id,
                self.batch.num_columns(),
                self.slot_id_to_index.keys().collect::<Vec<_>>()
            )
        })?;
        self.batch
            .columns()
            .get(idx)
            .ok_or_else(|| format!("slot id {} mapped to invalid index {}", slot_id, idx))
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    pub fn estimated_bytes(&self) -> usize {
        self.batch
            .columns()
            .iter()
            .map(|column| column.get_array_memory_size())
            .sum()
    }
}

/// One row of a chunk that has been checked against a row descriptor.
///
/// Only the build arena and probe chunks hand these out, so key expressions bound to
/// the same descriptor always find their slots.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRow<'a> {
    chunk: &'a Chunk,
    row: usize,
}

impl<'a> ChunkRow<'a> {
    pub(crate) fn new(chunk: &'a Chunk, row: usize) -> Self {
        Self { chunk, row }
    }

    pub fn chunk(&self) -> &'a Chunk {
        self.chunk
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn column_by_slot_id(&self, slot_id: SlotId) -> Option<&'a ArrayRef> {
        let idx = self.chunk.column_index(slot_id)?;
        self.chunk.batch.columns().get(idx)
    }
}

pub const FIELD_META_SLOT_ID: &str = "join_index.slot_id";

pub fn field_with_slot_id(field: Field, slot_id: SlotId) -> Field {
    let mut meta = field.metadata().clone();
    meta.insert(FIELD_META_SLOT_ID.to_string(), slot_id.to_string());
    field.with_metadata(meta)
}

pub fn field_slot_id(field: &Field) -> Result<Option<SlotId>, String> {
    let Some(v) = field.metadata().get(FIELD_META_SLOT_ID) else {
        return Ok(None);
    };
    Ok(Some(v.parse::<SlotId>()?))
}

pub(crate) fn slot_id_to_index_from_schema(
    schema: &Schema,
) -> Result<HashMap<SlotId, usize>, String> {
    let mut map = HashMap::with_capacity(schema.fields().len());
    for (idx, f) in schema.fields().iter().enumerate() {
        let slot_id = field_slot_id(f.as_ref())?.ok_or_else(|| {
            format!(
                "missing {} in chunk schema field at index {} (name={})",
                FIELD_META_SLOT_ID,
                idx,
                f.name()
            )
        })?;
        if map.insert(slot_id, idx).is_some() {
            return Err(format!(
                "duplicate slot id {} in chunk schema (field index {}, name={})",
                slot_id,
                idx,
                f.name()
            ));
        }
    }
    Ok(map)
}
