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
//! Row-shape descriptor for build and probe rows.
//!
//! A descriptor is the list of slots a row carries and the Arrow type of each one.
//! Key expressions bind against it at index construction; chunks are checked against
//! it before any of their rows reach the index.

use std::sync::Arc;

use arrow::datatypes::{DataType, SchemaRef};
use hashbrown::HashMap;

use crate::common::ids::SlotId;
use crate::exec::chunk::{Chunk, field_slot_id, slot_id_to_index_from_schema};

#[derive(Debug, Clone)]
pub struct RowDescriptor {
    schema: SchemaRef,
    slot_id_to_index: Arc<HashMap<SlotId, usize>>,
}

impl RowDescriptor {
    pub fn try_new(schema: SchemaRef) -> Result<Self, String> {
        let slot_id_to_index = slot_id_to_index_from_schema(schema.as_ref())?;
        Ok(Self {
            schema,
            slot_id_to_index: Arc::new(slot_id_to_index),
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.slot_id_to_index.len()
    }

    pub fn contains_slot(&self, slot_id: SlotId) -> bool {
        self.slot_id_to_index.contains_key(&slot_id)
    }

    pub fn slot_type(&self, slot_id: SlotId) -> Option<&DataType> {
        let idx = *self.slot_id_to_index.get(&slot_id)?;
        self.schema.fields().get(idx).map(|f| f.data_type())
    }

    /// Check that `chunk` carries every slot of this descriptor with the same type.
    pub fn validate_chunk(&self, chunk: &Chunk) -> Result<(), String> {
        let chunk_schema = chunk.schema();
        for field in self.schema.fields() {
            let Some(slot_id) = field_slot_id(field.as_ref())? else {
                return Err(format!("descriptor field {} has no slot id", field.name()));
            };
            let idx = chunk.column_index(slot_id).ok_or_else(|| {
                format!(
                    "chunk is missing slot {} (field {}) required by row descriptor",
                    slot_id,
                    field.name()
                )
            })?;
            let actual = chunk_schema.field(idx).data_type();
            if actual != field.data_type() {
                return Err(format!(
                    "chunk slot {} type mismatch: descriptor={:?} chunk={:?}",
                    slot_id,
                    field.data_type(),
                    actual
                ));
            }
        }
        Ok(())
    }
}
