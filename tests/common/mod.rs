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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tempfile::TempDir;

use join_hash_index::common::ids::SlotId;
use join_hash_index::exec::chunk::{Chunk, field_with_slot_id};
use join_hash_index::exec::hash_table::{BuildRowArena, ProbeChunk};
use join_hash_index::exec::row_desc::RowDescriptor;
use join_hash_index::join_index_config;
use join_hash_index::join_index_logging;

pub const BUILD_KEY: SlotId = SlotId::new(1);
pub const BUILD_VALUE: SlotId = SlotId::new(2);
pub const PROBE_KEY: SlotId = SlotId::new(20);

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("join_index.toml");

        let config_content = r#"
log_level = "debug"

[join_index]
initial_group_capacity = 8
initial_entry_capacity = 32
hash_seed = 20240601
"#;

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    pub fn init_logging(&self) {
        let config = self.load_config().expect("Failed to load config");
        join_index_logging::init_from_config(config);
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.temp_dir.path().join("logs").join("join_index.log")
    }

    pub fn load_config(&self) -> anyhow::Result<&'static join_index_config::JoinIndexAppConfig> {
        join_index_config::init_from_path(&self.config_path)
    }
}

pub fn build_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("k", DataType::Int32, true), BUILD_KEY),
        field_with_slot_id(Field::new("v", DataType::Utf8, true), BUILD_VALUE),
    ]))
}

pub fn probe_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![field_with_slot_id(
        Field::new("pk", DataType::Int64, true),
        PROBE_KEY,
    )]))
}

pub fn build_desc() -> RowDescriptor {
    RowDescriptor::try_new(build_schema()).expect("build descriptor")
}

pub fn probe_desc() -> RowDescriptor {
    RowDescriptor::try_new(probe_schema()).expect("probe descriptor")
}

pub fn build_chunk(rows: &[(Option<i32>, &str)]) -> Chunk {
    let keys = rows.iter().map(|(k, _)| *k).collect::<Vec<_>>();
    let values = rows.iter().map(|(_, v)| Some(*v)).collect::<Vec<_>>();
    let batch = RecordBatch::try_new(
        build_schema(),
        vec![
            Arc::new(Int32Array::from(keys)) as ArrayRef,
            Arc::new(StringArray::from(values)) as ArrayRef,
        ],
    )
    .expect("build batch");
    Chunk::try_new(batch).expect("build chunk")
}

pub fn build_arena(chunks: &[&[(Option<i32>, &str)]]) -> BuildRowArena {
    let mut arena = BuildRowArena::new(build_desc());
    for rows in chunks {
        arena.push_chunk(build_chunk(rows)).expect("push build chunk");
    }
    arena
}

pub fn probe_chunk(keys: &[Option<i64>]) -> ProbeChunk {
    let batch = RecordBatch::try_new(
        probe_schema(),
        vec![Arc::new(Int64Array::from(keys.to_vec())) as ArrayRef],
    )
    .expect("probe batch");
    ProbeChunk::try_new(Chunk::try_new(batch).expect("probe chunk"), &probe_desc())
        .expect("validated probe chunk")
}
