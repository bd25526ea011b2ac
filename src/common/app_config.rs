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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<JoinIndexAppConfig> = OnceLock::new();

const CONFIG_ENV: &str = "JOIN_INDEX_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "join_index.toml";

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static JoinIndexAppConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = JoinIndexAppConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static JoinIndexAppConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = JoinIndexAppConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

/// The process config if one has been loaded. Never reads the filesystem.
pub fn loaded() -> Option<&'static JoinIndexAppConfig> {
    CONFIG.get()
}

pub fn config() -> Result<&'static JoinIndexAppConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow!(
        "missing config file: set ${} or create ./{}",
        CONFIG_ENV,
        DEFAULT_CONFIG_FILE
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct JoinIndexAppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "join_hash_index=trace"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub join_index: JoinIndexConfig,
}

impl JoinIndexAppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("parse toml: {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: JoinIndexAppConfig = toml::from_str(s)?;
        cfg.join_index.validate()?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> &str {
        match self.log_filter.as_deref() {
            Some(filter) if !filter.trim().is_empty() => filter,
            _ => &self.log_level,
        }
    }
}

impl Default for JoinIndexAppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            join_index: JoinIndexConfig::default(),
        }
    }
}

/// Sizing and hashing knobs for one join hash index.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct JoinIndexConfig {
    /// Number of key groups reserved in the hash table up front.
    #[serde(default = "default_initial_group_capacity")]
    pub initial_group_capacity: usize,
    /// Number of entries reserved in the row chain arrays up front.
    #[serde(default = "default_initial_entry_capacity")]
    pub initial_entry_capacity: usize,
    /// Fixed hash seed. A random seed is drawn per index when absent.
    #[serde(default)]
    pub hash_seed: Option<u64>,
}

fn default_initial_group_capacity() -> usize {
    1024
}
fn default_initial_entry_capacity() -> usize {
    4096
}

impl JoinIndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_entry_capacity > u32::MAX as usize {
            return Err(anyhow!(
                "join_index.initial_entry_capacity {} exceeds the entry limit {}",
                self.initial_entry_capacity,
                u32::MAX
            ));
        }
        if self.initial_group_capacity > self.initial_entry_capacity {
            return Err(anyhow!(
                "join_index.initial_group_capacity {} is larger than initial_entry_capacity {}",
                self.initial_group_capacity,
                self.initial_entry_capacity
            ));
        }
        Ok(())
    }
}

impl Default for JoinIndexConfig {
    fn default() -> Self {
        Self {
            initial_group_capacity: default_initial_group_capacity(),
            initial_entry_capacity: default_initial_entry_capacity(),
            hash_seed: None,
        }
    }
}
