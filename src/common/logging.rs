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
//! Process-wide `tracing` setup with glog-shaped lines.
//!
//! Every event is written as `Lyyyymmdd hh:mm:ss.uuuuuu thread file:line] fields`
//! where `L` is the level initial. Output goes to stderr unless
//! `JOIN_INDEX_LOG_FILE` (a file path) or `JOIN_INDEX_LOG_DIR` (a directory that
//! receives `join_index.log`) is set. Only the first init call in a process takes
//! effect.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

use crate::common::app_config::JoinIndexAppConfig;

pub use tracing::{debug, error, info, trace, warn};

static INIT: OnceLock<()> = OnceLock::new();

pub const LOG_FILE_ENV: &str = "JOIN_INDEX_LOG_FILE";
pub const LOG_DIR_ENV: &str = "JOIN_INDEX_LOG_DIR";
const LOG_FILE_NAME: &str = "join_index.log";

/// Formats events as glog lines.
struct GlogLine;

fn level_initial(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'T',
    }
}

/// Numeric id of the calling thread, `0` if the runtime's id format ever changes.
fn thread_number() -> u64 {
    let id = format!("{:?}", std::thread::current().id());
    id.strip_prefix("ThreadId(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Everything of a glog line before the event fields.
fn glog_prefix(
    level: &Level,
    at: &DateTime<Local>,
    thread: u64,
    file: Option<&str>,
    line: Option<u32>,
) -> String {
    format!(
        "{}{} {} {}:{}] ",
        level_initial(level),
        at.format("%Y%m%d %H:%M:%S%.6f"),
        thread,
        file.unwrap_or("unknown"),
        line.unwrap_or(0)
    )
}

impl<S, N> FormatEvent<S, N> for GlogLine
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let prefix = glog_prefix(
            meta.level(),
            &Local::now(),
            thread_number(),
            meta.file(),
            meta.line(),
        );
        write!(writer, "{}", prefix)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.to_string_lossy().trim().is_empty())
        .map(PathBuf::from)
}

/// Log file requested through the environment, if any.
fn log_file_path() -> Option<PathBuf> {
    env_path(LOG_FILE_ENV).or_else(|| env_path(LOG_DIR_ENV).map(|dir| dir.join(LOG_FILE_NAME)))
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer plus whether it may carry ansi colors. A log file that cannot be opened
/// falls back to stderr.
fn make_writer() -> (BoxMakeWriter, Option<PathBuf>, bool) {
    if let Some(path) = log_file_path() {
        match open_append(&path) {
            Ok(file) => return (BoxMakeWriter::new(Mutex::new(file)), Some(path), false),
            Err(err) => eprintln!(
                "cannot open log file {}: {}, logging to stderr",
                path.display(),
                err
            ),
        }
    }
    (
        BoxMakeWriter::new(io::stderr),
        None,
        atty::is(atty::Stream::Stderr),
    )
}

/// Install the global subscriber with an `EnvFilter` expression such as `"info"` or
/// `"join_hash_index=trace"`.
pub fn init_with_level(filter: &str) {
    INIT.get_or_init(|| {
        let (writer, file, ansi) = make_writer();
        let installed = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(writer)
            .with_ansi(ansi)
            .event_format(GlogLine)
            .try_init()
            .is_ok();
        if installed {
            match file {
                Some(path) => debug!(path = %path.display(), filter, "logging to file"),
                None => debug!(filter, "logging to stderr"),
            }
        }
    });
}

pub fn init_from_config(config: &JoinIndexAppConfig) {
    init_with_level(config.effective_log_filter());
}

pub fn init() {
    init_with_level("info");
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};
    use tracing::Level;

    use super::{glog_prefix, level_initial, thread_number};

    #[test]
    fn prefix_has_glog_shape() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 2)
            .single()
            .expect("local time");
        let prefix = glog_prefix(&Level::WARN, &at, 42, Some("src/lib.rs"), Some(17));
        assert_eq!(prefix, "W20240307 09:05:02.000000 42 src/lib.rs:17] ");

        let unknown = glog_prefix(&Level::TRACE, &at, 1, None, None);
        assert!(unknown.starts_with('T'));
        assert!(unknown.ends_with(" 1 unknown:0] "));
    }

    #[test]
    fn levels_map_to_initials() {
        let initials = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE]
            .iter()
            .map(level_initial)
            .collect::<String>();
        assert_eq!(initials, "EWIDT");
    }

    #[test]
    fn threads_have_distinct_numbers() {
        let here = thread_number();
        let there = std::thread::spawn(thread_number).join().expect("thread");
        assert_ne!(here, 0);
        assert_ne!(here, there);
    }
}
