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
use std::fmt;
use std::str::FromStr;

/// Column identity shared by row descriptors, chunks and key expressions.
///
/// A slot id is attached to every Arrow field through field metadata so that key
/// expressions can address a column without depending on its position.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SlotId(pub u32);

impl SlotId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SlotId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s
            .parse::<u32>()
            .map_err(|e| format!("invalid slot id string '{}': {}", s, e))?;
        Ok(Self(v))
    }
}

/// Stable handle of one build row: the chunk index inside the build arena and the
/// row offset inside that chunk.
///
/// The handle never owns the row. The arena that produced it stays the sole owner.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RowRef {
    pub chunk: u32,
    pub row: u32,
}

impl RowRef {
    pub const fn new(chunk: u32, row: u32) -> Self {
        Self { chunk, row }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::{RowRef, SlotId};

    #[test]
    fn slot_id_parses_from_metadata_string() {
        assert_eq!("17".parse::<SlotId>(), Ok(SlotId::new(17)));
        assert!("-1".parse::<SlotId>().is_err());
        assert!("abc".parse::<SlotId>().is_err());
    }

    #[test]
    fn row_ref_orders_by_chunk_then_row() {
        let mut refs = vec![RowRef::new(1, 0), RowRef::new(0, 3), RowRef::new(0, 1)];
        refs.sort();
        assert_eq!(
            refs,
            vec![RowRef::new(0, 1), RowRef::new(0, 3), RowRef::new(1, 0)]
        );
        assert_eq!(RowRef::new(2, 9).to_string(), "2:9");
    }
}
