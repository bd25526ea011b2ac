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
//! Hash and equality contract shared by build-side inserts and probe-side lookups.
//!
//! Both sides evaluate their key expressions into a [`KeyTuple`] before touching the
//! table. The tuple is handed to the table closures as an explicit argument, and the
//! stored side of every comparison is a group's representative build row, whose keys
//! are evaluated with the build key set. A probe tuple and a build row with equal
//! key values hash through the same seeded, order-sensitive combination.

use crate::common::ids::RowRef;
use crate::exec::expr::{KeyExprSet, KeyTuple, KeyValue};
use crate::exec::hash_table::build_rows::BuildRowArena;

use super::hash::{
    canonical_f64_bits, combine_hash, hash_bytes_with_seed, hash_i128_with_seed,
    hash_null_with_seed, hash_u64_with_seed,
};

pub(crate) struct KeyPolicy<'a> {
    rows: &'a BuildRowArena,
    build_exprs: KeyExprSet,
    stores_nulls: bool,
    seed: u64,
}

impl<'a> KeyPolicy<'a> {
    pub(crate) fn new(
        rows: &'a BuildRowArena,
        build_exprs: KeyExprSet,
        stores_nulls: bool,
        seed: u64,
    ) -> Self {
        Self {
            rows,
            build_exprs,
            stores_nulls,
            seed,
        }
    }

    pub(crate) fn rows(&self) -> &'a BuildRowArena {
        self.rows
    }

    pub(crate) fn build_exprs(&self) -> &KeyExprSet {
        &self.build_exprs
    }

    pub(crate) fn stores_nulls(&self) -> bool {
        self.stores_nulls
    }

    pub(crate) fn arity(&self) -> usize {
        self.build_exprs.len()
    }

    pub(crate) fn hash(&self, key: &KeyTuple<'_>) -> u64 {
        key.values().iter().fold(self.seed, |acc, value| {
            combine_hash(acc, hash_key_value(self.seed, value))
        })
    }

    /// Position-wise equality of `key` and the build keys of `stored`. Null equals
    /// null only when the index stores nulls. A row outside the arena equals nothing.
    #[inline]
    pub(crate) fn equals(&self, key: &KeyTuple<'_>, stored: RowRef) -> bool {
        if key.len() != self.build_exprs.len() {
            return false;
        }
        let Ok(row) = self.rows.row(stored) else {
            return false;
        };
        self.build_exprs
            .exprs()
            .iter()
            .zip(key.values())
            .all(|(expr, value)| key_values_equal(&expr.evaluate(row), value, self.stores_nulls))
    }
}

pub(crate) fn hash_key_value(seed: u64, value: &KeyValue<'_>) -> u64 {
    match value {
        KeyValue::Null => hash_null_with_seed(seed),
        KeyValue::Boolean(v) => hash_u64_with_seed(seed, *v as u64),
        KeyValue::Int(v) => hash_u64_with_seed(seed, *v as u64),
        KeyValue::LargeInt(v) => hash_i128_with_seed(seed, *v),
        KeyValue::Float(v) => hash_u64_with_seed(seed, canonical_f64_bits(*v)),
        KeyValue::Utf8(v) => hash_bytes_with_seed(seed, v.as_bytes()),
        KeyValue::Binary(v) => hash_bytes_with_seed(seed, v),
    }
}

#[inline]
pub(crate) fn key_values_equal(a: &KeyValue<'_>, b: &KeyValue<'_>, null_safe: bool) -> bool {
    match (a, b) {
        (KeyValue::Null, KeyValue::Null) => null_safe,
        (KeyValue::Null, _) | (_, KeyValue::Null) => false,
        (KeyValue::Boolean(x), KeyValue::Boolean(y)) => x == y,
        (KeyValue::Int(x), KeyValue::Int(y)) => x == y,
        (KeyValue::LargeInt(x), KeyValue::LargeInt(y)) => x == y,
        (KeyValue::Float(x), KeyValue::Float(y)) => {
            canonical_f64_bits(*x) == canonical_f64_bits(*y)
        }
        (KeyValue::Utf8(x), KeyValue::Utf8(y)) => x == y,
        (KeyValue::Binary(x), KeyValue::Binary(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::{KeyPolicy, key_values_equal};
    use crate::common::ids::{RowRef, SlotId};
    use crate::exec::chunk::{Chunk, field_with_slot_id};
    use crate::exec::expr::{KeyExprSet, KeyTuple, KeyValue};
    use crate::exec::hash_table::build_rows::BuildRowArena;
    use crate::exec::row_desc::RowDescriptor;

    fn arena(keys: Vec<Option<i32>>, names: Vec<Option<&str>>) -> BuildRowArena {
        let schema = Arc::new(Schema::new(vec![
            field_with_slot_id(Field::new("k", DataType::Int32, true), SlotId::new(1)),
            field_with_slot_id(Field::new("s", DataType::Utf8, true), SlotId::new(2)),
        ]));
        let desc = RowDescriptor::try_new(Arc::clone(&schema)).expect("descriptor");
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(keys)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
            ],
        )
        .expect("batch");
        let mut arena = BuildRowArena::new(desc);
        arena
            .push_chunk(Chunk::try_new(batch).expect("chunk"))
            .expect("push chunk");
        arena
    }

    fn policy(rows: &BuildRowArena, stores_nulls: bool) -> KeyPolicy<'_> {
        KeyPolicy::new(
            rows,
            KeyExprSet::from_slots(&[SlotId::new(1), SlotId::new(2)]),
            stores_nulls,
            0x5eed,
        )
    }

    fn build_key<'p>(policy: &'p KeyPolicy<'_>, row: RowRef) -> KeyTuple<'p> {
        let row = policy.rows().row(row).expect("row");
        policy.build_exprs().evaluate(row)
    }

    #[test]
    fn probe_tuple_hashes_like_equal_build_row() {
        let rows = arena(vec![Some(1), Some(2)], vec![Some("a"), Some("b")]);
        let policy = policy(&rows, false);
        let probe = KeyTuple::new(vec![KeyValue::Int(2), KeyValue::Utf8("b")]);

        let build = build_key(&policy, RowRef::new(0, 1));
        assert_eq!(policy.hash(&build), policy.hash(&probe));
        assert!(policy.equals(&probe, RowRef::new(0, 1)));
        assert!(!policy.equals(&probe, RowRef::new(0, 0)));
    }

    #[test]
    fn key_order_matters_for_hash() {
        let rows = arena(vec![Some(1)], vec![Some("a")]);
        let policy = policy(&rows, false);
        let ab = KeyTuple::new(vec![KeyValue::Int(1), KeyValue::Int(2)]);
        let ba = KeyTuple::new(vec![KeyValue::Int(2), KeyValue::Int(1)]);
        assert_ne!(policy.hash(&ab), policy.hash(&ba));
    }

    #[test]
    fn null_equality_follows_policy() {
        let rows = arena(vec![None, None], vec![None, None]);
        let storing = policy(&rows, true);
        let rejecting = policy(&rows, false);
        let nulls = KeyTuple::new(vec![KeyValue::Null, KeyValue::Null]);
        assert!(storing.equals(&nulls, RowRef::new(0, 1)));
        assert!(!rejecting.equals(&nulls, RowRef::new(0, 1)));
        assert_eq!(
            storing.hash(&build_key(&storing, RowRef::new(0, 0))),
            storing.hash(&nulls)
        );

        assert!(key_values_equal(&KeyValue::Null, &KeyValue::Null, true));
        assert!(!key_values_equal(&KeyValue::Null, &KeyValue::Int(0), true));
        assert!(!key_values_equal(&KeyValue::Null, &KeyValue::Null, false));
    }

    #[test]
    fn floats_compare_canonically() {
        assert!(key_values_equal(
            &KeyValue::Float(0.0),
            &KeyValue::Float(-0.0),
            false
        ));
        assert!(key_values_equal(
            &KeyValue::Float(f64::NAN),
            &KeyValue::Float(f64::NAN),
            false
        ));
        assert!(!key_values_equal(&KeyValue::Int(1), &KeyValue::Float(1.0), false));
    }

    #[test]
    fn unknown_rows_and_short_keys_never_match() {
        let rows = arena(vec![Some(1)], vec![Some("a")]);
        let policy = policy(&rows, true);
        let probe = KeyTuple::new(vec![KeyValue::Int(1), KeyValue::Utf8("a")]);
        assert!(policy.equals(&probe, RowRef::new(0, 0)));
        assert!(!policy.equals(&probe, RowRef::new(3, 0)));
        assert!(!policy.equals(&probe, RowRef::new(0, 7)));
        let short = KeyTuple::new(vec![KeyValue::Int(1)]);
        assert!(!policy.equals(&short, RowRef::new(0, 0)));
    }
}
