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
//! Key expressions evaluated over build and probe rows.
//!
//! The index treats expression evaluation as a capability: anything implementing
//! [`KeyExpr`] can produce a join key value from a row. [`SlotRef`] and [`Literal`]
//! cover column keys and constant keys.

use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type,
    UInt16Type, UInt32Type,
};

use crate::common::ids::SlotId;
use crate::exec::chunk::ChunkRow;
use crate::exec::row_desc::RowDescriptor;

/// One evaluated join key value.
///
/// Strings and binaries borrow the column buffers of the row they were read from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyValue<'a> {
    Null,
    Boolean(bool),
    /// Every integer-like type: signed/unsigned ints up to 32 bits, Int64, dates and
    /// timestamps.
    Int(i64),
    LargeInt(i128),
    Float(f64),
    Utf8(&'a str),
    Binary(&'a [u8]),
}

impl KeyValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, KeyValue::Null)
    }
}

/// Value family a key type evaluates to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyClass {
    Boolean,
    Int,
    LargeInt,
    Float,
    Utf8,
    Binary,
}

/// Returns the key class of `data_type`, or `None` when the type cannot be a join key.
pub fn key_class(data_type: &DataType) -> Option<KeyClass> {
    match data_type {
        DataType::Boolean => Some(KeyClass::Boolean),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _) => Some(KeyClass::Int),
        DataType::Decimal128(_, _) => Some(KeyClass::LargeInt),
        DataType::Float32 | DataType::Float64 => Some(KeyClass::Float),
        DataType::Utf8 | DataType::LargeUtf8 => Some(KeyClass::Utf8),
        DataType::Binary | DataType::LargeBinary => Some(KeyClass::Binary),
        _ => None,
    }
}

/// Read row `row` of `array` as a key value.
///
/// A type outside [`key_class`] or a downcast mismatch reads as null; bound key
/// expressions never reach either case because chunks are validated up front.
pub fn read_key_value(array: &dyn Array, row: usize) -> KeyValue<'_> {
    if row >= array.len() || array.is_null(row) {
        return KeyValue::Null;
    }
    let value = match array.data_type() {
        DataType::Boolean => array.as_boolean_opt().map(|a| KeyValue::Boolean(a.value(row))),
        DataType::Int8 => int_value::<Int8Type>(array, row),
        DataType::Int16 => int_value::<Int16Type>(array, row),
        DataType::Int32 => int_value::<Int32Type>(array, row),
        DataType::Int64 => int_value::<Int64Type>(array, row),
        DataType::UInt8 => int_value::<UInt8Type>(array, row),
        DataType::UInt16 => int_value::<UInt16Type>(array, row),
        DataType::UInt32 => int_value::<UInt32Type>(array, row),
        DataType::Date32 => int_value::<Date32Type>(array, row),
        DataType::Date64 => int_value::<Date64Type>(array, row),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => int_value::<TimestampSecondType>(array, row),
            TimeUnit::Millisecond => int_value::<TimestampMillisecondType>(array, row),
            TimeUnit::Microsecond => int_value::<TimestampMicrosecondType>(array, row),
            TimeUnit::Nanosecond => int_value::<TimestampNanosecondType>(array, row),
        },
        DataType::Decimal128(_, _) => array
            .as_primitive_opt::<Decimal128Type>()
            .map(|a| KeyValue::LargeInt(a.value(row))),
        DataType::Float32 => array
            .as_primitive_opt::<Float32Type>()
            .map(|a| KeyValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => array
            .as_primitive_opt::<Float64Type>()
            .map(|a| KeyValue::Float(a.value(row))),
        DataType::Utf8 => array
            .as_string_opt::<i32>()
            .map(|a| KeyValue::Utf8(a.value(row))),
        DataType::LargeUtf8 => array
            .as_string_opt::<i64>()
            .map(|a| KeyValue::Utf8(a.value(row))),
        DataType::Binary => array
            .as_binary_opt::<i32>()
            .map(|a| KeyValue::Binary(a.value(row))),
        DataType::LargeBinary => array
            .as_binary_opt::<i64>()
            .map(|a| KeyValue::Binary(a.value(row))),
        _ => None,
    };
    value.unwrap_or(KeyValue::Null)
}

fn int_value<T>(array: &dyn Array, row: usize) -> Option<KeyValue<'_>>
where
    T: arrow::datatypes::ArrowPrimitiveType,
    T::Native: Into<i64>,
{
    array
        .as_primitive_opt::<T>()
        .map(|a| KeyValue::Int(a.value(row).into()))
}

/// Capability to compute one join key value from a row.
pub trait KeyExpr: fmt::Debug + Send + Sync {
    /// Check the expression against a row shape and return its result type.
    fn bind(&self, desc: &RowDescriptor) -> Result<DataType, String>;

    /// Evaluate the expression over `row`. Null results are `KeyValue::Null`.
    fn evaluate<'r>(&'r self, row: ChunkRow<'r>) -> KeyValue<'r>;
}

/// Reads one column of the row.
#[derive(Clone, Copy, Debug)]
pub struct SlotRef {
    slot_id: SlotId,
}

impl SlotRef {
    pub fn new(slot_id: SlotId) -> Self {
        Self { slot_id }
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }
}

impl KeyExpr for SlotRef {
    fn bind(&self, desc: &RowDescriptor) -> Result<DataType, String> {
        desc.slot_type(self.slot_id)
            .cloned()
            .ok_or_else(|| format!("key slot {} not found in row descriptor", self.slot_id))
    }

    #[inline]
    fn evaluate<'r>(&'r self, row: ChunkRow<'r>) -> KeyValue<'r> {
        match row.column_by_slot_id(self.slot_id) {
            Some(column) => read_key_value(column.as_ref(), row.row()),
            None => KeyValue::Null,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Int(i64),
    LargeInt(i128),
    Float(f64),
    Utf8(String),
    Binary(Vec<u8>),
}

/// Constant key, typed so it can pair with a column key of the other join side.
#[derive(Clone, Debug)]
pub struct Literal {
    value: LiteralValue,
    data_type: DataType,
}

impl Literal {
    pub fn try_new(value: LiteralValue, data_type: DataType) -> Result<Self, String> {
        let class = key_class(&data_type)
            .ok_or_else(|| format!("literal type {:?} cannot be a join key", data_type))?;
        let value_class = match &value {
            LiteralValue::Null => None,
            LiteralValue::Boolean(_) => Some(KeyClass::Boolean),
            LiteralValue::Int(_) => Some(KeyClass::Int),
            LiteralValue::LargeInt(_) => Some(KeyClass::LargeInt),
            LiteralValue::Float(_) => Some(KeyClass::Float),
            LiteralValue::Utf8(_) => Some(KeyClass::Utf8),
            LiteralValue::Binary(_) => Some(KeyClass::Binary),
        };
        if let Some(value_class) = value_class
            && value_class != class
        {
            return Err(format!(
                "literal {:?} does not fit type {:?}",
                value, data_type
            ));
        }
        // Float32 columns read as widened f32, so the literal has to round the same way.
        let value = match (value, &data_type) {
            (LiteralValue::Float(v), DataType::Float32) => {
                LiteralValue::Float(f64::from(v as f32))
            }
            (value, _) => value,
        };
        Ok(Self { value, data_type })
    }

    pub fn null(data_type: DataType) -> Result<Self, String> {
        Self::try_new(LiteralValue::Null, data_type)
    }

    pub fn value(&self) -> &LiteralValue {
        &self.value
    }
}

impl KeyExpr for Literal {
    fn bind(&self, _desc: &RowDescriptor) -> Result<DataType, String> {
        Ok(self.data_type.clone())
    }

    fn evaluate<'r>(&'r self, _row: ChunkRow<'r>) -> KeyValue<'r> {
        match &self.value {
            LiteralValue::Null => KeyValue::Null,
            LiteralValue::Boolean(v) => KeyValue::Boolean(*v),
            LiteralValue::Int(v) => KeyValue::Int(*v),
            LiteralValue::LargeInt(v) => KeyValue::LargeInt(*v),
            LiteralValue::Float(v) => KeyValue::Float(*v),
            LiteralValue::Utf8(v) => KeyValue::Utf8(v.as_str()),
            LiteralValue::Binary(v) => KeyValue::Binary(v.as_slice()),
        }
    }
}

/// Evaluated key values of one row, in key expression order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyTuple<'a> {
    values: Vec<KeyValue<'a>>,
}

impl<'a> KeyTuple<'a> {
    pub fn new(values: Vec<KeyValue<'a>>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[KeyValue<'a>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_null(&self) -> bool {
        self.values.iter().any(KeyValue::is_null)
    }

    pub fn all_null(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(KeyValue::is_null)
    }
}

/// Ordered set of key expressions for one join side.
#[derive(Clone, Debug)]
pub struct KeyExprSet {
    exprs: Vec<Arc<dyn KeyExpr>>,
}

impl KeyExprSet {
    pub fn new(exprs: Vec<Arc<dyn KeyExpr>>) -> Self {
        Self { exprs }
    }

    pub fn from_slots(slots: &[SlotId]) -> Self {
        let exprs = slots
            .iter()
            .map(|slot| Arc::new(SlotRef::new(*slot)) as Arc<dyn KeyExpr>)
            .collect();
        Self { exprs }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn exprs(&self) -> &[Arc<dyn KeyExpr>] {
        &self.exprs
    }

    /// Bind every expression against `desc`, returning the key types in order.
    pub fn bind(&self, desc: &RowDescriptor) -> Result<Vec<DataType>, String> {
        let mut types = Vec::with_capacity(self.exprs.len());
        for (idx, expr) in self.exprs.iter().enumerate() {
            let data_type = expr
                .bind(desc)
                .map_err(|e| format!("bind key expression {}: {}", idx, e))?;
            if key_class(&data_type).is_none() {
                return Err(format!(
                    "key expression {} has unsupported join key type {:?}",
                    idx, data_type
                ));
            }
            types.push(data_type);
        }
        Ok(types)
    }

    pub fn evaluate<'r>(&'r self, row: ChunkRow<'r>) -> KeyTuple<'r> {
        KeyTuple::new(self.exprs.iter().map(|expr| expr.evaluate(row)).collect())
    }

    /// True if any key of `row` evaluates to null.
    pub fn has_nulls(&self, row: ChunkRow<'_>) -> bool {
        self.exprs.iter().any(|expr| expr.evaluate(row).is_null())
    }
}
