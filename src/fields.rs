// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Conversion of descriptor values into AMQP field values.
//!
//! Free-form `arguments` and `headers` entries of a descriptor are JSON; the
//! broker expects AMQP field tables.

use crate::descriptor::Descriptor;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde_json::Value;
use std::collections::BTreeMap;

/// Converts a JSON value into its closest AMQP counterpart.
pub fn to_amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(v) => AMQPValue::Boolean(*v),
        Value::Number(v) => match v.as_i64() {
            Some(int) => AMQPValue::LongLongInt(int),
            None => AMQPValue::Double(v.as_f64().unwrap_or_default()),
        },
        Value::String(v) => AMQPValue::LongString(LongString::from(v.as_str())),
        Value::Array(values) => AMQPValue::FieldArray(FieldArray::from(
            values.iter().map(to_amqp_value).collect::<Vec<_>>(),
        )),
        Value::Object(map) => AMQPValue::FieldTable(FieldTable::from(to_btree(map))),
    }
}

/// Converts a descriptor into an AMQP field map.
pub fn to_btree(map: &Descriptor) -> BTreeMap<ShortString, AMQPValue> {
    map.iter()
        .map(|(key, value)| (ShortString::from(key.as_str()), to_amqp_value(value)))
        .collect()
}

/// Converts a descriptor into an AMQP field table.
pub fn to_field_table(map: &Descriptor) -> FieldTable {
    FieldTable::from(to_btree(map))
}
