//! The memory-event stream emitted during execution.
//!
//! Events describe scope lifetimes and binding changes in strict program
//! order, so a host can replay them as a step-by-step visualization. Values
//! are snapshotted into a serializable mirror at emission time.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::eval::{EnumPayload, Value};

/// A serializable snapshot of a runtime value.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    Array(Vec<EventValue>),
    Tuple(Vec<EventValue>),
    Struct {
        name: String,
        fields: BTreeMap<String, EventValue>,
    },
    Enum {
        enum_type: String,
        variant: String,
        payload: Option<Box<EventValue>>,
    },
    /// Closures and function references are rendered, not inspected.
    Fn {
        repr: String,
    },
}

impl EventValue {
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Int(n) => EventValue::Int(*n),
            Value::Bool(b) => EventValue::Bool(*b),
            Value::Str(s) => EventValue::Str(s.clone()),
            Value::Null => EventValue::Null,
            Value::Array(items) => {
                EventValue::Array(items.iter().map(EventValue::from_value).collect())
            }
            Value::Tuple(items) => {
                EventValue::Tuple(items.iter().map(EventValue::from_value).collect())
            }
            Value::Struct { name, fields } => EventValue::Struct {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), EventValue::from_value(v)))
                    .collect(),
            },
            Value::Enum {
                enum_type,
                variant,
                payload,
            } => EventValue::Enum {
                enum_type: enum_type.clone(),
                variant: variant.clone(),
                payload: match payload {
                    EnumPayload::None => None,
                    EnumPayload::Single(inner) => {
                        Some(Box::new(EventValue::from_value(inner)))
                    }
                    EnumPayload::Fields(fields) => Some(Box::new(EventValue::Struct {
                        name: format!("{}::{}", enum_type, variant),
                        fields: fields
                            .iter()
                            .map(|(k, v)| (k.clone(), EventValue::from_value(v)))
                            .collect(),
                    })),
                },
            },
            Value::Closure { .. } | Value::FnRef(_) => EventValue::Fn {
                repr: v.to_string(),
            },
        }
    }
}

/// One entry of the event trace. `scope_id` values are opaque but stable:
/// the global scope is 0, and every block, function body, lambda body, and
/// for-loop iteration gets a fresh id on entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemEvent {
    EnterScope {
        scope_id: u64,
        parent_scope_id: Option<u64>,
    },
    ExitScope {
        scope_id: u64,
    },
    Declare {
        scope_id: u64,
        name: String,
        value: EventValue,
        moved: bool,
    },
    Update {
        scope_id: u64,
        name: String,
        value: EventValue,
        moved: bool,
    },
    Move {
        scope_id: u64,
        name: String,
        value: EventValue,
        moved: bool,
    },
}
