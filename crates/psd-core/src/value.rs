/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The generic value model
//!
//! The descriptor parser, the engine-data parser and every chunk decoder
//! all produce a [`Value`], so the chunk registry can stay decoupled
//! from concrete payload types. Consumers match exhaustively; adding a
//! variant is a compile-time concern for every consumption site.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// A dynamically shaped value decoded from a PSD structure.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Map(Vec<(String, Value)>),
    Descriptor(Box<Descriptor>),
    /// A float carrying a unit system tag such as `#Pxl` or `#Prc`.
    UnitFloat { unit: String, value: f64 },
    /// Enums are stringly typed in PSD files.
    Enum { type_id: String, value: String },
    Class { name: String, class_id: String },
    Alias(Vec<u8>)
}

/// Adobe's structured key/value payload: a class id plus ordered typed
/// entries, nesting arbitrarily.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub class_id: String,
    pub entries:  Vec<(String, Value)>
}

impl Descriptor {
    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None
        }
    }

    /// Numeric coercion: integers, doubles and unit floats all read as
    /// a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UnitFloat { value, .. } => Some(*value),
            _ => None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None
        }
    }

    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Value::Descriptor(v) => Some(v),
            _ => None
        }
    }

    /// Look up a key in a `Map` or in a `Descriptor`'s entries.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            Value::Descriptor(desc) => desc.get(key),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;

    use super::*;

    #[test]
    fn map_lookup_preserves_first_entry() {
        let value = Value::Map(vec![
            ("Sz  ".to_string(), Value::Int(3)),
            ("Sz  ".to_string(), Value::Int(9)),
        ]);

        assert_eq!(value.get("Sz  ").and_then(Value::as_int), Some(3));
        assert_eq!(value.get("none"), None);
    }

    #[test]
    fn double_coercion() {
        assert_eq!(Value::Int(4).as_double(), Some(4.0));
        let unit = Value::UnitFloat {
            unit:  "#Pxl".to_string(),
            value: 2.5
        };
        assert_eq!(unit.as_double(), Some(2.5));
        assert_eq!(Value::Null.as_double(), None);
    }
}
