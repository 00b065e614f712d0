/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Action Descriptor parsing
//!
//! Descriptors are Adobe's generic structured payload: a class id plus
//! ordered (key, type tag, value) entries, nesting arbitrarily. Many
//! additional-info chunks embed one, always behind a u32 version field
//! of 16.
//!
//! The format carries no depth limit of its own, so we impose one from
//! [`DecoderOptions::max_descriptor_depth`] and fail with
//! [`PsdDecodeErrors::DescriptorTooDeep`] past it; a crafted file
//! nesting thousands of `Objc` entries would otherwise exhaust the
//! stack.

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::options::DecoderOptions;
use psd_core::value::{Descriptor, Value};

use crate::errors::PsdDecodeErrors;

/// Read a key: a u32 length followed by that many bytes, where a length
/// of zero means a plain 4-byte code.
pub(crate) fn read_key(reader: &mut BoundedReader) -> Result<String, PsdDecodeErrors> {
    let length = reader.get_u32_be()? as usize;
    let length = if length == 0 { 4 } else { length };

    let bytes = reader.read_bytes(length)?;

    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Read a bare 4-byte type tag.
fn read_tag(reader: &mut BoundedReader) -> Result<[u8; 4], PsdDecodeErrors> {
    Ok(reader.get_fixed_bytes::<4>()?)
}

/// Parse a descriptor preceded by the usual u32 version field (16).
pub fn descriptor_with_version(
    reader: &mut BoundedReader, options: &DecoderOptions
) -> Result<Descriptor, PsdDecodeErrors> {
    let version = reader.get_u32_be()?;

    if version != 16 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown descriptor version {version}, expected 16"
        )));
    }
    descriptor(reader, options)
}

/// Parse a descriptor the reader is positioned at.
pub fn descriptor(
    reader: &mut BoundedReader, options: &DecoderOptions
) -> Result<Descriptor, PsdDecodeErrors> {
    descriptor_at_depth(reader, options, 0)
}

fn descriptor_at_depth(
    reader: &mut BoundedReader, options: &DecoderOptions, depth: usize
) -> Result<Descriptor, PsdDecodeErrors> {
    if depth > options.max_descriptor_depth() {
        return Err(PsdDecodeErrors::DescriptorTooDeep(
            options.max_descriptor_depth()
        ));
    }

    // class name, usually empty
    let _name = reader.unicode_string()?;
    let class_id = read_key(reader)?;

    let item_count = reader.get_u32_be()? as usize;
    let mut entries = Vec::with_capacity(item_count.min(64));

    for _ in 0..item_count {
        let key = read_key(reader)?;
        let tag = read_tag(reader)?;
        let value = value_for_tag(reader, &tag, options, depth)?;

        entries.push((key, value));
    }

    Ok(Descriptor { class_id, entries })
}

fn value_for_tag(
    reader: &mut BoundedReader, tag: &[u8; 4], options: &DecoderOptions, depth: usize
) -> Result<Value, PsdDecodeErrors> {
    let value = match tag {
        b"Objc" | b"GlbO" => {
            let desc = descriptor_at_depth(reader, options, depth + 1)?;
            Value::Descriptor(Box::new(desc))
        }
        b"VlLs" => {
            let count = reader.get_u32_be()? as usize;
            let mut items = Vec::with_capacity(count.min(64));

            for _ in 0..count {
                let item_tag = read_tag(reader)?;
                items.push(value_for_tag(reader, &item_tag, options, depth + 1)?);
            }
            Value::List(items)
        }
        b"doub" => Value::Double(reader.get_f64_be()?),
        b"UntF" => {
            let unit = read_tag(reader)?;

            Value::UnitFloat {
                unit:  String::from_utf8_lossy(&unit).into_owned(),
                value: reader.get_f64_be()?
            }
        }
        b"TEXT" => Value::String(reader.unicode_string()?),
        b"enum" => {
            let type_id = read_key(reader)?;
            let value = read_key(reader)?;

            Value::Enum { type_id, value }
        }
        b"long" => Value::Int(i64::from(reader.get_i32_be()?)),
        b"comp" => {
            let value = reader.get_u64_be()? as i64;
            Value::Int(value)
        }
        b"bool" => Value::Bool(reader.get_u8()? != 0),
        b"type" | b"GlbC" => {
            let name = reader.unicode_string()?;
            let class_id = read_key(reader)?;

            Value::Class { name, class_id }
        }
        b"alis" => {
            let length = reader.get_u32_be()? as usize;
            Value::Alias(reader.read_bytes(length)?.to_vec())
        }
        b"tdta" => {
            let length = reader.get_u32_be()? as usize;
            Value::Bytes(reader.read_bytes(length)?.to_vec())
        }
        b"obj " => reference_list(reader)?,
        _ => {
            // payload length is not self-describing, so an unknown tag
            // cannot be skipped without losing the stream; the caller
            // degrades the whole chunk instead
            return Err(PsdDecodeErrors::GenericString(format!(
                "Unknown descriptor type tag {:?}",
                String::from_utf8_lossy(tag)
            )));
        }
    };

    Ok(value)
}

/// An `obj ` reference: a list of path elements, each modeled as a map
/// with a `kind` entry.
fn reference_list(reader: &mut BoundedReader) -> Result<Value, PsdDecodeErrors> {
    let count = reader.get_u32_be()? as usize;
    let mut items = Vec::with_capacity(count.min(64));

    for _ in 0..count {
        let form = read_tag(reader)?;
        let mut entry: Vec<(String, Value)> = Vec::new();

        let push = |entry: &mut Vec<(String, Value)>, key: &str, value: Value| {
            entry.push((key.to_string(), value));
        };

        match &form {
            b"prop" => {
                push(&mut entry, "kind", Value::String("prop".to_owned()));
                push(&mut entry, "name", Value::String(reader.unicode_string()?));
                push(&mut entry, "class_id", Value::String(read_key(reader)?));
                push(&mut entry, "key_id", Value::String(read_key(reader)?));
            }
            b"Clss" => {
                push(&mut entry, "kind", Value::String("Clss".to_owned()));
                push(&mut entry, "name", Value::String(reader.unicode_string()?));
                push(&mut entry, "class_id", Value::String(read_key(reader)?));
            }
            b"Enmr" => {
                push(&mut entry, "kind", Value::String("Enmr".to_owned()));
                push(&mut entry, "name", Value::String(reader.unicode_string()?));
                push(&mut entry, "class_id", Value::String(read_key(reader)?));
                push(&mut entry, "type_id", Value::String(read_key(reader)?));
                push(&mut entry, "value", Value::String(read_key(reader)?));
            }
            b"rele" => {
                push(&mut entry, "kind", Value::String("rele".to_owned()));
                push(&mut entry, "name", Value::String(reader.unicode_string()?));
                push(&mut entry, "class_id", Value::String(read_key(reader)?));
                push(
                    &mut entry,
                    "offset",
                    Value::Int(i64::from(reader.get_u32_be()?))
                );
            }
            b"Idnt" | b"indx" => {
                push(
                    &mut entry,
                    "kind",
                    Value::String(String::from_utf8_lossy(&form).into_owned())
                );
                push(
                    &mut entry,
                    "value",
                    Value::Int(i64::from(reader.get_u32_be()?))
                );
            }
            b"name" => {
                push(&mut entry, "kind", Value::String("name".to_owned()));
                push(&mut entry, "name", Value::String(reader.unicode_string()?));
            }
            _ => {
                return Err(PsdDecodeErrors::GenericString(format!(
                    "Unknown reference form {:?}",
                    String::from_utf8_lossy(&form)
                )));
            }
        }
        items.push(Value::Map(entry));
    }

    Ok(Value::List(items))
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    /// Minimal descriptor fixture builder.
    struct Builder {
        out: Vec<u8>
    }

    impl Builder {
        fn new() -> Builder {
            Builder { out: vec![] }
        }

        fn unicode(mut self, text: &str) -> Builder {
            let units: Vec<u16> = text.encode_utf16().collect();
            self.out
                .extend_from_slice(&(units.len() as u32).to_be_bytes());
            for unit in units {
                self.out.extend_from_slice(&unit.to_be_bytes());
            }
            self
        }

        fn key(mut self, key: &[u8; 4]) -> Builder {
            self.out.extend_from_slice(&0u32.to_be_bytes());
            self.out.extend_from_slice(key);
            self
        }

        fn tag(mut self, tag: &[u8; 4]) -> Builder {
            self.out.extend_from_slice(tag);
            self
        }

        fn u32(mut self, value: u32) -> Builder {
            self.out.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn f64(mut self, value: f64) -> Builder {
            self.out.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn byte(mut self, value: u8) -> Builder {
            self.out.push(value);
            self
        }
    }

    #[test]
    fn flat_descriptor() {
        // class "null", two items: Opct (UntF #Prc 50.0), Hide (bool 1)
        let data = Builder::new()
            .unicode("")
            .key(b"null")
            .u32(2)
            .key(b"Opct")
            .tag(b"UntF")
            .tag(b"#Prc")
            .f64(50.0)
            .key(b"Hide")
            .tag(b"bool")
            .byte(1)
            .out;

        let mut reader = BoundedReader::new(&data);
        let desc = descriptor(&mut reader, &DecoderOptions::default()).unwrap();

        assert_eq!(desc.class_id, "null");
        assert_eq!(
            desc.get("Opct"),
            Some(&Value::UnitFloat {
                unit:  "#Prc".into(),
                value: 50.0
            })
        );
        assert_eq!(desc.get("Hide"), Some(&Value::Bool(true)));
        assert!(reader.is_empty());
    }

    #[test]
    fn nested_descriptor_and_list() {
        let data = Builder::new()
            .unicode("")
            .key(b"outr")
            .u32(1)
            .key(b"Innr")
            .tag(b"Objc")
            .unicode("")
            .key(b"innr")
            .u32(1)
            .key(b"Vals")
            .tag(b"VlLs")
            .u32(2)
            .tag(b"long")
            .u32(3)
            .tag(b"long")
            .u32(9)
            .out;

        let mut reader = BoundedReader::new(&data);
        let desc = descriptor(&mut reader, &DecoderOptions::default()).unwrap();

        let inner = desc.get("Innr").and_then(Value::as_descriptor).unwrap();
        assert_eq!(
            inner.get("Vals"),
            Some(&Value::List(vec![Value::Int(3), Value::Int(9)]))
        );
    }

    #[test]
    fn depth_limit_is_enforced() {
        // descriptors nesting one Objc per level, deeper than the limit
        let mut data = vec![];
        for _ in 0..6 {
            let level = Builder::new()
                .unicode("")
                .key(b"null")
                .u32(1)
                .key(b"Chld")
                .tag(b"Objc")
                .out;
            data.extend_from_slice(&level);
        }
        // innermost empty descriptor
        data.extend_from_slice(&Builder::new().unicode("").key(b"null").u32(0).out);

        let options = DecoderOptions::default().set_max_descriptor_depth(3);
        let mut reader = BoundedReader::new(&data);
        let err = descriptor(&mut reader, &options);

        assert!(matches!(err, Err(PsdDecodeErrors::DescriptorTooDeep(3))));
    }
}
