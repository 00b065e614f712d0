/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Engine-data parsing
//!
//! Text layers embed a second, text-based mini-language describing runs,
//! fonts and paragraph styling. It looks like a PostScript dictionary:
//!
//! ```text
//! << /EngineDict << /Editor << /Text (Hello) >> >> >>
//! ```
//!
//! `<<`/`>>` delimit dictionaries, `[`/`]` arrays, `(`/`)` strings
//! (optionally UTF-16BE with a BOM, backslash-escaped), properties are
//! `/Name`, booleans are bare `true`/`false` and numbers are decimal
//! literals.
//!
//! A parse failure here is recoverable by design: the caller degrades
//! the text layer to a single default-styled run instead of failing the
//! document.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};

use psd_core::value::Value;

/// A grammar violation, with the byte offset it was found at.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineDataError {
    pub position: usize,
    pub message:  String
}

impl Debug for EngineDataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "engine data error at byte {}: {}", self.position, self.message)
    }
}

/// Parse an engine-data payload. The document is a single dictionary.
pub fn parse(data: &[u8]) -> Result<Value, EngineDataError> {
    let mut parser = Parser { data, position: 0 };

    parser.skip_whitespace();
    let root = parser.dictionary()?;
    parser.skip_whitespace();

    if parser.position != parser.data.len() {
        return Err(parser.error("trailing bytes after the root dictionary"));
    }

    Ok(root)
}

struct Parser<'a> {
    data:     &'a [u8],
    position: usize
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> EngineDataError {
        EngineDataError {
            position: self.position,
            message:  message.to_string()
        }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.position += 1;
        }
        byte
    }

    fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            if matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | 0) {
                self.position += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), EngineDataError> {
        match self.bump() {
            Some(byte) if byte == expected => Ok(()),
            Some(byte) => Err(EngineDataError {
                position: self.position - 1,
                message:  format!("expected {:?}, found {:?}", expected as char, byte as char)
            }),
            None => Err(self.error("unexpected end of input"))
        }
    }

    /// dictionary = `<<` (property value)* `>>`
    fn dictionary(&mut self) -> Result<Value, EngineDataError> {
        self.expect(b'<')?;
        self.expect(b'<')?;

        let mut entries: Vec<(String, Value)> = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.expect(b'>')?;
                    self.expect(b'>')?;
                    return Ok(Value::Map(entries));
                }
                Some(b'/') => {
                    let name = self.property()?;
                    self.skip_whitespace();
                    let value = self.value()?;
                    entries.push((name, value));
                }
                Some(_) => return Err(self.error("expected a /property or >>")),
                None => return Err(self.error("unterminated dictionary"))
            }
        }
    }

    /// property = `/` + alphanumeric run
    fn property(&mut self) -> Result<String, EngineDataError> {
        self.expect(b'/')?;

        let start = self.position;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'.' {
                self.position += 1;
            } else {
                break;
            }
        }

        if self.position == start {
            return Err(self.error("empty property name"));
        }

        Ok(String::from_utf8_lossy(&self.data[start..self.position]).into_owned())
    }

    fn array(&mut self) -> Result<Value, EngineDataError> {
        self.expect(b'[')?;

        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.position += 1;
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.value()?),
                None => return Err(self.error("unterminated array"))
            }
        }
    }

    fn value(&mut self) -> Result<Value, EngineDataError> {
        match self.peek() {
            Some(b'<') => self.dictionary(),
            Some(b'[') => self.array(),
            Some(b'(') => self.string(),
            Some(b't') | Some(b'f') => self.boolean(),
            Some(byte) if byte == b'-' || byte == b'+' || byte == b'.' || byte.is_ascii_digit() => {
                self.number()
            }
            Some(_) => Err(self.error("expected a value")),
            None => Err(self.error("unexpected end of input"))
        }
    }

    /// string = `(` bytes `)`; a leading UTF-16BE BOM switches the
    /// decoding, a backslash escapes the next byte.
    fn string(&mut self) -> Result<Value, EngineDataError> {
        self.expect(b'(')?;

        let mut raw: Vec<u8> = Vec::new();

        loop {
            match self.bump() {
                Some(b')') => break,
                Some(b'\\') => match self.bump() {
                    Some(escaped) => raw.push(escaped),
                    None => return Err(self.error("unterminated escape"))
                },
                Some(byte) => raw.push(byte),
                None => return Err(self.error("unterminated string"))
            }
        }

        let text = if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
            let units: Vec<u16> = raw[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::from_utf8_lossy(&raw).into_owned()
        };

        Ok(Value::String(text))
    }

    fn boolean(&mut self) -> Result<Value, EngineDataError> {
        let rest = &self.data[self.position..];

        if rest.starts_with(b"true") {
            self.position += 4;
            Ok(Value::Bool(true))
        } else if rest.starts_with(b"false") {
            self.position += 5;
            Ok(Value::Bool(false))
        } else {
            Err(self.error("expected true or false"))
        }
    }

    /// Numbers without a decimal point parse as integers when they fit
    /// in 64 bits, everything else as doubles.
    fn number(&mut self) -> Result<Value, EngineDataError> {
        let start = self.position;

        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.position += 1;
        }
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() || byte == b'.' {
                self.position += 1;
            } else {
                break;
            }
        }

        let literal = &self.data[start..self.position];

        if literal.is_empty() || literal == b"-" || literal == b"+" {
            return Err(self.error("expected a number"));
        }

        let text = core::str::from_utf8(literal).map_err(|_| self.error("bad number literal"))?;

        if !text.contains('.') {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Value::Int(value));
            }
        }

        // ".5" and "-.2" style literals appear in real files; f64's
        // grammar accepts them as-is
        match text.parse::<f64>() {
            Ok(value) => Ok(Value::Double(value)),
            Err(_) => Err(self.error("bad number literal"))
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn flat_dictionary() {
        let value = parse(b"<</Text (Hello)/Size 12.5/Bold true>>").unwrap();

        assert_eq!(value.get("Text").and_then(Value::as_str), Some("Hello"));
        assert_eq!(value.get("Size"), Some(&Value::Double(12.5)));
        assert_eq!(value.get("Bold"), Some(&Value::Bool(true)));
    }

    #[test]
    fn nesting_and_arrays() {
        let value = parse(
            b"<<\n/EngineDict <<\n/Values [ 0 1.0 -.5 ]\n/Flag false\n>>\n>>"
        )
        .unwrap();

        let inner = value.get("EngineDict").unwrap();
        assert_eq!(
            inner.get("Values"),
            Some(&Value::List(vec![
                Value::Int(0),
                Value::Double(1.0),
                Value::Double(-0.5)
            ]))
        );
        assert_eq!(inner.get("Flag"), Some(&Value::Bool(false)));
    }

    #[test]
    fn utf16_string_with_bom() {
        let mut data: Vec<u8> = b"<</Text (".to_vec();
        data.extend_from_slice(&[0xFE, 0xFF, 0x00, b'H', 0x00, b'i']);
        data.extend_from_slice(b")>>");

        let value = parse(&data).unwrap();
        assert_eq!(value.get("Text").and_then(Value::as_str), Some("Hi"));
    }

    #[test]
    fn escaped_parenthesis() {
        let value = parse(b"<</Text (a\\)b)>>").unwrap();
        assert_eq!(value.get("Text").and_then(Value::as_str), Some("a)b"));
    }

    #[test]
    fn error_carries_position() {
        let err = parse(b"<</Name >>").unwrap_err();
        assert_eq!(err.position, 8);
    }

    #[test]
    fn integer_vs_double() {
        let value = parse(b"<</A 12/B 12.0>>").unwrap();
        assert_eq!(value.get("A"), Some(&Value::Int(12)));
        assert_eq!(value.get("B"), Some(&Value::Double(12.0)));
    }
}
