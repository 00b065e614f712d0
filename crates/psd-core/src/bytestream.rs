/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! A bounded big-endian byte reader
//!
//! Every length-prefixed structure in a PSD file is read through a
//! [`BoundedReader`]: a slice cursor whose reads are charged against the
//! number of bytes the enclosing structure declared. A read past the
//! budget fails with [`ReaderError::TruncatedInput`] instead of bleeding
//! into the next section.
//!
//! [`BoundedReader::section`] is the important call: it carves a child
//! reader out of the next `length` bytes and advances the parent past
//! the whole section *immediately*. Whatever happens inside the child,
//! success, early return or error, the parent stays aligned for the
//! section that follows.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Formatter;

/// Errors from the bounded reader.
pub enum ReaderError {
    /// A read wanted more bytes than the section budget had left.
    TruncatedInput {
        requested: usize,
        available: usize
    }
}

impl core::fmt::Debug for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ReaderError::TruncatedInput {
                requested,
                available
            } => {
                writeln!(
                    f,
                    "Truncated input, needed {requested} bytes but the section has {available} left"
                )
            }
        }
    }
}

/// A cursor over a byte slice with big-endian reads and a byte budget.
///
/// The budget is the length of the slice itself; child readers made by
/// [`section`](BoundedReader::section) borrow a sub-slice and therefore
/// carry their own, smaller budget.
#[derive(Clone)]
pub struct BoundedReader<'a> {
    data:     &'a [u8],
    position: usize
}

macro_rules! get_be_type {
    ($name:tt, $int_type:tt) => {
        #[doc = concat!("Read a big-endian `", stringify!($int_type), "`.")]
        #[inline]
        pub fn $name(&mut self) -> Result<$int_type, ReaderError> {
            const SIZE_OF_VAL: usize = core::mem::size_of::<$int_type>();

            let bytes = self.read_bytes(SIZE_OF_VAL)?;

            Ok($int_type::from_be_bytes(bytes.try_into().unwrap()))
        }
    };
}

impl<'a> BoundedReader<'a> {
    pub fn new(data: &'a [u8]) -> BoundedReader<'a> {
        BoundedReader { data, position: 0 }
    }

    /// Bytes consumed so far, relative to the start of this section.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes left in this section's budget.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Total budget of this section.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read `num` bytes, returning a slice borrowed from the source.
    #[inline]
    pub fn read_bytes(&mut self, num: usize) -> Result<&'a [u8], ReaderError> {
        if num > self.remaining() {
            return Err(ReaderError::TruncatedInput {
                requested: num,
                available: self.remaining()
            });
        }
        let out = &self.data[self.position..self.position + num];
        self.position += num;

        Ok(out)
    }

    /// Read `N` bytes into a fixed array.
    #[inline]
    pub fn get_fixed_bytes<const N: usize>(&mut self) -> Result<[u8; N], ReaderError> {
        let bytes = self.read_bytes(N)?;

        Ok(bytes.try_into().unwrap())
    }

    /// Advance past `num` bytes without looking at them.
    #[inline]
    pub fn skip(&mut self, num: usize) -> Result<(), ReaderError> {
        self.read_bytes(num).map(|_| ())
    }

    /// Explicitly discard whatever is left of the budget, returning how
    /// many bytes were dropped.
    #[inline]
    pub fn skip_remaining(&mut self) -> usize {
        let left = self.remaining();
        self.position = self.data.len();
        left
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ReaderError> {
        self.read_bytes(1).map(|b| b[0])
    }

    #[inline]
    pub fn get_i8(&mut self) -> Result<i8, ReaderError> {
        self.get_u8().map(|b| b as i8)
    }

    get_be_type!(get_u16_be, u16);
    get_be_type!(get_u32_be, u32);
    get_be_type!(get_u64_be, u64);
    get_be_type!(get_i16_be, i16);
    get_be_type!(get_i32_be, i32);

    /// Read a big-endian `f32`.
    #[inline]
    pub fn get_f32_be(&mut self) -> Result<f32, ReaderError> {
        self.get_u32_be().map(f32::from_bits)
    }

    /// Read a big-endian `f64`.
    #[inline]
    pub fn get_f64_be(&mut self) -> Result<f64, ReaderError> {
        self.get_u64_be().map(f64::from_bits)
    }

    /// Read a length field that widens from `u32` to `u64` in PSB files.
    #[inline]
    pub fn get_length(&mut self, wide: bool) -> Result<u64, ReaderError> {
        if wide {
            self.get_u64_be()
        } else {
            self.get_u32_be().map(u64::from)
        }
    }

    /// Carve the next `length` bytes into a child reader and advance
    /// this reader past all of them.
    ///
    /// The caller should reconcile the child when done with it: a child
    /// with a nonzero [`remaining`](BoundedReader::remaining) budget
    /// means the section carried trailing bytes.
    pub fn section(&mut self, length: usize) -> Result<BoundedReader<'a>, ReaderError> {
        let bytes = self.read_bytes(length)?;

        Ok(BoundedReader::new(bytes))
    }

    /// Read a Pascal string: a `u8` length, that many bytes, padded so
    /// the whole field is a multiple of `pad` bytes.
    ///
    /// Layer names use `pad = 4`, image-resource names `pad = 2`.
    pub fn pascal_string(&mut self, pad: usize) -> Result<String, ReaderError> {
        let length = usize::from(self.get_u8()?);
        let bytes = self.read_bytes(length)?;
        let name = String::from_utf8_lossy(bytes).into_owned();

        if pad > 1 {
            let consumed = length + 1;
            let padded = consumed.next_multiple_of(pad);
            self.skip(padded - consumed)?;
        }

        Ok(name)
    }

    /// Read a Unicode string: a `u32` count of UTF-16BE code units
    /// followed by the units themselves. A trailing NUL is dropped.
    pub fn unicode_string(&mut self) -> Result<String, ReaderError> {
        let count = self.get_u32_be()? as usize;
        let bytes = self.read_bytes(count * 2)?;

        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes(pair.try_into().unwrap()))
            .collect();

        while units.last() == Some(&0) {
            units.pop();
        }

        Ok(String::from_utf16_lossy(&units))
    }
}
