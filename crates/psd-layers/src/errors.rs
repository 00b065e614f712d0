/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Errors and warnings
//!
//! Fatal conditions abort the decode of the whole document and surface
//! as [`PsdDecodeErrors`]. Everything recoverable is a [`Warning`],
//! collected on the decoder and handed to the caller alongside the
//! parsed (possibly partial) document.

use alloc::string::String;
use core::fmt::{Debug, Formatter};

use psd_core::bytestream::ReaderError;
use zune_inflate::errors::InflateDecodeErrors;

use crate::constants::PSD_IDENTIFIER_BE;

/// Fatal errors that abort decoding of a document.
pub enum PsdDecodeErrors {
    WrongMagicBytes(u32),
    UnsupportedFileType(u16),
    UnsupportedChannelCount(u16),
    UnsupportedBitDepth(u16),
    UnknownColorMode(u16),
    LargeDimensions(usize, usize),
    ZeroDimensions,
    UnknownCompression(u16),
    BadRLE,
    /// A descriptor nested deeper than the configured limit.
    DescriptorTooDeep(usize),
    Truncated(ReaderError),
    InflateError(InflateDecodeErrors),
    Generic(&'static str),
    GenericString(String)
}

impl Debug for PsdDecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            PsdDecodeErrors::WrongMagicBytes(bytes) => {
                writeln!(
                    f,
                    "Expected {:?} but found {:?}, not a PSD image",
                    PSD_IDENTIFIER_BE.to_be_bytes(),
                    bytes.to_be_bytes()
                )
            }
            PsdDecodeErrors::UnsupportedFileType(version) => {
                writeln!(
                    f,
                    "Unsupported file version {version}, known versions are 1 (PSD) and 2 (PSB)"
                )
            }
            PsdDecodeErrors::UnsupportedChannelCount(channels) => {
                writeln!(f, "Unsupported channel count {channels}, expected 1..=56")
            }
            PsdDecodeErrors::UnsupportedBitDepth(depth) => {
                writeln!(
                    f,
                    "Unsupported bit depth {depth}, supported depths are 1, 8, 16 and 32"
                )
            }
            PsdDecodeErrors::UnknownColorMode(mode) => {
                writeln!(f, "Unknown color mode {mode}")
            }
            PsdDecodeErrors::LargeDimensions(supported, found) => {
                writeln!(
                    f,
                    "Too large dimensions, supported {supported} but found {found}"
                )
            }
            PsdDecodeErrors::ZeroDimensions => {
                writeln!(f, "Zero found where not expected")
            }
            PsdDecodeErrors::UnknownCompression(method) => {
                writeln!(f, "Unknown compression method {method}")
            }
            PsdDecodeErrors::BadRLE => {
                writeln!(f, "Bad RLE data")
            }
            PsdDecodeErrors::DescriptorTooDeep(limit) => {
                writeln!(f, "Descriptor nested deeper than the limit of {limit}")
            }
            PsdDecodeErrors::Truncated(e) => {
                writeln!(f, "{:?}", e)
            }
            PsdDecodeErrors::InflateError(e) => {
                writeln!(f, "Inflate error: {:?}", e)
            }
            PsdDecodeErrors::Generic(reason) => {
                writeln!(f, "{reason}")
            }
            PsdDecodeErrors::GenericString(reason) => {
                writeln!(f, "{reason}")
            }
        }
    }
}

impl From<ReaderError> for PsdDecodeErrors {
    fn from(e: ReaderError) -> Self {
        Self::Truncated(e)
    }
}

impl From<InflateDecodeErrors> for PsdDecodeErrors {
    fn from(e: InflateDecodeErrors) -> Self {
        Self::InflateError(e)
    }
}

impl From<&'static str> for PsdDecodeErrors {
    fn from(r: &'static str) -> Self {
        Self::Generic(r)
    }
}

impl From<String> for PsdDecodeErrors {
    fn from(r: String) -> Self {
        Self::GenericString(r)
    }
}

/// Recoverable conditions encountered during a decode.
///
/// Real-world PSD files bend the format constantly; each of these marks
/// a place where the decoder skipped or degraded something instead of
/// giving up on the document.
#[derive(Clone, PartialEq, Eq)]
pub enum Warning {
    /// A length-prefixed section had unconsumed bytes; the stream was
    /// realigned past them.
    TrailingBytes {
        section: &'static str,
        count:   usize
    },
    /// No decoder registered for this additional-info key, chunk skipped
    /// whole.
    UnknownChunkSignature([u8; 4]),
    /// A registered chunk decoder failed; the chunk was skipped.
    ChunkDecodeFailed([u8; 4], String),
    /// Text-layer engine data failed to parse, the layer degraded to a
    /// single default-styled run.
    EngineDataParse {
        position: usize,
        message:  String
    },
    /// A clipped layer with no base sibling to attach to.
    OrphanedClippingMask(usize),
    /// A placed layer referencing a linked file that is not in the
    /// linked-file table.
    UnresolvedLinkedFile(String),
    /// A group id shared by no other layer.
    UnresolvedGroupMembership(u32),
    /// The reserved header bytes were not zero.
    NonZeroReserved,
    /// Indexed color mode without a 768-byte palette, image degraded to
    /// grayscale.
    BadPalette(usize)
}

impl Debug for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Warning::TrailingBytes { section, count } => {
                write!(f, "{count} trailing bytes in {section}")
            }
            Warning::UnknownChunkSignature(key) => {
                write!(
                    f,
                    "osType {} not supported, chunk skipped",
                    KeyFmt(key)
                )
            }
            Warning::ChunkDecodeFailed(key, reason) => {
                write!(f, "chunk {} failed to decode: {reason}", KeyFmt(key))
            }
            Warning::EngineDataParse { position, message } => {
                write!(f, "engine data parse error at byte {position}: {message}")
            }
            Warning::OrphanedClippingMask(index) => {
                write!(f, "layer {index} has a clipping flag but no base layer")
            }
            Warning::UnresolvedLinkedFile(id) => {
                write!(f, "linked file {id:?} not present in the linked-file table")
            }
            Warning::UnresolvedGroupMembership(id) => {
                write!(f, "group id {id} is not shared by any other layer")
            }
            Warning::NonZeroReserved => {
                write!(f, "reserved header bytes are not zero")
            }
            Warning::BadPalette(len) => {
                write!(
                    f,
                    "indexed image with a {len} byte palette, expected 768, treating as grayscale"
                )
            }
        }
    }
}

/// Formats a 4-byte key as text when printable, as bytes otherwise.
struct KeyFmt<'a>(&'a [u8; 4]);

impl core::fmt::Display for KeyFmt<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in self.0 {
                write!(f, "{}", *b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}
