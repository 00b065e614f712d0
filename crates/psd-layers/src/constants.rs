/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

#![allow(clippy::upper_case_acronyms)]

/// `8BPS`, the file signature, as a big-endian u32.
pub const PSD_IDENTIFIER_BE: u32 = 0x38425053;

/// `8BIM`, the signature prefixing resource blocks, blend-mode keys and
/// additional-info chunks.
pub const RESOURCE_SIGNATURE: [u8; 4] = *b"8BIM";

/// `8B64`, the alternate chunk signature some writers emit in PSB files.
pub const BIG_RESOURCE_SIGNATURE: [u8; 4] = *b"8B64";

/// Image-resource block id of the layer group-id table.
pub const RESOURCE_LAYER_GROUP_IDS: u16 = 1026;

/// Width/height ceiling the PSD (version 1) container can express.
pub const PSD_MAX_DIMENSION: usize = 30_000;

/// Width/height ceiling the PSB (version 2) container can express.
pub const PSB_MAX_DIMENSION: usize = 300_000;

/// Document color modes, stored as a u16 in the header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ColorMode {
    Bitmap = 0,
    Grayscale = 1,
    Indexed = 2,
    RGB = 3,
    CMYK = 4,
    Multichannel = 7,
    Duotone = 8,
    Lab = 9
}

impl ColorMode {
    pub fn from_int(int: u16) -> Option<ColorMode> {
        use crate::constants::ColorMode::{
            Bitmap, Duotone, Grayscale, Indexed, Lab, Multichannel, CMYK, RGB
        };

        match int {
            0 => Some(Bitmap),
            1 => Some(Grayscale),
            2 => Some(Indexed),
            3 => Some(RGB),
            4 => Some(CMYK),
            7 => Some(Multichannel),
            8 => Some(Duotone),
            9 => Some(Lab),
            _ => None
        }
    }

    pub const fn to_int(self) -> u16 {
        self as u16
    }
}

/// Per-channel compression methods.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompressionMethod {
    NoCompression = 0,
    RLE = 1,
    Zip = 2,
    ZipPrediction = 3
}

impl CompressionMethod {
    pub fn from_int(int: u16) -> Option<CompressionMethod> {
        match int {
            0 => Some(Self::NoCompression),
            1 => Some(Self::RLE),
            2 => Some(Self::Zip),
            3 => Some(Self::ZipPrediction),
            _ => None
        }
    }
}

/// Additional-info keys whose length field widens to u64 in PSB files.
pub fn is_wide_key(key: &[u8; 4]) -> bool {
    matches!(
        key,
        b"LMsk"
            | b"Lr16"
            | b"Lr32"
            | b"Layr"
            | b"Mt16"
            | b"Mt32"
            | b"Mtrn"
            | b"Alph"
            | b"FMsk"
            | b"lnk2"
            | b"FEid"
            | b"FXid"
            | b"PxSD"
    )
}
