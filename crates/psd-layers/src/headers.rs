/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! File header and color-mode-data decoding

use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::log::trace;
use psd_core::options::DecoderOptions;

use crate::constants::{
    ColorMode, PSB_MAX_DIMENSION, PSD_IDENTIFIER_BE, PSD_MAX_DIMENSION
};
use crate::errors::{PsdDecodeErrors, Warning};

/// The 26-byte file header. Immutable once parsed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DocumentHeader {
    /// 1 for PSD, 2 for PSB.
    pub version:       u16,
    pub channel_count: u16,
    pub height:        u32,
    pub width:         u32,
    /// Bits per channel sample, one of 1, 8, 16 or 32.
    pub depth:         u16,
    pub color_mode:    ColorMode
}

impl DocumentHeader {
    /// Whether this is a large-document (PSB) file, which widens many
    /// length fields from u32 to u64.
    pub const fn is_psb(&self) -> bool {
        self.version == 2
    }

    /// Decode and validate the header.
    pub fn decode(
        reader: &mut BoundedReader, options: &DecoderOptions, warnings: &mut Vec<Warning>
    ) -> Result<DocumentHeader, PsdDecodeErrors> {
        let magic = reader.get_u32_be()?;

        if magic != PSD_IDENTIFIER_BE {
            return Err(PsdDecodeErrors::WrongMagicBytes(magic));
        }

        let version = reader.get_u16_be()?;

        if version != 1 && version != 2 {
            return Err(PsdDecodeErrors::UnsupportedFileType(version));
        }

        // 6 reserved bytes, zero in conformant files but some encoders
        // write junk here, so warn and move on
        let reserved = reader.read_bytes(6)?;

        if reserved.iter().any(|b| *b != 0) {
            warnings.push(Warning::NonZeroReserved);
        }

        let channel_count = reader.get_u16_be()?;

        if channel_count == 0 || channel_count > 56 {
            return Err(PsdDecodeErrors::UnsupportedChannelCount(channel_count));
        }

        let height = reader.get_u32_be()?;
        let width = reader.get_u32_be()?;

        let format_limit = if version == 2 {
            PSB_MAX_DIMENSION
        } else {
            PSD_MAX_DIMENSION
        };
        let width_limit = format_limit.min(options.max_width());
        let height_limit = format_limit.min(options.max_height());

        if width as usize > width_limit {
            return Err(PsdDecodeErrors::LargeDimensions(width_limit, width as usize));
        }

        if height as usize > height_limit {
            return Err(PsdDecodeErrors::LargeDimensions(
                height_limit,
                height as usize
            ));
        }

        if width == 0 || height == 0 {
            return Err(PsdDecodeErrors::ZeroDimensions);
        }

        let depth = reader.get_u16_be()?;

        if !matches!(depth, 1 | 8 | 16 | 32) {
            return Err(PsdDecodeErrors::UnsupportedBitDepth(depth));
        }

        let color_mode = reader.get_u16_be()?;

        let color_mode = ColorMode::from_int(color_mode)
            .ok_or(PsdDecodeErrors::UnknownColorMode(color_mode))?;

        trace!("Image width: {}", width);
        trace!("Image height: {}", height);
        trace!("Channels: {}", channel_count);
        trace!("Bit depth: {}", depth);
        trace!("Color mode: {:?}", color_mode);

        Ok(DocumentHeader {
            version,
            channel_count,
            height,
            width,
            depth,
            color_mode
        })
    }

    /// Re-serialize the header to its 26-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; 26] {
        let mut out = [0; 26];

        out[0..4].copy_from_slice(&PSD_IDENTIFIER_BE.to_be_bytes());
        out[4..6].copy_from_slice(&self.version.to_be_bytes());
        // bytes 6..12 are reserved zeros
        out[12..14].copy_from_slice(&self.channel_count.to_be_bytes());
        out[14..18].copy_from_slice(&self.height.to_be_bytes());
        out[18..22].copy_from_slice(&self.width.to_be_bytes());
        out[22..24].copy_from_slice(&self.depth.to_be_bytes());
        out[24..26].copy_from_slice(&self.color_mode.to_int().to_be_bytes());

        out
    }
}

/// Contents of the color-mode-data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModeData {
    None,
    /// 768 bytes, 256 entries each for red, green and blue, planar.
    Palette(Vec<u8>),
    /// Raw duotone specification, passed through unchanged.
    Duotone(Vec<u8>)
}

impl ColorModeData {
    pub fn palette(&self) -> Option<&[u8]> {
        match self {
            ColorModeData::Palette(data) => Some(data),
            _ => None
        }
    }
}

/// Decode the color-mode-data section. `reader` is the section itself.
///
/// An indexed image whose palette is not exactly 768 bytes degrades to
/// unpalettized grayscale rather than failing the document.
pub fn decode_color_mode_data(
    reader: &mut BoundedReader, color_mode: ColorMode, warnings: &mut Vec<Warning>
) -> Result<ColorModeData, PsdDecodeErrors> {
    match color_mode {
        ColorMode::Indexed => {
            if reader.len() != 768 {
                warnings.push(Warning::BadPalette(reader.len()));
                reader.skip_remaining();
                return Ok(ColorModeData::None);
            }
            let palette = reader.read_bytes(768)?.to_vec();
            Ok(ColorModeData::Palette(palette))
        }
        ColorMode::Duotone => {
            let len = reader.remaining();
            Ok(ColorModeData::Duotone(reader.read_bytes(len)?.to_vec()))
        }
        _ => {
            // other modes carry no color mode data; anything present is
            // skipped and reported by the caller's section accounting
            Ok(ColorModeData::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn header_bytes() -> [u8; 26] {
        let mut h = [0u8; 26];
        h[0..4].copy_from_slice(b"8BPS");
        h[5] = 1; // version
        h[13] = 3; // channels
        h[14..18].copy_from_slice(&64u32.to_be_bytes()); // height
        h[18..22].copy_from_slice(&32u32.to_be_bytes()); // width
        h[23] = 8; // depth
        h[25] = 3; // RGB
        h
    }

    #[test]
    fn header_round_trips() {
        let bytes = header_bytes();
        let mut warnings = vec![];
        let mut reader = BoundedReader::new(&bytes);

        let header =
            DocumentHeader::decode(&mut reader, &DecoderOptions::default(), &mut warnings).unwrap();

        assert_eq!(header.width, 32);
        assert_eq!(header.height, 64);
        assert_eq!(header.color_mode, ColorMode::RGB);
        assert!(warnings.is_empty());
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn nonzero_reserved_warns_but_decodes() {
        let mut bytes = header_bytes();
        bytes[7] = 0xAB;
        let mut warnings = vec![];
        let mut reader = BoundedReader::new(&bytes);

        DocumentHeader::decode(&mut reader, &DecoderOptions::default(), &mut warnings).unwrap();

        assert_eq!(warnings, vec![Warning::NonZeroReserved]);
    }

    #[test]
    fn psd_dimension_cap_applies() {
        let mut bytes = header_bytes();
        bytes[18..22].copy_from_slice(&40_000u32.to_be_bytes());
        let mut warnings = vec![];
        let mut reader = BoundedReader::new(&bytes);

        let err = DocumentHeader::decode(&mut reader, &DecoderOptions::default(), &mut warnings);
        assert!(matches!(err, Err(PsdDecodeErrors::LargeDimensions(..))));
    }

    #[test]
    fn short_palette_degrades() {
        let data = vec![0u8; 100];
        let mut reader = BoundedReader::new(&data);
        let mut warnings = vec![];

        let cmd =
            decode_color_mode_data(&mut reader, ColorMode::Indexed, &mut warnings).unwrap();

        assert_eq!(cmd, ColorModeData::None);
        assert_eq!(warnings, vec![Warning::BadPalette(100)]);
        assert!(reader.is_empty());
    }
}
