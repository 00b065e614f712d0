/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Layer records and their channel image data
//!
//! The layer-info subsection is a signed layer count, that many layer
//! records back to back, and then one channel-data block per record in
//! the same order. Masks ride along inside each record's extra-data
//! field, additional chunks after the name.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::value::Value;

use crate::channels;
use crate::chunks::{ChunkContext, ChunkRegistry};
use crate::constants::{is_wide_key, BIG_RESOURCE_SIGNATURE, RESOURCE_SIGNATURE};
use crate::errors::{PsdDecodeErrors, Warning};

/// A layer bounding box in document coordinates.
///
/// Empty layers (adjustments, folders) have all-zero rectangles;
/// off-canvas layers have negative edges. Both are valid.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Rect {
    pub top:    i32,
    pub left:   i32,
    pub bottom: i32,
    pub right:  i32
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    fn decode(reader: &mut BoundedReader) -> Result<Rect, PsdDecodeErrors> {
        Ok(Rect {
            top:    reader.get_i32_be()?,
            left:   reader.get_i32_be()?,
            bottom: reader.get_i32_be()?,
            right:  reader.get_i32_be()?
        })
    }
}

/// Whether a layer clips to the layer below it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Clipping {
    Base,
    NonBase
}

/// One channel's id and stored byte length.
///
/// Ids: 0.. are color channels, -1 transparency, -2 the layer mask,
/// -3 the real (vector-rasterized) layer mask.
#[derive(Debug, Copy, Clone)]
pub struct ChannelInfo {
    pub id:     i16,
    pub length: u64
}

/// The per-layer raster mask parameters.
#[derive(Debug, Clone, Default)]
pub struct MaskInfo {
    pub rect:           Rect,
    pub default_color:  u8,
    pub relative:       bool,
    pub disabled:       bool,
    pub inverted:       bool
}

impl MaskInfo {
    fn decode(reader: &mut BoundedReader) -> Result<Option<MaskInfo>, PsdDecodeErrors> {
        if reader.len() == 0 {
            return Ok(None);
        }

        let rect = Rect::decode(reader)?;
        let default_color = reader.get_u8()?;
        let flags = reader.get_u8()?;
        // real-mask parameters and padding may follow
        reader.skip_remaining();

        Ok(Some(MaskInfo {
            rect,
            default_color,
            relative: flags & 1 != 0,
            disabled: flags & 2 != 0,
            inverted: flags & 4 != 0
        }))
    }
}

/// One parsed layer record plus its decoded channel planes.
#[derive(Clone)]
pub struct LayerRecord {
    pub rect:         Rect,
    pub channels:     Vec<ChannelInfo>,
    pub blend_mode:   [u8; 4],
    pub opacity:      u8,
    pub clipping:     Clipping,
    pub flags:        u8,
    pub name:         String,
    pub mask:         Option<MaskInfo>,
    pub additional:   Vec<([u8; 4], Value)>,
    /// Planar channel bytes, index-aligned with `channels`.
    pub channel_data: Vec<Vec<u8>>
}

impl LayerRecord {
    pub fn visible(&self) -> bool {
        self.flags & 2 == 0
    }

    pub fn transparency_protected(&self) -> bool {
        self.flags & 1 != 0
    }

    /// The decoded value of an additional-info chunk, if present.
    pub fn info(&self, key: &[u8; 4]) -> Option<&Value> {
        self.additional
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }
}

/// Parse a run of signature-keyed additional-info chunks until the
/// reader is exhausted.
///
/// `pad` is 2 inside layer records and 4 in the global tail. Decoder
/// misses and failures degrade to warnings; only runaway descriptor
/// recursion stays fatal.
pub fn parse_additional_info(
    reader: &mut BoundedReader, registry: &ChunkRegistry, context: &ChunkContext, pad: usize,
    warnings: &mut Vec<Warning>
) -> Result<Vec<([u8; 4], Value)>, PsdDecodeErrors> {
    let mut out = Vec::new();

    while reader.remaining() >= 12 {
        let signature = reader.get_fixed_bytes::<4>()?;

        if signature != RESOURCE_SIGNATURE && signature != BIG_RESOURCE_SIGNATURE {
            // lost sync; drop the rest of the section
            warnings.push(Warning::TrailingBytes {
                section: "additional layer information",
                count:   reader.skip_remaining() + 4
            });
            break;
        }

        let key = reader.get_fixed_bytes::<4>()?;
        let wide = context.psb && is_wide_key(&key);
        let declared = reader.get_length(wide)? as usize;
        let length = declared
            .next_multiple_of(pad.max(1))
            .min(reader.remaining());
        let mut body = reader.section(length)?;

        match registry.get(&key) {
            None => {
                warnings.push(Warning::UnknownChunkSignature(key));
            }
            Some(decoder) => match decoder(&mut body, context) {
                Ok(value) => {
                    // padding slack at the tail is not worth a warning
                    let slack = length - declared.min(length);
                    let left = body.remaining();

                    if left > slack {
                        warnings.push(Warning::TrailingBytes {
                            section: "layer chunk",
                            count:   left - slack
                        });
                    }
                    out.push((key, value));
                }
                Err(error @ PsdDecodeErrors::DescriptorTooDeep(_)) => {
                    return Err(error);
                }
                Err(error) => {
                    warnings.push(Warning::ChunkDecodeFailed(key, format!("{error:?}")));
                }
            }
        }
    }
    reader.skip_remaining();

    Ok(out)
}

/// Parse one layer record. The reader is the whole layer-info section;
/// channel image data is read later by [`parse_channel_data`].
pub fn parse_layer_record(
    reader: &mut BoundedReader, registry: &ChunkRegistry, context: &ChunkContext,
    warnings: &mut Vec<Warning>
) -> Result<LayerRecord, PsdDecodeErrors> {
    let rect = Rect::decode(reader)?;
    let channel_count = reader.get_u16_be()?;

    let mut channel_infos = Vec::with_capacity(usize::from(channel_count));

    for _ in 0..channel_count {
        let id = reader.get_i16_be()?;
        let length = reader.get_length(context.psb)?;

        channel_infos.push(ChannelInfo { id, length });
    }

    let signature = reader.get_fixed_bytes::<4>()?;

    if signature != RESOURCE_SIGNATURE {
        return Err(PsdDecodeErrors::Generic("Bad layer record blend signature"));
    }

    let blend_mode = reader.get_fixed_bytes::<4>()?;
    let opacity = reader.get_u8()?;
    let clipping = if reader.get_u8()? == 0 {
        Clipping::Base
    } else {
        Clipping::NonBase
    };
    let flags = reader.get_u8()?;
    let _filler = reader.get_u8()?;

    let extra_length = reader.get_u32_be()? as usize;
    let mut extra = reader.section(extra_length)?;

    let mask_length = extra.get_u32_be()? as usize;
    let mut mask_section = extra.section(mask_length)?;
    let mask = MaskInfo::decode(&mut mask_section)?;

    // blending ranges carry no information we surface
    let ranges_length = extra.get_u32_be()? as usize;
    extra.skip(ranges_length.min(extra.remaining()))?;

    let name = extra.pascal_string(4)?;

    let additional = parse_additional_info(&mut extra, registry, context, 2, warnings)?;

    Ok(LayerRecord {
        rect,
        channels: channel_infos,
        blend_mode,
        opacity,
        clipping,
        flags,
        name,
        mask,
        additional,
        channel_data: Vec::new()
    })
}

/// Decode the channel-data blocks that follow the record list, filling
/// each record's `channel_data` in order.
///
/// Mask channels (-2, -3) use the mask rectangle's dimensions;
/// everything else uses the layer rectangle's.
pub fn parse_channel_data(
    reader: &mut BoundedReader, records: &mut [LayerRecord], depth: u8, psb: bool,
    warnings: &mut Vec<Warning>
) -> Result<(), PsdDecodeErrors> {
    for record in records.iter_mut() {
        let mut planes = Vec::with_capacity(record.channels.len());

        for channel in &record.channels {
            let length = (channel.length as usize).min(reader.remaining());
            let mut body = reader.section(length)?;

            let (width, height) = match channel.id {
                -2 | -3 => {
                    let rect = record
                        .mask
                        .as_ref()
                        .map(|mask| mask.rect)
                        .unwrap_or_default();
                    (rect.width() as usize, rect.height() as usize)
                }
                _ => (record.rect.width() as usize, record.rect.height() as usize)
            };

            if width == 0 || height == 0 || length < 2 {
                body.skip_remaining();
                planes.push(Vec::new());
                continue;
            }

            match channels::decode_channel(&mut body, width, height, depth, psb) {
                Ok(plane) => planes.push(plane),
                Err(error @ PsdDecodeErrors::InflateError(_)) => return Err(error),
                Err(_) => {
                    warnings.push(Warning::TrailingBytes {
                        section: "channel image data",
                        count:   body.skip_remaining()
                    });
                    planes.push(Vec::new());
                }
            }
        }
        record.channel_data = planes;
    }

    Ok(())
}
