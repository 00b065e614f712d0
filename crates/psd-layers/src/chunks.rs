/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Additional-layer-information chunk decoders
//!
//! Every layer record (and the global tail of the layer-and-mask
//! section) carries a run of signature-keyed, length-prefixed chunks.
//! The [`ChunkRegistry`] maps each 4-byte key to a decoder producing a
//! generic [`Value`]; keys with no decoder are skipped whole and
//! reported as a warning, never an error, so vendor extensions and
//! format drift cannot break a parse.
//!
//! Decoders receive a [`BoundedReader`] bounded to exactly the chunk's
//! declared length. The parent stream was advanced past the chunk when
//! the section was carved, so a decoder that fails, or consumes too
//! little, desynchronizes nothing.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::options::DecoderOptions;
use psd_core::value::Value;

use crate::constants::RESOURCE_SIGNATURE;
use crate::descriptor::descriptor_with_version;
use crate::errors::PsdDecodeErrors;

/// Context handed to every chunk decoder.
#[derive(Copy, Clone)]
pub struct ChunkContext {
    /// Whether the enclosing file is PSB (widens some lengths).
    pub psb:     bool,
    pub options: DecoderOptions
}

/// A chunk decoder: reads the chunk body out of a bounded section.
pub type ChunkDecoder =
    fn(&mut BoundedReader, &ChunkContext) -> Result<Value, PsdDecodeErrors>;

/// Dispatch table from 4-byte chunk signatures to decoders.
///
/// Built once per decoder instance; extend it with
/// [`register`](ChunkRegistry::register) before parsing starts.
pub struct ChunkRegistry {
    entries: BTreeMap<[u8; 4], ChunkDecoder>
}

impl ChunkRegistry {
    /// An empty registry. Everything will be skipped with a warning.
    pub fn new() -> ChunkRegistry {
        ChunkRegistry {
            entries: BTreeMap::new()
        }
    }

    /// The registry with every built-in decoder present.
    pub fn with_builtins() -> ChunkRegistry {
        let mut registry = ChunkRegistry::new();

        for (key, decoder) in BUILTIN_DECODERS {
            registry.register(*key, *decoder);
        }
        registry
    }

    /// Add or replace the decoder for `signature`.
    pub fn register(&mut self, signature: [u8; 4], decoder: ChunkDecoder) {
        self.entries.insert(signature, decoder);
    }

    pub fn get(&self, signature: &[u8; 4]) -> Option<ChunkDecoder> {
        self.entries.get(signature).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChunkRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[rustfmt::skip]
static BUILTIN_DECODERS: &[([u8; 4], ChunkDecoder)] = &[
    // structure
    (*b"lsct", section_divider),
    (*b"lsdk", section_divider),
    (*b"luni", unicode_name),
    (*b"lyid", layer_id),
    (*b"iOpa", fill_opacity),
    (*b"tsly", transparency_shapes),
    (*b"clbl", blend_clipped),
    (*b"knko", knockout),
    (*b"lspf", protection),
    (*b"lclr", sheet_color),
    (*b"fxrp", reference_point),
    (*b"lnsr", layer_name_source),
    (*b"lyvr", layer_version),
    // adjustment layers
    (*b"levl", levels),
    (*b"curv", curves),
    (*b"expA", exposure),
    (*b"grdm", gradient_map),
    (*b"hue2", hue_saturation),
    (*b"blnc", color_balance),
    (*b"mixr", channel_mixer),
    (*b"phfl", photo_filter),
    (*b"selc", selective_color),
    (*b"brit", brightness_contrast),
    (*b"post", posterize),
    (*b"thrs", threshold),
    (*b"nvrt", invert),
    (*b"blwh", versioned_descriptor),
    (*b"CgEd", versioned_descriptor),
    // fill layers
    (*b"SoCo", versioned_descriptor),
    (*b"GdFl", versioned_descriptor),
    (*b"PtFl", versioned_descriptor),
    // effects
    (*b"lfx2", effects_descriptor),
    (*b"lrFX", effects_layer),
    (*b"Patt", patterns),
    (*b"Pat2", patterns),
    (*b"Pat3", patterns),
    // vector data
    (*b"vmsk", vector_mask),
    (*b"vsms", vector_mask),
    (*b"vscg", vector_stroke_content),
    (*b"vstk", versioned_descriptor),
    // placed and linked layers
    (*b"SoLd", placed_layer),
    (*b"PlLd", placed_layer_legacy),
    (*b"lnk2", linked_layers),
    (*b"lnkD", linked_layers),
    (*b"lnk3", linked_layers),
    // text
    (*b"TySh", type_tool),
    // metadata
    (*b"shmd", metadata_setting),
];

fn map_of(pairs: Vec<(&str, Value)>) -> Value {
    Value::Map(
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    )
}

fn tag_string(tag: [u8; 4]) -> String {
    String::from_utf8_lossy(&tag).into_owned()
}

/// `lsct`/`lsdk`: the folder open/close markers the tree builder runs on.
///
/// kind 1 = open folder, 2 = closed folder, 3 = bounding divider.
fn section_divider(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let kind = reader.get_u32_be()?;
    let mut entries = alloc::vec![("kind".to_string(), Value::Int(i64::from(kind)))];

    if reader.remaining() >= 8 {
        let signature = reader.get_fixed_bytes::<4>()?;

        if signature == RESOURCE_SIGNATURE {
            let blend = reader.get_fixed_bytes::<4>()?;
            entries.push(("blend_mode".to_string(), Value::String(tag_string(blend))));
        }
    }
    if reader.remaining() >= 4 {
        let sub_type = reader.get_u32_be()?;
        entries.push(("sub_type".to_string(), Value::Int(i64::from(sub_type))));
    }

    Ok(Value::Map(entries))
}

fn unicode_name(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::String(reader.unicode_string()?))
}

fn layer_id(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Int(i64::from(reader.get_u32_be()?)))
}

fn fill_opacity(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Int(i64::from(reader.get_u8()?)))
}

fn transparency_shapes(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Bool(reader.get_u8()? != 0))
}

fn blend_clipped(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Bool(reader.get_u8()? != 0))
}

fn knockout(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Bool(reader.get_u8()? != 0))
}

fn protection(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Int(i64::from(reader.get_u32_be()?)))
}

fn sheet_color(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let mut components = Vec::with_capacity(4);
    for _ in 0..4 {
        components.push(Value::Int(i64::from(reader.get_u16_be()?)));
    }
    Ok(Value::List(components))
}

fn reference_point(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let x = reader.get_f64_be()?;
    let y = reader.get_f64_be()?;
    Ok(Value::List(alloc::vec![Value::Double(x), Value::Double(y)]))
}

fn layer_name_source(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::String(tag_string(reader.get_fixed_bytes::<4>()?)))
}

fn layer_version(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Int(i64::from(reader.get_u32_be()?)))
}

/// `levl`: version 2 plus up to 29 level records of five u16 fields.
fn levels(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 2 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown levels version {version}"
        )));
    }

    let mut records = Vec::new();

    while records.len() < 29 && reader.remaining() >= 10 {
        records.push(map_of(alloc::vec![
            ("input_floor", Value::Int(i64::from(reader.get_u16_be()?))),
            ("input_ceiling", Value::Int(i64::from(reader.get_u16_be()?))),
            ("output_floor", Value::Int(i64::from(reader.get_u16_be()?))),
            ("output_ceiling", Value::Int(i64::from(reader.get_u16_be()?))),
            ("gamma", Value::Int(i64::from(reader.get_u16_be()?))),
        ]));
    }
    // extended level data with its own signature may follow
    reader.skip_remaining();

    Ok(Value::List(records))
}

/// `curv`: per enabled channel, a list of (input, output) points.
fn curves(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let _padding = reader.get_u8()?;
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown curves version {version}"
        )));
    }

    let enabled = reader.get_u32_be()?;
    let mut channels = Vec::new();

    for channel in 0..32 {
        if enabled & (1 << channel) == 0 {
            continue;
        }
        let count = reader.get_u16_be()?;
        let mut points = Vec::with_capacity(usize::from(count));

        for _ in 0..count {
            let output = reader.get_u16_be()?;
            let input = reader.get_u16_be()?;

            points.push(map_of(alloc::vec![
                ("input", Value::Int(i64::from(input))),
                ("output", Value::Int(i64::from(output))),
            ]));
        }
        channels.push(map_of(alloc::vec![
            ("channel", Value::Int(channel)),
            ("points", Value::List(points)),
        ]));
    }
    // newer writers append an extra keyed section
    reader.skip_remaining();

    Ok(Value::List(channels))
}

fn exposure(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown exposure version {version}"
        )));
    }

    Ok(map_of(alloc::vec![
        ("exposure", Value::Double(f64::from(reader.get_f32_be()?))),
        ("offset", Value::Double(f64::from(reader.get_f32_be()?))),
        ("gamma", Value::Double(f64::from(reader.get_f32_be()?))),
    ]))
}

/// `grdm`: gradient map. Color and transparency stops plus trailing
/// scalar settings.
fn gradient_map(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown gradient map version {version}"
        )));
    }

    let reversed = reader.get_u8()? != 0;
    let dithered = reader.get_u8()? != 0;
    let name = reader.unicode_string()?;

    let stop_count = reader.get_u16_be()?;
    let mut color_stops = Vec::with_capacity(usize::from(stop_count));

    for _ in 0..stop_count {
        let location = reader.get_i32_be()?;
        let midpoint = reader.get_i32_be()?;
        let mode = reader.get_u16_be()?;
        let mut components = Vec::with_capacity(4);
        for _ in 0..4 {
            components.push(Value::Int(i64::from(reader.get_u16_be()?)));
        }

        color_stops.push(map_of(alloc::vec![
            ("location", Value::Int(i64::from(location))),
            ("midpoint", Value::Int(i64::from(midpoint))),
            ("mode", Value::Int(i64::from(mode))),
            ("color", Value::List(components)),
        ]));
    }

    let transparency_count = reader.get_u16_be()?;
    let mut transparency_stops = Vec::with_capacity(usize::from(transparency_count));

    for _ in 0..transparency_count {
        let location = reader.get_i32_be()?;
        let midpoint = reader.get_i32_be()?;
        let opacity = reader.get_u16_be()?;

        transparency_stops.push(map_of(alloc::vec![
            ("location", Value::Int(i64::from(location))),
            ("midpoint", Value::Int(i64::from(midpoint))),
            ("opacity", Value::Int(i64::from(opacity))),
        ]));
    }
    // expansion count, interpolation, length, mode, random seed and
    // friends trail here; nothing downstream consumes them
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("name", Value::String(name)),
        ("reversed", Value::Bool(reversed)),
        ("dithered", Value::Bool(dithered)),
        ("color_stops", Value::List(color_stops)),
        ("transparency_stops", Value::List(transparency_stops)),
    ]))
}

/// `hue2`: version 2 hue/saturation with colorization and master triples.
fn hue_saturation(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 2 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown hue/saturation version {version}"
        )));
    }

    let colorize = reader.get_u8()? != 0;
    let _padding = reader.get_u8()?;

    let triple = |reader: &mut BoundedReader| -> Result<Value, PsdDecodeErrors> {
        Ok(map_of(alloc::vec![
            ("hue", Value::Int(i64::from(reader.get_i16_be()?))),
            ("saturation", Value::Int(i64::from(reader.get_i16_be()?))),
            ("lightness", Value::Int(i64::from(reader.get_i16_be()?))),
        ]))
    };

    let colorization = triple(reader)?;
    let master = triple(reader)?;

    // hextant range records follow, unused here
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("colorize", Value::Bool(colorize)),
        ("colorization", colorization),
        ("master", master),
    ]))
}

fn color_balance(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let mut ranges = Vec::with_capacity(3);

    for range in ["shadows", "midtones", "highlights"] {
        ranges.push((
            range.to_string(),
            Value::List(alloc::vec![
                Value::Int(i64::from(reader.get_i16_be()?)),
                Value::Int(i64::from(reader.get_i16_be()?)),
                Value::Int(i64::from(reader.get_i16_be()?)),
            ])
        ));
    }

    let preserve_luminosity = reader.get_u8()? != 0;
    ranges.push((
        "preserve_luminosity".to_string(),
        Value::Bool(preserve_luminosity)
    ));
    reader.skip_remaining();

    Ok(Value::Map(ranges))
}

fn channel_mixer(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown channel mixer version {version}"
        )));
    }

    let monochrome = reader.get_u16_be()? != 0;
    let mut weights = Vec::new();

    while reader.remaining() >= 2 {
        weights.push(Value::Int(i64::from(reader.get_i16_be()?)));
    }

    Ok(map_of(alloc::vec![
        ("monochrome", Value::Bool(monochrome)),
        ("weights", Value::List(weights)),
    ]))
}

fn photo_filter(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    let color = match version {
        3 => Value::List(alloc::vec![
            Value::Int(i64::from(reader.get_u32_be()?)),
            Value::Int(i64::from(reader.get_u32_be()?)),
            Value::Int(i64::from(reader.get_u32_be()?)),
        ]),
        2 => {
            let space = reader.get_u16_be()?;
            let mut components = alloc::vec![Value::Int(i64::from(space))];
            for _ in 0..4 {
                components.push(Value::Int(i64::from(reader.get_u16_be()?)));
            }
            Value::List(components)
        }
        _ => {
            return Err(PsdDecodeErrors::GenericString(format!(
                "Unknown photo filter version {version}"
            )))
        }
    };

    let density = reader.get_u32_be()?;
    let preserve_luminosity = reader.get_u8()? != 0;
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("color", color),
        ("density", Value::Int(i64::from(density))),
        ("preserve_luminosity", Value::Bool(preserve_luminosity)),
    ]))
}

fn selective_color(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown selective color version {version}"
        )));
    }

    let method = reader.get_u16_be()?;
    let mut plates = Vec::new();

    while plates.len() < 10 && reader.remaining() >= 8 {
        plates.push(map_of(alloc::vec![
            ("cyan", Value::Int(i64::from(reader.get_i16_be()?))),
            ("magenta", Value::Int(i64::from(reader.get_i16_be()?))),
            ("yellow", Value::Int(i64::from(reader.get_i16_be()?))),
            ("black", Value::Int(i64::from(reader.get_i16_be()?))),
        ]));
    }

    Ok(map_of(alloc::vec![
        ("method", Value::Int(i64::from(method))),
        ("plates", Value::List(plates)),
    ]))
}

fn brightness_contrast(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let brightness = reader.get_i16_be()?;
    let contrast = reader.get_i16_be()?;
    let mean = reader.get_u16_be()?;
    let lab_only = reader.get_u8()? != 0;
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("brightness", Value::Int(i64::from(brightness))),
        ("contrast", Value::Int(i64::from(contrast))),
        ("mean", Value::Int(i64::from(mean))),
        ("lab_only", Value::Bool(lab_only)),
    ]))
}

fn posterize(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let levels = reader.get_u16_be()?;
    reader.skip_remaining();
    Ok(Value::Int(i64::from(levels)))
}

fn threshold(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let level = reader.get_u16_be()?;
    reader.skip_remaining();
    Ok(Value::Int(i64::from(level)))
}

fn invert(_: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    Ok(Value::Null)
}

/// Chunks that are a bare version-16 descriptor.
fn versioned_descriptor(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let desc = descriptor_with_version(reader, &context.options)?;
    Ok(Value::Descriptor(alloc::boxed::Box::new(desc)))
}

/// `lfx2`: object version then a version-16 descriptor of all effects.
fn effects_descriptor(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let object_version = reader.get_u32_be()?;

    if object_version != 0 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown lfx2 object version {object_version}"
        )));
    }
    versioned_descriptor(reader, context)
}

/// `lrFX`: the legacy effects block.
///
/// The documented effect counts are 6 and 7, but files with 1, 2 and 3
/// exist in the wild and are accepted; see DESIGN.md.
fn effects_layer(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 0 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown effects layer version {version}"
        )));
    }

    let count = reader.get_u16_be()?;

    if !matches!(count, 1 | 2 | 3 | 6 | 7) {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unsupported effects count {count}"
        )));
    }

    let mut effects: Vec<(String, Value)> = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        let signature = reader.get_fixed_bytes::<4>()?;

        if signature != RESOURCE_SIGNATURE {
            return Err(PsdDecodeErrors::Generic("Bad effects entry signature"));
        }

        let key = reader.get_fixed_bytes::<4>()?;
        let size = reader.get_u32_be()? as usize;
        let mut body = reader.section(size)?;

        let value = match &key {
            b"cmnS" => common_state_effect(&mut body)?,
            b"dsdw" | b"isdw" => shadow_effect(&mut body)?,
            b"sofi" => solid_fill_effect(&mut body)?,
            // outer/inner glow and bevel kept raw
            _ => Value::Bytes(body.read_bytes(body.remaining())?.to_vec())
        };
        body.skip_remaining();

        effects.push((tag_string(key), value));
    }

    Ok(Value::Map(effects))
}

fn common_state_effect(reader: &mut BoundedReader) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u32_be()?;
    let visible = reader.get_u8()? != 0;
    let _unused = reader.get_u16_be()?;

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("visible", Value::Bool(visible)),
    ]))
}

fn color_10(reader: &mut BoundedReader) -> Result<Value, PsdDecodeErrors> {
    let space = reader.get_u16_be()?;
    let mut components = alloc::vec![Value::Int(i64::from(space))];
    for _ in 0..4 {
        components.push(Value::Int(i64::from(reader.get_u16_be()?)));
    }
    Ok(Value::List(components))
}

fn shadow_effect(reader: &mut BoundedReader) -> Result<Value, PsdDecodeErrors> {
    let _size = reader.get_u32_be()?;
    let version = reader.get_u32_be()?;
    let blur = reader.get_u32_be()?;
    let intensity = reader.get_u32_be()?;
    let angle = reader.get_u32_be()?;
    let distance = reader.get_u32_be()?;
    let color = color_10(reader)?;

    let signature = reader.get_fixed_bytes::<4>()?;
    if signature != RESOURCE_SIGNATURE {
        return Err(PsdDecodeErrors::Generic("Bad shadow blend signature"));
    }
    let blend = reader.get_fixed_bytes::<4>()?;

    let enabled = reader.get_u8()? != 0;
    let use_global_angle = reader.get_u8()? != 0;
    let opacity = reader.get_u8()?;
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("blur", Value::Int(i64::from(blur))),
        ("intensity", Value::Int(i64::from(intensity))),
        ("angle", Value::Int(i64::from(angle))),
        ("distance", Value::Int(i64::from(distance))),
        ("color", color),
        ("blend_mode", Value::String(tag_string(blend))),
        ("enabled", Value::Bool(enabled)),
        ("use_global_angle", Value::Bool(use_global_angle)),
        ("opacity", Value::Int(i64::from(opacity))),
    ]))
}

fn solid_fill_effect(reader: &mut BoundedReader) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u32_be()?;

    let signature = reader.get_fixed_bytes::<4>()?;
    if signature != RESOURCE_SIGNATURE {
        return Err(PsdDecodeErrors::Generic("Bad solid fill blend signature"));
    }
    let blend = reader.get_fixed_bytes::<4>()?;

    let color = color_10(reader)?;
    let opacity = reader.get_u8()?;
    let enabled = reader.get_u8()? != 0;
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("blend_mode", Value::String(tag_string(blend))),
        ("color", color),
        ("opacity", Value::Int(i64::from(opacity))),
        ("enabled", Value::Bool(enabled)),
    ]))
}

/// `Patt`/`Pat2`/`Pat3`: pattern headers. The virtual-memory-array
/// pixel payload is left to the excluded rendering surface.
fn patterns(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let mut out = Vec::new();

    while reader.remaining() >= 16 {
        let length = reader.get_u32_be()? as usize;
        let padded = length.next_multiple_of(4).min(reader.remaining());
        let mut body = reader.section(padded)?;

        let version = body.get_u32_be()?;
        let mode = body.get_u32_be()?;
        let point_v = body.get_u16_be()?;
        let point_h = body.get_u16_be()?;
        let name = body.unicode_string()?;
        let id = body.pascal_string(1)?;
        body.skip_remaining();

        out.push(map_of(alloc::vec![
            ("version", Value::Int(i64::from(version))),
            ("mode", Value::Int(i64::from(mode))),
            (
                "point",
                Value::List(alloc::vec![
                    Value::Int(i64::from(point_v)),
                    Value::Int(i64::from(point_h)),
                ])
            ),
            ("name", Value::String(name)),
            ("id", Value::String(id)),
        ]));
    }
    reader.skip_remaining();

    Ok(Value::List(out))
}

/// Path coordinates are signed 8.24 fixed point.
fn fixed_path_number(reader: &mut BoundedReader) -> Result<f64, PsdDecodeErrors> {
    Ok(f64::from(reader.get_i32_be()?) / f64::from(1u32 << 24))
}

/// `vmsk`/`vsms`: vector mask path records.
fn vector_mask(reader: &mut BoundedReader, _: &ChunkContext) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u32_be()?;
    let flags = reader.get_u32_be()?;

    let mut records = Vec::new();

    while reader.remaining() >= 26 {
        let selector = reader.get_u16_be()?;
        let mut body = reader.section(24)?;

        let record = match selector {
            // subpath length records
            0 | 3 => {
                let count = body.get_u16_be()?;
                map_of(alloc::vec![
                    ("selector", Value::Int(i64::from(selector))),
                    ("count", Value::Int(i64::from(count))),
                ])
            }
            // knot records: three (y, x) control points
            1 | 2 | 4 | 5 => {
                let mut points = Vec::with_capacity(6);
                for _ in 0..6 {
                    points.push(Value::Double(fixed_path_number(&mut body)?));
                }
                map_of(alloc::vec![
                    ("selector", Value::Int(i64::from(selector))),
                    ("points", Value::List(points)),
                ])
            }
            6 | 7 | 8 => map_of(alloc::vec![(
                "selector",
                Value::Int(i64::from(selector))
            )]),
            other => {
                return Err(PsdDecodeErrors::GenericString(format!(
                    "Unknown path record selector {other}"
                )))
            }
        };
        body.skip_remaining();
        records.push(record);
    }
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("flags", Value::Int(i64::from(flags))),
        ("records", Value::List(records)),
    ]))
}

/// `vscg`: a keyed version-16 descriptor with the stroke content.
fn vector_stroke_content(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let key = reader.get_fixed_bytes::<4>()?;
    let desc = descriptor_with_version(reader, &context.options)?;

    Ok(map_of(alloc::vec![
        ("key", Value::String(tag_string(key))),
        ("content", Value::Descriptor(alloc::boxed::Box::new(desc))),
    ]))
}

/// `SoLd`: placed-layer data as a descriptor. The descriptor's `Idnt`
/// entry is the unique id resolved against the linked-file table.
fn placed_layer(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let kind = reader.get_fixed_bytes::<4>()?;

    if &kind != b"soLD" {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown placed layer type {:?}",
            String::from_utf8_lossy(&kind)
        )));
    }

    let version = reader.get_u32_be()?;
    let desc = descriptor_with_version(reader, &context.options)?;

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("descriptor", Value::Descriptor(alloc::boxed::Box::new(desc))),
    ]))
}

/// `PlLd`: the pre-CS3 placed-layer record.
fn placed_layer_legacy(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let kind = reader.get_fixed_bytes::<4>()?;

    if &kind != b"plcL" {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown placed layer type {:?}",
            String::from_utf8_lossy(&kind)
        )));
    }

    let version = reader.get_u32_be()?;
    let unique_id = reader.pascal_string(1)?;
    let page = reader.get_u32_be()?;
    let total_pages = reader.get_u32_be()?;
    let anti_alias = reader.get_u32_be()?;
    let layer_type = reader.get_u32_be()?;

    let mut transform = Vec::with_capacity(8);
    for _ in 0..8 {
        transform.push(Value::Double(reader.get_f64_be()?));
    }
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("version", Value::Int(i64::from(version))),
        ("unique_id", Value::String(unique_id)),
        ("page", Value::Int(i64::from(page))),
        ("total_pages", Value::Int(i64::from(total_pages))),
        ("anti_alias", Value::Int(i64::from(anti_alias))),
        ("layer_type", Value::Int(i64::from(layer_type))),
        ("transform", Value::List(transform)),
    ]))
}

/// `lnk2`/`lnkD`/`lnk3`: the linked-file table. Each entry is its own
/// u64-length block, padded to four bytes.
fn linked_layers(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let mut files = Vec::new();

    while reader.remaining() >= 8 {
        let size = reader.get_u64_be()? as usize;
        let mut body = reader.section(size.min(reader.remaining()))?;

        let kind = body.get_fixed_bytes::<4>()?;
        let version = body.get_u32_be()?;
        let unique_id = body.pascal_string(1)?;
        let name = body.unicode_string()?;
        let file_type = body.get_fixed_bytes::<4>()?;
        let _creator = body.get_fixed_bytes::<4>()?;
        let data_size = body.get_u64_be()? as usize;
        let has_descriptor = body.get_u8()? != 0;

        if has_descriptor {
            let _open_descriptor = descriptor_with_version(&mut body, &context.options)?;
        }

        let data = if &kind == b"liFD" && data_size > 0 {
            body.read_bytes(data_size.min(body.remaining()))?.to_vec()
        } else {
            Vec::new()
        };
        body.skip_remaining();

        // entries are padded to a multiple of four
        let padding = size.next_multiple_of(4) - size;
        if padding > 0 && reader.remaining() >= padding {
            reader.skip(padding)?;
        }

        files.push(map_of(alloc::vec![
            ("kind", Value::String(tag_string(kind))),
            ("version", Value::Int(i64::from(version))),
            ("unique_id", Value::String(unique_id)),
            ("name", Value::String(name)),
            ("file_type", Value::String(tag_string(file_type))),
            ("data", Value::Bytes(data)),
        ]));
    }
    reader.skip_remaining();

    Ok(Value::List(files))
}

/// `TySh`: the type-tool object setting. Carries the text and warp
/// descriptors; the text descriptor's `EngineData` entry holds the raw
/// engine-data payload parsed later by the text extraction step.
fn type_tool(
    reader: &mut BoundedReader, context: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let version = reader.get_u16_be()?;

    if version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown type tool version {version}"
        )));
    }

    let mut transform = Vec::with_capacity(6);
    for _ in 0..6 {
        transform.push(Value::Double(reader.get_f64_be()?));
    }

    let text_version = reader.get_u16_be()?;

    if text_version != 50 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown type tool text version {text_version}"
        )));
    }
    let text = descriptor_with_version(reader, &context.options)?;

    let warp_version = reader.get_u16_be()?;

    if warp_version != 1 {
        return Err(PsdDecodeErrors::GenericString(format!(
            "Unknown type tool warp version {warp_version}"
        )));
    }
    let warp = descriptor_with_version(reader, &context.options)?;

    let mut rect = Vec::with_capacity(4);
    for _ in 0..4 {
        rect.push(Value::Int(i64::from(reader.get_i32_be()?)));
    }
    reader.skip_remaining();

    Ok(map_of(alloc::vec![
        ("transform", Value::List(transform)),
        ("text", Value::Descriptor(alloc::boxed::Box::new(text))),
        ("warp", Value::Descriptor(alloc::boxed::Box::new(warp))),
        ("rect", Value::List(rect)),
    ]))
}

/// `shmd`: metadata settings; only the item keys are kept.
fn metadata_setting(
    reader: &mut BoundedReader, _: &ChunkContext
) -> Result<Value, PsdDecodeErrors> {
    let count = reader.get_u32_be()?;
    let mut keys = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let _signature = reader.get_fixed_bytes::<4>()?;
        let key = reader.get_fixed_bytes::<4>()?;
        let _copy_on_sheet = reader.get_u8()?;
        reader.skip(3)?;
        let length = reader.get_u32_be()? as usize;
        reader.skip(length.min(reader.remaining()))?;

        keys.push(Value::String(tag_string(key)));
    }
    reader.skip_remaining();

    Ok(Value::List(keys))
}
