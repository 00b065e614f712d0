/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Channel data decompression
//!
//! Each layer channel (and the merged composite) stores one plane of
//! samples under one of four compression methods. Everything here
//! decodes to planar big-endian bytes; interleaving into a final image
//! happens in [`assemble_image`].

use alloc::vec;
use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use zune_inflate::DeflateDecoder;
use zune_inflate::DeflateOptions;

use crate::constants::{ColorMode, CompressionMethod};
use crate::errors::PsdDecodeErrors;

/// Bytes in one uncompressed scanline.
pub(crate) fn row_bytes(width: usize, depth: u8) -> usize {
    match depth {
        1 => (width + 7) / 8,
        8 => width,
        16 => width * 2,
        _ => width * 4
    }
}

/// Expand one PackBits run into `out`.
///
/// Literal runs past the end of `src` and replicate runs past the end
/// of `out` are clamped rather than rejected; real files routinely
/// carry a byte or two of slack.
pub fn unpack_packbits(src: &[u8], out: &mut Vec<u8>) {
    let mut position = 0;

    while position < src.len() {
        let header = src[position] as i8;
        position += 1;

        if header == -128 {
            // no-op
            continue;
        }
        if header >= 0 {
            let count = (header as usize + 1).min(src.len() - position);
            out.extend_from_slice(&src[position..position + count]);
            position += count;
        } else if position < src.len() {
            let count = (1 - isize::from(header)) as usize;
            let value = src[position];
            position += 1;
            out.extend(core::iter::repeat(value).take(count));
        }
    }
}

fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>, PsdDecodeErrors> {
    let options = DeflateOptions::default()
        .set_size_hint(expected)
        .set_confirm_checksum(false);
    let mut decoder = DeflateDecoder::new_with_options(data, options);

    Ok(decoder.decode_zlib()?)
}

/// Undo per-row horizontal prediction in place.
///
/// 8-bit rows delta bytewise, 16-bit rows delta per big-endian sample.
/// 32-bit rows delta bytewise and then de-interleave the four byte
/// planes each row was split into before compression.
fn undo_prediction(data: &mut Vec<u8>, width: usize, depth: u8) {
    let stride = row_bytes(width, depth);

    if stride == 0 {
        return;
    }

    match depth {
        8 => {
            for row in data.chunks_exact_mut(stride) {
                for i in 1..row.len() {
                    row[i] = row[i].wrapping_add(row[i - 1]);
                }
            }
        }
        16 => {
            for row in data.chunks_exact_mut(stride) {
                let mut previous = 0u16;

                for sample in row.chunks_exact_mut(2) {
                    let value = u16::from_be_bytes([sample[0], sample[1]]).wrapping_add(previous);
                    sample.copy_from_slice(&value.to_be_bytes());
                    previous = value;
                }
            }
        }
        _ => {
            let mut staging = vec![0; stride];

            for row in data.chunks_exact_mut(stride) {
                for i in 1..row.len() {
                    row[i] = row[i].wrapping_add(row[i - 1]);
                }
                // rows were stored as four consecutive byte planes
                for (i, byte) in staging.iter_mut().enumerate() {
                    let plane = i % 4;
                    let pixel = i / 4;
                    *byte = row[plane * width + pixel];
                }
                row.copy_from_slice(&staging);
            }
        }
    }
}

/// Decode one channel's compressed section into planar bytes.
///
/// The reader must be bounded to exactly this channel's data and
/// positioned at the leading compression tag.
pub fn decode_channel(
    reader: &mut BoundedReader, width: usize, height: usize, depth: u8, psb: bool
) -> Result<Vec<u8>, PsdDecodeErrors> {
    let tag = reader.get_u16_be()?;
    let method =
        CompressionMethod::from_int(tag).ok_or(PsdDecodeErrors::UnknownCompression(tag))?;

    decode_channel_body(reader, method, width, height, depth, psb)
}

/// Decode channel bytes when the compression tag was already consumed.
/// The merged composite shares one tag across all of its planes.
pub fn decode_channel_body(
    reader: &mut BoundedReader, method: CompressionMethod, width: usize, height: usize,
    depth: u8, psb: bool
) -> Result<Vec<u8>, PsdDecodeErrors> {
    let stride = row_bytes(width, depth);
    let expected = stride * height;

    match method {
        CompressionMethod::NoCompression => {
            Ok(reader.read_bytes(expected.min(reader.remaining()))?.to_vec())
        }
        CompressionMethod::RLE => {
            let mut lengths = Vec::with_capacity(height);

            for _ in 0..height {
                let length = if psb {
                    reader.get_u32_be()? as usize
                } else {
                    usize::from(reader.get_u16_be()?)
                };
                lengths.push(length);
            }

            let mut out = Vec::with_capacity(expected);

            for length in lengths {
                if length > reader.remaining() {
                    return Err(PsdDecodeErrors::BadRLE);
                }
                let row = reader.read_bytes(length)?;

                let before = out.len();
                unpack_packbits(row, &mut out);

                if out.len() < before + stride {
                    out.resize(before + stride, 0);
                } else {
                    out.truncate(before + stride);
                }
            }
            Ok(out)
        }
        CompressionMethod::Zip => {
            let raw = reader.read_bytes(reader.remaining())?;
            let mut out = inflate(raw, expected)?;
            out.resize(expected, 0);
            Ok(out)
        }
        CompressionMethod::ZipPrediction => {
            let raw = reader.read_bytes(reader.remaining())?;
            let mut out = inflate(raw, expected)?;
            out.resize(expected, 0);
            undo_prediction(&mut out, width, depth);
            Ok(out)
        }
    }
}

/// Decode a zip-compressed merged composite into per-channel planes.
///
/// Unlike layer channels, the composite shares a single zlib stream
/// across all of its planes, stored planar, first channel first. The
/// prediction variant is undone per plane after splitting.
pub fn decode_merged_zip(
    reader: &mut BoundedReader, method: CompressionMethod, width: usize, height: usize,
    depth: u8, count: usize
) -> Result<Vec<Vec<u8>>, PsdDecodeErrors> {
    let expected = row_bytes(width, depth) * height;

    if expected == 0 || count == 0 {
        return Ok(vec![Vec::new(); count]);
    }

    let raw = reader.read_bytes(reader.remaining())?;
    let mut merged = inflate(raw, expected * count)?;
    merged.resize(expected * count, 0);

    let mut planes = Vec::with_capacity(count);

    for chunk in merged.chunks_exact(expected) {
        let mut plane = chunk.to_vec();

        if method == CompressionMethod::ZipPrediction {
            undo_prediction(&mut plane, width, depth);
        }
        planes.push(plane);
    }
    Ok(planes)
}

/// Interleave decoded planes into one output buffer.
///
/// Indexed documents resolve through the 768-byte planar palette into
/// RGB. Bitmap documents expand each bit to a full sample, inverted
/// since the format stores 1 as black.
pub fn assemble_image(
    channels: &[Vec<u8>], color_mode: ColorMode, depth: u8, palette: Option<&[u8]>,
    width: usize, height: usize
) -> Vec<u8> {
    let pixels = width * height;

    if color_mode == ColorMode::Indexed {
        let palette = palette.unwrap_or(&[0; 768]);
        let plane = channels.first().map(Vec::as_slice).unwrap_or(&[]);
        let mut out = vec![0; pixels * 3];

        for (i, chunk) in out.chunks_exact_mut(3).enumerate() {
            let index = usize::from(plane.get(i).copied().unwrap_or(0));
            chunk[0] = palette.get(index).copied().unwrap_or(0);
            chunk[1] = palette.get(256 + index).copied().unwrap_or(0);
            chunk[2] = palette.get(512 + index).copied().unwrap_or(0);
        }
        return out;
    }

    if color_mode == ColorMode::Bitmap {
        let plane = channels.first().map(Vec::as_slice).unwrap_or(&[]);
        let stride = row_bytes(width, 1);
        let mut out = vec![0; pixels];

        for y in 0..height {
            for x in 0..width {
                let byte = plane.get(y * stride + x / 8).copied().unwrap_or(0);
                let bit = (byte >> (7 - (x % 8))) & 1;
                out[y * width + x] = if bit == 1 { 0 } else { 255 };
            }
        }
        return out;
    }

    let sample_bytes = usize::from(depth / 8).max(1);
    let count = channels.len();
    let mut out = vec![0; pixels * count * sample_bytes];

    for (c, plane) in channels.iter().enumerate() {
        for pixel in 0..pixels {
            let src = pixel * sample_bytes;
            let dst = (pixel * count + c) * sample_bytes;

            for b in 0..sample_bytes {
                out[dst + b] = plane.get(src + b).copied().unwrap_or(0);
            }
        }
    }
    out
}
