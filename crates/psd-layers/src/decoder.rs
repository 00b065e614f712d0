/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The document decoder
//!
//! [`PsdDecoder`] walks the five top-level file sections in order:
//! header, color mode data, image resources, layer and mask
//! information, and the merged composite. Every length-prefixed section
//! is carved with `section`, so a malformed interior can never push the
//! outer walk off alignment.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::log::trace;
use psd_core::options::DecoderOptions;

use crate::channels::{assemble_image, decode_channel_body, decode_merged_zip};
use crate::chunks::{ChunkContext, ChunkDecoder, ChunkRegistry};
use crate::constants::{ColorMode, CompressionMethod};
use crate::errors::{PsdDecodeErrors, Warning};
use crate::headers::{decode_color_mode_data, ColorModeData, DocumentHeader};
use crate::hints::HintTable;
use crate::layer::{parse_additional_info, parse_channel_data, parse_layer_record, LayerRecord};
use crate::resources::decode_image_resources;
use crate::text::{self, TextInfo};
use crate::tree::{build_tree, linked_files_from_value, LayerTree, LinkedFileTable};

/// A fully decoded document.
///
/// Layer records stay in on-disk order (bottom of the stack first); the
/// tree holds the nested view over them.
pub struct PsdDocument {
    header:          DocumentHeader,
    color_mode_data: ColorModeData,
    records:         Vec<LayerRecord>,
    tree:            LayerTree,
    /// Layer id to tree node index.
    id_lookup:       HintTable<usize>,
    linked_files:    LinkedFileTable,
    /// Interleaved merged composite samples, when present.
    composite:       Option<Vec<u8>>,
    /// Extracted text payloads keyed by record index.
    text_layers:     BTreeMap<usize, TextInfo>,
    warnings:        Vec<Warning>
}

impl PsdDocument {
    pub const fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub const fn color_mode_data(&self) -> &ColorModeData {
        &self.color_mode_data
    }

    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub const fn tree(&self) -> &LayerTree {
        &self.tree
    }

    /// Find a tree node by its layer id.
    pub fn node_by_id(&self, id: u32) -> Option<usize> {
        self.id_lookup.get(id).copied()
    }

    pub const fn linked_files(&self) -> &LinkedFileTable {
        &self.linked_files
    }

    /// Linked file contents referenced by the given unique id.
    pub fn linked_file(&self, unique_id: &str) -> Option<&[u8]> {
        self.linked_files.get(unique_id).map(|file| &*file.data)
    }

    /// The merged composite image, interleaved, if the file carried one.
    pub fn composite(&self) -> Option<&[u8]> {
        self.composite.as_deref()
    }

    /// The extracted text payload of a record, if it is a text layer.
    pub fn text_info(&self, record_index: usize) -> Option<&TextInfo> {
        self.text_layers.get(&record_index)
    }

    /// Everything the decoder skipped or degraded along the way.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// A PSD/PSB decoder over an in-memory byte slice.
pub struct PsdDecoder<'a> {
    stream:   BoundedReader<'a>,
    options:  DecoderOptions,
    registry: ChunkRegistry,
    header:   Option<DocumentHeader>,
    warnings: Vec<Warning>
}

impl<'a> PsdDecoder<'a> {
    /// Create a decoder with default options.
    pub fn new(data: &'a [u8]) -> PsdDecoder<'a> {
        Self::new_with_options(data, DecoderOptions::default())
    }

    /// Create a decoder with custom options.
    pub fn new_with_options(data: &'a [u8], options: DecoderOptions) -> PsdDecoder<'a> {
        PsdDecoder {
            stream: BoundedReader::new(data),
            options,
            registry: ChunkRegistry::with_builtins(),
            header: None,
            warnings: Vec::new()
        }
    }

    /// Register an additional-info chunk decoder before decoding.
    ///
    /// Replaces the built-in decoder for `signature` if one exists.
    pub fn register_chunk(&mut self, signature: [u8; 4], decoder: ChunkDecoder) {
        self.registry.register(signature, decoder);
    }

    /// Decode just the 26-byte header, validating it.
    ///
    /// Idempotent; `decode` calls it if it has not run.
    pub fn decode_headers(&mut self) -> Result<(), PsdDecodeErrors> {
        if self.header.is_some() {
            return Ok(());
        }
        let header = DocumentHeader::decode(&mut self.stream, &self.options, &mut self.warnings)?;
        self.header = Some(header);

        Ok(())
    }

    /// Image width and height, available after `decode_headers`.
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.header
            .map(|h| (h.width as usize, h.height as usize))
    }

    /// Bits per channel sample, available after `decode_headers`.
    pub fn depth(&self) -> Option<u16> {
        self.header.map(|h| h.depth)
    }

    /// Document color mode, available after `decode_headers`.
    pub fn color_mode(&self) -> Option<ColorMode> {
        self.header.map(|h| h.color_mode)
    }

    /// Decode the whole document.
    ///
    /// In strict mode any warning aborts with the failure it would
    /// otherwise have papered over.
    pub fn decode(mut self) -> Result<PsdDocument, PsdDecodeErrors> {
        self.decode_headers()?;
        // decode_headers just ran
        let header = match self.header {
            Some(header) => header,
            None => return Err(PsdDecodeErrors::Generic("header decode did not run"))
        };
        let psb = header.is_psb();
        let context = ChunkContext {
            psb,
            options: self.options
        };

        // color mode data section
        let color_length = self.stream.get_u32_be()? as usize;
        let mut color_section = self.stream.section(color_length)?;
        let color_mode_data =
            decode_color_mode_data(&mut color_section, header.color_mode, &mut self.warnings)?;
        self.reconcile("color mode data", &mut color_section);

        // image resources section
        let resources_length = self.stream.get_u32_be()? as usize;
        let mut resources_section = self.stream.section(resources_length)?;
        let resources = decode_image_resources(&mut resources_section, &mut self.warnings)?;
        self.reconcile("image resources", &mut resources_section);

        // layer and mask information section
        let info_length = self.stream.get_length(psb)? as usize;
        let mut info_section = self.stream.section(info_length.min(self.stream.remaining()))?;

        let mut records = Vec::new();
        let mut linked_files = LinkedFileTable::new();

        if info_section.len() > 0 {
            self.decode_layer_and_mask_info(
                &mut info_section,
                &header,
                &context,
                &mut records,
                &mut linked_files
            )?;
        }
        info_section.skip_remaining();

        // merged composite
        let composite = self.decode_composite(&header, &color_mode_data)?;

        // text payloads
        let mut text_layers = BTreeMap::new();

        for (index, record) in records.iter().enumerate() {
            if let Some(tysh) = record.info(b"TySh") {
                if let Some(info) = text::extract(tysh, &mut self.warnings) {
                    text_layers.insert(index, info);
                }
            }
        }

        let tree = build_tree(
            &records,
            resources.group_ids.as_deref(),
            &linked_files,
            &mut self.warnings
        );

        let mut id_lookup = HintTable::new();

        for (index, node) in tree.nodes().iter().enumerate().skip(1) {
            id_lookup.insert(node.id, index);
        }

        if self.options.strict_mode() && !self.warnings.is_empty() {
            return Err(PsdDecodeErrors::GenericString(alloc::format!(
                "strict mode: {:?}",
                self.warnings[0]
            )));
        }

        Ok(PsdDocument {
            header,
            color_mode_data,
            records,
            tree,
            id_lookup,
            linked_files,
            composite,
            text_layers,
            warnings: self.warnings
        })
    }

    /// Parse the layer-info subsection, global mask info and the global
    /// additional-info tail.
    fn decode_layer_and_mask_info(
        &mut self, section: &mut BoundedReader, header: &DocumentHeader, context: &ChunkContext,
        records: &mut Vec<LayerRecord>, linked_files: &mut LinkedFileTable
    ) -> Result<(), PsdDecodeErrors> {
        let psb = header.is_psb();

        let layer_info_length = section.get_length(psb)? as usize;
        let mut layer_info = section.section(layer_info_length.min(section.remaining()))?;

        if layer_info.len() > 0 {
            // a negative count means the composite already has
            // transparency folded in; the magnitude is the real count
            let signed_count = layer_info.get_i16_be()?;
            let count = signed_count.unsigned_abs();

            trace!("Layer count: {}", count);

            for _ in 0..count {
                records.push(parse_layer_record(
                    &mut layer_info,
                    &self.registry,
                    context,
                    &mut self.warnings
                )?);
            }

            parse_channel_data(
                &mut layer_info,
                records,
                header.depth as u8,
                psb,
                &mut self.warnings
            )?;
            self.reconcile("layer info", &mut layer_info);
        }

        // global layer mask info, nothing surfaced from it
        if section.remaining() >= 4 {
            let mask_length = section.get_u32_be()? as usize;
            section.skip(mask_length.min(section.remaining()))?;
        }

        // global additional layer information
        if section.remaining() >= 12 {
            let global =
                parse_additional_info(section, &self.registry, context, 4, &mut self.warnings)?;

            for (key, value) in &global {
                if matches!(key, b"lnk2" | b"lnkD" | b"lnk3") {
                    linked_files_from_value(value, linked_files);
                }
            }
        }

        Ok(())
    }

    /// Decode the merged composite that trails the file, if any.
    ///
    /// One compression tag covers all planes; the RLE row-length table
    /// holds `height * channels` entries up front.
    fn decode_composite(
        &mut self, header: &DocumentHeader, color_mode_data: &ColorModeData
    ) -> Result<Option<Vec<u8>>, PsdDecodeErrors> {
        if self.stream.remaining() < 2 {
            return Ok(None);
        }

        let tag = self.stream.get_u16_be()?;
        let method =
            CompressionMethod::from_int(tag).ok_or(PsdDecodeErrors::UnknownCompression(tag))?;

        let width = header.width as usize;
        let height = header.height as usize;
        let depth = header.depth as u8;
        let count = usize::from(header.channel_count);
        let psb = header.is_psb();

        let mut planes = Vec::with_capacity(count);

        match method {
            CompressionMethod::RLE => {
                // the row table spans every channel; split it and feed
                // each channel its own slice
                let entry = if psb { 4 } else { 2 };
                let table_bytes = height * count * entry;
                let table = self.stream.read_bytes(table_bytes)?;

                for channel in 0..count {
                    let offset = channel * height * entry;
                    let rows = &table[offset..offset + height * entry];

                    let lengths: usize = if psb {
                        rows.chunks_exact(4)
                            .map(|c| u32::from_be_bytes(c.try_into().unwrap_or_default()) as usize)
                            .sum()
                    } else {
                        rows.chunks_exact(2)
                            .map(|c| usize::from(u16::from_be_bytes([c[0], c[1]])))
                            .sum()
                    };

                    // rebuild a per-channel stream: its table slice then
                    // its packed rows
                    let mut channel_bytes = rows.to_vec();
                    let packed = self
                        .stream
                        .read_bytes(lengths.min(self.stream.remaining()))?;
                    channel_bytes.extend_from_slice(packed);

                    let mut reader = BoundedReader::new(&channel_bytes);
                    planes.push(decode_channel_body(
                        &mut reader,
                        CompressionMethod::RLE,
                        width,
                        height,
                        depth,
                        psb
                    )?);
                }
            }
            CompressionMethod::Zip | CompressionMethod::ZipPrediction => {
                // one zlib stream spans every channel
                planes = decode_merged_zip(&mut self.stream, method, width, height, depth, count)?;
            }
            CompressionMethod::NoCompression => {
                for _ in 0..count {
                    planes.push(decode_channel_body(
                        &mut self.stream,
                        method,
                        width,
                        height,
                        depth,
                        psb
                    )?);
                }
            }
        }

        let mut image = assemble_image(
            &planes,
            header.color_mode,
            depth,
            color_mode_data.palette(),
            width,
            height
        );

        if header.color_mode == ColorMode::RGB && count >= 4 && matches!(depth, 8 | 16) {
            remove_white_matte(&mut image, depth, count);
        }

        Ok(Some(image))
    }

    /// Note trailing bytes in a finished section and realign past them.
    fn reconcile(&mut self, name: &'static str, section: &mut BoundedReader) {
        let left = section.skip_remaining();

        if left > 0 {
            self.warnings.push(Warning::TrailingBytes {
                section: name,
                count:   left
            });
        }
    }
}

/// The composite is stored matted against white; divide it out so
/// transparent regions do not halo.
fn remove_white_matte(image: &mut [u8], depth: u8, channels: usize) {
    if depth == 8 {
        for pixel in image.chunks_exact_mut(channels) {
            let alpha = u16::from(pixel[3]);

            if alpha == 0 || alpha == 255 {
                continue;
            }
            for sample in pixel.iter_mut().take(3) {
                let value = u16::from(*sample);
                let matte = 255 - alpha;
                let unmatted = value.saturating_sub(matte) * 255 / alpha;
                *sample = unmatted.min(255) as u8;
            }
        }
    } else {
        let stride = channels * 2;

        for pixel in image.chunks_exact_mut(stride) {
            let alpha = u32::from(u16::from_be_bytes([pixel[6], pixel[7]]));

            if alpha == 0 || alpha == 65535 {
                continue;
            }
            for channel in 0..3 {
                let base = channel * 2;
                let value = u32::from(u16::from_be_bytes([pixel[base], pixel[base + 1]]));
                let matte = 65535 - alpha;
                let unmatted = (value.saturating_sub(matte) as u64 * 65535 / u64::from(alpha))
                    .min(65535) as u16;
                pixel[base..base + 2].copy_from_slice(&unmatted.to_be_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn white_matte_removal_eight_bit() {
        // half-transparent pixel matted against white
        let mut image = vec![191, 191, 191, 127];
        remove_white_matte(&mut image, 8, 4);

        // (191 - 128) * 255 / 127 = 126
        assert_eq!(image[3], 127);
        assert_eq!(image[0], 126);
    }

    #[test]
    fn white_matte_skips_opaque_pixels() {
        let mut image = vec![10, 20, 30, 255, 1, 2, 3, 0];
        remove_white_matte(&mut image, 8, 4);

        assert_eq!(image, [10, 20, 30, 255, 1, 2, 3, 0]);
    }
}
