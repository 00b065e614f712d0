/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Whole-document decoding against synthetic files built byte by byte.

use psd_layers::constants::ColorMode;
use psd_layers::errors::Warning;
use psd_layers::layer::Clipping;
use psd_layers::psd_core::options::DecoderOptions;
use psd_layers::tree::LayerKind;
use psd_layers::PsdDecoder;

/// Serializes a small RGB document from layer descriptions.
struct FileBuilder {
    width:         u32,
    height:        u32,
    layers:        Vec<LayerSpec>,
    group_ids:     Option<Vec<u16>>,
    zip_composite: bool
}

/// One layer record, bottom of the stack first.
struct LayerSpec {
    name:     String,
    rect:     (i32, i32, i32, i32),
    clipping: u8,
    chunks:   Vec<u8>
}

impl LayerSpec {
    fn new(name: &str) -> LayerSpec {
        LayerSpec {
            name:     name.into(),
            rect:     (0, 0, 4, 4),
            clipping: 0,
            chunks:   vec![]
        }
    }

    fn empty_rect(mut self) -> LayerSpec {
        self.rect = (0, 0, 0, 0);
        self
    }

    fn clipped(mut self) -> LayerSpec {
        self.clipping = 1;
        self
    }

    fn chunk(mut self, key: &[u8; 4], body: &[u8]) -> LayerSpec {
        self.chunks.extend_from_slice(b"8BIM");
        self.chunks.extend_from_slice(key);
        self.chunks
            .extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.chunks.extend_from_slice(body);
        if body.len() % 2 == 1 {
            self.chunks.push(0);
        }
        self
    }

    fn section_marker(self, kind: u32) -> LayerSpec {
        self.chunk(b"lsct", &kind.to_be_bytes())
    }

    fn has_pixels(&self) -> bool {
        self.rect.2 > self.rect.0 && self.rect.3 > self.rect.1
    }

    fn record_bytes(&self) -> Vec<u8> {
        let mut out = vec![];

        out.extend_from_slice(&self.rect.0.to_be_bytes());
        out.extend_from_slice(&self.rect.1.to_be_bytes());
        out.extend_from_slice(&self.rect.2.to_be_bytes());
        out.extend_from_slice(&self.rect.3.to_be_bytes());

        // one channel, id 0; raw data is tag + width * height bytes
        let data_length: u32 = if self.has_pixels() { 18 } else { 2 };
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0i16.to_be_bytes());
        out.extend_from_slice(&data_length.to_be_bytes());

        out.extend_from_slice(b"8BIM");
        out.extend_from_slice(b"norm");
        out.push(255);
        out.push(self.clipping);
        out.push(0); // flags
        out.push(0); // filler

        let mut extra = vec![];
        extra.extend_from_slice(&0u32.to_be_bytes()); // no mask
        extra.extend_from_slice(&0u32.to_be_bytes()); // no blending ranges

        let padded = (1 + self.name.len()).next_multiple_of(4);
        extra.push(self.name.len() as u8);
        extra.extend_from_slice(self.name.as_bytes());
        extra.resize(extra.len() + padded - 1 - self.name.len(), 0);
        extra.extend_from_slice(&self.chunks);

        out.extend_from_slice(&(extra.len() as u32).to_be_bytes());
        out.extend_from_slice(&extra);
        out
    }

    fn channel_bytes(&self) -> Vec<u8> {
        if self.has_pixels() {
            let mut out = vec![0u8, 0];
            out.extend((0u8..16).collect::<Vec<u8>>());
            out
        } else {
            vec![0, 0]
        }
    }
}

impl FileBuilder {
    fn new() -> FileBuilder {
        FileBuilder {
            width:         4,
            height:        4,
            layers:        vec![],
            group_ids:     None,
            zip_composite: false
        }
    }

    fn zip_composite(mut self) -> FileBuilder {
        self.zip_composite = true;
        self
    }

    fn layer(mut self, layer: LayerSpec) -> FileBuilder {
        self.layers.push(layer);
        self
    }

    fn group_ids(mut self, ids: &[u16]) -> FileBuilder {
        self.group_ids = Some(ids.to_vec());
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut out = vec![];

        // header: RGB, 3 channels, 8 bit
        out.extend_from_slice(b"8BPS");
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&[0u8; 6]);
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&8u16.to_be_bytes());
        out.extend_from_slice(&3u16.to_be_bytes());

        // color mode data: empty
        out.extend_from_slice(&0u32.to_be_bytes());

        // image resources
        let mut resources = vec![];
        if let Some(ids) = &self.group_ids {
            resources.extend_from_slice(b"8BIM");
            resources.extend_from_slice(&1026u16.to_be_bytes());
            resources.extend_from_slice(&[0, 0]); // empty name, padded
            resources.extend_from_slice(&((ids.len() * 2) as u32).to_be_bytes());
            for id in ids {
                resources.extend_from_slice(&id.to_be_bytes());
            }
        }
        out.extend_from_slice(&(resources.len() as u32).to_be_bytes());
        out.extend_from_slice(&resources);

        // layer and mask info
        let mut layer_info = vec![];
        layer_info.extend_from_slice(&(self.layers.len() as i16).to_be_bytes());
        for layer in &self.layers {
            layer_info.extend_from_slice(&layer.record_bytes());
        }
        for layer in &self.layers {
            layer_info.extend_from_slice(&layer.channel_bytes());
        }

        let mut info = vec![];
        info.extend_from_slice(&(layer_info.len() as u32).to_be_bytes());
        info.extend_from_slice(&layer_info);
        info.extend_from_slice(&0u32.to_be_bytes()); // global mask info

        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(&info);

        // merged composite: three planes, raw or one shared zlib
        // stream holding a stored deflate block
        if self.zip_composite {
            out.extend_from_slice(&2u16.to_be_bytes());
            out.extend_from_slice(&[0x78, 0x01]);
            out.extend_from_slice(&[0x01, 0x30, 0x00, 0xCF, 0xFF]); // stored, len 48
            for plane in 0..3u8 {
                out.extend(std::iter::repeat(plane * 10).take(16));
            }
            out.extend_from_slice(&[0x1A, 0x20, 0x01, 0xE1]); // adler32
        } else {
            out.extend_from_slice(&0u16.to_be_bytes());
            for plane in 0..3u8 {
                let pixels = (self.width * self.height) as usize;
                out.extend(std::iter::repeat(plane * 10).take(pixels));
            }
        }
        out
    }
}

#[test]
fn flat_document_decodes() {
    let data = FileBuilder::new()
        .layer(LayerSpec::new("bottom"))
        .layer(LayerSpec::new("top"))
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();

    assert_eq!(document.header().width, 4);
    assert_eq!(document.header().color_mode, ColorMode::RGB);
    assert_eq!(document.records().len(), 2);
    assert!(document.warnings().is_empty());

    let tree = document.tree();
    let root = tree.root();
    assert_eq!(root.children.len(), 2);
    assert_eq!(tree.node(root.children[0]).unwrap().name, "top");
    assert_eq!(tree.node(root.children[1]).unwrap().name, "bottom");
}

#[test]
fn header_survives_round_trip() {
    let data = FileBuilder::new().build();

    let document = PsdDecoder::new(&data).decode().unwrap();

    assert_eq!(&document.header().to_bytes()[..], &data[..26]);
}

#[test]
fn folders_nest_and_divider_closes() {
    let data = FileBuilder::new()
        .layer(LayerSpec::new("</group>").empty_rect().section_marker(3))
        .layer(LayerSpec::new("inner"))
        .layer(LayerSpec::new("group").empty_rect().section_marker(1))
        .layer(LayerSpec::new("above"))
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();
    let tree = document.tree();
    let root = tree.root();

    assert_eq!(root.children.len(), 2);
    assert_eq!(tree.node(root.children[0]).unwrap().name, "above");

    let group = tree.node(root.children[1]).unwrap();
    assert_eq!(group.name, "group");
    assert_eq!(group.kind, LayerKind::Folder { open: true });
    assert_eq!(group.children.len(), 1);
    assert_eq!(tree.node(group.children[0]).unwrap().name, "inner");
}

#[test]
fn clipping_invariant_holds() {
    let data = FileBuilder::new()
        .layer(LayerSpec::new("base"))
        .layer(LayerSpec::new("clipped").clipped())
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();
    let tree = document.tree();
    let root = tree.root();

    for &child in &root.children {
        let node = tree.node(child).unwrap();
        let record = &document.records()[node.record.unwrap()];

        if record.clipping == Clipping::NonBase {
            let base = node.clipping_base.expect("clipped layer must have a base");
            let base_record = tree.node(base).unwrap().record.unwrap();
            assert_eq!(document.records()[base_record].clipping, Clipping::Base);
        }
    }
    assert!(document.warnings().is_empty());
}

#[test]
fn unknown_chunk_is_survivable() {
    // 37 arbitrary bytes under an unregistered signature, followed by a
    // chunk that must still land on the right offset
    let data = FileBuilder::new()
        .layer(
            LayerSpec::new("odd")
                .chunk(b"xxxx", &[0xAB; 37])
                .chunk(b"lyid", &42u32.to_be_bytes())
        )
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();

    assert!(document
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::UnknownChunkSignature(key) if key == b"xxxx")));

    // the id chunk after the unknown one decoded at the right offset
    assert_eq!(document.tree().node(1).unwrap().id, 42);
    assert_eq!(document.node_by_id(42), Some(1));
}

#[test]
fn strict_mode_turns_warnings_into_errors() {
    let data = FileBuilder::new()
        .layer(LayerSpec::new("odd").chunk(b"xxxx", &[0xAB; 37]))
        .build();

    let options = DecoderOptions::default().set_strict_mode(true);
    let result = PsdDecoder::new_with_options(&data, options).decode();

    assert!(result.is_err());
}

#[test]
fn group_id_table_links_layers() {
    let data = FileBuilder::new()
        .layer(LayerSpec::new("a"))
        .layer(LayerSpec::new("b"))
        .layer(LayerSpec::new("c"))
        .group_ids(&[7, 0, 7])
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();
    let tree = document.tree();

    let find = |name: &str| {
        tree.nodes()
            .iter()
            .position(|node| node.name == name)
            .unwrap()
    };
    let (a, b, c) = (find("a"), find("b"), find("c"));

    assert_eq!(tree.node(a).unwrap().group_members, vec![c]);
    assert_eq!(tree.node(c).unwrap().group_members, vec![a]);
    assert!(tree.node(b).unwrap().group_members.is_empty());
}

#[test]
fn composite_is_interleaved() {
    let data = FileBuilder::new().build();

    let document = PsdDecoder::new(&data).decode().unwrap();
    let composite = document.composite().unwrap();

    // 4x4 RGB, planes filled with 0, 10 and 20
    assert_eq!(composite.len(), 48);
    assert_eq!(&composite[0..3], &[0, 10, 20]);
}

#[test]
fn zip_composite_decodes_every_channel() {
    let data = FileBuilder::new().zip_composite().build();

    let document = PsdDecoder::new(&data).decode().unwrap();
    let composite = document.composite().unwrap();

    assert_eq!(composite.len(), 48);
    assert_eq!(&composite[0..3], &[0, 10, 20]);
    assert_eq!(&composite[45..48], &[0, 10, 20]);
}

#[test]
fn unicode_layer_name_wins() {
    // luni: u32 count + UTF-16BE
    let mut luni = vec![];
    luni.extend_from_slice(&4u32.to_be_bytes());
    for unit in "Grün".encode_utf16() {
        luni.extend_from_slice(&unit.to_be_bytes());
    }

    let data = FileBuilder::new()
        .layer(LayerSpec::new("ascii").chunk(b"luni", &luni))
        .build();

    let document = PsdDecoder::new(&data).decode().unwrap();

    assert_eq!(document.tree().node(1).unwrap().name, "Grün");
}

#[test]
fn truncated_file_is_a_hard_error() {
    let data = FileBuilder::new().build();

    let result = PsdDecoder::new(&data[..20]).decode();

    assert!(result.is_err());
}

#[test]
fn bad_magic_is_rejected() {
    let mut data = FileBuilder::new().build();
    data[0] = b'X';

    assert!(PsdDecoder::new(&data).decode().is_err());
}

#[test]
fn psb_widened_lengths_parse() {
    // a version-2 file with no layers: the layer-and-mask length is a
    // u64 instead of a u32
    let mut data = vec![];
    data.extend_from_slice(b"8BPS");
    data.extend_from_slice(&2u16.to_be_bytes());
    data.extend_from_slice(&[0u8; 6]);
    data.extend_from_slice(&1u16.to_be_bytes()); // one channel
    data.extend_from_slice(&2u32.to_be_bytes()); // height
    data.extend_from_slice(&2u32.to_be_bytes()); // width
    data.extend_from_slice(&8u16.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes()); // grayscale
    data.extend_from_slice(&0u32.to_be_bytes()); // color mode data
    data.extend_from_slice(&0u32.to_be_bytes()); // resources
    data.extend_from_slice(&0u64.to_be_bytes()); // layer and mask info
    data.extend_from_slice(&0u16.to_be_bytes()); // raw composite
    data.extend_from_slice(&[9, 9, 9, 9]);

    let document = PsdDecoder::new(&data).decode().unwrap();

    assert!(document.header().is_psb());
    assert_eq!(document.records().len(), 0);
    assert_eq!(document.composite().unwrap(), &[9, 9, 9, 9]);
}

#[test]
fn headers_only_decode_exposes_dimensions() {
    let data = FileBuilder::new().build();

    let mut decoder = PsdDecoder::new(&data);
    decoder.decode_headers().unwrap();

    assert_eq!(decoder.dimensions(), Some((4, 4)));
    assert_eq!(decoder.depth(), Some(8));
    assert_eq!(decoder.color_mode(), Some(ColorMode::RGB));
}
