/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Image-resources section
//!
//! A length-prefixed run of `8BIM` resource blocks. Almost all of them
//! belong to excluded surfaces (thumbnails, print records, slices); the
//! one the tree builder needs is block 1026, the layer group-id table.

use alloc::vec::Vec;

use psd_core::bytestream::BoundedReader;
use psd_core::log::trace;

use crate::constants::{RESOURCE_LAYER_GROUP_IDS, RESOURCE_SIGNATURE};
use crate::errors::{PsdDecodeErrors, Warning};

/// Data pulled out of the image-resources section.
#[derive(Debug, Default, Clone)]
pub struct ImageResources {
    /// Block 1026: one group id per layer slot, in on-disk layer order.
    /// Zero means "no group".
    pub group_ids: Option<Vec<u16>>
}

/// Walk the image-resources section. `reader` is the section itself.
///
/// Unknown block ids are normal (resources are routinely
/// vendor-extended) and are skipped without a warning; only a malformed
/// section structure warns.
pub fn decode_image_resources(
    reader: &mut BoundedReader, warnings: &mut Vec<Warning>
) -> Result<ImageResources, PsdDecodeErrors> {
    let mut resources = ImageResources::default();

    // signature(4) + id(2) + empty name(2) + length(4)
    while reader.remaining() >= 12 {
        let signature = reader.get_fixed_bytes::<4>()?;

        if signature != RESOURCE_SIGNATURE {
            // structure lost, drop the rest of the section
            warnings.push(Warning::TrailingBytes {
                section: "image resources",
                count:   reader.skip_remaining() + 4
            });
            break;
        }

        let id = reader.get_u16_be()?;
        let _name = reader.pascal_string(2)?;
        let length = reader.get_u32_be()? as usize;
        // block data is padded to even length
        let padded = length.next_multiple_of(2).min(reader.remaining());

        let mut block = reader.section(padded)?;

        trace!("Resource block {id}, {length} bytes");

        if id == RESOURCE_LAYER_GROUP_IDS {
            let mut ids = Vec::with_capacity(length / 2);

            while block.remaining() >= 2 {
                ids.push(block.get_u16_be()?);
            }
            resources.group_ids = Some(ids);
        }
    }
    reader.skip_remaining();

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn resource_block(id: u16, data: &[u8]) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(b"8BIM");
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&[0, 0]); // empty pascal name, padded
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn group_id_table_is_decoded() {
        let mut section = resource_block(1005, &[1, 2, 3, 4]);
        section.extend_from_slice(&resource_block(
            1026,
            &[0, 7, 0, 7, 0, 0],
        ));

        let mut warnings = vec![];
        let mut reader = BoundedReader::new(&section);
        let resources = decode_image_resources(&mut reader, &mut warnings).unwrap();

        assert_eq!(resources.group_ids, Some(vec![7, 7, 0]));
        assert!(warnings.is_empty());
    }

    #[test]
    fn bad_signature_degrades_section() {
        let data = b"NOPE_____junk_bytes_here".to_vec();
        let mut warnings = vec![];
        let mut reader = BoundedReader::new(&data);
        let resources = decode_image_resources(&mut reader, &mut warnings).unwrap();

        assert!(resources.group_ids.is_none());
        assert_eq!(warnings.len(), 1);
        assert!(reader.is_empty());
    }
}
