/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! A PSD/PSB reader that reconstructs the full layer tree
//!
//! This crate decodes Photoshop documents into a navigable structure:
//! the document header, the flat on-disk list of layer records, and the
//! folder/group hierarchy rebuilt from the section-divider markers, with
//! clipping masks, layer groups and linked files resolved.
//!
//! Photoshop files in the wild routinely violate the format in small
//! ways, so the decoder is deliberately forgiving: anything that can be
//! skipped without losing stream alignment is skipped and reported as a
//! [`Warning`](errors::Warning) on the finished document instead of
//! failing the parse. Only structural damage (truncation, a bad
//! signature, absurd nesting) aborts.
//!
//! # Example
//! ```no_run
//! use psd_layers::PsdDecoder;
//!
//! fn main() -> Result<(), psd_layers::errors::PsdDecodeErrors> {
//!     let data = std::fs::read("image.psd").unwrap();
//!     let decoder = PsdDecoder::new(&data);
//!     let document = decoder.decode()?;
//!
//!     for node in document.tree().nodes() {
//!         println!("{} ({:?})", node.name, node.kind);
//!     }
//!     for warning in document.warnings() {
//!         println!("warning: {:?}", warning);
//!     }
//!     Ok(())
//! }
//! ```
#![no_std]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub extern crate psd_core;

pub use decoder::{PsdDecoder, PsdDocument};

pub mod channels;
pub mod chunks;
pub mod constants;
pub mod decoder;
pub mod descriptor;
pub mod engine_data;
pub mod errors;
pub mod headers;
pub mod hints;
pub mod layer;
pub mod resources;
pub mod text;
pub mod tree;
