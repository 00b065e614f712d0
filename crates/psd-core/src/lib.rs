/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Core routines shared by the psd-layered family of crates
//!
//! This crate provides the primitives the PSD/PSB decoder crates are
//! built on top of
//!
//! It currently contains
//!
//! - A bounded big-endian byte reader whose reads are charged against a
//!   section budget, so a malformed section can never desynchronize the
//!   stream for the sections after it
//! - The generic [`Value`](crate::value::Value) model shared by the
//!   descriptor parser, the engine-data parser and every chunk decoder
//! - Decoder options
//! - A log facade shim
//!
//! This library is `#[no_std]` with `alloc` needed for `Vec` and `String`.
#![no_std]
#![macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bytestream;
pub mod log;
pub mod options;
pub mod value;
