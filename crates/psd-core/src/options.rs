/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Decoder options

/// Options shared by the PSD decoding routines.
///
/// Dimension limits default to the PSB format maximum; tighten them when
/// decoding untrusted input on a memory budget.
#[derive(Copy, Debug, Clone)]
pub struct DecoderOptions {
    /// Maximum width we can support
    max_width:            usize,
    /// Maximum height we can support
    max_height:           usize,
    /// Whether recoverable conditions should abort the decode instead
    /// of being collected as warnings
    strict_mode:          bool,
    /// Descriptors nest arbitrarily in the wild; reject anything deeper
    /// than this to keep adversarial files from exhausting the stack
    max_descriptor_depth: usize
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            max_width:            300_000,
            max_height:           300_000,
            strict_mode:          false,
            max_descriptor_depth: 64
        }
    }
}

impl DecoderOptions {
    /// Get maximum width configured for which the decoder
    /// can accept
    pub const fn max_width(&self) -> usize {
        self.max_width
    }

    /// Set maximum image width
    pub const fn set_max_width(mut self, width: usize) -> Self {
        self.max_width = width;
        self
    }

    /// Get maximum height configured for which the decoder can accept
    pub const fn max_height(&self) -> usize {
        self.max_height
    }

    /// Set maximum image height
    pub const fn set_max_height(mut self, height: usize) -> Self {
        self.max_height = height;
        self
    }

    /// Whether recoverable conditions abort the decode.
    pub const fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Set whether recoverable conditions abort the decode.
    pub const fn set_strict_mode(mut self, yes: bool) -> Self {
        self.strict_mode = yes;
        self
    }

    /// Maximum descriptor nesting depth accepted before the decode is
    /// aborted.
    pub const fn max_descriptor_depth(&self) -> usize {
        self.max_descriptor_depth
    }

    /// Set the maximum descriptor nesting depth.
    pub const fn set_max_descriptor_depth(mut self, depth: usize) -> Self {
        self.max_descriptor_depth = depth;
        self
    }
}
