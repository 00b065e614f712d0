/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Layer-id keyed lookup table
//!
//! Layer ids are sparse and writer-assigned, so a sorted map beats a
//! dense vector for id to node lookups.

use alloc::collections::BTreeMap;

/// A map keyed by layer id.
#[derive(Clone)]
pub struct HintTable<V> {
    entries: BTreeMap<u32, V>
}

impl<V> HintTable<V> {
    pub fn new() -> HintTable<V> {
        HintTable {
            entries: BTreeMap::new()
        }
    }

    pub fn insert(&mut self, id: u32, value: V) -> Option<V> {
        self.entries.insert(id, value)
    }

    pub fn get(&self, id: u32) -> Option<&V> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut V> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<V> {
        self.entries.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for HintTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
