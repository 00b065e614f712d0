/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Layer tree reconstruction
//!
//! Layer records are stored flat, bottom of the stack first, with
//! folder boundaries marked by `lsct`/`lsdk` chunks. The builder scans
//! the records in reverse (top of stack first), maintaining a parent
//! stack: an open or closed folder marker pushes a folder node, a
//! bounding divider pops one. Clipping bases, group membership and
//! linked files are resolved in later passes over the fixed shape.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use psd_core::value::Value;

use crate::errors::Warning;
use crate::layer::{Clipping, LayerRecord, Rect};

/// What a tree node represents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LayerKind {
    /// A folder; `open` mirrors the expanded state saved in the file.
    Folder { open: bool },
    Text,
    Shape,
    Adjustment,
    Image
}

/// The folder marker stored in an `lsct`/`lsdk` chunk.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SectionKind {
    OpenFolder,
    ClosedFolder,
    BoundingDivider,
    AnyOther
}

impl SectionKind {
    fn from_chunk(value: &Value) -> SectionKind {
        match value.get("kind").and_then(Value::as_int) {
            Some(1) => SectionKind::OpenFolder,
            Some(2) => SectionKind::ClosedFolder,
            Some(3) => SectionKind::BoundingDivider,
            _ => SectionKind::AnyOther
        }
    }
}

/// A file referenced by one or more placed layers.
#[derive(Clone)]
pub struct LinkedFile {
    pub name:      String,
    pub file_type: String,
    pub data:      Vec<u8>
}

/// Unique id to linked file contents, owned by the document.
pub type LinkedFileTable = BTreeMap<String, LinkedFile>;

/// One node of the reconstructed tree.
///
/// Children are ordered top of stack first. `record` indexes into the
/// document's flat record list; the synthetic root has none.
#[derive(Clone)]
pub struct LayerNode {
    pub id:            u32,
    pub record:        Option<usize>,
    pub kind:          LayerKind,
    pub rect:          Rect,
    pub blend_mode:    [u8; 4],
    pub opacity:       u8,
    pub fill_opacity:  u8,
    pub visible:       bool,
    pub name:          String,
    pub parent:        Option<usize>,
    pub children:      Vec<usize>,
    /// The base layer this node clips to, when clipping is in effect.
    pub clipping_base: Option<usize>,
    /// Nodes sharing this node's link group, both directions.
    pub group_members: Vec<usize>,
    /// Unique id into the document's linked-file table.
    pub linked_file:   Option<String>
}

/// The reconstructed layer tree as an index-linked arena.
///
/// Node 0 is a synthetic root representing the document itself.
#[derive(Clone)]
pub struct LayerTree {
    nodes: Vec<LayerNode>
}

impl LayerTree {
    pub fn root(&self) -> &LayerNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> Option<&LayerNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

const ADJUSTMENT_KEYS: [&[u8; 4]; 15] = [
    b"levl", b"curv", b"expA", b"grdm", b"hue2", b"blnc", b"mixr", b"phfl", b"selc", b"brit",
    b"post", b"thrs", b"nvrt", b"blwh", b"CgEd"
];

fn classify(record: &LayerRecord) -> LayerKind {
    if record.info(b"TySh").is_some() {
        return LayerKind::Text;
    }
    // solid-color fills count as shapes, not adjustments
    if record.info(b"vscg").is_some()
        || record.info(b"vmsk").is_some()
        || record.info(b"vsms").is_some()
        || record.info(b"vstk").is_some()
        || record.info(b"SoCo").is_some()
    {
        return LayerKind::Shape;
    }
    if ADJUSTMENT_KEYS
        .iter()
        .copied()
        .any(|key| record.info(key).is_some())
    {
        return LayerKind::Adjustment;
    }
    LayerKind::Image
}

fn display_name(record: &LayerRecord) -> String {
    match record.info(b"luni").and_then(Value::as_str) {
        Some(unicode) => unicode.to_string(),
        None => record.name.clone()
    }
}

fn fill_opacity(record: &LayerRecord) -> u8 {
    record
        .info(b"iOpa")
        .and_then(Value::as_int)
        .map(|v| v.clamp(0, 255) as u8)
        .unwrap_or(255)
}

fn placed_unique_id(record: &LayerRecord) -> Option<String> {
    if let Some(placed) = record.info(b"SoLd") {
        let id = placed
            .get("descriptor")
            .and_then(Value::as_descriptor)
            .and_then(|d| d.get("Idnt"))
            .and_then(Value::as_str);

        if let Some(id) = id {
            return Some(id.to_string());
        }
    }
    record
        .info(b"PlLd")
        .and_then(|v| v.get("unique_id"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Build the tree from the flat record list.
///
/// `group_ids` is the image-resource 1026 side table, index-aligned
/// with `records`. `linked` is the table decoded from the global
/// `lnk2`/`lnkD`/`lnk3` chunks.
pub fn build_tree(
    records: &[LayerRecord], group_ids: Option<&[u16]>, linked: &LinkedFileTable,
    warnings: &mut Vec<Warning>
) -> LayerTree {
    let mut nodes = Vec::with_capacity(records.len() + 1);

    nodes.push(LayerNode {
        id:            0,
        record:        None,
        kind:          LayerKind::Folder { open: true },
        rect:          Rect::default(),
        blend_mode:    *b"pass",
        opacity:       255,
        fill_opacity:  255,
        visible:       true,
        name:          String::new(),
        parent:        None,
        children:      Vec::new(),
        clipping_base: None,
        group_members: Vec::new(),
        linked_file:   None
    });

    let mut parent_stack: Vec<usize> = alloc::vec![0];

    // synthesized ids must not collide with any explicit one
    let mut max_id = records
        .iter()
        .filter_map(|r| r.info(b"lyid").and_then(Value::as_int))
        .map(|id| id.max(0) as u32)
        .max()
        .unwrap_or(0);

    // records are stored bottom first; walk top first
    for (record_index, record) in records.iter().enumerate().rev() {
        let marker = record
            .info(b"lsct")
            .or_else(|| record.info(b"lsdk"))
            .map(SectionKind::from_chunk);

        if marker == Some(SectionKind::BoundingDivider) {
            if parent_stack.len() > 1 {
                parent_stack.pop();
            }
            continue;
        }

        let parent = *parent_stack.last().unwrap_or(&0);
        let index = nodes.len();

        let kind = match marker {
            Some(SectionKind::OpenFolder) => LayerKind::Folder { open: true },
            Some(SectionKind::ClosedFolder) => LayerKind::Folder { open: false },
            _ => classify(record)
        };

        let id = match record.info(b"lyid").and_then(Value::as_int) {
            Some(id) => id.max(0) as u32,
            // synthesize above everything seen so far
            None => max_id + 1
        };
        max_id = max_id.max(id);

        nodes.push(LayerNode {
            id,
            record: Some(record_index),
            kind: kind.clone(),
            rect: record.rect,
            blend_mode: record.blend_mode,
            opacity: record.opacity,
            fill_opacity: fill_opacity(record),
            visible: record.visible(),
            name: display_name(record),
            parent: Some(parent),
            children: Vec::new(),
            clipping_base: None,
            group_members: Vec::new(),
            linked_file: None
        });
        nodes[parent].children.push(index);

        if matches!(kind, LayerKind::Folder { .. }) {
            parent_stack.push(index);
        }
    }

    resolve_clipping(&mut nodes, records, warnings);
    resolve_groups(&mut nodes, records, group_ids, warnings);
    resolve_linked_files(&mut nodes, records, linked, warnings);

    LayerTree { nodes }
}

/// Attach every clipped layer to the nearest base layer below it in
/// the stack, within the same parent.
///
/// Children are ordered top first, so "below in the stack" means a
/// larger child index.
fn resolve_clipping(
    nodes: &mut Vec<LayerNode>, records: &[LayerRecord], warnings: &mut Vec<Warning>
) {
    let mut links: Vec<(usize, usize)> = Vec::new();

    for parent in 0..nodes.len() {
        let children = nodes[parent].children.clone();

        for (slot, &child) in children.iter().enumerate() {
            let Some(record_index) = nodes[child].record else {
                continue;
            };
            if records[record_index].clipping != Clipping::NonBase {
                continue;
            }

            let base = children[slot + 1..].iter().copied().find(|&sibling| {
                nodes[sibling]
                    .record
                    .map(|r| records[r].clipping == Clipping::Base)
                    .unwrap_or(false)
            });

            match base {
                Some(base) => links.push((child, base)),
                None => warnings.push(Warning::OrphanedClippingMask(record_index))
            }
        }
    }

    for (child, base) in links {
        nodes[child].clipping_base = Some(base);
    }
}

/// Wire up mutual membership from the group-id side table and the
/// explicit ids carried in section dividers.
fn resolve_groups(
    nodes: &mut Vec<LayerNode>, records: &[LayerRecord], group_ids: Option<&[u16]>,
    warnings: &mut Vec<Warning>
) {
    let mut by_group: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

    for index in 1..nodes.len() {
        let Some(record_index) = nodes[index].record else {
            continue;
        };
        if record_index >= records.len() {
            continue;
        }

        let table = group_ids
            .and_then(|ids| ids.get(record_index))
            .map(|&id| u32::from(id))
            .filter(|&id| id != 0);
        let divider = records[record_index]
            .info(b"lsct")
            .or_else(|| records[record_index].info(b"lsdk"))
            .and_then(|v| v.get("sub_type"))
            .and_then(Value::as_int)
            .map(|id| id.max(0) as u32)
            .filter(|&id| id != 0);

        for id in [table, divider].into_iter().flatten() {
            let members = by_group.entry(id).or_default();

            // both sources may name the same group for one layer
            if members.last() != Some(&index) {
                members.push(index);
            }
        }
    }

    for (group, members) in by_group {
        if members.len() < 2 {
            warnings.push(Warning::UnresolvedGroupMembership(group));
            continue;
        }
        for &member in &members {
            nodes[member].group_members = members
                .iter()
                .copied()
                .filter(|&other| other != member)
                .collect();
        }
    }
}

/// Resolve placed-layer unique ids against the linked-file table.
fn resolve_linked_files(
    nodes: &mut Vec<LayerNode>, records: &[LayerRecord], linked: &LinkedFileTable,
    warnings: &mut Vec<Warning>
) {
    for node in nodes.iter_mut().skip(1) {
        let Some(record_index) = node.record else {
            continue;
        };
        let Some(unique_id) = placed_unique_id(&records[record_index]) else {
            continue;
        };

        if linked.contains_key(&unique_id) {
            node.linked_file = Some(unique_id);
        } else {
            warnings.push(Warning::UnresolvedLinkedFile(unique_id));
        }
    }
}

/// Build the linked-file table from a decoded `lnk2`/`lnkD`/`lnk3`
/// chunk value.
pub fn linked_files_from_value(value: &Value, table: &mut LinkedFileTable) {
    let Some(entries) = value.as_list() else {
        return;
    };

    for entry in entries {
        let Some(unique_id) = entry.get("unique_id").and_then(Value::as_str) else {
            continue;
        };
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let file_type = entry
            .get("file_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = entry
            .get("data")
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        table.insert(
            unique_id.to_string(),
            LinkedFile {
                name,
                file_type,
                data
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::layer::{Clipping, LayerRecord};

    fn record(name: &str, extra: Vec<([u8; 4], Value)>) -> LayerRecord {
        LayerRecord {
            rect:         Rect::default(),
            channels:     vec![],
            blend_mode:   *b"norm",
            opacity:      255,
            clipping:     Clipping::Base,
            flags:        0,
            name:         name.into(),
            mask:         None,
            additional:   extra,
            channel_data: vec![]
        }
    }

    fn divider() -> LayerRecord {
        record(
            "</Layer group>",
            vec![(
                *b"lsct",
                Value::Map(vec![("kind".into(), Value::Int(3))])
            )]
        )
    }

    fn folder(name: &str, open: bool) -> LayerRecord {
        record(
            name,
            vec![(
                *b"lsct",
                Value::Map(vec![("kind".into(), Value::Int(if open { 1 } else { 2 }))])
            )]
        )
    }

    #[test]
    fn flat_records_become_root_children() {
        let records = vec![record("bottom", vec![]), record("top", vec![])];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        assert_eq!(tree.len(), 3);
        let root = tree.root();
        assert_eq!(root.children.len(), 2);
        // children are top of stack first
        assert_eq!(tree.node(root.children[0]).unwrap().name, "top");
        assert_eq!(tree.node(root.children[1]).unwrap().name, "bottom");
    }

    #[test]
    fn folders_nest() {
        // file order is bottom first: divider closes the group below
        // the folder marker
        let records = vec![
            divider(),
            record("inner", vec![]),
            folder("group", true),
            record("above", vec![]),
        ];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        let root = tree.root();
        assert_eq!(root.children.len(), 2);

        let group = tree.node(root.children[1]).unwrap();
        assert_eq!(group.name, "group");
        assert_eq!(group.kind, LayerKind::Folder { open: true });
        assert_eq!(group.children.len(), 1);
        assert_eq!(tree.node(group.children[0]).unwrap().name, "inner");
    }

    #[test]
    fn clipping_attaches_to_base_below() {
        let mut clipped = record("clipped", vec![]);
        clipped.clipping = Clipping::NonBase;

        // bottom first: base is below the clipped layer
        let records = vec![record("base", vec![]), clipped];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        let root = tree.root();
        let top = tree.node(root.children[0]).unwrap();
        assert_eq!(top.name, "clipped");
        assert_eq!(top.clipping_base, Some(root.children[1]));
        assert!(warnings.is_empty());
    }

    #[test]
    fn orphaned_clipping_warns() {
        let mut clipped = record("floating", vec![]);
        clipped.clipping = Clipping::NonBase;

        let records = vec![clipped];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        assert!(tree.node(1).unwrap().clipping_base.is_none());
        assert_eq!(warnings, vec![Warning::OrphanedClippingMask(0)]);
    }

    #[test]
    fn group_ids_link_both_ways() {
        let records = vec![
            record("a", vec![]),
            record("b", vec![]),
            record("c", vec![]),
        ];
        let group_ids = [5u16, 0, 5];
        let mut warnings = vec![];

        let tree = build_tree(
            &records,
            Some(&group_ids),
            &LinkedFileTable::new(),
            &mut warnings
        );

        // find nodes by name since scan order reversed them
        let find = |name: &str| {
            tree.nodes()
                .iter()
                .position(|n| n.name == name)
                .unwrap()
        };
        let (a, b, c) = (find("a"), find("b"), find("c"));

        assert_eq!(tree.node(a).unwrap().group_members, vec![c]);
        assert_eq!(tree.node(c).unwrap().group_members, vec![a]);
        assert!(tree.node(b).unwrap().group_members.is_empty());
    }

    #[test]
    fn solid_fill_classifies_as_shape() {
        let records = vec![record(
            "fill",
            vec![(*b"SoCo", Value::Map(vec![("version".into(), Value::Int(16))]))]
        )];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        assert_eq!(tree.node(1).unwrap().kind, LayerKind::Shape);
    }

    #[test]
    fn divider_group_id_joins_the_table() {
        // "b" carries its group id in the divider chunk instead of a
        // 1026 table slot
        let with_divider = record(
            "b",
            vec![(
                *b"lsct",
                Value::Map(vec![
                    ("kind".into(), Value::Int(0)),
                    ("sub_type".into(), Value::Int(5)),
                ])
            )]
        );
        let records = vec![record("a", vec![]), with_divider];
        let group_ids = [5u16, 0];
        let mut warnings = vec![];

        let tree = build_tree(
            &records,
            Some(&group_ids),
            &LinkedFileTable::new(),
            &mut warnings
        );

        let find = |name: &str| {
            tree.nodes()
                .iter()
                .position(|n| n.name == name)
                .unwrap()
        };
        let (a, b) = (find("a"), find("b"));

        assert_eq!(tree.node(a).unwrap().group_members, vec![b]);
        assert_eq!(tree.node(b).unwrap().group_members, vec![a]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn singleton_group_id_warns() {
        let records = vec![record("solo", vec![])];
        let group_ids = [9u16];
        let mut warnings = vec![];

        build_tree(
            &records,
            Some(&group_ids),
            &LinkedFileTable::new(),
            &mut warnings
        );

        assert_eq!(warnings, vec![Warning::UnresolvedGroupMembership(9)]);
    }

    #[test]
    fn unicode_name_wins() {
        let records = vec![record(
            "ascii",
            vec![(*b"luni", Value::String("Ünïcode".into()))]
        )];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        assert_eq!(tree.node(1).unwrap().name, "Ünïcode");
    }

    #[test]
    fn layer_ids_are_synthesized_when_missing() {
        let records = vec![
            record("has id", vec![(*b"lyid", Value::Int(40))]),
            record("no id", vec![]),
        ];
        let mut warnings = vec![];

        let tree = build_tree(&records, None, &LinkedFileTable::new(), &mut warnings);

        let ids: Vec<u32> = tree.nodes().iter().skip(1).map(|n| n.id).collect();
        assert!(ids.contains(&40));
        assert!(ids.iter().any(|&id| id > 40));
    }

    #[test]
    fn unresolved_linked_file_warns() {
        let placed = record(
            "placed",
            vec![(
                *b"PlLd",
                Value::Map(vec![("unique_id".into(), Value::String("missing".into()))])
            )]
        );
        let mut warnings = vec![];

        build_tree(&[placed], None, &LinkedFileTable::new(), &mut warnings);

        assert_eq!(
            warnings,
            vec![Warning::UnresolvedLinkedFile("missing".into())]
        );
    }
}
