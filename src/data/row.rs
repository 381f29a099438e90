//! Table Row Encoding
//!
//! Every node occupies one 16-byte row, so row `i` starts at byte `i * 16`.
//! Byte 0 holds the kind tag; the rest is packed per kind:
//!
//! ```text
//! Document   [0] kind  [3..8] value  [8..12] size
//! Element    [0] kind | atts << 3  [1..3] name | NS_FLAG  [3] uri  [4..8] dist  [8..12] size
//! Attribute  [0] kind  [1..3] name  [3] uri  [4..8] dist  [8..13] value
//! Text/Comment/PI   [0] kind  [4..8] dist  [8..13] value
//! ```
//!
//! Integers are big-endian. Documents always have `dist == 1`; leaf kinds
//! always have `size == 1`. The size of containers sits at [`SIZE_OFFSET`],
//! which is where the merge pass patches final sizes.

use super::{NodeKind, NodeRecord};
use crate::error::{BuildError, Result};

/// Bytes per row
pub const ROW_SIZE: usize = 16;
/// log2 of [`ROW_SIZE`]
pub const ROW_POWER: u32 = 4;
/// Byte offset of the size field in container rows
pub const SIZE_OFFSET: usize = 8;
/// Name field bit marking an element that declares namespaces
pub const NS_FLAG: u16 = 0x8000;

/// Reference to a node value
///
/// Stored as 40 bits: bit 39 marks inline integers, bit 38 marks
/// compressed store entries, the low 38 bits hold the integer or offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRef {
    /// Small non-negative integer kept in the row itself
    Inline(i64),
    /// Offset into a value store
    Stored { offset: u64, compressed: bool },
}

impl ValueRef {
    const INLINE: u64 = 1 << 39;
    const COMPRESSED: u64 = 1 << 38;
    const MASK: u64 = (1 << 38) - 1;

    /// Largest store offset a row can reference
    pub const MAX_OFFSET: u64 = Self::MASK;

    /// Pack into the 40-bit row representation
    pub fn to_bits(self) -> u64 {
        match self {
            ValueRef::Inline(v) => Self::INLINE | (v as u64 & Self::MASK),
            ValueRef::Stored { offset, compressed } => {
                let flag = if compressed { Self::COMPRESSED } else { 0 };
                flag | (offset & Self::MASK)
            }
        }
    }

    /// Unpack from the 40-bit row representation
    pub fn from_bits(bits: u64) -> Self {
        if bits & Self::INLINE != 0 {
            ValueRef::Inline((bits & Self::MASK) as i64)
        } else {
            ValueRef::Stored {
                offset: bits & Self::MASK,
                compressed: bits & Self::COMPRESSED != 0,
            }
        }
    }
}

/// Encoder/decoder for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row(pub [u8; ROW_SIZE]);

impl Row {
    /// Document row; the size is patched later
    pub fn document(value: ValueRef, size: u32) -> Self {
        let mut row = Row([0; ROW_SIZE]);
        row.0[0] = NodeKind::Document as u8;
        row.put5(3, value.to_bits());
        row.put4(SIZE_OFFSET, size);
        row
    }

    /// Element row with a provisional size
    pub fn element(node: &NodeRecord) -> Self {
        let mut row = Row([0; ROW_SIZE]);
        row.0[0] = (node.attr_count << 3) | NodeKind::Element as u8;
        let name = node.name | if node.ns { NS_FLAG } else { 0 };
        row.0[1..3].copy_from_slice(&name.to_be_bytes());
        row.0[3] = node.uri;
        row.put4(4, node.dist);
        row.put4(SIZE_OFFSET, node.size);
        row
    }

    /// Attribute row
    pub fn attribute(name: u16, uri: u8, dist: u32, value: ValueRef) -> Self {
        let mut row = Row([0; ROW_SIZE]);
        row.0[0] = NodeKind::Attribute as u8;
        row.0[1..3].copy_from_slice(&name.to_be_bytes());
        row.0[3] = uri;
        row.put4(4, dist);
        row.put5(8, value.to_bits());
        row
    }

    /// Text, comment or processing instruction row
    pub fn text(kind: NodeKind, dist: u32, value: ValueRef) -> Self {
        let mut row = Row([0; ROW_SIZE]);
        row.0[0] = kind as u8;
        row.put4(4, dist);
        row.put5(8, value.to_bits());
        row
    }

    /// Decode the structural record and value reference
    pub fn decode(&self) -> Result<(NodeRecord, Option<ValueRef>)> {
        let b = &self.0;
        let kind = NodeKind::from_tag(b[0] & 0x07)
            .ok_or_else(|| BuildError::Corrupt(format!("unknown node kind {}", b[0] & 0x07)))?;
        let name = u16::from_be_bytes([b[1], b[2]]);
        Ok(match kind {
            NodeKind::Document => (
                NodeRecord::document(self.get4(SIZE_OFFSET)),
                Some(ValueRef::from_bits(self.get5(3))),
            ),
            NodeKind::Element => (
                NodeRecord {
                    kind,
                    name: name & !NS_FLAG,
                    uri: b[3],
                    ns: name & NS_FLAG != 0,
                    dist: self.get4(4),
                    size: self.get4(SIZE_OFFSET),
                    attr_count: b[0] >> 3,
                },
                None,
            ),
            NodeKind::Attribute => (
                NodeRecord::leaf(kind, name, b[3], self.get4(4)),
                Some(ValueRef::from_bits(self.get5(8))),
            ),
            _ => (
                NodeRecord::leaf(kind, 0, 0, self.get4(4)),
                Some(ValueRef::from_bits(self.get5(8))),
            ),
        })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; ROW_SIZE] {
        &self.0
    }

    fn put4(&mut self, at: usize, v: u32) {
        self.0[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    fn put5(&mut self, at: usize, v: u64) {
        self.0[at..at + 5].copy_from_slice(&v.to_be_bytes()[3..]);
    }

    fn get4(&self, at: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[at..at + 4]);
        u32::from_be_bytes(bytes)
    }

    fn get5(&self, at: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[3..].copy_from_slice(&self.0[at..at + 5]);
        u64::from_be_bytes(bytes)
    }
}
