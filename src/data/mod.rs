//! Data Module - Pre-order Node Tables
//!
//! A finished database is a flat table of node records addressed by pre
//! (document-order position). Structure is recovered from two integers per
//! node, without pointers:
//!
//! ```text
//! parent(pre)   = pre - dist(pre)
//! subtree(pre)  = pre .. pre + size(pre)
//! next sibling  = pre + size(pre)
//! ```
//!
//! Two snapshots implement the [`Data`] read interface:
//! - [`MemData`]: columnar in-memory arrays
//! - [`DiskData`]: fixed-width rows in a table file plus value stores

pub mod disk;
pub mod mem;
pub mod row;
pub mod value;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::dict::{Names, Namespaces, PathSummary};
use crate::error::{BuildError, Result};

pub use disk::DiskData;
pub use mem::MemData;
pub use row::ValueRef;

/// Kind of a node record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Document = 0,
    Element = 1,
    Text = 2,
    Attribute = 3,
    Comment = 4,
    ProcessingInstruction = 5,
}

impl NodeKind {
    /// Decode the 3-bit kind tag of a row
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => NodeKind::Document,
            1 => NodeKind::Element,
            2 => NodeKind::Text,
            3 => NodeKind::Attribute,
            4 => NodeKind::Comment,
            5 => NodeKind::ProcessingInstruction,
            _ => return None,
        })
    }

    /// Check if records of this kind can have descendants
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }

    /// Check if records of this kind carry a value
    #[inline]
    pub fn has_value(self) -> bool {
        self != NodeKind::Element
    }
}

/// Structural part of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Node kind
    pub kind: NodeKind,
    /// Name id in the element or attribute dictionary (0 if unnamed)
    pub name: u16,
    /// Namespace URI id (0 = none)
    pub uri: u8,
    /// Element declares namespaces of its own
    pub ns: bool,
    /// Distance to the parent
    pub dist: u32,
    /// Subtree size including the node itself
    pub size: u32,
    /// Attribute count, capped at the build's attribute limit
    pub attr_count: u8,
}

impl NodeRecord {
    /// Record of a leaf kind (attribute, text, comment, PI)
    pub fn leaf(kind: NodeKind, name: u16, uri: u8, dist: u32) -> Self {
        Self {
            kind,
            name,
            uri,
            ns: false,
            dist,
            size: 1,
            attr_count: 0,
        }
    }

    /// Record of a document node with the given size
    pub fn document(size: u32) -> Self {
        Self {
            kind: NodeKind::Document,
            name: 0,
            uri: 0,
            ns: false,
            dist: 1,
            size,
            attr_count: 0,
        }
    }
}

/// Database metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Database name
    pub name: String,
    /// Number of documents
    pub ndocs: u32,
    /// Number of nodes
    pub size: u32,
    /// Highest node id handed out
    pub lastid: i64,
    /// Character encoding of the input
    pub encoding: String,
    /// Original input path
    pub original: String,
    /// Input size in bytes
    pub filesize: u64,
    /// Input timestamp in milliseconds since the epoch
    pub time: u64,
    /// True while a build is writing the database
    pub dirty: bool,
    /// Whitespace chopping flag the input was parsed with
    pub chop: bool,
}

impl MetaData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ndocs: 0,
            size: 0,
            lastid: -1,
            encoding: UTF8.to_string(),
            original: String::new(),
            filesize: 0,
            time: 0,
            dirty: true,
            chop: true,
        }
    }

    /// Record the source encoding, normalizing UTF-8 spellings
    pub fn set_encoding(&mut self, encoding: &str) {
        self.encoding = if matches!(encoding, "UTF8" | "utf8" | "UTF-8" | "utf-8") {
            UTF8.to_string()
        } else {
            encoding.to_string()
        };
    }
}

/// Canonical UTF-8 encoding name
pub const UTF8: &str = "UTF-8";

/// Read access to a finished database
pub trait Data {
    /// Metadata
    fn meta(&self) -> &MetaData;

    /// Element name dictionary
    fn tags(&self) -> &Names;

    /// Attribute name dictionary
    fn atts(&self) -> &Names;

    /// Namespace table and scopes
    fn namespaces(&self) -> &Namespaces;

    /// Path summary
    fn paths(&self) -> &PathSummary;

    /// Structural record of a node
    fn node(&self, pre: u32) -> Result<NodeRecord>;

    /// Value of a node: document name, attribute value, text, comment or
    /// PI; empty for elements
    fn value(&self, pre: u32) -> Result<Cow<'_, [u8]>>;

    /// Number of nodes
    fn size_total(&self) -> u32 {
        self.meta().size
    }

    /// Kind of a node
    fn kind(&self, pre: u32) -> Result<NodeKind> {
        Ok(self.node(pre)?.kind)
    }

    /// Subtree size of a node
    fn size(&self, pre: u32) -> Result<u32> {
        Ok(self.node(pre)?.size)
    }

    /// Name of an element or attribute
    fn name(&self, pre: u32) -> Result<Option<&[u8]>> {
        let node = self.node(pre)?;
        Ok(match node.kind {
            NodeKind::Element => self.tags().name(node.name),
            NodeKind::Attribute => self.atts().name(node.name),
            _ => None,
        })
    }

    /// Parent of a node; documents and other top-level nodes have none
    fn parent(&self, pre: u32) -> Result<Option<u32>> {
        let node = self.node(pre)?;
        if node.kind == NodeKind::Document {
            return Ok(None);
        }
        let Some(candidate) = pre.checked_sub(node.dist) else {
            return Ok(None);
        };
        // Top-level content also has dist 1; its predecessor is a sibling
        let parent = self.node(candidate)?;
        let encloses = parent.kind.is_container() && candidate + parent.size > pre;
        Ok(encloses.then_some(candidate))
    }

    /// Attributes of an element
    fn attributes(&self, pre: u32) -> Result<Vec<u32>> {
        let end = pre + self.size(pre)?;
        let mut attrs = Vec::new();
        let mut p = pre + 1;
        while p < end && self.kind(p)? == NodeKind::Attribute {
            attrs.push(p);
            p += 1;
        }
        Ok(attrs)
    }

    /// Children of a document or element, attributes excluded
    fn children(&self, pre: u32) -> Result<Vec<u32>> {
        let end = pre + self.size(pre)?;
        let mut children = Vec::new();
        let mut p = pre + 1;
        while p < end {
            let node = self.node(p)?;
            if node.size == 0 {
                return Err(BuildError::Corrupt(format!("node {p} has no size")));
            }
            if node.kind != NodeKind::Attribute {
                children.push(p);
            }
            p += node.size;
        }
        Ok(children)
    }

    /// Pre values of all top-level nodes (documents, in a regular build)
    fn documents(&self) -> Result<Vec<u32>> {
        let mut docs = Vec::with_capacity(self.meta().ndocs as usize);
        let mut p = 0;
        while p < self.size_total() {
            docs.push(p);
            let size = self.size(p)?;
            if size == 0 {
                return Err(BuildError::Corrupt(format!("node {p} has no size")));
            }
            p += size;
        }
        Ok(docs)
    }
}
