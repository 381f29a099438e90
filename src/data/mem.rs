//! In-Memory Database
//!
//! Columnar arrays indexed by pre. Values are kept verbatim in one shared
//! buffer and referenced by `(offset, len)` spans, without inlining or
//! compression.
//!
//! ```text
//! MemTable
//! ├── kinds:  Vec<NodeKind>
//! ├── names:  Vec<u16>       # name id | NS_FLAG
//! ├── uris:   Vec<u8>
//! ├── dists:  Vec<u32>
//! ├── sizes:  Vec<u32>       # written back in place when known
//! ├── atts:   Vec<u8>
//! ├── spans:  Vec<(u32, u32)> # value span per node
//! └── values: Vec<u8>
//! ```

use std::borrow::Cow;

use super::row::NS_FLAG;
use super::{Data, MetaData, NodeKind, NodeRecord};
use crate::dict::{Names, Namespaces, PathSummary};
use crate::error::{BuildError, Result};

/// Span of a value appended at `offset`; both ends must stay addressable
fn value_span(offset: usize, len: usize) -> std::io::Result<(u32, u32)> {
    let end = offset.checked_add(len).and_then(|end| u32::try_from(end).ok());
    match (u32::try_from(offset), u32::try_from(len), end) {
        (Ok(offset), Ok(len), Some(_)) => Ok((offset, len)),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "in-memory value buffer exceeds 4 GiB",
        )),
    }
}

/// Growable columnar node table
#[derive(Debug, Default)]
pub struct MemTable {
    kinds: Vec<NodeKind>,
    names: Vec<u16>,
    uris: Vec<u8>,
    dists: Vec<u32>,
    sizes: Vec<u32>,
    atts: Vec<u8>,
    spans: Vec<(u32, u32)>,
    values: Vec<u8>,
}

impl MemTable {
    /// Create with estimated capacity
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            kinds: Vec::with_capacity(nodes),
            names: Vec::with_capacity(nodes),
            uris: Vec::with_capacity(nodes),
            dists: Vec::with_capacity(nodes),
            sizes: Vec::with_capacity(nodes),
            atts: Vec::with_capacity(nodes),
            spans: Vec::with_capacity(nodes),
            values: Vec::with_capacity(nodes * 8),
        }
    }

    /// Write a record at `pre`, which must be the next free position
    pub fn insert(&mut self, pre: u32, node: &NodeRecord, value: &[u8]) -> Result<()> {
        if pre as usize != self.kinds.len() {
            return Err(BuildError::malformed(format!(
                "node {pre} appended out of order (expected {})",
                self.kinds.len()
            )));
        }
        let span = value_span(self.values.len(), value.len())?;
        self.values.extend_from_slice(value);

        self.kinds.push(node.kind);
        self.names.push(node.name | if node.ns { NS_FLAG } else { 0 });
        self.uris.push(node.uri);
        self.dists.push(node.dist);
        self.sizes.push(node.size);
        self.atts.push(node.attr_count);
        self.spans.push(span);
        Ok(())
    }

    /// Overwrite the size of an existing record
    pub fn set_size(&mut self, pre: u32, size: u32) -> Result<()> {
        let slot = self
            .sizes
            .get_mut(pre as usize)
            .ok_or_else(|| BuildError::malformed(format!("size for unknown node {pre}")))?;
        *slot = size;
        Ok(())
    }

    /// Read a record
    pub fn get(&self, pre: u32) -> Option<NodeRecord> {
        let i = pre as usize;
        let name = *self.names.get(i)?;
        Some(NodeRecord {
            kind: self.kinds[i],
            name: name & !NS_FLAG,
            uri: self.uris[i],
            ns: name & NS_FLAG != 0,
            dist: self.dists[i],
            size: self.sizes[i],
            attr_count: self.atts[i],
        })
    }

    /// Value bytes of a record
    pub fn value(&self, pre: u32) -> Option<&[u8]> {
        let (offset, len) = *self.spans.get(pre as usize)?;
        self.values.get(offset as usize..offset as usize + len as usize)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Release capacity left over from initial estimates
    pub fn shrink_to_fit(&mut self) {
        self.kinds.shrink_to_fit();
        self.names.shrink_to_fit();
        self.uris.shrink_to_fit();
        self.dists.shrink_to_fit();
        self.sizes.shrink_to_fit();
        self.atts.shrink_to_fit();
        self.spans.shrink_to_fit();
        self.values.shrink_to_fit();
    }
}

/// Finished in-memory database
#[derive(Debug)]
pub struct MemData {
    pub(crate) meta: MetaData,
    pub(crate) tags: Names,
    pub(crate) atts: Names,
    pub(crate) ns: Namespaces,
    pub(crate) paths: PathSummary,
    pub(crate) table: MemTable,
}

impl MemData {
    /// Direct access to the column table
    pub fn table(&self) -> &MemTable {
        &self.table
    }
}

impl Data for MemData {
    fn meta(&self) -> &MetaData {
        &self.meta
    }

    fn tags(&self) -> &Names {
        &self.tags
    }

    fn atts(&self) -> &Names {
        &self.atts
    }

    fn namespaces(&self) -> &Namespaces {
        &self.ns
    }

    fn paths(&self) -> &PathSummary {
        &self.paths
    }

    fn node(&self, pre: u32) -> Result<NodeRecord> {
        self.table
            .get(pre)
            .ok_or_else(|| BuildError::Corrupt(format!("node {pre} out of range")))
    }

    fn value(&self, pre: u32) -> Result<Cow<'_, [u8]>> {
        self.table
            .value(pre)
            .map(Cow::Borrowed)
            .ok_or_else(|| BuildError::Corrupt(format!("node {pre} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_patch() {
        let mut table = MemTable::with_capacity(4);
        let elem = NodeRecord {
            kind: NodeKind::Element,
            name: 3,
            uri: 1,
            ns: true,
            dist: 1,
            size: 1,
            attr_count: 0,
        };
        table.insert(0, &elem, b"").unwrap();
        table
            .insert(1, &NodeRecord::leaf(NodeKind::Text, 0, 0, 1), b"hi")
            .unwrap();
        table.set_size(0, 2).unwrap();

        let back = table.get(0).unwrap();
        assert_eq!(back.size, 2);
        assert!(back.ns);
        assert_eq!(back.name, 3);
        assert_eq!(table.value(1), Some(&b"hi"[..]));
        assert_eq!(table.value(0), Some(&b""[..]));
    }

    #[test]
    fn test_value_span_bounds() {
        assert_eq!(value_span(10, 5).unwrap(), (10, 5));
        let max = u32::MAX as usize;
        assert!(value_span(max, 0).is_ok());
        assert!(value_span(max, 1).is_err());
        assert!(value_span(0, max + 1).is_err());
        assert!(value_span(max + 1, 0).is_err());
    }

    #[test]
    fn test_out_of_order_insert_rejected() {
        let mut table = MemTable::default();
        let err = table
            .insert(1, &NodeRecord::leaf(NodeKind::Text, 0, 0, 1), b"x")
            .unwrap_err();
        assert!(matches!(err, BuildError::Malformed(_)));
        assert!(table.set_size(5, 1).is_err());
    }
}
