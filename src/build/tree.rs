//! Tree Builder
//!
//! Turns build events into pre-ordered node records. Implements
//! [`EventSink`] so any [`EventSource`](crate::event::EventSource) can drive
//! it.
//!
//! Per level it remembers the pre and name id of the node opened there.
//! Those two stacks give each new node its distance to the parent and let
//! a closing node compute its subtree size as `next pre - own pre`.

use super::{BuildContext, Storage};
use crate::data::{NodeKind, NodeRecord};
use crate::error::{BuildError, Limit, Result};
use crate::event::EventSink;

/// Nodes allowed in one database (signed 32-bit range)
pub const MAX_NODES: u32 = i32::MAX as u32;

/// Builder state for one parse
pub struct TreeBuilder<'a, S: Storage + ?Sized> {
    /// Collaborators and metadata; `meta.size` doubles as the next pre
    ctx: &'a mut BuildContext,
    /// Backend receiving the records
    storage: &'a mut S,
    /// Pre of the node opened at each level
    pstack: Vec<u32>,
    /// Name id of the node opened at each level (0 for documents)
    tstack: Vec<u16>,
    /// Number of open levels
    level: usize,
    /// Attribute names and URIs of the element being opened
    attr_scratch: Vec<(u16, u8)>,
}

impl<'a, S: Storage + ?Sized> TreeBuilder<'a, S> {
    /// Bind a builder to a context and a backend
    pub fn new(ctx: &'a mut BuildContext, storage: &'a mut S) -> Self {
        Self {
            ctx,
            storage,
            pstack: Vec::with_capacity(32),
            tstack: Vec::with_capacity(32),
            level: 0,
            attr_scratch: Vec::with_capacity(8),
        }
    }

    /// Number of nodes appended so far (the next pre)
    #[inline]
    pub fn size(&self) -> u32 {
        self.ctx.meta.size
    }

    /// Name of the database being built
    pub fn db_name(&self) -> &str {
        &self.ctx.meta.name
    }

    /// Fail if elements or documents are still open
    pub fn check_closed(&self) -> Result<()> {
        if self.level != 0 {
            return Err(BuildError::malformed(format!(
                "input ended with {} unclosed node(s)",
                self.level
            )));
        }
        Ok(())
    }

    /// Hand out the next pre
    #[inline]
    fn next_pre(&mut self) -> Result<u32> {
        let pre = self.ctx.meta.size;
        if pre >= self.ctx.max_nodes {
            return Err(BuildError::LimitExceeded {
                limit: Limit::Nodes,
                max: self.ctx.max_nodes as usize,
            });
        }
        self.ctx.meta.size = pre + 1;
        Ok(pre)
    }

    /// Remember the node opened at the current level
    fn push_level(&mut self, pre: u32, name: u16) {
        let level = self.level;
        if self.pstack.len() <= level {
            self.pstack.resize(level + 1, 0);
            self.tstack.resize(level + 1, 0);
        }
        self.pstack[level] = pre;
        self.tstack[level] = name;
    }

    /// Distance from the next pre to the open parent, 1 at top level
    #[inline]
    fn dist(&self) -> u32 {
        if self.level == 0 {
            1
        } else {
            self.ctx.meta.size - self.pstack[self.level - 1]
        }
    }

    /// Name id of the open parent element, if the parent is an element
    #[inline]
    fn parent_tag(&self) -> Option<u16> {
        if self.level == 0 {
            return None;
        }
        match self.tstack[self.level - 1] {
            0 => None,
            tag => Some(tag),
        }
    }

    fn check_limits(&self) -> Result<()> {
        let options = &self.ctx.options;
        let checks = [
            (self.ctx.tags.len(), options.max_elem_names, Limit::ElementNames),
            (self.ctx.atts.len(), options.max_attr_names, Limit::AttributeNames),
            (self.ctx.ns.size(), options.max_namespaces, Limit::Namespaces),
        ];
        for (value, max, limit) in checks {
            if value >= max {
                return Err(BuildError::LimitExceeded { limit, max });
            }
        }
        Ok(())
    }

    /// Append an element and its attributes; returns the element's pre
    fn add_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<u32> {
        let cats = self.ctx.options.max_categories;
        let tag = self.ctx.tags.index(name);
        let declared_ns = self.ctx.ns.open();
        let uri = self.ctx.ns.uri(name, true);

        self.attr_scratch.clear();
        for (att_name, _) in attributes {
            let id = self.ctx.atts.index(att_name);
            let att_uri = self.ctx.ns.uri(att_name, false);
            self.attr_scratch.push((id, att_uri));
        }
        self.check_limits()?;

        self.ctx
            .paths
            .index(tag, NodeKind::Element, self.level, None, cats);
        if let Some(parent) = self.parent_tag() {
            self.ctx.tags.set_non_leaf(parent);
        }

        let dist = self.dist();
        let pre = self.next_pre()?;
        self.push_level(pre, tag);

        let attr_count = attributes.len().min(self.ctx.options.max_atts) as u8;
        let node = NodeRecord {
            kind: NodeKind::Element,
            name: tag,
            uri,
            ns: declared_ns,
            dist,
            size: attr_count as u32 + 1,
            attr_count,
        };
        self.storage.add_elem(pre, &node)?;

        for (i, (_, value)) in attributes.iter().enumerate() {
            let (id, att_uri) = self.attr_scratch[i];
            self.ctx
                .paths
                .index(id, NodeKind::Attribute, self.level + 1, Some(value.as_slice()), cats);
            self.ctx.atts.add_value(id, value, cats);
            let att_pre = self.next_pre()?;
            self.storage
                .add_attr(att_pre, id, att_uri, att_pre - pre, value)?;
        }
        Ok(pre)
    }

    /// Append a text, comment or processing instruction
    fn add_leaf(&mut self, value: &[u8], kind: NodeKind) -> Result<()> {
        let cats = self.ctx.options.max_categories;
        if let Some(parent) = self.parent_tag() {
            if kind == NodeKind::Text {
                self.ctx.tags.add_value(parent, value, cats);
            } else {
                self.ctx.tags.set_non_leaf(parent);
            }
        }
        self.ctx
            .paths
            .index(0, kind, self.level, Some(value), cats);

        let dist = self.dist();
        let pre = self.next_pre()?;
        self.storage.add_text(pre, kind, dist, value)
    }

    /// Close the innermost level and finalize its size
    fn close_level(&mut self) -> Result<u32> {
        self.level -= 1;
        // Every open level owns one namespace scope
        debug_assert_eq!(self.ctx.ns.depth(), self.level + 1);
        let pre = self.pstack[self.level];
        let end = self.ctx.meta.size;
        self.storage.set_size(pre, end - pre)?;
        self.ctx.ns.close(pre, end);
        Ok(pre)
    }
}

// ============================================================================
// EventSink Implementation
// ============================================================================

impl<S: Storage + ?Sized> EventSink for TreeBuilder<'_, S> {
    fn start_document(&mut self, name: &[u8]) -> Result<()> {
        if self.level != 0 {
            return Err(BuildError::malformed("document opened inside another node"));
        }
        self.ctx
            .paths
            .index(0, NodeKind::Document, 0, None, self.ctx.options.max_categories);
        let pre = self.next_pre()?;
        self.push_level(pre, 0);
        self.level += 1;
        self.storage.add_doc(pre, name)?;
        self.ctx.ns.open();
        tracing::debug!(pre, name = %String::from_utf8_lossy(name), "document opened");
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        if self.level != 1 || self.tstack[0] != 0 {
            return Err(BuildError::malformed(
                "document closed while elements are open",
            ));
        }
        let pre = self.close_level()?;
        self.ctx.meta.ndocs += 1;
        tracing::debug!(pre, size = self.ctx.meta.size - pre, "document closed");
        Ok(())
    }

    fn start_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        self.add_element(name, attributes)?;
        self.level += 1;
        Ok(())
    }

    fn empty_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let pre = self.add_element(name, attributes)?;
        let end = self.ctx.meta.size;
        self.ctx.ns.close(pre, end);
        // The provisional size only covers the attributes that were counted
        if attributes.len() > self.ctx.options.max_atts {
            self.storage.set_size(pre, end - pre)?;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        if self.level == 0 || self.tstack[self.level - 1] == 0 {
            return Err(BuildError::malformed("element closed without being opened"));
        }
        self.close_level()?;
        Ok(())
    }

    fn text(&mut self, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.add_leaf(value, NodeKind::Text)
    }

    fn comment(&mut self, value: &[u8]) -> Result<()> {
        self.add_leaf(value, NodeKind::Comment)
    }

    fn processing_instruction(&mut self, value: &[u8]) -> Result<()> {
        self.add_leaf(value, NodeKind::ProcessingInstruction)
    }

    fn start_namespace(&mut self, prefix: &[u8], uri: &[u8]) -> Result<()> {
        self.ctx.ns.add(prefix, uri);
        Ok(())
    }

    fn set_encoding(&mut self, encoding: &str) {
        self.ctx.meta.set_encoding(encoding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SourceInfo;
    use crate::options::BuildOptions;

    /// Storage that logs every call
    #[derive(Default)]
    struct LogStorage {
        rows: Vec<(u32, NodeKind, u32, u32)>,
        sizes: Vec<(u32, u32)>,
    }

    impl Storage for LogStorage {
        fn add_doc(&mut self, pre: u32, _name: &[u8]) -> Result<()> {
            self.rows.push((pre, NodeKind::Document, 1, 0));
            Ok(())
        }

        fn add_elem(&mut self, pre: u32, node: &NodeRecord) -> Result<()> {
            self.rows.push((pre, NodeKind::Element, node.dist, node.size));
            Ok(())
        }

        fn add_attr(
            &mut self,
            pre: u32,
            _name: u16,
            _uri: u8,
            dist: u32,
            _value: &[u8],
        ) -> Result<()> {
            self.rows.push((pre, NodeKind::Attribute, dist, 1));
            Ok(())
        }

        fn add_text(&mut self, pre: u32, kind: NodeKind, dist: u32, _value: &[u8]) -> Result<()> {
            self.rows.push((pre, kind, dist, 1));
            Ok(())
        }

        fn set_size(&mut self, pre: u32, size: u32) -> Result<()> {
            self.sizes.push((pre, size));
            Ok(())
        }
    }

    fn context(options: BuildOptions) -> BuildContext {
        BuildContext::new("test", options, &SourceInfo::default())
    }

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
        pairs
            .iter()
            .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_dist_and_sizes() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        {
            let mut b = TreeBuilder::new(&mut ctx, &mut storage);
            // <doc><a x="1"><b/>t</a></doc>
            b.start_document(b"doc").unwrap();
            b.start_element(b"a", &attrs(&[("x", "1")])).unwrap();
            b.empty_element(b"b", &[]).unwrap();
            b.text(b"t").unwrap();
            b.end_element().unwrap();
            b.end_document().unwrap();
            b.check_closed().unwrap();
        }
        assert_eq!(
            storage.rows,
            vec![
                (0, NodeKind::Document, 1, 0),
                (1, NodeKind::Element, 1, 2),
                (2, NodeKind::Attribute, 1, 1),
                (3, NodeKind::Element, 2, 1),
                (4, NodeKind::Text, 3, 1),
            ]
        );
        // Sizes are finalized innermost first
        assert_eq!(storage.sizes, vec![(1, 4), (0, 5)]);
        assert_eq!(ctx.meta.size, 5);
        assert_eq!(ctx.meta.ndocs, 1);
    }

    #[test]
    fn test_empty_text_ignored() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        b.start_document(b"doc").unwrap();
        b.text(b"").unwrap();
        assert_eq!(b.size(), 1);
        b.comment(b"").unwrap();
        assert_eq!(b.size(), 2);
    }

    #[test]
    fn test_leaf_flags() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        {
            let mut b = TreeBuilder::new(&mut ctx, &mut storage);
            // <doc><list><item>1</item><item>2<!--c--></item></list></doc>
            b.start_document(b"doc").unwrap();
            b.start_element(b"list", &[]).unwrap();
            b.start_element(b"item", &[]).unwrap();
            b.text(b"1").unwrap();
            b.end_element().unwrap();
            b.start_element(b"para", &[]).unwrap();
            b.text(b"2").unwrap();
            b.comment(b"c").unwrap();
            b.end_element().unwrap();
            b.end_element().unwrap();
            b.end_document().unwrap();
        }
        let tags = &ctx.tags;
        let leaf = |n: &[u8]| tags.stats(tags.id(n).unwrap()).unwrap().leaf;
        assert!(!leaf(b"list".as_slice()));
        assert!(leaf(b"item".as_slice()));
        assert!(!leaf(b"para".as_slice()));
        let item = tags.stats(tags.id(b"item").unwrap()).unwrap();
        assert_eq!(item.text.count, 1);
        assert!(item.text.is_numeric());
    }

    #[test]
    fn test_attribute_cap_truncates() {
        let options = BuildOptions {
            max_atts: 2,
            ..BuildOptions::default()
        };
        let mut ctx = context(options);
        let mut storage = LogStorage::default();
        {
            let mut b = TreeBuilder::new(&mut ctx, &mut storage);
            b.start_document(b"doc").unwrap();
            b.empty_element(b"e", &attrs(&[("a", "1"), ("b", "2"), ("c", "3")]))
                .unwrap();
            b.end_document().unwrap();
        }
        // Provisional size covers two attributes; the real size is patched
        assert_eq!(storage.rows[1], (1, NodeKind::Element, 1, 3));
        assert_eq!(storage.rows[4], (4, NodeKind::Attribute, 3, 1));
        assert_eq!(storage.sizes, vec![(1, 4), (0, 5)]);
    }

    #[test]
    fn test_node_limit() {
        let mut ctx = context(BuildOptions::default());
        ctx.max_nodes = 3;
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        b.start_document(b"doc").unwrap();
        // The element and its first attribute fit, the second does not
        let err = b.empty_element(b"a", &attrs(&[("x", "1"), ("y", "2")])).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::Nodes,
                max: 3
            }
        ));
        assert_eq!(b.size(), 3);
    }

    #[test]
    fn test_element_name_limit() {
        let options = BuildOptions {
            max_elem_names: 3,
            ..BuildOptions::default()
        };
        let mut ctx = context(options);
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        b.start_document(b"doc").unwrap();
        // The reserved entry counts against the limit
        b.empty_element(b"a", &[]).unwrap();
        b.empty_element(b"a", &[]).unwrap();
        let err = b.empty_element(b"b", &[]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::ElementNames,
                max: 3
            }
        ));
    }

    #[test]
    fn test_attribute_name_limit() {
        let options = BuildOptions {
            max_attr_names: 2,
            ..BuildOptions::default()
        };
        let mut ctx = context(options);
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        b.start_document(b"doc").unwrap();
        let err = b
            .empty_element(b"a", &attrs(&[("x", "1"), ("y", "2")]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::AttributeNames,
                ..
            }
        ));
    }

    #[test]
    fn test_namespace_limit() {
        let options = BuildOptions {
            max_namespaces: 3,
            ..BuildOptions::default()
        };
        let mut ctx = context(options);
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        b.start_document(b"doc").unwrap();
        b.start_namespace(b"a", b"urn:a").unwrap();
        let err = b.empty_element(b"a:x", &[]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::Namespaces,
                ..
            }
        ));
    }

    #[test]
    fn test_nesting_violations() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        let mut b = TreeBuilder::new(&mut ctx, &mut storage);
        assert!(matches!(b.end_element(), Err(BuildError::Malformed(_))));
        b.start_document(b"doc").unwrap();
        assert!(matches!(b.end_element(), Err(BuildError::Malformed(_))));
        assert!(matches!(b.start_document(b"x"), Err(BuildError::Malformed(_))));
        b.start_element(b"a", &[]).unwrap();
        assert!(matches!(b.end_document(), Err(BuildError::Malformed(_))));
        assert!(b.check_closed().is_err());
    }

    #[test]
    fn test_namespace_scope_recorded() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        {
            let mut b = TreeBuilder::new(&mut ctx, &mut storage);
            b.start_document(b"doc").unwrap();
            b.start_namespace(b"", b"urn:books").unwrap();
            b.start_element(b"lib", &[]).unwrap();
            b.empty_element(b"book", &[]).unwrap();
            b.end_element().unwrap();
            b.end_document().unwrap();
        }
        let scopes = ctx.ns.scopes();
        assert_eq!(scopes.len(), 1);
        assert_eq!((scopes[0].pre, scopes[0].size), (1, 2));
    }

    #[test]
    fn test_path_summary_counts() {
        let mut ctx = context(BuildOptions::default());
        let mut storage = LogStorage::default();
        {
            let mut b = TreeBuilder::new(&mut ctx, &mut storage);
            b.start_document(b"doc").unwrap();
            b.start_element(b"r", &[]).unwrap();
            b.empty_element(b"i", &[]).unwrap();
            b.empty_element(b"i", &[]).unwrap();
            b.end_element().unwrap();
            b.end_document().unwrap();
        }
        let paths = &ctx.paths;
        assert_eq!(paths.len(), 3);
        let (r, _) = paths.children(0).next().unwrap();
        let (_, i) = paths.children(r).next().unwrap();
        assert_eq!(i.count, 2);
    }
}
