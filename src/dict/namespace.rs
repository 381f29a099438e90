//! Namespace Scope Tracker
//!
//! Stack-based prefix resolution during a build, plus the record of which
//! bindings are visible over which pre range once the build has finished.

use memchr::memchr;
use serde::{Deserialize, Serialize};

use super::names::Names;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &[u8] = b"http://www.w3.org/XML/1998/namespace";
    pub const XML_PREFIX: &[u8] = b"xml";
}

/// Namespace binding (prefix -> URI id) active in the open scopes
#[derive(Debug, Clone)]
struct NsBinding {
    prefix: Vec<u8>,
    uri: u8,
    depth: u16,
}

/// Bindings declared on one node, visible over `pre..pre + size`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceScope {
    /// Node that declared the bindings
    pub pre: u32,
    /// Number of nodes the scope covers
    pub size: u32,
    /// `(prefix, uri id)` pairs; an empty prefix is the default namespace
    pub bindings: Vec<(Vec<u8>, u8)>,
}

impl NamespaceScope {
    /// Check if a pre lies within the scope
    #[inline]
    pub fn contains(&self, pre: u32) -> bool {
        pre >= self.pre && pre - self.pre < self.size
    }
}

/// Namespace scope tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespaces {
    /// URI table; id 0 means "no namespace"
    uris: Names,
    /// Finished scopes that declared bindings, in closing order
    scopes: Vec<NamespaceScope>,
    /// Declarations waiting for the next scope to open
    #[serde(skip)]
    pending: Vec<(Vec<u8>, u8)>,
    /// Bindings of the open scopes
    #[serde(skip)]
    bindings: Vec<NsBinding>,
    /// Whether each open scope declared bindings
    #[serde(skip)]
    open: Vec<bool>,
    /// Pre-interned id of the xml namespace
    xml_uri: u8,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespaces {
    /// Create a tracker with the `xml` prefix pre-bound
    pub fn new() -> Self {
        let mut uris = Names::new();
        let xml_uri = uris.index(ns::XML) as u8;
        Namespaces {
            uris,
            scopes: Vec::new(),
            pending: Vec::with_capacity(4),
            bindings: Vec::with_capacity(16),
            open: Vec::with_capacity(32),
            xml_uri,
        }
    }

    /// Declare a binding for the next scope to open
    pub fn add(&mut self, prefix: &[u8], uri: &[u8]) {
        if prefix == ns::XML_PREFIX {
            return;
        }
        // An empty URI undeclares the prefix
        let id = if uri.is_empty() {
            0
        } else {
            self.uris.index(uri) as u8
        };
        self.pending.push((prefix.to_vec(), id));
    }

    /// Enter a new scope; returns whether it declares bindings
    pub fn open(&mut self) -> bool {
        let depth = self.open.len() as u16 + 1;
        let declared = !self.pending.is_empty();
        for (prefix, uri) in self.pending.drain(..) {
            self.bindings.push(NsBinding { prefix, uri, depth });
        }
        self.open.push(declared);
        declared
    }

    /// Leave the innermost scope, opened by the node at `pre`; `end` is
    /// the first pre after its subtree
    pub fn close(&mut self, pre: u32, end: u32) {
        let depth = self.open.len() as u16;
        let Some(declared) = self.open.pop() else {
            return;
        };
        let split = self
            .bindings
            .iter()
            .rposition(|b| b.depth < depth)
            .map_or(0, |i| i + 1);
        let closed: Vec<(Vec<u8>, u8)> = self
            .bindings
            .drain(split..)
            .map(|b| (b.prefix, b.uri))
            .collect();
        if declared {
            self.scopes.push(NamespaceScope {
                pre,
                size: end.saturating_sub(pre),
                bindings: closed,
            });
        }
    }

    /// Resolve the URI id of a qualified name in the open scopes
    ///
    /// Unprefixed element names take the default namespace; unprefixed
    /// attribute names have none.
    pub fn uri(&self, name: &[u8], element: bool) -> u8 {
        let prefix = match memchr(b':', name) {
            Some(i) => &name[..i],
            None if element => &[][..],
            None => return 0,
        };
        if prefix == ns::XML_PREFIX {
            return self.xml_uri;
        }
        self.resolve(prefix).unwrap_or(0)
    }

    /// Resolve a prefix to a URI id; `Some(0)` for an undeclared default
    pub fn resolve(&self, prefix: &[u8]) -> Option<u8> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri)
    }

    /// Get the bytes of a URI
    pub fn uri_name(&self, id: u8) -> Option<&[u8]> {
        self.uris.name(id as u16)
    }

    /// Size of the URI table including the reserved entry
    pub fn size(&self) -> usize {
        self.uris.len()
    }

    /// Current scope depth
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Finished scopes that declared bindings
    pub fn scopes(&self) -> &[NamespaceScope] {
        &self.scopes
    }

    /// Bindings visible at a pre in the finished tree, innermost last
    /// declaration winning
    pub fn scope_at(&self, pre: u32) -> Vec<(Vec<u8>, u8)> {
        let mut enclosing: Vec<&NamespaceScope> =
            self.scopes.iter().filter(|s| s.contains(pre)).collect();
        enclosing.sort_by_key(|s| s.pre);

        let mut visible: Vec<(Vec<u8>, u8)> = Vec::new();
        for scope in enclosing {
            for (prefix, uri) in &scope.bindings {
                match visible.iter_mut().find(|(p, _)| p == prefix) {
                    Some(slot) => slot.1 = *uri,
                    None => visible.push((prefix.clone(), *uri)),
                }
            }
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_prefix_prebound() {
        let resolver = Namespaces::new();
        let id = resolver.uri(b"xml:lang", false);
        assert_ne!(id, 0);
        assert_eq!(resolver.uri_name(id), Some(ns::XML));
    }

    #[test]
    fn test_declare_and_resolve() {
        let mut resolver = Namespaces::new();
        resolver.add(b"svg", b"http://www.w3.org/2000/svg");
        assert!(resolver.open());

        let id = resolver.uri(b"svg:rect", true);
        assert_eq!(resolver.uri_name(id), Some(&b"http://www.w3.org/2000/svg"[..]));
        assert_eq!(resolver.uri(b"rect", true), 0);
        assert!(!resolver.open());
    }

    #[test]
    fn test_default_namespace_elements_only() {
        let mut resolver = Namespaces::new();
        resolver.add(b"", b"urn:default");
        resolver.open();
        assert_ne!(resolver.uri(b"item", true), 0);
        assert_eq!(resolver.uri(b"id", false), 0);
    }

    #[test]
    fn test_scope_close_records_range() {
        let mut resolver = Namespaces::new();
        resolver.open(); // document at pre 0
        resolver.add(b"foo", b"http://example.com/foo");
        resolver.open(); // element at pre 1
        assert_ne!(resolver.uri(b"foo:a", true), 0);

        resolver.close(1, 4);
        assert_eq!(resolver.uri(b"foo:a", true), 0);
        resolver.close(0, 4);

        assert_eq!(resolver.scopes().len(), 1);
        let scope = &resolver.scopes()[0];
        assert_eq!((scope.pre, scope.size), (1, 3));
        assert_eq!(resolver.scope_at(3).len(), 1);
        assert!(resolver.scope_at(4).is_empty());
        assert!(resolver.scope_at(0).is_empty());
    }

    #[test]
    fn test_shadow_binding() {
        let mut resolver = Namespaces::new();
        resolver.add(b"ns", b"http://example.com/ns1");
        resolver.open();
        let outer = resolver.uri(b"ns:a", true);

        resolver.add(b"ns", b"http://example.com/ns2");
        resolver.open();
        let inner = resolver.uri(b"ns:a", true);
        assert_ne!(outer, inner);

        resolver.close(1, 2);
        assert_eq!(resolver.uri(b"ns:a", true), outer);
        resolver.close(0, 2);

        let visible = resolver.scope_at(1);
        assert_eq!(visible, vec![(b"ns".to_vec(), inner)]);
    }

    #[test]
    fn test_uri_table_size() {
        let mut resolver = Namespaces::new();
        // reserved entry + xml namespace
        assert_eq!(resolver.size(), 2);
        resolver.add(b"a", b"urn:a");
        resolver.add(b"b", b"urn:a");
        assert_eq!(resolver.size(), 3);
    }
}
