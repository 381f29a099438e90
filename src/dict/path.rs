//! Path Statistics Tree
//!
//! Counts node occurrences per (name, kind, depth) along every distinct
//! root-to-node path, with value statistics for leaves. Nodes live in an
//! arena and refer to each other by index.

use serde::{Deserialize, Serialize};

use super::stats::TextStats;
use crate::data::NodeKind;

/// One distinct path step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    /// Name id (element/attribute dictionaries), 0 for unnamed kinds
    pub name: u16,
    /// Node kind
    pub kind: NodeKind,
    /// Tree depth (documents are at 0)
    pub level: u16,
    /// Number of nodes on this path
    pub count: u64,
    /// Statistics over the values of nodes on this path
    pub stats: TextStats,
    /// Parent path node (None for the root)
    pub parent: Option<u32>,
    /// Child path nodes
    pub children: Vec<u32>,
}

/// Path summary of a database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSummary {
    /// Arena of path nodes (index 0 is the document root once indexed)
    nodes: Vec<PathNode>,
    /// Path node open at each depth during a build
    #[serde(skip)]
    stack: Vec<u32>,
}

impl PathSummary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(64),
            stack: Vec::with_capacity(32),
        }
    }

    /// Count a node at `level`; values feed the path's statistics
    pub fn index(
        &mut self,
        name: u16,
        kind: NodeKind,
        level: usize,
        value: Option<&[u8]>,
        max_categories: usize,
    ) {
        let id = if level == 0 {
            match self.nodes.first_mut() {
                Some(root) => {
                    root.count += 1;
                    0
                }
                None => self.push(name, kind, 0, None),
            }
        } else {
            let parent = self.stack.get(level - 1).copied().unwrap_or(0);
            self.child(parent, name, kind, level as u16)
        };

        if let Some(value) = value {
            self.nodes[id as usize].stats.add(value, max_categories);
        }

        if self.stack.len() <= level {
            self.stack.resize(level + 1, 0);
        }
        self.stack[level] = id;
    }

    fn child(&mut self, parent: u32, name: u16, kind: NodeKind, level: u16) -> u32 {
        if self.nodes.is_empty() {
            // Content without a document wrapper hangs off a synthetic root
            self.push(0, NodeKind::Document, 0, None);
        }
        let existing = self.nodes[parent as usize]
            .children
            .iter()
            .copied()
            .find(|&c| {
                let node = &self.nodes[c as usize];
                node.name == name && node.kind == kind
            });
        match existing {
            Some(id) => {
                self.nodes[id as usize].count += 1;
                id
            }
            None => {
                let id = self.push(name, kind, level, Some(parent));
                self.nodes[parent as usize].children.push(id);
                id
            }
        }
    }

    fn push(&mut self, name: u16, kind: NodeKind, level: u16, parent: Option<u32>) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(PathNode {
            name,
            kind,
            level,
            count: 1,
            stats: TextStats::default(),
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Root path node
    pub fn root(&self) -> Option<&PathNode> {
        self.nodes.first()
    }

    /// Get a path node by id
    pub fn node(&self, id: u32) -> Option<&PathNode> {
        self.nodes.get(id as usize)
    }

    /// Iterate over the children of a path node
    pub fn children(&self, id: u32) -> impl Iterator<Item = (u32, &PathNode)> + '_ {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&c| (c, &self.nodes[c as usize]))
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if nothing was indexed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Release the build stack and spare capacity
    pub fn finish(&mut self) {
        self.stack = Vec::new();
        self.nodes.shrink_to_fit();
    }
}
