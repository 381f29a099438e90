//! Dictionary Module
//!
//! Collaborators the tree builder updates while it appends nodes:
//! - [`Names`]: element/attribute name interning with per-name statistics
//! - [`Namespaces`]: prefix scopes and the namespace URI table
//! - [`PathSummary`]: occurrence counts per distinct path

pub mod namespace;
pub mod names;
pub mod path;
pub mod stats;

pub use namespace::{NamespaceScope, Namespaces};
pub use names::{NameStats, Names};
pub use path::{PathNode, PathSummary};
pub use stats::{TextStats, ValueType};
