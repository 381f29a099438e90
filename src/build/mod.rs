//! Build Module
//!
//! Turns an event stream into a finished database:
//!
//! ```text
//! EventSource ──events──> TreeBuilder ──rows──> Storage ──finish──> Data
//!                             │
//!                             └── Names / Namespaces / PathSummary
//! ```
//!
//! The orchestrators ([`DiskBuilder`], [`MemBuilder`]) own the storage and
//! the collaborator dictionaries, and lend both to one [`TreeBuilder`] for
//! the duration of a parse.

pub mod disk;
pub mod mem;
pub mod tree;

pub use disk::{DiskBuilder, DiskStorage};
pub use mem::{MemBuilder, MemStorage};
pub use tree::TreeBuilder;

use crate::data::{Data, MetaData, NodeKind, NodeRecord};
use crate::dict::{Names, Namespaces, PathSummary};
use crate::error::Result;
use crate::event::{EventSink, EventSource, SourceInfo};
use crate::options::BuildOptions;

/// Backend that receives node records in pre order
///
/// Records arrive strictly in ascending pre order without gaps. Sizes of
/// documents and elements arrive later through [`set_size`](Self::set_size),
/// once their subtree is complete.
pub trait Storage {
    /// Append a document node
    fn add_doc(&mut self, pre: u32, name: &[u8]) -> Result<()>;

    /// Append an element with a provisional size
    fn add_elem(&mut self, pre: u32, node: &NodeRecord) -> Result<()>;

    /// Append an attribute
    fn add_attr(&mut self, pre: u32, name: u16, uri: u8, dist: u32, value: &[u8]) -> Result<()>;

    /// Append a text, comment or processing instruction
    fn add_text(&mut self, pre: u32, kind: NodeKind, dist: u32, value: &[u8]) -> Result<()>;

    /// Record the final subtree size of a document or element
    fn set_size(&mut self, pre: u32, size: u32) -> Result<()>;
}

/// Dictionaries and statistics filled during one build
#[derive(Debug)]
pub struct BuildContext {
    pub options: BuildOptions,
    pub meta: MetaData,
    pub tags: Names,
    pub atts: Names,
    pub ns: Namespaces,
    pub paths: PathSummary,
    /// Node count cap, [`MAX_NODES`](tree::MAX_NODES) unless lowered
    pub max_nodes: u32,
}

impl BuildContext {
    /// Create empty collaborators for a database
    pub fn new(name: &str, options: BuildOptions, info: &SourceInfo) -> Self {
        let mut meta = MetaData::new(name);
        meta.original = info.path.clone();
        meta.filesize = info.size;
        meta.time = info.timestamp;
        meta.chop = options.chop;
        Self {
            options,
            meta,
            tags: Names::new(),
            atts: Names::new(),
            ns: Namespaces::new(),
            paths: PathSummary::new(),
            max_nodes: tree::MAX_NODES,
        }
    }
}

/// Drive a source through a tree builder bound to `storage`
///
/// Synthesizes an empty document named after the database when the source
/// produced no nodes, so every build yields a valid tree.
pub(crate) fn drive<S: Storage + ?Sized>(
    ctx: &mut BuildContext,
    storage: &mut S,
    source: &mut dyn EventSource,
) -> Result<()> {
    let mut builder = TreeBuilder::new(ctx, storage);
    source.parse(&mut builder)?;
    builder.check_closed()?;

    if builder.size() == 0 {
        let name = builder.db_name().as_bytes().to_vec();
        builder.start_document(&name)?;
        builder.end_document()?;
    }
    drop(builder);

    ctx.meta.lastid = ctx.meta.size as i64 - 1;
    Ok(())
}

/// Build orchestrator: owns a backend from `init` until `finish` or `abort`
pub trait Builder {
    /// Database produced by a successful build
    type Output: Data;

    /// Allocate backend resources and empty collaborators
    fn init(&mut self, info: &SourceInfo) -> Result<()>;

    /// Feed a source into the initialized backend
    fn parse(&mut self, source: &mut dyn EventSource) -> Result<()>;

    /// Finalize the backend and return the immutable database
    fn finish(&mut self) -> Result<Self::Output>;

    /// Drop everything a failed build left behind
    fn abort(&mut self) {}

    /// Release open resources; safe to call repeatedly
    fn close(&mut self) -> Result<()>;

    /// Run a complete build, aborting on any failure
    fn build(&mut self, source: &mut dyn EventSource) -> Result<Self::Output> {
        let info = source.info();
        let result = self
            .init(&info)
            .and_then(|()| self.parse(source))
            .and_then(|()| self.finish());
        if let Err(e) = &result {
            tracing::warn!(error = %e, "build failed, aborting");
            self.abort();
        }
        result
    }
}
