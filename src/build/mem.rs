//! Memory Backend
//!
//! Keeps the node table in growable column arrays. Sizes are written back
//! in place as soon as a subtree closes, so finishing needs no extra pass.

use super::{drive, BuildContext, Builder, Storage};
use crate::data::mem::{MemData, MemTable};
use crate::data::{NodeKind, NodeRecord};
use crate::error::{BuildError, Result};
use crate::event::{BuildEvent, EventList, EventSource, SourceInfo};
use crate::options::BuildOptions;

/// Initial node capacity when the input size is unknown
const DEFAULT_CAPACITY: usize = 1 << 10;

/// Estimated bytes of input per node, used to presize the arrays
const BYTES_PER_NODE: u64 = 16;

/// Storage writing into a [`MemTable`]
#[derive(Debug, Default)]
pub struct MemStorage {
    table: MemTable,
}

impl MemStorage {
    /// Create storage sized for roughly `nodes` records
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            table: MemTable::with_capacity(nodes),
        }
    }

    /// Records written so far
    pub fn table(&self) -> &MemTable {
        &self.table
    }

    fn into_table(self) -> MemTable {
        self.table
    }
}

impl Storage for MemStorage {
    fn add_doc(&mut self, pre: u32, name: &[u8]) -> Result<()> {
        self.table.insert(pre, &NodeRecord::document(0), name)
    }

    fn add_elem(&mut self, pre: u32, node: &NodeRecord) -> Result<()> {
        self.table.insert(pre, node, &[])
    }

    fn add_attr(&mut self, pre: u32, name: u16, uri: u8, dist: u32, value: &[u8]) -> Result<()> {
        self.table
            .insert(pre, &NodeRecord::leaf(NodeKind::Attribute, name, uri, dist), value)
    }

    fn add_text(&mut self, pre: u32, kind: NodeKind, dist: u32, value: &[u8]) -> Result<()> {
        self.table.insert(pre, &NodeRecord::leaf(kind, 0, 0, dist), value)
    }

    fn set_size(&mut self, pre: u32, size: u32) -> Result<()> {
        self.table.set_size(pre, size)
    }
}

/// Orchestrator for in-memory databases
#[derive(Debug)]
pub struct MemBuilder {
    name: String,
    options: BuildOptions,
    state: Option<(BuildContext, MemStorage)>,
}

impl MemBuilder {
    /// Create a builder for a database called `name`
    pub fn new(name: impl Into<String>, options: BuildOptions) -> Self {
        Self {
            name: name.into(),
            options,
            state: None,
        }
    }

    /// Build a database from a list of events with default options
    pub fn build_events(name: &str, events: Vec<BuildEvent>) -> Result<MemData> {
        let mut source = EventList::new(events);
        let mut builder = Self::new(name, BuildOptions::default());
        let data = builder.build(&mut source)?;
        builder.close()?;
        Ok(data)
    }

    fn not_initialized(&self) -> BuildError {
        BuildError::Options(format!("builder for {} is not initialized", self.name))
    }
}

impl Builder for MemBuilder {
    type Output = MemData;

    fn init(&mut self, info: &SourceInfo) -> Result<()> {
        self.options.validate()?;
        let capacity = match info.size / BYTES_PER_NODE {
            0 => DEFAULT_CAPACITY,
            n => usize::try_from(n).unwrap_or(usize::MAX).min(1 << 24),
        };
        let ctx = BuildContext::new(&self.name, self.options.clone(), info);
        self.state = Some((ctx, MemStorage::with_capacity(capacity)));
        tracing::debug!(name = %self.name, capacity, "memory build initialized");
        Ok(())
    }

    fn parse(&mut self, source: &mut dyn EventSource) -> Result<()> {
        let err = self.not_initialized();
        let (ctx, storage) = self.state.as_mut().ok_or(err)?;
        drive(ctx, storage, source)
    }

    fn finish(&mut self) -> Result<MemData> {
        let (mut ctx, storage) = self.state.take().ok_or_else(|| self.not_initialized())?;
        let mut table = storage.into_table();
        table.shrink_to_fit();
        ctx.paths.finish();
        ctx.meta.dirty = false;
        tracing::info!(
            name = %ctx.meta.name,
            nodes = ctx.meta.size,
            documents = ctx.meta.ndocs,
            "memory database finished"
        );
        Ok(MemData {
            meta: ctx.meta,
            tags: ctx.tags,
            atts: ctx.atts,
            ns: ctx.ns,
            paths: ctx.paths,
            table,
        })
    }

    fn abort(&mut self) {
        if self.state.take().is_some() {
            tracing::warn!(name = %self.name, "memory build dropped");
        }
    }

    fn close(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }
}
