//! Disk Backend
//!
//! Streams rows and values into four append-only files. Subtree sizes are
//! not known when a container row is written, so they go to a separate
//! size log and are patched into the table once the input is consumed:
//!
//! ```text
//! parse:   tbl  <- rows (provisional sizes)
//!          txt  <- document names, texts, comments, PIs
//!          atv  <- attribute values
//!          sizes <- (pre, size) as LEB128 pairs
//!
//! finish:  sizes ──merge──> tbl[pre * 16 + 8]
//!          remove sizes, write catalog.json
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::tree::MAX_NODES;
use super::{drive, BuildContext, Builder, Storage};
use crate::data::disk::{
    db_path, Catalog, DiskData, ATTR_FILE, SIZES_FILE, TABLE_FILE, TEXT_FILE,
};
use crate::data::row::{Row, ROW_POWER, SIZE_OFFSET};
use crate::data::value::{read_unsigned, Compressor, ValueStore};
use crate::data::{NodeKind, NodeRecord};
use crate::error::{BuildError, Result};
use crate::event::{EventSource, SourceInfo};
use crate::options::BuildOptions;

/// Write buffer per output stream
const BUFFER_SIZE: usize = 1 << 16;

fn create(dir: &Path, file: &str) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::with_capacity(BUFFER_SIZE, File::create(dir.join(file))?))
}

/// Storage writing the disk layout of one database directory
#[derive(Debug)]
pub struct DiskStorage {
    table: BufWriter<File>,
    texts: ValueStore<BufWriter<File>>,
    attrs: ValueStore<BufWriter<File>>,
    sizes: BufWriter<File>,
    /// Rows written so far
    rows: u32,
    /// Entries in the size log
    patches: u64,
}

impl DiskStorage {
    /// Create the output files inside an existing directory
    pub fn create(dir: &Path, compress_min: usize) -> Result<Self> {
        let compressor = Compressor::new(compress_min);
        Ok(Self {
            table: create(dir, TABLE_FILE)?,
            texts: ValueStore::new(create(dir, TEXT_FILE)?, compressor),
            attrs: ValueStore::new(create(dir, ATTR_FILE)?, compressor),
            sizes: create(dir, SIZES_FILE)?,
            rows: 0,
            patches: 0,
        })
    }

    /// Number of rows written
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of pending size patches
    pub fn patches(&self) -> u64 {
        self.patches
    }

    fn write_row(&mut self, pre: u32, row: Row) -> Result<()> {
        if pre != self.rows {
            return Err(BuildError::malformed(format!(
                "node {pre} appended out of order (expected {})",
                self.rows
            )));
        }
        self.table.write_all(row.as_bytes())?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close every stream; returns the size log length
    fn close(self) -> Result<u64> {
        let Self {
            mut table,
            texts,
            attrs,
            mut sizes,
            patches,
            ..
        } = self;
        table.flush()?;
        texts.into_inner()?;
        attrs.into_inner()?;
        sizes.flush()?;
        Ok(patches)
    }
}

impl Storage for DiskStorage {
    fn add_doc(&mut self, pre: u32, name: &[u8]) -> Result<()> {
        let value = self.texts.add(name)?;
        self.write_row(pre, Row::document(value, 0))
    }

    fn add_elem(&mut self, pre: u32, node: &NodeRecord) -> Result<()> {
        self.write_row(pre, Row::element(node))
    }

    fn add_attr(&mut self, pre: u32, name: u16, uri: u8, dist: u32, value: &[u8]) -> Result<()> {
        let value = self.attrs.add(value)?;
        self.write_row(pre, Row::attribute(name, uri, dist, value))
    }

    fn add_text(&mut self, pre: u32, kind: NodeKind, dist: u32, value: &[u8]) -> Result<()> {
        let value = self.texts.add(value)?;
        self.write_row(pre, Row::text(kind, dist, value))
    }

    fn set_size(&mut self, pre: u32, size: u32) -> Result<()> {
        leb128::write::unsigned(&mut self.sizes, pre as u64)?;
        leb128::write::unsigned(&mut self.sizes, size as u64)?;
        self.patches += 1;
        Ok(())
    }
}

/// Apply `count` logged sizes to the table of `dir`
fn merge_sizes(dir: &Path, count: u64) -> Result<()> {
    let mut log = BufReader::with_capacity(BUFFER_SIZE, File::open(dir.join(SIZES_FILE))?);
    let mut table = OpenOptions::new()
        .read(true)
        .write(true)
        .open(dir.join(TABLE_FILE))?;
    for _ in 0..count {
        let pre = read_unsigned(&mut log)?;
        let size = u32::try_from(read_unsigned(&mut log)?)
            .map_err(|_| BuildError::Corrupt("logged size overflows 32 bits".into()))?;
        table.seek(SeekFrom::Start((pre << ROW_POWER) + SIZE_OFFSET as u64))?;
        table.write_all(&size.to_be_bytes())?;
    }
    table.sync_all()?;
    Ok(())
}

/// Orchestrator for disk databases
#[derive(Debug)]
pub struct DiskBuilder {
    root: PathBuf,
    name: String,
    options: BuildOptions,
    state: Option<(BuildContext, DiskStorage)>,
    /// Directory created by `init` that has not been finished yet
    pending: Option<PathBuf>,
    max_nodes: u32,
}

impl DiskBuilder {
    /// Create a builder for database `name` under `root`
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>, options: BuildOptions) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            options,
            state: None,
            pending: None,
            max_nodes: MAX_NODES,
        }
    }

    #[cfg(test)]
    fn with_max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Directory the database is written to
    pub fn dir(&self) -> PathBuf {
        db_path(&self.root, &self.name)
    }

    fn not_initialized(&self) -> BuildError {
        BuildError::Options(format!("builder for {} is not initialized", self.name))
    }
}

impl Builder for DiskBuilder {
    type Output = DiskData;

    fn init(&mut self, info: &SourceInfo) -> Result<()> {
        self.options.validate()?;
        let dir = self.dir();
        if dir.exists() {
            tracing::debug!(dir = %dir.display(), "dropping existing database");
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        self.pending = Some(dir.clone());

        let storage = DiskStorage::create(&dir, self.options.compress_min)?;
        let mut ctx = BuildContext::new(&self.name, self.options.clone(), info);
        ctx.max_nodes = self.max_nodes;
        self.state = Some((ctx, storage));
        tracing::debug!(dir = %dir.display(), "disk build initialized");
        Ok(())
    }

    fn parse(&mut self, source: &mut dyn EventSource) -> Result<()> {
        let err = self.not_initialized();
        let (ctx, storage) = self.state.as_mut().ok_or(err)?;
        drive(ctx, storage, source)
    }

    fn finish(&mut self) -> Result<DiskData> {
        let (mut ctx, storage) = self.state.take().ok_or_else(|| self.not_initialized())?;
        let dir = self.dir();

        let rows = storage.rows();
        let patches = storage.close()?;
        tracing::debug!(rows, patches, "merging size log");
        merge_sizes(&dir, patches)?;
        fs::remove_file(dir.join(SIZES_FILE))?;

        ctx.paths.finish();
        ctx.meta.dirty = false;
        let documents = ctx.meta.ndocs;
        let catalog = Catalog {
            meta: ctx.meta,
            tags: ctx.tags,
            atts: ctx.atts,
            namespaces: ctx.ns,
            paths: ctx.paths,
        };
        catalog.write(&dir)?;
        let data = DiskData::from_catalog(dir, catalog)?;
        self.pending = None;

        tracing::info!(
            name = %self.name,
            nodes = rows,
            documents,
            "disk database finished"
        );
        Ok(data)
    }

    fn abort(&mut self) {
        // Streams must be closed before the directory goes
        self.state = None;
        let Some(dir) = self.pending.take() else {
            return;
        };
        match fs::remove_dir_all(&dir) {
            Ok(()) => tracing::warn!(dir = %dir.display(), "partial database removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "could not remove partial database"
            ),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some((_, storage)) = self.state.take() {
            storage.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::row::ValueRef;
    use crate::data::Data;
    use crate::error::Limit;
    use crate::event::{BuildEvent as E, EventList};

    fn events() -> Vec<E> {
        vec![
            E::document("doc.xml"),
            E::start("root", &[("n", "42")]),
            E::start("long", &[]),
            E::Text(b"lorem ipsum dolor sit amet ".repeat(40)),
            E::EndElement,
            E::empty("e", &[]),
            E::EndElement,
            E::EndDocument,
        ]
    }

    #[test]
    fn test_build_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = DiskBuilder::new(tmp.path(), "db", BuildOptions::default());
        let data = builder.build(&mut EventList::new(events())).unwrap();
        builder.close().unwrap();

        assert_eq!(data.meta().size, 6);
        assert_eq!(data.size(0).unwrap(), 6);
        assert_eq!(data.size(1).unwrap(), 5);
        assert_eq!(data.size(3).unwrap(), 2);
        assert!(!tmp.path().join("db").join(SIZES_FILE).exists());

        let reopened = DiskData::open(tmp.path(), "db").unwrap();
        assert_eq!(reopened.meta(), data.meta());
        for pre in 0..data.meta().size {
            assert_eq!(reopened.node(pre).unwrap(), data.node(pre).unwrap());
            assert_eq!(reopened.value(pre).unwrap(), data.value(pre).unwrap());
        }
    }

    #[test]
    fn test_inlined_and_compressed_values() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = DiskBuilder::new(tmp.path(), "db", BuildOptions::default());
        let data = builder.build(&mut EventList::new(events())).unwrap();

        assert_eq!(data.value_ref(2).unwrap(), Some(ValueRef::Inline(42)));
        assert_eq!(&*data.value(2).unwrap(), b"42");
        assert!(matches!(
            data.value_ref(4).unwrap(),
            Some(ValueRef::Stored {
                compressed: true,
                ..
            })
        ));
        assert_eq!(
            data.value(4).unwrap().into_owned(),
            b"lorem ipsum dolor sit amet ".repeat(40)
        );
        // Nothing inlined went into the attribute store
        let atv = fs::metadata(tmp.path().join("db").join(ATTR_FILE)).unwrap();
        assert_eq!(atv.len(), 0);
    }

    #[test]
    fn test_limit_overflow_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            max_elem_names: 2,
            ..BuildOptions::default()
        };
        let mut builder = DiskBuilder::new(tmp.path(), "db", options);
        let err = builder.build(&mut EventList::new(events())).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::ElementNames,
                ..
            }
        ));
        assert!(!tmp.path().join("db").exists());
        builder.close().unwrap();
    }

    #[test]
    fn test_node_limit_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder =
            DiskBuilder::new(tmp.path(), "db", BuildOptions::default()).with_max_nodes(3);
        let err = builder.build(&mut EventList::new(events())).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LimitExceeded {
                limit: Limit::Nodes,
                max: 3
            }
        ));
        assert!(!tmp.path().join("db").exists());
        builder.close().unwrap();
    }

    #[test]
    fn test_abort_before_merge_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = DiskBuilder::new(tmp.path(), "db", BuildOptions::default());
        builder.init(&SourceInfo::default()).unwrap();
        builder.parse(&mut EventList::new(events())).unwrap();
        assert!(tmp.path().join("db").join(SIZES_FILE).exists());

        builder.abort();
        assert!(!tmp.path().join("db").exists());
        builder.abort();
        builder.close().unwrap();
    }

    #[test]
    fn test_rebuild_replaces_database() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = DiskBuilder::new(tmp.path(), "db", BuildOptions::default());
        builder.build(&mut EventList::new(events())).unwrap();

        let mut builder = DiskBuilder::new(tmp.path(), "db", BuildOptions::default());
        let data = builder.build(&mut EventList::new(Vec::new())).unwrap();
        assert_eq!(data.meta().size, 1);
        assert_eq!(&*data.value(0).unwrap(), b"db");
    }

    #[test]
    fn test_open_without_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("db")).unwrap();
        let err = DiskData::open(tmp.path(), "db").unwrap_err();
        assert!(matches!(err, BuildError::Corrupt(_)));
    }
}
