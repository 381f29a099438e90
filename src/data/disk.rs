//! Disk Database
//!
//! Read side of the disk layout written by
//! [`DiskBuilder`](crate::build::DiskBuilder):
//!
//! ```text
//! <root>/<name>/
//! ├── tbl           # fixed-width rows, row i = pre i
//! ├── txt           # document names, texts, comments, PIs
//! ├── atv           # attribute values
//! ├── sizes         # (pre, size) log; exists only while building
//! └── catalog.json  # metadata, dictionaries, namespaces, paths
//! ```
//!
//! Table reads go through an LRU cache of fixed-size blocks; decoded
//! values are cached separately so repeated reads skip decompression.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::row::{Row, ValueRef, ROW_POWER, ROW_SIZE};
use super::value::{inline_bytes, read_value};
use super::{Data, MetaData, NodeKind, NodeRecord};
use crate::dict::{Names, Namespaces, PathSummary};
use crate::error::{BuildError, Result};

/// Node table file
pub const TABLE_FILE: &str = "tbl";
/// Text value store file
pub const TEXT_FILE: &str = "txt";
/// Attribute value store file
pub const ATTR_FILE: &str = "atv";
/// Temporary size log file
pub const SIZES_FILE: &str = "sizes";
/// Catalog file
pub const CATALOG_FILE: &str = "catalog.json";

/// Bytes per cached table block (256 rows)
const BLOCK_SIZE: u64 = 1 << 12;
/// Cached table blocks per database
const BLOCK_CACHE: usize = 64;
/// Cached decoded values per store
const VALUE_CACHE: usize = 256;

/// Directory of a database
pub fn db_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// Everything about a database that is not a row or a value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub meta: MetaData,
    pub tags: Names,
    pub atts: Names,
    pub namespaces: Namespaces,
    pub paths: PathSummary,
}

impl Catalog {
    /// Write the catalog into a database directory
    pub fn write(&self, dir: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(dir.join(CATALOG_FILE))?);
        serde_json::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// Read the catalog of a database directory
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(CATALOG_FILE);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BuildError::Corrupt(format!("{} has no catalog", dir.display()))
            }
            _ => BuildError::Io(e),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Block-cached reader over the node table
#[derive(Debug)]
struct TableReader {
    file: File,
    blocks: LruCache<u64, Box<[u8]>>,
}

impl TableReader {
    fn new(file: File) -> Self {
        Self {
            file,
            blocks: LruCache::new(NonZeroUsize::new(BLOCK_CACHE).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    fn row(&mut self, pre: u32) -> Result<Row> {
        let pos = (pre as u64) << ROW_POWER;
        let block = pos / BLOCK_SIZE;
        if !self.blocks.contains(&block) {
            self.file.seek(SeekFrom::Start(block * BLOCK_SIZE))?;
            let mut buf = Vec::with_capacity(BLOCK_SIZE as usize);
            (&self.file).take(BLOCK_SIZE).read_to_end(&mut buf)?;
            self.blocks.put(block, buf.into_boxed_slice());
        }
        let data = self
            .blocks
            .get(&block)
            .ok_or_else(|| BuildError::Corrupt(format!("table block {block} missing")))?;
        let start = (pos % BLOCK_SIZE) as usize;
        let bytes = data
            .get(start..start + ROW_SIZE)
            .ok_or_else(|| BuildError::Corrupt(format!("node {pre} beyond end of table")))?;
        let mut row = [0u8; ROW_SIZE];
        row.copy_from_slice(bytes);
        Ok(Row(row))
    }
}

/// Value store reader with a cache of decoded entries
#[derive(Debug)]
struct ValueReader {
    input: BufReader<File>,
    cache: LruCache<u64, Vec<u8>>,
}

impl ValueReader {
    fn new(file: File) -> Self {
        Self {
            input: BufReader::new(file),
            cache: LruCache::new(NonZeroUsize::new(VALUE_CACHE).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    fn read(&mut self, offset: u64, compressed: bool) -> Result<Vec<u8>> {
        if let Some(value) = self.cache.get(&offset) {
            return Ok(value.clone());
        }
        let value = read_value(&mut self.input, offset, compressed)?;
        self.cache.put(offset, value.clone());
        Ok(value)
    }
}

/// Finished disk database
#[derive(Debug)]
pub struct DiskData {
    dir: PathBuf,
    catalog: Catalog,
    table: Mutex<TableReader>,
    texts: Mutex<ValueReader>,
    attrs: Mutex<ValueReader>,
}

impl DiskData {
    /// Open a finished database
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        let dir = db_path(root, name);
        let catalog = Catalog::read(&dir)?;
        Self::from_catalog(dir, catalog)
    }

    pub(crate) fn from_catalog(dir: PathBuf, catalog: Catalog) -> Result<Self> {
        let table = File::open(dir.join(TABLE_FILE))?;
        let rows = table.metadata()?.len() >> ROW_POWER;
        if rows != catalog.meta.size as u64 {
            return Err(BuildError::Corrupt(format!(
                "table holds {rows} rows, catalog expects {}",
                catalog.meta.size
            )));
        }
        let texts = File::open(dir.join(TEXT_FILE))?;
        let attrs = File::open(dir.join(ATTR_FILE))?;
        Ok(Self {
            dir,
            catalog,
            table: Mutex::new(TableReader::new(table)),
            texts: Mutex::new(ValueReader::new(texts)),
            attrs: Mutex::new(ValueReader::new(attrs)),
        })
    }

    /// Database directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn row(&self, pre: u32) -> Result<Row> {
        if pre >= self.catalog.meta.size {
            return Err(BuildError::Corrupt(format!("node {pre} out of range")));
        }
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .row(pre)
    }

    /// How a node's value is stored; `None` for elements
    pub fn value_ref(&self, pre: u32) -> Result<Option<ValueRef>> {
        Ok(self.row(pre)?.decode()?.1)
    }
}

impl Data for DiskData {
    fn meta(&self) -> &MetaData {
        &self.catalog.meta
    }

    fn tags(&self) -> &Names {
        &self.catalog.tags
    }

    fn atts(&self) -> &Names {
        &self.catalog.atts
    }

    fn namespaces(&self) -> &Namespaces {
        &self.catalog.namespaces
    }

    fn paths(&self) -> &PathSummary {
        &self.catalog.paths
    }

    fn node(&self, pre: u32) -> Result<NodeRecord> {
        Ok(self.row(pre)?.decode()?.0)
    }

    fn value(&self, pre: u32) -> Result<Cow<'_, [u8]>> {
        let (node, value) = self.row(pre)?.decode()?;
        let bytes = match value {
            None => Vec::new(),
            Some(ValueRef::Inline(n)) => inline_bytes(n),
            Some(ValueRef::Stored { offset, compressed }) => {
                let store = if node.kind == NodeKind::Attribute {
                    &self.attrs
                } else {
                    &self.texts
                };
                store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .read(offset, compressed)?
            }
        };
        Ok(Cow::Owned(bytes))
    }
}
