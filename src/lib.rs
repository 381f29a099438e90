//! RustyXML DB - pre/size/dist node tables built from XML events
//!
//! Pipeline:
//! Event source (`event`) -> tree builder (`build::tree`) -> storage
//! (`build::mem` or `build::disk`) -> finished database (`data`).
//!
//! Names, namespaces and path statistics (`dict`) are collected on the way
//! and travel with the finished database.
//!
//! ```
//! use rustyxml_db::{BuildEvent, Data, MemBuilder};
//!
//! let data = MemBuilder::build_events(
//!     "db",
//!     vec![
//!         BuildEvent::document("a.xml"),
//!         BuildEvent::start("a", &[]),
//!         BuildEvent::text("hi"),
//!         BuildEvent::EndElement,
//!         BuildEvent::EndDocument,
//!     ],
//! )?;
//! assert_eq!(data.size(0)?, 3);
//! # Ok::<(), rustyxml_db::BuildError>(())
//! ```

pub mod build;
pub mod data;
pub mod dict;
pub mod error;
pub mod event;
pub mod options;

pub use build::{Builder, DiskBuilder, MemBuilder, TreeBuilder};
pub use data::disk::DiskData;
pub use data::mem::MemData;
pub use data::{Data, MetaData, NodeKind, NodeRecord};
pub use error::{BuildError, Limit, Result};
pub use event::{
    BuildEvent, Collection, EventList, EventRecorder, EventSink, EventSource, SourceInfo,
};
pub use options::BuildOptions;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
