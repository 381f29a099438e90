//! Event Module
//!
//! The boundary between source parsers and the tree builder:
//!
//! - [`BuildEvent`]: owned event values
//! - [`EventSink`]: callbacks the builder implements
//! - [`EventSource`]: anything that can drive events into a sink
//! - [`EventList`], [`EventRecorder`], [`Collection`]: in-crate sources

pub mod events;
pub mod source;

pub use events::{Attributes, BuildEvent};
pub use source::{
    Collection, CollectionEntry, EventList, EventRecorder, EventSink, EventSource, SourceInfo,
};
