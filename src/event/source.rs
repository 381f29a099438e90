//! Event Sources and Sinks
//!
//! [`EventSink`] is the callback interface a builder implements;
//! [`EventSource`] drives events into a sink. Concrete text parsers live
//! outside this crate and plug in through these two traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::events::{pi_value, BuildEvent};
use crate::error::{BuildError, Result};

/// Receiver of build events
///
/// Calls must nest: every `start_element` is matched by one `end_element`,
/// and `start_document`/`end_document` wrap each document.
pub trait EventSink {
    /// Called when a document starts
    fn start_document(&mut self, name: &[u8]) -> Result<()>;

    /// Called when a document ends
    fn end_document(&mut self) -> Result<()>;

    /// Called when an element opens
    fn start_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()>;

    /// Called for a self-closing element
    fn empty_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()>;

    /// Called when an element closes
    fn end_element(&mut self) -> Result<()>;

    /// Called for text content
    fn text(&mut self, value: &[u8]) -> Result<()>;

    /// Called for comments
    fn comment(&mut self, value: &[u8]) -> Result<()>;

    /// Called for processing instructions, already joined as `target data`
    fn processing_instruction(&mut self, value: &[u8]) -> Result<()>;

    /// Called for a namespace declaration on the next element
    fn start_namespace(&mut self, prefix: &[u8], uri: &[u8]) -> Result<()>;

    /// Called when the source encoding is known
    fn set_encoding(&mut self, encoding: &str);

    /// Dispatch an owned event to the matching callback
    fn event(&mut self, event: &BuildEvent) -> Result<()> {
        match event {
            BuildEvent::StartDocument(name) => self.start_document(name),
            BuildEvent::EndDocument => self.end_document(),
            BuildEvent::StartElement { name, attributes } => self.start_element(name, attributes),
            BuildEvent::EmptyElement { name, attributes } => self.empty_element(name, attributes),
            BuildEvent::EndElement => self.end_element(),
            BuildEvent::Text(value) => self.text(value),
            BuildEvent::Comment(value) => self.comment(value),
            BuildEvent::ProcessingInstruction { target, data } => {
                self.processing_instruction(&pi_value(target, data))
            }
            BuildEvent::StartNamespace { prefix, uri } => self.start_namespace(prefix, uri),
            BuildEvent::Encoding(encoding) => {
                self.set_encoding(encoding);
                Ok(())
            }
        }
    }
}

/// Where the events of a build came from; copied into database metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Original path, or empty when there is no file behind the source
    pub path: String,
    /// Total input size in bytes
    pub size: u64,
    /// Modification time in milliseconds since the epoch
    pub timestamp: u64,
}

impl SourceInfo {
    /// Info for sources without a backing file: no path, current time
    pub fn now() -> Self {
        Self {
            path: String::new(),
            size: 0,
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Producer of build events
pub trait EventSource {
    /// Feed all events into the sink
    fn parse(&mut self, sink: &mut dyn EventSink) -> Result<()>;

    /// Metadata about the input
    fn info(&self) -> SourceInfo {
        SourceInfo::now()
    }
}

// ============================================================================
// Event List
// ============================================================================

/// Replays a fixed list of events verbatim
#[derive(Debug, Clone, Default)]
pub struct EventList {
    events: Vec<BuildEvent>,
    info: Option<SourceInfo>,
}

impl EventList {
    /// Create a source from events
    pub fn new(events: Vec<BuildEvent>) -> Self {
        Self { events, info: None }
    }

    /// Attach source metadata
    pub fn with_info(mut self, info: SourceInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Get the events as a slice
    pub fn events(&self) -> &[BuildEvent] {
        &self.events
    }
}

impl EventSource for EventList {
    fn parse(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        for event in &self.events {
            sink.event(event)?;
        }
        Ok(())
    }

    fn info(&self) -> SourceInfo {
        self.info.clone().unwrap_or_else(SourceInfo::now)
    }
}

// ============================================================================
// Event Recorder
// ============================================================================

/// Sink that records every event, so one source can be replayed into
/// several builders
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<BuildEvent>,
}

impl EventRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(64),
        }
    }

    /// Get number of recorded events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Take the recorded events as a replayable source
    pub fn into_source(self) -> EventList {
        EventList::new(self.events)
    }
}

impl EventSink for EventRecorder {
    fn start_document(&mut self, name: &[u8]) -> Result<()> {
        self.events.push(BuildEvent::StartDocument(name.to_vec()));
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.events.push(BuildEvent::EndDocument);
        Ok(())
    }

    fn start_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        self.events.push(BuildEvent::StartElement {
            name: name.to_vec(),
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn empty_element(&mut self, name: &[u8], attributes: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        self.events.push(BuildEvent::EmptyElement {
            name: name.to_vec(),
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        self.events.push(BuildEvent::EndElement);
        Ok(())
    }

    fn text(&mut self, value: &[u8]) -> Result<()> {
        self.events.push(BuildEvent::Text(value.to_vec()));
        Ok(())
    }

    fn comment(&mut self, value: &[u8]) -> Result<()> {
        self.events.push(BuildEvent::Comment(value.to_vec()));
        Ok(())
    }

    fn processing_instruction(&mut self, value: &[u8]) -> Result<()> {
        // Already joined; keep it whole in the target slot
        self.events.push(BuildEvent::ProcessingInstruction {
            target: value.to_vec(),
            data: Vec::new(),
        });
        Ok(())
    }

    fn start_namespace(&mut self, prefix: &[u8], uri: &[u8]) -> Result<()> {
        self.events.push(BuildEvent::StartNamespace {
            prefix: prefix.to_vec(),
            uri: uri.to_vec(),
        });
        Ok(())
    }

    fn set_encoding(&mut self, encoding: &str) {
        self.events.push(BuildEvent::Encoding(encoding.to_string()));
    }
}

// ============================================================================
// Collection
// ============================================================================

/// One document of a collection: a name and its body events
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    /// Document name (stored as the document node's value)
    pub name: Vec<u8>,
    /// Body events, without document start/end
    pub events: Vec<BuildEvent>,
    /// Input size in bytes, added to the collection's source size
    pub size: u64,
}

/// Sequence of documents built into one database
///
/// Each entry is wrapped in `start_document`/`end_document`. The stop flag
/// is checked between documents only; a document in progress always
/// completes.
#[derive(Debug, Clone)]
pub struct Collection {
    entries: Vec<CollectionEntry>,
    path: String,
    stop: Arc<AtomicBool>,
}

impl Collection {
    /// Create an empty collection rooted at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            path: path.into(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a document
    pub fn add(&mut self, name: impl Into<Vec<u8>>, events: Vec<BuildEvent>) -> &mut Self {
        self.add_entry(CollectionEntry {
            name: name.into(),
            events,
            size: 0,
        })
    }

    /// Add a document with known input size
    pub fn add_entry(&mut self, entry: CollectionEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Handle for cooperative cancellation from another thread
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Get number of documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the collection has no documents
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EventSource for Collection {
    fn parse(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        for entry in &self.entries {
            if self.stop.load(Ordering::Relaxed) {
                return Err(BuildError::Interrupted);
            }
            tracing::debug!(
                document = %String::from_utf8_lossy(&entry.name),
                events = entry.events.len(),
                "adding document"
            );
            sink.start_document(&entry.name)?;
            for event in &entry.events {
                sink.event(event)?;
            }
            sink.end_document()?;
        }
        Ok(())
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            path: self.path.clone(),
            size: self.entries.iter().map(|e| e.size).sum(),
            timestamp: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<BuildEvent> {
        vec![
            BuildEvent::start("root", &[("id", "1")]),
            BuildEvent::text("hello"),
            BuildEvent::ProcessingInstruction {
                target: b"pi".to_vec(),
                data: b"data".to_vec(),
            },
            BuildEvent::EndElement,
        ]
    }

    #[test]
    fn test_recorder_replays_list() {
        let mut events = vec![BuildEvent::document("doc.xml")];
        events.extend(body());
        events.push(BuildEvent::EndDocument);

        let mut list = EventList::new(events);
        let mut recorder = EventRecorder::new();
        list.parse(&mut recorder).unwrap();
        assert_eq!(recorder.event_count(), 6);

        let replay = recorder.into_source();
        assert_eq!(replay.events()[0], BuildEvent::document("doc.xml"));
        // PIs are recorded in joined form
        assert_eq!(
            replay.events()[3],
            BuildEvent::ProcessingInstruction {
                target: b"pi data".to_vec(),
                data: Vec::new()
            }
        );
    }

    #[test]
    fn test_collection_wraps_documents() {
        let mut collection = Collection::new("/data");
        collection.add("a.xml", body()).add("b.xml", body());

        let mut recorder = EventRecorder::new();
        collection.parse(&mut recorder).unwrap();
        let replay = recorder.into_source();
        let docs = replay
            .events()
            .iter()
            .filter(|e| matches!(e, BuildEvent::StartDocument(_)))
            .count();
        assert_eq!(docs, 2);
        assert_eq!(replay.events().last(), Some(&BuildEvent::EndDocument));
    }

    #[test]
    fn test_collection_stop_flag() {
        let mut collection = Collection::new("/data");
        collection.add("a.xml", body());
        collection.stop_handle().store(true, Ordering::Relaxed);

        let mut recorder = EventRecorder::new();
        let err = collection.parse(&mut recorder).unwrap_err();
        assert!(matches!(err, BuildError::Interrupted));
        assert_eq!(recorder.event_count(), 0);
    }

    #[test]
    fn test_collection_info_sums_sizes() {
        let mut collection = Collection::new("/data");
        collection.add_entry(CollectionEntry {
            name: b"a.xml".to_vec(),
            events: Vec::new(),
            size: 10,
        });
        collection.add_entry(CollectionEntry {
            name: b"b.xml".to_vec(),
            events: Vec::new(),
            size: 32,
        });
        let info = collection.info();
        assert_eq!(info.path, "/data");
        assert_eq!(info.size, 42);
    }
}
