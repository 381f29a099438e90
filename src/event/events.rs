//! Build Event Types
//!
//! Owned events fed into the tree builder. Every event maps onto one
//! [`EventSink`](super::EventSink) callback.

/// Attribute list: `(qualified name, value)` pairs in document order
pub type Attributes = Vec<(Vec<u8>, Vec<u8>)>;

/// A build event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Opens a document; the name becomes the document node's value
    StartDocument(Vec<u8>),
    /// Closes the current document
    EndDocument,
    /// Opens an element
    StartElement { name: Vec<u8>, attributes: Attributes },
    /// Self-closing element; never followed by a matching `EndElement`
    EmptyElement { name: Vec<u8>, attributes: Attributes },
    /// Closes the current element
    EndElement,
    /// Text content (already chopped upstream if requested)
    Text(Vec<u8>),
    /// Comment content, without markers
    Comment(Vec<u8>),
    /// Processing instruction
    ProcessingInstruction { target: Vec<u8>, data: Vec<u8> },
    /// Namespace declaration for the next element to open
    StartNamespace { prefix: Vec<u8>, uri: Vec<u8> },
    /// Character encoding of the source
    Encoding(String),
}

impl BuildEvent {
    /// Start element with attributes given as string pairs
    pub fn start(name: &str, attributes: &[(&str, &str)]) -> Self {
        BuildEvent::StartElement {
            name: name.as_bytes().to_vec(),
            attributes: owned_attributes(attributes),
        }
    }

    /// Empty element with attributes given as string pairs
    pub fn empty(name: &str, attributes: &[(&str, &str)]) -> Self {
        BuildEvent::EmptyElement {
            name: name.as_bytes().to_vec(),
            attributes: owned_attributes(attributes),
        }
    }

    /// Text event from a string
    pub fn text(value: &str) -> Self {
        BuildEvent::Text(value.as_bytes().to_vec())
    }

    /// Document start from a string name
    pub fn document(name: &str) -> Self {
        BuildEvent::StartDocument(name.as_bytes().to_vec())
    }

    /// Namespace declaration from strings
    pub fn namespace(prefix: &str, uri: &str) -> Self {
        BuildEvent::StartNamespace {
            prefix: prefix.as_bytes().to_vec(),
            uri: uri.as_bytes().to_vec(),
        }
    }
}

fn owned_attributes(attributes: &[(&str, &str)]) -> Attributes {
    attributes
        .iter()
        .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

/// Joins a processing instruction into its stored value: `target data`
pub fn pi_value(target: &[u8], data: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(target.len() + data.len() + 1);
    value.extend_from_slice(target);
    if !data.is_empty() {
        value.push(b' ');
        value.extend_from_slice(data);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pi_value() {
        assert_eq!(
            pi_value(b"xml-stylesheet", b"href=\"a.css\""),
            b"xml-stylesheet href=\"a.css\""
        );
        assert_eq!(pi_value(b"target", b""), b"target");
    }

    #[test]
    fn test_attribute_helpers() {
        let event = BuildEvent::start("item", &[("id", "1"), ("lang", "en")]);
        match event {
            BuildEvent::StartElement { name, attributes } => {
                assert_eq!(name, b"item");
                assert_eq!(attributes.len(), 2);
                assert_eq!(attributes[1], (b"lang".to_vec(), b"en".to_vec()));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
