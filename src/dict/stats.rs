//! Value Statistics
//!
//! Per-name and per-path summaries of the values seen during a build, kept
//! for later index and query heuristics.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Inferred type of the values seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// No value seen yet
    #[default]
    None,
    /// All values were integers
    Integer,
    /// All values were numeric, at least one not an integer
    Double,
    /// Few distinct non-numeric values
    Category,
    /// Arbitrary strings
    String,
}

/// Statistics over a stream of values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    /// Inferred type
    pub kind: ValueType,
    /// Number of values seen
    pub count: u64,
    /// Smallest numeric value (numeric types only)
    pub min: f64,
    /// Largest numeric value (numeric types only)
    pub max: f64,
    /// Distinct values, until more than the category limit are seen
    pub categories: BTreeSet<Vec<u8>>,
    /// Set once the category limit was exceeded; categories are then dropped
    pub capped: bool,
}

impl TextStats {
    /// Fold a value into the statistics
    pub fn add(&mut self, value: &[u8], max_categories: usize) {
        self.count += 1;

        if matches!(
            self.kind,
            ValueType::None | ValueType::Integer | ValueType::Double
        ) {
            match parse_number(value) {
                Some(Number::Integer(n)) => {
                    if self.kind == ValueType::None {
                        self.kind = ValueType::Integer;
                    }
                    self.extend_range(n as f64);
                }
                Some(Number::Double(d)) => {
                    self.kind = ValueType::Double;
                    self.extend_range(d);
                }
                None => self.kind = ValueType::Category,
            }
        }

        if self.capped {
            // Too many distinct values already seen to be categorical
            if self.kind == ValueType::Category {
                self.kind = ValueType::String;
            }
            return;
        }
        self.categories.insert(value.to_vec());
        if self.categories.len() > max_categories {
            self.capped = true;
            self.categories.clear();
            if self.kind == ValueType::Category {
                self.kind = ValueType::String;
            }
        }
    }

    fn extend_range(&mut self, value: f64) {
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    /// Check if every value seen was numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, ValueType::Integer | ValueType::Double)
    }
}

enum Number {
    Integer(i64),
    Double(f64),
}

fn parse_number(value: &[u8]) -> Option<Number> {
    let text = std::str::from_utf8(value).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Number::Integer(n));
    }
    // Reject "inf"/"NaN" spellings that Rust accepts but XML Schema does not
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .map(Number::Double)
}
