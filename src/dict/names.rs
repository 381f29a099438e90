//! Name Dictionary
//!
//! Interns element and attribute names to small integer ids and keeps
//! per-name statistics. Append-only: an id never changes during a build.
//!
//! Memory layout:
//! - `data`: one buffer holding every name's bytes back to back
//! - `entries`: `(offset, len)` into `data` for each id
//! - `hash_index`: hash -> list of ids (handles rare collisions)
//!
//! Id 0 is reserved for "no name".

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::stats::TextStats;

/// Statistics attached to one name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameStats {
    /// Number of nodes carrying this name
    pub count: u64,
    /// False once an element of this name had a structural child
    pub leaf: bool,
    /// Statistics over the text (elements) or values (attributes)
    pub text: TextStats,
}

impl Default for NameStats {
    fn default() -> Self {
        Self {
            count: 0,
            leaf: true,
            text: TextStats::default(),
        }
    }
}

/// Name interning dictionary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "NamesRepr", into = "NamesRepr")]
pub struct Names {
    /// Entries indexed by id: (offset in data, length)
    entries: Vec<(u32, u32)>,
    /// Name bytes
    data: Vec<u8>,
    /// Statistics indexed by id
    stats: Vec<NameStats>,
    /// Hash of name content -> ids with that hash
    hash_index: HashMap<u64, Vec<u16>>,
}

impl Default for Names {
    fn default() -> Self {
        Self::new()
    }
}

impl Names {
    /// Create a new dictionary holding only the reserved entry
    pub fn new() -> Self {
        let mut names = Names {
            entries: Vec::with_capacity(64),
            data: Vec::with_capacity(1024),
            stats: Vec::with_capacity(64),
            hash_index: HashMap::new(),
        };
        names.entries.push((0, 0));
        names.stats.push(NameStats::default());
        names
    }

    #[inline]
    fn compute_hash(s: &[u8]) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Look up a name without interning it
    pub fn id(&self, name: &[u8]) -> Option<u16> {
        let ids = self.hash_index.get(&Self::compute_hash(name))?;
        ids.iter().copied().find(|&id| self.name(id) == Some(name))
    }

    /// Intern a name and count one occurrence
    ///
    /// The caller checks `len()` against its capacity limit afterwards; ids
    /// handed out stay below `u16::MAX` as long as that limit is enforced.
    pub fn index(&mut self, name: &[u8]) -> u16 {
        let id = match self.id(name) {
            Some(id) => id,
            None => {
                let id = self.entries.len() as u16;
                let offset = self.data.len() as u32;
                self.data.extend_from_slice(name);
                self.entries.push((offset, name.len() as u32));
                self.stats.push(NameStats::default());
                self.hash_index
                    .entry(Self::compute_hash(name))
                    .or_default()
                    .push(id);
                id
            }
        };
        self.stats[id as usize].count += 1;
        id
    }

    /// Fold a value into the statistics of a name
    pub fn add_value(&mut self, id: u16, value: &[u8], max_categories: usize) {
        if let Some(stats) = self.stats.get_mut(id as usize) {
            stats.text.add(value, max_categories);
        }
    }

    /// Mark a name as having structural children
    pub fn set_non_leaf(&mut self, id: u16) {
        if let Some(stats) = self.stats.get_mut(id as usize) {
            stats.leaf = false;
        }
    }

    /// Get the bytes of a name
    pub fn name(&self, id: u16) -> Option<&[u8]> {
        if id == 0 {
            return None;
        }
        let (offset, len) = *self.entries.get(id as usize)?;
        self.data.get(offset as usize..(offset + len) as usize)
    }

    /// Get a name as UTF-8
    pub fn name_str(&self, id: u16) -> Option<&str> {
        self.name(id).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get the statistics of a name
    pub fn stats(&self, id: u16) -> Option<&NameStats> {
        if id == 0 {
            return None;
        }
        self.stats.get(id as usize)
    }

    /// Number of entries including the reserved one
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no name was interned
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate over `(id, name)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        (1..self.entries.len()).filter_map(move |i| {
            let id = i as u16;
            self.name(id).map(|n| (id, n))
        })
    }
}

/// Serialized form: names and stats in id order, without the hash index
#[derive(Serialize, Deserialize)]
struct NamesRepr {
    names: Vec<Vec<u8>>,
    stats: Vec<NameStats>,
}

impl From<Names> for NamesRepr {
    fn from(names: Names) -> Self {
        NamesRepr {
            names: names.iter().map(|(_, n)| n.to_vec()).collect(),
            stats: names.stats.into_iter().skip(1).collect(),
        }
    }
}

impl From<NamesRepr> for Names {
    fn from(repr: NamesRepr) -> Self {
        let mut names = Names::new();
        for (name, stats) in repr.names.iter().zip(repr.stats) {
            let id = names.index(name);
            names.stats[id as usize] = stats;
        }
        names
    }
}
