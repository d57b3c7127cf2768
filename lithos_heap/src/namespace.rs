//! Dictionary-mode namespaces and the symbol registry.
//!
//! The global object and the builtins object keep their properties in a
//! [`Namespace`]: an insertion-ordered entry list with a name index.
//! Deleting marks an entry instead of removing it, so scans see the same
//! slots a dictionary walk would.

use rustc_hash::FxHashMap;

use crate::shape::PropertyAttributes;
use crate::value::{ObjectId, Value};

// =============================================================================
// Namespace
// =============================================================================

/// Key of a namespace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKey {
    String(String),
    Symbol(ObjectId),
}

impl PropertyKey {
    /// String key text.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }
}

/// One dictionary slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceEntry {
    pub key: PropertyKey,
    pub value: Value,
    pub attributes: PropertyAttributes,
    pub deleted: bool,
}

/// Dictionary of named properties.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Vec<NamespaceEntry>,
    by_name: FxHashMap<String, usize>,
}

impl Namespace {
    /// Empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or overwrite a string-keyed property.
    pub fn define(&mut self, name: &str, value: Value, attributes: PropertyAttributes) {
        if let Some(&index) = self.by_name.get(name) {
            let entry = &mut self.entries[index];
            entry.value = value;
            entry.attributes = attributes;
            entry.deleted = false;
            return;
        }
        self.by_name.insert(name.to_string(), self.entries.len());
        self.entries.push(NamespaceEntry {
            key: PropertyKey::String(name.to_string()),
            value,
            attributes,
            deleted: false,
        });
    }

    /// Define a symbol-keyed property. Symbol keys are never indexed by name.
    pub fn define_symbol(&mut self, symbol: ObjectId, value: Value, attributes: PropertyAttributes) {
        self.entries.push(NamespaceEntry {
            key: PropertyKey::Symbol(symbol),
            value,
            attributes,
            deleted: false,
        });
    }

    /// Live value of a string-keyed property.
    pub fn get(&self, name: &str) -> Option<Value> {
        let &index = self.by_name.get(name)?;
        let entry = &self.entries[index];
        (!entry.deleted).then_some(entry.value)
    }

    /// Mark a property deleted. Returns whether it was live.
    pub fn delete(&mut self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&index) if !self.entries[index].deleted => {
                self.entries[index].deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Every slot, deleted ones included, in insertion order.
    #[inline]
    pub fn entries(&self) -> &[NamespaceEntry] {
        &self.entries
    }

    /// Live entries.
    pub fn live_entries(&self) -> impl Iterator<Item = &NamespaceEntry> {
        self.entries.iter().filter(|e| !e.deleted)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live_entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Symbol Registry
// =============================================================================

/// One registry table: symbols registered under a common registry key.
#[derive(Debug, Clone, Default)]
struct RegistryTable {
    key: String,
    symbols: Vec<(String, ObjectId)>,
}

/// Process-wide symbol registry (`Symbol.for` and friends).
///
/// Symbols are grouped by registry key and then by name. The pair is what a
/// non-well-known symbol is identified by across processes.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    tables: Vec<RegistryTable>,
}

impl SymbolRegistry {
    /// Registry key used by `Symbol.for`.
    pub const FOR_KEY: &'static str = "for";
    /// Registry key used by embedder private symbols.
    pub const PRIVATE_API_KEY: &'static str = "private_api";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol` under `(key, name)`, replacing any previous entry.
    pub fn register(&mut self, key: &str, name: &str, symbol: ObjectId) {
        let table = match self.tables.iter().position(|t| t.key == key) {
            Some(index) => &mut self.tables[index],
            None => {
                self.tables.push(RegistryTable {
                    key: key.to_string(),
                    symbols: Vec::new(),
                });
                let last = self.tables.len() - 1;
                &mut self.tables[last]
            }
        };
        match table.symbols.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = symbol,
            None => table.symbols.push((name.to_string(), symbol)),
        }
    }

    /// Symbol registered under `(key, name)`.
    pub fn lookup(&self, key: &str, name: &str) -> Option<ObjectId> {
        self.tables
            .iter()
            .find(|t| t.key == key)?
            .symbols
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, symbol)| symbol)
    }

    /// Registry key and name of `symbol`.
    ///
    /// A straight walk over existing tables; it borrows and never allocates.
    pub fn find(&self, symbol: ObjectId) -> Option<(&str, &str)> {
        self.tables.iter().find_map(|table| {
            table
                .symbols
                .iter()
                .find(|&&(_, s)| s == symbol)
                .map(|(name, _)| (table.key.as_str(), name.as_str()))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
