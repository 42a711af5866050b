// comanda-core/src/document.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::value_utils::as_id;

/// Bookkeeping collection: `{collection, last}` per collection that has
/// had ids allocated.
pub const ID_SEQUENCES: &str = "_ids";

/// One entry of a collection. Schemaless apart from the integer `id` field.
pub type Record = Map<String, Value>;

/// The whole persisted state: collection name -> ordered records.
///
/// This is the unit of atomicity. Stores read and write it as a whole, and
/// every read hands out a freshly parsed value, so no two callers ever share
/// a `Document`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    collections: BTreeMap<String, Vec<Record>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from JSON text.
    ///
    /// Fails when the root is not an object, a collection is not an array, or
    /// a record is not an object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.collections
                .iter()
                .map(|(name, records)| {
                    let items = records.iter().cloned().map(Value::Object).collect();
                    (name.clone(), Value::Array(items))
                })
                .collect(),
        )
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Records of a collection. A missing collection reads as empty.
    pub fn collection(&self, name: &str) -> &[Record] {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mutable access, creating the collection lazily.
    pub fn collection_mut(&mut self, name: &str) -> &mut Vec<Record> {
        self.collections.entry(name.to_string()).or_default()
    }

    pub fn set_collection(&mut self, name: &str, records: Vec<Record>) {
        self.collections.insert(name.to_string(), records);
    }

    pub fn remove_collection(&mut self, name: &str) -> Option<Vec<Record>> {
        self.collections.remove(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.collections
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of records across every collection
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Find a record by id
    pub fn find_record(&self, collection: &str, id: i64) -> Option<&Record> {
        self.collection(collection)
            .iter()
            .find(|r| record_id(r) == Some(id))
    }

    /// Next id for a collection: `max(existing ids) + 1`, starting at 1.
    ///
    /// Ids handed out by [`allocate_id`](Self::allocate_id) or seen by
    /// [`carry_sequences`](Self::carry_sequences) are remembered in the `_ids`
    /// collection, so deleting the newest record does not free its id. This
    /// is the single id strategy used for every collection.
    pub fn next_id(&self, collection: &str) -> i64 {
        self.max_id(collection).max(self.last_issued(collection)) + 1
    }

    /// Take the next id for `collection` and record it as issued.
    pub fn allocate_id(&mut self, collection: &str) -> i64 {
        let id = self.next_id(collection);
        let sequences = self.collection_mut(ID_SEQUENCES);
        match sequences.iter_mut().find(|s| sequence_name(s) == Some(collection)) {
            Some(entry) => {
                entry.insert("last".to_string(), Value::from(id));
            }
            None => sequences.push(sequence_entry(collection, id)),
        }
        id
    }

    /// Rebuild `_ids` before this document replaces `persisted`.
    ///
    /// Each collection's `last` becomes the highest of the persisted value,
    /// the submitted value and every id now stored in it. A submitted `_ids`
    /// can raise a mark but never lower one.
    pub fn carry_sequences(&mut self, persisted: &Document) {
        let mut names: Vec<String> = Vec::new();
        let known = persisted
            .collection(ID_SEQUENCES)
            .iter()
            .chain(self.collection(ID_SEQUENCES))
            .filter_map(sequence_name)
            .chain(self.collection_names());
        for name in known {
            if name != ID_SEQUENCES && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        let sequences: Vec<Record> = names
            .iter()
            .filter_map(|name| {
                let last = persisted
                    .last_issued(name)
                    .max(self.last_issued(name))
                    .max(self.max_id(name));
                (last > 0).then(|| sequence_entry(name, last))
            })
            .collect();

        if sequences.is_empty() {
            self.remove_collection(ID_SEQUENCES);
        } else {
            self.set_collection(ID_SEQUENCES, sequences);
        }
    }

    /// Last id recorded as issued for `collection`, 0 when none
    pub fn last_issued(&self, collection: &str) -> i64 {
        self.collection(ID_SEQUENCES)
            .iter()
            .find(|s| sequence_name(s) == Some(collection))
            .and_then(|s| s.get("last"))
            .and_then(as_id)
            .unwrap_or(0)
    }

    fn max_id(&self, collection: &str) -> i64 {
        self.collection(collection)
            .iter()
            .filter_map(record_id)
            .max()
            .unwrap_or(0)
    }
}

fn sequence_entry(collection: &str, last: i64) -> Record {
    let mut entry = Map::new();
    entry.insert("collection".to_string(), Value::from(collection));
    entry.insert("last".to_string(), Value::from(last));
    entry
}

fn sequence_name(entry: &Record) -> Option<&str> {
    entry.get("collection").and_then(Value::as_str)
}

/// Integer id of a record, if it carries one
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(as_id)
}

impl FromIterator<(String, Vec<Record>)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Record>)>>(iter: I) -> Self {
        Document {
            collections: iter.into_iter().collect(),
        }
    }
}
