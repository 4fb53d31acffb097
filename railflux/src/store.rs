//! Hierarchical state store.
//!
//! The shared state of a railflux installation lives in a document tree
//! addressed by slash-separated paths, e.g. `tracks/T2/segments/S1/occupied`
//! or `signals/1/status`. The core only talks to it through `StateStore`;
//! `MemoryStore` is the in-process implementation used by the CLI and tests.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const TRACKS: &str = "tracks";
pub const TRAINS: &str = "trains";
pub const SIGNALS: &str = "signals";

pub fn occupied_path(track: &str, segment: &str) -> String {
    format!("{}/{}/segments/{}/occupied", TRACKS, track, segment)
}

pub fn segments_path(track: &str) -> String {
    format!("{}/{}/segments", TRACKS, track)
}

pub fn signal_path(signal: &str) -> String {
    format!("{}/{}", SIGNALS, signal)
}

pub fn status_path(signal: &str) -> String {
    format!("{}/{}/status", SIGNALS, signal)
}

#[derive(Debug, Clone, PartialEq, Fail)]
pub enum StoreError {
    #[fail(display = "store unreachable: {}", _0)]
    Unreachable(String),
    #[fail(display = "invalid path \"{}\"", _0)]
    InvalidPath(String),
    #[fail(display = "value at \"{}\" is not a collection", _0)]
    NotACollection(String),
    #[fail(display = "unexpected value at \"{}\": {}", _0, _1)]
    Corrupt(String, String),
}

/// Read/write access to the shared state document.
///
/// Implementations are handles: all methods take `&self`, and a write must be
/// visible to the next read through any handle to the same store.
pub trait StateStore {
    /// Value at `path`, or `None` if nothing is stored there.
    fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Store `value` at `path`, creating intermediate levels as needed.
    /// Writing `Value::Null` removes the entry.
    fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Children of the collection at `path`. An absent path is an empty
    /// collection.
    fn read_collection(&self, path: &str) -> Result<BTreeMap<String, Value>, StoreError>;
}

fn split(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let keys: Vec<&str> = trimmed.split('/').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(keys)
}

// Scalars on the way down a write are replaced by collections.
fn collection(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// In-process document store. Cloning yields another handle to the same
/// document.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    root: Rc<RefCell<Value>>,
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore { root: Rc::new(RefCell::new(Value::Object(Map::new()))) }
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        Default::default()
    }

    pub fn from_value(value: Value) -> MemoryStore {
        MemoryStore { root: Rc::new(RefCell::new(value)) }
    }

    /// Copy of the whole document.
    pub fn snapshot(&self) -> Value {
        self.root.borrow().clone()
    }
}

impl StateStore for MemoryStore {
    fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let keys = split(path)?;
        let root = self.root.borrow();
        let mut node = &*root;
        for key in keys {
            match node.get(key) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        if node.is_null() { Ok(None) } else { Ok(Some(node.clone())) }
    }

    fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let keys = split(path)?;
        let mut root = self.root.borrow_mut();
        let (last, parents) = match keys.split_last() {
            Some(x) => x,
            None => {
                *root = value;
                return Ok(());
            }
        };

        let mut node = &mut *root;
        for key in parents {
            node = collection(node).entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = collection(node);
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert(last.to_string(), value);
        }
        Ok(())
    }

    fn read_collection(&self, path: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        match self.read(path)? {
            None => Ok(BTreeMap::new()),
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            Some(_) => Err(StoreError::NotACollection(path.to_string())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_creates_intermediate_levels() {
        let store = MemoryStore::new();
        store.write(&occupied_path("T2", "S1"), json!(true)).unwrap();
        assert_eq!(store.read("tracks/T2/segments/S1/occupied").unwrap(), Some(json!(true)));
        assert_eq!(store.read_collection("tracks/T2/segments").unwrap().len(), 1);
    }

    #[test]
    fn absent_paths() {
        let store = MemoryStore::new();
        assert_eq!(store.read("trains/101").unwrap(), None);
        assert!(store.read_collection("trains").unwrap().is_empty());
    }

    #[test]
    fn null_write_removes_entry() {
        let store = MemoryStore::new();
        store.write("trains/101/current_track", json!("T2")).unwrap();
        store.write("trains/101", Value::Null).unwrap();
        assert_eq!(store.read("trains/101").unwrap(), None);
    }

    #[test]
    fn clones_share_the_document() {
        let store = MemoryStore::new();
        let other = store.clone();
        other.write(&status_path("1"), json!(1)).unwrap();
        assert_eq!(store.read("signals/1/status").unwrap(), Some(json!(1)));
    }

    #[test]
    fn scalar_is_not_a_collection() {
        let store = MemoryStore::new();
        store.write("signals/1/status", json!(0)).unwrap();
        assert_eq!(store.read_collection("signals/1/status"),
                   Err(StoreError::NotACollection("signals/1/status".to_string())));
    }

    #[test]
    fn empty_path_component_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.write("tracks//S1", json!(true)).is_err());
    }
}
