//! Read access and manual overrides for a display or control panel.
//!
//! Overrides go through `SegmentRegistry::set_occupied`, the same path the
//! occupancy tracker uses. Writes from a panel and from the scan loop are
//! last-write-wins; nothing here locks the store.

use serde_json::Value;

use crate::input::signals::SignalRuleSet;
use crate::input::topology::{SegmentId, SignalId, Topology};
use crate::railway::registry::SegmentRegistry;
use crate::railway::{Logger, NotFound, ScanError};
use crate::store::{self, StateStore, StoreError};

pub struct Panel<S> {
    registry: SegmentRegistry<S>,
    signals: Vec<SignalId>,
}

impl<S: StateStore> Panel<S> {
    pub fn new(topology: Topology, rules: &SignalRuleSet, store: S) -> Panel<S> {
        Panel {
            registry: SegmentRegistry::new(topology, store),
            signals: rules.definitions().iter().map(|d| d.id.clone()).collect(),
        }
    }

    /// Overrides made through this panel are reported to `logger`.
    pub fn with_logger(self, logger: Logger) -> Panel<S> {
        Panel { registry: self.registry.with_logger(logger), signals: self.signals }
    }

    pub fn occupied(&self, track: &str, segment: &str) -> Result<bool, ScanError> {
        self.registry.get_occupied(track, segment)
    }

    /// Occupancy of every segment of a track, in track order.
    pub fn track_occupancy(&self, track: &str) -> Result<Vec<(SegmentId, bool)>, ScanError> {
        let mut result = Vec::new();
        for seg in self.registry.segments_of(track)? {
            result.push((seg.clone(), self.registry.get_occupied(track, seg)?));
        }
        Ok(result)
    }

    /// Current status code of a signal, `None` if it was never published.
    pub fn aspect(&self, signal: &str) -> Result<Option<i64>, ScanError> {
        if !self.signals.iter().any(|s| s == signal) {
            return Err(NotFound::Signal(signal.to_string()).into());
        }
        let path = store::status_path(signal);
        match self.registry.store().read(&path)? {
            None => Ok(None),
            Some(Value::Number(ref n)) if n.is_i64() => Ok(n.as_i64()),
            Some(other) => Err(StoreError::Corrupt(path, other.to_string()).into()),
        }
    }

    pub fn request_occupied(&self, track: &str, segment: &str, occupied: bool) -> Result<(), ScanError> {
        info!("Manual override: {}/{} occupied={}", track, segment, occupied);
        self.registry.set_occupied(track, segment, occupied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::signals::parse_signals;
    use crate::input::topology::parse_topology;
    use crate::store::MemoryStore;
    use crate::input::topology::SegmentRef;
    use crate::output::history::ScanLogEvent;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn panel(store: MemoryStore) -> Panel<MemoryStore> {
        let topology = parse_topology("track T2 S1 S2 S3 S4").unwrap();
        let rules = parse_signals("signal 1 track T2 any S1 S2 S3").unwrap();
        Panel::new(topology, &rules, store)
    }

    #[test]
    fn override_is_visible_through_the_store() {
        let store = MemoryStore::new();
        let p = panel(store.clone());
        p.request_occupied("T2", "S3", true).unwrap();
        assert_eq!(store.read("tracks/T2/segments/S3/occupied").unwrap(), Some(json!(true)));
        assert_eq!(p.track_occupancy("T2").unwrap(), vec![
            ("S1".to_string(), false), ("S2".to_string(), false),
            ("S3".to_string(), true), ("S4".to_string(), false),
        ]);
    }

    #[test]
    fn override_of_unknown_segment_fails() {
        let p = panel(MemoryStore::new());
        assert!(p.request_occupied("T2", "S9", true).is_err());
        assert!(p.request_occupied("T7", "S1", true).is_err());
    }

    #[test]
    fn aspects() {
        let store = MemoryStore::new();
        let p = panel(store.clone());
        assert_eq!(p.aspect("1").unwrap(), None);
        store.write("signals/1/status", json!(1)).unwrap();
        assert_eq!(p.aspect("1").unwrap(), Some(1));
        match p.aspect("9") {
            Err(ScanError::NotFound(NotFound::Signal(_))) => {},
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn overrides_are_logged() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let p = panel(MemoryStore::new())
            .with_logger(Box::new(move |e: ScanLogEvent| sink.borrow_mut().push(e)));
        p.request_occupied("T2", "S3", true).unwrap();
        p.request_occupied("T2", "S3", true).unwrap();
        assert_eq!(*log.borrow(), vec![ScanLogEvent::Occupied(SegmentRef::new("T2", "S3"), true)]);
    }
}
