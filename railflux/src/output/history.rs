use serde_json::Value;
use std::fmt::Write;

use crate::input::signals::{Aspect, SignalRuleSet};
use crate::input::topology::{SegmentRef, SignalId, Topology, TrainId};
use crate::store;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanLogEvent {
    Cycle(usize),
    Occupied(SegmentRef, bool),
    Aspect(SignalId, Aspect, i64),
    ReportSkipped(TrainId, String),
    SignalSkipped(SignalId, String),
    CycleFailed(usize, String),
}

/// Events of one run plus the final store document.
#[derive(Debug)]
pub struct History {
    pub events: Vec<ScanLogEvent>,
    pub cycles: usize,
    pub failed_cycles: usize,
    pub state: Value,
}

impl Default for History {
    fn default() -> History {
        History { events: vec![], cycles: 0, failed_cycles: 0, state: Value::Null }
    }
}

impl History {
    pub fn occupied(&self, track: &str, segment: &str) -> Option<bool> {
        let pointer = format!("/{}", store::occupied_path(track, segment));
        self.state.pointer(&pointer).and_then(Value::as_bool)
    }

    pub fn status(&self, signal: &str) -> Option<i64> {
        let pointer = format!("/{}", store::status_path(signal));
        self.state.pointer(&pointer).and_then(Value::as_i64)
    }
}

/// Final occupancy and signal status, one entry per line:
/// `track segment occupied|free` and `signal id status aspect`.
pub fn state_listing(topology: &Topology, rules: &SignalRuleSet, h: &History)
    -> Result<String, failure::Error> {
    let mut s = String::new();
    for seg in topology.segments() {
        let state = match h.occupied(&seg.track, &seg.segment) {
            Some(true) => "occupied",
            Some(false) => "free",
            None => "unknown",
        };
        writeln!(s, "{} {} {}", seg.track, seg.segment, state)?;
    }
    for def in rules.definitions() {
        match h.status(&def.id) {
            Some(code) => {
                let aspect = def.codes.aspect(code)
                    .map(|a| format!("{:?}", a).to_lowercase())
                    .unwrap_or_else(|| "?".to_string());
                writeln!(s, "signal {} {} {}", def.id, code, aspect)?;
            }
            None => writeln!(s, "signal {} - unknown", def.id)?,
        }
    }
    Ok(s)
}
