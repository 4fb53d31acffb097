use ordered_float::OrderedFloat;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::mem;

use super::topology::{SegmentRef, TrainId};
use super::{content_lines, regex, ParseError};
use crate::railway::ScanError;
use crate::store::{self, StateStore};

/// Raw position reports keyed by train. A report is an object with optional
/// `current_track` and `current_segment` string fields.
pub type Snapshot = BTreeMap<TrainId, Value>;

pub trait TrainPositionFeed {
    fn read_all(&mut self) -> Result<Snapshot, ScanError>;
}

/// Extracts the reported position of a train. `Ok(None)` means the report is
/// incomplete (missing, null or empty fields).
pub fn position_of(train: &str, report: &Value) -> Result<Option<SegmentRef>, ScanError> {
    let fields = report.as_object().ok_or_else(|| ScanError::MalformedReport {
        train: train.to_string(),
        reason: format!("expected an object, got {}", report),
    })?;
    let field = |name: &str| match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ScanError::MalformedReport {
            train: train.to_string(),
            reason: format!("{} is not a string: {}", name, other),
        }),
    };
    match (field("current_track")?, field("current_segment")?) {
        (Some(track), Some(segment)) => Ok(Some(SegmentRef::new(track, segment))),
        _ => Ok(None),
    }
}

pub fn report(position: Option<&SegmentRef>) -> Value {
    match position {
        Some(p) => json!({ "current_track": p.track, "current_segment": p.segment }),
        None => json!({}),
    }
}

/// Feed backed by the `trains` collection of a state store.
pub struct StoreFeed<S> {
    store: S,
}

impl<S: StateStore> StoreFeed<S> {
    pub fn new(store: S) -> Self {
        StoreFeed { store }
    }
}

impl<S: StateStore> TrainPositionFeed for StoreFeed<S> {
    fn read_all(&mut self) -> Result<Snapshot, ScanError> {
        Ok(self.store.read_collection(store::TRAINS)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedAction {
    /// A train reports a position, or an incomplete report.
    Report(TrainId, Option<SegmentRef>),
    /// The train disappears from the feed.
    Remove(TrainId),
}

// Tolerance when comparing script times against the accumulated feed clock.
const TIME_EPSILON: f64 = 1e-9;

/// Replays timed position reports. Every `read_all` applies the actions due
/// at the feed clock and then advances the clock by `step` seconds.
#[derive(Debug, Clone)]
pub struct ScriptedFeed {
    script: BTreeMap<OrderedFloat<f64>, Vec<FeedAction>>,
    time: f64,
    step: f64,
    trains: Snapshot,
}

impl ScriptedFeed {
    pub fn new(actions: Vec<(f64, FeedAction)>, step: f64) -> ScriptedFeed {
        let mut script: BTreeMap<OrderedFloat<f64>, Vec<FeedAction>> = BTreeMap::new();
        for (t, action) in actions {
            script.entry(OrderedFloat::from(t)).or_insert_with(Vec::new).push(action);
        }
        ScriptedFeed { script, time: 0.0, step, trains: BTreeMap::new() }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// True when every scripted action has been delivered.
    pub fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

impl TrainPositionFeed for ScriptedFeed {
    fn read_all(&mut self) -> Result<Snapshot, ScanError> {
        let later = self.script.split_off(&OrderedFloat::from(self.time + TIME_EPSILON));
        let due = mem::replace(&mut self.script, later);
        for action in due.into_iter().flat_map(|(_t, actions)| actions) {
            match action {
                FeedAction::Report(train, position) => {
                    self.trains.insert(train, report(position.as_ref()));
                }
                FeedAction::Remove(train) => {
                    self.trains.remove(&train);
                }
            }
        }
        self.time += self.step;
        Ok(self.trains.clone())
    }
}

/// Parses the feed script format:
///
/// * at 0.0 train 101 T2 S1
/// * at 0.9 train 101 -
/// * at 1.5 remove 101
///
pub fn parse_feed_script(input: &str) -> Result<Vec<(f64, FeedAction)>, ParseError> {
    let report_re = regex(r"(?x) ^ at \s+ (?P<time>[\d\.]+) \s+ train \s+ (?P<train>[\w\-\.]+) \s+
            (?P<track>[\w\-\.]+) \s+ (?P<segment>[\w\-\.]+) $")?;
    let incomplete_re = regex(r"^at\s+(?P<time>[\d\.]+)\s+train\s+(?P<train>[\w\-\.]+)\s+-$")?;
    let remove_re = regex(r"^at\s+(?P<time>[\d\.]+)\s+remove\s+(?P<train>[\w\-\.]+)$")?;

    let mut actions = Vec::new();
    for (lineno, line) in content_lines(input) {
        let time = |t: &str| t.parse::<f64>()
            .map_err(|_e| ParseError::NumberError(lineno, t.to_string()));
        if let Some(groups) = incomplete_re.captures(line) {
            actions.push((time(&groups["time"])?,
                          FeedAction::Report(groups["train"].to_string(), None)));
            continue;
        }
        if let Some(groups) = report_re.captures(line) {
            let position = SegmentRef::new(&groups["track"], &groups["segment"]);
            actions.push((time(&groups["time"])?,
                          FeedAction::Report(groups["train"].to_string(), Some(position))));
            continue;
        }
        if let Some(groups) = remove_re.captures(line) {
            actions.push((time(&groups["time"])?,
                          FeedAction::Remove(groups["train"].to_string())));
            continue;
        }
        return Err(ParseError::Unrecognized(lineno, line.to_string()));
    }
    Ok(actions)
}
