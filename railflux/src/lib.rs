extern crate smallvec;
extern crate ordered_float;
extern crate regex;
extern crate serde_json;
extern crate failure;
#[macro_use] extern crate failure_derive;
#[macro_use] extern crate log;

pub mod store;
pub mod input;
pub mod output;
pub mod railway;
pub mod scan;
pub mod presentation;


use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use input::feed::{self, FeedAction, TrainPositionFeed};
use input::signals::{self, SignalRuleSet};
use input::topology::{self, SegmentRef, Topology};
use output::history::{History, ScanLogEvent};
use presentation::Panel;
use railway::registry::SegmentRegistry;
use railway::signal::SignalEvaluator;
use scan::{ScanConfig, ScanLoop};
use store::MemoryStore;

pub type AppResult<T> = Result<T, failure::Error>;

/// Runs the scan loop against an in-memory store until `stop` is set or the
/// configured cycle limit is reached.
///
/// Segment flags without a value in `store` start out free, every signal is
/// published red, and the manual `overrides` are applied through a
/// presentation panel before the first cycle.
pub fn simulate<F: TrainPositionFeed>(store: MemoryStore,
                                      topology: &Topology,
                                      rules: &SignalRuleSet,
                                      feed: F,
                                      overrides: &[(SegmentRef, bool)],
                                      config: ScanConfig,
                                      stop: &AtomicBool) -> AppResult<History> {
    for (signal, seg) in rules.unresolved(topology) {
        warn!("Signal {} monitors unknown segment {}.", signal, seg);
    }

    let events = Rc::new(RefCell::new(Vec::new()));
    let registry = {
        let log = events.clone();
        SegmentRegistry::new(topology.clone(), store.clone())
            .with_logger(Box::new(move |e: ScanLogEvent| log.borrow_mut().push(e)))
    };
    registry.initialize()?;
    let evaluator = SignalEvaluator::new(rules.clone());
    evaluator.publish_initial(&registry)?;

    let panel = {
        let log = events.clone();
        Panel::new(topology.clone(), rules, store.clone())
            .with_logger(Box::new(move |e: ScanLogEvent| log.borrow_mut().push(e)))
    };
    for &(ref seg, occupied) in overrides {
        panel.request_occupied(&seg.track, &seg.segment, occupied)?;
    }

    let mut scan = ScanLoop::new(registry, evaluator, feed, config);
    scan.run(stop);

    let h = History {
        events: events.replace(Vec::new()),
        cycles: scan.cycles(),
        failed_cycles: scan.failures(),
        state: store.snapshot(),
    };
    Ok(h)
}

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn get_topology(f: &Path) -> AppResult<Topology> {
    let contents = read_file(f)?;
    Ok(topology::parse_topology(&contents)?)
}

pub fn get_signals(f: &Path) -> AppResult<SignalRuleSet> {
    let contents = read_file(f)?;
    Ok(signals::parse_signals(&contents)?)
}

/// Initial store document, e.g. tracks and flags left by an earlier run.
pub fn get_seed(f: &Path) -> AppResult<MemoryStore> {
    let contents = read_file(f)?;
    Ok(MemoryStore::from_value(serde_json::from_str(&contents)?))
}

/// Seconds the feed script clock advances per cycle. Defaults to the scan
/// interval and must be positive, or the script never gets past its start.
pub fn feed_step(interval: Duration, step: Option<f64>) -> AppResult<f64> {
    let step = step.unwrap_or_else(|| interval.as_secs_f64());
    if !(step > 0.0) {
        return Err(failure::err_msg(format!(
            "feed step must be positive (got {}s); set --step when the interval is 0", step)));
    }
    Ok(step)
}

pub fn get_feed_script(f: &Path) -> AppResult<Vec<(f64, FeedAction)>> {
    let contents = read_file(f)?;
    Ok(feed::parse_feed_script(&contents)?)
}
