//! Fixed-cadence scan loop.
//!
//! One cycle reads the position feed, reconciles occupancy and then evaluates
//! every signal, always in that order and always to completion before the
//! next cycle starts. A failed cycle is logged and the loop carries on with
//! the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::input::feed::TrainPositionFeed;
use crate::output::history::ScanLogEvent;
use crate::railway::occupancy::{OccupancyTracker, ReconcileReport};
use crate::railway::registry::SegmentRegistry;
use crate::railway::signal::{EvaluationReport, SignalEvaluator};
use crate::railway::ScanError;
use crate::store::StateStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub interval: Duration,
    /// Stop after this many cycles. `None` runs until stopped.
    pub cycles: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> ScanConfig {
        ScanConfig { interval: Duration::from_millis(300), cycles: None }
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed { occupancy: ReconcileReport, signals: EvaluationReport },
    Failed(ScanError),
}

pub struct ScanLoop<S, F> {
    registry: SegmentRegistry<S>,
    tracker: OccupancyTracker,
    evaluator: SignalEvaluator,
    feed: F,
    config: ScanConfig,
    state: ScanState,
    cycles: usize,
    failures: usize,
    last: Option<CycleOutcome>,
}

impl<S: StateStore, F: TrainPositionFeed> ScanLoop<S, F> {
    pub fn new(registry: SegmentRegistry<S>, evaluator: SignalEvaluator, feed: F, config: ScanConfig)
        -> ScanLoop<S, F> {
        ScanLoop {
            registry,
            tracker: OccupancyTracker::new(),
            evaluator,
            feed,
            config,
            state: ScanState::Idle,
            cycles: 0,
            failures: 0,
            last: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn registry(&self) -> &SegmentRegistry<S> {
        &self.registry
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn last_outcome(&self) -> Option<&CycleOutcome> {
        self.last.as_ref()
    }

    fn scan(&mut self) -> Result<(ReconcileReport, EvaluationReport), ScanError> {
        let snapshot = self.feed.read_all()?;
        let occupancy = self.tracker.reconcile(&snapshot, &self.registry)?;
        let signals = self.evaluator.evaluate_all(&self.registry)?;
        Ok((occupancy, signals))
    }

    /// Runs one full cycle. Errors end the cycle, never the loop.
    pub fn tick(&mut self) -> &CycleOutcome {
        let cycle = self.cycles;
        self.state = ScanState::Scanning;
        self.registry.log(ScanLogEvent::Cycle(cycle));
        let outcome = match self.scan() {
            Ok((occupancy, signals)) => {
                debug!("Cycle {}: {} claimed, {} released, {} signals.",
                       cycle, occupancy.claimed.len(), occupancy.released.len(), signals.aspects.len());
                CycleOutcome::Completed { occupancy, signals }
            }
            Err(e) => {
                error!("Cycle {} failed: {}", cycle, e);
                self.registry.log(ScanLogEvent::CycleFailed(cycle, e.to_string()));
                self.failures += 1;
                CycleOutcome::Failed(e)
            }
        };
        self.cycles += 1;
        self.state = ScanState::Idle;
        &*self.last.insert(outcome)
    }

    /// Ticks at the configured interval until `stop` is set or the cycle
    /// limit is reached. A cycle that overruns the interval delays the next
    /// tick rather than overlapping it. Returns the number of cycles run.
    pub fn run(&mut self, stop: &AtomicBool) -> usize {
        info!("Scanning every {:?}.", self.config.interval);
        let mut next_tick = Instant::now();
        loop {
            if stop.load(Ordering::SeqCst) {
                info!("Scan loop stopped.");
                break;
            }
            if let Some(limit) = self.config.cycles {
                if self.cycles >= limit {
                    break;
                }
            }

            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            }

            let started = Instant::now();
            self.tick();
            let elapsed = started.elapsed();
            if elapsed > self.config.interval {
                warn!("Cycle took {:?}, longer than the {:?} interval.", elapsed, self.config.interval);
                next_tick = Instant::now();
            } else {
                next_tick = started + self.config.interval;
            }
        }
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::feed::Snapshot;
    use crate::input::signals::parse_signals;
    use crate::input::topology::parse_topology;
    use crate::store::MemoryStore;

    // Records when each cycle reads the feed; the first read is slow.
    struct SlowFeed {
        first: Duration,
        reads: Vec<Instant>,
    }

    impl TrainPositionFeed for SlowFeed {
        fn read_all(&mut self) -> Result<Snapshot, ScanError> {
            self.reads.push(Instant::now());
            if self.reads.len() == 1 {
                thread::sleep(self.first);
            }
            Ok(Snapshot::new())
        }
    }

    #[test]
    fn overrun_delays_the_next_tick_without_catching_up() {
        let topology = parse_topology("track T2 S1 S2").unwrap();
        let rules = parse_signals("signal 1 track T2 any S1").unwrap();
        let registry = SegmentRegistry::new(topology, MemoryStore::new());
        let interval = Duration::from_millis(20);
        let feed = SlowFeed { first: Duration::from_millis(70), reads: Vec::new() };
        let config = ScanConfig { interval, cycles: Some(4) };
        let mut scan = ScanLoop::new(registry, SignalEvaluator::new(rules), feed, config);

        assert_eq!(scan.run(&AtomicBool::new(false)), 4);
        assert_eq!(scan.failures(), 0);
        let reads = &scan.feed().reads;
        assert_eq!(reads.len(), 4);

        // Cycles never overlap: the second starts after the slow first one.
        assert!(reads[1] - reads[0] >= Duration::from_millis(70));
        // The ticks after the overrun keep the full interval between them
        // instead of firing back to back to make up for the missed ones.
        let slack = Duration::from_millis(2);
        for w in reads[1..].windows(2) {
            assert!(w[1] - w[0] + slack >= interval, "ticks {:?} apart", w[1] - w[0]);
        }
    }

    #[test]
    fn tick_counts_cycles_and_returns_to_idle() {
        let topology = parse_topology("track T2 S1 S2").unwrap();
        let rules = parse_signals("signal 1 track T2 any S9").unwrap();
        let store = MemoryStore::new();
        let registry = SegmentRegistry::new(topology, store.clone());
        let feed = crate::input::feed::StoreFeed::new(store);
        let mut scan = ScanLoop::new(registry, SignalEvaluator::new(rules), feed, ScanConfig::default());
        assert_eq!(scan.state(), ScanState::Idle);
        match *scan.tick() {
            CycleOutcome::Completed { ref signals, .. } => assert_eq!(signals.skipped, vec!["1".to_string()]),
            ref x => panic!("unexpected {:?}", x),
        }
        assert_eq!(scan.cycles(), 1);
        assert_eq!(scan.state(), ScanState::Idle);
        assert!(scan.last_outcome().is_some());
    }
}
