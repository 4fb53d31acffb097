//! Reconciling reported train positions with segment occupancy.
//!
//! Occupancy of a segment is the OR over all trains claiming it. A train
//! claims its latest complete report; trains that send no (or an incomplete)
//! report this cycle keep claiming their last known segment. All claims of a
//! cycle are written before any release, and a vacated segment is only freed
//! when no train claims it any more.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::registry::SegmentRegistry;
use super::ScanError;
use crate::input::feed::{position_of, Snapshot};
use crate::input::topology::{SegmentRef, TrainId};
use crate::output::history::ScanLogEvent;
use crate::store::StateStore;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub claimed: Vec<SegmentRef>,
    pub released: Vec<SegmentRef>,
    pub skipped: Vec<TrainId>,
}

#[derive(Debug, Default)]
pub struct OccupancyTracker {
    previous: BTreeMap<TrainId, SegmentRef>,
    // Segments written as occupied by a pass that failed afterwards. They are
    // release candidates until a pass succeeds.
    pending: BTreeMap<TrainId, BTreeSet<SegmentRef>>,
}

impl OccupancyTracker {
    pub fn new() -> OccupancyTracker {
        Default::default()
    }

    /// Last known position of every train seen so far.
    pub fn positions(&self) -> &BTreeMap<TrainId, SegmentRef> {
        &self.previous
    }

    /// Applies one snapshot of the position feed.
    ///
    /// Malformed reports and reports naming unknown segments skip that train
    /// only. A store failure aborts the pass; positions are then left as they
    /// were, and the segments claimed before the failure are remembered, so
    /// that the next pass re-applies every claim and release.
    pub fn reconcile<S: StateStore>(&mut self, snapshot: &Snapshot, registry: &SegmentRegistry<S>)
        -> Result<ReconcileReport, ScanError> {
        let mut report = ReconcileReport::default();
        let mut positions = self.previous.clone();
        let mut moves: Vec<(TrainId, SegmentRef)> = Vec::new();

        for (train, raw) in snapshot {
            let position = match position_of(train, raw) {
                Ok(Some(position)) => position,
                Ok(None) => {
                    debug!("Train {} sent an incomplete report.", train);
                    continue;
                }
                Err(e @ ScanError::MalformedReport { .. }) => {
                    warn!("Skipping train {}: {}", train, e);
                    registry.log(ScanLogEvent::ReportSkipped(train.clone(), e.to_string()));
                    report.skipped.push(train.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            match registry.resolve(&position.track, &position.segment) {
                Ok(()) => {},
                Err(e @ ScanError::NotFound(_)) => {
                    warn!("Skipping train {}: {}", train, e);
                    registry.log(ScanLogEvent::ReportSkipped(train.clone(), e.to_string()));
                    report.skipped.push(train.clone());
                    continue;
                }
                Err(e) => return Err(e),
            }
            positions.insert(train.clone(), position.clone());
            moves.push((train.clone(), position));
        }

        let mut written = Vec::new();
        match self.apply(&moves, &positions, registry, &mut written, &mut report) {
            Ok(()) => {
                self.previous = positions;
                self.pending.clear();
                Ok(report)
            }
            Err(e) => {
                for (train, position) in written {
                    self.pending.entry(train).or_insert_with(BTreeSet::new).insert(position);
                }
                Err(e)
            }
        }
    }

    fn apply<S: StateStore>(&self,
                            moves: &[(TrainId, SegmentRef)],
                            positions: &BTreeMap<TrainId, SegmentRef>,
                            registry: &SegmentRegistry<S>,
                            written: &mut Vec<(TrainId, SegmentRef)>,
                            report: &mut ReconcileReport) -> Result<(), ScanError> {
        for (train, position) in moves {
            registry.set_occupied(&position.track, &position.segment, true)?;
            written.push((train.clone(), position.clone()));
            report.claimed.push(position.clone());
        }

        let mut candidates: Vec<(&TrainId, &SegmentRef)> = Vec::new();
        for (train, position) in moves {
            match self.previous.get(train) {
                Some(prev) if prev != position => candidates.push((train, prev)),
                _ => {},
            }
        }
        for (train, segments) in &self.pending {
            candidates.extend(segments.iter().map(|s| (train, s)));
        }

        let claimed: HashSet<&SegmentRef> = positions.values().collect();
        for (train, prev) in candidates {
            if claimed.contains(prev) {
                debug!("Train {} left {}, still claimed by a train.", train, prev);
                continue;
            }
            if report.released.contains(prev) {
                continue;
            }
            registry.set_occupied(&prev.track, &prev.segment, false)?;
            report.released.push(prev.clone());
        }
        Ok(())
    }
}
