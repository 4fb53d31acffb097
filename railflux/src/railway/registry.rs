use serde_json::Value;

use super::{Logger, NotFound, ScanError};
use crate::input::topology::{SegmentId, SegmentRef, Topology};
use crate::output::history::ScanLogEvent;
use crate::store::{self, StateStore, StoreError};

/// Segment occupancy over a fixed topology. The flags themselves live in the
/// state store; `set_occupied` is the only place they are written.
pub struct SegmentRegistry<S> {
    topology: Topology,
    store: S,
    logger: Option<Logger>,
}

impl<S: StateStore> SegmentRegistry<S> {
    pub fn new(topology: Topology, store: S) -> SegmentRegistry<S> {
        SegmentRegistry { topology, store, logger: None }
    }

    pub fn with_logger(mut self, logger: Logger) -> SegmentRegistry<S> {
        self.logger = Some(logger);
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn log(&self, event: ScanLogEvent) {
        if let Some(ref logger) = self.logger {
            logger(event);
        }
    }

    /// Checks that the segment exists in the topology.
    pub fn resolve(&self, track: &str, segment: &str) -> Result<(), ScanError> {
        let t = self.topology.track(track)
            .ok_or_else(|| NotFound::Track(track.to_string()))?;
        if !t.segments.iter().any(|s| s == segment) {
            return Err(NotFound::Segment(SegmentRef::new(track, segment)).into());
        }
        Ok(())
    }

    pub fn segments_of(&self, track: &str) -> Result<&[SegmentId], ScanError> {
        match self.topology.track(track) {
            Some(t) => Ok(&t.segments),
            None => Err(NotFound::Track(track.to_string()).into()),
        }
    }

    pub fn get_occupied(&self, track: &str, segment: &str) -> Result<bool, ScanError> {
        self.resolve(track, segment)?;
        self.read_flag(&store::occupied_path(track, segment))
    }

    pub fn set_occupied(&self, track: &str, segment: &str, occupied: bool) -> Result<(), ScanError> {
        self.resolve(track, segment)?;
        let path = store::occupied_path(track, segment);
        let before = self.read_flag(&path)?;
        self.store.write(&path, Value::Bool(occupied))?;
        if before != occupied {
            debug!("Segment {}/{} {}", track, segment, if occupied { "occupied" } else { "freed" });
            self.log(ScanLogEvent::Occupied(SegmentRef::new(track, segment), occupied));
        }
        Ok(())
    }

    /// Writes `occupied = false` for every segment that has no flag in the
    /// store yet. Existing flags are left alone. Returns the number written.
    pub fn initialize(&self) -> Result<usize, ScanError> {
        let mut written = 0;
        for seg in self.topology.segments() {
            let path = store::occupied_path(&seg.track, &seg.segment);
            if self.store.read(&path)?.is_none() {
                self.store.write(&path, Value::Bool(false))?;
                written += 1;
            }
        }
        info!("Initialized {} segment flags.", written);
        Ok(written)
    }

    // A missing flag reads as free.
    fn read_flag(&self, path: &str) -> Result<bool, ScanError> {
        match self.store.read(path)? {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(StoreError::Corrupt(path.to_string(), other.to_string()).into()),
        }
    }
}
