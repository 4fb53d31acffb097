//! Occupancy and signal state over the static topology.

pub mod registry;
pub mod occupancy;
pub mod signal;

use std::fmt;

use crate::input::topology::{SegmentRef, SignalId, TrackId, TrainId};
use crate::output::history::ScanLogEvent;
use crate::store::StoreError;

pub type Logger = Box<dyn Fn(ScanLogEvent)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    Track(TrackId),
    Segment(SegmentRef),
    Signal(SignalId),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NotFound::Track(ref t) => write!(f, "unknown track \"{}\"", t),
            NotFound::Segment(ref s) => write!(f, "unknown segment \"{}\"", s),
            NotFound::Signal(ref s) => write!(f, "unknown signal \"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, Fail)]
pub enum ScanError {
    #[fail(display = "{}", _0)]
    NotFound(NotFound),
    #[fail(display = "state store unavailable: {}", _0)]
    StoreUnavailable(#[cause] StoreError),
    #[fail(display = "malformed report for train {}: {}", train, reason)]
    MalformedReport { train: TrainId, reason: String },
}

impl From<StoreError> for ScanError {
    fn from(e: StoreError) -> ScanError {
        ScanError::StoreUnavailable(e)
    }
}

impl From<NotFound> for ScanError {
    fn from(e: NotFound) -> ScanError {
        ScanError::NotFound(e)
    }
}
