use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::{content_lines, regex, ParseError};
use crate::store::{self, StateStore};
use crate::railway::ScanError;

pub type TrackId = String;
pub type SegmentId = String;
pub type TrainId = String;
pub type SignalId = String;

/// A segment addressed by its track. Also used as a train position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentRef {
    pub track: TrackId,
    pub segment: SegmentId,
}

impl SegmentRef {
    pub fn new(track: &str, segment: &str) -> SegmentRef {
        SegmentRef { track: track.to_string(), segment: segment.to_string() }
    }
}

impl fmt::Display for SegmentRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.segment)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub segments: Vec<SegmentId>,
}

/// Tracks and their ordered segments. Fixed for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    tracks: Vec<Track>,
    names: HashMap<TrackId, usize>,
}

impl Topology {
    pub fn new(tracks: Vec<Track>) -> Result<Topology, ParseError> {
        let mut names = HashMap::new();
        for (idx, track) in tracks.iter().enumerate() {
            if names.insert(track.id.clone(), idx).is_some() {
                return Err(ParseError::Duplicate("track", track.id.clone()));
            }
            let mut seen = Vec::with_capacity(track.segments.len());
            for seg in &track.segments {
                if seen.contains(&seg) {
                    return Err(ParseError::Duplicate("segment",
                                                     format!("{}/{}", track.id, seg)));
                }
                seen.push(seg);
            }
        }
        Ok(Topology { tracks, names })
    }

    // Store keys are unique per level, so tracks read from a store need no
    // duplicate check.
    fn indexed(tracks: Vec<Track>) -> Topology {
        let names = tracks.iter().enumerate().map(|(idx, t)| (t.id.clone(), idx)).collect();
        Topology { tracks, names }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.names.get(id).map(|&idx| &self.tracks[idx])
    }

    pub fn contains(&self, track: &str, segment: &str) -> bool {
        self.track(track).map(|t| t.segments.iter().any(|s| s == segment)).unwrap_or(false)
    }

    /// Every segment, track by track in load order.
    pub fn segments<'a>(&'a self) -> impl Iterator<Item = SegmentRef> + 'a {
        self.tracks.iter().flat_map(|t| t.segments.iter().map(move |s| SegmentRef::new(&t.id, s)))
    }
}

/// Parses the topology format, one track per line:
///
/// * track T1 S5 S6 S7 S8
/// * track T2 S1 S2 S3 S4
///
pub fn parse_topology(input: &str) -> Result<Topology, ParseError> {
    let track_re = regex(r"^track\s+(?P<id>[\w\-\.]+)(?P<segments>(?:\s+[\w\-\.]+)*)$")?;
    let mut tracks = Vec::new();
    for (lineno, line) in content_lines(input) {
        match track_re.captures(line) {
            Some(groups) => tracks.push(Track {
                id: groups["id"].to_string(),
                segments: groups["segments"].split_whitespace().map(|s| s.to_string()).collect(),
            }),
            None => return Err(ParseError::Unrecognized(lineno, line.to_string())),
        }
    }
    Topology::new(tracks)
}

/// Reads the topology back from the `tracks` collection of a store. Tracks
/// without a `segments` collection are skipped. Segment order is the
/// store's key order.
pub fn topology_from_store<S: StateStore>(store: &S) -> Result<Topology, ScanError> {
    let mut tracks = Vec::new();
    for (id, track) in store.read_collection(store::TRACKS)? {
        match track.get("segments") {
            Some(Value::Object(segments)) => tracks.push(Track {
                id,
                segments: segments.keys().cloned().collect(),
            }),
            _ => warn!("Track {} has no segments, skipping.", id),
        }
    }
    Ok(Topology::indexed(tracks))
}

/// Parses a manual override of the form `T2/S3=1`.
pub fn parse_override(input: &str) -> Result<(SegmentRef, bool), ParseError> {
    let re = regex(r"^\s*(?P<track>[\w\-\.]+)/(?P<segment>[\w\-\.]+)\s*=\s*(?P<value>[01]|true|false)\s*$")?;
    match re.captures(input) {
        Some(groups) => Ok((SegmentRef::new(&groups["track"], &groups["segment"]),
                            &groups["value"] == "1" || &groups["value"] == "true")),
        None => Err(ParseError::Unrecognized(1, input.to_string())),
    }
}
