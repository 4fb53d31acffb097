use smallvec::SmallVec;
use std::collections::HashSet;

use super::topology::{SegmentRef, SignalId, Topology, TrackId};
use super::{content_lines, regex, ParseError};

/// How the occupancy of the monitored segments is combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Red if any monitored segment is occupied.
    Any,
    /// Red only if every monitored segment is occupied.
    All,
}

impl TriggerPolicy {
    pub fn triggered<I: IntoIterator<Item = bool>>(self, occupied: I) -> bool {
        let mut occupied = occupied.into_iter();
        match self {
            TriggerPolicy::Any => occupied.any(|x| x),
            TriggerPolicy::All => occupied.all(|x| x),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Aspect {
    Red,
    Green,
    /// Not produced by any current policy.
    Yellow,
}

/// Status codes written to the store for each aspect.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AspectCodes {
    pub red: i64,
    pub green: i64,
    pub yellow: i64,
}

impl Default for AspectCodes {
    fn default() -> AspectCodes {
        AspectCodes { red: 1, green: 0, yellow: 2 }
    }
}

impl AspectCodes {
    pub fn code(&self, aspect: Aspect) -> i64 {
        match aspect {
            Aspect::Red => self.red,
            Aspect::Green => self.green,
            Aspect::Yellow => self.yellow,
        }
    }

    pub fn aspect(&self, code: i64) -> Option<Aspect> {
        if code == self.red {
            Some(Aspect::Red)
        } else if code == self.green {
            Some(Aspect::Green)
        } else if code == self.yellow {
            Some(Aspect::Yellow)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalDefinition {
    pub id: SignalId,
    /// Owning track; monitored segments written without a track belong here.
    pub track: TrackId,
    pub segments: SmallVec<[SegmentRef; 4]>,
    pub policy: TriggerPolicy,
    pub codes: AspectCodes,
    /// Display position (row, col) for the presentation layer.
    pub position: Option<(u32, u32)>,
    pub description: Option<String>,
}

impl SignalDefinition {
    /// The aspect for the given occupancy of `self.segments`, in order.
    pub fn aspect<I: IntoIterator<Item = bool>>(&self, occupied: I) -> Aspect {
        if self.policy.triggered(occupied) { Aspect::Red } else { Aspect::Green }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalRuleSet {
    definitions: Vec<SignalDefinition>,
}

impl SignalRuleSet {
    pub fn new(definitions: Vec<SignalDefinition>) -> Result<SignalRuleSet, ParseError> {
        let mut ids = HashSet::new();
        for def in &definitions {
            if !ids.insert(def.id.clone()) {
                return Err(ParseError::Duplicate("signal", def.id.clone()));
            }
            if def.segments.is_empty() {
                return Err(ParseError::NoSegments(def.id.clone()));
            }
        }
        Ok(SignalRuleSet { definitions })
    }

    pub fn definitions(&self) -> &[SignalDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&SignalDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Monitored segments that the topology does not know, per signal.
    pub fn unresolved<'a>(&'a self, topology: &'a Topology)
        -> impl Iterator<Item = (&'a SignalId, &'a SegmentRef)> + 'a {
        self.definitions.iter().flat_map(move |d| {
            d.segments.iter()
                .filter(move |s| !topology.contains(&s.track, &s.segment))
                .map(move |s| (&d.id, s))
        })
    }
}

/// Parses the signal rule format, one signal per line:
///
/// * signal 1 track T2 any S1 S2 S3 red=1 green=0 yellow=2 at 38 160
/// * signal 2 track T1 all S7 T2/S4
///
/// Codes default to red=1 green=0 yellow=2. `at <row> <col>` and a quoted
/// description are optional.
pub fn parse_signals(input: &str) -> Result<SignalRuleSet, ParseError> {
    let signal_re = regex(r"(?x) ^ signal \s+ (?P<id>[\w\-\.]+) \s+
            track \s+ (?P<track>[\w\-\.]+) \s+
            (?P<policy>any|all|ANY|ALL) \s+
            (?P<rest>.*) $")?;
    let segment_re = regex(r"^(?:(?P<track>[\w\-\.]+)/)?(?P<segment>[\w\-\.]+)$")?;
    let code_re = regex(r"^(?P<aspect>red|green|yellow)=(?P<code>-?\d+)$")?;
    let description_re = regex(r#""(?P<text>[^"]*)""#)?;

    let mut definitions = Vec::new();
    for (lineno, line) in content_lines(input) {
        let groups = signal_re.captures(line)
            .ok_or_else(|| ParseError::Unrecognized(lineno, line.to_string()))?;
        let track = groups["track"].to_string();
        let policy = match &groups["policy"] {
            "any" | "ANY" => TriggerPolicy::Any,
            _ => TriggerPolicy::All,
        };

        let mut segments = SmallVec::new();
        let mut codes = AspectCodes::default();
        let mut position = None;
        let description = description_re.captures(&groups["rest"]).map(|d| d["text"].to_string());
        let rest = description_re.replace(&groups["rest"], " ");
        let mut words = rest.split_whitespace();
        while let Some(word) = words.next() {
            if word == "at" {
                let mut coord = || words.next()
                    .and_then(|w| w.parse::<u32>().ok())
                    .ok_or_else(|| ParseError::NumberError(lineno, line.to_string()));
                let row = coord()?;
                let col = coord()?;
                position = Some((row, col));
            } else if let Some(c) = code_re.captures(word) {
                let code = c["code"].parse::<i64>()
                    .map_err(|_e| ParseError::NumberError(lineno, word.to_string()))?;
                match &c["aspect"] {
                    "red" => codes.red = code,
                    "green" => codes.green = code,
                    _ => codes.yellow = code,
                }
            } else if let Some(s) = segment_re.captures(word) {
                let seg_track = s.name("track").map(|m| m.as_str()).unwrap_or(track.as_str());
                segments.push(SegmentRef::new(seg_track, &s["segment"]));
            } else {
                return Err(ParseError::Unrecognized(lineno, line.to_string()));
            }
        }

        definitions.push(SignalDefinition {
            id: groups["id"].to_string(),
            track,
            segments,
            policy,
            codes,
            position,
            description,
        });
    }
    SignalRuleSet::new(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::topology::parse_topology;

    #[test]
    fn policies() {
        assert!(TriggerPolicy::Any.triggered(vec![false, true, false]));
        assert!(!TriggerPolicy::Any.triggered(vec![false, false, false]));
        assert!(TriggerPolicy::All.triggered(vec![true, true]));
        assert!(!TriggerPolicy::All.triggered(vec![true, false]));
        // Single segment ALL behaves like ANY.
        for &x in &[true, false] {
            assert_eq!(TriggerPolicy::All.triggered(vec![x]), TriggerPolicy::Any.triggered(vec![x]));
        }
    }

    #[test]
    fn parse_rules() {
        let rules = parse_signals("
            signal 1 track T2 any S1 S2 S3 red=1 green=0 yellow=2 at 38 160
            signal 2 track T1 ANY S7
            signal 4 track T1 all S7 T2/S4 red=5 green=6
        ").unwrap();
        let defs = rules.definitions();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].segments.as_slice(),
                   &[SegmentRef::new("T2", "S1"), SegmentRef::new("T2", "S2"), SegmentRef::new("T2", "S3")]);
        assert_eq!(defs[0].position, Some((38, 160)));
        assert_eq!(defs[1].codes, AspectCodes::default());
        assert_eq!(defs[2].policy, TriggerPolicy::All);
        assert_eq!(defs[2].segments[1], SegmentRef::new("T2", "S4"));
        assert_eq!(defs[2].codes, AspectCodes { red: 5, green: 6, yellow: 2 });
        assert_eq!(rules.get("2").unwrap().track, "T1");
        assert_eq!(defs[0].description, None);
    }

    #[test]
    fn descriptions() {
        let rules = parse_signals(r#"
            signal 1 track T2 any S1 S2 S3 "Starter signal #1 on Track T2" at 38 160 # comment
            signal 2 track T1 any S7 at 58 160 "Starter signal #2"
        "#).unwrap();
        let defs = rules.definitions();
        assert_eq!(defs[0].description.as_ref().map(|s| s.as_str()), Some("Starter signal #1 on Track T2"));
        assert_eq!(defs[0].segments.len(), 3);
        assert_eq!(defs[0].position, Some((38, 160)));
        assert_eq!(defs[1].description.as_ref().map(|s| s.as_str()), Some("Starter signal #2"));
        assert!(parse_signals("signal 1 track T2 any S1 \"unterminated").is_err());
    }

    #[test]
    fn invalid_rules() {
        assert!(parse_signals("signal 1 track T2 any").is_err());
        assert!(parse_signals("signal 1 track T2 any S1\nsignal 1 track T2 any S2").is_err());
        assert!(parse_signals("signal 1 track T2 some S1").is_err());
        assert!(parse_signals("signal 1 track T2 any S1 at 38").is_err());
        assert!(parse_signals("signal 1 track T2 any S1 red=x").is_err());
    }

    #[test]
    fn unresolved_segments() {
        let topology = parse_topology("track T2 S1 S2 S3 S4").unwrap();
        let rules = parse_signals("signal 1 track T2 any S1 S9\nsignal 2 track T1 any S7").unwrap();
        let missing: Vec<_> = rules.unresolved(&topology).map(|(id, s)| (id.clone(), s.to_string())).collect();
        assert_eq!(missing, vec![("1".to_string(), "T2/S9".to_string()),
                                 ("2".to_string(), "T1/S7".to_string())]);
    }

    #[test]
    fn codes_map_back_to_aspects() {
        let codes = AspectCodes::default();
        assert_eq!(codes.aspect(codes.code(Aspect::Yellow)), Some(Aspect::Yellow));
        assert_eq!(codes.aspect(7), None);
    }
}
