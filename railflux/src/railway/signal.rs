use serde_json::{json, Value};
use smallvec::SmallVec;

use super::registry::SegmentRegistry;
use super::ScanError;
use crate::input::signals::{Aspect, SignalDefinition, SignalRuleSet};
use crate::input::topology::SignalId;
use crate::output::history::ScanLogEvent;
use crate::store::{self, StateStore};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct EvaluationReport {
    pub aspects: Vec<(SignalId, Aspect, i64)>,
    pub skipped: Vec<SignalId>,
}

/// Derives signal aspects from segment occupancy.
pub struct SignalEvaluator {
    rules: SignalRuleSet,
}

impl SignalEvaluator {
    pub fn new(rules: SignalRuleSet) -> SignalEvaluator {
        SignalEvaluator { rules }
    }

    pub fn rules(&self) -> &SignalRuleSet {
        &self.rules
    }

    /// Aspect of one signal for the current occupancy. Every monitored
    /// segment is read, so an unknown segment is reported even when an
    /// earlier one already decides the outcome.
    pub fn aspect<S: StateStore>(&self, def: &SignalDefinition, registry: &SegmentRegistry<S>)
        -> Result<Aspect, ScanError> {
        let mut occupied: SmallVec<[bool; 4]> = SmallVec::new();
        for seg in &def.segments {
            occupied.push(registry.get_occupied(&seg.track, &seg.segment)?);
        }
        Ok(def.aspect(occupied))
    }

    /// Status code of one signal for the current occupancy.
    pub fn evaluate<S: StateStore>(&self, def: &SignalDefinition, registry: &SegmentRegistry<S>)
        -> Result<i64, ScanError> {
        Ok(def.codes.code(self.aspect(def, registry)?))
    }

    /// Evaluates and publishes every signal. A missing segment skips that
    /// signal, keeping its previous status; a store failure aborts.
    pub fn evaluate_all<S: StateStore>(&self, registry: &SegmentRegistry<S>)
        -> Result<EvaluationReport, ScanError> {
        let mut report = EvaluationReport::default();
        for def in self.rules.definitions() {
            let aspect = match self.aspect(def, registry) {
                Ok(aspect) => aspect,
                Err(ScanError::NotFound(e)) => {
                    warn!("Signal {} not evaluated: {}", def.id, e);
                    registry.log(ScanLogEvent::SignalSkipped(def.id.clone(), e.to_string()));
                    report.skipped.push(def.id.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            let code = def.codes.code(aspect);
            registry.store().write(&store::status_path(&def.id), Value::from(code))?;
            registry.log(ScanLogEvent::Aspect(def.id.clone(), aspect, code));
            report.aspects.push((def.id.clone(), aspect, code));
        }
        Ok(report)
    }

    /// Publishes every signal with its display position and the red status,
    /// before the first scan.
    pub fn publish_initial<S: StateStore>(&self, registry: &SegmentRegistry<S>) -> Result<(), ScanError> {
        for def in self.rules.definitions() {
            let mut entry = json!({ "status": def.codes.red });
            if let Some((row, col)) = def.position {
                entry["row"] = Value::from(row);
                entry["col"] = Value::from(col);
            }
            if let Some(ref description) = def.description {
                entry["description"] = Value::from(description.as_str());
            }
            registry.store().write(&store::signal_path(&def.id), entry)?;
        }
        info!("Published {} signals.", self.rules.definitions().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::signals::parse_signals;
    use crate::input::topology::parse_topology;
    use crate::store::MemoryStore;

    fn setup(signals: &str) -> (SegmentRegistry<MemoryStore>, SignalEvaluator) {
        let topology = parse_topology("track T1 S5 S6 S7 S8\ntrack T2 S1 S2 S3 S4").unwrap();
        let registry = SegmentRegistry::new(topology, MemoryStore::new());
        registry.initialize().unwrap();
        (registry, SignalEvaluator::new(parse_signals(signals).unwrap()))
    }

    #[test]
    fn any_policy() {
        let (r, ev) = setup("signal 1 track T2 any S1 S2 S3");
        let def = &ev.rules().definitions()[0];
        assert_eq!(ev.evaluate(def, &r).unwrap(), 0);
        for seg in &["S1", "S2", "S3"] {
            r.set_occupied("T2", seg, true).unwrap();
            assert_eq!(ev.evaluate(def, &r).unwrap(), 1);
            r.set_occupied("T2", seg, false).unwrap();
        }
        r.set_occupied("T2", "S4", true).unwrap();
        assert_eq!(ev.evaluate(def, &r).unwrap(), 0);
    }

    #[test]
    fn all_policy() {
        let (r, ev) = setup("signal 1 track T2 all S1 S2\nsignal 2 track T2 all S3");
        let both = &ev.rules().definitions()[0];
        let single = &ev.rules().definitions()[1];
        r.set_occupied("T2", "S1", true).unwrap();
        assert_eq!(ev.aspect(both, &r).unwrap(), Aspect::Green);
        r.set_occupied("T2", "S2", true).unwrap();
        assert_eq!(ev.aspect(both, &r).unwrap(), Aspect::Red);

        assert_eq!(ev.aspect(single, &r).unwrap(), Aspect::Green);
        r.set_occupied("T2", "S3", true).unwrap();
        assert_eq!(ev.aspect(single, &r).unwrap(), Aspect::Red);
    }

    #[test]
    fn custom_codes_are_published() {
        let (r, ev) = setup("signal 7 track T1 any S7 red=10 green=20");
        r.set_occupied("T1", "S7", true).unwrap();
        let rep = ev.evaluate_all(&r).unwrap();
        assert_eq!(rep.aspects, vec![("7".to_string(), Aspect::Red, 10)]);
        assert_eq!(r.store().read("signals/7/status").unwrap(), Some(Value::from(10)));
    }

    #[test]
    fn unknown_segment_skips_only_that_signal() {
        let (r, ev) = setup("signal 1 track T2 any S1 S9\nsignal 2 track T1 any S7");
        r.store().write("signals/1/status", Value::from(1)).unwrap();
        r.set_occupied("T1", "S7", true).unwrap();
        let rep = ev.evaluate_all(&r).unwrap();
        assert_eq!(rep.skipped, vec!["1".to_string()]);
        assert_eq!(rep.aspects, vec![("2".to_string(), Aspect::Red, 1)]);
        // The previous status is left in place.
        assert_eq!(r.store().read("signals/1/status").unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn initial_publication() {
        let (r, ev) = setup("signal 1 track T2 any S1 at 38 160 \"Starter\"\nsignal 3 track T2 any S4");
        ev.publish_initial(&r).unwrap();
        assert_eq!(r.store().read("signals/1").unwrap(),
                   Some(json!({ "status": 1, "row": 38, "col": 160, "description": "Starter" })));
        assert_eq!(r.store().read("signals/3").unwrap(), Some(json!({ "status": 1 })));
    }
}
