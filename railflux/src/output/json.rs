use failure::Error;
use serde_json::{json, Value};
use std::io;

use super::history::{History, ScanLogEvent};

fn event_json(ev: &ScanLogEvent) -> Value {
    use self::ScanLogEvent::*;
    match *ev {
        Cycle(n) => json!({ "event": "cycle", "cycle": n }),
        Occupied(ref seg, x) => json!({
            "event": "occupied", "track": seg.track, "segment": seg.segment, "value": x
        }),
        Aspect(ref id, aspect, code) => json!({
            "event": "signal", "ref": id,
            "value": format!("{:?}", aspect).to_lowercase(), "status": code
        }),
        ReportSkipped(ref train, ref reason) => json!({
            "event": "report_skipped", "ref": train, "reason": reason
        }),
        SignalSkipped(ref id, ref reason) => json!({
            "event": "signal_skipped", "ref": id, "reason": reason
        }),
        CycleFailed(n, ref reason) => json!({
            "event": "cycle_failed", "cycle": n, "reason": reason
        }),
    }
}

pub fn history_json(history: &History) -> Value {
    json!({
        "cycles": history.cycles,
        "failed_cycles": history.failed_cycles,
        "events": history.events.iter().map(event_json).collect::<Vec<_>>(),
        "state": history.state,
    })
}

pub fn json_history<W: io::Write>(history: &History, f: &mut W) -> Result<(), Error> {
    serde_json::to_writer_pretty(&mut *f, &history_json(history))?;
    Ok(())
}

pub fn javascript_history<W: io::Write>(history: &History, f: &mut W) -> Result<(), Error> {
    write!(f, "var data = ")?;
    json_history(history, f)?;
    write!(f, ";")?;
    Ok(())
}
