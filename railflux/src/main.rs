extern crate railflux;
extern crate failure;
extern crate structopt;
#[macro_use] extern crate log;

use railflux::*;
use railflux::input::feed::ScriptedFeed;
use railflux::input::topology::{parse_override, topology_from_store};
use railflux::store::MemoryStore;
use railflux::scan::ScanConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use structopt::StructOpt;

/// Railflux -- track occupancy and signal aspects from train positions
#[derive(StructOpt, Debug)]
#[structopt(name="railflux")]
struct Opt {
    /// Verbose mode (-v, -vv, -vvv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Signal rule file (`signal <id> track <track> any|all <segment>...` lines)
    #[structopt(parse(from_os_str))]
    signals: PathBuf,

    /// Train position script (`at <seconds> train <id> <track> <segment>` lines)
    #[structopt(parse(from_os_str))]
    feed: PathBuf,

    /// Topology file (`track <id> <segment>...` lines). Read from the seed
    /// document's `tracks` when absent.
    #[structopt(short = "t", long = "topology", parse(from_os_str))]
    topology: Option<PathBuf>,

    /// JSON document the store starts from
    #[structopt(short = "s", long = "seed", parse(from_os_str))]
    seed: Option<PathBuf>,

    /// Seconds the feed script advances per cycle. Defaults to the interval.
    #[structopt(long = "step")]
    step: Option<f64>,

    /// Number of scan cycles to run. Runs until Ctrl-C when absent.
    #[structopt(short = "n", long = "cycles")]
    cycles: Option<usize>,

    /// Scan interval in milliseconds
    #[structopt(short = "i", long = "interval", default_value = "300")]
    interval: u64,

    /// Manual occupancy override applied before the first cycle, e.g. T2/S3=1
    #[structopt(short = "o", long = "override")]
    overrides: Vec<String>,

    /// Output JSON history file
    #[structopt(short = "j", long = "json", parse(from_os_str))]
    json: Option<PathBuf>,

    /// Output JSON history as JavaScript
    #[structopt(short = "J", long = "javascript", parse(from_os_str))]
    javascript: Option<PathBuf>,
}

fn run(opt: &Opt) -> AppResult<()> {
    let store = match opt.seed {
        Some(ref seed) => get_seed(seed)?,
        None => MemoryStore::new(),
    };
    let topology = match opt.topology {
        Some(ref topology) => get_topology(topology)?,
        None if opt.seed.is_some() => topology_from_store(&store)?,
        None => return Err(failure::err_msg("either --topology or --seed is required")),
    };
    let rules = get_signals(&opt.signals)?;
    let script = get_feed_script(&opt.feed)?;
    info!("Loaded {} tracks, {} signals, {} feed actions.",
          topology.tracks().len(), rules.definitions().len(), script.len());
    for track in topology.tracks() {
        debug!("  track {} {:?}", track.id, track.segments);
    }
    for def in rules.definitions() {
        debug!("  signal {:?}", def);
    }

    let mut overrides = Vec::new();
    for o in &opt.overrides {
        overrides.push(parse_override(o)?);
    }

    let interval = Duration::from_millis(opt.interval);
    let feed = ScriptedFeed::new(script, feed_step(interval, opt.step)?);
    let config = ScanConfig { interval, cycles: opt.cycles };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    let history = simulate(store, &topology, &rules, feed, &overrides, config, &stop)?;

    println!("# Final state after {} cycles ({} failed):", history.cycles, history.failed_cycles);
    print!("{}", railflux::output::history::state_listing(&topology, &rules, &history)?);

    if let Some(ref json) = opt.json {
        use std::fs::File;
        use std::io::BufWriter;
        let file = File::create(json)?;
        let mut writer = BufWriter::new(&file);
        railflux::output::json::json_history(&history, &mut writer)?;
    }

    if let Some(ref javascript) = opt.javascript {
        use std::fs::File;
        use std::io::BufWriter;
        let file = File::create(javascript)?;
        let mut writer = BufWriter::new(&file);
        railflux::output::json::javascript_history(&history, &mut writer)?;
    }

    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&opt) {
        Ok(()) => {},
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        },
    }
}
