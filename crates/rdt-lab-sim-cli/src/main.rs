use anyhow::{Context, Result};
use clap::Parser;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};

use rdt_lab_abstract::{Direction, LinkConfig, RdtVersion, SimConfig, SimConfigOverride};
use rdt_lab_simulator::{
    AppInput, InputFeed, RdtEngine, RdtError, SimulationReport, TimedReceiver, Trace,
    scenario_runner, simulated_channel,
};

/// Grace period for lines still on the link after the sender stops.
const SETTLE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "Reliable data transfer simulator")]
struct Args {
    /// Protocol revision: rdt10, rdt20, rdt21, rdt22 or rdt30.
    #[arg(long, default_value = "rdt30")]
    protocol: RdtVersion,

    /// Per-character corruption probability.
    #[arg(short = 'm', long)]
    corrupt: Option<f64>,

    /// Per-line loss probability.
    #[arg(short = 'l', long)]
    loss: Option<f64>,

    /// rdt3.0 retransmission timeout in milliseconds.
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Replay this file instead of reading standard input.
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Milliseconds between replayed lines.
    #[arg(long, default_value_t = 500)]
    delay: u64,

    /// Random +/- jitter on the delay during the first pass, in milliseconds.
    #[arg(long, default_value_t = 0)]
    wiggle: u64,

    /// Seed both channels for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Load simulation settings from a TOML file; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a scenario file and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Pipe the input through a single forward channel, with no protocol,
    /// and print whatever comes out.
    #[arg(long, conflicts_with_all = ["scenario", "trace_out"])]
    channel_only: bool,

    /// With --channel-only: milliseconds on a receive timer that reports each
    /// expiry and is re-armed.
    #[arg(long, requires = "channel_only")]
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    timer: Option<u64>,

    /// Log every packet and state transition.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("rdt-sim starting…");

    if args.channel_only {
        return run_channel_only(&args).await;
    }

    let report = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario_file(path).await?
    } else {
        run_interactive(&args).await?
    };

    info!(
        "{}: {} lines delivered, forward {}/{} sent/dropped, backward {}/{}, {} timeouts",
        report.protocol,
        report.delivered_data.len(),
        report.forward.sent,
        report.forward.dropped,
        report.backward.sent,
        report.backward.dropped,
        report.timeouts
    );

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimConfig::default(),
        };
        let flags = SimConfigOverride {
            corrupt_rate: self.corrupt,
            loss_rate: self.loss,
            timeout_ms: self.timeout,
            seed: self.seed,
            ..SimConfigOverride::default()
        };
        flags.apply_to(&mut config);
        Ok(config)
    }

    fn input_feed(&self) -> InputFeed {
        match &self.file {
            Some(path) => InputFeed::File {
                path: path.clone(),
                delay: Duration::from_millis(self.delay),
                wiggle: Duration::from_millis(self.wiggle),
            },
            None => InputFeed::Stdin,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Runs until Ctrl-C, or until the input is exhausted and the sender has
/// stopped.
async fn run_interactive(args: &Args) -> Result<SimulationReport> {
    let config = args.sim_config()?;
    let engine = RdtEngine::new(args.protocol, config).context("Invalid simulation settings")?;
    let (input, feed) = args.input_feed().spawn();
    let mut running = engine.start(input);
    // deliveries are already logged by the receiver
    running.close_deliveries();

    tokio::select! {
        result = running.sender_finished() => {
            result.context("Sender stopped with an error")?;
            tokio::time::sleep(SETTLE).await;
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    feed.abort();
    Ok(running.shutdown())
}

/// What the far end of a bare channel saw.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Line(String),
    Timeout,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Line(line) => write!(f, "         {line}"),
            Observed::Timeout => f.write_str("         ***Timeout***"),
        }
    }
}

/// Runs one forward channel on its own until the input ends or Ctrl-C.
async fn run_channel_only(args: &Args) -> Result<()> {
    let config = args.sim_config()?;
    config.validate().context("Invalid simulation settings")?;
    let link = config.link(Direction::Forward);
    let timer = args.timer.map(Duration::from_millis);
    let trace = Trace::new(config.trace_capacity);
    info!(
        "channel only (corrupt_rate={}, loss_rate={}, timer={:?})",
        link.corrupt_rate, link.loss_rate, timer
    );

    let (input, feed) = args.input_feed().spawn();
    let print = |seen: Observed| println!("{seen}");
    tokio::select! {
        result = pipe_channel(input, link, timer, trace.clone(), print) => {
            result.context("Channel stopped with an error")?;
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    feed.abort();

    let stats = trace.stats(Direction::Forward);
    info!(
        "{} sent, {} corrupted, {} dropped, {} delivered, {} timeouts",
        stats.sent,
        stats.corrupted,
        stats.dropped,
        stats.delivered,
        trace.timeouts()
    );
    Ok(())
}

/// Feeds `input` into a simulated channel and hands everything its far end
/// sees to `show`. With a `timer`, the far end waits on a [`TimedReceiver`]
/// whose timer is re-armed after every expiry. Returns once the input ends
/// and the channel has drained.
async fn pipe_channel(
    mut input: AppInput,
    link: LinkConfig,
    timer: Option<Duration>,
    trace: Trace,
    mut show: impl FnMut(Observed),
) -> rdt_lab_simulator::Result<()> {
    let (tx, rx, relay) = simulated_channel(Direction::Forward, link, trace.clone());
    let relay = tokio::spawn(relay.run());
    let pump = tokio::spawn(async move {
        while let Some(line) = input.recv().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut rx = TimedReceiver::new(rx, trace);
    if let Some(period) = timer {
        rx.start_timer(period);
    }
    loop {
        match rx.receive().await {
            Ok(line) => show(Observed::Line(line)),
            Err(RdtError::TimedOut) => {
                show(Observed::Timeout);
                if let Some(period) = timer {
                    rx.start_timer(period);
                }
            }
            Err(RdtError::ChannelClosed(_)) => break,
            Err(err) => return Err(err),
        }
    }
    pump.await?;
    relay.await?;
    Ok(())
}

fn load_config(path: &Path) -> Result<SimConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SimConfig = toml::from_str(&content).context("Failed to parse config file")?;
    Ok(config)
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
