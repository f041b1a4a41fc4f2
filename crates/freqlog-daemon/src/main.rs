//! freqlog entry point.
//!
//! Connects to the instrument, configures the frequency measurement and
//! runs the acquisition loop with signal handling.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use freqlog_common::config::{FreqlogConfig, InstrumentConfig, InstrumentDriver, OutputTarget};
use freqlog_common::shutdown::ShutdownFlag;
use freqlog_common::time::SystemClock;
use freqlog_instrument::{
    configure_frequency_measurement, Instrument, InstrumentAddress, MeasurementSetup,
    ScpiTcpConfig, ScpiTcpInstrument, SimulatedInstrument,
};
use freqlog_runtime::{open_sink, CycleRunner, InstrumentSession, RunOutcome, RunSettings, RunSummary};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::signals::SignalHandler;

/// Notice printed after an interrupted run.
const INTERRUPT_NOTICE: &str = "Interrupt received; instrument released, exiting";

/// freqlog command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "freqlog",
    about = "Log averaged instrument frequency as line-protocol records with MJD timestamps",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Instrument address: host, host:port or TCPIP VISA resource.
    #[arg(long, short = 'a')]
    address: Option<String>,

    /// Frequency readings averaged per record.
    #[arg(long, short = 'n')]
    samples: Option<usize>,

    /// Records to write before exiting.
    #[arg(long, short = 'm')]
    cycles: Option<u64>,

    /// Record output file, `-` for stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Repeat the summary every this many cycles (0 = first cycle only).
    #[arg(long)]
    summary_every: Option<u64>,

    /// Use the simulated instrument.
    #[arg(long, short = 's')]
    simulated: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting freqlog");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        driver = ?config.instrument.driver,
        address = %config.instrument.address,
        samples_per_cycle = config.acquisition.samples_per_cycle,
        total_cycles = config.acquisition.total_cycles,
        "Configuration loaded"
    );

    let shutdown = ShutdownFlag::new();
    let signal_handler =
        SignalHandler::new(shutdown.clone()).context("Failed to set up signal handlers")?;

    let summary = run_logger(&config, &shutdown)?;

    if summary.outcome == RunOutcome::Interrupted {
        if let Some(signal) = signal_handler.last_signal() {
            info!(%signal, "Run interrupted");
        }
        eprintln!("{INTERRUPT_NOTICE}");
    }

    info!(
        outcome = ?summary.outcome,
        cycles = summary.cycles_completed,
        gate_min_ms = summary.gate.min_ms,
        gate_mean_ms = summary.gate.mean_ms,
        gate_max_ms = summary.gate.max_ms,
        "freqlog shutdown complete"
    );
    Ok(())
}

/// Initialize logging on stderr with the specified level.
fn init_logging(level: &str) {
    let filter = format!(
        "freqlog={level},freqlog_runtime={level},freqlog_instrument={level},freqlog_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `FREQLOG_CONFIG_PATH` environment variable
/// 3. `/etc/freqlog/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<FreqlogConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return FreqlogConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("FREQLOG_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from FREQLOG_CONFIG_PATH");
            return FreqlogConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from FREQLOG_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "FREQLOG_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/freqlog/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return FreqlogConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {candidate}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(FreqlogConfig::default())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut FreqlogConfig, args: &Args) {
    if let Some(address) = &args.address {
        config.instrument.address.clone_from(address);
    }
    if let Some(samples) = args.samples {
        config.acquisition.samples_per_cycle = samples;
    }
    if let Some(cycles) = args.cycles {
        config.acquisition.total_cycles = cycles;
    }
    if let Some(every) = args.summary_every {
        config.acquisition.summary_every = every;
    }
    if let Some(output) = &args.output {
        config.output.path = OutputTarget::from(output.clone());
    }
    if args.simulated {
        config.instrument.driver = InstrumentDriver::Simulated;
    }
}

/// Open the configured instrument.
fn create_instrument(config: &InstrumentConfig) -> Result<Box<dyn Instrument>> {
    match config.driver {
        InstrumentDriver::Simulated => {
            info!(
                frequency_hz = config.simulated_frequency_hz,
                "Using simulated instrument"
            );
            Ok(Box::new(SimulatedInstrument::new(config.simulated_frequency_hz)))
        }
        InstrumentDriver::ScpiTcp => {
            let address = InstrumentAddress::parse(&config.address)
                .with_context(|| format!("Invalid instrument address {:?}", config.address))?;
            let transport = ScpiTcpConfig {
                connect_timeout: config.connect_timeout,
                io_timeout: config.io_timeout,
                ..ScpiTcpConfig::default()
            };
            let instrument = ScpiTcpInstrument::connect(&address, &transport)
                .context("Failed to connect to instrument")?;
            Ok(Box::new(instrument))
        }
    }
}

/// Connect, configure and run the acquisition loop.
///
/// The instrument is released before this returns on every path.
fn run_logger(config: &FreqlogConfig, shutdown: &ShutdownFlag) -> Result<RunSummary> {
    let mut sink = open_sink(&config.output.path).context("Failed to open record output")?;

    let instrument = create_instrument(&config.instrument)?;
    let mut session = InstrumentSession::new(instrument);

    if let Err(e) = prepare_instrument(&mut session, &config.instrument) {
        if shutdown.is_requested() {
            warn!(error = %e, "Instrument setup aborted by interrupt");
            session.release().ok();
            return Ok(RunSummary {
                outcome: RunOutcome::Interrupted,
                cycles_completed: 0,
                gate: freqlog_common::metrics::GateMetricsSnapshot::default(),
            });
        }
        return Err(e);
    }

    let mut runner = CycleRunner::new(
        session,
        SystemClock,
        RunSettings::from(&config.acquisition),
        shutdown.clone(),
    );
    let summary = runner.run(&mut sink)?;
    sink.flush().context("Failed to flush record output")?;
    Ok(summary)
}

/// Identify the instrument and set up the frequency measurement.
fn prepare_instrument(
    session: &mut InstrumentSession<Box<dyn Instrument>>,
    config: &InstrumentConfig,
) -> Result<()> {
    let identity = session
        .instrument_mut()
        .identify()
        .context("Instrument identification failed")?;
    info!(identity = %identity.trim(), "Connected to instrument");

    configure_frequency_measurement(session.instrument_mut(), &MeasurementSetup::from(config))
        .context("Failed to configure frequency measurement")?;
    Ok(())
}
