mod affinity;

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rte::{
    DEFAULT_PORT, ExchangeEngine, Name, PerfEngine, PerfResult, Resource, Rte, RunConfig,
    SocketExchange, TestCommand, TestType,
};

#[derive(Parser, Debug)]
#[command(name = "perftest")]
#[command(about = "Two-peer transport performance test")]
struct Cli {
    /// Server hostname; run as the listening server when omitted
    server: Option<String>,

    /// TCP port to use for data exchange
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Set affinity to this CPU
    #[arg(short = 'c', long)]
    cpu: Option<usize>,

    /// Device to use for testing
    #[arg(short = 'd', long, default_value = "")]
    device: String,

    /// Transport to use for testing
    #[arg(short = 'x', long, default_value = "")]
    transport: String,

    /// Test to run
    #[arg(short = 't', long, value_enum)]
    test: Option<TestKind>,

    /// Number of iterations to run
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    iters: u64,

    /// Message size in bytes
    #[arg(short = 's', long, default_value_t = 8)]
    message_size: u64,

    /// Number of warm-up iterations
    #[arg(short = 'w', long, default_value_t = 10_000)]
    warmup: u64,

    /// Stop after this many seconds (0 = no limit)
    #[arg(long, default_value_t = 0.0)]
    max_time: f64,

    /// Seconds between progress lines
    #[arg(long, default_value_t = 1.0)]
    report_interval: f64,

    /// List available transports and exit
    #[arg(short = 'l', long)]
    list: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
enum TestKind {
    /// Put latency
    PutLat,
    /// Put bandwidth / message rate
    PutBw,
    /// Active message latency
    AmLat,
}

impl TestKind {
    fn selectors(self) -> (TestCommand, TestType) {
        match self {
            TestKind::AmLat => (TestCommand::AmShort, TestType::PingPong),
            TestKind::PutLat => (TestCommand::PutShort, TestType::PingPong),
            TestKind::PutBw => (TestCommand::PutShort, TestType::StreamUni),
        }
    }
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig, rte::ConfigError> {
        let (command, test_type) = self.test.map(TestKind::selectors).unzip();
        Ok(RunConfig {
            command,
            test_type,
            warmup_iter: self.warmup,
            message_size: self.message_size,
            max_iter: self.iters,
            max_time: self.max_time,
            report_interval: self.report_interval,
            device: Name::new(&self.device)?,
            transport: Name::new(&self.transport)?,
            ..RunConfig::default()
        })
    }
}

#[derive(Debug, Error)]
enum PerftestError {
    #[error(transparent)]
    Rte(#[from] rte::Error),
    #[error(transparent)]
    Config(#[from] rte::ConfigError),
    #[error(transparent)]
    Affinity(#[from] affinity::AffinityError),
}

/// How a successful invocation ended.
#[derive(Debug)]
enum Outcome {
    /// The test ran to completion.
    Completed(PerfResult),
    /// Informational request served; no test was run.
    Listed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn print_resources(resources: &[Resource]) {
    const MB: f64 = 1024.0 * 1024.0;
    println!("+-----------+-------------+-----------------+--------------+");
    println!("| device    | transport   | bandwidth       | latency      |");
    println!("+-----------+-------------+-----------------+--------------+");
    for res in resources {
        println!(
            "| {:<9} | {:<11} | {:10.2} MB/s | {:7.3} usec |",
            res.device,
            res.transport,
            res.bandwidth / MB,
            res.latency * 1e6
        );
    }
    println!("+-----------+-------------+-----------------+--------------+");
}

/// Print the header, run the engine on `group` and print the footer.
fn run_test(
    engine: &mut dyn PerfEngine,
    config: &RunConfig,
    group: &mut dyn Rte,
) -> Result<Outcome, PerftestError> {
    group.reporter().header(config);
    let result = engine
        .run(config, group)
        .inspect_err(|e| error!("Failed to run test: {}", e))?;
    group.reporter().footer(&result);
    Ok(Outcome::Completed(result))
}

/// Run under MPI when launched by an MPI runtime.
///
/// Returns `None` when the process was started interactively or MPI did not
/// initialise; the caller then falls back to the socket exchange.
#[cfg(feature = "mpi")]
fn run_mpi(
    engine: &mut dyn PerfEngine,
    config: &RunConfig,
) -> Option<Result<Outcome, PerftestError>> {
    use std::io::IsTerminal;

    if std::io::stdin().is_terminal() {
        return None;
    }
    let universe = mpi::initialize()?;
    let outcome = rte::MpiExchange::new(universe.world(), config)
        .map_err(PerftestError::from)
        .and_then(|mut group| {
            info!(
                "running under MPI, rank {} of {}",
                group.group_index(),
                group.group_size()
            );
            run_test(engine, config, &mut group)
        });
    Some(outcome)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(
    _engine: &mut dyn PerfEngine,
    _config: &RunConfig,
) -> Option<Result<Outcome, PerftestError>> {
    None
}

fn run(cli: &Cli) -> Result<Outcome, PerftestError> {
    let mut engine = ExchangeEngine::new();
    if cli.list {
        print_resources(&engine.resources());
        return Ok(Outcome::Listed);
    }

    affinity::check_system(cli.cpu)?;
    let config = cli.run_config()?;

    if let Some(outcome) = run_mpi(&mut engine, &config) {
        return outcome;
    }

    match &cli.server {
        None => {
            let (mut group, config) = SocketExchange::listen(cli.port)?;
            run_test(&mut engine, &config, &mut group)
        }
        Some(host) => {
            let mut group = SocketExchange::connect(host, cli.port, &config)?;
            run_test(&mut engine, &config, &mut group)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli) {
        Ok(Outcome::Completed(result)) => {
            info!("test completed after {} iterations", result.iters);
            ExitCode::SUCCESS
        }
        Ok(Outcome::Listed) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
