//! Test engine contract and a built-in engine that measures the exchange.
//!
//! An engine only sees `&mut dyn Rte`; it never knows which substrate
//! carries its traffic.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::Rte;
use crate::config::{RunConfig, TestType};
use crate::error::{ConfigError, Error, Result};
use crate::report::{Latency, PerfResult, Rate};

/// Upper bound on iterations between two control messages.
const MAX_BATCH: u64 = 1024;

/// A device/transport pair an engine can test.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub device: String,
    pub transport: String,
    /// Bytes per second.
    pub bandwidth: f64,
    /// Seconds.
    pub latency: f64,
}

/// Runs a test against a group and returns its statistics.
pub trait PerfEngine {
    /// Resources this engine can test.
    fn resources(&self) -> Vec<Resource>;

    /// Run the test described by `config`. Every peer of the group calls
    /// this with the same configuration.
    fn run(&mut self, config: &RunConfig, rte: &mut dyn Rte) -> Result<PerfResult>;
}

/// Ping-pong and unidirectional stream over `Rte::send`/`Rte::recv`.
///
/// Rank 0 drives the run: before every batch it tells rank 1 how many
/// iterations follow, and zero ends the run.
#[derive(Debug, Default)]
pub struct ExchangeEngine;

impl ExchangeEngine {
    pub fn new() -> Self {
        Self
    }

    fn iterate(
        rte: &mut dyn Rte,
        test_type: TestType,
        iters: u64,
        buf: &mut [u8],
    ) -> Result<()> {
        let me = rte.group_index();
        let peer = 1 - me;
        match test_type {
            TestType::PingPong => {
                for _ in 0..iters {
                    if me == 0 {
                        rte.send(peer, buf)?;
                        rte.recv(peer, buf)?;
                    } else {
                        rte.recv(peer, buf)?;
                        rte.send(peer, buf)?;
                    }
                }
            }
            TestType::StreamUni => {
                let mut ack = [0u8; 1];
                if me == 0 {
                    for _ in 0..iters {
                        rte.send(peer, buf)?;
                    }
                    rte.recv(peer, &mut ack)?;
                } else {
                    for _ in 0..iters {
                        rte.recv(peer, buf)?;
                    }
                    rte.send(peer, &ack)?;
                }
            }
        }
        Ok(())
    }
}

impl PerfEngine for ExchangeEngine {
    fn resources(&self) -> Vec<Resource> {
        vec![Resource {
            device: "self".to_string(),
            transport: "rte".to_string(),
            bandwidth: 0.0,
            latency: 0.0,
        }]
    }

    fn run(&mut self, config: &RunConfig, rte: &mut dyn Rte) -> Result<PerfResult> {
        if rte.group_size() != 2 {
            return Err(Error::Test(format!(
                "exchange engine requires exactly 2 peers, group has {}",
                rte.group_size()
            )));
        }
        let test_type = config.test_type.ok_or(ConfigError::MissingTestType)?;
        let me = rte.group_index();
        let peer = 1 - me;
        let mut buf = message_buffer(config.message_size)?;

        if config.warmup_iter > 0 {
            Self::iterate(rte, test_type, config.warmup_iter, &mut buf)?;
        }
        rte.barrier()?;
        debug!(rank = me, "warm-up done");

        let mut meter = Meter::new(config, test_type);
        let start = Instant::now();
        loop {
            let mut ctrl = [0u8; 8];
            if me == 0 {
                ctrl = meter.next_batch(start.elapsed()).to_le_bytes();
                rte.send(peer, &ctrl)?;
            } else {
                rte.recv(peer, &mut ctrl)?;
            }
            let iters = u64::from_le_bytes(ctrl);
            if iters == 0 {
                break;
            }

            let batch_start = Instant::now();
            Self::iterate(rte, test_type, iters, &mut buf)?;
            meter.record(iters, batch_start.elapsed());

            if meter.report_due() {
                let snapshot = meter.snapshot();
                rte.report(&snapshot);
            }
        }

        let result = meter.snapshot();
        rte.report(&result);
        rte.barrier()?;
        Ok(result)
    }
}

/// Zeroed buffer of `size` bytes, or an error when it cannot be allocated.
fn message_buffer(size: u64) -> Result<Vec<u8>> {
    let too_large = |reason: String| {
        Error::Test(format!("cannot allocate {} byte message buffer: {}", size, reason))
    };
    let len = usize::try_from(size).map_err(|e| too_large(e.to_string()))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| too_large(e.to_string()))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Accumulates timings and turns them into a `PerfResult`.
struct Meter {
    message_size: f64,
    max_iter: u64,
    max_time: Option<Duration>,
    report_interval: Duration,
    /// Latency share of one iteration: half a round trip for ping-pong.
    latency_factor: f64,
    total_iters: u64,
    total_time: Duration,
    moment_iters: u64,
    moment_time: Duration,
    typical: f64,
    moment_latency: f64,
    moment_bandwidth: f64,
    moment_msgrate: f64,
    last_report: Instant,
}

impl Meter {
    fn new(config: &RunConfig, test_type: TestType) -> Self {
        Self {
            message_size: config.message_size as f64,
            max_iter: config.max_iter,
            max_time: (config.max_time > 0.0)
                .then(|| Duration::try_from_secs_f64(config.max_time).ok())
                .flatten(),
            report_interval: Duration::try_from_secs_f64(config.report_interval.max(0.0))
                .unwrap_or(Duration::MAX),
            latency_factor: match test_type {
                TestType::PingPong => 0.5,
                TestType::StreamUni => 1.0,
            },
            total_iters: 0,
            total_time: Duration::ZERO,
            moment_iters: 0,
            moment_time: Duration::ZERO,
            typical: 0.0,
            moment_latency: 0.0,
            moment_bandwidth: 0.0,
            moment_msgrate: 0.0,
            last_report: Instant::now(),
        }
    }

    /// Iterations in the next batch; zero when the run is over.
    fn next_batch(&self, elapsed: Duration) -> u64 {
        if self.max_time.is_some_and(|limit| elapsed >= limit) {
            return 0;
        }
        (self.max_iter - self.total_iters).min(MAX_BATCH)
    }

    fn record(&mut self, iters: u64, elapsed: Duration) {
        self.total_iters += iters;
        self.total_time += elapsed;
        self.moment_iters += iters;
        self.moment_time += elapsed;
        self.typical = self.latency(iters, elapsed);
    }

    /// Close the current moment if the report interval has passed.
    fn report_due(&mut self) -> bool {
        if self.last_report.elapsed() < self.report_interval {
            return false;
        }
        self.close_moment();
        self.last_report = Instant::now();
        true
    }

    fn close_moment(&mut self) {
        if self.moment_iters == 0 {
            return;
        }
        let secs = self.moment_time.as_secs_f64();
        self.moment_latency = self.latency(self.moment_iters, self.moment_time);
        self.moment_msgrate = per_second(self.moment_iters as f64, secs);
        self.moment_bandwidth = per_second(self.moment_iters as f64 * self.message_size, secs);
        self.moment_iters = 0;
        self.moment_time = Duration::ZERO;
    }

    fn snapshot(&mut self) -> PerfResult {
        self.close_moment();
        let secs = self.total_time.as_secs_f64();
        PerfResult {
            iters: self.total_iters,
            latency: Latency {
                typical: self.typical,
                moment_average: self.moment_latency,
                total_average: self.latency(self.total_iters, self.total_time),
            },
            bandwidth: Rate {
                moment_average: self.moment_bandwidth,
                total_average: per_second(self.total_iters as f64 * self.message_size, secs),
            },
            msgrate: Rate {
                moment_average: self.moment_msgrate,
                total_average: per_second(self.total_iters as f64, secs),
            },
        }
    }

    fn latency(&self, iters: u64, elapsed: Duration) -> f64 {
        if iters == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() / iters as f64 * self.latency_factor
        }
    }
}

fn per_second(amount: f64, secs: f64) -> f64 {
    if secs > 0.0 { amount / secs } else { 0.0 }
}
