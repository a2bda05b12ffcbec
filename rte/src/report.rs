//! Result records and the table printer behind `Rte::report`.

use std::io::{self, Write};

use bitflags::bitflags;
use tracing::warn;

use crate::config::{RunConfig, TestCommand, TestType};

/// Latency figures in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Latency {
    /// Most recent measurement.
    pub typical: f64,
    /// Average since the previous report.
    pub moment_average: f64,
    /// Average over the whole run.
    pub total_average: f64,
}

/// Throughput figures, per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rate {
    pub moment_average: f64,
    pub total_average: f64,
}

/// Statistics produced by a test engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfResult {
    pub iters: u64,
    pub latency: Latency,
    /// Bytes per second.
    pub bandwidth: Rate,
    /// Messages per second.
    pub msgrate: Rate,
}

bitflags! {
    /// What a peer prints. Decided once, when the exchange is set up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrintFlags: u32 {
        /// Result table header, live progress lines and the final line.
        const PRINT_RESULTS = 1 << 0;
        /// Test description box.
        const PRINT_TEST = 1 << 1;
    }
}

const RULE: &str =
    "+------------------------------------------------------------------------------------------+";

/// Renders results to a sink according to the peer's print flags.
pub struct Reporter {
    flags: PrintFlags,
    out: Box<dyn Write + Send>,
}

impl Reporter {
    /// Reporter writing to stdout.
    pub fn new(flags: PrintFlags) -> Self {
        Self::with_writer(flags, io::stdout())
    }

    pub fn with_writer(flags: PrintFlags, out: impl Write + Send + 'static) -> Self {
        Self {
            flags,
            out: Box::new(out),
        }
    }

    pub fn flags(&self) -> PrintFlags {
        self.flags
    }

    /// Print one progress line. Write failures are logged, not returned.
    pub fn progress(&mut self, result: &PerfResult) {
        if !self.flags.contains(PrintFlags::PRINT_RESULTS) {
            return;
        }
        if let Err(e) = self.write_progress(result) {
            warn!("failed to print progress: {}", e);
        }
    }

    /// Print the test description and/or the result table header.
    pub fn header(&mut self, config: &RunConfig) {
        if let Err(e) = self.write_header(config) {
            warn!("failed to print header: {}", e);
        }
    }

    /// Print the overall line after the run.
    pub fn footer(&mut self, result: &PerfResult) {
        if !self.flags.contains(PrintFlags::PRINT_RESULTS) {
            return;
        }
        let written = writeln!(
            self.out,
            "+Overall-------+---------+---------+---------+----------+----------+-----------+-----------+"
        )
        .and_then(|()| self.write_progress(result));
        if let Err(e) = written {
            warn!("failed to print footer: {}", e);
        }
    }

    fn write_progress(&mut self, result: &PerfResult) -> io::Result<()> {
        const MB: f64 = 1024.0 * 1024.0;
        writeln!(
            self.out,
            "{:14.0} {:9.3} {:9.3} {:9.3} {:10.2} {:10.2} {:11.0} {:11.0}",
            result.iters as f64,
            result.latency.typical * 1e6,
            result.latency.moment_average * 1e6,
            result.latency.total_average * 1e6,
            result.bandwidth.moment_average / MB,
            result.bandwidth.total_average / MB,
            result.msgrate.moment_average,
            result.msgrate.total_average,
        )?;
        self.out.flush()
    }

    fn write_header(&mut self, config: &RunConfig) -> io::Result<()> {
        let command = match config.command {
            Some(TestCommand::AmShort) => "uct_am_short()",
            Some(TestCommand::PutShort) => "uct_put_short()",
            None => "(undefined)",
        };
        let test_type = match config.test_type {
            Some(TestType::PingPong) => "Ping-pong",
            Some(TestType::StreamUni) => "Stream unidirectional",
            None => "(undefined)",
        };

        if self.flags.contains(PrintFlags::PRINT_TEST) {
            writeln!(self.out, "{}", RULE)?;
            writeln!(self.out, "| API:          {:<60}               |", command)?;
            writeln!(self.out, "| Test type:    {:<60}               |", test_type)?;
            writeln!(
                self.out,
                "| Message size: {:<60}               |",
                config.message_size
            )?;
        }

        if self.flags.contains(PrintFlags::PRINT_RESULTS) {
            writeln!(self.out, "+--------------+-----------------------------+---------------------+-----------------------+")?;
            writeln!(self.out, "|              |       latency (usec)        |   bandwidth (MB/s)  |  message rate (msg/s) |")?;
            writeln!(self.out, "+--------------+---------+---------+---------+----------+----------+-----------+-----------+")?;
            writeln!(self.out, "| # iterations | typical | average | overall |  average |  overall |   average |   overall |")?;
            writeln!(self.out, "+--------------+---------+---------+---------+----------+----------+-----------+-----------+")?;
        } else if self.flags.contains(PrintFlags::PRINT_TEST) {
            writeln!(self.out, "{}", RULE)?;
        }
        self.out.flush()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
