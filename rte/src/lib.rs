//! Runtime exchange (RTE) for two-peer transport performance tests.
//!
//! A test engine coordinates with its peer only through the [`Rte`] trait:
//! group membership, barriers, point-to-point byte transfers and progress
//! reporting. Two realizations exist:
//!
//! - [`SocketExchange`]: a single TCP connection between a listening server
//!   (rank 0) and a connecting client (rank 1). The client sends the run
//!   configuration during setup.
//! - `MpiExchange` (feature `mpi`): the same contract mapped onto an MPI
//!   communicator, for runs under a batch job launcher.
//!
//! All operations block. One thread drives a group at a time.

pub mod config;
pub mod engine;
pub mod error;
pub mod mailbox;
#[cfg(feature = "mpi")]
pub mod mpi_rte;
pub mod report;
pub mod sock;
pub mod transfer;

pub use config::{
    DEFAULT_PORT, DataLayout, MAX_NAME_LEN, Name, RunConfig, TestCommand, TestType, WaitMode,
};
pub use engine::{ExchangeEngine, PerfEngine, Resource};
pub use error::{ConfigError, Error, Result};
pub use mailbox::SelfMailbox;
#[cfg(feature = "mpi")]
pub use mpi_rte::MpiExchange;
pub use report::{Latency, PerfResult, PrintFlags, Rate, Reporter};
pub use sock::{BARRIER_MAGIC, SocketExchange};

/// Role of a peer in the two-peer socket exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted the connection; rank 0.
    Server,
    /// Initiated the connection; rank 1.
    Client,
}

impl Role {
    pub fn rank(self) -> u32 {
        match self {
            Role::Server => 0,
            Role::Client => 1,
        }
    }
}

/// Collective and point-to-point contract the test engine runs against.
pub trait Rte {
    /// Number of peers in the group.
    fn group_size(&self) -> u32;

    /// This peer's rank, in `0..group_size()`.
    fn group_index(&self) -> u32;

    /// Block until every peer in the group has entered the barrier.
    fn barrier(&mut self) -> Result<()>;

    /// Send `data` to peer `dest`. Sending to one's own rank is allowed.
    fn send(&mut self, dest: u32, data: &[u8]) -> Result<()>;

    /// Fill `buf` with exactly `buf.len()` bytes from peer `src`.
    fn recv(&mut self, src: u32, buf: &mut [u8]) -> Result<()>;

    /// Printer configured for this peer at setup.
    fn reporter(&mut self) -> &mut Reporter;

    /// Progress hook called by the engine during and after the run.
    fn report(&mut self, result: &PerfResult) {
        self.reporter().progress(result);
    }
}
