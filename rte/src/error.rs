//! Error types for the runtime exchange.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::MAX_NAME_LEN;

/// Runtime exchange errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying channel primitive failed mid-transfer.
    #[error("{op}() failed: {source}")]
    Channel {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    /// The peer closed the channel before the full byte count was moved.
    #[error("{op}(): peer closed the channel after {transferred} of {expected} bytes")]
    Closed {
        op: &'static str,
        transferred: usize,
        expected: usize,
    },
    /// Hostname lookup failed or yielded no address.
    #[error("host {host} not found: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    /// Binding or listening on the exchange port failed.
    #[error("bind() on port {port} failed: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Accepting the peer connection failed.
    #[error("accept() failed: {0}")]
    Accept(#[source] io::Error),
    /// Connecting to the server failed.
    #[error("connect() to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Run configuration is incomplete or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The peer answered a barrier with a different sentinel.
    #[error("barrier sentinel mismatch: expected {expected:#x}, got {got:#x}")]
    BarrierMismatch { expected: u32, got: u32 },
    /// A self-addressed receive asked for more bytes than were sent to self.
    #[error("self-mailbox underflow: requested {requested} bytes, {available} buffered")]
    MailboxUnderflow { requested: usize, available: usize },
    /// Rank does not belong to the group.
    #[error("rank {rank} is outside the group of size {size}")]
    InvalidRank { rank: u32, size: u32 },
    /// The test engine could not run the requested test.
    #[error("test failed: {0}")]
    Test(String),
}

/// Run configuration errors.
///
/// Missing-field variants are raised before any network activity; selector
/// variants come from decoding a peer's handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("must specify test type")]
    MissingTestType,
    #[error("must specify device name")]
    MissingDevice,
    #[error("must specify transport")]
    MissingTransport,
    #[error("name `{0}` does not fit in {max} bytes", max = MAX_NAME_LEN)]
    NameTooLong(String),
    #[error("name `{0}` contains a NUL byte")]
    NameContainsNul(String),
    #[error("unknown {field} selector {value}")]
    UnknownSelector { field: &'static str, value: u32 },
}

/// Result type for runtime exchange operations.
pub type Result<T> = std::result::Result<T, Error>;
