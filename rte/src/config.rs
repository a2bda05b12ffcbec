//! Run configuration negotiated between the two peers.
//!
//! The configuration travels as three fixed-size blocks with no framing:
//! the 64-byte parameter block, then the device name, then the transport
//! name. Both peers agree on the sizes because they build against the same
//! layout.

use std::borrow::Cow;
use std::fmt;

use crate::error::ConfigError;

/// Size of a NUL-padded name block on the wire.
pub const MAX_NAME_LEN: usize = 64;

/// Size of the parameter block on the wire.
pub const PARAMS_WIRE_SIZE: usize = 64;

/// Default TCP port for the socket exchange.
pub const DEFAULT_PORT: u16 = 13337;

/// Wire code for an unset selector.
const UNSET: u32 = u32::MAX;

/// Operation exercised by the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCommand {
    AmShort,
    PutShort,
}

/// Traffic pattern of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    PingPong,
    StreamUni,
}

/// How message payloads are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataLayout {
    #[default]
    Buffer,
}

/// How the engine waits for completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    Poll,
    Sleep,
}

/// Maps a selector to and from its wire code.
trait Selector: Sized + Copy + 'static {
    const FIELD: &'static str;
    const ALL: &'static [Self];

    fn code(self) -> u32;

    fn from_code(value: u32) -> Result<Self, ConfigError> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.code() == value)
            .ok_or(ConfigError::UnknownSelector {
                field: Self::FIELD,
                value,
            })
    }
}

impl Selector for TestCommand {
    const FIELD: &'static str = "command";
    const ALL: &'static [Self] = &[TestCommand::AmShort, TestCommand::PutShort];

    fn code(self) -> u32 {
        match self {
            TestCommand::AmShort => 0,
            TestCommand::PutShort => 1,
        }
    }
}

impl Selector for TestType {
    const FIELD: &'static str = "test type";
    const ALL: &'static [Self] = &[TestType::PingPong, TestType::StreamUni];

    fn code(self) -> u32 {
        match self {
            TestType::PingPong => 0,
            TestType::StreamUni => 1,
        }
    }
}

impl Selector for DataLayout {
    const FIELD: &'static str = "data layout";
    const ALL: &'static [Self] = &[DataLayout::Buffer];

    fn code(self) -> u32 {
        match self {
            DataLayout::Buffer => 0,
        }
    }
}

impl Selector for WaitMode {
    const FIELD: &'static str = "wait mode";
    const ALL: &'static [Self] = &[WaitMode::Poll, WaitMode::Sleep];

    fn code(self) -> u32 {
        match self {
            WaitMode::Poll => 0,
            WaitMode::Sleep => 1,
        }
    }
}

fn optional_code<S: Selector>(selector: Option<S>) -> u32 {
    selector.map_or(UNSET, S::code)
}

fn optional_from_code<S: Selector>(value: u32) -> Result<Option<S>, ConfigError> {
    if value == UNSET {
        Ok(None)
    } else {
        S::from_code(value).map(Some)
    }
}

/// Fixed-size, NUL-padded name buffer (device or transport).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Name([u8; MAX_NAME_LEN]);

impl Name {
    /// Empty name.
    pub const EMPTY: Name = Name([0; MAX_NAME_LEN]);

    /// Build a name. The text may not contain a NUL, and at least one
    /// trailing NUL must remain.
    pub fn new(s: &str) -> Result<Self, ConfigError> {
        let bytes = s.as_bytes();
        if bytes.len() >= MAX_NAME_LEN {
            return Err(ConfigError::NameTooLong(s.to_string()));
        }
        if bytes.contains(&0) {
            return Err(ConfigError::NameContainsNul(s.to_string()));
        }
        let mut buf = [0u8; MAX_NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Name(buf))
    }

    /// Wrap a raw block received from the wire.
    pub fn from_bytes(bytes: [u8; MAX_NAME_LEN]) -> Self {
        Name(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAX_NAME_LEN] {
        &self.0
    }

    /// Text up to the first NUL.
    pub fn as_str(&self) -> Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        String::from_utf8_lossy(&self.0[..end])
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Default for Name {
    fn default() -> Self {
        Name::EMPTY
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Parameters of one test run.
///
/// The client is authoritative: the server adopts whatever the client sent
/// during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub command: Option<TestCommand>,
    pub test_type: Option<TestType>,
    pub data_layout: DataLayout,
    pub wait_mode: Option<WaitMode>,
    pub warmup_iter: u64,
    pub message_size: u64,
    pub alignment: u64,
    pub max_iter: u64,
    /// Seconds; zero means no time limit.
    pub max_time: f64,
    /// Seconds between progress reports.
    pub report_interval: f64,
    pub device: Name,
    pub transport: Name,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            command: None,
            test_type: None,
            data_layout: DataLayout::Buffer,
            wait_mode: None,
            warmup_iter: 10_000,
            message_size: 8,
            alignment: page_size(),
            max_iter: 1_000_000,
            max_time: 0.0,
            report_interval: 1.0,
            device: Name::EMPTY,
            transport: Name::EMPTY,
        }
    }
}

impl RunConfig {
    /// Check that the test, device and transport are all specified.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_none() || self.test_type.is_none() {
            return Err(ConfigError::MissingTestType);
        }
        if self.device.is_empty() {
            return Err(ConfigError::MissingDevice);
        }
        if self.transport.is_empty() {
            return Err(ConfigError::MissingTransport);
        }
        Ok(())
    }

    /// Encode the parameter block.
    pub fn params_to_wire(&self) -> [u8; PARAMS_WIRE_SIZE] {
        let mut buf = [0u8; PARAMS_WIRE_SIZE];
        buf[0..4].copy_from_slice(&optional_code(self.command).to_le_bytes());
        buf[4..8].copy_from_slice(&optional_code(self.test_type).to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_layout.code().to_le_bytes());
        buf[12..16].copy_from_slice(&optional_code(self.wait_mode).to_le_bytes());
        buf[16..24].copy_from_slice(&self.warmup_iter.to_le_bytes());
        buf[24..32].copy_from_slice(&self.message_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.alignment.to_le_bytes());
        buf[40..48].copy_from_slice(&self.max_iter.to_le_bytes());
        buf[48..56].copy_from_slice(&self.max_time.to_bits().to_le_bytes());
        buf[56..64].copy_from_slice(&self.report_interval.to_bits().to_le_bytes());
        buf
    }

    /// Rebuild a configuration from the three handshake blocks.
    pub fn from_wire(
        params: &[u8; PARAMS_WIRE_SIZE],
        device: Name,
        transport: Name,
    ) -> Result<Self, ConfigError> {
        let u32_at = |off: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&params[off..off + 4]);
            u32::from_le_bytes(b)
        };
        let u64_at = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&params[off..off + 8]);
            u64::from_le_bytes(b)
        };

        Ok(Self {
            command: optional_from_code(u32_at(0))?,
            test_type: optional_from_code(u32_at(4))?,
            data_layout: DataLayout::from_code(u32_at(8))?,
            wait_mode: optional_from_code(u32_at(12))?,
            warmup_iter: u64_at(16),
            message_size: u64_at(24),
            alignment: u64_at(32),
            max_iter: u64_at(40),
            max_time: f64::from_bits(u64_at(48)),
            report_interval: f64::from_bits(u64_at(56)),
            device,
            transport,
        })
    }
}

/// System page size, used as the default buffer alignment.
pub fn page_size() -> u64 {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret > 0 { ret as u64 } else { 4096 }
}
