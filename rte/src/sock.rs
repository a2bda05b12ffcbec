//! Two-peer exchange over a single TCP connection.
//!
//! Setup is asymmetric. The server listens, accepts one peer and adopts
//! the configuration the client sends. The client must hold a fully
//! specified configuration before it connects.
//!
//! Handshake (client -> server), each block an exact fixed-size transfer:
//! ```text
//! +----------------------+------------------+---------------------+
//! | params (64 B)        | device (64 B)    | transport (64 B)    |
//! +----------------------+------------------+---------------------+
//! ```

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::{fmt, io};

use tracing::{debug, info, warn};

use crate::config::{MAX_NAME_LEN, Name, PARAMS_WIRE_SIZE, RunConfig};
use crate::error::{Error, Result};
use crate::mailbox::SelfMailbox;
use crate::report::{PrintFlags, Reporter};
use crate::transfer::{recv_exact, send_exact};
use crate::{Role, Rte};

/// Sentinel both peers exchange at every barrier.
pub const BARRIER_MAGIC: u32 = 0xdead_beef;

/// Exchange group backed by one byte-stream channel.
///
/// Dropping the group closes the channel and frees the self-mailbox.
pub struct SocketExchange<C = TcpStream> {
    role: Role,
    channel: C,
    mailbox: SelfMailbox,
    reporter: Reporter,
}

impl SocketExchange<TcpStream> {
    /// Listen on `port`, accept one client and receive its configuration.
    pub fn listen(port: u16) -> Result<(Self, RunConfig)> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .map_err(|source| Error::Bind { port, source })?;
        info!("Waiting for connection on port {}...", port);
        Self::accept(&listener)
    }

    /// Accept one client on an already bound listener.
    pub fn accept(listener: &TcpListener) -> Result<(Self, RunConfig)> {
        let (stream, peer) = listener.accept().map_err(Error::Accept)?;
        info!("accepted connection from {}", peer);
        set_nodelay(&stream);
        Self::serve(stream)
    }

    /// Validate `config`, connect to `host:port` and send the configuration.
    pub fn connect(host: &str, port: u16, config: &RunConfig) -> Result<Self> {
        config.validate()?;

        let addr = resolve(host, port)?;
        let stream =
            TcpStream::connect(addr).map_err(|source| Error::Connect { addr, source })?;
        info!("connected to {}", addr);
        set_nodelay(&stream);
        Self::initiate(stream, config)
    }
}

impl<C: Read + Write> SocketExchange<C> {
    /// Server half of the handshake over an established channel.
    pub fn serve(mut channel: C) -> Result<(Self, RunConfig)> {
        let mut params = [0u8; PARAMS_WIRE_SIZE];
        let mut device = [0u8; MAX_NAME_LEN];
        let mut transport = [0u8; MAX_NAME_LEN];
        recv_exact(&mut channel, &mut params)?;
        recv_exact(&mut channel, &mut device)?;
        recv_exact(&mut channel, &mut transport)?;

        let config =
            RunConfig::from_wire(&params, Name::from_bytes(device), Name::from_bytes(transport))?;
        debug!(?config, "received run configuration");

        let group = Self::new(Role::Server, channel, Reporter::new(PrintFlags::PRINT_TEST));
        Ok((group, config))
    }

    /// Client half of the handshake over an established channel.
    pub fn initiate(mut channel: C, config: &RunConfig) -> Result<Self> {
        config.validate()?;

        send_exact(&mut channel, &config.params_to_wire())?;
        send_exact(&mut channel, config.device.as_bytes())?;
        send_exact(&mut channel, config.transport.as_bytes())?;
        debug!(?config, "sent run configuration");

        Ok(Self::new(
            Role::Client,
            channel,
            Reporter::new(PrintFlags::PRINT_RESULTS),
        ))
    }

    fn new(role: Role, channel: C, reporter: Reporter) -> Self {
        Self {
            role,
            channel,
            mailbox: SelfMailbox::new(),
            reporter,
        }
    }

    /// Replace the reporter, keeping the print flags chosen at setup.
    pub fn with_writer(mut self, out: impl Write + Send + 'static) -> Self {
        self.reporter = Reporter::with_writer(self.reporter.flags(), out);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes sent to self and not yet received.
    pub fn pending_self_bytes(&self) -> usize {
        self.mailbox.len()
    }

    fn peer(&self) -> u32 {
        1 - self.role.rank()
    }

    fn check_rank(&self, rank: u32) -> Result<()> {
        if rank < 2 {
            Ok(())
        } else {
            Err(Error::InvalidRank { rank, size: 2 })
        }
    }
}

impl<C: Read + Write> Rte for SocketExchange<C> {
    fn group_size(&self) -> u32 {
        2
    }

    fn group_index(&self) -> u32 {
        self.role.rank()
    }

    fn barrier(&mut self) -> Result<()> {
        send_exact(&mut self.channel, &BARRIER_MAGIC.to_le_bytes())?;

        let mut sync = [0u8; 4];
        recv_exact(&mut self.channel, &mut sync)?;
        let got = u32::from_le_bytes(sync);
        if got != BARRIER_MAGIC {
            return Err(Error::BarrierMismatch {
                expected: BARRIER_MAGIC,
                got,
            });
        }
        Ok(())
    }

    fn send(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        self.check_rank(dest)?;
        if dest == self.group_index() {
            self.mailbox.push(data);
            Ok(())
        } else {
            send_exact(&mut self.channel, data)
        }
    }

    fn recv(&mut self, src: u32, buf: &mut [u8]) -> Result<()> {
        self.check_rank(src)?;
        if src == self.peer() {
            recv_exact(&mut self.channel, buf)
        } else {
            self.mailbox.pop_into(buf)
        }
    }

    fn reporter(&mut self) -> &mut Reporter {
        &mut self.reporter
    }
}

impl<C> fmt::Debug for SocketExchange<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketExchange")
            .field("role", &self.role)
            .field("pending_self_bytes", &self.mailbox.len())
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

/// Resolve `host:port`, preferring an IPv4 address.
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Resolve {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        })
}

fn set_nodelay(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("setsockopt(TCP_NODELAY) failed: {}", e);
    }
}
