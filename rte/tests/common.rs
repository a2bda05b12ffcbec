//! Common test utilities for rte integration tests.

// Test utilities may not all be used in every test file
#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rte::{Name, RunConfig, SocketExchange, TestCommand, TestType};

/// Connected loopback TCP pair: (accepted side, connecting side).
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (server, client)
}

/// Client configuration used across tests: am_lat, 8-byte messages.
pub fn client_config() -> RunConfig {
    RunConfig {
        command: Some(TestCommand::AmShort),
        test_type: Some(TestType::PingPong),
        message_size: 8,
        max_iter: 1_000_000,
        device: Name::new("dev0").unwrap(),
        transport: Name::new("tcp0").unwrap(),
        ..RunConfig::default()
    }
}

/// Run both handshake halves over a loopback pair.
///
/// Returns (server group, configuration the server received, client group).
pub fn connected_pair(
    config: &RunConfig,
) -> (SocketExchange, RunConfig, SocketExchange) {
    let (server_stream, client_stream) = tcp_pair();
    let config = config.clone();
    let client = thread::spawn(move || SocketExchange::initiate(client_stream, &config).unwrap());
    let (server, received) = SocketExchange::serve(server_stream).unwrap();
    (server, received, client.join().unwrap())
}

/// Shared in-memory output sink.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory channel that fails once `budget` bytes have moved and records
/// when it is dropped.
pub struct FailingChannel {
    incoming: io::Cursor<Vec<u8>>,
    pub written: Vec<u8>,
    budget: usize,
    closed: Arc<AtomicBool>,
}

impl FailingChannel {
    pub fn new(incoming: Vec<u8>, budget: usize) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let channel = Self {
            incoming: io::Cursor::new(incoming),
            written: Vec::new(),
            budget,
            closed: closed.clone(),
        };
        (channel, closed)
    }

    fn take_budget(&mut self, want: usize) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        let n = want.min(self.budget);
        self.budget -= n;
        Ok(n)
    }
}

impl Read for FailingChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.take_budget(buf.len())?;
        self.incoming.read(&mut buf[..n])
    }
}

impl Write for FailingChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.take_budget(buf.len())?;
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FailingChannel {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
