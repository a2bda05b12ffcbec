//! Exact-byte transfers over a reliable byte stream.
//!
//! Partial reads and writes are retried until the full count has moved.
//! Any error from the underlying primitive aborts the transfer; nothing is
//! retried at the message level.

use std::io::{Read, Write};

use tracing::error;

use crate::error::{Error, Result};

/// Write all of `data` to the channel.
pub fn send_exact<W: Write + ?Sized>(channel: &mut W, data: &[u8]) -> Result<()> {
    let mut total = 0;
    while total < data.len() {
        match channel.write(&data[total..]) {
            Ok(0) => {
                error!("send(): channel closed after {} of {} bytes", total, data.len());
                return Err(Error::Closed {
                    op: "send",
                    transferred: total,
                    expected: data.len(),
                });
            }
            Ok(n) => total += n,
            Err(e) => {
                error!("send() failed: {}", e);
                return Err(Error::Channel {
                    op: "send",
                    source: e,
                });
            }
        }
    }
    Ok(())
}

/// Fill all of `buf` from the channel.
pub fn recv_exact<R: Read + ?Sized>(channel: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut total = 0;
    while total < buf.len() {
        match channel.read(&mut buf[total..]) {
            Ok(0) => {
                error!("recv(): channel closed after {} of {} bytes", total, buf.len());
                return Err(Error::Closed {
                    op: "recv",
                    transferred: total,
                    expected: buf.len(),
                });
            }
            Ok(n) => total += n,
            Err(e) => {
                error!("recv() failed: {}", e);
                return Err(Error::Channel {
                    op: "recv",
                    source: e,
                });
            }
        }
    }
    Ok(())
}
