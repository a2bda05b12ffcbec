//! Peer-local buffer for messages a rank sends to itself.

use crate::error::{Error, Result};

/// Consumed bytes are reclaimed once at least this many have accumulated.
const COMPACT_THRESHOLD: usize = 4096;

/// Byte queue: `push` appends at the tail, `pop_into` consumes from the head.
///
/// Consumed space is reclaimed lazily, so the backing buffer stays within
/// twice the live size (plus `COMPACT_THRESHOLD`).
#[derive(Debug, Default)]
pub struct SelfMailbox {
    buf: Vec<u8>,
    head: usize,
}

impl SelfMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes appended and not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `data` at the tail.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Move the first `out.len()` buffered bytes into `out`.
    ///
    /// Fails without consuming anything when fewer bytes are buffered.
    pub fn pop_into(&mut self, out: &mut [u8]) -> Result<()> {
        let available = self.len();
        if out.len() > available {
            return Err(Error::MailboxUnderflow {
                requested: out.len(),
                available,
            });
        }

        out.copy_from_slice(&self.buf[self.head..self.head + out.len()]);
        self.head += out.len();

        if self.head == self.buf.len() {
            self.buf.clear();
            self.head = 0;
        } else if self.head >= COMPACT_THRESHOLD && self.head * 2 >= self.buf.len() {
            self.buf.drain(..self.head);
            self.head = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut mailbox = SelfMailbox::new();
        mailbox.push(b"hello ");
        mailbox.push(b"world");
        assert_eq!(mailbox.len(), 11);

        let mut first = [0u8; 3];
        mailbox.pop_into(&mut first).unwrap();
        assert_eq!(&first, b"hel");

        let mut rest = [0u8; 8];
        mailbox.pop_into(&mut rest).unwrap();
        assert_eq!(&rest, b"lo world");
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_underflow_consumes_nothing() {
        let mut mailbox = SelfMailbox::new();
        mailbox.push(&[1, 2, 3]);

        let mut buf = [0u8; 4];
        match mailbox.pop_into(&mut buf) {
            Err(Error::MailboxUnderflow {
                requested: 4,
                available: 3,
            }) => {}
            other => panic!("expected MailboxUnderflow, got {:?}", other),
        }
        assert_eq!(mailbox.len(), 3);

        let mut buf = [0u8; 3];
        mailbox.pop_into(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_empty_pop_on_empty_mailbox() {
        let mut mailbox = SelfMailbox::new();
        mailbox.pop_into(&mut []).unwrap();
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_compaction_keeps_content() {
        let mut mailbox = SelfMailbox::new();
        let mut expected = 0u8;
        let mut next = 0u8;

        // Keep a small backlog while streaming far more than the threshold.
        for _ in 0..COMPACT_THRESHOLD {
            let chunk: Vec<u8> = (0..3)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            mailbox.push(&chunk);

            let mut out = [0u8; 2];
            mailbox.pop_into(&mut out).unwrap();
            for b in out {
                expected = expected.wrapping_add(1);
                assert_eq!(b, expected);
            }
            assert!(mailbox.buf.len() <= 2 * mailbox.len() + COMPACT_THRESHOLD + 3);
        }
        assert_eq!(mailbox.len(), COMPACT_THRESHOLD);
    }
}
