//! In-memory transport for exercising the engine without hardware.
//!
//! A [`LoopbackLink`] plays the part of one serial port; its paired
//! [`LoopbackRemote`] is held by the test and plays the device on the far
//! end of that port: bytes the remote feeds show up as the link's input,
//! bytes the engine writes accumulate on the remote's output.

use crate::{LinkError, LinkResult, Transport};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Read timeout of the in-memory link, kept short for fast tests.
const LOOPBACK_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Wires {
    /// Bytes waiting to be read by the engine.
    rx: Mutex<VecDeque<u8>>,
    /// Bytes written by the engine.
    tx: Mutex<Vec<u8>>,
    /// When set, every transport operation fails.
    broken: AtomicBool,
}

/// Engine-side half of an in-memory duplex channel.
#[derive(Debug)]
pub struct LoopbackLink {
    wires: Arc<Wires>,
    name: String,
}

/// Test-side half of an in-memory duplex channel.
#[derive(Debug, Clone)]
pub struct LoopbackRemote {
    wires: Arc<Wires>,
}

impl LoopbackLink {
    /// Create a link and the remote driving its far end.
    #[must_use]
    pub fn pair(name: impl Into<String>) -> (Self, LoopbackRemote) {
        let wires = Arc::new(Wires::default());
        (
            Self {
                wires: Arc::clone(&wires),
                name: name.into(),
            },
            LoopbackRemote { wires },
        )
    }

    fn check_broken(&self) -> LinkResult<()> {
        if self.wires.broken.load(Ordering::Acquire) {
            Err(LinkError::Read(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "loopback link broken",
            )))
        } else {
            Ok(())
        }
    }
}

impl Transport for LoopbackLink {
    fn pending(&mut self) -> LinkResult<usize> {
        self.check_broken()?;
        Ok(self.wires.rx.lock().expect("loopback rx poisoned").len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> LinkResult<()> {
        let deadline = Instant::now() + LOOPBACK_TIMEOUT;
        let mut filled = 0;
        while filled < buf.len() {
            self.check_broken()?;
            {
                let mut rx = self.wires.rx.lock().expect("loopback rx poisoned");
                while filled < buf.len() {
                    match rx.pop_front() {
                        Some(byte) => {
                            buf[filled] = byte;
                            filled += 1;
                        }
                        None => break,
                    }
                }
            }
            if filled < buf.len() {
                if Instant::now() >= deadline {
                    return Err(LinkError::Read(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "loopback read timed out",
                    )));
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> LinkResult<()> {
        self.check_broken()
            .map_err(|_| LinkError::Write(io::Error::new(io::ErrorKind::BrokenPipe, "broken")))?;
        self.wires
            .tx
            .lock()
            .expect("loopback tx poisoned")
            .extend_from_slice(bytes);
        Ok(())
    }

    fn flush_input(&mut self) -> LinkResult<()> {
        self.check_broken()
            .map_err(|_| LinkError::Flush(serialport::Error::new(
                serialport::ErrorKind::Io(io::ErrorKind::BrokenPipe),
                "broken",
            )))?;
        self.wires.rx.lock().expect("loopback rx poisoned").clear();
        Ok(())
    }

    fn label(&self) -> &str {
        &self.name
    }
}

impl LoopbackRemote {
    /// Make `bytes` available on the link's input.
    pub fn feed(&self, bytes: &[u8]) {
        self.wires
            .rx
            .lock()
            .expect("loopback rx poisoned")
            .extend(bytes.iter().copied());
    }

    /// Drain everything the engine has written so far.
    #[must_use]
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.wires.tx.lock().expect("loopback tx poisoned"))
    }

    /// Bytes the engine has written and the test has not yet drained.
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.wires.tx.lock().expect("loopback tx poisoned").len()
    }

    /// Bytes fed but not yet consumed by the engine.
    #[must_use]
    pub fn unread_len(&self) -> usize {
        self.wires.rx.lock().expect("loopback rx poisoned").len()
    }

    /// Make every subsequent transport operation fail, simulating a
    /// yanked cable.
    pub fn break_link(&self) {
        self.wires.broken.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_and_read() {
        let (mut link, remote) = LoopbackLink::pair("test");
        remote.feed(&[1, 2, 3]);
        assert_eq!(link.pending().unwrap(), 3);

        let mut buf = [0u8; 3];
        link.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(link.pending().unwrap(), 0);
    }

    #[test]
    fn test_write_and_take() {
        let (mut link, remote) = LoopbackLink::pair("test");
        link.write_all(&[0xAA, 0x03]).unwrap();
        link.write_all(&[0x00]).unwrap();
        assert_eq!(remote.take_output(), vec![0xAA, 0x03, 0x00]);
        assert!(remote.take_output().is_empty());
    }

    #[test]
    fn test_flush_input() {
        let (mut link, remote) = LoopbackLink::pair("test");
        remote.feed(&[9, 9, 9]);
        link.flush_input().unwrap();
        assert_eq!(link.pending().unwrap(), 0);
    }

    #[test]
    fn test_read_times_out_without_data() {
        let (mut link, _remote) = LoopbackLink::pair("test");
        let mut buf = [0u8; 1];
        assert!(link.read_exact(&mut buf).is_err());
    }

    #[test]
    fn test_broken_link_fails_everything() {
        let (mut link, remote) = LoopbackLink::pair("test");
        remote.break_link();
        assert!(link.pending().is_err());
        assert!(link.write_all(&[0]).is_err());
        assert!(link.flush_input().is_err());
    }
}
