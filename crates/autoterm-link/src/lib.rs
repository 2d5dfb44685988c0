//! Byte-duplex transports for the Autoterm gateway.
//!
//! This crate provides:
//! - [`Transport`] trait abstracting one side of the passthrough
//! - [`serial`] module with the `serialport`-backed link and USB locator
//! - [`loopback`] module with an in-memory pair for tests
//!
//! Transport errors carry no recovery logic of their own; the engine treats
//! any of them as a disconnect and re-opens both sides through its
//! [`LinkOpener`].

pub mod loopback;
pub mod serial;

pub use loopback::*;
pub use serial::*;

use thiserror::Error;

/// Errors surfaced by transports and openers.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Opening a port failed.
    #[error("failed to open {port}: {source}")]
    Open {
        /// Device path of the port.
        port: String,
        /// Underlying serial error.
        #[source]
        source: serialport::Error,
    },

    /// Port lookup by locator failed.
    #[error("port lookup failed: {0}")]
    Locate(String),

    /// A read did not complete.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// A write did not complete.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Querying the input queue depth failed.
    #[error("peek failed: {0}")]
    Peek(#[source] serialport::Error),

    /// Flushing the input queue failed.
    #[error("flush failed: {0}")]
    Flush(#[source] serialport::Error),
}

/// Convenience alias for transport operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// One byte-duplex side of the passthrough.
///
/// All blocking operations are bounded by the transport's I/O timeout
/// (0.5 s for serial links). Any error marks the side as dead; the engine
/// responds by closing and re-opening both sides.
pub trait Transport: Send {
    /// Number of bytes waiting in the input queue.
    fn pending(&mut self) -> LinkResult<usize>;

    /// Read exactly `buf.len()` bytes, blocking up to the I/O timeout.
    fn read_exact(&mut self, buf: &mut [u8]) -> LinkResult<()>;

    /// Write all of `bytes`, blocking up to the I/O timeout.
    fn write_all(&mut self, bytes: &[u8]) -> LinkResult<()>;

    /// Discard everything currently waiting in the input queue.
    fn flush_input(&mut self) -> LinkResult<()>;

    /// Human-readable name for log lines (device path or test label).
    fn label(&self) -> &str;
}

/// Opens (and re-opens) the two sides of the passthrough.
///
/// The order of the returned pair is arbitrary: role binding downstream is
/// driven by observed traffic, not by slot.
pub trait LinkOpener: Send {
    /// Open both transports, failing if either side cannot be opened.
    fn open_pair(&mut self) -> LinkResult<(Box<dyn Transport>, Box<dyn Transport>)>;
}
