//! Serial transports over the `serialport` crate.
//!
//! The heater bus runs at 2400 baud 8-N-1. Ports are found either by
//! explicit device paths or by the serial-number string of the USB adapter
//! carrying both UARTs; in the latter case the two ports come back in
//! unspecified order and the engine assigns roles from observed traffic.

use crate::{LinkError, LinkOpener, LinkResult, Transport};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::info;

/// Default line rate of the heater bus.
pub const DEFAULT_BAUD: u32 = 2400;

/// Bound on every blocking read or write.
pub const IO_TIMEOUT: Duration = Duration::from_millis(500);

/// How the two ports are identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortLocator {
    /// Two explicit device paths.
    Paths {
        /// First device path.
        a: String,
        /// Second device path.
        b: String,
    },
    /// USB serial-number string resolving to exactly two ports.
    UsbSerial(String),
}

impl PortLocator {
    /// Resolve the locator to two device paths.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Locate`] if enumeration fails or the serial
    /// number does not match exactly two ports.
    pub fn resolve(&self) -> LinkResult<(String, String)> {
        match self {
            Self::Paths { a, b } => Ok((a.clone(), b.clone())),
            Self::UsbSerial(serial_num) => {
                let ports = serialport::available_ports()
                    .map_err(|e| LinkError::Locate(format!("port enumeration failed: {e}")))?;
                let matching: Vec<String> = ports
                    .into_iter()
                    .filter(|p| match &p.port_type {
                        SerialPortType::UsbPort(usb) => {
                            usb.serial_number.as_deref() == Some(serial_num.as_str())
                        }
                        _ => false,
                    })
                    .map(|p| p.port_name)
                    .collect();
                match <[String; 2]>::try_from(matching) {
                    Ok([a, b]) => Ok((a, b)),
                    Err(matching) => Err(LinkError::Locate(format!(
                        "serial number {serial_num} matched {} ports, expected 2",
                        matching.len()
                    ))),
                }
            }
        }
    }
}

/// Serial line parameters for the two sides.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// How to find the two ports.
    pub locator: PortLocator,
    /// Baud rate of the first port.
    pub baud_a: u32,
    /// Baud rate of the second port.
    pub baud_b: u32,
}

impl SerialConfig {
    /// Configuration for two explicit paths at the default baud rate.
    #[must_use]
    pub fn paths(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            locator: PortLocator::Paths {
                a: a.into(),
                b: b.into(),
            },
            baud_a: DEFAULT_BAUD,
            baud_b: DEFAULT_BAUD,
        }
    }

    /// Configuration resolving both ports by USB serial number.
    #[must_use]
    pub fn usb_serial(serial_num: impl Into<String>) -> Self {
        Self {
            locator: PortLocator::UsbSerial(serial_num.into()),
            baud_a: DEFAULT_BAUD,
            baud_b: DEFAULT_BAUD,
        }
    }
}

/// One serial port implementing [`Transport`].
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open `path` at `baud`, 8-N-1, with bounded timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Open`] if the port cannot be opened.
    pub fn open(path: &str, baud: u32) -> LinkResult<Self> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(IO_TIMEOUT)
            .open()
            .map_err(|source| LinkError::Open {
                port: path.to_string(),
                source,
            })?;
        info!(port = path, baud, "serial link opened");
        Ok(Self {
            port,
            name: path.to_string(),
        })
    }
}

impl Transport for SerialLink {
    fn pending(&mut self) -> LinkResult<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(LinkError::Peek)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> LinkResult<()> {
        self.port.read_exact(buf).map_err(LinkError::Read)
    }

    fn write_all(&mut self, bytes: &[u8]) -> LinkResult<()> {
        self.port.write_all(bytes).map_err(LinkError::Write)
    }

    fn flush_input(&mut self) -> LinkResult<()> {
        self.port.clear(ClearBuffer::Input).map_err(LinkError::Flush)
    }

    fn label(&self) -> &str {
        &self.name
    }
}

/// [`LinkOpener`] backed by two serial ports.
pub struct SerialOpener {
    config: SerialConfig,
}

impl SerialOpener {
    /// Create an opener from line parameters.
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl LinkOpener for SerialOpener {
    fn open_pair(&mut self) -> LinkResult<(Box<dyn Transport>, Box<dyn Transport>)> {
        let (path_a, path_b) = self.config.locator.resolve()?;
        let mut a = SerialLink::open(&path_a, self.config.baud_a)?;
        let mut b = SerialLink::open(&path_b, self.config.baud_b)?;
        // Drop whatever accumulated while the engine was down.
        a.flush_input()?;
        b.flush_input()?;
        Ok((Box::new(a), Box::new(b)))
    }
}
