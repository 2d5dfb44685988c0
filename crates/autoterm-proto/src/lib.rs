//! Wire protocol for Autoterm diesel air heaters.
//!
//! This crate provides:
//! - [`crc`] module with the CRC-16 checksum used on the wire
//! - [`frame`] module with the `0xAA`-led frame codec
//! - [`message`] module with typed decoding of known messages
//!
//! The protocol runs over UART at 2400 baud 8-N-1 between the OEM control
//! panel and the heater. Both sides exchange frames of the form
//! `0xAA | device | L | id1 | id2 | payload(L) | CRC_hi | CRC_lo`.

pub mod crc;
pub mod frame;
pub mod message;

pub use crc::*;
pub use frame::*;
pub use message::*;
