//! Typed decoding of known protocol messages.
//!
//! Frames dispatch on `(device, id2)` into a [`Message`] variant carrying
//! the decoded payload; a single apply step downstream turns the variant
//! into state updates and log events.

use crate::frame::{Device, Frame};
use thiserror::Error;

/// Known `id2` operation codes.
pub mod msg_id {
    /// Turn the heater on (controller) / startup confirmation (heater).
    pub const TURN_ON: u8 = 0x01;
    /// Ask for settings when empty, set settings otherwise.
    pub const SETTINGS: u8 = 0x02;
    /// Turn the heater off / turn-off confirmation.
    pub const TURN_OFF: u8 = 0x03;
    /// Init handshake variant.
    pub const INIT: u8 = 0x04;
    /// Init handshake variant (controller) / software version (heater).
    pub const VERSION: u8 = 0x06;
    /// Diagnostic mode on/off.
    pub const DIAG_CONTROL: u8 = 0x07;
    /// Unblock the heater after a lockout.
    pub const UNBLOCK: u8 = 0x0D;
    /// Ask for status / status report.
    pub const STATUS: u8 = 0x0F;
    /// Controller temperature report / acknowledge.
    pub const TEMPERATURE: u8 = 0x11;
    /// Late init handshake variant.
    pub const INIT_LATE: u8 = 0x1C;
    /// Turn ventilation on / confirmation.
    pub const VENTILATION: u8 = 0x23;
    /// Diagnostic bus init.
    pub const DIAG_INIT: u8 = 0x00;
    /// Diagnostic dump report.
    pub const DIAG_REPORT: u8 = 0x01;
}

/// Heater operating settings as carried in 6-byte settings payloads
/// (`FF FF mode setpoint ventilation power`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaterSettings {
    /// Operating mode.
    pub mode: u8,
    /// Temperature setpoint.
    pub setpoint: u8,
    /// Ventilation flag.
    pub ventilation: u8,
    /// Power level.
    pub power_level: u8,
}

impl HeaterSettings {
    /// Extract settings from a 6-byte settings payload (bytes `[2..6]`).
    fn from_payload(payload: &[u8]) -> Self {
        Self {
            mode: payload[2],
            setpoint: payload[3],
            ventilation: payload[4],
            power_level: payload[5],
        }
    }
}

/// Heater status as carried in the 10-byte status payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// Primary status (0 = off .. 4 = shutting down).
    pub status1: u8,
    /// Secondary status.
    pub status2: u8,
    /// Error code.
    pub errors: u8,
    /// Heat exchanger temperature in degrees C.
    pub heater_temperature: u8,
    /// External sensor temperature in degrees C.
    pub external_temperature: u8,
    /// Supply voltage in volts (wire value is decivolts).
    pub battery_voltage: f32,
    /// Flame sensor temperature in degrees C.
    pub flame_temperature: u16,
}

impl StatusReport {
    fn from_payload(payload: &[u8]) -> Self {
        Self {
            status1: payload[0],
            status2: payload[1],
            errors: payload[2],
            heater_temperature: payload[3],
            external_temperature: payload[4],
            battery_voltage: f32::from(payload[6]) / 10.0,
            flame_temperature: u16::from_be_bytes([payload[7], payload[8]]),
        }
    }
}

/// Diagnostic registers as carried in the 72-byte diagnostic dump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticReport {
    /// Primary diagnostic status.
    pub status1: u8,
    /// Secondary diagnostic status.
    pub status2: u8,
    /// Run counter.
    pub counter1: u16,
    /// Run counter.
    pub counter2: u16,
    /// Commanded fan revolutions.
    pub defined_rev: u8,
    /// Measured fan revolutions.
    pub measured_rev: u8,
    /// Fuel pump register.
    pub fuel_pump1: u8,
    /// Fuel pump register.
    pub fuel_pump2: u8,
    /// Combustion chamber temperature.
    pub chamber_temperature: u16,
    /// Flame sensor temperature.
    pub flame_temperature: u16,
    /// External sensor temperature.
    pub external_temperature: u8,
    /// Heat exchanger temperature.
    pub heater_temperature: u8,
    /// Supply voltage in volts (wire value is decivolts).
    pub battery_voltage: f32,
}

/// Wire size of the diagnostic dump payload.
pub const DIAG_REPORT_LEN: usize = 72;

impl DiagnosticReport {
    fn from_payload(payload: &[u8]) -> Self {
        Self {
            status1: payload[0],
            status2: payload[1],
            counter1: u16::from_be_bytes([payload[7], payload[8]]),
            counter2: u16::from_be_bytes([payload[10], payload[11]]),
            defined_rev: payload[12],
            measured_rev: payload[13],
            fuel_pump1: payload[15],
            fuel_pump2: payload[17],
            chamber_temperature: u16::from_be_bytes([payload[19], payload[20]]),
            flame_temperature: u16::from_be_bytes([payload[21], payload[22]]),
            external_temperature: payload[25],
            heater_temperature: payload[26],
            battery_voltage: f32::from(payload[28]) / 10.0,
        }
    }
}

/// Decode failures for structurally valid frames.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The `(device, id2)` pair is not a known message.
    #[error("unknown message 0x{id2:02X} from {device}")]
    Unknown {
        /// Originating device.
        device: Device,
        /// Unrecognized operation code.
        id2: u8,
    },

    /// A known message arrived with the wrong payload size.
    #[error("message 0x{id2:02X} from {device}: payload length {actual}, expected {expected}")]
    PayloadLength {
        /// Originating device.
        device: Device,
        /// Operation code.
        id2: u8,
        /// Required payload size.
        expected: usize,
        /// Received payload size.
        actual: usize,
    },
}

/// One semantically decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Init traffic on the broadcast channel; logged only.
    BroadcastInit {
        /// Operation code observed.
        id2: u8,
    },
    /// Host-to-bus init on the diagnostic channel; logged only.
    DiagnosticInit,
    /// Heater diagnostic dump.
    DiagnosticReport(DiagnosticReport),

    /// Panel turns the heater on with the given settings.
    TurnOn(HeaterSettings),
    /// Panel asks for the current settings.
    AskSettings,
    /// Panel applies new settings.
    SetSettings(HeaterSettings),
    /// Panel turns the heater off.
    TurnOff,
    /// Panel init handshake traffic.
    ControllerInit {
        /// Operation code observed.
        id2: u8,
    },
    /// Panel toggles diagnostic mode.
    DiagnosticControl {
        /// Whether diagnostic mode is being enabled.
        enable: bool,
    },
    /// Panel unblocks the heater after a lockout.
    Unblock,
    /// Panel asks for a status report.
    AskStatus,
    /// Panel reports the temperature measured at its location.
    ControllerTemperature(u8),
    /// Panel turns ventilation on.
    VentilationOn {
        /// Fan power level.
        power: u8,
    },

    /// Heater confirms starting up, echoing the accepted settings.
    StartConfirmation(HeaterSettings),
    /// Heater reports its current settings.
    SettingsReport(HeaterSettings),
    /// Heater confirms turning off.
    TurnOffConfirmation,
    /// Heater answers init handshake traffic.
    HeaterInit {
        /// Operation code observed.
        id2: u8,
    },
    /// Heater reports its software version.
    SoftwareVersion([u8; 4]),
    /// Heater status report.
    StatusReport(StatusReport),
    /// Heater acknowledges the controller temperature report.
    TemperatureConfirmation(u8),
    /// Heater confirms turning ventilation on.
    VentilationConfirmation,
}

impl Message {
    /// Decode a parsed frame into its typed message.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for unknown `(device, id2)` pairs or for
    /// known pairs carrying the wrong payload length; such frames are
    /// still forwarded by the passthrough, only their decoding is skipped.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        match frame.device {
            Device::Broadcast => Ok(Self::BroadcastInit { id2: frame.id2 }),
            Device::Diagnostic => Self::decode_diagnostic(frame),
            Device::Controller => Self::decode_controller(frame),
            Device::Heater => Self::decode_heater(frame),
        }
    }

    fn decode_diagnostic(frame: &Frame) -> Result<Self, DecodeError> {
        match frame.id2 {
            msg_id::DIAG_INIT => Ok(Self::DiagnosticInit),
            msg_id::DIAG_REPORT => {
                let payload = expect_len(frame, DIAG_REPORT_LEN)?;
                Ok(Self::DiagnosticReport(DiagnosticReport::from_payload(
                    payload,
                )))
            }
            id2 => Err(DecodeError::Unknown {
                device: frame.device,
                id2,
            }),
        }
    }

    fn decode_controller(frame: &Frame) -> Result<Self, DecodeError> {
        match frame.id2 {
            msg_id::TURN_ON => {
                let payload = expect_len(frame, 6)?;
                Ok(Self::TurnOn(HeaterSettings::from_payload(payload)))
            }
            msg_id::SETTINGS => {
                if frame.payload.is_empty() {
                    Ok(Self::AskSettings)
                } else {
                    let payload = expect_len(frame, 6)?;
                    Ok(Self::SetSettings(HeaterSettings::from_payload(payload)))
                }
            }
            msg_id::TURN_OFF => Ok(Self::TurnOff),
            msg_id::INIT | msg_id::VERSION | msg_id::INIT_LATE => {
                Ok(Self::ControllerInit { id2: frame.id2 })
            }
            msg_id::DIAG_CONTROL => {
                let payload = expect_len(frame, 1)?;
                Ok(Self::DiagnosticControl {
                    enable: payload[0] != 0,
                })
            }
            msg_id::UNBLOCK => Ok(Self::Unblock),
            msg_id::STATUS => Ok(Self::AskStatus),
            msg_id::TEMPERATURE => {
                let payload = expect_len(frame, 1)?;
                Ok(Self::ControllerTemperature(payload[0]))
            }
            msg_id::VENTILATION => {
                let payload = expect_len(frame, 4)?;
                Ok(Self::VentilationOn { power: payload[2] })
            }
            id2 => Err(DecodeError::Unknown {
                device: frame.device,
                id2,
            }),
        }
    }

    fn decode_heater(frame: &Frame) -> Result<Self, DecodeError> {
        match frame.id2 {
            msg_id::TURN_ON => {
                let payload = expect_len(frame, 6)?;
                Ok(Self::StartConfirmation(HeaterSettings::from_payload(
                    payload,
                )))
            }
            msg_id::SETTINGS => {
                let payload = expect_len(frame, 6)?;
                Ok(Self::SettingsReport(HeaterSettings::from_payload(payload)))
            }
            msg_id::TURN_OFF => Ok(Self::TurnOffConfirmation),
            msg_id::INIT | msg_id::INIT_LATE => Ok(Self::HeaterInit { id2: frame.id2 }),
            msg_id::VERSION => {
                let payload = expect_len(frame, 5)?;
                Ok(Self::SoftwareVersion([
                    payload[0], payload[1], payload[2], payload[3],
                ]))
            }
            msg_id::STATUS => {
                let payload = expect_len(frame, 10)?;
                Ok(Self::StatusReport(StatusReport::from_payload(payload)))
            }
            msg_id::TEMPERATURE => {
                let payload = expect_len(frame, 1)?;
                Ok(Self::TemperatureConfirmation(payload[0]))
            }
            msg_id::VENTILATION => Ok(Self::VentilationConfirmation),
            id2 => Err(DecodeError::Unknown {
                device: frame.device,
                id2,
            }),
        }
    }
}

fn expect_len(frame: &Frame, expected: usize) -> Result<&[u8], DecodeError> {
    if frame.payload.len() == expected {
        Ok(&frame.payload)
    } else {
        Err(DecodeError::PayloadLength {
            device: frame.device,
            id2: frame.id2,
            expected,
            actual: frame.payload.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn frame(device: Device, id2: u8, payload: &[u8]) -> Frame {
        Frame::build(device, id2, 0x00, payload).unwrap()
    }

    #[test]
    fn test_decode_status_report() {
        let payload = [0x03, 0x00, 0x00, 0x18, 0x05, 0x00, 0x8C, 0x01, 0x2C, 0x00];
        let msg = Message::decode(&frame(Device::Heater, 0x0F, &payload)).unwrap();
        let Message::StatusReport(status) = msg else {
            panic!("expected status report, got {msg:?}");
        };
        assert_eq!(status.status1, 3);
        assert_eq!(status.status2, 0);
        assert_eq!(status.errors, 0);
        assert_eq!(status.heater_temperature, 24);
        assert_eq!(status.external_temperature, 5);
        assert!((status.battery_voltage - 14.0).abs() < f32::EPSILON);
        assert_eq!(status.flame_temperature, 300);
    }

    #[test]
    fn test_decode_ask_vs_set_settings() {
        assert_eq!(
            Message::decode(&frame(Device::Controller, 0x02, &[])),
            Ok(Message::AskSettings)
        );
        let msg =
            Message::decode(&frame(Device::Controller, 0x02, &[0xFF, 0xFF, 4, 0x0F, 0, 6]))
                .unwrap();
        assert_eq!(
            msg,
            Message::SetSettings(HeaterSettings {
                mode: 4,
                setpoint: 0x0F,
                ventilation: 0,
                power_level: 6,
            })
        );
    }

    #[test]
    fn test_decode_settings_report() {
        let msg =
            Message::decode(&frame(Device::Heater, 0x02, &[0xFF, 0xFF, 1, 20, 0, 3])).unwrap();
        assert_eq!(
            msg,
            Message::SettingsReport(HeaterSettings {
                mode: 1,
                setpoint: 20,
                ventilation: 0,
                power_level: 3,
            })
        );
    }

    #[test]
    fn test_decode_controller_temperature() {
        let msg = Message::decode(&frame(Device::Controller, 0x11, &[21])).unwrap();
        assert_eq!(msg, Message::ControllerTemperature(21));
    }

    #[test]
    fn test_decode_software_version() {
        let msg = Message::decode(&frame(Device::Heater, 0x06, &[2, 3, 0, 1, 0])).unwrap();
        assert_eq!(msg, Message::SoftwareVersion([2, 3, 0, 1]));
    }

    #[test]
    fn test_decode_ventilation_on() {
        let msg =
            Message::decode(&frame(Device::Controller, 0x23, &[0xFF, 0xFF, 5, 0x0F])).unwrap();
        assert_eq!(msg, Message::VentilationOn { power: 5 });
    }

    #[test]
    fn test_decode_diagnostic_report() {
        let mut payload = [0u8; DIAG_REPORT_LEN];
        payload[0] = 1;
        payload[1] = 2;
        payload[7] = 0x01;
        payload[8] = 0x02; // counter1 = 0x0102
        payload[10] = 0x03;
        payload[11] = 0x04; // counter2 = 0x0304
        payload[12] = 50;
        payload[13] = 48;
        payload[15] = 9;
        payload[17] = 11;
        payload[19] = 0x01;
        payload[20] = 0x90; // chamber = 400
        payload[21] = 0x01;
        payload[22] = 0x2C; // flame = 300
        payload[25] = 7;
        payload[26] = 33;
        payload[28] = 123;
        let msg = Message::decode(&frame(Device::Diagnostic, 0x01, &payload)).unwrap();
        let Message::DiagnosticReport(diag) = msg else {
            panic!("expected diagnostic report, got {msg:?}");
        };
        assert_eq!(diag.status1, 1);
        assert_eq!(diag.status2, 2);
        assert_eq!(diag.counter1, 0x0102);
        assert_eq!(diag.counter2, 0x0304);
        assert_eq!(diag.defined_rev, 50);
        assert_eq!(diag.measured_rev, 48);
        assert_eq!(diag.fuel_pump1, 9);
        assert_eq!(diag.fuel_pump2, 11);
        assert_eq!(diag.chamber_temperature, 400);
        assert_eq!(diag.flame_temperature, 300);
        assert_eq!(diag.external_temperature, 7);
        assert_eq!(diag.heater_temperature, 33);
        assert!((diag.battery_voltage - 12.3).abs() < 0.001);
    }

    #[test]
    fn test_decode_unknown_id() {
        assert_eq!(
            Message::decode(&frame(Device::Heater, 0x55, &[])),
            Err(DecodeError::Unknown {
                device: Device::Heater,
                id2: 0x55,
            })
        );
    }

    #[test]
    fn test_decode_wrong_payload_length() {
        assert_eq!(
            Message::decode(&frame(Device::Heater, 0x0F, &[1, 2, 3])),
            Err(DecodeError::PayloadLength {
                device: Device::Heater,
                id2: 0x0F,
                expected: 10,
                actual: 3,
            })
        );
    }
}
