//! Timestamped state registers replicated from observed traffic.
//!
//! Registers are written only by the worker thread, always paired with the
//! monotonic time of the frame that carried the value. Host API callers
//! read cloned snapshots, so a stale register keeps its old timestamp and
//! callers can judge freshness themselves.

use autoterm_proto::{DiagnosticReport, HeaterSettings, StatusReport};
use std::time::Instant;

/// A register value together with the monotonic time it was observed.
///
/// Starts out empty and is only ever replaced whole, so a snapshot never
/// mixes a value with another update's timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped<T> {
    inner: Option<(T, Instant)>,
}

impl<T> Default for Stamped<T> {
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<T: Copy> Stamped<T> {
    /// Record a new observation.
    pub fn set(&mut self, value: T, now: Instant) {
        self.inner = Some((value, now));
    }

    /// The observation, if any.
    #[must_use]
    pub fn get(&self) -> Option<(T, Instant)> {
        self.inner
    }

    /// The value alone.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.inner.map(|(v, _)| v)
    }

    /// When the value was observed.
    #[must_use]
    pub fn updated_at(&self) -> Option<Instant> {
        self.inner.map(|(_, at)| at)
    }

    /// True until the first observation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }
}

/// Diagnostic registers from the 72-byte dump on the diagnostic channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Primary diagnostic status.
    pub status1: Stamped<u8>,
    /// Secondary diagnostic status.
    pub status2: Stamped<u8>,
    /// Run counter.
    pub counter1: Stamped<u16>,
    /// Run counter.
    pub counter2: Stamped<u16>,
    /// Commanded fan revolutions.
    pub defined_rev: Stamped<u8>,
    /// Measured fan revolutions.
    pub measured_rev: Stamped<u8>,
    /// Fuel pump register.
    pub fuel_pump1: Stamped<u8>,
    /// Fuel pump register.
    pub fuel_pump2: Stamped<u8>,
    /// Combustion chamber temperature.
    pub chamber_temperature: Stamped<u16>,
    /// Flame sensor temperature.
    pub flame_temperature: Stamped<u16>,
    /// External sensor temperature.
    pub external_temperature: Stamped<u8>,
    /// Heat exchanger temperature.
    pub heater_temperature: Stamped<u8>,
    /// Supply voltage in volts.
    pub battery_voltage: Stamped<f32>,
}

/// Every register the engine replicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registers {
    /// Operating mode last confirmed by the heater.
    pub mode: Stamped<u8>,
    /// Setpoint last confirmed by the heater.
    pub setpoint: Stamped<u8>,
    /// Ventilation flag last confirmed by the heater.
    pub ventilation: Stamped<u8>,
    /// Power level last confirmed by the heater.
    pub power_level: Stamped<u8>,

    /// Primary status (0 = off .. 4 = shutting down).
    pub status1: Stamped<u8>,
    /// Secondary status.
    pub status2: Stamped<u8>,
    /// Error code.
    pub errors: Stamped<u8>,
    /// Heat exchanger temperature in degrees C.
    pub heater_temperature: Stamped<u8>,
    /// External sensor temperature in degrees C.
    pub external_temperature: Stamped<u8>,
    /// Supply voltage in volts.
    pub battery_voltage: Stamped<f32>,
    /// Flame sensor temperature in degrees C.
    pub flame_temperature: Stamped<u16>,

    /// Temperature reported by the panel's own sensor.
    pub controller_temperature: Stamped<u8>,

    /// Heater software version.
    pub software_version: Stamped<[u8; 4]>,

    /// Diagnostic channel registers.
    pub diagnostics: Diagnostics,
}

impl Registers {
    /// Apply a heater settings report.
    pub fn apply_settings(&mut self, settings: &HeaterSettings, now: Instant) {
        self.mode.set(settings.mode, now);
        self.setpoint.set(settings.setpoint, now);
        self.ventilation.set(settings.ventilation, now);
        self.power_level.set(settings.power_level, now);
    }

    /// Apply a heater status report.
    pub fn apply_status(&mut self, status: &StatusReport, now: Instant) {
        self.status1.set(status.status1, now);
        self.status2.set(status.status2, now);
        self.errors.set(status.errors, now);
        self.heater_temperature.set(status.heater_temperature, now);
        self.external_temperature
            .set(status.external_temperature, now);
        self.battery_voltage.set(status.battery_voltage, now);
        self.flame_temperature.set(status.flame_temperature, now);
    }

    /// Apply a diagnostic dump.
    pub fn apply_diagnostics(&mut self, diag: &DiagnosticReport, now: Instant) {
        let d = &mut self.diagnostics;
        d.status1.set(diag.status1, now);
        d.status2.set(diag.status2, now);
        d.counter1.set(diag.counter1, now);
        d.counter2.set(diag.counter2, now);
        d.defined_rev.set(diag.defined_rev, now);
        d.measured_rev.set(diag.measured_rev, now);
        d.fuel_pump1.set(diag.fuel_pump1, now);
        d.fuel_pump2.set(diag.fuel_pump2, now);
        d.chamber_temperature.set(diag.chamber_temperature, now);
        d.flame_temperature.set(diag.flame_temperature, now);
        d.external_temperature.set(diag.external_temperature, now);
        d.heater_temperature.set(diag.heater_temperature, now);
        d.battery_voltage.set(diag.battery_voltage, now);
    }
}

/// Human-readable name for a primary status value.
#[must_use]
pub fn status_text(status1: u8) -> Option<&'static str> {
    match status1 {
        0 => Some("heater off"),
        1 => Some("starting"),
        2 => Some("warming up"),
        3 => Some("running"),
        4 => Some("shutting down"),
        _ => None,
    }
}
