//! Runtime binding of physical sides to protocol roles.
//!
//! The two serial ports come up in unspecified order, so the engine learns
//! which one faces the heater from the traffic itself: the first valid
//! controller frame binds the side it was read from as the controller
//! side, the first valid heater frame likewise for the heater side.
//! Bindings are latched until the links are re-opened.

use autoterm_proto::Device;
use std::fmt;
use tracing::info;

/// One of the two physical transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First transport of the pair.
    A,
    /// Second transport of the pair.
    B,
}

impl Side {
    /// The opposite transport.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "side A"),
            Self::B => write!(f, "side B"),
        }
    }
}

/// Latched role assignments for the two sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
    heater: Option<Side>,
    controller: Option<Side>,
}

impl Roles {
    /// Learn role bindings from a valid frame's device code.
    ///
    /// This is the single decision site for the binding direction: a role
    /// is bound to the side the frame was read from.
    pub fn observe(&mut self, device: Device, read_from: Side) {
        match device {
            Device::Controller if self.controller.is_none() => {
                self.controller = Some(read_from);
                info!(%read_from, "controller role bound");
            }
            Device::Heater if self.heater.is_none() => {
                self.heater = Some(read_from);
                info!(%read_from, "heater role bound");
            }
            _ => {}
        }
    }

    /// The side facing the heater, once bound.
    #[must_use]
    pub fn heater_side(&self) -> Option<Side> {
        self.heater
    }

    /// The side facing the controller panel, once bound.
    #[must_use]
    pub fn controller_side(&self) -> Option<Side> {
        self.controller
    }

    /// Drop all bindings (links were re-opened).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binds_to_originating_side() {
        let mut roles = Roles::default();
        roles.observe(Device::Heater, Side::B);
        roles.observe(Device::Controller, Side::A);
        assert_eq!(roles.heater_side(), Some(Side::B));
        assert_eq!(roles.controller_side(), Some(Side::A));
    }

    #[test]
    fn test_bindings_are_latched() {
        let mut roles = Roles::default();
        roles.observe(Device::Heater, Side::A);
        roles.observe(Device::Heater, Side::B);
        assert_eq!(roles.heater_side(), Some(Side::A));
    }

    #[test]
    fn test_broadcast_and_diagnostic_bind_nothing() {
        let mut roles = Roles::default();
        roles.observe(Device::Broadcast, Side::A);
        roles.observe(Device::Diagnostic, Side::B);
        assert_eq!(roles.heater_side(), None);
        assert_eq!(roles.controller_side(), None);
    }

    #[test]
    fn test_reset_unbinds() {
        let mut roles = Roles::default();
        roles.observe(Device::Heater, Side::A);
        roles.reset();
        assert_eq!(roles.heater_side(), None);
    }

    #[test]
    fn test_side_other() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
    }
}
