//! Passthrough engine for Autoterm diesel air heaters.
//!
//! The engine sits between the OEM control panel and the heater on two
//! serial links. It forwards every frame transparently, decodes the
//! traffic into a timestamped state model, and lets a host program inject
//! controller-shaped commands without colliding with live panel
//! transactions.
//!
//! Modules:
//! - [`state`] - timestamped registers replicated from observed frames
//! - [`roles`] - runtime binding of physical sides to protocol roles
//! - [`inject`] - host frame queue and the transaction write-lock
//! - [`timers`] - poll, shutdown-retry, and auto-off deadlines
//! - [`engine`] - the worker loop and the [`Bridge`] host facade
//! - [`config`] - TOML configuration for the daemon

pub mod config;
pub mod engine;
pub mod inject;
pub mod roles;
pub mod state;
pub mod timers;

pub use config::*;
pub use engine::*;
pub use inject::*;
pub use roles::*;
pub use state::*;
pub use timers::*;
