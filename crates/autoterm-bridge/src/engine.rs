//! The passthrough worker and the [`Bridge`] host facade.
//!
//! One dedicated worker thread owns both transports and the state
//! registers. It forwards bytes between the sides, decodes the traffic,
//! drives the poll and shutdown timers, and drains the injection queue
//! while no panel transaction is in flight. Host API callers only append
//! to the queue and read register snapshots, so none of the facade
//! methods ever block on I/O.

use crate::inject::{InjectionQueue, WriteLock};
use crate::roles::{Roles, Side};
use crate::state::{status_text, Registers, Stamped};
use crate::timers::{Polls, RECONNECT_BACKOFF};
use autoterm_link::{LinkOpener, LinkResult, SerialConfig, SerialOpener, Transport};
use autoterm_proto::{msg_id, Device, Frame, Message, ESC, PREAMBLE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Pause when both sides are idle and nothing was injected.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Errors from starting the engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// State shared between the worker and host API callers.
#[derive(Debug)]
struct Shared {
    /// Cleared to request the worker to exit.
    working: AtomicBool,
    /// Registers replicated from observed frames.
    registers: RwLock<Registers>,
    /// Outbound host frames.
    queue: InjectionQueue,
    /// Set while off-commands should repeat.
    shutdown_requested: AtomicBool,
    /// Absolute deadline that raises the shutdown request when crossed.
    auto_off: Mutex<Option<Instant>>,
}

/// Handle to a running passthrough engine.
///
/// Dropping the bridge stops the worker and joins it.
pub struct Bridge {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Start the engine over two serial ports.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Spawn`] if the worker thread cannot be
    /// created. Port open failures are not errors here: the worker keeps
    /// retrying with a bounded back-off.
    pub fn open(config: SerialConfig) -> Result<Self, BridgeError> {
        Self::with_opener(Box::new(SerialOpener::new(config)))
    }

    /// Start the engine over transports from a custom opener.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Spawn`] if the worker thread cannot be
    /// created.
    pub fn with_opener(opener: Box<dyn LinkOpener>) -> Result<Self, BridgeError> {
        let shared = Arc::new(Shared {
            working: AtomicBool::new(true),
            registers: RwLock::new(Registers::default()),
            queue: InjectionQueue::default(),
            shutdown_requested: AtomicBool::new(false),
            auto_off: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("autoterm-bridge".into())
            .spawn(move || Worker::new(worker_shared, opener).run())
            .map_err(BridgeError::Spawn)?;

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Stop the worker and join it.
    pub fn stop(&mut self) {
        self.shared.working.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }

    // ---- commands ----------------------------------------------------

    /// Queue a status poll.
    pub fn asks_for_status(&self) {
        self.enqueue_once(msg_id::STATUS, &[]);
    }

    /// Queue a settings poll.
    pub fn asks_for_settings(&self) {
        self.enqueue_once(msg_id::SETTINGS, &[]);
    }

    /// Queue a software version poll.
    pub fn asks_for_software_version(&self) {
        self.enqueue_once(msg_id::VERSION, &[]);
    }

    /// Queue a report of the temperature measured at the host.
    pub fn report_controller_temperature(&self, celsius: u8) {
        self.enqueue_once(msg_id::TEMPERATURE, &[celsius]);
    }

    /// Queue a turn-on command, repeated on the wire like the OEM panel
    /// does. `timer` optionally arms the auto-off deadline.
    ///
    /// The panel's defaults are `setpoint = 0x0F`, `ventilation = 0`,
    /// `power = 0`.
    pub fn turn_on_heater(
        &self,
        mode: u8,
        setpoint: u8,
        ventilation: u8,
        power: u8,
        timer: Option<Duration>,
    ) {
        self.enqueue_twice(msg_id::TURN_ON, &[0xFF, 0xFF, mode, setpoint, ventilation, power]);
        self.arm_auto_off(timer);
    }

    /// Queue a ventilation-on command, repeated on the wire. `timer`
    /// optionally arms the auto-off deadline.
    pub fn turn_on_ventilation(&self, power: u8, timer: Option<Duration>) {
        self.enqueue_twice(msg_id::VENTILATION, &[0xFF, 0xFF, power, 0x0F]);
        self.arm_auto_off(timer);
    }

    /// Queue a settings change, repeated on the wire. Same payload shape
    /// as [`Bridge::turn_on_heater`].
    pub fn change_settings(
        &self,
        mode: u8,
        setpoint: u8,
        ventilation: u8,
        power: u8,
        timer: Option<Duration>,
    ) {
        self.enqueue_twice(msg_id::SETTINGS, &[0xFF, 0xFF, mode, setpoint, ventilation, power]);
        self.arm_auto_off(timer);
    }

    /// Queue a diagnostic-mode-on command.
    pub fn diagnostic_on(&self) {
        self.enqueue_once(msg_id::DIAG_CONTROL, &[0x01]);
    }

    /// Queue a diagnostic-mode-off command.
    pub fn diagnostic_off(&self) {
        self.enqueue_once(msg_id::DIAG_CONTROL, &[0x00]);
    }

    /// Queue an unblock command.
    pub fn unblock(&self) {
        self.enqueue_once(msg_id::UNBLOCK, &[]);
    }

    /// Arm the shutdown request. The worker repeats off-commands on its
    /// retry schedule until the heater reports off.
    pub fn shutdown(&self) {
        self.shared.shutdown_requested.store(true, Ordering::Release);
        info!("shutdown requested");
    }

    /// Whether a shutdown request is still being retried.
    #[must_use]
    pub fn shutdown_pending(&self) -> bool {
        self.shared.shutdown_requested.load(Ordering::Acquire)
    }

    /// Arm the auto-off deadline `minutes` from now.
    pub fn set_heater_timer(&self, minutes: u64) {
        let deadline = Instant::now() + Duration::from_secs(minutes * 60);
        *self.shared.auto_off.lock().expect("auto-off poisoned") = Some(deadline);
        info!(minutes, "auto-off timer armed");
    }

    /// Remaining time on the auto-off deadline, if armed.
    #[must_use]
    pub fn heater_timer(&self) -> Option<Duration> {
        self.shared
            .auto_off
            .lock()
            .expect("auto-off poisoned")
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    // ---- queries -----------------------------------------------------

    /// Snapshot of every register.
    #[must_use]
    pub fn registers(&self) -> Registers {
        self.shared
            .registers
            .read()
            .expect("registers poisoned")
            .clone()
    }

    /// Operating mode last confirmed by the heater.
    #[must_use]
    pub fn heater_mode(&self) -> Stamped<u8> {
        self.read(|r| r.mode)
    }

    /// Setpoint last confirmed by the heater.
    #[must_use]
    pub fn heater_setpoint(&self) -> Stamped<u8> {
        self.read(|r| r.setpoint)
    }

    /// Ventilation flag last confirmed by the heater.
    #[must_use]
    pub fn heater_ventilation(&self) -> Stamped<u8> {
        self.read(|r| r.ventilation)
    }

    /// Power level last confirmed by the heater.
    #[must_use]
    pub fn heater_power_level(&self) -> Stamped<u8> {
        self.read(|r| r.power_level)
    }

    /// Primary status register.
    #[must_use]
    pub fn heater_status(&self) -> Stamped<u8> {
        self.read(|r| r.status1)
    }

    /// Error code register.
    #[must_use]
    pub fn heater_errors(&self) -> Stamped<u8> {
        self.read(|r| r.errors)
    }

    /// Heat exchanger temperature.
    #[must_use]
    pub fn heater_temperature(&self) -> Stamped<u8> {
        self.read(|r| r.heater_temperature)
    }

    /// External sensor temperature.
    #[must_use]
    pub fn external_temperature(&self) -> Stamped<u8> {
        self.read(|r| r.external_temperature)
    }

    /// Supply voltage in volts.
    #[must_use]
    pub fn battery_voltage(&self) -> Stamped<f32> {
        self.read(|r| r.battery_voltage)
    }

    /// Flame sensor temperature.
    #[must_use]
    pub fn flame_temperature(&self) -> Stamped<u16> {
        self.read(|r| r.flame_temperature)
    }

    /// Temperature last reported by the panel.
    #[must_use]
    pub fn controller_temperature(&self) -> Stamped<u8> {
        self.read(|r| r.controller_temperature)
    }

    /// Heater software version.
    #[must_use]
    pub fn software_version(&self) -> Stamped<[u8; 4]> {
        self.read(|r| r.software_version)
    }

    /// Human-readable name of the current primary status.
    #[must_use]
    pub fn heater_status_text(&self) -> Option<&'static str> {
        self.read(|r| r.status1).value().and_then(status_text)
    }

    // ---- internals ---------------------------------------------------

    fn read<T>(&self, get: impl FnOnce(&Registers) -> T) -> T {
        get(&self.shared.registers.read().expect("registers poisoned"))
    }

    fn enqueue_once(&self, id2: u8, payload: &[u8]) {
        if let Some(wire) = controller_wire(id2, payload) {
            debug!(id2, frame = %hex(&wire), "command queued");
            self.shared.queue.push(wire);
        }
    }

    fn enqueue_twice(&self, id2: u8, payload: &[u8]) {
        if let Some(wire) = controller_wire(id2, payload) {
            debug!(id2, frame = %hex(&wire), "command queued twice");
            self.shared.queue.push_twice(wire);
        }
    }

    fn arm_auto_off(&self, timer: Option<Duration>) {
        if let Some(after) = timer {
            let deadline = Instant::now() + after;
            *self.shared.auto_off.lock().expect("auto-off poisoned") = Some(deadline);
            info!(seconds = after.as_secs(), "auto-off timer armed");
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The two open transports of one connection epoch.
struct Links {
    a: Box<dyn Transport>,
    b: Box<dyn Transport>,
}

/// Worker-owned engine state.
struct Worker {
    shared: Arc<Shared>,
    opener: Box<dyn LinkOpener>,
    links: Option<Links>,
    roles: Roles,
    lock: WriteLock,
    polls: Polls,
}

impl Worker {
    fn new(shared: Arc<Shared>, opener: Box<dyn LinkOpener>) -> Self {
        let now = Instant::now();
        Self {
            shared,
            opener,
            links: None,
            roles: Roles::default(),
            lock: WriteLock::new(now),
            polls: Polls::new(now),
        }
    }

    fn run(mut self) {
        info!("worker started");
        while self.working() {
            if self.links.is_none() {
                match self.opener.open_pair() {
                    Ok((a, b)) => {
                        let now = Instant::now();
                        self.links = Some(Links { a, b });
                        self.roles.reset();
                        self.lock = WriteLock::new(now);
                        self.polls = Polls::new(now);
                        info!("links open");
                    }
                    Err(error) => {
                        error!(%error, "failed to open links, backing off");
                        self.backoff();
                        continue;
                    }
                }
            }
            if let Err(error) = self.tick() {
                error!(%error, "transport fault, closing both links");
                self.links = None;
            }
        }
        info!("worker stopped");
    }

    fn working(&self) -> bool {
        self.shared.working.load(Ordering::Acquire)
    }

    /// Sleep out the reconnect back-off in slices so stop stays prompt.
    fn backoff(&self) {
        let deadline = Instant::now() + RECONNECT_BACKOFF;
        while self.working() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }
    }

    /// One poll cycle: service both sides, drive the timers, inject at
    /// most one host frame.
    fn tick(&mut self) -> LinkResult<()> {
        let Some(links) = self.links.as_mut() else {
            return Ok(());
        };

        let serviced_a = service_side(
            links.a.as_mut(),
            links.b.as_mut(),
            Side::A,
            &mut self.roles,
            &mut self.lock,
            &mut self.polls,
            &self.shared,
        )?;
        let serviced_b = service_side(
            links.b.as_mut(),
            links.a.as_mut(),
            Side::B,
            &mut self.roles,
            &mut self.lock,
            &mut self.polls,
            &self.shared,
        )?;

        let now = Instant::now();
        drive_timers(now, &mut self.polls, &self.lock, &self.shared);

        let injected = inject_one(now, links, &self.roles, &mut self.lock, &self.shared)?;

        if !serviced_a && !serviced_b && !injected {
            thread::sleep(IDLE_SLEEP);
        }
        Ok(())
    }
}

/// Pull one unit of traffic off `from` and forward it to `to`.
///
/// Returns `Ok(true)` if anything was consumed. The forward write happens
/// before any validation or decoding, so transparency is never delayed or
/// broken by protocol errors.
fn service_side(
    from: &mut dyn Transport,
    to: &mut dyn Transport,
    side: Side,
    roles: &mut Roles,
    lock: &mut WriteLock,
    polls: &mut Polls,
    shared: &Shared,
) -> LinkResult<bool> {
    if from.pending()? == 0 {
        return Ok(false);
    }

    let mut first = [0u8; 1];
    from.read_exact(&mut first)?;
    match first[0] {
        ESC => {
            // Opaque pre-frame marker from the init handshake; passed
            // through verbatim, never framed.
            to.write_all(&first)?;
            debug!(from = from.label(), "escape byte forwarded");
        }
        byte if byte != PREAMBLE => {
            from.flush_input()?;
            warn!(
                from = from.label(),
                byte = %format!("{byte:02x}"),
                "garbage byte, input disposed"
            );
        }
        _ => {
            let mut header = [0u8; 2];
            from.read_exact(&mut header)?;
            let rest = usize::from(header[1]) + 4;
            let mut packet = vec![0u8; 3 + rest];
            packet[0] = PREAMBLE;
            packet[1] = header[0];
            packet[2] = header[1];
            from.read_exact(&mut packet[3..])?;

            to.write_all(&packet)?;
            debug!(
                from = from.label(),
                to = to.label(),
                frame = %hex(&packet),
                "frame forwarded"
            );

            handle_frame(&packet, side, Instant::now(), roles, lock, polls, shared);
        }
    }
    Ok(true)
}

/// Validate and decode one already-forwarded frame, updating roles, the
/// write-lock, and the state registers.
fn handle_frame(
    packet: &[u8],
    side: Side,
    now: Instant,
    roles: &mut Roles,
    lock: &mut WriteLock,
    polls: &mut Polls,
    shared: &Shared,
) {
    let frame = match Frame::parse(packet) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%error, frame = %hex(packet), "forwarded frame failed validation");
            return;
        }
    };

    roles.observe(frame.device, side);

    match frame.device {
        Device::Controller => {
            lock.arm(now);
            let changes_settings = matches!(frame.id2, msg_id::TURN_ON | msg_id::TURN_OFF)
                || (frame.id2 == msg_id::SETTINGS && !frame.payload.is_empty());
            if changes_settings {
                cancel_auto_off(shared);
            }
        }
        Device::Heater => lock.release(now),
        Device::Broadcast | Device::Diagnostic => {}
    }

    match Message::decode(&frame) {
        Ok(message) => apply(&message, now, polls, shared),
        Err(error) => warn!(%error, frame = %hex(packet), "frame not decoded"),
    }
}

/// Clear the auto-off deadline, if armed.
fn cancel_auto_off(shared: &Shared) {
    *shared.auto_off.lock().expect("auto-off poisoned") = None;
}

/// Turn one decoded message into register updates and log events.
fn apply(message: &Message, now: Instant, polls: &mut Polls, shared: &Shared) {
    match message {
        Message::BroadcastInit { id2 } => info!(id2 = *id2, "init message on broadcast channel"),
        Message::DiagnosticInit => info!("diagnostic bus init"),
        Message::DiagnosticReport(diag) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .apply_diagnostics(diag, now);
            info!(?diag, "diagnostic report");
        }

        Message::TurnOn(settings) => info!(?settings, "panel turns heater on"),
        Message::AskSettings => info!("panel asks for settings"),
        Message::SetSettings(settings) => info!(?settings, "panel sets new settings"),
        Message::TurnOff => info!("panel turns heater off"),
        Message::ControllerInit { id2 } => info!(id2 = *id2, "panel init message"),
        Message::DiagnosticControl { enable } => {
            info!(enable = *enable, "panel toggles diagnostic mode");
        }
        Message::Unblock => info!("panel unblocks heater"),
        Message::AskStatus => info!("panel asks for status"),
        Message::ControllerTemperature(celsius) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .controller_temperature
                .set(*celsius, now);
            info!(celsius = *celsius, "panel reports temperature");
        }
        Message::VentilationOn { power } => {
            info!(power = *power, "panel turns ventilation on");
        }

        Message::StartConfirmation(settings) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .apply_settings(settings, now);
            polls.settings_seen(now);
            info!(?settings, "heater confirms starting up");
        }
        Message::SettingsReport(settings) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .apply_settings(settings, now);
            polls.settings_seen(now);
            info!(?settings, "heater reports settings");
        }
        Message::TurnOffConfirmation => info!("heater confirms turning off"),
        Message::HeaterInit { id2 } => info!(id2 = *id2, "heater answers init message"),
        Message::SoftwareVersion(version) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .software_version
                .set(*version, now);
            info!(?version, "heater reports software version");
        }
        Message::StatusReport(status) => {
            shared
                .registers
                .write()
                .expect("registers poisoned")
                .apply_status(status, now);
            polls.status_seen(now);
            if status.status1 == 0
                && shared.shutdown_requested.swap(false, Ordering::AcqRel)
            {
                polls.shutdown_cleared();
                info!("heater reports off, shutdown request satisfied");
            }
            info!(
                status1 = status.status1,
                voltage = status.battery_voltage,
                "heater reports status"
            );
        }
        Message::TemperatureConfirmation(celsius) => {
            info!(celsius = *celsius, "heater confirms panel temperature");
        }
        Message::VentilationConfirmation => info!("heater confirms ventilation on"),
    }
}

/// Raise the shutdown request when the auto-off deadline is crossed,
/// repeat off-commands while it is active, and queue the periodic polls.
fn drive_timers(now: Instant, polls: &mut Polls, lock: &WriteLock, shared: &Shared) {
    {
        let mut auto_off = shared.auto_off.lock().expect("auto-off poisoned");
        if let Some(deadline) = *auto_off {
            if now >= deadline {
                *auto_off = None;
                shared.shutdown_requested.store(true, Ordering::Release);
                info!("auto-off deadline reached, raising shutdown request");
            }
        }
    }

    if shared.shutdown_requested.load(Ordering::Acquire) && polls.shutdown_due(now) {
        if let Some(wire) = controller_wire(msg_id::TURN_OFF, &[]) {
            info!("queueing off command");
            shared.queue.push(wire);
        }
    }

    if !lock.is_held(now) {
        if polls.status_due(now) {
            if let Some(wire) = controller_wire(msg_id::STATUS, &[]) {
                debug!("queueing status poll");
                shared.queue.push(wire);
            }
        }
        if polls.settings_due(now) {
            if let Some(wire) = controller_wire(msg_id::SETTINGS, &[]) {
                debug!("queueing settings poll");
                shared.queue.push(wire);
            }
        }
    }
}

/// Deliver at most one queued host frame, honoring the write-lock.
///
/// A failed write puts the frame back at the front of the queue so it is
/// re-delivered once the links come back.
fn inject_one(
    now: Instant,
    links: &mut Links,
    roles: &Roles,
    lock: &mut WriteLock,
    shared: &Shared,
) -> LinkResult<bool> {
    if lock.is_held(now) {
        return Ok(false);
    }
    let Some(wire) = shared.queue.pop() else {
        return Ok(false);
    };

    let result = match roles.heater_side() {
        Some(Side::A) => links.a.write_all(&wire),
        Some(Side::B) => links.b.write_all(&wire),
        None => {
            warn!("heater side not yet bound, injecting on both sides");
            links
                .a
                .write_all(&wire)
                .and_then(|()| links.b.write_all(&wire))
        }
    };

    match result {
        Ok(()) => {
            lock.arm(now);
            info!(frame = %hex(&wire), "host frame injected");
            Ok(true)
        }
        Err(error) => {
            shared.queue.push_front(wire);
            Err(error)
        }
    }
}

/// Serialize a controller-shaped command, logging instead of failing.
fn controller_wire(id2: u8, payload: &[u8]) -> Option<Vec<u8>> {
    match Frame::build(Device::Controller, id2, 0x00, payload) {
        Ok(frame) => Some(frame.encode()),
        Err(error) => {
            warn!(%error, id2, "command frame rejected");
            None
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
