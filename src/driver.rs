//! This file contains the Link64 driver: the shared [`Context`] holding the
//! state both execution contexts touch, and [`Link64`], which owns the bus
//! and runs the protocol.
//!
//! The attention handler runs synchronously, blocking for the whole
//! exchange, as it would from an interrupt.  The only other context is the
//! timeout tick, which touches nothing but the timeout service.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::Config;
use crate::control::Session;
use crate::fmt::{debug, info, warn};
use crate::iec::IecBus;
use crate::iec::transfer::{Engine, TransferFlags};
use crate::infra::port::Port;
use crate::protocol::{Outcome, Phase, handle_attention};
use crate::registry::DeviceRegistry;
use crate::timeout::{ErrorCode, TimeoutService};
use crate::util::built::log_driver_info;

/// Errors returned by the configuration interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The interface is already open
    Busy,
    /// Device address out of range
    InvalidDevice(u8),
    /// Unknown control request
    InvalidRequest,
    /// Root directory too long
    NameTooLong,
}

impl core::fmt::Display for DriverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DriverError::Busy => write!(f, "device busy"),
            DriverError::InvalidDevice(addr) => write!(f, "invalid device address {}", addr),
            DriverError::InvalidRequest => write!(f, "invalid request"),
            DriverError::NameTooLong => write!(f, "name too long"),
        }
    }
}

/// Counters kept across attention events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub attention_events: u32,
    pub unhandled: u32,
    pub timeouts: u32,
    pub resets: u32,
}

/// State shared between the attention handler, the timeout tick and the
/// configuration interface.
///
/// `new()` is const, so this can live in a static, or be shared in an
/// `Arc` where a tick thread needs it.
pub struct Context {
    timeouts: TimeoutService,
    registry: Mutex<CriticalSectionRawMutex, RefCell<DeviceRegistry>>,
    lock: AtomicBool,
    attention_events: AtomicU32,
    unhandled: AtomicU32,
    dispatch_timeouts: AtomicU32,
    resets: AtomicU32,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub const fn new() -> Self {
        Self {
            timeouts: TimeoutService::new(),
            registry: Mutex::new(RefCell::new(DeviceRegistry::new(cfg!(
                feature = "all-devices"
            )))),
            lock: AtomicBool::new(false),
            attention_events: AtomicU32::new(0),
            unhandled: AtomicU32::new(0),
            dispatch_timeouts: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        }
    }

    pub fn timeouts(&self) -> &TimeoutService {
        &self.timeouts
    }

    /// Run `f` with the registry locked.  Never call this across a bus
    /// wait.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut DeviceRegistry) -> R) -> R {
        self.registry.lock(|registry| f(&mut registry.borrow_mut()))
    }

    pub fn device_enabled(&self, addr: u8) -> bool {
        self.with_registry(|registry| registry.is_enabled(addr))
    }

    /// Open the configuration interface.  Only one session may be open at a
    /// time.
    pub fn open(&self) -> Result<Session<'_>, DriverError> {
        if self
            .lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Open refused - already open");
            return Err(DriverError::Busy);
        }
        debug!("Session opened");
        Ok(Session::new(self))
    }

    pub(crate) fn release(&self) {
        self.lock.store(false, Ordering::Release);
        debug!("Session closed");
    }

    pub fn is_open(&self) -> bool {
        self.lock.load(Ordering::Acquire)
    }

    pub(crate) fn count_unhandled(&self) {
        self.unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> Stats {
        Stats {
            attention_events: self.attention_events.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            timeouts: self.dispatch_timeouts.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// The Link64 driver.  Owns the bus, and runs every protocol operation
/// against the shared [`Context`].
pub struct Link64<'a, P: Port> {
    bus: IecBus<P>,
    ctx: &'a Context,
    config: Config,
    phase: Phase,
}

impl<'a, P: Port> Link64<'a, P> {
    /// Take over the port, writing the idle bus state, and reset the bus if
    /// configured to.
    pub fn new(port: P, ctx: &'a Context, config: Config) -> Self {
        log_driver_info();
        debug!(
            "Config: timeout {} ticks, drive ATN {}, reset on error {}",
            config.timeout_ticks, config.drive_atn, config.reset_on_error
        );

        let mut driver = Self {
            bus: IecBus::new(port, config.drive_atn),
            ctx,
            config,
            phase: Phase::Idle,
        };
        if config.reset_on_start {
            driver.reset_bus();
        }
        driver
    }

    fn engine(&mut self) -> Engine<'_, P> {
        Engine::new(&mut self.bus, self.ctx, self.config.timeout_ticks)
    }

    // Every top level operation starts with no error.
    fn begin(&self) {
        self.ctx.timeouts().clear();
    }

    /// Handle the C64 asserting ATN.  Call this from the attention
    /// interrupt, or whatever stands in for it.
    pub fn on_attention(&mut self) -> Outcome {
        self.begin();
        self.ctx.attention_events.fetch_add(1, Ordering::Relaxed);

        let ctx = self.ctx;
        let mut phase = self.phase;
        let outcome = {
            let mut engine = self.engine();
            handle_attention(&mut engine, ctx, &mut phase)
        };
        self.phase = phase;

        if let Outcome::TimedOut(_) = outcome {
            self.ctx.dispatch_timeouts.fetch_add(1, Ordering::Relaxed);
            if self.config.reset_on_error {
                info!("Resetting bus after timeout");
                self.reset_bus();
            }
        }

        outcome
    }

    /// Clock in 8 bits from a talker already sending.
    pub fn receive_bits(&mut self, attention: bool) -> u8 {
        self.begin();
        self.engine().receive_bits(attention)
    }

    /// Receive one byte as listener.  Check [`error`](Self::error)
    /// afterwards - the byte is partial if a wait timed out.
    pub fn receive_byte(&mut self, attention: bool) -> (u8, TransferFlags) {
        self.begin();
        self.engine().receive_byte(attention)
    }

    /// Send one byte as talker, flagging EOI if it's the last.
    pub fn send_byte(&mut self, value: u8, eoi: bool) {
        self.begin();
        self.engine().send_byte(value, eoi);
    }

    pub fn reset_bus(&mut self) {
        self.ctx.resets.fetch_add(1, Ordering::Relaxed);
        self.bus.reset();
        self.phase = Phase::Idle;
    }

    /// The first error raised by the last operation, if any.
    pub fn error(&self) -> Option<ErrorCode> {
        self.ctx.timeouts().failure().get()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bus(&self) -> &IecBus<P> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut IecBus<P> {
        &mut self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give the port back.
    pub fn into_port(self) -> P {
        self.bus.into_port()
    }
}
