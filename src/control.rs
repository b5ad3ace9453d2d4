//! This module implements the configuration interface: the single open
//! [`Session`] through which devices are enabled and pending requests are
//! drained, the numeric [`ControlRequest`]s it accepts, and the
//! [`ControlPanel`] front-end state.
//!
//! None of this touches the bus.  Only the registry and the session lock
//! are shared with the attention handler.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use heapless::String;

use crate::constants::MAX_ROOT_DIR_LEN;
use crate::driver::{Context, DriverError};
use crate::fmt::{debug, info, warn};
use crate::registry::Request;
use crate::timeout::ErrorCode;
use crate::types::{Cable, Role};

// Control request numbers are encoded as ('z' << 8) | number.
const REQUEST_TYPE: u32 = b'z' as u32;

/// A request made through the session's numeric control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlRequest {
    /// Enable the interface.  Accepted, but has no effect.
    Enable,
    /// Disable the interface.  Accepted, but has no effect.
    Disable,
    /// Start answering to a device address.
    DeviceEnable(u8),
    /// Stop answering to a device address.
    DeviceDisable(u8),
}

impl ControlRequest {
    pub const ENABLE: u32 = REQUEST_TYPE << 8;
    pub const DISABLE: u32 = (REQUEST_TYPE << 8) | 1;
    pub const DEVICE_ENABLE: u32 = (REQUEST_TYPE << 8) | 2;
    pub const DEVICE_DISABLE: u32 = (REQUEST_TYPE << 8) | 3;

    /// Decode a request number and its argument.
    pub fn decode(code: u32, arg: u32) -> Result<Self, DriverError> {
        let device = || u8::try_from(arg).map_err(|_| DriverError::InvalidDevice(u8::MAX));
        match code {
            Self::ENABLE => Ok(Self::Enable),
            Self::DISABLE => Ok(Self::Disable),
            Self::DEVICE_ENABLE => Ok(Self::DeviceEnable(device()?)),
            Self::DEVICE_DISABLE => Ok(Self::DeviceDisable(device()?)),
            _ => Err(DriverError::InvalidRequest),
        }
    }
}

/// Snapshot of the registry and error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub request_pending: bool,
    pub current_device: u8,
    pub current_channel: u8,
    pub role: Role,
    /// The first error raised by the last bus operation.
    pub error: Option<ErrorCode>,
}

/// The open configuration interface.  Closing it, or dropping it, lets the
/// next caller open it.
pub struct Session<'a> {
    ctx: &'a Context,
}

impl<'a> Session<'a> {
    pub(crate) fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn enable_device(&self, addr: u8) -> Result<(), DriverError> {
        self.ctx.with_registry(|registry| registry.enable(addr))
    }

    pub fn disable_device(&self, addr: u8) -> Result<(), DriverError> {
        self.ctx.with_registry(|registry| registry.disable(addr))
    }

    pub fn status(&self) -> Status {
        let error = self.ctx.timeouts().failure().get();
        let status = self.ctx.with_registry(|registry| Status {
            request_pending: registry.request_pending(),
            current_device: registry.current_device(),
            current_channel: registry.current_channel(),
            role: registry.role(),
            error,
        });
        debug!(
            "Status: pending {}, device 0x{:02x}, channel 0x{:02x}",
            status.request_pending, status.current_device, status.current_channel
        );
        status
    }

    /// Drain the pending LISTEN or TALK request.
    pub fn take_request(&self) -> Option<Request> {
        self.ctx.with_registry(|registry| registry.take_request())
    }

    /// Act on a numeric control request.
    pub fn control(&self, code: u32, arg: u32) -> Result<(), DriverError> {
        let request = ControlRequest::decode(code, arg).inspect_err(|_| {
            warn!("Invalid control request 0x{:04x} arg {}", code, arg);
        })?;
        debug!("Control request {:?}", request);

        match request {
            ControlRequest::Enable | ControlRequest::Disable => {
                info!("{:?} requested - nothing to do", request);
                Ok(())
            }
            ControlRequest::DeviceEnable(addr) => self.enable_device(addr),
            ControlRequest::DeviceDisable(addr) => self.disable_device(addr),
        }
    }

    /// Close the session.  The same as dropping it.
    pub fn close(self) {}
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.ctx.release();
    }
}

/// Front-end control panel state: the server start/stop toggle, the root
/// directory files are served from, and the cable in use.
///
/// Nothing here reaches the driver.
#[derive(Debug, Clone, Default)]
pub struct ControlPanel {
    running: bool,
    root_dir: String<MAX_ROOT_DIR_LEN>,
    cable: Cable,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the server, returning the new button label.
    pub fn start_stop(&mut self) -> &'static str {
        self.running = !self.running;
        info!("Server {}", if self.running { "started" } else { "stopped" });
        self.label()
    }

    pub fn label(&self) -> &'static str {
        if self.running {
            "Stop Server"
        } else {
            "Start Server"
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_root_dir(&mut self, dir: &str) -> Result<(), DriverError> {
        let mut root_dir = String::new();
        root_dir
            .push_str(dir)
            .map_err(|_| DriverError::NameTooLong)?;
        self.root_dir = root_dir;
        Ok(())
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn select_cable(&mut self, cable: Cable) {
        if cable == Cable::Trans64 {
            warn!("{} selected - the driver only supports X1541 wiring", cable);
        }
        self.cable = cable;
    }

    pub fn cable(&self) -> Cable {
        self.cable
    }
}
