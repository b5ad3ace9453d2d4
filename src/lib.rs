//! link64
//!
//! This implements a Commodore IEC bus peripheral on a PC parallel port,
//! using a Link64 (X1541 style) cable.  The C64 sees one or more emulated
//! devices on its serial bus.
//!
//! The driver handles the bus level protocol: ATN command bytes, LISTEN and
//! TALK dispatch, byte transfers in both directions, EOI, and bus reset.
//! What the devices actually do with the bytes is up to the caller, which
//! drains pending requests through a configuration [`Session`].
//!
//! The core is `no_std`.  The default `std` feature adds `/dev/port`
//! access, a host tick thread for the timeout service, and a simulated C64
//! for testing.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Must come first, so the logging macros are visible to the other modules.
mod fmt;

// Declare all of this library's modules.
mod config;
pub mod constants;
mod control;
mod driver;
pub mod iec;
mod infra;
pub mod protocol;
mod registry;
mod timeout;
mod types;
mod util;

#[cfg(feature = "std")]
pub mod test;

pub use config::Config;
pub use control::{ControlPanel, ControlRequest, Session, Status};
pub use driver::{Context, DriverError, Link64, Stats};
pub use iec::transfer::{Engine, TransferFlags};
pub use iec::{IecBus, Lines, Sample};
pub use infra::port::{Port, Register};
#[cfg(all(feature = "std", unix))]
pub use infra::port::DevPort;
#[cfg(feature = "std")]
pub use infra::ticker::Ticker;
pub use protocol::{Command, Outcome, Phase};
pub use registry::{DeviceRegistry, Request};
pub use timeout::{
    ErrorCell, ErrorCode, MAX_TIMEOUT_TICKS, TimeoutHandle, TimeoutService, TimeoutStats,
};
pub use types::{Cable, Role};

/// This crate's version.
pub const VERSION: &str = util::built::PKG_VERSION;
