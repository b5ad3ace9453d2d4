//! Run-time driver configuration.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::constants::STD_TIMEOUT_TICKS;
use crate::timeout::MAX_TIMEOUT_TICKS;

/// Configuration for a [`Link64`](crate::Link64) driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Budget for every guarded wait, in timeout ticks.
    pub timeout_ticks: u32,

    /// Physically drive ATN when the protocol asks for it.  The X1541 wiring
    /// leaves ATN unconnected, so this is off by default and ATN changes are
    /// no-ops.
    pub drive_atn: bool,

    /// Reset the bus after an attention event times out.  Off by default -
    /// a timeout otherwise leaves the bus as it is for the caller to decide.
    pub reset_on_error: bool,

    /// Run the bus reset sequence when the driver is created.
    pub reset_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            timeout_ticks: STD_TIMEOUT_TICKS,
            drive_atn: false,
            reset_on_error: false,
            reset_on_start: true,
        }
    }

    /// Set the wait budget, clamped to [`MAX_TIMEOUT_TICKS`].
    #[must_use]
    pub const fn with_timeout_ticks(mut self, ticks: u32) -> Self {
        self.timeout_ticks = if ticks > MAX_TIMEOUT_TICKS {
            MAX_TIMEOUT_TICKS
        } else {
            ticks
        };
        self
    }

    #[must_use]
    pub const fn with_drive_atn(mut self, drive_atn: bool) -> Self {
        self.drive_atn = drive_atn;
        self
    }

    #[must_use]
    pub const fn with_reset_on_error(mut self, reset: bool) -> Self {
        self.reset_on_error = reset;
        self
    }

    #[must_use]
    pub const fn with_reset_on_start(mut self, reset: bool) -> Self {
        self.reset_on_start = reset;
        self
    }
}
