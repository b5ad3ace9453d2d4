//! This file implements the busy-wait timing functions and macros used by
//! the IEC protocol engine, and the IEC bus timings themselves.
//!
//! We reimplement the embassy-time blocking delay, primarily to make it
//! clear what it is doing under the covers.  The attention handler must not
//! yield, so every protocol delay blocks.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use embassy_time::{Duration, Instant};

/// Function to block until a specific instant.  This is similar to the
/// embassy-time::Delay::block_for function.
///
/// We always inline it to reduce function call/return overhead, as this is
/// typically used in timing critical functions
#[inline(always)]
pub fn block_until(expires: Instant) {
    while Instant::now() < expires {
        core::hint::spin_loop();
    }
}

/// Function to block for a specific Duration.  This is similar to the
/// embassy-time::Delay::block_for function.
#[inline(always)]
pub fn block_for(duration: Duration) {
    block_until(Instant::now() + duration);
}

/// Block for a specific number of microseconds.
macro_rules! block_us {
    ($us:expr) => {
        crate::util::time::block_for(embassy_time::Duration::from_micros($us))
    };
}
pub(crate) use block_us;

pub mod iec {
    //! IEC protocol timings, all in microseconds, taken from the Commodore
    //! programmer's reference timing diagrams.

    use static_assertions::const_assert;

    /// Frame handshake time - delay before the listener acknowledges a
    /// frame, or a device acknowledges ATN.
    pub const IEC_T_F: u64 = 20;

    /// Hold time between seeing the talker ready to send and releasing DATA.
    pub const IEC_T_H: u64 = 50;

    /// Talker response time, waited after the listener acknowledges EOI.
    pub const IEC_T_RY: u64 = 30;

    /// Non-EOI response to ready for data time.
    pub const IEC_T_NE: u64 = 40;

    /// How long after releasing DATA before we start looking for the talker
    /// pulling CLK.
    pub const IEC_T_NE_MIN: u64 = 40;

    /// Number of 1us polls after `IEC_T_NE_MIN` before a CLK that hasn't
    /// been pulled is treated as EOI.
    pub const IEC_T_NE_MAX: u32 = 200;

    /// Interval between polls within the EOI detection window.
    pub const IEC_T_NE_POLL: u64 = 1;

    /// EOI acknowledge hold time - how long the listener holds DATA to
    /// acknowledge EOI.
    pub const IEC_T_EI: u64 = 80;

    /// Min time between bytes
    pub const IEC_T_BB: u64 = 100;

    /// Talk-attention release time
    pub const IEC_T_TK: u64 = 20;

    /// Frame to release of ATN time
    pub const IEC_T_R: u64 = 20;

    /// Talk-attention acknowledge hold time
    pub const IEC_T_DA: u64 = 80;

    /// Talker bit setup time
    pub const IEC_T_S: u64 = 70;

    /// Data valid time
    pub const IEC_T_V: u64 = 70;

    /// Delay before releasing CLK at the start of a byte receive.
    pub const IEC_T_SETTLE: u64 = 50;

    /// Each of the three phases of a bus reset cycle.
    pub const IEC_T_RESET: u64 = 4000;

    const_assert!(IEC_T_NE_MIN <= IEC_T_NE_MAX as u64);
    const_assert!(IEC_T_RY < IEC_T_EI);
}
