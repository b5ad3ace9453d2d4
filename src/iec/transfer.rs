//! The IEC byte transfer engine.
//!
//! Implements the listener side of a byte transfer (bit sampling, EOI
//! detection and the attention acknowledgement), the talker side, and the
//! turnaround used when the C64 tells us to TALK.
//!
//! Timing is critical throughout, so every delay blocks and every wait is a
//! busy-poll of the port, bounded by the [`TimeoutService`].  A wait that
//! times out doesn't return an error - the failure is latched by the
//! service, and the operation carries on with its remaining steps, each
//! wait under a fresh deadline.  Callers check for a failure once the
//! operation has finished.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use bitflags::bitflags;

use super::{IecBus, Lines};
use crate::constants::DEVICE_MASK;
use crate::driver::Context;
use crate::fmt::{debug, trace};
use crate::infra::port::Port;
use crate::timeout::{ErrorCode, TimeoutService};
use crate::util::time::block_us;
use crate::util::time::iec::{
    IEC_T_BB, IEC_T_DA, IEC_T_EI, IEC_T_F, IEC_T_H, IEC_T_NE, IEC_T_NE_MAX, IEC_T_NE_MIN,
    IEC_T_NE_POLL, IEC_T_R, IEC_T_RY, IEC_T_S, IEC_T_SETTLE, IEC_T_TK, IEC_T_V,
};

bitflags! {
    /// Flags returned alongside each received byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransferFlags: u8 {
        /// The talker signalled this is the last byte.
        const EOI = 0x01;
        /// An attention byte addressed an enabled device, and we have
        /// acknowledged it.
        const SUPPORTED = 0x02;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransferFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "TransferFlags({=u8:#04x})", self.bits());
    }
}

/// Runs byte transfers over a borrowed bus.  Cheap to construct - the
/// driver builds one per operation.
pub struct Engine<'a, P: Port> {
    bus: &'a mut IecBus<P>,
    ctx: &'a Context,
    timeout_ticks: u32,
}

impl<'a, P: Port> Engine<'a, P> {
    pub fn new(bus: &'a mut IecBus<P>, ctx: &'a Context, timeout_ticks: u32) -> Self {
        Self {
            bus,
            ctx,
            timeout_ticks,
        }
    }

    fn timeouts(&self) -> &'a TimeoutService {
        self.ctx.timeouts()
    }

    // Guarded wait - busy-poll `condition` against the bus until it holds,
    // or the deadline raises `code`.
    #[inline(always)]
    fn wait_for<F>(&mut self, code: ErrorCode, mut condition: F) -> bool
    where
        F: FnMut(&mut IecBus<P>) -> bool,
    {
        let timeouts = self.timeouts();
        let bus = &mut *self.bus;
        timeouts.wait_until(self.timeout_ticks, code, || condition(bus))
    }

    /// Clock in 8 bits, LSB first.
    ///
    /// Each bit is valid while the talker holds CLK released.  DATA is
    /// sampled in the same read that sees CLK released: DATA released is a
    /// 1.  For a data byte, DATA is asserted afterwards as the frame
    /// acknowledgement.
    ///
    /// On timeout, returns whatever bits have been assembled so far.
    pub fn receive_bits(&mut self, attention: bool) -> u8 {
        let mut value = 0u8;

        for bit in 0..8 {
            let mut one = false;
            self.wait_for(ErrorCode::ClockWait, |bus| {
                let sample = bus.sample();
                one = !sample.data;
                !sample.clock
            });
            if one {
                value |= 1 << bit;
            }

            self.wait_for(ErrorCode::ClockWait, |bus| bus.get_clock());
        }
        trace!("Received bits 0x{:02x}", value);

        if !attention {
            block_us!(IEC_T_F);
            self.bus.set_data();
        }

        value
    }

    /// Receive a single byte as listener.
    ///
    /// A talker which doesn't pull CLK within the EOI window is signalling
    /// this is the last byte: we acknowledge by pulsing DATA before clocking
    /// in the bits, and return [`TransferFlags::EOI`].
    ///
    /// For an attention byte, the low nibble is looked up in the device
    /// registry.  If the device is enabled we acknowledge the byte on the
    /// bus and return [`TransferFlags::SUPPORTED`].
    pub fn receive_byte(&mut self, attention: bool) -> (u8, TransferFlags) {
        let mut flags = TransferFlags::empty();

        block_us!(IEC_T_SETTLE);
        self.bus.release_clock();
        self.bus.set_data();

        // Wait for the talker to be ready to send
        self.wait_for(ErrorCode::ClockWait, |bus| !bus.get_clock());

        // Signal we are ready for data
        block_us!(IEC_T_H);
        self.bus.release_data();

        block_us!(IEC_T_NE_MIN);
        let mut polls = 0;
        let mut clock = false;
        while !clock && polls <= IEC_T_NE_MAX {
            block_us!(IEC_T_NE_POLL);
            polls += 1;
            clock = self.bus.get_clock();
        }

        if !clock {
            debug!("EOI detected after {} polls", polls);
            flags |= TransferFlags::EOI;

            // Acknowledge EOI
            self.bus.set_data();
            self.bus.release_clock();
            block_us!(IEC_T_EI);
            self.bus.release_data();

            self.wait_for(ErrorCode::TalkerWait, |bus| {
                bus.release_lines(Lines::DATA | Lines::CLOCK);
                bus.get_clock()
            });
        }

        let value = self.receive_bits(attention);

        if attention {
            let device = value & DEVICE_MASK;
            if self.ctx.device_enabled(device) {
                block_us!(IEC_T_F);
                self.bus.set_lines(Lines::DATA | Lines::CLOCK);
                block_us!(IEC_T_R);
                self.bus.release_atn();
                flags |= TransferFlags::SUPPORTED;
            }
        } else {
            block_us!(IEC_T_BB);
        }

        debug!("Received byte 0x{:02x} flags 0x{:02x}", value, flags.bits());
        (value, flags)
    }

    /// Send a single byte as talker.  With `eoi`, first waits for the
    /// listener to acknowledge this is the last byte.
    pub fn send_byte(&mut self, value: u8, eoi: bool) {
        debug!("Sending byte 0x{:02x} eoi {}", value, eoi);

        block_us!(IEC_T_BB);
        self.bus.release_data();

        // Signal we are ready to send, and wait for the listener to be ready
        // for data
        self.bus.release_clock();
        self.wait_for(ErrorCode::ListenerWait, |bus| !bus.get_data());

        if eoi {
            self.wait_for(ErrorCode::EoiResponse, |bus| bus.get_data());
            block_us!(IEC_T_RY);
            self.bus.release_data();
        } else {
            block_us!(IEC_T_NE);
        }

        self.bus.set_clock();
        for bit in 0..8 {
            if value & (1 << bit) != 0 {
                self.bus.release_data();
            } else {
                self.bus.set_data();
            }
            block_us!(IEC_T_S);

            // Data valid
            self.bus.release_clock();
            block_us!(IEC_T_V);
            self.bus.set_clock();
        }

        // Leave DATA to the listener, and wait for the frame acknowledgement
        self.bus.release_data();
        self.wait_for(ErrorCode::ClockWait, |bus| bus.get_data());
    }

    /// Take over as talker, after the C64 has sent TALK and a channel.
    pub fn turnaround(&mut self) {
        debug!("Turnaround to talker");
        block_us!(IEC_T_TK);
        self.wait_for(ErrorCode::ClockWait, |bus| !bus.get_clock());
        self.bus.set_clock();
        block_us!(IEC_T_DA);
    }
}
