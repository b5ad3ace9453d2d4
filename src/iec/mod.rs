//! This file implements the IEC bus line driver for the Link64 cable.
//!
//! CLK and DATA live on the parallel port's control register.  A set bit
//! pulls the line low, which is the active state on the IEC bus, so "set"
//! always means assert and "release" always means let the line float high.
//! All lines are open collector: a line reads active if any device on the
//! bus is pulling it.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod transfer;

use bitflags::bitflags;

use crate::constants::{IDLE_BUS_STATE, RESET_CYCLES};
use crate::fmt::{debug, trace};
use crate::infra::port::{Port, Register};
use crate::util::time::block_us;
use crate::util::time::iec::IEC_T_RESET;

bitflags! {
    /// IEC bus lines, as register bit masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lines: u8 {
        const CLOCK = 0x02;
        const DATA = 0x08;
        /// Lives on the status register, not the control register.
        const ATN = 0x40;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Lines {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Lines({=u8:#04x})", self.bits());
    }
}

/// The lines carried by the control register.
const CONTROL_LINES: Lines = Lines::CLOCK.union(Lines::DATA);

/// One read of the bus.  `true` means the line is active (pulled low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub clock: bool,
    pub data: bool,
}

// An object representing the physical IEC bus as seen through the parallel
// port.  `state` is the control register word we last wrote.
pub struct IecBus<P: Port> {
    port: P,
    state: u8,
    atn_state: u8,
    drive_atn: bool,
}

impl<P: Port> IecBus<P> {
    /// Take ownership of the port and write the idle word, releasing CLK
    /// and DATA.
    pub fn new(port: P, drive_atn: bool) -> Self {
        let mut bus = Self {
            port,
            state: IDLE_BUS_STATE,
            atn_state: 0,
            drive_atn,
        };
        bus.write_control();
        bus
    }

    #[inline(always)]
    fn write_control(&mut self) {
        self.port.write(Register::Control, self.state);
    }

    // CLOCK line control
    #[inline(always)]
    pub fn set_clock(&mut self) {
        self.set_lines(Lines::CLOCK);
    }

    #[inline(always)]
    pub fn release_clock(&mut self) {
        self.release_lines(Lines::CLOCK);
    }

    /// True if CLK is active, whoever is pulling it.
    #[inline(always)]
    pub fn get_clock(&mut self) -> bool {
        self.sample().clock
    }

    // DATA line control
    #[inline(always)]
    pub fn set_data(&mut self) {
        self.set_lines(Lines::DATA);
    }

    #[inline(always)]
    pub fn release_data(&mut self) {
        self.release_lines(Lines::DATA);
    }

    /// True if DATA is active, whoever is pulling it.
    #[inline(always)]
    pub fn get_data(&mut self) -> bool {
        self.sample().data
    }

    // ATN line control.  The X1541 cable doesn't wire ATN as an output, so
    // these do nothing unless ATN driving has been configured.
    pub fn set_atn(&mut self) {
        if self.drive_atn {
            self.atn_state |= Lines::ATN.bits();
            self.port.write(Register::Status, self.atn_state);
        }
    }

    pub fn release_atn(&mut self) {
        if self.drive_atn {
            self.atn_state &= !Lines::ATN.bits();
            self.port.write(Register::Status, self.atn_state);
        }
    }

    /// Assert multiple lines with a single register write.
    #[inline(always)]
    pub fn set_lines(&mut self, lines: Lines) {
        if lines.intersects(CONTROL_LINES) {
            self.state |= (lines & CONTROL_LINES).bits();
            self.write_control();
        }
        if lines.contains(Lines::ATN) {
            self.set_atn();
        }
    }

    /// Release multiple lines with a single register write.
    #[inline(always)]
    pub fn release_lines(&mut self, lines: Lines) {
        if lines.intersects(CONTROL_LINES) {
            self.state &= !(lines & CONTROL_LINES).bits();
            self.write_control();
        }
        if lines.contains(Lines::ATN) {
            self.release_atn();
        }
    }

    /// Read CLK and DATA.  Everything else on the register is masked off.
    #[inline(always)]
    pub fn sample(&mut self) -> Sample {
        let lines = Lines::from_bits_truncate(self.port.read(Register::Control)) & CONTROL_LINES;
        Sample {
            clock: lines.contains(Lines::CLOCK),
            data: lines.contains(Lines::DATA),
        }
    }

    /// The lines we are currently pulling ourselves.
    pub fn driven(&self) -> Lines {
        let mut lines = Lines::from_bits_truncate(self.state) & CONTROL_LINES;
        if self.atn_state & Lines::ATN.bits() != 0 {
            lines |= Lines::ATN;
        }
        lines
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Toggle CLK and DATA through a fixed sequence to return every device
    /// on the bus to idle.
    ///
    /// Takes around a fifth of a second, blocking throughout.
    pub fn reset(&mut self) {
        debug!("Bus reset");
        self.set_data();
        self.release_atn();
        self.release_clock();

        for cycle in 0..RESET_CYCLES {
            trace!("Reset cycle {}", cycle);
            block_us!(IEC_T_RESET);
            self.set_clock();
            block_us!(IEC_T_RESET);
            self.release_data();
            block_us!(IEC_T_RESET);
            self.release_clock();
        }

        self.set_data();
        self.release_atn();
        self.set_clock();
        debug!("Bus reset complete");
    }
}
