//! This file handles access to the parallel port registers the Link64 cable
//! is wired to.
//!
//! The core only ever sees the [`Port`] trait, so the same protocol code
//! runs against real hardware ([`DevPort`] on Linux) or the simulated C64
//! used by the tests.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// The parallel port registers used by the cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Base + 1.  ATN would be driven here, were the cable wired for it.
    Status,

    /// Base + 2.  CLK and DATA are driven and sampled here.
    Control,
}

impl Register {
    /// Offset of the register from the port's base address.
    pub const fn offset(self) -> u16 {
        match self {
            Register::Status => crate::constants::STATUS_REGISTER_OFFSET,
            Register::Control => crate::constants::CONTROL_REGISTER_OFFSET,
        }
    }
}

/// Byte-wide register access.  A set bit drives the corresponding line low,
/// and reads return the current level of every line on the register, after
/// the open-collector AND with the other devices on the bus.
pub trait Port {
    fn read(&mut self, reg: Register) -> u8;
    fn write(&mut self, reg: Register, value: u8);
}

impl<P: Port + ?Sized> Port for &mut P {
    fn read(&mut self, reg: Register) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u8) {
        (**self).write(reg, value)
    }
}

#[cfg(all(feature = "std", unix))]
pub use dev_port::DevPort;

#[cfg(all(feature = "std", unix))]
mod dev_port {
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::FileExt;

    use super::{Port, Register};
    use crate::constants::PORT_BASE_ADDR;
    use crate::fmt::{error, info};

    /// Raw port I/O through `/dev/port`.  Needs CAP_SYS_RAWIO.
    pub struct DevPort {
        file: File,
        base: u16,
    }

    impl DevPort {
        /// Open `/dev/port` for the port at the standard base address.
        pub fn open() -> std::io::Result<Self> {
            Self::open_at(PORT_BASE_ADDR)
        }

        pub fn open_at(base: u16) -> std::io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/port")?;
            info!("Opened parallel port at 0x{:04x}", base);
            Ok(Self { file, base })
        }

        fn addr(&self, reg: Register) -> u64 {
            u64::from(self.base + reg.offset())
        }
    }

    impl Port for DevPort {
        fn read(&mut self, reg: Register) -> u8 {
            let mut buf = [0u8; 1];
            if self.file.read_at(&mut buf, self.addr(reg)).is_err() {
                // Reads as all lines released
                error!("Port read of {:?} failed", reg);
                return 0;
            }
            buf[0]
        }

        fn write(&mut self, reg: Register, value: u8) {
            if self.file.write_at(&[value], self.addr(reg)).is_err() {
                error!("Port write of {:?} failed", reg);
            }
        }
    }
}
