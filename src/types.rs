//! This module contains general types used by the Link64 driver.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// The role the emulated device currently plays on the bus.  The C64 turns
/// us from listener into talker with a TALK command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// We receive bytes from the C64.
    #[default]
    Listener,

    /// We send bytes to the C64.
    Talker,
}

/// The cable wiring connecting the parallel port to the IEC bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cable {
    /// X1541 style cable.  The only wiring the driver supports.
    #[default]
    X1541,

    /// Trans64 cable.  Selectable from the control panel, but the driver
    /// has no line mapping for it.
    Trans64,
}

impl core::fmt::Display for Cable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Cable::X1541 => write!(f, "X1541 Cable"),
            Cable::Trans64 => write!(f, "Trans64 Cable"),
        }
    }
}
