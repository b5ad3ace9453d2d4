//! This module contains constants for the Link64 driver.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use embassy_time::Duration;
use static_assertions::{const_assert, const_assert_eq};

//
// Parallel port
//

/// I/O base address of the parallel port the Link64 cable is attached to.
pub const PORT_BASE_ADDR: u16 = 0x3BC;

/// Offset of the status register.  A driven ATN line would be written here.
pub const STATUS_REGISTER_OFFSET: u16 = 1;

/// Offset of the control register, carrying CLK and DATA.
pub const CONTROL_REGISTER_OFFSET: u16 = 2;

/// The control register value written at start-up.  CLK and DATA are
/// released; the remaining bits are the port's own control bits, including
/// the interrupt enable.
pub const IDLE_BUS_STATE: u8 = 0xd4;

//
// Devices
//

/// Number of addressable IEC devices.  Attention bytes carry the device in
/// the low nibble.
pub const MAX_DEVICES: usize = 16;

/// Mask selecting the device address from an attention byte.
pub const DEVICE_MASK: u8 = 0x0F;

/// Mask selecting the command from an attention byte.
pub const COMMAND_MASK: u8 = 0xF0;

const_assert_eq!(MAX_DEVICES, DEVICE_MASK as usize + 1);

//
// Timeouts
//

/// How long a single guarded wait may take before its timeout fires, in
/// ticks.
pub const STD_TIMEOUT_TICKS: u32 = 10;

/// The period of one timeout tick.  Matches a jiffy on a HZ=100 kernel.
pub const TICK_PERIOD: Duration = Duration::from_millis(10);

const_assert!(STD_TIMEOUT_TICKS > 1);

//
// Bus reset
//

/// Number of CLK/DATA toggle cycles in a bus reset.
pub const RESET_CYCLES: usize = 18;

//
// Control panel
//

/// Maximum length of the server root directory.
pub const MAX_ROOT_DIR_LEN: usize = 255;
