//! This module implements the attention handler - the IEC protocol state
//! machine run each time the C64 asserts ATN.
//!
//! The C64 sends an attention byte carrying a command in the high nibble
//! and a device address in the low nibble.  If the device is one of ours
//! and the command is LISTEN or TALK, a secondary address (channel) byte
//! follows.  TALK then hands the bus over, so we become the talker.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::constants::{COMMAND_MASK, DEVICE_MASK};
use crate::driver::Context;
use crate::fmt::{debug, info, warn};
use crate::iec::transfer::{Engine, TransferFlags};
use crate::infra::port::Port;
use crate::registry::Request;
use crate::timeout::ErrorCode;
use crate::types::Role;

/// Attention byte commands, decoded from the high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// 0x20 - the addressed device is to receive data
    Listen,
    /// 0x3F
    Unlisten,
    /// 0x40 - the addressed device is to send data
    Talk,
    /// 0x5F
    Untalk,
    /// 0x60 - secondary address for a data transfer
    SendData,
    /// 0xE0
    CloseFile,
    /// 0xF0
    OpenFile,
    /// Any other high nibble.  Holds the nibble.
    Unknown(u8),
}

impl Command {
    pub const LISTEN: u8 = 0x20;
    pub const UNLISTEN: u8 = 0x3F;
    pub const TALK: u8 = 0x40;
    pub const UNTALK: u8 = 0x5F;
    pub const DATA: u8 = 0x60;
    pub const CLOSE: u8 = 0xE0;
    pub const OPEN: u8 = 0xF0;

    /// Decode the command from an attention byte.
    pub const fn from_byte(byte: u8) -> Self {
        match byte & COMMAND_MASK {
            0x20 => Command::Listen,
            0x30 => Command::Unlisten,
            0x40 => Command::Talk,
            0x50 => Command::Untalk,
            0x60 => Command::SendData,
            0xE0 => Command::CloseFile,
            0xF0 => Command::OpenFile,
            other => Command::Unknown(other),
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::Listen => write!(f, "LISTEN"),
            Command::Unlisten => write!(f, "UNLISTEN"),
            Command::Talk => write!(f, "TALK"),
            Command::Untalk => write!(f, "UNTALK"),
            Command::SendData => write!(f, "DATA"),
            Command::CloseFile => write!(f, "CLOSE"),
            Command::OpenFile => write!(f, "OPEN"),
            Command::Unknown(nibble) => write!(f, "Unknown(0x{:02x})", nibble),
        }
    }
}

/// Where the attention handler has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    #[default]
    Idle,
    AttentionByteReceived,
    ListenPendingChannel,
    TalkPendingChannel,
    /// We are the talker, ready to send bytes.  Left by the next attention
    /// event.
    DirectionReversed,
}

/// The result of handling one attention event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The attention byte addressed a device we have not enabled.
    NotForUs { address: u8 },

    /// We have been told to listen.  The request is pending in the
    /// registry.
    Listen(Request),

    /// We have been told to talk, and the bus has been turned around.
    Talk(Request),

    /// An enabled device was addressed with a command we don't handle.
    Unhandled { command: Command, device: u8 },

    /// A wait timed out part way through.
    TimedOut(ErrorCode),
}

// Check for a failed wait after a step, bailing out of the handler if one
// timed out.
macro_rules! check_timeout {
    ($ctx:expr, $phase:expr) => {
        if let Some(code) = $ctx.timeouts().failure().get() {
            warn!("Attention handling timed out in {:?}: {}", *$phase, code);
            *$phase = Phase::Idle;
            return Outcome::TimedOut(code);
        }
    };
}

/// Handle one attention event, leaving `phase` where the handler finished.
pub(crate) fn handle_attention<P: Port>(
    engine: &mut Engine<'_, P>,
    ctx: &Context,
    phase: &mut Phase,
) -> Outcome {
    *phase = Phase::Idle;

    let (byte, flags) = engine.receive_byte(true);
    check_timeout!(ctx, phase);
    *phase = Phase::AttentionByteReceived;

    if !flags.contains(TransferFlags::SUPPORTED) {
        debug!("Attention byte 0x{:02x} not for us", byte);
        *phase = Phase::Idle;
        return Outcome::NotForUs {
            address: byte & DEVICE_MASK,
        };
    }

    ctx.with_registry(|registry| registry.set_device(byte));

    let command = Command::from_byte(byte);
    let role = match command {
        Command::Listen => {
            *phase = Phase::ListenPendingChannel;
            Role::Listener
        }
        Command::Talk => {
            *phase = Phase::TalkPendingChannel;
            Role::Talker
        }
        other => {
            info!("Unhandled command {} for device {}", other, byte & DEVICE_MASK);
            ctx.count_unhandled();
            *phase = Phase::Idle;
            return Outcome::Unhandled {
                command: other,
                device: byte & DEVICE_MASK,
            };
        }
    };

    let (channel, _) = engine.receive_byte(false);
    check_timeout!(ctx, phase);
    let request = ctx.with_registry(|registry| registry.record(channel, role));
    info!(
        "{} device 0x{:02x} channel 0x{:02x}",
        command, request.device, request.channel
    );

    match role {
        Role::Listener => {
            *phase = Phase::Idle;
            Outcome::Listen(request)
        }
        Role::Talker => {
            engine.turnaround();
            check_timeout!(ctx, phase);
            *phase = Phase::DirectionReversed;
            Outcome::Talk(request)
        }
    }
}
