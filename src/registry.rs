//! The device registry: which IEC device addresses we answer to, and the
//! device and channel most recently addressed by LISTEN or TALK.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::constants::MAX_DEVICES;
use crate::driver::DriverError;
use crate::fmt::info;
use crate::types::Role;

/// A LISTEN or TALK addressed to one of our devices, waiting to be
/// serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    /// The raw attention byte, command nibble included.
    pub device: u8,

    /// The raw secondary address byte.
    pub channel: u8,

    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: [bool; MAX_DEVICES],
    current_device: u8,
    current_channel: u8,
    request_pending: bool,
    role: Role,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DeviceRegistry {
    pub const fn new(all_enabled: bool) -> Self {
        Self {
            devices: [all_enabled; MAX_DEVICES],
            current_device: 0,
            current_channel: 0,
            request_pending: false,
            role: Role::Listener,
        }
    }

    fn check(addr: u8) -> Result<usize, DriverError> {
        let index = addr as usize;
        if index < MAX_DEVICES {
            Ok(index)
        } else {
            Err(DriverError::InvalidDevice(addr))
        }
    }

    pub fn enable(&mut self, addr: u8) -> Result<(), DriverError> {
        let index = Self::check(addr)?;
        self.devices[index] = true;
        info!("Device {} enabled", addr);
        Ok(())
    }

    pub fn disable(&mut self, addr: u8) -> Result<(), DriverError> {
        let index = Self::check(addr)?;
        self.devices[index] = false;
        info!("Device {} disabled", addr);
        Ok(())
    }

    /// Out of range addresses are never enabled.
    pub fn is_enabled(&self, addr: u8) -> bool {
        self.devices.get(addr as usize).copied().unwrap_or(false)
    }

    pub fn current_device(&self) -> u8 {
        self.current_device
    }

    pub fn current_channel(&self) -> u8 {
        self.current_channel
    }

    pub fn request_pending(&self) -> bool {
        self.request_pending
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Record the attention byte, before its command is known.
    pub fn set_device(&mut self, device: u8) {
        self.current_device = device;
    }

    /// Record the channel for a LISTEN or TALK, and mark the request
    /// pending.
    pub fn record(&mut self, channel: u8, role: Role) -> Request {
        self.current_channel = channel;
        self.request_pending = true;
        self.role = role;
        Request {
            device: self.current_device,
            channel,
            role,
        }
    }

    /// Return and clear the pending request, if there is one.
    pub fn take_request(&mut self) -> Option<Request> {
        if !self.request_pending {
            return None;
        }
        self.request_pending = false;
        Some(Request {
            device: self.current_device,
            channel: self.current_channel,
            role: self.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_nothing_enabled() {
        let registry = DeviceRegistry::default();
        assert!((0..16).all(|addr| !registry.is_enabled(addr)));
        assert!(!registry.request_pending());
    }

    #[test]
    fn all_enabled_build() {
        let registry = DeviceRegistry::new(true);
        assert!((0..16).all(|addr| registry.is_enabled(addr)));
        assert!(!registry.is_enabled(16));
    }

    #[test]
    fn enable_rejects_out_of_range() {
        let mut registry = DeviceRegistry::default();
        assert_eq!(registry.enable(16), Err(DriverError::InvalidDevice(16)));
        assert_eq!(registry.disable(255), Err(DriverError::InvalidDevice(255)));
        registry.enable(8).unwrap();
        assert!(registry.is_enabled(8));
        registry.disable(8).unwrap();
        assert!(!registry.is_enabled(8));
    }

    #[test]
    fn take_request_drains() {
        let mut registry = DeviceRegistry::default();
        registry.set_device(0x28);
        let request = registry.record(0x61, Role::Listener);
        assert_eq!(request.device, 0x28);
        assert_eq!(registry.take_request(), Some(request));
        assert_eq!(registry.take_request(), None);
        // Device and channel stay for the status dump
        assert_eq!(registry.current_channel(), 0x61);
    }
}
