//! The timeout service bounds every wait the protocol engine makes.
//!
//! A wait arms a single one-shot deadline, busy-polls the bus, and cancels
//! the deadline again on every exit path.  Deadlines are measured in coarse
//! ticks, driven by a separate context calling [`TimeoutService::tick`] - a
//! thread on the host (see [`Ticker`](crate::Ticker)), or a timer interrupt.
//!
//! Arming a deadline clears the shared current error.  When a deadline
//! passes, the tick context stores the deadline's [`ErrorCode`] as the
//! current error, which the polling loop sees and gives up.  Later waits
//! arm afresh and poll again.  So that a failure part way through an
//! operation isn't lost when the next wait clears the current error, the
//! first failure is also latched in a separate cell, which stays set until
//! [`TimeoutService::clear`].
//!
//! The two contexts share nothing else: the cells are atomic, and both are
//! only written by arm and expiry inside the short critical section
//! guarding the armed deadline.  A deadline which fires just as its wait
//! succeeds can't then clobber the next wait's error.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use crate::fmt::{trace, warn};

/// The errors a timed out wait can raise.  Raw values match the codes used
/// by the Link64 kernel interface.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    /// The other side didn't move CLK when expected.
    ClockWait = 1,

    /// The talker didn't signal it was ready after an EOI acknowledgement.
    TalkerWait = 2,

    /// The listener didn't signal it was ready for data.
    ListenerWait = 3,

    /// The listener didn't acknowledge EOI.
    EoiResponse = 4,
}

impl ErrorCode {
    /// Convert a raw error cell value, returning `None` for 0 (no error) or
    /// an unknown value.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ClockWait),
            2 => Some(Self::TalkerWait),
            3 => Some(Self::ListenerWait),
            4 => Some(Self::EoiResponse),
            _ => None,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ErrorCode::ClockWait => write!(f, "timed out waiting for CLK"),
            ErrorCode::TalkerWait => write!(f, "timed out waiting for talker"),
            ErrorCode::ListenerWait => write!(f, "timed out waiting for listener"),
            ErrorCode::EoiResponse => write!(f, "timed out waiting for EOI response"),
        }
    }
}

/// An atomic error indicator, 0 meaning no error.
pub struct ErrorCell(AtomicU8);

impl Default for ErrorCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// The current error, if any.
    pub fn get(&self) -> Option<ErrorCode> {
        ErrorCode::from_raw(self.0.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }

    /// Store `code`, replacing any error already held.
    pub fn set(&self, code: ErrorCode) {
        self.0.store(code as u8, Ordering::Release);
    }

    /// Latch `code` unless an error is already held.  Returns whether this
    /// call set the cell.
    pub fn latch(&self, code: ErrorCode) -> bool {
        self.0
            .compare_exchange(0, code as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The longest deadline [`TimeoutService::arm`] accepts.  Larger budgets
/// are clamped, as the wrapping tick comparison can't see further ahead.
pub const MAX_TIMEOUT_TICKS: u32 = i32::MAX as u32;

/// Identifies one armed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeoutHandle(u32);

#[derive(Clone, Copy)]
struct Armed {
    handle: TimeoutHandle,
    deadline: u32,
    code: ErrorCode,
}

/// Counters used to check every arm is balanced by a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeoutStats {
    /// Deadlines armed.
    pub armed: u32,

    /// Cancel calls, whether or not the deadline had already fired.
    pub cancelled: u32,

    /// Deadlines which fired before being cancelled.
    pub expired: u32,

    /// Deadlines replaced by a new arm before being cancelled.
    pub leaked: u32,
}

impl TimeoutStats {
    /// True if every armed deadline has been cancelled and none leaked.
    pub fn is_balanced(&self) -> bool {
        self.armed == self.cancelled && self.leaked == 0
    }
}

/// One-shot deadline service with a shared error cell.
pub struct TimeoutService {
    error: ErrorCell,
    failure: ErrorCell,
    now: AtomicU32,
    next_id: AtomicU32,
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<Armed>>>,
    armed: AtomicU32,
    cancelled: AtomicU32,
    expired: AtomicU32,
    leaked: AtomicU32,
}

impl Default for TimeoutService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutService {
    pub const fn new() -> Self {
        Self {
            error: ErrorCell::new(),
            failure: ErrorCell::new(),
            now: AtomicU32::new(0),
            next_id: AtomicU32::new(0),
            slot: Mutex::new(RefCell::new(None)),
            armed: AtomicU32::new(0),
            cancelled: AtomicU32::new(0),
            expired: AtomicU32::new(0),
            leaked: AtomicU32::new(0),
        }
    }

    /// The current error.  0 while a deadline is armed, until it fires.
    pub fn error(&self) -> &ErrorCell {
        &self.error
    }

    /// The first error raised since the last [`clear`](Self::clear).
    pub fn failure(&self) -> &ErrorCell {
        &self.failure
    }

    /// Clear the current error and the latched failure, at the start of an
    /// operation.
    pub fn clear(&self) {
        self.slot.lock(|_| {
            self.error.clear();
            self.failure.clear();
        });
    }

    /// The current tick count.
    pub fn now(&self) -> u32 {
        self.now.load(Ordering::Acquire)
    }

    /// Arm a deadline `ticks` ticks from now, clearing the current error.
    /// If it is not cancelled before then, `code` becomes the current error.
    ///
    /// `ticks` is clamped to [`MAX_TIMEOUT_TICKS`].
    pub fn arm(&self, ticks: u32, code: ErrorCode) -> TimeoutHandle {
        let handle = TimeoutHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let replaced = self.slot.lock(|slot| {
            let deadline = self.now().wrapping_add(ticks.min(MAX_TIMEOUT_TICKS));
            self.error.clear();
            slot.borrow_mut().replace(Armed {
                handle,
                deadline,
                code,
            })
        });
        self.armed.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = replaced {
            warn!("Timeout {:?} replaced before being cancelled", old.handle);
            self.leaked.fetch_add(1, Ordering::Relaxed);
        }

        handle
    }

    /// Cancel a deadline.  A no-op if it has already fired.
    pub fn cancel(&self, handle: TimeoutHandle) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some_and(|armed| armed.handle == handle) {
                *slot = None;
            }
        });
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Advance time by one tick, firing the armed deadline if it is due.
    ///
    /// Called from the tick context.
    pub fn tick(&self) {
        let now = self.now.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

        let fired = self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            match *slot {
                // Wrapping comparison - deadline reached once now has
                // moved past it.
                Some(armed) if now.wrapping_sub(armed.deadline) as i32 >= 0 => {
                    *slot = None;
                    self.error.set(armed.code);
                    self.failure.latch(armed.code);
                    Some(armed)
                }
                _ => None,
            }
        });

        if let Some(armed) = fired {
            trace!("Timeout {:?} fired: {:?}", armed.handle, armed.code);
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Whether a deadline is currently armed.
    pub fn is_armed(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().is_some())
    }

    pub fn stats(&self) -> TimeoutStats {
        TimeoutStats {
            armed: self.armed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            leaked: self.leaked.load(Ordering::Relaxed),
        }
    }

    /// Busy-poll `condition` under a deadline of `ticks`, raising `code` if
    /// it expires.
    ///
    /// Arming clears the current error, so this polls even if an earlier
    /// wait has failed, and gives up only when its own deadline fires.
    /// Returns whether the condition was met.
    #[inline(always)]
    pub fn wait_until<F>(&self, ticks: u32, code: ErrorCode, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let handle = self.arm(ticks, code);
        let reached = loop {
            if condition() {
                break true;
            }
            if self.error.is_set() {
                break false;
            }
        };
        self.cancel(handle);
        reached
    }
}
