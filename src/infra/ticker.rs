//! Host tick source for the timeout service.
//!
//! On the host there is no timer interrupt to drive the timeout service, so
//! a thread sleeps for one tick period at a time and calls
//! [`TimeoutService::tick`](crate::TimeoutService::tick).  It runs
//! independently of the thread doing the bus I/O, which is what lets a
//! stalled busy-wait be broken out of.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use embassy_time::Duration;
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::constants::TICK_PERIOD;
use crate::driver::Context;
use crate::fmt::{debug, warn};

/// Drives a [`Context`]'s timeout service until dropped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start ticking `ctx` at the standard tick period.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self::spawn(ctx, TICK_PERIOD)
    }

    /// Start ticking `ctx` every `period`.
    pub fn spawn(ctx: Arc<Context>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let sleep = std::time::Duration::from_micros(period.as_micros());

        debug!("Starting ticker, period {}us", period.as_micros());
        let handle = std::thread::spawn(move || {
            while !thread_stop.load(Ordering::Acquire) {
                std::thread::sleep(sleep);
                ctx.timeouts().tick();
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
