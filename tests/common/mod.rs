// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![allow(dead_code)]

use std::sync::Arc;

use embassy_time::Duration;
use link64_rs::{Config, Context, Ticker};

/// Fast enough that a stalled wait gives up in a few tens of ms, slow
/// enough that a healthy wait never gets near its deadline.
pub const TEST_TICK: Duration = Duration::from_millis(2);

pub fn context() -> (Arc<Context>, Ticker) {
    let ctx = Arc::new(Context::new());
    let ticker = Ticker::spawn(ctx.clone(), TEST_TICK);
    (ctx, ticker)
}

/// Driver config for tests: no start-up reset, so the simulated C64 sees
/// only the exchange under test.
pub fn config() -> Config {
    Config::new().with_reset_on_start(false)
}

pub fn enable(ctx: &Context, addr: u8) {
    ctx.open()
        .and_then(|session| session.enable_device(addr))
        .expect("enable device");
}

/// Every armed deadline was cancelled, and nothing is left armed.
pub fn assert_timeouts_balanced(ctx: &Context) {
    let stats = ctx.timeouts().stats();
    assert!(stats.is_balanced(), "unbalanced timeouts: {:?}", stats);
    assert!(!ctx.timeouts().is_armed());
}
