// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

//! Byte transfer engine tests, run against the simulated C64.

mod common;

use common::{assert_timeouts_balanced, config, context, enable};
use link64_rs::test::c64::{C64, Frame, Received, Stall};
use link64_rs::constants::{IDLE_BUS_STATE, RESET_CYCLES};
use link64_rs::{ErrorCode, Lines, Link64, Register, TransferFlags};

#[test]
fn receive_bits_reconstructs_every_value() {
    let (ctx, _ticker) = context();

    for value in 0..=255u8 {
        let mut c64 = C64::presenting(value);
        let mut driver = Link64::new(&mut c64, &ctx, config());
        assert_eq!(driver.receive_bits(false), value);
        assert_eq!(driver.error(), None);
        drop(driver);

        // Frame acknowledged with DATA
        assert_eq!(c64.acked_frames(), 1, "value 0x{:02x}", value);
    }
    assert_timeouts_balanced(&ctx);
}

#[test]
fn attention_bits_are_not_acknowledged() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::presenting(0x28);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    assert_eq!(driver.receive_bits(true), 0x28);
    drop(driver);
    assert_eq!(c64.acked_frames(), 0);
    assert!(!c64.driver_lines().contains(Lines::DATA));
}

#[test]
fn receive_byte_without_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::talker(&[Frame::data(0x5a)]);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let (value, flags) = driver.receive_byte(false);
    assert_eq!(value, 0x5a);
    assert_eq!(flags, TransferFlags::empty());
    assert_eq!(driver.error(), None);
    drop(driver);

    assert_eq!(c64.acked_frames(), 1);
    assert_eq!(c64.eoi_acks(), 0);
    assert_timeouts_balanced(&ctx);
}

#[test]
fn receive_byte_detects_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::talker(&[Frame::last(0xa5)]);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let (value, flags) = driver.receive_byte(false);
    assert_eq!(value, 0xa5);
    assert!(flags.contains(TransferFlags::EOI));
    assert!(!flags.contains(TransferFlags::SUPPORTED));
    assert_eq!(driver.error(), None);
    drop(driver);

    // EOI acknowledged before the bits were clocked in
    assert_eq!(c64.eoi_acks(), 1);
    assert_eq!(c64.acked_frames(), 1);
    assert_timeouts_balanced(&ctx);
}

#[test]
fn receive_byte_sequence() {
    let (ctx, _ticker) = context();
    let frames = [
        Frame::data(b'L'),
        Frame::data(b'O'),
        Frame::data(b'A'),
        Frame::last(b'D'),
    ];
    let mut c64 = C64::talker(&frames);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    for frame in frames {
        let (value, flags) = driver.receive_byte(false);
        assert_eq!(value, frame.value);
        assert_eq!(flags.contains(TransferFlags::EOI), frame.eoi);
    }
    assert_eq!(driver.error(), None);
    assert_timeouts_balanced(&ctx);
}

#[cfg(not(feature = "all-devices"))]
#[test]
fn attention_byte_for_disabled_device() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::talker(&[Frame::attention(0x28)]);
    let mut driver = Link64::new(&mut c64, &ctx, config().with_drive_atn(true));

    let (value, flags) = driver.receive_byte(true);
    assert_eq!(value, 0x28);
    assert!(!flags.contains(TransferFlags::SUPPORTED));
    drop(driver);

    // No acknowledgement of any kind
    assert_eq!(c64.acked_frames(), 0);
    assert_eq!(c64.driver_lines(), Lines::empty());
    assert_eq!(c64.atn_writes(), 0);
}

#[test]
fn attention_byte_for_enabled_device() {
    let (ctx, _ticker) = context();
    enable(&ctx, 8);
    let mut c64 = C64::talker(&[Frame::attention(0x48)]);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let (value, flags) = driver.receive_byte(true);
    assert_eq!(value, 0x48);
    assert!(flags.contains(TransferFlags::SUPPORTED));
    drop(driver);

    assert_eq!(c64.acked_frames(), 1);
    assert_eq!(c64.driver_lines(), Lines::CLOCK | Lines::DATA);
    // ATN isn't wired by default
    assert_eq!(c64.atn_writes(), 0);
}

#[test]
fn attention_ack_releases_atn_when_driven() {
    let (ctx, _ticker) = context();
    enable(&ctx, 8);
    let mut c64 = C64::talker(&[Frame::attention(0x28)]);
    let mut driver = Link64::new(&mut c64, &ctx, config().with_drive_atn(true));

    let (_, flags) = driver.receive_byte(true);
    assert!(flags.contains(TransferFlags::SUPPORTED));
    drop(driver);
    assert_eq!(c64.atn_writes(), 1);
}

#[test]
fn attention_ack_follows_registry_after_timeout() {
    let (ctx, _ticker) = context();
    enable(&ctx, 15);
    let mut c64 = C64::talker(&[Frame::attention(0x2f)]).stall_at(0, Stall::HoldClock);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    // CLK is never released, so every bit reads as a 1
    let (value, flags) = driver.receive_byte(true);
    assert_eq!(value, 0xff);
    assert_eq!(driver.error(), Some(ErrorCode::ClockWait));
    assert!(flags.contains(TransferFlags::SUPPORTED));
    drop(driver);

    assert_eq!(c64.driver_lines(), Lines::CLOCK | Lines::DATA);
    assert_timeouts_balanced(&ctx);
}

#[test]
fn send_byte_without_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener();
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0x41, false);
    assert_eq!(driver.error(), None);
    drop(driver);

    assert_eq!(
        c64.received(),
        &[Received {
            value: 0x41,
            eoi: false
        }]
    );
    assert_timeouts_balanced(&ctx);
}

#[test]
fn send_byte_with_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener();
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0xc3, true);
    assert_eq!(driver.error(), None);
    drop(driver);

    assert_eq!(
        c64.received(),
        &[Received {
            value: 0xc3,
            eoi: true
        }]
    );
    assert_timeouts_balanced(&ctx);
}

#[test]
fn send_sequence_ends_with_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener();
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let message = b"READY.";
    for (ii, byte) in message.iter().enumerate() {
        driver.send_byte(*byte, ii == message.len() - 1);
        assert_eq!(driver.error(), None);
    }
    drop(driver);

    let received: Vec<u8> = c64.received().iter().map(|r| r.value).collect();
    assert_eq!(received, message);
    let eois: Vec<bool> = c64.received().iter().map(|r| r.eoi).collect();
    assert_eq!(eois, [false, false, false, false, false, true]);
}

//
// Timeouts
//

#[test]
fn talker_never_ready() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::talker(&[Frame::data(0x11)]).stall_at(0, Stall::HoldClock);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let _ = driver.receive_byte(false);
    assert_eq!(driver.error(), Some(ErrorCode::ClockWait));
    assert_timeouts_balanced(&ctx);
}

#[test]
fn talker_stops_mid_byte() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::presenting(0xff).stall_at(0, Stall::BeforeBit(3));
    let mut driver = Link64::new(&mut c64, &ctx, config());

    // The partial byte is returned, and only the error says so
    let _ = driver.receive_bits(false);
    assert_eq!(driver.error(), Some(ErrorCode::ClockWait));
    assert_timeouts_balanced(&ctx);
}

#[test]
fn talker_silent_after_eoi_ack() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::talker(&[Frame::last(0x0d)]).stall_at(0, Stall::AfterEoiAck);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    let (_, flags) = driver.receive_byte(false);
    assert!(flags.contains(TransferFlags::EOI));
    assert_eq!(driver.error(), Some(ErrorCode::TalkerWait));
    assert_timeouts_balanced(&ctx);
}

#[test]
fn listener_never_ready() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener().stall_at(0, Stall::ListenerNotReady);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0x41, false);
    assert_eq!(driver.error(), Some(ErrorCode::ListenerWait));
    assert_timeouts_balanced(&ctx);
}

#[test]
fn listener_never_acknowledges_eoi() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener().stall_at(0, Stall::NoEoiAck);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0x41, true);
    assert_eq!(driver.error(), Some(ErrorCode::EoiResponse));
    assert_timeouts_balanced(&ctx);
}

#[test]
fn listener_never_acknowledges_frame() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener().stall_at(0, Stall::NoFrameAck);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0x41, false);
    assert_eq!(driver.error(), Some(ErrorCode::ClockWait));
    drop(driver);
    assert!(c64.received().is_empty());
    assert_timeouts_balanced(&ctx);
}

#[test]
fn next_operation_clears_error() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener().stall_at(0, Stall::NoFrameAck);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    driver.send_byte(0x41, false);
    assert!(driver.error().is_some());

    **driver.bus_mut().port_mut() = C64::listener();
    driver.send_byte(0x42, false);
    assert_eq!(driver.error(), None);
    assert_eq!(driver.bus().port().received().len(), 1);
}

#[test]
fn bus_reset_pulses_clock() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::idle();
    let driver = Link64::new(&mut c64, &ctx, config().with_reset_on_start(true));
    assert_eq!(ctx.stats().resets, 1);
    drop(driver);

    // One pulse per cycle, plus the final assert
    assert_eq!(c64.clock_asserts(), RESET_CYCLES + 1);
    assert_eq!(c64.driver_lines(), Lines::CLOCK | Lines::DATA);

    let clock = Lines::CLOCK.bits();
    let data = Lines::DATA.bits();
    let mut expected = vec![
        // Idle word, then DATA asserted and CLK released
        IDLE_BUS_STATE,
        IDLE_BUS_STATE | data,
        IDLE_BUS_STATE | data,
    ];
    for _ in 0..RESET_CYCLES {
        expected.push(IDLE_BUS_STATE | data | clock);
        expected.push(IDLE_BUS_STATE | clock);
        expected.push(IDLE_BUS_STATE);
    }
    expected.push(IDLE_BUS_STATE | data);
    expected.push(IDLE_BUS_STATE | data | clock);

    let control: Vec<u8> = c64
        .writes()
        .iter()
        .filter(|(reg, _)| *reg == Register::Control)
        .map(|(_, value)| *value)
        .collect();
    assert_eq!(control, expected);
    assert_eq!(c64.atn_writes(), 0);
}

#[test]
fn failed_wait_does_not_stop_later_waits() {
    let (ctx, _ticker) = context();
    let mut c64 = C64::listener().stall_at(0, Stall::NoEoiAck);
    let mut driver = Link64::new(&mut c64, &ctx, config());

    // The EOI acknowledgement never comes, but the bits and the frame
    // acknowledgement that follow still go through
    driver.send_byte(0x41, true);
    assert_eq!(driver.error(), Some(ErrorCode::EoiResponse));
    assert_eq!(ctx.timeouts().error().get(), None);
    drop(driver);

    assert_eq!(
        c64.received(),
        &[Received {
            value: 0x41,
            eoi: false
        }]
    );
    assert_timeouts_balanced(&ctx);
}
