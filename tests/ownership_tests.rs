//! Channel ownership under random interleavings of mode changes, test
//! requests and polls

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uart_link::channel::{LinkContext, SharedUartChannel};
use uart_link::config::{MemoryStore, Mode, SerialLinkConfig};
use uart_link::diagnostics::{DiagnosticsControl, DiagnosticsEngine, DiagnosticsUpdate};
use uart_link::hal::{EchoMode, SimUart};
use uart_link::mode::ModeUpdate;
use uart_link::serial::{LiveSerialReader, SerialControl, SerialUpdate, SuspendReason};
use uart_link::state::{NullSink, RecordingSink};
use uart_link::{UartLink, UartOwnership};

type Link = UartLink<SimUart, MemoryStore>;

fn toggle(kind: u32, on: bool, total: u32) -> DiagnosticsUpdate {
    let mut update = DiagnosticsUpdate::default();
    match kind {
        0 => update.loopback_enabled = Some(on),
        1 => update.baud_scan_enabled = Some(on),
        _ => {
            update.signal_test_enabled = Some(on);
            update.signal_total_packets = Some(total);
        }
    }
    update
}

fn check_ownership(link: &Link, sim: &SimUart) {
    let engine = link.engine();
    let reader = link.reader();

    match link.channel().ownership() {
        UartOwnership::OwnedByLiveReader => {
            assert!(!reader.is_suspended());
            assert!(!engine.any_enabled());
            assert_eq!(link.mode(), Mode::LiveMonitoring);
        }
        UartOwnership::OwnedByDiagnostics => {
            assert!(engine.any_enabled());
            assert!(reader.is_suspended_for(SuspendReason::Diagnostics));
        }
        UartOwnership::Released => assert!(!sim.is_open()),
    }

    let enabled = [
        engine.loopback().enabled,
        engine.baud_scan().enabled,
        engine.signal().enabled,
    ];
    assert!(enabled.iter().filter(|&&e| e).count() <= 1);

    if link.mode() == Mode::Diagnostics {
        assert!(reader.is_suspended_for(SuspendReason::Mode));
    }
}

/// After two quiet ticks the channel has settled on its rightful owner.
fn check_settled(link: &Link) {
    let expected = if link.engine().any_enabled() && link.engine().has_hardware() {
        UartOwnership::OwnedByDiagnostics
    } else if !link.engine().any_enabled() && link.mode() == Mode::LiveMonitoring {
        UartOwnership::OwnedByLiveReader
    } else {
        UartOwnership::Released
    };
    assert_eq!(link.channel().ownership(), expected);
}

#[test]
fn test_single_owner_under_random_requests() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let sim = SimUart::new();
        sim.set_echo(if seed % 2 == 0 { EchoMode::Exact } else { EchoMode::Off });
        sim.script_on_open(9600, b"ST,GS, 1.00 kg\n".repeat(3).as_slice());

        let mut link = UartLink::new(sim.clone(), MemoryStore::new());
        let mut sink = RecordingSink::new();
        let mut now = 0u64;
        link.begin(now, &mut sink);
        check_ownership(&link, &sim);

        for _ in 0..300 {
            now += rng.gen_range(1..50_000);
            match rng.gen_range(0..10) {
                0 => {
                    let name = if rng.gen_bool(0.5) { "live" } else { "diagnostics" };
                    link.update_mode(&ModeUpdate { mode: name.into() }, "test", now, &mut sink);
                }
                1 | 2 => {
                    let update = toggle(rng.gen_range(0..3), true, rng.gen_range(0..20));
                    link.update_diagnostics(&update, "test", now, &mut sink);
                }
                3 => {
                    let update = toggle(rng.gen_range(0..3), false, 0);
                    link.update_diagnostics(&update, "test", now, &mut sink);
                }
                4 => {
                    let update = SerialUpdate {
                        baud_rate: Some(if rng.gen_bool(0.5) { 9600 } else { 115200 }),
                        ..Default::default()
                    };
                    link.update_serial(&update, "test", now, &mut sink);
                }
                _ => link.poll(now, &mut sink),
            }
            check_ownership(&link, &sim);
        }

        for _ in 0..2 {
            now += 10_000;
            link.poll(now, &mut sink);
        }
        check_ownership(&link, &sim);
        check_settled(&link);
    }
}

#[test]
fn test_stop_all_tests_idempotent() {
    let sim = SimUart::loopback();
    let mut channel = SharedUartChannel::new(sim.clone());
    let mut sink = NullSink;
    let mut reader = LiveSerialReader::new(SerialLinkConfig::default());
    let mut engine = DiagnosticsEngine::new();
    let mut cx = LinkContext::new(&mut channel, &mut sink, 0);

    reader.begin(&mut cx);
    engine.update(&toggle(0, true, 0), "test", &mut reader, &mut cx);
    assert_eq!(cx.channel.ownership(), UartOwnership::OwnedByDiagnostics);

    engine.stop_all_tests(&mut reader, &mut cx);
    engine.stop_all_tests(&mut reader, &mut cx);

    assert!(!engine.any_enabled());
    assert_eq!(cx.channel.ownership(), UartOwnership::OwnedByLiveReader);
    // begin, test, reader again
    assert_eq!(sim.open_count(), 3);
}

#[test]
fn test_resume_waits_for_every_reason() {
    let sim = SimUart::new();
    let mut channel = SharedUartChannel::new(sim.clone());
    let mut sink = NullSink;
    let mut reader = LiveSerialReader::new(SerialLinkConfig::default());
    let mut cx = LinkContext::new(&mut channel, &mut sink, 0);

    // Resume before begin never opens
    reader.resume(SuspendReason::Mode, &mut cx);
    assert_eq!(cx.channel.ownership(), UartOwnership::Released);

    reader.suspend(SuspendReason::Diagnostics, &mut cx);
    reader.begin(&mut cx);
    assert_eq!(cx.channel.ownership(), UartOwnership::Released);

    reader.resume(SuspendReason::Diagnostics, &mut cx);
    assert_eq!(cx.channel.ownership(), UartOwnership::OwnedByLiveReader);
}
