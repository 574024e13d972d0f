//! Global log stream tests
//!
//! Kept in their own binary: every test here shares `LINK_LOG`.

use uart_link::config::MemoryStore;
use uart_link::hal::SimUart;
use uart_link::state::NullSink;
use uart_link::{LogDrain, UartLink, LINK_LOG};

#[test]
fn test_startup_is_logged() {
    let sim = SimUart::new();
    sim.fail_next_open();
    let mut link = UartLink::new(sim, MemoryStore::new());
    link.begin(1_500, &mut NullSink);

    let mut out = String::new();
    let written = LogDrain::new().drain_to(&LINK_LOG, 1_500, &mut out);

    assert!(written > 0);
    assert_eq!(LINK_LOG.pending(), 0);
    assert!(out.contains("INFO System: Services registered"));
    assert!(out.contains("INFO UartMode: Loaded mode: live"));
    assert!(out.contains("WARN Serial: No hardware access: C04"));
    assert!(out.lines().all(|l| l.starts_with('[')));
}
