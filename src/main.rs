//! Weighsoft UART Link - Main entry point
//!
//! On the ESP32 this brings up UART2 and NVS and runs the control loop.
//! On a host build the same loop runs against a simulated loopback wire
//! and performs one loopback test.

use core::fmt;

use uart_link::config::{MemoryStore, MigrationResult, PersistedSettings, SettingsStore, StoreError};
use uart_link::state::{StateSink, Topic};
use uart_link::{LogDrain, LINK_LOG};

/// Console sink for the log drain.
struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print!("{}", s);
        Ok(())
    }
}

/// Prints every state change; stands in for the WebSocket broadcast.
struct ConsoleSink;

impl StateSink for ConsoleSink {
    fn state_changed(&mut self, topic: Topic, origin: &str) {
        println!("state changed: {} ({})", topic.as_str(), origin);
    }
}

/// NVS when available, RAM otherwise.
#[allow(dead_code)]
enum Store<N: SettingsStore> {
    Flash(N),
    Ram(MemoryStore),
}

impl<N: SettingsStore> SettingsStore for Store<N> {
    fn load(&mut self, settings: &mut PersistedSettings) -> Result<MigrationResult, StoreError> {
        match self {
            Store::Flash(s) => s.load(settings),
            Store::Ram(s) => s.load(settings),
        }
    }

    fn save(&mut self, settings: &PersistedSettings) -> Result<(), StoreError> {
        match self {
            Store::Flash(s) => s.save(settings),
            Store::Ram(s) => s.save(settings),
        }
    }
}

#[cfg(target_os = "espidf")]
fn main() -> Result<(), esp_idf_svc::sys::EspError> {
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys as esp_idf_sys;
    use uart_link::config::NvsStore;
    use uart_link::hal::EspUart;
    use uart_link::UartLink;

    esp_idf_sys::link_patches();
    println!("{}", env!("VERSION_STRING"));

    let peripherals = Peripherals::take()?;
    let port = EspUart::new(peripherals.uart2, peripherals.pins.gpio17, peripherals.pins.gpio16);

    let store = match EspDefaultNvsPartition::take()
        .map_err(StoreError::InitFailed)
        .and_then(NvsStore::new)
    {
        Ok(nvs) => Store::Flash(nvs),
        Err(e) => {
            println!("NVS unavailable ({}), settings will not persist", e);
            Store::Ram(MemoryStore::new())
        }
    };

    let mut link = UartLink::new(port, store);
    let mut sink = ConsoleSink;
    let mut drain = LogDrain::new();

    link.begin(timestamp_us(), &mut sink);

    loop {
        let now_us = timestamp_us();
        link.poll(now_us, &mut sink);
        drain.drain_to(&LINK_LOG, now_us, &mut Stdout);

        unsafe {
            esp_idf_sys::vTaskDelay(1);
        }
    }
}

#[cfg(target_os = "espidf")]
fn timestamp_us() -> u64 {
    unsafe { esp_idf_svc::sys::esp_timer_get_time() as u64 }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use uart_link::hal::SimUart;
    use uart_link::UartLink;

    const TICK_US: u64 = 10_000;

    let mut link: UartLink<SimUart, Store<MemoryStore>> =
        UartLink::new(SimUart::loopback(), Store::Ram(MemoryStore::new()));
    let mut sink = ConsoleSink;
    let mut drain = LogDrain::new();

    link.begin(0, &mut sink);
    let requests = [
        ("uart_mode", r#"{"mode":"diagnostics"}"#),
        ("diagnostics", r#"{"loopback_enabled":true}"#),
    ];
    for (topic, body) in requests {
        if let Err(e) = link.update_json(topic, body, "console", 0, &mut sink) {
            println!("{}", e);
        }
    }

    let mut now_us = 0;
    while now_us < 2_000_000 {
        now_us += TICK_US;
        link.poll(now_us, &mut sink);
        drain.drain_to(&LINK_LOG, now_us, &mut Stdout);
    }

    match link.read_json("diagnostics", now_us) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("{}", e),
    }
}
