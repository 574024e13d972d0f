//! Loopback test: TX bridged to RX, every packet must come back verbatim.

use alloc::format;
use alloc::string::String;
use serde::Serialize;

/// Packet period.
pub const LOOPBACK_INTERVAL_US: u64 = 100_000;

/// Minimum share of good echoes, in percent, for a pass.
pub const PASS_THRESHOLD_PERCENT: u64 = 95;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopbackStatus {
    #[default]
    Idle,
    Running,
    Pass,
    Fail,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopbackTest {
    pub enabled: bool,
    pub status: LoopbackStatus,
    pub tx_count: u32,
    pub rx_count: u32,
    pub error_count: u32,
    pub last_sent: String,
    pub last_received: String,
    pub start_time_us: u64,
    last_send_us: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoopbackSnapshot {
    pub enabled: bool,
    pub status: LoopbackStatus,
    pub tx_count: u32,
    pub rx_count: u32,
    pub error_count: u32,
    pub success_rate: f32,
    pub last_test: String,
    pub last_received: String,
    pub uptime_seconds: u64,
}

impl LoopbackTest {
    /// Reset counters and start running.
    pub fn start(&mut self, now_us: u64) {
        *self = Self {
            enabled: true,
            status: LoopbackStatus::Running,
            start_time_us: now_us,
            last_send_us: now_us,
            ..Self::default()
        };
    }

    /// External stop.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.status = LoopbackStatus::Idle;
    }

    pub fn send_due(&self, now_us: u64) -> bool {
        now_us.saturating_sub(self.last_send_us) >= LOOPBACK_INTERVAL_US
    }

    /// Next packet to transmit; counts it as sent.
    pub fn next_packet(&mut self, now_us: u64) -> &str {
        self.last_sent = format!("TEST:{}", self.tx_count);
        self.tx_count += 1;
        self.last_send_us = now_us;
        &self.last_sent
    }

    pub fn on_line(&mut self, line: &str) {
        self.rx_count += 1;
        if line != self.last_sent {
            self.error_count += 1;
        }
        self.last_received.clear();
        self.last_received.push_str(line);

        let good = u64::from(self.rx_count.saturating_sub(self.error_count));
        let sent = u64::from(self.tx_count);
        self.status = if sent > 0 && good * 100 >= PASS_THRESHOLD_PERCENT * sent {
            LoopbackStatus::Pass
        } else {
            LoopbackStatus::Fail
        };
    }

    /// Good echoes over packets sent, in percent.
    pub fn success_rate(&self) -> f32 {
        if self.tx_count == 0 {
            return 0.0;
        }
        self.rx_count.saturating_sub(self.error_count) as f32 * 100.0 / self.tx_count as f32
    }

    pub fn snapshot(&self, now_us: u64) -> LoopbackSnapshot {
        LoopbackSnapshot {
            enabled: self.enabled,
            status: self.status,
            tx_count: self.tx_count,
            rx_count: self.rx_count,
            error_count: self.error_count,
            success_rate: self.success_rate(),
            last_test: self.last_sent.clone(),
            last_received: self.last_received.clone(),
            uptime_seconds: if self.enabled {
                now_us.saturating_sub(self.start_time_us) / 1_000_000
            } else {
                0
            },
        }
    }
}
