//! Signal quality test: timestamped packets over a loopback, measuring
//! loss, latency and jitter.
//!
//! Packet format: `SIG:<seq>:<send_us>` where `send_us` is the low 32 bits
//! of the microsecond clock. Latency is computed with wrapping arithmetic,
//! so a clock rollover between send and receive is harmless.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::Serialize;

/// Packets sent when the request names no count.
pub const DEFAULT_TOTAL_PACKETS: u32 = 1000;

/// Latency samples kept per run.
pub const LATENCY_ARENA_CAPACITY: usize = 500;

/// Gap between packets.
pub const SIGNAL_INTERVAL_US: u64 = 10_000;

/// How long to wait for stragglers after the last packet.
pub const COMPLETION_WAIT_US: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    Idle,
    Running,
    Complete,
}

/// Mean and population standard deviation of `samples`, in ms.
pub fn latency_stats(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&s| {
            let d = f64::from(s) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, libm::sqrt(variance) as f32)
}

/// Loss-based quality: `(received - errors) / sent`, clamped to 0..=100.
pub fn quality_percent(sent: u32, received: u32, errors: u32) -> u8 {
    if sent == 0 {
        return 0;
    }
    let good = u64::from(received.saturating_sub(errors));
    (good * 100 / u64::from(sent)).min(100) as u8
}

/// Send timestamp of a well-formed `SIG:<seq>:<ts>` line.
pub fn parse_sig_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("SIG:")?;
    let (seq, ts) = rest.split_once(':')?;
    seq.parse::<u32>().ok()?;
    ts.parse::<u32>().ok()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalQualityTest {
    pub enabled: bool,
    pub status: SignalStatus,
    pub total_packets: u32,
    pub sent_packets: u32,
    pub received_packets: u32,
    pub error_count: u32,
    pub quality_percent: u8,
    pub avg_latency_ms: f32,
    pub jitter_ms: f32,
    arena_capacity: usize,
    latencies: Vec<f32>,
    last_send_us: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalSnapshot {
    pub enabled: bool,
    pub status: SignalStatus,
    pub quality_percent: u8,
    pub total_packets: u32,
    pub sent_packets: u32,
    pub received_packets: u32,
    pub avg_latency_ms: f32,
    pub jitter_ms: f32,
    pub error_count: u32,
    pub progress: f32,
}

impl SignalQualityTest {
    pub fn new() -> Self {
        Self {
            total_packets: DEFAULT_TOTAL_PACKETS,
            latencies: Vec::with_capacity(LATENCY_ARENA_CAPACITY),
            ..Self::default()
        }
    }

    /// Reset counters and arm the latency arena for `total_packets`.
    pub fn start(&mut self, total_packets: u32) {
        self.enabled = true;
        self.status = SignalStatus::Running;
        self.total_packets = total_packets;
        self.sent_packets = 0;
        self.received_packets = 0;
        self.error_count = 0;
        self.quality_percent = 0;
        self.avg_latency_ms = 0.0;
        self.jitter_ms = 0.0;
        self.arena_capacity = (total_packets as usize).min(LATENCY_ARENA_CAPACITY);
        self.latencies.clear();
        self.last_send_us = None;
    }

    /// External stop; drops collected samples.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.status = SignalStatus::Idle;
        self.latencies.clear();
    }

    pub fn send_due(&self, now_us: u64) -> bool {
        self.sent_packets < self.total_packets
            && self
                .last_send_us
                .map_or(true, |t| now_us.saturating_sub(t) >= SIGNAL_INTERVAL_US)
    }

    /// Next packet to transmit; counts it as sent.
    pub fn next_packet(&mut self, now_us: u64) -> String {
        let packet = format!("SIG:{}:{}", self.sent_packets, now_us as u32);
        self.sent_packets += 1;
        self.last_send_us = Some(now_us);
        packet
    }

    /// Every line counts as received; lines that do not parse also count as
    /// errors and leave no latency sample.
    pub fn on_line(&mut self, line: &str, now_us: u64) {
        self.received_packets += 1;
        match parse_sig_line(line) {
            Some(sent_at) => {
                if self.latencies.len() < self.arena_capacity {
                    let latency_us = (now_us as u32).wrapping_sub(sent_at);
                    self.latencies.push(latency_us as f32 / 1000.0);
                }
            }
            None => self.error_count += 1,
        }
    }

    pub fn is_finished(&self, now_us: u64) -> bool {
        self.sent_packets >= self.total_packets
            && (self.received_packets >= self.total_packets
                || self
                    .last_send_us
                    .map_or(true, |t| now_us.saturating_sub(t) >= COMPLETION_WAIT_US))
    }

    /// Compute the final metrics and release the arena.
    pub fn finish(&mut self) {
        if self.sent_packets > 0 {
            let (avg, jitter) = latency_stats(&self.latencies);
            self.avg_latency_ms = avg;
            self.jitter_ms = jitter;
        }
        self.quality_percent = quality_percent(self.sent_packets, self.received_packets, self.error_count);
        self.status = SignalStatus::Complete;
        self.enabled = false;
        self.latencies.clear();
    }

    /// Samples collected so far.
    pub fn samples(&self) -> &[f32] {
        &self.latencies
    }

    pub fn progress(&self) -> f32 {
        if self.total_packets == 0 {
            return 0.0;
        }
        self.sent_packets as f32 * 100.0 / self.total_packets as f32
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            enabled: self.enabled,
            status: self.status,
            quality_percent: self.quality_percent,
            total_packets: self.total_packets,
            sent_packets: self.sent_packets,
            received_packets: self.received_packets,
            avg_latency_ms: self.avg_latency_ms,
            jitter_ms: self.jitter_ms,
            error_count: self.error_count,
            progress: self.progress(),
        }
    }
}
