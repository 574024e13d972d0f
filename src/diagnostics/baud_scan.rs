//! Baud rate auto-detection.
//!
//! Listens at each candidate rate in turn. Three complete lines at one rate
//! count as detection; a rate that stays quiet for
//! [`BAUD_SCAN_TIMEOUT_US`] is skipped.

use serde::Serialize;

/// Rates tried, in order.
pub const BAUD_CANDIDATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Time spent listening at one rate.
pub const BAUD_SCAN_TIMEOUT_US: u64 = 500_000;

/// Lines needed at one rate to call it detected.
pub const LINES_FOR_DETECTION: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaudScanStatus {
    #[default]
    Idle,
    Scanning,
    Found,
    NotFound,
}

/// What a tick decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStep {
    /// Keep listening at the current rate.
    Listening,
    /// Move to this rate.
    Advance(u32),
    /// Detected at this rate; scan finished.
    Found(u32),
    /// Candidate list exhausted.
    NotFound,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BaudScanner {
    pub enabled: bool,
    pub status: BaudScanStatus,
    pub candidate_index: usize,
    pub packets_at_rate: u32,
    pub detected_rate: u32,
    rate_started_us: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BaudScanSnapshot {
    pub enabled: bool,
    pub status: BaudScanStatus,
    pub detected_baud: u32,
    pub current_index: usize,
    pub test_packets: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_baud: Option<u32>,
}

impl BaudScanner {
    /// Reset and return the first rate to listen at.
    pub fn start(&mut self, now_us: u64) -> u32 {
        *self = Self {
            enabled: true,
            status: BaudScanStatus::Scanning,
            rate_started_us: now_us,
            ..Self::default()
        };
        BAUD_CANDIDATES[0]
    }

    /// External stop.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.status = BaudScanStatus::Idle;
    }

    pub fn current_rate(&self) -> Option<u32> {
        BAUD_CANDIDATES.get(self.candidate_index).copied()
    }

    /// Count one received line.
    pub fn on_line(&mut self) -> ScanStep {
        self.packets_at_rate += 1;
        match self.current_rate() {
            Some(rate) if self.packets_at_rate >= LINES_FOR_DETECTION => {
                self.detected_rate = rate;
                self.status = BaudScanStatus::Found;
                self.enabled = false;
                ScanStep::Found(rate)
            }
            _ => ScanStep::Listening,
        }
    }

    /// Advance past a quiet rate once the timeout has run out.
    pub fn check_timeout(&mut self, now_us: u64) -> ScanStep {
        if now_us.saturating_sub(self.rate_started_us) < BAUD_SCAN_TIMEOUT_US {
            return ScanStep::Listening;
        }

        self.candidate_index += 1;
        self.packets_at_rate = 0;
        self.rate_started_us = now_us;

        match self.current_rate() {
            Some(rate) => ScanStep::Advance(rate),
            None => {
                self.status = BaudScanStatus::NotFound;
                self.enabled = false;
                ScanStep::NotFound
            }
        }
    }

    pub fn snapshot(&self) -> BaudScanSnapshot {
        BaudScanSnapshot {
            enabled: self.enabled,
            status: self.status,
            detected_baud: self.detected_rate,
            current_index: self.candidate_index,
            test_packets: self.packets_at_rate,
            current_baud: self.current_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_resets() {
        let mut scan = BaudScanner {
            detected_rate: 9600,
            candidate_index: 4,
            ..Default::default()
        };
        assert_eq!(scan.start(10), 1200);
        assert_eq!(scan.status, BaudScanStatus::Scanning);
        assert_eq!(scan.detected_rate, 0);
        assert_eq!(scan.candidate_index, 0);
    }

    #[test]
    fn test_third_line_detects() {
        let mut scan = BaudScanner::default();
        scan.start(0);
        assert_eq!(scan.on_line(), ScanStep::Listening);
        assert_eq!(scan.on_line(), ScanStep::Listening);
        assert_eq!(scan.on_line(), ScanStep::Found(1200));
        assert_eq!(scan.status, BaudScanStatus::Found);
        assert!(!scan.enabled);
    }

    #[test]
    fn test_timeout_walks_the_list() {
        let mut scan = BaudScanner::default();
        scan.start(0);
        scan.on_line();

        assert_eq!(scan.check_timeout(BAUD_SCAN_TIMEOUT_US - 1), ScanStep::Listening);
        assert_eq!(scan.check_timeout(BAUD_SCAN_TIMEOUT_US), ScanStep::Advance(2400));
        assert_eq!(scan.packets_at_rate, 0);

        let mut now = BAUD_SCAN_TIMEOUT_US;
        for &rate in &BAUD_CANDIDATES[2..] {
            now += BAUD_SCAN_TIMEOUT_US;
            assert_eq!(scan.check_timeout(now), ScanStep::Advance(rate));
        }
        now += BAUD_SCAN_TIMEOUT_US;
        assert_eq!(scan.check_timeout(now), ScanStep::NotFound);
        assert_eq!(scan.status, BaudScanStatus::NotFound);
        assert_eq!(scan.snapshot().current_baud, None);
    }
}
