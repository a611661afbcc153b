//! # Engine Metrics
//!
//! Thread-safe counters for every decision the engine takes, rendered in
//! Prometheus exposition format.
//!
//! All counters are monotonic except `mode_version`, a gauge mirroring the
//! version of the last snapshot the engine used.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

// ════════════════════════════════════════════════════════════════════════════
// COUNTER / GAUGE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ENGINE METRICS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub earnings_processed: Counter,
    pub earnings_blocked: Counter,
    pub earnings_clipped: Counter,
    pub verification_failures: Counter,
    pub engagements_recorded: Counter,
    pub engagements_duplicate: Counter,
    pub velocity_holds: Counter,
    pub velocity_warns: Counter,
    pub velocity_blocks: Counter,
    pub diversity_penalties: Counter,
    pub warnings_issued: Counter,
    pub suspensions: Counter,
    /// Advisory checks skipped because the store failed.
    pub fail_open_events: Counter,
    pub mode_version: Gauge,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> [(&'static str, &'static str, &Counter); 13] {
        [
            ("earnings_processed_total", "Earnings computations that credited an amount", &self.earnings_processed),
            ("earnings_blocked_total", "Earnings computations blocked by a cap", &self.earnings_blocked),
            ("earnings_clipped_total", "Earnings clipped to the per-post cap", &self.earnings_clipped),
            ("verification_failures_total", "Earnings requests rejected for missing verification", &self.verification_failures),
            ("engagements_recorded_total", "Engagement events persisted", &self.engagements_recorded),
            ("engagements_duplicate_total", "Duplicate engagement events rejected", &self.engagements_duplicate),
            ("velocity_holds_total", "Velocity checks that placed a hold", &self.velocity_holds),
            ("velocity_warns_total", "Velocity checks that issued a warning", &self.velocity_warns),
            ("velocity_blocks_total", "Engagement actions blocked by velocity", &self.velocity_blocks),
            ("diversity_penalties_total", "Diversity penalties applied to earnings", &self.diversity_penalties),
            ("warnings_issued_total", "Strike warnings issued", &self.warnings_issued),
            ("suspensions_total", "Accounts suspended by the strike ladder", &self.suspensions),
            ("fail_open_events_total", "Advisory checks allowed because the store failed", &self.fail_open_events),
        ]
    }

    /// Prometheus exposition text.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        for (name, help, counter) in self.counters() {
            let _ = writeln!(output, "# HELP earnguard_{} {}", name, help);
            let _ = writeln!(output, "# TYPE earnguard_{} counter", name);
            let _ = writeln!(output, "earnguard_{} {}", name, counter.get());
            let _ = writeln!(output);
        }

        let _ = writeln!(output, "# HELP earnguard_mode_version Version of the active mode snapshot");
        let _ = writeln!(output, "# TYPE earnguard_mode_version gauge");
        let _ = writeln!(output, "earnguard_mode_version {}", self.mode_version.get());

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_inc() {
        let c = Counter::new();
        c.inc();
        c.inc_by(4);
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn test_prometheus_output() {
        let m = EngineMetrics::new();
        m.velocity_holds.inc();
        m.warnings_issued.inc_by(3);
        m.mode_version.set(2);

        let text = m.to_prometheus();
        assert!(text.contains("# TYPE earnguard_velocity_holds_total counter"));
        assert!(text.contains("earnguard_velocity_holds_total 1"));
        assert!(text.contains("earnguard_warnings_issued_total 3"));
        assert!(text.contains("earnguard_mode_version 2"));
        assert!(text.contains("earnguard_fail_open_events_total 0"));
    }
}
