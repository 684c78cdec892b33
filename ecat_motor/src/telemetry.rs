//! Periodic latency report.
//!
//! The cyclic thread flags a report as ready once per report interval; the
//! main thread polls the flag and prints one line per report:
//!
//! ```text
//! latency:       1.234 ...     12.345
//! ```
//!
//! Values are microseconds with three decimals, each right-aligned in ten
//! columns. Reads are best-effort snapshots of the shared atomics.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::info;

use crate::cycle::{CycleReport, LatencySnapshot, LatencyStats};

/// Format the latency line for a snapshot.
pub fn format_latency(snapshot: &LatencySnapshot) -> String {
    format!(
        "latency:  {:10.3} ... {:10.3}",
        snapshot.min_ns as f64 / 1000.0,
        snapshot.max_ns as f64 / 1000.0
    )
}

/// Writes latency lines to a sink (stdout in production).
pub struct TelemetryReporter<W> {
    sink: W,
    stats: Arc<LatencyStats>,
    enabled: bool,
    reports: u64,
}

impl<W: Write> TelemetryReporter<W> {
    /// Reporter over `stats` writing to `sink`.
    pub fn new(sink: W, stats: Arc<LatencyStats>, enabled: bool) -> Self {
        Self {
            sink,
            stats,
            enabled,
            reports: 0,
        }
    }

    /// Lines written so far.
    pub const fn reports(&self) -> u64 {
        self.reports
    }

    /// Sink, for inspection.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Print a line if the cyclic thread flagged one. Returns whether it did.
    pub fn poll(&mut self) -> io::Result<bool> {
        if !self.stats.take_ready() || !self.enabled {
            return Ok(false);
        }
        let Some(snapshot) = self.stats.snapshot() else {
            return Ok(false);
        };
        self.emit(&snapshot)?;
        Ok(true)
    }

    /// Print the closing line and the run summary.
    pub fn finish(&mut self, report: &CycleReport) -> io::Result<()> {
        if let Some(snapshot) = report.latency {
            if self.enabled {
                self.emit(&snapshot)?;
            }
        }
        info!(
            "Run summary: {} cycles, {} overruns, {} rollovers, drive {:?}",
            report.cycles, report.overruns, report.rollovers, report.drive_state
        );
        Ok(())
    }

    fn emit(&mut self, snapshot: &LatencySnapshot) -> io::Result<()> {
        writeln!(self.sink, "{}", format_latency(snapshot))?;
        self.sink.flush()?;
        self.reports += 1;
        Ok(())
    }
}
