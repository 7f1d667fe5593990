use serde::Serialize;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// One progress snapshot for a single transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    pub loaded_bytes: u64,
    pub total_bytes: u64,
    /// Whole percent in `[0, 100]`.
    pub percent: u8,
    pub bytes_per_second: f64,
    pub speed_display: String,
    /// Estimated time to completion, when a rate is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
}

/// Turns raw `(loaded, total, timestamp)` events into [`ProgressSample`]s.
///
/// Speed is instantaneous between consecutive events. When two events share
/// a timestamp the average since [`start`](Self::start) is used instead.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    started_at_ms: Option<i64>,
    previous: Option<(u64, i64)>,
    last: ProgressSample,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of the transfer. Clears any earlier samples.
    pub fn start(&mut self, now_ms: i64) {
        self.reset();
        self.started_at_ms = Some(now_ms);
    }

    /// Records a transport event and returns the updated sample.
    pub fn record(&mut self, loaded: u64, total: u64, now_ms: i64) -> &ProgressSample {
        let started = *self.started_at_ms.get_or_insert(now_ms);

        let rate = match self.previous {
            Some((prev_loaded, prev_ms)) if now_ms > prev_ms => {
                loaded.saturating_sub(prev_loaded) as f64 / (now_ms - prev_ms) as f64 * 1000.0
            }
            _ => average_rate(loaded, started, now_ms),
        };

        let eta_ms = eta(loaded, total, average_rate(loaded, started, now_ms));

        self.previous = Some((loaded, now_ms));
        self.last = ProgressSample {
            loaded_bytes: loaded,
            total_bytes: total,
            percent: percent(loaded, total),
            bytes_per_second: rate,
            speed_display: format_speed(rate),
            eta_ms,
        };
        &self.last
    }

    /// Forces the sample to 100% once the bytes are on the server, so the
    /// completion phase does not show a stale percentage.
    pub fn finalize(&mut self, total: u64) -> &ProgressSample {
        self.last.loaded_bytes = total;
        self.last.total_bytes = total;
        self.last.percent = 100;
        self.last.eta_ms = Some(0);
        &self.last
    }

    pub fn last(&self) -> &ProgressSample {
        &self.last
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (loaded as f64 * 100.0 / total as f64).round().clamp(0.0, 100.0) as u8
}

fn average_rate(loaded: u64, started_ms: i64, now_ms: i64) -> f64 {
    if now_ms > started_ms {
        loaded as f64 / (now_ms - started_ms) as f64 * 1000.0
    } else {
        0.0
    }
}

fn eta(loaded: u64, total: u64, rate: f64) -> Option<u64> {
    if rate <= 0.0 || total == 0 {
        return None;
    }
    let remaining = total.saturating_sub(loaded) as f64;
    Some((remaining / rate * 1000.0).round() as u64)
}

/// Formats a throughput for display.
pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second < KIB {
        format!("{:.0} B/s", bytes_per_second.max(0.0))
    } else if bytes_per_second < MIB {
        format!("{:.1} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.1} MB/s", bytes_per_second / MIB)
    }
}

/// Formats a byte count for display.
pub fn format_file_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < MIB {
        format!("{:.1} KB", b / KIB)
    } else {
        format!("{:.1} MB", b / MIB)
    }
}
