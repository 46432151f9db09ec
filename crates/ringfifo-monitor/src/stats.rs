//! Accumulated queue statistics and their derived rates.

use std::fmt;

use crate::resolution::FrameResolution;

/// Items-and-frames accumulator for one measured quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateStat {
    /// Items observed across all accepted frames.
    pub items: i64,
    /// Number of frames that contributed.
    pub frames: i64,
}

/// Byte-rate display units with precomputed binary conversion factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Bytes,
    KB,
    MB,
    GB,
    TB,
}

impl Units {
    const CONVERSION: [f64; 5] = [
        1.0,            // bytes
        0.0009765625,   // 2^-10
        9.5367431640625e-7,  // 2^-20
        9.313225746154785e-10, // 2^-30
        9.094947017729282e-13, // 2^-40
    ];

    const LABELS: [&'static str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    #[inline]
    fn factor(self) -> f64 {
        Self::CONVERSION[self as usize]
    }

    /// Human-readable unit label.
    #[inline]
    pub fn label(self) -> &'static str {
        Self::LABELS[self as usize]
    }
}

/// Aggregated counters for one monitored queue plus the frame-width state
/// they were sampled under.
///
/// All derivations are total: with zero accepted frames (or an idle queue)
/// every rate is 0.0 rather than undefined, so a snapshot is safe to render
/// at any point in the queue's life — including before convergence and
/// after shutdown.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Producer-side traffic over accepted frames.
    pub arrival: RateStat,
    /// Consumer-side traffic over accepted frames.
    pub departure: RateStat,
    /// Occupancy sampled once per frame.
    pub occupancy: RateStat,
    /// Size in bytes of one queued element.
    pub item_bytes: usize,
    /// Frame-width controller state.
    pub resolution: FrameResolution,
}

impl QueueStats {
    pub(crate) fn new(item_bytes: usize, resolution: FrameResolution) -> Self {
        Self {
            arrival: RateStat::default(),
            departure: RateStat::default(),
            occupancy: RateStat::default(),
            item_bytes,
            resolution,
        }
    }

    fn rate(&self, stat: RateStat, unit: Units) -> f64 {
        if stat.items == 0 || stat.frames == 0 {
            return 0.0;
        }
        let bytes = stat.items as f64 * self.item_bytes as f64;
        bytes / (self.resolution.width() * stat.frames as f64) * unit.factor()
    }

    /// Producer byte rate in `unit`/s; 0.0 until a frame has been accepted.
    pub fn arrival_rate(&self, unit: Units) -> f64 {
        self.rate(self.arrival, unit)
    }

    /// Consumer byte rate in `unit`/s; 0.0 until a frame has been accepted.
    pub fn departure_rate(&self, unit: Units) -> f64 {
        self.rate(self.departure, unit)
    }

    /// Mean queue occupancy over all sampled frames, in items.
    pub fn mean_occupancy(&self) -> f64 {
        if self.occupancy.items == 0 || self.occupancy.frames == 0 {
            return 0.0;
        }
        self.occupancy.items as f64 / self.occupancy.frames as f64
    }

    /// Arrival rate over departure rate; 0.0 while the departure rate is.
    pub fn utilization(&self) -> f64 {
        let denom = self.departure_rate(Units::Bytes);
        if denom == 0.0 {
            return 0.0;
        }
        self.arrival_rate(Units::Bytes) / denom
    }

    /// Display adapter producing the four-line human-readable report.
    pub fn report(&self, unit: Units) -> Report<'_> {
        Report { stats: self, unit }
    }

    /// The same figures as one comma-separated row:
    /// arrival, departure, mean occupancy, utilization.
    pub fn csv_row(&self, unit: Units) -> String {
        format!(
            "{},{},{},{}",
            self.arrival_rate(unit),
            self.departure_rate(unit),
            self.mean_occupancy(),
            self.utilization()
        )
    }
}

/// Pretty-printing adapter returned by [`QueueStats::report`].
pub struct Report<'a> {
    stats: &'a QueueStats,
    unit: Units,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Arrival Rate: {} {}/s",
            self.stats.arrival_rate(self.unit),
            self.unit.label()
        )?;
        writeln!(
            f,
            "Departure Rate: {} {}/s",
            self.stats.departure_rate(self.unit),
            self.unit.label()
        )?;
        writeln!(f, "Mean Queue Occupancy: {}", self.stats.mean_occupancy())?;
        write!(f, "Utilization: {}", self.stats.utilization())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converged(width: f64) -> FrameResolution {
        let mut res = FrameResolution::new(width);
        res.update(width);
        res
    }

    #[test]
    fn rates_divide_bytes_by_width_times_frames() {
        // 8-byte items, 1ms frames, 1000 items over 10 frames:
        // 8000 bytes / (0.001 * 10) s = 800_000 B/s.
        let mut stats = QueueStats::new(8, converged(1e-3));
        stats.arrival = RateStat { items: 1000, frames: 10 };
        stats.departure = RateStat { items: 500, frames: 10 };

        assert!((stats.arrival_rate(Units::Bytes) - 800_000.0).abs() < 1e-6);
        assert!((stats.departure_rate(Units::Bytes) - 400_000.0).abs() < 1e-6);
        assert!((stats.utilization() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unit_conversion_uses_binary_factors() {
        let mut stats = QueueStats::new(1024, converged(1.0));
        stats.arrival = RateStat { items: 1024, frames: 1 };

        let bytes = stats.arrival_rate(Units::Bytes);
        assert!((bytes - 1024.0 * 1024.0).abs() < 1e-6);
        assert!((stats.arrival_rate(Units::KB) - 1024.0).abs() < 1e-9);
        assert!((stats.arrival_rate(Units::MB) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_guards_cover_every_derivation() {
        let stats = QueueStats::new(8, FrameResolution::new(1e-3));
        assert_eq!(stats.arrival_rate(Units::MB), 0.0);
        assert_eq!(stats.departure_rate(Units::MB), 0.0);
        assert_eq!(stats.mean_occupancy(), 0.0);
        assert_eq!(stats.utilization(), 0.0);
    }

    #[test]
    fn mean_occupancy_averages_over_frames() {
        let mut stats = QueueStats::new(8, converged(1e-3));
        stats.occupancy = RateStat { items: 30, frames: 4 };
        assert!((stats.mean_occupancy() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn report_and_csv_agree() {
        let mut stats = QueueStats::new(8, converged(1e-3));
        stats.arrival = RateStat { items: 100, frames: 10 };
        stats.departure = RateStat { items: 100, frames: 10 };
        stats.occupancy = RateStat { items: 12, frames: 6 };

        let text = stats.report(Units::KB).to_string();
        assert!(text.contains("Arrival Rate:"));
        assert!(text.contains("KB/s"));
        assert!(text.contains("Utilization: 1"));

        let row = stats.csv_row(Units::KB);
        assert_eq!(row.split(',').count(), 4);
    }
}
