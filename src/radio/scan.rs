use std::collections::BTreeMap;

use itertools::Itertools;

use super::{survey::first_value, Band};

/// Percentile of an ascending sorted slice:
/// the value at index ⌊p/100 × (n-1)⌋, clamped to the slice.
/// Returns None on empty slices.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let index = ((p / 100.0) * (n - 1) as f64).floor().max(0.0) as usize;
    Some(sorted[index.min(n - 1)])
}

/// Signal strength statistics observed on one frequency, during one scan pass
#[derive(Debug, Clone, PartialEq)]
pub struct RadioScanStat {
    /// Frequency (MHz)
    pub frequency: u32,
    /// Number of valid signal readings
    pub sample_count: usize,
    /// 10th percentile (dBm)
    pub p10: Option<f64>,
    /// Median (dBm)
    pub p50: Option<f64>,
    /// 90th percentile (dBm)
    pub p90: Option<f64>,
}

impl RadioScanStat {
    /// Builds the statistics of these readings
    pub fn from_readings(frequency: u32, readings: &[f64]) -> Self {
        let sorted = readings
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .sorted_by(|a, b| a.total_cmp(b))
            .collect::<Vec<_>>();

        Self {
            frequency,
            sample_count: sorted.len(),
            p10: percentile(&sorted, 10.0),
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
        }
    }

    /// [Band] of this frequency
    pub fn band(&self) -> Band {
        Band::from_mhz(self.frequency)
    }

    /// Parses `iw dev <if> scan` output, grouping "signal:" readings
    /// by the preceding "freq:" line. Frequencies are reported in ascending order,
    /// including frequencies without any valid reading.
    pub fn parse(content: &str) -> Vec<Self> {
        let mut readings = BTreeMap::<u32, Vec<f64>>::new();
        let mut current = Option::<u32>::None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("freq:") {
                current = first_value(line)
                    .filter(|f| *f > 0.0)
                    .map(|f| f.round() as u32);
                if let Some(freq) = current {
                    readings.entry(freq).or_default();
                }
            } else if line.starts_with("signal:") {
                if let (Some(freq), Some(signal)) = (current, first_value(line)) {
                    readings.entry(freq).or_default().push(signal);
                }
            }
        }

        readings
            .iter()
            .map(|(freq, values)| Self::from_readings(*freq, values))
            .collect()
    }
}
