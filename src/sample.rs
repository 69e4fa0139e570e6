//! Correlated records
use hifitime::Epoch;
use serde::Serialize;

use crate::{
    position::{PositionFix, SkyGeometry},
    radio::{Band, RadioBandStat, RadioScanStat},
    time::iso8601,
};

/// Tabular record columns, in order
pub const COLUMNS: [&str; 24] = [
    "ts",
    "index_value",
    "index_valid_at",
    "gps_fix",
    "lat",
    "lon",
    "alt",
    "pdop",
    "hdop",
    "vdop",
    "sv_used",
    "sv_tot",
    "cn0_mean",
    "mode",
    "freq",
    "noise_dbm",
    "busy_ratio",
    "scan_n",
    "scan_p50",
    "scan_p10",
    "scan_p90",
    "band",
    "grid_value",
    "grid_provenance",
];

/// Radio observation carried by a [CorrelatedSample]
#[derive(Debug, Clone, PartialEq)]
pub enum RadioRecord {
    /// Single channel noise and occupancy
    Survey(RadioBandStat),
    /// One frequency of a full band scan
    Scan(RadioScanStat),
}

impl RadioRecord {
    pub fn frequency(&self) -> u32 {
        match self {
            Self::Survey(stat) => stat.frequency,
            Self::Scan(stat) => stat.frequency,
        }
    }

    pub fn band(&self) -> Band {
        Band::from_mhz(self.frequency())
    }

    /// Mode label
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Survey(_) => "SURVEY",
            Self::Scan(_) => "SCAN",
        }
    }
}

/// [CorrelatedSample] is one emitted record. All records of one tick share
/// the same timestamp, index, position and grid values.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedSample {
    pub timestamp: Epoch,
    pub index_value: Option<f64>,
    pub index_valid_at: Option<String>,
    pub fix: PositionFix,
    pub sky: SkyGeometry,
    pub radio: RadioRecord,
    pub grid_value: Option<f64>,
    /// "dataset@slot" the grid value was interpolated from
    pub grid_provenance: Option<String>,
}

/// Flattened [CorrelatedSample]
#[derive(Debug, Serialize)]
pub(crate) struct SampleRow<'a> {
    ts: String,
    index_value: Option<f64>,
    index_valid_at: Option<&'a str>,
    gps_fix: String,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    pdop: Option<f64>,
    hdop: Option<f64>,
    vdop: Option<f64>,
    sv_used: Option<usize>,
    sv_tot: Option<usize>,
    cn0_mean: Option<f64>,
    mode: &'static str,
    freq: u32,
    noise_dbm: Option<f64>,
    busy_ratio: Option<f64>,
    scan_n: Option<usize>,
    scan_p50: Option<f64>,
    scan_p10: Option<f64>,
    scan_p90: Option<f64>,
    band: String,
    grid_value: Option<f64>,
    grid_provenance: Option<&'a str>,
}

impl CorrelatedSample {
    pub(crate) fn row(&self) -> SampleRow<'_> {
        let (noise_dbm, busy_ratio) = match &self.radio {
            RadioRecord::Survey(stat) => (stat.noise_dbm, stat.busy_ratio),
            RadioRecord::Scan(_) => (None, None),
        };

        let (scan_n, scan_p50, scan_p10, scan_p90) = match &self.radio {
            RadioRecord::Scan(stat) => (Some(stat.sample_count), stat.p50, stat.p10, stat.p90),
            RadioRecord::Survey(_) => (None, None, None, None),
        };

        SampleRow {
            ts: iso8601(self.timestamp),
            index_value: self.index_value,
            index_valid_at: self.index_valid_at.as_deref(),
            gps_fix: self.fix.quality.to_string(),
            lat: self.fix.lat,
            lon: self.fix.lon,
            alt: self.fix.alt,
            pdop: self.sky.pdop,
            hdop: self.sky.hdop,
            vdop: self.sky.vdop,
            sv_used: self.sky.satellites_used,
            sv_tot: self.sky.satellites_visible,
            cn0_mean: self.sky.mean_cn0,
            mode: self.radio.mode(),
            freq: self.radio.frequency(),
            noise_dbm,
            busy_ratio,
            scan_n,
            scan_p50,
            scan_p10,
            scan_p90,
            band: self.radio.band().to_string(),
            grid_value: self.grid_value,
            grid_provenance: self.grid_provenance.as_deref(),
        }
    }
}
