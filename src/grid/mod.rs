//! Ionospheric (TEC) grid snapshots
use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

mod fetcher;
mod interp;

pub use fetcher::{GridFetcher, GridLookup, GridService, HttpGridService};
pub use interp::interpolate;

/// Rounds to 2 decimal digits
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Coordinates are keyed in hundredths of degrees.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GridKey(i64, i64);

impl GridKey {
    pub(crate) fn new(lat: f64, lon: f64) -> Self {
        Self((lat * 100.0).round() as i64, (lon * 100.0).round() as i64)
    }
}

/// Single point of the grid service payload
#[derive(Debug, Deserialize)]
struct RawPoint {
    lat: Value,
    lon: Value,
    tec: Value,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    jfile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    records: Vec<RawRecord>,
}

/// Accepts JSON numbers and numeric strings
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

/// [GridSnapshot] is a sparse, possibly non uniform, spatial grid
/// of scalar values. Latitude and longitude keys are rounded to 2 decimal
/// digits and stored in strictly increasing order.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    lats: Vec<f64>,
    lons: Vec<f64>,
    values: HashMap<GridKey, f64>,
}

impl GridSnapshot {
    /// Builds a [GridSnapshot] from (latitude, longitude, value) triplets.
    /// Returns None when no point was provided.
    pub fn from_points<I: IntoIterator<Item = (f64, f64, f64)>>(points: I) -> Option<Self> {
        let mut values = HashMap::new();
        for (lat, lon, value) in points {
            let (lat, lon) = (round2(lat), round2(lon));
            values.insert(GridKey::new(lat, lon), value);
        }

        if values.is_empty() {
            return None;
        }

        let lats = values
            .keys()
            .map(|k| k.0)
            .unique()
            .sorted()
            .map(|k| k as f64 / 100.0)
            .collect();

        let lons = values
            .keys()
            .map(|k| k.1)
            .unique()
            .sorted()
            .map(|k| k as f64 / 100.0)
            .collect();

        Some(Self { lats, lons, values })
    }

    /// Parses the grid service response:
    /// `{"records":[{"jfile": "<JSON array of {lat,lon,tec}>"}]}`.
    /// Malformed points are dropped. Fails when nothing usable remains.
    pub fn from_service_payload(body: &str) -> Result<Self, Error> {
        let response: RawResponse = serde_json::from_str(body)?;

        let record = response.records.first().ok_or(Error::EmptyResponse)?;

        let jfile = record
            .jfile
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::EmptyResponse)?;

        let points: Vec<Value> = serde_json::from_str(jfile)
            .map_err(|e| Error::MalformedPayload(format!("embedded grid: {}", e)))?;

        let total = points.len();

        let valid = points
            .into_iter()
            .filter_map(|p| {
                let raw: RawPoint = serde_json::from_value(p).ok()?;
                Some((as_f64(&raw.lat)?, as_f64(&raw.lon)?, as_f64(&raw.tec)?))
            })
            .collect::<Vec<_>>();

        if valid.len() < total {
            debug!("grid: dropped {} malformed point(s)", total - valid.len());
        }

        Self::from_points(valid).ok_or(Error::EmptyResponse)
    }

    /// Latitude keys, strictly increasing
    pub fn latitudes(&self) -> &[f64] {
        &self.lats
    }

    /// Longitude keys, strictly increasing
    pub fn longitudes(&self) -> &[f64] {
        &self.lons
    }

    /// Number of defined points
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at this exact (lat, lon) key
    pub fn value(&self, lat: f64, lon: f64) -> Option<f64> {
        self.values.get(&GridKey::new(lat, lon)).copied()
    }

    /// ((lat_min, lat_max), (lon_min, lon_max))
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.lats[0], self.lats[self.lats.len() - 1]),
            (self.lons[0], self.lons[self.lons.len() - 1]),
        )
    }

    /// True if (lat, lon) lies within the grid bounds (inclusive)
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let ((lat0, lat1), (lon0, lon1)) = self.bounds();
        lat0 <= lat && lat <= lat1 && lon0 <= lon && lon <= lon1
    }

    /// Approximate (lat, lon) grid step
    pub fn approx_step(&self) -> (Option<f64>, Option<f64>) {
        (approx_step(&self.lats), approx_step(&self.lons))
    }

    /// Iterates all defined points, latitude major
    pub fn points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.lats.iter().flat_map(move |lat| {
            self.lons
                .iter()
                .filter_map(move |lon| Some((*lat, *lon, self.value(*lat, *lon)?)))
        })
    }

    /// Interpolates the grid at (lat, lon), see [interpolate].
    pub fn interpolate(&self, lat: f64, lon: f64) -> Option<f64> {
        interpolate(self, lat, lon)
    }
}

/// Median positive spacing between consecutive keys
fn approx_step(keys: &[f64]) -> Option<f64> {
    let diffs = keys
        .windows(2)
        .map(|w| ((w[1] - w[0]) * 1.0E6).round() / 1.0E6)
        .filter(|d| *d > 0.0)
        .sorted_by(|a, b| a.total_cmp(b))
        .collect::<Vec<_>>();
    diffs.get(diffs.len() / 2).copied()
}

#[cfg(test)]
mod test {
    use super::GridSnapshot;
    use crate::error::Error;

    fn payload(jfile: &str) -> String {
        serde_json::json!({ "records": [{ "jfile": jfile }] }).to_string()
    }

    #[test]
    fn ordered_keys() {
        let grid = GridSnapshot::from_points([
            (42.5, 12.0, 1.0),
            (41.0, 13.0, 2.0),
            (42.5, 13.0, 3.0),
            (41.0, 12.0, 4.0),
            (43.25, 12.0, 5.0),
        ])
        .unwrap();

        assert_eq!(grid.latitudes(), &[41.0, 42.5, 43.25]);
        assert_eq!(grid.longitudes(), &[12.0, 13.0]);
        assert_eq!(grid.len(), 5);
        assert_eq!(grid.value(41.0, 13.0), Some(2.0));
        assert_eq!(grid.value(43.25, 13.0), None);
        assert_eq!(grid.bounds(), ((41.0, 43.25), (12.0, 13.0)));
        assert_eq!(grid.approx_step(), (Some(1.5), Some(1.0)));
    }

    #[test]
    fn key_rounding() {
        let grid = GridSnapshot::from_points([(41.004, 12.996, 7.0)]).unwrap();
        assert_eq!(grid.latitudes(), &[41.0]);
        assert_eq!(grid.longitudes(), &[13.0]);
        assert_eq!(grid.value(41.0, 13.0), Some(7.0));
        assert_eq!(grid.approx_step(), (None, None));
    }

    #[test]
    fn empty_points() {
        assert!(GridSnapshot::from_points(Vec::new()).is_none());
    }

    #[test]
    fn service_payload() {
        let body = payload(
            r#"[{"lat": 41.0, "lon": 12.0, "tec": 10.5},
                {"lat": "41.1", "lon": "12.0", "tec": "11.0"},
                {"lat": 41.0, "lon": 12.1},
                {"lat": null, "lon": 12.1, "tec": 3.0},
                {"lat": "north", "lon": 12.1, "tec": 3.0},
                {"lat": 41.1, "lon": 12.1, "tec": 12.0}]"#,
        );

        let grid = GridSnapshot::from_service_payload(&body).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.value(41.1, 12.0), Some(11.0));
        assert_eq!(grid.value(41.0, 12.1), None);
    }

    #[test]
    fn failed_payloads() {
        assert!(matches!(
            GridSnapshot::from_service_payload(r#"{"records": []}"#),
            Err(Error::EmptyResponse)
        ));
        assert!(matches!(
            GridSnapshot::from_service_payload(r#"{"records": [{"jfile": ""}]}"#),
            Err(Error::EmptyResponse)
        ));
        assert!(matches!(
            GridSnapshot::from_service_payload(r#"{"records": [{}]}"#),
            Err(Error::EmptyResponse)
        ));
        assert!(matches!(
            GridSnapshot::from_service_payload(&payload("[{not json")),
            Err(Error::MalformedPayload(_))
        ));
        assert!(matches!(
            GridSnapshot::from_service_payload(&payload(r#"[{"lat": 1.0}]"#)),
            Err(Error::EmptyResponse)
        ));
        assert!(matches!(
            GridSnapshot::from_service_payload("<html>"),
            Err(Error::Json(_))
        ));
    }
}
