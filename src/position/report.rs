use gnss::prelude::{Constellation, SV};
use itertools::Itertools;
use log::debug;
use serde_json::{Map, Value};

use crate::{
    error::Error,
    grid::as_f64,
    position::{FixQuality, PositionFix, SkyGeometry},
};

/// Normalized positioning stream [Report]
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Time Position Velocity report
    Position(PositionFix),
    /// Satellites in view and DOP report
    Sky(SkyGeometry),
}

/// Satellite entry of a sky report
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Satellite {
    sv: Option<SV>,
    used: bool,
    cn0: Option<f64>,
}

/// Reports (and their inner objects) sometimes arrive as JSON-encoded strings.
fn unwrap_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::String(s) => match serde_json::from_str::<Value>(&s).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn field_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(as_f64)
}

fn field_usize(map: &Map<String, Value>, key: &str) -> Option<usize> {
    field_f64(map, key)
        .filter(|x| *x >= 0.0)
        .map(|x| x as usize)
}

/// gpsd "used" flag: true, 1 or "true"
fn is_used(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true") || s.trim() == "1",
        _ => false,
    }
}

/// gpsd GNSS identifier
fn constellation(gnssid: usize) -> Option<Constellation> {
    match gnssid {
        0 => Some(Constellation::GPS),
        1 => Some(Constellation::SBAS),
        2 => Some(Constellation::Galileo),
        3 => Some(Constellation::BeiDou),
        5 => Some(Constellation::QZSS),
        6 => Some(Constellation::Glonass),
        7 => Some(Constellation::IRNSS),
        _ => None,
    }
}

impl Satellite {
    /// Signal quality fields, by order of preference
    const SIGNAL_FIELDS: [&'static str; 4] = ["ss", "cn0", "cn", "snr"];

    fn from_map(map: &Map<String, Value>) -> Self {
        let sv = match field_usize(map, "gnssid") {
            Some(gnssid) => constellation(gnssid).and_then(|c| {
                let prn = field_usize(map, "svid").or(field_usize(map, "PRN"))?;
                Some(SV::new(c, u8::try_from(prn).ok()?))
            }),
            None => field_usize(map, "PRN")
                .filter(|prn| (1..=32).contains(prn))
                .map(|prn| SV::new(Constellation::GPS, prn as u8)),
        };

        let cn0 = Self::SIGNAL_FIELDS
            .iter()
            .find_map(|key| field_f64(map, key));

        Self {
            sv,
            cn0,
            used: is_used(map.get("used")),
        }
    }
}

impl SkyGeometry {
    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        let satellites = match map.get("satellites") {
            Some(Value::Array(entries)) => Some(
                entries
                    .iter()
                    .cloned()
                    .filter_map(unwrap_object)
                    .map(|sat| Satellite::from_map(&sat))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };

        let (satellites_used, satellites_visible, mean_cn0) = match satellites {
            Some(ref sats) => {
                let cn0 = sats.iter().filter_map(|s| s.cn0).collect::<Vec<_>>();
                let mean = if cn0.is_empty() {
                    None
                } else {
                    let mean = cn0.iter().sum::<f64>() / cn0.len() as f64;
                    Some((mean * 10.0).round() / 10.0)
                };
                (
                    Some(sats.iter().filter(|s| s.used).count()),
                    Some(sats.len()),
                    mean,
                )
            },
            None => (field_usize(map, "uSat"), field_usize(map, "nSat"), None),
        };

        if let Some(ref sats) = satellites {
            let summary = sats
                .iter()
                .filter(|s| s.used)
                .filter_map(|s| s.sv.map(|sv| sv.constellation))
                .counts()
                .into_iter()
                .sorted_by_key(|(c, _)| c.to_string())
                .map(|(c, n)| format!("{}={}", c, n))
                .join(", ");
            debug!(
                "sky: {}/{} used ({})",
                satellites_used.unwrap_or_default(),
                satellites_visible.unwrap_or_default(),
                summary
            );
        }

        Self {
            pdop: field_f64(map, "pdop"),
            hdop: field_f64(map, "hdop"),
            vdop: field_f64(map, "vdop"),
            satellites_used,
            satellites_visible,
            mean_cn0,
        }
    }
}

impl PositionFix {
    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        let quality = match field_usize(map, "mode") {
            Some(3) => FixQuality::ThreeD,
            Some(2) => FixQuality::TwoD,
            _ => FixQuality::None,
        };
        Self {
            quality,
            lat: field_f64(map, "lat"),
            lon: field_f64(map, "lon"),
            alt: field_f64(map, "alt")
                .or(field_f64(map, "altMSL"))
                .or(field_f64(map, "altHAE")),
        }
    }
}

impl Report {
    /// Parses one positioning stream line. Returns None for report classes
    /// other than position (TPV) and sky (SKY).
    pub fn parse(line: &str) -> Result<Option<Self>, Error> {
        let value: Value = serde_json::from_str(line.trim())?;

        let map = unwrap_object(value)
            .ok_or_else(|| Error::MalformedPayload("report is not an object".to_string()))?;

        match map.get("class").and_then(Value::as_str) {
            Some("TPV") => Ok(Some(Self::Position(PositionFix::from_map(&map)))),
            Some("SKY") => Ok(Some(Self::Sky(SkyGeometry::from_map(&map)))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Report;
    use crate::position::{FixQuality, PositionFix, SkyGeometry};

    #[test]
    fn position_report() {
        let report = Report::parse(
            r#"{"class":"TPV","device":"/dev/ttyACM0","mode":3,"lat":42.0,"lon":12.5,"alt":85.2}"#,
        )
        .unwrap();

        assert_eq!(
            report,
            Some(Report::Position(PositionFix {
                quality: FixQuality::ThreeD,
                lat: Some(42.0),
                lon: Some(12.5),
                alt: Some(85.2),
            }))
        );
    }

    #[test]
    fn position_quality() {
        for (line, quality) in [
            (r#"{"class":"TPV","mode":2,"lat":1.0,"lon":2.0}"#, FixQuality::TwoD),
            (r#"{"class":"TPV","mode":1}"#, FixQuality::None),
            (r#"{"class":"TPV","mode":0}"#, FixQuality::None),
            (r#"{"class":"TPV"}"#, FixQuality::None),
        ] {
            match Report::parse(line).unwrap() {
                Some(Report::Position(fix)) => assert_eq!(fix.quality, quality, "{}", line),
                other => panic!("unexpected report {:?}", other),
            }
        }
    }

    #[test]
    fn altitude_fallbacks() {
        match Report::parse(r#"{"class":"TPV","mode":3,"altHAE":120.5,"altMSL":75.0}"#).unwrap()
        {
            Some(Report::Position(fix)) => assert_eq!(fix.alt, Some(75.0)),
            other => panic!("unexpected report {:?}", other),
        }
        match Report::parse(r#"{"class":"TPV","mode":3,"altHAE":120.5}"#).unwrap() {
            Some(Report::Position(fix)) => assert_eq!(fix.alt, Some(120.5)),
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn sky_report() {
        let report = Report::parse(
            r#"{"class":"SKY","pdop":1.2,"hdop":0.8,"vdop":0.9,"satellites":[
                {"PRN":1,"gnssid":0,"svid":1,"ss":40,"used":true},
                {"PRN":2,"gnssid":0,"svid":2,"ss":30,"used":true},
                {"PRN":3,"used":false},
                {"PRN":65,"gnssid":6,"svid":1,"cn0":44.0,"used":1},
                {"PRN":301,"gnssid":2,"svid":1,"snr":"36","used":"true"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            report,
            Some(Report::Sky(SkyGeometry {
                pdop: Some(1.2),
                hdop: Some(0.8),
                vdop: Some(0.9),
                satellites_used: Some(4),
                satellites_visible: Some(5),
                mean_cn0: Some(37.5),
            }))
        );
    }

    #[test]
    fn signal_field_priority() {
        match Report::parse(
            r#"{"class":"SKY","satellites":[{"ss":20,"cn0":40,"snr":60},{"cn":30,"snr":50}]}"#,
        )
        .unwrap()
        {
            Some(Report::Sky(sky)) => {
                assert_eq!(sky.mean_cn0, Some(25.0));
                assert_eq!(sky.satellites_used, Some(0));
                assert_eq!(sky.satellites_visible, Some(2));
                assert_eq!(sky.pdop, None);
            },
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn sky_without_satellite_list() {
        match Report::parse(r#"{"class":"SKY","nSat":12,"uSat":7,"hdop":1.1}"#).unwrap() {
            Some(Report::Sky(sky)) => {
                assert_eq!(sky.satellites_used, Some(7));
                assert_eq!(sky.satellites_visible, Some(12));
                assert_eq!(sky.mean_cn0, None);
                assert_eq!(sky.hdop, Some(1.1));
            },
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn embedded_json_strings() {
        let inner = r#"{"class":"SKY","pdop":2.5,"satellites":["{\"used\":true,\"ss\":33}", {"used":false}, 12]}"#;
        let line = serde_json::to_string(inner).unwrap();

        match Report::parse(&line).unwrap() {
            Some(Report::Sky(sky)) => {
                assert_eq!(sky.pdop, Some(2.5));
                assert_eq!(sky.satellites_used, Some(1));
                assert_eq!(sky.satellites_visible, Some(2));
                assert_eq!(sky.mean_cn0, Some(33.0));
            },
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn other_classes() {
        for line in [
            r#"{"class":"VERSION","release":"3.25","proto_major":3}"#,
            r#"{"class":"DEVICES","devices":[]}"#,
            r#"{"class":"WATCH","enable":true}"#,
            r#"{"mode":3}"#,
        ] {
            assert_eq!(Report::parse(line).unwrap(), None, "{}", line);
        }
    }

    #[test]
    fn malformed() {
        assert!(Report::parse("{\"class\":\"TPV\"").is_err());
        assert!(Report::parse("[1, 2, 3]").is_err());
        assert!(Report::parse("\"not json\"").is_err());
    }
}
