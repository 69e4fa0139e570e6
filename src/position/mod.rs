//! Positioning stream sampling
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};

use crate::error::Error;

mod gpsd;
mod report;

pub use gpsd::GpsdStream;
pub use report::Report;

/// [FixQuality] as reported by the receiver
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FixQuality {
    /// No fix
    #[default]
    None,
    /// 2D fix (no altitude)
    TwoD,
    /// 3D fix
    ThreeD,
}

impl std::fmt::Display for FixQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NO"),
            Self::TwoD => write!(f, "2D"),
            Self::ThreeD => write!(f, "3D"),
        }
    }
}

/// Last known [PositionFix]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PositionFix {
    pub quality: FixQuality,
    /// Latitude (ddeg)
    pub lat: Option<f64>,
    /// Longitude (ddeg)
    pub lon: Option<f64>,
    /// Altitude (m)
    pub alt: Option<f64>,
}

impl PositionFix {
    /// Horizontal coordinates, when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Last known [SkyGeometry].
/// Satellite counts remain unknown until a sky report provided them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SkyGeometry {
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    /// Satellites used in the solution
    pub satellites_used: Option<usize>,
    /// Satellites in view
    pub satellites_visible: Option<usize>,
    /// Mean carrier to noise ratio (dB.Hz)
    pub mean_cn0: Option<f64>,
}

/// [ReportStream] is the streaming positioning source.
pub trait ReportStream {
    /// Waits up to `timeout` for the next report line.
    /// Returns Ok(None) when nothing arrived in time,
    /// [Error::EndOfStream] once the peer closed the stream.
    fn next_report(&mut self, timeout: Duration) -> Result<Option<String>, Error>;
}

/// [PositionSampler] drains a [ReportStream] for a bounded time window,
/// holding the last known [PositionFix] and [SkyGeometry] across windows.
pub struct PositionSampler<S: ReportStream> {
    stream: S,
    fix: PositionFix,
    sky: SkyGeometry,
}

impl<S: ReportStream> PositionSampler<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            fix: Default::default(),
            sky: Default::default(),
        }
    }

    /// Last known [PositionFix], without draining the stream
    pub fn last_fix(&self) -> &PositionFix {
        &self.fix
    }

    /// Last known [SkyGeometry], without draining the stream
    pub fn last_sky(&self) -> &SkyGeometry {
        &self.sky
    }

    /// Consumes reports until `window` has elapsed or the stream ended.
    /// Each newer report replaces the held value of its kind.
    /// Values persist when nothing was received.
    pub fn drain(&mut self, window: Duration) -> (PositionFix, SkyGeometry) {
        let deadline = Instant::now() + window;
        let (mut positions, mut skies) = (0, 0);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let line = match self.stream.next_report(remaining) {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(Error::EndOfStream) => {
                    warn!("position: end of stream");
                    break;
                },
                Err(e) => {
                    error!("position: stream error: {}", e);
                    break;
                },
            };

            if line.trim().is_empty() {
                continue;
            }

            match Report::parse(&line) {
                Ok(Some(Report::Position(fix))) => {
                    self.fix = fix;
                    positions += 1;
                },
                Ok(Some(Report::Sky(sky))) => {
                    self.sky = sky;
                    skies += 1;
                },
                Ok(None) => trace!("position: ignored report {}", line.trim()),
                Err(e) => debug!("position: invalid report: {}", e),
            }
        }

        debug!(
            "position: drained {} fix and {} sky report(s) - {} ({:?}, {:?})",
            positions, skies, self.fix.quality, self.fix.lat, self.fix.lon
        );

        (self.fix.clone(), self.sky.clone())
    }
}
