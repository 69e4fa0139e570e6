//! Sampling loop
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use hifitime::Epoch;
use log::{debug, error, info, warn};

use crate::{
    cfg::Config,
    grid::{GridFetcher, GridLookup, GridService},
    index::{ExternalIndexCache, IndexFeed},
    position::{PositionSampler, ReportStream},
    radio::{CommandRunner, RadioSurveySampler},
    sample::{CorrelatedSample, RadioRecord},
    sink::SampleSink,
    time::iso8601,
};

/// Coordinates are rounded to the micro degree prior interpolation
fn round6(x: f64) -> f64 {
    (x * 1.0E6).round() / 1.0E6
}

/// [SampleAssembler] correlates all sources, once per tick.
/// The grid fetch runs concurrently with the position drain
/// whenever a position was already known.
pub struct SampleAssembler<G, I, R, S>
where
    G: GridService + Send,
    I: IndexFeed,
    R: CommandRunner,
    S: ReportStream + Send,
{
    grid: GridFetcher<G>,
    index: ExternalIndexCache<I>,
    radio: RadioSurveySampler<R>,
    position: PositionSampler<S>,
    interface: String,
    drain_window: Duration,
    period: Duration,
}

impl<G, I, R, S> SampleAssembler<G, I, R, S>
where
    G: GridService + Send,
    I: IndexFeed,
    R: CommandRunner,
    S: ReportStream + Send,
{
    /// Builds a new [SampleAssembler] from its sources and [Config]
    pub fn new(
        cfg: &Config,
        grid: GridFetcher<G>,
        index: ExternalIndexCache<I>,
        radio: RadioSurveySampler<R>,
        position: PositionSampler<S>,
    ) -> Self {
        Self {
            grid,
            index,
            radio,
            position,
            interface: cfg.wlan_interface.clone(),
            drain_window: cfg.drain_window(),
            period: cfg.tick_period(),
        }
    }

    /// Runs one tick at this UTC instant, returning the records to be emitted.
    /// Every source may fail independently: its fields are then left empty.
    pub fn tick(&mut self, now: Epoch) -> Vec<CorrelatedSample> {
        let (index_value, index_valid_at) = self.index.get(now);

        let prefetch = self.position.last_fix().coordinates().is_some();
        let window = self.drain_window;

        let grid = &mut self.grid;
        let position = &mut self.position;

        let (fix, sky, prefetched) = thread::scope(|scope| {
            let handle = if prefetch {
                Some(scope.spawn(move || grid.fetch(now)))
            } else {
                None
            };

            let (fix, sky) = position.drain(window);

            let lookup = handle.and_then(|handle| match handle.join() {
                Ok(lookup) => Some(lookup),
                Err(_) => {
                    error!("grid: fetch thread panicked");
                    None
                },
            });

            (fix, sky, lookup)
        });

        let (grid_value, grid_provenance) = match fix.coordinates() {
            Some((lat, lon)) => {
                let lookup = match prefetched {
                    Some(lookup) => lookup,
                    None => self.grid.fetch(now),
                };
                self.interpolate(&lookup, round6(lat), round6(lon))
            },
            None => {
                debug!("grid: no position, skipped");
                (None, None)
            },
        };

        let mut radio = Vec::<RadioRecord>::new();

        if let Some(stat) = self.radio.survey_sample(&self.interface) {
            radio.push(RadioRecord::Survey(stat));
        }

        radio.extend(
            self.radio
                .scan_sample(&self.interface)
                .into_iter()
                .map(RadioRecord::Scan),
        );

        info!(
            "{} - index={:?} fix={} ({:?}, {:?}) sv={:?}/{:?} grid={:?} radio={} record(s)",
            iso8601(now),
            index_value,
            fix.quality,
            fix.lat,
            fix.lon,
            sky.satellites_used,
            sky.satellites_visible,
            grid_value,
            radio.len(),
        );

        if radio.is_empty() {
            warn!("radio: nothing to report on {}", self.interface);
        }

        radio
            .into_iter()
            .map(|radio| CorrelatedSample {
                radio,
                timestamp: now,
                index_value,
                index_valid_at: index_valid_at.clone(),
                fix: fix.clone(),
                sky: sky.clone(),
                grid_value,
                grid_provenance: grid_provenance.clone(),
            })
            .collect()
    }

    fn interpolate(
        &self,
        lookup: &GridLookup,
        lat: f64,
        lon: f64,
    ) -> (Option<f64>, Option<String>) {
        let Some(snapshot) = &lookup.snapshot else {
            return (None, None);
        };

        match snapshot.interpolate(lat, lon) {
            Some(value) => (Some(value), lookup.provenance(self.grid.dataset())),
            None => {
                debug!("grid: ({}, {}) outside of the grid", lat, lon);
                (None, None)
            },
        }
    }

    /// Ticks until `shutdown` is raised, passing each tick's records to the [SampleSink].
    /// Sleep is skipped when a tick overran its period, so ticks never pile up.
    /// Returns the number of ticks.
    pub fn run<K: SampleSink>(&mut self, sink: &mut K, shutdown: &AtomicBool) -> usize {
        let mut ticks = 0;
        let mut deadline = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            match Epoch::now() {
                Ok(now) => {
                    let samples = self.tick(now);
                    if let Err(e) = sink.append(&samples) {
                        error!("output: {}", e);
                    }
                },
                Err(e) => error!("system time: {}", e),
            }

            ticks += 1;
            deadline += self.period;

            let now = Instant::now();
            if deadline <= now {
                warn!(
                    "tick overran its period by {:?}",
                    now.duration_since(deadline)
                );
                deadline = now;
                continue;
            }

            while !shutdown.load(Ordering::Relaxed) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                thread::sleep(remaining.min(Duration::from_millis(250)));
            }
        }

        info!("stopped after {} tick(s)", ticks);
        ticks
    }
}
