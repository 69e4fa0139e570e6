use std::{collections::BTreeMap, sync::Arc, time::Duration};

use hifitime::Epoch;
use log::{debug, info, warn};

use crate::{
    error::Error,
    grid::GridSnapshot,
    time::{floor_to_slot, previous_slot, slot_key},
};

/// [GridService] is the remote grid provider, queried by 10' slot.
pub trait GridService {
    /// Returns the raw service response for this slot ("YYYY-MM-DD HH:MM:SS").
    fn fetch_slot(&self, slot: &str) -> Result<String, Error>;

    /// Dataset name, used to tag the interpolated values
    fn dataset(&self) -> String {
        "grid".to_string()
    }
}

/// [GridService] over HTTP
pub struct HttpGridService {
    url: String,
    agent: ureq::Agent,
}

impl HttpGridService {
    /// Builds a new [HttpGridService] for this endpoint.
    /// The slot is passed as `filter=dt,eq,<slot>` query parameter.
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("spacewx-logger/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            url: url.to_string(),
        }
    }
}

impl GridService for HttpGridService {
    fn fetch_slot(&self, slot: &str) -> Result<String, Error> {
        debug!("grid: GET {} ({})", self.url, slot);
        let response = self
            .agent
            .get(&self.url)
            .query("filter", &format!("dt,eq,{}", slot))
            .call()?;
        Ok(response.into_string()?)
    }

    fn dataset(&self) -> String {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("grid")
            .to_string()
    }
}

/// Result of a [GridFetcher::fetch] request.
#[derive(Debug, Clone, Default)]
pub struct GridLookup {
    /// Snapshot of the slot actually used
    pub snapshot: Option<Arc<GridSnapshot>>,
    /// Slot actually used ("YYYY-MM-DD HH:MM:SS")
    pub slot: Option<String>,
    /// Number of slots attempted, cached ones included
    pub attempts: usize,
}

impl GridLookup {
    /// Provenance tag of values interpolated from this lookup
    pub fn provenance(&self, dataset: &str) -> Option<String> {
        self.slot.as_ref().map(|slot| format!("{}@{}", dataset, slot))
    }
}

/// [GridFetcher] resolves a [GridSnapshot] for a given instant, stepping
/// backwards 10' at a time when a slot is not available yet, and caches
/// every successfully parsed slot.
pub struct GridFetcher<G: GridService> {
    service: G,
    tries: usize,
    capacity: usize,
    dataset: String,
    cache: BTreeMap<String, Arc<GridSnapshot>>,
}

impl<G: GridService> GridFetcher<G> {
    /// Creates a new [GridFetcher].
    /// ## Inputs
    /// - service: [GridService]
    /// - tries: number of slots attempted (at least 1)
    /// - capacity: maximal number of cached slots (at least 1).
    ///   The oldest slot is evicted first.
    pub fn new(service: G, tries: usize, capacity: usize) -> Self {
        let dataset = service.dataset();
        Self {
            service,
            dataset,
            tries: tries.max(1),
            capacity: capacity.max(1),
            cache: BTreeMap::new(),
        }
    }

    /// Dataset name of the underlying [GridService]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Number of cached slots
    pub fn cached_slots(&self) -> usize {
        self.cache.len()
    }

    /// Resolves the [GridSnapshot] for this instant. Returns an empty [GridLookup]
    /// once all attempts are exhausted.
    pub fn fetch(&mut self, t: Epoch) -> GridLookup {
        let mut slot = floor_to_slot(t);

        for attempt in 1..=self.tries {
            let key = slot_key(slot);

            if let Some(snapshot) = self.slot(&key) {
                return GridLookup {
                    snapshot: Some(snapshot),
                    slot: Some(key),
                    attempts: attempt,
                };
            }

            slot = previous_slot(slot);
        }

        warn!(
            "grid: no snapshot available for {} ({} slot(s) tried)",
            slot_key(floor_to_slot(t)),
            self.tries
        );

        GridLookup {
            snapshot: None,
            slot: None,
            attempts: self.tries,
        }
    }

    /// Returns this slot, from cache or from the remote service.
    fn slot(&mut self, key: &str) -> Option<Arc<GridSnapshot>> {
        if let Some(snapshot) = self.cache.get(key) {
            debug!("grid: slot {} (cached)", key);
            return Some(snapshot.clone());
        }

        let body = match self.service.fetch_slot(key) {
            Ok(body) => body,
            Err(e) => {
                warn!("grid: slot {} unavailable: {}", key, e);
                return None;
            },
        };

        let snapshot = match GridSnapshot::from_service_payload(&body) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("grid: slot {} rejected: {}", key, e);
                return None;
            },
        };

        let ((lat0, lat1), (lon0, lon1)) = snapshot.bounds();
        let (step_lat, step_lon) = snapshot.approx_step();

        info!(
            "grid: slot {} points={} lat[{}..{}] lon[{}..{}] step≈{:?}°x{:?}° ({}x{})",
            key,
            snapshot.len(),
            lat0,
            lat1,
            lon0,
            lon1,
            step_lat,
            step_lon,
            snapshot.latitudes().len(),
            snapshot.longitudes().len(),
        );

        let snapshot = Arc::new(snapshot);

        self.cache.insert(key.to_string(), snapshot.clone());

        while self.cache.len() > self.capacity {
            if let Some((evicted, _)) = self.cache.pop_first() {
                debug!("grid: slot {} evicted", evicted);
            }
        }

        Some(snapshot)
    }
}
