use std::{path::PathBuf, str::FromStr, time::Duration};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

/// Configuration Error
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value \"{1}\" for {0}")]
    InvalidOverride(&'static str, String),
    #[error("grid slot retry count must be at least 1")]
    NullGridTries,
    #[error("tick period must be strictly positive")]
    InvalidTickPeriod,
    #[error("position drain window must be strictly positive")]
    InvalidDrainWindow,
    #[error("{0} must be a finite number of seconds, within [0, 86400]")]
    DurationOutOfRange(&'static str),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Longest delay (s) accepted by any duration setting
pub const MAX_SECONDS: f64 = 86_400.0;

/// Converts validated seconds. Values out of range saturate
/// and non-numbers resolve to zero, so this never panics.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_SECONDS)).unwrap_or_default()
}

/// CSV output file name, within [Config::log_dir]
pub const CSV_FILE_NAME: &str = "wifi_gps_kp_qos.csv";

/// Persisted index cache file name, within [Config::log_dir]
pub const INDEX_CACHE_FILE_NAME: &str = ".kp_cache.json";

fn default_index_url() -> String {
    "https://services.swpc.noaa.gov/products/noaa-planetary-k-index.json".to_string()
}

fn default_index_refresh() -> f64 {
    300.0
}

fn default_index_timeout() -> f64 {
    10.0
}

fn default_grid_url() -> String {
    "http://ws-eswua.rm.ingv.it/tecdb.php/records/wsnc_eu".to_string()
}

fn default_grid_tries() -> usize {
    3
}

fn default_grid_timeout() -> f64 {
    8.0
}

fn default_grid_cache_slots() -> usize {
    16
}

fn default_gpsd_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gpsd_port() -> u16 {
    2947
}

fn default_drain_window() -> f64 {
    1.2
}

fn default_wlan_interface() -> String {
    "wlan1".to_string()
}

fn default_iw_path() -> String {
    "/sbin/iw".to_string()
}

fn default_radio_timeout() -> f64 {
    8.0
}

fn default_tick_period() -> f64 {
    60.0
}

fn default_log_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("spacewx_logs"),
        None => PathBuf::from("spacewx_logs"),
    }
}

/// Correlator [Config]uration.
/// Every field has a documented default, so an empty JSON object
/// is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Planetary K-index JSON feed
    #[serde(default = "default_index_url")]
    pub index_url: String,
    /// Minimal delay between two successful index refreshes (s)
    #[serde(default = "default_index_refresh")]
    pub index_refresh_s: f64,
    /// Index feed HTTP timeout (s)
    #[serde(default = "default_index_timeout")]
    pub index_timeout_s: f64,
    /// TEC grid service endpoint
    #[serde(default = "default_grid_url")]
    pub grid_url: String,
    /// Number of 10' slots tried, stepping backwards
    #[serde(default = "default_grid_tries")]
    pub grid_tries: usize,
    /// Grid service HTTP timeout (s)
    #[serde(default = "default_grid_timeout")]
    pub grid_timeout_s: f64,
    /// Maximal number of grid snapshots held in memory
    #[serde(default = "default_grid_cache_slots")]
    pub grid_cache_slots: usize,
    /// gpsd host
    #[serde(default = "default_gpsd_host")]
    pub gpsd_host: String,
    /// gpsd port
    #[serde(default = "default_gpsd_port")]
    pub gpsd_port: u16,
    /// Hard wall-clock budget of the position drain (s)
    #[serde(default = "default_drain_window")]
    pub drain_window_s: f64,
    /// Wireless interface surveyed and scanned
    #[serde(default = "default_wlan_interface")]
    pub wlan_interface: String,
    /// `iw` executable
    #[serde(default = "default_iw_path")]
    pub iw_path: String,
    /// Radio command timeout (s)
    #[serde(default = "default_radio_timeout")]
    pub radio_timeout_s: f64,
    /// Sampling period (s)
    #[serde(default = "default_tick_period")]
    pub tick_period_s: f64,
    /// Output directory (CSV records and index cache)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            index_refresh_s: default_index_refresh(),
            index_timeout_s: default_index_timeout(),
            grid_url: default_grid_url(),
            grid_tries: default_grid_tries(),
            grid_timeout_s: default_grid_timeout(),
            grid_cache_slots: default_grid_cache_slots(),
            gpsd_host: default_gpsd_host(),
            gpsd_port: default_gpsd_port(),
            drain_window_s: default_drain_window(),
            wlan_interface: default_wlan_interface(),
            iw_path: default_iw_path(),
            radio_timeout_s: default_radio_timeout(),
            tick_period_s: default_tick_period(),
            log_dir: default_log_dir(),
        }
    }
}

/// Parses an environment override, when defined.
fn env_override<T: FromStr>(key: &'static str) -> Result<Option<T>, Error> {
    match std::env::var(key) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|_| Error::InvalidOverride(key, value.clone()))?;
            debug!("{} override: {}", key, value);
            Ok(Some(parsed))
        },
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Builds a [Config] from the default values and environment overrides.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().with_env_overrides()
    }

    /// Loads a JSON [Config] file. Missing fields take their default value.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&content)?;
        Ok(cfg)
    }

    /// Applies environment overrides on top of [Self], then validates the result.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        if let Some(url) = env_override::<String>("KP_URL")? {
            self.index_url = url;
        }
        if let Some(refresh) = env_override::<f64>("KP_REFRESH_S")? {
            self.index_refresh_s = refresh;
        }
        if let Some(url) = env_override::<String>("TEC_INGV_URL")? {
            self.grid_url = url;
        }
        if let Some(tries) = env_override::<usize>("TEC_INGV_TRIES")? {
            self.grid_tries = tries;
        }
        if let Some(host) = env_override::<String>("GPSD_HOST")? {
            self.gpsd_host = host;
        }
        if let Some(port) = env_override::<u16>("GPSD_PORT")? {
            self.gpsd_port = port;
        }
        if let Some(interface) = env_override::<String>("WLAN_IF")? {
            self.wlan_interface = interface;
        }
        if let Some(iw) = env_override::<String>("IW_PATH")? {
            self.iw_path = iw;
        }
        if let Some(period) = env_override::<f64>("TICK_PERIOD_S")? {
            self.tick_period_s = period;
        }
        if let Some(dir) = env_override::<PathBuf>("SPACEWX_LOGDIR")? {
            self.log_dir = dir;
        }
        self.validate()?;
        Ok(self)
    }

    /// Verifies [Self] is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.grid_tries == 0 {
            return Err(Error::NullGridTries);
        }
        if !(self.tick_period_s > 0.0) {
            return Err(Error::InvalidTickPeriod);
        }
        if !(self.drain_window_s > 0.0) {
            return Err(Error::InvalidDrainWindow);
        }
        for (name, value) in [
            ("tick_period_s", self.tick_period_s),
            ("drain_window_s", self.drain_window_s),
            ("index_refresh_s", self.index_refresh_s),
            ("index_timeout_s", self.index_timeout_s),
            ("grid_timeout_s", self.grid_timeout_s),
            ("radio_timeout_s", self.radio_timeout_s),
        ] {
            if !(0.0..=MAX_SECONDS).contains(&value) {
                return Err(Error::DurationOutOfRange(name));
            }
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        seconds(self.tick_period_s)
    }

    pub fn drain_window(&self) -> Duration {
        seconds(self.drain_window_s)
    }

    pub fn index_refresh(&self) -> Duration {
        seconds(self.index_refresh_s)
    }

    pub fn index_timeout(&self) -> Duration {
        seconds(self.index_timeout_s)
    }

    pub fn grid_timeout(&self) -> Duration {
        seconds(self.grid_timeout_s)
    }

    pub fn radio_timeout(&self) -> Duration {
        seconds(self.radio_timeout_s)
    }

    /// CSV records file
    pub fn csv_path(&self) -> PathBuf {
        self.log_dir.join(CSV_FILE_NAME)
    }

    /// Persisted index cache file
    pub fn index_cache_path(&self) -> PathBuf {
        self.log_dir.join(INDEX_CACHE_FILE_NAME)
    }
}

#[cfg(test)]
mod test {
    use super::{Config, Error};

    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.grid_tries, 3);
        assert_eq!(cfg.gpsd_port, 2947);
        assert_eq!(cfg.wlan_interface, "wlan1");
        assert_eq!(cfg.tick_period_s, 60.0);
        assert_eq!(cfg.index_refresh_s, 300.0);
        assert_eq!(cfg.drain_window().as_millis(), 1200);
        assert!(cfg.csv_path().ends_with("wifi_gps_kp_qos.csv"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json() {
        let cfg: Config = serde_json::from_str(r#"{"grid_tries": 5, "wlan_interface": "wlan0"}"#)
            .unwrap();
        assert_eq!(cfg.grid_tries, 5);
        assert_eq!(cfg.wlan_interface, "wlan0");
        assert_eq!(cfg.gpsd_host, "127.0.0.1");
        assert_eq!(cfg.grid_timeout_s, 8.0);
    }

    #[test]
    fn config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.json");

        std::fs::write(&path, r#"{"tick_period_s": 30, "log_dir": "/var/log/spacewx"}"#).unwrap();

        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.tick_period().as_secs(), 30);
        assert_eq!(
            cfg.index_cache_path().to_str(),
            Some("/var/log/spacewx/.kp_cache.json")
        );

        std::fs::write(&path, "{ \"grid_tries\": \"three\" }").unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::Parse(_))));

        assert!(matches!(
            Config::from_file(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn validation() {
        let mut cfg = Config::default();
        cfg.grid_tries = 0;
        assert!(matches!(cfg.validate(), Err(Error::NullGridTries)));

        let mut cfg = Config::default();
        cfg.tick_period_s = 0.0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidTickPeriod)));

        let mut cfg = Config::default();
        cfg.drain_window_s = -1.0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidDrainWindow)));

        let mut cfg = Config::default();
        cfg.tick_period_s = f64::NAN;
        assert!(matches!(cfg.validate(), Err(Error::InvalidTickPeriod)));
    }

    #[rstest]
    #[case("tick_period_s", f64::INFINITY)]
    #[case("drain_window_s", 1.0e12)]
    #[case("index_refresh_s", -300.0)]
    #[case("index_timeout_s", f64::NAN)]
    #[case("grid_timeout_s", -1.0)]
    #[case("radio_timeout_s", f64::NEG_INFINITY)]
    fn durations_out_of_range(#[case] field: &str, #[case] value: f64) {
        let mut cfg = Config::default();
        match field {
            "tick_period_s" => cfg.tick_period_s = value,
            "drain_window_s" => cfg.drain_window_s = value,
            "index_refresh_s" => cfg.index_refresh_s = value,
            "index_timeout_s" => cfg.index_timeout_s = value,
            "grid_timeout_s" => cfg.grid_timeout_s = value,
            "radio_timeout_s" => cfg.radio_timeout_s = value,
            _ => unreachable!(),
        }

        match cfg.validate() {
            Err(Error::DurationOutOfRange(name)) => assert_eq!(name, field),
            other => panic!("unexpected {:?}", other),
        }

        // conversions never panic, even unvalidated
        assert!(cfg.tick_period() <= Duration::from_secs(86_400));
        assert!(cfg.drain_window() <= Duration::from_secs(86_400));
        assert!(cfg.index_refresh() <= Duration::from_secs(86_400));
        assert!(cfg.index_timeout() <= Duration::from_secs(86_400));
        assert!(cfg.grid_timeout() <= Duration::from_secs(86_400));
        assert!(cfg.radio_timeout() <= Duration::from_secs(86_400));
    }

    #[test]
    fn infinite_period_override() {
        std::env::set_var("TICK_PERIOD_S", "inf");
        let result = Config::from_env();
        std::env::remove_var("TICK_PERIOD_S");

        assert!(matches!(
            result,
            Err(Error::DurationOutOfRange("tick_period_s"))
        ));
    }
}
