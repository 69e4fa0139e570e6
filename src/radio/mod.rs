//! Radio (Wi-Fi) noise and occupancy sampling
use std::{
    io::Read,
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::error::Error;

mod scan;
mod survey;

pub use scan::{percentile, RadioScanStat};
pub use survey::RadioBandStat;

/// Frequency [Band] classification
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Band {
    /// 2400..=2500 MHz
    Band2G4,
    /// 5150..=5950 MHz
    Band5G,
    Unknown,
}

impl Band {
    /// Classifies this frequency (in MHz)
    pub fn from_mhz(freq_mhz: u32) -> Self {
        match freq_mhz {
            2400..=2500 => Self::Band2G4,
            5150..=5950 => Self::Band5G,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Band2G4 => write!(f, "2.4GHz"),
            Self::Band5G => write!(f, "5GHz"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// [CommandRunner] executes the radio diagnostic commands
/// and returns their standard output.
pub trait CommandRunner {
    fn run(&self, args: &[&str]) -> Result<String, Error>;
}

/// `iw` based [CommandRunner]. Each invocation is bounded in time:
/// the child process is killed once the timeout expires.
pub struct IwCommand {
    program: String,
    timeout: Duration,
}

impl IwCommand {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            timeout,
            program: program.to_string(),
        }
    }
}

impl IwCommand {
    /// Kills and reaps a child that must not outlive the call.
    fn terminate(&self, child: &mut Child) {
        if let Err(e) = child.kill() {
            warn!("radio: failed to kill {}: {}", self.program, e);
        }
        if let Err(e) = child.wait() {
            warn!("radio: failed to reap {}: {}", self.program, e);
        }
    }
}

impl CommandRunner for IwCommand {
    fn run(&self, args: &[&str]) -> Result<String, Error> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // drain stdout concurrently, scans may not fit in the pipe buffer
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Command(self.program.clone(), "no stdout".to_string()))?;

        let reader = std::thread::spawn(move || {
            let mut out = Vec::new();
            stdout.read_to_end(&mut out).map(|_| out)
        });

        let start = Instant::now();

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        self.terminate(&mut child);
                        return Err(Error::Timeout(self.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                },
                Err(e) => {
                    self.terminate(&mut child);
                    return Err(Error::Io(e));
                },
            }
        };

        let out = reader
            .join()
            .map_err(|_| Error::Command(self.program.clone(), "reader panicked".to_string()))??;

        if !status.success() {
            return Err(Error::Command(
                format!("{} {}", self.program, args.join(" ")),
                status.to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&out).to_string())
    }
}

/// [RadioSurveySampler] samples one wireless interface.
pub struct RadioSurveySampler<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> RadioSurveySampler<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Single channel noise and occupancy, on the channel currently in use.
    /// Returns None if the interface is down, does not support surveys,
    /// or the command failed.
    pub fn survey_sample(&self, interface: &str) -> Option<RadioBandStat> {
        let output = match self.runner.run(&["dev", interface, "survey", "dump"]) {
            Ok(output) => output,
            Err(e) => {
                warn!("radio: survey on {} unavailable: {}", interface, e);
                return None;
            },
        };

        let stat = RadioBandStat::parse(&output);

        match stat {
            Some(ref stat) => debug!("radio: {} survey {:?}", interface, stat),
            None => debug!("radio: {} survey reported no frequency", interface),
        }

        stat
    }

    /// Multi channel signal strength statistics, from a full band scan.
    /// Returns an empty list when the scan failed.
    pub fn scan_sample(&self, interface: &str) -> Vec<RadioScanStat> {
        let output = match self.runner.run(&["dev", interface, "scan"]) {
            Ok(output) => output,
            Err(e) => {
                warn!("radio: scan on {} unavailable: {}", interface, e);
                return Vec::new();
            },
        };

        let stats = RadioScanStat::parse(&output);
        debug!("radio: {} scan {} frequencies", interface, stats.len());
        stats
    }
}
