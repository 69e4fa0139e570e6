use super::Band;

/// Single channel noise and occupancy report
#[derive(Debug, Clone, PartialEq)]
pub struct RadioBandStat {
    /// Channel frequency (MHz)
    pub frequency: u32,
    /// Noise floor (dBm)
    pub noise_dbm: Option<f64>,
    /// Channel busy time / channel active time
    pub busy_ratio: Option<f64>,
}

#[derive(Debug, Default)]
struct SurveyBlock {
    frequency: Option<u32>,
    in_use: bool,
    noise: Option<f64>,
    active_ms: Option<f64>,
    busy_ms: Option<f64>,
}

/// Value preceding the trailing unit: "noise: -91 dBm" => -91
fn value_before_unit(line: &str) -> Option<f64> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let index = tokens.len().checked_sub(2)?;
    tokens[index].parse::<f64>().ok()
}

/// First value after the field name: "frequency: 2437 MHz" => 2437
pub(crate) fn first_value(line: &str) -> Option<f64> {
    line.split_whitespace().nth(1)?.parse::<f64>().ok()
}

impl RadioBandStat {
    /// [Band] of this channel
    pub fn band(&self) -> Band {
        Band::from_mhz(self.frequency)
    }

    /// Parses `iw dev <if> survey dump` output.
    /// Interfaces report one block per channel: the channel marked "[in use]" is
    /// preferred, otherwise the last reported channel is used.
    /// Returns None when no frequency was reported.
    pub fn parse(content: &str) -> Option<Self> {
        let mut blocks = Vec::<SurveyBlock>::new();

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("frequency:") {
                blocks.push(SurveyBlock {
                    frequency: first_value(line).map(|f| f.round() as u32),
                    in_use: line.contains("[in use]"),
                    ..Default::default()
                });
            } else if let Some(block) = blocks.last_mut() {
                if line.starts_with("noise:") {
                    block.noise = value_before_unit(line);
                } else if line.starts_with("channel active time:") {
                    block.active_ms = value_before_unit(line);
                } else if line.starts_with("channel busy time:") {
                    block.busy_ms = value_before_unit(line);
                }
            }
        }

        let block = blocks
            .iter()
            .filter(|b| b.frequency.is_some())
            .find(|b| b.in_use)
            .or_else(|| blocks.iter().filter(|b| b.frequency.is_some()).last())?;

        let busy_ratio = match (block.busy_ms, block.active_ms) {
            (Some(busy), Some(active)) if active > 0.0 => Some(busy / active),
            _ => None,
        };

        Some(Self {
            frequency: block.frequency?,
            noise_dbm: block.noise,
            busy_ratio,
        })
    }
}
