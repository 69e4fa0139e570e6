//! Append-only record sinks
use std::{fs::OpenOptions, path::Path};

use log::info;

use crate::{error::Error, sample::CorrelatedSample};

/// [SampleSink] receives the records of each tick
pub trait SampleSink {
    fn append(&mut self, samples: &[CorrelatedSample]) -> Result<(), Error>;
}

/// CSV file [SampleSink]. Appends to an existing file,
/// the header is only written to new (or empty) files.
pub struct CsvSink {
    writer: csv::Writer<std::fs::File>,
}

impl CsvSink {
    pub fn new(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let new = file.metadata()?.len() == 0;

        if new {
            info!("output: created {}", path.display());
        } else {
            info!("output: appending to {}", path.display());
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(new)
            .from_writer(file);

        Ok(Self { writer })
    }
}

impl SampleSink for CsvSink {
    fn append(&mut self, samples: &[CorrelatedSample]) -> Result<(), Error> {
        for sample in samples {
            self.writer.serialize(sample.row())?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{CsvSink, SampleSink};
    use crate::{
        position::{PositionFix, SkyGeometry},
        radio::RadioBandStat,
        sample::{CorrelatedSample, RadioRecord, COLUMNS},
    };

    use hifitime::Epoch;
    use std::str::FromStr;

    fn sample(freq: u32) -> CorrelatedSample {
        CorrelatedSample {
            timestamp: Epoch::from_str("2025-01-01T12:00:00 UTC").unwrap(),
            index_value: None,
            index_valid_at: None,
            fix: PositionFix::default(),
            sky: SkyGeometry::default(),
            radio: RadioRecord::Survey(RadioBandStat {
                frequency: freq,
                noise_dbm: None,
                busy_ratio: None,
            }),
            grid_value: None,
            grid_provenance: None,
        }
    }

    #[test]
    fn append_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("out.csv");

        let mut sink = CsvSink::new(&path).unwrap();
        sink.append(&[sample(2412), sample(2437)]).unwrap();
        drop(sink);

        let mut sink = CsvSink::new(&path).unwrap();
        sink.append(&[sample(5180)]).unwrap();
        sink.append(&[]).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines = content.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "2025-01-01T12:00:00Z,,,NO,,,,,,,,,,SURVEY,2412,,,,,,,2.4GHz,,"
        );
        assert!(lines[3].contains(",5180,"));
        assert_eq!(lines.iter().filter(|l| l.starts_with("ts,")).count(), 1);
    }
}
