#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

// private modules
mod assembler;
mod cfg;
mod error;
mod grid;
mod index;
mod position;
mod radio;
mod sample;
mod sink;
mod time;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::assembler::SampleAssembler;
    pub use crate::cfg::{Config, Error as ConfigError, CSV_FILE_NAME, INDEX_CACHE_FILE_NAME};
    pub use crate::error::Error;
    pub use crate::grid::{
        interpolate, GridFetcher, GridLookup, GridService, GridSnapshot, HttpGridService,
    };
    pub use crate::index::{ExternalIndexCache, HttpIndexFeed, IndexCacheEntry, IndexFeed};
    pub use crate::position::{
        FixQuality, GpsdStream, PositionFix, PositionSampler, Report, ReportStream, SkyGeometry,
    };
    pub use crate::radio::{
        percentile, Band, CommandRunner, IwCommand, RadioBandStat, RadioScanStat,
        RadioSurveySampler,
    };
    pub use crate::sample::{CorrelatedSample, RadioRecord, COLUMNS};
    pub use crate::sink::{CsvSink, SampleSink};
    pub use crate::time::{floor_to_slot, iso8601, previous_slot, slot_key};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch};
}

// pub export
pub use error::Error;
