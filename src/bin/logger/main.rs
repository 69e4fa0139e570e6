// Field logger: one correlated record per radio observation, every tick,
// appended to $SPACEWX_LOGDIR/wifi_gps_kp_qos.csv

#[macro_use]
extern crate log;

use env_logger::{Builder, Target};
use std::{process::ExitCode, sync::atomic::AtomicBool};

mod cli;
use cli::Cli;

use spacewx_correlator::prelude::{
    Epoch, ExternalIndexCache, GpsdStream, GridFetcher, HttpGridService, HttpIndexFeed,
    IwCommand, PositionSampler, RadioSurveySampler, SampleAssembler, SampleSink, CsvSink,
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn main() -> ExitCode {
    let mut builder = Builder::from_default_env();
    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cli = match Cli::new() {
        Ok(cli) => cli,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let cfg = cli.config();
    info!("{:#?}", cfg);

    let grid = GridFetcher::new(
        HttpGridService::new(&cfg.grid_url, cfg.grid_timeout()),
        cfg.grid_tries,
        cfg.grid_cache_slots,
    );

    let index = ExternalIndexCache::new(
        HttpIndexFeed::new(&cfg.index_url, cfg.index_timeout()),
        Some(cfg.index_cache_path()),
        cfg.index_refresh(),
    );

    let radio = RadioSurveySampler::new(IwCommand::new(&cfg.iw_path, cfg.radio_timeout()));

    let position = PositionSampler::new(GpsdStream::new(&cfg.gpsd_host, cfg.gpsd_port));

    let mut sink = match CsvSink::new(&cfg.csv_path()) {
        Ok(sink) => sink,
        Err(e) => {
            error!("failed to open {}: {}", cfg.csv_path().display(), e);
            return ExitCode::FAILURE;
        },
    };

    let mut assembler = SampleAssembler::new(cfg, grid, index, radio, position);

    info!(
        "logger deployed: {} every {:?}, gpsd {}:{}",
        cfg.wlan_interface,
        cfg.tick_period(),
        cfg.gpsd_host,
        cfg.gpsd_port
    );

    if cli.once() {
        let now = match Epoch::now() {
            Ok(now) => now,
            Err(e) => {
                error!("system time: {}", e);
                return ExitCode::FAILURE;
            },
        };
        let samples = assembler.tick(now);
        if let Err(e) = sink.append(&samples) {
            error!("output: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    assembler.run(&mut sink, &SHUTDOWN);
    ExitCode::SUCCESS
}
