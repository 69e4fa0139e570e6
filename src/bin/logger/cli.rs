use clap::{Arg, ArgAction, ColorChoice, Command};
use std::path::Path;

use spacewx_correlator::prelude::{Config, ConfigError};

pub struct Cli {
    config: Config,
    once: bool,
}

impl Cli {
    /// Parses the command line. The configuration file is optional:
    /// environment overrides always apply on top of it.
    pub fn new() -> Result<Self, ConfigError> {
        let cmd = Command::new("spacewx-logger")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Correlates geomagnetic index, TEC grid, GNSS fix and Wi-Fi noise samples")
            .arg_required_else_help(false)
            .color(ColorChoice::Always)
            .arg(
                Arg::new("cfg")
                    .short('c')
                    .long("cfg")
                    .action(ArgAction::Set)
                    .required(false)
                    .help("Load JSON configuration file (Optional)"),
            )
            .arg(
                Arg::new("once")
                    .long("once")
                    .action(ArgAction::SetTrue)
                    .help("Run a single tick and exit"),
            );

        let matches = cmd.get_matches();

        let config = match matches.get_one::<String>("cfg") {
            Some(path) => Config::from_file(Path::new(path))?.with_env_overrides()?,
            None => Config::from_env()?,
        };

        Ok(Self {
            config,
            once: matches.get_flag("once"),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn once(&self) -> bool {
        self.once
    }
}
