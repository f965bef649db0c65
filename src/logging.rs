//! Logger setup.
//!
//! `RUST_LOG` wins when set; otherwise `-v` flags raise the level from the
//! default of `warn`.

use env_logger::Builder;
use log::LevelFilter;
use std::env;

/// Initialize `env_logger` once for the process
pub fn init_logging(verbosity: u8) {
    let mut builder = Builder::new();

    if env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_for(verbosity));
    }

    // A second initialisation (tests, embedding) keeps the first logger
    let _ = builder.try_init();
}

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
