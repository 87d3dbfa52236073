// src/logging.rs
//! Logger setup for binaries built on this crate.
//!
//! The library only emits through the `log` facade; installing a logger is the
//! binary's call. When `RUST_LOG` is set it decides everything. Otherwise the
//! logger accepts every record and the global max level, set by [`init`] and
//! raised by [`set_verbose`], does the filtering, so a `--verbose` flag parsed
//! after startup still takes effect.

use env_logger::{Builder, DEFAULT_FILTER_ENV, Env};
use log::LevelFilter;

/// Installs `env_logger`. Without `RUST_LOG`, records above `default_level`
/// are dropped. Returns `false` if a logger was already installed.
///
/// ```ignore
/// cmdboot::logging::init(log::LevelFilter::Info);
/// ```
pub fn init(default_level: LevelFilter) -> bool {
    let installed = builder().try_init().is_ok();
    if installed && !env_configured() {
        log::set_max_level(default_level);
    }
    installed
}

/// Lets debug records through when `verbose` is set and `RUST_LOG` is not.
pub fn set_verbose(verbose: bool) {
    if verbose && !env_configured() {
        log::set_max_level(level_for(verbose));
    }
}

/// Level requested by a `--verbose` style switch.
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn env_configured() -> bool {
    std::env::var_os(DEFAULT_FILTER_ENV).is_some()
}

fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("trace"));
    builder
        .format_timestamp_secs()
        .format_target(false)
        // The signal listener thread runs inside tokio; keep its chatter quiet.
        .filter_module("tokio", LevelFilter::Warn);
    builder
}
