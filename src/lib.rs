//! Bootstrap for command-line applications.
//!
//! - [`app`]: the application object, options binding and dispatch.
//! - [`command`]: command tree descriptors and their realization into clap.
//! - [`flags`]: named flag groups and name normalization.
//! - [`config`]: YAML file, environment and flag layering.
//! - [`shutdown`]: one-shot stop gate driven by SIGINT/SIGTERM.

pub mod app;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod flags;
pub mod logging;
pub mod shutdown;

pub use app::{App, AppOption, CliOptions, Outcome, RunContext};
pub use command::{CommandOption, CommandSpec};
pub use config::ConfigBinder;
pub use error::{AppError, BuildError, ConfigError, ShutdownError};
pub use flags::{FlagDef, FlagSets, FlagValue};
pub use shutdown::{ShutdownCoordinator, StopGate};
