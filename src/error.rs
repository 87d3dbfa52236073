// src/error.rs
//! Every component surfaces its own error type to its caller. `AppError` is the
//! aggregate seen by the bootstrap's top level, which is the only place an error
//! turns into a log line and a process exit.

use std::path::PathBuf;
use thiserror::Error;

/// Wiring mistakes detected while the command tree is assembled or realized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Two different flags share a canonical name inside one command.
    #[error("flag '--{name}' is defined more than once in command '{command}'")]
    DuplicateFlag {
        /// Canonical flag name.
        name: String,
        /// Command whose merged view holds the collision.
        command: String,
    },
    /// Two different flags share a shorthand inside one command.
    #[error("shorthand '-{short}' is used by both '--{first}' and '--{second}' in command '{command}'")]
    DuplicateShorthand {
        /// The contested shorthand.
        short: char,
        /// Flag that claimed the shorthand first.
        first: String,
        /// Flag that tried to reuse it.
        second: String,
        /// Command whose merged view holds the collision.
        command: String,
    },
    /// A node with children was given a run function without opting in.
    #[error("command '{command}' has sub-commands and a run function; use `with_parent_run` to allow it")]
    RunnableParent {
        /// Offending command.
        command: String,
    },
    /// A flag or command name is empty after normalization.
    #[error("empty name in command '{command}'")]
    EmptyName {
        /// Command owning the empty name.
        command: String,
    },
}

/// Failures while locating, reading or unifying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The working directory could not be determined or canonicalized.
    #[error("could not resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
    /// No ancestor of `start` contains the project-root marker.
    #[error("no '{marker}' found in '{}' or any parent directory", .start.display())]
    RootNotFound {
        /// Directory the upward walk started from.
        start: PathBuf,
        /// Marker file that was looked for.
        marker: String,
    },
    /// No configuration file exists at any of the candidate locations.
    #[error("configuration file not found (tried: {})", display_paths(.tried))]
    NotFound {
        /// Every candidate path that was checked.
        tried: Vec<PathBuf>,
    },
    /// The configuration file path could not be expanded.
    #[error("could not expand configuration path '{path}': {reason}")]
    Expand {
        /// Raw path as passed on the command line.
        path: String,
        /// Why the expansion failed.
        reason: String,
    },
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file '{}': {source}", .path.display())]
    Read {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML.
    #[error("failed to parse configuration file '{}': {source}", .path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_yaml::Error,
    },
    /// The configuration file's top level is not a mapping.
    #[error("configuration file '{}' must contain a mapping at the top level", .path.display())]
    NotAMapping {
        /// Offending file.
        path: PathBuf,
    },
    /// A flag or environment value could not be converted to the expected type.
    #[error("invalid value '{value}' for key '{key}' from {origin}: {reason}")]
    InvalidValue {
        /// Config key being set.
        key: String,
        /// The raw string value.
        value: String,
        /// Layer the value came from (`flag`, `environment`).
        origin: &'static str,
        /// Why the conversion failed.
        reason: String,
    },
    /// The declared defaults could not be turned into a config value.
    #[error("failed to serialize default options: {0}")]
    Defaults(#[source] serde_yaml::Error),
    /// The unified value does not fit the target configuration record.
    #[error("failed to unmarshal configuration: {0}")]
    Unmarshal(#[source] serde_yaml::Error),
    /// The bound options rejected themselves.
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures of the shutdown coordinator that are not programming errors.
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The listener runtime or thread could not be started.
    #[error("failed to start shutdown listener: {0}")]
    Listener(#[source] std::io::Error),
    /// The coordinator was installed a second time.
    #[error("shutdown coordinator already installed")]
    AlreadyInstalled,
}

/// Everything that can end an application run with a non-zero status.
#[derive(Error, Debug)]
pub enum AppError {
    /// The command tree could not be realized.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Argument parsing failed (includes help and version requests).
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// A strict command received a positional argument.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    /// Configuration could not be resolved or bound.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The user's run function failed.
    #[error(transparent)]
    Run(anyhow::Error),
}

impl AppError {
    /// Process exit status for this error.
    ///
    /// Help and version requests surface as `Cli` errors but exit with 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cli(e) => e.exit_code(),
            Self::Build(_) => 1,
            Self::UnknownCommand(_) => 1,
            Self::Config(_) => 1,
            Self::Run(_) => 1,
        }
    }

    /// True for help/version requests, which are not failures.
    pub fn is_display_request(&self) -> bool {
        matches!(
            self,
            Self::Cli(e) if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_command_message_quotes_argument() {
        let err = AppError::UnknownCommand("bogus".to_string());
        assert_eq!(err.to_string(), "unknown command \"bogus\"");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let err = ConfigError::NotFound {
            tried: vec![PathBuf::from("/a/app.yaml"), PathBuf::from("/a/app.yml")],
        };
        assert_eq!(
            err.to_string(),
            "configuration file not found (tried: /a/app.yaml, /a/app.yml)"
        );
    }

    #[test]
    fn test_validation_joins_messages() {
        let err = ConfigError::Validation(vec!["port is zero".into(), "name is empty".into()]);
        assert_eq!(
            err.to_string(),
            "invalid configuration: port is zero; name is empty"
        );
    }
}
