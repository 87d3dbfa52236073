// src/constants.rs
//! Fixed names shared by the flag, config and shutdown modules.

/// Flag group that is always merged last into a command.
pub const GLOBAL_GROUP: &str = "global";

/// Flag group holding the configuration file flag.
pub const CONFIG_GROUP: &str = "config";

/// Flag group holding the version flag.
pub const VERSION_GROUP: &str = "version";

/// Long name of the configuration file flag (`-c/--config`).
pub const CONFIG_FLAG_NAME: &str = "config";

/// Shorthand of the configuration file flag.
pub const CONFIG_FLAG_SHORT: char = 'c';

/// Long name of the help flag (`-h/--help`).
pub const HELP_FLAG_NAME: &str = "help";

/// Long name of the version flag.
pub const VERSION_FLAG_NAME: &str = "version";

/// Version printed by `--version` when the application sets none.
pub const UNKNOWN_VERSION: &str = "unknown";

/// The configuration file type. Explicit files are always parsed as this type.
pub const CONFIG_FILE_TYPE: &str = "yaml";

/// Extensions tried, in order, when searching a directory for the config file.
pub const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Default marker identifying the top-level directory of a source tree.
pub const DEFAULT_ROOT_MARKER: &str = "Cargo.toml";

/// Subdirectory of the project root searched when no other location is known.
pub const DEFAULT_CONFIG_SUBDIR: &str = "config";

/// Capacity of the shutdown signal queue.
pub const SIGNAL_QUEUE_CAPACITY: usize = 2;

/// Exit status used when a second termination signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 1;

/// Name of the hidden catch-all positional argument of every command.
pub(crate) const POSITIONAL_ARGS_ID: &str = "__args";
