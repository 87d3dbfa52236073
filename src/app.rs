// src/app.rs
//! # Application Bootstrap
//!
//! [`App`] owns the root of a command tree and the options record every
//! command is configured through. Running it goes:
//!
//! 1. parse the process arguments against the realized tree,
//! 2. resolve the deepest matched command,
//! 3. bind the options from defaults, the YAML file, the environment and the
//!    flags the user passed,
//! 4. call the command's run function.
//!
//! Nothing below [`App::run`] exits the process or prints errors; everything
//! is returned to it as an [`AppError`].

use crate::{
    command::{self, CommandOption, CommandSpec, Invocation, RealizedCommand, RunFn},
    config::{ConfigBinder, EnvLookup},
    constants::{
        CONFIG_FILE_TYPE, CONFIG_FLAG_NAME, CONFIG_FLAG_SHORT, CONFIG_GROUP, UNKNOWN_VERSION,
        VERSION_GROUP,
    },
    error::{AppError, BuildError, ConfigError},
    flags::{FlagDef, FlagSets, FlagValue, normalize_args},
};
use colored::Colorize;
use serde::{Serialize, de::DeserializeOwned};
use std::{ffi::OsString, fmt, path::PathBuf, sync::Arc};

/// The options record of an application.
///
/// The serialized default value is the lowest configuration layer; the flags
/// it declares are available on every command.
pub trait CliOptions: Serialize + DeserializeOwned {
    /// Flag groups exposed on the command line.
    fn flags(&self) -> FlagSets;

    /// Problems with a fully bound record. Empty means valid.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }
}

/// What a run function gets to see.
pub struct RunContext<'a, O> {
    app_name: &'a str,
    invocation: &'a Invocation<'a, O>,
    options: &'a O,
}

impl<O> fmt::Debug for RunContext<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("app_name", &self.app_name)
            .field("command_path", &self.command_path())
            .field("args", &self.args())
            .finish_non_exhaustive()
    }
}

impl<'a, O> RunContext<'a, O> {
    /// Builds a context; mostly useful for exercising run functions directly.
    pub fn new(app_name: &'a str, invocation: &'a Invocation<'a, O>, options: &'a O) -> Self {
        Self {
            app_name,
            invocation,
            options,
        }
    }

    /// Application name.
    pub fn app_name(&self) -> &str {
        self.app_name
    }

    /// Path of the running command, e.g. `app serve`.
    pub fn command_path(&self) -> &str {
        self.invocation.node().path()
    }

    /// Positional arguments.
    pub fn args(&self) -> &[String] {
        self.invocation.args()
    }

    /// The bound options.
    pub fn options(&self) -> &O {
        self.options
    }

    /// Raw value of a flag, by any spelling of its name.
    pub fn flag(&self, name: &str) -> Option<FlagValue> {
        self.invocation.value(name)
    }
}

/// How a successful execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The named command ran to completion.
    Ran {
        /// Path of the command that ran.
        command: String,
    },
    /// The matched command has nothing to run; this is its help text.
    Help(String),
}

/// Mutates exactly one aspect of an application under construction.
pub type AppOption<O> = Box<dyn FnOnce(&mut AppSettings<O>)>;

/// Everything an [`AppOption`] can change.
pub struct AppSettings<O> {
    options: O,
    description: String,
    use_name: Option<String>,
    short: String,
    long: Option<String>,
    run: Option<RunFn<O>>,
    commands: Vec<CommandSpec<O>>,
    strict_args: bool,
    parent_run: bool,
    no_config: bool,
    no_version: bool,
    version: Option<String>,
    config_dir: Option<PathBuf>,
    root_marker: Option<String>,
    working_dir: Option<PathBuf>,
    env: Option<EnvLookup>,
}

impl<O> fmt::Debug for AppSettings<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSettings")
            .field("use_name", &self.use_name)
            .field("no_config", &self.no_config)
            .field("no_version", &self.no_version)
            .field("version", &self.version)
            .field("config_dir", &self.config_dir)
            .finish_non_exhaustive()
    }
}

/// Sets the options record whose serialized value is the default layer.
pub fn with_options<O: 'static>(options: O) -> AppOption<O> {
    Box::new(move |s| s.options = options)
}

/// Sets the description, used as the long help unless `with_command` sets one.
pub fn with_description<O>(description: impl Into<String>) -> AppOption<O> {
    let description = description.into();
    Box::new(move |s| s.description = description)
}

/// Drops the `-c/--config` flag and skips file and environment binding.
pub fn with_no_config<O>() -> AppOption<O> {
    Box::new(|s| s.no_config = true)
}

/// Drops the `--version` flag.
pub fn with_no_version<O>() -> AppOption<O> {
    Box::new(|s| s.no_version = true)
}

/// Sets the version printed by `--version`.
pub fn with_version<O>(version: impl Into<String>) -> AppOption<O> {
    let version = version.into();
    Box::new(move |s| s.version = Some(version))
}

/// Sets the root command's entry point.
pub fn with_run<O, F>(run: F) -> AppOption<O>
where
    O: 'static,
    F: Fn(&RunContext<'_, O>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let run: RunFn<O> = Arc::new(run);
    Box::new(move |s| s.run = Some(run))
}

/// Sets the root command's usage name and descriptions.
pub fn with_command<O>(
    use_name: impl Into<String>,
    short: impl Into<String>,
    long: impl Into<String>,
) -> AppOption<O> {
    let (use_name, short, long) = (use_name.into(), short.into(), long.into());
    Box::new(move |s| {
        s.use_name = Some(use_name).filter(|n| !n.is_empty());
        s.short = short;
        s.long = Some(long).filter(|l| !l.is_empty());
    })
}

/// Rejects positional arguments of the root command as unknown commands.
pub fn with_default_valid_args<O>() -> AppOption<O> {
    Box::new(|s| s.strict_args = true)
}

/// Sets the sub-commands.
pub fn with_commands<O: 'static>(commands: Vec<CommandSpec<O>>) -> AppOption<O> {
    Box::new(move |s| s.commands = commands)
}

/// Allows the root to keep its run function next to sub-commands.
pub fn with_parent_run<O>() -> AppOption<O> {
    Box::new(|s| s.parent_run = true)
}

/// Registers the directory searched for `<name>.yaml` when no file is given.
pub fn with_config_dir<O>(dir: impl Into<PathBuf>) -> AppOption<O> {
    let dir = dir.into();
    Box::new(move |s| s.config_dir = Some(dir))
}

/// Changes the file marking the project root.
pub fn with_root_marker<O>(marker: impl Into<String>) -> AppOption<O> {
    let marker = marker.into();
    Box::new(move |s| s.root_marker = Some(marker))
}

/// Starts the project-root walk from `dir` instead of the process cwd.
pub fn with_working_dir<O>(dir: impl Into<PathBuf>) -> AppOption<O> {
    let dir = dir.into();
    Box::new(move |s| s.working_dir = Some(dir))
}

/// Replaces the environment lookup used for overrides.
pub fn with_env_lookup<O>(env: EnvLookup) -> AppOption<O> {
    Box::new(move |s| s.env = Some(env))
}

/// An application: a realized command tree plus its configuration wiring.
pub struct App<O> {
    prefix: String,
    name: String,
    settings: AppSettings<O>,
    root: RealizedCommand<O>,
}

impl<O> fmt::Debug for App<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("root", &self.root)
            .finish()
    }
}

impl<O> App<O>
where
    O: CliOptions + Default + 'static,
{
    /// Assembles the application and realizes its command tree.
    ///
    /// `prefix` names the environment variables (`<PREFIX>_<KEY>`), `name` is
    /// the default command name and the configuration file stem.
    pub fn new(
        prefix: impl Into<String>,
        name: impl Into<String>,
        options: Vec<AppOption<O>>,
    ) -> Result<Self, BuildError> {
        let mut settings = AppSettings {
            options: O::default(),
            description: String::new(),
            use_name: None,
            short: String::new(),
            long: None,
            run: None,
            commands: Vec::new(),
            strict_args: false,
            parent_run: false,
            no_config: false,
            no_version: false,
            version: None,
            config_dir: None,
            root_marker: None,
            working_dir: None,
            env: None,
        };
        for option in options {
            option(&mut settings);
        }

        let name = name.into();
        let root = Self::realize(&name, &mut settings)?;
        Ok(Self {
            prefix: prefix.into(),
            name,
            settings,
            root,
        })
    }

    fn realize(name: &str, settings: &mut AppSettings<O>) -> Result<RealizedCommand<O>, BuildError> {
        let use_name = settings.use_name.clone().unwrap_or_else(|| name.to_string());
        let long = settings
            .long
            .clone()
            .unwrap_or_else(|| settings.description.clone());

        let mut inherited = settings.options.flags();
        if !settings.no_config {
            inherited.group(CONFIG_GROUP).add(
                FlagDef::value(
                    CONFIG_FLAG_NAME,
                    format!(
                        "set the configuration file, the default configuration file type is {}",
                        CONFIG_FILE_TYPE
                    ),
                )
                .short(CONFIG_FLAG_SHORT)
                .value_name("FILE")
                .unbound(),
            );
        }

        let mut root_flags = FlagSets::new();
        if !settings.no_version {
            root_flags
                .group(VERSION_GROUP)
                .add(FlagDef::version_flag("print version information and quit"));
        }

        let mut root_options: Vec<CommandOption<O>> = vec![
            command::with_short(settings.short.clone()),
            command::with_flags(root_flags),
            command::with_children(std::mem::take(&mut settings.commands)),
        ];
        if !long.is_empty() {
            root_options.push(command::with_long(long));
        }
        if let Some(run) = settings.run.clone() {
            root_options.push(command::with_run(move |ctx: &RunContext<'_, O>| run(ctx)));
        }
        if settings.strict_args {
            root_options.push(command::with_strict_args());
        }
        if settings.parent_run {
            root_options.push(command::with_parent_run());
        }

        let mut root = CommandSpec::new(use_name, root_options).realize(None, &inherited)?;
        if !settings.no_version {
            let version = settings
                .version
                .clone()
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
            root.set_version(version);
        }
        Ok(root)
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The realized root command.
    pub fn root(&self) -> &RealizedCommand<O> {
        &self.root
    }

    /// Parses `argv` (program name first), binds the options and runs the
    /// matched command.
    pub fn execute<I, T>(&self, argv: I) -> Result<Outcome, AppError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let matches = self
            .root
            .command()
            .clone()
            .try_get_matches_from(normalize_args(argv))?;
        let invocation = self.root.resolve(&matches)?;
        let node = invocation.node();

        let Some(run) = node.run() else {
            let mut command = node.command().clone();
            return Ok(Outcome::Help(command.render_long_help().to_string()));
        };

        log_working_dir();
        for flag in node.flags().iter() {
            let value = invocation.value(flag.name()).map(|v| v.as_text());
            log::debug!("flag {}: {}", flag.name(), value.unwrap_or_default());
        }

        let options = self.bind(&invocation)?;
        let ctx = RunContext::new(&self.name, &invocation, &options);
        run(&ctx).map_err(AppError::Run)?;
        Ok(Outcome::Ran {
            command: node.path().to_string(),
        })
    }

    fn binder(&self) -> ConfigBinder {
        let mut binder = ConfigBinder::new(&self.prefix, &self.name);
        if let Some(dir) = &self.settings.config_dir {
            binder = binder.with_search_dir(dir.clone());
        }
        if let Some(marker) = &self.settings.root_marker {
            binder = binder.with_root_marker(marker.clone());
        }
        if let Some(dir) = &self.settings.working_dir {
            binder = binder.with_working_dir(dir.clone());
        }
        if let Some(env) = &self.settings.env {
            binder = binder.with_env_lookup(Arc::clone(env));
        }
        binder
    }

    fn bind(&self, invocation: &Invocation<'_, O>) -> Result<O, AppError> {
        let defaults = &self.settings.options;
        let options = if self.settings.no_config {
            ConfigBinder::bind_flags_only(defaults, invocation.bindings())?
        } else {
            let explicit = invocation.value(CONFIG_FLAG_NAME).map(|v| v.as_text());
            self.binder()
                .bind(defaults, explicit.as_deref(), invocation.bindings())?
        };

        let problems = options.validate();
        if !problems.is_empty() {
            return Err(ConfigError::Validation(problems).into());
        }
        Ok(options)
    }

    /// Runs with the process arguments and exits.
    ///
    /// Help and version go to stdout with status 0; every failure is logged
    /// and handed to [`exit_with`].
    pub fn run(self) -> ! {
        match self.execute(std::env::args_os()) {
            Ok(Outcome::Help(help)) => {
                print!("{}", help);
                std::process::exit(0);
            }
            Ok(Outcome::Ran { command }) => {
                log::debug!("'{}' finished", command);
                std::process::exit(0);
            }
            Err(e) => {
                if let Some(line) = failure_line(&self.name, &e) {
                    log::error!("{}", line);
                }
                exit_with(e)
            }
        }
    }
}

/// The log line for a failed run. Help and version requests are not failures.
fn failure_line(name: &str, err: &AppError) -> Option<String> {
    if err.is_display_request() {
        return None;
    }
    let text = err.to_string();
    let first = text.lines().next().unwrap_or_default();
    Some(format!("{} run failed: {}", name, first))
}

/// Reports `err` on the terminal and exits with its status.
///
/// clap renders its own errors, usage included; everything else is printed in
/// red.
pub fn exit_with(err: AppError) -> ! {
    match err {
        AppError::Cli(e) => e.exit(),
        e => {
            eprintln!("\n{}: {}", "Error".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn log_working_dir() {
    match std::env::current_dir() {
        Ok(dir) => log::info!("{} working dir: {}", "===>".green(), dir.display()),
        Err(e) => log::warn!("could not read working dir: {}", e),
    }
}
