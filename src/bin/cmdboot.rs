// src/bin/cmdboot.rs
//! Demo application: `serve` waits for SIGINT/SIGTERM, `check` prints the
//! resolved configuration.

use anyhow::Result;
use cmdboot::{
    App, AppError, CliOptions, CommandSpec, FlagDef, FlagSets, RunContext,
    app::{exit_with, with_command, with_commands, with_description, with_options, with_version},
    command::{with_aliases, with_run, with_short, with_strict_args},
    logging, shutdown,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options of the demo application, bound from `cmdboot.yaml`, `CMDBOOT_*`
/// variables and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoOptions {
    name: String,
    port: u16,
    verbose: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            name: "cmdboot".to_string(),
            port: 8080,
            verbose: false,
        }
    }
}

impl CliOptions for DemoOptions {
    fn flags(&self) -> FlagSets {
        let mut sets = FlagSets::new();
        sets.group("server")
            .add(FlagDef::value("name", "Instance name").default_value(self.name.clone()))
            .add(
                FlagDef::value("port", "Port to report")
                    .short('p')
                    .value_name("PORT")
                    .default_value(self.port.to_string()),
            );
        sets.group("log")
            .add(FlagDef::bool("verbose", "Enable debug logging").short('v'));
        sets
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if self.port == 0 {
            problems.push("port must not be zero".to_string());
        }
        problems
    }
}

fn main() {
    logging::init(log::LevelFilter::Info);

    let commands = vec![
        CommandSpec::new(
            "serve",
            vec![
                with_short("Run until SIGINT or SIGTERM"),
                with_aliases(&["s"]),
                with_run(serve),
            ],
        ),
        CommandSpec::new(
            "check",
            vec![
                with_short("Print the resolved configuration"),
                with_strict_args(),
                with_run(check),
            ],
        ),
    ];

    let app = App::new(
        "cmdboot",
        "cmdboot",
        vec![
            with_options(DemoOptions::default()),
            with_description("Demo application for the cmdboot bootstrap."),
            with_command("cmdboot", "cmdboot demo", ""),
            with_version(clap::crate_version!()),
            with_commands(commands),
        ],
    );
    match app {
        Ok(app) => app.run(),
        Err(e) => {
            let err = AppError::from(e);
            log::error!("cmdboot build failed: {}", err);
            exit_with(err)
        }
    }
}

fn serve(ctx: &RunContext<'_, DemoOptions>) -> Result<()> {
    let options = ctx.options();
    logging::set_verbose(options.verbose);

    let stop = shutdown::install_global()?;
    log::info!(
        "{} '{}' pretending to serve on port {}",
        "===>".green(),
        options.name,
        options.port
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let ticks = runtime.block_on(async {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    ticks += 1;
                    log::debug!("tick {}", ticks);
                }
                () = stop.wait() => break ticks,
            }
        }
    });

    log::info!("{} stopped after {} ticks", "===>".green(), ticks);
    Ok(())
}

fn check(ctx: &RunContext<'_, DemoOptions>) -> Result<()> {
    let options = ctx.options();
    logging::set_verbose(options.verbose);

    println!("{} {}", "command:".bold(), ctx.command_path());
    println!("{} {}", "name:".bold(), options.name);
    println!("{} {}", "port:".bold(), options.port);
    println!("{} {}", "verbose:".bold(), options.verbose);
    if let Some(config) = ctx.flag("config") {
        println!("{} {}", "config:".bold(), config.as_text());
    }
    Ok(())
}
