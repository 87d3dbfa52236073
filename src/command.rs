// src/command.rs
//! # Command Tree
//!
//! Commands are described first, as an immutable tree of [`CommandSpec`]
//! descriptors, and realized afterwards into a [`RealizedCommand`] tree that
//! owns the `clap::Command` parser and the merged flag view of every node.
//!
//! Realization is where wiring mistakes surface: duplicated flags, reused
//! shorthands, and parents with a run function they did not opt into.

use crate::{
    app::RunContext,
    constants::{GLOBAL_GROUP, POSITIONAL_ARGS_ID},
    error::{AppError, BuildError},
    flags::{FlagBindings, FlagDef, FlagSets, FlagValue, MergedFlags},
};
use clap::{Arg, ArgAction, ArgMatches, Command, parser::ValueSource};
use colored::Colorize;
use std::{fmt, sync::Arc};

/// A command's entry point.
pub type RunFn<O> = Arc<dyn Fn(&RunContext<'_, O>) -> anyhow::Result<()> + Send + Sync>;

/// Mutates exactly one aspect of a [`CommandSpec`].
pub type CommandOption<O> = Box<dyn FnOnce(&mut CommandSpec<O>)>;

/// Declarative description of one command and its children.
pub struct CommandSpec<O> {
    name: String,
    short: String,
    long: Option<String>,
    run: Option<RunFn<O>>,
    flags: FlagSets,
    children: Vec<CommandSpec<O>>,
    strict_args: bool,
    parent_run: bool,
    hidden: bool,
    aliases: Vec<String>,
}

impl<O> fmt::Debug for CommandSpec<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("short", &self.short)
            .field("runnable", &self.run.is_some())
            .field("flags", &self.flags)
            .field("children", &self.children)
            .field("strict_args", &self.strict_args)
            .finish_non_exhaustive()
    }
}

impl<O> CommandSpec<O> {
    /// Describes a command, applying `options` in order; later options win.
    pub fn new(name: impl Into<String>, options: Vec<CommandOption<O>>) -> Self {
        let mut spec = Self {
            name: name.into(),
            short: String::new(),
            long: None,
            run: None,
            flags: FlagSets::new(),
            children: Vec::new(),
            strict_args: false,
            parent_run: false,
            hidden: false,
            aliases: Vec::new(),
        };
        for option in options {
            option(&mut spec);
        }
        spec
    }

    /// Command name as typed on the command line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct children.
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Realizes this node and all of its descendants.
    ///
    /// `parent` is the space-separated path of the parent command, `inherited`
    /// holds the groups every node of the tree receives in addition to its
    /// own.
    pub fn realize(
        &self,
        parent: Option<&str>,
        inherited: &FlagSets,
    ) -> Result<RealizedCommand<O>, BuildError> {
        let path = match parent {
            Some(parent) => format!("{} {}", parent, self.name),
            None => self.name.clone(),
        };
        if self.name.trim().is_empty() {
            return Err(BuildError::EmptyName { command: path });
        }
        if self.run.is_some() && !self.children.is_empty() && !self.parent_run {
            return Err(BuildError::RunnableParent { command: path });
        }

        let mut sets = self.flags.clone();
        for group in inherited.groups() {
            let target = sets.group(group.name());
            for flag in group.flags() {
                target.add(flag.clone());
            }
        }
        sets.group(GLOBAL_GROUP)
            .add(FlagDef::help_flag(format!("help for {}", self.name.green())));

        let mut flags = MergedFlags::new(path.clone());
        sets.merge_into(&mut flags)?;

        let children = self
            .children
            .iter()
            .map(|child| child.realize(Some(&path), inherited))
            .collect::<Result<Vec<_>, _>>()?;

        let command = Command::new(self.name.clone())
            .bin_name(path.clone())
            .about(self.short.clone())
            .long_about(self.long.clone().unwrap_or_else(|| self.short.clone()))
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(children.is_empty())
            .hide(self.hidden)
            .aliases(self.aliases.clone())
            .args(flags.to_args())
            .arg(
                Arg::new(POSITIONAL_ARGS_ID)
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .hide(true),
            )
            .subcommands(children.iter().map(|child| child.command.clone()));

        Ok(RealizedCommand {
            name: self.name.clone(),
            path,
            command,
            flags,
            run: self.run.clone(),
            strict_args: self.strict_args,
            children,
        })
    }
}

/// Sets the one-line description.
pub fn with_short<O>(short: impl Into<String>) -> CommandOption<O> {
    let short = short.into();
    Box::new(move |spec| spec.short = short)
}

/// Sets the long description. Defaults to the short one.
pub fn with_long<O>(long: impl Into<String>) -> CommandOption<O> {
    let long = long.into();
    Box::new(move |spec| spec.long = Some(long))
}

/// Sets the entry point.
pub fn with_run<O, F>(run: F) -> CommandOption<O>
where
    O: 'static,
    F: Fn(&RunContext<'_, O>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let run: RunFn<O> = Arc::new(run);
    Box::new(move |spec| spec.run = Some(run))
}

/// Replaces the command's own flag groups.
pub fn with_flags<O>(flags: FlagSets) -> CommandOption<O> {
    Box::new(move |spec| spec.flags = flags)
}

/// Replaces the child commands.
pub fn with_children<O: 'static>(children: Vec<CommandSpec<O>>) -> CommandOption<O> {
    Box::new(move |spec| spec.children = children)
}

/// Rejects every non-empty positional argument as an unknown command.
pub fn with_strict_args<O>() -> CommandOption<O> {
    Box::new(|spec| spec.strict_args = true)
}

/// Allows a command with children to have its own entry point.
pub fn with_parent_run<O>() -> CommandOption<O> {
    Box::new(|spec| spec.parent_run = true)
}

/// Keeps the command out of help listings.
pub fn with_hidden<O>() -> CommandOption<O> {
    Box::new(|spec| spec.hidden = true)
}

/// Alternative names the command answers to.
pub fn with_aliases<O>(aliases: &[&str]) -> CommandOption<O> {
    let aliases: Vec<String> = aliases.iter().map(ToString::to_string).collect();
    Box::new(move |spec| spec.aliases = aliases)
}

/// A command ready for parsing.
pub struct RealizedCommand<O> {
    name: String,
    path: String,
    command: Command,
    flags: MergedFlags,
    run: Option<RunFn<O>>,
    strict_args: bool,
    children: Vec<RealizedCommand<O>>,
}

impl<O> fmt::Debug for RealizedCommand<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealizedCommand")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("runnable", &self.run.is_some())
            .field("strict_args", &self.strict_args)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl<O> RealizedCommand<O> {
    /// Command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Space-separated path from the root, e.g. `app serve`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The clap parser of this node and its subtree.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Merged flag view.
    pub fn flags(&self) -> &MergedFlags {
        &self.flags
    }

    /// Entry point, if the node is runnable.
    pub fn run(&self) -> Option<&RunFn<O>> {
        self.run.as_ref()
    }

    /// Realized children.
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Finds a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn set_version(&mut self, version: String) {
        self.command = self.command.clone().version(version);
    }

    /// Follows the matched subcommands down to the deepest one and checks its
    /// positional arguments.
    pub fn resolve<'a>(&'a self, matches: &'a ArgMatches) -> Result<Invocation<'a, O>, AppError> {
        let mut trail = vec![(self, matches)];
        let mut bindings = FlagBindings::collect(&self.flags, matches);
        let (mut node, mut current) = (self, matches);

        while let Some((name, sub_matches)) = current.subcommand() {
            let Some(child) = node.child(name) else {
                break;
            };
            node = child;
            current = sub_matches;
            bindings.extend(FlagBindings::collect(&node.flags, current));
            trail.push((node, current));
        }

        let args: Vec<String> = current
            .get_many::<String>(POSITIONAL_ARGS_ID)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        // A parent with nothing to run only takes sub-command names.
        let rejects_args = node.strict_args || (node.run.is_none() && !node.children.is_empty());
        if rejects_args
            && let Some(arg) = args.iter().find(|arg| !arg.is_empty())
        {
            return Err(AppError::UnknownCommand(arg.clone()));
        }

        Ok(Invocation {
            node,
            trail,
            args,
            bindings,
        })
    }
}

/// The result of resolving parsed arguments against the tree.
#[derive(Debug)]
pub struct Invocation<'a, O> {
    node: &'a RealizedCommand<O>,
    trail: Vec<(&'a RealizedCommand<O>, &'a ArgMatches)>,
    args: Vec<String>,
    bindings: FlagBindings,
}

impl<'a, O> Invocation<'a, O> {
    /// The deepest matched command.
    pub fn node(&self) -> &'a RealizedCommand<O> {
        self.node
    }

    /// Positional arguments of the deepest command.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Flags passed explicitly anywhere along the path, deeper first.
    pub fn bindings(&self) -> &FlagBindings {
        &self.bindings
    }

    /// Value of `name`: the deepest explicit occurrence along the path, or the
    /// deepest command's default.
    pub fn value(&self, name: &str) -> Option<FlagValue> {
        let explicit = self.trail.iter().rev().find_map(|(node, matches)| {
            let flag = node.flags.get(name)?;
            match matches.value_source(flag.name()) {
                Some(ValueSource::CommandLine) => node.flags.value(matches, name),
                _ => None,
            }
        });
        explicit.or_else(|| {
            let (node, matches) = self.trail.last()?;
            node.flags.value(matches, name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::normalize_args;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Opts {
        port: u16,
    }

    fn inherited() -> FlagSets {
        let mut sets = FlagSets::new();
        sets.group("server")
            .add(FlagDef::value("port", "Port to listen on").short('p'));
        sets
    }

    fn tree() -> CommandSpec<Opts> {
        CommandSpec::new(
            "app",
            vec![
                with_short("test application"),
                with_children(vec![
                    CommandSpec::new(
                        "serve",
                        vec![
                            with_short("serve requests"),
                            with_strict_args(),
                            with_aliases(&["s"]),
                            with_run(|_| Ok(())),
                        ],
                    ),
                    CommandSpec::new("exec", vec![with_run(|_| Ok(()))]),
                ]),
            ],
        )
    }

    fn parse(root: &RealizedCommand<Opts>, argv: &[&str]) -> Result<ArgMatches, clap::Error> {
        root.command()
            .clone()
            .try_get_matches_from(normalize_args(argv.iter().copied()))
    }

    #[test]
    fn test_later_options_win() {
        let spec: CommandSpec<Opts> =
            CommandSpec::new("app", vec![with_short("first"), with_short("second")]);
        let root = spec.realize(None, &FlagSets::new()).expect("realize");
        assert_eq!(
            root.command().get_about().map(ToString::to_string),
            Some("second".to_string())
        );
        assert_eq!(
            root.command().get_long_about().map(ToString::to_string),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_runnable_parent_requires_opt_in() {
        let spec: CommandSpec<Opts> = CommandSpec::new(
            "app",
            vec![
                with_run(|_| Ok(())),
                with_children(vec![CommandSpec::new("child", vec![])]),
            ],
        );
        let err = spec.realize(None, &FlagSets::new()).expect_err("should be rejected");
        assert_eq!(
            err,
            BuildError::RunnableParent {
                command: "app".to_string()
            }
        );

        let spec: CommandSpec<Opts> = CommandSpec::new(
            "app",
            vec![
                with_run(|_| Ok(())),
                with_parent_run(),
                with_children(vec![CommandSpec::new("child", vec![])]),
            ],
        );
        assert!(spec.realize(None, &FlagSets::new()).is_ok());
    }

    #[test]
    fn test_help_subcommand_only_with_children() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let err = parse(&root, &["app", "help", "serve"]).expect_err("help is a display request");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let leaf = root.child("exec").expect("exec");
        let matches = parse(leaf, &["app exec", "help"]).expect("help is just a positional");
        let invocation = leaf.resolve(&matches).expect("exec is not strict");
        assert_eq!(invocation.args(), ["help"]);
    }

    #[test]
    fn test_every_node_gets_help_and_inherited_flags() {
        let root = tree().realize(None, &inherited()).expect("realize");
        for node in [&root, root.child("serve").expect("serve")] {
            assert!(node.flags().get("help").is_some());
            assert!(node.flags().get("port").is_some());
        }
        let names: Vec<_> = root.flags().iter().map(FlagDef::name).collect();
        assert_eq!(names.last(), Some(&"help"));
    }

    #[test]
    fn test_inherited_collision_is_a_build_error() {
        let mut own = FlagSets::new();
        own.group("serve").add(FlagDef::value("path", "").short('p'));
        let spec: CommandSpec<Opts> = CommandSpec::new("app", vec![with_flags(own)]);
        let err = spec.realize(None, &inherited()).expect_err("shorthand clash");
        assert!(matches!(err, BuildError::DuplicateShorthand { short: 'p', .. }));
    }

    #[test]
    fn test_strict_node_rejects_positional() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "serve", "bogus"]).expect("parse");
        let err = root.resolve(&matches).expect_err("strict");
        assert_eq!(err.to_string(), "unknown command \"bogus\"");
    }

    #[test]
    fn test_parent_without_run_rejects_unknown_subcommand() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "serv"]).expect("parse");
        let err = root.resolve(&matches).expect_err("typo is not a command");
        assert_eq!(err.to_string(), "unknown command \"serv\"");
        assert_eq!(err.exit_code(), 1);

        let matches = parse(&root, &["app"]).expect("parse");
        let invocation = root.resolve(&matches).expect("bare parent");
        assert!(invocation.node().run().is_none());
    }

    #[test]
    fn test_lenient_node_accepts_positional() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "exec", "one", "two"]).expect("parse");
        let invocation = root.resolve(&matches).expect("lenient");
        assert_eq!(invocation.node().path(), "app exec");
        assert_eq!(invocation.args(), ["one", "two"]);
    }

    #[test]
    fn test_alias_resolves_to_canonical_node() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "s"]).expect("parse");
        let invocation = root.resolve(&matches).expect("resolve");
        assert_eq!(invocation.node().name(), "serve");
        assert!(invocation.node().run().is_some());
    }

    #[test]
    fn test_deeper_explicit_flag_wins() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "-p", "1", "serve", "--port", "2"]).expect("parse");
        let invocation = root.resolve(&matches).expect("resolve");

        assert_eq!(
            invocation.value("port"),
            Some(FlagValue::Single("2".to_string()))
        );
        let last = invocation.bindings().explicit().last().cloned();
        assert_eq!(
            last,
            Some(("port".to_string(), FlagValue::Single("2".to_string())))
        );
    }

    #[test]
    fn test_parent_explicit_flag_is_visible_below() {
        let root = tree().realize(None, &inherited()).expect("realize");
        let matches = parse(&root, &["app", "--port", "7", "serve"]).expect("parse");
        let invocation = root.resolve(&matches).expect("resolve");
        assert_eq!(
            invocation.value("port"),
            Some(FlagValue::Single("7".to_string()))
        );
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let spec: CommandSpec<Opts> =
            CommandSpec::new("app", vec![with_children(vec![CommandSpec::new(" ", vec![])])]);
        assert!(matches!(
            spec.realize(None, &FlagSets::new()),
            Err(BuildError::EmptyName { .. })
        ));
    }
}
