// src/flags.rs
//! Named groups of command-line flag definitions. Groups are filled while an
//! application is being described and merged, once per command, into the view
//! that becomes that command's clap arguments.
//!
//! Flag names are canonicalized by [`normalize_name`] when a [`FlagDef`] is
//! created, and raw process arguments go through [`normalize_args`] before
//! parsing, so `--my-flag` and `--my_flag` always resolve to the same flag.

use crate::{constants::GLOBAL_GROUP, error::BuildError};
use clap::{Arg, ArgAction, ArgMatches, parser::ValueSource};
use std::collections::HashMap;
use std::ffi::OsString;

/// Canonicalizes a flag name: word separators `_` become `-`.
pub fn normalize_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Applies [`normalize_name`] to the name part of every `--long[=value]` token.
///
/// Tokens after a bare `--` are positional and left untouched, as are short
/// flags and values.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut past_terminator = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if past_terminator {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                past_terminator = true;
                return arg;
            }
            let Some(body) = text.strip_prefix("--") else {
                return arg;
            };
            match body.split_once('=') {
                Some((name, value)) => format!("--{}={}", normalize_name(name), value).into(),
                None => format!("--{}", normalize_name(body)).into(),
            }
        })
        .collect()
}

/// How a flag consumes its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// A switch; present means `true`.
    Bool,
    /// Takes exactly one value.
    Value,
    /// Takes one or more values, repeatable, comma separated.
    List,
    /// Prints help and stops.
    Help,
    /// Prints the version and stops.
    Version,
}

/// A single flag definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagDef {
    name: String,
    short: Option<char>,
    kind: FlagKind,
    default: Option<String>,
    help: String,
    key: Option<String>,
    value_name: Option<String>,
    bound: bool,
}

impl FlagDef {
    fn new(name: &str, kind: FlagKind, help: impl Into<String>) -> Self {
        Self {
            name: normalize_name(name.trim_start_matches('-')),
            short: None,
            kind,
            default: None,
            help: help.into(),
            key: None,
            value_name: None,
            bound: !matches!(kind, FlagKind::Help | FlagKind::Version),
        }
    }

    /// A boolean switch.
    pub fn bool(name: &str, help: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Bool, help)
    }

    /// A flag taking a single value.
    pub fn value(name: &str, help: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Value, help)
    }

    /// A repeatable flag collecting values.
    pub fn list(name: &str, help: impl Into<String>) -> Self {
        Self::new(name, FlagKind::List, help)
    }

    /// The `-h/--help` flag.
    pub fn help_flag(help: impl Into<String>) -> Self {
        Self::new(crate::constants::HELP_FLAG_NAME, FlagKind::Help, help).short('h')
    }

    /// The `--version` flag.
    pub fn version_flag(help: impl Into<String>) -> Self {
        Self::new(crate::constants::VERSION_FLAG_NAME, FlagKind::Version, help)
    }

    /// Sets the one-letter shorthand.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Sets the default shown in help and returned by lookups when unset.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Binds the flag to a configuration key other than its own name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the placeholder shown in help (`--port <PORT>`).
    pub fn value_name(mut self, name: impl Into<String>) -> Self {
        self.value_name = Some(name.into());
        self
    }

    /// Keeps the flag out of configuration binding.
    pub fn unbound(mut self) -> Self {
        self.bound = false;
        self
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shorthand, if any.
    pub fn short_name(&self) -> Option<char> {
        self.short
    }

    /// Value kind.
    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    /// Declared default.
    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Help text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Whether explicit values of this flag feed configuration binding.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// The configuration key this flag sets: the explicit key, or the name
    /// with `-` turned into `_`.
    pub fn config_key(&self) -> String {
        self.key
            .clone()
            .unwrap_or_else(|| self.name.replace('-', "_"))
    }

    fn to_arg(&self, heading: &str) -> Arg {
        let mut arg = Arg::new(self.name.clone())
            .long(self.name.clone())
            .help(self.help.clone())
            .help_heading(heading.to_string());
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        if let Some(value_name) = &self.value_name {
            arg = arg.value_name(value_name.clone());
        }
        match self.kind {
            FlagKind::Bool => arg.action(ArgAction::SetTrue),
            FlagKind::Help => arg.action(ArgAction::Help),
            FlagKind::Version => arg.action(ArgAction::Version),
            FlagKind::Value => {
                let arg = arg.action(ArgAction::Set).num_args(1);
                match &self.default {
                    Some(default) => arg.default_value(default.clone()),
                    None => arg,
                }
            }
            FlagKind::List => {
                let arg = arg
                    .action(ArgAction::Append)
                    .num_args(1)
                    .value_delimiter(',');
                match &self.default {
                    Some(default) => arg.default_value(default.clone()),
                    None => arg,
                }
            }
        }
    }
}

/// An ordered, named set of flag definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagGroup {
    name: String,
    flags: Vec<FlagDef>,
}

impl FlagGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: Vec::new(),
        }
    }

    /// Appends a flag. Collisions are reported when the group is merged into a
    /// command.
    pub fn add(&mut self, flag: FlagDef) -> &mut Self {
        self.flags.push(flag);
        self
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flags in insertion order.
    pub fn flags(&self) -> &[FlagDef] {
        &self.flags
    }

    fn heading(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => format!("{}{} flags", first.to_uppercase(), chars.as_str()),
            None => "Flags".to_string(),
        }
    }
}

/// The flag registry of one command: named groups in first-access order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSets {
    groups: Vec<FlagGroup>,
}

impl FlagSets {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the group called `name`, creating it on first access.
    #[allow(clippy::indexing_slicing)]
    pub fn group(&mut self, name: &str) -> &mut FlagGroup {
        let position = match self.groups.iter().position(|g| g.name == name) {
            Some(position) => position,
            None => {
                self.groups.push(FlagGroup::new(name));
                self.groups.len() - 1
            }
        };
        // The position was either found or just pushed.
        &mut self.groups[position]
    }

    /// Looks a group up without creating it.
    pub fn get(&self, name: &str) -> Option<&FlagGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Groups in first-access order.
    pub fn groups(&self) -> &[FlagGroup] {
        &self.groups
    }

    /// True when no group holds a flag.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.flags.is_empty())
    }

    /// Copies every group into `target`, the "global" group last.
    pub fn merge_into(&self, target: &mut MergedFlags) -> Result<(), BuildError> {
        let (global, others): (Vec<&FlagGroup>, Vec<&FlagGroup>) =
            self.groups.iter().partition(|g| g.name == GLOBAL_GROUP);
        for group in others.into_iter().chain(global) {
            for flag in &group.flags {
                target.insert(group, flag)?;
            }
        }
        Ok(())
    }
}

/// A typed value read back from parsed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// A switch.
    Bool(bool),
    /// A single value.
    Single(String),
    /// Every value of a repeatable flag.
    Many(Vec<String>),
}

impl FlagValue {
    /// The value rendered the way it would be typed on the command line.
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Single(s) => s.clone(),
            Self::Many(values) => values.join(","),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MergedEntry {
    heading: String,
    flag: FlagDef,
}

/// The merged flag view of a single command.
#[derive(Debug, Clone, Default)]
pub struct MergedFlags {
    command: String,
    entries: Vec<MergedEntry>,
    by_name: HashMap<String, usize>,
    shorts: HashMap<char, String>,
}

impl MergedFlags {
    /// Creates an empty view for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    fn insert(&mut self, group: &FlagGroup, flag: &FlagDef) -> Result<(), BuildError> {
        if flag.name.is_empty() {
            return Err(BuildError::EmptyName {
                command: self.command.clone(),
            });
        }
        if let Some(&index) = self.by_name.get(&flag.name) {
            let same = self.entries.get(index).is_some_and(|e| e.flag == *flag);
            if same {
                return Ok(());
            }
            return Err(BuildError::DuplicateFlag {
                name: flag.name.clone(),
                command: self.command.clone(),
            });
        }
        if let Some(short) = flag.short
            && let Some(owner) = self.shorts.get(&short)
        {
            return Err(BuildError::DuplicateShorthand {
                short,
                first: owner.clone(),
                second: flag.name.clone(),
                command: self.command.clone(),
            });
        }

        if let Some(short) = flag.short {
            self.shorts.insert(short, flag.name.clone());
        }
        self.by_name.insert(flag.name.clone(), self.entries.len());
        self.entries.push(MergedEntry {
            heading: group.heading(),
            flag: flag.clone(),
        });
        Ok(())
    }

    /// Finds a flag by any spelling of its name.
    pub fn get(&self, name: &str) -> Option<&FlagDef> {
        let canonical = normalize_name(name.trim_start_matches('-'));
        self.by_name
            .get(&canonical)
            .and_then(|&index| self.entries.get(index))
            .map(|e| &e.flag)
    }

    /// Number of distinct flags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no flag was merged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags in merge order.
    pub fn iter(&self) -> impl Iterator<Item = &FlagDef> {
        self.entries.iter().map(|e| &e.flag)
    }

    /// Clap arguments in merge order, each under its group's help heading.
    pub fn to_args(&self) -> Vec<Arg> {
        self.entries
            .iter()
            .map(|e| e.flag.to_arg(&e.heading))
            .collect()
    }

    /// Reads the value of `name` from `matches`, defaults included.
    pub fn value(&self, matches: &ArgMatches, name: &str) -> Option<FlagValue> {
        let flag = self.get(name)?;
        read_value(matches, flag)
    }

    /// Every bound flag the user passed explicitly, as `(config key, value)`.
    pub fn explicit_values(&self, matches: &ArgMatches) -> Vec<(String, FlagValue)> {
        self.iter()
            .filter(|flag| flag.bound)
            .filter(|flag| {
                matches!(
                    matches.value_source(&flag.name),
                    Some(ValueSource::CommandLine)
                )
            })
            .filter_map(|flag| read_value(matches, flag).map(|v| (flag.config_key(), v)))
            .collect()
    }
}

/// What the flags of one invocation contribute to configuration binding.
///
/// `keys` lists every bound config key the command knows about, explicit or
/// not, so the environment layer can be consulted for them. `explicit` holds
/// only the values the user actually passed; later entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagBindings {
    keys: Vec<String>,
    explicit: Vec<(String, FlagValue)>,
}

impl FlagBindings {
    /// No flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the bound keys of `merged` and the values set in `matches`.
    pub fn collect(merged: &MergedFlags, matches: &ArgMatches) -> Self {
        Self {
            keys: merged
                .iter()
                .filter(|flag| flag.bound)
                .map(FlagDef::config_key)
                .collect(),
            explicit: merged.explicit_values(matches),
        }
    }

    /// Records an explicit value for `key`.
    pub fn set(mut self, key: impl Into<String>, value: FlagValue) -> Self {
        let key = key.into();
        if !self.keys.contains(&key) {
            self.keys.push(key.clone());
        }
        self.explicit.push((key, value));
        self
    }

    /// Appends `other`; its explicit values take precedence.
    pub fn extend(&mut self, other: Self) {
        for key in other.keys {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
        self.explicit.extend(other.explicit);
    }

    /// Every bound key.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Explicit values in precedence order (last wins).
    pub fn explicit(&self) -> &[(String, FlagValue)] {
        &self.explicit
    }
}

fn read_value(matches: &ArgMatches, flag: &FlagDef) -> Option<FlagValue> {
    match flag.kind {
        FlagKind::Help | FlagKind::Version => None,
        FlagKind::Bool => Some(FlagValue::Bool(matches.get_flag(&flag.name))),
        FlagKind::Value => matches
            .get_raw(&flag.name)
            .and_then(|mut raw| raw.next())
            .map(|v| FlagValue::Single(v.to_string_lossy().into_owned())),
        FlagKind::List => matches.get_raw(&flag.name).map(|raw| {
            FlagValue::Many(raw.map(|v| v.to_string_lossy().into_owned()).collect())
        }),
    }
}
