// src/config.rs
//! # Config Binder
//!
//! Locates the application's YAML configuration file and unifies it with the
//! environment and the parsed command-line flags into one typed value.
//!
//! Precedence, lowest to highest:
//!
//! 1. Declared defaults (the options value the application was built with).
//! 2. The configuration file.
//! 3. Environment variables `<PREFIX>_<KEY>`.
//! 4. Flags passed explicitly on the command line.
//!
//! Values from the environment and from flags are strings; they are coerced to
//! the type of the value they replace, so `MYAPP_PORT=8080` overrides a numeric
//! `port` with a number.

use crate::{
    constants::{CONFIG_FILE_EXTENSIONS, DEFAULT_CONFIG_SUBDIR, DEFAULT_ROOT_MARKER},
    error::ConfigError,
    flags::{FlagBindings, FlagValue},
};
use colored::Colorize;
use serde::{Serialize, de::DeserializeOwned};
use serde_yaml::{Mapping, Number, Value};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Reads an environment variable by its full name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Walks upward from `start` to the nearest directory containing `marker`.
///
/// `start` itself is returned (canonicalized) when it holds the marker.
pub fn find_project_root(start: &Path, marker: &str) -> Result<PathBuf, ConfigError> {
    let start = dunce::canonicalize(start).map_err(ConfigError::WorkingDir)?;
    start
        .ancestors()
        .find(|dir| dir.join(marker).exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| ConfigError::RootNotFound {
            start: start.clone(),
            marker: marker.to_string(),
        })
}

/// Maps a config key to its environment variable name.
///
/// `env_key("my-app", "server.bind-address") == "MY_APP_SERVER_BIND_ADDRESS"`.
pub fn env_key(prefix: &str, key: &str) -> String {
    let canonical = |s: &str| s.to_uppercase().replace(['-', '.'], "_");
    if prefix.is_empty() {
        canonical(key)
    } else {
        format!("{}_{}", canonical(prefix), canonical(key))
    }
}

/// Where the configuration file is looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file named on the command line, used verbatim.
    ExplicitFile(PathBuf),
    /// A directory registered by the application.
    SearchDir(PathBuf),
    /// The `config` directory under the discovered project root.
    ProjectRoot(PathBuf),
}

/// Resolves and binds configuration for one application.
#[derive(Clone)]
pub struct ConfigBinder {
    prefix: String,
    name: String,
    search_dir: Option<PathBuf>,
    root_marker: String,
    working_dir: Option<PathBuf>,
    env: EnvLookup,
}

impl fmt::Debug for ConfigBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBinder")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("search_dir", &self.search_dir)
            .field("root_marker", &self.root_marker)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl ConfigBinder {
    /// A binder for files named `<name>.yaml` and variables prefixed `<PREFIX>_`.
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            search_dir: None,
            root_marker: DEFAULT_ROOT_MARKER.to_string(),
            working_dir: None,
            env: Arc::new(|key| std::env::var(key).ok().filter(|v| !v.is_empty())),
        }
    }

    /// Registers the default directory searched when no file is given.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    /// Changes the file that marks the project root.
    pub fn with_root_marker(mut self, marker: impl Into<String>) -> Self {
        self.root_marker = marker.into();
        self
    }

    /// Starts the project-root walk somewhere other than the process cwd.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replaces the environment lookup.
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// The environment variable consulted for `key`.
    pub fn env_key_for(&self, key: &str) -> String {
        env_key(&self.prefix, key)
    }

    /// Decides where to look, without touching the file itself.
    pub fn resolve_source(&self, explicit: Option<&str>) -> Result<ConfigSource, ConfigError> {
        if let Some(raw) = explicit.filter(|s| !s.is_empty()) {
            let expanded = shellexpand::full(raw).map_err(|e| ConfigError::Expand {
                path: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(ConfigSource::ExplicitFile(PathBuf::from(
                expanded.into_owned(),
            )));
        }
        if let Some(dir) = &self.search_dir {
            return Ok(ConfigSource::SearchDir(dir.clone()));
        }

        let start = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(ConfigError::WorkingDir)?,
        };
        let root = find_project_root(&start, &self.root_marker)?;
        Ok(ConfigSource::ProjectRoot(root.join(DEFAULT_CONFIG_SUBDIR)))
    }

    /// Resolves the path of the configuration file.
    pub fn locate(&self, explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
        let dir = match self.resolve_source(explicit)? {
            ConfigSource::ExplicitFile(path) => return Ok(path),
            ConfigSource::SearchDir(dir) | ConfigSource::ProjectRoot(dir) => dir,
        };

        let tried: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", self.name, ext)))
            .collect();
        match tried.iter().find(|path| path.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(ConfigError::NotFound { tried }),
        }
    }

    /// Full binding: defaults, file, environment, then explicit flags.
    pub fn bind<O>(
        &self,
        defaults: &O,
        explicit_config: Option<&str>,
        flags: &FlagBindings,
    ) -> Result<O, ConfigError>
    where
        O: Serialize + DeserializeOwned,
    {
        let path = self.locate(explicit_config)?;
        log::info!("{} using config file: {}", "===>".green(), path.display());
        let file = read_config_file(&path)?;

        let mut layered = Layered::from_defaults(defaults)?;
        layered.overlay_file(&file);
        layered.overlay_env(&self.prefix, self.env.as_ref(), flags.keys())?;
        layered.overlay_flags(flags)?;
        layered.unmarshal()
    }

    /// Binding with file and environment disabled: defaults, then explicit flags.
    pub fn bind_flags_only<O>(defaults: &O, flags: &FlagBindings) -> Result<O, ConfigError>
    where
        O: Serialize + DeserializeOwned,
    {
        let mut layered = Layered::from_defaults(defaults)?;
        layered.overlay_flags(flags)?;
        layered.unmarshal()
    }
}

/// Reads a YAML configuration file into a mapping. An empty file is an empty
/// mapping.
pub fn read_config_file(path: &Path) -> Result<Mapping, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// The value being built, plus every dotted key seen so far.
struct Layered {
    value: Value,
    keys: Vec<String>,
}

impl Layered {
    fn from_defaults<O: Serialize>(defaults: &O) -> Result<Self, ConfigError> {
        let value = match serde_yaml::to_value(defaults).map_err(ConfigError::Defaults)? {
            map @ Value::Mapping(_) => map,
            _ => Value::Mapping(Mapping::new()),
        };
        let mut keys = Vec::new();
        collect_leaf_keys("", &value, &mut keys);
        Ok(Self { value, keys })
    }

    fn remember(&mut self, key: &str) {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
    }

    /// File keys match known keys regardless of case; unknown keys are
    /// lowercased.
    fn canonical_key(&self, key: &str) -> String {
        self.keys
            .iter()
            .find(|known| known.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_lowercase())
    }

    fn overlay_file(&mut self, file: &Mapping) {
        let mut leaves = Vec::new();
        flatten("", &Value::Mapping(file.clone()), &mut leaves);
        for (key, value) in leaves {
            let key = self.canonical_key(&key);
            self.remember(&key);
            set_path(&mut self.value, &key, value);
        }
    }

    fn overlay_env(
        &mut self,
        prefix: &str,
        env: &(dyn Fn(&str) -> Option<String> + Send + Sync),
        extra_keys: &[String],
    ) -> Result<(), ConfigError> {
        for key in extra_keys {
            self.remember(key);
        }
        for key in self.keys.clone() {
            let var = env_key(prefix, &key);
            let Some(raw) = env(&var).filter(|v| !v.is_empty()) else {
                continue;
            };
            log::debug!("config key '{}' overridden by ${}", key, var);
            let value = coerce(&key, &raw, get_path(&self.value, &key), "environment")?;
            set_path(&mut self.value, &key, value);
        }
        Ok(())
    }

    fn overlay_flags(&mut self, flags: &FlagBindings) -> Result<(), ConfigError> {
        for (key, flag_value) in flags.explicit() {
            let current = get_path(&self.value, key);
            let value = match flag_value {
                FlagValue::Bool(b) if matches!(current, None | Some(Value::Bool(_) | Value::Null)) => {
                    Value::Bool(*b)
                }
                FlagValue::Many(items) => {
                    let like = match current {
                        Some(Value::Sequence(seq)) => seq.first(),
                        _ => None,
                    };
                    Value::Sequence(
                        items
                            .iter()
                            .map(|item| coerce(key, item, like, "flag"))
                            .collect::<Result<_, _>>()?,
                    )
                }
                other => coerce(key, &other.as_text(), current, "flag")?,
            };
            self.remember(key);
            set_path(&mut self.value, key, value);
        }
        Ok(())
    }

    fn unmarshal<O: DeserializeOwned>(self) -> Result<O, ConfigError> {
        serde_yaml::from_value(self.value).map_err(ConfigError::Unmarshal)
    }
}

/// Converts `raw` into a value shaped like `like`.
fn coerce(
    key: &str,
    raw: &str,
    like: Option<&Value>,
    origin: &'static str,
) -> Result<Value, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        origin,
        reason: reason.to_string(),
    };

    match like {
        Some(Value::String(_)) => Ok(Value::String(raw.to_string())),
        Some(Value::Bool(_)) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| invalid("expected a boolean")),
        Some(Value::Number(n)) => {
            let trimmed = raw.trim();
            if n.is_f64() {
                trimmed
                    .parse::<f64>()
                    .map(|f| Value::Number(Number::from(f)))
                    .map_err(|_| invalid("expected a number"))
            } else if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Value::Number(Number::from(i)))
            } else {
                trimmed
                    .parse::<u64>()
                    .map(|u| Value::Number(Number::from(u)))
                    .map_err(|_| invalid("expected an integer"))
            }
        }
        Some(Value::Sequence(items)) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| coerce(key, item, items.first(), origin))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Some(Value::Mapping(_)) => Err(invalid("key holds a section, not a value")),
        Some(Value::Null | Value::Tagged(_)) | None => Ok(parse_scalar(raw)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads `raw` the way a YAML scalar would be read; anything that isn't a
/// scalar stays a string.
fn parse_scalar(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Every non-mapping value under `value`, keyed by its dotted path.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                if let Some(k) = key_text(k) {
                    flatten(&join_key(prefix, &k), v, out);
                }
            }
        }
        leaf if !prefix.is_empty() => out.push((prefix.to_string(), leaf.clone())),
        _ => {}
    }
}

fn collect_leaf_keys(prefix: &str, value: &Value, out: &mut Vec<String>) {
    let mut leaves = Vec::new();
    flatten(prefix, value, &mut leaves);
    out.extend(leaves.into_iter().map(|(k, _)| k));
}

fn get_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(root, |current, part| current.as_mapping()?.get(part))
}

fn set_path(root: &mut Value, key: &str, value: Value) {
    let mut current = root;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        if !current.is_mapping() {
            *current = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(Value::String(part.to_string()), value);
            return;
        }
        if !map.get(part).is_some_and(Value::is_mapping) {
            map.insert(Value::String(part.to_string()), Value::Mapping(Mapping::new()));
        }
        let Some(next) = map.get_mut(part) else {
            return;
        };
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct ServerOptions {
        port: u16,
        host: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Options {
        name: String,
        port: u16,
        verbose: bool,
        ratio: f64,
        tags: Vec<String>,
        server: ServerOptions,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                port: 80,
                verbose: false,
                ratio: 0.5,
                tags: vec!["base".to_string()],
                server: ServerOptions {
                    port: 8080,
                    host: "localhost".to_string(),
                },
            }
        }
    }

    fn env_from(pairs: &[(&str, &str)]) -> EnvLookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key| map.get(key).cloned())
    }

    fn write_config(dir: &Path, file: &str, content: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, content).expect("write config");
        path
    }

    fn binder(dir: &TempDir, env: &[(&str, &str)]) -> ConfigBinder {
        ConfigBinder::new("my-app", "app")
            .with_search_dir(dir.path())
            .with_env_lookup(env_from(env))
    }

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(env_key("my-app", "server.bind-address"), "MY_APP_SERVER_BIND_ADDRESS");
        assert_eq!(env_key("app", "port"), "APP_PORT");
        assert_eq!(env_key("", "log.level"), "LOG_LEVEL");
    }

    #[test]
    fn test_find_project_root_from_nested_dir() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join("Cargo.toml"), "").expect("marker");
        let nested = tmp.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested).expect("nested dirs");

        let root = find_project_root(&nested, "Cargo.toml").expect("root");
        assert_eq!(root, dunce::canonicalize(tmp.path()).expect("canonical"));
    }

    #[test]
    fn test_find_project_root_from_marker_dir_itself() {
        let tmp = TempDir::new().expect("tempdir");
        let project = tmp.path().join("project");
        fs::create_dir_all(project.join("inner")).expect("dirs");
        fs::write(project.join("Cargo.toml"), "").expect("marker");
        fs::write(tmp.path().join("Cargo.toml"), "").expect("outer marker");

        let canonical = dunce::canonicalize(&project).expect("canonical");
        assert_eq!(find_project_root(&canonical, "Cargo.toml").expect("root"), canonical);
        // The nearest ancestor wins over the outer one.
        assert_eq!(
            find_project_root(&project.join("inner"), "Cargo.toml").expect("root"),
            canonical
        );
    }

    #[test]
    fn test_find_project_root_fails_without_marker() {
        let tmp = TempDir::new().expect("tempdir");
        let result = find_project_root(tmp.path(), "cmdboot-test-marker-that-does-not-exist");
        assert!(matches!(result, Err(ConfigError::RootNotFound { .. })));
    }

    #[test]
    fn test_locate_prefers_explicit_file() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "port: 1");
        let explicit = write_config(tmp.path(), "other.conf", "port: 2");

        let binder = binder(&tmp, &[]);
        let located = binder
            .locate(Some(explicit.to_str().expect("utf8 path")))
            .expect("locate");
        assert_eq!(located, explicit);
    }

    #[test]
    fn test_locate_falls_back_to_yml() {
        let tmp = TempDir::new().expect("tempdir");
        let yml = write_config(tmp.path(), "app.yml", "port: 1");
        assert_eq!(binder(&tmp, &[]).locate(None).expect("locate"), yml);
    }

    #[test]
    fn test_locate_reports_every_candidate() {
        let tmp = TempDir::new().expect("tempdir");
        match binder(&tmp, &[]).locate(None) {
            Err(ConfigError::NotFound { tried }) => {
                assert_eq!(
                    tried,
                    vec![tmp.path().join("app.yaml"), tmp.path().join("app.yml")]
                );
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_locate_uses_config_dir_under_project_root() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join("Cargo.toml"), "").expect("marker");
        fs::create_dir_all(tmp.path().join("config")).expect("config dir");
        fs::create_dir_all(tmp.path().join("src").join("deep")).expect("nested");
        write_config(&tmp.path().join("config"), "app.yaml", "port: 1");

        let binder = ConfigBinder::new("app", "app")
            .with_working_dir(tmp.path().join("src").join("deep"))
            .with_env_lookup(env_from(&[]));
        let root = dunce::canonicalize(tmp.path()).expect("canonical");
        assert_eq!(
            binder.resolve_source(None).expect("source"),
            ConfigSource::ProjectRoot(root.join("config"))
        );
        assert_eq!(
            binder.locate(None).expect("locate"),
            root.join("config").join("app.yaml")
        );
    }

    #[test]
    fn test_precedence_flag_env_file_default() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "port: 1000\n");

        let with_flag = FlagBindings::new().set("port", FlagValue::Single("3000".into()));
        let env = [("MY_APP_PORT", "2000")];

        let bound: Options = binder(&tmp, &env)
            .bind(&Options::default(), None, &with_flag)
            .expect("bind");
        assert_eq!(bound.port, 3000);

        let bound: Options = binder(&tmp, &env)
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.port, 2000);

        let bound: Options = binder(&tmp, &[])
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.port, 1000);

        write_config(tmp.path(), "app.yaml", "name: from-file\n");
        let bound: Options = binder(&tmp, &[])
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.port, 80);
        assert_eq!(bound.name, "from-file");
    }

    #[test]
    fn test_env_values_are_coerced_to_the_default_type() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "");
        let env = [
            ("MY_APP_VERBOSE", "true"),
            ("MY_APP_RATIO", "0.75"),
            ("MY_APP_TAGS", "a, b"),
            ("MY_APP_NAME", "12345"),
            ("MY_APP_SERVER_HOST", "0.0.0.0"),
        ];
        let bound: Options = binder(&tmp, &env)
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert!(bound.verbose);
        assert!((bound.ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(bound.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(bound.name, "12345");
        assert_eq!(bound.server.host, "0.0.0.0");
    }

    #[test]
    fn test_empty_env_value_falls_back_to_file() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "port: 1000\n");
        let bound: Options = binder(&tmp, &[("MY_APP_PORT", ""), ("MY_APP_NAME", "")])
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("empty variables are unset");
        assert_eq!(bound.port, 1000);
        assert_eq!(bound.name, "default");
    }

    #[test]
    fn test_file_keys_ignore_case() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(
            tmp.path(),
            "app.yaml",
            "Port: 1234\nSERVER:\n  Host: upper-host\n",
        );
        let bound: Options = binder(&tmp, &[("MY_APP_PORT", "4321")])
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.port, 4321, "environment still overrides the mixed-case key");
        assert_eq!(bound.server.host, "upper-host");
        assert_eq!(bound.server.port, 8080);

        let bound: Options = binder(&tmp, &[])
            .bind(&Options::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.port, 1234);
    }

    #[test]
    fn test_invalid_env_value_is_reported() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "port: 1\n");
        let result: Result<Options, _> = binder(&tmp, &[("MY_APP_PORT", "eighty")])
            .bind(&Options::default(), None, &FlagBindings::new());
        match result {
            Err(ConfigError::InvalidValue { key, origin, .. }) => {
                assert_eq!(key, "port");
                assert_eq!(origin, "environment");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_flag_key_sets_section_field() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "server:\n  host: file-host\n  port: 1\n");
        let flags = FlagBindings::new().set("server.port", FlagValue::Single("9443".into()));
        let bound: Options = binder(&tmp, &[])
            .bind(&Options::default(), None, &flags)
            .expect("bind");
        assert_eq!(bound.server.port, 9443);
        assert_eq!(bound.server.host, "file-host");
    }

    #[test]
    fn test_optional_field_reads_env_as_yaml_scalar() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        #[serde(default)]
        struct Loose {
            extra: Option<u32>,
        }
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "{}\n");
        let bound: Loose = binder(&tmp, &[("MY_APP_EXTRA", "7")])
            .bind(&Loose::default(), None, &FlagBindings::new())
            .expect("bind");
        assert_eq!(bound.extra, Some(7));
    }

    #[test]
    fn test_list_flag_overrides_sequence() {
        let flags = FlagBindings::new().set(
            "tags",
            FlagValue::Many(vec!["x".to_string(), "y".to_string()]),
        );
        let bound = ConfigBinder::bind_flags_only(&Options::default(), &flags).expect("bind");
        assert_eq!(bound.tags, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(bound.port, 80);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(tmp.path(), "app.yaml", "port: [1, 2\n");
        let result: Result<Options, _> =
            binder(&tmp, &[]).bind(&Options::default(), None, &FlagBindings::new());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_scalar_file_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(tmp.path(), "app.yaml", "just a string\n");
        assert!(matches!(
            read_config_file(&path),
            Err(ConfigError::NotAMapping { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_a_read_error() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("nope.yaml");
        let result: Result<Options, _> = binder(&tmp, &[]).bind(
            &Options::default(),
            missing.to_str(),
            &FlagBindings::new(),
        );
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_set_path_replaces_scalars_with_sections() {
        let mut value = Value::Mapping(Mapping::new());
        set_path(&mut value, "a", Value::Number(Number::from(1)));
        set_path(&mut value, "a.b", Value::Number(Number::from(2)));
        assert_eq!(get_path(&value, "a.b"), Some(&Value::Number(Number::from(2))));
    }
}
