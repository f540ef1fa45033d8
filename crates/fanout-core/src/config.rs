use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::job::ForkLimit;

/// Which backend to run, plus its free-form configuration. Parsed from the
/// string form `name:arg1,arg2,key=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSpec {
    pub name: String,
    pub args: Vec<String>,
    pub kwargs: HashMap<String, String>,
}

impl ExecutorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: HashMap::new(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let (name, arguments) = match raw.split_once(':') {
            Some((name, rest)) => (name, rest),
            None => (raw, ""),
        };

        let mut spec = Self::new(name.trim());
        for argument in arguments.split(',') {
            let argument = argument.trim();
            if argument.is_empty() {
                continue;
            }
            match argument.split_once('=') {
                Some((key, value)) => {
                    spec.kwargs
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => spec.args.push(argument.to_string()),
            }
        }
        spec
    }

    pub fn kwarg(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for ExecutorSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ExecutorSpec::parse(&raw))
    }
}

/// Canonical source of options for a run. Defaults are overridden in layers:
/// system config file, then user config file, then whatever the front end
/// applies from its own arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub fork_limit: ForkLimit,
    pub print_machines: bool,
    pub print_output: bool,
    pub show_percent: bool,
    /// Per-host timeout in seconds; 0 means unbounded.
    pub timeout: u64,
    /// Hook names in invocation order.
    pub hooks: Vec<String>,
    pub executor: ExecutorSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fork_limit: ForkLimit::Count(64),
            print_machines: true,
            print_output: true,
            show_percent: false,
            timeout: 0,
            hooks: Vec::new(),
            executor: ExecutorSpec::new("ssh"),
        }
    }
}

/// On-disk shape: every field optional so files only state what they change.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    forklimit: Option<ForkLimit>,
    print_machines: Option<bool>,
    print_output: Option<bool>,
    show_percent: Option<bool>,
    timeout: Option<u64>,
    hooks: Option<Vec<String>>,
    executor: Option<ExecutorSpec>,
}

impl Config {
    /// Load from the standard locations: /etc/fanout/config.yaml, then the
    /// per-user config dir. Missing files are fine; malformed ones are not.
    pub fn load_default_files() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.update_from_file(Path::new("/etc/fanout/config.yaml"))?;
        if let Some(path) = Self::user_config_path() {
            config.update_from_file(&path)?;
        }
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fanout").join("config.yaml"))
    }

    /// Overlay settings from one YAML file. A missing file is ignored.
    pub fn update_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source: err,
                })
            }
        };

        let file: ConfigFile =
            serde_yaml::from_str(&contents).map_err(|err| ConfigError::Invalid {
                path: path.display().to_string(),
                detail: err.to_string(),
            })?;

        debug!(path = %path.display(), "applying config file");

        if let Some(limit) = file.forklimit {
            self.fork_limit = limit;
        }
        if let Some(value) = file.print_machines {
            self.print_machines = value;
        }
        if let Some(value) = file.print_output {
            self.print_output = value;
        }
        if let Some(value) = file.show_percent {
            self.show_percent = value;
        }
        if let Some(value) = file.timeout {
            self.timeout = value;
        }
        if let Some(hooks) = file.hooks {
            self.merge_hooks(&hooks);
        }
        if let Some(executor) = file.executor {
            self.executor = executor;
        }
        Ok(())
    }

    /// Merge hook names into the ordered selection. Entries may be comma
    /// separated; a leading '-' removes a previously selected hook.
    pub fn merge_hooks(&mut self, entries: &[String]) {
        for entry in entries.iter().flat_map(|e| e.split(',')) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if let Some(name) = entry.strip_prefix('-') {
                self.hooks.retain(|hook| hook != name);
            } else if !self.hooks.iter().any(|hook| hook == entry) {
                self.hooks.push(entry.to_string());
            }
        }
    }

    /// Per-host timeout as a duration, if bounded.
    pub fn timeout_duration(&self) -> Option<std::time::Duration> {
        (self.timeout > 0).then(|| std::time::Duration::from_secs(self.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_spec_parses_args_and_kwargs() {
        let spec = ExecutorSpec::parse("session:host-a,user=deploy,port=2222");
        assert_eq!(spec.name, "session");
        assert_eq!(spec.args, vec!["host-a"]);
        assert_eq!(spec.kwarg("user"), Some("deploy"));
        assert_eq!(spec.kwarg("port"), Some("2222"));
    }

    #[test]
    fn executor_spec_without_arguments() {
        let spec = ExecutorSpec::parse("ssh");
        assert_eq!(spec.name, "ssh");
        assert!(spec.args.is_empty());
        assert!(spec.kwargs.is_empty());
    }

    #[test]
    fn merge_hooks_adds_splits_and_removes() {
        let mut config = Config::default();
        config.merge_hooks(&["progress,trace".to_string()]);
        assert_eq!(config.hooks, vec!["progress", "trace"]);

        config.merge_hooks(&["-trace".to_string(), "jsonl".to_string()]);
        assert_eq!(config.hooks, vec!["progress", "jsonl"]);

        // Duplicates are kept out, order preserved.
        config.merge_hooks(&["progress".to_string()]);
        assert_eq!(config.hooks, vec!["progress", "jsonl"]);
    }

    #[test]
    fn config_file_overlay() {
        use std::io::Write;

        let mut config = Config::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "forklimit: \"50%\"\ntimeout: 30\nhooks: [progress]\n").unwrap();

        config.update_from_file(file.path()).unwrap();
        assert_eq!(config.fork_limit, ForkLimit::Percent(50.0));
        assert_eq!(config.timeout, 30);
        assert_eq!(config.hooks, vec!["progress"]);
        // Untouched fields keep their defaults.
        assert!(config.print_output);
    }

    #[test]
    fn missing_config_file_is_ignored() {
        let mut config = Config::default();
        config
            .update_from_file(Path::new("/nonexistent/fanout.yaml"))
            .unwrap();
        assert_eq!(config.fork_limit, ForkLimit::Count(64));
    }
}
