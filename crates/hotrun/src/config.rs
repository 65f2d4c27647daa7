use std::path::{Path, PathBuf};
use std::time::Duration;

use hotrun_ctl::{AddrError, ControlAddr};
use serde::Deserialize;
use thiserror::Error;

use crate::runner::RunnerOptions;

pub const DEFAULT_CONFIG_FILE: &str = "hotrun.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse {}: {source}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
	#[error("invalid value for {key}: {value:?}")]
	Invalid { key: String, value: String },
	#[error("invalid control address: {0}")]
	Address(#[from] AddrError),
}

// ── hotrun.toml ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default = "default_ctl_address")]
	pub ctl_address: String,
	#[serde(default)]
	pub watch: WatchConfig,
	#[serde(default)]
	pub build: BuildConfig,
	#[serde(default)]
	pub run: RunConfig,
	#[serde(default)]
	pub logging: LoggingConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			ctl_address: default_ctl_address(),
			watch: WatchConfig::default(),
			build: BuildConfig::default(),
			run: RunConfig::default(),
			logging: LoggingConfig::default(),
		}
	}
}

fn default_ctl_address() -> String { hotrun_ctl::addr::DEFAULT_ADDRESS.to_string() }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
	#[serde(default = "default_directories")]
	pub directories: Vec<PathBuf>,
	#[serde(default = "default_watch_patterns")]
	pub watch_patterns: Vec<String>,
	#[serde(default = "default_ignored_directories")]
	pub ignored_directories: Vec<String>,
}

impl Default for WatchConfig {
	fn default() -> Self {
		Self {
			directories: default_directories(),
			watch_patterns: default_watch_patterns(),
			ignored_directories: default_ignored_directories(),
		}
	}
}

fn default_directories() -> Vec<PathBuf> { vec![PathBuf::from(".")] }
fn default_watch_patterns() -> Vec<String> { vec!["*.go".into()] }
fn default_ignored_directories() -> Vec<String> { vec!["tmp".into(), "vendor".into()] }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
	#[serde(default = "default_build_command")]
	pub command: String,
	#[serde(default = "default_error_log")]
	pub error_log: PathBuf,
	#[serde(default = "default_delay_ms")]
	pub delay_ms: u64,
	#[serde(default = "default_tmp_dir")]
	pub tmp_dir: PathBuf,
}

impl Default for BuildConfig {
	fn default() -> Self {
		Self {
			command: default_build_command(),
			error_log: default_error_log(),
			delay_ms: default_delay_ms(),
			tmp_dir: default_tmp_dir(),
		}
	}
}

fn default_build_command() -> String { "go build -gcflags='all=-N -l' -o tmp/app-build .".into() }
fn default_error_log() -> PathBuf { PathBuf::from("tmp/build_error.log") }
fn default_delay_ms() -> u64 { 650 }
fn default_tmp_dir() -> PathBuf { PathBuf::from("tmp") }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
	#[serde(default = "default_run_command")]
	pub command: String,
	#[serde(default = "default_debug_command")]
	pub debug_command: String,
	#[serde(default = "default_true")]
	pub build_before_debug: bool,
}

impl Default for RunConfig {
	fn default() -> Self {
		Self {
			command: default_run_command(),
			debug_command: default_debug_command(),
			build_before_debug: true,
		}
	}
}

fn default_run_command() -> String { "tmp/app-build".into() }
fn default_debug_command() -> String {
	"dlv --headless --listen=:2345 --api-version=2 exec tmp/app-build".into()
}
fn default_true() -> bool { true }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
	#[serde(default = "default_level")]
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self { level: default_level() }
	}
}

fn default_level() -> String { "info".into() }

// ── Loading ──────────────────────────────────────────────────────────────────

/// Load `path`, or `hotrun.toml` in the working directory when `path` is
/// `None`, then apply `HOTRUN_*` environment overrides.
///
/// A missing default file means defaults; an explicit path has to exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
	let mut config = match path {
		Some(path) => read_config(path)?,
		None => {
			let path = Path::new(DEFAULT_CONFIG_FILE);
			if path.exists() {
				read_config(path)?
			} else {
				Config::default()
			}
		}
	};
	config.apply_env(std::env::vars())?;
	config.validate()?;
	Ok(config)
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	toml::from_str(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

impl Config {
	/// Apply `HOTRUN_*` overrides. Unrelated variables are ignored.
	pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			match key.as_str() {
				"HOTRUN_CTL_ADDRESS" => self.ctl_address = value,
				"HOTRUN_BUILD_COMMAND" => self.build.command = value,
				"HOTRUN_BUILD_ERROR_LOG" => self.build.error_log = PathBuf::from(value),
				"HOTRUN_BUILD_DELAY_MS" => self.build.delay_ms = parse_value(&key, &value)?,
				"HOTRUN_RUN_COMMAND" => self.run.command = value,
				"HOTRUN_RUN_DEBUG_COMMAND" => self.run.debug_command = value,
				"HOTRUN_RUN_BUILD_BEFORE_DEBUG" => {
					self.run.build_before_debug = parse_value(&key, &value)?
				}
				"HOTRUN_LOGGING_LEVEL" => self.logging.level = value,
				_ => {}
			}
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		self.ctl_address()?;
		self.log_level()?;
		Ok(())
	}

	pub fn ctl_address(&self) -> Result<ControlAddr, ConfigError> {
		Ok(self.ctl_address.parse()?)
	}

	pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
		self.logging.level.parse().map_err(|_| ConfigError::Invalid {
			key: "logging.level".into(),
			value: self.logging.level.clone(),
		})
	}

	pub fn runner_options(&self) -> RunnerOptions {
		RunnerOptions {
			build_delay: Duration::from_millis(self.build.delay_ms),
			run_command: self.run.command.clone(),
			debug_command: self.run.debug_command.clone(),
			build_before_debug: self.run.build_before_debug,
		}
	}
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value.trim().parse().map_err(|_| ConfigError::Invalid {
		key: key.to_string(),
		value: value.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn empty_file_gives_defaults() {
		let config: Config = toml::from_str("").unwrap();
		assert_eq!(config.ctl_address, "127.0.0.1:55555");
		assert_eq!(config.watch.directories, vec![PathBuf::from(".")]);
		assert_eq!(config.watch.watch_patterns, vec!["*.go".to_string()]);
		assert_eq!(config.watch.ignored_directories, vec!["tmp".to_string(), "vendor".to_string()]);
		assert_eq!(config.build.delay_ms, 650);
		assert_eq!(config.build.error_log, PathBuf::from("tmp/build_error.log"));
		assert!(config.run.build_before_debug);
		assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let config: Config = toml::from_str(
			r#"
ctl_address = "unix:/tmp/hotrun.sock"

[build]
command = "cargo build"
delay_ms = 0

[run]
build_before_debug = false
"#,
		)
		.unwrap();
		assert_eq!(config.build.command, "cargo build");
		assert_eq!(config.build.delay_ms, 0);
		assert_eq!(config.build.tmp_dir, PathBuf::from("tmp"));
		assert_eq!(config.run.command, "tmp/app-build");
		assert!(!config.run.build_before_debug);
		assert_eq!(
			config.ctl_address().unwrap(),
			ControlAddr::Unix(PathBuf::from("/tmp/hotrun.sock"))
		);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(toml::from_str::<Config>("[build]\ncomand = \"x\"\n").is_err());
	}

	#[test]
	fn env_overrides() {
		let mut config = Config::default();
		config
			.apply_env(vars(&[
				("HOTRUN_BUILD_DELAY_MS", "100"),
				("HOTRUN_RUN_COMMAND", "./server --dev"),
				("HOTRUN_RUN_BUILD_BEFORE_DEBUG", "false"),
				("HOTRUN_LOGGING_LEVEL", "debug"),
				("PATH", "/usr/bin"),
			]))
			.unwrap();
		assert_eq!(config.build.delay_ms, 100);
		assert_eq!(config.run.command, "./server --dev");
		assert!(!config.run.build_before_debug);
		assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

		let options = config.runner_options();
		assert_eq!(options.build_delay, Duration::from_millis(100));
		assert_eq!(options.run_command, "./server --dev");
	}

	#[test]
	fn invalid_env_value_is_an_error() {
		let mut config = Config::default();
		let err = config
			.apply_env(vars(&[("HOTRUN_BUILD_DELAY_MS", "soon")]))
			.unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { .. }));
	}

	#[test]
	fn invalid_level_fails_validation() {
		let mut config = Config::default();
		config.logging.level = "loud".into();
		assert!(config.validate().is_err());
	}

	#[test]
	fn explicit_missing_file_is_an_error() {
		let dir = tempfile::TempDir::new().unwrap();
		let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}

	#[test]
	fn explicit_file_is_read() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("hotrun.toml");
		std::fs::write(&path, "[watch]\nwatch_patterns = [\"*.rs\"]\n").unwrap();
		let config = read_config(&path).unwrap();
		assert_eq!(config.watch.watch_patterns, vec!["*.rs".to_string()]);
	}
}
