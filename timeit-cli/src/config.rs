//! Configuration loading from timeit.toml
//!
//! Defaults for the `run` command can live in a `timeit.toml` file in the
//! project root. The file is discovered by walking up from the current
//! directory; command-line flags override it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use timeit_core::{LogLevel, Substrate, TimeitConfig};

/// Contents of `timeit.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[runner]` table; unset keys keep the library defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    /// Number of runs per call
    #[serde(default)]
    pub runs: Option<usize>,
    /// Concurrency width
    #[serde(default)]
    pub workers: Option<usize>,
    /// Per-run deadline (e.g., "500ms", "2s")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Cancel runs at the deadline instead of only warning
    #[serde(default)]
    pub enforce_timeout: Option<bool>,
    /// Substrate: "none", "threads", "processes" or "cooperative"
    #[serde(default)]
    pub substrate: Option<Substrate>,
    /// Emit the detailed table
    #[serde(default)]
    pub detailed: Option<bool>,
    /// Level of the summary event
    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

impl RunnerConfig {
    /// Library configuration with the file's values applied
    pub fn to_timeit_config(&self) -> anyhow::Result<TimeitConfig> {
        let mut config = TimeitConfig::new();
        if let Some(runs) = self.runs {
            config = config.runs(runs);
        }
        if let Some(workers) = self.workers {
            config = config.workers(workers);
        }
        if let Some(timeout) = &self.timeout {
            config = config.timeout(FileConfig::parse_duration(timeout)?.as_secs_f64());
        }
        if let Some(enforce) = self.enforce_timeout {
            config = config.enforce_timeout(enforce);
        }
        if let Some(substrate) = self.substrate {
            config = config.substrate(substrate);
        }
        if let Some(detailed) = self.detailed {
            config = config.detailed(detailed);
        }
        if let Some(level) = self.log_level {
            config = config.log_level(level);
        }
        Ok(config)
    }
}

/// `[output]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("timeit.toml");
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), "ignoring timeit.toml: {e}");
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# timeit configuration

[runner]
# Runs per call
runs = 1
# Concurrency width
workers = 1
# Substrate: "none", "threads", "processes" or "cooperative"
substrate = "threads"
# Per-run deadline (uncomment to enable)
# timeout = "500ms"
# Cancel runs at the deadline instead of warning (not with processes)
enforce_timeout = false
# Emit the detailed table
detailed = false
# Level of the summary event: trace, debug, info, warn, error
log_level = "info"

[output]
# Output format: human or json
format = "human"
"#
        .to_string()
    }

    /// Parse a duration such as `"500ms"`, `"2s"` or `"1.5"` (seconds).
    ///
    /// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`/`min`.
    pub fn parse_duration(text: &str) -> anyhow::Result<Duration> {
        // Longer suffixes first so `ms` is not read as `s`
        const UNITS: &[(&str, f64)] = &[
            ("ns", 1.0),
            ("us", 1e3),
            ("µs", 1e3),
            ("ms", 1e6),
            ("min", 60e9),
            ("s", 1e9),
            ("m", 60e9),
        ];

        let text = text.trim();
        let (number, scale) = UNITS
            .iter()
            .find_map(|(unit, scale)| text.strip_suffix(unit).map(|n| (n, *scale)))
            .unwrap_or((text, 1e9));

        let value: f64 = number
            .trim()
            .parse()
            .with_context(|| format!("`{text}` is not a duration"))?;
        let nanos = value * scale;
        if !nanos.is_finite() || nanos < 0.0 {
            anyhow::bail!("`{text}` is not a valid duration");
        }
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert_eq!(config.runner.runs, None);
        assert_eq!(config.output.format, "human");
        assert_eq!(
            config.runner.to_timeit_config().unwrap(),
            TimeitConfig::new()
        );
    }

    #[test]
    fn test_parse_duration() {
        let parse = |text: &str| FileConfig::parse_duration(text).unwrap();
        assert_eq!(parse("3s"), Duration::from_secs(3));
        assert_eq!(parse("500ms"), Duration::from_millis(500));
        assert_eq!(parse("100us"), Duration::from_micros(100));
        assert_eq!(parse("1000ns"), Duration::from_nanos(1000));
        assert_eq!(parse("2m"), Duration::from_secs(120));
        assert_eq!(parse("2min"), Duration::from_secs(120));
        assert_eq!(parse("1.5"), Duration::from_millis(1500));
        assert!(FileConfig::parse_duration("").is_err());
        assert!(FileConfig::parse_duration("5 fortnights").is_err());
        assert!(FileConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            runs = 8
            workers = 4
            timeout = "250ms"
            substrate = "processes"
            log_level = "debug"
        "#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let timeit = config.runner.to_timeit_config().unwrap();
        assert_eq!(timeit.runs, 8);
        assert_eq!(timeit.workers, 4);
        assert_eq!(timeit.timeout, Some(0.25));
        assert_eq!(timeit.substrate, Substrate::Processes);
        assert_eq!(timeit.log_level, LogLevel::Debug);
        assert!(!timeit.enforce_timeout);
        // Defaults should still apply
        assert_eq!(config.output.format, "human");
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let config: FileConfig = toml::from_str("[runner]\ntimeout = \"soon\"").unwrap();
        assert!(config.runner.to_timeit_config().is_err());
    }

    #[test]
    fn test_default_toml_parses() {
        let config: FileConfig = toml::from_str(&FileConfig::default_toml()).unwrap();
        assert_eq!(config.runner.runs, Some(1));
        assert_eq!(config.runner.substrate, Some(Substrate::Threads));
        assert_eq!(
            config.runner.to_timeit_config().unwrap(),
            TimeitConfig::new()
        );
    }
}
