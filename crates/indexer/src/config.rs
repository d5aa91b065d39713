//! Configuration management for the memopark indexer.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables referenced as `${VAR}` inside the file
//! - Default values (fallbacks)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use memopark_core::DEFAULT_BLOCKS_PER_DAY;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where blocks come from
    pub source: SourceConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Mapper configuration
    #[serde(default)]
    pub mapper: MapperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kind of block source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Newline-delimited JSON blocks exported from an archive node.
    Jsonl,
}

/// Block source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source kind
    pub kind: SourceKind,

    /// Path of the block file (`jsonl` sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://memopark.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block number to start syncing from (0 = from genesis)
    #[serde(default)]
    pub start_block: u64,

    /// Maximum number of blocks requested from the source at once
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Blocks to stay behind the source head
    #[serde(default)]
    pub confirmations: u64,

    /// Polling interval in seconds once caught up
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Blocks buffered between the fetch task and the apply loop
    #[serde(default = "default_prefetch_blocks")]
    pub prefetch_blocks: usize,

    /// First retry delay after a failed fetch
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound of the retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed fetches before giving up (0 = never)
    #[serde(default)]
    pub max_fetch_attempts: u32,
}

/// Mapper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Blocks per daily statistics bucket
    #[serde(default = "default_blocks_per_day")]
    pub blocks_per_day: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_batch_size() -> u64 {
    500
}

fn default_poll_interval_secs() -> u64 {
    6
}

fn default_prefetch_blocks() -> usize {
    64
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_blocks_per_day() -> u64 {
    DEFAULT_BLOCKS_PER_DAY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch_size: default_batch_size(),
            confirmations: 0,
            poll_interval_secs: default_poll_interval_secs(),
            prefetch_blocks: default_prefetch_blocks(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_fetch_attempts: 0,
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            blocks_per_day: default_blocks_per_day(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `url = "sqlite://${MEMOPARK_DATA}/memopark.db"`
    ///
    /// # Example
    /// ```no_run
    /// # use memopark_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        match self.source.kind {
            SourceKind::Jsonl => {
                let missing = self
                    .source
                    .path
                    .as_ref()
                    .map(|p| p.as_os_str().is_empty())
                    .unwrap_or(true);
                if missing {
                    anyhow::bail!("source.path is required for jsonl sources");
                }
            }
        }

        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "database.min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        let sync = &self.sync;
        if sync.batch_size == 0 {
            anyhow::bail!("sync.batch_size must be greater than 0");
        }
        if sync.poll_interval_secs == 0 {
            anyhow::bail!("sync.poll_interval_secs must be greater than 0");
        }
        if sync.prefetch_blocks == 0 {
            anyhow::bail!("sync.prefetch_blocks must be greater than 0");
        }
        if sync.initial_backoff_ms > sync.max_backoff_ms {
            anyhow::bail!(
                "sync.initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
                sync.initial_backoff_ms,
                sync.max_backoff_ms
            );
        }

        if self.mapper.blocks_per_day == 0 {
            anyhow::bail!("mapper.blocks_per_day must be greater than 0");
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "logging.level must be one of {:?}, got '{}'",
                LOG_LEVELS,
                self.logging.level
            );
        }
        if !LOG_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!(
                "logging.format must be one of {:?}, got '{}'",
                LOG_FORMATS,
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Expand `${VAR_NAME}` placeholders.
///
/// Placeholders inside TOML comments (a `#` outside any string) are left
/// alone; placeholders inside basic, literal and multi-line strings are
/// expanded. A referenced variable that is not set is an error.
fn expand_env_vars(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut quote: Option<Quote> = None;
    let mut in_comment = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\n' {
            in_comment = false;
            if matches!(quote, Some(Quote::Basic | Quote::Literal)) {
                quote = None;
            }
            out.push(ch);
            i += 1;
            continue;
        }
        if in_comment {
            out.push(ch);
            i += 1;
            continue;
        }

        // Escapes only exist in double-quoted strings.
        if ch == '\\' && matches!(quote, Some(Quote::Basic | Quote::MultiBasic)) {
            out.push(ch);
            if let Some(&next) = chars.get(i + 1) {
                out.push(next);
            }
            i += 2;
            continue;
        }

        if ch == '"' || ch == '\'' {
            let triple = chars.get(i + 1) == Some(&ch) && chars.get(i + 2) == Some(&ch);
            let width = if triple { 3 } else { 1 };
            let this = Quote::of(ch, triple);
            quote = match quote {
                None => Some(this),
                Some(open) if open == this => None,
                open => open,
            };
            for _ in 0..width {
                out.push(ch);
            }
            i += width;
            continue;
        }

        if ch == '#' && quote.is_none() {
            in_comment = true;
            out.push(ch);
            i += 1;
            continue;
        }

        if ch == '$' && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            let close = chars[start..]
                .iter()
                .position(|&c| c == '}')
                .map(|offset| start + offset)
                .with_context(|| {
                    format!("Unclosed environment variable placeholder at position {}", i)
                })?;
            let name: String = chars[start..close].iter().collect();
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name at position {}", i);
            }
            let value = std::env::var(&name).with_context(|| {
                format!(
                    "Environment variable '{}' is not set (referenced at position {})",
                    name, i
                )
            })?;
            out.push_str(&value);
            i = close + 1;
            continue;
        }

        out.push(ch);
        i += 1;
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

impl Quote {
    fn of(ch: char, triple: bool) -> Self {
        match (ch, triple) {
            ('"', false) => Quote::Basic,
            ('"', true) => Quote::MultiBasic,
            (_, false) => Quote::Literal,
            (_, true) => Quote::MultiLiteral,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[source]
kind = "jsonl"
path = "blocks.jsonl"

[database]
url = "sqlite://memopark.db"
"#;

    #[test]
    fn test_default_values() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.source.kind, SourceKind::Jsonl);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.sync.start_block, 0);
        assert_eq!(config.sync.batch_size, 500);
        assert_eq!(config.sync.confirmations, 0);
        assert_eq!(config.sync.prefetch_blocks, 64);
        assert_eq!(config.sync.max_fetch_attempts, 0);
        assert_eq!(config.mapper.blocks_per_day, 14_400);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_full_config() {
        let toml = r#"
[source]
kind = "jsonl"
path = "/var/lib/memopark/blocks.jsonl"

[database]
url = "sqlite://memopark.db"
max_connections = 8
min_connections = 2

[sync]
start_block = 1200
batch_size = 100
confirmations = 2
poll_interval_secs = 3
prefetch_blocks = 16
initial_backoff_ms = 100
max_backoff_ms = 1000
max_fetch_attempts = 5

[mapper]
blocks_per_day = 600

[logging]
level = "debug"
format = "json"
"#;
        let config = Config::from_toml_str(toml).unwrap();

        assert_eq!(
            config.source.path.as_deref(),
            Some(Path::new("/var/lib/memopark/blocks.jsonl"))
        );
        assert_eq!(config.sync.start_block, 1200);
        assert_eq!(config.sync.confirmations, 2);
        assert_eq!(config.sync.max_fetch_attempts, 5);
        assert_eq!(config.mapper.blocks_per_day, 600);
        assert_eq!(config.logging.format, "json");
    }

    fn with(section: &str) -> String {
        format!("{}\n{}", MINIMAL, section)
    }

    fn rejects(toml: &str, needle: &str) {
        let err = Config::from_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains(needle), "expected '{}' in '{}'", needle, err);
    }

    #[test]
    fn test_validation_rules() {
        rejects(
            "[source]\nkind = \"jsonl\"\n[database]\nurl = \"sqlite://x.db\"\n",
            "source.path",
        );
        rejects(
            "[source]\nkind = \"jsonl\"\npath = \"b.jsonl\"\n[database]\nurl = \" \"\n",
            "database.url",
        );
        rejects(
            "[source]\nkind = \"jsonl\"\npath = \"b.jsonl\"\n[database]\nurl = \"sqlite://x.db\"\nmax_connections = 0\n",
            "max_connections",
        );
        rejects(
            "[source]\nkind = \"jsonl\"\npath = \"b.jsonl\"\n[database]\nurl = \"sqlite://x.db\"\nmax_connections = 2\nmin_connections = 3\n",
            "min_connections",
        );
        rejects(&with("[sync]\nbatch_size = 0"), "batch_size");
        rejects(&with("[sync]\npoll_interval_secs = 0"), "poll_interval_secs");
        rejects(&with("[sync]\nprefetch_blocks = 0"), "prefetch_blocks");
        rejects(
            &with("[sync]\ninitial_backoff_ms = 10\nmax_backoff_ms = 5"),
            "initial_backoff_ms",
        );
        rejects(&with("[mapper]\nblocks_per_day = 0"), "blocks_per_day");
        rejects(&with("[logging]\nlevel = \"loud\""), "logging.level");
        rejects(&with("[logging]\nformat = \"xml\""), "logging.format");
    }

    #[test]
    fn test_unknown_source_kind_fails_to_parse() {
        let toml = "[source]\nkind = \"rpc\"\n[database]\nurl = \"sqlite://x.db\"\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("MEMOPARK_TEST_VAR", "hello");
        assert_eq!(
            expand_env_vars("value is ${MEMOPARK_TEST_VAR}").unwrap(),
            "value is hello"
        );
        assert_eq!(
            expand_env_vars("no variables here").unwrap(),
            "no variables here"
        );
        std::env::remove_var("MEMOPARK_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_errors() {
        let err = expand_env_vars("value is ${MEMOPARK_UNDEFINED_12345}").unwrap_err();
        assert!(err.to_string().contains("MEMOPARK_UNDEFINED_12345"));

        let err = expand_env_vars("value is ${}").unwrap_err();
        assert!(err.to_string().contains("Empty"));

        let err = expand_env_vars("value is ${UNCLOSED").unwrap_err();
        assert!(err.to_string().contains("Unclosed"));
    }

    #[test]
    fn test_expand_env_vars_ignores_comments() {
        let input = "# url = \"${MEMOPARK_NOT_SET_IN_COMMENT}\"\nkey = \"a#b\" # ${ALSO_NOT_SET}\n";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_expand_env_vars_in_strings() {
        std::env::set_var("MEMOPARK_TEST_DIR", "/data");
        let input = "a = \"${MEMOPARK_TEST_DIR}/x\"\nb = '${MEMOPARK_TEST_DIR}'\nc = \"\"\"\n# ${MEMOPARK_TEST_DIR}\n\"\"\"\nd = \"esc \\\" # ${MEMOPARK_TEST_DIR}\"\n";
        let expected = "a = \"/data/x\"\nb = '/data'\nc = \"\"\"\n# /data\n\"\"\"\nd = \"esc \\\" # /data\"\n";
        assert_eq!(expand_env_vars(input).unwrap(), expected);
        std::env::remove_var("MEMOPARK_TEST_DIR");
    }

    #[test]
    fn test_from_file_expands_env_vars() {
        std::env::set_var("MEMOPARK_TEST_DB", "sqlite://from-env.db");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[source]\nkind = \"jsonl\"\npath = \"b.jsonl\"\n\n[database]\nurl = \"${{MEMOPARK_TEST_DB}}\"\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "sqlite://from-env.db");
        std::env::remove_var("MEMOPARK_TEST_DB");
    }
}
