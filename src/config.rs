use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use eggscan_cache::{CleanupPolicy, MemoryLimits};

const ENV_PREFIX: &str = "EGGSCAN_";
const APP_DIR_NAME: &str = "eggscan";

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct EggscanConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub identify: IdentifyConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Content cache budgets and location
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Disk tier directory
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,

    /// Age after which a disk entry is stale
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Disk tier size budget
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Memory tier cost budget
    #[serde(default = "default_memory_cost_limit_mb")]
    pub memory_cost_limit_mb: u64,

    /// Memory tier entry budget
    #[serde(default = "default_memory_count_limit")]
    pub memory_count_limit: usize,
}

fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(APP_DIR_NAME)
        .join("ImageCache")
}

fn default_max_age_days() -> u64 {
    30
}

fn default_max_size_mb() -> u64 {
    200
}

fn default_memory_cost_limit_mb() -> u64 {
    50
}

fn default_memory_count_limit() -> usize {
    50
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            max_age_days: default_max_age_days(),
            max_size_mb: default_max_size_mb(),
            memory_cost_limit_mb: default_memory_cost_limit_mb(),
            memory_count_limit: default_memory_count_limit(),
        }
    }
}

impl CacheConfig {
    pub fn to_cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy::default()
            .with_max_age_days(self.max_age_days)
            .with_max_size_mb(self.max_size_mb)
    }

    pub fn to_memory_limits(&self) -> MemoryLimits {
        MemoryLimits {
            cost_limit_bytes: usize::try_from(self.memory_cost_limit_mb.saturating_mul(1024 * 1024))
                .unwrap_or(usize::MAX),
            count_limit: self.memory_count_limit,
        }
    }
}

/// Scan history location and capacity
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Root holding `scan_history.json` and `ScannedImages/`
    #[serde(default = "default_history_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_history_directory() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_max_items() -> usize {
    eggscan_history::DEFAULT_MAX_ITEMS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            directory: default_history_directory(),
            max_items: default_max_items(),
        }
    }
}

/// Vision model endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct IdentifyConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_identify_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_identify_timeout() -> u64 {
    60
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_identify_timeout(),
        }
    }
}

impl IdentifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid range in {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: u64,
        valid_range: String,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: String, value: String },

    #[error("Failed to load config file {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A config file: only the keys it sets
#[derive(Debug, Clone, Default)]
struct ConfigLayer(toml::Table);

impl ConfigLayer {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self(toml::from_str(&content)?))
    }

    /// Overlay `other` onto this layer, table by table
    fn merge(&mut self, other: ConfigLayer) {
        merge_tables(&mut self.0, other.0);
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(overlay_table) => match base.get_mut(&key) {
                Some(toml::Value::Table(base_table)) => merge_tables(base_table, overlay_table),
                _ => {
                    base.insert(key, toml::Value::Table(overlay_table));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

impl EggscanConfig {
    pub fn generate_default_config() -> String {
        let default_config = Self::default();
        toml::to_string_pretty(&default_config).unwrap_or_else(|_| {
            r#"# eggscan configuration file

[cache]
max_age_days = 30
max_size_mb = 200
memory_cost_limit_mb = 50
memory_count_limit = 50

[history]
max_items = 50

[identify]
api_base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
max_tokens = 150
timeout_secs = 60

[fetch]
timeout_secs = 30
"#
            .to_string()
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EggscanConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the user config file path (~/.config/eggscan/config.toml)
    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join(APP_DIR_NAME).join("config.toml"))
    }

    /// Get the current directory config file path (./eggscan.toml)
    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("./eggscan.toml")
    }

    /// Load configuration with full precedence chain:
    /// 1. Default values (lowest)
    /// 2. User config (~/.config/eggscan/config.toml)
    /// 3. Current directory (./eggscan.toml)
    /// 4. Explicit config file
    /// 5. Environment variables (EGGSCAN_*) (highest)
    ///
    /// Unreadable implicit files are skipped with a warning; an unreadable
    /// explicit file is an error.
    pub fn load_with_precedence(
        config_path: Option<&Path>,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut layers = ConfigLayer::default();

        let implicit = Self::get_user_config_path()
            .into_iter()
            .chain(std::iter::once(Self::get_current_config_path()));
        for path in implicit {
            if !path.exists() {
                continue;
            }
            match ConfigLayer::load(&path) {
                Ok(layer) => {
                    layers.merge(layer);
                    log::debug!("Loaded config from: {}", path.display());
                }
                Err(e) => log::warn!("Ignoring config file {}: {}", path.display(), e),
            }
        }

        if let Some(path) = config_path {
            let layer = ConfigLayer::load(path).map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
            layers.merge(layer);
            log::debug!("Loaded config from: {}", path.display());
        }

        let mut config: EggscanConfig = toml::Value::Table(layers.0).try_into()?;
        config.apply_env_vars(env_vars)?;
        config.validate()?;

        Ok(config)
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (key, value) in env_vars {
            let Some(config_key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match config_key {
                "CACHE_DIRECTORY" => self.cache.directory = PathBuf::from(value),
                "CACHE_MAX_AGE_DAYS" => self.cache.max_age_days = parse_env(key, value)?,
                "CACHE_MAX_SIZE_MB" => self.cache.max_size_mb = parse_env(key, value)?,
                "CACHE_MEMORY_COST_LIMIT_MB" => self.cache.memory_cost_limit_mb = parse_env(key, value)?,
                "CACHE_MEMORY_COUNT_LIMIT" => self.cache.memory_count_limit = parse_env(key, value)?,
                "HISTORY_DIRECTORY" => self.history.directory = PathBuf::from(value),
                "HISTORY_MAX_ITEMS" => self.history.max_items = parse_env(key, value)?,
                "IDENTIFY_API_BASE_URL" => self.identify.api_base_url = value.clone(),
                "IDENTIFY_MODEL" => self.identify.model = value.clone(),
                "IDENTIFY_API_KEY_ENV" => self.identify.api_key_env = value.clone(),
                "IDENTIFY_MAX_TOKENS" => self.identify.max_tokens = parse_env(key, value)?,
                "IDENTIFY_TIMEOUT_SECS" => self.identify.timeout_secs = parse_env(key, value)?,
                "FETCH_TIMEOUT_SECS" => self.fetch.timeout_secs = parse_env(key, value)?,
                _ => {} // Ignore unknown environment variables
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("cache.max_age_days", self.cache.max_age_days),
            ("cache.max_size_mb", self.cache.max_size_mb),
            ("cache.memory_cost_limit_mb", self.cache.memory_cost_limit_mb),
            ("cache.memory_count_limit", self.cache.memory_count_limit as u64),
            ("history.max_items", self.history.max_items as u64),
            ("identify.max_tokens", u64::from(self.identify.max_tokens)),
            ("identify.timeout_secs", self.identify.timeout_secs),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidRange {
                    field: field.to_string(),
                    value,
                    valid_range: "1 or more".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = EggscanConfig::default();

        assert_eq!(config.cache.max_age_days, 30);
        assert_eq!(config.cache.max_size_mb, 200);
        assert_eq!(config.cache.memory_cost_limit_mb, 50);
        assert_eq!(config.cache.memory_count_limit, 50);
        assert_eq!(config.history.max_items, 50);
        assert_eq!(config.identify.model, "gpt-4o-mini");
        assert_eq!(config.identify.max_tokens, 150);
        assert!(config.cache.directory.ends_with("eggscan/ImageCache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_conversions() {
        let config = CacheConfig::default();

        assert_eq!(config.to_cleanup_policy(), CleanupPolicy::default());
        assert_eq!(config.to_memory_limits(), MemoryLimits::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EggscanConfig = toml::from_str(
            r#"
            [cache]
            max_size_mb = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.max_size_mb, 10);
        assert_eq!(config.cache.max_age_days, 30);
        assert_eq!(config.history.max_items, 50);
    }

    #[test]
    fn test_generated_config_round_trips() {
        let generated = EggscanConfig::generate_default_config();
        let parsed: EggscanConfig = toml::from_str(&generated).unwrap();

        assert_eq!(parsed, EggscanConfig::default());
    }

    #[test]
    fn test_merge_later_layer_wins_per_key() {
        let mut base = ConfigLayer(
            toml::from_str(
                r#"
                [cache]
                max_size_mb = 10
                max_age_days = 7
                "#,
            )
            .unwrap(),
        );
        let overlay = ConfigLayer(
            toml::from_str(
                r#"
                [cache]
                max_size_mb = 30
                "#,
            )
            .unwrap(),
        );

        base.merge(overlay);
        let config: EggscanConfig = toml::Value::Table(base.0).try_into().unwrap();

        assert_eq!(config.cache.max_size_mb, 30);
        assert_eq!(config.cache.max_age_days, 7);
    }

    #[test]
    fn test_env_vars() {
        let mut config = EggscanConfig::default();
        config
            .apply_env_vars(&env(&[
                ("EGGSCAN_CACHE_MAX_AGE_DAYS", "3"),
                ("EGGSCAN_HISTORY_DIRECTORY", "/tmp/eggs"),
                ("EGGSCAN_IDENTIFY_MODEL", "gpt-4o"),
                ("EGGSCAN_UNKNOWN", "ignored"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.cache.max_age_days, 3);
        assert_eq!(config.history.directory, PathBuf::from("/tmp/eggs"));
        assert_eq!(config.identify.model, "gpt-4o");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = EggscanConfig::default();
        let err = config
            .apply_env_vars(&env(&[("EGGSCAN_HISTORY_MAX_ITEMS", "lots")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnvValue { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = EggscanConfig::default();
        config.history.max_items = 0;

        match config.validate() {
            Err(ConfigError::InvalidRange { field, .. }) => assert_eq!(field, "history.max_items"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_file_then_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("eggscan.toml");
        fs::write(
            &path,
            r#"
            [history]
            max_items = 7

            [fetch]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        let config = EggscanConfig::load_with_precedence(
            Some(&path),
            &env(&[("EGGSCAN_FETCH_TIMEOUT_SECS", "9")]),
        )
        .unwrap();

        assert_eq!(config.history.max_items, 7);
        assert_eq!(config.fetch.timeout_secs, 9);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result =
            EggscanConfig::load_with_precedence(Some(&temp_dir.path().join("missing.toml")), &HashMap::new());

        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }
}
