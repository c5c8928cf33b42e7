use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub completion: CompletionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Directory served under `/static`, if any.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
            static_dir: None,
        }
    }
}

/// Which `DocumentStore` implementation the process is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

/// Completion service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    30
}

impl ServerConfig {
    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DOCANALYZER_CONFIG environment variable
    /// 2. ./config.toml in current directory
    ///
    /// Fails if the completion API key variable is unset.
    pub fn load() -> Result<Self> {
        let config = Self::load_for_storage()?;
        if std::env::var(&config.completion.api_key_env).is_err() {
            anyhow::bail!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your OpenAI API key.",
                config.completion.api_key_env
            );
        }
        Ok(config)
    }

    /// Same as [`Config::load`], without requiring the completion API key.
    /// For commands that only touch the database.
    pub fn load_for_storage() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DOCANALYZER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration without validating environment-dependent values
    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.completion.provider != "openai" {
            anyhow::bail!(
                "completion.provider '{}' is not supported (expected 'openai')",
                self.completion.provider
            );
        }

        if self.completion.max_tokens == 0 {
            anyhow::bail!("completion.max_tokens must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            anyhow::bail!("completion.temperature must be between 0.0 and 2.0");
        }

        if self.completion.timeout_secs == 0 {
            anyhow::bail!("completion.timeout_secs must be greater than 0");
        }

        if let Some(dir) = &self.server.static_dir {
            if !dir.is_dir() {
                anyhow::bail!("server.static_dir must be a directory: {}", dir.display());
            }
        }

        Ok(())
    }

    /// Read the completion API key from the configured environment variable
    pub fn completion_api_key(&self) -> Result<String> {
        std::env::var(&self.completion.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set",
                self.completion.api_key_env
            )
        })
    }

    /// Fail for one-shot commands that would only ever see a fresh,
    /// empty in-memory store.
    pub fn require_persistent_storage(&self, command: &str) -> Result<()> {
        if self.storage.backend == StorageBackend::Memory {
            anyhow::bail!(
                "`{}` needs storage.backend = \"sqlite\"; the in-memory store only holds documents while `serve` runs",
                command
            );
        }
        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.storage.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_KEY_ENV: &str = "DOCANALYZER_TEST_OPENAI_KEY";

    fn test_config_toml() -> String {
        format!(
            r#"
[server]
port = 9100

[storage]
backend = "memory"
db_path = "./test.db"

[completion]
provider = "openai"
model = "gpt-3.5-turbo"
api_key_env = "{}"
temperature = 0.2
"#,
            TEST_KEY_ENV
        )
    }

    fn with_config_env(config_path: &Path, api_key: Option<&str>, f: impl FnOnce()) {
        let original_config = std::env::var("DOCANALYZER_CONFIG").ok();
        std::env::set_var("DOCANALYZER_CONFIG", config_path);
        match api_key {
            Some(k) => std::env::set_var(TEST_KEY_ENV, k),
            None => std::env::remove_var(TEST_KEY_ENV),
        }
        f();
        std::env::remove_var("DOCANALYZER_CONFIG");
        std::env::remove_var(TEST_KEY_ENV);
        if let Some(val) = original_config {
            std::env::set_var("DOCANALYZER_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, test_config_toml()).unwrap();

        with_config_env(&config_path, Some("test-key"), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.storage.backend, StorageBackend::Memory);
            assert_eq!(config.storage.migrations_dir, PathBuf::from("migrations"));
            assert_eq!(config.completion.max_tokens, 300);
            assert_eq!(config.completion.temperature, 0.2);
            assert_eq!(config.completion.timeout(), Duration::from_secs(30));
            assert_eq!(config.completion_api_key().unwrap(), "test-key");
        });
    }

    #[test]
    fn test_config_missing_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, test_config_toml()).unwrap();

        with_config_env(&config_path, None, || {
            let config = Config::load();
            assert!(config.is_err(), "Expected missing API key error");
            assert!(config.unwrap_err().to_string().contains(TEST_KEY_ENV));
        });
    }

    #[test]
    fn test_storage_load_does_not_need_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, test_config_toml()).unwrap();

        with_config_env(&config_path, None, || {
            let config = Config::load_for_storage().unwrap();
            assert_eq!(config.db_path(), Path::new("./test.db"));
            assert!(config.completion_api_key().is_err());
        });
    }

    #[test]
    fn test_config_rejects_out_of_range_temperature() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = test_config_toml().replace("temperature = 0.2", "temperature = 3.5");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, Some("test-key"), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("temperature"));
        });
    }

    #[test]
    fn test_config_rejects_unknown_provider() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = test_config_toml().replace("provider = \"openai\"", "provider = \"other\"");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, Some("test-key"), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("provider"));
        });
    }

    #[test]
    fn test_defaults_when_server_section_missing() {
        let config = Config::from_toml(
            r#"
[storage]
db_path = "docs.db"

[completion]
provider = "openai"
model = "gpt-3.5-turbo"
api_key_env = "OPENAI_API_KEY"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.completion.base_url, "https://api.openai.com/v1");
        assert!(config.server.allowed_origins.is_empty());
        assert!(config.server.static_dir.is_none());
    }

    #[test]
    fn test_one_shot_commands_need_persistent_storage() {
        let mut config = Config::from_toml(&test_config_toml()).unwrap();
        let err = config.require_persistent_storage("analyze").unwrap_err();
        assert!(err.to_string().contains("analyze"));

        config.storage.backend = StorageBackend::Sqlite;
        assert!(config.require_persistent_storage("analyze").is_ok());
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("DOCANALYZER_CONFIG").ok();
        std::env::set_var("DOCANALYZER_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("DOCANALYZER_CONFIG");
        if let Some(v) = original {
            std::env::set_var("DOCANALYZER_CONFIG", v);
        }
    }
}
