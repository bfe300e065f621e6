use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
}

/// Подключение к upstream-сервису возвратов
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_returns_path")]
    pub returns_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Параметры кэша и загрузки
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Окно свежести записи кэша
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    /// Количество повторов после первой неудачной попытки
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Задержка debounce для изменений фильтра
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: String,
}

fn default_returns_path() -> String {
    "/api/mp_returns/search".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_freshness_secs() -> u64 {
    300 // 5 минут
}

fn default_max_retries() -> u32 {
    2
}

fn default_page_size() -> usize {
    50
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl FetchConfig {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ApiConfig {
    /// Полный URL эндпоинта списка возвратов
    pub fn returns_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.returns_path
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[api]
base_url = "http://127.0.0.1:3000"
returns_path = "/api/mp_returns/search"
timeout_secs = 30

[fetch]
freshness_secs = 300
max_retries = 2
page_size = 50
debounce_ms = 500

[storage]
dir = "target/state"
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                return load_from_path(&config_path);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

/// Load configuration from an explicit file
pub fn load_from_path(path: &Path) -> anyhow::Result<Config> {
    tracing::info!("Loading config from: {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

/// Get the storage directory from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_storage_dir(config: &Config) -> PathBuf {
    let dir = Path::new(&config.storage.dir);

    if dir.is_absolute() {
        return dir.to_path_buf();
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(dir);
        }
    }

    PathBuf::from(&config.storage.dir)
}
