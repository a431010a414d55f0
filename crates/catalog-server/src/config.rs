use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// List cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Resource manager tuning
    #[serde(default)]
    pub catalog: CatalogSettings,
    /// Asset store (image hosting) configuration
    #[serde(default)]
    pub assets: AssetsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cache validation
        if self.cache.enabled && self.cache.list_ttl_secs == 0 {
            return Err("cache.list_ttl_secs must be > 0 when the cache is enabled".into());
        }
        // Catalog validations
        if self.catalog.id_allocation_retries == 0 {
            return Err("catalog.id_allocation_retries must be > 0".into());
        }
        if self.catalog.default_page_size == 0 {
            return Err("catalog.default_page_size must be > 0".into());
        }
        if self.catalog.search_result_cap == 0 {
            return Err("catalog.search_result_cap must be > 0".into());
        }
        if self.catalog.default_suggestions == 0 {
            return Err("catalog.default_suggestions must be > 0".into());
        }
        // Asset store validation
        if self.assets.backend == AssetBackend::Http {
            let missing: Vec<&str> = [
                ("assets.cloud_name", &self.assets.cloud_name),
                ("assets.api_key", &self.assets.api_key),
                ("assets.api_secret", &self.assets.api_secret),
            ]
            .into_iter()
            .filter(|(_, v)| v.as_deref().unwrap_or("").is_empty())
            .map(|(name, _)| name)
            .collect();
            if !missing.is_empty() {
                return Err(format!("assets.backend=http requires {}", missing.join(", ")));
            }
            if self.assets.timeout_ms == 0 {
                return Err("assets.timeout_ms must be > 0".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.list_ttl_secs)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.assets.timeout_ms)
    }

    /// Directory multipart uploads are spooled into.
    pub fn temp_dir(&self) -> PathBuf {
        self.server
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("catalog-uploads"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Spool directory for uploads; defaults to `<system temp>/catalog-uploads`
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false every list read goes to storage
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// List snapshot TTL in seconds
    #[serde(default = "default_list_ttl_secs")]
    pub list_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_list_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            list_ttl_secs: default_list_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Attempts at allocate+insert before an id collision is reported
    #[serde(default = "default_id_allocation_retries")]
    pub id_allocation_retries: u32,
    /// Product list page size when `limit` is absent
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Maximum rows returned by fuzzy search
    #[serde(default = "default_search_result_cap")]
    pub search_result_cap: usize,
    /// Suggestion sample size when `limit` is absent
    #[serde(default = "default_suggestions")]
    pub default_suggestions: usize,
}

fn default_id_allocation_retries() -> u32 {
    5
}
fn default_page_size() -> u32 {
    20
}
fn default_search_result_cap() -> usize {
    30
}
fn default_suggestions() -> usize {
    30
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            id_allocation_retries: default_id_allocation_retries(),
            default_page_size: default_page_size(),
            search_result_cap: default_search_result_cap(),
            default_suggestions: default_suggestions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetBackend {
    /// Process-local store, for development and tests
    #[default]
    Memory,
    /// Signed uploads to an image hosting service
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default)]
    pub backend: AssetBackend,
    #[serde(default = "default_assets_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Folder uploads are placed in
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default = "default_assets_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_assets_base_url() -> String {
    "https://api.cloudinary.com/v1_1".into()
}
fn default_assets_timeout_ms() -> u64 {
    30_000
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            backend: AssetBackend::default(),
            base_url: default_assets_base_url(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: None,
            timeout_ms: default_assets_timeout_ms(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_FILE: &str = "catalog.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CATALOG__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CATALOG")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
