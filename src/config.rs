//! Configuration management using the prefer crate.
//!
//! Resolution order (later wins): built-in defaults, config file (explicit
//! `--config`, otherwise discovered by prefer as `leadscout.{toml,json,yaml}`),
//! environment variables (after `.env` is loaded), CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::{DEFAULT_PAGE_DELAY_MS, PAGE_DELAY_ENV};
use crate::trigger::{BrowserSettings, ParseErrorPolicy, DEFAULT_JOB_SEGMENT};

/// Default local database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "leadscout.db";

/// Default history filename.
pub const HISTORY_FILENAME: &str = "scrape_history.json";

/// Default reports subdirectory name.
const REPORTS_SUBDIR: &str = "reports";

/// Config file contents. Every field is optional; unset fields keep the
/// defaults from `Settings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<String>,
    /// `sqlite:<path>` forces the local backend.
    pub database: Option<String>,
    pub supabase_url: Option<String>,
    pub service_key: Option<String>,
    pub organization_id: Option<String>,
    pub login_url: Option<String>,
    pub job_segment: Option<String>,
    pub people_table: Option<String>,
    pub reports_table: Option<String>,
    pub people_search_url: Option<String>,
    pub company_search_url: Option<String>,
    pub page_delay_ms: Option<u64>,
    pub request_timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub parse_errors: Option<ParseErrorPolicy>,
    pub browser: Option<BrowserSettings>,

    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no config file is found.
    pub async fn load() -> Self {
        match prefer::load("leadscout").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Format is chosen from the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }
}

/// Resolved application settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub history_path: PathBuf,
    pub reports_dir: PathBuf,
    pub database_url: Option<String>,
    pub supabase_url: Option<String>,
    #[serde(skip_serializing)]
    pub service_key: Option<String>,
    pub organization_id: String,
    pub login_url: Option<String>,
    pub job_segment: String,
    pub people_table: String,
    pub reports_table: String,
    pub people_search_url: Option<String>,
    pub company_search_url: Option<String>,
    pub page_delay_ms: u64,
    pub request_timeout: u64,
    pub user_agent: String,
    pub parse_errors: ParseErrorPolicy,
    pub browser: BrowserSettings,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/leadscout, falling back to home, then the current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("leadscout");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            history_path: data_dir.join(HISTORY_FILENAME),
            reports_dir: data_dir.join(REPORTS_SUBDIR),
            data_dir,
            database_url: None,
            supabase_url: None,
            service_key: None,
            organization_id: String::new(),
            login_url: None,
            job_segment: DEFAULT_JOB_SEGMENT.to_string(),
            people_table: "prospects".to_string(),
            reports_table: "scrape_runs".to_string(),
            people_search_url: None,
            company_search_url: None,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            request_timeout: 60,
            user_agent: format!("leadscout/{}", env!("CARGO_PKG_VERSION")),
            parse_errors: ParseErrorPolicy::default(),
            browser: BrowserSettings::default(),
        }
    }

    /// Move the data directory, keeping history and reports inside it.
    fn relocate(&mut self, data_dir: PathBuf) {
        self.history_path = data_dir.join(HISTORY_FILENAME);
        self.reports_dir = data_dir.join(REPORTS_SUBDIR);
        self.data_dir = data_dir;
    }

    /// Overlay values from a config file.
    pub fn apply_config(&mut self, config: &Config, base_dir: &Path) {
        if let Some(ref dir) = config.data_dir {
            self.relocate(resolve_path(dir, base_dir));
        }
        if let Some(ref db) = config.database {
            self.database_url = Some(db.clone());
        }
        let strings = [
            (&config.supabase_url, &mut self.supabase_url),
            (&config.service_key, &mut self.service_key),
            (&config.login_url, &mut self.login_url),
            (&config.people_search_url, &mut self.people_search_url),
            (&config.company_search_url, &mut self.company_search_url),
        ];
        for (src, dst) in strings {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }
        if let Some(ref v) = config.organization_id {
            self.organization_id = v.clone();
        }
        if let Some(ref v) = config.job_segment {
            self.job_segment = v.clone();
        }
        if let Some(ref v) = config.people_table {
            self.people_table = v.clone();
        }
        if let Some(ref v) = config.reports_table {
            self.reports_table = v.clone();
        }
        if let Some(ref v) = config.user_agent {
            self.user_agent = v.clone();
        }
        if let Some(v) = config.page_delay_ms {
            self.page_delay_ms = v;
        }
        if let Some(v) = config.request_timeout {
            self.request_timeout = v;
        }
        if let Some(v) = config.parse_errors {
            self.parse_errors = v;
        }
        if let Some(ref v) = config.browser {
            self.browser = v.clone();
        }
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUPABASE_URL") {
            self.supabase_url = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.service_key = Some(v);
        }
        if let Some(v) = get("ORGANIZATION_ID") {
            self.organization_id = v;
        }
        if let Some(v) = get("LOGIN_URL") {
            self.login_url = Some(v);
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database_url = Some(v);
        }
        if let Some(v) = get(PAGE_DELAY_ENV).and_then(|v| v.trim().parse().ok()) {
            self.page_delay_ms = v;
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Path of an explicit `sqlite:` database URL, if one is configured.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        let url = self.database_url.as_deref()?;
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))?;
        Some(resolve_path(path, &self.data_dir))
    }

    /// Local database used when no hosted database is configured.
    pub fn default_database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    fn functions_base(&self) -> Option<String> {
        self.supabase_url
            .as_ref()
            .map(|url| format!("{}/functions/v1", url.trim_end_matches('/')))
    }

    pub fn people_search_url(&self) -> Option<String> {
        self.people_search_url
            .clone()
            .or_else(|| self.functions_base().map(|b| format!("{}/people-search", b)))
    }

    pub fn company_search_url(&self) -> Option<String> {
        self.company_search_url
            .clone()
            .or_else(|| self.functions_base().map(|b| format!("{}/company-search", b)))
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Ensure the data and reports directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [(&self.data_dir, "data"), (&self.reports_dir, "reports")] {
            std::fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", label, dir.display(), e),
                )
            })?;
        }
        Ok(())
    }
}

/// Expand `~` and make relative paths relative to `base_dir`.
fn resolve_path(path: &str, base_dir: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`).
    pub config_path: Option<PathBuf>,
    /// Data directory override (`--data-dir`).
    pub data_dir: Option<PathBuf>,
}

/// Resolve settings from defaults, config file, environment and flags.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), String> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    settings.apply_config(&config, &base_dir);
    settings.apply_env();

    if let Some(ref dir) = options.data_dir {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        settings.relocate(resolve_path(&dir.to_string_lossy(), &cwd));
    }

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    Ok((settings, config))
}
