use anyhow::{Context, Result, anyhow};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::provider::DEFAULT_METADATA_TIMEOUT_SECS;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/newtube-relay-env";
pub const DEFAULT_RELAY_PORT: u16 = 8080;
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
const STAGING_SUBDIR: &str = "newtube-relay";

/// How the choice page designates the rendition it asks the caller to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Echo the provider's rendition id back on download.
    #[default]
    Rendition,
    /// Echo the position in the list; the list is resolved again on download.
    Index,
}

impl FromStr for SelectionMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rendition" | "id" => Ok(SelectionMode::Rendition),
            "index" => Ok(SelectionMode::Index),
            other => Err(anyhow!("unknown selection mode `{other}`")),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Rendition => f.write_str("rendition"),
            SelectionMode::Index => f.write_str("index"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub staging_dir: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
    pub selection_mode: Option<SelectionMode>,
    pub provider_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub relay_host: String,
    pub relay_port: u16,
    pub staging_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    pub cookies_file: Option<PathBuf>,
    pub selection_mode: SelectionMode,
    pub provider_timeout_secs: u64,
}

impl EnvConfig {
    /// Applies one `KEY=VALUE` pair. Unknown keys are ignored; `origin` only
    /// shows up in error messages.
    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        match key {
            "RELAY_HOST" => {
                if !value.is_empty() {
                    self.relay_host = Some(value.to_string());
                }
            }
            "RELAY_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing RELAY_PORT from {origin}"))?;
                self.relay_port = Some(port);
            }
            "STAGING_DIR" => {
                if !value.is_empty() {
                    self.staging_dir = Some(PathBuf::from(value));
                }
            }
            "YTDLP_PATH" => {
                if !value.is_empty() {
                    self.ytdlp_path = Some(PathBuf::from(value));
                }
            }
            "COOKIES_FILE" => {
                if !value.is_empty() {
                    self.cookies_file = Some(PathBuf::from(value));
                }
            }
            "SELECTION_MODE" => {
                let mode = value
                    .parse::<SelectionMode>()
                    .with_context(|| format!("Parsing SELECTION_MODE from {origin}"))?;
                self.selection_mode = Some(mode);
            }
            "PROVIDER_TIMEOUT_SECS" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Parsing PROVIDER_TIMEOUT_SECS from {origin}"))?;
                self.provider_timeout_secs = Some(secs);
            }
            _ => {}
        }
        Ok(())
    }
}

const KEYS: [&str; 7] = [
    "RELAY_HOST",
    "RELAY_PORT",
    "STAGING_DIR",
    "YTDLP_PATH",
    "COOKIES_FILE",
    "SELECTION_MODE",
    "PROVIDER_TIMEOUT_SECS",
];

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            cfg.apply(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Loads the config file (if any) and lets process environment variables of
/// the same name override it.
pub fn load_runtime_config_from(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    resolve_runtime_config(path.as_ref(), |key| env::var(key).ok())
}

fn resolve_runtime_config<F>(path: &Path, lookup: F) -> Result<RuntimeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    for key in KEYS {
        if let Some(value) = lookup(key) {
            cfg.apply(key, value.trim(), "the environment")?;
        }
    }

    Ok(RuntimeConfig {
        relay_host: cfg
            .relay_host
            .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string()),
        relay_port: cfg.relay_port.unwrap_or(DEFAULT_RELAY_PORT),
        staging_dir: cfg
            .staging_dir
            .unwrap_or_else(|| env::temp_dir().join(STAGING_SUBDIR)),
        ytdlp_path: cfg
            .ytdlp_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_PATH)),
        cookies_file: cfg.cookies_file,
        selection_mode: cfg.selection_mode.unwrap_or_default(),
        provider_timeout_secs: cfg
            .provider_timeout_secs
            .unwrap_or(DEFAULT_METADATA_TIMEOUT_SECS),
    })
}
