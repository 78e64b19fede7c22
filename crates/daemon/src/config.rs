use anyhow::{Context, Result};
use chatwatch_runtime_config::{apply_sanity_fallbacks, WatchConfig, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home))
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config").join("chatwatch"))
}

/// Get the daemon config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the config from `path` (or the default location). A missing file
/// yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<WatchConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(WatchConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let mut config: WatchConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    if apply_sanity_fallbacks(&mut config) {
        warn!("Config at {} had zero-valued settings; defaults applied", path.display());
    }
    Ok(config)
}

/// Database location: CLI override, then `[storage] path`, then the default.
pub fn resolve_db_path(config: &WatchConfig, cli_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = cli_override {
        return Ok(p.to_path_buf());
    }
    let configured = config.storage.path.trim();
    if configured.is_empty() {
        return chatwatch_local_store::default_db_path().context("Could not resolve database path");
    }
    Ok(PathBuf::from(shellexpand(configured, &home_dir()?)))
}

/// Simple ~ expansion
fn shellexpand(path: &str, home: &Path) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home.display(), rest)
    } else {
        path.to_string()
    }
}
