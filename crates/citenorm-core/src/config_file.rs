use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::store::StoreKind;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub snapshot: Option<SnapshotConfig>,
    pub store: Option<StoreConfig>,
    pub matching: Option<MatchingConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub kind: Option<StoreKind>,
    pub path: Option<String>,
    /// Directory for timestamped result files when `path` is unset.
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub use_exact: Option<bool>,
    pub use_fuzzy: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/citenorm/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citenorm").join("config.toml"))
}

/// Load config by cascading CWD `.citenorm.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citenorm.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        snapshot: Some(SnapshotConfig {
            path: overlay
                .snapshot
                .as_ref()
                .and_then(|s| s.path.clone())
                .or_else(|| base.snapshot.as_ref().and_then(|s| s.path.clone())),
        }),
        store: Some(StoreConfig {
            kind: overlay
                .store
                .as_ref()
                .and_then(|s| s.kind)
                .or_else(|| base.store.as_ref().and_then(|s| s.kind)),
            path: overlay
                .store
                .as_ref()
                .and_then(|s| s.path.clone())
                .or_else(|| base.store.as_ref().and_then(|s| s.path.clone())),
            data_dir: overlay
                .store
                .as_ref()
                .and_then(|s| s.data_dir.clone())
                .or_else(|| base.store.as_ref().and_then(|s| s.data_dir.clone())),
        }),
        matching: Some(MatchingConfig {
            use_exact: overlay
                .matching
                .as_ref()
                .and_then(|m| m.use_exact)
                .or_else(|| base.matching.as_ref().and_then(|m| m.use_exact)),
            use_fuzzy: overlay
                .matching
                .as_ref()
                .and_then(|m| m.use_fuzzy)
                .or_else(|| base.matching.as_ref().and_then(|m| m.use_fuzzy)),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: overlay
                .concurrency
                .as_ref()
                .and_then(|c| c.num_workers)
                .or_else(|| base.concurrency.as_ref().and_then(|c| c.num_workers)),
        }),
    }
}

/// Overlay the file's values onto a runtime [`Config`].
pub fn apply(file: &ConfigFile, config: &mut Config) {
    if let Some(path) = file.snapshot.as_ref().and_then(|s| s.path.as_ref()) {
        config.snapshot_path = Some(PathBuf::from(path));
    }
    if let Some(store) = &file.store {
        if let Some(kind) = store.kind {
            config.store_kind = kind;
        }
        if let Some(path) = &store.path {
            config.store_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = &store.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
    }
    if let Some(matching) = &file.matching {
        if let Some(exact) = matching.use_exact {
            config.use_exact = exact;
        }
        if let Some(fuzzy) = matching.use_fuzzy {
            config.use_fuzzy = fuzzy;
        }
    }
    if let Some(n) = file.concurrency.as_ref().and_then(|c| c.num_workers) {
        config.num_workers = n.max(1);
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}
