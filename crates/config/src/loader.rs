use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ScalarWebConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "scalarweb.toml",
    "scalarweb.yaml",
    "scalarweb.yml",
    "scalarweb.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ScalarWebConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config.
///
/// Search order:
/// 1. `config_dir_override` when given (e.g. `--config-dir`)
/// 2. `./scalarweb.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/scalarweb/scalarweb.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ScalarWebConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load(config_dir_override: Option<&Path>) -> ScalarWebConfig {
    if let Some(path) = find_config_file(config_dir_override) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ScalarWebConfig::default()
}

/// Find the first config file in the search order of [`discover_and_load`].
pub fn find_config_file(config_dir_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = config_dir_override {
        return first_existing(dir);
    }

    first_existing(Path::new(".")).or_else(|| config_dir().and_then(|dir| first_existing(&dir)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/scalarweb/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "scalarweb").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ScalarWebConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
