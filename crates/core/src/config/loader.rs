use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Environment prefix for overrides.
const ENV_PREFIX: &str = "BOOKHOUND_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by a double underscore, so
/// `BOOKHOUND_LIBRARY__API_KEY` overrides `library.api_key`. Relative
/// `state.data_dir` and `metrics.textfile` paths are resolved against the
/// directory holding the config file, so a scheduled run does not depend
/// on its working directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    let mut config = extract(figment)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_paths(&mut config, base);
    Ok(config)
}

/// Load configuration from a TOML string, without environment overrides
/// or path resolution.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    extract(Figment::from(Toml::string(toml_str)))
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    let mut config: Config = figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    normalize_lists(&mut config);
    Ok(config)
}

/// Blacklist words are compared lower-cased against titles; peer names are
/// compared exactly. Blank entries and duplicates are dropped from both.
fn normalize_lists(config: &mut Config) {
    let search = &mut config.search;
    search.title_blacklist = dedup(
        search
            .title_blacklist
            .iter()
            .map(|w| w.trim().to_lowercase()),
    );
    search.ignored_users = dedup(search.ignored_users.iter().map(|u| u.trim().to_string()));
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn resolve_paths(config: &mut Config, base: &Path) {
    config.state.data_dir = resolve(base, &config.state.data_dir);
    if let Some(textfile) = config.metrics.textfile.take() {
        config.metrics.textfile = Some(resolve(base, &textfile));
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
