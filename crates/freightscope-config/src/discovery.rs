//! Locating and layering config files.
//!
//! Two layers, the second winning per section:
//! 1. `config.toml` in the user config dir (`$FREIGHTSCOPE_CONFIG_DIR`, or
//!    `freightscope/` under the platform config dir)
//! 2. `freightscope.toml` in the project directory
//!
//! Command-line flags are applied afterwards by the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, FreightscopeConfig, Result};

const PROJECT_FILE: &str = "freightscope.toml";
const USER_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "FREIGHTSCOPE_CONFIG_DIR";

/// One candidate file and whether it contributed to the merge.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// Merged configuration plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: FreightscopeConfig,
    /// Candidates in merge order.
    pub sources: Vec<ConfigSource>,
    /// Unreadable layers and plaintext secrets; never fatal.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|source| source.loaded.then_some(source.path.as_path()))
            .collect()
    }

    fn layer(&mut self, path: PathBuf) {
        let loaded = path.is_file()
            && match load_config_file(&path) {
                Ok(layer) => {
                    self.config.merge(layer);
                    true
                }
                Err(e) => {
                    self.warnings
                        .push(format!("Skipped {}: {}", path.display(), e));
                    false
                }
            };
        self.sources.push(ConfigSource { path, loaded });
    }

    fn warn_plaintext_secrets(&mut self) {
        if self
            .config
            .llm
            .as_ref()
            .is_some_and(|llm| llm.has_plaintext_api_key())
        {
            self.warnings.push(
                "API key stored in plaintext under [llm]; prefer ANTHROPIC_API_KEY".to_string(),
            );
        }
        if self
            .config
            .store
            .as_ref()
            .is_some_and(|store| store.api_key.is_some())
        {
            self.warnings.push(
                "API key stored in plaintext under [store]; prefer FREIGHTSCOPE_STORE_KEY"
                    .to_string(),
            );
        }
    }
}

/// Merge the user layer and the project layer found in `project_dir`
/// (the working directory when `None`).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` taking precedence over
/// `$FREIGHTSCOPE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user_file = match config_dir {
        Some(dir) => Some(dir.join(USER_FILE)),
        None => user_config_path(),
    };
    let project_file = match project_dir {
        Some(dir) => dir.join(PROJECT_FILE),
        None => PathBuf::from(PROJECT_FILE),
    };

    let mut loaded = LoadedConfig::default();
    for path in user_file.into_iter().chain([project_file]) {
        loaded.layer(path);
    }
    loaded.warn_plaintext_secrets();
    Ok(loaded)
}

/// Parse a single file, bypassing discovery.
pub fn load_config_file(path: &Path) -> Result<FreightscopeConfig> {
    std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })
        .and_then(|text| FreightscopeConfig::from_toml(&text))
}

pub fn user_config_path() -> Option<PathBuf> {
    Some(user_config_dir()?.join(USER_FILE))
}

pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => Some(dirs::config_dir()?.join("freightscope")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dirs_with(project: &[(&str, &str)], user: &[(&str, &str)]) -> (TempDir, TempDir) {
        let (p, u) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        for (name, body) in project {
            fs::write(p.path().join(name), body).unwrap();
        }
        for (name, body) in user {
            fs::write(u.path().join(name), body).unwrap();
        }
        (p, u)
    }

    fn load(project: &TempDir, user: &TempDir) -> LoadedConfig {
        load_config_with_options(Some(project.path()), Some(user.path())).unwrap()
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let (project, _user) = dirs_with(&[("freightscope.toml", "quick_turns = {{")], &[]);
        let err = load_config_file(&project.path().join("freightscope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_nothing_on_disk() {
        let (project, user) = dirs_with(&[], &[]);
        let loaded = load(&project, &user);
        assert!(loaded.config.llm.is_none());
        assert_eq!(loaded.sources.len(), 2);
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_project_layer_wins_per_section() {
        let (project, user) = dirs_with(
            &[("freightscope.toml", "[llm]\nmodel = \"project-model\"\n")],
            &[(
                "config.toml",
                "[llm]\nmodel = \"user-model\"\n[server]\nbind = \"127.0.0.1:1\"\n",
            )],
        );

        let loaded = load(&project, &user);
        assert_eq!(loaded.config.llm().effective_model(), "project-model");
        assert_eq!(loaded.config.server().bind, "127.0.0.1:1");
        assert_eq!(
            loaded.loaded_from(),
            vec![
                user.path().join("config.toml").as_path(),
                project.path().join("freightscope.toml").as_path()
            ]
        );
    }

    #[test]
    fn test_broken_layer_is_skipped_with_warning() {
        let (project, user) = dirs_with(
            &[("freightscope.toml", "[[[")],
            &[("config.toml", "[server]\nbind = \"127.0.0.1:2\"\n")],
        );

        let loaded = load(&project, &user);
        assert_eq!(loaded.config.server().bind, "127.0.0.1:2");
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("Skipped"));
        assert!(!loaded.sources[1].loaded);
    }

    #[test]
    fn test_plaintext_secrets_warn() {
        let (project, user) = dirs_with(
            &[(
                "freightscope.toml",
                "[llm]\napi_key = \"sk-secret\"\n[store]\napi_key = \"s\"\n",
            )],
            &[],
        );

        let loaded = load(&project, &user);
        assert_eq!(loaded.warnings.len(), 2);
        assert!(loaded.warnings.iter().all(|w| w.contains("plaintext")));
    }
}
