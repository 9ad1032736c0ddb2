use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(alias = "api_url")]
    pub api_base_url: Option<String>,
    pub timeout: Option<u64>,
    pub page_size: Option<usize>,
    pub cve_page_size: Option<usize>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
    #[serde(alias = "origin")]
    pub origin_base_url: Option<String>,
    pub upstream_token: Option<String>,
    pub listen: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found '{path}'")]
    NotFound { path: String },

    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write config '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// `HOME`, falling back to `USERPROFILE` on Windows shells.
fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var_os(key))
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".menaxa").join("config.yml"))
}

/// Expands a leading `~` (alone or followed by a separator) to the home
/// directory. Other paths come back unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).display().to_string()
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, ConfigError> {
    let shown = path.display().to_string();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return if allow_missing {
                Ok(ConfigFile::default())
            } else {
                Err(ConfigError::NotFound { path: shown })
            };
        }
        Err(e) => return Err(ConfigError::Read { path: shown, source: e }),
    };
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path: shown, source: e })
}

pub fn default_config_yaml() -> String {
    r#"# menaxa config
#
# Location (default):
#   ~/.menaxa/config.yml

# Feed API
api_base_url: http://127.0.0.1:8000
timeout: 10

# Tables
page_size: 20
# Rows requested per /get-cves page (1-1000)
cve_page_size: 100
# output_format: text

# Output styling
no_color: false

# Edge proxy
# ORIGIN_BASE_URL and UPSTREAM_PROXY_TOKEN override these when set.
# origin_base_url: https://data.example.org
# upstream_token: change-me
listen: 127.0.0.1:8787
"#
    .to_string()
}

/// Writes the commented default file unless one exists. `true` when written.
pub fn ensure_default_config_file(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    let write_err = |e| ConfigError::Write {
        path: path.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, default_config_yaml()).map_err(write_err)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_yaml_parses() {
        let cfg: ConfigFile = serde_yaml::from_str(&default_config_yaml()).unwrap();
        assert_eq!(cfg.api_base_url.as_deref(), Some("http://127.0.0.1:8000"));
        assert_eq!(cfg.page_size, Some(20));
        assert_eq!(cfg.origin_base_url, None);
    }

    #[test]
    fn missing_file_allowed_or_rejected() {
        let path = PathBuf::from("/nonexistent/menaxa/config.yml");
        assert_eq!(load_config(&path, true).unwrap(), ConfigFile::default());
        assert!(matches!(
            load_config(&path, false),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn tilde_expands_only_as_a_prefix() {
        assert_eq!(expand_tilde("/etc/menaxa.yml"), PathBuf::from("/etc/menaxa.yml"));
        assert_eq!(expand_tilde("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde("~/feeds/leaks.json"), home.join("feeds/leaks.json"));
            assert_eq!(expand_tilde("~"), home);
        }
    }

    #[test]
    fn broken_yaml_is_a_parse_error() {
        let dir = env::temp_dir().join(format!("menaxa-bad-config-{}", std::process::id()));
        let path = dir.join("config.yml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "page_size: [not, a, number").unwrap();
        assert!(matches!(
            load_config(&path, true),
            Err(ConfigError::Parse { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ensure_writes_once() {
        let dir = env::temp_dir().join(format!("menaxa-config-{}", std::process::id()));
        let path = dir.join("config.yml");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(ensure_default_config_file(&path).unwrap());
        assert!(!ensure_default_config_file(&path).unwrap());
        assert!(load_config(&path, false).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
