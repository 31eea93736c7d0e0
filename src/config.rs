use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::comments::OrphanPolicy;
use crate::data::SortMode;
use crate::station::DEFAULT_BASE_URL;

const DEFAULT_ENV_PREFIX: &str = "HN_STATION";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: String::new(),
            page_size: default_page_size(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub default_sort: SortMode,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            default_sort: SortMode::default(),
        }
    }
}

fn default_topics() -> Vec<String> {
    ["Postgres", "LLM", "OpenCV", "WPL Cricket", "Rust", "Go", "AI"]
        .iter()
        .map(|topic| topic.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationConfig {
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
    #[serde(default = "default_focus_delay", with = "humantime_serde")]
    pub focus_delay: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::default(),
            focus_delay: default_focus_delay(),
        }
    }
}

fn default_focus_delay() -> Duration {
    Duration::from_millis(30)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("hn-station").join("hn-station.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if other.api.page_size != 0 {
        base.api.page_size = other.api.page_size;
    }
    base.api.timeout = other.api.timeout;

    if !other.ui.topics.is_empty() {
        base.ui.topics = other.ui.topics;
    }
    base.ui.default_sort = other.ui.default_sort;

    base.navigation = other.navigation;

    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }
    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }

    base
}

// Environment values are applied on top of the file, one key at a time, so
// an unset variable never resets a value the file provided.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    cfg.api.page_size = parsed;
                }
            }
        }
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "ui.topics" => {
            cfg.ui.topics = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "ui.default_sort" => {
            if let Some(sort) = SortMode::parse(&value) {
                cfg.ui.default_sort = sort;
            }
        }
        "navigation.orphan_policy" => {
            if let Some(policy) = OrphanPolicy::parse(&value) {
                cfg.navigation.orphan_policy = policy;
            }
        }
        "navigation.focus_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.navigation.focus_delay = duration;
            }
        }
        "log.level" => cfg.log.level = value,
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hn-station").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated() -> LoadOptions {
        LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/hn-station.yaml")),
            env_prefix: Some("HN_STATION_TEST_DEFAULTS".into()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated()).unwrap();
        assert_eq!(cfg.ui.default_sort, SortMode::Default);
        assert_eq!(cfg.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.api.page_size, 50);
        assert_eq!(cfg.navigation.orphan_policy, OrphanPolicy::Root);
        assert_eq!(cfg.navigation.focus_delay, Duration::from_millis(30));
        assert_eq!(cfg.ui.topics.len(), 7);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: https://hnstation.dev\n  timeout: 5s\nui:\n  topics: [Rust]\n  default_sort: votes\nnavigation:\n  orphan_policy: reject\n  focus_delay: 10ms\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("HN_STATION_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://hnstation.dev");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.api.page_size, 50);
        assert_eq!(cfg.ui.topics, vec!["Rust".to_string()]);
        assert_eq!(cfg.ui.default_sort, SortMode::Votes);
        assert_eq!(cfg.navigation.orphan_policy, OrphanPolicy::Reject);
        assert_eq!(cfg.navigation.focus_delay, Duration::from_millis(10));
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api: [not, a, map").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("HN_STATION_TEST_BROKEN".into()),
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        env::set_var("HN_STATION_TEST_ENV_API__PAGE_SIZE", "25");
        env::set_var("HN_STATION_TEST_ENV_NAVIGATION__ORPHAN_POLICY", "drop");
        env::set_var("HN_STATION_TEST_ENV_UI__TOPICS", "Rust, Go ,");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/hn-station.yaml")),
            env_prefix: Some("HN_STATION_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.page_size, 25);
        assert_eq!(cfg.navigation.orphan_policy, OrphanPolicy::Drop);
        assert_eq!(cfg.ui.topics, vec!["Rust".to_string(), "Go".to_string()]);
        env::remove_var("HN_STATION_TEST_ENV_API__PAGE_SIZE");
        env::remove_var("HN_STATION_TEST_ENV_NAVIGATION__ORPHAN_POLICY");
        env::remove_var("HN_STATION_TEST_ENV_UI__TOPICS");
    }
}
