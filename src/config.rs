use crate::model::CommandTool;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: Option<String>,
    pub max_concurrency: usize,
    pub command_timeout: Duration,
    pub destructive_guard: bool,
    pub auth_probe_timeout: Duration,
    pub auth_poll_interval: Duration,
    pub kubectl_path: Option<PathBuf>,
    pub flux_path: Option<PathBuf>,
    pub login_urls: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            max_concurrency: default_max_concurrency(),
            command_timeout: Duration::from_secs(default_command_timeout_secs()),
            destructive_guard: default_destructive_guard(),
            auth_probe_timeout: Duration::from_secs(default_auth_probe_timeout_secs()),
            auth_poll_interval: Duration::from_secs(default_auth_poll_interval_secs()),
            kubectl_path: None,
            flux_path: None,
            login_urls: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SettingsFile {
    #[serde(default = "default_max_concurrency", alias = "concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_command_timeout_secs", alias = "timeout_secs")]
    command_timeout_secs: u64,
    #[serde(default = "default_destructive_guard", alias = "guard")]
    destructive_guard: bool,
    #[serde(default = "default_auth_probe_timeout_secs")]
    auth_probe_timeout_secs: u64,
    #[serde(default = "default_auth_poll_interval_secs")]
    auth_poll_interval_secs: u64,
    #[serde(default)]
    kubectl_path: Option<PathBuf>,
    #[serde(default)]
    flux_path: Option<PathBuf>,
    #[serde(default)]
    login_urls: BTreeMap<String, String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let Some(path) = discover_config_path() else {
            return Ok(Self::default());
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let parsed: SettingsFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        Ok(Self::from_parsed(parsed, Some(path.display().to_string())))
    }

    fn from_parsed(file: SettingsFile, source: Option<String>) -> Self {
        Self {
            source,
            max_concurrency: file.max_concurrency.max(1),
            command_timeout: Duration::from_secs(file.command_timeout_secs.max(1)),
            destructive_guard: file.destructive_guard,
            auth_probe_timeout: Duration::from_secs(file.auth_probe_timeout_secs.max(1)),
            auth_poll_interval: Duration::from_secs(file.auth_poll_interval_secs.max(1)),
            kubectl_path: file.kubectl_path,
            flux_path: file.flux_path,
            login_urls: file.login_urls,
        }
    }

    pub fn tool_override(&self, tool: CommandTool) -> Option<&Path> {
        match tool {
            CommandTool::Kubectl => self.kubectl_path.as_deref(),
            CommandTool::Flux => self.flux_path.as_deref(),
        }
    }
}

fn default_max_concurrency() -> usize {
    10
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_destructive_guard() -> bool {
    true
}

fn default_auth_probe_timeout_secs() -> u64 {
    10
}

fn default_auth_poll_interval_secs() -> u64 {
    60
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBEFAN_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("kubefan.yaml"),
        PathBuf::from("kubefan.yml"),
        PathBuf::from(".kubefan.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kubefan/config.yaml"),
            PathBuf::from(&home).join(".config/kubefan/config.yml"),
            PathBuf::from(&home).join(".kubefan.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{Settings, SettingsFile};
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrency, 10);
        assert_eq!(settings.command_timeout, Duration::from_secs(30));
        assert!(settings.destructive_guard);
    }

    #[test]
    fn yaml_overrides_are_applied() {
        let parsed: SettingsFile = serde_yaml::from_str(
            "max_concurrency: 4\ncommand_timeout_secs: 5\ndestructive_guard: false\nkubectl_path: /opt/tools/kubectl\nlogin_urls:\n  prod: https://login.example.com/prod\n",
        )
        .expect("settings yaml should parse");
        let settings = Settings::from_parsed(parsed, None);

        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.command_timeout, Duration::from_secs(5));
        assert!(!settings.destructive_guard);
        assert_eq!(
            settings.kubectl_path.as_deref(),
            Some(std::path::Path::new("/opt/tools/kubectl"))
        );
        assert_eq!(
            settings.login_urls.get("prod").map(String::as_str),
            Some("https://login.example.com/prod")
        );
    }

    #[test]
    fn concurrency_floor_is_one() {
        let parsed: SettingsFile =
            serde_yaml::from_str("max_concurrency: 0").expect("settings yaml should parse");
        let settings = Settings::from_parsed(parsed, None);
        assert_eq!(settings.max_concurrency, 1);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let parsed: SettingsFile = serde_yaml::from_str("{}").expect("settings yaml should parse");
        let settings = Settings::from_parsed(parsed, None);
        assert_eq!(settings.max_concurrency, 10);
        assert!(settings.destructive_guard);
    }
}
