use crate::config::Settings;
use crate::model::Cluster;

// Priority-ordered replacement for the call-time "whichever optional setting
// happens to be set" action derivation: evaluated once per cluster, the
// first matching rule wins.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClusterAction {
    RunCommand(String),
    OpenTerminal,
    OpenLoginUrl(String),
    None,
}

#[derive(Debug, Clone, Default)]
pub struct ActionPrefs {
    pub default_command: Option<String>,
    pub open_terminal: bool,
    pub login_url: Option<String>,
}

impl ActionPrefs {
    pub fn for_cluster(settings: &Settings, cluster: &str) -> Self {
        Self {
            default_command: None,
            open_terminal: true,
            login_url: settings.login_urls.get(cluster).cloned(),
        }
    }
}

pub fn resolve_action(cluster: &Cluster, prefs: &ActionPrefs) -> ClusterAction {
    if cluster.authenticated {
        if let Some(command) = prefs.default_command.as_deref()
            && !command.trim().is_empty()
        {
            return ClusterAction::RunCommand(command.to_string());
        }
        if prefs.open_terminal {
            return ClusterAction::OpenTerminal;
        }
        return ClusterAction::None;
    }

    match prefs.login_url.as_deref() {
        Some(url) if !url.trim().is_empty() => ClusterAction::OpenLoginUrl(url.to_string()),
        _ => ClusterAction::None,
    }
}
