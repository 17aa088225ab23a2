use crate::config::Settings;
use crate::model::{Cluster, CommandTool};
use crate::tool;
use anyhow::{Context, Result};
use chrono::Local;
use futures::future::join_all;
use kube::config::Kubeconfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ClusterDirectory {
    clusters: Vec<Cluster>,
    kubectl_path: PathBuf,
    probe_timeout: Duration,
}

impl ClusterDirectory {
    pub fn discover(settings: &Settings) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().context("failed to read kubeconfig")?;
        Ok(Self::from_kubeconfig(&kubeconfig, settings))
    }

    pub fn from_kubeconfig(kubeconfig: &Kubeconfig, settings: &Settings) -> Self {
        let mut names = kubeconfig
            .contexts
            .iter()
            .map(|context| context.name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();

        Self {
            clusters: names.into_iter().map(Cluster::unknown).collect(),
            kubectl_path: tool::resolve_tool_path(
                CommandTool::Kubectl,
                settings.tool_override(CommandTool::Kubectl),
            ),
            probe_timeout: settings.auth_probe_timeout,
        }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn authenticated(&self) -> Vec<String> {
        self.clusters
            .iter()
            .filter(|cluster| cluster.authenticated)
            .map(|cluster| cluster.name.clone())
            .collect()
    }

    pub fn is_authenticated(&self, name: &str) -> bool {
        self.clusters
            .iter()
            .any(|cluster| cluster.name == name && cluster.authenticated)
    }

    // Probes every context concurrently and replaces the cluster list
    // wholesale with the fresh snapshot.
    pub async fn refresh_auth(&mut self) {
        let probes = self.clusters.iter().map(|cluster| {
            let kubectl = self.kubectl_path.clone();
            let name = cluster.name.clone();
            let limit = self.probe_timeout;
            async move {
                let authenticated = probe_auth(&kubectl, &name, limit).await;
                Cluster {
                    name,
                    authenticated,
                    last_checked: Some(Local::now()),
                }
            }
        });

        self.clusters = join_all(probes).await;
    }
}

// `kubectl auth can-i` exits zero only when the call both reaches the
// cluster and is allowed; denied, unreachable, and timed-out probes all
// read as unauthenticated.
async fn probe_auth(kubectl: &Path, context: &str, limit: Duration) -> bool {
    let mut cmd = TokioCommand::new(kubectl);
    cmd.arg("auth")
        .arg("can-i")
        .arg("get")
        .arg("pods")
        .arg("--context")
        .arg(context)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!("auth probe spawn failed for {context}: {error}");
            return false;
        }
    };

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output.status.success(),
        Ok(Err(error)) => {
            warn!("auth probe failed for {context}: {error}");
            false
        }
        Err(_) => {
            debug!("auth probe timed out for {context} after {limit:?}");
            false
        }
    }
}

pub fn spawn_auth_poller(
    directory: Arc<RwLock<ClusterDirectory>>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut directory = directory.write().await;
            directory.refresh_auth().await;
            debug!(
                authenticated = directory.authenticated().len(),
                total = directory.clusters().len(),
                "auth refresh complete"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::ClusterDirectory;
    use crate::config::Settings;
    use kube::config::Kubeconfig;

    fn kubeconfig_with_contexts(names: &[&str]) -> Kubeconfig {
        let contexts = names
            .iter()
            .map(|name| format!("  - name: {name}\n    context:\n      cluster: {name}\n      user: admin\n"))
            .collect::<String>();
        let raw = format!(
            "apiVersion: v1\nkind: Config\nclusters: []\nusers: []\ncontexts:\n{contexts}"
        );
        serde_yaml::from_str(&raw).expect("kubeconfig yaml should parse")
    }

    #[test]
    fn contexts_become_unauthenticated_clusters() {
        let kubeconfig = kubeconfig_with_contexts(&["prod", "dev"]);
        let directory = ClusterDirectory::from_kubeconfig(&kubeconfig, &Settings::default());

        let names = directory
            .clusters()
            .iter()
            .map(|cluster| cluster.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["dev", "prod"]);
        assert!(directory.authenticated().is_empty());
        assert!(directory.clusters().iter().all(|c| c.last_checked.is_none()));
    }

    #[test]
    fn duplicate_context_names_collapse() {
        let kubeconfig = kubeconfig_with_contexts(&["prod", "prod"]);
        let directory = ClusterDirectory::from_kubeconfig(&kubeconfig, &Settings::default());
        assert_eq!(directory.clusters().len(), 1);
    }
}
