use crate::config::Settings;
use crate::model::{ClusterResult, ExecutionRequest, ExecutionSession};
use crate::tool;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

pub const BLOCKED_TOKENS: [&str; 3] = ["delete", "rm", "remove"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("command is empty")]
    EmptyCommand,
    #[error("no target clusters")]
    NoTargetClusters,
    #[error("command blocked by destructive-command guard (token '{0}')")]
    DestructiveCommandBlocked(String),
}

// Whole-token match only: `deleted-resource-name` passes, `DELETE` does not.
pub fn blocked_token(command: &str) -> Option<&'static str> {
    command.split_whitespace().find_map(|token| {
        BLOCKED_TOKENS
            .iter()
            .copied()
            .find(|blocked| token.eq_ignore_ascii_case(blocked))
    })
}

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    ClusterFinished(ClusterResult),
    SessionFinished(ExecutionSession),
}

pub struct ExecutionHandle {
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
    cancel: Arc<watch::Sender<bool>>,
}

// Detached cancellation trigger, usable from a signal handler task while the
// handle itself is being polled for events.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

impl ExecutionHandle {
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: self.cancel.clone(),
        }
    }

    pub async fn wait(mut self) -> Option<ExecutionSession> {
        while let Some(event) = self.events.recv().await {
            if let ExecutionEvent::SessionFinished(session) = event {
                return Some(session);
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    settings: Settings,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // Pre-flight failures reject the whole batch before anything is spawned.
    // After that the caller gets a handle streaming one terminal result per
    // target cluster, then the finalized session.
    pub fn dispatch(&self, request: ExecutionRequest) -> Result<ExecutionHandle, DispatchError> {
        if request.command.trim().is_empty() {
            return Err(DispatchError::EmptyCommand);
        }
        if request.clusters.is_empty() {
            return Err(DispatchError::NoTargetClusters);
        }
        if self.settings.destructive_guard
            && let Some(token) = blocked_token(&request.command)
        {
            return Err(DispatchError::DestructiveCommandBlocked(token.to_string()));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel::<ExecutionEvent>();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ClusterResult>();

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let tool_path =
            tool::resolve_tool_path(request.tool, self.settings.tool_override(request.tool));
        let tokens = request.command_tokens();
        let limit = self.settings.command_timeout;

        debug!(
            tool = %tool_path.display(),
            clusters = request.clusters.len(),
            "dispatching batch"
        );

        for cluster in request.clusters.clone() {
            tokio::spawn(run_cluster(
                cluster,
                request.command.clone(),
                tokens.clone(),
                tool_path.clone(),
                limit,
                semaphore.clone(),
                cancel_rx.clone(),
                result_tx.clone(),
            ));
        }
        drop(result_tx);

        let mut session = ExecutionSession::new(request);
        let collector_cancel = cancel_rx;
        tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                debug!(cluster = %result.cluster, status = %result.status, "cluster finished");
                session.record(result.clone());
                let _ = event_tx.send(ExecutionEvent::ClusterFinished(result));
            }
            session.finalize(*collector_cancel.borrow());
            let _ = event_tx.send(ExecutionEvent::SessionFinished(session));
        });

        Ok(ExecutionHandle {
            events: event_rx,
            cancel: Arc::new(cancel_tx),
        })
    }
}

// Resolves on explicit cancellation or when the handle is dropped; in both
// cases nobody is waiting for further results.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

#[allow(clippy::too_many_arguments)]
async fn run_cluster(
    cluster: String,
    command: String,
    tokens: Vec<String>,
    tool_path: PathBuf,
    limit: Duration,
    semaphore: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
    results: mpsc::UnboundedSender<ClusterResult>,
) {
    // Queued-but-not-started dispatches are dropped on cancellation and
    // produce no result.
    let _permit = tokio::select! {
        _ = wait_cancelled(cancel.clone()) => return,
        acquired = semaphore.acquire_owned() => match acquired {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    // kill_on_drop terminates the child when cancellation wins the race.
    let result = tokio::select! {
        _ = wait_cancelled(cancel.clone()) => None,
        result = execute_once(&cluster, &command, &tokens, &tool_path, limit) => Some(result),
    };

    if let Some(result) = result {
        let _ = results.send(result);
    }
}

async fn execute_once(
    cluster: &str,
    command: &str,
    tokens: &[String],
    tool_path: &Path,
    limit: Duration,
) -> ClusterResult {
    let mut result = ClusterResult::running(cluster, command);
    let started = Instant::now();

    let mut cmd = TokioCommand::new(tool_path);
    cmd.arg("--context")
        .arg(cluster)
        .args(tokens)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!("failed to spawn {} for {cluster}: {error}", tool_path.display());
            result.mark_spawn_failed(
                format!("failed to spawn {}: {error}", tool_path.display()),
                started.elapsed(),
            );
            return result;
        }
    };

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            result.mark_exited(
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                started.elapsed(),
            );
        }
        Ok(Err(error)) => {
            result.mark_spawn_failed(
                format!("failed waiting for {}: {error}", tool_path.display()),
                started.elapsed(),
            );
        }
        Err(_) => {
            warn!("{} timed out for {cluster} after {limit:?}", tool_path.display());
            result.mark_timed_out(limit, started.elapsed());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::blocked_token;

    #[test]
    fn guard_matches_whole_tokens_case_insensitively() {
        assert_eq!(blocked_token("delete pods"), Some("delete"));
        assert_eq!(blocked_token("DELETE pods"), Some("delete"));
        assert_eq!(blocked_token("get pods && rm notes"), Some("rm"));
        assert_eq!(blocked_token("Remove finalizers"), Some("remove"));
    }

    #[test]
    fn guard_ignores_substrings_and_clean_commands() {
        assert_eq!(blocked_token("get deleted-resource-name"), None);
        assert_eq!(blocked_token("describe deployment rmq"), None);
        assert_eq!(blocked_token("get pods -A"), None);
        assert_eq!(blocked_token(""), None);
    }
}
