use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTool {
    Kubectl,
    Flux,
}

impl CommandTool {
    pub const ALL: [Self; 2] = [Self::Kubectl, Self::Flux];

    pub fn title(self) -> &'static str {
        match self {
            Self::Kubectl => "kubectl",
            Self::Flux => "flux",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "kubectl" | "k" | "kube" => Some(Self::Kubectl),
            "flux" => Some(Self::Flux),
            _ => None,
        }
    }
}

impl Display for CommandTool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub authenticated: bool,
    pub last_checked: Option<DateTime<Local>>,
}

impl Cluster {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated: false,
            last_checked: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub command: String,
    pub tool: CommandTool,
    pub clusters: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>, tool: CommandTool, clusters: Vec<String>) -> Self {
        let mut seen = Vec::<String>::new();
        for cluster in clusters {
            if !seen.contains(&cluster) {
                seen.push(cluster);
            }
        }

        Self {
            command: command.into(),
            tool,
            clusters: seen,
        }
    }

    pub fn command_tokens(&self) -> Vec<String> {
        self.command
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    Running,
    Success,
    Failed,
    TimedOut,
}

impl ResultStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        }
    }
}

impl Display for ResultStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterResult {
    pub cluster: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub status: ResultStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ClusterResult {
    pub fn running(cluster: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            command: command.into(),
            stdout: String::new(),
            stderr: String::new(),
            status: ResultStatus::Running,
            exit_code: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn mark_exited(
        &mut self,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) {
        if self.status.is_terminal() {
            return;
        }

        self.stdout = stdout;
        self.stderr = stderr;
        self.exit_code = exit_code;
        self.duration = duration;
        if exit_code == Some(0) {
            self.status = ResultStatus::Success;
        } else {
            self.status = ResultStatus::Failed;
            self.error = Some(match exit_code {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            });
        }
    }

    pub fn mark_spawn_failed(&mut self, error: String, duration: Duration) {
        if self.status.is_terminal() {
            return;
        }

        self.status = ResultStatus::Failed;
        self.error = Some(error);
        self.duration = duration;
    }

    pub fn mark_timed_out(&mut self, limit: Duration, duration: Duration) {
        if self.status.is_terminal() {
            return;
        }

        self.status = ResultStatus::TimedOut;
        self.error = Some(format!("timed out after {limit:?}"));
        self.duration = duration;
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn title(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSession {
    pub request: ExecutionRequest,
    pub results: Vec<ClusterResult>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub status: SessionStatus,
}

impl ExecutionSession {
    pub fn new(request: ExecutionRequest) -> Self {
        Self {
            request,
            results: Vec::new(),
            started_at: Local::now(),
            finished_at: None,
            status: SessionStatus::Running,
        }
    }

    pub fn record(&mut self, result: ClusterResult) {
        self.results.push(result);
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == ResultStatus::Success)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.request.clusters.len()
            && self.results.iter().all(|result| result.status.is_terminal())
    }

    // End time and terminal status are stamped exactly once. A cancellation
    // that lost the race against natural completion leaves the session
    // completed/failed, not cancelled.
    pub fn finalize(&mut self, cancel_requested: bool) {
        if self.finished_at.is_some() {
            return;
        }

        self.finished_at = Some(Local::now());
        self.status = if cancel_requested && !self.is_complete() {
            SessionStatus::Cancelled
        } else if self.succeeded() > 0 {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
    }

    pub fn sorted_results(&self) -> Vec<&ClusterResult> {
        let mut results = self.results.iter().collect::<Vec<_>>();
        results.sort_by(|left, right| left.cluster.cmp(&right.cluster));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterResult, CommandTool, ExecutionRequest, ExecutionSession, ResultStatus, SessionStatus,
    };
    use std::time::Duration;

    fn request(clusters: &[&str]) -> ExecutionRequest {
        ExecutionRequest::new(
            "get pods",
            CommandTool::Kubectl,
            clusters.iter().map(|name| name.to_string()).collect(),
        )
    }

    fn terminal_result(cluster: &str, exit_code: i32) -> ClusterResult {
        let mut result = ClusterResult::running(cluster, "get pods");
        result.mark_exited(
            Some(exit_code),
            String::new(),
            String::new(),
            Duration::from_millis(5),
        );
        result
    }

    #[test]
    fn tool_tokens_map_to_expected_tools() {
        assert_eq!(
            CommandTool::from_token("kubectl"),
            Some(CommandTool::Kubectl)
        );
        assert_eq!(CommandTool::from_token("K"), Some(CommandTool::Kubectl));
        assert_eq!(CommandTool::from_token("Flux"), Some(CommandTool::Flux));
        assert_eq!(CommandTool::from_token("helm"), None);
    }

    #[test]
    fn request_deduplicates_target_clusters() {
        let request = request(&["a", "b", "a"]);
        assert_eq!(request.clusters, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn partial_success_finalizes_completed() {
        let mut session = ExecutionSession::new(request(&["a", "b"]));
        session.record(terminal_result("a", 0));
        session.record(terminal_result("b", 1));
        session.finalize(false);

        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.finished_at.is_some());
    }

    #[test]
    fn zero_successes_finalizes_failed() {
        let mut session = ExecutionSession::new(request(&["a", "b"]));
        session.record(terminal_result("a", 1));
        session.record(terminal_result("b", 2));
        session.finalize(false);

        assert_eq!(session.status, SessionStatus::Failed);
    }

    #[test]
    fn cancel_with_missing_results_finalizes_cancelled() {
        let mut session = ExecutionSession::new(request(&["a", "b", "c"]));
        session.record(terminal_result("a", 0));
        session.finalize(true);

        assert_eq!(session.status, SessionStatus::Cancelled);
    }

    #[test]
    fn cancel_after_natural_completion_keeps_completed() {
        let mut session = ExecutionSession::new(request(&["a"]));
        session.record(terminal_result("a", 0));
        session.finalize(true);

        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut session = ExecutionSession::new(request(&["a"]));
        session.record(terminal_result("a", 0));
        session.finalize(false);
        let stamped = session.finished_at;

        session.finalize(true);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.finished_at, stamped);
    }

    #[test]
    fn terminal_result_status_is_not_overwritten() {
        let mut result = ClusterResult::running("a", "get pods");
        result.mark_timed_out(Duration::from_secs(30), Duration::from_secs(30));
        result.mark_exited(
            Some(0),
            "late".to_string(),
            String::new(),
            Duration::from_secs(31),
        );

        assert_eq!(result.status, ResultStatus::TimedOut);
        assert!(result.stdout.is_empty());
    }
}
