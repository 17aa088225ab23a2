use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubefan",
    version,
    about = "Run one kubectl or flux command across many cluster contexts at once."
)]
pub struct CliArgs {
    /// Command tokens to run against each cluster (for example: get pods -A)
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Target clusters by context name (comma-separated or repeated);
    /// defaults to every authenticated cluster
    #[arg(short, long, value_delimiter = ',')]
    pub clusters: Vec<String>,

    /// External tool to invoke (kubectl or flux)
    #[arg(short, long, default_value = "kubectl")]
    pub tool: String,

    /// Maximum number of simultaneously running subprocesses
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Per-cluster command timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Disable the destructive-command guard for this run
    #[arg(long)]
    pub no_guard: bool,

    /// Skip the authentication probe and target all known contexts
    #[arg(long)]
    pub skip_auth_check: bool,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub output: String,

    /// Settings file path (otherwise discovered)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
