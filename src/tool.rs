use crate::model::CommandTool;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const KUBECTL_CANDIDATES: [&str; 3] = [
    "/opt/homebrew/bin/kubectl",
    "/usr/local/bin/kubectl",
    "/usr/bin/kubectl",
];

const FLUX_CANDIDATES: [&str; 3] = [
    "/opt/homebrew/bin/flux",
    "/usr/local/bin/flux",
    "/usr/bin/flux",
];

fn candidates(tool: CommandTool) -> &'static [&'static str] {
    match tool {
        CommandTool::Kubectl => &KUBECTL_CANDIDATES,
        CommandTool::Flux => &FLUX_CANDIDATES,
    }
}

// Resolution order: explicit settings override, fixed install locations,
// PATH lookup. The final fallback is returned even when it does not exist;
// the spawn failure is then captured as that cluster's failed result.
pub fn resolve_tool_path(tool: CommandTool, override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    for candidate in candidates(tool) {
        let candidate = Path::new(candidate);
        if candidate.is_file() {
            return candidate.to_path_buf();
        }
    }

    if let Some(path_var) = env::var_os("PATH")
        && let Some(found) = search_path_var(tool.title(), &path_var)
    {
        return found;
    }

    PathBuf::from(candidates(tool)[0])
}

fn search_path_var(binary: &str, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
