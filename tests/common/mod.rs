use kubefan::Settings;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[allow(dead_code)]
pub fn write_stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write stub tool");
    let mut perms = fs::metadata(&path).expect("stub tool metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub tool");
    path
}

#[allow(dead_code)]
pub fn stub_settings(tool_path: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.kubectl_path = Some(tool_path.to_path_buf());
    settings.flux_path = Some(tool_path.to_path_buf());
    settings
}
