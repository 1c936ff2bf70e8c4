// Upload program discovery

use std::path::{Path, PathBuf};
use std::process::Command;

pub struct ToolManager {
    extra_dirs: Vec<PathBuf>,
}

impl ToolManager {
    pub fn new() -> Self {
        let mut extra_dirs = Vec::new();
        if let Some(home) = dirs::home_dir() {
            extra_dirs.push(home.join(".local").join("bin"));
            extra_dirs.push(home.join(".cargo").join("bin"));
        }
        Self { extra_dirs }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.insert(0, dir.into());
        self
    }

    /// Absolute path of `program`, if installed
    pub fn locate(&self, program: &str) -> Option<String> {
        // Explicit paths are taken as-is
        if program.contains(std::path::MAIN_SEPARATOR) {
            return Path::new(program).is_file().then(|| program.to_string());
        }

        // 1. User dirs, then the usual system prefixes
        let common_dirs = [
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/usr/bin"),
        ];
        for dir in self.extra_dirs.iter().chain(common_dirs.iter()) {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().to_string());
            }
        }

        // 2. Whatever PATH resolves
        let output = Command::new("which").arg(program).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!path.is_empty()).then_some(path)
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
