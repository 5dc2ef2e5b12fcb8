//! Source scanning for the layering contract.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One offending source line.
pub struct Hit {
    pub file: String,
    pub line: usize,
    pub text: String,
}

impl fmt::Debug for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.text.trim())
    }
}

fn root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn display_path(path: &Path) -> String {
    path.strip_prefix(root())
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Every `.rs` file below `dir`, sorted.
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let mut pending = vec![root().join(dir)];
    let mut files = Vec::new();
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .unwrap_or_else(|e| panic!("failed to read dir {}: {e}", dir.display()));
        for entry in entries {
            let path = entry
                .unwrap_or_else(|e| panic!("failed to read dir entry: {e}"))
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn source_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Code lines under `dir` mentioning any of `patterns`. Comment lines are
/// ignored, as are files listed in `exempt`.
pub fn scan(dir: &str, patterns: &[&str], exempt: &[&str]) -> Vec<Hit> {
    let mut hits = Vec::new();
    for path in rust_sources(dir) {
        let file = display_path(&path);
        if exempt.contains(&file.as_str()) {
            continue;
        }
        for (idx, text) in source_lines(&path).into_iter().enumerate() {
            if text.trim_start().starts_with("//") {
                continue;
            }
            if patterns.iter().any(|p| text.contains(p)) {
                hits.push(Hit {
                    file: file.clone(),
                    line: idx + 1,
                    text,
                });
            }
        }
    }
    hits
}

/// Lines in `mod.rs` files that are neither module declarations, cfg
/// attributes nor comments.
pub fn mod_rs_violations(dir: &str) -> Vec<Hit> {
    let allowed = ["//", "pub mod ", "mod ", "#[cfg"];
    let mut hits = Vec::new();
    for path in rust_sources(dir) {
        if path.file_name().and_then(|s| s.to_str()) != Some("mod.rs") {
            continue;
        }
        let file = display_path(&path);
        for (idx, text) in source_lines(&path).into_iter().enumerate() {
            let trimmed = text.trim();
            if trimmed.is_empty() || allowed.iter().any(|p| trimmed.starts_with(p)) {
                continue;
            }
            hits.push(Hit {
                file: file.clone(),
                line: idx + 1,
                text,
            });
        }
    }
    hits
}

pub fn read(relative: &str) -> String {
    fs::read_to_string(root().join(relative))
        .unwrap_or_else(|e| panic!("failed to read {relative}: {e}"))
}

pub fn exists(relative: &str) -> bool {
    root().join(relative).exists()
}
