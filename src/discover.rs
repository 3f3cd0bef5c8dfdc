//! Locating inputs and naming outputs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions (lower-case, no dot) treated as xlog inputs.
pub const CANDIDATE_EXTENSIONS: [&str; 2] = ["xlog", "mmap3"];

/// Suffix appended to the input stem to name the decoded log.
pub const OUTPUT_SUFFIX: &str = "_.log";

pub fn is_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CANDIDATE_EXTENSIONS.iter().any(|c| e.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

/// `dir/name.xlog` → `dir/name_.log`.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
}

/// Every candidate file under `root`, recursively, in sorted order.
pub fn collect_candidates(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let kind = entry.file_type()?;
            if kind.is_dir() {
                pending.push(path);
            } else if kind.is_file() && is_candidate(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_by_extension() {
        assert!(is_candidate(Path::new("a/b/app.xlog")));
        assert!(is_candidate(Path::new("app.MMAP3")));
        assert!(!is_candidate(Path::new("app_.log")));
        assert!(!is_candidate(Path::new("xlog")));
    }

    #[test]
    fn output_sits_next_to_input() {
        assert_eq!(output_path(Path::new("logs/app_20240101.xlog")), PathBuf::from("logs/app_20240101_.log"));
        assert_eq!(output_path(Path::new("cache.mmap3")), PathBuf::from("cache_.log"));
    }
}
