//! Device path discovery from configuration glob patterns.

use std::path::{Path, PathBuf};

use glob::glob;

const DEVICE_DIR: &str = "/dev";

/// Expand glob patterns to device file paths.
///
/// Symlinks are followed (so `/dev/disk/by-label/...` patterns resolve to
/// the real device node). Directories and anything that does not resolve to
/// a file directly under `/dev` are skipped with a warning.
pub fn find_device_paths(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let entries = match glob(pattern) {
            Ok(entries) => entries,
            Err(error) => {
                log::warn!("bad disk pattern \"{pattern}\": {error}");
                continue;
            }
        };
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(error) => {
                    log::warn!("cannot read path from pattern \"{pattern}\": {error}");
                    continue;
                }
            };
            let path = path.canonicalize().unwrap_or(path);
            if path.is_dir() {
                continue;
            }
            if path.parent() != Some(Path::new(DEVICE_DIR)) {
                log::warn!(
                    "device file \"{}\" is outside {DEVICE_DIR}, skipping",
                    path.display()
                );
                continue;
            }
            paths.push(path);
        }
    }
    paths
}
