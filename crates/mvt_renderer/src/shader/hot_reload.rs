//! Shader source watching
//!
//! The main loop polls once per iteration; a newer modification time than the
//! last one seen reports a change exactly once.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Polls a file's modification time
#[derive(Debug)]
pub struct ShaderWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ShaderWatcher {
    /// Start watching `path`, taking its current modification time as the baseline
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path);
        if last_modified.is_none() {
            log::warn!("[SHADER] Watched shader {:?} does not exist yet", path);
        }
        Self { path, last_modified }
    }

    /// Watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once for every modification newer than the last one seen
    pub fn poll(&mut self) -> bool {
        let Some(modified) = modified_time(&self.path) else {
            return false;
        };

        let changed = self.last_modified.map_or(true, |last| modified > last);
        if changed {
            log::info!("[SHADER] {:?} changed", self.path);
            self.last_modified = Some(modified);
        }
        changed
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, offset_secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(offset_secs)).unwrap();
    }

    #[test]
    fn test_unchanged_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.glsl");
        std::fs::write(&path, "#version 450\n").unwrap();

        let mut watcher = ShaderWatcher::new(&path);
        assert!(!watcher.poll());
        assert!(!watcher.poll());
    }

    #[test]
    fn test_newer_modification_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.glsl");
        std::fs::write(&path, "#version 450\n").unwrap();

        let mut watcher = ShaderWatcher::new(&path);
        touch(&path, 10);
        assert!(watcher.poll());
        assert!(!watcher.poll());

        touch(&path, 20);
        assert!(watcher.poll());
    }

    #[test]
    fn test_file_appearing_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.glsl");

        let mut watcher = ShaderWatcher::new(&path);
        assert!(!watcher.poll());

        std::fs::write(&path, "#version 450\n").unwrap();
        assert!(watcher.poll());
        assert_eq!(watcher.path(), path.as_path());
    }
}
