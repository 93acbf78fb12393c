#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use fs2::FileExt;

/// Exclusive flock held for the lifetime of the guard.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl LockGuard {
    /// Locks `<dir>/<name>.lock`, creating the directory if needed.
    pub fn try_acquire_in(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{}.lock", sanitize_name(name)));
        ensure_dir(dir)?;
        let file = open_lockfile(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                bail!("another addon run holds lock: {}", path.display())
            }
            Err(e) => Err(e).with_context(|| format!("flock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(dir)
            .with_context(|| format!("create lock dir {}", dir.display()))
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir).with_context(|| format!("create lock dir {}", dir.display()))
    }
}

fn open_lockfile(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        opts.mode(0o644);
    }
    opts.open(path)
        .with_context(|| format!("open lockfile {}", path.display()))
}

fn sanitize_name(s: &str) -> String {
    let filtered: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if filtered.is_empty() {
        "lock_".to_string()
    } else {
        format!("lock_{filtered}")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn acquire_conflict_release() {
        let tmp = TempDir::new().unwrap();
        let g1 = LockGuard::try_acquire_in(tmp.path(), "docker-addon").expect("first acquire ok");
        assert!(g1.path().ends_with("lock_docker-addon.lock"));

        let err = LockGuard::try_acquire_in(tmp.path(), "docker-addon")
            .unwrap_err()
            .to_string();
        assert!(err.contains("another addon run holds lock"), "err was: {err}");

        drop(g1);
        let _g2 = LockGuard::try_acquire_in(tmp.path(), "docker-addon").expect("re-acquire ok");
    }

    #[test]
    fn creates_missing_lock_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/run");
        let _g = LockGuard::try_acquire_in(&dir, "x").expect("acquire");
        assert!(dir.is_dir());
    }

    #[test]
    fn sanitize_always_prefix() {
        assert_eq!(sanitize_name(".foo"), "lock_foo");
        assert_eq!(sanitize_name("../x"), "lock_x");
        assert_eq!(sanitize_name(".."), "lock_");
    }
}
