use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use anyhow::{Context, Result};
use tracing as log;

use crate::utils::exec_policy;

/// File access for the target system. Mutations are skipped in dry-run.
pub trait FsPort: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn append(&self, path: &Path, content: &str) -> Result<()>;
    fn ensure_dir(&self, dir: &Path) -> Result<()>;
    /// Copies `src` to `dst`, keeping permissions and mtime.
    fn copy(&self, src: &Path, dst: &Path) -> Result<()>;
}

#[derive(Default)]
pub struct FsLocal;

impl FsLocal {
    pub fn new() -> Self {
        Self
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    Ok(())
}

impl FsPort for FsLocal {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        if exec_policy::is_dry_run() {
            log::info!("[DRY-RUN] write {}: {}", path.display(), content.trim_end());
            return Ok(());
        }
        ensure_parent(path)?;
        fs::write(path, content).with_context(|| format!("write {}", path.display()))
    }

    fn append(&self, path: &Path, content: &str) -> Result<()> {
        if exec_policy::is_dry_run() {
            log::info!("[DRY-RUN] append {}: {}", path.display(), content.trim_end());
            return Ok(());
        }
        ensure_parent(path)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {} for append", path.display()))?;
        f.write_all(content.as_bytes())
            .with_context(|| format!("append {}", path.display()))
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if exec_policy::is_dry_run() {
            log::info!("[DRY-RUN] mkdir -p {}", dir.display());
            return Ok(());
        }
        fs::create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        if exec_policy::is_dry_run() {
            log::info!("[DRY-RUN] cp {} {}", src.display(), dst.display());
            return Ok(());
        }
        fs::copy(src, dst)
            .with_context(|| format!("cp {} {}", src.display(), dst.display()))?;
        let mtime = fs::metadata(src)
            .and_then(|m| m.modified())
            .with_context(|| format!("stat {}", src.display()))?;
        fs::File::options()
            .write(true)
            .open(dst)
            .and_then(|f| f.set_modified(mtime))
            .with_context(|| format!("set mtime on {}", dst.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn write_append_copy() {
        let tmp = TempDir::new().unwrap();
        let fs_port = FsLocal::new();
        let f = tmp.path().join("etc/sysconfig/docker-storage-setup");

        fs_port.append(&f, "VG=a\n").unwrap();
        fs_port.append(&f, "VG=b\n").unwrap();
        assert_eq!(fs_port.read_to_string(&f).unwrap(), "VG=a\nVG=b\n");

        fs_port.write(&f, "X=1\n").unwrap();
        let dst_dir = tmp.path().join("logs");
        fs_port.ensure_dir(&dst_dir).unwrap();
        fs_port.copy(&f, &dst_dir.join("copy")).unwrap();
        assert_eq!(fs::read_to_string(dst_dir.join("copy")).unwrap(), "X=1\n");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let f = tmp.path().join("out");
        exec_policy::with_dry_run_enabled(true, || {
            FsLocal::new().write(&f, "data").unwrap();
            FsLocal::new().ensure_dir(&tmp.path().join("d")).unwrap();
        });
        assert!(!f.exists());
        assert!(!tmp.path().join("d").exists());
    }

    #[test]
    fn read_missing_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = FsLocal::new()
            .read_to_string(&tmp.path().join("nope"))
            .unwrap_err();
        assert!(err.to_string().starts_with("read "), "{err}");
    }
}
