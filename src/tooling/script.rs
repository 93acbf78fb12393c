use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use tempfile::Builder;

use crate::utils::process::{CmdSpec, Runner, StdioSpec};

pub const REQ_BINS: &[&str] = &["sh"];

type DynRunner = dyn Runner + Send + Sync;

pub trait ScriptPort: Send + Sync {
    /// Runs `body` with sh outside the target chroot, all output to `log`.
    /// Returns the script's exit code.
    fn run_script(&self, body: &str, log: &Path) -> Result<i32>;
}

pub struct ScriptCli {
    runner: Arc<DynRunner>,
    scratch: PathBuf,
    cwd: PathBuf,
}

impl ScriptCli {
    pub fn new(runner: Arc<DynRunner>, scratch: PathBuf, cwd: PathBuf) -> Self {
        Self {
            runner,
            scratch,
            cwd,
        }
    }
}

impl ScriptPort for ScriptCli {
    fn run_script(&self, body: &str, log: &Path) -> Result<i32> {
        let mut file = Builder::new()
            .prefix("ks-script-")
            .suffix(".sh")
            .tempfile_in(&self.scratch)
            .with_context(|| format!("create script in {}", self.scratch.display()))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("write {}", file.path().display()))?;

        let cmd = CmdSpec::new("sh")
            .arg(file.path().display().to_string())
            .cwd(&self.cwd)
            .stdout(StdioSpec::File(log.to_path_buf()))
            .stderr(StdioSpec::File(log.to_path_buf()));

        self.runner
            .status(&cmd)
            .with_context(|| format!("run addon script {}", file.path().display()))
    }
}
