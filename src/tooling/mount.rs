use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::utils::process::{CmdSpec, Runner, StdioSpec};

pub const REQ_BINS: &[&str] = &["mount"];

type DynRunner = dyn Runner + Send + Sync;

pub trait MountPort: Send + Sync {
    fn bind(&self, src: &Path, dst: &Path) -> Result<()>;
}

pub struct MountCli {
    runner: Arc<DynRunner>,
}

impl MountCli {
    pub fn new(runner: Arc<DynRunner>) -> Self {
        Self { runner }
    }

    #[inline]
    fn bind_cmd(&self, src: &Path, dst: &Path) -> CmdSpec {
        CmdSpec::new("mount")
            .args(["-o", "bind"])
            .arg(src.display().to_string())
            .arg(dst.display().to_string())
            .stdout(StdioSpec::Null)
            .stderr(StdioSpec::Inherit)
    }
}

impl MountPort for MountCli {
    fn bind(&self, src: &Path, dst: &Path) -> Result<()> {
        self.runner
            .run(&self.bind_cmd(src, dst))
            .with_context(|| format!("mount -o bind {} {}", src.display(), dst.display()))
    }
}
