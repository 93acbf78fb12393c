use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;

use crate::{
    config::Config,
    utils::{bins::ensure_bins, process::Runner},
};

pub mod docker;
pub mod fs;
pub mod mount;
pub mod script;

pub use docker::{DockerCli, DockerPort};
pub use fs::{FsLocal, FsPort};
pub use mount::{MountCli, MountPort};
pub use script::{ScriptCli, ScriptPort};

/// OS-level collaborators used while executing the addon.
#[derive(Clone)]
pub struct Toolbox {
    mount: Arc<dyn MountPort>,
    docker: Arc<dyn DockerPort>,
    script: Arc<dyn ScriptPort>,
    fs: Arc<dyn FsPort>,
}

impl Toolbox {
    pub fn new(cfg: &Config, runner: Arc<dyn Runner + Send + Sync>) -> Self {
        Self {
            mount: Arc::new(MountCli::new(runner.clone())),
            docker: Arc::new(DockerCli::new(
                runner.clone(),
                cfg.daemon.command.clone(),
            )),
            script: Arc::new(ScriptCli::new(
                runner,
                cfg.paths.tmp_dir.clone(),
                cfg.paths.live_root.clone(),
            )),
            fs: Arc::new(FsLocal::new()),
        }
    }

    #[cfg(test)]
    pub fn from_ports(
        mount: Arc<dyn MountPort>,
        docker: Arc<dyn DockerPort>,
        script: Arc<dyn ScriptPort>,
        fs: Arc<dyn FsPort>,
    ) -> Self {
        Self {
            mount,
            docker,
            script,
            fs,
        }
    }

    #[inline]
    pub fn mount(&self) -> &dyn MountPort {
        self.mount.as_ref()
    }
    #[inline]
    pub fn docker(&self) -> &dyn DockerPort {
        self.docker.as_ref()
    }
    #[inline]
    pub fn script(&self) -> &dyn ScriptPort {
        self.script.as_ref()
    }
    #[inline]
    pub fn fs(&self) -> &dyn FsPort {
        self.fs.as_ref()
    }
}

/// Fails unless every binary `execute` shells out to is in PATH.
pub fn ensure_bins_for_cfg(cfg: &Config) -> Result<()> {
    let mut all: BTreeSet<&str> = BTreeSet::new();
    all.extend(mount::REQ_BINS);
    all.extend(script::REQ_BINS);
    if let Some(daemon) = cfg.daemon.command.first() {
        all.insert(daemon.as_str());
    }
    ensure_bins(all)
}
