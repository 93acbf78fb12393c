use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};

use crate::utils::process::{Background, CmdSpec, Runner, StdioSpec};

type DynRunner = dyn Runner + Send + Sync;

pub trait DockerPort: Send + Sync {
    /// Full argv the daemon would be started with.
    fn daemon_command(&self, args: &[String]) -> Vec<String>;
    /// Starts the daemon in the background, stdout and stderr going to `log`.
    fn start_daemon(&self, args: &[String], log: &Path) -> Result<Box<dyn Background>>;
}

pub struct DockerCli {
    runner: Arc<DynRunner>,
    base: Vec<String>,
}

impl DockerCli {
    pub fn new(runner: Arc<DynRunner>, base: Vec<String>) -> Self {
        Self { runner, base }
    }

    fn daemon_cmd(&self, args: &[String], log: &Path) -> Result<CmdSpec> {
        let Some((program, rest)) = self.base.split_first() else {
            bail!("empty daemon command");
        };
        Ok(CmdSpec::new(program.as_str())
            .args(rest.iter().cloned())
            .args(args.iter().cloned())
            .env("LANG", "C")
            .stdout(StdioSpec::File(log.to_path_buf()))
            .stderr(StdioSpec::File(log.to_path_buf())))
    }
}

impl DockerPort for DockerCli {
    fn daemon_command(&self, args: &[String]) -> Vec<String> {
        self.base.iter().chain(args).cloned().collect()
    }

    fn start_daemon(&self, args: &[String], log: &Path) -> Result<Box<dyn Background>> {
        let cmd = self.daemon_cmd(args, log)?;
        self.runner
            .spawn(&cmd)
            .with_context(|| format!("start {}", cmd.render()))
    }
}
