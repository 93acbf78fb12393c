use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    addon::{AddonConfig, BuiltinFormats, FormatCatalog},
    config::Paths,
    error::AddonError,
    layout::{InstallPolicy, VolumeLayout},
    logging::AddonLog,
    sysconfig,
    tooling::Toolbox,
};

pub const REQUIRED_PACKAGE: &str = "docker";

/// Daemon flags that keep it from touching host networking during install.
pub const NETWORK_SAFETY_ARGS: &[&str] = &["--ip-forward=false", "--iptables=false"];

const BIND_DIRS: &[&str] = &["var/lib/docker", "etc/docker"];
const DAEMON_LOG: &str = "docker-daemon.log";
const SCRIPT_LOG: &str = "docker-addon.log";
const STORAGE_FILE: &str = "etc/sysconfig/docker-storage";
const STORAGE_SETUP_FILE: &str = "etc/sysconfig/docker-storage-setup";
const DOCKER_FILE: &str = "etc/sysconfig/docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unparsed,
    /// Kickstart had no addon section; later phases do nothing.
    Disabled,
    Enabled,
    Validated,
    Executed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Unparsed => "unparsed",
            Phase::Disabled => "disabled",
            Phase::Enabled => "enabled",
            Phase::Validated => "validated",
            Phase::Executed => "executed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedWrite {
    pub path: PathBuf,
    pub content: String,
    pub append: bool,
}

/// Everything `execute` will launch and write, derived up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub daemon_args: Vec<String>,
    pub writes: Vec<PlannedWrite>,
    pub options_file: PathBuf,
    pub saved_args: Option<Vec<String>>,
}

pub struct Controller {
    phase: Phase,
    addon: Option<AddonConfig>,
    tools: Toolbox,
    paths: Paths,
    formats: Box<dyn FormatCatalog + Send + Sync>,
    log: Arc<dyn AddonLog>,
}

impl Controller {
    pub fn new(tools: Toolbox, paths: Paths, log: Arc<dyn AddonLog>) -> Self {
        Self {
            phase: Phase::Unparsed,
            addon: None,
            tools,
            paths,
            formats: Box::new(BuiltinFormats),
            log,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_formats(mut self, formats: Box<dyn FormatCatalog + Send + Sync>) -> Self {
        self.formats = formats;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn addon(&self) -> Option<&AddonConfig> {
        self.addon.as_ref()
    }

    fn out_of_order(&self, op: &'static str) -> AddonError {
        AddonError::Phase {
            op,
            phase: self.phase.to_string(),
        }
    }

    pub fn handle_header<S: AsRef<str>>(
        &mut self,
        lineno: usize,
        args: &[S],
    ) -> Result<(), AddonError> {
        if self.phase != Phase::Unparsed {
            return Err(self.out_of_order("handle_header"));
        }
        let addon = AddonConfig::from_header(lineno, args, self.formats.as_ref())?;
        self.log.info(&format!(
            "header parsed: driver={}, extra args={:?}, save args={}",
            addon.driver, addon.extra_args, addon.save_args
        ));
        self.addon = Some(addon);
        self.phase = Phase::Enabled;
        Ok(())
    }

    /// Stores the section body that runs against the daemon.
    pub fn set_script(&mut self, body: &str) -> Result<(), AddonError> {
        match (self.phase, self.addon.as_mut()) {
            (Phase::Enabled, Some(addon)) => {
                addon.script = body.to_string();
                Ok(())
            }
            _ => Err(self.out_of_order("set_script")),
        }
    }

    /// The host finished reading the kickstart without an addon section.
    pub fn mark_absent(&mut self) -> Result<(), AddonError> {
        match self.phase {
            Phase::Unparsed | Phase::Disabled => {
                self.phase = Phase::Disabled;
                Ok(())
            }
            _ => Err(self.out_of_order("mark_absent")),
        }
    }

    pub fn setup(
        &mut self,
        layout: &VolumeLayout,
        policy: &InstallPolicy,
    ) -> Result<(), AddonError> {
        let addon = match (self.phase, self.addon.as_ref()) {
            (Phase::Unparsed | Phase::Disabled, _) => {
                self.phase = Phase::Disabled;
                self.log.debug("setup: addon not enabled");
                return Ok(());
            }
            (Phase::Enabled, Some(addon)) => addon,
            _ => return Err(self.out_of_order("setup")),
        };

        if !policy.has_package(REQUIRED_PACKAGE) {
            return Err(AddonError::MissingPackage(REQUIRED_PACKAGE.to_string()));
        }
        addon.driver.check_layout(layout)?;

        self.log
            .info(&format!("setup: layout ok for {}", addon.driver));
        self.phase = Phase::Validated;
        Ok(())
    }

    /// Daemon args after the base command, in launch order.
    pub fn daemon_args(addon: &AddonConfig, policy: &InstallPolicy) -> Vec<String> {
        let mut args = Vec::new();
        if policy.selinux {
            args.push("--selinux-enabled".to_string());
        }
        args.extend(addon.driver.daemon_args());
        args.extend(NETWORK_SAFETY_ARGS.iter().map(|s| s.to_string()));
        args.extend(addon.extra_args.iter().cloned());
        args
    }

    pub fn plan(&self, policy: &InstallPolicy) -> Option<Plan> {
        let addon = self.addon.as_ref()?;
        let sysroot = &self.paths.sysroot;

        let mut writes = vec![PlannedWrite {
            path: sysroot.join(STORAGE_FILE),
            content: addon.driver.storage_config(),
            append: false,
        }];
        if let Some(line) = addon.driver.storage_setup_line() {
            writes.push(PlannedWrite {
                path: sysroot.join(STORAGE_SETUP_FILE),
                content: line,
                append: true,
            });
        }

        Some(Plan {
            daemon_args: Self::daemon_args(addon, policy),
            writes,
            options_file: sysroot.join(DOCKER_FILE),
            saved_args: addon.saved_args().map(|a| a.to_vec()),
        })
    }

    /// Full daemon command line for `plan`.
    pub fn daemon_command(&self, plan: &Plan) -> Vec<String> {
        self.tools.docker().daemon_command(&plan.daemon_args)
    }

    pub fn execute(&mut self, policy: &InstallPolicy) -> Result<()> {
        match self.phase {
            Phase::Unparsed | Phase::Disabled => {
                self.phase = Phase::Disabled;
                self.log.debug("execute: addon not enabled");
                return Ok(());
            }
            Phase::Validated => {}
            _ => return Err(self.out_of_order("execute").into()),
        }
        // no second attempt, even if a step below fails
        self.phase = Phase::Executed;

        let (Some(addon), Some(plan)) = (self.addon.as_ref(), self.plan(policy)) else {
            return Err(self.out_of_order("execute").into());
        };
        let paths = &self.paths;
        let tools = &self.tools;

        for dir in BIND_DIRS {
            tools
                .mount()
                .bind(&paths.sysroot.join(dir), &paths.live_root.join(dir))?;
        }

        let daemon_log = paths.tmp_dir.join(DAEMON_LOG);
        let script_log = paths.tmp_dir.join(SCRIPT_LOG);

        self.log.info(&format!(
            "starting docker daemon: {}",
            self.daemon_command(&plan).join(" ")
        ));
        let mut daemon = tools
            .docker()
            .start_daemon(&plan.daemon_args, &daemon_log)?;
        self.log.debug(&format!("docker daemon pid {}", daemon.id()));

        // The daemon may still be initializing when the script starts.
        self.log.info("running docker commands");
        let script_res = tools.script().run_script(&addon.script, &script_log);

        self.log.info("shutting down docker daemon");
        let kill_res = daemon.kill();

        match script_res? {
            0 => {}
            code => self.log.warn(&format!(
                "addon script exited with {code}, see {}",
                script_log.display()
            )),
        }
        kill_res.context("stop docker daemon")?;

        self.log.debug("writing docker storage config");
        for w in &plan.writes {
            if w.append {
                tools.fs().append(&w.path, &w.content)?;
            } else {
                tools.fs().write(&w.path, &w.content)?;
            }
        }

        let driver = &addon.driver;
        sysconfig::merge_options(
            tools.fs(),
            &plan.options_file,
            &|opts: &str| driver.adjust_options(opts),
            plan.saved_args.as_deref(),
            self.log.as_ref(),
        );

        copy_logs(
            tools,
            &paths.log_dir,
            &[daemon_log.as_path(), script_log.as_path()],
        )?;
        self.log.info("docker addon done");
        Ok(())
    }
}

fn copy_logs(tools: &Toolbox, dst_dir: &Path, logs: &[&Path]) -> Result<()> {
    tools.fs().ensure_dir(dst_dir)?;
    for src in logs {
        let Some(name) = src.file_name() else {
            continue;
        };
        tools.fs().copy(src, &dst_dir.join(name))?;
    }
    Ok(())
}
