use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing as log;

use crate::{
    AppCtx,
    addon::{Controller, lifecycle::Plan},
    error::ADDON_NAME,
    kickstart::{self, AddonSection},
    logging::TracingLog,
    tooling::{Toolbox, ensure_bins_for_cfg},
    ui,
    utils::{exec_policy, lock::LockGuard, process::ProcessRunner},
};

#[derive(Args, Debug)]
pub struct KickstartArg {
    /// Kickstart file holding the %addon section
    #[arg(long, short = 'k')]
    pub kickstart: PathBuf,
}

/// Feeds the kickstart through the header and setup phases.
fn prepare(ctx: &AppCtx, ks: &KickstartArg) -> Result<(Controller, Option<AddonSection>)> {
    let text = fs::read_to_string(&ks.kickstart)
        .with_context(|| format!("read {}", ks.kickstart.display()))?;
    let section = kickstart::find_addon(&text, ADDON_NAME)?;

    let tools = Toolbox::new(&ctx.cfg, Arc::new(ProcessRunner::new()));
    let mut ctl = Controller::new(tools, ctx.cfg.paths.clone(), Arc::new(TracingLog));

    match &section {
        Some(s) => {
            ctl.handle_header(s.lineno, &s.args)?;
            ctl.set_script(&s.body)?;
        }
        None => ctl.mark_absent()?,
    }
    ctl.setup(&ctx.cfg.layout, &ctx.cfg.install)?;
    Ok((ctl, section))
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub ks: KickstartArg,
}

impl CheckArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let (ctl, section) = prepare(ctx, &self.ks)?;
        match (ctl.addon(), section) {
            (Some(addon), Some(s)) => {
                ui::log_addon(addon, s.lineno);
                log::debug!("[check] section as parsed:\n{addon}");
                log::info!("[check] kickstart OK");
            }
            _ => log::info!("[check] no %addon {ADDON_NAME} section, nothing to do"),
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub ks: KickstartArg,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanOut<'a> {
    daemon_command: Vec<String>,
    #[serde(flatten)]
    plan: &'a Plan,
}

impl PlanArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let (ctl, _) = prepare(ctx, &self.ks)?;
        let Some(plan) = ctl.plan(&ctx.cfg.install) else {
            log::info!("[plan] no %addon {ADDON_NAME} section, nothing to do");
            return Ok(());
        };
        let daemon_command = ctl.daemon_command(&plan);

        if self.json {
            let out = PlanOut {
                daemon_command,
                plan: &plan,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            ui::log_plan(&daemon_command, &plan);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub ks: KickstartArg,
}

impl RunArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let lock = LockGuard::try_acquire_in(&ctx.cfg.paths.tmp_dir, "docker-ks-addon")?;
        log::debug!("[run] holding {}", lock.path().display());
        if !ctx.dry_run {
            ensure_bins_for_cfg(&ctx.cfg)?;
        }

        let (mut ctl, _) = prepare(ctx, &self.ks)?;
        exec_policy::with_dry_run_enabled(ctx.dry_run, || ctl.execute(&ctx.cfg.install))
            .context("execute docker addon")?;

        log::info!("[run] done ({})", ctl.phase());
        Ok(())
    }
}
