use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

mod addon;
mod commands;
mod config;
mod error;
mod kickstart;
mod layout;
mod logging;
mod sysconfig;
mod tooling;
mod ui;
mod utils;

use config::Config;

pub struct AppCtx {
    pub dry_run: bool,
    pub cfg: Config,
}

#[derive(Parser, Debug)]
#[command(
    name = "docker-ks-addon",
    about = "Kickstart addon that sets up docker storage and runs docker commands during install",
    arg_required_else_help = false,
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[arg(long, default_value = "./config.toml", global = true)]
    config: PathBuf,

    #[arg(long, global = true)]
    debug: bool,

    /// Log commands instead of running them and skip file writes
    #[arg(long, global = true)]
    dry_run: bool,

    #[arg(long, global = true)]
    check_config: bool,

    #[arg(long, global = true)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Parse and validate the addon section against the install context
    Check(commands::CheckArgs),
    /// Show the daemon command and the files execute would write
    Plan(commands::PlanArgs),
    /// Start docker, run the section body and persist storage config
    Run(commands::RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.debug);

    if cli.command.is_none() && !cli.check_config && !cli.print_config {
        let mut cmd = Cli::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    }
    let cfg = Config::load(&cli.config)?;

    if cli.check_config {
        tracing::info!("config OK");
        return Ok(());
    }
    if cli.print_config {
        println!("{}", cfg.to_toml()?);
        return Ok(());
    }

    let Some(cmd) = cli.command else {
        let mut cmd = Cli::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let ctx = AppCtx {
        dry_run: cli.dry_run,
        cfg,
    };

    match cmd {
        Cmd::Check(args) => args.run(&ctx),
        Cmd::Plan(args) => args.run(&ctx),
        Cmd::Run(args) => args.run(&ctx),
    }
}
