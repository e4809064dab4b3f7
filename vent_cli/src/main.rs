#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `ventctl`: run, simulate and service the ventilator from the command line.

mod cli;
mod commands;
mod console;
mod error_fmt;
mod report;
mod rt;
mod run;
mod session;
mod trace;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};
use vent_config::{Config, FileSettingsStore, Logging};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::run::{RunOptions, SimulateOptions};
use crate::session::Ctx;

fn main() {
    if let Err(err) = real_main() {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = vent_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr (pretty or JSON); `[logging].file` adds a JSON
/// lines sink. RUST_LOG wins over `--log-level`, which wins over the config.
fn init_tracing(json: bool, level: Option<&str>, logging: &Logging) -> eyre::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let lvl = level.or(logging.level.as_deref()).unwrap_or("warn");
            EnvFilter::try_new(lvl).wrap_err_with(|| format!("invalid log level '{lvl}'"))?
        }
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = PathBuf::from(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file '{file}' has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(&dir, name),
            "hourly" => tracing_appender::rolling::hourly(&dir, name),
            "never" => tracing_appender::rolling::never(&dir, name),
            other => eyre::bail!("logging.rotation must be never, daily or hourly (got '{other}')"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn real_main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.settings.path));
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }
    let ctx = Ctx {
        cfg,
        store: FileSettingsStore::new(settings_path),
        json: cli.json,
        shutdown,
    };

    match cli.cmd {
        Commands::Run {
            seconds,
            idle,
            console,
            trace,
            stats,
            machine,
            rt,
        } => run::cmd_run(
            &ctx,
            RunOptions {
                seconds,
                idle,
                console,
                trace,
                stats,
                machine,
                rt,
            },
        ),
        Commands::Simulate {
            seconds,
            trace,
            disconnect_at,
            machine,
        } => run::cmd_simulate(
            &ctx,
            SimulateOptions {
                seconds,
                trace,
                disconnect_at,
                machine,
            },
        ),
        Commands::Home { machine } => commands::cmd_home(&ctx, &machine),
        Commands::Zero { machine } => commands::cmd_zero(&ctx, &machine),
        Commands::Set { field, value } => commands::cmd_set(&ctx, field, value),
        Commands::Show => commands::cmd_show(&ctx),
        Commands::Phase {
            phase,
            seconds,
            machine,
        } => commands::cmd_phase(&ctx, phase, seconds, &machine),
        Commands::Fault { code, machine } => commands::cmd_fault(&ctx, code, &machine),
        Commands::Phases => {
            commands::cmd_phases(&ctx);
            Ok(())
        }
        Commands::Diag { machine } => commands::cmd_diag(&ctx, &machine),
        Commands::SelfCheck => commands::cmd_self_check(&ctx),
    }
}
