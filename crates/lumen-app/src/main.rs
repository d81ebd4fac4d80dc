// SPDX-License-Identifier: CEPL-1.0
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lumen_core::init_tracing;
use tracing::{error, info};

mod app;
mod config;

use app::Application;
use config::{load_cfg, PresentMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Override the present mode: mailbox | fifo
    #[arg(long, value_enum)]
    present: Option<PresentMode>,
    /// Disable the UI overlay
    #[arg(long)]
    no_ui: bool,
    /// Force the Khronos validation layer on
    #[arg(long)]
    validation: bool,
}

fn run(args: Args) -> Result<()> {
    let mut cfg = load_cfg(&args.config);
    if let Some(present) = args.present {
        cfg.render.present_mode = present;
    }
    if args.no_ui {
        cfg.ui.enabled = false;
    }
    if args.validation {
        cfg.render.validation = Some(true);
    }

    let mut app = Application::new(&cfg)?;
    app.run()
}

fn main() {
    init_tracing();
    let args = Args::parse();

    match panic::catch_unwind(AssertUnwindSafe(|| run(args))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("fatal: {e:#}"),
        Err(_) => error!("unknown error"),
    }
    info!("application ended");
}
