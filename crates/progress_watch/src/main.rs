mod cli;
mod logging;
mod render;

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use monitor_logging::{monitor_error, monitor_info};
use progress_core::SessionStatus;
use progress_engine::{load_settings, Monitor};

use crate::cli::Cli;
use crate::render::{OutputFormat, Printer};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.log_level());

    match run(cli).await {
        Ok(SessionStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            monitor_error!("{:#}", err);
            eprintln!("progress_watch: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<SessionStatus> {
    let file = load_settings(&cli.config)?;
    let config = cli.session_config(&file)?;
    let monitor = Monitor::new(cli.monitor_settings(&file));
    let handle = monitor.start_monitoring(&cli.endpoint, config)?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut printer = Printer::new(format);
    let listener = monitor
        .on_state_change(&handle, move |snapshot| {
            let mut out = std::io::stdout().lock();
            for line in printer.render(snapshot) {
                let _ = writeln!(out, "{line}");
            }
        })
        .context("no tokio runtime for the snapshot listener")?;

    tokio::select! {
        _ = handle.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            monitor_info!(session: handle.session_id(), "interrupted, stopping");
            monitor.stop_monitoring(&handle);
        }
    }

    let last = handle.wait().await;
    let _ = listener.await;
    Ok(last.status)
}
