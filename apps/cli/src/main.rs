//! `converge` command-line driver.

mod cli;
mod config;
mod demo;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use converge_core::StateTransitionEvent;
use converge_eventbus::Subscription;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command, DemoArgs};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    converge_log::init(&converge_log::Config::from_env()).context("initialising logging")?;

    match cli.command {
        Command::Demo(args) => run_demo(args).await,
    }
}

async fn run_demo(args: DemoArgs) -> anyhow::Result<ExitCode> {
    let config = config::load(args.config.as_deref()).context("loading configuration")?;
    let orchestrator = demo::orchestrator(config, &args)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let done = CancellationToken::new();
    let logger = tokio::spawn(log_transitions(
        orchestrator.subscribe(|_| true),
        done.clone(),
    ));

    let summary = orchestrator.run(&cancel).await;
    done.cancel();
    logger.await.context("transition logger")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn log_transitions(mut events: Subscription<StateTransitionEvent>, done: CancellationToken) {
    loop {
        tokio::select! {
            Some(event) = events.recv() => log_event(&event),
            () = done.cancelled() => {
                while let Some(event) = events.try_recv() {
                    log_event(&event);
                }
                break;
            }
        }
    }
}

fn log_event(event: &StateTransitionEvent) {
    info!(
        resource = %event.resource_id,
        from = %event.from,
        to = %event.to,
        attempt = event.attempt,
        reason = event.reason.as_deref().unwrap_or(""),
        "transition"
    );
}
