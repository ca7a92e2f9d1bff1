//! Run command - poll the mailbox on a schedule

use anyhow::Result;
use colored::Colorize;
use reportmail_core::services::SchedulerState;
use reportmail_core::EntryPoint;
use tracing::info;

use super::get_context;
use crate::output;

pub fn run(once: bool, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        if once {
            run_once(json).await
        } else {
            run_forever().await
        }
    })
}

async fn run_once(json: bool) -> Result<()> {
    let ctx = get_context(EntryPoint::Cli)?;
    let mailbox = ctx.mailbox()?;
    let report = ctx.ingest_service.run_cycle(mailbox.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.fetched == 0 {
        output::info("No unread report mail.");
        return Ok(());
    }
    println!(
        "Fetched {} message(s): {} processed, {} failed",
        report.fetched,
        report.processed.to_string().green(),
        if report.failed > 0 {
            report.failed.to_string().red()
        } else {
            report.failed.to_string().normal()
        }
    );
    Ok(())
}

async fn run_forever() -> Result<()> {
    let ctx = get_context(EntryPoint::Daemon)?;
    let scheduler = ctx.scheduler()?;
    let mut state = scheduler.subscribe();

    scheduler.start();
    output::info("Polling mailbox. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupt received, stopping scheduler");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SchedulerState::Stopped {
                    break;
                }
            }
        }
    }

    scheduler.stop().await;
    output::success("Stopped.");
    Ok(())
}
