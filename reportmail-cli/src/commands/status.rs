//! Status command - show stored report counts

use anyhow::Result;
use colored::Colorize;
use reportmail_core::config::MailboxConfig;
use reportmail_core::EntryPoint;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context(EntryPoint::Cli)?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Report Data Status".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Table", "Rows"]);
    for count in &status.tables {
        table.add_row(vec![count.table.clone(), count.rows.to_string()]);
    }
    println!("{}", table);
    println!();

    println!("Dealers in directory: {}", status.total_dealers);
    println!("Users in directory:   {}", status.total_users);
    if status.pending_archive > 0 {
        output::warning(&format!("{} archived file(s) awaiting review", status.pending_archive));
    }

    match &ctx.config.mailbox {
        Some(MailboxConfig::Maildir { path }) => println!("Mailbox: {} (maildir)", path.display()),
        Some(MailboxConfig::Graph { mailbox, .. }) => println!("Mailbox: {} (graph)", mailbox),
        None => output::warning("No mailbox configured"),
    }

    Ok(())
}
