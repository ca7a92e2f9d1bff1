//! Directory command - import and list dealers and users

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use reportmail_core::EntryPoint;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum DirectoryCommands {
    /// Import dealers from a CSV with id, party_name, dealer_code, zone columns
    ImportDealers {
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import users from a CSV with id, first_name, last_name columns
    ImportUsers {
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List directory entries
    List {
        /// List users instead of dealers
        #[arg(long)]
        users: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: DirectoryCommands) -> Result<()> {
    let ctx = get_context(EntryPoint::Cli)?;

    match command {
        DirectoryCommands::ImportDealers { file, json } => {
            let result = ctx.directory_service.import_dealers(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                output::success(&format!("Imported {} dealer(s)", result.imported));
                if result.skipped > 0 {
                    output::warning(&format!("Skipped {} incomplete row(s)", result.skipped));
                }
            }
        }
        DirectoryCommands::ImportUsers { file, json } => {
            let result = ctx.directory_service.import_users(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                output::success(&format!("Imported {} user(s)", result.imported));
                if result.skipped > 0 {
                    output::warning(&format!("Skipped {} incomplete row(s)", result.skipped));
                }
            }
        }
        DirectoryCommands::List { users: true, json } => {
            let users = ctx.directory_service.list_users()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["ID", "Name"]);
            for user in &users {
                table.add_row(vec![user.id.to_string(), user.full_name()]);
            }
            println!("{}", table);
        }
        DirectoryCommands::List { users: false, json } => {
            let dealers = ctx.directory_service.list_dealers()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dealers)?);
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["ID", "Party Name", "Code", "Zone"]);
            for dealer in &dealers {
                table.add_row(vec![
                    dealer.id.clone(),
                    dealer.party_name.clone(),
                    dealer.dealer_code.clone().unwrap_or_default(),
                    dealer.zone.clone().unwrap_or_default(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
