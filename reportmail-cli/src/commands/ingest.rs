//! Ingest command - run a local spreadsheet through the pipeline

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use reportmail_core::services::ingest::content_hash;
use reportmail_core::services::{FileStatus, IncomingFile, SheetOutcome};
use reportmail_core::EntryPoint;

use super::get_context;
use crate::output;

pub fn run(file: &Path, subject: &str, message_id: Option<&str>, json: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let message_id = match message_id {
        Some(id) => id.to_string(),
        None => format!("manual:{}", &content_hash(&bytes)[..16]),
    };

    let ctx = get_context(EntryPoint::Cli)?;
    let report = ctx.ingest_service.ingest_file(&IncomingFile {
        message_id: &message_id,
        subject,
        sender: "",
        file_name: &file_name,
        bytes: &bytes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.status {
        FileStatus::Unreadable => {
            output::error(&format!(
                "{} could not be read: {}",
                file_name,
                report.error.as_deref().unwrap_or("unknown error")
            ));
            return Ok(());
        }
        FileStatus::Archived => {
            output::warning(&format!("{}: no known report found, archived for review", file_name));
            return Ok(());
        }
        FileStatus::Ingested => {}
    }

    let mut table = output::create_table();
    table.set_header(vec!["Sheet", "Report", "Institution", "Result"]);
    for sheet in &report.sheets {
        let result = match &sheet.outcome {
            SheetOutcome::Ingested { records, inserted } => {
                format!("{} rows ({} new)", records, inserted).green().to_string()
            }
            SheetOutcome::Skipped => "skipped".dimmed().to_string(),
            SheetOutcome::Failed { error } => error.red().to_string(),
        };
        table.add_row(vec![
            sheet.sheet.clone(),
            sheet.report_type.to_string(),
            sheet.institution.map(|i| i.to_string()).unwrap_or_default(),
            result,
        ]);
    }
    println!("{}", table);
    output::success(&format!("Ingested {} record(s) from {}", report.record_count(), file_name));
    Ok(())
}
