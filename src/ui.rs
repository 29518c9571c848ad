// UI layer: a simple interactive menu using `dialoguer`. Every choice maps
// to one store operation; failures are printed and the loop continues.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::api::DriveApi;
use crate::config::Config;
use crate::models::FileRecord;
use crate::store::DriveStore;

const DEFAULT_REPORT_NAME: &str = "report";

/// Main interactive menu. Runs a select loop until the user chooses "Exit".
///
/// Note: `Select::interact()` is keyboard-driven: use arrow keys and Enter.
pub fn main_menu<A: DriveApi>(store: &DriveStore<A>, config: &Config) -> Result<()> {
    let items = [
        "Load a report",
        "Save a report",
        "List files",
        "Upload a file",
        "Download a file",
        "Show export formats",
        "Create folder",
        "Exit",
    ];
    loop {
        let selection = Select::new().items(&items).default(0).interact()?;
        match selection {
            0 => handle_load_report(store, config)?,
            1 => handle_save_report(store, config)?,
            2 => handle_list(store)?,
            3 => handle_upload(store)?,
            4 => handle_download(store)?,
            5 => handle_export_formats(store)?,
            6 => handle_create_folder(store)?,
            _ => break,
        }
    }
    Ok(())
}

fn spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn success(msg: String) {
    println!("{}", msg.green());
}

fn failure(what: &str, err: impl std::fmt::Display) {
    println!("{}", format!("{} failed: {}", what, err).red());
}

/// Prompt for a value the user may leave blank.
fn optional(prompt: &str) -> Result<Option<String>> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim().to_string();
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// Pick one of the saved reports and print its content.
fn handle_load_report<A: DriveApi>(store: &DriveStore<A>, config: &Config) -> Result<()> {
    let reports = match store.list_reports(config.reports_folder_id.as_deref()) {
        Ok(reports) => reports,
        Err(e) => {
            failure("Listing reports", e);
            return Ok(());
        }
    };
    if reports.is_empty() {
        println!("No saved reports.");
        return Ok(());
    }
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    let index = Select::new()
        .with_prompt("Choose a report")
        .items(&names)
        .default(0)
        .interact()?;

    let spinner = spinner("Loading...");
    let loaded = store.load_report::<Value>(&reports[index].id);
    spinner.finish_and_clear();
    match loaded {
        Ok(value) => success(format!("Loaded {}: {}", reports[index].name, value)),
        Err(e) => failure("Load", e),
    }
    Ok(())
}

/// Save a JSON value typed by the user as a new report.
fn handle_save_report<A: DriveApi>(store: &DriveStore<A>, config: &Config) -> Result<()> {
    let name: String = Input::new()
        .with_prompt("Report name")
        .default(DEFAULT_REPORT_NAME.to_string())
        .interact_text()?;
    let raw: String = Input::new()
        .with_prompt("Value (JSON)")
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            serde_json::from_str::<Value>(input)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;
    let value: Value = serde_json::from_str(&raw)?;

    let spinner = spinner("Saving...");
    let saved = store.save_report(&value, &name, config.reports_folder_id.as_deref());
    spinner.finish_and_clear();
    match saved {
        Ok(id) => success(format!("Report saved. ID: {}", id)),
        Err(e) => failure("Save", e),
    }
    Ok(())
}

fn print_record(record: &FileRecord) {
    let icon = if record.is_folder() { "📁" } else { "📄" };
    let created = record
        .created_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "N/A".into());
    println!("{} {}", icon, record.name);
    println!("   ID: {}", record.id);
    println!("   Type: {}", record.mime_type);
    println!("   Size: {}", record.display_size());
    println!("   Created: {}", created);
}

fn handle_list<A: DriveApi>(store: &DriveStore<A>) -> Result<()> {
    let folder = optional("Folder name (blank for whole drive)")?;
    match store.list(None, folder.as_deref()) {
        Ok(records) if records.is_empty() => println!("No files found."),
        Ok(records) => {
            println!("{} files found:", records.len());
            for record in &records {
                print_record(record);
            }
        }
        Err(e) => failure("Listing", e),
    }
    Ok(())
}

fn handle_upload<A: DriveApi>(store: &DriveStore<A>) -> Result<()> {
    let path: String = Input::new().with_prompt("Local file path").interact_text()?;
    let folder = optional("Destination folder name (blank for root)")?;

    let spinner = spinner("Uploading...");
    let uploaded = store.upload(&PathBuf::from(path), None, folder.as_deref());
    spinner.finish_and_clear();
    match uploaded {
        Ok(id) => success(format!("Upload successful. ID: {}", id)),
        Err(e) => failure("Upload", e),
    }
    Ok(())
}

fn handle_download<A: DriveApi>(store: &DriveStore<A>) -> Result<()> {
    let file_id: String = Input::new().with_prompt("File ID").interact_text()?;
    let local_name = optional("Local name (blank for remote name)")?;

    // Editable documents: offer their export formats, default first.
    let export = match store.list_export_formats(&file_id) {
        Ok(formats) if !formats.is_empty() => {
            let labels: Vec<String> = formats
                .iter()
                .map(|(mime, label)| format!("{} ({})", label, mime))
                .collect();
            let index = Select::new()
                .with_prompt("Export format")
                .items(&labels)
                .default(0)
                .interact()?;
            Some(formats[index].0)
        }
        Ok(_) => None,
        Err(e) => {
            failure("Download", e);
            return Ok(());
        }
    };

    // binary downloads draw their own progress bar
    let progress = export.map(|_| spinner("Exporting..."));
    let downloaded = store.download(&file_id, local_name.as_deref().map(std::path::Path::new), export);
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    match downloaded {
        Ok(path) => success(format!("Saved to {}", path.display())),
        Err(e) => failure("Download", e),
    }
    Ok(())
}

fn handle_export_formats<A: DriveApi>(store: &DriveStore<A>) -> Result<()> {
    let file_id: String = Input::new().with_prompt("File ID").interact_text()?;
    match store.list_export_formats(&file_id) {
        Ok(formats) if formats.is_empty() => println!("Binary file, downloaded as-is."),
        Ok(formats) => {
            println!("Available export formats:");
            for (mime, label) in formats {
                println!("   • {} → {}", mime, label);
            }
        }
        Err(e) => failure("Export formats", e),
    }
    Ok(())
}

fn handle_create_folder<A: DriveApi>(store: &DriveStore<A>) -> Result<()> {
    let name: String = Input::new().with_prompt("Folder name").interact_text()?;
    let parent = optional("Parent folder ID (blank for root)")?;
    match store.create_folder(&name, parent.as_deref()) {
        Ok(id) => success(format!("Folder '{}' created. ID: {}", name, id)),
        Err(e) => failure("Create folder", e),
    }
    Ok(())
}
