use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use timecard_core::{Config, Database, WorkLogEntry};

#[derive(Subcommand)]
pub enum LogAction {
    /// Today's entries
    Today {
        #[arg(long)]
        json: bool,
    },
    /// Entries for a specific day (YYYY-MM-DD)
    On {
        date: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: LogAction) -> Result<(), Box<dyn std::error::Error>> {
    let (date, json) = match action {
        LogAction::Today { json } => (Utc::now().date_naive(), json),
        LogAction::On { date, json } => (date.parse::<NaiveDate>()?, json),
    };

    let config = Config::load()?;
    let db = Database::open()?;
    let entries = db.work_log_for_day(&config.identity.user_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("no entries for {date}");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{} - {}  {:>6}s  {}{}",
            entry.start_time.format("%H:%M:%S"),
            entry.end_time.format("%H:%M:%S"),
            entry.duration_secs,
            entry.task,
            if entry.memo.is_empty() {
                String::new()
            } else {
                format!("  [{}]", entry.memo)
            }
        );
    }
    for (task, secs) in task_totals(&entries) {
        println!("total {task}: {}m {}s", secs / 60, secs % 60);
    }
    Ok(())
}

fn task_totals(entries: &[WorkLogEntry]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.task.clone()).or_insert(0) += entry.duration_secs;
    }
    totals
}
