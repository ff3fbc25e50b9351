//! Status command: queue summary and per-transfer reason text.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use aniqueue_core::{
    MediaKind, QueueStatusSummary, StringTable, TransferRecord, clock, display_reason_text,
};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::open_queue;
use crate::cli::StatusArgs;

#[derive(Debug, Serialize)]
struct StatusItem<'a> {
    #[serde(flatten)]
    record: &'a TransferRecord,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    summary: QueueStatusSummary,
    transfers: Vec<StatusItem<'a>>,
}

pub async fn run_status_command(db_path: &Path, args: &StatusArgs) -> Result<()> {
    let queue = open_queue(db_path).await?;

    if args.reclassify {
        let stalled = queue.reclassify_stalled(clock::epoch_millis()).await?;
        if stalled > 0 {
            info!(stalled, "Marked transfers without recent progress as stalled");
        }
    }

    let tables = load_string_tables(args.strings.as_deref())?;
    let records = queue.list(args.kind).await?;
    let summary = queue.summary(args.kind).await?;

    let transfers: Vec<StatusItem<'_>> = records
        .iter()
        .map(|record| StatusItem {
            record,
            reason: tables
                .get(&record.media_kind())
                .and_then(|table| display_reason_text(record, table)),
        })
        .collect();

    if args.json {
        let report = StatusReport { summary, transfers };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", summary_line(&summary));
    for item in &transfers {
        println!("{}", transfer_line(item.record, item.reason.as_deref()));
    }

    Ok(())
}

fn load_string_tables(path: Option<&Path>) -> Result<HashMap<MediaKind, StringTable>> {
    let Some(path) = path else {
        return Ok(MediaKind::ALL
            .into_iter()
            .map(|kind| (kind, StringTable::english(kind)))
            .collect());
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read strings file '{}'", path.display()))?;
    MediaKind::ALL
        .into_iter()
        .map(|kind| {
            StringTable::with_overrides_json(kind, &raw)
                .map(|table| (kind, table))
                .with_context(|| format!("Invalid strings file '{}'", path.display()))
        })
        .collect()
}

fn summary_line(summary: &QueueStatusSummary) -> String {
    format!(
        "downloading: {}  waiting: {}  stalled: {}",
        summary.downloading, summary.waiting_for_slot, summary.stalled
    )
}

fn transfer_line(record: &TransferRecord, reason: Option<&str>) -> String {
    let progress = record
        .progress_percent()
        .map_or_else(String::new, |percent| format!(" {percent:.0}%"));
    let mut line = format!(
        "#{} [{}] {} ({}){}",
        record.id,
        record.media_kind(),
        record.title,
        record.status(),
        progress
    );
    if let Some(reason) = reason {
        line.push_str(" - ");
        line.push_str(reason);
    }
    line
}
