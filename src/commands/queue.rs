//! Queue command handlers: add, update and remove transfers.

use std::path::Path;

use aniqueue_core::{FailureOutcome, NewTransfer, RetryPolicy, TransferFailure, clock};
use anyhow::{Result, bail};
use tracing::info;

use super::open_queue;
use crate::cli::{FailArgs, QueueCommand};

pub async fn run_queue_command(db_path: &Path, command: QueueCommand) -> Result<()> {
    let queue = open_queue(db_path).await?;

    match command {
        QueueCommand::Add {
            kind,
            item_key,
            title,
        } => {
            let id = queue.add(&NewTransfer::new(kind, item_key, title)).await?;
            println!("{id}");
        }
        QueueCommand::SetStatus { id, status } => {
            queue.set_status(id, status).await?;
            info!(id, status = %status, "Updated transfer status");
        }
        QueueCommand::Progress { id, bytes, total } => {
            if bytes < 0 || total.is_some_and(|total| total < 0) {
                bail!("Byte counts must not be negative");
            }
            queue
                .record_progress(id, bytes, total, clock::epoch_millis())
                .await?;
            info!(id, bytes, "Recorded progress");
        }
        QueueCommand::Fail(args) => {
            let failure = failure_from_args(&args)?;
            let policy = RetryPolicy::with_max_attempts(args.max_attempts);
            match queue.record_failure(args.id, &policy, &failure).await? {
                FailureOutcome::Retry { attempt, delay } => {
                    println!(
                        "Transfer {} will retry (attempt {attempt}) in {:.1}s",
                        args.id,
                        delay.as_secs_f64()
                    );
                }
                FailureOutcome::GiveUp { reason } => {
                    println!("Transfer {} failed: {reason}", args.id);
                }
            }
        }
        QueueCommand::Remove { id } => {
            queue.remove(id).await?;
            info!(id, "Removed transfer");
        }
    }

    Ok(())
}

fn failure_from_args(args: &FailArgs) -> Result<TransferFailure> {
    if let Some(status) = args.http_status {
        return Ok(TransferFailure::http_status(status));
    }
    if args.timeout {
        return Ok(TransferFailure::Timeout);
    }
    if let Some(message) = &args.network {
        return Ok(TransferFailure::network(message.as_str()));
    }
    if let Some(message) = &args.storage {
        return Ok(TransferFailure::storage(message.as_str()));
    }
    bail!("Missing failure cause\n  Suggestion: Pass one of --http-status, --timeout, --network or --storage")
}
