//! `ragsync sync`: one synchronization pass from the command line.

use anyhow::Result;

use crate::config::Config;
use crate::coordinator::Coordinator;

pub async fn run_sync(config: &Config, dry_run: bool, collect: bool) -> Result<()> {
    let coordinator = Coordinator::from_config(config)
        .await?
        .collect_before_sync(collect);

    if dry_run {
        if collect {
            println!("(dry-run does not collect)");
        }
        let plan = coordinator.plan().await?;
        println!("sync (dry-run)");
        println!("  to add: {}", plan.to_add.len());
        for hash in &plan.to_add {
            println!("    + {}", hash);
        }
        println!("  to remove: {}", plan.to_remove.len());
        for hash in &plan.to_remove {
            println!("    - {}", hash);
        }
        return Ok(());
    }

    let report = coordinator.run_pass().await?;
    println!("sync");
    println!("  added: {} ({} chunks)", report.added.len(), report.chunks_added);
    println!("  removed: {}", report.removed.len());
    println!("  failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("    {} [{}]: {}", failure.hash, failure.stage, failure.error);
    }
    Ok(())
}
