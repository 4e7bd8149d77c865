use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use engine_logging::{engine_info, engine_warn};
use keeper_core::{ArchiveFormat, CollectionId, LinkId, NewLink};
use keeper_engine::WorkerGroup;

use super::{Components, WorkerConfig, WorkerError};

/// Link keeper - archives bookmarked pages as PDF, HTML snapshot, screenshot
/// and readable text.
#[derive(Debug, Parser)]
#[command(name = "link-keeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// RON configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the preservation workers until interrupted
    Run,
    /// Add a link and queue it for preservation
    Submit {
        url: String,
        #[arg(long, default_value_t = 1)]
        collection: CollectionId,
        #[arg(long)]
        name: Option<String>,
    },
    /// Drop one stored format of a link and archive it again
    Rearchive { link_id: LinkId, format: ArchiveFormat },
    /// Delete a link together with its archives
    Delete { link_id: LinkId },
    /// Print or save one archived format of a link
    Get {
        link_id: LinkId,
        format: ArchiveFormat,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove stored artifacts no link refers to
    Sweep,
}

pub(super) async fn dispatch(
    command: Command,
    config: &WorkerConfig,
    components: Components,
) -> Result<(), WorkerError> {
    match command {
        Command::Run => run(config, components).await,
        Command::Submit {
            url,
            collection,
            name,
        } => {
            let mut new_link = NewLink::new(collection, url);
            if let Some(name) = name {
                new_link = new_link.with_name(name);
            }
            let (link, _) = components.service.submit(new_link).await?;
            println!(
                "link {} added: {}; a running worker will archive it",
                link.id, link.url
            );
            Ok(())
        }
        Command::Rearchive { link_id, format } => {
            components.service.rearchive(link_id, format).await?;
            println!("link {link_id}: {format} cleared, a running worker will archive it again");
            Ok(())
        }
        Command::Delete { link_id } => {
            let link = components.service.delete_link(link_id).await?;
            println!("link {} deleted: {}", link.id, link.url);
            Ok(())
        }
        Command::Get {
            link_id,
            format,
            output,
        } => {
            let content = components.service.read_artifact(link_id, format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &content.bytes)?;
                    println!(
                        "{} ({}, {} bytes) written to {}",
                        content.path,
                        content.content_type,
                        content.bytes.len(),
                        path.display()
                    );
                }
                None => std::io::stdout().write_all(&content.bytes)?,
            }
            Ok(())
        }
        Command::Sweep => {
            let removed = components.service.sweep_orphans().await?;
            for path in &removed {
                println!("removed {path}");
            }
            println!("{} orphaned artifact(s) removed", removed.len());
            Ok(())
        }
    }
}

async fn run(config: &WorkerConfig, components: Components) -> Result<(), WorkerError> {
    let Components {
        links,
        queue,
        preserver,
        service,
        shutdown,
    } = components;

    engine_info!(
        "Starting {} workers, archives under {}",
        config.workers,
        config.archive_root.display()
    );
    let workers = WorkerGroup::spawn(config.workers, Arc::clone(&queue), preserver, links);

    let interval = Duration::from_secs(config.backfill_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => match service.backfill(config.backfill_batch).await {
                Ok(0) => {}
                Ok(queued) => engine_info!("Backfill queued {} links", queued),
                Err(err) => engine_warn!("Backfill failed: {}", err),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    engine_warn!("Failed to listen for interrupt: {}", err);
                }
                break;
            }
        }
    }

    engine_info!("Shutting down, waiting for running jobs");
    shutdown.cancel();
    workers.join().await;
    let counts = queue.counts().await;
    engine_info!(
        "Stopped: {} succeeded, {} partial, {} failed",
        counts.succeeded,
        counts.partial,
        counts.failed
    );
    Ok(())
}
