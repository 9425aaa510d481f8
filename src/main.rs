use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use sitemirror::{Crawler, MirrorConfig, MirrorServer};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Subcommand to run
    #[clap(subcommand)]
    command: Command,

    /// Log level
    #[clap(short, long, default_value = "info")]
    log_level: LevelFilter,
}

/// Subcommands
#[derive(Subcommand)]
enum Command {
    /// Crawl a site into a local mirror and serve it
    Mirror {
        /// Seed URL to mirror
        url: String,

        /// Directory to write the mirror into
        #[clap(short, long, default_value = "mirror")]
        output: PathBuf,

        /// Port to serve the mirror on
        #[clap(short, long, default_value = "4173")]
        port: u16,

        /// Maximum pages rendered at once
        #[clap(long, default_value = "5")]
        concurrency: usize,

        /// Per-page navigation timeout in seconds
        #[clap(long, default_value = "30")]
        timeout: u64,

        /// Keep serving after the crawl finishes
        #[clap(long)]
        serve: bool,
    },

    /// Serve an existing mirror directory
    Serve {
        /// Mirror directory to serve
        #[clap(short, long, default_value = "mirror")]
        output: PathBuf,

        /// Port to serve the mirror on
        #[clap(short, long, default_value = "4173")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .init();

    match args.command {
        Command::Mirror {
            url,
            output,
            port,
            concurrency,
            timeout,
            serve,
        } => {
            let config = MirrorConfig::default()
                .with_output_dir(output)
                .with_port(port)
                .with_concurrency(concurrency)
                .with_nav_timeout(Duration::from_secs(timeout));
            let crawler = Crawler::new(config);

            let summary = crawler
                .crawl(&url)
                .await
                .with_context(|| format!("Failed to mirror {url}"))?;

            info!("Visited {} pages", summary.pages_visited);
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to render summary")?
            );

            if serve {
                info!("Serving at {} - press Ctrl+C to stop", summary.server_url);
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to wait for shutdown signal")?;
            }
            // Release before exit so the listening socket is never orphaned.
            crawler.server().release().await;
        }
        Command::Serve { output, port } => {
            let config = MirrorConfig::default()
                .with_output_dir(output)
                .with_port(port);
            let server = MirrorServer::new();

            let url = server
                .bind(&config)
                .await
                .context("Failed to bind mirror server")?;
            info!("Serving at {url} - press Ctrl+C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to wait for shutdown signal")?;
            server.release().await;
        }
    }

    Ok(())
}
