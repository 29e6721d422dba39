//! schemata command-line driver.
//!
//! Runs the virtual filesystem engine against an offline repository fixture,
//! for inspecting the tree and the disk cache without an editor.
//!
//! ## Usage
//!
//! ```bash
//! schemata --fixture crm.json tree
//! schemata --fixture crm.json cat /crm.local/Custom/AccountPageV2.js
//! schemata --fixture crm.json warm Custom
//! ```

mod fixture;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use schemata_client::spawn_queue;
use schemata_kernel::{Engine, PackageNode, SchemataConfig, VfsOps, VfsPath, build_tree};

use crate::fixture::Fixture;

/// Browse a remote package repository as a file tree.
#[derive(Parser, Debug)]
#[command(name = "schemata")]
#[command(about = "Remote-backed virtual filesystem for package repositories")]
struct Args {
    /// Config file (default: <config dir>/schemata/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON document with packages, items and schemas to serve offline
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Session root; defaults to the host of the first saved connection
    #[arg(long)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print packages, type folders and files in display order
    Tree,
    /// Print one file's content
    Cat {
        /// `/<root>/<package>/<file>` or `bpmsoft://<root>/<package>/<file>`
        path: String,
    },
    /// Load every file of a package into the disk cache
    Warm {
        /// Package name
        package: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => SchemataConfig::default_path()?,
    };
    let config = SchemataConfig::load_or_default(&config_path)?;

    let root = match args.root {
        Some(root) => root,
        None => config
            .connections
            .first()
            .map(|c| c.host_name())
            .unwrap_or_else(|| "localhost".to_string()),
    };

    let Some(fixture_path) = args.fixture else {
        bail!("no remote transport is built in; pass --fixture <json>");
    };
    let repo = Fixture::load(&fixture_path).await?.into_repository();
    let credentials = config.connection_for(&root).map(|c| c.credentials());
    let queue = spawn_queue(Arc::new(repo), config.queue_options(credentials));

    let engine = Engine::builder(root.clone(), Arc::new(queue)).config(config).build();
    let summary = engine
        .reload(CancellationToken::new())
        .await
        .with_context(|| format!("loading {root}"))?;
    tracing::info!(packages = summary.packages, files = summary.files, "session ready");

    match args.command {
        Command::Tree => print_tree(&build_tree(&engine)),
        Command::Cat { path } => {
            let text = engine.read_to_string(&path).await?;
            print!("{text}");
        }
        Command::Warm { package } => {
            let token = CancellationToken::new();
            let cancel = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let path = VfsPath::package(&root, &package);
            let summary = engine
                .cache_folder(&path, &token, |p| {
                    tracing::info!(done = p.done, total = p.total, name = %p.name, "cached");
                })
                .await?;
            println!(
                "{package}: {} loaded, {} failed{}",
                summary.loaded,
                summary.failed,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
        }
    }

    engine.settle().await;
    Ok(())
}

fn print_tree(tree: &[PackageNode]) {
    for package in tree {
        let marker = if package.package.is_read_only { " (read-only)" } else { "" };
        println!("{}{marker}  {}", package.package.name, package.description);
        for folder in &package.folders {
            println!("  {} ({})", folder.label, folder.files.len());
            for file in &folder.files {
                let flags = match (file.is_locked, file.is_changed) {
                    (true, true) => "LC",
                    (false, true) => " C",
                    (true, false) => "L ",
                    (false, false) => "  ",
                };
                match &file.description {
                    Some(description) => println!("    [{flags}] {}  {description}", file.name),
                    None => println!("    [{flags}] {}", file.name),
                }
            }
        }
    }
}
