//! `rvs`: fetch resource bundles and inspect page collections.

mod args;
mod error;

use crate::args::{Cli, CollectionCommand, Commands, ResourceArgs, ResourceCommand};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use futures::TryStreamExt;
use rvs_collection::{CollectionManager, Document};
use rvs_config::RvsConfig;
use rvs_resource::{ResourceCache, ResourceSpec};
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => RvsConfig::from_path(path),
        None => RvsConfig::load(),
    }
    .or_raise(|| ErrorKind::Config)?;

    match cli.command {
        // Resource loading is blocking and drives its own runtime.
        Commands::Resource(command) => run_resource(&config, command),
        Commands::Collection(command) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .or_raise(|| ErrorKind::Runtime)?;
            runtime.block_on(run_collection(&config, command))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn spec(args: ResourceArgs) -> Result<ResourceSpec> {
    ResourceSpec::new(args.name, args.version).or_raise(|| ErrorKind::Resource)
}

fn run_resource(config: &RvsConfig, command: ResourceCommand) -> Result<()> {
    let cache = ResourceCache::from_config(config).or_raise(|| ErrorKind::Resource)?;
    match command {
        ResourceCommand::Load(args) => {
            let resource = cache.load(&spec(args)?).or_raise(|| ErrorKind::Resource)?;
            println!("{}", resource.local_path().display());
        }
        ResourceCommand::Upload(args) => {
            let spec = spec(args)?;
            if cache.upload(&spec).or_raise(|| ErrorKind::Resource)? {
                tracing::info!(resource = %spec, "Uploaded");
            } else {
                tracing::warn!(resource = %spec, "Remote storage is read-only, nothing was uploaded");
            }
        }
    }
    Ok(())
}

async fn run_collection(config: &RvsConfig, command: CollectionCommand) -> Result<()> {
    let manager = CollectionManager::from_config(config).await.or_raise(|| ErrorKind::Collection)?;
    let mut out = std::io::stdout().lock();
    match command {
        CollectionCommand::Ids { collection } => {
            let mut ids = manager.iterate_ids(&collection);
            while let Some(id) = ids.try_next().await.or_raise(|| ErrorKind::Collection)? {
                writeln!(out, "{id}").or_raise(|| ErrorKind::Output)?;
            }
        }
        CollectionCommand::Dump { collection, fields } => {
            let mut documents = manager.iterate_collection(&collection, Some(fields));
            while let Some(document) = documents.try_next().await.or_raise(|| ErrorKind::Collection)? {
                write_document(&mut out, document)?;
            }
        }
        CollectionCommand::Get { collection, ids } => {
            for document in manager.fetch_documents(&collection, &ids).await.or_raise(|| ErrorKind::Collection)? {
                write_document(&mut out, document)?;
            }
        }
    }
    out.flush().or_raise(|| ErrorKind::Output)
}

fn write_document(out: &mut impl Write, document: Document) -> Result<()> {
    serde_json::to_writer(&mut *out, &document.into_value()).or_raise(|| ErrorKind::Output)?;
    writeln!(out).or_raise(|| ErrorKind::Output)
}
