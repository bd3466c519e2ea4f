//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rvs", version, about = "Versioned resources and page collections")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (JSON, TOML or YAML). Searched for when omitted.
    #[arg(short, long, global = true, env = "RVS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Versioned resource bundles
    #[command(subcommand)]
    Resource(ResourceCommand),
    /// Metadata collections
    #[command(subcommand)]
    Collection(CollectionCommand),
}

#[derive(Args, Debug, Clone)]
pub struct ResourceArgs {
    pub name: String,
    #[arg(id = "resource_version", value_name = "VERSION")]
    pub version: String,
}

#[derive(Subcommand, Debug)]
pub enum ResourceCommand {
    /// Make sure a resource is available locally and print its path
    Load(ResourceArgs),
    /// Archive the local copy of a resource and upload it
    Upload(ResourceArgs),
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommand {
    /// Print every id in a collection
    Ids { collection: String },
    /// Print documents as JSON lines
    Dump {
        collection: String,
        /// Only include these fields (repeatable)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },
    /// Print the documents with the given ids as JSON lines
    Get {
        collection: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}
