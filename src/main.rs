use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};

use kdev_browser::{CacheKey, Controller, Kubectl, PortMapping, ResourceCache};

mod commands;
mod config;

use commands::ActivityLog;
use config::KdevConfig;

/// kdev - kubectl session helper with a cached resource browser
#[derive(Parser, Debug)]
#[command(name = "kdev")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.config/kdev/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Credentials file exported to kubectl as KUBECONFIG
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Cache document location
    #[arg(long, global = true, value_name = "PATH")]
    cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// Bypass the cache and fetch a fresh listing
    #[arg(long)]
    refresh: bool,

    /// Print only the first entry matching this abbreviation
    #[arg(long, value_name = "QUERY")]
    filter: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
struct PodArgs {
    context: String,
    namespace: String,
    pod: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List kubeconfig contexts
    Contexts(ListArgs),

    /// List the namespaces of a context
    Namespaces {
        context: String,
        #[command(flatten)]
        list: ListArgs,
    },

    /// List the pods of a namespace
    Pods {
        context: String,
        namespace: String,
        #[command(flatten)]
        list: ListArgs,
    },

    /// Switch kubectl to a context, and optionally a namespace
    Use {
        context: String,
        namespace: Option<String>,
    },

    /// List the containers of a pod
    Containers(PodArgs),

    /// Print the last lines of a pod's log
    Logs {
        #[command(flatten)]
        target: PodArgs,
        /// Container to read, required for multi-container pods
        #[arg(short, long)]
        container: Option<String>,
        /// Number of lines (default from config)
        #[arg(long)]
        tail: Option<u32>,
    },

    /// Print a summary of a pod
    Describe(PodArgs),

    /// Delete a pod and list what remains
    Delete(PodArgs),

    /// Open a shell inside a pod
    Exec(PodArgs),

    /// Forward a local port to a pod until interrupted
    PortForward {
        #[command(flatten)]
        target: PodArgs,
        /// LOCAL:REMOTE
        mapping: PortMapping,
    },

    /// Copy a local file into a pod
    Upload {
        #[command(flatten)]
        target: PodArgs,
        local: PathBuf,
        /// In-pod destination (default: <upload_dir>/<file name>)
        remote: Option<String>,
    },

    /// Copy a file out of a pod
    Download {
        #[command(flatten)]
        target: PodArgs,
        remote: String,
        /// Local destination (default: <download_dir>/download<date>_<file name>)
        local: Option<PathBuf>,
    },

    /// Drop one cache entry, e.g. `pods::prod::default`
    Invalidate { key: CacheKey },

    /// Print the cache document location
    CachePath,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = KdevConfig::load(args.config.as_deref())?;
    let cache_path = args.cache.clone().unwrap_or_else(|| config.cache_path());

    if let Command::CachePath = args.command {
        println!("{}", cache_path.display());
        return Ok(());
    }

    let cache = Arc::new(ResourceCache::open(&cache_path)?);
    let kubectl = Kubectl::new(config.locator())
        .with_lookup_dirs(config.lookup_dirs.iter().cloned())
        .with_kubeconfig(args.kubeconfig.clone().or_else(|| config.kubeconfig.clone()));
    let controller = Controller::new(kubectl, cache, Arc::new(ActivityLog));

    let result = commands::run(&controller, &config, args.command).await;
    controller.shutdown();
    result
}
