//! Plainflow CLI - send tracking calls and manage the local retry queue.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plainflow::{
    AliasCall, Dispatch, GroupCall, IdentifyCall, Integration, PageCall, Paths, Plainflow,
    PlainflowConfig, RuntimeEnvironment, TrackCall,
};
use plainflow_config::init_logging;
use serde_json::{Map, Value};

/// Plainflow command-line interface.
#[derive(Parser)]
#[command(name = "plainflow")]
#[command(about = "Send Plainflow tracking calls from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, storage, and logs. Defaults to ~/.plainflow
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Page URL the calls originate from
    #[arg(long, global = true)]
    url: Option<String>,

    /// Current host when no URL is given
    #[arg(long, global = true, default_value = "localhost")]
    host: String,

    /// Seconds to wait for queued calls to be delivered
    #[arg(long, global = true, default_value_t = 10)]
    wait_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a track call
    Track {
        event: String,
        /// Properties as a JSON object
        #[arg(short, long)]
        properties: Option<String>,
    },
    /// Send an identify call
    Identify {
        user_id: Option<String>,
        /// Traits as a JSON object
        #[arg(short, long)]
        traits: Option<String>,
    },
    /// Send a page call
    Page {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Properties as a JSON object
        #[arg(short, long)]
        properties: Option<String>,
    },
    /// Send a group call
    Group {
        group_id: String,
        /// Traits as a JSON object
        #[arg(short, long)]
        traits: Option<String>,
    },
    /// Send an alias call
    Alias {
        to: String,
        #[arg(long)]
        from: Option<String>,
    },
    /// Resolve the cross-domain id against the configured servers
    ResolveId,
    /// Show pending retry queue entries
    QueueStatus,
    /// Deliver pending retry queue entries
    Drain,
}

fn parse_object(raw: Option<&str>, what: &str) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).with_context(|| format!("{what} must be valid JSON"))? {
        Value::Object(map) => Ok(map),
        _ => bail!("{what} must be a JSON object"),
    }
}

fn environment(cli: &Cli) -> Result<RuntimeEnvironment> {
    match &cli.url {
        Some(url) => RuntimeEnvironment::parse(url).with_context(|| format!("invalid --url {url}")),
        None => Ok(RuntimeEnvironment::for_hostname(cli.host.clone())),
    }
}

async fn report(plainflow: &Plainflow, dispatch: Dispatch, wait: Duration) -> Result<()> {
    match dispatch {
        Dispatch::Delivered(response) => println!("Delivered (HTTP {})", response.status),
        Dispatch::Queued { sequence } => {
            println!("Queued as #{sequence}");
            let summary = plainflow.drain(wait).await?;
            println!(
                "Delivered: {}, abandoned: {}, still pending: {}",
                summary.delivered, summary.abandoned, summary.remaining
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.base_dir {
        Some(base) => Paths::with_base_dir(base.clone()),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = PlainflowConfig::load(&paths)?;
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, &paths);

    let plainflow = Plainflow::from_config(config, &paths, environment(&cli)?)?;
    let wait = Duration::from_secs(cli.wait_secs);

    match cli.command {
        Commands::Track {
            ref event,
            ref properties,
        } => {
            let call = TrackCall {
                properties: parse_object(properties.as_deref(), "properties")?,
                ..TrackCall::new(event.clone())
            };
            let dispatch = plainflow.track(call).await?;
            report(&plainflow, dispatch, wait).await?;
        }
        Commands::Identify {
            ref user_id,
            ref traits,
        } => {
            let call = IdentifyCall {
                user_id: user_id.clone(),
                traits: parse_object(traits.as_deref(), "traits")?,
                ..IdentifyCall::default()
            };
            let dispatch = plainflow.identify(call).await?;
            report(&plainflow, dispatch, wait).await?;
        }
        Commands::Page {
            ref category,
            ref name,
            ref properties,
        } => {
            let call = PageCall {
                category: category.clone(),
                name: name.clone(),
                properties: parse_object(properties.as_deref(), "properties")?,
                ..PageCall::default()
            };
            let dispatch = plainflow.page(call).await?;
            report(&plainflow, dispatch, wait).await?;
        }
        Commands::Group {
            ref group_id,
            ref traits,
        } => {
            let call = GroupCall {
                traits: parse_object(traits.as_deref(), "traits")?,
                ..GroupCall::new(group_id.clone())
            };
            let dispatch = plainflow.group(call).await?;
            report(&plainflow, dispatch, wait).await?;
        }
        Commands::Alias { ref to, ref from } => {
            let call = AliasCall {
                from: from.clone(),
                ..AliasCall::new(to.clone())
            };
            let dispatch = plainflow.alias(call).await?;
            report(&plainflow, dispatch, wait).await?;
        }
        Commands::ResolveId => {
            let resolved = plainflow.retrieve_cross_domain_id().await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            let summary = plainflow.drain(wait).await?;
            if summary.remaining > 0 {
                println!("Identify still pending: {}", summary.remaining);
            }
        }
        Commands::QueueStatus => {
            println!("Pending: {}", plainflow.pending_count()?);
            match plainflow.cross_domain_id()? {
                Some(id) => println!("Cross-domain id: {} (from {})", id.cross_domain_id, id.from_domain),
                None => println!("Cross-domain id: not resolved"),
            }
        }
        Commands::Drain => {
            let summary = plainflow.drain(wait).await?;
            println!(
                "Delivered: {}, abandoned: {}, still pending: {}",
                summary.delivered, summary.abandoned, summary.remaining
            );
        }
    }

    Ok(())
}
