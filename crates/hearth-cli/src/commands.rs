use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use hearth_cache::Cache;
use hearth_server::{HearthServer, ServerConfig};
use hearth_store::{sweep_temp_files, Collection, CollectionOptions, PageRequest};
use tokio::net::TcpListener;
use tracing::warn;

use crate::cli::{Cli, Command, DumpArgs, OutputFormat, ServeArgs};

const BIND_RETRY_DELAY: Duration = Duration::from_secs(2);

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

pub fn run_command(cli: Cli, config: ServerConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args, config),
        Command::Sweep => cmd_sweep(&config),
        Command::Stats => cmd_stats(&config, &cli.format),
        Command::Dump(args) => cmd_dump(args, &config, &cli.format),
    }
}

fn cmd_serve(args: ServeArgs, mut config: ServerConfig) -> anyhow::Result<()> {
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind:?}"))?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(async move {
        let listener = bind_with_retry(config.bind_addr, args.bind_attempts, BIND_RETRY_DELAY).await?;
        println!(
            "{} hearth serving {} on {}",
            "✓".green().bold(),
            config.data_dir.display(),
            config.bind_addr.to_string().bold()
        );
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        HearthServer::new(config).serve(listener, shutdown).await?;
        Ok::<(), anyhow::Error>(())
    })
}

/// Bind `addr`, retrying a fixed number of times with a fixed delay.
pub async fn bind_with_retry(
    addr: SocketAddr,
    attempts: u32,
    delay: Duration,
) -> anyhow::Result<TcpListener> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if attempt < attempts => {
                warn!(%addr, attempt, error = %e, "bind failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("could not bind {addr} after {attempts} attempts")));
            }
        }
    }
}

fn cmd_sweep(config: &ServerConfig) -> anyhow::Result<()> {
    let removed = sweep_temp_files(&config.data_dir)?;
    println!(
        "{} removed {} temp file(s) from {}",
        "✓".green(),
        removed.to_string().bold(),
        config.data_dir.display()
    );
    Ok(())
}

/// Open a collection without migrating anything.
fn open_readonly(config: &ServerConfig, name: &str, cache: &mut Cache) -> anyhow::Result<Collection> {
    let options = CollectionOptions {
        migrate_legacy: false,
    };
    Ok(Collection::open_with(config.collection_path(name), cache, options)?)
}

fn cmd_stats(config: &ServerConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let mut cache = Cache::new();
    let mut counts = serde_json::Map::new();
    for name in &config.collections {
        let collection = open_readonly(config, name, &mut cache)?;
        let count = collection.count(&mut cache)?;
        let max_id = collection.get_max_id(&mut cache)?;
        counts.insert(name.clone(), serde_json::json!({ "records": count, "max_id": max_id }));
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::Value::Object(counts)),
        OutputFormat::Text => {
            for (name, stats) in &counts {
                println!(
                    "{:<16} {:>8} records  max id {}",
                    name.bold(),
                    stats["records"].to_string(),
                    stats["max_id"].to_string().dimmed()
                );
            }
        }
    }
    Ok(())
}

fn cmd_dump(args: DumpArgs, config: &ServerConfig, format: &OutputFormat) -> anyhow::Result<()> {
    if !config.collections.contains(&args.collection) {
        bail!("unknown collection {:?}", args.collection);
    }
    let mut cache = Cache::new();
    let collection = open_readonly(config, &args.collection, &mut cache)?;

    let mut request = PageRequest::new(args.page, args.limit).with_reverse(!args.forward);
    if let Some(search) = args.search {
        request = request.with_search(search);
    }
    let page = collection.fetch_page(&request)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&page)?),
        OutputFormat::Text => {
            for record in &page.records {
                println!("{}", serde_json::Value::Object(record.clone()));
            }
            println!(
                "{}",
                format!(
                    "page {} ({} per page), {} matching record(s)",
                    args.page, args.limit, page.total
                )
                .dimmed()
            );
        }
    }
    Ok(())
}
