//! adminfs command-line front end
//!
//! Runs the privileged helper and an unprivileged worker in one process,
//! connected by the in-process bus, and performs one filesystem call.

use adminfs_authorization::{AuthorizationDebounce, AuthorizationGate, StaticAuthority};
use adminfs_core::{AdminConfig, CallerId, JobFlags, Locator};
use adminfs_helper::{Dispatcher, LocalBus};
use adminfs_worker::WorkerProxy;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod host;

use host::TerminalHost;

#[derive(Parser)]
#[command(name = "adminfs")]
#[command(about = "Privileged filesystem operations behind an authorization gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Caller identity presented to the authority
    #[arg(long, global = true, default_value = "local")]
    caller: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory as JSON lines
    Ls {
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Describe a file as one JSON line
    Stat {
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Print a file to stdout
    Cat {
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Write stdin to a file
    Put {
        #[arg(value_parser = parse_locator)]
        path: Locator,
        /// Permission bits of the written file, in octal
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<u32>,
        /// Replace an existing file
        #[arg(long)]
        overwrite: bool,
        /// Append to an existing file
        #[arg(long)]
        resume: bool,
    },
    /// Copy a file
    Cp {
        #[arg(value_parser = parse_locator)]
        src: Locator,
        #[arg(value_parser = parse_locator)]
        dst: Locator,
        /// Permission bits of the copy, in octal
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<u32>,
        /// Replace an existing destination
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a file or a directory tree
    Rm {
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Rename a file
    Mv {
        #[arg(value_parser = parse_locator)]
        src: Locator,
        #[arg(value_parser = parse_locator)]
        dst: Locator,
        /// Replace an existing destination
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a directory
    Mkdir {
        #[arg(value_parser = parse_locator)]
        path: Locator,
        /// Permission bits, in octal
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<u32>,
    },
    /// Change permission bits
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Change owner and group, given as OWNER[:GROUP] or :GROUP
    Chown {
        owner: String,
        #[arg(value_parser = parse_locator)]
        path: Locator,
    },
    /// Block until the caller's authorization lapses
    WaitExpiry,
}

fn parse_locator(input: &str) -> std::result::Result<Locator, String> {
    let looks_relative = !input.contains(':') && !input.starts_with('/');
    if looks_relative {
        let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
        return Locator::from_path(cwd.join(input)).map_err(|e| e.to_string());
    }
    Locator::parse(input).map_err(|e| e.to_string())
}

fn parse_mode(input: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(input.trim_start_matches("0o"), 8)
        .map_err(|_| format!("'{input}' is not an octal mode"))
}

fn split_owner(owner: &str) -> (&str, &str) {
    owner.split_once(':').unwrap_or((owner, ""))
}

fn load_config(path: Option<&Path>) -> Result<AdminConfig> {
    let mut config = match path {
        Some(path) => AdminConfig::load_from_file(path)?,
        None => AdminConfig::default(),
    };
    config.merge_with_env()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(load_config(cli.config.as_deref()).context("invalid configuration")?);
    let authority = Arc::new(StaticAuthority::from_config(&config.authority));
    let gate = AuthorizationGate::new(authority, config.action_id.as_str());
    let dispatcher = Dispatcher::new(gate.clone(), config.clone());
    let (bus, service) = LocalBus::spawn(dispatcher, config.max_message_size);

    let caller = CallerId::new(cli.caller);
    let proxy = WorkerProxy::new(
        Arc::new(bus.clone()),
        caller,
        AuthorizationDebounce::new(config.honor_window()),
        config.clone(),
    )
    .with_gate(gate);

    let killed = Arc::new(AtomicBool::new(false));
    let interrupt = killed.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            interrupt.store(true, Ordering::SeqCst);
        }
    });
    let host = TerminalHost::stdio(config.transfer_chunk_size, killed);

    let outcome = run(&proxy, &host, cli.command).await;
    bus.shutdown().await;
    if let Err(err) = service.await {
        warn!(error = %err, "helper bus task failed");
    }
    outcome?;
    info!("done");
    Ok(())
}

async fn run<W, R>(proxy: &WorkerProxy, host: &TerminalHost<W, R>, command: Commands) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let flags = |overwrite: bool, resume: bool| {
        let mut flags = JobFlags::NONE;
        if overwrite {
            flags = flags | JobFlags::OVERWRITE;
        }
        if resume {
            flags = flags | JobFlags::RESUME;
        }
        flags
    };

    match command {
        Commands::Ls { path } => proxy.list_dir(path, host).await?,
        Commands::Stat { path } => proxy.stat(path, host).await?,
        Commands::Cat { path } => proxy.get(path, host).await?,
        Commands::Put {
            path,
            mode,
            overwrite,
            resume,
        } => {
            proxy
                .put(path, mode, flags(overwrite, resume), host)
                .await?;
        }
        Commands::Cp {
            src,
            dst,
            mode,
            overwrite,
        } => {
            proxy
                .copy(src, dst, mode, flags(overwrite, false), host)
                .await?;
        }
        Commands::Rm { path } => proxy.del(path, host).await?,
        Commands::Mv {
            src,
            dst,
            overwrite,
        } => proxy.rename(src, dst, flags(overwrite, false), host).await?,
        Commands::Mkdir { path, mode } => proxy.mkdir(path, mode, host).await?,
        Commands::Chmod { mode, path } => proxy.chmod(path, mode, host).await?,
        Commands::Chown { owner, path } => {
            let (owner, group) = split_owner(&owner);
            proxy.chown(path, owner, group, host).await?;
        }
        Commands::WaitExpiry => proxy.wait_until_authorization_expired(host).await?,
    }
    Ok(())
}
