//! modbar - headless status panel engine
//!
//! Runs the configured modules and writes one JSON object per update to
//! stdout, for a bar renderer (or a human) to consume. Real-time signals
//! `SIGRTMIN+N` refresh the modules configured with `"signal": N`.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use modbar::config::watcher::ConfigWatcher;
use modbar::models::module_spec::MAX_SIGNAL_OFFSET;
use modbar::store::{SlotState, StoreEvent};
use modbar::{Config, ConfigLoader, Engine, ModuleStatus, RenderState, ShellRunner, SourceRegistry};

/// Application configuration
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug mode
    debug: bool,
    /// Print the first round of updates and exit
    once: bool,
}

impl AppArgs {
    /// Parse command line arguments
    fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    if i + 1 < args.len() {
                        app_args.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    } else {
                        anyhow::bail!("Missing config file path");
                    }
                }
                "--debug" | "-d" => {
                    app_args.debug = true;
                }
                "--once" => {
                    app_args.once = true;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("modbar v{}", modbar::VERSION);
                    process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    anyhow::bail!("Unknown option: {}", arg);
                }
                _ => {
                    warn!("Ignoring positional argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Ok(app_args)
    }
}

/// Print help information
fn print_help() {
    println!("modbar - module engine for script-driven status panels");
    println!();
    println!("USAGE:");
    println!("    modbar [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("        --once             Print one round of module output and exit");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    modbar looks for config, config.jsonc, config.json or config.toml in:");
    println!("    1. Path specified with --config");
    println!("    2. $XDG_CONFIG_HOME/modbar/");
    println!("    3. ~/.config/modbar/");
    println!("    4. /etc/xdg/modbar/");
    println!();
    println!("SIGNALS:");
    println!("    SIGRTMIN+N             Refresh modules configured with \"signal\": N");
    println!("    SIGINT, SIGTERM        Stop all modules and exit");
    println!();
    println!("ENVIRONMENT:");
    println!("    MODBAR_DEBUG           Enable debug mode (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

/// One line of output
#[derive(Serialize)]
struct UpdateLine<'a> {
    module: &'a str,
    status: ModuleStatus,
    #[serde(flatten)]
    state: Option<&'a RenderState>,
}

fn emit(module: &str, slot: &SlotState) {
    let line = UpdateLine {
        module,
        status: slot.status,
        state: slot.render.as_deref(),
    };
    match serde_json::to_string(&line) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize update for {}: {}", module, e),
    }
}

fn load_configuration(args: &AppArgs) -> Result<(PathBuf, Config)> {
    match &args.config_path {
        Some(path) => {
            let config = ConfigLoader::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok((path.clone(), config))
        }
        None => ConfigLoader::load().context("no usable configuration found"),
    }
}

/// Forward `SIGRTMIN+1 ..= SIGRTMIN+MAX` as offsets
fn listen_refresh_signals() -> mpsc::UnboundedReceiver<i32> {
    let (tx, rx) = mpsc::unbounded_channel();
    let base = nix::libc::SIGRTMIN();
    for offset in 1..=MAX_SIGNAL_OFFSET {
        let mut stream = match signal(SignalKind::from_raw(base + offset)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot listen on SIGRTMIN+{}: {}", offset, e);
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(offset).is_err() {
                    break;
                }
            }
        });
    }
    rx
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<modbar::Result<Config>> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

/// Print each module's first update, then stop
async fn run_once(engine: Engine) -> Result<()> {
    let store = engine.store();
    let deadline = engine.settings().exec_timeout + Duration::from_secs(1);
    let mut pending: Vec<String> = store.module_ids().to_vec();
    let mut events = store.events().subscribe();

    let settled = tokio::time::timeout(deadline, async {
        loop {
            pending.retain(|id| match store.slot(id) {
                Some(slot) => {
                    (slot.render.is_none() && slot.status == ModuleStatus::Active)
                        || slot.status == ModuleStatus::Gating
                }
                None => false,
            });
            if pending.is_empty() || events.recv().await.is_none() {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        warn!("Some modules produced no output within {:?}", deadline);
    }

    for (id, slot) in store.snapshot() {
        emit(&id, &slot);
    }
    engine.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("Failed to parse arguments: {}", e);
        print_help();
        process::exit(1);
    });

    // Initialize logging based on debug flag; stdout carries updates
    let log_level = if args.debug
        || env::var("MODBAR_DEBUG").is_ok_and(|v| v == "1" || v.to_lowercase() == "true")
    {
        "debug"
    } else {
        "info"
    };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!("Starting {} v{}", modbar::NAME, modbar::VERSION);
    debug!("Debug mode enabled");

    let (config_path, config) = load_configuration(&args)?;
    info!("Loaded configuration from {}", config_path.display());

    let runner = Arc::new(ShellRunner::new());
    let sources = SourceRegistry::with_defaults();
    let mut engine = Engine::start(&config, runner, sources)?;

    if args.once {
        return run_once(engine).await;
    }

    let mut watcher = match ConfigWatcher::new(config_path.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Config reload disabled: {}", e);
            None
        }
    };

    let mut refresh_signals = listen_refresh_signals();
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut events = engine.store().events().subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("Terminated");
                break;
            }
            Some(offset) = refresh_signals.recv() => {
                debug!("Received SIGRTMIN+{}", offset);
                if let Err(e) = engine.signal(offset) {
                    error!("Failed to deliver signal: {}", e);
                }
            }
            event = events.recv() => match event {
                Some(StoreEvent::Updated { module }) | Some(StoreEvent::StatusChanged { module, .. }) => {
                    if let Some(slot) = engine.store().slot(&module) {
                        emit(&module, &slot);
                    }
                }
                None => break,
            },
            Some(reloaded) = next_reload(&mut watcher) => match reloaded {
                Ok(config) => {
                    engine = engine.reload(&config).await?;
                    events = engine.store().events().subscribe();
                }
                Err(e) => warn!("Keeping current configuration: {}", e),
            },
        }
    }

    engine.shutdown().await?;
    info!("Goodbye");
    Ok(())
}
