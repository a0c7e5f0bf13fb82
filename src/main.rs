//! Companion Agent CLI
//!
//! Walk with the daemon, or open the tunnel to its home.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use companion_agent::{
    config::{ConfigStore, TunnelConfig, DEFAULT_PORT},
    core::{status_line, MessagePool, MovementDaemon},
    journal::{JourneyLog, JourneyStats},
    notify::{ConsoleSurface, NotificationSurface, QueuedSurface},
    source::{FixInput, JsonLinesSource, NoopSource, PositionFix},
    tunnel::{
        BrowserPresenter, Readiness, RetryPolicy, SupervisorSettings, TunnelEvent,
        TunnelSupervisor,
    },
    PRINCIPLES, VERSION,
};
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "companion")]
#[command(version = VERSION)]
#[command(about = "A background companion that walks with you", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track movement from a stream of position fixes
    Walk {
        /// JSON-lines fix input, `-` for stdin. Without it no location is available.
        #[arg(long)]
        fixes: Option<String>,

        /// Seed for message selection (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,

        /// Override the daemon's display name for this run
        #[arg(long)]
        name: Option<String>,
    },

    /// Save tunnel connection parameters
    Setup {
        /// Remote host (user@ip)
        #[arg(long)]
        host: String,

        /// SSH identity file
        #[arg(long)]
        identity_file: Option<PathBuf>,

        /// Port of the web interface on the remote host
        #[arg(long, default_value_t = DEFAULT_PORT)]
        remote_port: u16,
    },

    /// Open the tunnel and show the remote interface
    Connect {
        /// Total connection attempts before giving up (1 = no automatic retry)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        attempts: u32,

        /// Use the fixed settle delay instead of probing the forwarded port
        #[arg(long)]
        settle: bool,

        /// Open the interface in the system browser once ready
        #[arg(long)]
        open: bool,
    },

    /// Set the daemon's display name
    Name {
        name: String,
    },

    /// Show configuration and journey statistics
    Status,

    /// Show configuration
    Config,

    /// What the companion keeps, and what it never keeps
    About,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = ConfigStore::default_location();

    match cli.command {
        Commands::Walk { fixes, seed, name } => cmd_walk(&store, fixes, seed, name),
        Commands::Setup {
            host,
            identity_file,
            remote_port,
        } => cmd_setup(&store, host, identity_file, remote_port),
        Commands::Connect {
            attempts,
            settle,
            open,
        } => cmd_connect(&store, attempts, settle, open),
        Commands::Name { name } => cmd_name(&store, &name),
        Commands::Status => cmd_status(&store),
        Commands::Config => cmd_config(&store),
        Commands::About => {
            println!("{PRINCIPLES}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("COMPANION_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The fix source picked for a walk.
enum ActiveSource {
    Stream(JsonLinesSource),
    Unavailable(NoopSource),
}

impl ActiveSource {
    fn receiver(&self) -> Receiver<PositionFix> {
        match self {
            ActiveSource::Stream(source) => source.receiver().clone(),
            ActiveSource::Unavailable(source) => source.receiver().clone(),
        }
    }

    /// Whether more fixes may still arrive.
    fn may_produce(&self) -> bool {
        match self {
            ActiveSource::Stream(source) => source.is_running(),
            // An unavailable provider may come back; keep idling.
            ActiveSource::Unavailable(_) => true,
        }
    }

    fn stop(&mut self) {
        match self {
            ActiveSource::Stream(source) => source.stop(),
            ActiveSource::Unavailable(source) => source.stop(),
        }
    }
}

fn cmd_walk(
    store: &ConfigStore,
    fixes: Option<String>,
    seed: Option<u64>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let config = store.load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config, using defaults: {e}");
        Default::default()
    });
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let name = name.unwrap_or_else(|| config.daemon_name.clone());
    println!("Companion Agent v{VERSION}");
    println!();
    println!("  Name: {name}");
    println!(
        "  Thresholds: calm ≤ {}m, content ≤ {}m, message every {}m",
        config.movement.mood.calm_max_m,
        config.movement.mood.content_max_m,
        config.movement.notify_every_m
    );

    let mut source = match fixes {
        Some(arg) => {
            let mut source = JsonLinesSource::new(FixInput::from_arg(&arg));
            source
                .start()
                .with_context(|| format!("could not read fixes from {arg}"))?;
            println!("  Fixes: {arg}");
            ActiveSource::Stream(source)
        }
        None => {
            let mut source = NoopSource::new("no fix input given");
            source.start()?;
            println!("  Fixes: none (idle)");
            ActiveSource::Unavailable(source)
        }
    };
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let journal = Arc::new(JourneyLog::open(config.journal_path()));
    let surface: Arc<dyn NotificationSurface> =
        Arc::new(QueuedSurface::new(Arc::new(ConsoleSurface::new()), 64));

    let mut daemon = MovementDaemon::new(name.clone(), config.movement, surface)
        .with_journal(journal.clone());
    if let Some(seed) = seed {
        daemon = daemon.with_messages(MessagePool::seeded(seed));
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let receiver = source.receiver();
    daemon.start(receiver.clone())?;

    // The daemon itself would idle at end of input; a walk ends there.
    while running.load(Ordering::SeqCst) {
        if !source.may_produce() && receiver.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    source.stop();
    let snapshot = daemon.stop();
    // Flushes the notification queue before the summary is printed.
    drop(daemon);

    println!();
    println!("Final: {}", status_line(&name, &snapshot));

    if let Err(e) = journal.save() {
        eprintln!("Warning: Could not save journey log: {e}");
    }
    println!();
    println!("{}", journal.summary());
    Ok(())
}

fn cmd_setup(
    store: &ConfigStore,
    host: String,
    identity_file: Option<PathBuf>,
    remote_port: u16,
) -> anyhow::Result<()> {
    let tunnel = TunnelConfig::new(host)
        .with_identity_file(identity_file.unwrap_or_default())
        .with_remote_port(remote_port);

    let config = store
        .save_tunnel(tunnel)
        .context("tunnel parameters not saved")?;

    if let Some(tunnel) = config.tunnel {
        println!(
            "Saved: {} → 127.0.0.1:{} forwards to port {}",
            tunnel.host, tunnel.local_port, tunnel.remote_port
        );
    }
    println!("Run `companion connect` to open the tunnel.");
    Ok(())
}

fn cmd_connect(store: &ConfigStore, attempts: u32, settle: bool, open: bool) -> anyhow::Result<()> {
    let config = store.load().context("could not load config")?;
    let Some(tunnel) = config.tunnel else {
        bail!("no tunnel configured; run `companion setup --host user@host` first");
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start async runtime")?;

    let settings = SupervisorSettings {
        readiness: if settle {
            Readiness::settle()
        } else {
            Readiness::default()
        },
        retry: RetryPolicy::exponential(attempts),
        ..SupervisorSettings::default()
    };
    let supervisor = TunnelSupervisor::new(runtime.handle().clone(), settings);
    let mut presenter = BrowserPresenter::new(open);

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    supervisor.connect(&tunnel)?;

    let mut outcome = Ok(());
    while running.load(Ordering::SeqCst) {
        let delivered = supervisor.pump(&mut presenter);
        if let Some(event) = delivered.iter().find(|event| {
            matches!(
                event,
                TunnelEvent::Failed { .. } | TunnelEvent::Closed { .. }
            )
        }) {
            if let TunnelEvent::Failed { reason } = event {
                outcome = Err(anyhow::anyhow!("tunnel failed: {reason}"));
            }
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    supervisor.teardown();
    drop(supervisor);
    runtime.shutdown_timeout(Duration::from_secs(1));
    outcome
}

fn cmd_name(store: &ConfigStore, name: &str) -> anyhow::Result<()> {
    let config = store
        .save_daemon_name(name)
        .context("name not saved")?;
    println!("The daemon is now called {}.", config.daemon_name);
    Ok(())
}

fn cmd_status(store: &ConfigStore) -> anyhow::Result<()> {
    let config = store.load().unwrap_or_default();

    println!("Companion Agent Status");
    println!("======================");
    println!();
    println!("Name: {}", config.daemon_name);
    println!();

    println!("Tunnel:");
    match &config.tunnel {
        Some(tunnel) => {
            println!("  Host: {}", tunnel.host);
            println!(
                "  Identity file: {}",
                tunnel
                    .identity_file_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(ssh default)".to_string())
            );
            println!("  Forward: 127.0.0.1:{} → remote {}", tunnel.local_port, tunnel.remote_port);
        }
        None => println!("  Not configured"),
    }
    println!();

    match JourneyStats::load(&config.journal_path()) {
        Ok(Some(stats)) => {
            println!("Cumulative Statistics:");
            println!("  Fixes processed: {}", stats.fixes_processed);
            println!("  Messages emitted: {}", stats.messages_emitted);
            println!("  Lifetime distance: {:.1} km", stats.lifetime_distance_m() / 1000.0);
            if let Some(updated_at) = stats.updated_at {
                println!("  Last walk: {}", updated_at.format("%Y-%m-%d %H:%M"));
            }
        }
        Ok(None) => println!("No previous walk found."),
        Err(e) => eprintln!("Warning: could not read journey log: {e}"),
    }
    Ok(())
}

fn cmd_config(store: &ConfigStore) -> anyhow::Result<()> {
    let config = store.load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", store.path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("could not render config")?
    );
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
