//! Page Engagement Agent CLI
//!
//! Replays page visits through the tracker and optimizer, and inspects what
//! they left in local storage.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use page_engagement_agent::{
    config::Config,
    optimizer::{load_leads, PagePresenter, PresenterEvent},
    runtime::{PageRuntime, RuntimeParts},
    script::{apply, Script},
    sink::{NoopSink, SharedSink},
    storage::{keys, load_json, FileStorage, StorageScopes, PERSISTENT_FILE},
    tracker::{AnalyticsSnapshot, AnalyticsSummary},
    transparency::create_shared_log_with_persistence,
    DATA_DECLARATION, VERSION,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "gateway")]
use page_engagement_agent::{BlockingGatewayClient, GatewayConfig};

#[derive(Parser)]
#[command(name = "page-engagement")]
#[command(version = VERSION)]
#[command(about = "Page-behavior tracker and experience optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted page visit
    Simulate {
        /// Path to the visit script (JSON)
        script: PathBuf,

        /// Play the script against the wall clock instead of instantly
        #[arg(long)]
        realtime: bool,
    },

    /// Show the stored analytics snapshot and cumulative statistics
    Status,

    /// List captured leads
    Leads,

    /// Display data declaration
    Privacy,

    /// Show configuration
    Config,

    /// Delete local storage and statistics
    Reset,

    /// Run an analytics collector (requires server feature)
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "7070")]
        port: u16,

        /// JSON-lines file batches are appended to
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Bearer token required on ingest
        #[arg(long)]
        token: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "page_engagement_agent=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { script, realtime } => {
            cmd_simulate(&script, realtime);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Leads => {
            cmd_leads();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Reset => {
            cmd_reset();
        }
        Commands::Serve {
            port,
            output,
            token,
        } => {
            cmd_serve(port, output, token);
        }
    }
}

fn cmd_simulate(path: &Path, realtime: bool) {
    println!("Page Engagement Agent v{VERSION}");
    println!();

    let script = match Script::load(path) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("Error loading script {path:?}: {e}");
            std::process::exit(1);
        }
    };

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let storage = match StorageScopes::open(&config.data_path) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Warning: Could not open local storage ({e}), using memory only");
            StorageScopes::in_memory()
        }
    };

    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let sink = build_sink(&config);

    let mut parts = RuntimeParts::new(config.clone(), PagePresenter::new(script.product_cards));
    parts.storage = storage;
    parts.sink = sink;
    parts.transparency = transparency.clone();
    parts.environment = script.environment.clone().unwrap_or_default();
    if parts.environment.user_agent.is_empty() {
        parts.environment.user_agent = default_user_agent();
    }

    println!("Replaying {} steps over {:.1}s", script.steps.len(), script.duration().as_secs_f64());
    println!("  Page: {}", parts.environment.url);
    println!("  Product cards: {}", script.product_cards);
    println!(
        "  Mode: {}",
        if realtime { "realtime" } else { "simulated clock" }
    );
    println!();

    let summary = if realtime {
        run_realtime(&script, parts)
    } else {
        run_simulated(&script, parts)
    };

    println!();
    print_summary(&summary);

    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency.summary());
}

fn run_simulated(script: &Script, parts: RuntimeParts<PagePresenter>) -> AnalyticsSummary {
    let mut runtime = PageRuntime::simulated(parts, chrono::Utc::now());
    let start = runtime.now();
    let mut printed = 0;

    script.play(&mut runtime, |_, rt| {
        printed = print_presenter_history(rt, start, printed);
    });

    let summary = runtime.shutdown();
    print_presenter_history(&runtime, start, printed);
    summary
}

fn run_realtime(script: &Script, parts: RuntimeParts<PagePresenter>) -> AnalyticsSummary {
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    println!("Press Ctrl+C to stop");
    println!();

    let mut runtime = PageRuntime::live(parts);
    let start = runtime.now();
    let started = Instant::now();
    let mut printed = 0;

    let wait_until = |runtime: &mut PageRuntime<PagePresenter>, offset: Duration, printed: &mut usize| {
        while running.load(Ordering::SeqCst) && started.elapsed() < offset {
            runtime.run_pending();
            *printed = print_presenter_history(runtime, start, *printed);
            thread::sleep(Duration::from_millis(50).min(offset.saturating_sub(started.elapsed())));
        }
        running.load(Ordering::SeqCst)
    };

    for step in script.ordered_steps() {
        if !wait_until(&mut runtime, Duration::from_millis(step.at_ms), &mut printed) {
            break;
        }
        apply(&mut runtime, &step.input);
        printed = print_presenter_history(&runtime, start, printed);
    }
    wait_until(&mut runtime, script.duration(), &mut printed);

    println!();
    println!("Unloading page...");
    let summary = runtime.shutdown();
    print_presenter_history(&runtime, start, printed);
    summary
}

/// Print presenter events after index `from`; returns the new index.
fn print_presenter_history(
    runtime: &PageRuntime<PagePresenter>,
    start: chrono::DateTime<chrono::Utc>,
    from: usize,
) -> usize {
    let history = runtime.optimizer().presenter().history();
    let offset = (runtime.now() - start).num_milliseconds() as f64 / 1000.0;
    for event in history.iter().skip(from) {
        match event {
            PresenterEvent::Rendered(i) => {
                println!("[{offset:>7.1}s] show    {} {}", i.id, i.kind.label());
            }
            PresenterEvent::Updated(i) => {
                tracing::debug!(id = %i.id, "intervention updated");
            }
            PresenterEvent::Dismissed(id) => {
                println!("[{offset:>7.1}s] dismiss {id}");
            }
        }
    }
    history.len()
}

fn print_summary(summary: &AnalyticsSummary) {
    let profile = &summary.user_profile;
    let revenue = &summary.revenue;

    println!("Session {}", summary.session.id);
    println!("  Duration: {:.1}s", summary.session.duration as f64 / 1000.0);
    println!("  Engagement: {}", profile.engagement_level);
    println!("  Page views: {}", profile.page_views);
    println!("  Scroll depth: {}%", profile.scroll_depth);
    if !profile.interests.is_empty() {
        println!("  Interests: {}", profile.interests.join(", "));
    }
    if let Some(range) = profile.price_range {
        println!("  Price range: {:.2} - {:.2}", range.min, range.max);
    }
    println!(
        "  Revenue potential: {:.2} ({} affiliate, {} premium, {} subscriptions)",
        revenue.total_potential,
        revenue.affiliate_clicks,
        revenue.premium_interest,
        revenue.subscriptions
    );
    println!("  Conversion score: {}", revenue.conversion_score);
    println!("  Conversion probability: {:.0}%", summary.conversion_probability);
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Page Engagement Agent Status");
    println!("============================");
    println!();

    println!("Configuration:");
    println!("  Data path: {:?}", config.data_path);
    println!(
        "  Collector: {}",
        config.collector_url.as_deref().unwrap_or("none")
    );
    println!("  Flush interval: {}s", config.tracker.flush_interval.as_secs());
    println!("  Delivery: {:?}", config.tracker.delivery);
    println!();

    let storage_path = config.data_path.join(PERSISTENT_FILE);
    match FileStorage::open(&storage_path) {
        Ok(storage) => match load_json::<AnalyticsSnapshot>(&storage, keys::ANALYTICS) {
            Ok(Some(snapshot)) => {
                println!("Last Snapshot:");
                println!("  Session: {}", snapshot.session_id);
                println!("  User: {}", snapshot.user_id);
                println!("  Saved: {}", snapshot.last_update.format("%Y-%m-%d %H:%M:%S"));
                println!("  Buffered events: {}", snapshot.events.len());
                println!("  Engagement: {}", snapshot.user_profile.engagement_level);
                println!("  Conversion score: {}", snapshot.revenue.conversion_score);
                println!();
            }
            Ok(None) => {
                println!("No stored snapshot found.");
                println!();
            }
            Err(e) => {
                eprintln!("Warning: Could not read stored snapshot: {e}");
                println!();
            }
        },
        Err(e) => eprintln!("Warning: Could not open {storage_path:?}: {e}"),
    }

    let stats_path = config.transparency_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (label, key) in [
                    ("Events recorded", "events_recorded"),
                    ("Flushes", "flushes"),
                    ("Events forwarded", "events_forwarded"),
                    ("Events dropped", "events_dropped"),
                    ("Interventions shown", "interventions_shown"),
                    ("Leads captured", "leads_captured"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_leads() {
    let config = Config::load().unwrap_or_default();
    let storage_path = config.data_path.join(PERSISTENT_FILE);

    let leads = match FileStorage::open(&storage_path) {
        Ok(storage) => load_leads(&storage),
        Err(e) => Err(e),
    };

    match leads {
        Ok(leads) if leads.is_empty() => {
            println!("No leads captured yet.");
        }
        Ok(leads) => {
            println!("{} lead(s):", leads.len());
            for lead in leads {
                println!(
                    "  {}  {:<12} {:<32} score {:.0}",
                    lead.at.format("%Y-%m-%d %H:%M:%S"),
                    lead.kind,
                    lead.email,
                    lead.user_score
                );
            }
        }
        Err(e) => {
            eprintln!("Error reading leads: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_privacy() {
    println!("{DATA_DECLARATION}");
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_reset() {
    let config = Config::load().unwrap_or_default();

    for path in [
        config.data_path.join(PERSISTENT_FILE),
        config.transparency_path(),
    ] {
        if !path.exists() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => println!("Removed {path:?}"),
            Err(e) => eprintln!("Error removing {path:?}: {e}"),
        }
    }
    println!("Local data cleared.");
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, output: Option<PathBuf>, token: Option<String>) {
    use page_engagement_agent::server::{run, ServerConfig};

    let config = Config::load().unwrap_or_default();
    let output = output.unwrap_or_else(|| config.data_path.join("collected.jsonl"));

    let mut server_config = ServerConfig::new(port, output.clone());
    if let Some(token) = token {
        server_config = server_config.with_token(token);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let (addr, shutdown_tx) = match run(server_config).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting collector: {e}");
                std::process::exit(1);
            }
        };

        println!("Collector listening on http://{addr}");
        println!("  Writing batches to {output:?}");
        println!();
        println!("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }
        let _ = shutdown_tx.send(());
        println!("Collector stopped.");
    });
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_port: u16, _output: Option<PathBuf>, _token: Option<String>) {
    eprintln!("Error: serve requires the server feature (rebuild with --features server)");
    std::process::exit(1);
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}

fn default_user_agent() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("page-engagement/{VERSION} ({host})")
}

/// Remote collector sink when one is configured.
fn build_sink(config: &Config) -> SharedSink {
    #[cfg(feature = "gateway")]
    if config.collector_url.is_some() {
        match GatewayConfig::from_config(config).and_then(BlockingGatewayClient::new) {
            Ok(client) => {
                println!("  Agent ID: {}", client.agent_id());
                match client.test_connection() {
                    Ok(true) => println!("  Collector connection: OK"),
                    Ok(false) => eprintln!("Warning: Collector health check failed"),
                    Err(e) => eprintln!("Warning: Could not connect to collector: {e}"),
                }
                return Arc::new(client);
            }
            Err(e) => {
                eprintln!("Warning: Collector client initialization failed: {e}");
                eprintln!("Continuing without forwarding.");
            }
        }
    }

    #[cfg(not(feature = "gateway"))]
    if config.collector_url.is_some() {
        eprintln!("Warning: collector_url ignored (gateway feature not enabled at compile time)");
    }

    Arc::new(NoopSink)
}
