use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sched", version, about = "Mini LLM serving runtime scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the ambient `/healthz`/`/metrics` HTTP surface.
    Serve(ServeArgs),
    /// Summarize a shadow-compare divergence JSONL log.
    ShadowReport(ShadowReportArgs),
    /// Compare two backends' already-produced token-id sequences.
    TokenParityReport(TokenParityReportArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
    /// ZMQ address the scheduler thread pulls `BackendMsg::User` admissions
    /// from. Omit to run the metrics surface only, with no scheduler loop.
    #[arg(long)]
    backend_addr: Option<String>,
}

#[derive(Args, Debug)]
struct ShadowReportArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = 10)]
    top: usize,
    #[arg(long, default_value_t = false)]
    allow_missing: bool,
}

#[derive(Args, Debug)]
struct TokenParityReportArgs {
    /// JSON input: `{backend_a, backend_b, sets: [{name, out_a, out_b, duration_a_s, duration_b_s}]}`.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::ShadowReport(args) => shadow_report(args),
        Commands::TokenParityReport(args) => token_parity_report(args),
    }
}

async fn serve(args: ServeArgs) {
    let config = sched_common::SchedConfig::load();

    if let Some(addr) = args.backend_addr.clone() {
        std::thread::spawn(move || run_scheduler_thread(&addr, &config));
    }

    let app = sched_api::app();
    let listener = tokio::net::TcpListener::bind(&args.bind).await.expect("bind address");
    tracing::info!(target: "sched-cli", "listening on http://{}", args.bind);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(target: "sched-cli", "shutdown signal received");
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.unwrap();
}

/// Owns the scheduler on a dedicated OS thread: pulls admitted-request
/// sources off a ZMQ queue, steps the scheduler, and records metrics.
/// Fully synchronous, matching `sched-core`'s own threading model.
fn run_scheduler_thread(backend_addr: &str, config: &sched_common::SchedConfig) {
    let pull = match sched_transport::ZmqPullQueue::<sched_transport::BackendMsg>::new(backend_addr, true, config.transport_latency_stats) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!(target: "sched-cli", "failed to bind backend queue at {backend_addr}: {e}");
            return;
        }
    };
    let mut scheduler = sched_core::Scheduler::new(config.kv_slots, config.table_slots as u32, config.token_budget);
    let mut reserved = 0usize;

    loop {
        match pull.get(sched_transport::wire::decode_backend) {
            Ok(sched_transport::BackendMsg::User { uid, input_ids, sampling_params }) => {
                scheduler.enqueue(sched_core::PendingRequest { uid, input_ids, sampling_params });
            }
            Ok(sched_transport::BackendMsg::Batch { items }) => {
                for item in items {
                    if let sched_transport::BackendMsg::User { uid, input_ids, sampling_params } = item {
                        scheduler.enqueue(sched_core::PendingRequest { uid, input_ids, sampling_params });
                    }
                }
            }
            Ok(sched_transport::BackendMsg::Exit) => {
                tracing::info!(target: "sched-cli", "scheduler thread received exit message");
                return;
            }
            Err(e) => {
                tracing::warn!(target: "sched-cli", "backend queue recv failed: {e}");
                continue;
            }
        }

        let start = std::time::Instant::now();
        match scheduler.step(&mut reserved) {
            Ok(admitted) => {
                sched_obs::runtime_metrics().record_scheduler_step(
                    start.elapsed().as_nanos() as u64,
                    scheduler.pending_len() as u64,
                    0,
                    admitted.iter().map(|r| r.extend_len() as u64).sum(),
                );
                sched_obs::transport_metrics::observe(&pull.stats().snapshot(false));
            }
            Err(e) => {
                tracing::error!(target: "sched-cli", "scheduler step hit a fatal error, stopping: {e}");
                return;
            }
        }
    }
}

fn shadow_report(args: ShadowReportArgs) {
    match sched_api::shadow_report::summarize(&args.input, args.allow_missing) {
        Ok(summary) => print!("{}", sched_api::shadow_report::format_report(&summary, args.top)),
        Err(e) => {
            eprintln!("shadow-report failed: {e}");
            std::process::exit(1);
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenParitySetInput {
    name: String,
    out_a: Vec<Vec<i32>>,
    out_b: Vec<Vec<i32>>,
    duration_a_s: f64,
    duration_b_s: f64,
}

#[derive(serde::Deserialize)]
struct TokenParityInput {
    backend_a: String,
    backend_b: String,
    sets: Vec<TokenParitySetInput>,
}

fn token_parity_report(args: TokenParityReportArgs) {
    let text = match std::fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.input.display());
            std::process::exit(1);
        }
    };
    let input: TokenParityInput = match serde_json::from_str(&text) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("malformed token-parity input: {e}");
            std::process::exit(1);
        }
    };

    let sets = input
        .sets
        .iter()
        .map(|s| {
            sched_api::token_parity::compare_token_sets(
                &s.name,
                &input.backend_a,
                &input.backend_b,
                &s.out_a,
                &s.out_b,
                s.duration_a_s,
                s.duration_b_s,
            )
        })
        .collect();

    let report = sched_api::token_parity::build_report(&input.backend_a, &input.backend_b, sets, chrono::Utc::now());
    let rendered = serde_json::to_string_pretty(&report).unwrap();
    println!("parity_passed={}", report.parity_passed);
    for set in &report.sets {
        println!("set={} match={} mismatches={}", set.name, set.is_match, set.mismatch_count);
    }
    if let Some(out) = args.out {
        if let Err(e) = std::fs::write(&out, rendered + "\n") {
            eprintln!("failed to write {}: {e}", out.display());
            std::process::exit(1);
        }
        println!("wrote={}", out.display());
    }
    if !report.parity_passed {
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
}
