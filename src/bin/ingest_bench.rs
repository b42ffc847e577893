//! Load driver pushing random edge batches through an executor backed by `MemStore`.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sombra_executor::{
    CounterMetrics, DirectedEdge, EntityId, Executor, ExecutorOptions, MemStore, MetricsSnapshot,
    MutationContext, StartTs,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ingest-bench",
    version,
    about = "Drive random edge mutations through the sharded executor"
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "TOML file with executor options")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the number of lanes")]
    lanes: Option<usize>,

    #[arg(long, help = "Override the per-lane mailbox capacity")]
    mailbox_capacity: Option<usize>,

    #[arg(long, help = "Override the outstanding-bytes ceiling")]
    max_pending_bytes: Option<i64>,

    #[arg(long, default_value_t = 4, help = "Concurrent submitter threads")]
    submitters: usize,

    #[arg(long, default_value_t = 200, help = "Batches per submitter")]
    batches: usize,

    #[arg(long, default_value_t = 64, help = "Edges per batch")]
    edges_per_batch: usize,

    #[arg(long, default_value_t = 10_000, help = "Distinct entities")]
    entities: u64,

    #[arg(long, default_value_t = 8, help = "Distinct attributes")]
    attrs: usize,

    #[arg(long, default_value_t = 32, help = "Value payload size in bytes")]
    value_bytes: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Every N-th apply reports a transient conflict (0 disables)"
    )]
    conflict_every: usize,

    #[arg(long, default_value_t = 7, help = "Seed for the batch generator")]
    seed: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct Report {
    lanes: usize,
    submitters: usize,
    edges_submitted: u64,
    elapsed_ms: u64,
    edges_per_sec: f64,
    peak_outstanding_bytes: i64,
    final_outstanding_bytes: i64,
    committed_overlays: u64,
    durable_acks: u64,
    metrics: MetricsSnapshot,
}

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut opts = match cli.config.as_ref() {
        Some(path) => ExecutorOptions::load(path)?,
        None => ExecutorOptions::default(),
    };
    if let Some(lanes) = cli.lanes {
        opts = opts.lane_count(lanes);
    }
    if let Some(capacity) = cli.mailbox_capacity {
        opts = opts.mailbox_capacity(capacity);
    }
    if let Some(bytes) = cli.max_pending_bytes {
        opts = opts.max_pending_bytes(bytes);
    }
    if cli.attrs == 0 || cli.entities == 0 {
        return Err("--attrs and --entities must be positive".into());
    }

    let metrics = Arc::new(CounterMetrics::default());
    let store = Arc::new(MemStore::new().with_conflict_every(cli.conflict_every));
    let executor = Arc::new(Executor::start(
        Arc::clone(&store),
        opts.metrics(metrics.clone()),
    )?);

    let next_ts = Arc::new(AtomicU64::new(1));
    let peak = Arc::new(AtomicI64::new(0));
    let started = Instant::now();
    let handles: Vec<_> = (0..cli.submitters)
        .map(|worker| {
            let executor = Arc::clone(&executor);
            let next_ts = Arc::clone(&next_ts);
            let peak = Arc::clone(&peak);
            let plan = BatchPlan::from_cli(&cli, worker as u64);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(plan.seed);
                let ctx = MutationContext::background().with_request_id(worker as u64);
                let mut submitted = 0u64;
                for _ in 0..plan.batches {
                    let edges = plan.generate(&mut rng);
                    submitted += edges.len() as u64;
                    let ts = StartTs(next_ts.fetch_add(1, Ordering::Relaxed));
                    executor.submit(&ctx, ts, edges);
                    peak.fetch_max(executor.outstanding_bytes(), Ordering::Relaxed);
                }
                submitted
            })
        })
        .collect();

    let mut edges_submitted = 0u64;
    for handle in handles {
        edges_submitted += handle
            .join()
            .map_err(|_| "submitter thread panicked")?;
    }
    executor.shutdown();
    let elapsed = started.elapsed();

    let report = Report {
        lanes: executor.lane_count(),
        submitters: cli.submitters,
        edges_submitted,
        elapsed_ms: elapsed.as_millis() as u64,
        edges_per_sec: rate(edges_submitted, elapsed),
        peak_outstanding_bytes: peak.load(Ordering::Relaxed),
        final_outstanding_bytes: executor.outstanding_bytes(),
        committed_overlays: store.committed_overlays(),
        durable_acks: store.durable_acks(),
        metrics: metrics.snapshot(),
    };
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }
    if report.final_outstanding_bytes != 0 {
        return Err(format!(
            "outstanding bytes not released: {}",
            report.final_outstanding_bytes
        )
        .into());
    }
    Ok(())
}

struct BatchPlan {
    seed: u64,
    batches: usize,
    edges_per_batch: usize,
    entities: u64,
    attrs: Vec<String>,
    value_bytes: usize,
}

impl BatchPlan {
    fn from_cli(cli: &Cli, worker: u64) -> Self {
        Self {
            seed: cli.seed.wrapping_add(worker),
            batches: cli.batches,
            edges_per_batch: cli.edges_per_batch,
            entities: cli.entities,
            attrs: (0..cli.attrs).map(|i| format!("attr{i}")).collect(),
            value_bytes: cli.value_bytes,
        }
    }

    fn generate(&self, rng: &mut StdRng) -> Vec<DirectedEdge> {
        (0..self.edges_per_batch)
            .map(|_| {
                let entity = EntityId(rng.gen_range(0..self.entities));
                let attr = &self.attrs[rng.gen_range(0..self.attrs.len())];
                let mut value = vec![0u8; self.value_bytes];
                rng.fill(value.as_mut_slice());
                DirectedEdge::set(entity, attr.as_str(), value)
            })
            .collect()
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

fn print_text(report: &Report) {
    println!("{:<26} {:>14}", "lanes", report.lanes);
    println!("{:<26} {:>14}", "submitters", report.submitters);
    println!("{:<26} {:>14}", "edges submitted", report.edges_submitted);
    println!("{:<26} {:>11} ms", "elapsed", report.elapsed_ms);
    println!("{:<26} {:>14.0}", "edges/sec", report.edges_per_sec);
    println!("{:<26} {:>14}", "peak outstanding bytes", report.peak_outstanding_bytes);
    println!("{:<26} {:>14}", "final outstanding bytes", report.final_outstanding_bytes);
    println!("{:<26} {:>14}", "committed overlays", report.committed_overlays);
    println!("{:<26} {:>14}", "durable acks", report.durable_acks);
    println!("{:<26} {:>14}", "edges applied", report.metrics.edges_applied);
    println!("{:<26} {:>14}", "edges retried", report.metrics.edges_retried);
    println!("{:<26} {:>14}", "edges failed", report.metrics.edges_failed);
    println!("{:<26} {:>14}", "commits failed", report.metrics.commits_failed);
    println!("{:<26} {:>14}", "submissions dropped", report.metrics.submissions_dropped);
}
