//! poolalloc command-line tool
//!
//! Drives the pool allocator and the list built on it:
//! - List demo (insert, delete, render)
//! - Deterministic allocate/free/resize workloads with invariant checks
//! - Effective configuration dump
//!
//! # Examples
//!
//! ```bash
//! # List demo on a 4 KiB pool
//! poolalloc --capacity 4096 demo 1 2 3 --delete 2
//!
//! # Randomized workload with best-fit, stats as JSON
//! poolalloc --policy best-fit workload --ops 50000 --seed 7 --json
//!
//! # Show configuration after file and POOLALLOC_* overrides
//! poolalloc --config pool.toml config
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use poolalloc::memory::{AllocatorConfig, FitPolicy, MemoryManager, PoolStats, Reference};
use poolalloc::LinkedList;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// poolalloc - Fixed-capacity pool allocator
#[derive(Parser, Debug)]
#[command(name = "poolalloc")]
#[command(version = poolalloc::VERSION)]
#[command(about = "Fixed-capacity pool allocator with a list built on top", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "POOLALLOC_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Pool capacity in bytes (overrides configuration)
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Fit policy (overrides configuration)
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    /// Log directory; enables a daily rolling log file
    #[arg(long, global = true, env = "POOLALLOC_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a list, delete one value and render it
    Demo(DemoArgs),

    /// Run a random allocate/free/resize mix against one pool
    Workload(WorkloadArgs),

    /// Print the effective configuration as TOML
    Config,

    /// Show version
    Version,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    FirstFit,
    BestFit,
}

impl From<PolicyArg> for FitPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FirstFit => FitPolicy::FirstFit,
            PolicyArg::BestFit => FitPolicy::BestFit,
        }
    }
}

/// List demo arguments
#[derive(Args, Debug)]
struct DemoArgs {
    /// Values appended to the list
    #[arg(default_values_t = vec![1u16, 2, 3])]
    values: Vec<u16>,

    /// Value deleted after building the list
    #[arg(short, long, default_value_t = 2)]
    delete: u16,
}

/// Workload arguments
#[derive(Args, Debug)]
struct WorkloadArgs {
    /// Number of operations
    #[arg(long, default_value_t = 10_000)]
    ops: usize,

    /// Largest requested block size
    #[arg(long, default_value_t = 256)]
    max_size: usize,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
struct WorkloadSummary {
    operations: usize,
    allocations: usize,
    frees: usize,
    resizes: usize,
    failures: usize,
    utilization: f64,
    fragmentation: f64,
    stats: PoolStats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Demo(args) => demo_command(config, args),
        Commands::Workload(args) => workload_command(config, args),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::Version => {
            println!("poolalloc {}", poolalloc::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with console output and an optional rolling file
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    let file_layer = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "poolalloc.log");
            Some(fmt::layer().with_writer(file_appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Defaults, config file, environment, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<AllocatorConfig> {
    let mut config = AllocatorConfig::load(cli.config.as_deref())?;
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    if let Some(policy) = cli.policy {
        config.policy = policy.into();
    }
    config.validate()?;
    Ok(config)
}

fn demo_command(config: AllocatorConfig, args: DemoArgs) -> anyhow::Result<()> {
    let list = LinkedList::with_config(config)?;

    for value in &args.values {
        list.insert_tail(*value)?;
    }
    println!("List:    {}", list.render()?);

    if list.delete_first(args.delete)? {
        println!("Deleted: {}", args.delete);
    } else {
        warn!(value = args.delete, "Value not in list, nothing deleted");
    }
    println!("List:    {}", list.render()?);
    println!("Count:   {}", list.count()?);

    print_stats(&list.memory().stats()?);
    list.clear()?;
    Ok(())
}

fn workload_command(config: AllocatorConfig, args: WorkloadArgs) -> anyhow::Result<()> {
    let memory = MemoryManager::init(config)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let max_size = args.max_size.max(1);

    info!(ops = args.ops, max_size, seed = args.seed, "Starting workload");

    let mut live: Vec<Reference> = Vec::new();
    let mut summary = WorkloadSummary {
        operations: args.ops,
        ..WorkloadSummary::default()
    };

    for _ in 0..args.ops {
        match rng.gen_range(0..10) {
            0..=4 => match memory.allocate(rng.gen_range(1..=max_size)) {
                Ok(r) => {
                    live.push(r);
                    summary.allocations += 1;
                }
                Err(e) if e.is_allocation_failure() => summary.failures += 1,
                Err(e) => return Err(e.into()),
            },
            5..=7 if !live.is_empty() => {
                let r = live.swap_remove(rng.gen_range(0..live.len()));
                memory.free(r)?;
                summary.frees += 1;
            }
            8..=9 if !live.is_empty() => {
                let i = rng.gen_range(0..live.len());
                match memory.resize(Some(live[i]), rng.gen_range(1..=max_size)) {
                    Ok(r) => {
                        live[i] = r;
                        summary.resizes += 1;
                    }
                    Err(e) if e.is_allocation_failure() => summary.failures += 1,
                    Err(e) => return Err(e.into()),
                }
            }
            _ => {}
        }
    }

    memory.check_invariants()?;
    let stats = memory.stats()?;
    summary.utilization = stats.utilization();
    summary.fragmentation = stats.fragmentation();
    summary.stats = stats;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Operations: {}", summary.operations);
        println!("  allocate: {}", summary.allocations);
        println!("  free:     {}", summary.frees);
        println!("  resize:   {}", summary.resizes);
        println!("  failed:   {}", summary.failures);
        print_stats(&summary.stats);
    }

    memory.deinit();
    Ok(())
}

fn print_stats(stats: &PoolStats) {
    println!("Pool");
    println!("───────────────────────────────");
    println!("  capacity:      {} bytes", stats.capacity);
    println!("  blocks:        {} ({} free)", stats.blocks, stats.free_blocks);
    println!("  allocations:   {}", stats.allocations);
    println!("  allocated:     {} bytes", stats.allocated_bytes);
    println!("  largest free:  {} bytes", stats.largest_free);
    println!(
        "  metadata:      {} / {} bytes",
        stats.metadata_bytes, stats.metadata_ceiling
    );
    println!("  utilization:   {:.1}%", stats.utilization() * 100.0);
    println!("  fragmentation: {:.1}%", stats.fragmentation() * 100.0);
}
