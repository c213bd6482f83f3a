//! Run command implementation for rdist CLI.
//!
//! Runs the demo computation on the selected backend, then on the local
//! backend, and checks that both results agree.

use std::path::PathBuf;
use std::time::Instant;

use rdist_core::{
    ArtifactRegistry, Backend, BackendConfig, Computation, DataSource, ExecutorKind, LocalBackend,
    Session,
};

use crate::colors;
use crate::demo::{BINS, Demo, Summary, VALUE_RANGE};

/// Options of the run command.
pub struct RunOptions {
    pub backend: String,
    pub config: Option<PathBuf>,
    pub executor: Option<String>,
    pub npartitions: Option<usize>,
    pub entries: u64,
    pub include: Vec<PathBuf>,
    pub send: Vec<PathBuf>,
}

fn build_config(options: &RunOptions) -> anyhow::Result<BackendConfig> {
    let mut config = match &options.config {
        Some(path) => BackendConfig::from_file(path)?,
        None => BackendConfig::new(),
    };
    if let Some(executor) = &options.executor {
        config = config.with_executor(executor.parse::<ExecutorKind>()?);
    }
    if let Some(n) = options.npartitions {
        config = config.with_npartitions(n);
    }
    Ok(config)
}

/// Execute the demo.
pub fn execute(options: &RunOptions) -> anyhow::Result<()> {
    let config = build_config(options)?;

    let mut session = Session::new();
    session.use_backend(&options.backend, &config)?;

    if !options.include.is_empty() {
        let added = session.include_headers(options.include.clone())?;
        println!("Registered {} headers", added.len());
    }

    let mut required_files = Vec::new();
    if !options.send.is_empty() {
        let added = session.send_generic_files(options.send.clone())?;
        println!("Registered {} files", added.len());
        for path in session.registry().files()? {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                required_files.push(name.to_string());
            }
        }
    }

    let demo = Demo::new(required_files.clone());
    for operation in demo.operations() {
        session.check_supported(operation)?;
    }

    let backend = session.backend();
    let partitions = backend
        .npartitions()
        .map(|n| format!(" ({} partitions)", n))
        .unwrap_or_default();
    println!(
        "\n{}Running{} demo over {} entries on {}{}{}{}",
        colors::BOLD,
        colors::RESET,
        options.entries,
        colors::CYAN,
        backend.name(),
        colors::RESET,
        partitions
    );

    let source = DataSource::Entries(options.entries);
    let start = Instant::now();
    let result = session.execute(&source, demo)?;
    let elapsed = start.elapsed();

    print_summary(&result);

    let reference =
        LocalBackend::new(ArtifactRegistry::new()).execute(&source, Demo::new(required_files))?;
    if result != reference {
        anyhow::bail!(
            "{} result differs from the local backend:\n  {:?}\n  {:?}",
            backend.name(),
            result,
            reference
        );
    }

    println!("\n{}", "─".repeat(50));
    println!(
        "{}Completed{} in {:.2}s; {}local backend agrees{}",
        colors::GREEN,
        colors::RESET,
        elapsed.as_secs_f64(),
        colors::GREEN,
        colors::RESET
    );

    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("{}", "─".repeat(50));
    println!("  count  {}", summary.count);
    println!("  sum    {}", summary.sum);
    if let (Some(min), Some(max), Some(mean)) = (summary.min, summary.max, summary.mean()) {
        println!("  min    {}", min);
        println!("  max    {}", max);
        println!("  mean   {:.3}", mean);
    }

    let width = VALUE_RANGE / BINS as u64;
    let peak = summary.histogram.iter().copied().max().unwrap_or(0).max(1);
    println!("  histogram");
    for (i, n) in summary.histogram.iter().enumerate() {
        let bar = "█".repeat((n * 30 / peak) as usize);
        println!(
            "    [{:>4}, {:>4})  {:>8}  {}{}{}",
            i as u64 * width,
            (i as u64 + 1) * width,
            n,
            colors::DIM,
            bar,
            colors::RESET
        );
    }
}
