//! rdist CLI - run analysis computations locally or across workers.

mod check;
mod colors;
mod demo;
mod partition;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rdist")]
#[command(about = "Distributed execution of analysis computations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ranges an input is split into
    Partition {
        /// Total number of entries
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        entries: Option<u64>,

        /// Input file with its entry count, as PATH=ENTRIES (repeatable)
        #[arg(long, value_parser = partition::parse_file_entries)]
        file: Vec<rdist_core::FileEntries>,

        /// Number of partitions
        #[arg(short, long)]
        npartitions: usize,
    },

    /// Check whether an operation can be distributed
    Check {
        /// Operation name, e.g. Histo1D
        operation: String,

        /// Partition count of the target backend (both modes when omitted)
        #[arg(short, long)]
        npartitions: Option<usize>,
    },

    /// Run the built-in demo computation and compare with the local backend
    Run {
        /// Backend name: local, threads, spark or dask
        #[arg(short, long, default_value = "local")]
        backend: String,

        /// Backend configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Executor for the threads backend: rayon or tokio
        #[arg(long)]
        executor: Option<String>,

        /// Number of partitions
        #[arg(short, long)]
        npartitions: Option<usize>,

        /// Number of synthetic entries
        #[arg(long, default_value = "100000")]
        entries: u64,

        /// Header files or directories to distribute (repeatable)
        #[arg(long)]
        include: Vec<PathBuf>,

        /// Generic files or directories to distribute (repeatable)
        #[arg(long)]
        send: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format rdist-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(rdist_err) = err.downcast_ref::<rdist_core::Error>() {
            anyhow::anyhow!("{}", rdist_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Partition {
            entries,
            file,
            npartitions,
        } => partition::execute(entries, file, npartitions).map_err(format_error)?,

        Commands::Check {
            operation,
            npartitions,
        } => check::execute(&operation, npartitions).map_err(format_error)?,

        Commands::Run {
            backend,
            config,
            executor,
            npartitions,
            entries,
            include,
            send,
        } => {
            let options = run::RunOptions {
                backend,
                config,
                executor,
                npartitions,
                entries,
                include,
                send,
            };
            run::execute(&options).map_err(format_error)?;
        }
    }

    Ok(())
}
