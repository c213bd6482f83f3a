//! Check command implementation for rdist CLI.

use rdist_core::{ExecutionMode, OperationClassifier, OperationKind};

use crate::colors;

fn kind_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Action => "action",
        OperationKind::Transformation => "transformation",
    }
}

/// Classify an operation for one mode, or for both when `npartitions` is
/// not given.
pub fn execute(operation: &str, npartitions: Option<usize>) -> anyhow::Result<()> {
    let classifier = OperationClassifier::standard();

    match npartitions {
        Some(0) => anyhow::bail!("npartitions must be at least 1"),
        Some(n) => {
            let mode = ExecutionMode::for_partitions(n);
            let kind = classifier.check_supported(operation, mode)?;
            println!(
                "{}{}{}: {} ({}supported{} in {} mode)",
                colors::BOLD,
                operation,
                colors::RESET,
                kind_name(kind),
                colors::GREEN,
                colors::RESET,
                mode
            );
        }
        None => {
            // Single-worker mode accepts every known operation.
            let kind = classifier.check_supported(operation, ExecutionMode::SingleWorker)?;
            println!("{}{}{}: {}", colors::BOLD, operation, colors::RESET, kind_name(kind));
            for mode in [ExecutionMode::SingleWorker, ExecutionMode::MultiWorker] {
                match classifier.check_supported(operation, mode) {
                    Ok(_) => println!("  {:<13} {}supported{}", mode, colors::GREEN, colors::RESET),
                    Err(_) => println!("  {:<13} {}not supported{}", mode, colors::RED, colors::RESET),
                }
            }
        }
    }

    Ok(())
}
