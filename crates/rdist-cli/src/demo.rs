//! Built-in demo computation.
//!
//! Entry count, sum, extrema and a fixed-width histogram over a synthetic
//! column, computed from entry positions alone so every backend sees the
//! same data.

use rdist_core::{Computation, Error, Range, Result, TaskContext};

/// Number of histogram bins.
pub const BINS: usize = 10;
/// Column values lie in `[0, VALUE_RANGE)`.
pub const VALUE_RANGE: u64 = 1000;

/// Operations the demo performs.
const OPERATIONS: &[&str] = &["Count", "Sum", "Min", "Max", "Mean", "Histo1D"];

/// Synthetic column value of entry `i`.
pub fn value(i: u64) -> u64 {
    (i.wrapping_mul(7919).wrapping_add(13)) % VALUE_RANGE
}

/// Partial and final result of the demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub count: u64,
    pub sum: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub histogram: [u64; BINS],
}

impl Summary {
    fn empty() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: None,
            max: None,
            histogram: [0; BINS],
        }
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

/// The demo computation. Fails on workers that cannot see `required_files`.
#[derive(Debug, Default)]
pub struct Demo {
    required_files: Vec<String>,
}

impl Demo {
    pub fn new(required_files: Vec<String>) -> Self {
        Self { required_files }
    }
}

impl Computation for Demo {
    type Output = Summary;

    fn map(&self, range: &Range, ctx: &TaskContext) -> Result<Summary> {
        for name in &self.required_files {
            if ctx.staged_file(name).is_none() {
                return Err(Error::Execution(format!(
                    "file '{}' is not available on worker {}",
                    name,
                    ctx.worker_name()
                )));
            }
        }

        let bin_width = VALUE_RANGE / BINS as u64;
        let mut summary = Summary::empty();
        for i in range.start..range.end {
            let v = value(i);
            summary.count += 1;
            summary.sum += v;
            summary.min = Some(summary.min.map_or(v, |m| m.min(v)));
            summary.max = Some(summary.max.map_or(v, |m| m.max(v)));
            summary.histogram[(v / bin_width) as usize] += 1;
        }
        Ok(summary)
    }

    fn reduce(&self, mut left: Summary, right: Summary) -> Result<Summary> {
        left.count += right.count;
        left.sum += right.sum;
        left.min = match (left.min, right.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        left.max = match (left.max, right.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        for (l, r) in left.histogram.iter_mut().zip(right.histogram) {
            *l += r;
        }
        Ok(left)
    }

    fn identity(&self) -> Option<Summary> {
        Some(Summary::empty())
    }

    fn operations(&self) -> Vec<&str> {
        OPERATIONS.to_vec()
    }
}
