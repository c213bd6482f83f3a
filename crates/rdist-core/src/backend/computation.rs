//! The unit of work a backend executes.

use std::fmt;

use crate::error::Result;
use crate::range::Range;

use super::context::TaskContext;

/// A computation that can run over any partitioning of its input.
///
/// `map` produces a partial result for one range; `reduce` combines two
/// partial results. `reduce` must be associative. It need not be
/// commutative: backends always pass the partial result of the earlier
/// ranges as `left`.
pub trait Computation: Send + Sync + 'static {
    /// Partial and final result type.
    type Output: Send + 'static;

    /// Run the plan over one range.
    fn map(&self, range: &Range, ctx: &TaskContext) -> Result<Self::Output>;

    /// Combine two partial results.
    fn reduce(&self, left: Self::Output, right: Self::Output) -> Result<Self::Output>;

    /// Result of running over zero entries, if the computation has one.
    fn identity(&self) -> Option<Self::Output> {
        None
    }

    /// Names of the operations the plan performs.
    ///
    /// Backends reject the computation before submitting anything if one of
    /// them is unsupported in their execution mode.
    fn operations(&self) -> Vec<&str> {
        Vec::new()
    }
}

type IdentityFn<P> = Box<dyn Fn() -> P + Send + Sync>;

/// [`Computation`] built from a mapper and a reducer closure.
///
/// ```
/// use rdist_core::{MapReduce, Range, TaskContext};
///
/// let count = MapReduce::new(
///     |range: &Range, _: &TaskContext| Ok(range.len()),
///     |a: u64, b: u64| Ok(a + b),
/// )
/// .with_identity(|| 0);
/// # let _ = count;
/// ```
pub struct MapReduce<M, R, P> {
    mapper: M,
    reducer: R,
    identity: Option<IdentityFn<P>>,
    operations: Vec<String>,
}

impl<M, R, P> MapReduce<M, R, P>
where
    M: Fn(&Range, &TaskContext) -> Result<P> + Send + Sync + 'static,
    R: Fn(P, P) -> Result<P> + Send + Sync + 'static,
    P: Send + 'static,
{
    pub fn new(mapper: M, reducer: R) -> Self {
        Self {
            mapper,
            reducer,
            identity: None,
            operations: Vec::new(),
        }
    }

    /// Neutral result returned when the input is empty.
    pub fn with_identity(mut self, identity: impl Fn() -> P + Send + Sync + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    /// Declare the operations the mapper performs.
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations.extend(operations.into_iter().map(Into::into));
        self
    }
}

impl<M, R, P> Computation for MapReduce<M, R, P>
where
    M: Fn(&Range, &TaskContext) -> Result<P> + Send + Sync + 'static,
    R: Fn(P, P) -> Result<P> + Send + Sync + 'static,
    P: Send + 'static,
{
    type Output = P;

    fn map(&self, range: &Range, ctx: &TaskContext) -> Result<P> {
        (self.mapper)(range, ctx)
    }

    fn reduce(&self, left: P, right: P) -> Result<P> {
        (self.reducer)(left, right)
    }

    fn identity(&self) -> Option<P> {
        self.identity.as_ref().map(|f| f())
    }

    fn operations(&self) -> Vec<&str> {
        self.operations.iter().map(String::as_str).collect()
    }
}

impl<M, R, P> fmt::Debug for MapReduce<M, R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReduce")
            .field("has_identity", &self.identity.is_some())
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_reduce_closures() {
        let sum = MapReduce::new(
            |range: &Range, _: &TaskContext| Ok((range.start..range.end).sum::<u64>()),
            |a: u64, b: u64| Ok(a + b),
        );

        let ctx = TaskContext::driver();
        let left = sum.map(&Range::new(0, 0, 4), &ctx).unwrap();
        let right = sum.map(&Range::new(1, 4, 6), &ctx).unwrap();
        assert_eq!(sum.reduce(left, right).unwrap(), 15);
        assert!(sum.identity().is_none());
        assert!(sum.operations().is_empty());
    }

    #[test]
    fn test_declared_operations() {
        let count = MapReduce::new(
            |range: &Range, _: &TaskContext| Ok(range.len()),
            |a: u64, b: u64| Ok(a + b),
        )
        .with_operations(["Filter", "Count"]);

        assert_eq!(count.operations(), vec!["Filter", "Count"]);
    }

    #[test]
    fn test_identity() {
        let concat = MapReduce::new(
            |range: &Range, _: &TaskContext| Ok(vec![range.id]),
            |mut a: Vec<usize>, b: Vec<usize>| {
                a.extend(b);
                Ok(a)
            },
        )
        .with_identity(Vec::new);

        assert_eq!(concat.identity(), Some(Vec::new()));
    }
}
