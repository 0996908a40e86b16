//! Ordered first-success strategy runner.
//!
//! Titles, authors, bodies and dates are all found the same way: try a fixed
//! list of strategies in order and keep the first one that produces a value.
//! Later strategies are never evaluated once one succeeds.

use scraper::Html;
use tracing::trace;

/// A single extraction attempt over a parsed document and some context.
pub type Strategy<C, T> = fn(&Html, &C) -> Option<T>;

/// An ordered list of named strategies.
pub struct Cascade<C: ?Sized + 'static, T: 'static> {
    steps: &'static [(&'static str, Strategy<C, T>)],
}

/// The value produced by a cascade and which step produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit<T> {
    pub value: T,
    /// Position of the winning strategy; lower is preferred.
    pub rank: usize,
    pub strategy: &'static str,
}

impl<C: ?Sized + 'static, T: 'static> Cascade<C, T> {
    pub const fn new(steps: &'static [(&'static str, Strategy<C, T>)]) -> Self {
        Self { steps }
    }

    /// Run strategies in order and stop at the first success.
    pub fn run(&self, document: &Html, context: &C) -> Option<Hit<T>> {
        self.steps
            .iter()
            .enumerate()
            .find_map(|(rank, &(strategy, step))| {
                let value = step(document, context)?;
                trace!(strategy, rank, "Cascade strategy succeeded");
                Some(Hit {
                    value,
                    rank,
                    strategy,
                })
            })
    }
}
