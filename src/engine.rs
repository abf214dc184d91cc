//! Search and tree-pass engine.
//!
//! This module is the *public entry point* for the analysis stages. Each
//! stage lives in a focused submodule under `src/engine/`; the
//! [`Analyzer`](crate::Analyzer) chains them for one request.
//!
//! ## How the parts work together
//!
//! ```text
//! request ── SolutionSearch::search / search_by_id   (search.rs)
//!              - dictionary probe
//!              - rule expansion over sandhi matches
//!              - memo by SolutionKey                  (memo.rs)
//!              - DepthIsExceeded sentinels at the depth and collapsed-step bounds
//!                        │
//!                        v
//!            Pruner::run                              (prune.rs)
//!              - drop sentinels and too-deep id-less solutions
//!                        │
//!                        v
//!            DerivativeFilter::run                    (derivative.rs)
//!              - drop derivatives contradicting their original
//!                        │
//!                        v
//!            registered TreePasses                    (passes.rs)
//!                        │
//!                        v
//!            Rater::run                               (rating.rs)
//!              - bottom-up ratings, sibling ordering
//!                        │
//!                        v
//!                 Arc<WordForm>
//! ```
//!
//! The search builds the tree; every later stage is a rebuild-on-change pass
//! over the immutable `Arc` tree (`rebuild.rs`), so subtrees a pass does not
//! touch stay shared with its input.
//!
//! ## Responsibilities by module
//!
//! - `search.rs`: the recursive, depth-bounded search and its counters.
//! - `memo.rs`: memo keys and the concurrent insert-if-absent cache.
//! - `prune.rs`: depth pruning.
//! - `derivative.rs`: derivative consistency with the direct-id solution.
//! - `rating.rs`: rating formula and ordering.
//! - `passes.rs`: the `TreePass` extension point.
//! - `rebuild.rs`: shared traversal helpers and rayon fan-out for passes.
//! - `cancel.rs`: the request's cancellation token.
//! - `metrics.rs`: optional timing/debug data for runs and passes.
//!
//! ## Concurrency
//!
//! Wide rule sets (search) and wide sibling lists (prune, filter) are
//! processed with rayon `par_iter`; narrow ones sequentially. Results are
//! collected in input order either way, so output never depends on the
//! thresholds. Every stage checks the cancellation token on entry and inside
//! its loops.
//!
//! ## Debugging
//!
//! Stages emit `tracing` events: `debug` per stage and for depth watermark
//! increases, `trace` per rule application and memo hit.

#[path = "engine/cancel.rs"]
mod cancel;
#[path = "engine/derivative.rs"]
mod derivative;
#[path = "engine/memo.rs"]
mod memo;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/passes.rs"]
mod passes;
#[path = "engine/prune.rs"]
mod prune;
#[path = "engine/rating.rs"]
mod rating;
#[path = "engine/rebuild.rs"]
mod rebuild;
#[path = "engine/search.rs"]
mod search;

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;

pub use cancel::CancellationToken;
pub use derivative::DerivativeFilter;
pub use metrics::{PassMetrics, RunMetrics, SearchMetrics};
pub use passes::TreePass;
pub use prune::Pruner;
pub use rating::{Rater, RatingRatios};
pub use search::SolutionSearch;
