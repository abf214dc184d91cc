use super::CancellationToken;
use crate::WordForm;
use crate::error::Result;
use std::sync::Arc;

/// An optional tree rewrite run by the [`Analyzer`](crate::Analyzer) after
/// the derivative filter and before rating.
///
/// Passes see unrated trees. They must keep the tree well-formed (no empty
/// sub-forms) and should return the input `Arc` when they change nothing.
pub trait TreePass: Send + Sync {
    /// Name reported in run metrics.
    fn name(&self) -> &str;

    fn run(&self, form: Arc<WordForm>, cancel: &CancellationToken) -> Result<Arc<WordForm>>;
}
