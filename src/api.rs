use crate::engine::{
    CancellationToken, DerivativeFilter, PassMetrics, Pruner, Rater, RatingRatios, RunMetrics, SolutionSearch, TreePass,
};
use crate::error::Result;
use crate::{
    AnalysisError, CombinationValidator, Dictionary, EntryId, FrequencySource, Layer, MemoryCatalog, MorphBase,
    MorphEntry, Parameters, RuleSource, WordForm,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Analysis context.
///
/// This holds the read-only collaborators every request queries. Cloning is
/// cheap; all collaborators are shared.
#[derive(Clone)]
pub struct Context {
    pub dictionary: Arc<dyn Dictionary>,
    pub rules: Arc<dyn RuleSource>,
    pub combinations: Arc<dyn CombinationValidator>,
    pub frequencies: Arc<dyn FrequencySource>,
}

impl Context {
    /// Use one catalog for every collaborator.
    pub fn from_catalog(catalog: Arc<MemoryCatalog>) -> Self {
        Context {
            dictionary: catalog.clone(),
            rules: catalog.clone(),
            combinations: catalog.clone(),
            frequencies: catalog,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

/// How the frequency layer of a request is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSelection {
    /// Ask the frequency source for the layer that fits the analyzed word.
    #[default]
    Auto,
    Fixed(Layer),
}

/// Options that affect search and rating behavior.
///
/// Read once per request. Every field has a default, so a TOML file only
/// needs the keys it changes:
///
/// ```
/// use morphosearch::Options;
///
/// let options = Options::from_toml_str("max_depth_level = 2\ndebug_order = true").unwrap();
/// assert_eq!(options.max_depth_level, 2);
/// assert_eq!(options.freq_rating_ratio, 0.25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Bound on rule-application depth (collapsed rules do not count).
    pub max_depth_level: usize,
    /// Bound on collapsed rule applications along one branch.
    pub max_collapsed_steps: usize,
    /// Weight of the frequency term in ratings; the rule term gets the rest.
    pub freq_rating_ratio: f64,
    /// Rule sets longer than this are expanded on the rayon pool.
    pub rule_fanout_threshold: usize,
    /// Sibling lists longer than this are pruned/filtered on the rayon pool.
    pub solution_fanout_threshold: usize,
    pub layer: LayerSelection,
    /// Put dictionary-sourced derivations first, by first rule id.
    pub debug_order: bool,
    /// Rating factor applied per collapsed rule.
    pub collapse_penalty: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_depth_level: 4,
            max_collapsed_steps: 4,
            freq_rating_ratio: 0.25,
            rule_fanout_threshold: 30,
            solution_fanout_threshold: Pruner::DEFAULT_FANOUT_THRESHOLD,
            layer: LayerSelection::Auto,
            debug_order: false,
            collapse_penalty: 0.9,
        }
    }
}

impl Options {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let options: Options =
            toml::from_str(source).map_err(|err| AnalysisError::InvalidConfig { reason: err.to_string() })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(AnalysisError::InvalidConfig { reason: reason.to_string() });
        if self.max_depth_level < 1 {
            return invalid("max_depth_level must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.freq_rating_ratio) {
            return invalid("freq_rating_ratio must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.collapse_penalty) {
            return invalid("collapse_penalty must be within [0, 1]");
        }
        Ok(())
    }
}

/// What to analyze.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub entry: String,
    pub parameters: Parameters,
    pub is_virtual: Option<bool>,
    pub base: MorphBase,
    /// Pre-resolved compound parts.
    pub left: Option<Arc<MorphEntry>>,
    pub right: Option<Arc<MorphEntry>>,
    /// Rule group to expand; `"dict"` restricts the search to the dictionary.
    pub label: String,
}

impl SearchRequest {
    /// A request for `entry` with no constraints.
    pub fn new(entry: impl Into<String>) -> Self {
        SearchRequest {
            entry: entry.into(),
            parameters: Parameters::any(),
            is_virtual: None,
            base: MorphBase::Unknown,
            left: None,
            right: None,
            label: String::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_base(mut self, base: MorphBase) -> Self {
        self.base = base;
        self
    }

    pub fn with_virtual(mut self, is_virtual: Option<bool>) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    pub fn with_parts(mut self, left: Option<Arc<MorphEntry>>, right: Option<Arc<MorphEntry>>) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.entry.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest { reason: "entry is empty".to_string() });
        }
        if self.base == MorphBase::None && (self.left.is_some() || self.right.is_some()) {
            return Err(AnalysisError::InvalidRequest {
                reason: "compound parts supplied for a non-compound request".to_string(),
            });
        }
        Ok(())
    }
}

/// Result from [`Analyzer::analyze`] and [`analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// The analyzed text.
    pub text: String,
    /// Rated and ordered parse tree; best solution first.
    pub form: Arc<WordForm>,
    /// Frequency layer used for rating.
    pub layer: Layer,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Result from [`Analyzer::analyze_verbose`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisVerbose {
    pub text: String,
    pub form: Arc<WordForm>,
    pub layer: Layer,
    pub elapsed: Duration,
    pub details: RunMetrics,
}

/// Runs the full pipeline (search, prune, filter, passes, rating) for one
/// request at a time.
#[derive(Clone)]
pub struct Analyzer {
    context: Context,
    options: Options,
    passes: Vec<Arc<dyn TreePass>>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passes: Vec<&str> = self.passes.iter().map(|p| p.name()).collect();
        f.debug_struct("Analyzer").field("options", &self.options).field("passes", &passes).finish()
    }
}

/// Where a request starts.
enum Start<'a> {
    Request(&'a SearchRequest),
    Entry(&'a MorphEntry),
}

impl Analyzer {
    pub fn new(context: Context) -> Self {
        Analyzer { context, options: Options::default(), passes: Vec::new() }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Register a pass to run after the derivative filter. Passes run in
    /// registration order.
    pub fn with_pass(mut self, pass: impl TreePass + 'static) -> Self {
        self.passes.push(Arc::new(pass));
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn analyze(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<Analysis> {
        let run = self.analyze_verbose(request, cancel)?;
        Ok(Analysis { text: run.text, form: run.form, layer: run.layer, elapsed: run.elapsed })
    }

    /// Like [`analyze`](Self::analyze), with per-stage metrics.
    pub fn analyze_verbose(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<AnalysisVerbose> {
        request.validate()?;
        self.run(Start::Request(request), cancel)
    }

    /// Analyze the dictionary entry stored under `id` (direct-id path).
    pub fn analyze_id(&self, id: EntryId, cancel: &CancellationToken) -> Result<AnalysisVerbose> {
        let entry = self.context.dictionary.get(id).ok_or(AnalysisError::UnknownEntry { id })?;
        self.run(Start::Entry(&entry), cancel)
    }

    /// Run `request` on a worker thread.
    pub fn spawn(&self, request: SearchRequest) -> Result<AnalysisHandle> {
        self.spawn_with(request, CancellationToken::new())
    }

    /// Run `request` on a worker thread, observing `cancel`.
    ///
    /// Invalid requests and options are rejected here, before a worker is
    /// started.
    pub fn spawn_with(&self, request: SearchRequest, cancel: CancellationToken) -> Result<AnalysisHandle> {
        request.validate()?;
        self.options.validate()?;

        let analyzer = self.clone();
        let worker_cancel = cancel.clone();
        let worker = thread::spawn(move || analyzer.analyze(&request, &worker_cancel));
        Ok(AnalysisHandle { cancel, worker })
    }

    fn run(&self, start: Start<'_>, cancel: &CancellationToken) -> Result<AnalysisVerbose> {
        self.options.validate()?;
        let started = Instant::now();
        let mut details = RunMetrics::default();

        let search = SolutionSearch::new(&self.context, &self.options, cancel);
        let (text, form) = match start {
            Start::Request(request) => (request.entry.clone(), search.search(request)?),
            Start::Entry(entry) => (entry.entry.clone(), search.search_by_id(entry)?),
        };
        let mut form = Arc::new(form);
        details.search = search.metrics();
        details.search.duration = started.elapsed();
        details.search.solutions = form.count_solutions();
        debug!(
            entry = %text,
            solutions = details.search.solutions,
            depth = details.search.depth_watermark,
            memo_hits = details.search.memo_hits,
            "search finished"
        );

        let threshold = self.options.solution_fanout_threshold;
        let pruner = Pruner::new(self.options.max_depth_level).with_fanout_threshold(threshold);
        let (pruned, metrics) = measure("prune", &form, |f| {
            Ok(pruner.run(f, cancel)?.unwrap_or_else(|| Arc::new(WordForm::empty(text.clone()))))
        })?;
        form = pruned;
        details.prune = metrics;

        let filter = DerivativeFilter::new().with_fanout_threshold(threshold);
        let (filtered, metrics) = measure("derivatives", &form, |f| filter.run(f, cancel))?;
        form = filtered;
        details.filter = metrics;

        for pass in &self.passes {
            cancel.check()?;
            let (passed, metrics) = measure(pass.name(), &form, |f| pass.run(f.clone(), cancel))?;
            form = passed;
            details.passes.push(metrics);
        }

        let layer = match self.options.layer {
            LayerSelection::Fixed(layer) => layer,
            LayerSelection::Auto => self.context.frequencies.detect_layer(&text),
        };
        let rating_started = Instant::now();
        let rater = Rater::new(self.context.frequencies.as_ref(), RatingRatios::from_freq(self.options.freq_rating_ratio), layer)
            .with_debug_order(self.options.debug_order);
        let form = rater.run(&form, cancel)?;
        details.rating = rating_started.elapsed();

        details.total = started.elapsed();
        info!(entry = %text, solutions = form.solutions.len(), elapsed = ?details.total, "analysis finished");
        Ok(AnalysisVerbose { text, form, layer, elapsed: details.total, details })
    }
}

/// Time one pass and count the tree before and after it.
fn measure<F>(name: &str, form: &Arc<WordForm>, pass: F) -> Result<(Arc<WordForm>, PassMetrics)>
where
    F: FnOnce(&Arc<WordForm>) -> Result<Arc<WordForm>>,
{
    let mut metrics = PassMetrics::new(name);
    metrics.solutions_before = form.count_solutions();
    let started = Instant::now();
    let out = pass(form)?;
    metrics.duration = started.elapsed();
    metrics.solutions_after = out.count_solutions();
    debug!(pass = name, removed = metrics.removed(), elapsed = ?metrics.duration, "pass finished");
    Ok((out, metrics))
}

/// A request running on a worker thread.
#[derive(Debug)]
pub struct AnalysisHandle {
    cancel: CancellationToken,
    worker: JoinHandle<Result<Analysis>>,
}

impl AnalysisHandle {
    /// Ask the worker to stop; `join` then returns `Err(Cancelled)` unless
    /// the analysis already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<Analysis> {
        self.worker.join().map_err(|_| AnalysisError::WorkerPanicked)?
    }
}

/// Analyze `entry` against `context` with default options.
///
/// # Example
/// ```
/// use morphosearch::{Context, MemoryCatalog, MorphEntry, Parameters, analyze};
/// use std::sync::Arc;
///
/// let mut catalog = MemoryCatalog::new();
/// catalog.add_entry(MorphEntry::new(1, "deva", Parameters::new([1; 8]))).unwrap();
///
/// let out = analyze(&Context::from_catalog(Arc::new(catalog)), "deva").unwrap();
/// assert_eq!(out.form.best().map(|s| s.content.id), Some(1));
/// ```
pub fn analyze(context: &Context, entry: &str) -> Result<Analysis> {
    analyze_with(context, &SearchRequest::new(entry), &Options::default())
}

/// Analyze `request` against `context` with the provided `options`.
pub fn analyze_with(context: &Context, request: &SearchRequest, options: &Options) -> Result<Analysis> {
    Analyzer::new(context.clone()).with_options(options.clone()).analyze(request, &CancellationToken::new())
}
