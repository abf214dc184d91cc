use super::*;
use crate::{
    AnalysisError, Analyzer, Context, Layer, MemoryCatalog, MorphBase, MorphEntry, MorphRule, Options, Parameters,
    RuleSource, SandhiGroup, SandhiMatch, SandhiPattern, SearchRequest, Solution, SolutionContent, SolutionError,
    SolutionId, WordForm,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const COMPLETE: Parameters = Parameters::new([1; 8]);

/// deva + indra, final o → a, internal e → a+i, one suffix rule and one
/// compound-splitting rule.
fn devendro_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog.add_entry(MorphEntry::new(1, "deva", COMPLETE)).unwrap();
    catalog.add_entry(MorphEntry::new(2, "indra", COMPLETE)).unwrap();
    catalog.add_sandhi(SandhiPattern::new("o", "a", SandhiGroup::LEFT));
    catalog.add_sandhi(SandhiPattern::new("e", "a+i", SandhiGroup::BOTH));
    catalog.add_rule(morph_rule! { id: 1, label: "", left: "", rating: 0.9, base: MorphBase::None });
    catalog.add_rule(morph_rule! {
        id: 2,
        label: "",
        entry: r"^(.+)\+(.+)$",
        left: "$1",
        right: "$2",
        sandhi_group: SandhiGroup::BOTH,
        base: MorphBase::Both,
        rating: 0.8,
    });
    catalog.set_frequency(Layer(0), "deva", 0.5).unwrap();
    catalog.set_frequency(Layer(0), "indra", 0.4).unwrap();
    catalog
}

fn context(catalog: MemoryCatalog) -> Context {
    Context::from_catalog(Arc::new(catalog))
}

fn analyzer(options: Options) -> Analyzer {
    Analyzer::new(context(devendro_catalog())).with_options(options)
}

fn analyze(word: &str, options: Options) -> Arc<WordForm> {
    analyzer(options).analyze(&SearchRequest::new(word), &CancellationToken::new()).unwrap().form
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

fn expression(solution: &Solution) -> Option<&str> {
    solution.sandhi.as_ref().map(|m| m.expression.as_str())
}

/// Every solution in the tree, depth first.
fn walk(form: &WordForm, out: &mut Vec<Arc<Solution>>) {
    for solution in &form.solutions {
        out.push(solution.clone());
        for side in [&solution.left, &solution.right].into_iter().flatten() {
            walk(side, out);
        }
    }
}

/// Structural rendering that ignores solution ids.
fn render(form: &WordForm) -> String {
    let mut out = format!("{}[", form.entry);
    for solution in &form.solutions {
        let rules: Vec<u32> = solution.rules.iter().flatten().map(|r| r.id).collect();
        out.push_str(&format!(
            "({} {:?} {:.6} {:?} {:?}",
            solution.content.id,
            solution.content.error,
            solution.rating,
            rules,
            expression(solution)
        ));
        for side in [&solution.left, &solution.right].into_iter().flatten() {
            out.push(' ');
            out.push_str(&render(side));
        }
        out.push(')');
    }
    out.push(']');
    out
}

#[test]
fn final_sandhi_resolves_to_dictionary_entry() {
    let form = analyze("devo", Options::default());

    assert_eq!(form.successes().count(), 1);
    let best = &form.solutions[0];
    assert!(best.is_success());
    assert_eq!(best.content.id, 1);
    assert_eq!(expression(best), Some("deva"));
    assert_eq!(best.first_rule().map(|r| r.id), Some(1));
    // 1 · 1 · 0.9 · 1 · 0.75 + 0.25 · 0.5 · 1 + 1
    assert_close(best.rating, 1.8);

    let left = best.left.as_ref().unwrap();
    assert_eq!(left.entry, "deva");
    assert_eq!(left.solutions[0].rating, 2.0);

    // the compound rule cannot split "deva"; its internal split has no left part
    assert_eq!(form.solutions.len(), 2);
    let split = &form.solutions[1];
    assert_eq!(split.content.error, SolutionError::NotFoundLeftByParameters);
    assert_eq!(expression(split), Some("da+ivo"));
    assert_eq!(split.first_rule().map(|r| r.id), Some(2));
    assert_eq!(split.rating, 0.0);
}

#[test]
fn compound_split_ranks_above_suffix_rule() {
    let form = analyze("devendro", Options::default());

    let summary: Vec<(Option<&str>, SolutionError)> =
        form.solutions.iter().map(|s| (expression(s), s.content.error)).collect();
    assert_eq!(summary, [
        (Some("deva+indro"), SolutionError::Success),
        (Some("devendra"), SolutionError::Success),
        (Some("da+ivendro"), SolutionError::NotFoundLeftByParameters),
    ]);

    assert_close(form.solutions[0].rating, 0.6);
    assert_close(form.solutions[1].rating, 0.43875);
    assert_eq!(form.solutions[2].rating, 0.0);

    // the compound keeps both parts, the right one found through the suffix rule
    let compound = &form.solutions[0];
    assert_eq!(compound.content.base, MorphBase::Both);
    assert_eq!(compound.content.id, 0);
    let right = compound.right.as_ref().unwrap();
    assert_eq!(right.entry, "indro");
    assert_eq!(right.solutions[0].content.id, 2);

    // devendra itself only exists as deva + indra
    let devendra = form.solutions[1].left.as_ref().unwrap();
    assert_eq!(expression(&devendra.solutions[0]), Some("deva+indra"));
    assert_close(devendra.solutions[0].rating, 0.65);
}

#[test]
fn depth_bound_limits_what_can_be_found() {
    let shallow = analyzer(Options { max_depth_level: 1, ..Options::default() })
        .analyze_verbose(&SearchRequest::new("devendro"), &CancellationToken::new())
        .unwrap();
    assert!(!shallow.form.has_success());
    assert_eq!(shallow.details.search.depth_watermark, 1);

    let mut all = Vec::new();
    walk(&shallow.form, &mut all);
    assert!(all.iter().all(|s| s.content.error != SolutionError::DepthIsExceeded));

    let deeper = analyze("devendro", Options { max_depth_level: 2, ..Options::default() });
    assert!(deeper.has_success());
}

#[test]
fn pruning_rebuilds_only_changed_forms() {
    let context = context(devendro_catalog());
    let options = Options::default();
    let cancel = CancellationToken::new();
    let search = SolutionSearch::new(&context, &options, &cancel);
    let form = Arc::new(search.search(&SearchRequest::new("devendro")).unwrap());

    let pruned = Pruner::new(1).run(&form, &cancel).unwrap().unwrap();

    let expressions: Vec<Option<&str>> = pruned.solutions.iter().map(|s| expression(s)).collect();
    assert_eq!(expressions, [Some("da+ivendro"), Some("deva+indro")]);

    let before = form.solutions.iter().find(|s| expression(s) == Some("deva+indro")).unwrap();
    let after = &pruned.solutions[1];
    assert!(Arc::ptr_eq(before.left.as_ref().unwrap(), after.left.as_ref().unwrap()));

    let indro = after.right.as_ref().unwrap();
    assert_eq!(indro.solutions.len(), 1);
    assert_eq!(indro.solutions[0].content.id, 2);

    // a bound that removes nothing keeps the very same tree
    let kept = Pruner::new(4).run(&form, &cancel).unwrap().unwrap();
    assert!(Arc::ptr_eq(&form, &kept));
}

#[test]
fn tree_of_sentinels_prunes_to_nothing() {
    let failure = Arc::new(Solution {
        sid: SolutionId(1),
        content: SolutionContent {
            id: 0,
            parameters: Parameters::any(),
            base: MorphBase::Unknown,
            is_virtual: None,
            error: SolutionError::DepthIsExceeded,
        },
        left: None,
        right: None,
        rules: None,
        sandhi: None,
        original: None,
        rating: Solution::UNRATED,
        collapse_rating: 1.0,
    });
    let form = Arc::new(WordForm::new("x", vec![failure]));
    assert!(Pruner::new(4).run(&form, &CancellationToken::new()).unwrap().is_none());
}

#[test]
fn results_do_not_depend_on_fanout() {
    let parallel = Options { rule_fanout_threshold: 0, solution_fanout_threshold: 0, ..Options::default() };
    let sequential =
        Options { rule_fanout_threshold: usize::MAX, solution_fanout_threshold: usize::MAX, ..Options::default() };

    for word in ["devo", "devendro", "indro", "devendra"] {
        assert_eq!(render(&analyze(word, parallel.clone())), render(&analyze(word, sequential.clone())), "{word}");
    }
}

#[test]
fn collapsed_rules_do_not_count_toward_depth() {
    let mut catalog = MemoryCatalog::new();
    catalog.add_entry(MorphEntry::new(1, "deva", COMPLETE)).unwrap();
    catalog.add_sandhi(SandhiPattern::new("o", "a", SandhiGroup::LEFT));
    catalog.add_rule(morph_rule! { id: 3, label: "", left: "", is_collapsed: true });

    let run = Analyzer::new(context(catalog))
        .with_options(Options { max_depth_level: 1, ..Options::default() })
        .analyze_verbose(&SearchRequest::new("devo"), &CancellationToken::new())
        .unwrap();

    assert_eq!(run.details.search.depth_watermark, 0);
    let best = run.form.best().unwrap();
    assert!(best.is_success());
    assert_close(best.collapse_rating, 0.9);
    // 1 · 1 · 1 · 0.9 · 0.75 + 0.25 · 0 · 1 + 1
    assert_close(best.rating, 1.675);
}

#[test]
fn combinations_gate_and_complete_parameters() {
    let mut catalog = MemoryCatalog::new();
    catalog.add_entry(MorphEntry::new(1, "deva", COMPLETE)).unwrap();
    catalog.add_sandhi(SandhiPattern::new("o", "a", SandhiGroup::LEFT));
    catalog.add_combination(COMPLETE);
    catalog.add_rule(morph_rule! {
        id: 7,
        label: "",
        left: "",
        need_to_check: true,
        parameters: Parameters::any().with(Parameters::PART_OF_SPEECH, 9),
    });
    catalog.add_rule(morph_rule! {
        id: 8,
        label: "",
        left: "",
        need_to_check: true,
        parameters: Parameters::any().with(Parameters::PART_OF_SPEECH, 1),
    });

    let form = Analyzer::new(context(catalog))
        .analyze(&SearchRequest::new("devo"), &CancellationToken::new())
        .unwrap()
        .form;

    assert_eq!(form.solutions.len(), 2);
    assert_eq!(form.solutions[0].first_rule().map(|r| r.id), Some(8));
    assert_eq!(form.solutions[0].content.parameters, COMPLETE);
    assert_eq!(form.solutions[1].content.error, SolutionError::NoMorphCombinationMatches);
}

#[test]
fn direct_id_keeps_only_consistent_derivatives() {
    let mut catalog = MemoryCatalog::new();
    let gam = Parameters::any().with(Parameters::PART_OF_SPEECH, 2);
    catalog.add_entry(MorphEntry::new(10, "gam", gam)).unwrap();
    catalog.add_sandhi(SandhiPattern::new("", "", SandhiGroup::LEFT));
    catalog.add_rule(morph_rule! { id: 5, label: "", left: "" });
    catalog.add_rule(morph_rule! { id: 6, label: "", left: "", base: MorphBase::Left });

    let run = Analyzer::new(context(catalog)).analyze_id(10, &CancellationToken::new()).unwrap();
    let form = &run.form;

    assert_eq!(form.solutions.len(), 2);
    let direct = &form.solutions[0];
    assert_eq!(direct.rating, 2.0);
    assert!(direct.original.is_none());

    let derived = &form.solutions[1];
    assert_eq!(derived.original, Some(direct.sid));
    assert_eq!(derived.first_rule().map(|r| r.id), Some(5));
    assert_eq!(derived.content.id, 10);
    assert_eq!(derived.content.base, MorphBase::None);
    // the rejected derivative and the sub-form it carried
    assert_eq!(run.details.filter.removed(), 2);
}

fn node(sid: u64, id: u32, parameters: Parameters, base: MorphBase) -> Solution {
    Solution {
        sid: SolutionId(sid),
        content: SolutionContent { id, parameters, base, is_virtual: None, error: SolutionError::Success },
        left: None,
        right: None,
        rules: None,
        sandhi: None,
        original: None,
        rating: Solution::UNRATED,
        collapse_rating: 1.0,
    }
}

fn part(entry: &str, id: u32) -> Option<Arc<WordForm>> {
    Some(Arc::new(WordForm::new(entry, vec![Arc::new(node(1000 + u64::from(id), id, Parameters::any(), MorphBase::None))])))
}

fn derived_from(original: u64, mut solution: Solution) -> Arc<Solution> {
    solution.original = Some(SolutionId(original));
    Arc::new(solution)
}

#[test]
fn derivative_filter_checks_base_parts_and_fixed_slots() {
    let fixed = Parameters::any().with(Parameters::PART_OF_SPEECH, 2);
    let filled = Parameters::new([2, 1, 1, 1, 1, 1, 1, 1]);

    let mut original = node(1, 10, fixed, MorphBase::Left);
    original.left = part("ga", 5);

    let with_left = |mut s: Solution, entry: &str, id: u32| {
        s.left = part(entry, id);
        s
    };
    let consistent = derived_from(1, with_left(node(2, 10, filled, MorphBase::Left), "ga", 5));
    let other_base = derived_from(1, with_left(node(3, 10, filled, MorphBase::Right), "ga", 5));
    let other_text = derived_from(1, with_left(node(4, 10, filled, MorphBase::Left), "gu", 5));
    let other_id = derived_from(1, with_left(node(5, 10, filled, MorphBase::Left), "ga", 6));
    let other_slot = derived_from(1, with_left(node(6, 10, filled.with(0, 3), MorphBase::Left), "ga", 5));
    let no_left = derived_from(1, node(7, 10, filled, MorphBase::Left));
    let orphan = derived_from(99, node(8, 10, filled.with(0, 3), MorphBase::Right));

    // a non-derivative whose sub-form holds an inconsistent derivative of its own
    let inner_original = node(20, 3, fixed, MorphBase::Right);
    let inner_bad = derived_from(20, node(21, 3, filled, MorphBase::Left));
    let mut outer = node(30, 0, Parameters::any(), MorphBase::Both);
    outer.right = Some(Arc::new(WordForm::new("x", vec![Arc::new(inner_original), inner_bad])));

    let form = Arc::new(WordForm::new("gam", vec![
        Arc::new(original),
        consistent,
        other_base,
        other_text,
        other_id,
        other_slot,
        no_left,
        orphan,
        Arc::new(outer),
    ]));
    let filtered = DerivativeFilter::new().run(&form, &CancellationToken::new()).unwrap();

    let sids: Vec<u64> = filtered.solutions.iter().map(|s| s.sid.0).collect();
    assert_eq!(sids, [1, 2, 8, 30]);
    let inner = filtered.solutions[3].right.as_ref().unwrap();
    assert_eq!(inner.solutions.len(), 1);
    assert_eq!(inner.solutions[0].sid, SolutionId(20));
}

#[test]
fn pre_cancelled_worker_reports_cancellation() {
    let analyzer = analyzer(Options::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let handle = analyzer.spawn_with(SearchRequest::new("devendro"), cancel).unwrap();
    assert!(matches!(handle.join(), Err(AnalysisError::Cancelled)));
}

/// Rule source that cancels `cancel` the first time it scans `entry`.
struct CancelOnEntry {
    inner: Arc<MemoryCatalog>,
    entry: &'static str,
    cancel: CancellationToken,
}

impl RuleSource for CancelOnEntry {
    fn rules(&self, label: &str, parameters: &Parameters) -> Arc<[Arc<MorphRule>]> {
        self.inner.rules(label, parameters)
    }

    fn sandhi_matches(&self, entry: &str, rule: &MorphRule) -> Arc<[SandhiMatch]> {
        if entry == self.entry {
            self.cancel.cancel();
        }
        self.inner.sandhi_matches(entry, rule)
    }
}

#[test]
fn cancellation_inside_parallel_workers_keeps_the_memo_reusable() {
    let options = Options { rule_fanout_threshold: 0, solution_fanout_threshold: 0, ..Options::default() };
    let request = SearchRequest::new("devendro");
    let interrupted = CancellationToken::new();
    let retry = CancellationToken::new();

    // "indro" is only reached inside the deva+indro split, below the parallel root
    let cancelling = Context {
        rules: Arc::new(CancelOnEntry {
            inner: Arc::new(devendro_catalog()),
            entry: "indro",
            cancel: interrupted.clone(),
        }),
        ..context(devendro_catalog())
    };
    let search = SolutionSearch::new(&cancelling, &options, &interrupted);
    assert!(matches!(search.search(&request), Err(AnalysisError::Cancelled)));
    assert!(interrupted.is_cancelled());

    let search = search.resume_with(&retry);
    let resumed = search.search(&request).unwrap();
    assert!(search.metrics().memo_hits >= 1);

    let plain = context(devendro_catalog());
    let fresh = SolutionSearch::new(&plain, &options, &retry).search(&request).unwrap();
    assert_eq!(render(&resumed), render(&fresh));
}

#[test]
fn collapsed_cycles_stop_at_the_collapsed_bound() {
    let mut catalog = MemoryCatalog::new();
    catalog.add_sandhi(SandhiPattern::new("", "", SandhiGroup::LEFT));
    catalog.add_rule(morph_rule! { id: 3, label: "", left: "", is_collapsed: true });

    let run = Analyzer::new(context(catalog))
        .with_options(Options { max_depth_level: 2, max_collapsed_steps: 3, ..Options::default() })
        .analyze_verbose(&SearchRequest::new("gam"), &CancellationToken::new())
        .unwrap();

    // "gam" rewrites to itself; each collapsed step searches it again until the bound
    assert_eq!(run.details.search.rule_applications, 3);
    assert_eq!(run.details.search.depth_watermark, 0);
    assert_eq!(run.form.solutions.len(), 1);
    assert_eq!(run.form.solutions[0].content.error, SolutionError::NotFoundLeftByParameters);
    assert_eq!(run.form.solutions[0].rating, 0.0);
}

#[test]
fn growing_collapsed_rules_terminate() {
    let mut catalog = MemoryCatalog::new();
    catalog.add_sandhi(SandhiPattern::new("o", "a", SandhiGroup::LEFT));
    catalog.add_rule(morph_rule! { id: 4, label: "", left: "o", is_collapsed: true });

    // devo -> devao -> devaao -> ...
    let run = Analyzer::new(context(catalog))
        .analyze_verbose(&SearchRequest::new("devo"), &CancellationToken::new())
        .unwrap();

    assert_eq!(run.details.search.rule_applications, Options::default().max_collapsed_steps);
    assert!(!run.form.has_success());
}

struct SuccessesOnly {
    saw_unrated: Arc<AtomicBool>,
}

impl TreePass for SuccessesOnly {
    fn name(&self) -> &str {
        "successes-only"
    }

    fn run(&self, form: Arc<WordForm>, cancel: &CancellationToken) -> crate::error::Result<Arc<WordForm>> {
        cancel.check()?;
        self.saw_unrated.store(form.solutions.iter().all(|s| !s.is_rated()), Ordering::Relaxed);
        let kept: Vec<Arc<Solution>> = form.successes().cloned().collect();
        Ok(Arc::new(WordForm::new(form.entry.clone(), kept)))
    }
}

#[test]
fn registered_passes_run_before_rating() {
    let saw_unrated = Arc::new(AtomicBool::new(false));
    let run = analyzer(Options::default())
        .with_pass(SuccessesOnly { saw_unrated: saw_unrated.clone() })
        .analyze_verbose(&SearchRequest::new("devendro"), &CancellationToken::new())
        .unwrap();

    assert!(saw_unrated.load(Ordering::Relaxed));
    assert_eq!(run.form.solutions.len(), 2);
    assert!(run.form.solutions.iter().all(|s| s.is_rated()));
    assert_eq!(run.details.passes.len(), 1);
    assert_eq!(run.details.passes[0].name, "successes-only");
    assert!(run.details.passes[0].removed() >= 1);
}

#[test]
fn debug_order_matches_rating_order_without_dictionary_derivations() {
    let debug = analyze("devendro", Options { debug_order: true, ..Options::default() });
    let rated = analyze("devendro", Options::default());

    // none of the top-level solutions carries an id, so nothing leads
    assert!(debug.solutions.iter().all(|s| s.content.id == 0));
    assert_eq!(render(&debug), render(&rated));
}

#[test]
fn dictionary_hit_short_circuits_rules() {
    let form = analyze("deva", Options::default());
    assert_eq!(form.solutions.len(), 1);
    assert!(form.solutions[0].rules.is_none());
    assert_eq!(form.solutions[0].rating, 2.0);
}
