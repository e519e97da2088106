//! Filter evaluation over in-memory pairs
//!
//! Every function here takes a collection and returns the matching subset in
//! the original order. A pair that lacks the requested stage or an optional
//! field simply fails to match that field.

use crate::classify::{Classifier, Correctness};
use crate::filter::parser::PairFilter;
use crate::models::{JobPair, JoblineStage, SolverComparison};

/// Stage used for matching: the requested one, or the primary stage
fn selected_stage(pair: &JobPair, stage_number: Option<i64>) -> Option<&JoblineStage> {
    match stage_number {
        Some(n) => pair.stage(n),
        None => pair.primary_stage(),
    }
}

impl PairFilter {
    pub fn matches_stage(&self, stage: &JoblineStage, classifier: &Classifier) -> bool {
        let code = stage.status.code;
        match self {
            PairFilter::All => true,
            PairFilter::Incomplete => code.is_incomplete(),
            PairFilter::Resource => code.is_resource(),
            PairFilter::Failed => code.is_failed(),
            PairFilter::Complete => code.is_complete(),
            PairFilter::Solved => classifier.classify(stage) == Correctness::Correct,
            PairFilter::Wrong => classifier.classify(stage) == Correctness::Incorrect,
            PairFilter::Unknown => classifier.classify(stage) == Correctness::Unknown,
        }
    }

    pub fn matches(&self, pair: &JobPair, stage_number: Option<i64>, classifier: &Classifier) -> bool {
        if *self == PairFilter::All {
            return true;
        }
        selected_stage(pair, stage_number).is_some_and(|stage| self.matches_stage(stage, classifier))
    }
}

/// Keep the pairs whose selected stage passes `filter`
pub fn filter_pairs_by_type(
    pairs: Vec<JobPair>,
    filter: PairFilter,
    stage_number: Option<i64>,
    classifier: &Classifier,
) -> Vec<JobPair> {
    pairs
        .into_iter()
        .filter(|pair| filter.matches(pair, stage_number, classifier))
        .collect()
}

fn pair_matches_query(
    pair: &JobPair,
    query: &str,
    stage_number: Option<i64>,
    classifier: &Classifier,
) -> bool {
    if pair.bench.name.to_lowercase().contains(query) {
        return true;
    }
    let Some(stage) = selected_stage(pair, stage_number) else {
        return false;
    };
    if stage.solver.name.to_lowercase().contains(query)
        || stage.configuration.name.to_lowercase().contains(query)
    {
        return true;
    }
    if stage.status.code.code().to_string() == query {
        return true;
    }
    stage
        .attribute(&classifier.keys().result)
        .is_some_and(|result| result.to_lowercase().contains(query))
}

/// Case-insensitive free-text search. An empty query keeps every pair.
pub fn search_pairs(
    pairs: Vec<JobPair>,
    query: &str,
    stage_number: Option<i64>,
    classifier: &Classifier,
) -> Vec<JobPair> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return pairs;
    }
    pairs
        .into_iter()
        .filter(|pair| pair_matches_query(pair, &query, stage_number, classifier))
        .collect()
}

/// Case-insensitive search of comparisons by benchmark name
pub fn search_comparisons(comparisons: Vec<SolverComparison>, query: &str) -> Vec<SolverComparison> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return comparisons;
    }
    comparisons
        .into_iter()
        .filter(|c| c.benchmark().name.to_lowercase().contains(&query))
        .collect()
}
