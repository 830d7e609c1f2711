//! Explainability resolver: which signals justified the stage decision.

use tracing::debug;

use super::decision::{decide, RuleOutcomes};
use super::rules::find;
use crate::types::{RuleResult, Signal};

pub struct ExplainabilityResolver;

impl ExplainabilityResolver {
    /// Contributing signals for the branch `StageEvaluator` takes on the
    /// same rule results. Credited kinds that were not emitted are skipped.
    pub fn resolve(signals: &[Signal], rule_results: &[RuleResult]) -> Vec<Signal> {
        let decision = decide(RuleOutcomes::from_results(rule_results));

        let contributing: Vec<Signal> = decision
            .contributing
            .iter()
            .filter_map(|kind| find(signals, *kind).cloned())
            .collect();

        debug!(
            stage = ?decision.stage,
            contributing = ?contributing.iter().map(Signal::name).collect::<Vec<_>>(),
            "Explanation resolved"
        );
        contributing
    }
}
