//! Derivation engines: signals → rules → stage → explanation, plus trends.
//!
//! Every engine is a pure function over already-loaded data.

pub mod signals;
pub mod rules;
pub mod decision;
pub mod explain;
pub mod trend;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::snapshot::Snapshot;
use crate::types::{RuleResult, Signal, Stage};

pub use decision::StageEvaluator;
pub use explain::ExplainabilityResolver;
pub use rules::RuleEngine;
pub use signals::SignalEngine;
pub use trend::TrendEngine;

/// Everything one pipeline run produces for a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Derivation {
    pub signals: Vec<Signal>,
    pub rule_results: Vec<RuleResult>,
    pub stage: Option<Stage>,
    pub contributing_signals: Vec<Signal>,
}

/// Run the pipeline over a snapshot whose derived metrics are current.
pub fn derive(snapshot: &Snapshot) -> Derivation {
    let signals = SignalEngine::compute(snapshot);
    let rule_results = RuleEngine::evaluate(&signals);
    let stage = StageEvaluator::determine(&rule_results);
    let contributing_signals = ExplainabilityResolver::resolve(&signals, &rule_results);

    info!(
        snapshot_id = %snapshot.id(),
        stage = ?stage,
        signals = signals.len(),
        contributing = contributing_signals.len(),
        "Derivation complete"
    );

    Derivation {
        signals,
        rule_results,
        stage,
        contributing_signals,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
