pub mod retry;
pub mod stub;

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::domain::Value;

/// One call statement inside the function under analysis, function-relative line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatement {
    pub text: String,
    pub line: usize,
}

/// Input to the per-function intra-procedural summary oracle. All lines are
/// function-relative (1 = the function's own first line), matching what the
/// propagation engine normalizes before invoking it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntraDataFlowAnalyzerInput {
    pub function_name: String,
    pub function_code: String,
    pub start_value: Value,
    pub sink_values: Vec<Value>,
    pub call_statements: Vec<CallStatement>,
    pub return_values: Vec<Value>,
}

impl PartialEq for IntraDataFlowAnalyzerInput {
    fn eq(&self, other: &Self) -> bool {
        self.function_name == other.function_name
            && self.start_value == other.start_value
            && self.sink_values == other.sink_values
    }
}
impl Eq for IntraDataFlowAnalyzerInput {}

impl Hash for IntraDataFlowAnalyzerInput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.function_name.hash(state);
        self.start_value.hash(state);
        self.sink_values.hash(state);
    }
}

/// Output of the intra-procedural oracle: one frontier (set of reached [`Value`]s) per
/// distinct path the oracle believes it found. An empty outer list means "no further
/// propagation discovered".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntraDataFlowAnalyzerOutput {
    pub reachable_values: Vec<Vec<Value>>,
}

/// A candidate end-to-end propagation chain, plus the bug kind it is being checked
/// against, submitted for feasibility validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathValidatorInput {
    pub bug_kind: String,
    pub path: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathValidatorOutput {
    pub is_reachable: bool,
    pub explanation: String,
}

/// Per-function intra-procedural data-flow summary oracle. Implementations are free to
/// call out to an LLM, a cache, or (for tests) a fixed table; the propagation engine
/// only depends on this contract.
pub trait IntraDataFlowAnalyzer: Send + Sync {
    fn analyze(&self, input: &IntraDataFlowAnalyzerInput) -> Option<IntraDataFlowAnalyzerOutput>;
}

/// End-to-end path feasibility oracle, invoked once per candidate buggy path before it
/// is promoted to a bug report.
pub trait PathValidator: Send + Sync {
    fn validate(&self, input: &PathValidatorInput) -> Option<PathValidatorOutput>;
}
