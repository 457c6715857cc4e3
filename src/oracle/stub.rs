use super::{
    IntraDataFlowAnalyzer, IntraDataFlowAnalyzerInput, IntraDataFlowAnalyzerOutput, PathValidator,
    PathValidatorInput, PathValidatorOutput,
};

/// Default oracle when no production transport has been wired in: always declines to
/// answer. Propagation simply stops at every frontier, which is a safe (if useless)
/// default rather than a crash.
pub struct NullIntraDataFlowAnalyzer;

impl IntraDataFlowAnalyzer for NullIntraDataFlowAnalyzer {
    fn analyze(&self, _input: &IntraDataFlowAnalyzerInput) -> Option<IntraDataFlowAnalyzerOutput> {
        None
    }
}

pub struct NullPathValidator;

impl PathValidator for NullPathValidator {
    fn validate(&self, _input: &PathValidatorInput) -> Option<PathValidatorOutput> {
        None
    }
}

/// Deterministic stand-in used by tests and demos: if any of the function's sink
/// values sit on a line at or after the start value's line, it reports one path
/// reaching every such sink. Otherwise it reports an empty frontier (propagation
/// dead-ends in this function). No textual reasoning, no network calls.
pub struct DeterministicIntraDataFlowAnalyzer;

impl IntraDataFlowAnalyzer for DeterministicIntraDataFlowAnalyzer {
    fn analyze(&self, input: &IntraDataFlowAnalyzerInput) -> Option<IntraDataFlowAnalyzerOutput> {
        let reached: Vec<_> = input
            .sink_values
            .iter()
            .filter(|s| s.line_number >= input.start_value.line_number)
            .cloned()
            .collect();
        if reached.is_empty() {
            Some(IntraDataFlowAnalyzerOutput { reachable_values: vec![] })
        } else {
            Some(IntraDataFlowAnalyzerOutput { reachable_values: vec![reached] })
        }
    }
}

/// Deterministic stand-in: any non-empty candidate path is reported reachable.
pub struct DeterministicPathValidator;

impl PathValidator for DeterministicPathValidator {
    fn validate(&self, input: &PathValidatorInput) -> Option<PathValidatorOutput> {
        Some(PathValidatorOutput {
            is_reachable: !input.path.is_empty(),
            explanation: format!("path of {} values accepted by deterministic validator", input.path.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Value, ValueLabel};

    #[test]
    fn deterministic_analyzer_reports_sinks_after_start_line() {
        let analyzer = DeterministicIntraDataFlowAnalyzer;
        let input = IntraDataFlowAnalyzerInput {
            function_name: "f".into(),
            function_code: String::new(),
            start_value: Value::new("x", 2, ValueLabel::Src, "a.c"),
            sink_values: vec![
                Value::new("y", 1, ValueLabel::Sink, "a.c"),
                Value::new("z", 5, ValueLabel::Sink, "a.c"),
            ],
            call_statements: vec![],
            return_values: vec![],
        };
        let output = analyzer.analyze(&input).unwrap();
        assert_eq!(output.reachable_values.len(), 1);
        assert_eq!(output.reachable_values[0].len(), 1);
        assert_eq!(output.reachable_values[0][0].name, "z");
    }

    #[test]
    fn deterministic_validator_rejects_empty_path() {
        let validator = DeterministicPathValidator;
        let input = PathValidatorInput { bug_kind: "NPD".into(), path: vec![] };
        let output = validator.validate(&input).unwrap();
        assert!(!output.is_reachable);
    }
}
