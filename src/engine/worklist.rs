use std::collections::{HashSet, VecDeque};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::analyzer::{CallGraphQuery, FunctionQuery, ProjectAnalyzer};
use crate::domain::{CallContext, ContextLabel, FunctionId, Parenthesis, Value, ValueLabel};
use crate::errors::Result;
use crate::extractors::BugKind;
use crate::oracle::{CallStatement, IntraDataFlowAnalyzer, IntraDataFlowAnalyzerInput, PathValidator, PathValidatorInput};
use crate::report::{BugReport, RelevantFunctions};

use super::state::DFBScanState;

type Seeded = (Value, CallContext);

/// Configuration knobs the propagation engine is parameterized over.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { call_depth: 5 }
    }
}

/// The worklist-driven, CFL-bounded propagation engine for one source seed at a time.
/// Holds no per-seed mutable state itself; everything a task writes goes through the
/// shared [`DFBScanState`].
pub struct DfbscanEngine<'a> {
    analyzer: &'a ProjectAnalyzer,
    bug_kind: BugKind,
    sinks_by_function: FxHashMap<FunctionId, Vec<Value>>,
    intra: &'a dyn IntraDataFlowAnalyzer,
    validator: &'a dyn PathValidator,
    state: &'a DFBScanState,
    config: EngineConfig,
}

impl<'a> DfbscanEngine<'a> {
    pub fn new(
        analyzer: &'a ProjectAnalyzer,
        bug_kind: BugKind,
        sinks: &[Value],
        intra: &'a dyn IntraDataFlowAnalyzer,
        validator: &'a dyn PathValidator,
        state: &'a DFBScanState,
        config: EngineConfig,
    ) -> Self {
        let mut sinks_by_function: FxHashMap<FunctionId, Vec<Value>> = FxHashMap::default();
        for sink in sinks {
            if let Some(fid) = analyzer.function_containing_line(&sink.file, sink.line_number) {
                sinks_by_function.entry(fid).or_default().push(sink.clone());
            }
        }
        DfbscanEngine { analyzer, bug_kind, sinks_by_function, intra, validator, state, config }
    }

    /// Drains the worklist for a single source seed, then collects and validates the
    /// candidate buggy paths it produced, persisting any accepted report.
    pub fn process_seed(&self, source: Value, out_dir: &Path) -> Result<()> {
        let Some(start_func) = self.analyzer.function_containing_line(&source.file, source.line_number) else {
            tracing::debug!(value = %source, "source seed has no enclosing function, skipping");
            return Ok(());
        };

        let mut worklist: VecDeque<(Value, FunctionId, CallContext)> = VecDeque::new();
        worklist.push_back((source.clone(), start_func, CallContext::new(false)));

        while let Some((value, func_id, ctx)) = worklist.pop_front() {
            if ctx.depth() > self.config.call_depth {
                continue;
            }
            self.expand(&value, func_id, &ctx, &mut worklist);
        }

        self.collect_potential_buggy_paths(&source);

        for path in self.state.buggy_paths_for(&source) {
            let input = PathValidatorInput { bug_kind: self.bug_kind.to_string(), path: path.clone() };
            let Some(verdict) = self.validator.validate(&input) else {
                continue;
            };
            if !verdict.is_reachable {
                continue;
            }
            let report = self.build_report(&source, &path, &verdict.explanation);
            self.state.update_bug_report(report);
            crate::report::write_detect_info(out_dir, &self.state.snapshot_reports())?;
        }

        Ok(())
    }

    fn expand(&self, value: &Value, func_id: FunctionId, ctx: &CallContext, worklist: &mut VecDeque<(Value, FunctionId, CallContext)>) {
        let Some(func) = self.analyzer.function(func_id) else {
            return;
        };

        let sinks = self.sinks_by_function.get(&func_id).cloned().unwrap_or_default();
        let call_statements: Vec<CallStatement> = self
            .analyzer
            .callsites(func_id)
            .iter()
            .map(|c| CallStatement { text: format!("{}(...)", c.callee_name), line: func.file_line_to_function_line(c.line) })
            .collect();
        let return_values: Vec<Value> = self
            .analyzer
            .returns(func_id)
            .into_iter()
            .map(|mut v| {
                v.line_number = func.file_line_to_function_line(v.line_number);
                v
            })
            .collect();
        let sink_values: Vec<Value> = sinks
            .iter()
            .cloned()
            .map(|mut v| {
                v.line_number = func.file_line_to_function_line(v.line_number);
                v
            })
            .collect();

        let input = IntraDataFlowAnalyzerInput {
            function_name: func.name.clone(),
            function_code: func.code.clone(),
            start_value: {
                let mut v = value.clone();
                v.line_number = func.file_line_to_function_line(v.line_number);
                v
            },
            sink_values,
            call_statements,
            return_values,
        };

        let Some(output) = self.intra.analyze(&input) else {
            return;
        };

        for frontier in output.reachable_values {
            let frontier_seeded: Vec<Seeded> = frontier.iter().map(|v| (v.clone(), ctx.clone())).collect();
            self.state.update_reachable_values_per_path((value.clone(), ctx.clone()), frontier_seeded);

            for next_value in &frontier {
                match next_value.label {
                    ValueLabel::Arg => self.expand_arg(func_id, next_value, ctx, worklist),
                    ValueLabel::Para => self.expand_para(func_id, next_value, ctx, worklist),
                    ValueLabel::Ret => self.expand_ret(func_id, next_value, ctx, worklist),
                    _ => {}
                }
            }
        }
    }

    fn expand_arg(&self, func_id: FunctionId, arg: &Value, ctx: &CallContext, worklist: &mut VecDeque<(Value, FunctionId, CallContext)>) {
        let Some(func) = self.analyzer.function(func_id) else { return };
        for site in self.analyzer.callsites(func_id) {
            if site.line != arg.line_number {
                continue;
            }
            let Some(callee_id) = site.resolved_callee else { continue };
            let label = ContextLabel::new(func.file.clone(), site.line, callee_id, Parenthesis::Left);
            let Some(next_ctx) = ctx.add_and_check_context(label) else { continue };
            for param in self.analyzer.parameters(callee_id) {
                if param.index != arg.index {
                    continue;
                }
                self.state.update_external_value_match((arg.clone(), ctx.clone()), (param.clone(), next_ctx.clone()));
                worklist.push_back((param, callee_id, next_ctx.clone()));
            }
        }
    }

    fn expand_para(&self, func_id: FunctionId, para: &Value, ctx: &CallContext, worklist: &mut VecDeque<(Value, FunctionId, CallContext)>) {
        for caller_id in self.analyzer.callers(func_id) {
            let Some(caller) = self.analyzer.function(caller_id) else { continue };
            for site in self.analyzer.callsites(caller_id) {
                if site.resolved_callee != Some(func_id) {
                    continue;
                }
                let label = ContextLabel::new(caller.file.clone(), site.line, func_id, Parenthesis::Right);
                let Some(next_ctx) = ctx.add_and_check_context(label) else { continue };
                for arg in self.analyzer.arguments_at(caller_id, site) {
                    if arg.index != para.index {
                        continue;
                    }
                    self.state.update_external_value_match((para.clone(), ctx.clone()), (arg.clone(), next_ctx.clone()));
                    worklist.push_back((arg, caller_id, next_ctx.clone()));
                }
            }
        }
    }

    fn expand_ret(&self, func_id: FunctionId, ret: &Value, ctx: &CallContext, worklist: &mut VecDeque<(Value, FunctionId, CallContext)>) {
        for caller_id in self.analyzer.callers(func_id) {
            let Some(caller) = self.analyzer.function(caller_id) else { continue };
            for site in self.analyzer.callsites(caller_id) {
                if site.resolved_callee != Some(func_id) {
                    continue;
                }
                let label = ContextLabel::new(caller.file.clone(), site.line, func_id, Parenthesis::Right);
                let Some(next_ctx) = ctx.add_and_check_context(label) else { continue };
                let output = self.analyzer.output_value_at(caller_id, site);
                self.state.update_external_value_match((ret.clone(), ctx.clone()), (output.clone(), next_ctx.clone()));
                worklist.push_back((output, caller_id, next_ctx.clone()));
            }
        }
    }

    /// Recursively walks `reachable_values_per_path` and `external_value_match` from
    /// the seed, emitting a candidate path whenever the bug's witness condition fires:
    /// a SINK hit for reachability-style bugs, or a key whose frontier came back
    /// genuinely empty for unreachability-style bugs (e.g. an allocation for which
    /// propagation never turned up another value at all, so it never reaches a
    /// dealloc). A value with no *external* match (no further ARG/PARA/RET hop) is not
    /// itself a witness — SINK values never get one by construction, since `expand`
    /// only records external matches for ARG/PARA/RET, and reaching a SINK is exactly
    /// the non-buggy case for this bug family.
    fn collect_potential_buggy_paths(&self, source: &Value) {
        let start: Seeded = (source.clone(), CallContext::new(false));
        let mut visited: HashSet<Seeded> = HashSet::new();
        self.dfs_collect(source, &start, vec![source.clone()], &mut visited);
    }

    /// True unless `source` and `sink` sit in the same function and that function's
    /// control flow provably rules out the sink executing after the source (opposite
    /// `if` arms, or a sink that only textually precedes the source with no enclosing
    /// loop). Values in different functions are always allowed through here; cross-
    /// function ordering is the call graph's job, not a single function's branches.
    ///
    /// `sink`'s line number arrives function-relative (the oracle only ever sees
    /// function-local views), so it's translated back to an absolute file line before
    /// being compared against the analyzer's (always absolute) branch/loop ranges.
    fn control_order_allows(&self, source: &Value, sink: &Value) -> bool {
        let Some(src_func_id) = self.analyzer.function_containing_line(&source.file, source.line_number) else {
            return true;
        };
        let Some(src_func) = self.analyzer.function(src_func_id) else {
            return true;
        };
        if sink.file != source.file {
            return true;
        }
        let sink_line = src_func.function_line_to_file_line(sink.line_number);
        if !src_func.contains_line(sink_line) {
            return true;
        }
        self.analyzer.check_control_order(src_func_id, source.line_number, sink_line)
    }

    fn dfs_collect(&self, source: &Value, key: &Seeded, prefix: Vec<Value>, visited: &mut HashSet<Seeded>) {
        if !visited.insert(key.clone()) {
            return;
        }
        let frontiers = self.state.reachable_frontiers(key);
        let mut saw_any_value = false;

        for frontier in &frontiers {
            for (value, ctx) in frontier {
                saw_any_value = true;
                let mut path = prefix.clone();
                path.push(value.clone());

                if self.bug_kind.is_reachability_style() && value.label == ValueLabel::Sink && self.control_order_allows(source, value) {
                    self.state.update_potential_buggy_paths(source.clone(), path.clone());
                }

                let external = self.state.external_matches(&(value.clone(), ctx.clone()));
                for next in external {
                    self.dfs_collect(source, &next, path.clone(), visited);
                }
            }
        }

        if !saw_any_value && !self.bug_kind.is_reachability_style() {
            self.state.update_potential_buggy_paths(source.clone(), prefix);
        }
    }

    fn build_report(&self, source: &Value, path: &[Value], explanation: &str) -> BugReport {
        let mut paths = Vec::new();
        let mut names = Vec::new();
        let mut codes = Vec::new();
        let mut seen_functions: HashSet<FunctionId> = HashSet::new();

        for value in path {
            if let Some(fid) = self.analyzer.function_containing_line(&value.file, value.line_number) {
                if seen_functions.insert(fid) {
                    if let Some(f) = self.analyzer.function(fid) {
                        paths.push(f.file.clone());
                        names.push(f.name.clone());
                        codes.push(f.code.clone());
                    }
                }
            }
        }

        BugReport {
            report_id: uuid::Uuid::new_v4(),
            bug_type: self.bug_kind,
            buggy_value: source.to_string(),
            relevant_functions: RelevantFunctions { paths, names, codes },
            explanation: explanation.to_string(),
            is_human_confirmed_true: "unknown".to_string(),
            detected_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;
    use crate::oracle::stub::{DeterministicIntraDataFlowAnalyzer, DeterministicPathValidator};
    use tempfile::tempdir;

    #[test]
    fn single_function_reachability_produces_a_report() {
        let files = vec![(
            "a.c".to_string(),
            "void f() {\n  int *p = NULL;\n  *p = 1;\n}\n".to_string(),
        )];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Npd).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        assert_eq!(sources.len(), 1);
        assert_eq!(sinks.len(), 1);

        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let state = DFBScanState::new();
        let engine = DfbscanEngine::new(&analyzer, BugKind::Npd, &sinks, &intra, &validator, &state, EngineConfig::default());

        let dir = tempdir().unwrap();
        engine.process_seed(sources[0].clone(), dir.path()).unwrap();

        assert!(state.bug_report_count() >= 1);
        assert!(dir.path().join("detect_info.json").exists());
    }

    #[test]
    fn freed_allocation_produces_no_mlk_report() {
        let files = vec![("a.c".to_string(), "void f() {\n  char *p = malloc(10);\n  free(p);\n}\n".to_string())];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Mlk).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        assert_eq!(sources.len(), 1);
        assert_eq!(sinks.len(), 1);

        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let state = DFBScanState::new();
        let engine = DfbscanEngine::new(&analyzer, BugKind::Mlk, &sinks, &intra, &validator, &state, EngineConfig::default());

        let dir = tempdir().unwrap();
        engine.process_seed(sources[0].clone(), dir.path()).unwrap();

        assert_eq!(state.bug_report_count(), 0, "allocation reaches free(), so this must not be reported as a leak");
    }

    #[test]
    fn allocation_never_freed_produces_an_mlk_report() {
        let files = vec![("a.c".to_string(), "void f() {\n  char *p = malloc(10);\n}\n".to_string())];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Mlk).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        assert_eq!(sources.len(), 1);
        assert!(sinks.is_empty());

        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let state = DFBScanState::new();
        let engine = DfbscanEngine::new(&analyzer, BugKind::Mlk, &sinks, &intra, &validator, &state, EngineConfig::default());

        let dir = tempdir().unwrap();
        engine.process_seed(sources[0].clone(), dir.path()).unwrap();

        assert!(state.bug_report_count() >= 1, "allocation with no matching free() must be reported as a leak");
    }

    #[test]
    fn source_and_sink_in_opposite_if_branches_produce_no_report() {
        let files = vec![(
            "a.c".to_string(),
            "void f(int c) {\n  int *p = NULL;\n  if (c) {\n    p = NULL;\n  } else {\n    *p = 1;\n  }\n}\n".to_string(),
        )];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Npd).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        let branch_source = sources.iter().find(|s| s.line_number == 4).cloned().unwrap();

        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let state = DFBScanState::new();
        let engine = DfbscanEngine::new(&analyzer, BugKind::Npd, &sinks, &intra, &validator, &state, EngineConfig::default());
        let dir = tempdir().unwrap();
        engine.process_seed(branch_source, dir.path()).unwrap();

        assert_eq!(state.bug_report_count(), 0, "sink sits in the else arm, source in the if arm: can't execute in that order");
    }

    #[test]
    fn depth_bound_prevents_runaway_expansion() {
        let files = vec![(
            "a.c".to_string(),
            "void f() {\n  int *p = NULL;\n}\nvoid g() { f(); }\n".to_string(),
        )];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Npd).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let state = DFBScanState::new();
        let config = EngineConfig { call_depth: 0 };
        let engine = DfbscanEngine::new(&analyzer, BugKind::Npd, &sinks, &intra, &validator, &state, config);
        let dir = tempdir().unwrap();
        for s in &sources {
            engine.process_seed(s.clone(), dir.path()).unwrap();
        }
        // Should not panic or loop forever regardless of outcome.
    }
}
