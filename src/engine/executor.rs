use std::path::Path;

use dashmap::DashSet;
use rayon::prelude::*;

use crate::analyzer::ProjectAnalyzer;
use crate::domain::Value;
use crate::errors::Result;
use crate::extractors::BugKind;
use crate::oracle::{IntraDataFlowAnalyzer, PathValidator};

use super::state::DFBScanState;
use super::worklist::{DfbscanEngine, EngineConfig};

/// Default size of the bounded worker pool dispatching one task per source seed.
pub const DEFAULT_MAX_WORKERS: usize = 30;

/// Runs the full scan over `sources`: builds one [`DfbscanEngine`] shared read-only
/// across a bounded rayon pool, and dispatches one task per seed. A single seed's
/// failure is logged and swallowed; it never aborts the batch.
#[allow(clippy::too_many_arguments)]
pub fn run_scan(
    analyzer: &ProjectAnalyzer,
    bug_kind: BugKind,
    sources: Vec<Value>,
    sinks: &[Value],
    intra: &dyn IntraDataFlowAnalyzer,
    validator: &dyn PathValidator,
    out_dir: &Path,
    config: EngineConfig,
    max_workers: usize,
) -> Result<DFBScanState> {
    let state = DFBScanState::new();
    let engine = DfbscanEngine::new(analyzer, bug_kind, sinks, intra, validator, &state, config);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers.max(1))
        .build()
        .map_err(|e| crate::errors::ScanError::analysis(e.to_string()))?;

    // Extraction can hand back the same seed more than once (e.g. a source value
    // that's both a default parameter and a later reassignment target). `seen` lets
    // workers on the shared pool claim a seed without a global lock.
    let seen: DashSet<String> = DashSet::new();

    pool.install(|| {
        sources.into_par_iter().for_each(|seed| {
            let seed_display = seed.to_string();
            if !seen.insert(seed_display.clone()) {
                return;
            }
            if let Err(err) = engine.process_seed(seed, out_dir) {
                tracing::warn!(seed = %seed_display, error = %err, "seed analysis failed, skipping");
            }
        });
    });

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;
    use crate::oracle::stub::{DeterministicIntraDataFlowAnalyzer, DeterministicPathValidator};
    use tempfile::tempdir;

    #[test]
    fn run_scan_processes_every_seed_without_aborting() {
        let files = vec![(
            "a.c".to_string(),
            "void f() {\n  int *p = NULL;\n  *p = 1;\n}\nvoid g() {\n  int *q = NULL;\n  *q = 2;\n}\n".to_string(),
        )];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Npd).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        assert_eq!(sources.len(), 2);

        let intra = DeterministicIntraDataFlowAnalyzer;
        let validator = DeterministicPathValidator;
        let dir = tempdir().unwrap();

        let state = run_scan(
            &analyzer,
            BugKind::Npd,
            sources,
            &sinks,
            &intra,
            &validator,
            dir.path(),
            EngineConfig::default(),
            2,
        )
        .unwrap();

        assert!(state.bug_report_count() >= 2);
    }

    struct CountingIntraDataFlowAnalyzer {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl IntraDataFlowAnalyzer for CountingIntraDataFlowAnalyzer {
        fn analyze(&self, _input: &crate::oracle::IntraDataFlowAnalyzerInput) -> Option<crate::oracle::IntraDataFlowAnalyzerOutput> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(crate::oracle::IntraDataFlowAnalyzerOutput { reachable_values: vec![] })
        }
    }

    #[test]
    fn duplicate_seeds_are_processed_once() {
        let files = vec![("a.c".to_string(), "void f() {\n  int *p = NULL;\n  *p = 1;\n}\n".to_string())];
        let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, Language::Cpp).unwrap();
        let extractor = crate::extractors::extractor_for(Language::Cpp, BugKind::Npd).unwrap();
        let (sources, sinks) = crate::extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
        assert_eq!(sources.len(), 1);
        let duplicated = vec![sources[0].clone(), sources[0].clone(), sources[0].clone()];

        let intra = CountingIntraDataFlowAnalyzer { calls: std::sync::atomic::AtomicUsize::new(0) };
        let validator = DeterministicPathValidator;
        let dir = tempdir().unwrap();

        run_scan(&analyzer, BugKind::Npd, duplicated, &sinks, &intra, &validator, dir.path(), EngineConfig::default(), 4).unwrap();

        assert_eq!(intra.calls.load(std::sync::atomic::Ordering::SeqCst), 1, "identical seeds should only be analyzed once");
    }
}
