pub mod cpp;
pub mod go;
pub mod java;
pub mod python;

use serde::{Deserialize, Serialize};

use crate::analyzer::{ParsedTrees, ProjectAnalyzer};
use crate::domain::{Function, Language, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugKind {
    /// Null-pointer dereference: reachability-style.
    Npd,
    /// Memory leak: unreachability-style (bug is an empty frontier, not a sink hit).
    Mlk,
    /// Use-after-free: reachability-style.
    Uaf,
}

impl BugKind {
    pub fn is_reachability_style(&self) -> bool {
        !matches!(self, BugKind::Mlk)
    }

    pub fn supported_for(language: Language) -> Vec<BugKind> {
        match language {
            Language::C | Language::Cpp => vec![BugKind::Npd, BugKind::Mlk, BugKind::Uaf],
            Language::Java | Language::Python | Language::Go => vec![BugKind::Npd],
        }
    }
}

impl std::fmt::Display for BugKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BugKind::Npd => "NPD",
            BugKind::Mlk => "MLK",
            BugKind::Uaf => "UAF",
        };
        f.write_str(s)
    }
}

/// Per-language, per-bug-kind source/sink pattern matcher. Implementations never see
/// more than one function's subtree at a time.
pub trait BugExtractor: Send + Sync {
    fn bug_kind(&self) -> BugKind;
    fn extract_sources(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value>;
    fn extract_sinks(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value>;
}

/// Returns the extractor for `(language, kind)`, or `None` if that combination isn't
/// supported.
pub fn extractor_for(language: Language, kind: BugKind) -> Option<Box<dyn BugExtractor>> {
    match (language, kind) {
        (Language::C | Language::Cpp, BugKind::Npd) => Some(Box::new(cpp::CppNpdExtractor)),
        (Language::C | Language::Cpp, BugKind::Mlk) => Some(Box::new(cpp::CppMlkExtractor)),
        (Language::C | Language::Cpp, BugKind::Uaf) => Some(Box::new(cpp::CppUafExtractor)),
        (Language::Java, BugKind::Npd) => Some(Box::new(java::JavaNpdExtractor)),
        (Language::Python, BugKind::Npd) => Some(Box::new(python::PythonNpdExtractor)),
        (Language::Go, BugKind::Npd) => Some(Box::new(go::GoNpdExtractor)),
        _ => None,
    }
}

/// A file is excluded from extraction if its path looks like a test or example, the
/// same exclusion the underlying extractor interface applies uniformly regardless of
/// bug kind.
fn is_excluded(file: &str) -> bool {
    file.contains("test") || file.contains("example")
}

/// Runs `extractor` over every function in `analyzer`, skipping test/example files,
/// and returns the aggregated `(sources, sinks)`. Runs sequentially, once, before the
/// worker pool starts — `parsed` is not `Sync` and must not outlive this call.
pub fn extract_all(analyzer: &ProjectAnalyzer, parsed: &ParsedTrees, extractor: &dyn BugExtractor) -> (Vec<Value>, Vec<Value>) {
    let mut sources = Vec::new();
    let mut sinks = Vec::new();
    for func in analyzer.functions() {
        if is_excluded(&func.file) {
            continue;
        }
        let Some((tree, text)) = parsed.tree_and_source(&func.file) else {
            continue;
        };
        sources.extend(extractor.extract_sources(tree, text, func));
        sinks.extend(extractor.extract_sinks(tree, text, func));
    }
    (sources, sinks)
}
