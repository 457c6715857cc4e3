use crate::domain::{Api, Function, FunctionId, Language, Value};
use rustc_hash::FxHashSet;

/// Everything eagerly extracted from one function-like definition during the parsing
/// stage. Node references are never kept past this point, matching the tree-sitter
/// adapter's "extract into an owned struct now" convention.
#[derive(Debug, Clone)]
pub struct ExtractedFunction {
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub parameters: Vec<String>,
    /// `(expression_text, absolute_line)`.
    pub returns: Vec<(String, usize)>,
}

/// One eagerly-extracted call site inside a function body.
#[derive(Debug, Clone)]
pub struct ExtractedCallSite {
    pub callee_name: String,
    /// 1-based, absolute.
    pub line: usize,
    pub argument_texts: Vec<String>,
}

/// Where an if-statement's branches sit (1-based, absolute lines). `check_control_order`
/// uses this to rule out a source/sink pair that sits in mutually exclusive arms of the
/// same conditional.
#[derive(Debug, Clone, Copy)]
pub struct IfStatement {
    pub start_line: usize,
    pub end_line: usize,
    pub true_branch: (usize, usize),
    pub else_branch: Option<(usize, usize)>,
}

/// A loop's body line range (1-based, absolute). `check_control_order` uses this to
/// allow a source that textually follows a sink to still reach it through iteration.
#[derive(Debug, Clone, Copy)]
pub struct LoopStatement {
    pub start_line: usize,
    pub end_line: usize,
    pub body: (usize, usize),
}

/// Per-language extraction rules. One implementation per supported [`Language`]; the
/// project analyzer dispatches to these but owns all of the shared bookkeeping (id
/// assignment, call-graph edges, indexes).
pub trait LanguagePlugin: Send + Sync {
    fn language(&self) -> Language;

    fn ts_language(&self) -> tree_sitter::Language;

    /// Node kind tree-sitter uses for a call expression in this language.
    fn call_node_kind(&self) -> &'static str;

    /// Walks a parsed tree and eagerly extracts every function-like definition.
    fn extract_functions(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<ExtractedFunction>;

    /// Eagerly extracts every call site within the byte range `[start_byte, end_byte)`.
    fn extract_call_sites(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        start_byte: usize,
        end_byte: usize,
    ) -> Vec<ExtractedCallSite>;

    /// Resolves the textual callee name at one call-like node (the same node kind
    /// `call_node_kind` names). Returns `None` when the callee expression has a shape
    /// the language's rule doesn't recognize.
    fn resolve_callee_name(&self, call_node: tree_sitter::Node, source: &str) -> Option<String>;

    /// Eagerly extracts `(name, definition_text)` pairs for file-level macro/constant
    /// definitions. Most of the supported languages have no static macro layer worth
    /// tracking at this stage; only the C/C++ adapter currently returns anything.
    fn extract_globals(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<(String, String)>;

    /// If-statements within `[start_byte, end_byte)`, for `check_control_order`.
    fn list_if_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<IfStatement>;

    /// Loop statements within `[start_byte, end_byte)`, for `check_control_order`.
    fn list_loop_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<LoopStatement>;
}

/// Read-only query surface the propagation engine and the extractors use. Implemented
/// once the project has been fully parsed and its call graph resolved.
pub trait CallGraphQuery {
    fn callers(&self, callee: FunctionId) -> FxHashSet<FunctionId>;
    fn callees(&self, caller: FunctionId) -> FxHashSet<FunctionId>;
    fn callee_apis(&self, caller: FunctionId) -> FxHashSet<Api>;
    fn transitive_callers(&self, start: FunctionId, max_depth: usize) -> FxHashSet<FunctionId>;
    fn transitive_callees(&self, start: FunctionId, max_depth: usize) -> FxHashSet<FunctionId>;

    /// Lines, within `func`, of call sites whose resolved callee name is `name`.
    fn list_callsites_by_name(&self, func: FunctionId, name: &str) -> Vec<usize>;

    /// Arguments passed at the call site on `call_line` within `func`, as ARG Values.
    fn list_arguments_at(&self, func: FunctionId, call_line: usize) -> Vec<Value>;
}

/// Parameter/return/call-site queries local to a single function, expressed in terms
/// of domain [`Value`]s.
pub trait FunctionQuery {
    fn parameters(&self, func: FunctionId) -> Vec<Value>;
    fn returns(&self, func: FunctionId) -> Vec<Value>;
    fn function(&self, id: FunctionId) -> Option<&Function>;
    fn function_containing_line(&self, file: &str, line: usize) -> Option<FunctionId>;

    /// Same as [`FunctionQuery::parameters`], named to match the capability the
    /// analyzer is specified against.
    fn list_parameters(&self, func: FunctionId) -> Vec<Value> {
        self.parameters(func)
    }

    /// Same as [`FunctionQuery::returns`], named to match the capability the analyzer
    /// is specified against.
    fn list_returns(&self, func: FunctionId) -> Vec<Value> {
        self.returns(func)
    }

    fn if_statements(&self, func: FunctionId) -> Vec<IfStatement>;
    fn loop_statements(&self, func: FunctionId) -> Vec<LoopStatement>;

    /// True unless `src_line` and `sink_line` provably can't execute in that order:
    /// they sit in opposite arms of the same `if`, or `src_line` strictly follows
    /// `sink_line` with no enclosing loop to carry control back around.
    fn check_control_order(&self, func: FunctionId, src_line: usize, sink_line: usize) -> bool;
}
