use rustc_hash::{FxHashMap, FxHashSet};
use tree_sitter::Parser;

use crate::analyzer::languages::plugin_for;
use crate::analyzer::ports::{CallGraphQuery, ExtractedCallSite, FunctionQuery, IfStatement, LanguagePlugin, LoopStatement};
use crate::domain::{Api, Function, FunctionId, Language, Value, ValueLabel};
use crate::errors::Result;

/// One call site inside a function body, resolved against the project's function
/// table: either a function-to-function edge or a function-to-API edge, never both.
#[derive(Debug, Clone)]
pub struct ResolvedCallSite {
    pub line: usize,
    pub callee_name: String,
    pub argument_texts: Vec<String>,
    pub resolved_callee: Option<FunctionId>,
}

struct FunctionMeta {
    parameters: Vec<String>,
    returns: Vec<(String, usize)>,
    callsites: Vec<ResolvedCallSite>,
    if_statements: Vec<IfStatement>,
    loop_statements: Vec<LoopStatement>,
}

/// Parses every file in the project once, extracts the function table, and resolves
/// the two-tier call graph (function-to-function and function-to-API, both directions
/// stored as reciprocal maps). Read-only after [`ProjectAnalyzer::build`] returns.
///
/// Deliberately holds no `tree_sitter::Tree`: the engine shares `&ProjectAnalyzer`
/// across the worker pool, which requires `Sync`, and tree-sitter's tree/parser types
/// are not. Callers that need the parsed ASTs (bug extraction, which runs once,
/// single-threaded, before the pool starts) use [`ProjectAnalyzer::build_with_trees`]
/// and hold the returned [`ParsedTrees`] themselves.
pub struct ProjectAnalyzer {
    language: Language,
    functions: FxHashMap<FunctionId, Function>,
    meta: FxHashMap<FunctionId, FunctionMeta>,
    functions_by_file: FxHashMap<String, Vec<FunctionId>>,
    function_callers: FxHashMap<FunctionId, FxHashSet<FunctionId>>,
    api_callees: FxHashMap<FunctionId, FxHashSet<Api>>,
    /// File-level macro/constant definitions, `name -> definition text`. Mirrors the
    /// reference analyzer's global-variable map; C/C++ is the only language that
    /// populates it today.
    globals: FxHashMap<String, String>,
}

/// The parsed ASTs and raw source text kept alive only for the sequential bug
/// extraction pass. Not `Sync`; never shared with the worker pool.
pub struct ParsedTrees {
    trees: FxHashMap<String, tree_sitter::Tree>,
    sources: FxHashMap<String, String>,
}

impl ParsedTrees {
    pub fn tree_and_source(&self, file: &str) -> Option<(&tree_sitter::Tree, &str)> {
        Some((self.trees.get(file)?, self.sources.get(file)?.as_str()))
    }
}

impl ProjectAnalyzer {
    pub fn build(files: &[(String, String)], language: Language) -> Result<ProjectAnalyzer> {
        Self::build_with_trees(files, language).map(|(analyzer, _)| analyzer)
    }

    pub fn build_with_trees(files: &[(String, String)], language: Language) -> Result<(ProjectAnalyzer, ParsedTrees)> {
        let plugin = plugin_for(language);

        // Stage 1: parse every file and extract functions, in parallel. A parse
        // failure on one file is logged and that file is dropped from the batch.
        let parsed: Vec<(String, tree_sitter::Tree, &str)> = {
            use rayon::prelude::*;
            files
                .par_iter()
                .filter_map(|(path, source)| {
                    let mut parser = Parser::new();
                    if parser.set_language(plugin.ts_language()).is_err() {
                        tracing::warn!(file = %path, "failed to configure tree-sitter grammar");
                        return None;
                    }
                    match parser.parse(source, None) {
                        Some(tree) => Some((path.clone(), tree, source.as_str())),
                        None => {
                            tracing::warn!(file = %path, "tree-sitter failed to parse file, skipping");
                            None
                        }
                    }
                })
                .collect()
        };

        let mut functions: FxHashMap<FunctionId, Function> = FxHashMap::default();
        let mut meta: FxHashMap<FunctionId, FunctionMeta> = FxHashMap::default();
        let mut functions_by_file: FxHashMap<String, Vec<FunctionId>> = FxHashMap::default();
        let mut next_id: FunctionId = 0;

        // byte-range bookkeeping needed for stage 2, keyed the same way as `functions`.
        let mut ranges: FxHashMap<FunctionId, (usize, usize)> = FxHashMap::default();

        for (path, tree, source) in &parsed {
            for ef in plugin.extract_functions(tree, source) {
                let id = next_id;
                next_id += 1;
                let code = source
                    .get(ef.start_byte..ef.end_byte)
                    .unwrap_or_default()
                    .to_string();
                functions.insert(
                    id,
                    Function::new(id, ef.name, path.clone(), ef.start_line, ef.end_line, ef.start_byte, ef.end_byte, code),
                );
                ranges.insert(id, (ef.start_byte, ef.end_byte));
                meta.insert(
                    id,
                    FunctionMeta {
                        parameters: ef.parameters,
                        returns: ef.returns,
                        callsites: Vec::new(),
                        if_statements: Vec::new(),
                        loop_statements: Vec::new(),
                    },
                );
                functions_by_file.entry(path.clone()).or_default().push(id);
            }
        }

        let mut globals: FxHashMap<String, String> = FxHashMap::default();
        for (_, tree, source) in &parsed {
            for (name, definition) in plugin.extract_globals(tree, source) {
                globals.insert(name, definition);
            }
        }

        // Stage 2: call-graph edges, in parallel over functions.
        let trees_by_file: FxHashMap<&str, &tree_sitter::Tree> =
            parsed.iter().map(|(p, t, _)| (p.as_str(), t)).collect();
        let sources_by_file: FxHashMap<&str, &str> = parsed.iter().map(|(p, _, s)| (p.as_str(), *s)).collect();

        let per_function_sites: Vec<(FunctionId, Vec<ExtractedCallSite>)> = {
            use rayon::prelude::*;
            functions
                .par_iter()
                .filter_map(|(id, func)| {
                    let tree = trees_by_file.get(func.file.as_str())?;
                    let source = sources_by_file.get(func.file.as_str())?;
                    let (start, end) = ranges[id];
                    Some((*id, plugin.extract_call_sites(tree, source, start, end)))
                })
                .collect()
        };

        let per_function_control_flow: Vec<(FunctionId, Vec<IfStatement>, Vec<LoopStatement>)> = {
            use rayon::prelude::*;
            functions
                .par_iter()
                .filter_map(|(id, func)| {
                    let tree = trees_by_file.get(func.file.as_str())?;
                    let source = sources_by_file.get(func.file.as_str())?;
                    let (start, end) = ranges[id];
                    Some((
                        *id,
                        plugin.list_if_statements(tree, source, start, end),
                        plugin.list_loop_statements(tree, source, start, end),
                    ))
                })
                .collect()
        };
        for (id, ifs, loops) in per_function_control_flow {
            if let Some(m) = meta.get_mut(&id) {
                m.if_statements = ifs;
                m.loop_statements = loops;
            }
        }

        let name_to_ids: FxHashMap<&str, Vec<FunctionId>> = {
            let mut m: FxHashMap<&str, Vec<FunctionId>> = FxHashMap::default();
            for (id, f) in &functions {
                m.entry(f.name.as_str()).or_default().push(*id);
            }
            m
        };

        let mut function_callers: FxHashMap<FunctionId, FxHashSet<FunctionId>> = FxHashMap::default();
        let mut api_callees: FxHashMap<FunctionId, FxHashSet<Api>> = FxHashMap::default();

        for (caller, sites) in per_function_sites {
            let mut resolved = Vec::with_capacity(sites.len());
            for site in sites {
                let candidates = name_to_ids.get(site.callee_name.as_str());
                let callee_id = candidates.and_then(|ids| {
                    ids.iter()
                        .copied()
                        .find(|id| functions[id].name == site.callee_name && meta[id].parameters.len() == site.argument_texts.len())
                });
                if let Some(callee) = callee_id {
                    function_callers.entry(callee).or_default().insert(caller);
                } else {
                    let api = Api::new(site.callee_name.clone(), site.argument_texts.len());
                    api_callees.entry(caller).or_default().insert(api);
                }
                resolved.push(ResolvedCallSite {
                    line: site.line,
                    callee_name: site.callee_name,
                    argument_texts: site.argument_texts,
                    resolved_callee: callee_id,
                });
            }
            meta.get_mut(&caller).unwrap().callsites = resolved;
        }

        let trees: FxHashMap<String, tree_sitter::Tree> =
            parsed.iter().map(|(p, t, _)| (p.clone(), t.clone())).collect();
        let sources: FxHashMap<String, String> = parsed.iter().map(|(p, _, s)| (p.clone(), s.to_string())).collect();

        let analyzer = ProjectAnalyzer {
            language,
            functions,
            meta,
            functions_by_file,
            function_callers,
            api_callees,
            globals,
        };
        Ok((analyzer, ParsedTrees { trees, sources }))
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn callsites(&self, func: FunctionId) -> &[ResolvedCallSite] {
        self.meta.get(&func).map(|m| m.callsites.as_slice()).unwrap_or(&[])
    }

    pub fn callsites_by_callee_name<'a>(&'a self, func: FunctionId, name: &'a str) -> Vec<&'a ResolvedCallSite> {
        self.callsites(func).iter().filter(|c| c.callee_name == name).collect()
    }

    pub fn arguments_at(&self, func: FunctionId, site: &ResolvedCallSite) -> Vec<Value> {
        let file = self.functions.get(&func).map(|f| f.file.clone()).unwrap_or_default();
        site.argument_texts
            .iter()
            .enumerate()
            .map(|(i, text)| Value::new(text.clone(), site.line, ValueLabel::Arg, file.clone()).with_index(i as i32))
            .collect()
    }

    pub fn output_value_at(&self, func: FunctionId, site: &ResolvedCallSite) -> Value {
        let file = self.functions.get(&func).map(|f| f.file.clone()).unwrap_or_default();
        Value::new(format!("{}(...)", site.callee_name), site.line, ValueLabel::Out, file)
    }

    /// Functions in `caller` whose call site at `call_line` targets `callee`. Used to
    /// decide whether an ARG expansion's call site actually contains the source line.
    pub fn callsite_at_line(&self, caller: FunctionId, callee: FunctionId, call_line: usize) -> Option<&ResolvedCallSite> {
        self.callsites(caller)
            .iter()
            .find(|c| c.resolved_callee == Some(callee) && c.line == call_line)
    }

    pub fn globals(&self) -> &FxHashMap<String, String> {
        &self.globals
    }
}

impl FunctionQuery for ProjectAnalyzer {
    fn parameters(&self, func: FunctionId) -> Vec<Value> {
        let Some(f) = self.functions.get(&func) else {
            return Vec::new();
        };
        let Some(m) = self.meta.get(&func) else {
            return Vec::new();
        };
        m.parameters
            .iter()
            .enumerate()
            .map(|(i, name)| Value::new(name.clone(), f.start_line, ValueLabel::Para, f.file.clone()).with_index(i as i32))
            .collect()
    }

    fn returns(&self, func: FunctionId) -> Vec<Value> {
        let Some(f) = self.functions.get(&func) else {
            return Vec::new();
        };
        let Some(m) = self.meta.get(&func) else {
            return Vec::new();
        };
        m.returns
            .iter()
            .enumerate()
            .map(|(i, (text, line))| Value::new(text.clone(), *line, ValueLabel::Ret, f.file.clone()).with_index(i as i32))
            .collect()
    }

    fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(&id)
    }

    fn function_containing_line(&self, file: &str, line: usize) -> Option<FunctionId> {
        self.functions_by_file
            .get(file)?
            .iter()
            .copied()
            .find(|id| self.functions[id].contains_line(line))
    }

    fn if_statements(&self, func: FunctionId) -> Vec<IfStatement> {
        self.meta.get(&func).map(|m| m.if_statements.clone()).unwrap_or_default()
    }

    fn loop_statements(&self, func: FunctionId) -> Vec<LoopStatement> {
        self.meta.get(&func).map(|m| m.loop_statements.clone()).unwrap_or_default()
    }

    /// Mirrors the reference analyzer's `check_control_order`: true unless the source
    /// and sink provably can't execute in that order within `func`.
    fn check_control_order(&self, func: FunctionId, src_line: usize, sink_line: usize) -> bool {
        if src_line == sink_line {
            return true;
        }
        let Some(m) = self.meta.get(&func) else {
            return true;
        };
        for ifs in &m.if_statements {
            if let Some((else_start, else_end)) = ifs.else_branch {
                let (true_start, true_end) = ifs.true_branch;
                if true_start <= src_line && src_line <= true_end && else_start <= sink_line && sink_line <= else_end {
                    return false;
                }
            }
        }
        if src_line > sink_line {
            for loop_stmt in &m.loop_statements {
                let (body_start, body_end) = loop_stmt.body;
                if body_start <= src_line && src_line <= body_end && body_start <= sink_line && sink_line <= body_end {
                    return true;
                }
            }
            return false;
        }
        true
    }
}

impl CallGraphQuery for ProjectAnalyzer {
    fn callers(&self, callee: FunctionId) -> FxHashSet<FunctionId> {
        self.function_callers.get(&callee).cloned().unwrap_or_default()
    }

    fn callees(&self, caller: FunctionId) -> FxHashSet<FunctionId> {
        self.callsites(caller)
            .iter()
            .filter_map(|c| c.resolved_callee)
            .collect()
    }

    fn callee_apis(&self, caller: FunctionId) -> FxHashSet<Api> {
        self.api_callees.get(&caller).cloned().unwrap_or_default()
    }

    fn transitive_callers(&self, start: FunctionId, max_depth: usize) -> FxHashSet<FunctionId> {
        transitive_closure(start, max_depth, |id| self.callers(id))
    }

    fn transitive_callees(&self, start: FunctionId, max_depth: usize) -> FxHashSet<FunctionId> {
        transitive_closure(start, max_depth, |id| self.callees(id))
    }

    fn list_callsites_by_name(&self, func: FunctionId, name: &str) -> Vec<usize> {
        self.callsites_by_callee_name(func, name).iter().map(|c| c.line).collect()
    }

    fn list_arguments_at(&self, func: FunctionId, call_line: usize) -> Vec<Value> {
        let Some(site) = self.callsites(func).iter().find(|c| c.line == call_line) else {
            return Vec::new();
        };
        self.arguments_at(func, site)
    }
}

/// Breadth-first transitive closure with a visited set, so cyclic call graphs
/// terminate regardless of `max_depth`.
fn transitive_closure(
    start: FunctionId,
    max_depth: usize,
    neighbors: impl Fn(FunctionId) -> FxHashSet<FunctionId>,
) -> FxHashSet<FunctionId> {
    let mut visited: FxHashSet<FunctionId> = FxHashSet::default();
    let mut frontier: Vec<FunctionId> = vec![start];
    let mut depth = 0;
    while depth < max_depth && !frontier.is_empty() {
        let mut next = Vec::new();
        for id in frontier {
            for n in neighbors(id) {
                if visited.insert(n) {
                    next.push(n);
                }
            }
        }
        frontier = next;
        depth += 1;
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(files: &[(&str, &str)]) -> ProjectAnalyzer {
        let owned: Vec<(String, String)> = files.iter().map(|(p, s)| (p.to_string(), s.to_string())).collect();
        ProjectAnalyzer::build(&owned, Language::Cpp).unwrap()
    }

    #[test]
    fn builds_function_table_across_files() {
        let analyzer = build(&[
            ("a.c", "int foo() { return bar(1); }\n"),
            ("b.c", "int bar(int x) { return x; }\n"),
        ]);
        assert_eq!(analyzer.functions().count(), 2);
    }

    #[test]
    fn resolves_cross_file_call_edge() {
        let analyzer = build(&[
            ("a.c", "int foo() { return bar(1); }\n"),
            ("b.c", "int bar(int x) { return x; }\n"),
        ]);
        let foo = analyzer.functions().find(|f| f.name == "foo").unwrap().id;
        let bar = analyzer.functions().find(|f| f.name == "bar").unwrap().id;
        assert!(analyzer.callees(foo).contains(&bar));
        assert!(analyzer.callers(bar).contains(&foo));
    }

    #[test]
    fn unresolved_call_becomes_api_edge() {
        let analyzer = build(&[("a.c", "int foo() { return external_thing(1, 2); }\n")]);
        let foo = analyzer.functions().find(|f| f.name == "foo").unwrap().id;
        let apis = analyzer.callee_apis(foo);
        assert!(apis.iter().any(|a| a.name == "external_thing" && a.para_num == 2));
    }

    #[test]
    fn transitive_callees_terminate_on_cycles() {
        let analyzer = build(&[("a.c", "int a() { return b(); }\nint b() { return a(); }\n")]);
        let a = analyzer.functions().find(|f| f.name == "a").unwrap().id;
        let closure = analyzer.transitive_callees(a, 1000);
        assert!(closure.len() <= 2);
    }

    #[test]
    fn callee_resolution_requires_matching_arity() {
        let analyzer = build(&[(
            "a.c",
            "int bar(int x) { return x; }\nint bar(int x, int y) { return x + y; }\nint foo() { return bar(1, 2); }\n",
        )]);
        let foo = analyzer.functions().find(|f| f.name == "foo").unwrap().id;
        let two_arg_bar = analyzer
            .functions()
            .find(|f| f.name == "bar" && analyzer.parameters(f.id).len() == 2)
            .unwrap()
            .id;
        let one_arg_bar = analyzer
            .functions()
            .find(|f| f.name == "bar" && analyzer.parameters(f.id).len() == 1)
            .unwrap()
            .id;
        assert!(analyzer.callees(foo).contains(&two_arg_bar));
        assert!(!analyzer.callees(foo).contains(&one_arg_bar));
    }

    #[test]
    fn call_with_no_arity_matching_candidate_becomes_api_edge() {
        let analyzer = build(&[("a.c", "int bar(int x) { return x; }\nint foo() { return bar(1, 2, 3); }\n")]);
        let foo = analyzer.functions().find(|f| f.name == "foo").unwrap().id;
        assert!(analyzer.callees(foo).is_empty());
        let apis = analyzer.callee_apis(foo);
        assert!(apis.iter().any(|a| a.name == "bar" && a.para_num == 3));
    }

    #[test]
    fn extracts_macro_global() {
        let analyzer = build(&[("a.c", "#define LIMIT 10\nint foo() { return LIMIT; }\n")]);
        assert_eq!(analyzer.globals().get("LIMIT").map(|s| s.as_str()), Some("10"));
    }

    #[test]
    fn control_order_rejects_opposite_if_branches() {
        let analyzer = build(&[(
            "a.c",
            "int f(int x) {\n  if (x) {\n    src();\n  } else {\n    sink();\n  }\n  return 0;\n}\n",
        )]);
        let f = analyzer.functions().find(|f| f.name == "f").unwrap().id;
        assert!(!analyzer.check_control_order(f, 3, 5));
    }

    #[test]
    fn control_order_allows_a_source_after_sink_inside_a_loop() {
        let analyzer = build(&[(
            "a.c",
            "int f(int n) {\n  for (int i = 0; i < n; i++) {\n    sink();\n    src();\n  }\n  return 0;\n}\n",
        )]);
        let f = analyzer.functions().find(|f| f.name == "f").unwrap().id;
        assert!(analyzer.check_control_order(f, 4, 3));
    }

    #[test]
    fn list_callsites_by_name_and_arguments_round_trip() {
        let analyzer = build(&[("a.c", "int foo() { return bar(1, 2); }\n")]);
        let foo = analyzer.functions().find(|f| f.name == "foo").unwrap().id;
        let lines = analyzer.list_callsites_by_name(foo, "bar");
        assert_eq!(lines.len(), 1);
        let args = analyzer.list_arguments_at(foo, lines[0]);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn parameters_and_returns_are_indexed() {
        let analyzer = build(&[("a.c", "int add(int a, int b) { return a + b; }\n")]);
        let add = analyzer.functions().find(|f| f.name == "add").unwrap().id;
        let params = analyzer.parameters(add);
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].index, 1);
        let rets = analyzer.returns(add);
        assert_eq!(rets.len(), 1);
    }
}
