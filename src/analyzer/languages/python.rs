use tree_sitter::Node;

use crate::analyzer::ports::{ExtractedCallSite, ExtractedFunction, IfStatement, LanguagePlugin, LoopStatement};
use crate::analyzer::util::{end_line_1based, for_each_node_of_kind, node_text, start_line_1based};
use crate::domain::Language;

pub struct PythonPlugin;

impl LanguagePlugin for PythonPlugin {
    fn language(&self) -> Language {
        Language::Python
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_python::language()
    }

    fn call_node_kind(&self) -> &'static str {
        "call"
    }

    fn extract_functions(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<ExtractedFunction> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "function_definition", &mut |node| {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let parameters = node
                .child_by_field_name("parameters")
                .map(|params| {
                    let mut cursor = params.walk();
                    params
                        .named_children(&mut cursor)
                        .filter_map(|p| match p.kind() {
                            "identifier" => Some(node_text(p, source).to_string()),
                            "default_parameter" | "typed_parameter" | "typed_default_parameter" => p
                                .child_by_field_name("name")
                                .map(|n| node_text(n, source).to_string()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let mut returns = Vec::new();
            for_each_node_of_kind(node, "return_statement", &mut |ret| {
                let mut cursor = ret.walk();
                if let Some(expr) = ret.named_children(&mut cursor).next() {
                    returns.push((node_text(expr, source).to_string(), start_line_1based(expr)));
                }
            });
            out.push(ExtractedFunction {
                name: node_text(name_node, source).to_string(),
                start_line: start_line_1based(node),
                end_line: end_line_1based(node),
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                parameters,
                returns,
            });
        });
        out
    }

    fn extract_call_sites(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        start_byte: usize,
        end_byte: usize,
    ) -> Vec<ExtractedCallSite> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "call", &mut |node| {
            if node.start_byte() < start_byte || node.end_byte() > end_byte {
                return;
            }
            let Some(callee_name) = resolve_callee_name(node, source) else {
                return;
            };
            let argument_texts = node
                .child_by_field_name("arguments")
                .map(|args| {
                    let mut cursor = args.walk();
                    args.named_children(&mut cursor)
                        .map(|a| node_text(a, source).to_string())
                        .collect()
                })
                .unwrap_or_default();
            out.push(ExtractedCallSite {
                callee_name,
                line: start_line_1based(node),
                argument_texts,
            });
        });
        out
    }

    fn resolve_callee_name(&self, call_node: Node, source: &str) -> Option<String> {
        resolve_callee_name(call_node, source)
    }

    /// Not populated: indentation-based scoping gives Python no static macro layer.
    fn extract_globals(&self, _tree: &tree_sitter::Tree, _source: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Deliberately coarse: the whole `if` statement's line range stands in for the
    /// true branch, with no else detection. Good enough to rule out a source/sink pair
    /// that's provably on opposite sides of a branch only when that branch is precise
    /// elsewhere; for Python this capability stays approximate rather than wrong.
    fn list_if_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<IfStatement> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "if_statement", &mut |node| {
            if node.start_byte() < start_byte || node.end_byte() > end_byte {
                return;
            }
            let start = start_line_1based(node);
            let end = end_line_1based(node);
            out.push(IfStatement {
                start_line: start,
                end_line: end,
                true_branch: (start, end),
                else_branch: None,
            });
        });
        let _ = source;
        out
    }

    /// Coarse in the same way as `list_if_statements`: body range is the whole loop.
    fn list_loop_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<LoopStatement> {
        let mut out = Vec::new();
        for kind in ["for_statement", "while_statement"] {
            for_each_node_of_kind(tree.root_node(), kind, &mut |node| {
                if node.start_byte() < start_byte || node.end_byte() > end_byte {
                    return;
                }
                let start = start_line_1based(node);
                let end = end_line_1based(node);
                out.push(LoopStatement {
                    start_line: start,
                    end_line: end,
                    body: (start, end),
                });
            });
        }
        let _ = source;
        out
    }
}

fn resolve_callee_name(call_node: Node, source: &str) -> Option<String> {
    let function = call_node.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some(node_text(function, source).to_string()),
        "attribute" => {
            let attr = function.child_by_field_name("attribute")?;
            Some(node_text(attr, source).to_string())
        }
        _ => Some(node_text(function, source).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(tree_sitter_python::language()).unwrap();
        parser.parse(src, None).unwrap()
    }

    #[test]
    fn extracts_function_def_name_and_params() {
        let src = "def foo(x, y):\n    return bar(x)\n";
        let tree = parse(src);
        let plugin = PythonPlugin;
        let funcs = plugin.extract_functions(&tree, src);
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "foo");
        assert_eq!(funcs[0].parameters, vec!["x", "y"]);
        assert_eq!(funcs[0].returns.len(), 1);
    }

    #[test]
    fn resolves_attribute_call_to_method_name() {
        let src = "def foo(obj):\n    obj.bar(1, 2)\n";
        let tree = parse(src);
        let plugin = PythonPlugin;
        let sites = plugin.extract_call_sites(&tree, src, 0, src.len());
        let bar = sites.iter().find(|c| c.callee_name == "bar").unwrap();
        assert_eq!(bar.argument_texts.len(), 2);
    }

    #[test]
    fn finds_if_statement_with_no_else_detection() {
        let src = "def f(x):\n    if x:\n        return 1\n    else:\n        return 0\n";
        let tree = parse(src);
        let plugin = PythonPlugin;
        let ifs = plugin.list_if_statements(&tree, src, 0, src.len());
        assert_eq!(ifs.len(), 1);
        assert!(ifs[0].else_branch.is_none());
    }

    #[test]
    fn finds_for_loop_as_coarse_body_range() {
        let src = "def f(xs):\n    for x in xs:\n        print(x)\n";
        let tree = parse(src);
        let plugin = PythonPlugin;
        let loops = plugin.list_loop_statements(&tree, src, 0, src.len());
        assert_eq!(loops.len(), 1);
    }
}
