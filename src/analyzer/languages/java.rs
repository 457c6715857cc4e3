use tree_sitter::Node;

use crate::analyzer::ports::{ExtractedCallSite, ExtractedFunction, IfStatement, LanguagePlugin, LoopStatement};
use crate::analyzer::util::{end_line_1based, for_each_node_of_kind, node_text, start_line_1based};
use crate::domain::Language;

pub struct JavaPlugin;

impl LanguagePlugin for JavaPlugin {
    fn language(&self) -> Language {
        Language::Java
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_java::language()
    }

    fn call_node_kind(&self) -> &'static str {
        "method_invocation"
    }

    fn extract_functions(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<ExtractedFunction> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "method_declaration", &mut |node| {
            extract_one(node, source, &mut out);
        });
        for_each_node_of_kind(tree.root_node(), "constructor_declaration", &mut |node| {
            extract_one(node, source, &mut out);
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
        for_each_node_of_kind(tree.root_node(), "method_invocation", &mut |node| {
            if node.start_byte() < start_byte || node.end_byte() > end_byte {
                return;
            }
            let Some(name) = node.child_by_field_name("name") else {
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
                callee_name: node_text(name, source).to_string(),
                line: start_line_1based(node),
                argument_texts,
            });
        });
        out
    }

    fn resolve_callee_name(&self, call_node: Node, source: &str) -> Option<String> {
        let name = call_node.child_by_field_name("name")?;
        Some(node_text(name, source).to_string())
    }

    /// Not populated: Java has no file-level macro layer, matching the reference
    /// analyzer's stance for this language.
    fn extract_globals(&self, _tree: &tree_sitter::Tree, _source: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    fn list_if_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<IfStatement> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "if_statement", &mut |node| {
            if node.start_byte() < start_byte || node.end_byte() > end_byte {
                return;
            }
            let Some(consequence) = node.child_by_field_name("consequence") else {
                return;
            };
            let else_branch = node
                .child_by_field_name("alternative")
                .map(|alt| (start_line_1based(alt), end_line_1based(alt)));
            out.push(IfStatement {
                start_line: start_line_1based(node),
                end_line: end_line_1based(node),
                true_branch: (start_line_1based(consequence), end_line_1based(consequence)),
                else_branch,
            });
        });
        let _ = source;
        out
    }

    fn list_loop_statements(&self, tree: &tree_sitter::Tree, source: &str, start_byte: usize, end_byte: usize) -> Vec<LoopStatement> {
        let mut out = Vec::new();
        for kind in ["for_statement", "while_statement", "enhanced_for_statement"] {
            for_each_node_of_kind(tree.root_node(), kind, &mut |node| {
                push_loop_with_body(node, start_byte, end_byte, &mut out);
            });
        }
        let _ = source;
        out
    }
}

fn push_loop_with_body(node: Node, start_byte: usize, end_byte: usize, out: &mut Vec<LoopStatement>) {
    if node.start_byte() < start_byte || node.end_byte() > end_byte {
        return;
    }
    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    out.push(LoopStatement {
        start_line: start_line_1based(node),
        end_line: end_line_1based(node),
        body: (start_line_1based(body), end_line_1based(body)),
    });
}

fn extract_one(node: Node, source: &str, out: &mut Vec<ExtractedFunction>) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter_map(|p| p.child_by_field_name("name"))
                .map(|n| node_text(n, source).to_string())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(tree_sitter_java::language()).unwrap();
        parser.parse(src, None).unwrap()
    }

    #[test]
    fn extracts_method_name_and_params() {
        let src = "class A { void foo(int x, int y) { bar(x); } }";
        let tree = parse(src);
        let plugin = JavaPlugin;
        let funcs = plugin.extract_functions(&tree, src);
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "foo");
        assert_eq!(funcs[0].parameters, vec!["x", "y"]);
    }

    #[test]
    fn resolves_method_invocation_name_and_arity() {
        let src = "class A { void foo() { bar(1, 2, 3); } }";
        let tree = parse(src);
        let plugin = JavaPlugin;
        let sites = plugin.extract_call_sites(&tree, src, 0, src.len());
        let bar = sites.iter().find(|c| c.callee_name == "bar").unwrap();
        assert_eq!(bar.argument_texts.len(), 3);
    }

    #[test]
    fn finds_if_statement_with_else_branch() {
        let src = "class A { void f(int x) { if (x > 0) { foo(); } else { bar(); } } }";
        let tree = parse(src);
        let plugin = JavaPlugin;
        let ifs = plugin.list_if_statements(&tree, src, 0, src.len());
        assert_eq!(ifs.len(), 1);
        assert!(ifs[0].else_branch.is_some());
    }

    #[test]
    fn finds_while_loop_body() {
        let src = "class A { void f(int x) { while (x > 0) { x--; } } }";
        let tree = parse(src);
        let plugin = JavaPlugin;
        let loops = plugin.list_loop_statements(&tree, src, 0, src.len());
        assert_eq!(loops.len(), 1);
    }

    #[test]
    fn no_macro_layer_means_no_globals() {
        let src = "class A { int X = 1; }";
        let tree = parse(src);
        let plugin = JavaPlugin;
        assert!(plugin.extract_globals(&tree, src).is_empty());
    }
}
