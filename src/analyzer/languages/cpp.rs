use tree_sitter::Node;

use crate::analyzer::ports::{ExtractedCallSite, ExtractedFunction, IfStatement, LanguagePlugin, LoopStatement};
use crate::analyzer::util::{end_line_1based, for_each_node_of_kind, node_text, start_line_1based};
use crate::domain::Language;

pub struct CppPlugin;

impl LanguagePlugin for CppPlugin {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_cpp::language()
    }

    fn call_node_kind(&self) -> &'static str {
        "call_expression"
    }

    fn extract_functions(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<ExtractedFunction> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "function_definition", &mut |node| {
            let Some(name) = function_definition_name(node, source) else {
                return;
            };
            let parameters = node
                .child_by_field_name("declarator")
                .and_then(|d| find_parameter_list(d))
                .map(|params| extract_parameter_names(params, source))
                .unwrap_or_default();
            let mut returns = Vec::new();
            for_each_node_of_kind(node, "return_statement", &mut |ret| {
                let mut cursor = ret.walk();
                if let Some(expr) = ret.named_children(&mut cursor).next() {
                    returns.push((node_text(expr, source).to_string(), start_line_1based(expr)));
                }
            });
            out.push(ExtractedFunction {
                name,
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
        for_each_node_of_kind(tree.root_node(), "call_expression", &mut |node| {
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

    /// `#define` macros only; `preproc_function_def` is left to the call graph since
    /// it behaves like a function, not a value.
    fn extract_globals(&self, tree: &tree_sitter::Tree, source: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for_each_node_of_kind(tree.root_node(), "preproc_def", &mut |node| {
            let Some(name) = node.child_by_field_name("name") else {
                return;
            };
            let definition = node
                .child_by_field_name("value")
                .map(|v| node_text(v, source).to_string())
                .unwrap_or_default();
            out.push((node_text(name, source).to_string(), definition));
        });
        out
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
        for_each_node_of_kind(tree.root_node(), "for_statement", &mut |node| {
            push_loop_with_body(node, start_byte, end_byte, &mut out);
        });
        for_each_node_of_kind(tree.root_node(), "while_statement", &mut |node| {
            push_loop_with_body(node, start_byte, end_byte, &mut out);
        });
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

fn resolve_callee_name(call_node: Node, source: &str) -> Option<String> {
    let callee = call_node.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some(node_text(callee, source).to_string()),
        "field_expression" => {
            let field = callee.child_by_field_name("field")?;
            Some(node_text(field, source).to_string())
        }
        "qualified_identifier" => {
            let name = callee.child_by_field_name("name")?;
            Some(node_text(name, source).to_string())
        }
        _ => Some(node_text(callee, source).to_string()),
    }
}

fn find_parameter_list(node: Node) -> Option<Node> {
    if node.kind() == "parameter_list" {
        return Some(node);
    }
    if node.kind() == "function_declarator" {
        if let Some(params) = node.child_by_field_name("parameters") {
            return Some(params);
        }
    }
    node.child_by_field_name("declarator").and_then(find_parameter_list)
}

fn extract_parameter_names(params: Node, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        if let Some(decl) = param.child_by_field_name("declarator") {
            if let Some(name) = find_declarator_name(decl, source) {
                names.push(name);
                continue;
            }
        }
        names.push(node_text(param, source).to_string());
    }
    names
}

/// Finds the declarator's identifier, unwrapping pointer/reference/function declarators
/// the way `int *foo(...)` or `Ret &Class::method(...)` nests them.
fn function_definition_name(node: Node, source: &str) -> Option<String> {
    let declarator = node.child_by_field_name("declarator")?;
    find_declarator_name(declarator, source)
}

fn find_declarator_name(node: Node, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" => Some(node_text(node, source).to_string()),
        "qualified_identifier" => node
            .child_by_field_name("name")
            .and_then(|n| find_declarator_name(n, source)),
        "function_declarator" | "pointer_declarator" | "reference_declarator" | "destructor_name" => node
            .child_by_field_name("declarator")
            .and_then(|n| find_declarator_name(n, source)),
        _ => {
            let mut cursor = node.walk();
            node.children(&mut cursor).find_map(|c| find_declarator_name(c, source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(tree_sitter_cpp::language()).unwrap();
        parser.parse(src, None).unwrap()
    }

    #[test]
    fn extracts_function_name_params_and_returns() {
        let src = "int add(int a, int b) {\n  return a + b;\n}\n";
        let tree = parse(src);
        let plugin = CppPlugin;
        let funcs = plugin.extract_functions(&tree, src);
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "add");
        assert_eq!(funcs[0].parameters, vec!["a", "b"]);
        assert_eq!(funcs[0].returns.len(), 1);
    }

    #[test]
    fn resolves_direct_call_name_and_args() {
        let src = "int main() {\n  foo(1, 2);\n  return 0;\n}\n";
        let tree = parse(src);
        let plugin = CppPlugin;
        let sites = plugin.extract_call_sites(&tree, src, 0, src.len());
        let foo = sites.iter().find(|c| c.callee_name == "foo").unwrap();
        assert_eq!(foo.argument_texts.len(), 2);
    }

    #[test]
    fn extracts_macro_definition_as_global() {
        let src = "#define MAX_LEN 128\n";
        let tree = parse(src);
        let plugin = CppPlugin;
        let globals = plugin.extract_globals(&tree, src);
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].0, "MAX_LEN");
        assert_eq!(globals[0].1, "128");
    }

    #[test]
    fn finds_if_statement_with_else_branch() {
        let src = "int f(int x) {\n  if (x) {\n    return 1;\n  } else {\n    return 0;\n  }\n}\n";
        let tree = parse(src);
        let plugin = CppPlugin;
        let ifs = plugin.list_if_statements(&tree, src, 0, src.len());
        assert_eq!(ifs.len(), 1);
        assert!(ifs[0].else_branch.is_some());
    }

    #[test]
    fn finds_for_loop_body_range() {
        let src = "void f() {\n  for (int i = 0; i < 10; i++) {\n    g(i);\n  }\n}\n";
        let tree = parse(src);
        let plugin = CppPlugin;
        let loops = plugin.list_loop_statements(&tree, src, 0, src.len());
        assert_eq!(loops.len(), 1);
        assert!(loops[0].body.0 <= loops[0].body.1);
    }
}
