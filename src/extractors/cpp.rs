use tree_sitter::Node;

use crate::analyzer::util::{for_each_node_of_kinds_in_range, node_text, start_line_1based};
use crate::domain::{Function, Value, ValueLabel};
use crate::extractors::{BugExtractor, BugKind};

const ALLOC_NAMES: &[&str] = &[
    "malloc", "calloc", "realloc", "strdup", "strndup", "asprintf", "vasprintf", "getline",
];

fn callee_name(call: Node, source: &str) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    Some(node_text(function, source).to_string())
}

fn first_argument_text<'a>(call: Node, source: &'a str) -> Option<&'a str> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    args.named_children(&mut cursor).next().map(|n| node_text(n, source))
}

/// `a <- NULL` style assignment targets, covering `init_declarator` and
/// `assignment_expression`, plus `return NULL;`.
fn null_assignment_targets(node: Node, source: &str) -> Option<(String, usize)> {
    match node.kind() {
        "init_declarator" => {
            let value = node.child_by_field_name("value")?;
            if node_text(value, source).trim() == "NULL" {
                let decl = node.child_by_field_name("declarator")?;
                return Some((node_text(decl, source).to_string(), start_line_1based(node)));
            }
            None
        }
        "assignment_expression" => {
            let right = node.child_by_field_name("right")?;
            if node_text(right, source).trim() == "NULL" {
                let left = node.child_by_field_name("left")?;
                return Some((node_text(left, source).to_string(), start_line_1based(node)));
            }
            None
        }
        "return_statement" => {
            let mut cursor = node.walk();
            let expr = node.named_children(&mut cursor).next()?;
            if node_text(expr, source).trim() == "NULL" {
                return Some(("NULL".to_string(), start_line_1based(node)));
            }
            None
        }
        _ => None,
    }
}

fn dereference_sink(node: Node, source: &str) -> Option<(String, usize)> {
    match node.kind() {
        "pointer_expression" => {
            let mut cursor = node.walk();
            let mut children = node.children(&mut cursor);
            let op = children.next()?;
            if node_text(op, source) != "*" {
                return None;
            }
            let operand = children.next()?;
            Some((node_text(operand, source).to_string(), start_line_1based(node)))
        }
        "field_expression" => {
            let base = node.child_by_field_name("argument")?;
            Some((node_text(base, source).to_string(), start_line_1based(node)))
        }
        "subscript_expression" => {
            let base = node.child_by_field_name("argument")?;
            Some((node_text(base, source).to_string(), start_line_1based(node)))
        }
        _ => None,
    }
}

pub struct CppNpdExtractor;

impl BugExtractor for CppNpdExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Npd
    }

    fn extract_sources(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let root = find_function_node(_tree, func);
        let mut out = Vec::new();
        let Some(root) = root else { return out };
        for_each_node_of_kinds_in_range(
            root,
            &["init_declarator", "assignment_expression", "return_statement", "call_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node| {
                if node.kind() == "call_expression" {
                    if let Some(name) = callee_name(node, source) {
                        if name == "malloc" {
                            out.push(Value::new(node_text(node, source), start_line_1based(node), ValueLabel::Src, func.file.clone()));
                        }
                    }
                    return;
                }
                if let Some((name, line)) = null_assignment_targets(node, source) {
                    out.push(Value::new(name, line, ValueLabel::Src, func.file.clone()));
                }
            },
        );
        out
    }

    fn extract_sinks(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let root = find_function_node(_tree, func);
        let mut out = Vec::new();
        let Some(root) = root else { return out };
        for_each_node_of_kinds_in_range(
            root,
            &["pointer_expression", "field_expression", "subscript_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node| {
                if let Some((name, line)) = dereference_sink(node, source) {
                    out.push(Value::new(name, line, ValueLabel::Sink, func.file.clone()));
                }
            },
        );
        out
    }
}

pub struct CppMlkExtractor;

impl BugExtractor for CppMlkExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Mlk
    }

    fn extract_sources(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let Some(root) = find_function_node(_tree, func) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            root,
            &["call_expression", "new_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node| {
                if node.kind() == "new_expression" {
                    out.push(Value::new(node_text(node, source), start_line_1based(node), ValueLabel::Src, func.file.clone()));
                    return;
                }
                if let Some(name) = callee_name(node, source) {
                    if ALLOC_NAMES.contains(&name.as_str()) {
                        out.push(Value::new(node_text(node, source), start_line_1based(node), ValueLabel::Src, func.file.clone()));
                    }
                }
            },
        );
        out
    }

    fn extract_sinks(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let Some(root) = find_function_node(_tree, func) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(root, &["call_expression"], func.start_byte, func.end_byte, &mut |node| {
            if callee_name(node, source).as_deref() == Some("free") {
                if let Some(arg) = first_argument_text(node, source) {
                    out.push(Value::new(arg, start_line_1based(node), ValueLabel::Sink, func.file.clone()));
                }
            }
        });
        out
    }
}

pub struct CppUafExtractor;

impl BugExtractor for CppUafExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Uaf
    }

    fn extract_sources(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let Some(root) = find_function_node(_tree, func) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            root,
            &["call_expression", "delete_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node| {
                if node.kind() == "delete_expression" {
                    let mut cursor = node.walk();
                    if let Some(operand) = node.named_children(&mut cursor).next() {
                        out.push(Value::new(node_text(operand, source), start_line_1based(node), ValueLabel::Src, func.file.clone()));
                    }
                    return;
                }
                if callee_name(node, source).as_deref() == Some("free") {
                    if let Some(arg) = first_argument_text(node, source) {
                        out.push(Value::new(arg, start_line_1based(node), ValueLabel::Src, func.file.clone()));
                    }
                }
            },
        );
        out
    }

    fn extract_sinks(&self, _tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let Some(root) = find_function_node(_tree, func) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            root,
            &["pointer_expression", "field_expression", "subscript_expression", "delete_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node| {
                if node.kind() == "delete_expression" {
                    let mut cursor = node.walk();
                    if let Some(operand) = node.named_children(&mut cursor).next() {
                        out.push(Value::new(node_text(operand, source), start_line_1based(node), ValueLabel::Sink, func.file.clone()));
                    }
                    return;
                }
                if let Some((name, line)) = dereference_sink(node, source) {
                    out.push(Value::new(name, line, ValueLabel::Sink, func.file.clone()));
                }
            },
        );
        out
    }
}

/// Re-locates a function's own node within its file's tree by byte range. Mirrors the
/// tree-sitter adapter's "find by matching range" approach to node re-acquisition.
fn find_function_node<'a>(tree: &'a tree_sitter::Tree, func: &Function) -> Option<Node<'a>> {
    fn search<'a>(node: Node<'a>, start: usize, end: usize) -> Option<Node<'a>> {
        if node.start_byte() == start && node.end_byte() == end {
            return Some(node);
        }
        if node.start_byte() > start || node.end_byte() < end {
            return None;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(found) = search(child, start, end) {
                return Some(found);
            }
        }
        None
    }
    search(tree.root_node(), func.start_byte, func.end_byte)
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

    fn whole_file_function(src: &str) -> Function {
        Function::new(0, "f", "a.c", 1, src.lines().count(), 0, src.len(), src.to_string())
    }

    #[test]
    fn npd_finds_null_init_and_dereference() {
        let src = "void f() {\n  int *p = NULL;\n  *p = 1;\n}\n";
        let tree = parse(src);
        let func = whole_file_function(src);
        let extractor = CppNpdExtractor;
        let sources = extractor.extract_sources(&tree, src, &func);
        let sinks = extractor.extract_sinks(&tree, src, &func);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "p");
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name, "p");
    }

    #[test]
    fn mlk_finds_malloc_source_and_free_sink() {
        let src = "void f() {\n  char *p = malloc(10);\n  free(p);\n}\n";
        let tree = parse(src);
        let func = whole_file_function(src);
        let extractor = CppMlkExtractor;
        let sources = extractor.extract_sources(&tree, src, &func);
        let sinks = extractor.extract_sinks(&tree, src, &func);
        assert_eq!(sources.len(), 1);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name, "p");
    }

    #[test]
    fn uaf_finds_free_source_and_dereference_sink() {
        let src = "void f() {\n  free(p);\n  *p = 1;\n}\n";
        let tree = parse(src);
        let func = whole_file_function(src);
        let extractor = CppUafExtractor;
        let sources = extractor.extract_sources(&tree, src, &func);
        let sinks = extractor.extract_sinks(&tree, src, &func);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "p");
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name, "p");
    }
}
