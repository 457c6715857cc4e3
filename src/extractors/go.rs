use tree_sitter::Node;

use crate::analyzer::util::{for_each_node_of_kinds_in_range, node_text, start_line_1based};
use crate::domain::{Function, Value, ValueLabel};
use crate::extractors::{BugExtractor, BugKind};

pub struct GoNpdExtractor;

impl BugExtractor for GoNpdExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Npd
    }

    fn extract_sources(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            tree.root_node(),
            &["var_declaration", "nil"],
            func.start_byte,
            func.end_byte,
            &mut |node: Node| {
                if node.kind() == "nil" {
                    out.push(Value::new("nil", start_line_1based(node), ValueLabel::Src, func.file.clone()));
                    return;
                }
                // var_declaration without an explicit initializer leaves pointer/interface
                // vars holding the zero value, which for those kinds is nil.
                let mut cursor = node.walk();
                for spec in node.named_children(&mut cursor) {
                    if spec.kind() != "var_spec" {
                        continue;
                    }
                    if spec.child_by_field_name("value").is_some() {
                        continue;
                    }
                    let mut spec_cursor = spec.walk();
                    for child in spec.named_children(&mut spec_cursor) {
                        if child.kind() == "identifier" {
                            out.push(Value::new(
                                node_text(child, source).to_string(),
                                start_line_1based(spec),
                                ValueLabel::Src,
                                func.file.clone(),
                            ));
                        }
                    }
                }
            },
        );
        out
    }

    fn extract_sinks(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            tree.root_node(),
            &["selector_expression", "index_expression", "slice_expression", "unary_expression"],
            func.start_byte,
            func.end_byte,
            &mut |node: Node| {
                if node.kind() == "unary_expression" {
                    let mut cursor = node.walk();
                    let mut children = node.children(&mut cursor);
                    let Some(op) = children.next() else { return };
                    if node_text(op, source) != "*" {
                        return;
                    }
                    if let Some(operand) = children.next() {
                        out.push(Value::new(
                            node_text(operand, source).to_string(),
                            start_line_1based(node),
                            ValueLabel::Sink,
                            func.file.clone(),
                        ));
                    }
                    return;
                }
                let mut cursor = node.walk();
                if let Some(base) = node.named_children(&mut cursor).next() {
                    out.push(Value::new(
                        node_text(base, source).to_string(),
                        start_line_1based(node),
                        ValueLabel::Sink,
                        func.file.clone(),
                    ));
                }
            },
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(tree_sitter_go::language()).unwrap();
        parser.parse(src, None).unwrap()
    }

    fn whole_file_function(src: &str) -> Function {
        Function::new(0, "f", "a.go", 1, src.lines().count(), 0, src.len(), src.to_string())
    }

    #[test]
    fn finds_uninitialized_var_and_selector_sink() {
        let src = "package main\nfunc f() {\n  var p *int\n  _ = p.String\n}\n";
        let tree = parse(src);
        let func = whole_file_function(src);
        let extractor = GoNpdExtractor;
        let sources = extractor.extract_sources(&tree, src, &func);
        let sinks = extractor.extract_sinks(&tree, src, &func);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "p");
        assert!(sinks.iter().any(|v| v.name == "p"));
    }
}
