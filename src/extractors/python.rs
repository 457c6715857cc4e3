use tree_sitter::Node;

use crate::analyzer::util::{for_each_node_of_kinds_in_range, node_text, start_line_1based};
use crate::domain::{Function, Value, ValueLabel};
use crate::extractors::{BugExtractor, BugKind};

pub struct PythonNpdExtractor;

impl BugExtractor for PythonNpdExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Npd
    }

    fn extract_sources(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(tree.root_node(), &["none"], func.start_byte, func.end_byte, &mut |node: Node| {
            out.push(Value::new(node_text(node, source).to_string(), start_line_1based(node), ValueLabel::Src, func.file.clone()));
        });
        out
    }

    fn extract_sinks(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            tree.root_node(),
            &["attribute", "subscript"],
            func.start_byte,
            func.end_byte,
            &mut |node: Node| {
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
