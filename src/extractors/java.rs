use crate::analyzer::util::{for_each_node_of_kinds_in_range, node_text, start_line_1based};
use crate::domain::{Function, Value, ValueLabel};
use crate::extractors::{BugExtractor, BugKind};
use tree_sitter::Node;

pub struct JavaNpdExtractor;

impl BugExtractor for JavaNpdExtractor {
    fn bug_kind(&self) -> BugKind {
        BugKind::Npd
    }

    fn extract_sources(&self, tree: &tree_sitter::Tree, _source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(tree.root_node(), &["null_literal"], func.start_byte, func.end_byte, &mut |node| {
            out.push(Value::new("null", start_line_1based(node), ValueLabel::Src, func.file.clone()));
        });
        out
    }

    fn extract_sinks(&self, tree: &tree_sitter::Tree, source: &str, func: &Function) -> Vec<Value> {
        let mut out = Vec::new();
        for_each_node_of_kinds_in_range(
            tree.root_node(),
            &["method_invocation", "field_access"],
            func.start_byte,
            func.end_byte,
            &mut |node: Node| {
                if let Some(object) = node.child_by_field_name("object") {
                    out.push(Value::new(
                        node_text(object, source).to_string(),
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
        parser.set_language(tree_sitter_java::language()).unwrap();
        parser.parse(src, None).unwrap()
    }

    fn whole_file_function(src: &str) -> Function {
        Function::new(0, "f", "A.java", 1, src.lines().count(), 0, src.len(), src.to_string())
    }

    #[test]
    fn finds_null_literal_source_and_invocation_sink() {
        let src = "class A { void f() { String s = null; s.length(); } }";
        let tree = parse(src);
        let func = whole_file_function(src);
        let extractor = JavaNpdExtractor;
        let sources = extractor.extract_sources(&tree, src, &func);
        let sinks = extractor.extract_sinks(&tree, src, &func);
        assert_eq!(sources.len(), 1);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name, "s");
    }
}
