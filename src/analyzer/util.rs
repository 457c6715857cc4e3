use tree_sitter::Node;

pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// tree-sitter points are 0-based; the rest of the crate works in 1-based lines.
pub fn start_line_1based(node: Node) -> usize {
    node.start_position().row + 1
}

pub fn end_line_1based(node: Node) -> usize {
    node.end_position().row + 1
}

/// Depth-first walk, invoking `visit` on every descendant (node itself included) whose
/// kind equals `kind`.
pub fn for_each_node_of_kind<'a>(node: Node<'a>, kind: &str, visit: &mut dyn FnMut(Node<'a>)) {
    if node.kind() == kind {
        visit(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        for_each_node_of_kind(child, kind, visit);
    }
}

pub fn for_each_node_of_kinds<'a>(node: Node<'a>, kinds: &[&str], visit: &mut dyn FnMut(Node<'a>)) {
    if kinds.contains(&node.kind()) {
        visit(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        for_each_node_of_kinds(child, kinds, visit);
    }
}

/// Like [`for_each_node_of_kinds`] but restricted to nodes fully contained in
/// `[start_byte, end_byte)` — the scoping every per-function extractor needs so it
/// never reports a match that belongs to a sibling function.
pub fn for_each_node_of_kinds_in_range<'a>(
    node: Node<'a>,
    kinds: &[&str],
    start_byte: usize,
    end_byte: usize,
    visit: &mut dyn FnMut(Node<'a>),
) {
    if node.start_byte() >= end_byte || node.end_byte() <= start_byte {
        return;
    }
    if node.start_byte() >= start_byte && node.end_byte() <= end_byte && kinds.contains(&node.kind()) {
        visit(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        for_each_node_of_kinds_in_range(child, kinds, start_byte, end_byte, visit);
    }
}
