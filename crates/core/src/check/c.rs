//! tree-sitter walk over C translation units.

use tree_sitter::{Node, Parser, Tree};

/// A call statement found directly in a function body (0-based position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawCall {
    pub callee: String,
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawFunction {
    pub name: String,
    pub row: usize,
    pub calls: Vec<RawCall>,
}

pub(crate) fn parse(source: &str) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c::LANGUAGE.into())
        .map_err(|e| format!("failed to load C grammar: {e}"))?;
    let tree = parser.parse(source, None).ok_or_else(|| "parser produced no tree".to_string())?;
    if tree.root_node().has_error() {
        return Err(first_error(tree.root_node())
            .map(|n| {
                let p = n.start_position();
                format!("syntax error at line {}, column {}", p.row + 1, p.column + 1)
            })
            .unwrap_or_else(|| "syntax error".to_string()));
    }
    Ok(tree)
}

/// Every function definition outside function bodies, in source order.
pub(crate) fn functions(tree: &Tree, source: &str) -> Vec<RawFunction> {
    let mut out = Vec::new();
    collect_definitions(tree.root_node(), source, &mut out);
    out
}

fn collect_definitions(node: Node<'_>, source: &str, out: &mut Vec<RawFunction>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(f) = function_record(child, source) {
                    out.push(f);
                }
            }
            // Definitions can sit inside #if/#ifdef blocks or extern "C" { }.
            kind if kind.starts_with("preproc_")
                || kind == "linkage_specification"
                || kind == "declaration_list" =>
            {
                collect_definitions(child, source, out)
            }
            _ => {}
        }
    }
}

fn function_record(def: Node<'_>, source: &str) -> Option<RawFunction> {
    let name = declarator_name(def.child_by_field_name("declarator")?, source)?;
    let body = def.child_by_field_name("body")?;

    let mut calls = Vec::new();
    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(expr) = stmt.named_child(0) else { continue };
        if expr.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = expr.child_by_field_name("function") else { continue };
        let pos = expr.start_position();
        calls.push(RawCall { callee: text(callee, source).to_string(), row: pos.row, column: pos.column });
    }

    Some(RawFunction { name, row: def.start_position().row, calls })
}

/// Peel pointer/parenthesized/function declarators down to the identifier.
fn declarator_name(mut node: Node<'_>, source: &str) -> Option<String> {
    loop {
        match node.kind() {
            "identifier" | "field_identifier" => return Some(text(node, source).to_string()),
            "parenthesized_declarator" => node = node.named_child(0)?,
            _ => node = node.child_by_field_name("declarator")?,
        }
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error() || c.is_missing()).find_map(first_error)
}

fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}
