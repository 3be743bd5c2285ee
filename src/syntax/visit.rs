//! Pre-order traversal over [`SyntaxNode`]s in the style of `syn::visit`.
//!
//! Implementors override [`Visit::visit_node`] and call [`walk_node`] to
//! continue into the children, left to right.

use super::SyntaxNode;

pub trait Visit<'ast> {
    fn visit_node(&mut self, node: &'ast SyntaxNode) {
        walk_node(self, node);
    }
}

pub fn walk_node<'ast, V>(visitor: &mut V, node: &'ast SyntaxNode)
where
    V: Visit<'ast> + ?Sized,
{
    for child in &node.children {
        visitor.visit_node(child);
    }
}
