//! Finds checkpoints and decisions in one syntax tree.
//!
//! A single left-to-right, depth-first, pre-order walk. Markers are only
//! produced in executable context, that is inside the body of a (non
//! `constexpr`) function or lambda. Control statements contribute their
//! conditions as decisions and never a checkpoint of their own; the simple
//! statements of their bodies get checkpoints, braced when the body is not a
//! compound statement.

use super::condition_decomposer::decompose;
use crate::cid::CidManager;
use crate::config::DecisionPolicy;
use crate::errors::{InstrumentError, Result};
use crate::syntax::{
    walk_node, ControlKind, ExpressionKind, NodeKind, Role, StatementKind, SyntaxNode, Visit,
};
use tracing::trace;

/// Where a statement sits relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Placement {
    /// Item of a compound statement.
    BlockItem,
    /// Direct body of a control statement.
    Body,
    /// Anywhere else (for-initializers, expression operands, ...).
    #[default]
    Nested,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FinderStats {
    pub checkpoints: usize,
    pub decisions: usize,
}

pub struct DecisionFinder<'l> {
    ledger: &'l mut CidManager,
    policy: DecisionPolicy,
    executable: bool,
    placement: Placement,
    stats: FinderStats,
    error: Option<InstrumentError>,
}

impl<'l> DecisionFinder<'l> {
    pub fn new(ledger: &'l mut CidManager, policy: DecisionPolicy) -> Self {
        Self {
            ledger,
            policy,
            executable: false,
            placement: Placement::Nested,
            stats: FinderStats::default(),
            error: None,
        }
    }

    /// Walk `root` and register every marker it contains.
    pub fn run(mut self, root: &SyntaxNode) -> Result<FinderStats> {
        self.visit_node(root);
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.stats),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.error.get_or_insert(error);
                None
            }
        }
    }

    fn visit_child(&mut self, child: &SyntaxNode, placement: Placement) {
        self.placement = placement;
        self.visit_node(child);
    }

    fn visit_children(&mut self, node: &SyntaxNode, placement: Placement) {
        for child in &node.children {
            self.visit_child(child, placement);
        }
    }

    /// Member initializers and the body run; the signature does not.
    fn visit_function(&mut self, node: &SyntaxNode, constant: bool) {
        if constant {
            return;
        }
        let outer = std::mem::replace(&mut self.executable, true);
        for child in &node.children {
            if matches!(child.role, Role::Initializer | Role::Body) {
                self.visit_child(child, Placement::Nested);
            }
        }
        self.executable = outer;
    }

    fn visit_statement(&mut self, node: &SyntaxNode, kind: StatementKind, placement: Placement) {
        let checkpointed = match kind {
            StatementKind::Empty => return,
            StatementKind::Declaration {
                persistent: true, ..
            } => return,
            StatementKind::Declaration { initialized, .. } => initialized,
            StatementKind::Expression
            | StatementKind::Return
            | StatementKind::Jump
            | StatementKind::Throw => true,
        };

        if checkpointed {
            let result = match placement {
                Placement::BlockItem => Some(self.ledger.add_checkpoint(node.section.start)),
                Placement::Body => Some(self.ledger.add_scoped_checkpoint(node.section)),
                Placement::Nested => None,
            };
            if let Some(result) = result {
                if let Some(id) = self.record(result) {
                    trace!(%id, section = %node.section, "checkpoint");
                    self.stats.checkpoints += 1;
                }
            }
        }
        self.visit_children(node, Placement::Nested);
    }

    fn visit_control(&mut self, node: &SyntaxNode, kind: ControlKind) {
        for child in &node.children {
            match child.role {
                Role::Condition if kind.has_boolean_condition() => {
                    if child.kind != NodeKind::ConstantContext {
                        self.visit_decision(child);
                    }
                }
                Role::Body | Role::Consequence | Role::Alternative => {
                    self.visit_child(child, Placement::Body)
                }
                _ => self.visit_child(child, Placement::Nested),
            }
        }
    }

    fn visit_expression(&mut self, node: &SyntaxNode, kind: ExpressionKind) {
        match kind {
            ExpressionKind::And | ExpressionKind::Or | ExpressionKind::Not => {
                self.visit_decision(node)
            }
            ExpressionKind::Conditional { elvis } => {
                for child in &node.children {
                    if child.role == Role::Condition && !elvis {
                        self.visit_decision(child);
                    } else {
                        self.visit_child(child, Placement::Nested);
                    }
                }
            }
            ExpressionKind::Parenthesized | ExpressionKind::Other => {
                self.visit_children(node, Placement::Nested)
            }
        }
    }

    /// Decompose the decision at `node`, then continue inside its leaves only.
    fn visit_decision(&mut self, node: &SyntaxNode) {
        let decomposition = decompose(node, self.ledger, self.policy);
        let Some(decomposition) = self.record(decomposition) else {
            return;
        };
        trace!(
            decision = %decomposition.record.decision,
            conditions = decomposition.leaves.len(),
            "decision"
        );
        self.stats.decisions += 1;
        for leaf in decomposition.leaves {
            self.visit_child(leaf, Placement::Nested);
        }
    }
}

impl<'ast> Visit<'ast> for DecisionFinder<'_> {
    fn visit_node(&mut self, node: &'ast SyntaxNode) {
        if self.error.is_some() {
            return;
        }
        let placement = std::mem::take(&mut self.placement);

        match node.kind {
            NodeKind::ConstantContext => {}
            NodeKind::Function { constant } => self.visit_function(node, constant),
            _ if !self.executable => walk_node(self, node),
            NodeKind::Compound => self.visit_children(node, Placement::BlockItem),
            // Labels, `case` and `else` are transparent for placement.
            NodeKind::Container => self.visit_children(node, placement),
            NodeKind::Statement(kind) => self.visit_statement(node, kind, placement),
            NodeKind::Control(kind) => self.visit_control(node, kind),
            NodeKind::Expression(kind) => self.visit_expression(node, kind),
            NodeKind::Unit | NodeKind::Other => self.visit_children(node, Placement::Nested),
        }
    }
}

/// Register all markers of `root` in `ledger`.
pub fn find_markers(
    root: &SyntaxNode,
    ledger: &mut CidManager,
    policy: DecisionPolicy,
) -> Result<FinderStats> {
    DecisionFinder::new(ledger, policy).run(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::{CidDocument, ConditionNode};
    use crate::core::{CodePosition, CodeSection, EvaluationType, MarkerId};
    use crate::syntax::{SyntaxProvider, TreeSitterProvider};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn find(source: &str, path: &str, policy: DecisionPolicy) -> CidDocument {
        let tree = TreeSitterProvider::new()
            .parse(Path::new(path), source, &[])
            .expect("parses");
        let mut ledger = CidManager::new(source.as_bytes());
        find_markers(&tree.root, &mut ledger, policy).expect("markers");
        ledger.finalize()
    }

    fn find_c(source: &str) -> CidDocument {
        find(source, "test.c", DecisionPolicy::Leaves)
    }

    fn sections(document: &CidDocument, eval_type: EvaluationType) -> Vec<CodeSection> {
        document
            .evaluations(eval_type)
            .filter_map(|m| m.section())
            .collect()
    }

    fn checkpoint_positions(document: &CidDocument) -> Vec<CodePosition> {
        document.checkpoints().map(|m| m.location.start()).collect()
    }

    #[test]
    fn test_if_with_and_condition() {
        let document = find_c(indoc! {"
            void f(int a, int b, int x) {
                if (a && b) { x = 1; }
            }
        "});

        assert_eq!(checkpoint_positions(&document), vec![CodePosition::new(2, 19)]);
        assert_eq!(
            sections(&document, EvaluationType::Decision),
            vec![CodeSection::on_line(2, 9, 15)]
        );
        assert_eq!(
            sections(&document, EvaluationType::Condition),
            vec![CodeSection::on_line(2, 9, 10), CodeSection::on_line(2, 14, 15)]
        );
        let record = &document.decisions[0];
        assert_eq!(record.decision, MarkerId(1));
        assert_eq!(record.tree.conditions(), vec![MarkerId(2), MarkerId(3)]);
    }

    #[test]
    fn test_call_condition_shares_section_with_decision() {
        let document = find_c(indoc! {"
            int f(void);
            void g(int y) {
                if (f()) { y = 2; }
            }
        "});

        assert_eq!(document.checkpoints().count(), 1);
        assert_eq!(
            sections(&document, EvaluationType::Decision),
            vec![CodeSection::on_line(3, 9, 12)]
        );
        assert_eq!(
            sections(&document, EvaluationType::Condition),
            vec![CodeSection::on_line(3, 9, 12)]
        );
    }

    #[test]
    fn test_file_scope_is_not_instrumented() {
        let document = find_c(indoc! {"
            int limit = 3 && 4;
            static int table[2 || 1];
        "});
        assert!(document.markers.is_empty());
    }

    #[test]
    fn test_unbraced_body_gets_scoped_checkpoint() {
        let document = find_c(indoc! {"
            int f(int a) {
                if (a)
                    return 1;
                else
                    a = 2;
                return a;
            }
        "});

        let scoped: Vec<Option<CodeSection>> = document.checkpoints().map(|m| m.scope()).collect();
        assert_eq!(
            scoped,
            vec![
                Some(CodeSection::new(CodePosition::new(3, 9), CodePosition::new(3, 18))),
                Some(CodeSection::new(CodePosition::new(5, 9), CodePosition::new(5, 15))),
                None,
            ]
        );
    }

    #[test]
    fn test_loops_contribute_decisions_not_checkpoints() {
        let document = find_c(indoc! {"
            void f(int n) {
                for (int i = 0; i < n; i++) { n--; }
                while (n > 0) n--;
                do { n++; } while (!n);
                for (;;) { break; }
            }
        "});

        assert_eq!(document.checkpoints().count(), 4);
        assert_eq!(document.evaluations(EvaluationType::Decision).count(), 3);
        let not_decision = document.decisions.last().unwrap();
        assert!(matches!(not_decision.tree, ConditionNode::Not { .. }));
    }

    #[test]
    fn test_nested_decision_inside_condition_leaf() {
        let document = find_c(indoc! {"
            int g(int);
            void f(int a, int b, int c) {
                if (g(a && b) || c) { c = 0; }
            }
        "});

        assert_eq!(document.decisions.len(), 2);
        let outer = &document.decisions[0];
        let inner = &document.decisions[1];
        assert_eq!(outer.tree.conditions().len(), 2);
        assert_eq!(inner.tree.conditions().len(), 2);
        assert_eq!(
            document.marker(inner.decision).unwrap().section(),
            Some(CodeSection::on_line(3, 11, 17))
        );
    }

    #[test]
    fn test_free_standing_logic_and_ternary_conditions() {
        let document = find_c(indoc! {"
            int f(int a, int b) {
                int r = a || b;
                return a > b ? a : b;
            }
        "});

        assert_eq!(document.checkpoints().count(), 2);
        assert_eq!(
            sections(&document, EvaluationType::Decision),
            vec![CodeSection::on_line(2, 13, 19), CodeSection::on_line(3, 12, 17)]
        );
    }

    #[test]
    fn test_switch_cases_are_transparent() {
        let document = find_c(indoc! {"
            void f(int x) {
                switch (x) {
                case 1:
                    x = 2;
                    break;
                default:
                    x = 3;
                }
            }
        "});

        assert_eq!(
            checkpoint_positions(&document),
            vec![
                CodePosition::new(4, 9),
                CodePosition::new(5, 9),
                CodePosition::new(7, 9),
            ]
        );
        assert!(document.checkpoints().all(|m| m.scope().is_none()));
        assert_eq!(document.evaluations(EvaluationType::Decision).count(), 0);
    }

    #[test]
    fn test_static_locals_and_plain_declarations_are_skipped() {
        let document = find_c(indoc! {"
            void f(void) {
                static int calls = 0;
                int unset;
                int set = 1;
                ;
            }
        "});

        assert_eq!(checkpoint_positions(&document), vec![CodePosition::new(4, 5)]);
    }

    #[test]
    fn test_cpp_lambda_body_is_executable() {
        let document = find(
            indoc! {"
                auto pick = [](bool a, bool b) { return a && b; };
            "},
            "test.cpp",
            DecisionPolicy::Leaves,
        );

        assert_eq!(document.checkpoints().count(), 1);
        assert_eq!(document.decisions.len(), 1);
    }

    #[test]
    fn test_cpp_declaration_condition_is_not_wrapped() {
        let document = find(
            indoc! {"
                int *get();
                void f() {
                    if (int *p = get()) { *p = 1; }
                }
            "},
            "test.cpp",
            DecisionPolicy::Leaves,
        );

        assert_eq!(document.evaluations(EvaluationType::Decision).count(), 0);
        assert_eq!(document.checkpoints().count(), 1);
    }

    #[test]
    fn test_cpp_constructor_member_initializers_are_executable() {
        let document = find(
            indoc! {"
                struct P {
                    int v;
                    explicit P(int x) : v(x > 0 && x < 5 ? x : 0) {}
                };
            "},
            "test.cpp",
            DecisionPolicy::Leaves,
        );

        assert_eq!(document.checkpoints().count(), 0);
        assert_eq!(
            sections(&document, EvaluationType::Decision),
            vec![CodeSection::on_line(3, 27, 41)]
        );
        assert_eq!(
            sections(&document, EvaluationType::Condition),
            vec![CodeSection::on_line(3, 27, 32), CodeSection::on_line(3, 36, 41)]
        );
    }

    #[test]
    fn test_cpp_const_integral_local_keeps_constant_initializer() {
        let source = indoc! {"
            void f(int x) {
                const int K = 1 && 1;
                const double r = x || 0;
                int v = x && 1;
                switch (x) { case K: x = v; }
            }
        "};
        let decision_lines = |document: &CidDocument| -> Vec<u32> {
            sections(document, EvaluationType::Decision)
                .iter()
                .map(|section| section.start.line)
                .collect()
        };

        let cpp = find(source, "test.cpp", DecisionPolicy::Leaves);
        assert_eq!(decision_lines(&cpp), vec![3, 4]);
        assert_eq!(cpp.checkpoints().count(), 4);

        let c = find(source, "test.c", DecisionPolicy::Leaves);
        assert_eq!(decision_lines(&c), vec![2, 3, 4]);
    }

    #[test]
    fn test_nested_decisions_are_numbered_after_enclosing_conditions() {
        let document = find_c(indoc! {"
            int f(int);
            int g(int a, int b, int c) {
                return f(a && b) || f(!c);
            }
        "});

        // checkpoint 1, outer decision 2 with conditions 3 and 4, then the
        // decisions nested in those conditions: `a && b` 5 (6, 7), `!c` 8 (9).
        let outer = &document.decisions[0];
        assert_eq!(outer.decision, MarkerId(2));
        assert_eq!(outer.tree.conditions(), vec![MarkerId(3), MarkerId(4)]);
        let nested: Vec<(MarkerId, Vec<MarkerId>)> = document.decisions[1..]
            .iter()
            .map(|record| (record.decision, record.tree.conditions()))
            .collect();
        assert_eq!(
            nested,
            vec![
                (MarkerId(5), vec![MarkerId(6), MarkerId(7)]),
                (MarkerId(8), vec![MarkerId(9)]),
            ]
        );
    }

    #[test]
    fn test_ids_are_contiguous_in_discovery_order() {
        let document = find_c(indoc! {"
            void f(int a, int b) {
                a = 1;
                if (a || !b) { b = 2; }
            }
        "});

        let mut ids: Vec<u32> = document.markers.iter().map(|m| m.id.get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=document.markers.len() as u32).collect::<Vec<_>>());
        assert_eq!(document.markers[0].id, MarkerId(1));
    }
}
