//! Splits a decision at its short-circuit boundaries.
//!
//! Parentheses are transparent, `&&`/`||` recurse left then right, `!`
//! recurses into its operand, and every other expression is an atomic
//! condition however complex its text. The root is registered first, then
//! the tree in pre-order, so condition ids follow source order.

use crate::cid::{CidManager, ConditionNode, DecisionRecord};
use crate::config::DecisionPolicy;
use crate::core::EvaluationType;
use crate::errors::Result;
use crate::syntax::{ExpressionKind, Role, SyntaxNode};

/// Boolean structure of one decision, borrowed from the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr<'ast> {
    Leaf(&'ast SyntaxNode),
    Not {
        node: &'ast SyntaxNode,
        operand: Box<BoolExpr<'ast>>,
    },
    And {
        node: &'ast SyntaxNode,
        left: Box<BoolExpr<'ast>>,
        right: Box<BoolExpr<'ast>>,
    },
    Or {
        node: &'ast SyntaxNode,
        left: Box<BoolExpr<'ast>>,
        right: Box<BoolExpr<'ast>>,
    },
}

impl<'ast> BoolExpr<'ast> {
    pub fn from_node(node: &'ast SyntaxNode) -> Self {
        let node = strip_parentheses(node);
        match node.expression_kind() {
            Some(ExpressionKind::And) | Some(ExpressionKind::Or) => {
                match (node.child(Role::Left), node.child(Role::Right)) {
                    (Some(left), Some(right)) => {
                        let left = Box::new(Self::from_node(left));
                        let right = Box::new(Self::from_node(right));
                        if node.expression_kind() == Some(ExpressionKind::And) {
                            Self::And { node, left, right }
                        } else {
                            Self::Or { node, left, right }
                        }
                    }
                    _ => Self::Leaf(node),
                }
            }
            Some(ExpressionKind::Not) => match node.child(Role::Operand) {
                Some(operand) => Self::Not {
                    node,
                    operand: Box::new(Self::from_node(operand)),
                },
                None => Self::Leaf(node),
            },
            _ => Self::Leaf(node),
        }
    }

    pub fn node(&self) -> &'ast SyntaxNode {
        match self {
            Self::Leaf(node)
            | Self::Not { node, .. }
            | Self::And { node, .. }
            | Self::Or { node, .. } => *node,
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Not { operand, .. } => operand.leaf_count(),
            Self::And { left, right, .. } | Self::Or { left, right, .. } => {
                left.leaf_count() + right.leaf_count()
            }
        }
    }
}

/// Innermost expression of a chain of `( ... )`.
pub fn strip_parentheses(mut node: &SyntaxNode) -> &SyntaxNode {
    while node.expression_kind() == Some(ExpressionKind::Parenthesized) && node.children.len() == 1
    {
        node = &node.children[0];
    }
    node
}

#[derive(Debug)]
pub struct Decomposition<'ast> {
    pub record: DecisionRecord,
    /// Leaf condition nodes in source order.
    pub leaves: Vec<&'ast SyntaxNode>,
}

/// Register the decision rooted at `node` and all of its conditions.
pub fn decompose<'ast>(
    node: &'ast SyntaxNode,
    ledger: &mut CidManager,
    policy: DecisionPolicy,
) -> Result<Decomposition<'ast>> {
    let expr = BoolExpr::from_node(node);
    let decision = ledger.add_evaluation(expr.node().section, EvaluationType::Decision)?;

    let mut registrar = Registrar {
        ledger: &mut *ledger,
        policy,
        leaves: Vec::with_capacity(expr.leaf_count()),
    };
    let tree = registrar.register(&expr, true)?;
    let leaves = registrar.leaves;

    let record = DecisionRecord { decision, tree };
    ledger.record_decision(record.clone());
    Ok(Decomposition { record, leaves })
}

struct Registrar<'l, 'ast> {
    ledger: &'l mut CidManager,
    policy: DecisionPolicy,
    leaves: Vec<&'ast SyntaxNode>,
}

impl<'ast> Registrar<'_, 'ast> {
    fn register(&mut self, expr: &BoolExpr<'ast>, is_root: bool) -> Result<ConditionNode> {
        match expr {
            BoolExpr::Leaf(node) => {
                let id = self
                    .ledger
                    .add_evaluation(node.section, EvaluationType::Condition)?;
                self.leaves.push(*node);
                Ok(ConditionNode::Condition { id })
            }
            BoolExpr::Not { operand, .. } => Ok(ConditionNode::Not {
                operand: Box::new(self.register(operand, false)?),
            }),
            BoolExpr::And { node, left, right } | BoolExpr::Or { node, left, right } => {
                let evaluation = if !is_root && self.policy == DecisionPolicy::AllNodes {
                    Some(
                        self.ledger
                            .add_evaluation(node.section, EvaluationType::Decision)?,
                    )
                } else {
                    None
                };
                let left = Box::new(self.register(left, false)?);
                let right = Box::new(self.register(right, false)?);
                Ok(match expr {
                    BoolExpr::And { .. } => ConditionNode::And {
                        left,
                        right,
                        evaluation,
                    },
                    _ => ConditionNode::Or {
                        left,
                        right,
                        evaluation,
                    },
                })
            }
        }
    }
}
