use serde::{Deserialize, Serialize};

use crate::token::Span;

/// A parsed expression node with its source range (UTF-16 offsets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Empty or whitespace-only source.
    Empty,
    Number(f64),
    StringLit(String),
    Identifier(String),
    /// `[a, b, ...]`
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuiting `&&`, `||`, `??`.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `a, b, c`
    Sequence(Vec<Expr>),
    /// `callee(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `object.name` or `object[expr]`
    Member {
        object: Box<Expr>,
        property: MemberProperty,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberProperty {
    /// `.name`
    Static { name: String, span: Span },
    /// `[expr]`
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    /// Direct sub-expressions in source order. A static member name is not
    /// an expression and is therefore not a child.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Empty
            | ExprKind::Number(_)
            | ExprKind::StringLit(_)
            | ExprKind::Identifier(_) => Vec::new(),
            ExprKind::Array(items) | ExprKind::Sequence(items) => items.iter().collect(),
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                vec![left, right]
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => vec![test, consequent, alternate],
            ExprKind::Call { callee, args } => {
                let mut out = Vec::with_capacity(args.len() + 1);
                out.push(callee.as_ref());
                out.extend(args.iter());
                out
            }
            ExprKind::Member { object, property } => match property {
                MemberProperty::Static { .. } => vec![object],
                MemberProperty::Computed(index) => vec![object, index],
            },
        }
    }
}
