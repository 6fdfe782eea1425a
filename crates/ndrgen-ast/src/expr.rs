//! Expression AST nodes
//!
//! Expressions appear as array extents and as `size_is`/`length_is`
//! bounds. Equality is structural: two independently built trees with the
//! same tags and contents compare equal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Empty expression: `[]` or an omitted `size_is` slot
    Void,

    /// Decimal literal: `42`
    Num(i64),

    /// Hexadecimal literal: `0x2a`
    HexNum(i64),

    /// Identifier: `n`, `cb`
    Ident(String),

    /// Unary operation: `-x`, `~x`, `*x`
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// Cast: `(unsigned long)x`
    Cast {
        ty: String,
        operand: Box<Expr>,
    },

    /// `sizeof(T)`
    Sizeof(String),

    /// Binary operation: `a * b`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Conditional: `c ? a : b`
    Cond {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    /// Bitwise not
    Not,
    /// Pointer dereference
    Deref,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

impl Expr {
    pub fn num(value: i64) -> Self {
        Expr::Num(value)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn deref(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Deref, operand)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Expr::Void)
    }

    pub fn is_const(&self) -> bool {
        self.const_value().is_some()
    }

    /// Fold the expression to a compile-time constant, if it is one
    ///
    /// Division by zero and out-of-range shifts are not constant.
    pub fn const_value(&self) -> Option<i64> {
        match self {
            Expr::Num(n) | Expr::HexNum(n) => Some(*n),
            Expr::Unary { op, operand } => {
                let v = operand.const_value()?;
                match op {
                    UnaryOp::Neg => v.checked_neg(),
                    UnaryOp::Not => Some(!v),
                    UnaryOp::Deref => None,
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.const_value()?;
                let r = right.const_value()?;
                match op {
                    BinaryOp::Add => l.checked_add(r),
                    BinaryOp::Sub => l.checked_sub(r),
                    BinaryOp::Mul => l.checked_mul(r),
                    BinaryOp::Div => l.checked_div(r),
                    BinaryOp::Shl => u32::try_from(r).ok().and_then(|s| l.checked_shl(s)),
                    BinaryOp::Shr => u32::try_from(r).ok().and_then(|s| l.checked_shr(s)),
                    BinaryOp::And => Some(l & r),
                    BinaryOp::Or => Some(l | r),
                }
            }
            Expr::Cond {
                condition,
                then_branch,
                else_branch,
            } => {
                if condition.const_value()? != 0 {
                    then_branch.const_value()
                } else {
                    else_branch.const_value()
                }
            }
            Expr::Cast { operand, .. } => operand.const_value(),
            Expr::Void | Expr::Ident(_) | Expr::Sizeof(_) => None,
        }
    }
}
