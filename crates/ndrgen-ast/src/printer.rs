//! C text printer for expressions
//!
//! Bounds are evaluated at marshal time by generated C, either against the
//! stub's own parameters or against a structure pointer inside a callback.

use std::convert::Infallible;

use crate::{Expr, UnaryOp};

/// Trait for rendering nodes as C source text.
pub trait ToC {
    fn to_c(&self) -> String;
}

impl ToC for Expr {
    /// Render with identifiers printed as-is, fully bracketed
    fn to_c(&self) -> String {
        let mut plain = |name: &str| Ok::<_, Infallible>(name.to_string());
        match self.to_c_with(true, &mut plain) {
            Ok(text) => text,
            Err(never) => match never {},
        }
    }
}

impl Expr {
    /// Render as C, mapping each identifier through `resolve`
    ///
    /// `brackets` wraps compound operations in parentheses; nested operands
    /// are always bracketed.
    pub fn to_c_with<E>(
        &self,
        brackets: bool,
        resolve: &mut dyn FnMut(&str) -> Result<String, E>,
    ) -> Result<String, E> {
        let text = match self {
            Expr::Void => String::new(),
            Expr::Num(n) => n.to_string(),
            Expr::HexNum(n) => format!("0x{:x}", n),
            Expr::Ident(name) => resolve(name)?,
            Expr::Unary { op, operand } => {
                let prefix = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "~",
                    UnaryOp::Deref => "*",
                };
                format!("{}{}", prefix, operand.to_c_with(true, resolve)?)
            }
            Expr::Cast { ty, operand } => {
                format!("({}){}", ty, operand.to_c_with(true, resolve)?)
            }
            Expr::Sizeof(ty) => format!("sizeof({})", ty),
            Expr::Binary { op, left, right } => {
                let inner = format!(
                    "{} {} {}",
                    left.to_c_with(true, resolve)?,
                    op.symbol(),
                    right.to_c_with(true, resolve)?
                );
                wrap(inner, brackets)
            }
            Expr::Cond {
                condition,
                then_branch,
                else_branch,
            } => {
                let inner = format!(
                    "{} ? {} : {}",
                    condition.to_c_with(true, resolve)?,
                    then_branch.to_c_with(true, resolve)?,
                    else_branch.to_c_with(true, resolve)?
                );
                wrap(inner, brackets)
            }
        };
        Ok(text)
    }
}

fn wrap(text: String, brackets: bool) -> String {
    if brackets {
        format!("({})", text)
    } else {
        text
    }
}
