//! ndrgen AST - the interface tree the format-string compiler reads
//!
//! This crate defines the type, variable, expression and interface nodes
//! produced by an IDL front end. The compiler only ever reads them; nothing
//! here is mutated once an interface has been built.

mod types;
mod expr;
mod decl;
mod printer;

pub use types::*;
pub use expr::*;
pub use decl::*;
pub use printer::*;
