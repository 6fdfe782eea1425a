//! ndrgen - NDR format string compiler
//!
//! This is the root workspace crate that provides integration tests.
//! The actual implementation is in the workspace member crates.

// Re-export main crates for convenience
pub use ndrgen_ast as ast;
pub use ndrgen_codegen as codegen;
