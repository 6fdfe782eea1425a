//! Error types for format-string compilation
//!
//! Every error is fatal: compilation stops at the first one and no partial
//! output is produced.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("unsupported type {ty} for '{name}'")]
    UnsupportedType { name: String, ty: String },

    #[error("multi-dimensional arrays are not implemented (variable '{name}')")]
    MultiDimensionalArray { name: String },

    #[error("unions are not implemented (variable '{name}')")]
    UnionUnimplemented { name: String },

    #[error("structure '{structure}' of kind {kind} is not implemented (variable '{name}')")]
    StructUnimplemented {
        name: String,
        structure: String,
        kind: String,
    },

    #[error("[string] is only supported on char and wchar_t, not {ty} (variable '{name}')")]
    UnsupportedStringType { name: String, ty: String },

    #[error("conformance identifier '{ident}' not found in {scope}")]
    UnresolvedIdentifier { ident: String, scope: String },

    #[error("conformance variable '{ident}' has non-integral type {ty}")]
    UnsupportedCorrelationType { ident: String, ty: String },

    #[error("constant value {value} is outside the encodable range 0..={max}")]
    ConstantOutOfRange { value: i64, max: i64 },

    #[error("{what} for '{name}' exceeds {limit} bytes by {excess} bytes")]
    SizeOverflow {
        what: &'static str,
        name: String,
        limit: u32,
        excess: u64,
    },

    #[error("array '{name}' has no conformance bound")]
    MissingBound { name: String },

    #[error("top-level callback conformance is not implemented (expression in '{func}')")]
    TopLevelCallback { func: String },

    #[error("maximum number of callback routines reached")]
    TooManyCallbacks,

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("internal invariant violated: {message}")]
    Invariant { message: String },
}

impl CodegenError {
    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            CodegenError::UnsupportedType { .. } => "E-NDR-001",
            CodegenError::MultiDimensionalArray { .. } => "E-NDR-002",
            CodegenError::UnionUnimplemented { .. } => "E-NDR-003",
            CodegenError::StructUnimplemented { .. } => "E-NDR-004",
            CodegenError::UnsupportedStringType { .. } => "E-NDR-005",
            CodegenError::UnresolvedIdentifier { .. } => "E-NDR-006",
            CodegenError::UnsupportedCorrelationType { .. } => "E-NDR-007",
            CodegenError::ConstantOutOfRange { .. } => "E-NDR-008",
            CodegenError::SizeOverflow { .. } => "E-NDR-009",
            CodegenError::MissingBound { .. } => "E-NDR-010",
            CodegenError::TopLevelCallback { .. } => "E-NDR-011",
            CodegenError::TooManyCallbacks => "E-NDR-012",
            CodegenError::InvalidConfig { .. } => "E-CFG-001",
            CodegenError::Invariant { .. } => "E-INT-001",
        }
    }

    pub(crate) fn unsupported(name: &str, ty: impl Into<String>) -> Self {
        CodegenError::UnsupportedType {
            name: name.to_string(),
            ty: ty.into(),
        }
    }
}
