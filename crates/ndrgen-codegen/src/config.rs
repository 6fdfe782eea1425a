//! Compiler configuration

use serde::{Deserialize, Serialize};

use crate::CodegenError;

/// Target parameters for descriptor generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Pointer width in bytes; also the assumed size of every stack slot
    pub pointer_size: u32,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self { pointer_size: 4 }
    }
}

impl CodegenConfig {
    pub fn with_pointer_size(pointer_size: u32) -> Self {
        Self { pointer_size }
    }

    pub fn validate(&self) -> Result<(), CodegenError> {
        match self.pointer_size {
            4 | 8 => Ok(()),
            other => Err(CodegenError::InvalidConfig {
                message: format!("pointer_size must be 4 or 8, got {}", other),
            }),
        }
    }
}
