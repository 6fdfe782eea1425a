//! Expression-evaluation callback registry
//!
//! Bounds too complex for a correlation descriptor are computed at run time
//! by generated callbacks. Entries are unique per (structure name, expression)
//! and keep their insertion index, which is the index written into the
//! descriptor.

use ndrgen_ast::{Expr, StructType};
use serde::Serialize;
use tracing::debug;

use crate::{CodegenError, Metrics};

/// One callback routine to generate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExprEvalRoutine {
    pub index: u16,
    pub structure: StructType,
    pub expr: Expr,
    /// Footprint used to locate the structure below the stack top
    pub structure_size: u32,
}

#[derive(Debug, Default)]
pub struct CallbackRegistry {
    routines: Vec<ExprEvalRoutine>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the callback for `expr` within `structure`, adding it if new
    pub fn register(
        &mut self,
        structure: &StructType,
        expr: &Expr,
        metrics: &Metrics,
    ) -> Result<u16, CodegenError> {
        if let Some(existing) = self
            .routines
            .iter()
            .find(|r| r.structure.name == structure.name && r.expr == *expr)
        {
            return Ok(existing.index);
        }

        let index = u16::try_from(self.routines.len()).map_err(|_| CodegenError::TooManyCallbacks)?;
        let structure_size = metrics.fields_memsize(&structure.fields)?;
        debug!(index, structure = %structure.name, "registered expression callback");
        self.routines.push(ExprEvalRoutine {
            index,
            structure: structure.clone(),
            expr: expr.clone(),
            structure_size,
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn routines(&self) -> &[ExprEvalRoutine] {
        &self.routines
    }

    /// Take every entry in insertion order; the registry is left empty
    pub fn drain(&mut self) -> Vec<ExprEvalRoutine> {
        std::mem::take(&mut self.routines)
    }
}
