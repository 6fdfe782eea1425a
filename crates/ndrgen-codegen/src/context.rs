//! Compilation context threaded through every emitter

use ndrgen_ast::{Function, StructType};

use crate::{CallbackRegistry, CodegenConfig, ExprEvalRoutine, Metrics};

/// Where identifiers in a bound expression are looked up
///
/// Inside a structure, bounds name sibling fields; at the top level they
/// name parameters of the enclosing function.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    pub func: Option<&'a Function>,
    pub structure: Option<&'a StructType>,
}

impl<'a> Scope<'a> {
    pub fn function(func: &'a Function) -> Self {
        Self {
            func: Some(func),
            structure: None,
        }
    }

    /// The same function scope, resolving against `structure`'s fields
    pub fn within(self, structure: &'a StructType) -> Self {
        Self {
            func: self.func,
            structure: Some(structure),
        }
    }

    /// Human-readable name for diagnostics
    pub fn describe(&self) -> String {
        match (self.structure, self.func) {
            (Some(s), _) => format!("structure '{}'", s.name),
            (None, Some(f)) => format!("function '{}'", f.name),
            (None, None) => "empty scope".to_string(),
        }
    }
}

/// Emitter state for one interface
///
/// Holds the target metrics and the callback registry shared by the type
/// and procedure passes.
#[derive(Debug)]
pub struct FormatCompiler {
    pub(crate) metrics: Metrics,
    pub(crate) callbacks: CallbackRegistry,
}

impl FormatCompiler {
    pub fn new(config: &CodegenConfig) -> Self {
        Self {
            metrics: Metrics::new(config),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Hand over the registered callbacks; later calls return nothing
    pub fn drain_callbacks(&mut self) -> Vec<ExprEvalRoutine> {
        self.callbacks.drain()
    }
}
