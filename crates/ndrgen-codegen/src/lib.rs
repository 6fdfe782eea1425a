//! ndrgen Codegen - NDR format string generation
//!
//! Compiles an interface into the type and procedure format strings read by
//! an NDR marshalling runtime, plus the marshal/unmarshal call plans and
//! expression callbacks that go with them.

mod callbacks;
mod conformance;
mod config;
mod context;
mod error;
mod fc;
mod marshal;
mod metrics;
mod procfmt;
mod render;
mod sink;
mod typefmt;

pub use callbacks::*;
pub use conformance::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use fc::*;
pub use marshal::*;
pub use metrics::*;
pub use procfmt::*;
pub use render::*;
pub use sink::*;
pub use typefmt::*;

use ndrgen_ast::{Function, Interface, Variable};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

/// Offsets and call plans of one function
#[derive(Debug, Clone, Serialize)]
pub struct FunctionPlan {
    pub name: String,
    pub proc_offset: u32,
    pub types: FunctionLayout,
    /// In, out and return passes, each marshalled then unmarshalled
    pub calls: Vec<CallPlan>,
}

impl FunctionPlan {
    pub fn plan(&self, pass: Pass, direction: Direction) -> Option<&CallPlan> {
        self.calls
            .iter()
            .find(|p| p.pass == pass && p.direction == direction)
    }
}

/// Everything produced for one interface
#[derive(Debug, Clone, Serialize)]
pub struct CompiledInterface {
    pub name: String,
    #[serde(serialize_with = "as_bytes")]
    pub type_format: FormatBuffer,
    #[serde(serialize_with = "as_bytes")]
    pub proc_format: FormatBuffer,
    pub functions: Vec<FunctionPlan>,
    pub callbacks: Vec<ExprEvalRoutine>,
}

fn as_bytes<S: Serializer>(buffer: &FormatBuffer, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(buffer.bytes())
}

impl CompiledInterface {
    pub fn function(&self, name: &str) -> Option<&FunctionPlan> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Compile an interface
pub fn compile(iface: &Interface, config: &CodegenConfig) -> Result<CompiledInterface, CodegenError> {
    config.validate()?;
    let mut compiler = FormatCompiler::new(config);

    let mut type_format = FormatBuffer::new();
    let layouts = compiler.write_type_format(&mut type_format, iface)?;

    let mut proc_format = FormatBuffer::new();
    let procs = compiler.write_proc_format(&mut proc_format, iface)?;

    let mut functions = Vec::with_capacity(iface.functions.len());
    for ((func, layout), proc) in iface.functions.iter().zip(layouts).zip(procs) {
        if proc.types != layout {
            return Err(CodegenError::Invariant {
                message: format!(
                    "procedure pass expected type layout {:?} for '{}', type pass produced {:?}",
                    proc.types, func.name, layout
                ),
            });
        }

        let mut calls = Vec::with_capacity(6);
        for pass in [Pass::In, Pass::Out, Pass::Return] {
            for direction in [Direction::Marshal, Direction::Unmarshal] {
                calls.push(select_calls(compiler.metrics(), func, &layout, pass, direction)?);
            }
        }
        debug!(func = %func.name, proc_offset = proc.offset, "planned calls");

        functions.push(FunctionPlan {
            name: func.name.clone(),
            proc_offset: proc.offset,
            types: layout,
            calls,
        });
    }

    let callbacks = compiler.drain_callbacks();
    info!(
        interface = %iface.name,
        type_format = type_format.offset(),
        proc_format = proc_format.offset(),
        callbacks = callbacks.len(),
        "compiled interface"
    );

    Ok(CompiledInterface {
        name: iface.name.clone(),
        type_format,
        proc_format,
        functions,
        callbacks,
    })
}

/// Bytes `var` occupies in the type format string, resolved inside `func`
pub fn type_format_size(
    func: &Function,
    var: &Variable,
    config: &CodegenConfig,
) -> Result<u32, CodegenError> {
    config.validate()?;
    FormatCompiler::new(config).type_format_size(Scope::function(func), var)
}

/// Bytes `var` occupies in the procedure format string, resolved inside `func`
pub fn proc_format_size(
    func: &Function,
    var: &Variable,
    config: &CodegenConfig,
) -> Result<u32, CodegenError> {
    config.validate()?;
    FormatCompiler::new(config).proc_format_size(Scope::function(func), var)
}

/// Wire buffer space `var` needs when marshalled inline
pub fn required_buffer_size(var: &Variable, config: &CodegenConfig) -> Result<BufferSize, CodegenError> {
    config.validate()?;
    Metrics::new(config).required_buffer_size(var)
}
