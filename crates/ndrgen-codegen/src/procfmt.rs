//! Procedure format string emission
//!
//! One directive per parameter, then one for the return value. Scalars are
//! described inline; everything else points into the type format string at
//! the descriptor the type pass emits for it. The type offsets are tracked
//! here by sizing each variable, so both passes must walk variables in the
//! same order.

use ndrgen_ast::{Interface, Type, Variable};
use serde::Serialize;
use tracing::debug;

use crate::sink::{FormatItem, FormatSink, SizeCounter};
use crate::typefmt::{FunctionLayout, VarLayout, TYPE_FORMAT_HEADER_SIZE};
use crate::{CodegenError, Fc, FormatCompiler, Scope};

/// Where a function's directives start, and the type layouts they assumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcLayout {
    pub offset: u32,
    pub types: FunctionLayout,
}

impl FormatCompiler {
    /// Write the whole procedure format string for `iface`
    pub fn write_proc_format<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        iface: &Interface,
    ) -> Result<Vec<ProcLayout>, CodegenError> {
        let mut type_offset = TYPE_FORMAT_HEADER_SIZE;
        let mut procs = Vec::with_capacity(iface.functions.len());

        for func in &iface.functions {
            let scope = Scope::function(func);
            let offset = sink.offset();
            let mut types = FunctionLayout::default();

            for param in &func.params {
                let layout = self.type_format_layout(scope, param, type_offset)?;
                write_directive(sink, param, false, &layout)?;
                type_offset += layout.size;
                types.params.push(layout);
            }

            if func.returns_void() {
                sink.put(FormatItem::Code(Fc::End));
                sink.put(FormatItem::Code(Fc::Pad));
            } else {
                let layout = self.type_format_layout(scope, &func.ret, type_offset)?;
                write_directive(sink, &func.ret, true, &layout)?;
                type_offset += layout.size;
                types.ret = Some(layout);
            }

            if !sink.is_dry() {
                debug!(func = %func.name, offset, "procedure directives");
            }
            procs.push(ProcLayout { offset, types });
        }
        Ok(procs)
    }

    /// Emit the directive for one variable
    ///
    /// `type_offset` is where the variable's type descriptors begin; it is
    /// advanced past them. Returns the bytes written.
    pub fn write_proc_format_var<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
        is_return: bool,
        type_offset: &mut u32,
    ) -> Result<u32, CodegenError> {
        let layout = self.type_format_layout(scope, var, *type_offset)?;
        *type_offset += layout.size;
        write_directive(sink, var, is_return, &layout)
    }

    /// Bytes `var` occupies in the procedure format string
    pub fn proc_format_size(&mut self, scope: Scope<'_>, var: &Variable) -> Result<u32, CodegenError> {
        let mut counter = SizeCounter::default();
        let mut type_offset = TYPE_FORMAT_HEADER_SIZE;
        self.write_proc_format_var(&mut counter, scope, var, false, &mut type_offset)
    }
}

/// Directive for `var`, whose type descriptors are laid out as `layout`
fn write_directive<S: FormatSink + ?Sized>(
    sink: &mut S,
    var: &Variable,
    is_return: bool,
    layout: &VarLayout,
) -> Result<u32, CodegenError> {
    let (ty, ptr_level) = var.unwrap_type();
    if ptr_level == 0 && var.array.is_empty() {
        if let Type::Base(base) = ty {
            let role = if is_return {
                Fc::ReturnParamBasetype
            } else {
                Fc::InParamBasetype
            };
            sink.put(FormatItem::Code(role));
            sink.put(FormatItem::Code(Fc::base(*base)));
            return Ok(2);
        }
    }

    let role = if is_return {
        Fc::ReturnParam
    } else {
        match (var.is_in(), var.is_out()) {
            (true, true) => Fc::InOutParam,
            (false, true) => Fc::OutParam,
            _ => Fc::InParam,
        }
    };
    let target = layout.descriptor_offset();
    let target = u16::try_from(target).map_err(|_| CodegenError::SizeOverflow {
        what: "type format offset",
        name: var.name.clone(),
        limit: u32::from(u16::MAX),
        excess: u64::from(target - u32::from(u16::MAX)),
    })?;

    sink.put(FormatItem::Code(role));
    sink.put(FormatItem::Byte(0x01));
    sink.put(FormatItem::Short(target));
    if !sink.is_dry() {
        debug!(name = %var.name, role = role.name(), type_offset = target, "directive");
    }
    Ok(4)
}
