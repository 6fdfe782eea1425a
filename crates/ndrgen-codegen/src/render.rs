//! C source rendering
//!
//! Turns compiled format strings, call plans and callbacks into the C
//! initializers and statements a stub file includes.

use ndrgen_ast::{Expr, StructType, ToC};

use crate::callbacks::ExprEvalRoutine;
use crate::marshal::{CallPlan, Direction, MarshalStep, RoutineFamily};
use crate::sink::{FormatBuffer, FormatItem, FormatSink};
use crate::{CodegenError, CompiledInterface};

/// Name of the structure pointer inside callbacks
const STRUCT_EXPR_EVAL_VAR: &str = "pS";

fn indent_str(level: usize) -> String {
    "    ".repeat(level)
}

/// Format array length, counting the trailing terminator
pub fn format_string_size(buffer: &FormatBuffer) -> u32 {
    buffer.offset() + 1
}

pub fn render_size_defines(compiled: &CompiledInterface) -> String {
    format!(
        "#define TYPE_FORMAT_STRING_SIZE   {}\n#define PROC_FORMAT_STRING_SIZE   {}\n",
        format_string_size(&compiled.type_format),
        format_string_size(&compiled.proc_format)
    )
}

/// `__MIDL_TypeFormatString`, with an offset marker before every unit
pub fn render_type_format(buffer: &FormatBuffer) -> String {
    render_table(
        "static const MIDL_TYPE_FORMAT_STRING __MIDL_TypeFormatString",
        buffer,
        true,
    )
}

/// `__MIDL_ProcFormatString`
pub fn render_proc_format(buffer: &FormatBuffer) -> String {
    render_table(
        "static const MIDL_PROC_FORMAT_STRING __MIDL_ProcFormatString",
        buffer,
        false,
    )
}

fn render_table(declaration: &str, buffer: &FormatBuffer, markers: bool) -> String {
    let mut lines = vec![
        format!("{} =", declaration),
        "{".to_string(),
        format!("{}0,", indent_str(1)),
        format!("{}{{", indent_str(1)),
    ];
    for (offset, item) in buffer.items() {
        if markers && matches!(item, FormatItem::Tag(_)) {
            lines.push(format!("/* {:>2} */", offset));
        }
        lines.push(format!("{}{}", indent_str(2), item_text(*offset, item)));
    }
    lines.push(format!("{}0x0", indent_str(2)));
    lines.push(format!("{}}}", indent_str(1)));
    lines.push("};".to_string());
    lines.join("\n") + "\n"
}

fn item_text(offset: u32, item: &FormatItem) -> String {
    match *item {
        FormatItem::Tag(fc) | FormatItem::Code(fc) => {
            format!("0x{:02x},    /* {} */", fc.byte(), fc.name())
        }
        FormatItem::Byte(b) => format!("0x{:x},", b),
        FormatItem::Short(v) => format!("NdrFcShort(0x{:x}),    /* {} */", v, v),
        FormatItem::Offset(delta) => format!(
            "NdrFcShort(0x{:x}),    /* Offset= {} ({}) */",
            delta as u16,
            delta,
            i64::from(offset) + i64::from(delta)
        ),
        FormatItem::Long(v) => format!("NdrFcLong(0x{:x}),    /* {} */", v, v),
    }
}

/// Stub statements for one pass
pub fn render_plan(plan: &CallPlan, indent: usize) -> String {
    let ind = indent_str(indent);
    let mut lines = Vec::new();
    for step in &plan.steps {
        match step {
            MarshalStep::SetScratch { field, value } => {
                lines.push(format!(
                    "{}_StubMsg.{} = (unsigned long){};",
                    ind,
                    field,
                    value.to_c()
                ));
            }
            MarshalStep::Align { pad } => {
                lines.push(format!("{}_StubMsg.Buffer += {};", ind, pad));
            }
            MarshalStep::Inline { var, c_type, .. } => {
                match plan.direction {
                    Direction::Marshal => {
                        lines.push(format!("{}*({} *)_StubMsg.Buffer = {};", ind, c_type, var))
                    }
                    Direction::Unmarshal => {
                        lines.push(format!("{}{} = *({} *)_StubMsg.Buffer;", ind, var, c_type))
                    }
                }
                lines.push(format!("{}_StubMsg.Buffer += sizeof({});", ind, c_type));
                lines.push(String::new());
            }
            MarshalStep::Call {
                family,
                var,
                type_offset,
            } => {
                let routine = family.routine(plan.direction);
                let line = match (plan.direction, family) {
                    (Direction::Marshal, _) => format!(
                        "{}{}(&_StubMsg, (unsigned char *){}, &__MIDL_TypeFormatString.Format[{}]);",
                        ind, routine, var, type_offset
                    ),
                    (Direction::Unmarshal, RoutineFamily::Pointer) => format!(
                        "{}{}(&_StubMsg, (unsigned char **)&{}, &__MIDL_TypeFormatString.Format[{}], 0);",
                        ind, routine, var, type_offset
                    ),
                    (Direction::Unmarshal, _) => format!(
                        "{}{}(&_StubMsg, (unsigned char *){}, &__MIDL_TypeFormatString.Format[{}], 0);",
                        ind, routine, var, type_offset
                    ),
                };
                lines.push(line);
                lines.push(String::new());
            }
        }
    }
    lines.join("\n")
}

/// Render `expr` against the fields of `structure` through `pS`
pub fn write_struct_expr(expr: &Expr, structure: &StructType) -> Result<String, CodegenError> {
    let mut resolve = |name: &str| {
        if structure.field(name).is_some() {
            Ok(format!("{}->{}", STRUCT_EXPR_EVAL_VAR, name))
        } else {
            Err(CodegenError::UnresolvedIdentifier {
                ident: name.to_string(),
                scope: format!("structure '{}'", structure.name),
            })
        }
    };
    expr.to_c_with(true, &mut resolve)
}

fn routine_name(iface: &str, routine: &ExprEvalRoutine) -> String {
    format!("{}_{}ExprEval_{:04}", iface, routine.structure.name, routine.index)
}

/// Bodies of the expression-evaluation callbacks
pub fn render_expr_eval_routines(
    iface: &str,
    routines: &[ExprEvalRoutine],
) -> Result<String, CodegenError> {
    let ind = indent_str(1);
    let mut out = String::new();
    for routine in routines {
        let name = &routine.structure.name;
        out.push_str(&format!(
            "static void __RPC_USER {}(PMIDL_STUB_MESSAGE pStubMsg)\n{{\n",
            routine_name(iface, routine)
        ));
        out.push_str(&format!(
            "{}struct {} *{} = (struct {} *)(pStubMsg->StackTop - {});\n\n",
            ind, name, STRUCT_EXPR_EVAL_VAR, name, routine.structure_size
        ));
        out.push_str(&format!("{}pStubMsg->Offset = 0;\n", ind));
        out.push_str(&format!(
            "{}pStubMsg->MaxCount = (unsigned long){};\n",
            ind,
            write_struct_expr(&routine.expr, &routine.structure)?
        ));
        out.push_str("}\n\n");
    }
    Ok(out)
}

/// The `ExprEvalRoutines` table, in callback index order
pub fn render_expr_eval_table(iface: &str, routines: &[ExprEvalRoutine]) -> String {
    let mut lines = vec![
        "static const EXPR_EVAL ExprEvalRoutines[] =".to_string(),
        "{".to_string(),
    ];
    for routine in routines {
        lines.push(format!("{}{},", indent_str(1), routine_name(iface, routine)));
    }
    lines.push("};".to_string());
    lines.join("\n") + "\n"
}

/// Everything a stub file needs from one compiled interface
pub fn render_interface(compiled: &CompiledInterface) -> Result<String, CodegenError> {
    let mut sections = vec![
        format!("/* Format strings for interface {} */", compiled.name),
        render_size_defines(compiled),
        render_proc_format(&compiled.proc_format),
        render_type_format(&compiled.type_format),
    ];

    if !compiled.callbacks.is_empty() {
        sections.push(render_expr_eval_routines(&compiled.name, &compiled.callbacks)?);
        sections.push(render_expr_eval_table(&compiled.name, &compiled.callbacks));
    }

    for func in &compiled.functions {
        let mut text = format!(
            "/* {}: procedure format offset {} */\n",
            func.name, func.proc_offset
        );
        for plan in &func.calls {
            if plan.steps.is_empty() {
                continue;
            }
            text.push_str(&format!(
                "/* {} {:?} */\n",
                match plan.direction {
                    Direction::Marshal => "marshal",
                    Direction::Unmarshal => "unmarshal",
                },
                plan.pass
            ));
            text.push_str(&render_plan(plan, 1));
            text.push('\n');
        }
        sections.push(text);
    }

    Ok(sections.join("\n"))
}
