//! Marshal and unmarshal call selection
//!
//! For each variable taking part in a pass, decide between an inline buffer
//! copy and a call to one of the runtime's generic routines. Unmarshalling
//! mirrors marshalling but reads counts back from the wire, so it never sets
//! the scratch fields.

use std::fmt;

use ndrgen_ast::{BaseType, Expr, Function, StructKind, Type, Variable};
use serde::Serialize;

use crate::metrics::base_size;
use crate::typefmt::{FunctionLayout, VarLayout};
use crate::{CodegenError, Metrics};

/// Which variables a plan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// `[in]` parameters, including those without a direction
    In,
    /// `[out]` parameters
    Out,
    /// The return value
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Marshal,
    Unmarshal,
}

/// Stub message fields read by the runtime routines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScratchField {
    Offset,
    ActualCount,
    MaxCount,
}

impl fmt::Display for ScratchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchField::Offset => write!(f, "Offset"),
            ScratchField::ActualCount => write!(f, "ActualCount"),
            ScratchField::MaxCount => write!(f, "MaxCount"),
        }
    }
}

/// Generic runtime routine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoutineFamily {
    NonConformantString,
    ConformantString,
    FixedArray,
    VaryingArray,
    ConformantArray,
    ConformantVaryingArray,
    ComplexArray,
    SimpleStruct,
    ConformantStruct,
    ConformantVaryingStruct,
    ComplexStruct,
    Pointer,
}

impl RoutineFamily {
    pub fn name(self) -> &'static str {
        match self {
            RoutineFamily::NonConformantString => "NonConformantString",
            RoutineFamily::ConformantString => "ConformantString",
            RoutineFamily::FixedArray => "FixedArray",
            RoutineFamily::VaryingArray => "VaryingArray",
            RoutineFamily::ConformantArray => "ConformantArray",
            RoutineFamily::ConformantVaryingArray => "ConformantVaryingArray",
            RoutineFamily::ComplexArray => "ComplexArray",
            RoutineFamily::SimpleStruct => "SimpleStruct",
            RoutineFamily::ConformantStruct => "ConformantStruct",
            RoutineFamily::ConformantVaryingStruct => "ConformantVaryingStruct",
            RoutineFamily::ComplexStruct => "ComplexStruct",
            RoutineFamily::Pointer => "Pointer",
        }
    }

    /// `NdrConformantArrayMarshall`, `NdrPointerUnmarshall`, ...
    pub fn routine(self, direction: Direction) -> String {
        match direction {
            Direction::Marshal => format!("Ndr{}Marshall", self.name()),
            Direction::Unmarshal => format!("Ndr{}Unmarshall", self.name()),
        }
    }
}

/// One abstract stub statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarshalStep {
    /// Evaluate `value` into a stub message field before a call
    SetScratch { field: ScratchField, value: Expr },
    /// Skip `pad` buffer bytes
    Align { pad: u32 },
    /// Copy a scalar directly to or from the buffer
    Inline {
        var: String,
        c_type: String,
        size: u32,
    },
    /// Call a runtime routine with the descriptor at `type_offset`
    Call {
        family: RoutineFamily,
        var: String,
        type_offset: u32,
    },
}

/// The statements for one pass of one function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallPlan {
    pub pass: Pass,
    pub direction: Direction,
    pub steps: Vec<MarshalStep>,
}

/// Build the call plan for `func`
///
/// `layout` gives the descriptor offsets from the type pass.
pub fn select_calls(
    metrics: &Metrics,
    func: &Function,
    layout: &FunctionLayout,
    pass: Pass,
    direction: Direction,
) -> Result<CallPlan, CodegenError> {
    let vars: Vec<(&Variable, VarLayout)> = match pass {
        Pass::In => func
            .params
            .iter()
            .zip(layout.params.iter().copied())
            .filter(|(v, _)| v.is_in())
            .collect(),
        Pass::Out => func
            .params
            .iter()
            .zip(layout.params.iter().copied())
            .filter(|(v, _)| v.is_out())
            .collect(),
        Pass::Return => layout.ret.map(|l| (&func.ret, l)).into_iter().collect(),
    };

    let mut steps = Vec::new();
    let mut last_size = 0u32;

    for (var, var_layout) in vars {
        let type_offset = var_layout.descriptor_offset();
        let (ty, ptr_level) = var.unwrap_type();
        let call = |family| MarshalStep::Call {
            family,
            var: var.name.clone(),
            type_offset,
        };

        if var.is_string_at(ptr_level) {
            if var.is_multi_dimensional() {
                return Err(CodegenError::MultiDimensionalArray {
                    name: var.name.clone(),
                });
            }
            let family = if !var.array.is_empty() && var.fixed_extent().is_some() {
                RoutineFamily::NonConformantString
            } else {
                RoutineFamily::ConformantString
            };
            steps.push(call(family));
            last_size = 1;
        } else if var.is_array_at(ptr_level) {
            let family = array_family(var, direction, &mut steps)?;
            steps.push(call(family));
            last_size = 1;
        } else if ptr_level == 0 {
            match ty {
                Type::Base(BaseType::Ignore) | Type::BindPrimitive => continue,
                Type::Base(base) => {
                    let size = base_size(*base).unwrap_or(0);
                    let alignment = metrics.alignment(ty, 0);
                    if last_size != 0 && last_size < alignment {
                        steps.push(MarshalStep::Align {
                            pad: alignment - last_size,
                        });
                    }
                    steps.push(MarshalStep::Inline {
                        var: var.name.clone(),
                        c_type: inline_c_type(var, *base),
                        size,
                    });
                    last_size = size;
                }
                Type::Struct(s) => {
                    let family = match s.kind {
                        StructKind::Plain => RoutineFamily::SimpleStruct,
                        StructKind::Conformant => RoutineFamily::ConformantStruct,
                        StructKind::ConformantVarying => RoutineFamily::ConformantVaryingStruct,
                        StructKind::Complex => RoutineFamily::ComplexStruct,
                    };
                    steps.push(call(family));
                    last_size = 1;
                }
                Type::Union(_) => {
                    return Err(CodegenError::UnionUnimplemented {
                        name: var.name.clone(),
                    })
                }
                other => return Err(CodegenError::unsupported(&var.name, other.c_name())),
            }
        } else {
            steps.push(call(RoutineFamily::Pointer));
            last_size = 1;
        }
    }

    Ok(CallPlan {
        pass,
        direction,
        steps,
    })
}

/// C type of an inline buffer slot, matching its wire size
///
/// `enum16` travels as 2 bytes whatever the width of the C enum.
fn inline_c_type(var: &Variable, base: BaseType) -> String {
    match base {
        BaseType::Enum16 => BaseType::Short.c_name().to_string(),
        _ => var.ty.c_name(),
    }
}

/// Pick the array routine, queueing the count assignments it reads
fn array_family(
    var: &Variable,
    direction: Direction,
    steps: &mut Vec<MarshalStep>,
) -> Result<RoutineFamily, CodegenError> {
    if var.is_multi_dimensional() {
        return Ok(RoutineFamily::ComplexArray);
    }

    let has_size = var.has_size();
    let length_is = var.length_is();
    let family = match (has_size, length_is.is_some()) {
        (false, false) => RoutineFamily::FixedArray,
        (false, true) => RoutineFamily::VaryingArray,
        (true, false) => RoutineFamily::ConformantArray,
        (true, true) => RoutineFamily::ConformantVaryingArray,
    };
    if direction == Direction::Unmarshal {
        return Ok(family);
    }

    if has_size {
        let bound = var
            .conformance_expr()
            .ok_or_else(|| CodegenError::MissingBound { name: var.name.clone() })?;
        steps.push(MarshalStep::SetScratch {
            field: ScratchField::MaxCount,
            value: bound.clone(),
        });
    }
    if let Some(length) = length_is {
        steps.push(MarshalStep::SetScratch {
            field: ScratchField::Offset,
            value: Expr::num(0),
        });
        steps.push(MarshalStep::SetScratch {
            field: ScratchField::ActualCount,
            value: length.clone(),
        });
    }
    Ok(family)
}
