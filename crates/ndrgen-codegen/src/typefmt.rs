//! Type format string emission
//!
//! Each variable is encoded as a tree of descriptor units. Units that
//! reference other units do so backwards, by a signed delta from the
//! position of the offset field itself, so the stream stays
//! position-independent. Member descriptors are always emitted before the
//! header that refers to them.

use ndrgen_ast::{BaseType, Interface, StructKind, StructType, Type, Variable};
use serde::Serialize;
use tracing::{debug, trace};

use crate::sink::{FormatItem, FormatSink, SizeCounter};
use crate::{CodegenError, Fc, FormatCompiler, Scope, FC_SIMPLE_POINTER};

/// Bytes reserved at the start of the type format string
pub const TYPE_FORMAT_HEADER_SIZE: u32 = 2;

/// Largest size carried by a 16-bit size field
const SHORT_LIMIT: u32 = 0xFFFF;

/// Where one variable's descriptors landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VarLayout {
    /// First byte emitted for the variable
    pub start: u32,
    /// Descriptor a directive or call should reference; `None` for scalars
    pub root: Option<u32>,
    /// Bytes emitted
    pub size: u32,
}

impl VarLayout {
    /// Offset handed to runtime routines
    pub fn descriptor_offset(&self) -> u32 {
        self.root.unwrap_or(self.start)
    }
}

/// Layouts of a function's parameters and return value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionLayout {
    pub params: Vec<VarLayout>,
    pub ret: Option<VarLayout>,
}

impl FormatCompiler {
    /// Write the whole type format string for `iface`
    pub fn write_type_format<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        iface: &Interface,
    ) -> Result<Vec<FunctionLayout>, CodegenError> {
        sink.put(FormatItem::Short(0));

        let mut layouts = Vec::with_capacity(iface.functions.len());
        for func in &iface.functions {
            let scope = Scope::function(func);
            let mut layout = FunctionLayout::default();
            for param in &func.params {
                layout.params.push(self.emit_var(sink, scope, param)?);
            }
            if !func.returns_void() {
                layout.ret = Some(self.emit_var(sink, scope, &func.ret)?);
            }
            layouts.push(layout);
        }
        Ok(layouts)
    }

    fn emit_var<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
    ) -> Result<VarLayout, CodegenError> {
        let start = sink.offset();
        let root = self.write_type_format_var(sink, scope, var)?;
        Ok(VarLayout {
            start,
            root,
            size: sink.offset() - start,
        })
    }

    /// Where `var`'s descriptors would land if emitted at `at`
    ///
    /// Runs the real emitter into a counting sink.
    pub fn type_format_layout(
        &mut self,
        scope: Scope<'_>,
        var: &Variable,
        at: u32,
    ) -> Result<VarLayout, CodegenError> {
        let mut counter = SizeCounter::starting_at(at);
        let layout = self.emit_var(&mut counter, scope, var)?;
        trace!(name = %var.name, at, size = layout.size, "sized type format");
        Ok(layout)
    }

    /// Bytes `var` occupies in the type format string
    pub fn type_format_size(&mut self, scope: Scope<'_>, var: &Variable) -> Result<u32, CodegenError> {
        Ok(self.type_format_layout(scope, var, 0)?.size)
    }

    /// Emit the descriptors of one variable, returning the root offset
    ///
    /// Scalars, `ignore` and binding primitives have no descriptor.
    pub fn write_type_format_var<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
    ) -> Result<Option<u32>, CodegenError> {
        let (ty, ptr_level) = var.unwrap_type();
        self.write_var_shape(sink, scope, var, ty, ptr_level)
    }

    fn write_var_shape<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
        ty: &Type,
        ptr_level: u32,
    ) -> Result<Option<u32>, CodegenError> {
        if var.is_string_at(ptr_level) {
            return self.write_string(sink, scope, var, ty).map(Some);
        }
        if var.is_array_at(ptr_level) {
            return self.write_array(sink, scope, var, ty).map(Some);
        }

        if ptr_level == 0 {
            return match ty {
                Type::Base(_) | Type::BindPrimitive => Ok(None),
                Type::Struct(s) => self.write_struct(sink, scope, s, &var.name).map(Some),
                Type::Union(_) => Err(CodegenError::UnionUnimplemented {
                    name: var.name.clone(),
                }),
                Type::Alias(alias) => self.write_var_shape(sink, scope, var, &alias.target, 0),
                Type::Pointer(inner) => self.write_var_shape(sink, scope, var, inner, 1),
                Type::Void => Err(CodegenError::unsupported(&var.name, "void")),
            };
        }

        let kind = Fc::pointer(var.pointer_kind());
        let start = sink.offset();

        if ptr_level == 1 {
            if let Type::Base(base) = ty {
                sink.put(FormatItem::Tag(kind));
                sink.put(FormatItem::Byte(FC_SIMPLE_POINTER));
                sink.put(FormatItem::Code(Fc::base(*base)));
                sink.put(FormatItem::Code(Fc::Pad));
                if !sink.is_dry() {
                    debug!(offset = start, name = %var.name, pointer = kind.name(), "simple pointer");
                }
                return Ok(Some(start));
            }
        }

        // Indirect pointees open with their own descriptor; a value pointee's
        // root may sit past its tail descriptors, so it is sized first
        let pointee = if ptr_level > 1 {
            Some(start + 4)
        } else {
            let mut probe = SizeCounter::starting_at(start + 4);
            self.write_var_shape(&mut probe, scope, var, ty, 0)?
        };
        let delta = match pointee {
            Some(root) => relative_offset(root, start + 2, &var.name)?,
            None => 2,
        };

        sink.put(FormatItem::Tag(kind));
        sink.put(FormatItem::Byte(0));
        sink.put(FormatItem::Offset(delta));
        if !sink.is_dry() {
            debug!(offset = start, name = %var.name, pointer = kind.name(), delta, "pointer");
        }

        let emitted = self.write_var_shape(sink, scope, var, ty, ptr_level - 1)?;
        if emitted != pointee {
            return Err(CodegenError::Invariant {
                message: format!(
                    "pointee of '{}' landed at {:?}, sized at {:?}",
                    var.name, emitted, pointee
                ),
            });
        }
        Ok(Some(start))
    }

    fn write_string<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
        ty: &Type,
    ) -> Result<u32, CodegenError> {
        if var.is_multi_dimensional() {
            return Err(CodegenError::MultiDimensionalArray {
                name: var.name.clone(),
            });
        }
        let wide = match ty {
            Type::Base(base) if base.is_char() => *base != BaseType::Char,
            other => {
                return Err(CodegenError::UnsupportedStringType {
                    name: var.name.clone(),
                    ty: other.c_name(),
                })
            }
        };
        let start = sink.offset();

        if let (false, Some(count)) = (var.array.is_empty(), var.fixed_extent()) {
            let count = extent_field(count, "string size", &var.name)?;
            sink.put(FormatItem::Tag(if wide { Fc::WString } else { Fc::CString }));
            sink.put(FormatItem::Code(Fc::Pad));
            sink.put(FormatItem::Short(count));
            if !sink.is_dry() {
                debug!(offset = start, name = %var.name, count, "fixed string");
            }
            return Ok(start);
        }

        let tag = if wide { Fc::CWString } else { Fc::CCString };
        sink.put(FormatItem::Tag(tag));
        if let Some(size_is) = var.size_is() {
            sink.put(FormatItem::Code(Fc::StringSized));
            self.write_conf_or_var_desc(sink, scope, size_is)?;
        } else {
            sink.put(FormatItem::Code(Fc::Pad));
        }
        if !sink.is_dry() {
            debug!(offset = start, name = %var.name, sized = var.size_is().is_some(), "conformant string");
        }
        Ok(start)
    }

    fn write_array<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
        ty: &Type,
    ) -> Result<u32, CodegenError> {
        if var.is_multi_dimensional() {
            return Err(CodegenError::MultiDimensionalArray {
                name: var.name.clone(),
            });
        }

        let name = &var.name;
        let has_length = var.length_is().is_some();
        let has_size = var.has_size();
        let start = sink.offset();

        match (has_size, has_length) {
            (false, false) => {
                let total = self.metrics.memsize(ty, 0, &var.array, name)?;
                if total < SHORT_LIMIT {
                    sink.put(FormatItem::Tag(Fc::SmFArray));
                    sink.put(FormatItem::Byte(0));
                    sink.put(FormatItem::Short(total as u16));
                } else {
                    sink.put(FormatItem::Tag(Fc::LgFArray));
                    sink.put(FormatItem::Byte(0));
                    sink.put(FormatItem::Long(total));
                }
                if !sink.is_dry() {
                    debug!(offset = start, name = %name, total, "fixed array");
                }
            }
            (false, true) => {
                let element_size = self.metrics.memsize(ty, 0, &[], name)?;
                let elements = match var.fixed_extent() {
                    Some(n) => u32::try_from(n)
                        .map_err(|_| CodegenError::unsupported(name, format!("array extent {}", n)))?,
                    None => return Err(CodegenError::MissingBound { name: name.clone() }),
                };
                let total = element_size.checked_mul(elements).ok_or_else(|| CodegenError::SizeOverflow {
                    what: "array size",
                    name: name.clone(),
                    limit: u32::MAX,
                    excess: u64::from(element_size) * u64::from(elements) - u64::from(u32::MAX),
                })?;
                if total < SHORT_LIMIT {
                    sink.put(FormatItem::Tag(Fc::SmVArray));
                    sink.put(FormatItem::Byte(0));
                    sink.put(FormatItem::Short(total as u16));
                    sink.put(FormatItem::Short(short_field(elements, "element count", name)?));
                } else {
                    sink.put(FormatItem::Tag(Fc::LgVArray));
                    sink.put(FormatItem::Byte(0));
                    sink.put(FormatItem::Long(total));
                    sink.put(FormatItem::Long(elements));
                }
                sink.put(FormatItem::Short(short_field(element_size, "element size", name)?));
                self.write_variance(sink, scope, var)?;
                if !sink.is_dry() {
                    debug!(offset = start, name = %name, total, elements, "varying array");
                }
            }
            (true, _) => {
                let element_size = self.metrics.memsize(ty, 0, &[], name)?;
                let bound = var
                    .conformance_expr()
                    .ok_or_else(|| CodegenError::MissingBound { name: name.clone() })?;
                sink.put(FormatItem::Tag(if has_length { Fc::CvArray } else { Fc::CArray }));
                sink.put(FormatItem::Byte(0));
                sink.put(FormatItem::Short(short_field(element_size, "element size", name)?));
                self.write_conf_or_var_desc(sink, scope, bound)?;
                if has_length {
                    self.write_variance(sink, scope, var)?;
                }
                if !sink.is_dry() {
                    debug!(offset = start, name = %name, element_size, varying = has_length, "conformant array");
                }
            }
        }

        sink.put(FormatItem::Byte(0));
        sink.put(FormatItem::Code(Fc::End));
        Ok(start)
    }

    fn write_variance<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        var: &Variable,
    ) -> Result<u32, CodegenError> {
        let length_is = var
            .length_is()
            .ok_or_else(|| CodegenError::MissingBound { name: var.name.clone() })?;
        self.write_conf_or_var_desc(sink, scope, length_is)
    }

    fn write_struct<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        structure: &StructType,
        name: &str,
    ) -> Result<u32, CodegenError> {
        let inferred = StructKind::infer(&structure.fields);
        if structure.kind != inferred {
            return Err(CodegenError::Invariant {
                message: format!(
                    "structure '{}' is declared {:?} but its fields make it {:?}",
                    structure.name, structure.kind, inferred
                ),
            });
        }

        let tag = match structure.kind {
            StructKind::Plain => Fc::Struct,
            StructKind::Conformant => Fc::CStruct,
            StructKind::ConformantVarying => Fc::CvStruct,
            StructKind::Complex => {
                return Err(CodegenError::StructUnimplemented {
                    name: name.to_string(),
                    structure: structure.name.clone(),
                    kind: "complex".to_string(),
                })
            }
        };

        let total = self.metrics.fields_memsize(&structure.fields)?;
        if total > SHORT_LIMIT {
            return Err(CodegenError::SizeOverflow {
                what: "structure size",
                name: name.to_string(),
                limit: SHORT_LIMIT,
                excess: u64::from(total - SHORT_LIMIT),
            });
        }

        if tag == Fc::Struct {
            let start = sink.offset();
            sink.put(FormatItem::Tag(tag));
            sink.put(FormatItem::Byte(0));
            sink.put(FormatItem::Short(total as u16));
            sink.put(FormatItem::Byte(0));
            sink.put(FormatItem::Code(Fc::End));
            if !sink.is_dry() {
                debug!(offset = start, structure = %structure.name, total, "plain structure");
            }
            return Ok(start);
        }

        // Tail descriptor first; the header points back at it
        let (owner, tail) = find_array_or_string(structure)?;
        let inner = scope.within(owner);
        let (tail_ty, tail_ptr_level) = tail.unwrap_type();
        let tail_start = if tail.is_string_at(tail_ptr_level) {
            self.write_string(sink, inner, tail, tail_ty)?
        } else {
            self.write_array(sink, inner, tail, tail_ty)?
        };

        let start = sink.offset();
        sink.put(FormatItem::Tag(tag));
        sink.put(FormatItem::Byte(0));
        sink.put(FormatItem::Short(total as u16));
        let delta = relative_offset(tail_start, sink.offset(), name)?;
        sink.put(FormatItem::Offset(delta));
        sink.put(FormatItem::Code(Fc::End));
        if !sink.is_dry() {
            debug!(
                offset = start,
                structure = %structure.name,
                total,
                tail = %tail.name,
                delta,
                "conformant structure"
            );
        }
        Ok(start)
    }
}

/// The variable-length field at the end of `structure`, with its owner
///
/// A trailing field that is itself a conformant structure is searched
/// recursively.
pub fn find_array_or_string(structure: &StructType) -> Result<(&StructType, &Variable), CodegenError> {
    let last = structure.trailing_field().ok_or_else(|| CodegenError::Invariant {
        message: format!("structure '{}' has no fields", structure.name),
    })?;
    if last.is_array() || last.is_string() {
        return Ok((structure, last));
    }
    match last.unwrap_type() {
        (Type::Struct(inner), 0)
            if matches!(inner.kind, StructKind::Conformant | StructKind::ConformantVarying) =>
        {
            find_array_or_string(inner)
        }
        _ => Err(CodegenError::Invariant {
            message: format!("structure '{}' has no variable-length tail", structure.name),
        }),
    }
}

/// Delta stored at `field` so that `field + delta == target`
fn relative_offset(target: u32, field: u32, name: &str) -> Result<i16, CodegenError> {
    let delta = i64::from(target) - i64::from(field);
    i16::try_from(delta).map_err(|_| CodegenError::SizeOverflow {
        what: "relative offset",
        name: name.to_string(),
        limit: i16::MAX as u32,
        excess: delta.unsigned_abs() - i16::MAX as u64,
    })
}

fn short_field(value: u32, what: &'static str, name: &str) -> Result<u16, CodegenError> {
    u16::try_from(value).map_err(|_| CodegenError::SizeOverflow {
        what,
        name: name.to_string(),
        limit: SHORT_LIMIT,
        excess: u64::from(value - SHORT_LIMIT),
    })
}

fn extent_field(value: i64, what: &'static str, name: &str) -> Result<u16, CodegenError> {
    if value < 0 {
        return Err(CodegenError::unsupported(name, format!("array extent {}", value)));
    }
    u16::try_from(value).map_err(|_| CodegenError::SizeOverflow {
        what,
        name: name.to_string(),
        limit: SHORT_LIMIT,
        excess: value as u64 - u64::from(SHORT_LIMIT),
    })
}
