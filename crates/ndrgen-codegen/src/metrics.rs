//! Memory size and alignment of types
//!
//! Sizes are the packed in-memory footprint used by descriptors: structures
//! are the plain sum of their fields. A size of 0 for an array means the
//! extent is only known at run time, not that the value is free.

use ndrgen_ast::{BaseType, Expr, StructKind, Type, Variable};
use serde::Serialize;
use tracing::trace;

use crate::{CodegenConfig, CodegenError};

/// Natural size of a scalar
pub fn base_size(base: BaseType) -> Option<u32> {
    match base {
        BaseType::Byte | BaseType::Char | BaseType::Small | BaseType::USmall => Some(1),
        BaseType::WChar | BaseType::Short | BaseType::UShort | BaseType::Enum16 => Some(2),
        BaseType::Long
        | BaseType::ULong
        | BaseType::ErrorStatus
        | BaseType::Enum32
        | BaseType::Float => Some(4),
        BaseType::Hyper | BaseType::Double => Some(8),
        BaseType::Ignore => None,
    }
}

/// Buffer footprint of a value marshalled inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BufferSize {
    pub size: u32,
    pub alignment: u32,
}

/// Size and alignment queries for one target
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pointer_size: u32,
}

impl Metrics {
    pub fn new(config: &CodegenConfig) -> Self {
        Self {
            pointer_size: config.pointer_size,
        }
    }

    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    pub fn var_memsize(&self, var: &Variable) -> Result<u32, CodegenError> {
        self.memsize(&var.ty, var.ptr_level, &var.array, &var.name)
    }

    /// Size of `ty` behind `ptr_level` indirections, times any constant extent
    pub fn memsize(
        &self,
        ty: &Type,
        ptr_level: u32,
        array: &[Expr],
        name: &str,
    ) -> Result<u32, CodegenError> {
        if ptr_level > 0 {
            return Ok(self.pointer_size);
        }

        let size = match ty {
            Type::Base(base) => base_size(*base).unwrap_or(self.pointer_size),
            Type::Pointer(_) | Type::BindPrimitive => self.pointer_size,
            Type::Alias(alias) => self.memsize(&alias.target, 0, &[], name)?,
            Type::Struct(s) => self.fields_memsize(&s.fields)?,
            Type::Union(u) => self.fields_memsize(&u.fields)?,
            Type::Void => return Err(CodegenError::unsupported(name, "void")),
        };

        let mut total = size;
        for dim in array {
            let Some(extent) = dim.const_value() else {
                trace!(name, "indeterminate size");
                return Ok(0);
            };
            let extent = u32::try_from(extent)
                .map_err(|_| CodegenError::unsupported(name, format!("array extent {}", extent)))?;
            total = total.checked_mul(extent).ok_or_else(|| CodegenError::SizeOverflow {
                what: "memory size",
                name: name.to_string(),
                limit: u32::MAX,
                excess: u64::from(size) * u64::from(extent) - u64::from(u32::MAX),
            })?;
        }
        Ok(total)
    }

    /// Sum of field sizes, in declaration order
    pub fn fields_memsize(&self, fields: &[Variable]) -> Result<u32, CodegenError> {
        fields.iter().try_fold(0u32, |acc, field| {
            let size = self.var_memsize(field)?;
            acc.checked_add(size).ok_or_else(|| CodegenError::SizeOverflow {
                what: "structure size",
                name: field.name.clone(),
                limit: u32::MAX,
                excess: u64::from(acc) + u64::from(size) - u64::from(u32::MAX),
            })
        })
    }

    /// Natural alignment: scalar size capped at 8, pointer width for pointers
    ///
    /// Structures carry no alignment of their own and report 0.
    pub fn alignment(&self, ty: &Type, ptr_level: u32) -> u32 {
        if ptr_level > 0 {
            return self.pointer_size;
        }
        match ty {
            Type::Base(base) => base_size(*base).unwrap_or(self.pointer_size).min(8),
            Type::Pointer(_) | Type::BindPrimitive => self.pointer_size,
            Type::Alias(alias) => self.alignment(&alias.target, 0),
            Type::Struct(_) | Type::Union(_) | Type::Void => 0,
        }
    }

    /// Wire buffer space needed by a variable marshalled without a descriptor
    ///
    /// Anything needing a runtime descriptor reports 0.
    pub fn required_buffer_size(&self, var: &Variable) -> Result<BufferSize, CodegenError> {
        self.buffer_size_of(&var.ty, var.ptr_level, &var.array, &var.name)
    }

    fn buffer_size_of(
        &self,
        ty: &Type,
        ptr_level: u32,
        array: &[Expr],
        name: &str,
    ) -> Result<BufferSize, CodegenError> {
        if ptr_level > 0 || !array.is_empty() {
            return Ok(BufferSize::default());
        }
        match ty {
            Type::Base(BaseType::Ignore) | Type::BindPrimitive => Ok(BufferSize::default()),
            Type::Base(base) => {
                let size = base_size(*base).unwrap_or(0);
                Ok(BufferSize {
                    size,
                    alignment: size.min(8),
                })
            }
            Type::Alias(alias) => self.buffer_size_of(&alias.target, 0, array, name),
            Type::Struct(s) if s.kind == StructKind::Plain => {
                let mut size = 0;
                for field in &s.fields {
                    size += self
                        .buffer_size_of(&field.ty, field.ptr_level, &field.array, &field.name)?
                        .size;
                }
                Ok(BufferSize { size, alignment: 0 })
            }
            Type::Pointer(_) => Ok(BufferSize::default()),
            other => Err(CodegenError::unsupported(name, other.c_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndrgen_ast::{Attributes, StructType};

    fn metrics() -> Metrics {
        Metrics::new(&CodegenConfig::default())
    }

    fn base(b: BaseType) -> Type {
        Type::Base(b)
    }

    #[test]
    fn test_scalar_sizes() {
        let m = metrics();
        assert_eq!(m.memsize(&base(BaseType::Char), 0, &[], "c"), Ok(1));
        assert_eq!(m.memsize(&base(BaseType::WChar), 0, &[], "w"), Ok(2));
        assert_eq!(m.memsize(&base(BaseType::Enum32), 0, &[], "e"), Ok(4));
        assert_eq!(m.memsize(&base(BaseType::Double), 0, &[], "d"), Ok(8));
    }

    #[test]
    fn test_pointer_is_pointer_width() {
        let m = metrics();
        assert_eq!(m.memsize(&base(BaseType::Hyper), 1, &[], "p"), Ok(4));
        let wide = Metrics::new(&CodegenConfig::with_pointer_size(8));
        assert_eq!(wide.memsize(&base(BaseType::Char), 2, &[], "p"), Ok(8));
    }

    #[test]
    fn test_constant_extent_multiplies() {
        let m = metrics();
        assert_eq!(m.memsize(&base(BaseType::Short), 0, &[Expr::num(10)], "a"), Ok(20));
    }

    #[test]
    fn test_runtime_extent_is_indeterminate() {
        let m = metrics();
        assert_eq!(m.memsize(&base(BaseType::Long), 0, &[Expr::ident("n")], "a"), Ok(0));
        assert_eq!(m.memsize(&base(BaseType::Long), 0, &[Expr::Void], "a"), Ok(0));
    }

    #[test]
    fn test_struct_is_sum_of_fields() {
        let s = StructType::new(
            "s",
            vec![
                Variable::new("c", base(BaseType::Char)),
                Variable::new("l", base(BaseType::Long)),
                Variable::new("p", base(BaseType::Long)).with_ptr_level(1),
            ],
        );
        assert_eq!(metrics().memsize(&Type::Struct(s), 0, &[], "s"), Ok(9));
    }

    #[test]
    fn test_alignment() {
        let m = metrics();
        assert_eq!(m.alignment(&base(BaseType::Char), 0), 1);
        assert_eq!(m.alignment(&base(BaseType::Hyper), 0), 8);
        assert_eq!(m.alignment(&base(BaseType::Char), 1), 4);
        let s = StructType::new("s", vec![Variable::new("d", base(BaseType::Double))]);
        assert_eq!(m.alignment(&Type::Struct(s), 0), 0);
    }

    #[test]
    fn test_void_has_no_size() {
        let err = metrics().memsize(&Type::Void, 0, &[], "v").unwrap_err();
        assert_eq!(err.code(), "E-NDR-001");
    }

    #[test]
    fn test_required_buffer_size() {
        let m = metrics();
        let long = Variable::new("l", base(BaseType::Long));
        assert_eq!(
            m.required_buffer_size(&long),
            Ok(BufferSize { size: 4, alignment: 4 })
        );

        let alias = Variable::new("a", Type::alias("WORD", base(BaseType::UShort)));
        assert_eq!(m.required_buffer_size(&alias).map(|b| b.size), Ok(2));

        let arr = Variable::new("arr", base(BaseType::Char))
            .with_ptr_level(1)
            .with_attrs(Attributes::default().with_size_is(Expr::ident("n")));
        assert_eq!(m.required_buffer_size(&arr), Ok(BufferSize::default()));

        let point = StructType::new(
            "point",
            vec![
                Variable::new("x", base(BaseType::Short)),
                Variable::new("y", base(BaseType::Hyper)),
            ],
        );
        let pv = Variable::new("pt", Type::Struct(point));
        assert_eq!(m.required_buffer_size(&pv).map(|b| b.size), Ok(10));
    }
}
