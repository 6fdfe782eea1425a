//! Type representations in an IDL interface

use serde::{Deserialize, Serialize};
use crate::Variable;

/// A type node
///
/// Pointer depth, array dimensions and `[string]` decorations of a
/// declaration live on the [`Variable`] that owns the type; `Pointer` only
/// appears behind aliases such as `typedef char *PSTR`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// `void`, only meaningful as a return type
    Void,

    /// Scalar: `long`, `wchar_t`, `double`
    Base(BaseType),

    /// Pointer hidden behind a typedef
    Pointer(Box<Type>),

    /// Structure: `struct s { ... }`
    Struct(StructType),

    /// Union (never encoded)
    Union(UnionType),

    /// Typedef: `typedef long LONG`
    Alias(Alias),

    /// `handle_t` binding primitive
    BindPrimitive,
}

/// Scalar kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Byte,
    Char,
    Small,
    #[serde(rename = "usmall")]
    USmall,
    #[serde(rename = "wchar")]
    WChar,
    Short,
    #[serde(rename = "ushort")]
    UShort,
    Long,
    #[serde(rename = "ulong")]
    ULong,
    Hyper,
    Float,
    Double,
    Enum16,
    Enum32,
    #[serde(rename = "error_status_t")]
    ErrorStatus,
    Ignore,
}

impl BaseType {
    /// C spelling used in generated stubs
    pub fn c_name(&self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Small => "small",
            BaseType::USmall => "unsigned small",
            BaseType::WChar => "WCHAR",
            BaseType::Short => "short",
            BaseType::UShort => "unsigned short",
            BaseType::Long => "long",
            BaseType::ULong => "unsigned long",
            BaseType::Hyper => "hyper",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Enum16 | BaseType::Enum32 => "int",
            BaseType::ErrorStatus => "error_status_t",
            BaseType::Ignore => "void *",
        }
    }

    /// Character types that may carry `[string]`
    pub fn is_char(&self) -> bool {
        matches!(self, BaseType::Char | BaseType::WChar)
    }
}

/// Structure layout class, as assigned by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructKind {
    /// Fixed size, no pointers
    Plain,
    /// Ends in a conformant array
    Conformant,
    /// Ends in a conformant varying array or a string
    ConformantVarying,
    /// Everything else (bogus structure)
    Complex,
}

/// A structure declaration with fields in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub kind: StructKind,
    pub fields: Vec<Variable>,
}

impl StructType {
    /// Build a structure, classifying its layout from the fields
    pub fn new(name: impl Into<String>, fields: Vec<Variable>) -> Self {
        let kind = StructKind::infer(&fields);
        Self {
            name: name.into(),
            kind,
            fields,
        }
    }

    /// The field adjacent to the variable-length tail (the last declared one)
    pub fn trailing_field(&self) -> Option<&Variable> {
        self.fields.last()
    }

    pub fn field(&self, name: &str) -> Option<&Variable> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl StructKind {
    /// Classify a field list the way the front end does
    pub fn infer(fields: &[Variable]) -> Self {
        let complex = fields.iter().any(|f| {
            let (ty, ptr_level) = f.unwrap_type();
            (ptr_level > 0 && !f.is_array() && !f.is_string())
                || matches!(ty, Type::Union(_))
                || matches!(ty, Type::Struct(s) if s.kind == StructKind::Complex)
        });
        if complex {
            return StructKind::Complex;
        }

        let Some(last) = fields.last() else {
            return StructKind::Plain;
        };

        // Only the trailing field may be variable-length
        let leading_conformant = fields[..fields.len() - 1].iter().any(|f| {
            f.is_string() || (f.is_array() && (f.has_size() || f.length_is().is_some()))
        });
        if leading_conformant {
            return StructKind::Complex;
        }

        if last.is_string() {
            return StructKind::ConformantVarying;
        }
        if last.is_array() {
            return match (last.has_size(), last.length_is().is_some()) {
                (true, true) => StructKind::ConformantVarying,
                (true, false) => StructKind::Conformant,
                (false, true) => StructKind::Complex,
                (false, false) => StructKind::Plain,
            };
        }
        match last.unwrap_type() {
            (Type::Struct(inner), 0) => match inner.kind {
                StructKind::Conformant => StructKind::Conformant,
                StructKind::ConformantVarying => StructKind::ConformantVarying,
                _ => StructKind::Plain,
            },
            _ => StructKind::Plain,
        }
    }
}

/// A union declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionType {
    pub name: String,
    #[serde(default)]
    pub encapsulated: bool,
    pub fields: Vec<Variable>,
}

/// A typedef
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub target: Box<Type>,
}

impl Type {
    pub fn alias(name: impl Into<String>, target: Type) -> Self {
        Type::Alias(Alias {
            name: name.into(),
            target: Box::new(target),
        })
    }

    /// Follow typedefs until a concrete type is reached
    pub fn resolve_alias(&self) -> &Type {
        let mut ty = self;
        while let Type::Alias(alias) = ty {
            ty = &alias.target;
        }
        ty
    }

    pub fn is_void(&self) -> bool {
        matches!(self.resolve_alias(), Type::Void)
    }

    /// Name used in diagnostics and generated C
    pub fn c_name(&self) -> String {
        match self {
            Type::Void => "void".to_string(),
            Type::Base(base) => base.c_name().to_string(),
            Type::Pointer(inner) => format!("{} *", inner.c_name()),
            Type::Struct(s) => format!("struct {}", s.name),
            Type::Union(u) => format!("union {}", u.name),
            Type::Alias(alias) => alias.name.clone(),
            Type::BindPrimitive => "handle_t".to_string(),
        }
    }
}
