//! Declaration nodes: variables, functions and interfaces

use serde::{Deserialize, Serialize};
use crate::{Expr, Type};

/// Pointer attribute: `[ref]`, `[unique]`, `[ptr]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    #[default]
    Ref,
    Unique,
    Full,
}

/// Attribute set of a parameter or field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    #[serde(rename = "in")]
    pub is_in: bool,
    #[serde(rename = "out")]
    pub is_out: bool,
    pub string: bool,
    pub size_is: Option<Expr>,
    pub length_is: Option<Expr>,
    pub pointer_type: Option<PointerKind>,
    pub context_handle: bool,
    pub iid_is: Option<Expr>,
}

impl Attributes {
    pub fn input(mut self) -> Self {
        self.is_in = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.is_out = true;
        self
    }

    pub fn with_string(mut self) -> Self {
        self.string = true;
        self
    }

    pub fn with_size_is(mut self, expr: Expr) -> Self {
        self.size_is = Some(expr);
        self
    }

    pub fn with_length_is(mut self, expr: Expr) -> Self {
        self.length_is = Some(expr);
        self
    }

    pub fn with_pointer_type(mut self, kind: PointerKind) -> Self {
        self.pointer_type = Some(kind);
        self
    }
}

/// A parameter, return slot or structure field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    /// Declared pointer depth: `char **p` is 2
    #[serde(default)]
    pub ptr_level: u32,
    /// Array dimensions, outermost first; empty when not an array
    #[serde(default)]
    pub array: Vec<Expr>,
    #[serde(default)]
    pub attrs: Attributes,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            ptr_level: 0,
            array: Vec::new(),
            attrs: Attributes::default(),
        }
    }

    pub fn with_ptr_level(mut self, ptr_level: u32) -> Self {
        self.ptr_level = ptr_level;
        self
    }

    pub fn with_array(mut self, dims: Vec<Expr>) -> Self {
        self.array = dims;
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    /// Concrete type and effective pointer depth
    ///
    /// Typedefs are followed, and pointers hidden behind them are folded
    /// into the depth.
    pub fn unwrap_type(&self) -> (&Type, u32) {
        let mut ty = &self.ty;
        let mut ptr_level = self.ptr_level;
        loop {
            match ty {
                Type::Alias(alias) => ty = &alias.target,
                Type::Pointer(inner) => {
                    ptr_level += 1;
                    ty = inner;
                }
                _ => return (ty, ptr_level),
            }
        }
    }

    pub fn ptr_depth(&self) -> u32 {
        self.unwrap_type().1
    }

    /// `[in]`, or neither direction given
    pub fn is_in(&self) -> bool {
        self.attrs.is_in || !self.attrs.is_out
    }

    pub fn is_out(&self) -> bool {
        self.attrs.is_out
    }

    pub fn pointer_kind(&self) -> PointerKind {
        self.attrs.pointer_type.unwrap_or_default()
    }

    /// `size_is`, unless empty
    pub fn size_is(&self) -> Option<&Expr> {
        self.attrs.size_is.as_ref().filter(|e| !e.is_void())
    }

    /// `length_is`, unless empty
    pub fn length_is(&self) -> Option<&Expr> {
        self.attrs.length_is.as_ref().filter(|e| !e.is_void())
    }

    /// Constant extent of a one-dimensional array
    pub fn fixed_extent(&self) -> Option<i64> {
        self.array.first().and_then(Expr::const_value)
    }

    pub fn is_multi_dimensional(&self) -> bool {
        self.array.len() > 1
    }

    /// Conformance bound: `size_is`, or the extent when it is not constant
    pub fn conformance_expr(&self) -> Option<&Expr> {
        self.size_is()
            .or_else(|| self.array.first().filter(|e| !e.is_const() && !e.is_void()))
    }

    /// Whether the element count is only known at run time
    pub fn has_size(&self) -> bool {
        self.size_is().is_some() || self.fixed_extent().is_none()
    }

    pub fn is_string(&self) -> bool {
        self.is_string_at(self.ptr_depth())
    }

    pub fn is_array(&self) -> bool {
        self.is_array_at(self.ptr_depth())
    }

    /// String classification once unwound to `ptr_level` indirections
    pub fn is_string_at(&self, ptr_level: u32) -> bool {
        self.attrs.string
            && ((ptr_level == 1 && self.array.is_empty())
                || (ptr_level == 0 && !self.array.is_empty()))
    }

    /// Array classification once unwound to `ptr_level` indirections
    pub fn is_array_at(&self, ptr_level: u32) -> bool {
        (ptr_level == 0 && !self.array.is_empty())
            || (ptr_level == 1
                && self.array.is_empty()
                && (self.size_is().is_some() || self.length_is().is_some()))
    }
}

/// A remote procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Variable>,
    /// Return slot, named after the function
    pub ret: Variable,
}

impl Function {
    pub fn new(name: impl Into<String>, returns: Type, params: Vec<Variable>) -> Self {
        let name = name.into();
        Self {
            ret: Variable::new(name.clone(), returns),
            name,
            params,
        }
    }

    pub fn returns_void(&self) -> bool {
        self.ret.ptr_level == 0 && self.ret.ty.is_void()
    }

    pub fn param(&self, name: &str) -> Option<&Variable> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// An interface: the unit of compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
}

impl Interface {
    pub fn new(name: impl Into<String>, functions: Vec<Function>) -> Self {
        Self {
            name: name.into(),
            functions,
        }
    }
}
