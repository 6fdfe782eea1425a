//! Conformance and variance descriptors
//!
//! A bound expression becomes a 4-byte correlation descriptor:
//!
//! ```text
//! constant:   0x40 | value[23:16] | value[15:0]
//! identifier: kind | scalar tag, operator, i16 offset
//! callback:   0x00, FC_CALLBACK, u16 routine index
//! ```
//!
//! Field offsets are negative, measured back from the end of the fixed part
//! of the structure. Parameter offsets count pointer-sized stack slots.

use ndrgen_ast::{BaseType, BinaryOp, Expr, Type, UnaryOp, Variable};
use tracing::{debug, trace, warn};

use crate::sink::{FormatItem, FormatSink};
use crate::{
    CodegenError, Fc, FormatCompiler, Scope, FC_CONSTANT_CONFORMANCE, FC_NORMAL_CONFORMANCE,
    FC_TOP_LEVEL_CONFORMANCE,
};

/// Largest constant a correlation descriptor can carry: 8 high bits, 16 low bits
pub const MAX_CONSTANT_CONFORMANCE: i64 = 0xFF * 0x1_0000 + 0xFFFF;

/// Size of every correlation descriptor
pub const CORRELATION_DESC_SIZE: u32 = 4;

/// Where a correlated identifier was found
struct Correlation<'v> {
    kind: u8,
    var: &'v Variable,
    offset: i16,
}

impl FormatCompiler {
    /// Encode `expr` as a correlation descriptor
    ///
    /// Always writes 4 bytes. Expressions that are neither constant nor a
    /// (possibly folded) identifier are registered as callbacks, which is
    /// idempotent, so sizing and real passes may both call this.
    pub fn write_conf_or_var_desc<S: FormatSink + ?Sized>(
        &mut self,
        sink: &mut S,
        scope: Scope<'_>,
        expr: &Expr,
    ) -> Result<u32, CodegenError> {
        if let Some(value) = expr.const_value() {
            if !(0..=MAX_CONSTANT_CONFORMANCE).contains(&value) {
                return Err(CodegenError::ConstantOutOfRange {
                    value,
                    max: MAX_CONSTANT_CONFORMANCE,
                });
            }
            sink.put(FormatItem::Byte(FC_CONSTANT_CONFORMANCE));
            sink.put(FormatItem::Byte((value >> 16) as u8));
            sink.put(FormatItem::Short((value & 0xFFFF) as u16));
            if !sink.is_dry() {
                debug!(value, "correlation: constant");
            }
            return Ok(CORRELATION_DESC_SIZE);
        }

        let (operator, subexpr) = fold_operator(expr);

        if let Expr::Ident(ident) = subexpr {
            let found = self.locate(scope, ident)?;
            let scalar = correlation_scalar(found.var, ident)?;
            sink.put(FormatItem::Byte(found.kind | scalar.byte()));
            sink.put(FormatItem::Byte(operator.map_or(0, Fc::byte)));
            sink.put(FormatItem::Offset(found.offset));
            if sink.is_dry() {
                trace!(ident = %ident, "sized correlation descriptor");
            } else {
                debug!(
                    ident = %ident,
                    scalar = scalar.name(),
                    operator = operator.map_or("none", Fc::name),
                    offset = found.offset,
                    "correlation: identifier"
                );
            }
            return Ok(CORRELATION_DESC_SIZE);
        }

        let Some(structure) = scope.structure else {
            return Err(CodegenError::TopLevelCallback {
                func: scope.func.map(|f| f.name.clone()).unwrap_or_default(),
            });
        };
        let index = self.callbacks.register(structure, expr, &self.metrics)?;
        sink.put(FormatItem::Byte(FC_NORMAL_CONFORMANCE));
        sink.put(FormatItem::Code(Fc::Callback));
        sink.put(FormatItem::Short(index));
        if !sink.is_dry() {
            debug!(index, structure = %structure.name, "correlation: callback");
        }
        Ok(CORRELATION_DESC_SIZE)
    }

    fn locate<'v>(&self, scope: Scope<'v>, ident: &str) -> Result<Correlation<'v>, CodegenError> {
        if let Some(structure) = scope.structure {
            // Walk back from the tail so the offset lands on the field start
            let mut offset: i64 = 0;
            for field in structure.fields.iter().rev() {
                offset -= i64::from(self.metrics.var_memsize(field)?);
                if field.name == ident {
                    return Ok(Correlation {
                        kind: FC_NORMAL_CONFORMANCE,
                        var: field,
                        offset: to_offset(offset, ident)?,
                    });
                }
            }
        } else if let Some(func) = scope.func {
            let slot = self.metrics.pointer_size();
            for (index, param) in func.params.iter().enumerate() {
                if param.name == ident {
                    let offset = index as i64 * i64::from(slot);
                    return Ok(Correlation {
                        kind: FC_TOP_LEVEL_CONFORMANCE,
                        var: param,
                        offset: to_offset(offset, ident)?,
                    });
                }
                if self.metrics.var_memsize(param).map_or(false, |size| size > slot) {
                    warn!(
                        func = %func.name,
                        param = %param.name,
                        "parameter is wider than a stack slot; correlation offset assumes {} bytes",
                        slot
                    );
                }
            }
        }

        Err(CodegenError::UnresolvedIdentifier {
            ident: ident.to_string(),
            scope: scope.describe(),
        })
    }
}

/// Peel one folded operator off the top of `expr`
fn fold_operator(expr: &Expr) -> (Option<Fc>, &Expr) {
    match expr {
        Expr::Unary {
            op: UnaryOp::Deref,
            operand,
        } => (Some(Fc::Dereference), operand),
        Expr::Binary { op, left, right } => {
            let folded = match (op, right.const_value()) {
                (BinaryOp::Div, Some(2)) => Fc::Div2,
                (BinaryOp::Mul, Some(2)) => Fc::Mult2,
                (BinaryOp::Sub, Some(1)) => Fc::Sub1,
                (BinaryOp::Add, Some(1)) => Fc::Add1,
                _ => return (None, expr),
            };
            (Some(folded), left)
        }
        _ => (None, expr),
    }
}

/// Scalar tag embedded in the first descriptor byte
fn correlation_scalar(var: &Variable, ident: &str) -> Result<Fc, CodegenError> {
    let (ty, _) = var.unwrap_type();
    match ty {
        Type::Base(BaseType::Char | BaseType::Small) => Ok(Fc::Small),
        Type::Base(BaseType::Byte | BaseType::USmall) => Ok(Fc::USmall),
        Type::Base(BaseType::WChar | BaseType::Short) => Ok(Fc::Short),
        Type::Base(BaseType::UShort) => Ok(Fc::UShort),
        Type::Base(BaseType::Long) => Ok(Fc::Long),
        Type::Base(BaseType::ULong) => Ok(Fc::ULong),
        other => Err(CodegenError::UnsupportedCorrelationType {
            ident: ident.to_string(),
            ty: other.c_name(),
        }),
    }
}

fn to_offset(offset: i64, ident: &str) -> Result<i16, CodegenError> {
    i16::try_from(offset).map_err(|_| CodegenError::SizeOverflow {
        what: "correlation offset",
        name: ident.to_string(),
        limit: i16::MAX as u32,
        excess: offset.unsigned_abs() - i16::MAX as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FormatBuffer, SizeCounter};
    use crate::CodegenConfig;
    use ndrgen_ast::{Attributes, Function, StructType};

    fn compiler() -> FormatCompiler {
        FormatCompiler::new(&CodegenConfig::default())
    }

    fn scalar(name: &str, base: BaseType) -> Variable {
        Variable::new(name, Type::Base(base))
    }

    fn encode(scope: Scope<'_>, expr: &Expr) -> Result<Vec<u8>, CodegenError> {
        let mut compiler = compiler();
        let mut buffer = FormatBuffer::new();
        let written = compiler.write_conf_or_var_desc(&mut buffer, scope, expr)?;
        assert_eq!(written, 4);
        Ok(buffer.bytes())
    }

    fn sized_buffer_fn() -> Function {
        Function::new(
            "f",
            Type::Void,
            vec![
                scalar("n", BaseType::Long),
                Variable::new("buf", Type::Base(BaseType::Char))
                    .with_ptr_level(1)
                    .with_attrs(Attributes::default().with_size_is(Expr::ident("n"))),
                scalar("m", BaseType::UShort),
            ],
        )
    }

    fn counted() -> StructType {
        StructType::new(
            "counted",
            vec![
                scalar("n", BaseType::Long),
                scalar("pad", BaseType::Short),
                scalar("data", BaseType::Char)
                    .with_array(vec![Expr::Void])
                    .with_attrs(Attributes::default().with_size_is(Expr::ident("n"))),
            ],
        )
    }

    #[test]
    fn test_constant_at_16_bit_boundary() {
        let bytes = encode(Scope::default(), &Expr::num(65535)).unwrap();
        assert_eq!(bytes, vec![0x40, 0x00, 0xff, 0xff]);
    }

    #[test]
    fn test_largest_constant() {
        let bytes = encode(Scope::default(), &Expr::num(MAX_CONSTANT_CONFORMANCE)).unwrap();
        assert_eq!(bytes, vec![0x40, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_constant_out_of_range() {
        let err = encode(Scope::default(), &Expr::num(MAX_CONSTANT_CONFORMANCE + 1)).unwrap_err();
        assert_eq!(err.code(), "E-NDR-008");
        let err = encode(Scope::default(), &Expr::num(-1)).unwrap_err();
        assert_eq!(err.code(), "E-NDR-008");
    }

    #[test]
    fn test_folded_constant_expression() {
        let expr = Expr::binary(BinaryOp::Mul, Expr::num(4), Expr::num(8));
        assert_eq!(encode(Scope::default(), &expr).unwrap(), vec![0x40, 0x00, 0x20, 0x00]);
    }

    #[test]
    fn test_parameter_correlation() {
        let f = sized_buffer_fn();
        let bytes = encode(Scope::function(&f), &Expr::ident("n")).unwrap();
        assert_eq!(bytes, vec![0x28, 0x00, 0x00, 0x00]);

        let bytes = encode(Scope::function(&f), &Expr::ident("m")).unwrap();
        assert_eq!(bytes, vec![0x27, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn test_parameter_slots_follow_pointer_size() {
        let f = sized_buffer_fn();
        let mut compiler = FormatCompiler::new(&CodegenConfig::with_pointer_size(8));
        let mut buffer = FormatBuffer::new();
        compiler
            .write_conf_or_var_desc(&mut buffer, Scope::function(&f), &Expr::ident("m"))
            .unwrap();
        assert_eq!(buffer.bytes(), vec![0x27, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn test_field_correlation_with_sub_1() {
        let f = Function::new("f", Type::Void, vec![]);
        let s = counted();
        let expr = Expr::binary(BinaryOp::Sub, Expr::ident("n"), Expr::num(1));
        let bytes = encode(Scope::function(&f).within(&s), &expr).unwrap();
        // normal | long, SUB_1, -6
        assert_eq!(bytes, vec![0x08, 0x58, 0xfa, 0xff]);
    }

    #[test]
    fn test_folded_operators() {
        let f = sized_buffer_fn();
        let scope = Scope::function(&f);
        let cases = [
            (Expr::deref(Expr::ident("n")), 0x54),
            (Expr::binary(BinaryOp::Div, Expr::ident("n"), Expr::num(2)), 0x55),
            (Expr::binary(BinaryOp::Mul, Expr::ident("n"), Expr::num(2)), 0x56),
            (Expr::binary(BinaryOp::Add, Expr::ident("n"), Expr::num(1)), 0x57),
        ];
        for (expr, operator) in cases {
            let bytes = encode(scope, &expr).unwrap();
            assert_eq!(bytes[1], operator, "operator for {:?}", expr);
        }
    }

    #[test]
    fn test_unfoldable_top_level_expression_fails() {
        let f = sized_buffer_fn();
        let expr = Expr::binary(BinaryOp::Div, Expr::ident("n"), Expr::num(3));
        let err = encode(Scope::function(&f), &expr).unwrap_err();
        assert_eq!(err, CodegenError::TopLevelCallback { func: "f".to_string() });
    }

    #[test]
    fn test_structure_callback_is_shared() {
        let f = Function::new("f", Type::Void, vec![]);
        let s = counted();
        let scope = Scope::function(&f).within(&s);
        let expr = Expr::binary(BinaryOp::Mul, Expr::ident("n"), Expr::ident("pad"));

        let mut compiler = compiler();
        let mut buffer = FormatBuffer::new();
        compiler.write_conf_or_var_desc(&mut buffer, scope, &expr).unwrap();
        let mut counter = SizeCounter::default();
        compiler.write_conf_or_var_desc(&mut counter, scope, &expr).unwrap();

        assert_eq!(buffer.bytes(), vec![0x00, 0x59, 0x00, 0x00]);
        assert_eq!(counter.offset(), 4);
        assert_eq!(compiler.callbacks().len(), 1);
        assert_eq!(compiler.callbacks().routines()[0].structure_size, 6);
    }

    #[test]
    fn test_unresolved_identifier() {
        let f = sized_buffer_fn();
        let err = encode(Scope::function(&f), &Expr::ident("count")).unwrap_err();
        assert_eq!(err.code(), "E-NDR-006");
        assert!(err.to_string().contains("function 'f'"));
    }

    #[test]
    fn test_non_integral_correlation_variable() {
        let f = Function::new("f", Type::Void, vec![scalar("big", BaseType::Hyper)]);
        let err = encode(Scope::function(&f), &Expr::ident("big")).unwrap_err();
        assert_eq!(err.code(), "E-NDR-007");
    }

    #[test]
    fn test_dry_run_writes_four_bytes() {
        let f = sized_buffer_fn();
        let mut compiler = compiler();
        let mut counter = SizeCounter::starting_at(10);
        let written = compiler
            .write_conf_or_var_desc(&mut counter, Scope::function(&f), &Expr::ident("n"))
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(counter.offset(), 14);
    }
}
