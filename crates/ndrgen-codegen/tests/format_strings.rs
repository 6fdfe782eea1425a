//! Integration tests for interface compilation
//!
//! Tests the full pipeline: interface -> type format -> proc format -> call plans

use ndrgen_ast::{
    Attributes, BaseType, BinaryOp, Expr, Function, Interface, StructType, Type, UnionType,
    Variable,
};
use ndrgen_codegen::{
    compile, render_interface, type_format_size, CodegenConfig, CompiledInterface, Direction,
    FormatItem, MarshalStep, Pass, RoutineFamily, ScratchField,
};
use proptest::prelude::*;

fn scalar(name: &str, base: BaseType) -> Variable {
    Variable::new(name, Type::Base(base))
}

fn sized(name: &str, base: BaseType, bound: Expr) -> Variable {
    scalar(name, base)
        .with_ptr_level(1)
        .with_attrs(Attributes::default().with_size_is(bound))
}

/// Helper to compile a single-function interface
fn compile_one(params: Vec<Variable>) -> CompiledInterface {
    let iface = Interface::new("demo", vec![Function::new("f", Type::Void, params)]);
    compile(&iface, &CodegenConfig::default()).expect("compilation failed")
}

fn counted() -> StructType {
    StructType::new(
        "counted",
        vec![
            scalar("n", BaseType::Long),
            scalar("data", BaseType::Long)
                .with_array(vec![Expr::Void])
                .with_attrs(Attributes::default().with_size_is(Expr::ident("n"))),
        ],
    )
}

#[test]
fn test_sized_buffer_end_to_end() {
    let compiled = compile_one(vec![
        scalar("n", BaseType::Long),
        sized("buf", BaseType::Char, Expr::ident("n")),
    ]);

    assert_eq!(
        compiled.type_format.bytes(),
        vec![
            0x00, 0x00, // header
            0x1b, 0x00, 0x01, 0x00, // conformant array of 1-byte elements
            0x28, 0x00, 0x00, 0x00, // top-level long at stack offset 0
            0x00, 0x5b,
        ]
    );
    assert_eq!(
        compiled.proc_format.bytes(),
        vec![0x4e, 0x08, 0x4d, 0x01, 0x02, 0x00, 0x5b, 0x5c]
    );

    let f = compiled.function("f").unwrap();
    let plan = f.plan(Pass::In, Direction::Marshal).unwrap();
    assert!(matches!(&plan.steps[0], MarshalStep::Inline { var, size: 4, .. } if var == "n"));
    assert_eq!(
        plan.steps[1],
        MarshalStep::SetScratch {
            field: ScratchField::MaxCount,
            value: Expr::ident("n"),
        }
    );
    assert_eq!(
        plan.steps[2],
        MarshalStep::Call {
            family: RoutineFamily::ConformantArray,
            var: "buf".to_string(),
            type_offset: 2,
        }
    );

    let unmarshal = f.plan(Pass::In, Direction::Unmarshal).unwrap();
    assert!(unmarshal
        .steps
        .iter()
        .all(|s| !matches!(s, MarshalStep::SetScratch { .. })));
}

#[test]
fn test_constant_bound() {
    let compiled = compile_one(vec![sized("a", BaseType::Long, Expr::num(16))]);
    assert_eq!(
        &compiled.type_format.bytes()[2..],
        &[0x1b, 0x00, 0x04, 0x00, 0x40, 0x00, 0x10, 0x00, 0x00, 0x5b]
    );
}

#[test]
fn test_folded_bound() {
    let bound = Expr::binary(BinaryOp::Sub, Expr::ident("n"), Expr::num(1));
    let compiled = compile_one(vec![scalar("n", BaseType::Long), sized("a", BaseType::Short, bound)]);
    assert_eq!(&compiled.type_format.bytes()[6..10], &[0x28, 0x58, 0x00, 0x00]);
}

#[test]
fn test_relative_offsets_land_on_descriptors() {
    let compiled = compile_one(vec![
        Variable::new("c", Type::Struct(counted())).with_ptr_level(1),
        scalar("pp", BaseType::Short).with_ptr_level(2),
    ]);

    let items = compiled.type_format.items();
    let tags: Vec<u32> = items
        .iter()
        .filter(|(_, item)| matches!(item, FormatItem::Tag(_)))
        .map(|(offset, _)| *offset)
        .collect();

    let mut checked = 0;
    for (offset, item) in items {
        if let FormatItem::Offset(delta) = item {
            let target = i64::from(*offset) + i64::from(*delta);
            assert!(
                tags.iter().any(|t| i64::from(*t) == target),
                "offset at {} points to {}, which is not a descriptor",
                offset,
                target
            );
            checked += 1;
        }
    }
    assert_eq!(checked, 3);

    // The directive for c references the pointer, the pointer the header
    let f = compiled.function("f").unwrap();
    assert_eq!(f.types.params[0].descriptor_offset(), 2);
    assert_eq!(&compiled.proc_format.bytes()[..4], &[0x4d, 0x01, 0x02, 0x00]);
}

#[test]
fn test_marshal_padding() {
    let compiled = compile_one(vec![
        scalar("c", BaseType::Char),
        scalar("l", BaseType::Long),
        scalar("s", BaseType::Short),
    ]);
    let plan = compiled
        .function("f")
        .unwrap()
        .plan(Pass::In, Direction::Marshal)
        .unwrap();
    assert!(matches!(plan.steps[0], MarshalStep::Inline { size: 1, .. }));
    assert_eq!(plan.steps[1], MarshalStep::Align { pad: 3 });
    assert!(matches!(plan.steps[2], MarshalStep::Inline { size: 4, .. }));
    assert!(matches!(plan.steps[3], MarshalStep::Inline { size: 2, .. }));
    assert_eq!(plan.steps.len(), 4);
}

#[test]
fn test_return_value_is_described() {
    let iface = Interface::new(
        "demo",
        vec![Function::new("g", Type::Base(BaseType::Long), vec![])],
    );
    let compiled = compile(&iface, &CodegenConfig::default()).unwrap();
    assert_eq!(compiled.proc_format.bytes(), vec![0x53, 0x08]);
    let g = compiled.function("g").unwrap();
    let ret = g.plan(Pass::Return, Direction::Unmarshal).unwrap();
    assert_eq!(ret.steps.len(), 1);
}

#[test]
fn test_callback_rendered_with_interface() {
    let image = StructType::new(
        "image",
        vec![
            scalar("w", BaseType::Short),
            scalar("h", BaseType::Short),
            scalar("pixels", BaseType::Byte)
                .with_array(vec![Expr::Void])
                .with_attrs(Attributes::default().with_size_is(Expr::binary(
                    BinaryOp::Mul,
                    Expr::ident("w"),
                    Expr::ident("h"),
                ))),
        ],
    );
    let compiled = compile_one(vec![Variable::new("img", Type::Struct(image))]);
    assert_eq!(compiled.callbacks.len(), 1);
    assert_eq!(compiled.callbacks[0].structure_size, 4);

    let text = render_interface(&compiled).unwrap();
    assert!(text.contains("ExprEvalRoutines"));
    assert!(text.contains("pS->w"));
    assert!(text.contains("NdrConformantStructMarshall"));
    assert!(text.contains(&format!(
        "#define TYPE_FORMAT_STRING_SIZE   {}",
        compiled.type_format.bytes().len() + 1
    )));
}

#[test]
fn test_errors_abort_compilation() {
    let union = Type::Union(UnionType {
        name: "u".to_string(),
        encapsulated: false,
        fields: vec![scalar("a", BaseType::Long)],
    });
    let iface = Interface::new(
        "demo",
        vec![Function::new("f", Type::Void, vec![Variable::new("u", union)])],
    );
    let err = compile(&iface, &CodegenConfig::default()).unwrap_err();
    assert_eq!(err.code(), "E-NDR-003");

    let iface = Interface::new(
        "demo",
        vec![Function::new(
            "f",
            Type::Void,
            vec![sized("a", BaseType::Long, Expr::ident("missing"))],
        )],
    );
    let err = compile(&iface, &CodegenConfig::default()).unwrap_err();
    assert_eq!(err.code(), "E-NDR-006");
    assert!(err.to_string().contains("missing"));
}

#[test]
fn test_wide_pointers_scale_stack_offsets() {
    let iface = Interface::new(
        "demo",
        vec![Function::new(
            "f",
            Type::Void,
            vec![
                scalar("a", BaseType::Long),
                scalar("n", BaseType::Long),
                sized("buf", BaseType::Char, Expr::ident("n")),
            ],
        )],
    );
    let compiled = compile(&iface, &CodegenConfig::with_pointer_size(8)).unwrap();
    assert_eq!(&compiled.type_format.bytes()[6..10], &[0x28, 0x00, 0x08, 0x00]);
}

fn base_type() -> impl Strategy<Value = BaseType> {
    prop_oneof![
        Just(BaseType::Byte),
        Just(BaseType::Char),
        Just(BaseType::WChar),
        Just(BaseType::Short),
        Just(BaseType::Long),
        Just(BaseType::Hyper),
        Just(BaseType::Double),
    ]
}

fn char_type() -> impl Strategy<Value = BaseType> {
    prop_oneof![Just(BaseType::Char), Just(BaseType::WChar)]
}

/// Relative offsets that do not land on a descriptor tag
fn unresolved_offsets(compiled: &CompiledInterface) -> Vec<(u32, i64)> {
    let items = compiled.type_format.items();
    items
        .iter()
        .filter_map(|(offset, item)| match item {
            FormatItem::Offset(delta) => Some((*offset, i64::from(*offset) + i64::from(*delta))),
            _ => None,
        })
        .filter(|(_, target)| {
            !items
                .iter()
                .any(|(o, i)| i64::from(*o) == *target && matches!(i, FormatItem::Tag(_)))
        })
        .collect()
}

/// Bounds on the parameter `n`, all foldable into a descriptor
fn param_bound() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0i64..0x10000).prop_map(Expr::num),
        Just(Expr::ident("n")),
        Just(Expr::binary(BinaryOp::Sub, Expr::ident("n"), Expr::num(1))),
        Just(Expr::binary(BinaryOp::Mul, Expr::ident("n"), Expr::num(2))),
    ]
}

/// Bounds on the structure field `len`; `len * 3` needs a callback
fn field_bound() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0i64..0x10000).prop_map(Expr::num),
        Just(Expr::ident("len")),
        Just(Expr::binary(BinaryOp::Sub, Expr::ident("len"), Expr::num(1))),
        Just(Expr::binary(BinaryOp::Mul, Expr::ident("len"), Expr::num(3))),
    ]
}

fn leading_fields() -> impl Strategy<Value = Vec<Variable>> {
    prop::collection::vec(base_type(), 0..4).prop_map(|bases| {
        let mut fields: Vec<Variable> = bases
            .into_iter()
            .enumerate()
            .map(|(i, b)| scalar(&format!("f{}", i), b))
            .collect();
        fields.push(scalar("len", BaseType::Long));
        fields
    })
}

fn structure() -> impl Strategy<Value = StructType> {
    let plain = prop::collection::vec(base_type(), 1..5).prop_map(|bases| {
        let fields = bases
            .into_iter()
            .enumerate()
            .map(|(i, b)| scalar(&format!("f{}", i), b))
            .collect();
        StructType::new("plain", fields)
    });
    let conformant = (leading_fields(), base_type(), field_bound()).prop_map(|(mut fields, b, bound)| {
        fields.push(
            scalar("data", b)
                .with_array(vec![Expr::Void])
                .with_attrs(Attributes::default().with_size_is(bound)),
        );
        StructType::new("counted", fields)
    });
    let varying = (leading_fields(), base_type(), field_bound(), field_bound()).prop_map(
        |(mut fields, b, size, length)| {
            fields.push(
                scalar("data", b)
                    .with_array(vec![Expr::Void])
                    .with_attrs(Attributes::default().with_size_is(size).with_length_is(length)),
            );
            StructType::new("window", fields)
        },
    );
    let text = (leading_fields(), char_type()).prop_map(|(mut fields, b)| {
        fields.push(
            scalar("text", b)
                .with_array(vec![Expr::Void])
                .with_attrs(Attributes::default().with_string()),
        );
        StructType::new("labelled", fields)
    });
    prop_oneof![plain, conformant, varying, text]
}

fn variable() -> impl Strategy<Value = Variable> {
    prop_oneof![
        (base_type(), 0u32..4).prop_map(|(b, level)| scalar("v", b).with_ptr_level(level)),
        (base_type(), 1i64..20_000)
            .prop_map(|(b, n)| scalar("v", b).with_array(vec![Expr::num(n)])),
        (base_type(), param_bound()).prop_map(|(b, bound)| sized("v", b, bound)),
        (base_type(), 1i64..2_000, param_bound()).prop_map(|(b, n, length)| scalar("v", b)
            .with_array(vec![Expr::num(n)])
            .with_attrs(Attributes::default().with_length_is(length))),
        (base_type(), param_bound(), param_bound()).prop_map(|(b, size, length)| scalar("v", b)
            .with_ptr_level(1)
            .with_attrs(Attributes::default().with_size_is(size).with_length_is(length))),
        (char_type(), 1i64..500).prop_map(|(b, n)| scalar("v", b)
            .with_array(vec![Expr::num(n)])
            .with_attrs(Attributes::default().with_string())),
        (char_type(), 1u32..3).prop_map(|(b, level)| scalar("v", b)
            .with_ptr_level(level)
            .with_attrs(Attributes::default().with_string())),
        (char_type(), param_bound()).prop_map(|(b, bound)| scalar("v", b)
            .with_ptr_level(1)
            .with_attrs(Attributes::default().with_string().with_size_is(bound))),
        (structure(), 0u32..3).prop_map(|(s, level)| Variable::new("v", Type::Struct(s))
            .with_ptr_level(level)),
    ]
}

proptest! {
    #[test]
    fn sizing_matches_emission(var in variable()) {
        let compiled = compile_one(vec![scalar("n", BaseType::Long), var]);
        let emitted = compiled.type_format.bytes().len() as u32 - 2;
        prop_assert_eq!(compiled.functions[0].types.params[1].size, emitted);
        let unresolved = unresolved_offsets(&compiled);
        prop_assert!(unresolved.is_empty(), "offsets miss a descriptor: {:?}", unresolved);
    }

    #[test]
    fn size_query_agrees_with_compile(var in variable()) {
        let params = vec![scalar("n", BaseType::Long), var.clone()];
        let func = Function::new("f", Type::Void, params.clone());
        let queried = type_format_size(&func, &var, &CodegenConfig::default()).unwrap();
        let compiled = compile_one(params);
        prop_assert_eq!(queried as usize, compiled.type_format.bytes().len() - 2);
    }
}
