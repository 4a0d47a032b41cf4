mod common;

use common::*;
use vesper_compiler_frontend::ast::build::*;
use vesper_compiler_frontend::expr::{Meaning, Plan, PropertyAccess, RawArg, TargetMember};
use vesper_compiler_frontend::{
    ClassKind, Constant, Context, MethodKind, Param, RefKind, Symbols, Type,
};

fn symbols_with_box() -> (Symbols, Context) {
    let mut symbols = Symbols::with_default_types();
    let class = symbols.class("Box").define();
    symbols.property(class, "size", Type::int()).define();
    let method = symbols.method(class, "resize").define();
    let ctx = Context::builder().this_class(class).method(method).build();
    (symbols, ctx)
}

#[test]
fn local_variable_is_read_from_its_register() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let checked = check(&symbols, ctx, &ident("x"), &[]);
    let name = checked.name();
    assert_eq!(name.meaning(), Meaning::Variable);
    assert_eq!(name.plan(), Plan::None);
    assert!(matches!(name.raw(), Some(RawArg::Register(_, typ)) if *typ == Type::int()));
    assert_eq!(checked.types(), [Type::int()]);
}

#[test]
fn reference_to_variable() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let checked = check(&symbols, ctx, &no_deref(ident("x")), &[]);
    assert_eq!(checked.name().plan(), Plan::RegisterRef);
    assert_eq!(checked.types(), [Type::Ref(RefKind::Var, Type::int().into())]);
}

#[test]
fn unassigned_variable_cannot_be_read() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), false);

    let checked = check(&symbols, ctx, &ident("x"), &[]);
    assert_eq!(checked.root, None);
    assert_eq!(checked.codes(), ["VAR_UNASSIGNED"]);
}

#[test]
fn bare_property_reads_through_this() {
    let (symbols, ctx) = symbols_with_box();

    let mut checked = check(&symbols, ctx, &ident("size"), &[]);
    let name = checked.name();
    assert_eq!(name.meaning(), Meaning::Property);
    assert_eq!(name.plan(), Plan::PropertyDeref);
    assert_eq!(name.access(), Some(PropertyAccess::This));
    match name.raw() {
        Some(RawArg::Target(target)) => {
            assert!(matches!(target.member, TargetMember::Property(_)));
            assert_eq!(target.steps, 0);
            assert!(target.has_this);
        }
        other => panic!("expected an implicit receiver, got {other:?}"),
    }
    assert!(checked.ctx.uses_this());

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c0
    local.get c1 -> r0
    c0 = type Int
    c1 = property Box.size
    ");
}

#[test]
fn bare_property_needs_instance() {
    let mut symbols = Symbols::with_default_types();
    let class = symbols.class("Box").define();
    symbols.property(class, "size", Type::int()).define();
    let ctx = Context::builder().this_class(class).is_static(true).build();

    let checked = check(&symbols, ctx, &ident("size"), &[]);
    assert_eq!(checked.root, None);
    assert_eq!(checked.codes(), ["NO_THIS_PROPERTY"]);
}

#[test]
fn property_of_enclosing_class_goes_through_outer() {
    let mut symbols = Symbols::with_default_types();
    let outer = symbols.class("Outer").define();
    symbols.property(outer, "count", Type::int()).define();
    let inner = symbols.class("Inner").parent(outer).define();
    let method = symbols.method(inner, "run").define();
    let ctx = Context::builder().this_class(inner).method(method).build();

    let mut checked = check(&symbols, ctx, &ident("count"), &[]);
    assert_eq!(checked.name().access(), Some(PropertyAccess::Outer(1)));
    assert!(matches!(
        checked.name().raw(),
        Some(RawArg::Target(target)) if target.steps == 1
    ));

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    move.this 1 -> stack
    var r0: c0
    prop.get stack.c1 -> r0
    c0 = type Int
    c1 = property Outer.count
    ");
}

#[test]
fn static_property_through_class_name() {
    let mut symbols = Symbols::with_default_types();
    let config = symbols.class("Config").define();
    symbols
        .property(config, "limit", Type::int())
        .is_static(true)
        .define();

    let expr = member(ident("Config"), "limit");
    let mut checked = check(&symbols, Context::default(), &expr, &[]);
    let name = checked.name();
    assert!(matches!(name.raw(), Some(RawArg::Property(_))));
    assert_eq!(name.plan(), Plan::PropertyDeref);
    assert_eq!(name.access(), Some(PropertyAccess::SingletonParent(config)));

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c1
    prop.get c0.c2 -> r0
    c0 = singleton Config
    c1 = type Int
    c2 = property Config.limit
    ");
}

#[test]
fn class_names_denote_types_or_singletons() {
    let mut symbols = Symbols::with_default_types();
    let util = symbols.class("Util").define();
    let game = symbols.class("Game").kind(ClassKind::Module).define();

    let checked = check(&symbols, Context::default(), &ident("Util"), &[]);
    assert_eq!(checked.name().meaning(), Meaning::Class);
    assert_eq!(checked.name().plan(), Plan::TypeOfClass);
    assert_eq!(checked.types(), [Type::meta(Type::nullary(util))]);

    let checked = check(&symbols, Context::default(), &ident("Game"), &[]);
    assert_eq!(checked.name().plan(), Plan::Singleton);
    let validated = checked.tree[checked.root()].validated().unwrap();
    assert_eq!(validated.constant(), Some(&Constant::Singleton(game)));
}

#[test]
fn required_type_hints_static_member() {
    let mut symbols = Symbols::with_default_types();
    let color = symbols.class("Color").define();
    symbols
        .property(color, "Red", Type::nullary(color))
        .is_static(true)
        .define();

    let checked = check(&symbols, Context::default(), &ident("Red"), &[Type::nullary(color)]);
    let name = checked.name();
    assert!(matches!(name.raw(), Some(RawArg::Property(_))));
    assert_eq!(name.access(), Some(PropertyAccess::SingletonParent(color)));

    let checked = check(&symbols, Context::default(), &ident("Red"), &[]);
    assert_eq!(checked.codes(), ["NAME_MISSING"]);
}

#[test]
fn label_exposes_its_variables() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_label("outer", [("index", Type::int())]);

    let expr = member(ident("outer"), "index");
    let checked = check(&symbols, ctx.clone(), &expr, &[]);
    let name = checked.name();
    assert_eq!(name.meaning(), Meaning::Variable);
    assert_eq!(name.left, None);
    assert_eq!(checked.types(), [Type::int()]);

    let checked = check(&symbols, ctx, &ident("outer"), &[]);
    assert_eq!(checked.codes(), ["LABEL_AS_VALUE"]);
}

#[test]
fn function_as_value() {
    let (mut symbols, util) = symbols_with_util();
    let twice = symbols
        .method(util, "twice")
        .kind(MethodKind::Function)
        .params(vec![Param::new("value", Type::int())])
        .returns(vec![Type::int()])
        .define();

    let checked = check(&symbols, Context::default(), &member(ident("Util"), "twice"), &[]);
    assert_eq!(checked.name().method(), Some(twice));
    let types = checked.types();
    let [typ] = &types[..] else {
        panic!("expected a single type, got {types:?}");
    };
    assert_eq!(typ.strip_immutable(), &Type::function([Type::int()], [Type::int()]));
}

#[test]
fn unresolvable_names() {
    let symbols = Symbols::with_default_types();
    let cases = [
        (ident("nope"), "NAME_MISSING"),
        (ident("this"), "NO_THIS"),
        (ident("super"), "INVALID_SUPER_REFERENCE"),
        (member(ident("super"), "size"), "INVALID_SUPER_REFERENCE"),
    ];
    for (expr, code) in cases {
        let checked = check(&symbols, Context::default(), &expr, &[]);
        assert_eq!(checked.root, None);
        assert_eq!(checked.codes(), [code]);
    }
}
