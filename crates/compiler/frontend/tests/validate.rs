mod common;

use common::*;
use vesper_compiler_frontend::ast::build::*;
use vesper_compiler_frontend::expr::{ExprKind, ExprTree, Generator, Validator};
use vesper_compiler_frontend::{Constant, Context, Emitter, Options, Reporter, Symbols, Type};

#[test]
fn int_literal_fits_float_without_conversion() {
    let symbols = Symbols::with_default_types();

    let checked = check(&symbols, Context::default(), &int(3), &[float_type()]);
    let validated = checked.tree[checked.root()].validated().unwrap();
    assert!(matches!(checked.tree[checked.root()].kind(), ExprKind::Literal(_)));
    assert!(matches!(validated.constant(), Some(Constant::Float(_))));
    assert!(!validated.fit().converts());
    assert_eq!(checked.types(), [float_type()]);
}

#[test]
fn variable_is_converted_at_runtime() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let mut checked = check(&symbols, ctx, &ident("x"), &[float_type()]);
    assert!(matches!(
        checked.tree[checked.root()].kind(),
        ExprKind::Convert { .. }
    ));
    assert_eq!(checked.types(), [float_type()]);

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r1: c1
    invoke_01 r0.c0() -> r1
    c0 = method Int.toFloat()
    c1 = type Float
    ");
}

#[test]
fn constant_conversion_is_folded() {
    let symbols = Symbols::with_default_types();

    let checked = check(&symbols, Context::default(), &char('a'), &[string_type()]);
    let root = checked.root();
    assert!(matches!(checked.tree[root].kind(), ExprKind::Literal(_)));
    let validated = checked.tree[root].validated().unwrap();
    assert!(matches!(validated.constant(), Some(Constant::String(s)) if &**s == "a"));
    assert!(validated.fit().converts());
}

#[test]
fn mismatched_types() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let cases = [
        (string("five"), vec![Type::int()], "WRONG_TYPE"),
        (int(1), vec![Type::int(), Type::int()], "WRONG_TYPE_ARITY"),
        (index(ident("x"), [int(0)]), vec![], "NOT_INDEXABLE"),
    ];
    for (expr, required, code) in cases {
        let checked = check(&symbols, ctx.clone(), &expr, &required);
        assert_eq!(checked.root, None);
        assert_eq!(checked.codes(), [code]);
    }
}

#[test]
fn short_circuit_needs_a_landing_point() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::nullable(Type::int()), true);
    let expr = not_null(ident("x"));

    let checked = check(&symbols, ctx.clone(), &expr, &[]);
    assert_eq!(checked.codes(), ["SHORT_CIRCUIT_ILLEGAL"]);
    assert_eq!(checked.types(), [Type::int()]);

    let options = Options {
        allow_short_circuit: true,
        ..Options::default()
    };
    let checked = check_with(&symbols, ctx, &expr, &[], &options);
    assert!(checked.codes().is_empty(), "{:?}", checked.codes());
}

#[test]
fn tuple_unpacks_into_separate_values() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let expr = tuple([int(1), ident("x")]);
    let checked = check(&symbols, ctx, &expr, &[Type::int(), Type::int()]);
    let validated = checked.tree[checked.root()].validated().unwrap();
    assert!(validated.fit().unpacks());
    assert_eq!(validated.types(), [Type::int(), Type::int()]);
}

#[test]
fn conditional_jumps() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("flag", Type::boolean(), true);

    let listing = |expr, when_true| {
        let mut checked = check(&symbols, ctx.clone(), &expr, &[Type::boolean()]);
        let root = checked.root();
        let mut code = Emitter::new(checked.ctx.register_count());
        let label = code.new_label();
        Generator::new(&checked.tree, &checked.ctx, &symbols, &mut code, &mut checked.reporter)
            .generate_conditional_jump(root, label, when_true);
        code.mark_label(label);
        let code = code.finish().unwrap();
        DisplayCode(&code, &symbols).to_string()
    };

    insta::assert_snapshot!(listing(bool(true), true), @r"
    jump @1
    ");
    assert_eq!(listing(bool(true), false), "");
    insta::assert_snapshot!(listing(ident("flag"), false), @r"
    jump.if_not r0 @1
    ");
}

#[test]
fn fit_tests_leave_tree_and_context_untouched() {
    let mut symbols = Symbols::with_default_types();
    let color = symbols.class("Color").define();
    symbols
        .property(color, "Red", Type::nullary(color))
        .is_static(true)
        .define();
    let required = [Type::nullary(color)];

    // the name only resolves against a required type, so only an exhaustive test finds it
    for exhaustive in [true, false] {
        let options = Options {
            exhaustive_fit_testing: exhaustive,
            ..Options::default()
        };
        let mut tree = ExprTree::default();
        let mut ctx = Context::default();
        let mut reporter = Reporter::default();
        let root = tree.lower(&ident("Red"));
        let len = tree.len();
        let ctx_before = format!("{ctx:?}");

        let mut validator = Validator::new(&mut tree, &mut ctx, &symbols, &mut reporter, &options);
        let fit = validator.test_fit(root, Some(&required[0]), true);
        assert_eq!(fit.fits(), exhaustive);
        assert_eq!(validator.test_fit_multi(root, &required, true), fit);
        assert!(!validator.test_fit(root, Some(&required[0]), false).fits());
        assert!(validator.tree()[root].validated().is_none());

        assert_eq!(tree.len(), len);
        assert_eq!(format!("{ctx:?}"), ctx_before);
        assert!(reporter.is_empty());
    }
}
