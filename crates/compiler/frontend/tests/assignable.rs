mod common;

use common::*;
use vesper_bytecode::Op;
use vesper_compiler_frontend::ast::build::*;
use vesper_compiler_frontend::{Context, Symbols, Type, predef};

#[test]
fn first_assignment_keeps_variable_final() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    let x = ctx.declare_var("x", Type::int(), false);

    let mut checked = check(&symbols, ctx, &assign(ident("x"), int(5)), &[]);
    assert!(checked.codes().is_empty(), "{:?}", checked.codes());
    assert!(checked.ctx.is_effectively_final(x));

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    move c0 -> r0
    c0 = 5
    ");
}

#[test]
fn reassignment_clears_final() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    let x = ctx.declare_var("x", Type::int(), true);

    let checked = check(&symbols, ctx, &assign(ident("x"), int(5)), &[]);
    assert!(!checked.ctx.is_effectively_final(x));
}

#[test]
fn only_locations_accept_assignment() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);
    ctx.declare_var("s", string_type(), true);

    let cases = [
        assign(no_deref(ident("x")), int(1)),
        assign(member(ident("s"), "size"), int(3)),
        assign(int(1), int(2)),
    ];
    for expr in cases {
        let checked = check(&symbols, ctx.clone(), &expr, &[]);
        assert_eq!(checked.root, None);
        assert_eq!(checked.codes(), ["ASSIGNABLE_REQUIRED"]);
    }
}

#[test]
fn property_assigned_to_itself_warns() {
    let mut symbols = Symbols::with_default_types();
    let class = symbols.class("Box").define();
    symbols.property(class, "size", Type::int()).define();
    let method = symbols.method(class, "resize").define();
    let ctx = Context::builder().this_class(class).method(method).build();

    let mut checked = check(&symbols, ctx, &assign(ident("size"), ident("size")), &[]);
    checked.generate(&symbols);
    assert_eq!(checked.codes(), ["PROP_SELF_ASSIGNED"]);
    assert!(!checked.reporter.has_serious_errors());
}

#[test]
fn swap_reads_both_values_before_writing() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);
    ctx.declare_var("b", Type::int(), true);

    let expr = assign(
        tuple([ident("a"), ident("b")]),
        tuple([ident("b"), ident("a")]),
    );
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r2: c0
    move r0 -> r2
    move r1 -> r0
    move r2 -> r1
    c0 = type Int
    ");
}

#[test]
fn array_element_is_assignable() {
    let symbols = Symbols::with_default_types();
    let mut ctx = Context::default();
    ctx.declare_var("items", Type::app(predef::ARRAY, [Type::int()]), true);

    let expr = assign(index(ident("items"), [int(0)]), int(5));
    let mut checked = check(&symbols, ctx, &expr, &[]);
    assert!(checked.codes().is_empty(), "{:?}", checked.codes());

    let code = checked.generate(&symbols);
    assert!(code.ops().iter().any(|op| matches!(op, Op::ISet { .. })));
}
