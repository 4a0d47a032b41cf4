mod common;

use common::*;
use vesper_compiler_frontend::ast::build::*;
use vesper_compiler_frontend::ast::{IncDec, SourceExpr};
use vesper_compiler_frontend::{Context, Param, Symbols, Type};

/// A static `Util` with `foo(Int, Int)` and `bar() -> Int`.
fn util_symbols() -> Symbols {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "foo",
        vec![Param::new("x", Type::int()), Param::new("y", Type::int())],
        vec![],
    );
    function(&mut symbols, util, "bar", vec![], vec![Type::int()]);
    symbols
}

/// Adds a class `C` with properties `a` and `b`, and runs in one of its methods.
fn fixture() -> (Symbols, Context) {
    let mut symbols = util_symbols();
    let class = symbols.class("C").define();
    symbols.property(class, "a", Type::int()).define();
    symbols.property(class, "b", Type::int()).define();
    let method = symbols.method(class, "m").define();
    let ctx = Context::builder().this_class(class).method(method).build();
    (symbols, ctx)
}

fn foo<'a>(x: SourceExpr<'a>, y: SourceExpr<'a>) -> SourceExpr<'a> {
    call(member(ident("Util"), "foo"), [arg(x), arg(y)])
}

fn bar() -> SourceExpr<'static> {
    call(member(ident("Util"), "bar"), [])
}

#[test]
fn loaded_property_is_not_copied_before_increment() {
    let (symbols, ctx) = fixture();

    let expr = foo(ident("a"), inc_dec(IncDec::PostInc, ident("b")));
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c0
    local.get c1 -> r0
    seq.post_inc c2 -> stack
    call_N0 c3(r0, stack)
    c0 = type Int
    c1 = property C.a
    c2 = property C.b
    c3 = method Util.foo(Int, Int)
    ");
}

#[test]
fn no_snapshot_before_constant() {
    let (symbols, ctx) = fixture();

    let mut checked = check(&symbols, ctx, &foo(ident("a"), int(1)), &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c0
    local.get c1 -> r0
    call_N0 c3(r0, c2)
    c0 = type Int
    c1 = property C.a
    c2 = 1
    c3 = method Util.foo(Int, Int)
    ");
}

#[test]
fn loaded_property_is_not_copied_before_call() {
    let (symbols, ctx) = fixture();

    let mut checked = check(&symbols, ctx, &foo(ident("a"), bar()), &[]);
    let code = checked.generate(&symbols);
    let listing = DisplayCode(&code, &symbols).to_string();
    assert!(listing.contains("local.get c1 -> r0"), "{listing}");
    assert!(!listing.contains("move"), "{listing}");
}

#[test]
fn local_variable_before_call_is_not_copied() {
    let symbols = util_symbols();
    let mut ctx = Context::default();
    let x = ctx.declare_var("x", Type::int(), true);
    ctx.mark_var_write(x);
    assert!(!ctx.is_effectively_final(x));

    let mut checked = check(&symbols, ctx, &foo(ident("x"), bar()), &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    call_01 c0() -> stack
    call_N0 c1(r0, stack)
    c0 = method Util.bar()
    c1 = method Util.foo(Int, Int)
    ");
}

#[test]
fn local_variable_snapshot_before_its_increment() {
    let symbols = util_symbols();
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let expr = foo(ident("x"), inc_dec(IncDec::PostInc, ident("x")));
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    let listing = DisplayCode(&code, &symbols).to_string();
    assert!(listing.contains("move r0 -> r1"), "{listing}");
    assert!(listing.contains("call_N0 c1(r1, stack)"), "{listing}");
}

#[test]
fn future_variable_is_not_copied_before_its_increment() {
    let symbols = util_symbols();
    let mut ctx = Context::default();
    ctx.declare_future("f", Type::int());

    let expr = foo(ident("f"), inc_dec(IncDec::PostInc, ident("f")));
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    let listing = DisplayCode(&code, &symbols).to_string();
    assert!(!listing.contains("move"), "{listing}");
    assert!(listing.contains("call_N0 c1(r0, stack)"), "{listing}");
}
