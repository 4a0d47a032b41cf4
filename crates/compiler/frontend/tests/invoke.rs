mod common;

use common::*;
use vesper_bytecode::Op;
use vesper_compiler_frontend::ast::build::*;
use vesper_compiler_frontend::expr::{
    CONSTRUCT, CallTarget, ExprKind, ExprTree, Generator, Validator,
};
use vesper_compiler_frontend::{
    ClassId, Context, Emitter, MethodKind, Options, Param, Reporter, Symbols, Type, TypeParam,
    predef,
};

#[test]
fn receiver_rewrite_passes_qualifier_as_first_argument() {
    let (mut symbols, _) = symbols_with_util();
    function(
        &mut symbols,
        predef::INT,
        "double",
        vec![Param::new("value", Type::int())],
        vec![Type::int()],
    );
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);

    let expr = call(member(ident("x"), "double"), []);
    let mut checked = check(&symbols, ctx, &expr, &[Type::int()]);
    let res = checked.resolution();
    assert_eq!(res.target, CallTarget::Rewritten);
    assert!(res.flags.receiver_rewritten());

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r1: c0
    call_11 c1(r0) -> r1
    c0 = type Int
    c1 = method Int.double(Int)
    ");
}

#[test]
fn receiver_rewrite_can_be_disabled() {
    let (mut symbols, _) = symbols_with_util();
    function(
        &mut symbols,
        predef::INT,
        "double",
        vec![Param::new("value", Type::int())],
        vec![Type::int()],
    );
    let mut ctx = Context::default();
    ctx.declare_var("x", Type::int(), true);
    let options = Options {
        receiver_rewrite: false,
        ..Options::default()
    };

    let expr = call(member(ident("x"), "double"), []);
    let checked = check_with(&symbols, ctx, &expr, &[Type::int()], &options);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"MISSING_METHOD"), "{:?}", checked.codes());
}

#[test]
fn exact_overload_beats_conversion() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "f",
        vec![Param::new("a", float_type()), Param::new("b", float_type())],
        vec![],
    );
    function(
        &mut symbols,
        util,
        "f",
        vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
        vec![],
    );
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);
    ctx.declare_var("b", Type::int(), true);

    let expr = call(member(ident("Util"), "f"), [arg(ident("a")), arg(ident("b"))]);
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    call_N0 c0(r0, r1)
    c0 = method Util.f(Int, Int)
    ");
}

#[test]
fn optional_parameters_make_overloads_ambiguous() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "f",
        vec![Param::new("a", Type::int()), Param::optional("b", Type::int())],
        vec![],
    );
    function(
        &mut symbols,
        util,
        "f",
        vec![
            Param::new("a", Type::int()),
            Param::new("b", Type::int()),
            Param::optional("c", Type::int()),
        ],
        vec![],
    );

    let expr = call(member(ident("Util"), "f"), [arg(int(1)), arg(int(2))]);
    let checked = check(&symbols, Context::default(), &expr, &[]);
    assert_eq!(checked.root, None);
    assert_eq!(checked.codes(), ["SIGNATURE_AMBIGUOUS"]);
}

#[test]
fn crossed_conversions_are_ambiguous() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "g",
        vec![Param::new("a", Type::int()), Param::new("b", float_type())],
        vec![],
    );
    function(
        &mut symbols,
        util,
        "g",
        vec![Param::new("a", float_type()), Param::new("b", Type::int())],
        vec![],
    );
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);
    ctx.declare_var("b", Type::int(), true);

    let expr = call(member(ident("Util"), "g"), [arg(ident("a")), arg(ident("b"))]);
    let checked = check(&symbols, ctx, &expr, &[]);
    assert!(checked.codes().contains(&"SIGNATURE_AMBIGUOUS"), "{:?}", checked.codes());
}

#[test]
fn most_specific_overload_wins() {
    let (mut symbols, util) = symbols_with_util();
    let animal = symbols.class("Animal").define();
    let dog = symbols
        .class("Dog")
        .supers(vec![Type::nullary(animal)])
        .define();
    function(
        &mut symbols,
        util,
        "pet",
        vec![Param::new("who", Type::nullary(animal))],
        vec![],
    );
    let for_dogs = function(
        &mut symbols,
        util,
        "pet",
        vec![Param::new("who", Type::nullary(dog))],
        vec![],
    );
    let mut ctx = Context::default();
    ctx.declare_var("d", Type::nullary(dog), true);

    let expr = call(member(ident("Util"), "pet"), [arg(ident("d"))]);
    let checked = check(&symbols, ctx, &expr, &[]);
    assert_eq!(checked.resolution().method, Some(for_dogs));
    assert_eq!(checked.resolution().target, CallTarget::Static);
}

#[test]
fn type_arguments_select_overload_by_return_type() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "h",
        vec![Param::new("value", Type::int())],
        vec![Type::int()],
    );
    let as_string = function(
        &mut symbols,
        util,
        "h",
        vec![Param::new("value", Type::int())],
        vec![string_type()],
    );

    let callee = with_type_args(member(ident("Util"), "h"), [ty("String")]);
    let expr = call(callee, [arg(int(1))]);
    let checked = check(&symbols, Context::default(), &expr, &[]);
    assert_eq!(checked.resolution().method, Some(as_string));
    assert_eq!(checked.types(), [string_type()]);
}

#[test]
fn tuple_argument_spreads_over_parameters() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "add",
        vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
        vec![Type::int()],
    );
    let mut ctx = Context::default();
    ctx.declare_var("pair", Type::tuple([Type::int(), Type::int()]), true);

    let expr = call(member(ident("Util"), "add"), [arg(ident("pair"))]);
    let mut checked = check(&symbols, ctx, &expr, &[Type::int()]);
    assert!(checked.resolution().flags.tuple_arg());

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r1: c0
    call_T1 c1(tuple r0) -> r1
    c0 = type Int
    c1 = method Util.add(Int, Int)
    ");
}

#[test]
fn multiple_results_pack_into_required_tuple() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "divmod",
        vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
        vec![Type::int(), Type::int()],
    );
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);
    ctx.declare_var("b", Type::int(), true);

    let pair = Type::tuple([Type::int(), Type::int()]);
    let expr = call(member(ident("Util"), "divmod"), [arg(ident("a")), arg(ident("b"))]);
    let mut checked = check(&symbols, ctx, &expr, &[pair.clone()]);
    assert!(checked.resolution().flags.packs_result());
    assert_eq!(checked.types(), [pair]);

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r2: c0
    call_NT c1(r0, r1) -> tuple r2
    c0 = type Tuple<Int, Int>
    c1 = method Util.divmod(Int, Int)
    ");
}

#[test]
fn generic_return_is_inferred_from_argument() {
    let (mut symbols, util) = symbols_with_util();
    let t = Type::Formal("T".into());
    symbols
        .method(util, "identity")
        .kind(MethodKind::Function)
        .type_params(vec![TypeParam::new("T", Type::object())])
        .params(vec![Param::new("value", t.clone())])
        .returns(vec![t])
        .define();
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);

    let expr = call(member(ident("Util"), "identity"), [arg(ident("a"))]);
    let mut checked = check(&symbols, ctx, &expr, &[Type::int()]);
    assert_eq!(checked.resolution().type_params.get("T"), Some(&Type::int()));
    assert_eq!(checked.types(), [Type::int()]);

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r1: c0
    call_N1 c1(c0, r0) -> r1
    c0 = type Int
    c1 = method Util.identity<T>(T)
    ");
}

#[test]
fn unbound_type_parameter_is_reported() {
    let (mut symbols, util) = symbols_with_util();
    symbols
        .method(util, "make")
        .kind(MethodKind::Function)
        .type_params(vec![TypeParam::new("T", Type::object())])
        .returns(vec![Type::Formal("T".into())])
        .define();

    let expr = call(member(ident("Util"), "make"), []);
    let checked = check(&symbols, Context::default(), &expr, &[]);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"TYPE_PARAMS_UNRESOLVABLE"), "{:?}", checked.codes());
    assert!(checked.reporter.has_serious_errors());
}

#[test]
fn function_value_is_called_directly() {
    let (symbols, _) = symbols_with_util();
    let mut ctx = Context::default();
    ctx.declare_var("fnv", Type::function([Type::int()], [Type::int()]), true);
    ctx.declare_var("a", Type::int(), true);

    let expr = call(ident("fnv"), [arg(ident("a"))]);
    let mut checked = check(&symbols, ctx, &expr, &[Type::int()]);
    assert_eq!(checked.resolution().target, CallTarget::Value);
    assert_eq!(checked.resolution().method, None);

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r2: c0
    call_11 r0(r1) -> r2
    c0 = type Int
    ");
}

#[test]
fn partial_application_binds_given_arguments() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "add",
        vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
        vec![Type::int()],
    );
    let curried = Type::function([Type::int()], [Type::int()]);

    let expr = call(member(ident("Util"), "add"), [arg(int(1)), arg(unbound())]);
    let mut checked = check(&symbols, Context::default(), &expr, &[curried.clone()]);
    let flags = checked.resolution().flags;
    assert!(!flags.calls());
    assert!(flags.binds_params());
    assert_eq!(checked.types(), [curried]);

    let code = checked.generate(&symbols);
    let bind = code.ops().iter().find_map(|op| match op {
        Op::FBind { params, .. } => Some(params.iter().map(|&(i, _)| i).collect::<Vec<_>>()),
        _ => None,
    });
    assert_eq!(bind, Some(vec![0]));
}

#[test]
fn named_arguments_fill_their_parameters() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "range",
        vec![
            Param::new("start", Type::int()),
            Param::optional("end", Type::int()),
            Param::optional("step", Type::int()),
        ],
        vec![],
    );

    let expr = call(
        member(ident("Util"), "range"),
        [arg(int(1)), named("step", int(2))],
    );
    let checked = check(&symbols, Context::default(), &expr, &[]);
    let res = checked.resolution();
    assert!(res.flags.named_args());
    assert_eq!(&res.slots[..], [Some(0), None, Some(1)]);

    let expr = call(
        member(ident("Util"), "range"),
        [named("start", int(1)), arg(int(2))],
    );
    let checked = check(&symbols, Context::default(), &expr, &[]);
    assert!(checked.codes().contains(&"ARG_NAME_REQUIRED"), "{:?}", checked.codes());
}

#[test]
fn constructor_builds_instance() {
    let mut symbols = Symbols::with_default_types();
    let point = symbols.class("Point").define();
    symbols
        .method(point, CONSTRUCT)
        .kind(MethodKind::Constructor)
        .params(vec![Param::new("x", Type::int()), Param::new("y", Type::int())])
        .define();

    let expr = new(ty("Point"), [arg(int(1)), arg(int(2))]);
    let mut checked = check(&symbols, Context::default(), &expr, &[Type::nullary(point)]);
    assert_eq!(checked.resolution().target, CallTarget::Construct);
    assert_eq!(checked.types(), [Type::nullary(point)]);

    let code = checked.generate(&symbols);
    assert!(code.ops().iter().any(|op| matches!(op, Op::Construct { .. })));

    let expr = new(ty("Point"), []);
    let checked = check(&symbols, Context::default(), &expr, &[Type::nullary(point)]);
    assert!(checked.codes().contains(&"MISSING_CONSTRUCTOR"), "{:?}", checked.codes());
}

#[test]
fn conditional_result_assigns_rest_only_when_true() {
    let (mut symbols, util) = symbols_with_util();
    symbols
        .method(util, "tryParse")
        .kind(MethodKind::Function)
        .params(vec![Param::new("text", string_type())])
        .returns(vec![Type::boolean(), Type::int()])
        .conditional(true)
        .define();
    let mut ctx = Context::default();
    ctx.declare_var("ok", Type::boolean(), false);
    ctx.declare_var("val", Type::int(), false);
    ctx.declare_var("s", string_type(), true);

    let parse = call(member(ident("Util"), "tryParse"), [arg(ident("s"))]);
    let expr = assign(tuple([ident("ok"), ident("val")]), parse);
    let mut checked = check(&symbols, ctx, &expr, &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r3: c0
    var r4: c1
    call_1N c2(r2) -> (r3, r4)
    move r3 -> r0
    jump.if_not r3 @6
    move r4 -> r1
    c0 = type Boolean
    c1 = type Int
    c2 = method Util.tryParse(String)
    ");
}

#[test]
fn conditional_result_rejected_inside_tuple() {
    let (mut symbols, util) = symbols_with_util();
    symbols
        .method(util, "tryParse")
        .kind(MethodKind::Function)
        .params(vec![Param::new("text", string_type())])
        .returns(vec![Type::boolean(), Type::int()])
        .conditional(true)
        .define();
    let mut ctx = Context::default();
    ctx.declare_var("s", string_type(), true);

    let parse = call(member(ident("Util"), "tryParse"), [arg(ident("s"))]);
    let expr = tuple([parse, int(1)]);
    let required = Type::tuple([Type::tuple([Type::boolean(), Type::int()]), Type::int()]);
    let checked = check(&symbols, ctx, &expr, &[required]);
    assert!(
        checked.codes().contains(&"CONDITIONAL_RETURN_NOT_ALLOWED"),
        "{:?}",
        checked.codes()
    );
}

#[test]
fn repeated_resolution_is_deterministic() {
    let (mut symbols, util) = symbols_with_util();
    function(
        &mut symbols,
        util,
        "f",
        vec![Param::new("a", Type::int())],
        vec![],
    );
    function(&mut symbols, util, "f", vec![Param::new("a", float_type())], vec![]);

    let expr = call(member(ident("Util"), "f"), [arg(ident("a"))]);
    let mut tree = ExprTree::default();
    let mut ctx = Context::default();
    ctx.declare_var("a", Type::int(), true);
    let mut reporter = Reporter::default();
    let options = Options::default();
    let root = tree.lower(&expr);
    let mut validator = Validator::new(&mut tree, &mut ctx, &symbols, &mut reporter, &options);

    let root = validator.validate_multi(root, &[]).unwrap();
    let first = validator.resolve_method(root, &[], false).unwrap();
    let second = validator.resolve_method(root, &[], false).unwrap();
    assert_eq!(first, second);
    match validator.tree()[root].kind() {
        ExprKind::Invoke(invoke) => assert_eq!(invoke.resolution(), Some(&first)),
        other => panic!("expected an invocation, got {other:?}"),
    }
    assert!(reporter.is_empty());
}

fn define_pick(symbols: &mut Symbols, util: ClassId) {
    let t = Type::Formal("T".into());
    symbols
        .method(util, "pick")
        .kind(MethodKind::Function)
        .type_params(vec![TypeParam::new("T", Type::object())])
        .params(vec![Param::new("a", t.clone()), Param::new("b", t.clone())])
        .returns(vec![t])
        .define();
}

#[test]
fn conflicting_arguments_widen_type_parameter() {
    let (mut symbols, util) = symbols_with_util();
    define_pick(&mut symbols, util);
    let mut ctx = Context::default();
    ctx.declare_var("i", Type::int(), true);
    ctx.declare_var("o", Type::object(), true);

    let expr = call(member(ident("Util"), "pick"), [arg(ident("i")), arg(ident("o"))]);
    let checked = check(&symbols, ctx.clone(), &expr, &[]);
    assert_eq!(checked.resolution().type_params.get("T"), Some(&Type::object()));
    assert_eq!(checked.types(), [Type::object()]);

    let expr = call(member(ident("Util"), "pick"), [arg(ident("o")), arg(ident("i"))]);
    let checked = check(&symbols, ctx, &expr, &[]);
    assert_eq!(checked.types(), [Type::object()]);
}

#[test]
fn incompatible_arguments_leave_type_parameter_unresolved() {
    let (mut symbols, util) = symbols_with_util();
    define_pick(&mut symbols, util);
    let mut ctx = Context::default();
    ctx.declare_var("i", Type::int(), true);
    ctx.declare_var("s", string_type(), true);

    let expr = call(member(ident("Util"), "pick"), [arg(ident("i")), arg(ident("s"))]);
    let checked = check(&symbols, ctx, &expr, &[]);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"TYPE_PARAMS_UNRESOLVABLE"), "{:?}", checked.codes());
}

#[test]
fn narrowed_type_parameter_rejects_wider_argument() {
    let (mut symbols, util) = symbols_with_util();
    define_pick(&mut symbols, util);
    let mut ctx = Context::default();
    ctx.declare_var("i", Type::int(), true);
    ctx.declare_var("o", Type::object(), true);

    let expr = call(member(ident("Util"), "pick"), [arg(ident("i")), arg(ident("o"))]);
    let checked = check(&symbols, ctx, &expr, &[Type::int()]);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"WRONG_TYPE"), "{:?}", checked.codes());
}

#[test]
fn type_arguments_imply_leading_boolean_of_conditional_result() {
    let (mut symbols, util) = symbols_with_util();
    let try_parse = symbols
        .method(util, "tryParse")
        .kind(MethodKind::Function)
        .params(vec![Param::new("text", string_type())])
        .returns(vec![Type::boolean(), Type::int()])
        .conditional(true)
        .define();
    let mut ctx = Context::default();
    ctx.declare_var("ok", Type::boolean(), false);
    ctx.declare_var("val", Type::int(), false);
    ctx.declare_var("s", string_type(), true);

    let parse = || {
        let callee = with_type_args(member(ident("Util"), "tryParse"), [ty("Int")]);
        call(callee, [arg(ident("s"))])
    };
    let expr = assign(tuple([ident("ok"), ident("val")]), parse());
    let checked = check(&symbols, ctx.clone(), &expr, &[]);
    assert!(checked.codes().is_empty(), "{:?}", checked.codes());

    let checked = check(&symbols, ctx.clone(), &parse(), &[Type::int(), Type::int()]);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"WRONG_TYPE_ARITY"), "{:?}", checked.codes());

    let checked = check(&symbols, ctx, &parse(), &[]);
    assert_eq!(checked.resolution().method, Some(try_parse));
}

/// A static `Util` with `foo(Int, Int)` and `bar() -> Int`.
fn async_symbols() -> Symbols {
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

#[test]
fn async_call_without_receiver_produces_future() {
    let symbols = async_symbols();

    let expr = call_async(member(ident("Util"), "bar"), []);
    let mut checked = check(&symbols, Context::default(), &expr, &[]);
    assert!(checked.resolution().flags.auto_future());
    assert_eq!(checked.types(), [Type::future(Type::int())]);

    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c0
    call_01 c1() -> r0
    var r1: c0
    move.var r0 -> r1
    c0 = type FutureVar<Int>
    c1 = method Util.bar()
    ");
}

#[test]
fn discarded_async_results_are_not_awaited() {
    let symbols = async_symbols();
    let listing = |expr| {
        let mut checked = check(&symbols, Context::default(), &expr, &[]);
        let root = checked.root();
        let mut code = Emitter::new(checked.ctx.register_count());
        Generator::new(&checked.tree, &checked.ctx, &symbols, &mut code, &mut checked.reporter)
            .generate_void(root);
        let code = code.finish().unwrap();
        DisplayCode(&code, &symbols).to_string()
    };

    insta::assert_snapshot!(listing(call_async(member(ident("Util"), "bar"), [])), @r"
    call_01 c0() -> _^
    c0 = method Util.bar()
    ");
    let foo = call_async(member(ident("Util"), "foo"), [arg(int(1)), arg(int(2))]);
    insta::assert_snapshot!(listing(foo), @r"
    call_N1 c2(c0, c1) -> _^
    c0 = 1
    c1 = 2
    c2 = method Util.foo(Int, Int)
    ");
}

#[test]
fn async_result_is_never_left_on_the_stack() {
    let symbols = async_symbols();

    let expr = call(
        member(ident("Util"), "foo"),
        [arg(int(1)), arg(call_async(member(ident("Util"), "bar"), []))],
    );
    let mut checked = check(&symbols, Context::default(), &expr, &[]);
    let code = checked.generate(&symbols);
    insta::assert_snapshot!(DisplayCode(&code, &symbols), @r"
    var r0: c1
    call_01 c2() -> r0
    call_N0 c3(c0, r0)
    c0 = 1
    c1 = type Int
    c2 = method Util.bar()
    c3 = method Util.foo(Int, Int)
    ");
}

#[test]
fn partial_application_cannot_be_async() {
    let symbols = async_symbols();

    let expr = call_async(member(ident("Util"), "foo"), [arg(int(1)), arg(unbound())]);
    let curried = Type::function([Type::int()], [Type::int()]);
    let checked = check(&symbols, Context::default(), &expr, &[curried]);
    assert_eq!(checked.root, None);
    assert!(checked.codes().contains(&"ASYNC_NOT_ALLOWED"), "{:?}", checked.codes());
}
