#![allow(dead_code)]

use std::fmt;

use vesper_bytecode::Op;
use vesper_compiler_frontend::ast::SourceExpr;
use vesper_compiler_frontend::expr::{
    ExprId, ExprKind, ExprTree, Generator, InvokeResolution, NameExpr, Validator,
};
use vesper_compiler_frontend::{
    ClassId, Code, Context, Emitter, MethodId, MethodKind, Options, Param, Reporter, Symbols,
    Type, predef,
};

/// An expression after validation, together with everything needed to generate it.
pub struct Checked<'src> {
    pub tree: ExprTree<'src>,
    pub root: Option<ExprId>,
    pub ctx: Context,
    pub reporter: Reporter,
}

impl<'src> Checked<'src> {
    pub fn root(&self) -> ExprId {
        self.root
            .unwrap_or_else(|| panic!("validation failed: {:?}", self.codes()))
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.reporter.codes().collect()
    }

    pub fn types(&self) -> Vec<Type> {
        self.tree[self.root()]
            .validated()
            .map(|validated| validated.types().to_vec())
            .unwrap_or_default()
    }

    pub fn name(&self) -> &NameExpr<'src> {
        match self.tree[self.root()].kind() {
            ExprKind::Name(name) => name,
            other => panic!("expected a name, got {other:?}"),
        }
    }

    pub fn resolution(&self) -> &InvokeResolution {
        match self.tree[self.root()].kind() {
            ExprKind::Invoke(invoke) => invoke.resolution().expect("invocation is resolved"),
            other => panic!("expected an invocation, got {other:?}"),
        }
    }

    /// Generates the expression, for its side effects when it is void and into temporaries
    /// otherwise.
    pub fn generate(&mut self, symbols: &Symbols) -> Code {
        let root = self.root();
        let void = self.tree[root]
            .validated()
            .is_some_and(|validated| validated.types().is_empty());

        let mut code = Emitter::new(self.ctx.register_count());
        let mut generator =
            Generator::new(&self.tree, &self.ctx, symbols, &mut code, &mut self.reporter);
        if void {
            generator.generate_void(root);
        } else {
            generator.generate_arguments(root, false, false);
        }
        code.finish().expect("every label is marked")
    }
}

pub fn check<'src>(
    symbols: &Symbols,
    ctx: Context,
    expr: &SourceExpr<'src>,
    required: &[Type],
) -> Checked<'src> {
    check_with(symbols, ctx, expr, required, &Options::default())
}

pub fn check_with<'src>(
    symbols: &Symbols,
    mut ctx: Context,
    expr: &SourceExpr<'src>,
    required: &[Type],
    options: &Options,
) -> Checked<'src> {
    let mut reporter = Reporter::default();
    let mut tree = ExprTree::default();
    let root = tree.lower(expr);
    let root = Validator::new(&mut tree, &mut ctx, symbols, &mut reporter, options)
        .validate_multi(root, required);
    Checked {
        tree,
        root,
        ctx,
        reporter,
    }
}

/// Renders generated code without addresses, followed by its constant pool.
pub struct DisplayCode<'a>(pub &'a Code, pub &'a Symbols);

impl fmt::Display for DisplayCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in self.0.ops() {
            writeln!(f, "{op}")?;
        }
        for (i, constant) in self.0.constants().iter().enumerate() {
            writeln!(f, "c{i} = {}", constant.display(self.1))?;
        }
        Ok(())
    }
}

pub fn position(code: &Code, pred: impl Fn(&Op) -> bool) -> Option<usize> {
    code.ops().iter().position(pred)
}

/// The default types plus an empty static `Util` class to hang functions on.
pub fn symbols_with_util() -> (Symbols, ClassId) {
    let mut symbols = Symbols::with_default_types();
    let util = symbols.class("Util").is_static(true).define();
    (symbols, util)
}

pub fn function(
    symbols: &mut Symbols,
    owner: ClassId,
    name: &str,
    params: Vec<Param>,
    returns: Vec<Type>,
) -> MethodId {
    symbols
        .method(owner, name)
        .kind(MethodKind::Function)
        .params(params)
        .returns(returns)
        .define()
}

pub fn float_type() -> Type {
    Type::nullary(predef::FLOAT)
}

pub fn string_type() -> Type {
    Type::nullary(predef::STRING)
}
