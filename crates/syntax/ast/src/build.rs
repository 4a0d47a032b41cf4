//! Terse constructors for building expression trees by hand in tests.
use crate::{Arg, AssignOp, Constant, Expr, FileId, IncDec, SourceExpr, Span, Spanned, TypeName};

#[inline]
pub fn span() -> Span {
    Span::empty(FileId::from_u32(0))
}

fn spanned<A>(value: A) -> Spanned<A> {
    (value, span())
}

pub fn ident(name: &str) -> SourceExpr<'_> {
    spanned(Expr::Ident {
        left: None,
        name,
        type_args: [].into(),
        no_deref: false,
    })
}

pub fn member<'src>(left: SourceExpr<'src>, name: &'src str) -> SourceExpr<'src> {
    spanned(Expr::Ident {
        left: Some(left.into()),
        name,
        type_args: [].into(),
        no_deref: false,
    })
}

/// Marks a name with `&`, suppressing its dereference.
pub fn no_deref(expr: SourceExpr<'_>) -> SourceExpr<'_> {
    match expr {
        (Expr::Ident { left, name, type_args, .. }, span) => (
            Expr::Ident {
                left,
                name,
                type_args,
                no_deref: true,
            },
            span,
        ),
        other => other,
    }
}

pub fn with_type_args<'src>(
    expr: SourceExpr<'src>,
    args: impl IntoIterator<Item = TypeName<'src>>,
) -> SourceExpr<'src> {
    match expr {
        (Expr::Ident { left, name, no_deref, .. }, span) => (
            Expr::Ident {
                left,
                name,
                type_args: args.into_iter().map(spanned).collect(),
                no_deref,
            },
            span,
        ),
        other => other,
    }
}

pub fn call<'src>(
    callee: SourceExpr<'src>,
    args: impl IntoIterator<Item = Arg<'src>>,
) -> SourceExpr<'src> {
    spanned(Expr::Call {
        callee: callee.into(),
        args: args.into_iter().collect(),
        is_async: false,
    })
}

pub fn call_async<'src>(
    callee: SourceExpr<'src>,
    args: impl IntoIterator<Item = Arg<'src>>,
) -> SourceExpr<'src> {
    spanned(Expr::Call {
        callee: callee.into(),
        args: args.into_iter().collect(),
        is_async: true,
    })
}

pub fn new<'src>(
    typ: TypeName<'src>,
    args: impl IntoIterator<Item = Arg<'src>>,
) -> SourceExpr<'src> {
    spanned(Expr::New {
        typ: spanned(typ),
        args: args.into_iter().collect(),
    })
}

#[inline]
pub fn arg(value: SourceExpr<'_>) -> Arg<'_> {
    Arg::positional(value)
}

pub fn named<'src>(name: &'src str, value: SourceExpr<'src>) -> Arg<'src> {
    Arg::named(spanned(name), value)
}

pub fn unbound() -> SourceExpr<'static> {
    spanned(Expr::Unbound(None))
}

pub fn unbound_typed(typ: TypeName<'_>) -> SourceExpr<'_> {
    spanned(Expr::Unbound(Some(spanned(typ))))
}

pub fn int(value: i64) -> SourceExpr<'static> {
    spanned(Expr::Constant(Constant::Int(value)))
}

pub fn float(value: f64) -> SourceExpr<'static> {
    spanned(Expr::Constant(Constant::Float(value)))
}

pub fn bool(value: bool) -> SourceExpr<'static> {
    spanned(Expr::Constant(Constant::Bool(value)))
}

pub fn char(value: char) -> SourceExpr<'static> {
    spanned(Expr::Constant(Constant::Char(value)))
}

pub fn string(value: &str) -> SourceExpr<'_> {
    spanned(Expr::Constant(Constant::String(value)))
}

pub fn null() -> SourceExpr<'static> {
    spanned(Expr::Constant(Constant::Null))
}

pub fn tuple<'src>(items: impl IntoIterator<Item = SourceExpr<'src>>) -> SourceExpr<'src> {
    spanned(Expr::Tuple(items.into_iter().collect()))
}

pub fn index<'src>(
    target: SourceExpr<'src>,
    indices: impl IntoIterator<Item = SourceExpr<'src>>,
) -> SourceExpr<'src> {
    spanned(Expr::Index {
        target: target.into(),
        indices: indices.into_iter().collect(),
    })
}

pub fn inc_dec(op: IncDec, operand: SourceExpr<'_>) -> SourceExpr<'_> {
    spanned(Expr::IncDec {
        op,
        operand: operand.into(),
    })
}

pub fn assign<'src>(place: SourceExpr<'src>, value: SourceExpr<'src>) -> SourceExpr<'src> {
    spanned(Expr::Assign {
        op: None,
        place: place.into(),
        value: value.into(),
    })
}

pub fn compound<'src>(
    op: AssignOp,
    place: SourceExpr<'src>,
    value: SourceExpr<'src>,
) -> SourceExpr<'src> {
    spanned(Expr::Assign {
        op: Some(op),
        place: place.into(),
        value: value.into(),
    })
}

pub fn not_null(expr: SourceExpr<'_>) -> SourceExpr<'_> {
    spanned(Expr::NotNull(expr.into()))
}

pub fn ty(name: &str) -> TypeName<'_> {
    TypeName::Named {
        name,
        args: [].into(),
    }
}

pub fn ty_app<'src>(
    name: &'src str,
    args: impl IntoIterator<Item = TypeName<'src>>,
) -> TypeName<'src> {
    TypeName::Named {
        name,
        args: args.into_iter().map(spanned).collect(),
    }
}

pub fn tuple_ty<'src>(items: impl IntoIterator<Item = TypeName<'src>>) -> TypeName<'src> {
    TypeName::Tuple(items.into_iter().map(spanned).collect())
}

pub fn nullable(inner: TypeName<'_>) -> TypeName<'_> {
    TypeName::Nullable(Box::new(spanned(inner)))
}
