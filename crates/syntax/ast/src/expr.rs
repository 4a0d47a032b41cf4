use std::fmt;

use crate::Spanned;

/// An expression as produced by the parser. The semantic core lowers it into its own arena
/// representation before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'src> {
    /// `name`, `left.name`, `name<T>` or `&name`.
    Ident {
        left: Option<Box<Spanned<Self>>>,
        name: &'src str,
        type_args: Box<[Spanned<TypeName<'src>>]>,
        no_deref: bool,
    },
    /// `callee(args)`, or `callee^(args)` when `is_async`.
    Call {
        callee: Box<Spanned<Self>>,
        args: Box<[Arg<'src>]>,
        is_async: bool,
    },
    New {
        typ: Spanned<TypeName<'src>>,
        args: Box<[Arg<'src>]>,
    },
    Constant(Constant<'src>),
    Tuple(Box<[Spanned<Self>]>),
    Index {
        target: Box<Spanned<Self>>,
        indices: Box<[Spanned<Self>]>,
    },
    IncDec {
        op: IncDec,
        operand: Box<Spanned<Self>>,
    },
    Assign {
        op: Option<AssignOp>,
        place: Box<Spanned<Self>>,
        value: Box<Spanned<Self>>,
    },
    /// `expr?`, short-circuits when `expr` is null.
    NotNull(Box<Spanned<Self>>),
    /// `_` or `<T> _` in an argument position.
    Unbound(Option<Spanned<TypeName<'src>>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg<'src> {
    pub name: Option<Spanned<&'src str>>,
    pub value: Spanned<Expr<'src>>,
}

impl<'src> Arg<'src> {
    #[inline]
    pub fn positional(value: Spanned<Expr<'src>>) -> Self {
        Self { name: None, value }
    }

    #[inline]
    pub fn named(name: Spanned<&'src str>, value: Spanned<Expr<'src>>) -> Self {
        Self {
            name: Some(name),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant<'src> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    String(&'src str),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeName<'src> {
    Named {
        name: &'src str,
        args: Box<[Spanned<Self>]>,
    },
    Tuple(Box<[Spanned<Self>]>),
    Function {
        params: Box<[Spanned<Self>]>,
        returns: Box<[Spanned<Self>]>,
    },
    Nullable(Box<Spanned<Self>>),
}

impl TypeName<'_> {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Spanned<TypeName<'_>>]) -> fmt::Result {
            for (i, (item, _)) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Named { name, args } if args.is_empty() => f.write_str(name),
            Self::Named { name, args } => {
                write!(f, "{name}<")?;
                list(f, args)?;
                f.write_str(">")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                list(f, items)?;
                f.write_str(")")
            }
            Self::Function { params, returns } => {
                f.write_str("function (")?;
                list(f, returns)?;
                f.write_str(") (")?;
                list(f, params)?;
                f.write_str(")")
            }
            Self::Nullable(inner) => write!(f, "{}?", inner.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncDec {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    ShrAll,
    And,
    Or,
    Xor,
}

impl AssignOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
            Self::Mod => "%=",
            Self::Shl => "<<=",
            Self::Shr => ">>=",
            Self::ShrAll => ">>>=",
            Self::And => "&=",
            Self::Or => "|=",
            Self::Xor => "^=",
        }
    }
}
