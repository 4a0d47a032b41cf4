mod expr;
mod files;
mod span;

#[cfg(feature = "testing")]
pub mod build;

pub use expr::{Arg, AssignOp, Constant, Expr, IncDec, TypeName};
pub use files::{File, SourceLoc, SourceMap};
pub use span::{FileId, Span};

pub type Spanned<A> = (A, Span);

pub type SourceExpr<'src> = Spanned<Expr<'src>>;
pub type SourceArg<'src> = Arg<'src>;
pub type SourceTypeName<'src> = Spanned<TypeName<'src>>;
