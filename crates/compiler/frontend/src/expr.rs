mod assignable;
mod generate;
mod invoke;
mod literal;
mod lower;
mod name;
mod ops;
mod tree;
mod validate;

pub use assignable::Assignable;
pub use generate::{Affect, Generator};
pub use invoke::{CallTarget, InvokeArg, InvokeExpr, InvokeFlags, InvokeResolution};
pub use lower::CONSTRUCT;
pub use name::{Meaning, NameExpr, Plan, PropertyAccess, RawArg, Reserved, TargetInfo, TargetMember};
pub use tree::{ExprId, ExprKind, ExprTree, Node, NodeFlags, Validated};
pub use validate::Validator;
