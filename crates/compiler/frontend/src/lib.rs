mod code;
mod constant;
mod context;
mod diagnostic;
pub mod expr;
mod fit;
mod symbols;
pub mod types;
mod utils;

pub use code::{Code, Emitter};
pub use constant::{Constant, Float};
pub use context::{Context, LabelInfo, Local, ScopeKind, Var};
pub use diagnostic::{Error, Reporter, Severity, UnknownSource};
pub use fit::{TypeFit, calc_fit, calc_fit_multi};
pub use symbols::{
    ClassDef, ClassKind, Global, MethodDef, MethodKind, Param, PropertyDef, Symbols, TypeParam,
    TypedefDef,
};
pub use types::{
    ClassId, FunctionType, MethodId, Name, PropertyId, RefKind, Type, TypeApp, TypeList,
    TypedefId, predef,
};
pub use vesper_ast as ast;

type IndexMap<K, V, S = hashbrown::DefaultHashBuilder> = indexmap::IndexMap<K, V, S>;
type IndexSet<K, S = hashbrown::DefaultHashBuilder> = indexmap::IndexSet<K, S>;

/// Switches that change how expressions are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Lets `value.name(args)` fall back to a function `name` on the type of `value` that takes
    /// the value as its first argument.
    pub receiver_rewrite: bool,
    /// Validates a copy of an expression when a cheap fit test is inconclusive.
    pub exhaustive_fit_testing: bool,
    pub warnings_as_errors: bool,
    /// Lets a short-circuiting expression escape to the root of the tree, where the caller
    /// provides the label to jump to.
    pub allow_short_circuit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            receiver_rewrite: true,
            exhaustive_fit_testing: true,
            warnings_as_errors: false,
            allow_short_circuit: false,
        }
    }
}
