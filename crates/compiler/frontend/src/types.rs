use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use smallvec::SmallVec;

use crate::Symbols;
use crate::utils::DisplayFn;

pub type Name = Rc<str>;

/// The ordered result types of an expression: empty for void, one element for a single value.
pub type TypeList = SmallVec<[Type; 2]>;

macro_rules! ids {
    ($($(#[$meta:meta])* $id:ident),*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $id(u32);

            impl $id {
                #[inline]
                pub(crate) fn new(index: usize) -> Self {
                    Self(u32::try_from(index).unwrap_or(u32::MAX))
                }

                #[inline]
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

ids! {
    ClassId,
    MethodId,
    PropertyId,
    TypedefId
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Data(TypeApp),
    /// A formal type parameter of the enclosing class or method.
    Formal(Name),
    Tuple(Rc<[Type]>),
    Function(Rc<FunctionType>),
    /// An unbound method of the given class. Binding a target turns it into a function.
    Method(ClassId, Rc<FunctionType>),
    Ref(RefKind, Rc<Type>),
    /// The property metaobject of a property declared on the given class.
    Property(ClassId, Rc<Type>),
    /// The type of a type, `Type<T>`.
    Meta(Rc<Type>),
    Immutable(Rc<Type>),
    Nullable(Rc<Type>),
}

impl Type {
    #[inline]
    pub fn nullary(id: ClassId) -> Self {
        Self::Data(TypeApp::nullary(id))
    }

    #[inline]
    pub fn app(id: ClassId, args: impl Into<Rc<[Type]>>) -> Self {
        Self::Data(TypeApp::new(id, args))
    }

    #[inline]
    pub fn tuple(items: impl Into<Rc<[Type]>>) -> Self {
        Self::Tuple(items.into())
    }

    pub fn function(
        params: impl IntoIterator<Item = Type>,
        returns: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self::Function(FunctionType::new(params, returns, false).into())
    }

    #[inline]
    pub fn meta(inner: Type) -> Self {
        Self::Meta(inner.into())
    }

    /// The type of a variable that receives the result of an asynchronous call.
    #[inline]
    pub fn future(inner: Type) -> Self {
        Self::Ref(RefKind::Future, inner.into())
    }

    #[inline]
    pub fn nullable(inner: Type) -> Self {
        match inner {
            Self::Nullable(_) => inner,
            other => Self::Nullable(other.into()),
        }
    }

    #[inline]
    pub fn object() -> Self {
        Self::nullary(predef::OBJECT)
    }

    #[inline]
    pub fn boolean() -> Self {
        Self::nullary(predef::BOOLEAN)
    }

    #[inline]
    pub fn int() -> Self {
        Self::nullary(predef::INT)
    }

    /// Strips the immutability modifier, which does not affect member lookup.
    pub fn strip_immutable(&self) -> &Self {
        match self {
            Self::Immutable(inner) => inner.strip_immutable(),
            other => other,
        }
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Immutable(_))
    }

    pub fn app_of(&self) -> Option<&TypeApp> {
        match self.strip_immutable() {
            Self::Data(app) => Some(app),
            _ => None,
        }
    }

    #[inline]
    pub fn class_id(&self) -> Option<ClassId> {
        self.app_of().map(TypeApp::id)
    }

    #[inline]
    pub fn is_class(&self, id: ClassId) -> bool {
        self.class_id() == Some(id)
    }

    pub fn tuple_elements(&self) -> Option<&[Type]> {
        match self.strip_immutable() {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self.strip_immutable() {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn strip_nullable(&self) -> Option<&Type> {
        match self.strip_immutable() {
            Self::Nullable(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn substitute(&self, env: &impl Fn(&str) -> Option<Type>) -> Self {
        match self {
            Self::Formal(name) => env(name).unwrap_or_else(|| self.clone()),
            Self::Data(app) if app.args.is_empty() => self.clone(),
            Self::Data(app) => {
                let args = app.args.iter().map(|t| t.substitute(env));
                Self::app(app.id, args.collect::<Rc<_>>())
            }
            Self::Tuple(items) => Self::Tuple(items.iter().map(|t| t.substitute(env)).collect()),
            Self::Function(func) => Self::Function(func.substitute(env).into()),
            Self::Method(class, func) => Self::Method(*class, func.substitute(env).into()),
            Self::Ref(kind, inner) => Self::Ref(*kind, inner.substitute(env).into()),
            Self::Property(class, inner) => Self::Property(*class, inner.substitute(env).into()),
            Self::Meta(inner) => Self::Meta(inner.substitute(env).into()),
            Self::Immutable(inner) => Self::Immutable(inner.substitute(env).into()),
            Self::Nullable(inner) => Self::nullable(inner.substitute(env)),
        }
    }

    pub fn mentions_formal(&self, name: &str) -> bool {
        match self {
            Self::Formal(formal) => &**formal == name,
            Self::Data(app) => app.args.iter().any(|t| t.mentions_formal(name)),
            Self::Tuple(items) => items.iter().any(|t| t.mentions_formal(name)),
            Self::Function(func) | Self::Method(_, func) => func
                .params
                .iter()
                .chain(func.returns.iter())
                .any(|t| t.mentions_formal(name)),
            Self::Ref(_, inner)
            | Self::Property(_, inner)
            | Self::Meta(inner)
            | Self::Immutable(inner)
            | Self::Nullable(inner) => inner.mentions_formal(name),
        }
    }

    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> impl fmt::Display + use<'a> {
        DisplayFn::new(move |f: &mut fmt::Formatter<'_>| match self {
            Self::Data(app) => {
                f.write_str(symbols[app.id].name())?;
                if !app.args.is_empty() {
                    write!(f, "<{}>", app.args.iter().map(|t| t.display(symbols)).format(", "))?;
                }
                Ok(())
            }
            Self::Formal(name) => f.write_str(name),
            Self::Tuple(items) => write!(
                f,
                "Tuple<{}>",
                items.iter().map(|t| t.display(symbols)).format(", ")
            ),
            Self::Function(func) => write!(f, "function {}", func.display(symbols)),
            Self::Method(class, func) => {
                write!(f, "Method<{}> {}", symbols[*class].name(), func.display(symbols))
            }
            Self::Ref(RefKind::Ref, inner) => write!(f, "Ref<{}>", inner.display(symbols)),
            Self::Ref(RefKind::Var, inner) => write!(f, "Var<{}>", inner.display(symbols)),
            Self::Ref(RefKind::Future, inner) => {
                write!(f, "FutureVar<{}>", inner.display(symbols))
            }
            Self::Property(class, inner) => write!(
                f,
                "Property<{}, {}>",
                symbols[*class].name(),
                inner.display(symbols)
            ),
            Self::Meta(inner) => write!(f, "Type<{}>", inner.display(symbols)),
            Self::Immutable(inner) => write!(f, "immutable {}", inner.display(symbols)),
            Self::Nullable(inner) => write!(f, "{}?", inner.display(symbols)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeApp {
    id: ClassId,
    args: Rc<[Type]>,
}

impl TypeApp {
    #[inline]
    pub fn new(id: ClassId, args: impl Into<Rc<[Type]>>) -> Self {
        Self {
            id,
            args: args.into(),
        }
    }

    #[inline]
    pub fn nullary(id: ClassId) -> Self {
        Self::new(id, [])
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn args(&self) -> &[Type] {
        &self.args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Box<[Type]>,
    pub returns: Box<[Type]>,
    /// The first return value is a boolean, and the rest are only valid when it is `true`.
    pub conditional: bool,
}

impl FunctionType {
    pub fn new(
        params: impl IntoIterator<Item = Type>,
        returns: impl IntoIterator<Item = Type>,
        conditional: bool,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            returns: returns.into_iter().collect(),
            conditional,
        }
    }

    pub fn substitute(&self, env: &impl Fn(&str) -> Option<Type>) -> Self {
        Self {
            params: self.params.iter().map(|t| t.substitute(env)).collect(),
            returns: self.returns.iter().map(|t| t.substitute(env)).collect(),
            conditional: self.conditional,
        }
    }

    /// Removes the parameters at the given positions, producing the type of a partially applied
    /// function.
    pub fn bind_params(&self, bound: impl Fn(usize) -> bool) -> Self {
        Self {
            params: self
                .params
                .iter()
                .enumerate()
                .filter(|(i, _)| !bound(*i))
                .map(|(_, t)| t.clone())
                .collect(),
            returns: self.returns.clone(),
            conditional: self.conditional,
        }
    }

    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> impl fmt::Display + use<'a> {
        DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
            let cond = if self.conditional { "conditional " } else { "" };
            write!(
                f,
                "{cond}({}) ({})",
                self.returns.iter().map(|t| t.display(symbols)).format(", "),
                self.params.iter().map(|t| t.display(symbols)).format(", ")
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A read-only reference.
    Ref,
    /// A reference that can also be written through.
    Var,
    /// A variable whose value is produced by an asynchronous call.
    Future,
}

pub mod predef {
    use super::ClassId;

    macro_rules! classes {
        ($($id:ident = $idx:literal => $name:literal),*) => {
            $(pub const $id: ClassId = ClassId($idx);)*

            pub(crate) const ALL: &[(ClassId, &str)] = &[$(($id, $name)),*];
        };
    }

    classes! {
        OBJECT = 0 => "Object",
        BOOLEAN = 1 => "Boolean",
        INT = 2 => "Int",
        FLOAT = 3 => "Float",
        CHAR = 4 => "Char",
        STRING = 5 => "String",
        NULL = 6 => "Null",
        ARRAY = 7 => "Array"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_replaces_formals_everywhere() {
        let elem = Type::Formal("Element".into());
        let typ = Type::function([elem.clone()], [Type::tuple([elem.clone(), Type::int()])]);
        let env = |name: &str| (name == "Element").then(Type::boolean);

        assert!(typ.mentions_formal("Element"));
        assert_eq!(
            typ.substitute(&env),
            Type::function([Type::boolean()], [Type::tuple([Type::boolean(), Type::int()])])
        );
    }

    #[test]
    fn binding_params_removes_positions() {
        let func = FunctionType::new([Type::int(), Type::boolean(), Type::int()], [], false);
        let bound = func.bind_params(|i| i != 1);
        assert_eq!(&*bound.params, &[Type::boolean()]);
    }
}
