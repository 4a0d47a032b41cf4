use std::fmt;
use std::rc::Rc;

use itertools::Itertools;

use crate::Symbols;
use crate::symbols::MethodKind;
use crate::types::{ClassId, MethodId, Name, PropertyId, Type, predef};
use crate::utils::DisplayFn;

/// A compile-time value. Constants are interned into the constant pool of generated code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i64),
    Float(Float),
    Bool(bool),
    Char(char),
    String(Rc<str>),
    Null,
    Tuple(Rc<[Constant]>),
    Type(Type),
    Singleton(ClassId),
    Property(PropertyId),
    Method(MethodId),
    /// The runtime value of a formal type parameter of `this`.
    FormalChild(Name),
    /// Stands in for a value that failed validation, keeping constant lists the required shape.
    Placeholder(Type),
}

impl Constant {
    pub fn type_of(&self, symbols: &Symbols) -> Type {
        match self {
            Self::Int(_) => Type::int(),
            Self::Float(_) => Type::nullary(predef::FLOAT),
            Self::Bool(_) => Type::boolean(),
            Self::Char(_) => Type::nullary(predef::CHAR),
            Self::String(_) => Type::nullary(predef::STRING),
            Self::Null => Type::nullary(predef::NULL),
            Self::Tuple(items) => Type::tuple(
                items
                    .iter()
                    .map(|c| c.type_of(symbols))
                    .collect::<Rc<_>>(),
            ),
            Self::Type(typ) => Type::meta(typ.clone()),
            Self::Singleton(class) => Type::nullary(*class),
            Self::Property(id) => {
                let prop = &symbols[*id];
                Type::Property(prop.owner(), prop.typ().clone().into())
            }
            Self::Method(id) => {
                let method = &symbols[*id];
                let sig = method.signature().into();
                match method.kind() {
                    MethodKind::Method => Type::Method(method.owner(), sig),
                    MethodKind::Function | MethodKind::Constructor => Type::Function(sig),
                }
            }
            Self::FormalChild(name) => Type::meta(Type::Formal(name.clone())),
            Self::Placeholder(typ) => typ.clone(),
        }
    }

    /// Applies an implicit conversion at compile time. Returns `None` when the conversion can
    /// only happen at runtime.
    pub fn convert(&self, conversion: MethodId, symbols: &Symbols) -> Option<Self> {
        match (self, symbols[conversion].name()) {
            (Self::Int(i), "toFloat") => Some(Self::Float(Float::from(*i as f64))),
            (Self::Int(i), "toString") => Some(Self::String(i.to_string().into())),
            (Self::Char(c), "toString") => Some(Self::String(c.to_string().into())),
            (Self::Char(c), "toInt") => Some(Self::Int(i64::from(u32::from(*c)))),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Constant {
    /// Renders the constant with symbol names resolved, as it appears in code listings.
    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> impl fmt::Display + use<'a> {
        DisplayFn::new(move |f: &mut fmt::Formatter<'_>| match self {
            Self::Tuple(items) => write!(
                f,
                "({})",
                items.iter().map(|c| c.display(symbols)).format(", ")
            ),
            Self::Type(typ) => write!(f, "type {}", typ.display(symbols)),
            Self::Singleton(class) => write!(f, "singleton {}", symbols[*class].name()),
            Self::Property(id) => {
                let prop = &symbols[*id];
                write!(f, "property {}.{}", symbols[prop.owner()].name(), prop.name())
            }
            Self::Method(id) => {
                let method = &symbols[*id];
                write!(
                    f,
                    "method {}.{}",
                    symbols[method.owner()].name(),
                    symbols.display_method(*id)
                )
            }
            Self::FormalChild(name) => write!(f, "formal {name}"),
            Self::Placeholder(typ) => write!(f, "placeholder {}", typ.display(symbols)),
            other => write!(f, "{other}"),
        })
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", v.get()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Null => f.write_str("null"),
            Self::Tuple(items) => write!(f, "({})", items.iter().format(", ")),
            Self::Type(_) => f.write_str("<type>"),
            Self::Singleton(class) => write!(f, "<singleton {}>", class.index()),
            Self::Property(id) => write!(f, "<property {}>", id.index()),
            Self::Method(id) => write!(f, "<method {}>", id.index()),
            Self::FormalChild(name) => write!(f, "<formal {name}>"),
            Self::Placeholder(_) => f.write_str("<error>"),
        }
    }
}

/// A float stored by its bit pattern so that constants can be hashed and interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Float(u64);

impl Float {
    #[inline]
    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for Float {
    #[inline]
    fn from(value: f64) -> Self {
        Self(value.to_bits())
    }
}
