use std::{fmt, ops};

use bon::bon;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::constant::Constant;
use crate::types::{
    ClassId, FunctionType, MethodId, Name, PropertyId, RefKind, Type, TypeApp, TypedefId, predef,
};
use crate::utils::DisplayFn;
use crate::{IndexMap, IndexSet};

/// The declarations visible to the expressions being compiled: classes with their members and
/// global typedefs.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    classes: Vec<ClassDef>,
    methods: Vec<MethodDef>,
    properties: Vec<PropertyDef>,
    typedefs: Vec<TypedefDef>,
    globals: IndexMap<Name, Global>,
}

#[bon]
impl Symbols {
    pub fn with_default_types() -> Self {
        let mut symbols = Self::default();
        for &(id, name) in predef::ALL {
            let kind = match id {
                predef::OBJECT => ClassKind::Interface,
                predef::ARRAY => ClassKind::Class,
                _ => ClassKind::Const,
            };
            let params = if id == predef::ARRAY {
                vec![TypeParam::new("Element", Type::object())]
            } else {
                vec![]
            };
            let defined = symbols.class(name).kind(kind).params(params).define();
            debug_assert_eq!(defined, id);
        }

        let float = Type::nullary(predef::FLOAT);
        let string = Type::nullary(predef::STRING);
        let element = Type::Formal("Element".into());

        symbols
            .method(predef::INT, "toFloat")
            .returns(vec![float])
            .auto(true)
            .define();
        symbols
            .method(predef::INT, "toString")
            .returns(vec![string.clone()])
            .define();
        symbols
            .method(predef::CHAR, "toString")
            .returns(vec![string])
            .auto(true)
            .define();
        symbols
            .method(predef::ARRAY, "getElement")
            .params(vec![Param::new("index", Type::int())])
            .returns(vec![element.clone()])
            .define();
        symbols
            .method(predef::ARRAY, "setElement")
            .params(vec![
                Param::new("index", Type::int()),
                Param::new("value", element),
            ])
            .define();
        symbols
            .property(predef::ARRAY, "size", Type::int())
            .readonly(true)
            .define();
        symbols
            .property(predef::STRING, "size", Type::int())
            .readonly(true)
            .define();

        symbols
    }

    #[builder(finish_fn = define)]
    pub fn class(
        &mut self,
        #[builder(start_fn)] name: &str,
        #[builder(default)] kind: ClassKind,
        #[builder(default)] params: Vec<TypeParam>,
        #[builder(default)] supers: Vec<Type>,
        parent: Option<ClassId>,
        #[builder(default)] is_static: bool,
    ) -> ClassId {
        let id = ClassId::new(self.classes.len());
        let name: Name = name.into();
        match parent {
            Some(parent) => {
                self.classes[parent.index()]
                    .children
                    .insert(name.clone(), id);
            }
            None => {
                self.globals.insert(name.clone(), Global::Class(id));
            }
        }
        self.classes.push(ClassDef {
            name,
            kind,
            params: params.into(),
            supers: supers.into(),
            parent,
            is_static,
            methods: IndexMap::default(),
            properties: IndexMap::default(),
            children: IndexMap::default(),
        });
        id
    }

    #[builder(finish_fn = define)]
    pub fn method(
        &mut self,
        #[builder(start_fn)] owner: ClassId,
        #[builder(start_fn)] name: &str,
        #[builder(default)] kind: MethodKind,
        #[builder(default)] type_params: Vec<TypeParam>,
        #[builder(default)] params: Vec<Param>,
        #[builder(default)] returns: Vec<Type>,
        #[builder(default)] conditional: bool,
        #[builder(default)] auto: bool,
    ) -> MethodId {
        let id = MethodId::new(self.methods.len());
        let name: Name = name.into();
        self.classes[owner.index()]
            .methods
            .entry(name.clone())
            .or_default()
            .push(id);
        self.methods.push(MethodDef {
            name,
            owner,
            kind,
            type_params: type_params.into(),
            params: params.into(),
            returns: returns.into(),
            conditional,
            auto,
        });
        id
    }

    #[builder(finish_fn = define)]
    pub fn property(
        &mut self,
        #[builder(start_fn)] owner: ClassId,
        #[builder(start_fn)] name: &str,
        #[builder(start_fn)] typ: Type,
        #[builder(default)] is_static: bool,
        constant: Option<Constant>,
        #[builder(default)] readonly: bool,
    ) -> PropertyId {
        let id = PropertyId::new(self.properties.len());
        let name: Name = name.into();
        self.classes[owner.index()]
            .properties
            .insert(name.clone(), id);
        self.properties.push(PropertyDef {
            name,
            owner,
            typ,
            is_static,
            constant,
            readonly,
        });
        id
    }

    pub fn typedef(&mut self, name: &str, typ: Type) -> TypedefId {
        let id = TypedefId::new(self.typedefs.len());
        let name: Name = name.into();
        self.globals.insert(name.clone(), Global::Typedef(id));
        self.typedefs.push(TypedefDef { name, typ });
        id
    }

    #[inline]
    pub fn global(&self, name: &str) -> Option<Global> {
        self.globals.get(name).copied()
    }

    /// The type of `this` inside the given class: the class applied to its own formal types.
    pub fn this_type(&self, class: ClassId) -> Type {
        let params = &self[class].params;
        Type::app(
            class,
            params
                .iter()
                .map(|p| Type::Formal(p.name.clone()))
                .collect::<Vec<_>>(),
        )
    }

    /// Walks the class of `typ` and all of its supertypes, most derived first.
    fn class_chain(&self, typ: &Type) -> IndexSet<ClassId> {
        let mut chain = IndexSet::default();
        let root = match typ.strip_immutable() {
            Type::Data(app) => app.id(),
            _ => predef::OBJECT,
        };
        chain.insert(root);
        let mut i = 0;
        while let Some(&class) = chain.get_index(i) {
            for sup in self[class].supers.iter() {
                if let Some(id) = sup.class_id() {
                    chain.insert(id);
                }
            }
            i += 1;
        }
        chain.insert(predef::OBJECT);
        chain
    }

    pub fn lookup_methods(&self, typ: &Type, name: &str) -> SmallVec<[MethodId; 4]> {
        let mut found: SmallVec<[MethodId; 4]> = SmallVec::new();
        for class in self.class_chain(typ) {
            let inherited = found.len();
            for &id in self[class].methods_named(name) {
                // overloads of the same class stay apart even when only their returns differ
                let overridden = found[..inherited]
                    .iter()
                    .any(|&prev| self[prev].params_match(&self[id]));
                if !overridden {
                    found.push(id);
                }
            }
        }
        found
    }

    pub fn lookup_property(&self, typ: &Type, name: &str) -> Option<PropertyId> {
        self.class_chain(typ)
            .into_iter()
            .find_map(|class| self[class].property(name))
    }

    /// Finds the instantiation of `target` among the supertypes of `typ`.
    pub fn instantiate_as(&self, typ: &Type, target: ClassId) -> Option<TypeApp> {
        let app = typ.app_of()?;
        if app.id() == target {
            return Some(app.clone());
        }
        let class = &self[app.id()];
        let env = class.formal_env(app.args());
        class.supers.iter().find_map(|sup| {
            let sup = sup.substitute(&env);
            self.instantiate_as(&sup, target)
        })
    }

    /// Resolves the declared type of a member of `owner` as seen through `receiver`, replacing
    /// the formal types of the owner with the receiver's type arguments.
    pub fn member_type(&self, receiver: &Type, owner: ClassId, declared: &Type) -> Type {
        match self.instantiate_as(receiver, owner) {
            Some(app) if !app.args().is_empty() => {
                declared.substitute(&self[owner].formal_env(app.args()))
            }
            _ => declared.clone(),
        }
    }

    pub fn is_a(&self, sub: &Type, sup: &Type) -> bool {
        if sub == sup || (sup.is_class(predef::OBJECT) && !sup.is_immutable()) {
            return true;
        }
        match (sub, sup) {
            (Type::Immutable(a), Type::Immutable(b)) => self.is_a(a, b),
            (Type::Immutable(a), _) => self.is_a(a, sup),
            (_, Type::Immutable(b)) => self.is_immutable(sub) && self.is_a(sub, b),
            (Type::Nullable(a), Type::Nullable(b)) => self.is_a(a, b),
            (Type::Nullable(_), _) => false,
            (_, Type::Nullable(b)) => sub.is_class(predef::NULL) || self.is_a(sub, b),
            (Type::Data(a), Type::Data(b)) => self.app_is_a(a, b),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| self.is_a(a, b))
            }
            (Type::Function(a), Type::Function(b)) => self.function_is_a(a, b),
            (Type::Method(ca, a), Type::Method(cb, b)) => ca == cb && self.function_is_a(a, b),
            (Type::Meta(a), Type::Meta(b)) => self.is_a(a, b),
            (Type::Ref(ka, a), Type::Ref(kb, b)) => {
                (ka == kb || *kb == RefKind::Ref) && a == b
            }
            (Type::Property(ca, a), Type::Property(cb, b)) => ca == cb && a == b,
            _ => false,
        }
    }

    /// Finds the narrowest type that both `a` and `b` are assignable to, other than `Object`.
    pub fn common_type(&self, a: &Type, b: &Type) -> Option<Type> {
        if self.is_a(a, b) {
            return Some(b.clone());
        }
        if self.is_a(b, a) {
            return Some(a.clone());
        }
        match (a.strip_immutable(), b.strip_immutable()) {
            (Type::Nullable(a), Type::Nullable(b)) => self.common_type(a, b).map(Type::nullable),
            (Type::Nullable(inner), other) | (other, Type::Nullable(inner)) => {
                if other.is_class(predef::NULL) {
                    return Some(Type::nullable((**inner).clone()));
                }
                self.common_type(inner, other).map(Type::nullable)
            }
            (null, other) | (other, null) if null.is_class(predef::NULL) => {
                Some(Type::nullable(other.clone()))
            }
            (Type::Data(_), Type::Data(_)) => self
                .class_chain(a)
                .into_iter()
                .filter(|&class| class != predef::OBJECT)
                .filter_map(|class| self.instantiate_as(a, class))
                .map(Type::Data)
                .find(|candidate| self.is_a(b, candidate)),
            _ => None,
        }
    }

    fn app_is_a(&self, sub: &TypeApp, sup: &TypeApp) -> bool {
        if sub.id() == sup.id() {
            return sup.args().is_empty()
                || sub.args().len() == sup.args().len()
                    && sub
                        .args()
                        .iter()
                        .zip(sup.args())
                        .all(|(a, b)| self.is_a(a, b));
        }
        let class = &self[sub.id()];
        let env = class.formal_env(sub.args());
        class.supers.iter().any(|base| match base.substitute(&env) {
            Type::Data(base) => self.app_is_a(&base, sup),
            _ => false,
        })
    }

    fn function_is_a(&self, sub: &FunctionType, sup: &FunctionType) -> bool {
        sub.conditional == sup.conditional
            && sub.params.len() == sup.params.len()
            && sub.returns.len() == sup.returns.len()
            && sup
                .params
                .iter()
                .zip(sub.params.iter())
                .all(|(a, b)| self.is_a(a, b))
            && sub
                .returns
                .iter()
                .zip(sup.returns.iter())
                .all(|(a, b)| self.is_a(a, b))
    }

    pub fn is_immutable(&self, typ: &Type) -> bool {
        match typ {
            Type::Immutable(_) | Type::Meta(_) => true,
            Type::Data(app) => matches!(
                self[app.id()].kind,
                ClassKind::Const | ClassKind::EnumValue | ClassKind::Module | ClassKind::Package
            ),
            Type::Tuple(items) => items.iter().all(|t| self.is_immutable(t)),
            Type::Nullable(inner) => self.is_immutable(inner),
            _ => false,
        }
    }

    #[inline]
    pub fn is_service(&self, typ: &Type) -> bool {
        typ.class_id()
            .is_some_and(|id| self[id].kind == ClassKind::Service)
    }

    /// Returns the immutable form of `typ`, used for the types of compile-time constants.
    pub fn freeze(&self, typ: Type) -> Type {
        if self.is_immutable(&typ) {
            typ
        } else {
            Type::Immutable(typ.into())
        }
    }

    /// Finds the single implicit conversion from `from` to `to`. Ambiguous conversions are
    /// treated as missing.
    pub fn find_conversion(&self, from: &Type, to: &Type) -> Option<MethodId> {
        if from.app_of().is_none() {
            return None;
        }
        let mut found = self
            .class_chain(from)
            .into_iter()
            .flat_map(|class| self[class].methods.values().flatten().copied())
            .filter(|&id| {
                let method = &self[id];
                method.auto
                    && method.params.is_empty()
                    && method.type_params.is_empty()
                    && matches!(&*method.returns, [ret]
                        if self.is_a(&self.member_type(from, method.owner, ret), to))
            });
        let first = found.next()?;
        found.next().is_none().then_some(first)
    }

    /// Finds the single implicit conversion from `from` to any function type.
    pub fn find_function_conversion(&self, from: &Type) -> Option<MethodId> {
        if from.app_of().is_none() {
            return None;
        }
        let mut found = self
            .class_chain(from)
            .into_iter()
            .flat_map(|class| self[class].methods.values().flatten().copied())
            .filter(|&id| {
                let method = &self[id];
                method.auto
                    && method.params.is_empty()
                    && matches!(&*method.returns, [Type::Function(_)])
            });
        let first = found.next()?;
        found.next().is_none().then_some(first)
    }

    pub fn display_method(&self, id: MethodId) -> impl fmt::Display + use<'_> {
        DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
            let method = &self[id];
            write!(f, "{}", method.name)?;
            if !method.type_params.is_empty() {
                write!(
                    f,
                    "<{}>",
                    method.type_params.iter().map(|p| &p.name).format(", ")
                )?;
            }
            write!(
                f,
                "({})",
                method.params.iter().format_with(", ", |p, f| {
                    let default = if p.has_default { " = _" } else { "" };
                    f(&format_args!("{}{default}", p.typ.display(self)))
                })
            )
        })
    }
}

impl ops::Index<ClassId> for Symbols {
    type Output = ClassDef;

    #[inline]
    fn index(&self, id: ClassId) -> &Self::Output {
        &self.classes[id.index()]
    }
}

impl ops::Index<MethodId> for Symbols {
    type Output = MethodDef;

    #[inline]
    fn index(&self, id: MethodId) -> &Self::Output {
        &self.methods[id.index()]
    }
}

impl ops::Index<PropertyId> for Symbols {
    type Output = PropertyDef;

    #[inline]
    fn index(&self, id: PropertyId) -> &Self::Output {
        &self.properties[id.index()]
    }
}

impl ops::Index<TypedefId> for Symbols {
    type Output = TypedefDef;

    #[inline]
    fn index(&self, id: TypedefId) -> &Self::Output {
        &self.typedefs[id.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Global {
    Class(ClassId),
    Typedef(TypedefId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Const,
    Service,
    Module,
    Package,
    EnumValue,
}

impl ClassKind {
    #[inline]
    pub fn is_singleton(self) -> bool {
        matches!(self, Self::Module | Self::Package | Self::EnumValue)
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    name: Name,
    kind: ClassKind,
    params: Box<[TypeParam]>,
    supers: Box<[Type]>,
    parent: Option<ClassId>,
    is_static: bool,
    methods: IndexMap<Name, SmallVec<[MethodId; 2]>>,
    properties: IndexMap<Name, PropertyId>,
    children: IndexMap<Name, ClassId>,
}

impl ClassDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.kind.is_singleton()
    }

    #[inline]
    pub fn params(&self) -> &[TypeParam] {
        &self.params
    }

    #[inline]
    pub fn supers(&self) -> &[Type] {
        &self.supers
    }

    /// The lexically enclosing class, if this is an inner class.
    #[inline]
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// Whether instances of this inner class have no reference to an outer instance.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn methods_named(&self, name: &str) -> &[MethodId] {
        self.methods.get(name).map_or(&[], |methods| methods)
    }

    #[inline]
    pub fn property(&self, name: &str) -> Option<PropertyId> {
        self.properties.get(name).copied()
    }

    #[inline]
    pub fn child(&self, name: &str) -> Option<ClassId> {
        self.children.get(name).copied()
    }

    pub fn formal(&self, name: &str) -> Option<&TypeParam> {
        self.params.iter().find(|p| &*p.name == name)
    }

    pub fn formal_env<'a>(&'a self, args: &'a [Type]) -> impl Fn(&str) -> Option<Type> + 'a {
        move |name| {
            self.params
                .iter()
                .zip(args)
                .find(|(param, _)| &*param.name == name)
                .map(|(_, arg)| arg.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParam {
    name: Name,
    constraint: Type,
}

impl TypeParam {
    pub fn new(name: &str, constraint: Type) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn constraint(&self) -> &Type {
        &self.constraint
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MethodKind {
    #[default]
    Method,
    Function,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    name: Name,
    typ: Type,
    has_default: bool,
}

impl Param {
    pub fn new(name: &str, typ: Type) -> Self {
        Self {
            name: name.into(),
            typ,
            has_default: false,
        }
    }

    pub fn optional(name: &str, typ: Type) -> Self {
        Self {
            has_default: true,
            ..Self::new(name, typ)
        }
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn typ(&self) -> &Type {
        &self.typ
    }

    #[inline]
    pub fn has_default(&self) -> bool {
        self.has_default
    }
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    name: Name,
    owner: ClassId,
    kind: MethodKind,
    type_params: Box<[TypeParam]>,
    params: Box<[Param]>,
    returns: Box<[Type]>,
    conditional: bool,
    auto: bool,
}

impl MethodDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    #[inline]
    pub fn type_params(&self) -> &[TypeParam] {
        &self.type_params
    }

    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[inline]
    pub fn returns(&self) -> &[Type] {
        &self.returns
    }

    #[inline]
    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        self.kind == MethodKind::Function
    }

    /// The number of parameters without a default value.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.has_default).count()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| &*p.name == name)
    }

    pub fn signature(&self) -> FunctionType {
        FunctionType::new(
            self.params.iter().map(|p| p.typ.clone()),
            self.returns.iter().cloned(),
            self.conditional,
        )
    }

    fn params_match(&self, other: &Self) -> bool {
        self.name == other.name
            && self.params.len() == other.params.len()
            && self.params.iter().zip(other.params.iter()).all(|(a, b)| a.typ == b.typ)
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: Name,
    owner: ClassId,
    typ: Type,
    is_static: bool,
    constant: Option<Constant>,
    readonly: bool,
}

impl PropertyDef {
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn typ(&self) -> &Type {
        &self.typ
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[inline]
    pub fn constant(&self) -> Option<&Constant> {
        self.constant.as_ref()
    }

    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.readonly || self.constant.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TypedefDef {
    name: Name,
    typ: Type,
}

impl TypedefDef {
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn typ(&self) -> &Type {
        &self.typ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtyping_walks_supers_with_arguments() {
        let mut symbols = Symbols::with_default_types();
        let list = symbols
            .class("List")
            .kind(ClassKind::Interface)
            .params(vec![TypeParam::new("Element", Type::object())])
            .define();
        let ints = symbols
            .class("IntList")
            .supers(vec![Type::app(list, [Type::int()])])
            .define();

        let int_list = Type::nullary(ints);
        assert!(symbols.is_a(&int_list, &Type::app(list, [Type::int()])));
        assert!(symbols.is_a(&int_list, &Type::app(list, [Type::object()])));
        assert!(!symbols.is_a(&int_list, &Type::app(list, [Type::boolean()])));
        assert!(symbols.is_a(&int_list, &Type::nullable(int_list.clone())));
        assert!(symbols.is_a(&Type::nullary(predef::NULL), &Type::nullable(Type::int())));
        assert!(!symbols.is_a(&Type::nullable(Type::int()), &Type::int()));
    }

    #[test]
    fn conversions_must_be_unique() {
        let symbols = Symbols::with_default_types();
        let float = Type::nullary(predef::FLOAT);
        let string = Type::nullary(predef::STRING);

        assert!(symbols.find_conversion(&Type::int(), &float).is_some());
        assert!(symbols.find_conversion(&Type::int(), &string).is_none());
        assert!(
            symbols
                .find_conversion(&Type::nullary(predef::CHAR), &string)
                .is_some()
        );
    }

    #[test]
    fn member_types_are_instantiated() {
        let symbols = Symbols::with_default_types();
        let array = Type::app(predef::ARRAY, [Type::int()]);
        let get = symbols.lookup_methods(&array, "getElement")[0];
        let ret = symbols.member_type(&array, predef::ARRAY, &symbols[get].returns()[0]);
        assert_eq!(ret, Type::int());
    }

    #[test]
    fn overrides_hide_base_methods_but_overloads_stay() {
        let mut symbols = Symbols::with_default_types();
        let base = symbols.class("Base").define();
        let derived = symbols
            .class("Derived")
            .supers(vec![Type::nullary(base)])
            .define();
        let param = || vec![Param::new("value", Type::int())];
        symbols.method(base, "h").params(param()).define();
        let as_int = symbols
            .method(derived, "h")
            .params(param())
            .returns(vec![Type::int()])
            .define();
        let as_string = symbols
            .method(derived, "h")
            .params(param())
            .returns(vec![Type::nullary(predef::STRING)])
            .define();

        let found = symbols.lookup_methods(&Type::nullary(derived), "h");
        assert_eq!(&found[..], [as_int, as_string]);
    }

    #[test]
    fn common_type_prefers_shared_base() {
        let mut symbols = Symbols::with_default_types();
        let shape = symbols.class("Shape").define();
        let circle = symbols
            .class("Circle")
            .supers(vec![Type::nullary(shape)])
            .define();
        let square = symbols
            .class("Square")
            .supers(vec![Type::nullary(shape)])
            .define();
        let (circle, square) = (Type::nullary(circle), Type::nullary(square));
        let null = Type::nullary(predef::NULL);

        assert_eq!(
            symbols.common_type(&circle, &square),
            Some(Type::nullary(shape))
        );
        assert_eq!(
            symbols.common_type(&null, &circle),
            Some(Type::nullable(circle.clone()))
        );
        assert_eq!(symbols.common_type(&Type::int(), &Type::object()), Some(Type::object()));
        assert_eq!(symbols.common_type(&Type::int(), &Type::nullary(predef::STRING)), None);
    }
}
