use enum_as_inner::EnumAsInner;
use vesper_ast as ast;
use vesper_bytecode::{Arg, Op, Register};

use super::assignable::Assignable;
use super::generate::Generator;
use super::lower::CONSTRUCT;
use super::tree::{ExprId, ExprKind};
use super::validate::Validator;
use crate::constant::Constant;
use crate::context::{LabelInfo, Local};
use crate::diagnostic::Error;
use crate::fit::TypeFit;
use crate::symbols::{Global, MethodKind};
use crate::types::{ClassId, MethodId, Name, PropertyId, RefKind, Type, TypedefId, predef};

/// A possibly qualified name, such as `x`, `this`, `Color.Red` or `&list.size`.
#[derive(Debug, Clone)]
pub struct NameExpr<'src> {
    pub left: Option<ExprId>,
    pub name: Name,
    pub type_args: Box<[ast::SourceTypeName<'src>]>,
    /// Set for `&name`, which produces a reference instead of the value.
    pub no_deref: bool,
    resolution: Option<NameResolution>,
}

impl<'src> NameExpr<'src> {
    pub fn new(
        left: Option<ExprId>,
        name: &str,
        type_args: Box<[ast::SourceTypeName<'src>]>,
        no_deref: bool,
    ) -> Self {
        Self {
            left,
            name: name.into(),
            type_args,
            no_deref,
            resolution: None,
        }
    }

    #[inline]
    pub fn raw(&self) -> Option<&RawArg> {
        self.resolution.as_ref().map(|res| &res.raw)
    }

    pub fn meaning(&self) -> Meaning {
        self.resolution
            .as_ref()
            .map_or(Meaning::Unknown, |res| res.meaning)
    }

    pub fn plan(&self) -> Plan {
        self.resolution.as_ref().map_or(Plan::None, |res| res.plan)
    }

    pub fn access(&self) -> Option<PropertyAccess> {
        self.resolution.as_ref().and_then(|res| res.access)
    }

    /// The method selected for a name that denotes a method as a value.
    pub fn method(&self) -> Option<MethodId> {
        self.resolution.as_ref().and_then(|res| res.method)
    }

    fn resolution(&self) -> &NameResolution {
        self.resolution
            .as_ref()
            .unwrap_or_else(|| unreachable!("name `{}` used before resolution", self.name))
    }
}

#[derive(Debug, Clone)]
struct NameResolution {
    raw: RawArg,
    meaning: Meaning,
    plan: Plan,
    access: Option<PropertyAccess>,
    method: Option<MethodId>,
}

/// What a name was found to refer to, before deciding how to produce its value.
#[derive(Debug, Clone, EnumAsInner)]
pub enum RawArg {
    Register(Register, Type),
    Reserved(Reserved),
    Property(PropertyId),
    Method(MethodId),
    /// Every overload of the name reachable from the class.
    Multimethod(Name, ClassId),
    Class(ClassId),
    Typedef(TypedefId),
    /// A formal type parameter of a class, available at runtime as a child of the instance.
    FormalType(Name),
    Label(LabelInfo),
    /// A member reached through an implicit receiver.
    Target(TargetInfo),
}

impl RawArg {
    pub fn property(&self) -> Option<PropertyId> {
        match self {
            Self::Property(prop)
            | Self::Target(TargetInfo {
                member: TargetMember::Property(prop),
                ..
            }) => Some(*prop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    This,
    Super,
    /// The instance of a lexically enclosing class, the given number of steps out.
    Outer(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    pub name: Name,
    pub member: TargetMember,
    pub target_type: Type,
    /// How many lexical parents out of `this` the receiver is.
    pub steps: u16,
    pub has_this: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMember {
    Property(PropertyId),
    Methods(ClassId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meaning {
    Unknown,
    Reserved,
    Variable,
    Property,
    FormalChildType,
    Method,
    Class,
    Type,
    Label,
}

/// How the value of a resolved name is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    None,
    OuterThis,
    OuterRef,
    RegisterRef,
    PropertyDeref,
    PropertyRef,
    PropertySelf,
    TypeOfClass,
    TypeOfTypedef,
    Singleton,
    TypeOfFormalChild,
    BindTarget,
}

/// Where the receiver of a member comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    SingletonParent(ClassId),
    Outer(u16),
    This,
    Left,
}

#[derive(Debug)]
struct Planned {
    plan: Plan,
    access: Option<PropertyAccess>,
    method: Option<MethodId>,
    typ: Type,
    constant: Option<Constant>,
}

impl Planned {
    fn new(plan: Plan, typ: Type) -> Self {
        Self {
            plan,
            access: None,
            method: None,
            typ,
            constant: None,
        }
    }

    fn constant(plan: Plan, typ: Type, constant: Constant) -> Self {
        Self {
            constant: Some(constant),
            ..Self::new(plan, typ)
        }
    }
}

impl Validator<'_, '_> {
    /// Finds what the name refers to. The answer is cached on the node, and `force` discards
    /// a cached answer.
    pub fn resolve_raw_argument(
        &mut self,
        id: ExprId,
        required: Option<&Type>,
        force: bool,
    ) -> Option<RawArg> {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            return None;
        };
        if let (Some(res), false) = (&name.resolution, force) {
            return Some(res.raw.clone());
        }
        let (left, ident) = (name.left, name.name.clone());
        let (raw, meaning) = match left {
            None => self.resolve_bare(id, &ident, required)?,
            Some(left) => self.resolve_qualified(id, left, &ident)?,
        };
        log::trace!("{ident} at {id} resolved to {raw:?}");
        if let ExprKind::Name(name) = self.tree.kind_mut(id) {
            name.resolution = Some(NameResolution {
                raw: raw.clone(),
                meaning,
                plan: Plan::None,
                access: None,
                method: None,
            });
        }
        Some(raw)
    }

    fn resolve_bare(
        &mut self,
        id: ExprId,
        name: &Name,
        required: Option<&Type>,
    ) -> Option<(RawArg, Meaning)> {
        match self.ctx.lookup(name) {
            Some(Local::Var(var)) => {
                let raw = RawArg::Register(var.reg(), var.typ().clone());
                return Some((raw, Meaning::Variable));
            }
            Some(Local::Label(label)) => return Some((RawArg::Label(label), Meaning::Label)),
            None => {}
        }

        let span = self.tree[id].span();
        match &**name {
            "this" => {
                return self
                    .ctx
                    .require_this(span, self.reporter)
                    .then_some((RawArg::Reserved(Reserved::This), Meaning::Reserved));
            }
            "super" => return Some((RawArg::Reserved(Reserved::Super), Meaning::Reserved)),
            "outer" => {
                if !self.ctx.require_this(span, self.reporter) {
                    return None;
                }
                if self.ctx.outer_class(self.symbols, 1).is_none() {
                    self.reporter.report(Error::NoThis(span));
                    return None;
                }
                return Some((RawArg::Reserved(Reserved::Outer(1)), Meaning::Reserved));
            }
            _ => {}
        }

        if let Some(class) = self.ctx.this_class() {
            if self.symbols[class].formal(name).is_some() {
                return Some((RawArg::FormalType(name.clone()), Meaning::FormalChildType));
            }
        }

        let mut class = self.ctx.this_class();
        let mut steps = 0u16;
        let mut has_this = self.ctx.has_this();
        while let Some(current) = class {
            let def = &self.symbols[current];
            let target_type = self.symbols.this_type(current);
            let target = |member| TargetInfo {
                name: name.clone(),
                member,
                target_type: target_type.clone(),
                steps,
                has_this,
            };
            if let Some(prop) = self.symbols.lookup_property(&target_type, name) {
                let raw = RawArg::Target(target(TargetMember::Property(prop)));
                return Some((raw, Meaning::Property));
            }
            if !self.symbols.lookup_methods(&target_type, name).is_empty() {
                let raw = RawArg::Target(target(TargetMember::Methods(current)));
                return Some((raw, Meaning::Method));
            }
            if let Some(child) = def.child(name) {
                return Some((RawArg::Class(child), Meaning::Class));
            }
            if steps > 0 && has_this && def.name() == &**name {
                return Some((RawArg::Reserved(Reserved::Outer(steps)), Meaning::Class));
            }
            has_this &= !def.is_static();
            class = def.parent();
            steps += 1;
        }

        match self.symbols.global(name) {
            Some(Global::Class(class)) => return Some((RawArg::Class(class), Meaning::Class)),
            Some(Global::Typedef(id)) => return Some((RawArg::Typedef(id), Meaning::Type)),
            None => {}
        }

        let hint = self.ctx.inference_hint().or(required).cloned();
        if let Some(class) = hint.as_ref().and_then(|hint| {
            hint.strip_nullable()
                .unwrap_or(hint)
                .class_id()
        }) {
            let def = &self.symbols[class];
            if let Some(child) = def.child(name) {
                return Some((RawArg::Class(child), Meaning::Class));
            }
            if let Some(prop) = def.property(name).filter(|&p| self.symbols[p].is_static()) {
                return Some((RawArg::Property(prop), Meaning::Property));
            }
        }

        self.reporter.report(Error::NameMissing(name.clone(), span));
        None
    }

    fn resolve_qualified(
        &mut self,
        id: ExprId,
        left: ExprId,
        name: &Name,
    ) -> Option<(RawArg, Meaning)> {
        let span = self.tree[id].span();
        if let ExprKind::Name(qualifier) = self.tree[left].kind() {
            let left_span = self.tree[left].span();
            if qualifier.left.is_none() && &*qualifier.name == "super" {
                self.reporter.report(Error::InvalidSuperReference(left_span));
                return None;
            }
            if qualifier.left.is_none() && &*qualifier.name == CONSTRUCT {
                let keyword = qualifier.name.clone();
                self.reporter
                    .report(Error::KeywordUnexpected(keyword, left_span));
                return None;
            }

            let identity = match self.resolve_raw_argument(left, None, false)? {
                RawArg::Label(label) => {
                    let Some(var) = label.var(name) else {
                        self.reporter.report(Error::NameMissing(name.clone(), span));
                        return None;
                    };
                    let raw = RawArg::Register(var.reg(), var.typ().clone());
                    if let ExprKind::Name(this) = self.tree.kind_mut(id) {
                        this.left = None;
                    }
                    return Some((raw, Meaning::Variable));
                }
                RawArg::Class(class) => Some(class),
                RawArg::Typedef(typedef) => self.symbols[typedef].typ().class_id(),
                _ => None,
            };
            if let Some(found) = identity.and_then(|class| self.resolve_identity(class, name)) {
                self.validate_child(id, left, None)?;
                return Some(found);
            }
        }

        let left = self.validate_child(id, left, None)?;
        let Some(typ) = self.tree[left].expect_validated().typ().cloned() else {
            self.reporter
                .report(Error::ReturnRequired(self.tree[left].span()));
            return None;
        };
        self.resolve_member(&typ, name, span)
    }

    /// Looks a name up in a class used as a qualifier: child classes, static members, and the
    /// members of a singleton.
    fn resolve_identity(&self, class: ClassId, name: &str) -> Option<(RawArg, Meaning)> {
        let def = &self.symbols[class];
        if let Some(child) = def.child(name) {
            return Some((RawArg::Class(child), Meaning::Class));
        }
        let typ = Type::nullary(class);
        if let Some(prop) = self.symbols.lookup_property(&typ, name) {
            let prop_def = &self.symbols[prop];
            if def.is_singleton() || prop_def.is_static() || prop_def.constant().is_some() {
                return Some((RawArg::Property(prop), Meaning::Property));
            }
        }
        let methods = self
            .symbols
            .lookup_methods(&typ, name)
            .into_iter()
            .filter(|&m| def.is_singleton() || self.symbols[m].kind() != MethodKind::Method)
            .collect::<Vec<_>>();
        match &methods[..] {
            [] => None,
            &[method] => Some((RawArg::Method(method), Meaning::Method)),
            _ => Some((RawArg::Multimethod(name.into(), class), Meaning::Method)),
        }
    }

    fn resolve_member(
        &mut self,
        typ: &Type,
        name: &Name,
        span: ast::Span,
    ) -> Option<(RawArg, Meaning)> {
        if let Type::Meta(inner) = typ.strip_immutable() {
            let formal = inner
                .class_id()
                .is_some_and(|class| self.symbols[class].formal(name).is_some());
            if formal {
                return Some((RawArg::FormalType(name.clone()), Meaning::FormalChildType));
            }
        }
        if let Some(prop) = self.symbols.lookup_property(typ, name) {
            return Some((RawArg::Property(prop), Meaning::Property));
        }
        match &self.symbols.lookup_methods(typ, name)[..] {
            [] => {
                self.reporter.report(Error::NameMissing(name.clone(), span));
                None
            }
            &[method] => Some((RawArg::Method(method), Meaning::Method)),
            _ => {
                let class = typ.class_id().unwrap_or(predef::OBJECT);
                Some((RawArg::Multimethod(name.clone(), class), Meaning::Method))
            }
        }
    }

    pub(super) fn validate_name(&mut self, id: ExprId, required: Option<&Type>) -> Option<ExprId> {
        let Some(raw) = self.resolve_raw_argument(id, required, false) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        let Some(planned) = self.plan_code_gen(id, &raw, required) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        log::trace!("{id} planned as {:?}", planned.plan);
        if let ExprKind::Name(name) = self.tree.kind_mut(id) {
            if let Some(res) = &mut name.resolution {
                res.plan = planned.plan;
                res.access = planned.access;
                res.method = planned.method;
            }
        }
        self.finish_validation(
            id,
            required,
            Some(planned.typ),
            TypeFit::Fit,
            planned.constant,
        )
    }

    /// The type the name would produce, found without validating it.
    pub(super) fn implicit_name_type(&mut self, id: ExprId) -> Option<Type> {
        let raw = self.resolve_raw_argument(id, None, false)?;
        self.plan_code_gen(id, &raw, None).map(|planned| planned.typ)
    }

    /// Decides how the value of the resolved name is produced, and checks that it can be.
    fn plan_code_gen(
        &mut self,
        id: ExprId,
        raw: &RawArg,
        required: Option<&Type>,
    ) -> Option<Planned> {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            unreachable!()
        };
        let (left, ident, no_deref) = (name.left, name.name.clone(), name.no_deref);
        let type_args = name.type_args.clone();
        let span = self.tree[id].span();
        let wants_meta = required.is_some_and(|req| matches!(req.strip_immutable(), Type::Meta(_)));

        let planned = match raw {
            RawArg::Register(reg, typ) if no_deref => {
                let kind = if self.ctx.is_future(*reg) {
                    RefKind::Ref
                } else {
                    RefKind::Var
                };
                Planned::new(Plan::RegisterRef, Type::Ref(kind, typ.clone().into()))
            }
            RawArg::Register(reg, typ) => {
                if !self.is_assignment_target(id) {
                    if let Some(Local::Var(var)) = self.ctx.lookup(&ident) {
                        if var.reg() == *reg && !self.ctx.mark_var_read(&var, span, self.reporter) {
                            return None;
                        }
                    }
                }
                Planned::new(Plan::None, typ.clone())
            }
            RawArg::Reserved(Reserved::This) => {
                let typ = self.ctx.this_type(self.symbols)?;
                if no_deref {
                    Planned::new(Plan::OuterRef, Type::Ref(RefKind::Ref, typ.into()))
                } else {
                    Planned::new(Plan::None, typ)
                }
            }
            &RawArg::Reserved(Reserved::Outer(steps)) => {
                let Some(class) = self.ctx.outer_class(self.symbols, steps) else {
                    self.reporter.report(Error::NoThis(span));
                    return None;
                };
                self.ctx.require_this(span, self.reporter);
                let typ = self.symbols.this_type(class);
                let mut planned = if no_deref {
                    Planned::new(Plan::OuterRef, Type::Ref(RefKind::Ref, typ.into()))
                } else {
                    Planned::new(Plan::OuterThis, typ)
                };
                planned.access = Some(PropertyAccess::Outer(steps));
                planned
            }
            RawArg::Reserved(Reserved::Super) => {
                self.reporter.report(Error::InvalidSuperReference(span));
                return None;
            }
            RawArg::Label(_) => {
                self.reporter.report(Error::LabelAsValue(ident, span));
                return None;
            }
            RawArg::FormalType(formal) => {
                let access = match left {
                    Some(_) => PropertyAccess::Left,
                    None if self.ctx.require_this(span, self.reporter) => PropertyAccess::This,
                    None => return None,
                };
                let mut planned = Planned::new(
                    Plan::TypeOfFormalChild,
                    Type::meta(Type::Formal(formal.clone())),
                );
                planned.access = Some(access);
                planned
            }
            &RawArg::Class(class) => {
                let def = &self.symbols[class];
                if def.is_singleton() && type_args.is_empty() && !wants_meta {
                    Planned::constant(
                        Plan::Singleton,
                        Type::nullary(class),
                        Constant::Singleton(class),
                    )
                } else {
                    let args = if type_args.is_empty() {
                        def.params().iter().map(|p| p.constraint().clone()).collect()
                    } else {
                        type_args
                            .iter()
                            .map(|arg| self.ctx.resolve_type(self.symbols, arg, self.reporter))
                            .collect::<Option<Vec<_>>>()?
                    };
                    let typ = Type::app(class, args);
                    let meta = Type::meta(typ.clone());
                    Planned::constant(Plan::TypeOfClass, meta, Constant::Type(typ))
                }
            }
            &RawArg::Typedef(typedef) => {
                let typ = self.symbols[typedef].typ().clone();
                Planned::constant(Plan::TypeOfTypedef, Type::meta(typ.clone()), Constant::Type(typ))
            }
            RawArg::Property(_) | RawArg::Target(TargetInfo {
                member: TargetMember::Property(_),
                ..
            }) => self.plan_property(id, raw, required)?,
            RawArg::Method(_)
            | RawArg::Multimethod(_, _)
            | RawArg::Target(TargetInfo {
                member: TargetMember::Methods(_),
                ..
            }) => {
                if let Some((_, span)) = type_args.first() {
                    self.reporter.report(Error::TypeParamsUnexpected(*span));
                    return None;
                }
                self.plan_method(id, raw, required)?
            }
        };
        Some(planned)
    }

    fn plan_property(
        &mut self,
        id: ExprId,
        raw: &RawArg,
        required: Option<&Type>,
    ) -> Option<Planned> {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            unreachable!()
        };
        let (left, ident, no_deref) = (name.left, name.name.clone(), name.no_deref);
        let span = self.tree[id].span();
        let prop = raw.property()?;
        let symbols = self.symbols;
        let def = &symbols[prop];

        let (access, receiver) = match raw {
            RawArg::Target(target) => {
                let owner_is_singleton = symbols[def.owner()].is_singleton();
                if def.is_static() && owner_is_singleton {
                    (PropertyAccess::SingletonParent(def.owner()), Type::nullary(def.owner()))
                } else if def.constant().is_some() {
                    (PropertyAccess::This, target.target_type.clone())
                } else if !target.has_this {
                    self.reporter.report(Error::NoThisProperty(ident, span));
                    return None;
                } else {
                    self.ctx.require_this(span, self.reporter);
                    let access = match target.steps {
                        0 => PropertyAccess::This,
                        steps => PropertyAccess::Outer(steps),
                    };
                    (access, target.target_type.clone())
                }
            }
            _ => match left {
                Some(left) => match self.qualifier_identity(left) {
                    Some(class) => (PropertyAccess::SingletonParent(class), Type::nullary(class)),
                    None => {
                        let receiver = self.tree[left].expect_validated().typ().cloned()?;
                        (PropertyAccess::Left, receiver)
                    }
                },
                None => (PropertyAccess::SingletonParent(def.owner()), Type::nullary(def.owner())),
            },
        };

        let typ = symbols.member_type(&receiver, def.owner(), def.typ());
        let wants_property =
            required.is_some_and(|req| matches!(req.strip_immutable(), Type::Property(_, _)));
        let mut planned = if wants_property {
            Planned::constant(
                Plan::PropertySelf,
                Type::Property(def.owner(), typ.into()),
                Constant::Property(prop),
            )
        } else if no_deref {
            let kind = if def.is_readonly() {
                RefKind::Ref
            } else {
                RefKind::Var
            };
            Planned::new(Plan::PropertyRef, Type::Ref(kind, typ.into()))
        } else {
            Planned {
                constant: def.constant().cloned(),
                ..Planned::new(Plan::PropertyDeref, typ)
            }
        };
        planned.access = Some(access);
        Some(planned)
    }

    fn plan_method(
        &mut self,
        id: ExprId,
        raw: &RawArg,
        required: Option<&Type>,
    ) -> Option<Planned> {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            unreachable!()
        };
        let (left, ident) = (name.left, name.name.clone());
        let span = self.tree[id].span();
        let symbols = self.symbols;

        let (candidates, receiver, access) = match raw {
            &RawArg::Method(method) => {
                let (receiver, access) = self.method_receiver(left, symbols[method].owner());
                (vec![method], receiver, access)
            }
            RawArg::Multimethod(name, class) => {
                let (receiver, access) = self.method_receiver(left, *class);
                let candidates = symbols.lookup_methods(&receiver, name).to_vec();
                (candidates, receiver, access)
            }
            RawArg::Target(target) => {
                let candidates = symbols.lookup_methods(&target.target_type, &target.name).to_vec();
                let access = match target.steps {
                    0 => PropertyAccess::This,
                    steps => PropertyAccess::Outer(steps),
                };
                (candidates, target.target_type.clone(), access)
            }
            _ => unreachable!(),
        };

        let signature = |m: MethodId| {
            let sig = Type::Function(symbols[m].signature().into());
            symbols.member_type(&receiver, symbols[m].owner(), &sig)
        };
        let method = match &candidates[..] {
            &[method] => method,
            _ => {
                let wanted = required.and_then(|req| match req.strip_immutable() {
                    Type::Method(_, func) => Some(Type::Function(func.clone())),
                    Type::Function(_) => Some(req.clone()),
                    _ => None,
                });
                let matching = candidates
                    .iter()
                    .copied()
                    .filter(|&m| wanted.as_ref().is_some_and(|w| symbols.is_a(&signature(m), w)))
                    .collect::<Vec<_>>();
                match &matching[..] {
                    &[method] => method,
                    _ => {
                        let sigs = candidates
                            .iter()
                            .map(|&m| symbols.display_method(m).to_string().into())
                            .collect();
                        self.reporter
                            .report(Error::SignatureAmbiguous(ident, sigs, span));
                        return None;
                    }
                }
            }
        };

        let def = &symbols[method];
        let func = signature(method);
        if def.kind() != MethodKind::Method {
            let mut planned = Planned::constant(Plan::None, func, Constant::Method(method));
            planned.method = Some(method);
            return Some(planned);
        }
        if let Some(Type::Method(_, _)) = required.map(Type::strip_immutable) {
            let Type::Function(sig) = func else {
                unreachable!()
            };
            let mut planned = Planned::constant(
                Plan::None,
                Type::Method(def.owner(), sig),
                Constant::Method(method),
            );
            planned.method = Some(method);
            return Some(planned);
        }

        match (raw, access) {
            (RawArg::Target(target), _) if !target.has_this => {
                let err = if target.steps == 0 {
                    Error::NoThisMethod(ident, span)
                } else {
                    Error::NoOuterMethod(ident, span)
                };
                self.reporter.report(err);
                return None;
            }
            (RawArg::Target(_), _) => {
                self.ctx.require_this(span, self.reporter);
            }
            (_, PropertyAccess::SingletonParent(class)) if !symbols[class].is_singleton() => {
                self.reporter.report(Error::NoThisMethod(ident, span));
                return None;
            }
            _ => {}
        }
        Some(Planned {
            access: Some(access),
            method: Some(method),
            ..Planned::new(Plan::BindTarget, func)
        })
    }

    fn method_receiver(&self, left: Option<ExprId>, owner: ClassId) -> (Type, PropertyAccess) {
        match left {
            Some(left) => match self.qualifier_identity(left) {
                Some(class) => (Type::nullary(class), PropertyAccess::SingletonParent(class)),
                None => {
                    let receiver = self.tree[left]
                        .validated()
                        .and_then(|validated| validated.typ().cloned())
                        .unwrap_or_else(|| Type::nullary(owner));
                    (receiver, PropertyAccess::Left)
                }
            },
            None => (Type::nullary(owner), PropertyAccess::SingletonParent(owner)),
        }
    }

    /// The class named by a qualifier used in identity mode.
    pub(super) fn qualifier_identity(&self, left: ExprId) -> Option<ClassId> {
        match self.tree[left].kind() {
            ExprKind::Name(name) => match (name.raw(), name.plan()) {
                (Some(&RawArg::Class(class)), Plan::Singleton | Plan::TypeOfClass) => Some(class),
                (Some(&RawArg::Typedef(typedef)), _) => self.symbols[typedef].typ().class_id(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the name is the destination of a plain assignment, and so is not read.
    fn is_assignment_target(&self, id: ExprId) -> bool {
        let Some(parent) = self.tree[id].parent() else {
            return false;
        };
        match self.tree[parent].kind() {
            ExprKind::Assign {
                op: None, place, ..
            } => *place == id,
            ExprKind::Tuple { .. } => self.is_assignment_target(parent),
            _ => false,
        }
    }

    pub(super) fn is_name_assignable(&self, id: ExprId) -> bool {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            return false;
        };
        let Some(res) = &name.resolution else {
            return false;
        };
        match (res.meaning, res.plan) {
            (Meaning::Variable, Plan::None) => true,
            (Meaning::Property, Plan::PropertyDeref) => res
                .raw
                .property()
                .is_some_and(|prop| !self.symbols[prop].is_readonly()),
            _ => false,
        }
    }

    pub(super) fn mark_name_assignment(&mut self, id: ExprId) {
        let ExprKind::Name(name) = self.tree[id].kind() else {
            return;
        };
        let span = self.tree[id].span();
        match (name.raw(), name.access()) {
            (Some(&RawArg::Register(reg, _)), _) => self.ctx.mark_var_write(reg),
            (Some(_), Some(PropertyAccess::This | PropertyAccess::Outer(_))) => {
                self.ctx.require_this(span, self.reporter);
            }
            _ => {}
        }
    }
}

impl Generator<'_, '_> {
    pub(super) fn generate_name_argument(
        &mut self,
        id: ExprId,
        local_prop_ok: bool,
        used_once: bool,
    ) -> Arg {
        self.generate_name_value(id, None, local_prop_ok, used_once)
    }

    fn generate_name_value(
        &mut self,
        id: ExprId,
        into: Option<Arg>,
        local_prop_ok: bool,
        used_once: bool,
    ) -> Arg {
        let tree = self.tree;
        let ExprKind::Name(name) = tree[id].kind() else {
            unreachable!()
        };
        let res = name.resolution();
        let typ = self.single_type(id);
        match (res.plan, &res.raw) {
            (Plan::None, &RawArg::Register(reg, _)) => self.forward(Arg::Reg(reg), into),
            (Plan::None, RawArg::Reserved(Reserved::This)) => self.forward(Arg::This, into),
            (Plan::OuterThis, _) => {
                let steps = match res.access {
                    Some(PropertyAccess::Outer(steps)) => steps,
                    _ => 0,
                };
                let to = self.result_slot(&typ, into, used_once);
                self.code.emit(Op::MoveThis { steps, to });
                to
            }
            (Plan::OuterRef, _) => {
                let steps = match res.access {
                    Some(PropertyAccess::Outer(steps)) => steps,
                    _ => 0,
                };
                self.code.emit(Op::MoveThis {
                    steps,
                    to: Arg::Stack,
                });
                let to = self.result_slot(&typ, into, used_once);
                self.code.emit(Op::MoveRef {
                    from: Arg::Stack,
                    to,
                });
                to
            }
            (Plan::RegisterRef, &RawArg::Register(reg, _)) => {
                let to = self.result_slot(&typ, into, used_once);
                let from = Arg::Reg(reg);
                self.code.emit(if self.ctx.is_future(reg) {
                    Op::MoveRef { from, to }
                } else {
                    Op::MoveVar { from, to }
                });
                to
            }
            (Plan::PropertyDeref, raw) => {
                let prop = raw.property().unwrap_or_else(|| unreachable!());
                match res.access {
                    Some(PropertyAccess::This) if local_prop_ok && into.is_none() => {
                        Arg::Const(self.code.constant(Constant::Property(prop)))
                    }
                    Some(PropertyAccess::This) => {
                        let to = self.result_slot(&typ, into, used_once);
                        let prop = self.code.constant(Constant::Property(prop));
                        self.code.emit(Op::LGet { prop, to });
                        to
                    }
                    access => {
                        let target = self.generate_receiver(access, name.left, true);
                        let to = self.result_slot(&typ, into, used_once);
                        let prop = self.code.constant(Constant::Property(prop));
                        self.code.emit(Op::PGet { prop, target, to });
                        to
                    }
                }
            }
            (Plan::PropertyRef, raw) => {
                let prop = raw.property().unwrap_or_else(|| unreachable!());
                let target = self.generate_receiver(res.access, name.left, true);
                let to = self.result_slot(&typ, into, used_once);
                let readonly = self.symbols[prop].is_readonly();
                let prop = self.code.constant(Constant::Property(prop));
                self.code.emit(if readonly {
                    Op::PRef { prop, target, to }
                } else {
                    Op::PVar { prop, target, to }
                });
                to
            }
            (Plan::TypeOfFormalChild, RawArg::FormalType(formal)) => {
                let target = self.generate_receiver(res.access, name.left, true);
                let to = self.result_slot(&typ, into, used_once);
                let prop = self.code.constant(Constant::FormalChild(formal.clone()));
                self.code.emit(Op::PGet { prop, target, to });
                to
            }
            (Plan::BindTarget, _) => {
                let method = res.method.unwrap_or_else(|| unreachable!());
                let target = self.generate_receiver(res.access, name.left, true);
                let to = self.result_slot(&typ, into, used_once);
                let method = self.code.constant(Constant::Method(method));
                self.code.emit(Op::MBind { target, method, to });
                to
            }
            (plan, _) => unreachable!("plan {plan:?} always produces a constant"),
        }
    }

    /// Produces the receiver of a member access.
    pub(super) fn generate_receiver(
        &mut self,
        access: Option<PropertyAccess>,
        left: Option<ExprId>,
        used_once: bool,
    ) -> Arg {
        match access {
            Some(PropertyAccess::This) | None => Arg::This,
            Some(PropertyAccess::SingletonParent(class)) => {
                Arg::Const(self.code.constant(Constant::Singleton(class)))
            }
            Some(PropertyAccess::Outer(steps)) => {
                let typ = self
                    .ctx
                    .outer_class(self.symbols, steps)
                    .map_or_else(Type::object, |class| self.symbols.this_type(class));
                let to = self.create_temp_var(&typ, used_once);
                self.code.emit(Op::MoveThis { steps, to });
                to
            }
            Some(PropertyAccess::Left) => match left {
                Some(left) => self.generate_argument(left, false, used_once),
                None => unreachable!("qualified access without a qualifier"),
            },
        }
    }

    pub(super) fn generate_name_assignment(&mut self, id: ExprId, sink: &Assignable) {
        let tree = self.tree;
        let ExprKind::Name(name) = tree[id].kind() else {
            unreachable!()
        };
        let res = name.resolution();
        if res.plan == Plan::PropertyDeref {
            let prop = res.raw.property();
            let self_assigned = match (sink, res.access) {
                (&Assignable::LocalProp(dest), Some(PropertyAccess::This)) => prop == Some(dest),
                (&Assignable::TargetProp(Arg::This, dest), Some(PropertyAccess::This)) => {
                    prop == Some(dest)
                }
                _ => false,
            };
            if self_assigned {
                self.reporter.report(Error::PropSelfAssigned(
                    name.name.clone(),
                    tree[id].span(),
                ));
            }
        }
        match sink {
            &Assignable::LocalVar(reg) => {
                self.generate_name_value(id, Some(Arg::Reg(reg)), false, false);
            }
            _ => {
                let local_prop_ok = sink.supports_local_prop_mode();
                let value = self.generate_name_value(id, None, local_prop_ok, true);
                self.assign(sink, value);
            }
        }
    }

    pub(super) fn generate_name_assignable(&mut self, id: ExprId) -> Assignable {
        let tree = self.tree;
        let ExprKind::Name(name) = tree[id].kind() else {
            unreachable!()
        };
        let res = name.resolution();
        match (res.plan, &res.raw) {
            (Plan::None, &RawArg::Register(reg, _)) => Assignable::LocalVar(reg),
            (Plan::PropertyDeref, raw) => {
                let prop = raw.property().unwrap_or_else(|| unreachable!());
                match res.access {
                    Some(PropertyAccess::This) => Assignable::LocalProp(prop),
                    access => {
                        let target = self.generate_receiver(access, name.left, false);
                        Assignable::TargetProp(target, prop)
                    }
                }
            }
            _ => unreachable!("name was not validated as assignable"),
        }
    }

    /// The property of `this` that the expression reads, if it is such a read.
    pub(super) fn local_property(&self, id: ExprId) -> Option<PropertyId> {
        match self.tree[id].kind() {
            ExprKind::Name(name) if name.plan() == Plan::PropertyDeref => match name.access() {
                Some(PropertyAccess::This) => name.raw().and_then(RawArg::property),
                _ => None,
            },
            _ => None,
        }
    }
}
