use std::rc::Rc;

use bitfield_struct::bitfield;
use smallvec::{SmallVec, smallvec};
use vesper_ast::Span;
use vesper_bytecode::{Arg, Args, Op, Rets};

use super::generate::Generator;
use super::lower::CONSTRUCT;
use super::name::{PropertyAccess, RawArg};
use super::tree::{ExprId, ExprKind, Validated};
use super::validate::Validator;
use crate::IndexMap;
use crate::constant::Constant;
use crate::context::Local;
use crate::diagnostic::Error;
use crate::fit::{TypeFit, calc_fit_multi};
use crate::symbols::{MethodKind, TypeParam};
use crate::types::{ClassId, FunctionType, MethodId, Name, Type, TypeList, predef};

#[derive(Debug, Clone)]
pub struct InvokeArg {
    pub name: Option<(Name, Span)>,
    pub value: ExprId,
}

/// A call of a method, function or function value, or a partial application of one when some
/// arguments are left unbound.
#[derive(Debug, Clone)]
pub struct InvokeExpr {
    pub callee: ExprId,
    pub args: Box<[InvokeArg]>,
    /// The call does not wait for its results.
    pub is_async: bool,
    resolution: Option<Box<InvokeResolution>>,
}

impl InvokeExpr {
    pub fn new(callee: ExprId, args: Box<[InvokeArg]>) -> Self {
        Self {
            callee,
            args,
            is_async: false,
            resolution: None,
        }
    }

    pub fn with_async(self, is_async: bool) -> Self {
        Self { is_async, ..self }
    }

    #[inline]
    pub fn resolution(&self) -> Option<&InvokeResolution> {
        self.resolution.as_deref()
    }

    pub fn is_conditional_result(&self) -> bool {
        self.resolution
            .as_ref()
            .is_some_and(|res| res.flags.conditional_result())
    }

    pub fn is_auto_future(&self) -> bool {
        self.resolution
            .as_ref()
            .is_some_and(|res| res.flags.auto_future())
    }

    fn expect_resolution(&self) -> &InvokeResolution {
        self.resolution
            .as_deref()
            .unwrap_or_else(|| unreachable!("invocation generated before it was resolved"))
    }
}

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct InvokeFlags {
    /// The callee is a method that needs a receiver.
    pub binds_target: bool,
    /// At least one argument is bound.
    pub binds_params: bool,
    /// The callee is invoked rather than partially applied.
    pub calls: bool,
    /// A single tuple argument supplies all of the parameters.
    pub tuple_arg: bool,
    pub named_args: bool,
    pub conditional_result: bool,
    /// The qualifier was turned into the first argument of a function on its type.
    pub receiver_rewritten: bool,
    /// The results are delivered as a single tuple.
    pub packs_result: bool,
    /// The results of an asynchronous call are produced as future variables.
    pub auto_future: bool,
    #[bits(7)]
    __: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResolution {
    pub flags: InvokeFlags,
    pub target: CallTarget,
    pub method: Option<MethodId>,
    pub type_params: IndexMap<Name, Type>,
    /// An automatic conversion that turns the callee value into a function.
    pub converter: Option<MethodId>,
    /// For every parameter, the index of the argument that supplies it. Parameters without an
    /// argument take their default value, or stay open in a partial application.
    pub slots: Box<[Option<usize>]>,
    /// The signature of the callee as seen through its receiver.
    pub signature: Rc<FunctionType>,
}

/// Where the receiver of an invocation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// `this`, the given number of lexical steps out.
    This(u16),
    /// The qualifier of the callee.
    Left,
    Singleton(ClassId),
    Super,
    /// The qualifier of the callee, passed as the first argument of a function.
    Rewritten,
    /// A function that takes no receiver.
    Static,
    Construct,
    /// The callee is a value of a function type.
    Value,
}

#[derive(Debug)]
struct Candidate {
    method: MethodId,
    slots: Box<[Option<usize>]>,
    fit: TypeFit,
    tuple_arg: bool,
}

/// The types of the future variables that receive the results of an asynchronous call. A call
/// without results still produces a future that completes with it.
fn future_results(returns: &[Type]) -> TypeList {
    match returns {
        [] => smallvec![Type::future(Type::tuple(Vec::<Type>::new()))],
        returns => returns.iter().cloned().map(Type::future).collect(),
    }
}

impl Validator<'_, '_> {
    fn invoke(&self, id: ExprId) -> &InvokeExpr {
        match self.tree[id].kind() {
            ExprKind::Invoke(invoke) => invoke,
            _ => unreachable!("{id} is not an invocation"),
        }
    }

    fn is_unbound(&self, id: ExprId) -> bool {
        matches!(self.tree[id].kind(), ExprKind::NonBinding(_))
    }

    pub(super) fn validate_invoke(&mut self, id: ExprId, required: &[Type]) -> Option<ExprId> {
        let Some(mut res) = self.resolve_method(id, required, false) else {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        };
        let span = self.tree[id].span();
        let is_async = self.invoke(id).is_async;
        if is_async && !res.flags.calls() {
            self.reporter.report(Error::AsyncNotAllowed(span));
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        }
        let symbols = self.symbols;
        let type_params = res
            .method
            .map(|method| symbols[method].type_params().to_vec())
            .unwrap_or_default();
        let constraints = |name: &str| {
            type_params
                .iter()
                .find(|tp| &**tp.name() == name)
                .map(|tp| tp.constraint().clone())
        };
        let constrained = res.signature.substitute(&constraints);

        let mut valid = true;
        let args = self.arg_values(id, res.target);
        if res.flags.tuple_arg() {
            let tuple = Type::tuple(constrained.params.clone());
            valid &= self.validate_child(id, args[0], Some(&tuple)).is_some();
        } else {
            for (param, slot) in constrained.params.iter().zip(res.slots.iter()) {
                let Some(index) = *slot else {
                    continue;
                };
                let arg = args[index];
                if res.target == CallTarget::Rewritten && index == 0 {
                    continue;
                }
                if self.is_unbound(arg) {
                    valid &= self.validate_unbound(arg, param);
                } else {
                    valid &= self.validate_child(id, arg, Some(param)).is_some();
                }
            }
        }
        if !valid {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        }

        if !type_params.is_empty() {
            let args = self.arg_values(id, res.target);
            let mut bindings = IndexMap::default();
            for (param, slot) in res.signature.params.iter().zip(res.slots.iter()) {
                let actual = slot
                    .map(|index| args[index])
                    .filter(|&arg| !self.is_unbound(arg))
                    .and_then(|arg| self.tree[arg].validated())
                    .and_then(|validated| validated.typ().cloned());
                if let Some(actual) = actual {
                    self.unify(param, &actual, &type_params, true, &mut bindings);
                }
            }
            for (ret, req) in res.signature.returns.iter().zip(required) {
                self.unify(ret, req, &type_params, false, &mut bindings);
            }

            let unresolved = type_params
                .iter()
                .filter(|tp| !matches!(bindings.get(tp.name()), Some(Some(_))))
                .map(|tp| tp.name().clone())
                .collect::<Box<[_]>>();
            if !unresolved.is_empty() {
                self.reporter
                    .report(Error::TypeParamsUnresolvable(unresolved, span));
                return self.finish_validations(id, required, None, TypeFit::NoFit, None);
            }
            let mut ordered = IndexMap::default();
            for tp in &type_params {
                let Some(Some(binding)) = bindings.swap_remove(tp.name()) else {
                    continue;
                };
                if !symbols.is_a(&binding, tp.constraint()) {
                    self.report_wrong_type(id, tp.constraint(), &binding);
                    return self.finish_validations(id, required, None, TypeFit::NoFit, None);
                }
                ordered.insert(tp.name().clone(), binding);
            }
            log::trace!("{id} inferred type parameters {ordered:?}");
            res.type_params = ordered;
            if !self.check_inferred_args(id, &res) {
                return self.finish_validations(id, required, None, TypeFit::NoFit, None);
            }
        }

        let env = |name: &str| res.type_params.get(name).cloned();
        let signature = res.signature.substitute(&env);
        let mut fit = TypeFit::Fit;
        let types: TypeList = if res.flags.calls() {
            if signature.conditional {
                res.flags.set_conditional_result(true);
                if !required.is_empty() && !self.allows_conditional(id) {
                    self.reporter
                        .report(Error::ConditionalReturnNotAllowed(span));
                    return self.finish_validations(id, required, None, TypeFit::NoFit, None);
                }
            }
            let packs = !is_async
                && matches!(required, [_])
                && signature.returns.len() > 1
                && calc_fit_multi(symbols, &signature.returns, required).packs();
            if packs {
                res.flags.set_packs_result(true);
                fit = fit.add_pack();
                smallvec![Type::tuple(signature.returns.clone())]
            } else if is_async && required.is_empty() {
                // without a receiving variable the results are produced as futures
                res.flags.set_auto_future(true);
                future_results(&signature.returns)
            } else {
                signature.returns.iter().cloned().collect()
            }
        } else {
            let args = self.arg_values(id, res.target);
            let bound = |i: usize| {
                res.slots[i].is_some_and(|index| !self.is_unbound(args[index]))
            };
            smallvec![Type::Function(signature.bind_params(bound).into())]
        };

        if let ExprKind::Invoke(invoke) = self.tree.kind_mut(id) {
            invoke.resolution = Some(res.into());
        }
        self.finish_validations(id, required, Some(types), fit, None)
    }

    /// The types the invocation would produce, found by selecting its callee and inferring type
    /// parameters from the implicit types of the arguments.
    pub(super) fn implicit_invoke_types(&mut self, id: ExprId) -> Option<TypeList> {
        let res = self.resolve_method(id, &[], false)?;
        let type_params = res
            .method
            .map(|method| self.symbols[method].type_params().to_vec())
            .unwrap_or_default();
        let mut bindings = IndexMap::default();
        if !type_params.is_empty() && !res.flags.tuple_arg() {
            let args = self.arg_values(id, res.target);
            for (param, slot) in res.signature.params.iter().zip(res.slots.iter()) {
                let Some(arg) = slot.map(|index| args[index]) else {
                    continue;
                };
                if self.is_unbound(arg) {
                    continue;
                }
                if let Some(actual) = self.implicit_type(arg) {
                    self.unify(param, &actual, &type_params, true, &mut bindings);
                }
            }
        }
        let env = |name: &str| match bindings.get(name) {
            Some(Some(typ)) => Some(typ.clone()),
            _ => type_params
                .iter()
                .find(|tp| &**tp.name() == name)
                .map(|tp| tp.constraint().clone()),
        };
        let signature = res.signature.substitute(&env);
        if res.flags.calls() && self.invoke(id).is_async {
            return Some(future_results(&signature.returns));
        }
        if res.flags.calls() {
            return Some(signature.returns.iter().cloned().collect());
        }
        let args = self.arg_values(id, res.target);
        let bound =
            |i: usize| res.slots[i].is_some_and(|index| !self.is_unbound(args[index]));
        Some(smallvec![Type::Function(signature.bind_params(bound).into())])
    }

    /// Commits an unbound argument as a value of the parameter type, or of the declared type of
    /// `<T> _` when that type is acceptable to the parameter.
    fn validate_unbound(&mut self, arg: ExprId, param: &Type) -> bool {
        let ExprKind::NonBinding(declared) = self.tree[arg].kind() else {
            return false;
        };
        let typ = match declared.clone() {
            Some(declared) => {
                let Some(typ) = self.ctx.resolve_type(self.symbols, &declared, self.reporter) else {
                    return false;
                };
                if !self.symbols.is_a(&typ, param) {
                    self.report_wrong_type(arg, param, &typ);
                    return false;
                }
                typ
            }
            None => param.clone(),
        };
        self.tree
            .commit(arg, Validated::single(TypeFit::Fit, typ, None));
        true
    }

    /// The argument expressions in the order the slots refer to them.
    fn arg_values(&self, id: ExprId, target: CallTarget) -> SmallVec<[ExprId; 4]> {
        let invoke = self.invoke(id);
        let receiver = match (target, self.tree[invoke.callee].kind()) {
            (CallTarget::Rewritten, ExprKind::Name(name)) => name.left,
            _ => None,
        };
        receiver
            .into_iter()
            .chain(invoke.args.iter().map(|arg| arg.value))
            .collect()
    }

    /// Checks the validated arguments against the parameter types with the inferred type
    /// parameters substituted.
    fn check_inferred_args(&mut self, id: ExprId, res: &InvokeResolution) -> bool {
        if res.flags.tuple_arg() {
            return true;
        }
        let env = |name: &str| res.type_params.get(name).cloned();
        let args = self.arg_values(id, res.target);
        let mut ok = true;
        for (param, slot) in res.signature.params.iter().zip(res.slots.iter()) {
            let Some(&arg) = slot.and_then(|index| args.get(index)) else {
                continue;
            };
            if self.is_unbound(arg) {
                continue;
            }
            let Some(actual) = self.tree[arg].validated().and_then(|v| v.typ().cloned()) else {
                continue;
            };
            let param = param.substitute(&env);
            if !self.symbols.is_a(&actual, &param) {
                self.report_wrong_type(arg, &param, &actual);
                ok = false;
            }
        }
        ok
    }

    /// Binds the type parameters of a method by matching a declared type against an actual one.
    /// A second binding of the same parameter keeps the wider type of an argument or the
    /// narrower type of a return, falls back to a common type, and otherwise leaves the
    /// parameter unresolved.
    fn unify(
        &self,
        declared: &Type,
        actual: &Type,
        params: &[TypeParam],
        is_param: bool,
        bindings: &mut IndexMap<Name, Option<Type>>,
    ) {
        let actual = actual.strip_immutable();
        match declared.strip_immutable() {
            Type::Formal(name) if params.iter().any(|tp| tp.name() == name) => {
                let binding = match bindings.get(name) {
                    None => Some(actual.clone()),
                    Some(None) => return,
                    Some(Some(prev)) => {
                        let (narrow, wide) = if is_param {
                            (actual, prev)
                        } else {
                            (prev, actual)
                        };
                        if self.symbols.is_a(narrow, wide) {
                            return;
                        }
                        if self.symbols.is_a(wide, narrow) {
                            Some(actual.clone())
                        } else {
                            let common = self.symbols.common_type(prev, actual);
                            if common.is_none() {
                                log::debug!("conflicting bindings for type parameter {name}");
                            }
                            common
                        }
                    }
                };
                bindings.insert(name.clone(), binding);
            }
            Type::Data(app) if !app.args().is_empty() => {
                if let Some(inst) = self.symbols.instantiate_as(actual, app.id()) {
                    for (decl, act) in app.args().iter().zip(inst.args()) {
                        self.unify(decl, act, params, is_param, bindings);
                    }
                }
            }
            Type::Tuple(decls) => {
                if let Some(acts) = actual.tuple_elements() {
                    for (decl, act) in decls.iter().zip(acts) {
                        self.unify(decl, act, params, is_param, bindings);
                    }
                }
            }
            Type::Function(decl) => {
                if let Some(act) = actual.as_function() {
                    let pairs = decl
                        .params
                        .iter()
                        .zip(act.params.iter())
                        .chain(decl.returns.iter().zip(act.returns.iter()));
                    for (decl, act) in pairs {
                        self.unify(decl, act, params, is_param, bindings);
                    }
                }
            }
            Type::Nullable(inner) => {
                let actual = actual.strip_nullable().unwrap_or(actual);
                self.unify(inner, actual, params, is_param, bindings);
            }
            _ => {}
        }
    }

    /// Selects what the invocation calls. The selection is cached on the node, and `force`
    /// discards a cached selection.
    pub fn resolve_method(
        &mut self,
        id: ExprId,
        required: &[Type],
        force: bool,
    ) -> Option<InvokeResolution> {
        let invoke = self.invoke(id);
        if let (Some(res), false) = (&invoke.resolution, force) {
            return Some((**res).clone());
        }
        let callee = invoke.callee;
        let args = invoke.args.clone();
        let span = self.tree[id].span();

        let mut flags = InvokeFlags::new();
        if !self.check_arg_names(&args, &mut flags) {
            return None;
        }
        let unbound = args.iter().any(|arg| self.is_unbound(arg.value));
        let name = match self.tree[callee].kind() {
            ExprKind::Name(name) => Some((name.left, name.name.clone(), name.no_deref)),
            _ => None,
        };
        let no_deref = name.as_ref().is_some_and(|(_, _, no_deref)| *no_deref);
        flags.set_calls(!no_deref && !unbound);
        flags.set_binds_params(args.iter().any(|arg| !self.is_unbound(arg.value)));

        let redundant = self.redundant_returns(callee, required)?;
        let res = match name {
            Some((None, name, _)) if &*name == "super" => {
                self.resolve_super(id, None, &args, &redundant, flags)
            }
            Some((Some(left), name, _)) if &*name == CONSTRUCT => {
                self.resolve_construct(id, left, &args, flags)
            }
            Some((Some(left), name, _)) => {
                self.resolve_qualified_call(id, callee, left, &name, &args, &redundant, flags)
            }
            Some((None, name, _)) => {
                self.resolve_bare_call(id, callee, &name, &args, &redundant, flags)
            }
            None => self.resolve_value_call(id, callee, &args, flags),
        }?;

        match res.method {
            Some(method) => log::trace!(
                "{id} selected {} at {span:?}",
                self.symbols.display_method(method)
            ),
            None => log::trace!("{id} calls a function value at {span:?}"),
        }
        if let ExprKind::Invoke(invoke) = self.tree.kind_mut(id) {
            invoke.resolution = Some(res.clone().into());
        }
        Some(res)
    }

    fn check_arg_names(&mut self, args: &[InvokeArg], flags: &mut InvokeFlags) -> bool {
        let mut seen: SmallVec<[&Name; 4]> = smallvec![];
        let mut ok = true;
        for arg in args {
            match &arg.name {
                Some((name, span)) => {
                    flags.set_named_args(true);
                    if seen.contains(&name) {
                        self.reporter
                            .report(Error::NameCollision(name.clone(), *span));
                        ok = false;
                    }
                    seen.push(name);
                }
                None if flags.named_args() => {
                    self.reporter
                        .report(Error::ArgNameRequired(self.tree[arg.value].span()));
                    ok = false;
                }
                None => {}
            }
        }
        ok
    }

    /// The return types spelled out in the type arguments of the callee, reconciled with the
    /// required types. One fewer redundant type than required is accepted for a conditional
    /// result, where the boolean is implied.
    fn redundant_returns(&mut self, callee: ExprId, required: &[Type]) -> Option<Vec<Type>> {
        let ExprKind::Name(name) = self.tree[callee].kind() else {
            return Some(vec![]);
        };
        if name.type_args.is_empty() {
            return Some(vec![]);
        }
        let type_args = name.type_args.clone();
        let redundant = type_args
            .iter()
            .map(|arg| self.ctx.resolve_type(self.symbols, arg, self.reporter))
            .collect::<Option<Vec<_>>>()?;
        let compatible = required.is_empty()
            || redundant.len() == required.len()
            || (redundant.len() + 1 == required.len()
                && required[0].strip_immutable().is_class(predef::BOOLEAN));
        if !compatible {
            self.reporter.report(Error::WrongTypeArity {
                expected: required.len(),
                found: redundant.len(),
                span: self.tree[callee].span(),
            });
            return None;
        }
        Some(redundant)
    }

    fn resolve_super(
        &mut self,
        id: ExprId,
        name: Option<&Name>,
        args: &[InvokeArg],
        redundant: &[Type],
        mut flags: InvokeFlags,
    ) -> Option<InvokeResolution> {
        let span = self.tree[id].span();
        let symbols = self.symbols;
        let current = self.ctx.method().filter(|&m| symbols[m].kind() == MethodKind::Method);
        let (Some(current), Some(class)) = (current, self.ctx.this_class()) else {
            self.reporter.report(Error::NoSuper(span));
            return None;
        };
        let Some(super_type) = symbols[class].supers().first().cloned() else {
            self.reporter.report(Error::NoSuper(span));
            return None;
        };
        let method_name: Name = name.cloned().unwrap_or_else(|| symbols[current].name().into());
        let candidates = symbols
            .lookup_methods(&super_type, &method_name)
            .into_iter()
            .filter(|&m| symbols[m].kind() == MethodKind::Method)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            self.reporter.report(Error::NoSuper(span));
            return None;
        }
        self.ctx.require_this(span, self.reporter);
        let Some(found) =
            self.find_method(id, &method_name, &candidates, &super_type, args, redundant, flags)?
        else {
            self.reporter.report(Error::MissingMethod(method_name, span));
            return None;
        };
        flags.set_binds_target(true);
        Some(self.resolution(found, CallTarget::Super, &super_type, flags))
    }

    fn resolve_construct(
        &mut self,
        id: ExprId,
        left: ExprId,
        args: &[InvokeArg],
        mut flags: InvokeFlags,
    ) -> Option<InvokeResolution> {
        let span = self.tree[id].span();
        let symbols = self.symbols;
        let class = match self.resolve_raw_argument(left, None, false)? {
            RawArg::Class(class) => Some(class),
            RawArg::Typedef(typedef) => symbols[typedef].typ().class_id(),
            _ => None,
        };
        let class_name: Box<str> = match self.tree[left].kind() {
            ExprKind::Name(name) => name.name.as_ref().into(),
            _ => CONSTRUCT.into(),
        };
        let Some(class) = class else {
            self.reporter.report(Error::MissingConstructor(class_name, span));
            return None;
        };

        let type_args = match self.tree[left].kind() {
            ExprKind::Name(name) => name.type_args.clone(),
            _ => [].into(),
        };
        let args_of_class = if type_args.is_empty() {
            symbols[class]
                .params()
                .iter()
                .map(|p| p.constraint().clone())
                .collect()
        } else {
            type_args
                .iter()
                .map(|arg| self.ctx.resolve_type(symbols, arg, self.reporter))
                .collect::<Option<Vec<_>>>()?
        };
        let receiver = Type::app(class, args_of_class);

        let candidates = symbols[class]
            .methods_named(CONSTRUCT)
            .iter()
            .copied()
            .filter(|&m| symbols[m].kind() == MethodKind::Constructor)
            .collect::<Vec<_>>();
        let found = match &candidates[..] {
            [] => None,
            _ => self.find_method(id, &CONSTRUCT.into(), &candidates, &receiver, args, &[], flags)?,
        };
        let Some(found) = found else {
            self.reporter.report(Error::MissingConstructor(class_name, span));
            return None;
        };
        flags.set_binds_target(false);
        let mut res = self.resolution(found, CallTarget::Construct, &receiver, flags);
        res.signature =
            FunctionType::new(res.signature.params.iter().cloned(), [receiver], false).into();
        Some(res)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_qualified_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        left: ExprId,
        name: &Name,
        args: &[InvokeArg],
        redundant: &[Type],
        mut flags: InvokeFlags,
    ) -> Option<InvokeResolution> {
        let span = self.tree[id].span();
        let symbols = self.symbols;

        if let ExprKind::Name(qualifier) = self.tree[left].kind() {
            if qualifier.left.is_none() && &*qualifier.name == "super" {
                return self.resolve_super(id, Some(name), args, redundant, flags);
            }
            if qualifier.left.is_none() && &*qualifier.name == CONSTRUCT {
                let keyword = qualifier.name.clone();
                self.reporter
                    .report(Error::KeywordUnexpected(keyword, self.tree[left].span()));
                return None;
            }
            let identity = match self.resolve_raw_argument(left, None, false)? {
                RawArg::Class(class) => Some(class),
                RawArg::Typedef(typedef) => symbols[typedef].typ().class_id(),
                _ => None,
            };
            if let Some(class) = identity {
                self.validate_child(callee, left, None)?;
                let receiver = Type::nullary(class);
                let singleton = symbols[class].is_singleton();
                if let Some(prop) = symbols.lookup_property(&receiver, name) {
                    if singleton || symbols[prop].is_static() {
                        return self.resolve_value_call(id, callee, args, flags);
                    }
                }
                let candidates = symbols
                    .lookup_methods(&receiver, name)
                    .into_iter()
                    .filter(|&m| match symbols[m].kind() {
                        MethodKind::Method => singleton,
                        MethodKind::Function => true,
                        MethodKind::Constructor => false,
                    })
                    .collect::<Vec<_>>();
                let Some(found) =
                    self.find_method(id, name, &candidates, &receiver, args, redundant, flags)?
                else {
                    self.reporter.report(Error::MissingMethod(name.clone(), span));
                    return None;
                };
                let target = if symbols[found.method].kind() == MethodKind::Method {
                    flags.set_binds_target(true);
                    CallTarget::Singleton(class)
                } else {
                    CallTarget::Static
                };
                return Some(self.resolution(found, target, &receiver, flags));
            }
        }

        let left = self.validate_child(callee, left, None)?;
        let Some(receiver) = self.tree[left].expect_validated().typ().cloned() else {
            self.reporter
                .report(Error::ReturnRequired(self.tree[left].span()));
            return None;
        };
        if symbols.lookup_property(&receiver, name).is_some() {
            return self.resolve_value_call(id, callee, args, flags);
        }
        let candidates = symbols
            .lookup_methods(&receiver, name)
            .into_iter()
            .filter(|&m| symbols[m].kind() == MethodKind::Method)
            .collect::<Vec<_>>();
        if let Some(found) =
            self.find_method(id, name, &candidates, &receiver, args, redundant, flags)?
        {
            flags.set_binds_target(true);
            return Some(self.resolution(found, CallTarget::Left, &receiver, flags));
        }

        if self.options.receiver_rewrite && flags.calls() {
            let functions = symbols
                .lookup_methods(&receiver, name)
                .into_iter()
                .filter(|&m| symbols[m].is_function() && !symbols[m].params().is_empty())
                .collect::<Vec<_>>();
            let rewritten = std::iter::once(InvokeArg {
                name: None,
                value: left,
            })
            .chain(args.iter().cloned())
            .collect::<Vec<_>>();
            if let Some(found) =
                self.find_method(id, name, &functions, &receiver, &rewritten, redundant, flags)?
            {
                log::debug!(
                    "{id} rewrote `.{name}` into a call of {} on the qualifier",
                    symbols.display_method(found.method)
                );
                flags.set_receiver_rewritten(true);
                return Some(self.resolution(found, CallTarget::Rewritten, &receiver, flags));
            }
        }

        self.reporter.report(Error::MissingMethod(name.clone(), span));
        None
    }

    fn resolve_bare_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        name: &Name,
        args: &[InvokeArg],
        redundant: &[Type],
        mut flags: InvokeFlags,
    ) -> Option<InvokeResolution> {
        let span = self.tree[id].span();
        let symbols = self.symbols;
        if let Some(Local::Var(_)) = self.ctx.lookup(name) {
            return self.resolve_value_call(id, callee, args, flags);
        }

        let mut class = self.ctx.this_class();
        let mut steps = 0u16;
        let mut has_this = self.ctx.has_this();
        while let Some(current) = class {
            let def = &symbols[current];
            let receiver = symbols.this_type(current);
            if symbols.lookup_property(&receiver, name).is_some() {
                return self.resolve_value_call(id, callee, args, flags);
            }
            let all = symbols
                .lookup_methods(&receiver, name)
                .into_iter()
                .filter(|&m| symbols[m].kind() != MethodKind::Constructor)
                .collect::<Vec<_>>();
            if !all.is_empty() {
                let receiverless = !has_this && !def.is_singleton();
                let allowed = all
                    .iter()
                    .copied()
                    .filter(|&m| !receiverless || symbols[m].is_function())
                    .collect::<Vec<_>>();
                if let Some(found) =
                    self.find_method(id, name, &allowed, &receiver, args, redundant, flags)?
                {
                    let target = match symbols[found.method].kind() {
                        MethodKind::Method if has_this => {
                            self.ctx.require_this(span, self.reporter);
                            CallTarget::This(steps)
                        }
                        MethodKind::Method => CallTarget::Singleton(current),
                        _ => CallTarget::Static,
                    };
                    flags.set_binds_target(matches!(
                        target,
                        CallTarget::This(_) | CallTarget::Singleton(_)
                    ));
                    return Some(self.resolution(found, target, &receiver, flags));
                }
                if receiverless
                    && self
                        .find_method(id, name, &all, &receiver, args, redundant, flags)?
                        .is_some()
                {
                    let err = if steps == 0 {
                        Error::NoThisMethod(name.clone(), span)
                    } else {
                        Error::NoOuterMethod(name.clone(), span)
                    };
                    self.reporter.report(err);
                    return None;
                }
            }
            has_this &= !def.is_static();
            class = def.parent();
            steps += 1;
        }

        self.reporter.report(Error::MissingMethod(name.clone(), span));
        None
    }

    /// Resolves a call of a value: a variable or property of a function type, or any other
    /// expression producing a function.
    fn resolve_value_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        args: &[InvokeArg],
        flags: InvokeFlags,
    ) -> Option<InvokeResolution> {
        let span = self.tree[id].span();
        let callee = self.validate_child(id, callee, None)?;
        let Some(typ) = self.tree[callee].expect_validated().typ().cloned() else {
            self.reporter
                .report(Error::ReturnRequired(self.tree[callee].span()));
            return None;
        };
        let (signature, converter) = match typ.strip_immutable() {
            Type::Function(func) => (func.clone(), None),
            _ => {
                let converted = self.symbols.find_function_conversion(&typ).and_then(|conv| {
                    match self.symbols[conv].returns() {
                        [ret] => {
                            let owner = self.symbols[conv].owner();
                            let ret = self.symbols.member_type(&typ, owner, ret);
                            ret.as_function().map(|func| (Rc::new(func.clone()), Some(conv)))
                        }
                        _ => None,
                    }
                });
                let Some(converted) = converted else {
                    self.reporter.report(Error::WrongType {
                        expected: "function".into(),
                        found: typ.display(self.symbols).to_string().into(),
                        span: self.tree[callee].span(),
                    });
                    return None;
                };
                converted
            }
        };

        if let Some(arg) = args.iter().find(|arg| arg.name.is_some()) {
            self.reporter
                .report(Error::ArgNameRequired(self.tree[arg.value].span()));
            return None;
        }
        let params = signature.params.len();
        if args.len() > params || (flags.calls() && args.len() < params) {
            self.reporter.report(Error::WrongTypeArity {
                expected: params,
                found: args.len(),
                span,
            });
            return None;
        }
        Some(InvokeResolution {
            flags,
            target: CallTarget::Value,
            method: None,
            type_params: IndexMap::default(),
            converter,
            slots: (0..params).map(|i| (i < args.len()).then_some(i)).collect(),
            signature,
        })
    }

    fn resolution(
        &self,
        found: Candidate,
        target: CallTarget,
        receiver: &Type,
        mut flags: InvokeFlags,
    ) -> InvokeResolution {
        flags.set_tuple_arg(found.tuple_arg);
        InvokeResolution {
            flags,
            target,
            method: Some(found.method),
            type_params: IndexMap::default(),
            converter: None,
            slots: found.slots,
            signature: self.method_signature(found.method, receiver).into(),
        }
    }

    /// The signature of a method with the formal types of its owner replaced by the type
    /// arguments of the receiver.
    fn method_signature(&self, method: MethodId, receiver: &Type) -> FunctionType {
        let def = &self.symbols[method];
        let declared = Type::Function(def.signature().into());
        match self.symbols.member_type(receiver, def.owner(), &declared) {
            Type::Function(func) => (*func).clone(),
            _ => def.signature(),
        }
    }

    /// Assigns the arguments to the parameters of a method. Named arguments go to the parameter
    /// of the same name, and the rest go in order.
    fn match_slots(
        &self,
        method: MethodId,
        args: &[InvokeArg],
        calls: bool,
    ) -> Option<Box<[Option<usize>]>> {
        let def = &self.symbols[method];
        let mut slots = vec![None; def.params().len()];
        let mut next = 0;
        for (i, arg) in args.iter().enumerate() {
            let index = match &arg.name {
                Some((name, _)) => def.param_index(name)?,
                None => {
                    next += 1;
                    next - 1
                }
            };
            let slot = slots.get_mut(index)?;
            if slot.is_some() {
                return None;
            }
            *slot = Some(i);
        }
        let missing = slots
            .iter()
            .zip(def.params())
            .any(|(slot, param)| slot.is_none() && !param.has_default());
        (!calls || !missing).then(|| slots.into())
    }

    #[allow(clippy::too_many_arguments)]
    fn find_method(
        &mut self,
        id: ExprId,
        name: &Name,
        candidates: &[MethodId],
        receiver: &Type,
        args: &[InvokeArg],
        redundant: &[Type],
        flags: InvokeFlags,
    ) -> Option<Option<Candidate>> {
        let mut exact = vec![];
        let mut converting = vec![];
        for &method in candidates {
            let Some(slots) = self.match_slots(method, args, flags.calls()) else {
                continue;
            };
            let signature = self.constrained_signature(method, receiver);
            let mut fit = TypeFit::Fit;
            for (param, slot) in signature.params.iter().zip(slots.iter()) {
                let Some(index) = *slot else {
                    continue;
                };
                let arg = args[index].value;
                if !self.is_unbound(arg) {
                    fit = fit.combine(self.test_fit(arg, Some(param), true));
                }
                if !fit.fits() {
                    break;
                }
            }
            if !fit.fits() || !self.satisfies_redundant(&signature, redundant, flags) {
                continue;
            }
            let candidate = Candidate {
                method,
                slots,
                fit,
                tuple_arg: false,
            };
            if fit.converts() {
                converting.push(candidate);
            } else {
                exact.push(candidate);
            }
        }

        let set = if exact.is_empty() { converting } else { exact };
        match set.len() {
            0 => Some(self.find_tuple_method(candidates, receiver, args, flags)),
            1 => set.into_iter().next().map(Some),
            _ => self.choose_best(id, name, set, receiver, redundant).map(Some),
        }
    }

    /// Retries a call of a single argument as a tuple supplying every parameter.
    fn find_tuple_method(
        &mut self,
        candidates: &[MethodId],
        receiver: &Type,
        args: &[InvokeArg],
        flags: InvokeFlags,
    ) -> Option<Candidate> {
        let [InvokeArg { name: None, value }] = args else {
            return None;
        };
        if !flags.calls() {
            return None;
        }
        let elements = self.implicit_type(*value)?.tuple_elements()?.to_vec();
        let mut found = candidates.iter().copied().filter(|&method| {
            let signature = self.constrained_signature(method, receiver);
            signature.params.len() == elements.len()
                && elements
                    .iter()
                    .zip(signature.params.iter())
                    .all(|(elem, param)| self.symbols.is_a(elem, param))
        });
        let method = found.next()?;
        if found.next().is_some() {
            return None;
        }
        log::debug!(
            "calling {} with the elements of a tuple",
            self.symbols.display_method(method)
        );
        Some(Candidate {
            method,
            slots: [Some(0)].into(),
            fit: TypeFit::Fit,
            tuple_arg: true,
        })
    }

    fn constrained_signature(&self, method: MethodId, receiver: &Type) -> FunctionType {
        let type_params = self.symbols[method].type_params();
        self.method_signature(method, receiver).substitute(&|name: &str| {
            type_params
                .iter()
                .find(|tp| &**tp.name() == name)
                .map(|tp| tp.constraint().clone())
        })
    }

    fn satisfies_redundant(
        &self,
        signature: &FunctionType,
        redundant: &[Type],
        flags: InvokeFlags,
    ) -> bool {
        if redundant.is_empty() || !flags.calls() {
            return true;
        }
        let returns = match &signature.returns[..] {
            [_, rest @ ..]
                if signature.conditional && redundant.len() < signature.returns.len() =>
            {
                rest
            }
            all => all,
        };
        returns.len() >= redundant.len() && calc_fit_multi(self.symbols, returns, redundant).fits()
    }

    /// Picks the candidate whose parameters are strictly more specific than those of every other
    /// candidate, falling back to the candidates whose returns match the redundant types exactly.
    fn choose_best(
        &mut self,
        id: ExprId,
        name: &Name,
        set: Vec<Candidate>,
        receiver: &Type,
        redundant: &[Type],
    ) -> Option<Candidate> {
        let symbols = self.symbols;
        let by_arg = set
            .iter()
            .map(|candidate| {
                let signature = self.constrained_signature(candidate.method, receiver);
                let mut params = vec![None; candidate.slots.len()];
                for (param, slot) in signature.params.iter().zip(candidate.slots.iter()) {
                    if let Some(index) = *slot {
                        if let Some(entry) = params.get_mut(index) {
                            *entry = Some(param.clone());
                        }
                    }
                }
                (params, signature.returns)
            })
            .collect::<Vec<_>>();
        let at_least_as_specific = |a: usize, b: usize| {
            by_arg[a]
                .0
                .iter()
                .zip(by_arg[b].0.iter())
                .all(|(pa, pb)| match (pa, pb) {
                    (Some(pa), Some(pb)) => symbols.is_a(pa, pb),
                    _ => true,
                })
        };
        let dominant = (0..set.len())
            .filter(|&a| {
                (0..set.len())
                    .filter(|&b| b != a)
                    .all(|b| at_least_as_specific(a, b) && !at_least_as_specific(b, a))
            })
            .collect::<Vec<_>>();

        let best = match dominant[..] {
            [best] => Some(best),
            _ if !redundant.is_empty() => {
                let exact = (0..set.len())
                    .filter(|&i| by_arg[i].1.iter().zip(redundant).all(|(ret, red)| ret == red))
                    .collect::<Vec<_>>();
                match exact[..] {
                    [best] => Some(best),
                    _ => None,
                }
            }
            _ => None,
        };
        match best {
            Some(best) => set.into_iter().nth(best),
            None => {
                let signatures = set
                    .iter()
                    .map(|candidate| symbols.display_method(candidate.method).to_string().into())
                    .collect();
                self.reporter.report(Error::SignatureAmbiguous(
                    name.clone(),
                    signatures,
                    self.tree[id].span(),
                ));
                None
            }
        }
    }
}

impl Generator<'_, '_> {
    /// Generates the invocation, delivering its results into `rets`. Results without a
    /// destination are discarded.
    pub(super) fn generate_invoke(&mut self, id: ExprId, rets: &[Arg]) {
        let tree = self.tree;
        let ExprKind::Invoke(invoke) = tree[id].kind() else {
            unreachable!("{id} is not an invocation")
        };
        let res = invoke.expect_resolution();
        let left = match tree[invoke.callee].kind() {
            ExprKind::Name(name) => name.left,
            _ => None,
        };
        let all_args = match res.target {
            CallTarget::Rewritten => left
                .into_iter()
                .chain(invoke.args.iter().map(|a| a.value))
                .collect(),
            _ => invoke.args.iter().map(|a| a.value).collect::<SmallVec<[ExprId; 4]>>(),
        };
        let bound = res
            .slots
            .iter()
            .enumerate()
            .filter_map(|(param, slot)| {
                let arg = all_args[(*slot)?];
                (!matches!(tree[arg].kind(), ExprKind::NonBinding(_))).then_some((param, arg))
            })
            .collect::<Vec<_>>();
        let values = bound.iter().map(|&(_, arg)| arg).collect::<Vec<_>>();
        let type_args = res
            .type_params
            .values()
            .map(|typ| Arg::Const(self.code.constant(Constant::Type(typ.clone()))))
            .collect::<Vec<_>>();
        let has_args = !values.is_empty() || !type_args.is_empty();

        let target = match res.target {
            CallTarget::This(0) | CallTarget::Super => Some(Arg::This),
            CallTarget::This(steps) => {
                Some(self.generate_receiver(Some(PropertyAccess::Outer(steps)), None, !has_args))
            }
            CallTarget::Singleton(class) => {
                Some(Arg::Const(self.code.constant(Constant::Singleton(class))))
            }
            CallTarget::Left => {
                let left =
                    left.unwrap_or_else(|| unreachable!("qualified call without a qualifier"));
                let value = self.generate_argument(left, false, !has_args);
                Some(self.ensure_point_in_time(left, value, &values))
            }
            CallTarget::Value => {
                let used_once = !has_args && res.converter.is_none();
                let value = self.generate_argument(invoke.callee, false, used_once);
                let value = match res.converter {
                    Some(converter) => {
                        let typ = Type::Function(res.signature.clone());
                        let to = self.create_temp_var(&typ, !has_args);
                        let method = self.code.constant(Constant::Method(converter));
                        self.code.emit(Op::Invoke {
                            target: value,
                            method,
                            args: Args::None,
                            rets: Rets::One(to),
                        });
                        to
                    }
                    None => value,
                };
                Some(self.ensure_point_in_time(invoke.callee, value, &values))
            }
            CallTarget::Rewritten | CallTarget::Static | CallTarget::Construct => None,
        };

        let mut generated = Vec::with_capacity(values.len());
        for (i, &value) in values.iter().enumerate() {
            let later = &values[i + 1..];
            let arg = self.generate_argument(value, false, later.is_empty());
            generated.push(self.ensure_point_in_time(value, arg, later));
        }

        if res.flags.calls() {
            self.generate_call(id, res, target, type_args, &bound, generated, rets);
        } else {
            self.generate_bind(id, res, target, type_args, &bound, generated, rets);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_call(
        &mut self,
        id: ExprId,
        res: &InvokeResolution,
        target: Option<Arg>,
        type_args: Vec<Arg>,
        bound: &[(usize, ExprId)],
        generated: Vec<Arg>,
        rets: &[Arg],
    ) {
        let is_async = matches!(self.tree[id].kind(), ExprKind::Invoke(invoke) if invoke.is_async);
        let args = if res.flags.tuple_arg() {
            Args::Tuple(generated.first().copied().unwrap_or(Arg::Default))
        } else {
            let mut generated = generated.into_iter();
            let mut bound = bound.iter().map(|&(param, _)| param).peekable();
            let params = (0..res.slots.len()).map(|param| {
                if bound.peek() == Some(&param) {
                    bound.next();
                    generated.next().unwrap_or(Arg::Default)
                } else {
                    Arg::Default
                }
            });
            Args::new(type_args.into_iter().chain(params.collect::<Vec<_>>()))
        };
        let first_ret = rets.first().copied().unwrap_or(Arg::Ignore);
        let rets = if res.flags.packs_result() {
            Rets::Tuple(first_ret)
        } else if is_async {
            // discarded results of an asynchronous call are not waited for
            let count = res.signature.returns.len().max(1);
            Rets::new((0..count).map(|i| rets.get(i).copied().unwrap_or(Arg::IgnoreAsync)))
        } else {
            Rets::new(rets.iter().copied())
        };
        log::trace!("{id} calls with shape {}{}", args.shape(), rets.shape());

        let method = res.method.map(|method| self.code.constant(Constant::Method(method)));
        let op = match (res.target, target, method) {
            (CallTarget::Construct, _, Some(ctor)) => Op::Construct {
                ctor,
                args,
                to: first_ret,
            },
            (CallTarget::Value, Some(func), _) => Op::Call { func, args, rets },
            (
                CallTarget::This(_) | CallTarget::Left | CallTarget::Singleton(_),
                Some(target),
                Some(method),
            ) => Op::Invoke {
                target,
                method,
                args,
                rets,
            },
            (_, _, Some(method)) => Op::Call {
                func: Arg::Const(method),
                args,
                rets,
            },
            (target, _, None) => unreachable!("call through {target:?} without a method"),
        };
        self.code.emit(op);
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_bind(
        &mut self,
        id: ExprId,
        res: &InvokeResolution,
        target: Option<Arg>,
        type_args: Vec<Arg>,
        bound: &[(usize, ExprId)],
        generated: Vec<Arg>,
        rets: &[Arg],
    ) {
        let typ = self.single_type(id);
        let to = match rets.first() {
            Some(&to) => to,
            None => Arg::Ignore,
        };
        let offset = type_args.len();
        let params = type_args
            .into_iter()
            .enumerate()
            .chain(
                bound
                    .iter()
                    .map(|&(param, _)| param + offset)
                    .zip(generated),
            )
            .map(|(position, arg)| (u16::try_from(position).unwrap_or(u16::MAX), arg))
            .collect::<Box<[_]>>();

        let func = match (res.target, target, res.method) {
            (CallTarget::Value, Some(func), _) => func,
            (
                CallTarget::This(_)
                | CallTarget::Left
                | CallTarget::Singleton(_)
                | CallTarget::Super,
                Some(target),
                Some(method),
            ) => {
                let bound_to = if params.is_empty() {
                    to
                } else {
                    self.create_temp_var(&typ, true)
                };
                let method = self.code.constant(Constant::Method(method));
                self.code.emit(Op::MBind {
                    target,
                    method,
                    to: bound_to,
                });
                if params.is_empty() {
                    return;
                }
                bound_to
            }
            (_, _, Some(method)) => Arg::Const(self.code.constant(Constant::Method(method))),
            (target, _, None) => unreachable!("binding through {target:?} without a method"),
        };
        if params.is_empty() {
            if func != to {
                self.code.emit(Op::Move { from: func, to });
            }
        } else {
            self.code.emit(Op::FBind { func, params, to });
        }
    }
}
