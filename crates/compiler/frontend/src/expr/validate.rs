use std::slice;

use smallvec::{SmallVec, smallvec};

use super::tree::{ExprId, ExprKind, ExprTree, Validated};
use crate::constant::Constant;
use crate::context::Context;
use crate::diagnostic::{Error, Reporter};
use crate::fit::{TypeFit, calc_fit, calc_fit_multi};
use crate::types::{MethodId, Type, TypeList};
use crate::{Options, Symbols};

/// Validates expressions against required types, resolving names and invocations and recording
/// the result types and constant values of every node.
#[derive(Debug)]
pub struct Validator<'a, 'src> {
    pub(super) tree: &'a mut ExprTree<'src>,
    pub(super) ctx: &'a mut Context,
    pub(super) symbols: &'a Symbols,
    pub(super) reporter: &'a mut Reporter,
    pub(super) options: &'a Options,
}

impl<'a, 'src> Validator<'a, 'src> {
    pub fn new(
        tree: &'a mut ExprTree<'src>,
        ctx: &'a mut Context,
        symbols: &'a Symbols,
        reporter: &'a mut Reporter,
        options: &'a Options,
    ) -> Self {
        Self {
            tree,
            ctx,
            symbols,
            reporter,
            options,
        }
    }

    #[inline]
    pub fn tree(&self) -> &ExprTree<'src> {
        self.tree
    }

    /// Whether the node natively produces a list of values rather than a single one.
    pub fn is_multi_value(&self, id: ExprId) -> bool {
        matches!(
            self.tree[id].kind(),
            ExprKind::Invoke(_) | ExprKind::Assign { .. } | ExprKind::Convert { .. }
        )
    }

    /// Validates a node that must produce a single value, or none at all when `required` is
    /// absent. Returns the node that replaces it in the tree, or `None` on failure.
    pub fn validate(&mut self, id: ExprId, required: Option<&Type>) -> Option<ExprId> {
        if let Some(validated) = self.tree[id].validated() {
            return validated.fit().fits().then_some(id);
        }
        if self.is_multi_value(id) {
            return self.validate_multi(id, required.map_or(&[], slice::from_ref));
        }
        match self.tree[id].kind() {
            ExprKind::Literal(_) => self.validate_literal(id, required),
            ExprKind::Tuple { .. } => self.validate_tuple(id, required),
            ExprKind::Name(_) => self.validate_name(id, required),
            ExprKind::Sequential { .. } => self.validate_sequential(id, required),
            ExprKind::Index { .. } => self.validate_index(id, required),
            ExprKind::NotNull(_) => self.validate_not_null(id, required),
            ExprKind::NonBinding(_) => {
                self.reporter
                    .report(Error::UnboundNotAllowed(self.tree[id].span()));
                self.finish_validation(id, required, None, TypeFit::NoFit, None)
            }
            ExprKind::Invoke(_) | ExprKind::Assign { .. } | ExprKind::Convert { .. } => {
                unreachable!("multi-value expressions are validated through validate_multi")
            }
        }
    }

    /// Validates a node against a list of required types.
    pub fn validate_multi(&mut self, id: ExprId, required: &[Type]) -> Option<ExprId> {
        if let Some(validated) = self.tree[id].validated() {
            return validated.fit().fits().then_some(id);
        }
        match self.tree[id].kind() {
            ExprKind::Invoke(_) => self.validate_invoke(id, required),
            ExprKind::Assign { .. } => self.validate_assign(id, required),
            ExprKind::Tuple { .. } if required.len() > 1 => self.validate_unpacked(id, required),
            ExprKind::Convert { .. } => unreachable!("conversions are created validated"),
            _ => match required {
                [] => self.validate(id, None),
                [typ] => self.validate(id, Some(typ)),
                _ => {
                    self.reporter.report(Error::WrongTypeArity {
                        expected: required.len(),
                        found: 1,
                        span: self.tree[id].span(),
                    });
                    self.finish_validations(
                        id,
                        required,
                        Some(required.iter().cloned().collect()),
                        TypeFit::Fit,
                        None,
                    );
                    None
                }
            },
        }
    }

    /// Validates a child and applies its replacement to the parent.
    pub(super) fn validate_child(
        &mut self,
        parent: ExprId,
        child: ExprId,
        required: Option<&Type>,
    ) -> Option<ExprId> {
        let new = self.validate(child, required)?;
        if new != child {
            self.tree.replace_child(parent, child, new);
        }
        Some(new)
    }

    pub(super) fn validate_child_multi(
        &mut self,
        parent: ExprId,
        child: ExprId,
        required: &[Type],
    ) -> Option<ExprId> {
        let new = self.validate_multi(child, required)?;
        if new != child {
            self.tree.replace_child(parent, child, new);
        }
        Some(new)
    }

    /// Runs `f` against a throwaway copy of the subtree at `root`, the context, and the
    /// diagnostics. Nothing it does is observable afterwards.
    pub(super) fn speculate<A>(
        &mut self,
        root: ExprId,
        f: impl FnOnce(&mut Validator<'_, 'src>) -> A,
    ) -> A {
        let checkpoint = self.tree.checkpoint(root);
        let mut reporter = self.reporter.branch();
        let tree = &mut *self.tree;
        let symbols = self.symbols;
        let options = self.options;
        let res = self.ctx.speculate(|ctx| {
            f(&mut Validator::new(tree, ctx, symbols, &mut reporter, options))
        });
        self.tree.restore(checkpoint);
        res
    }

    /// The types the node would produce without any requirement. Never reports diagnostics, and
    /// resolves names and invocations without validating them.
    pub fn implicit_types(&mut self, id: ExprId) -> Option<TypeList> {
        if let Some(validated) = self.tree[id].validated() {
            return validated
                .fit()
                .fits()
                .then(|| validated.types().iter().cloned().collect());
        }
        match self.tree[id].kind() {
            ExprKind::Literal(constant) => Some(smallvec![constant.type_of(self.symbols)]),
            ExprKind::Tuple { items, .. } => {
                let items = items.clone();
                let types = items
                    .iter()
                    .map(|&item| self.implicit_type(item))
                    .collect::<Option<Vec<_>>>()?;
                Some(smallvec![Type::tuple(types)])
            }
            ExprKind::NonBinding(_) => None,
            ExprKind::Assign { .. } => Some(smallvec![]),
            &ExprKind::Sequential { operand, .. } => {
                self.implicit_type(operand).map(|typ| smallvec![typ])
            }
            &ExprKind::NotNull(inner) => {
                let typ = self.implicit_type(inner)?;
                let typ = typ.strip_nullable().cloned().unwrap_or(typ);
                Some(smallvec![typ])
            }
            ExprKind::Name(_) => self
                .speculate(id, |v| v.implicit_name_type(id))
                .map(|typ| smallvec![typ]),
            ExprKind::Invoke(_) => self.speculate(id, |v| v.implicit_invoke_types(id)),
            ExprKind::Index { target, indices, .. } => {
                let (target, arity) = (*target, indices.len());
                let typ = self.implicit_type(target)?;
                self.element_type(&typ, arity).map(|typ| smallvec![typ])
            }
            ExprKind::Convert { inner, conversions } => {
                let (inner, conversions) = (*inner, conversions.clone());
                let mut types = self.implicit_types(inner)?;
                for (typ, conversion) in types.iter_mut().zip(conversions.iter()) {
                    if let &Some(method) = conversion {
                        let def = &self.symbols[method];
                        let ret = def.returns().first()?;
                        *typ = self.symbols.member_type(typ, def.owner(), ret);
                    }
                }
                Some(types)
            }
        }
    }

    pub fn implicit_type(&mut self, id: ExprId) -> Option<Type> {
        let types = self.implicit_types(id)?;
        types.into_iter().next()
    }

    /// Tests how well the node could produce a value of the required type. A non-exhaustive
    /// test may report a false negative.
    pub fn test_fit(&mut self, id: ExprId, required: Option<&Type>, exhaustive: bool) -> TypeFit {
        let Some(required) = required else {
            return TypeFit::Fit;
        };
        if let Some(validated) = self.tree[id].validated() {
            return calc_fit(self.symbols, validated.typ(), Some(required));
        }
        match self.tree[id].kind() {
            ExprKind::Literal(constant) => self.test_literal_fit(constant, required),
            ExprKind::NonBinding(_) => TypeFit::Fit,
            ExprKind::Tuple { items, .. }
                if required
                    .tuple_elements()
                    .is_some_and(|elems| elems.len() == items.len()) =>
            {
                let items = items.clone();
                let elems = required.tuple_elements().unwrap_or_default().to_vec();
                items
                    .iter()
                    .zip(&elems)
                    .fold(TypeFit::Fit, |acc, (&item, elem)| {
                        acc.combine(self.test_fit(item, Some(elem), exhaustive))
                    })
            }
            _ => {
                let fit = match self.implicit_types(id) {
                    Some(types) => calc_fit_multi(self.symbols, &types, slice::from_ref(required)),
                    None => TypeFit::NoFit,
                };
                if !fit.fits() && exhaustive && self.options.exhaustive_fit_testing {
                    self.test_exhaustive(id, slice::from_ref(required))
                } else {
                    fit
                }
            }
        }
    }

    pub fn test_fit_multi(&mut self, id: ExprId, required: &[Type], exhaustive: bool) -> TypeFit {
        match required {
            [] => TypeFit::Fit,
            [typ] if !self.is_multi_value(id) => self.test_fit(id, Some(typ), exhaustive),
            _ if self.is_multi_value(id) => {
                let fit = match self.implicit_types(id) {
                    Some(types) => calc_fit_multi(self.symbols, &types, required),
                    None => TypeFit::NoFit,
                };
                if !fit.fits() && exhaustive && self.options.exhaustive_fit_testing {
                    self.test_exhaustive(id, required)
                } else {
                    fit
                }
            }
            _ => match self.tree[id].kind() {
                ExprKind::Tuple { items, .. } if items.len() >= required.len() => {
                    let items = items.clone();
                    items
                        .iter()
                        .zip(required)
                        .fold(TypeFit::Fit, |acc, (&item, typ)| {
                            acc.combine(self.test_fit(item, Some(typ), exhaustive))
                        })
                        .add_unpack()
                }
                _ => TypeFit::NoFit,
            },
        }
    }

    /// Validates the node speculatively and reports the fit it ends up with.
    pub(super) fn test_exhaustive(&mut self, id: ExprId, required: &[Type]) -> TypeFit {
        self.speculate(id, |v| {
            v.validate_multi(id, required)
                .and_then(|new| v.tree[new].validated().map(Validated::fit))
                .unwrap_or(TypeFit::NoFit)
        })
    }

    /// Commits the outcome of validating a single-value node, applying at most one implicit
    /// conversion to satisfy `required`.
    pub(super) fn finish_validation(
        &mut self,
        id: ExprId,
        required: Option<&Type>,
        actual: Option<Type>,
        mut fit: TypeFit,
        mut constant: Option<Constant>,
    ) -> Option<ExprId> {
        if fit.fits() {
            self.check_short_circuit(id);
        }
        let Some(mut actual) = actual else {
            let typ = required.cloned().unwrap_or_else(Type::object);
            self.tree
                .commit(id, Validated::single(TypeFit::NoFit, typ, None));
            return None;
        };
        if constant.is_some() && !self.symbols.is_service(&actual) {
            actual = self.symbols.freeze(actual);
        }

        let mut conversion = None;
        if let Some(required) = required.filter(|req| !self.symbols.is_a(&actual, req)) {
            match self.symbols.find_conversion(&actual, required) {
                Some(method) if !fit.converts() => {
                    fit = fit.add_conversion();
                    match constant.as_ref().and_then(|c| c.convert(method, self.symbols)) {
                        Some(converted) => {
                            actual = self.symbols.freeze(converted.type_of(self.symbols));
                            constant = Some(converted);
                        }
                        None => conversion = Some((method, required.clone())),
                    }
                }
                _ => {
                    self.report_wrong_type(id, required, &actual);
                    fit = TypeFit::NoFit;
                }
            }
        }

        let typ = match (fit.fits(), required) {
            (false, Some(required)) => required.clone(),
            _ => actual,
        };
        self.tree
            .commit(id, Validated::single(fit, typ, constant));
        if !fit.fits() {
            return None;
        }
        match conversion {
            Some((method, converted)) => Some(self.wrap_conversion(
                id,
                [Some(method)].into(),
                smallvec![self.converted_type(method, &converted)],
                fit,
            )),
            None => Some(id),
        }
    }

    /// Commits the outcome of validating a multi-value node position by position.
    pub(super) fn finish_validations(
        &mut self,
        id: ExprId,
        required: &[Type],
        actual: Option<TypeList>,
        mut fit: TypeFit,
        consts: Option<SmallVec<[Constant; 1]>>,
    ) -> Option<ExprId> {
        if fit.fits() {
            self.check_short_circuit(id);
        }
        let Some(mut actual) = actual else {
            let types = if required.is_empty() {
                smallvec![]
            } else {
                required.iter().cloned().collect()
            };
            self.tree
                .commit(id, Validated::new(TypeFit::NoFit, types, None));
            return None;
        };

        if actual.len() < required.len() {
            self.reporter.report(Error::WrongTypeArity {
                expected: required.len(),
                found: actual.len(),
                span: self.tree[id].span(),
            });
            fit = TypeFit::NoFit;
        }

        let mut consts = consts.map(|mut consts| {
            for typ in actual.iter().skip(consts.len()) {
                consts.push(Constant::Placeholder(typ.clone()));
            }
            consts
        });
        if consts.is_some() {
            for typ in actual.iter_mut() {
                if !self.symbols.is_service(typ) {
                    *typ = self.symbols.freeze(typ.clone());
                }
            }
        }

        let mut conversions: SmallVec<[Option<MethodConversion>; 2]> = smallvec![];
        if fit.fits() {
            let already_converts = fit.converts();
            let mut converts = false;
            for (i, required) in required.iter().enumerate() {
                if self.symbols.is_a(&actual[i], required) {
                    conversions.push(None);
                    continue;
                }
                match self.symbols.find_conversion(&actual[i], required) {
                    Some(method) if !already_converts => {
                        converts = true;
                        let folded = consts
                            .as_ref()
                            .and_then(|consts| consts[i].convert(method, self.symbols));
                        match (folded, consts.as_mut()) {
                            (Some(converted), Some(consts)) => {
                                actual[i] = self.symbols.freeze(converted.type_of(self.symbols));
                                consts[i] = converted;
                                conversions.push(None);
                            }
                            _ => conversions.push(Some(MethodConversion {
                                method,
                                typ: self.converted_type(method, required),
                            })),
                        }
                    }
                    _ => {
                        self.report_wrong_type(id, required, &actual[i]);
                        conversions.push(None);
                        fit = TypeFit::NoFit;
                    }
                }
            }
            if converts {
                fit = fit.add_conversion();
            }
        }

        let types = if fit.fits() || required.is_empty() {
            actual.clone()
        } else {
            required.iter().cloned().collect()
        };
        self.tree.commit(id, Validated::new(fit, types, consts));
        if !fit.fits() {
            return None;
        }
        if conversions.iter().all(Option::is_none) {
            return Some(id);
        }
        let mut converted = actual;
        for (i, conversion) in conversions.iter().enumerate() {
            if let Some(conversion) = conversion {
                converted[i] = conversion.typ.clone();
            }
        }
        let methods = conversions
            .iter()
            .map(|conv| conv.as_ref().map(|conv| conv.method))
            .collect();
        Some(self.wrap_conversion(id, methods, converted, fit))
    }

    fn wrap_conversion(
        &mut self,
        inner: ExprId,
        conversions: Box<[Option<MethodId>]>,
        types: TypeList,
        fit: TypeFit,
    ) -> ExprId {
        log::trace!("converting {inner} with {conversions:?}");
        let id = self.tree.wrap(inner, ExprKind::Convert { inner, conversions });
        self.tree.commit(id, Validated::new(fit, types, None));
        id
    }

    /// The type produced by a conversion, which is at least as specific as the target.
    fn converted_type(&self, method: MethodId, target: &Type) -> Type {
        match self.symbols[method].returns() {
            [ret] if self.symbols.is_a(ret, target) => ret.clone(),
            _ => target.clone(),
        }
    }

    pub(super) fn report_wrong_type(&mut self, id: ExprId, expected: &Type, found: &Type) {
        self.reporter.report(Error::WrongType {
            expected: expected.display(self.symbols).to_string().into(),
            found: found.display(self.symbols).to_string().into(),
            span: self.tree[id].span(),
        });
    }

    /// Whether the node may skip the rest of the enclosing expression when a value is null.
    pub fn is_short_circuiting(&self, id: ExprId) -> bool {
        match self.tree[id].kind() {
            ExprKind::NotNull(_) => true,
            ExprKind::Name(name) => name.left.is_some_and(|left| self.is_short_circuiting(left)),
            ExprKind::Invoke(invoke) => self.is_short_circuiting(invoke.callee),
            ExprKind::Index { target, .. } | ExprKind::Convert { inner: target, .. } => {
                self.is_short_circuiting(*target)
            }
            _ => false,
        }
    }

    /// Whether the parent of the node lets a short circuit propagate through it.
    fn allows_short_circuit(&self, id: ExprId) -> bool {
        let Some(parent) = self.tree[id].parent() else {
            return self.options.allow_short_circuit;
        };
        match self.tree[parent].kind() {
            ExprKind::Name(name) => name.left == Some(id),
            ExprKind::Invoke(invoke) => invoke.callee == id,
            ExprKind::Index { target, .. } => *target == id,
            ExprKind::Convert { .. } | ExprKind::NotNull(_) => true,
            _ => false,
        }
    }

    fn check_short_circuit(&mut self, id: ExprId) {
        if self.is_short_circuiting(id)
            && !self.allows_short_circuit(id)
            && !self.tree[id].flags().illegal_short_circuit()
        {
            self.reporter
                .report(Error::ShortCircuitIllegal(self.tree[id].span()));
            self.tree
                .update_flags(id, |flags| flags.with_illegal_short_circuit(true));
        }
    }

    /// Whether the parent of the node accepts the boolean-first values of a conditional result.
    pub(super) fn allows_conditional(&self, id: ExprId) -> bool {
        match self.tree[id].parent() {
            None => true,
            Some(parent) => match self.tree[parent].kind() {
                ExprKind::Assign { value, place, .. } => {
                    *value == id && matches!(self.tree[*place].kind(), ExprKind::Tuple { .. })
                }
                ExprKind::Convert { .. } => self.allows_conditional(parent),
                _ => false,
            },
        }
    }
}

#[derive(Debug)]
struct MethodConversion {
    method: MethodId,
    typ: Type,
}
