use smallvec::smallvec;
use vesper_bytecode::{Arg, Op};

use super::assignable::Assignable;
use super::generate::Generator;
use super::tree::{ExprId, ExprKind};
use super::validate::Validator;
use crate::diagnostic::Error;
use crate::fit::TypeFit;
use crate::types::{MethodId, Type};

const GET_ELEMENT: &str = "getElement";

impl Validator<'_, '_> {
    pub(super) fn validate_sequential(
        &mut self,
        id: ExprId,
        required: Option<&Type>,
    ) -> Option<ExprId> {
        let &ExprKind::Sequential { operand, .. } = self.tree[id].kind() else {
            unreachable!()
        };
        let Some(operand) = self.validate_child(id, operand, None) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        if !self.require_assignable(operand) {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        }
        self.mark_assignment(operand);
        let typ = self.tree[operand].expect_validated().typ().cloned();
        self.finish_validation(id, required, typ, TypeFit::Fit, None)
    }

    /// Validates an assignment, which produces no values. A tuple on the left receives the
    /// values of a multi-value expression position by position.
    pub(super) fn validate_assign(&mut self, id: ExprId, required: &[Type]) -> Option<ExprId> {
        let &ExprKind::Assign { op, place, value } = self.tree[id].kind() else {
            unreachable!()
        };
        let Some(place) = self.validate_child(id, place, None) else {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        };
        if !self.require_assignable(place) {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        }
        self.mark_assignment(place);

        let Some(place_type) = self.tree[place].expect_validated().typ().cloned() else {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        };
        let value = match (op, place_type.tuple_elements()) {
            (None, Some(elems)) if matches!(self.tree[place].kind(), ExprKind::Tuple { .. }) => {
                let elems = elems.to_vec();
                self.validate_child_multi(id, value, &elems)
            }
            _ => self.validate_child(id, value, Some(&place_type)),
        };
        let Some(value) = value else {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        };
        let fit = self.tree[value].expect_validated().fit();
        self.finish_validations(id, required, Some(smallvec![]), fit, None)
    }

    fn find_getter(&self, typ: &Type, arity: usize) -> Option<MethodId> {
        self.symbols
            .lookup_methods(typ, GET_ELEMENT)
            .into_iter()
            .find(|&m| {
                let method = &self.symbols[m];
                method.params().len() == arity && method.returns().len() == 1
            })
    }

    /// The element type produced by indexing a value of `typ`.
    pub(super) fn element_type(&self, typ: &Type, arity: usize) -> Option<Type> {
        let getter = &self.symbols[self.find_getter(typ, arity)?];
        let ret = getter.returns().first()?;
        Some(self.symbols.member_type(typ, getter.owner(), ret))
    }

    pub(super) fn validate_index(&mut self, id: ExprId, required: Option<&Type>) -> Option<ExprId> {
        let ExprKind::Index {
            target, indices, ..
        } = self.tree[id].kind()
        else {
            unreachable!()
        };
        let (target, indices) = (*target, indices.clone());
        let Some(target) = self.validate_child(id, target, None) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        let Some(typ) = self.tree[target].expect_validated().typ().cloned() else {
            self.reporter
                .report(Error::ReturnRequired(self.tree[target].span()));
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };

        let Some(getter) = self.find_getter(&typ, indices.len()) else {
            self.reporter.report(Error::NotIndexable(
                typ.display(self.symbols).to_string().into(),
                indices.len(),
                self.tree[id].span(),
            ));
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };

        let symbols = self.symbols;
        let method = &symbols[getter];
        let owner = method.owner();
        let mut fit = TypeFit::Fit;
        let mut failed = false;
        for (&index, param) in indices.iter().zip(method.params()) {
            let param = symbols.member_type(&typ, owner, param.typ());
            match self.validate_child(id, index, Some(&param)) {
                Some(index) => fit = fit.combine(self.tree[index].expect_validated().fit()),
                None => failed = true,
            }
        }
        if failed {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        }
        if let ExprKind::Index { getter: slot, .. } = self.tree.kind_mut(id) {
            *slot = Some(getter);
        }
        let element = symbols.member_type(&typ, owner, &method.returns()[0]);
        self.finish_validation(id, required, Some(element), fit, None)
    }

    pub(super) fn validate_not_null(
        &mut self,
        id: ExprId,
        required: Option<&Type>,
    ) -> Option<ExprId> {
        let &ExprKind::NotNull(inner) = self.tree[id].kind() else {
            unreachable!()
        };
        let Some(inner) = self.validate_child(id, inner, None) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        let validated = self.tree[inner].expect_validated();
        let fit = validated.fit();
        let typ = validated
            .typ()
            .map(|typ| typ.strip_nullable().unwrap_or(typ).clone());
        self.finish_validation(id, required, typ, fit, None)
    }
}

impl Generator<'_, '_> {
    pub(super) fn generate_assign(&mut self, id: ExprId) {
        let &ExprKind::Assign { op, place, value } = self.tree[id].kind() else {
            unreachable!()
        };
        match op {
            None => {
                let sinks = self.generate_assignables(place);
                if sinks.len() > 1 && !self.is_conditional_result(value) {
                    self.generate_parallel_assignment(value, &sinks);
                } else {
                    self.generate_assignments(value, &sinks);
                }
            }
            Some(op) => {
                let sink = self.generate_assignable(place);
                let typ = self.single_type(place);
                let value = self.generate_argument(value, true, true);
                self.assign_in_place(&sink, op, &typ, value);
            }
        }
    }

    /// Assigns several values at once, so that `(a, b) = (b, a)` reads both values before
    /// writing either.
    fn generate_parallel_assignment(&mut self, value: ExprId, sinks: &[Assignable]) {
        let values = self.generate_arguments(value, false, false);
        let types = self.validated(value).types();
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, arg)| {
                let clobbered = sinks[..i]
                    .iter()
                    .any(|sink| matches!(sink, &Assignable::LocalVar(reg) if arg == Arg::Reg(reg)));
                if clobbered {
                    let temp = self.create_temp_var(&types[i], false);
                    self.code.emit(Op::Move {
                        from: arg,
                        to: temp,
                    });
                    temp
                } else {
                    arg
                }
            })
            .collect::<Vec<_>>();
        for (sink, value) in sinks.iter().zip(values) {
            self.assign(sink, value);
        }
    }
}
