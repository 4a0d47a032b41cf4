use smallvec::SmallVec;

use super::tree::{ExprId, ExprKind};
use super::validate::Validator;
use crate::constant::{Constant, Float};
use crate::diagnostic::Error;
use crate::fit::{TypeFit, calc_fit};
use crate::types::{Type, TypeList, predef};

impl Validator<'_, '_> {
    pub(super) fn validate_literal(
        &mut self,
        id: ExprId,
        required: Option<&Type>,
    ) -> Option<ExprId> {
        let ExprKind::Literal(constant) = self.tree[id].kind() else {
            unreachable!()
        };
        let mut constant = constant.clone();
        // integer literals take on a floating-point representation where only that fits
        if let (Constant::Int(i), Some(required)) = (&constant, required) {
            if !self.symbols.is_a(&Type::int(), required)
                && self.symbols.is_a(&Type::nullary(predef::FLOAT), required)
            {
                constant = Constant::Float(Float::from(*i as f64));
            }
        }
        let typ = constant.type_of(self.symbols);
        self.finish_validation(id, required, Some(typ), TypeFit::Fit, Some(constant))
    }

    pub(super) fn test_literal_fit(&self, constant: &Constant, required: &Type) -> TypeFit {
        match constant {
            Constant::Int(_) if self.symbols.is_a(&Type::nullary(predef::FLOAT), required) => {
                TypeFit::Fit
            }
            _ => calc_fit(
                self.symbols,
                Some(&constant.type_of(self.symbols)),
                Some(required),
            ),
        }
    }

    pub(super) fn validate_tuple(&mut self, id: ExprId, required: Option<&Type>) -> Option<ExprId> {
        let ExprKind::Tuple { items, .. } = self.tree[id].kind() else {
            unreachable!()
        };
        let items = items.clone();
        let elems = required
            .and_then(Type::tuple_elements)
            .filter(|elems| elems.len() == items.len())
            .map(<[Type]>::to_vec);

        let Some((types, fit, consts)) = self.validate_items(id, &items, elems.as_deref()) else {
            return self.finish_validation(id, required, None, TypeFit::NoFit, None);
        };
        let constant = consts.map(|consts| Constant::Tuple(consts.into_iter().collect()));
        self.finish_validation(id, required, Some(Type::tuple(types.to_vec())), fit, constant)
    }

    /// Validates a tuple whose elements are consumed as separate values.
    pub(super) fn validate_unpacked(&mut self, id: ExprId, required: &[Type]) -> Option<ExprId> {
        let ExprKind::Tuple { items, unpacked } = self.tree.kind_mut(id) else {
            unreachable!()
        };
        *unpacked = true;
        let items = items.clone();

        let padded = (0..items.len())
            .map(|i| required.get(i).cloned())
            .collect::<Vec<_>>();
        let Some((types, fit, consts)) = self.validate_items_with(id, &items, &padded) else {
            return self.finish_validations(id, required, None, TypeFit::NoFit, None);
        };
        self.finish_validations(id, required, Some(types), fit.add_unpack(), consts)
    }

    fn validate_items(
        &mut self,
        id: ExprId,
        items: &[ExprId],
        elems: Option<&[Type]>,
    ) -> Option<(TypeList, TypeFit, Option<SmallVec<[Constant; 1]>>)> {
        let required = match elems {
            Some(elems) => elems.iter().cloned().map(Some).collect(),
            None => vec![None; items.len()],
        };
        self.validate_items_with(id, items, &required)
    }

    fn validate_items_with(
        &mut self,
        id: ExprId,
        items: &[ExprId],
        required: &[Option<Type>],
    ) -> Option<(TypeList, TypeFit, Option<SmallVec<[Constant; 1]>>)> {
        let mut types = TypeList::new();
        let mut consts = Some(SmallVec::new());
        let mut fit = TypeFit::Fit;
        let mut failed = false;

        for (&item, required) in items.iter().zip(required) {
            let Some(item) = self.validate_child(id, item, required.as_ref()) else {
                failed = true;
                continue;
            };
            let validated = self.tree[item].expect_validated();
            let Some(typ) = validated.typ() else {
                self.reporter
                    .report(Error::ReturnRequired(self.tree[item].span()));
                failed = true;
                continue;
            };
            fit = fit.combine(validated.fit());
            types.push(typ.clone());
            match (&mut consts, validated.constant()) {
                (Some(consts), Some(constant)) => consts.push(constant.clone()),
                _ => consts = None,
            }
        }
        (!failed).then_some((types, fit, consts))
    }
}
