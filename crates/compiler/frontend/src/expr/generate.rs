use smallvec::{SmallVec, smallvec};
use vesper_bytecode::{Arg, Label, Op};

use super::assignable::Assignable;
use super::name::{Meaning, Plan, RawArg};
use super::tree::{ExprId, ExprKind, ExprTree, Validated};
use crate::Symbols;
use crate::code::Emitter;
use crate::constant::Constant;
use crate::context::Context;
use crate::diagnostic::{Error, Reporter};
use crate::types::Type;

/// Lowers validated expressions into instructions.
#[derive(Debug)]
pub struct Generator<'a, 'src> {
    pub(super) tree: &'a ExprTree<'src>,
    pub(super) ctx: &'a Context,
    pub(super) symbols: &'a Symbols,
    pub(super) code: &'a mut Emitter,
    pub(super) reporter: &'a mut Reporter,
    /// Where a short-circuiting expression jumps when it encounters a null.
    pub(super) ground: Option<Label>,
}

impl<'a, 'src> Generator<'a, 'src> {
    pub fn new(
        tree: &'a ExprTree<'src>,
        ctx: &'a Context,
        symbols: &'a Symbols,
        code: &'a mut Emitter,
        reporter: &'a mut Reporter,
    ) -> Self {
        Self {
            tree,
            ctx,
            symbols,
            code,
            reporter,
            ground: None,
        }
    }

    pub fn with_ground(self, ground: Label) -> Self {
        Self {
            ground: Some(ground),
            ..self
        }
    }

    #[inline]
    pub(super) fn validated(&self, id: ExprId) -> &'a Validated {
        self.tree[id].expect_validated()
    }

    pub(super) fn is_multi_value(&self, id: ExprId) -> bool {
        match self.tree[id].kind() {
            ExprKind::Invoke(_) | ExprKind::Assign { .. } | ExprKind::Convert { .. } => true,
            ExprKind::Tuple { unpacked, .. } => *unpacked,
            _ => false,
        }
    }

    pub fn is_conditional_result(&self, id: ExprId) -> bool {
        match self.tree[id].kind() {
            ExprKind::Invoke(invoke) => invoke.is_conditional_result(),
            ExprKind::Convert { inner, .. } => self.is_conditional_result(*inner),
            _ => false,
        }
    }

    /// Evaluates the expression for its side effects only.
    pub fn generate_void(&mut self, id: ExprId) {
        if self.validated(id).is_constant() || !self.has_side_effects(id) {
            return;
        }
        match self.tree[id].kind() {
            &ExprKind::Sequential { op, operand } => {
                let sink = self.generate_assignable(operand);
                let typ = self.single_type(id);
                self.assign_sequential(&sink, op, &typ, Some(&Assignable::BlackHole), true);
            }
            ExprKind::Assign { .. } => self.generate_assign(id),
            ExprKind::Invoke(_) => self.generate_invoke(id, &[]),
            &ExprKind::NotNull(inner) | &ExprKind::Convert { inner, .. } => {
                self.generate_void(inner);
            }
            _ => {
                let sinks = vec![Assignable::BlackHole; self.validated(id).types().len()];
                self.generate_assignments(id, &sinks);
            }
        }
    }

    /// Produces a readable argument holding the value of the expression. With `used_once` the
    /// value may be left on the operand stack.
    pub fn generate_argument(&mut self, id: ExprId, local_prop_ok: bool, used_once: bool) -> Arg {
        if let Some(constant) = self.validated(id).constant() {
            return Arg::Const(self.code.constant(constant.clone()));
        }
        if self.is_multi_value(id) {
            return self
                .generate_arguments(id, local_prop_ok, used_once)
                .into_iter()
                .next()
                .unwrap_or_else(|| unreachable!("void expression used as a value"));
        }
        match self.tree[id].kind() {
            ExprKind::Name(_) => self.generate_name_argument(id, local_prop_ok, used_once),
            &ExprKind::Sequential { op, operand } => {
                let sink = self.generate_assignable(operand);
                let typ = self.single_type(id);
                self.assign_sequential(&sink, op, &typ, None, used_once)
            }
            ExprKind::Index { .. } => {
                let sink = self.generate_assignable(id);
                let typ = self.single_type(id);
                self.get_value(&sink, &typ, None, local_prop_ok, used_once)
            }
            &ExprKind::NotNull(inner) => {
                let value = self.generate_argument(inner, false, false);
                let Some(ground) = self.ground else {
                    unreachable!("short circuit without a ground label")
                };
                self.code.emit(Op::JumpNull {
                    value,
                    target: ground,
                });
                value
            }
            ExprKind::Tuple { .. } => self.generate_tuple(id, used_once),
            ExprKind::Literal(_)
            | ExprKind::NonBinding(_)
            | ExprKind::Invoke(_)
            | ExprKind::Assign { .. }
            | ExprKind::Convert { .. } => {
                unreachable!("expression has no single-value code generation")
            }
        }
    }

    /// Produces one argument per value of the expression.
    pub fn generate_arguments(
        &mut self,
        id: ExprId,
        local_prop_ok: bool,
        used_once: bool,
    ) -> SmallVec<[Arg; 2]> {
        let validated = self.validated(id);
        if let Some(consts) = validated.consts() {
            return consts
                .iter()
                .map(|constant| Arg::Const(self.code.constant(constant.clone())))
                .collect();
        }
        if validated.types().is_empty() {
            self.generate_assignments(id, &[]);
            return smallvec![];
        }
        if !self.is_multi_value(id) {
            return smallvec![self.generate_argument(id, local_prop_ok, used_once)];
        }
        match self.tree[id].kind() {
            ExprKind::Tuple { items, .. } => {
                let items = items.clone();
                self.generate_ordered_args(&items, local_prop_ok)
            }
            ExprKind::Convert { .. } => self.generate_conversions(id, used_once),
            ExprKind::Invoke(invoke) => {
                let (is_async, auto_future) = (invoke.is_async, invoke.is_auto_future());
                let temps = validated
                    .types()
                    .iter()
                    .enumerate()
                    .map(|(i, typ)| self.create_temp_var(typ, used_once && !is_async && i == 0))
                    .collect::<SmallVec<[Arg; 2]>>();
                self.generate_invoke(id, &temps);
                if !auto_future {
                    return temps;
                }
                temps
                    .into_iter()
                    .zip(validated.types())
                    .map(|(from, typ)| {
                        let to = self.create_temp_var(typ, false);
                        self.code.emit(Op::MoveVar { from, to });
                        to
                    })
                    .collect()
            }
            _ => unreachable!("{id} has no multi-value code generation"),
        }
    }

    /// Generates a list of sibling expressions left to right, taking snapshots of earlier values
    /// that later ones could change.
    pub(super) fn generate_ordered_args(
        &mut self,
        items: &[ExprId],
        local_prop_ok: bool,
    ) -> SmallVec<[Arg; 2]> {
        let mut args = SmallVec::new();
        for (i, &item) in items.iter().enumerate() {
            let last = i + 1 == items.len();
            let arg = self.generate_argument(item, local_prop_ok, last);
            args.push(self.ensure_point_in_time(item, arg, &items[i + 1..]));
        }
        args
    }

    fn generate_tuple(&mut self, id: ExprId, used_once: bool) -> Arg {
        let ExprKind::Tuple { items, .. } = self.tree[id].kind() else {
            unreachable!()
        };
        let values = self.generate_ordered_args(items, true);
        let typ = self.single_type(id);
        let typ_idx = self.code.constant(Constant::Type(typ.clone()));
        let to = self.create_temp_var(&typ, used_once);
        self.code.emit(Op::Pack {
            typ: typ_idx,
            values: values.into_iter().collect(),
            to,
        });
        to
    }

    fn generate_conversions(&mut self, id: ExprId, used_once: bool) -> SmallVec<[Arg; 2]> {
        let ExprKind::Convert { inner, conversions } = self.tree[id].kind() else {
            unreachable!()
        };
        let values = self.generate_arguments(*inner, false, false);
        let types = self.validated(id).types();
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| match conversions.get(i).copied().flatten() {
                Some(method) => {
                    let method = self.code.constant(Constant::Method(method));
                    let to = self.create_temp_var(&types[i], used_once && i == 0);
                    self.code.emit(Op::Invoke {
                        target: value,
                        method,
                        args: vesper_bytecode::Args::None,
                        rets: vesper_bytecode::Rets::One(to),
                    });
                    to
                }
                None => value,
            })
            .collect()
    }

    /// Stores the value of a single-value expression into a sink.
    pub fn generate_assignment(&mut self, id: ExprId, sink: &Assignable) {
        match self.tree[id].kind() {
            &ExprKind::Sequential { op, operand } => {
                let place = self.generate_assignable(operand);
                let typ = self.single_type(id);
                self.assign_sequential(&place, op, &typ, Some(sink), true);
            }
            ExprKind::Name(_) => self.generate_name_assignment(id, sink),
            _ => {
                let value = self.generate_argument(id, sink.supports_local_prop_mode(), true);
                self.assign(sink, value);
            }
        }
    }

    /// Stores the values of the expression into the sinks, discarding values without a sink.
    /// For a conditional result the values after the first are only stored when it is true.
    pub fn generate_assignments(&mut self, id: ExprId, sinks: &[Assignable]) {
        let count = self.validated(id).types().len();
        if sinks.is_empty() {
            self.generate_void(id);
            return;
        }
        if sinks.len() > count {
            self.reporter.report(Error::WrongTypeArity {
                expected: sinks.len(),
                found: count,
                span: self.tree[id].span(),
            });
            return;
        }
        let conditional = self.is_conditional_result(id);
        if !self.is_multi_value(id) && sinks.len() == 1 {
            self.tree
                .update_flags(id, |flags| flags.with_in_assignment(true));
            self.generate_assignment(id, &sinks[0]);
            self.tree
                .update_flags(id, |flags| flags.with_in_assignment(false));
            return;
        }

        let mut sinks = sinks.to_vec();
        sinks.resize(count, Assignable::BlackHole);
        let local_prop_ok = sinks.iter().all(Assignable::supports_local_prop_mode);
        let values = self.generate_arguments(id, local_prop_ok, false);

        if conditional && sinks.len() >= 2 {
            self.assign(&sinks[0], values[0]);
            let skip = self.code.new_label();
            self.code.emit(Op::JumpFalse {
                cond: values[0],
                target: skip,
            });
            for (sink, &value) in sinks.iter().zip(&values).skip(1) {
                self.assign(sink, value);
            }
            self.code.mark_label(skip);
        } else {
            for (sink, &value) in sinks.iter().zip(&values) {
                self.assign(sink, value);
            }
        }
    }

    /// Jumps to `label` when the boolean value of the expression equals `when_true`.
    pub fn generate_conditional_jump(&mut self, id: ExprId, label: Label, when_true: bool) {
        if let Some(constant) = self.validated(id).constant() {
            if constant.as_bool() == Some(when_true) {
                self.code.emit(Op::Jump(label));
            }
            return;
        }
        let cond = self.generate_argument(id, true, true);
        self.code.emit(if when_true {
            Op::JumpTrue {
                cond,
                target: label,
            }
        } else {
            Op::JumpFalse {
                cond,
                target: label,
            }
        });
    }

    /// Turns an assignable expression into a sink.
    pub fn generate_assignable(&mut self, id: ExprId) -> Assignable {
        match self.tree[id].kind() {
            ExprKind::Name(_) => self.generate_name_assignable(id),
            ExprKind::Index { .. } => self.generate_index_assignable(id),
            _ => unreachable!("expression was not validated as assignable"),
        }
    }

    pub fn generate_assignables(&mut self, id: ExprId) -> Vec<Assignable> {
        match self.tree[id].kind() {
            ExprKind::Tuple { items, .. } => items
                .iter()
                .map(|&item| self.generate_assignable(item))
                .collect(),
            _ => vec![self.generate_assignable(id)],
        }
    }

    /// Allocates a temporary for a value. A value that is read exactly once goes through the
    /// operand stack instead.
    pub fn create_temp_var(&mut self, typ: &Type, used_once: bool) -> Arg {
        if used_once {
            return Arg::Stack;
        }
        let reg = self.code.new_register();
        let typ = self.code.constant(Constant::Type(typ.clone()));
        self.code.emit(Op::Var { reg, typ });
        Arg::Reg(reg)
    }

    pub(super) fn single_type(&self, id: ExprId) -> Type {
        self.validated(id)
            .typ()
            .cloned()
            .unwrap_or_else(|| unreachable!("void expression used as a value"))
    }

    /// Whether evaluating the expression can change observable state.
    pub fn has_side_effects(&self, id: ExprId) -> bool {
        if self.validated(id).is_constant() {
            return false;
        }
        match self.tree[id].kind() {
            ExprKind::Literal(_) | ExprKind::NonBinding(_) => false,
            ExprKind::Name(name) => {
                matches!(name.plan(), Plan::PropertyDeref)
                    || name.left.is_some_and(|left| self.has_side_effects(left))
            }
            ExprKind::Tuple { items, .. } => items.iter().any(|&item| self.has_side_effects(item)),
            ExprKind::NotNull(inner) => self.has_side_effects(*inner),
            ExprKind::Index { .. }
            | ExprKind::Invoke(_)
            | ExprKind::Sequential { .. }
            | ExprKind::Assign { .. }
            | ExprKind::Convert { .. } => true,
        }
    }

    /// Estimates whether evaluating `later` could change the value already produced for `arg`.
    pub fn might_affect(&self, later: ExprId, arg: ExprId) -> Affect {
        if self.validated(arg).is_constant() || !self.has_side_effects(later) {
            return Affect::DefNo;
        }
        let base = if self.is_property_read(arg) {
            Affect::AnyCompute
        } else {
            Affect::Unknown
        };
        self.refine_affect(later, arg, base)
    }

    fn refine_affect(&self, later: ExprId, arg: ExprId, base: Affect) -> Affect {
        let own = match self.tree[later].kind() {
            ExprKind::Name(_) => match base {
                Affect::AnyCompute if self.is_property_read(later) => Affect::DefYes,
                Affect::Unknown if self.same_variable(later, arg) => Affect::AnySeqOp,
                _ => Affect::DefNo,
            },
            &ExprKind::Sequential { operand, .. } | &ExprKind::Assign { place: operand, .. } => {
                if self.same_variable(operand, arg) {
                    Affect::AnySeqOp
                } else if self.is_property_read(operand) && self.is_property_read(arg) {
                    Affect::DefYes
                } else {
                    Affect::DefNo
                }
            }
            ExprKind::Invoke(_) => match base {
                Affect::AnyCompute => Affect::DefYes,
                other => other,
            },
            _ => Affect::DefNo,
        };
        self.tree[later]
            .kind()
            .children()
            .into_iter()
            .map(|child| self.refine_affect(child, arg, base))
            .fold(own, Affect::max)
    }

    fn is_property_read(&self, id: ExprId) -> bool {
        match self.tree[id].kind() {
            ExprKind::Name(name) => {
                name.meaning() == Meaning::Property && name.plan() == Plan::PropertyDeref
            }
            _ => false,
        }
    }

    fn same_variable(&self, a: ExprId, b: ExprId) -> bool {
        match (self.tree[a].kind(), self.tree[b].kind()) {
            (ExprKind::Name(a), ExprKind::Name(b)) => match (a.raw(), b.raw()) {
                (Some(RawArg::Register(a, _)), Some(RawArg::Register(b, _))) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    /// Copies `value` into a fresh register when a later sibling might change it before it is
    /// consumed. Temporaries of the emitter already hold a point-in-time value.
    pub fn ensure_point_in_time(&mut self, id: ExprId, value: Arg, later: &[ExprId]) -> Arg {
        match value {
            Arg::Stack | Arg::This | Arg::Ignore | Arg::Default => return value,
            Arg::Reg(reg) if reg.index() >= self.ctx.register_count() => return value,
            Arg::Reg(reg) if self.ctx.is_effectively_final(reg) || self.ctx.is_future(reg) => {
                return value;
            }
            _ => {}
        }
        if self.validated(id).is_constant() {
            return value;
        }
        let affect = later
            .iter()
            .map(|&later| self.might_affect(later, id))
            .max()
            .unwrap_or(Affect::DefNo);
        if !matches!(affect, Affect::DefYes | Affect::AnySeqOp) {
            return value;
        }
        log::trace!("snapshot of {id} taken ({affect:?})");
        let typ = self.single_type(id);
        let snapshot = self.create_temp_var(&typ, false);
        self.code.emit(Op::Move {
            from: value,
            to: snapshot,
        });
        snapshot
    }
}

/// How likely evaluating an expression is to change a value computed before it, from weakest
/// to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Affect {
    DefNo,
    Unknown,
    AnyCompute,
    AnySeqOp,
    DefYes,
}
