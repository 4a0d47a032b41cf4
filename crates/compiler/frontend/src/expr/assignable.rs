use vesper_bytecode::{Arg, InPlaceOp, Op, Sequential};

use super::generate::Generator;
use super::tree::{ExprId, ExprKind};
use super::validate::Validator;
use crate::constant::Constant;
use crate::diagnostic::Error;
use crate::types::{PropertyId, Type};

/// A storage location that a value can be written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignable {
    /// Discards whatever is written into it.
    BlackHole,
    LocalVar(vesper_bytecode::Register),
    /// A property of `this`.
    LocalProp(PropertyId),
    TargetProp(Arg, PropertyId),
    Indexed(Arg, Arg),
    IndexedN(Arg, Box<[Arg]>),
    /// An element of a property of `this`.
    IndexedProp(PropertyId, Arg),
    IndexedNProp(PropertyId, Box<[Arg]>),
}

impl Assignable {
    /// Whether a value read for this sink may refer to a property of `this` directly.
    #[inline]
    pub fn supports_local_prop_mode(&self) -> bool {
        matches!(self, Self::LocalVar(_) | Self::LocalProp(_))
    }
}

impl Validator<'_, '_> {
    /// Whether the validated node denotes a location that can be written to.
    pub fn is_assignable(&self, id: ExprId) -> bool {
        match self.tree[id].kind() {
            ExprKind::Name(_) => self.is_name_assignable(id),
            ExprKind::Index {
                target,
                indices,
                getter: Some(_),
            } => self.tree[*target]
                .validated()
                .and_then(|validated| validated.typ())
                .is_some_and(|typ| {
                    !self.symbols.is_immutable(typ)
                        && self
                            .symbols
                            .lookup_methods(typ, "setElement")
                            .iter()
                            .any(|&m| self.symbols[m].params().len() == indices.len() + 1)
                }),
            ExprKind::Tuple { items, .. } => {
                !items.is_empty() && items.iter().all(|&item| self.is_assignable(item))
            }
            _ => false,
        }
    }

    pub fn require_assignable(&mut self, id: ExprId) -> bool {
        if let ExprKind::Tuple { items, .. } = self.tree[id].kind() {
            let items = items.clone();
            return items
                .iter()
                .fold(!items.is_empty(), |acc, &item| self.require_assignable(item) && acc);
        }
        let assignable = self.is_assignable(id);
        if !assignable {
            self.reporter
                .report(Error::AssignableRequired(self.tree[id].span()));
        }
        assignable
    }

    /// Registers a write to the location with the context.
    pub fn mark_assignment(&mut self, id: ExprId) {
        match self.tree[id].kind() {
            ExprKind::Tuple { items, .. } => {
                for item in items.clone() {
                    self.mark_assignment(item);
                }
            }
            ExprKind::Name(_) => self.mark_name_assignment(id),
            _ => {}
        }
    }
}

impl Generator<'_, '_> {
    fn property_arg(&mut self, prop: PropertyId) -> Arg {
        Arg::Const(self.code.constant(Constant::Property(prop)))
    }

    fn property_index(&mut self, prop: PropertyId) -> vesper_bytecode::ConstIndex {
        self.code.constant(Constant::Property(prop))
    }

    pub(super) fn result_slot(&mut self, typ: &Type, into: Option<Arg>, used_once: bool) -> Arg {
        match into {
            Some(into) if into.is_local() => into,
            _ => self.create_temp_var(typ, used_once && into.is_none()),
        }
    }

    pub(super) fn forward(&mut self, value: Arg, into: Option<Arg>) -> Arg {
        match into {
            Some(into) if into != value => {
                self.code.emit(Op::Move { from: value, to: into });
                into
            }
            _ => value,
        }
    }

    /// Reads the current value of the sink.
    pub fn get_value(
        &mut self,
        sink: &Assignable,
        typ: &Type,
        into: Option<Arg>,
        local_prop_ok: bool,
        used_once: bool,
    ) -> Arg {
        match sink {
            Assignable::BlackHole => unreachable!("a black hole has no value"),
            &Assignable::LocalVar(reg) => self.forward(Arg::Reg(reg), into),
            &Assignable::LocalProp(prop) if into.is_none() && local_prop_ok => {
                self.property_arg(prop)
            }
            &Assignable::LocalProp(prop) => {
                let this_prop = Assignable::TargetProp(Arg::This, prop);
                self.get_value(&this_prop, typ, into, false, used_once)
            }
            &Assignable::TargetProp(target, prop) => {
                let to = self.result_slot(typ, into, used_once);
                let prop = self.property_index(prop);
                self.code.emit(Op::PGet { prop, target, to });
                self.forward(to, into)
            }
            &Assignable::Indexed(target, index) => {
                let to = self.result_slot(typ, into, used_once);
                self.code.emit(Op::IGet { target, index, to });
                self.forward(to, into)
            }
            &Assignable::IndexedProp(prop, index) => {
                let target = self.property_arg(prop);
                self.get_value(&Assignable::Indexed(target, index), typ, into, false, used_once)
            }
            Assignable::IndexedN(target, indices) => {
                let to = self.result_slot(typ, into, used_once);
                self.code.emit(Op::IGetN {
                    target: *target,
                    indices: indices.clone(),
                    to,
                });
                self.forward(to, into)
            }
            Assignable::IndexedNProp(prop, indices) => {
                let target = self.property_arg(*prop);
                let sink = Assignable::IndexedN(target, indices.clone());
                self.get_value(&sink, typ, into, false, used_once)
            }
        }
    }

    /// Stores a value into the sink.
    pub fn assign(&mut self, sink: &Assignable, value: Arg) {
        let op = match sink {
            Assignable::BlackHole if value == Arg::Stack => Op::Move {
                from: value,
                to: Arg::Ignore,
            },
            Assignable::BlackHole => return,
            &Assignable::LocalVar(reg) => Op::Move {
                from: value,
                to: Arg::Reg(reg),
            },
            &Assignable::LocalProp(prop) => Op::LSet {
                prop: self.property_index(prop),
                value,
            },
            &Assignable::TargetProp(target, prop) => Op::PSet {
                prop: self.property_index(prop),
                target,
                value,
            },
            &Assignable::Indexed(target, index) => Op::ISet {
                target,
                index,
                value,
            },
            &Assignable::IndexedProp(prop, index) => Op::ISet {
                target: self.property_arg(prop),
                index,
                value,
            },
            Assignable::IndexedN(target, indices) => Op::ISetN {
                target: *target,
                indices: indices.clone(),
                value,
            },
            Assignable::IndexedNProp(prop, indices) => Op::ISetN {
                target: self.property_arg(*prop),
                indices: indices.clone(),
                value,
            },
        };
        self.code.emit(op);
    }

    /// Applies an increment or decrement to the sink. The result, if the operation produces
    /// one, goes into `into` or a fresh temporary and is returned. A black hole destination
    /// turns the operation blind.
    pub fn assign_sequential(
        &mut self,
        sink: &Assignable,
        op: Sequential,
        typ: &Type,
        into: Option<&Assignable>,
        used_once: bool,
    ) -> Arg {
        let op = match into {
            Some(Assignable::BlackHole) => op.to_blind(),
            _ => op,
        };
        let (ret, forward) = match into {
            _ if op.is_blind() => (None, None),
            Some(&Assignable::LocalVar(reg)) => (Some(Arg::Reg(reg)), None),
            Some(other) => (Some(Arg::Stack), Some(other)),
            None => (Some(self.create_temp_var(typ, used_once)), None),
        };

        let instr = match sink {
            Assignable::BlackHole => unreachable!("cannot increment a black hole"),
            &Assignable::LocalVar(reg) => Op::IpSeq {
                op,
                target: Arg::Reg(reg),
                ret,
            },
            &Assignable::LocalProp(prop) => Op::IpSeq {
                op,
                target: self.property_arg(prop),
                ret,
            },
            &Assignable::TargetProp(target, prop) => Op::PipSeq {
                op,
                prop: self.property_index(prop),
                target,
                ret,
            },
            &Assignable::Indexed(target, index) => Op::IipSeq {
                op,
                target,
                index,
                ret,
            },
            &Assignable::IndexedProp(prop, index) => Op::IipSeq {
                op,
                target: self.property_arg(prop),
                index,
                ret,
            },
            Assignable::IndexedN(_, _) | Assignable::IndexedNProp(_, _) => {
                let temp = self.get_value(sink, typ, None, false, false);
                if let (Some(ret), true) = (ret, op.is_post()) {
                    self.code.emit(Op::Move { from: temp, to: ret });
                }
                self.code.emit(Op::IpSeq {
                    op: op.to_blind(),
                    target: temp,
                    ret: None,
                });
                if let (Some(ret), true) = (ret, op.is_pre()) {
                    self.code.emit(Op::Move { from: temp, to: ret });
                }
                self.assign(sink, temp);
                return self.finish_sequential(ret, forward);
            }
        };
        self.code.emit(instr);
        self.finish_sequential(ret, forward)
    }

    fn finish_sequential(&mut self, ret: Option<Arg>, forward: Option<&Assignable>) -> Arg {
        match (ret, forward) {
            (Some(ret), Some(dest)) => {
                self.assign(dest, ret);
                ret
            }
            (Some(ret), None) => ret,
            (None, _) => Arg::Ignore,
        }
    }

    /// Applies a compound assignment such as `+=` to the sink.
    pub fn assign_in_place(&mut self, sink: &Assignable, op: InPlaceOp, typ: &Type, value: Arg) {
        let instr = match sink {
            Assignable::BlackHole => unreachable!("cannot update a black hole"),
            &Assignable::LocalVar(reg) => Op::IpOp {
                op,
                target: Arg::Reg(reg),
                value,
            },
            &Assignable::LocalProp(prop) => Op::IpOp {
                op,
                target: self.property_arg(prop),
                value,
            },
            &Assignable::TargetProp(target, prop) => Op::PipOp {
                op,
                prop: self.property_index(prop),
                target,
                value,
            },
            &Assignable::Indexed(target, index) => Op::IipOp {
                op,
                target,
                index,
                value,
            },
            &Assignable::IndexedProp(prop, index) => Op::IipOp {
                op,
                target: self.property_arg(prop),
                index,
                value,
            },
            Assignable::IndexedN(_, _) | Assignable::IndexedNProp(_, _) => {
                let temp = self.get_value(sink, typ, None, false, false);
                self.code.emit(Op::IpOp {
                    op,
                    target: temp,
                    value,
                });
                self.assign(sink, temp);
                return;
            }
        };
        self.code.emit(instr);
    }

    /// Evaluates the target and indices of an index expression into a sink.
    pub(super) fn generate_index_assignable(&mut self, id: ExprId) -> Assignable {
        let ExprKind::Index {
            target, indices, ..
        } = self.tree[id].kind()
        else {
            unreachable!()
        };
        let local_prop = self.local_property(*target);
        let target_arg = match local_prop {
            Some(_) => None,
            None => {
                let arg = self.generate_argument(*target, false, false);
                Some(self.ensure_point_in_time(*target, arg, indices))
            }
        };
        let mut args = Vec::with_capacity(indices.len());
        for (i, &index) in indices.iter().enumerate() {
            let arg = self.generate_argument(index, false, false);
            args.push(self.ensure_point_in_time(index, arg, &indices[i + 1..]));
        }

        match (local_prop, target_arg, &args[..]) {
            (Some(prop), _, &[index]) => Assignable::IndexedProp(prop, index),
            (Some(prop), _, _) => Assignable::IndexedNProp(prop, args.into()),
            (None, Some(target), &[index]) => Assignable::Indexed(target, index),
            (None, Some(target), _) => Assignable::IndexedN(target, args.into()),
            (None, None, _) => unreachable!(),
        }
    }
}
