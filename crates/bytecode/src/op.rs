use std::fmt;

use itertools::Itertools;
use strum::{Display, IntoStaticStr};

use crate::{Arg, ConstIndex, Register};

#[derive(Debug, Clone, PartialEq)]
pub enum Op<Loc = Offset> {
    /// Advances the current source line by the given delta.
    Line(i32),
    Var {
        reg: Register,
        typ: ConstIndex,
    },
    Move {
        from: Arg,
        to: Arg,
    },
    MoveRef {
        from: Arg,
        to: Arg,
    },
    MoveVar {
        from: Arg,
        to: Arg,
    },
    MoveThis {
        steps: u16,
        to: Arg,
    },
    LGet {
        prop: ConstIndex,
        to: Arg,
    },
    LSet {
        prop: ConstIndex,
        value: Arg,
    },
    PGet {
        prop: ConstIndex,
        target: Arg,
        to: Arg,
    },
    PSet {
        prop: ConstIndex,
        target: Arg,
        value: Arg,
    },
    PRef {
        prop: ConstIndex,
        target: Arg,
        to: Arg,
    },
    PVar {
        prop: ConstIndex,
        target: Arg,
        to: Arg,
    },
    IGet {
        target: Arg,
        index: Arg,
        to: Arg,
    },
    ISet {
        target: Arg,
        index: Arg,
        value: Arg,
    },
    IGetN {
        target: Arg,
        indices: Box<[Arg]>,
        to: Arg,
    },
    ISetN {
        target: Arg,
        indices: Box<[Arg]>,
        value: Arg,
    },
    IpSeq {
        op: Sequential,
        target: Arg,
        ret: Option<Arg>,
    },
    PipSeq {
        op: Sequential,
        prop: ConstIndex,
        target: Arg,
        ret: Option<Arg>,
    },
    IipSeq {
        op: Sequential,
        target: Arg,
        index: Arg,
        ret: Option<Arg>,
    },
    IpOp {
        op: InPlaceOp,
        target: Arg,
        value: Arg,
    },
    PipOp {
        op: InPlaceOp,
        prop: ConstIndex,
        target: Arg,
        value: Arg,
    },
    IipOp {
        op: InPlaceOp,
        target: Arg,
        index: Arg,
        value: Arg,
    },
    Call {
        func: Arg,
        args: Args,
        rets: Rets,
    },
    Invoke {
        target: Arg,
        method: ConstIndex,
        args: Args,
        rets: Rets,
    },
    Construct {
        ctor: ConstIndex,
        args: Args,
        to: Arg,
    },
    MBind {
        target: Arg,
        method: ConstIndex,
        to: Arg,
    },
    FBind {
        func: Arg,
        params: Box<[(u16, Arg)]>,
        to: Arg,
    },
    Pack {
        typ: ConstIndex,
        values: Box<[Arg]>,
        to: Arg,
    },
    Jump(Loc),
    JumpTrue {
        cond: Arg,
        target: Loc,
    },
    JumpFalse {
        cond: Arg,
        target: Loc,
    },
    JumpNull {
        value: Arg,
        target: Loc,
    },
}

impl<L> Op<L> {
    pub fn map_labels<L2>(self, mut f: impl FnMut(L) -> Option<L2>) -> Option<Op<L2>> {
        let op = match self {
            Op::Jump(target) => Op::Jump(f(target)?),
            Op::JumpTrue { cond, target } => Op::JumpTrue {
                cond,
                target: f(target)?,
            },
            Op::JumpFalse { cond, target } => Op::JumpFalse {
                cond,
                target: f(target)?,
            },
            Op::JumpNull { value, target } => Op::JumpNull {
                value,
                target: f(target)?,
            },
            Op::Line(delta) => Op::Line(delta),
            Op::Var { reg, typ } => Op::Var { reg, typ },
            Op::Move { from, to } => Op::Move { from, to },
            Op::MoveRef { from, to } => Op::MoveRef { from, to },
            Op::MoveVar { from, to } => Op::MoveVar { from, to },
            Op::MoveThis { steps, to } => Op::MoveThis { steps, to },
            Op::LGet { prop, to } => Op::LGet { prop, to },
            Op::LSet { prop, value } => Op::LSet { prop, value },
            Op::PGet { prop, target, to } => Op::PGet { prop, target, to },
            Op::PSet {
                prop,
                target,
                value,
            } => Op::PSet {
                prop,
                target,
                value,
            },
            Op::PRef { prop, target, to } => Op::PRef { prop, target, to },
            Op::PVar { prop, target, to } => Op::PVar { prop, target, to },
            Op::IGet { target, index, to } => Op::IGet { target, index, to },
            Op::ISet {
                target,
                index,
                value,
            } => Op::ISet {
                target,
                index,
                value,
            },
            Op::IGetN {
                target,
                indices,
                to,
            } => Op::IGetN {
                target,
                indices,
                to,
            },
            Op::ISetN {
                target,
                indices,
                value,
            } => Op::ISetN {
                target,
                indices,
                value,
            },
            Op::IpSeq { op, target, ret } => Op::IpSeq { op, target, ret },
            Op::PipSeq {
                op,
                prop,
                target,
                ret,
            } => Op::PipSeq {
                op,
                prop,
                target,
                ret,
            },
            Op::IipSeq {
                op,
                target,
                index,
                ret,
            } => Op::IipSeq {
                op,
                target,
                index,
                ret,
            },
            Op::IpOp { op, target, value } => Op::IpOp { op, target, value },
            Op::PipOp {
                op,
                prop,
                target,
                value,
            } => Op::PipOp {
                op,
                prop,
                target,
                value,
            },
            Op::IipOp {
                op,
                target,
                index,
                value,
            } => Op::IipOp {
                op,
                target,
                index,
                value,
            },
            Op::Call { func, args, rets } => Op::Call { func, args, rets },
            Op::Invoke {
                target,
                method,
                args,
                rets,
            } => Op::Invoke {
                target,
                method,
                args,
                rets,
            },
            Op::Construct { ctor, args, to } => Op::Construct { ctor, args, to },
            Op::MBind { target, method, to } => Op::MBind { target, method, to },
            Op::FBind { func, params, to } => Op::FBind { func, params, to },
            Op::Pack { typ, values, to } => Op::Pack { typ, values, to },
        };
        Some(op)
    }

    /// Returns the jump destination of the instruction, if it has one.
    pub fn label(&self) -> Option<&L> {
        match self {
            Op::Jump(target)
            | Op::JumpTrue { target, .. }
            | Op::JumpFalse { target, .. }
            | Op::JumpNull { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl<L: fmt::Display> fmt::Display for Op<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Line(delta) => write!(f, "line {delta:+}"),
            Op::Var { reg, typ } => write!(f, "var {reg}: {typ}"),
            Op::Move { from, to } => write!(f, "move {from} -> {to}"),
            Op::MoveRef { from, to } => write!(f, "move.ref {from} -> {to}"),
            Op::MoveVar { from, to } => write!(f, "move.var {from} -> {to}"),
            Op::MoveThis { steps, to } => write!(f, "move.this {steps} -> {to}"),
            Op::LGet { prop, to } => write!(f, "local.get {prop} -> {to}"),
            Op::LSet { prop, value } => write!(f, "local.set {prop} <- {value}"),
            Op::PGet { prop, target, to } => write!(f, "prop.get {target}.{prop} -> {to}"),
            Op::PSet {
                prop,
                target,
                value,
            } => write!(f, "prop.set {target}.{prop} <- {value}"),
            Op::PRef { prop, target, to } => write!(f, "prop.ref {target}.{prop} -> {to}"),
            Op::PVar { prop, target, to } => write!(f, "prop.var {target}.{prop} -> {to}"),
            Op::IGet { target, index, to } => write!(f, "index.get {target}[{index}] -> {to}"),
            Op::ISet {
                target,
                index,
                value,
            } => write!(f, "index.set {target}[{index}] <- {value}"),
            Op::IGetN {
                target,
                indices,
                to,
            } => write!(
                f,
                "index.get_n {target}[{}] -> {to}",
                indices.iter().format(", ")
            ),
            Op::ISetN {
                target,
                indices,
                value,
            } => write!(
                f,
                "index.set_n {target}[{}] <- {value}",
                indices.iter().format(", ")
            ),
            Op::IpSeq { op, target, ret } => {
                write!(f, "seq.{op} {target}")?;
                write_ret(f, ret)
            }
            Op::PipSeq {
                op,
                prop,
                target,
                ret,
            } => {
                write!(f, "prop.seq.{op} {target}.{prop}")?;
                write_ret(f, ret)
            }
            Op::IipSeq {
                op,
                target,
                index,
                ret,
            } => {
                write!(f, "index.seq.{op} {target}[{index}]")?;
                write_ret(f, ret)
            }
            Op::IpOp { op, target, value } => write!(f, "inplace.{op} {target} <- {value}"),
            Op::PipOp {
                op,
                prop,
                target,
                value,
            } => write!(f, "prop.inplace.{op} {target}.{prop} <- {value}"),
            Op::IipOp {
                op,
                target,
                index,
                value,
            } => write!(f, "index.inplace.{op} {target}[{index}] <- {value}"),
            Op::Call { func, args, rets } => write!(
                f,
                "call_{}{} {func}{args}{rets}",
                args.shape(),
                rets.shape()
            ),
            Op::Invoke {
                target,
                method,
                args,
                rets,
            } => write!(
                f,
                "invoke_{}{} {target}.{method}{args}{rets}",
                args.shape(),
                rets.shape()
            ),
            Op::Construct { ctor, args, to } => {
                write!(f, "construct_{} {ctor}{args} -> {to}", args.shape())
            }
            Op::MBind { target, method, to } => {
                write!(f, "bind.method {target}.{method} -> {to}")
            }
            Op::FBind { func, params, to } => write!(
                f,
                "bind.fn {func} [{}] -> {to}",
                params
                    .iter()
                    .format_with(", ", |(i, arg), f| f(&format_args!("{i}: {arg}")))
            ),
            Op::Pack { typ, values, to } => {
                write!(f, "pack {typ} ({}) -> {to}", values.iter().format(", "))
            }
            Op::Jump(target) => write!(f, "jump {target}"),
            Op::JumpTrue { cond, target } => write!(f, "jump.if {cond} {target}"),
            Op::JumpFalse { cond, target } => write!(f, "jump.if_not {cond} {target}"),
            Op::JumpNull { value, target } => write!(f, "jump.if_null {value} {target}"),
        }
    }
}

fn write_ret(f: &mut fmt::Formatter<'_>, ret: &Option<Arg>) -> fmt::Result {
    match ret {
        Some(ret) => write!(f, " -> {ret}"),
        None => Ok(()),
    }
}

/// The argument list of a call, classified by the call shape it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    None,
    One(Arg),
    Many(Box<[Arg]>),
    /// A single tuple whose elements are spread over the parameters.
    Tuple(Arg),
}

impl Args {
    pub fn new(args: impl IntoIterator<Item = Arg>) -> Self {
        let mut args = args.into_iter().collect::<Vec<_>>();
        match args.len() {
            0 => Self::None,
            1 => Self::One(args.remove(0)),
            _ => Self::Many(args.into()),
        }
    }

    pub fn shape(&self) -> char {
        match self {
            Self::None => '0',
            Self::One(_) => '1',
            Self::Many(_) => 'N',
            Self::Tuple(_) => 'T',
        }
    }

    pub fn as_slice(&self) -> &[Arg] {
        match self {
            Self::None => &[],
            Self::One(arg) | Self::Tuple(arg) => std::slice::from_ref(arg),
            Self::Many(args) => args,
        }
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuple(arg) => write!(f, "(tuple {arg})"),
            other => write!(f, "({})", other.as_slice().iter().format(", ")),
        }
    }
}

/// The return destinations of a call, classified by the call shape it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rets {
    None,
    One(Arg),
    Many(Box<[Arg]>),
    /// The results are packed into a single tuple.
    Tuple(Arg),
}

impl Rets {
    pub fn new(rets: impl IntoIterator<Item = Arg>) -> Self {
        let mut rets = rets.into_iter().collect::<Vec<_>>();
        match rets.len() {
            0 => Self::None,
            1 => Self::One(rets.remove(0)),
            _ => Self::Many(rets.into()),
        }
    }

    pub fn shape(&self) -> char {
        match self {
            Self::None => '0',
            Self::One(_) => '1',
            Self::Many(_) => 'N',
            Self::Tuple(_) => 'T',
        }
    }
}

impl fmt::Display for Rets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::One(ret) => write!(f, " -> {ret}"),
            Self::Many(rets) => write!(f, " -> ({})", rets.iter().format(", ")),
            Self::Tuple(ret) => write!(f, " -> tuple {ret}"),
        }
    }
}

/// An increment or decrement, optionally producing the value before or after the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Sequential {
    Inc,
    PreInc,
    PostInc,
    Dec,
    PreDec,
    PostDec,
}

impl Sequential {
    #[inline]
    pub fn is_inc(self) -> bool {
        self <= Self::PostInc
    }

    #[inline]
    pub fn is_blind(self) -> bool {
        matches!(self, Self::Inc | Self::Dec)
    }

    #[inline]
    pub fn is_pre(self) -> bool {
        matches!(self, Self::PreInc | Self::PreDec)
    }

    #[inline]
    pub fn is_post(self) -> bool {
        matches!(self, Self::PostInc | Self::PostDec)
    }

    #[inline]
    pub fn to_blind(self) -> Self {
        if self.is_inc() { Self::Inc } else { Self::Dec }
    }
}

/// The operator of a compound assignment such as `+=` or `>>>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum InPlaceOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    ShrAll,
    And,
    Or,
    Xor,
}

/// An absolute position in the assembled instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(u32);

impl Offset {
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
