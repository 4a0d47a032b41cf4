use std::fmt;

use enum_as_inner::EnumAsInner;

/// A numbered local slot in the frame of the function being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u32);

impl Register {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An index into the constant pool of the function being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstIndex(u32);

impl ConstIndex {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConstIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// An operand of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumAsInner)]
pub enum Arg {
    Reg(Register),
    /// A constant, or a property of `this` when used in local-property mode.
    Const(ConstIndex),
    /// The single-use operand stack: a write pushes and a read pops.
    Stack,
    /// A destination that discards whatever is written into it.
    Ignore,
    /// Discards the result of an asynchronous call without waiting for it.
    IgnoreAsync,
    /// Requests the declared default value of a parameter.
    Default,
    This,
}

impl Arg {
    /// Whether the operand names a frame-local storage location that an instruction can write its
    /// result into directly.
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Reg(_) | Self::Stack)
    }
}

impl From<Register> for Arg {
    #[inline]
    fn from(reg: Register) -> Self {
        Self::Reg(reg)
    }
}

impl From<ConstIndex> for Arg {
    #[inline]
    fn from(idx: ConstIndex) -> Self {
        Self::Const(idx)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Const(idx) => write!(f, "{idx}"),
            Self::Stack => write!(f, "stack"),
            Self::Ignore => write!(f, "_"),
            Self::IgnoreAsync => write!(f, "_^"),
            Self::Default => write!(f, "default"),
            Self::This => write!(f, "this"),
        }
    }
}
