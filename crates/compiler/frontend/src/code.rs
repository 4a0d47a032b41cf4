use std::fmt;

use vesper_bytecode::{AssembleError, Assembler, ConstIndex, Label, Op, Register};

use crate::IndexSet;
use crate::Symbols;
use crate::constant::Constant;
use crate::utils::DisplayFn;

/// Appends instructions to the code being generated and interns the constants they refer to.
#[derive(Debug, Default)]
pub struct Emitter {
    asm: Assembler,
    constants: IndexSet<Constant>,
}

impl Emitter {
    /// Creates an emitter whose temporaries are allocated after the given number of registers.
    pub fn new(reserved_registers: u32) -> Self {
        Self {
            asm: Assembler::new(reserved_registers),
            constants: IndexSet::default(),
        }
    }

    #[inline]
    pub fn emit(&mut self, op: Op<Label>) {
        log::trace!("emit {op}");
        self.asm.emit(op);
    }

    pub fn constant(&mut self, constant: Constant) -> ConstIndex {
        let (idx, _) = self.constants.insert_full(constant);
        ConstIndex::new(u32::try_from(idx).unwrap_or(u32::MAX))
    }

    #[inline]
    pub fn new_register(&mut self) -> Register {
        self.asm.new_register()
    }

    #[inline]
    pub fn new_label(&mut self) -> Label {
        self.asm.new_label()
    }

    #[inline]
    pub fn mark_label(&mut self, label: Label) {
        self.asm.mark_label(label);
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.asm.line()
    }

    #[inline]
    pub fn update_line(&mut self, line: u32) {
        self.asm.update_line(line);
    }

    #[inline]
    pub fn ops(&self) -> &[Op<Label>] {
        self.asm.code()
    }

    pub fn finish(self) -> Result<Code, AssembleError> {
        let registers = self.asm.register_count();
        Ok(Code {
            ops: self.asm.into_code()?,
            constants: self.constants.into_iter().collect(),
            registers,
        })
    }
}

/// Generated instructions together with their constant pool.
#[derive(Debug, Clone)]
pub struct Code {
    ops: Vec<Op>,
    constants: Box<[Constant]>,
    registers: u32,
}

impl Code {
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[inline]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    #[inline]
    pub fn register_count(&self) -> u32 {
        self.registers
    }

    /// Renders the listing: one instruction per line followed by the constant pool.
    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> impl fmt::Display + use<'a> {
        DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
            for (i, op) in self.ops.iter().enumerate() {
                writeln!(f, "{i:>3}: {op}")?;
            }
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, " c{i} = {}", constant.display(symbols))?;
            }
            Ok(())
        })
    }
}
