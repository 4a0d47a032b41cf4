use std::fmt;

use slab::Slab;
use thiserror::Error;

use crate::{Offset, Op, Register};

/// Collects instructions with symbolic jump targets and resolves them into offsets once the
/// whole stream is known.
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<Op<Label>>,
    labels: Slab<u32>,
    next_register: u32,
    line: u32,
}

impl Assembler {
    /// Creates an assembler whose fresh registers start after the ones already reserved for
    /// parameters and declared locals.
    pub fn new(reserved_registers: u32) -> Self {
        Self {
            next_register: reserved_registers,
            ..Self::default()
        }
    }

    #[inline]
    pub fn emit(&mut self, op: Op<Label>) {
        self.code.push(op);
    }

    pub fn new_label(&mut self) -> Label {
        Label(self.labels.insert(u32::MAX))
    }

    #[inline]
    pub fn mark_label(&mut self, label: Label) {
        self.labels[label.0] = u32::try_from(self.code.len()).unwrap_or(u32::MAX - 1);
    }

    pub fn new_register(&mut self) -> Register {
        let reg = Register::new(self.next_register);
        self.next_register += 1;
        reg
    }

    #[inline]
    pub fn register_count(&self) -> u32 {
        self.next_register
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Moves the current source line, emitting a line delta if it changed.
    pub fn update_line(&mut self, line: u32) {
        if line != self.line {
            let delta = i64::from(line) - i64::from(self.line);
            self.emit(Op::Line(i32::try_from(delta).unwrap_or(i32::MAX)));
            self.line = line;
        }
    }

    #[inline]
    pub fn code(&self) -> &[Op<Label>] {
        &self.code
    }

    pub fn into_code(self) -> Result<Vec<Op>, AssembleError> {
        let labels = self.labels;
        self.code
            .into_iter()
            .map(|op| {
                let mut unresolved = None;
                op.map_labels(|label| match labels.get(label.0) {
                    Some(&loc) if loc != u32::MAX => Some(Offset::new(loc)),
                    _ => {
                        unresolved = Some(label);
                        None
                    }
                })
                .ok_or_else(|| AssembleError::UnmarkedLabel(unresolved.unwrap_or(Label(0))))
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("label {0} is referenced but never marked")]
    UnmarkedLabel(Label),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

impl From<Label> for usize {
    #[inline]
    fn from(label: Label) -> usize {
        label.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arg;

    #[test]
    fn resolves_forward_labels() {
        let mut asm = Assembler::new(2);
        let reg = asm.new_register();
        let skip = asm.new_label();
        asm.emit(Op::JumpFalse {
            cond: Arg::Reg(reg),
            target: skip,
        });
        asm.emit(Op::Move {
            from: Arg::Reg(reg),
            to: Arg::Ignore,
        });
        asm.mark_label(skip);

        let code = asm.into_code().unwrap();
        assert_eq!(reg, Register::new(2));
        assert_eq!(
            code[0],
            Op::JumpFalse {
                cond: Arg::Reg(reg),
                target: Offset::new(2)
            }
        );
    }

    #[test]
    fn unmarked_label_is_an_error() {
        let mut asm = Assembler::default();
        let label = asm.new_label();
        asm.emit(Op::Jump(label));
        assert!(matches!(
            asm.into_code(),
            Err(AssembleError::UnmarkedLabel(l)) if l == label
        ));
    }

    #[test]
    fn line_changes_emit_deltas() {
        let mut asm = Assembler::default();
        asm.update_line(3);
        asm.update_line(3);
        asm.update_line(1);
        assert_eq!(asm.code(), &[Op::Line(3), Op::Line(-2)]);
    }
}
