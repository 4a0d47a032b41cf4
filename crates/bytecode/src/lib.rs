mod arg;
mod assemble;
mod op;

pub use arg::{Arg, ConstIndex, Register};
pub use assemble::{AssembleError, Assembler, Label};
pub use op::{Args, InPlaceOp, Offset, Op, Rets, Sequential};
