//! Instruction-level contract of the convolution accelerator.
//!
//! The unit is stateful: configuration instructions write registers and
//! `Accumulate` answers relative to whatever was written last. The 8-bit
//! engine issues dimension/buffer configuration once per invocation, the
//! window origin once per output pixel, and channel offsets + accumulate once
//! per output element.

pub mod registers;
pub mod shared;
pub mod soft;
pub mod trace;

pub use registers::Registers;
pub use shared::SharedCfu;
pub use soft::SoftCfu;
pub use trace::TracingCfu;

/// Function selector carried by every instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Accumulate = 0,
    Reset = 1,
    FilterDims = 2,
    InputDims = 3,
    InputDepth = 4,
    WindowOrigin = 5,
    Buffers = 6,
    FilterDepth = 7,
    ChannelOffsets = 8,
}

/// One accelerator instruction: a selector plus up to two operands.
#[derive(Debug, Clone, Copy)]
pub enum Instruction<'a> {
    Accumulate,
    Reset,
    SetFilterDims { width: i32, height: i32 },
    SetInputDims { width: i32, height: i32 },
    SetInputDepth { depth: i32, input_offset: i32 },
    SetWindowOrigin { x: i32, y: i32 },
    SetBuffers { input: &'a [i8], filter: &'a [i8] },
    SetFilterDepth { depth: i32, input_offset: i32 },
    /// Element offsets of the current batch in the input buffer and of the
    /// current output channel in the filter buffer.
    SetChannelOffsets { batch_offset: i32, filter_offset: i32 },
}

impl Instruction<'_> {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Accumulate => Opcode::Accumulate,
            Instruction::Reset => Opcode::Reset,
            Instruction::SetFilterDims { .. } => Opcode::FilterDims,
            Instruction::SetInputDims { .. } => Opcode::InputDims,
            Instruction::SetInputDepth { .. } => Opcode::InputDepth,
            Instruction::SetWindowOrigin { .. } => Opcode::WindowOrigin,
            Instruction::SetBuffers { .. } => Opcode::Buffers,
            Instruction::SetFilterDepth { .. } => Opcode::FilterDepth,
            Instruction::SetChannelOffsets { .. } => Opcode::ChannelOffsets,
        }
    }
}

/// An accelerator reachable through single synchronous instructions.
///
/// `'a` bounds the buffers handed over by `SetBuffers`.
pub trait Cfu<'a> {
    fn execute(&mut self, insn: Instruction<'a>) -> i32;
}

impl<'a, C: Cfu<'a> + ?Sized> Cfu<'a> for &mut C {
    fn execute(&mut self, insn: Instruction<'a>) -> i32 { (**self).execute(insn) }
}
