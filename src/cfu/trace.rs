use log::trace;

use super::{Cfu, Instruction, Opcode};

/// Forwards every instruction to `inner` and keeps the opcode sequence.
pub struct TracingCfu<C> {
    inner: C,
    log: Vec<Opcode>,
}

impl<C> TracingCfu<C> {
    pub fn new(inner: C) -> Self { Self { inner, log: Vec::new() } }

    pub fn opcodes(&self) -> &[Opcode] { &self.log }

    pub fn count(&self, op: Opcode) -> usize { self.log.iter().filter(|&&o| o == op).count() }

    pub fn clear(&mut self) { self.log.clear(); }

    pub fn inner(&self) -> &C { &self.inner }

    pub fn into_inner(self) -> C { self.inner }
}

impl<'a, C: Cfu<'a>> Cfu<'a> for TracingCfu<C> {
    fn execute(&mut self, insn: Instruction<'a>) -> i32 {
        let op = insn.opcode();
        let ret = self.inner.execute(insn);
        match insn {
            Instruction::SetBuffers { input, filter } => {
                trace!("cfu op{} input_len={} filter_len={} -> {}", op as u8, input.len(), filter.len(), ret)
            }
            _ => trace!("cfu op{} {:?} -> {}", op as u8, insn, ret),
        }
        self.log.push(op);
        ret
    }
}
