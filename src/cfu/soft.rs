use super::{Cfu, Instruction, Registers};

/// In-memory model of the accelerator: latches configuration into
/// [`Registers`] and performs the multiply-accumulate on `Accumulate`.
#[derive(Debug, Default)]
pub struct SoftCfu<'a> {
    regs: Registers<'a>,
    issued: u64,
}

impl<'a> SoftCfu<'a> {
    pub fn new() -> Self { Self::default() }

    pub fn registers(&self) -> &Registers<'a> { &self.regs }

    /// Instructions executed since construction.
    pub fn issued(&self) -> u64 { self.issued }
}

impl<'a> Cfu<'a> for SoftCfu<'a> {
    fn execute(&mut self, insn: Instruction<'a>) -> i32 {
        self.issued += 1;
        match insn {
            Instruction::Accumulate => self.regs.accumulate(),
            other => { self.regs.write(other); 0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_configuration() {
        let input = [1i8, 2, 3];
        let filter = [1i8, 1, 1];
        let mut cfu = SoftCfu::new();
        cfu.execute(Instruction::SetBuffers { input: &input, filter: &filter });
        cfu.execute(Instruction::SetFilterDims { width: 1, height: 1 });
        cfu.execute(Instruction::Reset);
        assert_eq!(cfu.registers().filter_width, 0);
        assert!(cfu.registers().input.is_empty());
        assert_eq!(cfu.execute(Instruction::Accumulate), 0);
        assert_eq!(cfu.issued(), 4);
    }
}
