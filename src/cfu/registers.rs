use super::Instruction;

/// Register file of the accelerator made explicit.
///
/// Every configuration instruction overwrites a subset of these fields;
/// `accumulate` reads them all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Registers<'a> {
    pub filter_width: i32,
    pub filter_height: i32,
    pub input_width: i32,
    pub input_height: i32,
    pub input_depth: i32,
    pub filter_depth: i32,
    pub input_offset: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub batch_offset: i32,
    pub filter_offset: i32,
    pub input: &'a [i8],
    pub filter: &'a [i8],
}

impl<'a> Registers<'a> {
    /// Latch a configuration instruction. `Accumulate` leaves the registers
    /// untouched.
    pub fn write(&mut self, insn: Instruction<'a>) {
        match insn {
            Instruction::Accumulate => {}
            Instruction::Reset => *self = Registers::default(),
            Instruction::SetFilterDims { width, height } => { self.filter_width = width; self.filter_height = height; }
            Instruction::SetInputDims { width, height } => { self.input_width = width; self.input_height = height; }
            Instruction::SetInputDepth { depth, input_offset } => { self.input_depth = depth; self.input_offset = input_offset; }
            Instruction::SetWindowOrigin { x, y } => { self.origin_x = x; self.origin_y = y; }
            Instruction::SetBuffers { input, filter } => { self.input = input; self.filter = filter; }
            Instruction::SetFilterDepth { depth, input_offset } => { self.filter_depth = depth; self.input_offset = input_offset; }
            Instruction::SetChannelOffsets { batch_offset, filter_offset } => {
                self.batch_offset = batch_offset;
                self.filter_offset = filter_offset;
            }
        }
    }

    /// Raw multiply-accumulate over the configured window: taps outside
    /// `[0, input_height) x [0, input_width)` contribute nothing.
    pub fn accumulate(&self) -> i32 {
        let in_depth = self.input_depth as usize;
        let f_depth = self.filter_depth as usize;
        let batch_base = self.batch_offset as usize;
        let filter_base = self.filter_offset as usize;
        let mut acc: i32 = 0;
        for filter_y in 0..self.filter_height {
            let in_y = self.origin_y + filter_y;
            if in_y < 0 || in_y >= self.input_height { continue; }
            for filter_x in 0..self.filter_width {
                let in_x = self.origin_x + filter_x;
                if in_x < 0 || in_x >= self.input_width { continue; }
                let in_idx = batch_base + (in_y * self.input_width + in_x) as usize * in_depth;
                let f_idx = filter_base + (filter_y * self.filter_width + filter_x) as usize * f_depth;
                let pixel = &self.input[in_idx..in_idx + f_depth];
                let taps = &self.filter[f_idx..f_idx + f_depth];
                for (&iv, &fv) in pixel.iter().zip(taps) {
                    acc = acc.wrapping_add(i32::from(fv) * (i32::from(iv) + self.input_offset));
                }
            }
        }
        acc
    }
}
