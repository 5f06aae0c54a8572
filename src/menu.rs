use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::selftest::{self, SelfTestParams};

/// Line-driven project menu: one key per line, first non-blank character wins.
pub struct ProjectMenu {
    pub selftest: SelfTestParams,
    /// Case file run after the randomized self-test, if any.
    pub case_file: Option<PathBuf>,
}

pub const ITEMS: &[(char, &str)] = &[
    ('0', "exercise the accelerator (dot-product sweep)"),
    ('1', "run the convolution self-test"),
    ('h', "say Hello"),
    ('x', "exit"),
];

impl ProjectMenu {
    pub fn new(selftest: SelfTestParams) -> Self { Self { selftest, case_file: None } }

    pub fn print_items<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Project menu")?;
        for (key, label) in ITEMS {
            writeln!(out, "  {}: {}", key, label)?;
        }
        Ok(())
    }

    /// Run one item. Returns `false` when the menu should close.
    pub fn dispatch<W: Write>(&mut self, key: char, out: &mut W) -> io::Result<bool> {
        match key {
            '0' => {
                writeln!(out, "Exercise accelerator accumulate")?;
                writeln!(out, "{}", selftest::exercise_cfu())?;
            }
            '1' => {
                writeln!(out, "Convolution self-test, seed {:#x}, {} cases", self.selftest.seed, self.selftest.cases)?;
                writeln!(out, "{}", selftest::run_conv_selftest(&self.selftest))?;
                if let Some(path) = &self.case_file {
                    match selftest::run_case_file(path, self.selftest.progress) {
                        Ok(report) => writeln!(out, "{}: {}", path.display(), report)?,
                        Err(e) => writeln!(out, "{}: {:#}", path.display(), e)?,
                    }
                }
            }
            'h' => writeln!(out, "{}", selftest::hello())?,
            'x' => return Ok(false),
            other => writeln!(out, "unknown item '{}'", other)?,
        }
        Ok(true)
    }

    pub fn run_loop<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        self.print_items(out)?;
        for line in input.lines() {
            let line = match line { Ok(s) => s, Err(_) => break };
            let Some(key) = line.trim().chars().next() else { continue };
            if !self.dispatch(key, out)? { break; }
            out.flush()?;
        }
        Ok(())
    }
}
