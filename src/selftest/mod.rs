//! Self-tests run from the harness menu and the `qconv` binary.

pub mod cases;

use std::fmt;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::cfu::{Cfu, Instruction, SoftCfu};
use crate::params::{ConvParams, PerChannelQuant};
pub use cases::{load_cases, AccumWidth, CaseOutcome, ConvCase, ElementWidth};

/// Pass/fail tally of one self-test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub performed: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Report {
    pub fn record(&mut self, ok: bool) {
        self.performed += 1;
        if ok { self.passed += 1; } else { self.failed += 1; }
    }

    pub fn all_passed(&self) -> bool { self.failed == 0 }

    pub fn merge(&mut self, other: Report) {
        self.performed += other.performed;
        self.passed += other.passed;
        self.failed += other.failed;
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Performed {} comparisons, {} pass, {} fail", self.performed, self.passed, self.failed)
    }
}

pub fn hello() -> &'static str { "Hello, World!!!" }

/// Accelerator exercise geometry: one 1x1 window over `EXERCISE_DEPTH` channels.
pub const EXERCISE_DEPTH: usize = 4;
pub const EXERCISE_INPUT_OFFSET: i32 = 128;
const EXERCISE_VALUES: [i8; 2] = [-127, -126];

/// Every (input, filter) pair with each element drawn from {-127, -126}.
pub fn exercise_combos() -> Vec<([i8; EXERCISE_DEPTH], [i8; EXERCISE_DEPTH])> {
    let bits = 2 * EXERCISE_DEPTH;
    (0..1usize << bits)
        .map(|mask| {
            let mut input = [0i8; EXERCISE_DEPTH];
            let mut filter = [0i8; EXERCISE_DEPTH];
            for c in 0..EXERCISE_DEPTH {
                input[c] = EXERCISE_VALUES[(mask >> c) & 1];
                filter[c] = EXERCISE_VALUES[(mask >> (EXERCISE_DEPTH + c)) & 1];
            }
            (input, filter)
        })
        .collect()
}

/// Drive `cfu` through every combination and compare each accumulate with
/// `sum((input + 128) * filter)`.
pub fn exercise_unit<'a, C: Cfu<'a>>(cfu: &mut C, combos: &'a [([i8; EXERCISE_DEPTH], [i8; EXERCISE_DEPTH])]) -> Report {
    let mut report = Report::default();
    let depth = EXERCISE_DEPTH as i32;
    for (n, (input, filter)) in combos.iter().enumerate() {
        cfu.execute(Instruction::Reset);
        cfu.execute(Instruction::SetFilterDims { width: 1, height: 1 });
        cfu.execute(Instruction::SetInputDims { width: 1, height: 1 });
        cfu.execute(Instruction::SetInputDepth { depth, input_offset: EXERCISE_INPUT_OFFSET });
        cfu.execute(Instruction::SetBuffers { input, filter });
        cfu.execute(Instruction::SetFilterDepth { depth, input_offset: EXERCISE_INPUT_OFFSET });
        cfu.execute(Instruction::SetWindowOrigin { x: 0, y: 0 });
        cfu.execute(Instruction::SetChannelOffsets { batch_offset: 0, filter_offset: 0 });
        let got = cfu.execute(Instruction::Accumulate);
        let want: i32 =
            input.iter().zip(filter).map(|(&i, &f)| (i32::from(i) + EXERCISE_INPUT_OFFSET) * i32::from(f)).sum();
        if got != want {
            warn!("[{:4}] input {:?} filter {:?}: expected {} got {} FAIL", n, input, filter, want, got);
        }
        report.record(got == want);
    }
    report
}

/// Exercise the in-memory accelerator model.
pub fn exercise_cfu() -> Report {
    let combos = exercise_combos();
    let mut cfu = SoftCfu::new();
    let report = exercise_unit(&mut cfu, &combos);
    info!("cfu exercise: {}", report);
    report
}

#[derive(Debug, Clone)]
pub struct SelfTestParams {
    pub seed: u64,
    pub cases: usize,
    /// Upper bound on input height and width.
    pub max_dim: usize,
    pub progress: bool,
}

impl Default for SelfTestParams {
    fn default() -> Self { Self { seed: 0x5EED, cases: 64, max_dim: 6, progress: false } }
}

/// Padding that keeps at least one output position for a window `extent`
/// taps wide.
fn padding_for(rng: &mut SmallRng, input: usize, extent: usize) -> usize {
    let pad = rng.gen_range(0..extent);
    if input + 2 * pad < extent { extent - 1 } else { pad }
}

fn out_dim(input: usize, pad: usize, extent: usize, stride: usize) -> usize { (input + 2 * pad - extent) / stride + 1 }

fn random_quant(rng: &mut SmallRng, channels: usize, input_scale: f64) -> PerChannelQuant {
    let filter_scales: Vec<f64> = (0..channels).map(|_| rng.gen_range(0.002..0.05)).collect();
    let output_scale = rng.gen_range(0.05..1.0);
    PerChannelQuant::from_scales(input_scale, &filter_scales, output_scale)
}

/// A random 8-bit case. Filter values stay inside the int4 range so the
/// packed paths are covered too.
pub fn random_narrow_case(rng: &mut SmallRng, max_dim: usize, name: String) -> ConvCase {
    let batches = rng.gen_range(1..=2);
    let in_h = rng.gen_range(1..=max_dim.max(1));
    let in_w = rng.gen_range(1..=max_dim.max(1));
    let in_depth = rng.gen_range(1..=4);
    let out_depth = rng.gen_range(1..=4);
    let f_h = rng.gen_range(1..=3);
    let f_w = rng.gen_range(1..=3);
    let stride_h = rng.gen_range(1..=2);
    let stride_w = rng.gen_range(1..=2);
    let pad_h = padding_for(rng, in_h, f_h);
    let pad_w = padding_for(rng, in_w, f_w);
    let out_h = out_dim(in_h, pad_h, f_h, stride_h);
    let out_w = out_dim(in_w, pad_w, f_w, stride_w);

    let input = (0..batches * in_h * in_w * in_depth).map(|_| rng.gen_range(-128..=127)).collect();
    let filter = (0..out_depth * f_h * f_w * in_depth).map(|_| rng.gen_range(-8..=7)).collect();
    let bias = if rng.gen_bool(0.5) { Some((0..out_depth).map(|_| rng.gen_range(-2000..=2000)).collect()) } else { None };
    let quant = random_quant(rng, out_depth, 0.05);
    let params = ConvParams::default()
        .with_stride(stride_h as i32, stride_w as i32)
        .with_padding(pad_h as i32, pad_w as i32)
        .with_offsets(rng.gen_range(-127..=128), rng.gen_range(-20..=20));

    ConvCase {
        name,
        width: ElementWidth::I8,
        accumulator: AccumWidth::I64,
        input_shape: [batches, in_h, in_w, in_depth],
        filter_shape: [out_depth, f_h, f_w, in_depth],
        output_shape: [batches, out_h, out_w, out_depth],
        input,
        filter,
        bias,
        multipliers: quant.multipliers,
        shifts: quant.shifts,
        params: Some(params),
        expected: None,
    }
}

/// A random 16-bit case with dilation and grouped filters.
pub fn random_wide_case(rng: &mut SmallRng, max_dim: usize, name: String) -> ConvCase {
    let batches = rng.gen_range(1..=2);
    let in_h = rng.gen_range(1..=max_dim.max(1));
    let in_w = rng.gen_range(1..=max_dim.max(1));
    let filter_depth = rng.gen_range(1..=3);
    let groups = rng.gen_range(1..=3);
    let in_depth = filter_depth * groups;
    let out_depth = groups * rng.gen_range(1..=2);
    let f_h = rng.gen_range(1..=3);
    let f_w = rng.gen_range(1..=3);
    let dil_h = rng.gen_range(1..=2);
    let dil_w = rng.gen_range(1..=2);
    let extent_h = (f_h - 1) * dil_h + 1;
    let extent_w = (f_w - 1) * dil_w + 1;
    let stride_h = rng.gen_range(1..=2);
    let stride_w = rng.gen_range(1..=2);
    let pad_h = padding_for(rng, in_h, extent_h);
    let pad_w = padding_for(rng, in_w, extent_w);
    let out_h = out_dim(in_h, pad_h, extent_h, stride_h);
    let out_w = out_dim(in_w, pad_w, extent_w, stride_w);

    let input = (0..batches * in_h * in_w * in_depth).map(|_| rng.gen_range(-32768..=32767)).collect();
    let filter = (0..out_depth * f_h * f_w * filter_depth).map(|_| rng.gen_range(-127..=127)).collect();
    let bias = if rng.gen_bool(0.5) { Some((0..out_depth).map(|_| rng.gen_range(-100_000..=100_000)).collect()) } else { None };
    let quant = random_quant(rng, out_depth, 0.001);
    let params = ConvParams::wide()
        .with_stride(stride_h as i32, stride_w as i32)
        .with_padding(pad_h as i32, pad_w as i32)
        .with_dilation(dil_h as i32, dil_w as i32);
    let accumulator = if rng.gen_bool(0.5) { AccumWidth::I64 } else { AccumWidth::I32 };

    ConvCase {
        name,
        width: ElementWidth::I16,
        accumulator,
        input_shape: [batches, in_h, in_w, in_depth],
        filter_shape: [out_depth, f_h, f_w, filter_depth],
        output_shape: [batches, out_h, out_w, out_depth],
        input,
        filter,
        bias,
        multipliers: quant.multipliers,
        shifts: quant.shifts,
        params: Some(params),
        expected: None,
    }
}

fn progress_bar(len: usize, enabled: bool) -> ProgressBar {
    if !enabled { return ProgressBar::hidden(); }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn check_cases<'c>(cases: impl ExactSizeIterator<Item = &'c ConvCase>, progress: bool) -> Report {
    let pb = progress_bar(cases.len(), progress);
    let mut report = Report::default();
    for case in cases {
        pb.set_message(case.name.clone());
        match case.run() {
            Ok(outcome) => {
                if !outcome.agreed {
                    warn!("{}: engine paths disagree", case.name);
                }
                if outcome.matched_expected == Some(false) {
                    warn!("{}: output differs from expected: {:?}", case.name, outcome.output);
                }
                report.record(outcome.passed());
            }
            Err(e) => {
                warn!("{:#}", e);
                report.record(false);
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    report
}

/// Randomized agreement test across every engine path; even cases are
/// 8-bit, odd cases 16-bit.
pub fn run_conv_selftest(params: &SelfTestParams) -> Report {
    let mut rng = SmallRng::seed_from_u64(params.seed);
    let cases: Vec<ConvCase> = (0..params.cases)
        .map(|i| {
            let name = format!("seed {:#x} case {}", params.seed, i);
            if i % 2 == 0 { random_narrow_case(&mut rng, params.max_dim, name) } else { random_wide_case(&mut rng, params.max_dim, name) }
        })
        .collect();
    let report = check_cases(cases.iter(), params.progress);
    info!("conv self-test (seed {:#x}): {}", params.seed, report);
    report
}

/// Run every case of a JSON-lines file.
pub fn run_case_file<P: AsRef<Path>>(path: P, progress: bool) -> anyhow::Result<Report> {
    let cases = load_cases(&path)?;
    let report = check_cases(cases.iter(), progress);
    info!("{}: {}", path.as_ref().display(), report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_keeps_one_output() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let pad = padding_for(&mut rng, 1, 5);
            assert!(1 + 2 * pad >= 5);
        }
    }

    #[test]
    fn exercise_combo_count() {
        assert_eq!(exercise_combos().len(), 256);
    }
}
