//! Convolution cases as JSON lines.
//!
//! One [`ConvCase`] per line; blank lines and lines starting with `#` are
//! skipped. Values are stored as `i32` and narrowed to the element width on
//! load, so a case file can be written by hand.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cfu::SoftCfu;
use crate::kernels::{
    check_narrow, check_wide, conv_per_channel_i16, conv_per_channel_i16_par, conv_per_channel_i8,
    conv_per_channel_i8_offload, conv_per_channel_i8_par, conv_per_channel_packed_i4,
    conv_per_channel_packed_i4_offload, pack_dense_i4, AccumScalar,
};
use crate::params::{ChannelQuant, ConvParams};
use crate::shape::RuntimeShape;
use crate::tensor::{Tensor, TensorView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementWidth {
    /// int8 activations, 32-bit accumulator.
    I8,
    /// int16 activations, int8 filters.
    I16,
}

/// Accumulator of a 16-bit case; ignored for 8-bit cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumWidth {
    I32,
    #[default]
    I64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvCase {
    #[serde(default)]
    pub name: String,
    pub width: ElementWidth,
    #[serde(default)]
    pub accumulator: AccumWidth,
    pub input_shape: [usize; 4],
    pub filter_shape: [usize; 4],
    pub output_shape: [usize; 4],
    pub input: Vec<i32>,
    pub filter: Vec<i32>,
    #[serde(default)]
    pub bias: Option<Vec<i64>>,
    pub multipliers: Vec<i32>,
    pub shifts: Vec<i32>,
    /// Defaults to [`ConvParams::default`] for 8-bit cases and
    /// [`ConvParams::wide`] for 16-bit ones.
    #[serde(default)]
    pub params: Option<ConvParams>,
    #[serde(default)]
    pub expected: Option<Vec<i32>>,
}

/// What running a case produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    /// Output of the reference (serial software) path.
    pub output: Vec<i32>,
    /// Every other path of the same engine produced `output` too.
    pub agreed: bool,
    /// `None` when the case carries no expectation.
    pub matched_expected: Option<bool>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool { self.agreed && self.matched_expected != Some(false) }
}

fn narrow<T: TryFrom<i32>>(what: &str, values: &[i32]) -> Result<Vec<T>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            T::try_from(v).map_err(|_| anyhow!("{}[{}] = {} does not fit {}", what, i, v, std::any::type_name::<T>()))
        })
        .collect()
}

/// The 64-bit rescale takes accumulators of at most 48 bits; taps never come
/// close, so bound the bias well inside that.
fn wide_bias(v: i64) -> Result<i64> {
    if v.unsigned_abs() >= 1 << 40 { bail!("bias {} exceeds 40 bits", v); }
    Ok(v)
}

impl ConvCase {
    pub fn effective_params(&self) -> ConvParams {
        match (self.params, self.width) {
            (Some(p), _) => p,
            (None, ElementWidth::I8) => ConvParams::default(),
            (None, ElementWidth::I16) => ConvParams::wide(),
        }
    }

    /// Run every path of the matching engine. Contract violations come back
    /// as errors instead of reaching the kernels.
    pub fn run(&self) -> Result<CaseOutcome> {
        let output = match self.width {
            ElementWidth::I8 => self.run_narrow(),
            ElementWidth::I16 => match self.accumulator {
                AccumWidth::I64 => self.run_wide::<i64>(wide_bias),
                AccumWidth::I32 => self.run_wide::<i32>(|v| i32::try_from(v).context("bias does not fit i32")),
            },
        };
        let (output, agreed) = output.with_context(|| format!("case '{}'", self.name))?;
        let matched_expected = self.expected.as_ref().map(|e| *e == output);
        Ok(CaseOutcome { output, agreed, matched_expected })
    }

    fn shapes(&self) -> (RuntimeShape, RuntimeShape, RuntimeShape) {
        (RuntimeShape::new(&self.input_shape), RuntimeShape::new(&self.filter_shape), RuntimeShape::new(&self.output_shape))
    }

    fn run_narrow(&self) -> Result<(Vec<i32>, bool)> {
        let params = self.effective_params();
        let (is, fs, os) = self.shapes();
        let input: Vec<i8> = narrow("input", &self.input)?;
        let filter: Vec<i8> = narrow("filter", &self.filter)?;
        let bias: Option<Vec<i32>> = match &self.bias {
            Some(b) => Some(b.iter().map(|&v| i32::try_from(v)).collect::<Result<_, _>>().context("bias does not fit i32")?),
            None => None,
        };
        let quant = ChannelQuant::new(&self.multipliers, &self.shifts);
        check_narrow(&params, &quant, &is, input.len(), &fs, filter.len(), bias.as_ref().map(Vec::len), &os, os.flat_size())?;

        let input_view = TensorView::new(&is, &input);
        let filter_view = TensorView::new(&fs, &filter);
        let mut reference = Tensor::<i8>::zeros(os.clone());
        conv_per_channel_i8(&params, quant, input_view, filter_view, bias.as_deref(), reference.view_mut());

        let mut par = Tensor::<i8>::zeros(os.clone());
        conv_per_channel_i8_par(&params, quant, input_view, filter_view, bias.as_deref(), par.view_mut());

        let mut offloaded = Tensor::<i8>::zeros(os.clone());
        let mut cfu = SoftCfu::new();
        conv_per_channel_i8_offload(&params, quant, input_view, filter_view, bias.as_deref(), offloaded.view_mut(), &mut cfu);

        let mut agreed = par == reference && offloaded == reference;

        if filter.iter().all(|v| (-8..=7).contains(v)) {
            let packed = pack_dense_i4(&filter);
            let mut scratch = vec![0i8; fs.flat_size()];
            let mut unpacked = Tensor::<i8>::zeros(os.clone());
            conv_per_channel_packed_i4(&params, quant, input_view, &fs, &packed, &mut scratch, bias.as_deref(), unpacked.view_mut());

            let mut unit_scratch = vec![0i8; fs.flat_size()];
            let mut unpacked_offloaded = Tensor::<i8>::zeros(os.clone());
            let mut unit = SoftCfu::new();
            conv_per_channel_packed_i4_offload(
                &params,
                quant,
                input_view,
                &fs,
                &packed,
                &mut unit_scratch,
                bias.as_deref(),
                unpacked_offloaded.view_mut(),
                &mut unit,
            );
            agreed &= unpacked == reference && unpacked_offloaded == reference;
        }

        Ok((reference.data.iter().map(|&v| i32::from(v)).collect(), agreed))
    }

    fn run_wide<A: AccumScalar>(&self, bias_of: impl Fn(i64) -> Result<A>) -> Result<(Vec<i32>, bool)> {
        let params = self.effective_params();
        let (is, fs, os) = self.shapes();
        let input: Vec<i16> = narrow("input", &self.input)?;
        let filter: Vec<i8> = narrow("filter", &self.filter)?;
        let bias: Option<Vec<A>> = match &self.bias {
            Some(b) => Some(b.iter().map(|&v| bias_of(v)).collect::<Result<_>>()?),
            None => None,
        };
        let quant = ChannelQuant::new(&self.multipliers, &self.shifts);
        check_wide::<A>(&params, &quant, &is, input.len(), &fs, filter.len(), bias.as_ref().map(Vec::len), &os, os.flat_size())?;

        let input_view = TensorView::new(&is, &input);
        let filter_view = TensorView::new(&fs, &filter);
        let mut reference = Tensor::<i16>::zeros(os.clone());
        conv_per_channel_i16::<A>(&params, quant, input_view, filter_view, bias.as_deref(), reference.view_mut());
        let mut par = Tensor::<i16>::zeros(os.clone());
        conv_per_channel_i16_par::<A>(&params, quant, input_view, filter_view, bias.as_deref(), par.view_mut());

        Ok((reference.data.iter().map(|&v| i32::from(v)).collect(), par == reference))
    }
}

/// Read a JSON-lines case file.
pub fn load_cases<P: AsRef<Path>>(path: P) -> Result<Vec<ConvCase>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open case file: {}", path.display()))?;
    let mut cases = Vec::new();
    for (lineno, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("read {}:{}", path.display(), lineno + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }
        let mut case: ConvCase =
            serde_json::from_str(line).with_context(|| format!("parse {}:{}", path.display(), lineno + 1))?;
        if case.name.is_empty() { case.name = format!("{}:{}", path.display(), lineno + 1); }
        cases.push(case);
    }
    if cases.is_empty() { bail!("no cases in {}", path.display()); }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_rejects_out_of_range_values() {
        let err = narrow::<i8>("input", &[1, 200]).unwrap_err();
        assert!(err.to_string().contains("input[1] = 200"));
    }

    #[test]
    fn missing_params_follow_element_width() {
        let line = r#"{"width":"i16","input_shape":[1,1,1,1],"filter_shape":[1,1,1,1],"output_shape":[1,1,1,1],
                      "input":[5],"filter":[1],"multipliers":[1073741824],"shifts":[1]}"#;
        let case: ConvCase = serde_json::from_str(line).unwrap();
        assert_eq!(case.accumulator, AccumWidth::I64);
        assert_eq!(case.effective_params(), ConvParams::wide());
    }
}
