use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingValues {
    pub width: i32,
    pub height: i32,
}

/// Convolution parameters; padding is pre-resolved and symmetric.
///
/// `input_offset` is the negated input zero point: taps accumulate
/// `filter * (input + input_offset)`. The 16-bit path is symmetric and
/// ignores both offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvParams {
    pub stride_width: i32,
    pub stride_height: i32,
    pub dilation_width_factor: i32,
    pub dilation_height_factor: i32,
    pub padding: PaddingValues,
    pub input_offset: i32,
    pub output_offset: i32,
    pub quantized_activation_min: i32,
    pub quantized_activation_max: i32,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride_width: 1,
            stride_height: 1,
            dilation_width_factor: 1,
            dilation_height_factor: 1,
            padding: PaddingValues::default(),
            input_offset: 0,
            output_offset: 0,
            quantized_activation_min: i8::MIN as i32,
            quantized_activation_max: i8::MAX as i32,
        }
    }
}

impl ConvParams {
    /// Defaults with the full int16 activation range.
    pub fn wide() -> Self {
        Self { quantized_activation_min: i16::MIN as i32, quantized_activation_max: i16::MAX as i32, ..Self::default() }
    }

    pub fn with_stride(mut self, height: i32, width: i32) -> Self { self.stride_height = height; self.stride_width = width; self }

    pub fn with_padding(mut self, height: i32, width: i32) -> Self { self.padding = PaddingValues { width, height }; self }

    pub fn with_dilation(mut self, height: i32, width: i32) -> Self {
        self.dilation_height_factor = height;
        self.dilation_width_factor = width;
        self
    }

    pub fn with_offsets(mut self, input_offset: i32, output_offset: i32) -> Self {
        self.input_offset = input_offset;
        self.output_offset = output_offset;
        self
    }

    pub fn with_activation_range(mut self, min: i32, max: i32) -> Self {
        self.quantized_activation_min = min;
        self.quantized_activation_max = max;
        self
    }
}

/// Borrowed per-output-channel (multiplier, shift) pairs.
#[derive(Debug, Clone, Copy)]
pub struct ChannelQuant<'a> {
    pub multipliers: &'a [i32],
    pub shifts: &'a [i32],
}

impl<'a> ChannelQuant<'a> {
    pub fn new(multipliers: &'a [i32], shifts: &'a [i32]) -> Self { Self { multipliers, shifts } }

    pub fn len(&self) -> usize { self.multipliers.len().min(self.shifts.len()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Owned per-channel pairs, built from float scales or as identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerChannelQuant {
    pub multipliers: Vec<i32>,
    pub shifts: Vec<i32>,
}

/// Multiplier/shift pair that leaves an accumulator unchanged.
pub const IDENTITY_MULTIPLIER: i32 = 1 << 30;
pub const IDENTITY_SHIFT: i32 = 1;

impl PerChannelQuant {
    pub fn identity(channels: usize) -> Self {
        Self { multipliers: vec![IDENTITY_MULTIPLIER; channels], shifts: vec![IDENTITY_SHIFT; channels] }
    }

    /// Effective scale per channel is `input_scale * filter_scale / output_scale`.
    pub fn from_scales(input_scale: f64, filter_scales: &[f64], output_scale: f64) -> Self {
        let mut multipliers = Vec::with_capacity(filter_scales.len());
        let mut shifts = Vec::with_capacity(filter_scales.len());
        for &fs in filter_scales {
            let (m, s) = quantize_multiplier(input_scale * fs / output_scale);
            multipliers.push(m);
            shifts.push(s);
        }
        Self { multipliers, shifts }
    }

    pub fn as_view(&self) -> ChannelQuant<'_> { ChannelQuant { multipliers: &self.multipliers, shifts: &self.shifts } }
}

/// Decompose `real` into a Q0.31 multiplier in `[2^30, 2^31)` and a
/// power-of-two exponent so that `real ~= multiplier * 2^(shift - 31)`.
///
/// Zero (and anything below 2^-31 after rounding) maps to `(0, 0)`.
pub fn quantize_multiplier(real: f64) -> (i32, i32) {
    if real <= 0.0 || !real.is_finite() { return (0, 0); }
    let mut shift = real.log2().floor() as i32 + 1;
    let mut q = real / 2f64.powi(shift);
    // log2 can land one off near exact powers of two
    while q >= 1.0 { q /= 2.0; shift += 1; }
    while q < 0.5 { q *= 2.0; shift -= 1; }
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    if shift < -31 { return (0, 0); }
    if shift > 30 {
        return (i32::MAX, 30);
    }
    (q_fixed as i32, shift)
}
