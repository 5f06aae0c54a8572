use super::rescale::AccumScalar;
use crate::error::{ConvError, ConvResult};
use crate::params::{ChannelQuant, ConvParams};
use crate::shape::{matching_dim, RuntimeShape};

/// Sizes the loop nest needs, resolved once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batches: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub input_depth: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub filter_input_depth: usize,
    pub output_height: usize,
    pub output_width: usize,
    pub output_depth: usize,
    pub groups: usize,
    pub filters_per_group: usize,
}

impl ConvGeometry {
    /// Elements in one (batch, out_y) row of the output.
    pub fn output_row_len(&self) -> usize { self.output_width * self.output_depth }

    pub fn input_batch_len(&self) -> usize { self.input_height * self.input_width * self.input_depth }

    pub fn filter_channel_len(&self) -> usize { self.filter_height * self.filter_width * self.filter_input_depth }
}

fn rank4(tensor: &'static str, shape: &RuntimeShape) -> ConvResult<()> {
    if shape.dimensions_count() != 4 {
        return Err(ConvError::Rank { tensor, rank: shape.dimensions_count() });
    }
    Ok(())
}

fn expect_dim(what: &'static str, expected: usize, actual: usize) -> ConvResult<()> {
    if expected != actual { return Err(ConvError::DimensionMismatch { what, expected, actual }); }
    Ok(())
}

fn buffer(what: &'static str, required: usize, available: usize) -> ConvResult<()> {
    if available < required { return Err(ConvError::BufferTooSmall { what, required, available }); }
    if i32::try_from(required).is_err() { return Err(ConvError::TooLarge { what, elements: required }); }
    Ok(())
}

fn offset(what: &'static str, value: i32, lo: i32, hi: i32) -> ConvResult<()> {
    if value < lo || value > hi { return Err(ConvError::OffsetRange { what, value, lo, hi }); }
    Ok(())
}

/// Input zero points live in `[-128, 127]`, so their negation in `[-127, 128]`.
pub const INPUT_OFFSET_RANGE: (i32, i32) = (-127, 128);
pub const OUTPUT_OFFSET_RANGE: (i32, i32) = (i8::MIN as i32, i8::MAX as i32);

/// Shape relations shared by both engines.
pub fn resolve(input: &RuntimeShape, filter: &RuntimeShape, output: &RuntimeShape) -> ConvResult<ConvGeometry> {
    rank4("input", input)?;
    rank4("filter", filter)?;
    rank4("output", output)?;
    expect_dim("batch count (input vs output)", input.dims(0), output.dims(0))?;
    expect_dim("output depth (filter vs output)", filter.dims(0), output.dims(3))?;

    let input_depth = input.dims(3);
    let filter_input_depth = filter.dims(3);
    if filter_input_depth == 0 || input_depth % filter_input_depth != 0 {
        return Err(ConvError::DepthNotDivisible { input_depth, filter_depth: filter_input_depth });
    }
    let groups = input_depth / filter_input_depth;
    let output_depth = matching_dim(filter, 0, output, 3);
    if groups == 0 || output_depth % groups != 0 {
        return Err(ConvError::GroupsNotDivisible { output_depth, groups });
    }

    Ok(ConvGeometry {
        batches: matching_dim(input, 0, output, 0),
        input_height: input.dims(1),
        input_width: input.dims(2),
        input_depth,
        filter_height: filter.dims(1),
        filter_width: filter.dims(2),
        filter_input_depth,
        output_height: output.dims(1),
        output_width: output.dims(2),
        output_depth,
        groups,
        filters_per_group: output_depth / groups,
    })
}

fn check_common(
    params: &ConvParams,
    quant: &ChannelQuant<'_>,
    bias_len: Option<usize>,
    geo: &ConvGeometry,
    lanes: (i32, i32),
    shift_range: (i32, i32),
) -> ConvResult<()> {
    let (lo, hi) = lanes;
    let (min, max) = (params.quantized_activation_min, params.quantized_activation_max);
    if min > max || min < lo || max > hi {
        return Err(ConvError::ActivationRange { min, max, lo, hi });
    }
    if params.stride_height <= 0 || params.stride_width <= 0 || params.dilation_height_factor <= 0 || params.dilation_width_factor <= 0 {
        return Err(ConvError::InvalidStep {
            stride_h: params.stride_height,
            stride_w: params.stride_width,
            dilation_h: params.dilation_height_factor,
            dilation_w: params.dilation_width_factor,
        });
    }
    expect_dim("output multipliers", geo.output_depth, quant.multipliers.len())?;
    expect_dim("output shifts", geo.output_depth, quant.shifts.len())?;
    if let Some(n) = bias_len {
        expect_dim("bias length", geo.output_depth, n)?;
    }
    let (min_shift, max_shift) = shift_range;
    for (channel, (&multiplier, &shift)) in quant.multipliers.iter().zip(quant.shifts).enumerate() {
        if multiplier < 0 { return Err(ConvError::NegativeMultiplier { channel, multiplier }); }
        if shift < min_shift || shift > max_shift {
            return Err(ConvError::ShiftRange { channel, shift, min: min_shift, max: max_shift });
        }
    }
    Ok(())
}

fn check_buffers(geo: &ConvGeometry, input_len: usize, filter_len: usize, output_len: usize) -> ConvResult<()> {
    buffer("input", geo.batches * geo.input_batch_len(), input_len)?;
    buffer("filter", geo.output_depth * geo.filter_channel_len(), filter_len)?;
    buffer("output", geo.batches * geo.output_height * geo.output_row_len(), output_len)
}

/// Validate an 8-bit invocation. Grouped filters and dilation are rejected:
/// the accelerator has no registers for either.
#[allow(clippy::too_many_arguments)]
pub fn check_narrow(
    params: &ConvParams,
    quant: &ChannelQuant<'_>,
    input: &RuntimeShape,
    input_len: usize,
    filter: &RuntimeShape,
    filter_len: usize,
    bias_len: Option<usize>,
    output: &RuntimeShape,
    output_len: usize,
) -> ConvResult<ConvGeometry> {
    let geo = resolve(input, filter, output)?;
    if geo.groups != 1 {
        return Err(ConvError::GroupedUnsupported { groups: geo.groups });
    }
    if params.dilation_height_factor != 1 || params.dilation_width_factor != 1 {
        return Err(ConvError::DilationUnsupported { height: params.dilation_height_factor, width: params.dilation_width_factor });
    }
    check_common(params, quant, bias_len, &geo, (i8::MIN as i32, i8::MAX as i32), <i32 as AccumScalar>::SHIFT_RANGE)?;
    offset("input offset", params.input_offset, INPUT_OFFSET_RANGE.0, INPUT_OFFSET_RANGE.1)?;
    offset("output offset", params.output_offset, OUTPUT_OFFSET_RANGE.0, OUTPUT_OFFSET_RANGE.1)?;
    check_buffers(&geo, input_len, filter_len, output_len)?;
    Ok(geo)
}

/// Validate a 16-bit invocation accumulating in `A`. Offsets are not
/// checked: the 16-bit engine ignores them.
#[allow(clippy::too_many_arguments)]
pub fn check_wide<A: AccumScalar>(
    params: &ConvParams,
    quant: &ChannelQuant<'_>,
    input: &RuntimeShape,
    input_len: usize,
    filter: &RuntimeShape,
    filter_len: usize,
    bias_len: Option<usize>,
    output: &RuntimeShape,
    output_len: usize,
) -> ConvResult<ConvGeometry> {
    let geo = resolve(input, filter, output)?;
    check_common(params, quant, bias_len, &geo, (i16::MIN as i32, i16::MAX as i32), A::SHIFT_RANGE)?;
    check_buffers(&geo, input_len, filter_len, output_len)?;
    Ok(geo)
}
