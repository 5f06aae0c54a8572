//! 8-bit activations, 8-bit filters, 8-bit outputs.
//!
//! The per-element accumulation either runs in software or is delegated to an
//! accelerator through [`Cfu`]; both produce identical raw accumulators, so the
//! rest of the pipeline (bias, rescale, output offset, clamp) is shared.

use log::debug;
use rayon::prelude::*;

use super::geometry::{check_narrow, ConvGeometry};
use super::rescale::multiply_by_quantized_multiplier;
use super::unpack::unpack_dense_i4;
use crate::cfu::{Cfu, Instruction};
use crate::params::{ChannelQuant, ConvParams};
use crate::shape::RuntimeShape;
use crate::tensor::{TensorView, TensorViewMut};

struct NarrowKernel<'k> {
    params: ConvParams,
    quant: ChannelQuant<'k>,
    input: TensorView<'k, i8>,
    filter: TensorView<'k, i8>,
    bias: Option<&'k [i32]>,
    geo: ConvGeometry,
}

impl<'k> NarrowKernel<'k> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        entry: &str,
        params: &ConvParams,
        quant: ChannelQuant<'k>,
        input: TensorView<'k, i8>,
        filter: TensorView<'k, i8>,
        bias: Option<&'k [i32]>,
        output: &TensorViewMut<'_, i8>,
        offload: bool,
    ) -> Self {
        let geo = check_narrow(
            params,
            &quant,
            input.shape,
            input.data.len(),
            filter.shape,
            filter.data.len(),
            bias.map(<[i32]>::len),
            output.shape,
            output.data.len(),
        )
        .unwrap_or_else(|e| panic!("{}: {}", entry, e));
        debug!(
            "{}: batches={} input={}x{}x{} filter={}x{}x{}x{} output={}x{}x{} bias={} offload={}",
            entry,
            geo.batches,
            geo.input_height,
            geo.input_width,
            geo.input_depth,
            geo.output_depth,
            geo.filter_height,
            geo.filter_width,
            geo.filter_input_depth,
            geo.output_height,
            geo.output_width,
            geo.output_depth,
            bias.is_some(),
            offload
        );
        Self { params: *params, quant, input, filter, bias, geo }
    }

    /// Raw accumulator for one output element; taps outside the image are skipped.
    fn software_acc(&self, batch: usize, in_y_origin: i32, in_x_origin: i32, out_channel: usize) -> i32 {
        let g = &self.geo;
        let input_offset = self.params.input_offset;
        let mut acc: i32 = 0;
        for filter_y in 0..g.filter_height {
            let in_y = in_y_origin + filter_y as i32;
            if in_y < 0 || in_y >= g.input_height as i32 { continue; }
            for filter_x in 0..g.filter_width {
                let in_x = in_x_origin + filter_x as i32;
                if in_x < 0 || in_x >= g.input_width as i32 { continue; }
                let in_base = self.input.shape.offset(batch, in_y as usize, in_x as usize, 0);
                let f_base = self.filter.shape.offset(out_channel, filter_y, filter_x, 0);
                for in_channel in 0..g.filter_input_depth {
                    let input_val = i32::from(self.input.data[in_base + in_channel]);
                    let filter_val = i32::from(self.filter.data[f_base + in_channel]);
                    acc = acc.wrapping_add(filter_val * (input_val + input_offset));
                }
            }
        }
        acc
    }

    #[inline]
    fn requantize(&self, acc: i32, out_channel: usize) -> i8 {
        let mut acc = acc;
        if let Some(bias) = self.bias {
            acc = acc.wrapping_add(bias[out_channel]);
        }
        acc = multiply_by_quantized_multiplier(acc, self.quant.multipliers[out_channel], self.quant.shifts[out_channel]);
        acc = acc.saturating_add(self.params.output_offset);
        acc = acc.max(self.params.quantized_activation_min);
        acc = acc.min(self.params.quantized_activation_max);
        acc as i8
    }

    /// Fill one (batch, out_y) output row. With a unit attached, the window
    /// origin is armed once per pixel and the channel offsets once per element.
    fn row(&self, batch: usize, out_y: usize, row: &mut [i8], mut cfu: Option<&mut (dyn Cfu<'_> + '_)>) {
        let g = &self.geo;
        let p = &self.params;
        let in_y_origin = out_y as i32 * p.stride_height - p.padding.height;
        // element counts were checked to fit i32
        let batch_offset = (batch * g.input_batch_len()) as i32;
        for out_x in 0..g.output_width {
            let in_x_origin = out_x as i32 * p.stride_width - p.padding.width;
            if let Some(unit) = cfu.as_deref_mut() {
                unit.execute(Instruction::SetWindowOrigin { x: in_x_origin, y: in_y_origin });
            }
            for out_channel in 0..g.output_depth {
                let acc = match cfu.as_deref_mut() {
                    Some(unit) => {
                        let filter_offset = (out_channel * g.filter_channel_len()) as i32;
                        unit.execute(Instruction::SetChannelOffsets { batch_offset, filter_offset });
                        unit.execute(Instruction::Accumulate)
                    }
                    None => self.software_acc(batch, in_y_origin, in_x_origin, out_channel),
                };
                row[out_x * g.output_depth + out_channel] = self.requantize(acc, out_channel);
            }
        }
    }

    fn rows(&self) -> usize { self.geo.batches * self.geo.output_height }

    fn run(&self, output: &mut [i8], mut cfu: Option<&mut (dyn Cfu<'_> + '_)>) {
        let row_len = self.geo.output_row_len();
        if row_len == 0 { return; }
        let h = self.geo.output_height;
        for (i, row) in output[..self.rows() * row_len].chunks_mut(row_len).enumerate() {
            self.row(i / h, i % h, row, cfu.as_deref_mut());
        }
    }

    fn run_par(&self, output: &mut [i8]) {
        let row_len = self.geo.output_row_len();
        if row_len == 0 { return; }
        let h = self.geo.output_height;
        output[..self.rows() * row_len]
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(i, row)| self.row(i / h, i % h, row, None));
    }
}

/// Per-channel quantized convolution, software accumulation.
///
/// # Panics
/// On any contract violation reported by [`check_narrow`].
pub fn conv_per_channel_i8(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'_, i8>,
    filter: TensorView<'_, i8>,
    bias: Option<&[i32]>,
    output: TensorViewMut<'_, i8>,
) {
    let k = NarrowKernel::new("conv_per_channel_i8", params, quant, input, filter, bias, &output, false);
    k.run(output.data, None);
}

/// Same result as [`conv_per_channel_i8`], output rows computed on the rayon pool.
pub fn conv_per_channel_i8_par(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'_, i8>,
    filter: TensorView<'_, i8>,
    bias: Option<&[i32]>,
    output: TensorViewMut<'_, i8>,
) {
    let k = NarrowKernel::new("conv_per_channel_i8_par", params, quant, input, filter, bias, &output, false);
    k.run_par(output.data);
}

/// Per-channel quantized convolution with the multiply-accumulate delegated
/// to `cfu`. The caller must hold exclusive access to the unit for the whole
/// call (see [`crate::cfu::SharedCfu`]).
pub fn conv_per_channel_i8_offload<'a, C: Cfu<'a>>(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'a, i8>,
    filter: TensorView<'a, i8>,
    bias: Option<&[i32]>,
    output: TensorViewMut<'_, i8>,
    cfu: &mut C,
) {
    let k = NarrowKernel::new("conv_per_channel_i8_offload", params, quant, input, filter, bias, &output, true);
    let g = &k.geo;
    // Invariant across the whole loop nest: armed once.
    cfu.execute(Instruction::SetFilterDims { width: g.filter_width as i32, height: g.filter_height as i32 });
    cfu.execute(Instruction::SetInputDims { width: g.input_width as i32, height: g.input_height as i32 });
    cfu.execute(Instruction::SetInputDepth { depth: g.input_depth as i32, input_offset: params.input_offset });
    cfu.execute(Instruction::SetBuffers { input: input.data, filter: filter.data });
    cfu.execute(Instruction::SetFilterDepth { depth: g.filter_input_depth as i32, input_offset: params.input_offset });
    k.run(output.data, Some(cfu as &mut dyn Cfu<'a>));
}

/// Unpack int4 filter weights into `unpacked` (at least
/// `filter_shape.flat_size()` elements), then run [`conv_per_channel_i8`].
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_packed_i4(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'_, i8>,
    filter_shape: &RuntimeShape,
    packed_filter: &[u8],
    unpacked: &mut [i8],
    bias: Option<&[i32]>,
    output: TensorViewMut<'_, i8>,
) {
    let filter = unpack_dense_i4(packed_filter, filter_shape.flat_size(), unpacked);
    conv_per_channel_i8(params, quant, input, TensorView::new(filter_shape, filter), bias, output);
}

/// Offload counterpart of [`conv_per_channel_packed_i4`]; the scratch buffer
/// stays borrowed by the unit for the duration of the call.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_packed_i4_offload<'a, C: Cfu<'a>>(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'a, i8>,
    filter_shape: &'a RuntimeShape,
    packed_filter: &[u8],
    unpacked: &'a mut [i8],
    bias: Option<&[i32]>,
    output: TensorViewMut<'_, i8>,
    cfu: &mut C,
) {
    let filter = unpack_dense_i4(packed_filter, filter_shape.flat_size(), unpacked);
    conv_per_channel_i8_offload(params, quant, input, TensorView::new(filter_shape, filter), bias, output, cfu);
}
