//! 16-bit activations, 8-bit filters, 16-bit outputs, wide accumulator.
//!
//! Always computed in software. Supports dilation and grouped filters.

use log::debug;
use rayon::prelude::*;

use super::geometry::{check_wide, ConvGeometry};
use super::rescale::AccumScalar;
use crate::params::{ChannelQuant, ConvParams};
use crate::tensor::{TensorView, TensorViewMut};

struct WideKernel<'k, A> {
    params: ConvParams,
    quant: ChannelQuant<'k>,
    input: TensorView<'k, i16>,
    filter: TensorView<'k, i8>,
    bias: Option<&'k [A]>,
    geo: ConvGeometry,
}

impl<'k, A: AccumScalar> WideKernel<'k, A> {
    fn new(
        entry: &str,
        params: &ConvParams,
        quant: ChannelQuant<'k>,
        input: TensorView<'k, i16>,
        filter: TensorView<'k, i8>,
        bias: Option<&'k [A]>,
        output: &TensorViewMut<'_, i16>,
    ) -> Self {
        let geo = check_wide::<A>(
            params,
            &quant,
            input.shape,
            input.data.len(),
            filter.shape,
            filter.data.len(),
            bias.map(<[A]>::len),
            output.shape,
            output.data.len(),
        )
        .unwrap_or_else(|e| panic!("{}: {}", entry, e));
        debug!(
            "{}: batches={} input={}x{}x{} filter={}x{}x{}x{} groups={} dilation={}x{} output={}x{}x{} acc={}",
            entry,
            geo.batches,
            geo.input_height,
            geo.input_width,
            geo.input_depth,
            geo.output_depth,
            geo.filter_height,
            geo.filter_width,
            geo.filter_input_depth,
            geo.groups,
            params.dilation_height_factor,
            params.dilation_width_factor,
            geo.output_height,
            geo.output_width,
            geo.output_depth,
            std::any::type_name::<A>()
        );
        Self { params: *params, quant, input, filter, bias, geo }
    }

    fn row(&self, batch: usize, out_y: usize, row: &mut [i16]) {
        let g = &self.geo;
        let p = &self.params;
        let in_y_origin = out_y as i32 * p.stride_height - p.padding.height;
        for out_x in 0..g.output_width {
            let in_x_origin = out_x as i32 * p.stride_width - p.padding.width;
            for out_channel in 0..g.output_depth {
                let group = out_channel / g.filters_per_group;
                let mut acc = A::default();
                for filter_y in 0..g.filter_height {
                    let in_y = in_y_origin + p.dilation_height_factor * filter_y as i32;
                    for filter_x in 0..g.filter_width {
                        let in_x = in_x_origin + p.dilation_width_factor * filter_x as i32;

                        // Zero padding by omitting the areas outside the image.
                        let inside = in_x >= 0 && in_x < g.input_width as i32 && in_y >= 0 && in_y < g.input_height as i32;
                        if !inside { continue; }

                        let in_base = self.input.shape.offset(batch, in_y as usize, in_x as usize, group * g.filter_input_depth);
                        let f_base = self.filter.shape.offset(out_channel, filter_y, filter_x, 0);
                        for in_channel in 0..g.filter_input_depth {
                            let input_val = i32::from(self.input.data[in_base + in_channel]);
                            let filter_val = i32::from(self.filter.data[f_base + in_channel]);
                            // |i8 * i16| stays below 2^23 per tap
                            acc = acc.add_wrapping(A::from_i32(filter_val * input_val));
                        }
                    }
                }
                if let Some(bias) = self.bias {
                    acc = acc.add_wrapping(bias[out_channel]);
                }
                let mut scaled = acc.rescale(self.quant.multipliers[out_channel], self.quant.shifts[out_channel]);
                scaled = scaled.max(p.quantized_activation_min);
                scaled = scaled.min(p.quantized_activation_max);
                row[out_x * g.output_depth + out_channel] = scaled as i16;
            }
        }
    }

    fn rows(&self) -> usize { self.geo.batches * self.geo.output_height }
}

/// Per-channel quantized 16x8 convolution; `A` is the accumulator width
/// (`i64` unless the caller knows `i32` cannot overflow).
///
/// # Panics
/// On any contract violation reported by [`check_wide`].
pub fn conv_per_channel_i16<A: AccumScalar>(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'_, i16>,
    filter: TensorView<'_, i8>,
    bias: Option<&[A]>,
    output: TensorViewMut<'_, i16>,
) {
    let k = WideKernel::new("conv_per_channel_i16", params, quant, input, filter, bias, &output);
    let row_len = k.geo.output_row_len();
    if row_len == 0 { return; }
    let h = k.geo.output_height;
    for (i, row) in output.data[..k.rows() * row_len].chunks_mut(row_len).enumerate() {
        k.row(i / h, i % h, row);
    }
}

/// Same result as [`conv_per_channel_i16`], output rows computed on the rayon pool.
pub fn conv_per_channel_i16_par<A: AccumScalar>(
    params: &ConvParams,
    quant: ChannelQuant<'_>,
    input: TensorView<'_, i16>,
    filter: TensorView<'_, i8>,
    bias: Option<&[A]>,
    output: TensorViewMut<'_, i16>,
) {
    let k = WideKernel::new("conv_per_channel_i16_par", params, quant, input, filter, bias, &output);
    let row_len = k.geo.output_row_len();
    if row_len == 0 { return; }
    let h = k.geo.output_height;
    output.data[..k.rows() * row_len]
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(i, row)| k.row(i / h, i % h, row));
}
