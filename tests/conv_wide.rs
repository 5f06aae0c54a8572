use pretty_assertions::assert_eq;
use qconv::kernels::{conv_per_channel_i16, conv_per_channel_i16_par, AccumScalar};
use qconv::{ConvParams, PerChannelQuant, RuntimeShape, Tensor};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn run<A: AccumScalar>(
    params: &ConvParams,
    quant: &PerChannelQuant,
    input: &Tensor<i16>,
    filter: &Tensor<i8>,
    bias: Option<&[A]>,
    out: RuntimeShape,
) -> Vec<i16> {
    let mut output = Tensor::<i16>::zeros(out);
    conv_per_channel_i16::<A>(params, quant.as_view(), input.view(), filter.view(), bias, output.view_mut());
    output.data
}

#[test]
fn taps_outside_a_single_pixel_are_skipped() {
    let input = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 1), vec![7i16]);
    let filter = Tensor::from_vec(RuntimeShape::d4(1, 3, 3, 1), (1..=9).collect());
    let quant = PerChannelQuant::identity(1);
    let params = ConvParams::wide().with_padding(1, 1);
    let out_shape = RuntimeShape::d4(1, 1, 1, 1);
    // only the centre tap (weight 5) lands inside the image
    assert_eq!(run::<i64>(&params, &quant, &input, &filter, None, out_shape.clone()), vec![35]);
    assert_eq!(run::<i32>(&params, &quant, &input, &filter, None, out_shape), vec![35]);
}

#[test]
fn dilation_spreads_filter_taps() {
    let input = Tensor::from_vec(RuntimeShape::d4(1, 3, 3, 1), (1..=9).collect());
    let filter = Tensor::filled(RuntimeShape::d4(1, 2, 2, 1), 1i8);
    let params = ConvParams::wide().with_dilation(2, 2);
    let out = run::<i64>(&params, &PerChannelQuant::identity(1), &input, &filter, None, RuntimeShape::d4(1, 1, 1, 1));
    assert_eq!(out, vec![1 + 3 + 7 + 9]);
}

#[test]
fn groups_read_only_their_input_slice() {
    let filter = Tensor::filled(RuntimeShape::d4(2, 1, 1, 2), 1i8);
    let quant = PerChannelQuant::identity(2);
    let params = ConvParams::wide();
    let out_shape = RuntimeShape::d4(1, 1, 1, 2);

    for sentinel in [1000i16, -3000, 12_000] {
        let second_half = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 4), vec![1, 1, sentinel, sentinel]);
        let out = run::<i64>(&params, &quant, &second_half, &filter, None, out_shape.clone());
        assert_eq!(out, vec![2, 2 * sentinel]);

        let first_half = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 4), vec![sentinel, sentinel, 1, 1]);
        let out = run::<i64>(&params, &quant, &first_half, &filter, None, out_shape.clone());
        assert_eq!(out, vec![2 * sentinel, 2]);
    }
}

#[test]
fn offsets_are_ignored_and_bias_uses_accumulator_width() {
    let input = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 1), vec![300i16]);
    let filter = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 1), vec![-100i8]);
    let quant = PerChannelQuant::identity(1);
    let params = ConvParams::wide().with_offsets(50, 50);
    let bias = [40_000i64];
    assert_eq!(run::<i64>(&params, &quant, &input, &filter, Some(&bias[..]), RuntimeShape::d4(1, 1, 1, 1)), vec![10_000]);
}

#[test]
fn output_clamps_to_activation_range() {
    let input = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 2), vec![i16::MAX, i16::MAX]);
    let filter = Tensor::from_vec(RuntimeShape::d4(2, 1, 1, 2), vec![127, 127, -128, -128]);
    let params = ConvParams::wide();
    let out = run::<i64>(&params, &PerChannelQuant::identity(2), &input, &filter, None, RuntimeShape::d4(1, 1, 1, 2));
    assert_eq!(out, vec![i16::MAX, i16::MIN]);

    let narrow = params.with_activation_range(-1000, 1000);
    let out = run::<i64>(&narrow, &PerChannelQuant::identity(2), &input, &filter, None, RuntimeShape::d4(1, 1, 1, 2));
    assert_eq!(out, vec![1000, -1000]);
}

#[test]
fn accumulator_width_selects_rescale_rounding() {
    let input = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 1), vec![25_000i16]);
    let filter = Tensor::from_vec(RuntimeShape::d4(1, 1, 1, 1), vec![4i8]);
    let quant = PerChannelQuant { multipliers: vec![1_518_500_250], shifts: vec![-2] };
    let params = ConvParams::wide();
    let out_shape = RuntimeShape::d4(1, 1, 1, 1);
    // the 64-bit path reduces the multiplier to 16 bits first
    assert_eq!(run::<i32>(&params, &quant, &input, &filter, None, out_shape.clone()), vec![17_678]);
    assert_eq!(run::<i64>(&params, &quant, &input, &filter, None, out_shape), vec![17_677]);
}

#[test]
fn parallel_rows_match_serial_with_groups_and_dilation() {
    let mut rng = SmallRng::seed_from_u64(21);
    let in_shape = RuntimeShape::d4(2, 8, 9, 6);
    let f_shape = RuntimeShape::d4(6, 3, 2, 2);
    let input = Tensor::from_vec(in_shape.clone(), (0..in_shape.flat_size()).map(|_| rng.gen()).collect());
    let filter = Tensor::from_vec(f_shape.clone(), (0..f_shape.flat_size()).map(|_| rng.gen_range(-127..=127)).collect());
    let quant = PerChannelQuant::from_scales(0.001, &[0.01, 0.02, 0.03, 0.04, 0.05, 0.06], 0.5);
    let bias: Vec<i64> = vec![-5000, 0, 5000, 123, -77, 999];
    let params = ConvParams::wide().with_padding(2, 1).with_dilation(2, 1).with_stride(2, 1);
    // extent 5x2, out_h = (8 + 4 - 5) / 2 + 1, out_w = (9 + 2 - 2) / 1 + 1
    let out_shape = RuntimeShape::d4(2, 4, 10, 6);

    let serial = run::<i64>(&params, &quant, &input, &filter, Some(&bias[..]), out_shape.clone());
    let mut par = Tensor::<i16>::zeros(out_shape);
    conv_per_channel_i16_par::<i64>(&params, quant.as_view(), input.view(), filter.view(), Some(&bias[..]), par.view_mut());
    assert_eq!(par.data, serial);
    assert!(serial.iter().any(|&v| v != 0));
}
