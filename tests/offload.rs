use pretty_assertions::assert_eq;
use qconv::cfu::{Cfu, Instruction, Opcode, SharedCfu, SoftCfu, TracingCfu};
use qconv::kernels::{
    conv_per_channel_i8, conv_per_channel_i8_offload, conv_per_channel_packed_i4, conv_per_channel_packed_i4_offload,
    pack_dense_i4,
};
use qconv::{ConvParams, PerChannelQuant, RuntimeShape, Tensor};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

struct Fixture {
    params: ConvParams,
    quant: PerChannelQuant,
    input: Tensor<i8>,
    filter: Tensor<i8>,
    bias: Vec<i32>,
    out_shape: RuntimeShape,
}

impl Fixture {
    fn new(seed: u64, batches: usize, size: (usize, usize), depth: usize, out_depth: usize, kernel: usize, params: ConvParams) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let in_shape = RuntimeShape::d4(batches, size.0, size.1, depth);
        let f_shape = RuntimeShape::d4(out_depth, kernel, kernel, depth);
        let input = Tensor::from_vec(in_shape.clone(), (0..in_shape.flat_size()).map(|_| rng.gen()).collect());
        let filter = Tensor::from_vec(f_shape.clone(), (0..f_shape.flat_size()).map(|_| rng.gen_range(-8..=7)).collect());
        let scales: Vec<f64> = (0..out_depth).map(|_| rng.gen_range(0.005..0.05)).collect();
        let bias = (0..out_depth).map(|_| rng.gen_range(-500..=500)).collect();
        let out_h = (size.0 + 2 * params.padding.height as usize - kernel) / params.stride_height as usize + 1;
        let out_w = (size.1 + 2 * params.padding.width as usize - kernel) / params.stride_width as usize + 1;
        Self {
            params,
            quant: PerChannelQuant::from_scales(0.05, &scales, 0.25),
            input,
            filter,
            bias,
            out_shape: RuntimeShape::d4(batches, out_h, out_w, out_depth),
        }
    }

    fn software(&self) -> Vec<i8> {
        let mut out = Tensor::<i8>::zeros(self.out_shape.clone());
        conv_per_channel_i8(&self.params, self.quant.as_view(), self.input.view(), self.filter.view(), Some(&self.bias[..]), out.view_mut());
        out.data
    }

    fn offload<'a, C: Cfu<'a>>(&'a self, cfu: &mut C) -> Vec<i8> {
        let mut out = Tensor::<i8>::zeros(self.out_shape.clone());
        conv_per_channel_i8_offload(
            &self.params,
            self.quant.as_view(),
            self.input.view(),
            self.filter.view(),
            Some(&self.bias[..]),
            out.view_mut(),
            cfu,
        );
        out.data
    }
}

fn fixtures() -> Vec<Fixture> {
    vec![
        Fixture::new(1, 1, (4, 4), 3, 2, 3, ConvParams::default().with_padding(1, 1)),
        Fixture::new(2, 2, (5, 7), 4, 3, 3, ConvParams::default().with_padding(1, 1).with_stride(2, 2).with_offsets(128, -7)),
        Fixture::new(3, 1, (6, 6), 1, 5, 2, ConvParams::default().with_offsets(-20, 3)),
        Fixture::new(4, 3, (3, 3), 8, 1, 3, ConvParams::default().with_padding(2, 2).with_offsets(1, 0)),
    ]
}

#[test]
fn offload_matches_software_bit_for_bit() {
    for (i, fx) in fixtures().iter().enumerate() {
        let mut cfu = SoftCfu::new();
        assert_eq!(fx.offload(&mut cfu), fx.software(), "fixture {}", i);
    }
}

#[test]
fn packed_offload_matches_packed_software() {
    for fx in fixtures() {
        let packed = pack_dense_i4(&fx.filter.data);
        let n = fx.filter.shape.flat_size();

        let mut scratch = vec![0i8; n];
        let mut soft_out = Tensor::<i8>::zeros(fx.out_shape.clone());
        conv_per_channel_packed_i4(&fx.params, fx.quant.as_view(), fx.input.view(), &fx.filter.shape, &packed, &mut scratch, None, soft_out.view_mut());

        let mut unit_scratch = vec![0i8; n];
        let mut unit_out = Tensor::<i8>::zeros(fx.out_shape.clone());
        let mut cfu = SoftCfu::new();
        conv_per_channel_packed_i4_offload(
            &fx.params,
            fx.quant.as_view(),
            fx.input.view(),
            &fx.filter.shape,
            &packed,
            &mut unit_scratch,
            None,
            unit_out.view_mut(),
            &mut cfu,
        );
        assert_eq!(unit_out.data, soft_out.data);
    }
}

#[test]
fn instruction_granularity_follows_loop_nest() {
    let fx = Fixture::new(5, 2, (4, 4), 3, 2, 3, ConvParams::default().with_padding(1, 1));
    let mut cfu = TracingCfu::new(SoftCfu::new());
    fx.offload(&mut cfu);

    let pixels = 2 * 4 * 4;
    let elements = pixels * 2;
    for op in [Opcode::FilterDims, Opcode::InputDims, Opcode::InputDepth, Opcode::Buffers, Opcode::FilterDepth] {
        assert_eq!(cfu.count(op), 1, "{:?}", op);
    }
    assert_eq!(cfu.count(Opcode::Reset), 0);
    assert_eq!(cfu.count(Opcode::WindowOrigin), pixels);
    assert_eq!(cfu.count(Opcode::ChannelOffsets), elements);
    assert_eq!(cfu.count(Opcode::Accumulate), elements);

    let ops = cfu.opcodes();
    assert_eq!(
        &ops[..5],
        &[Opcode::FilterDims, Opcode::InputDims, Opcode::InputDepth, Opcode::Buffers, Opcode::FilterDepth]
    );
    let per_pixel = [Opcode::WindowOrigin, Opcode::ChannelOffsets, Opcode::Accumulate, Opcode::ChannelOffsets, Opcode::Accumulate];
    for chunk in ops[5..].chunks(per_pixel.len()) {
        assert_eq!(chunk, &per_pixel[..]);
    }
    assert_eq!(cfu.inner().issued(), (5 + pixels + 2 * elements) as u64);
}

/// Records operands and answers every accumulate with zero.
#[derive(Default)]
struct Recorder {
    origins: Vec<(i32, i32)>,
    offsets: Vec<(i32, i32)>,
    depth: Option<(i32, i32)>,
}

impl<'a> Cfu<'a> for Recorder {
    fn execute(&mut self, insn: Instruction<'a>) -> i32 {
        match insn {
            Instruction::SetWindowOrigin { x, y } => self.origins.push((x, y)),
            Instruction::SetChannelOffsets { batch_offset, filter_offset } => self.offsets.push((batch_offset, filter_offset)),
            Instruction::SetInputDepth { depth, input_offset } => self.depth = Some((depth, input_offset)),
            _ => {}
        }
        0
    }
}

#[test]
fn operands_are_element_offsets_and_signed_origins() {
    let params = ConvParams::default().with_padding(1, 1).with_stride(2, 2).with_offsets(128, 0);
    let fx = Fixture::new(6, 2, (4, 4), 3, 2, 3, params);
    let mut rec = Recorder::default();
    fx.offload(&mut rec);

    assert_eq!(rec.depth, Some((3, 128)));
    // out 2x2 per batch, stride 2, pad 1
    assert_eq!(&rec.origins[..4], &[(-1, -1), (1, -1), (-1, 1), (1, 1)]);
    assert_eq!(rec.origins.len(), 8);
    assert_eq!(&rec.offsets[..2], &[(0, 0), (0, 27)]);
    assert_eq!(&rec.offsets[8..10], &[(48, 0), (48, 27)]);
}

#[test]
fn shared_unit_serializes_whole_invocations() {
    let fxs = fixtures();
    let expected: Vec<Vec<i8>> = fxs.iter().map(Fixture::software).collect();
    let shared = SharedCfu::new(SoftCfu::new());

    let results: Vec<Vec<i8>> = std::thread::scope(|s| {
        let handles: Vec<_> = fxs
            .iter()
            .cycle()
            .take(12)
            .map(|fx| {
                let shared = &shared;
                s.spawn(move || {
                    let mut unit = shared.session();
                    fx.offload(&mut *unit)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, out) in results.iter().enumerate() {
        assert_eq!(out, &expected[i % fxs.len()], "invocation {}", i);
    }
    assert!(shared.into_inner().issued() > 0);
}
