use anyhow::{bail, Context, Result};
use clap::Parser;
use qconv::cfu::SoftCfu;
use qconv::kernels::{
    conv_per_channel_i16, conv_per_channel_i16_par, conv_per_channel_i8, conv_per_channel_i8_offload,
    conv_per_channel_i8_par, conv_per_channel_packed_i4, pack_dense_i4,
};
use qconv::{ConvParams, PerChannelQuant, RuntimeShape, Tensor};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qconv-bench", version, about = "Time the quantized convolution variants")]
struct Args {
    /// Variant: all, i8, i8-par, i8-offload, i4, i16, i16-par
    #[arg(long, default_value = "all")]
    variant: String,

    /// Input height and width
    #[arg(long, default_value_t = 32)]
    size: usize,

    /// Input channels
    #[arg(long, default_value_t = 16)]
    depth: usize,

    /// Output channels
    #[arg(long, default_value_t = 16)]
    out_depth: usize,

    /// Square filter side
    #[arg(long, default_value_t = 3)]
    filter: usize,

    /// Timed iterations per variant
    #[arg(long, default_value_t = 20)]
    iters: usize,

    /// Threads for the parallel variants (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

const VARIANTS: &[&str] = &["i8", "i8-par", "i8-offload", "i4", "i16", "i16-par"];

struct Workload {
    params: ConvParams,
    wide_params: ConvParams,
    quant: PerChannelQuant,
    input: Tensor<i8>,
    wide_input: Tensor<i16>,
    filter: Tensor<i8>,
    packed: Vec<u8>,
    bias: Vec<i32>,
    wide_bias: Vec<i64>,
    output: RuntimeShape,
}

impl Workload {
    fn new(args: &Args) -> Self {
        let mut rng = SmallRng::seed_from_u64(1);
        let pad = (args.filter / 2) as i32;
        let input_shape = RuntimeShape::d4(1, args.size, args.size, args.depth);
        let filter_shape = RuntimeShape::d4(args.out_depth, args.filter, args.filter, args.depth);
        let input = Tensor::from_vec(input_shape.clone(), (0..input_shape.flat_size()).map(|_| rng.gen()).collect());
        let wide_input = Tensor::from_vec(input_shape.clone(), (0..input_shape.flat_size()).map(|_| rng.gen()).collect());
        let filter = Tensor::from_vec(filter_shape.clone(), (0..filter_shape.flat_size()).map(|_| rng.gen_range(-8..=7)).collect());
        let packed = pack_dense_i4(&filter.data);
        let out_side = args.size + 2 * pad as usize - args.filter + 1;
        Self {
            params: ConvParams::default().with_padding(pad, pad).with_offsets(128, -3),
            wide_params: ConvParams::wide().with_padding(pad, pad),
            quant: PerChannelQuant::from_scales(0.02, &vec![0.01; args.out_depth], 0.5),
            input,
            wide_input,
            filter,
            packed,
            bias: (0..args.out_depth as i32).collect(),
            wide_bias: (0..args.out_depth as i64).collect(),
            output: RuntimeShape::d4(1, out_side, out_side, args.out_depth),
        }
    }

    fn run(&self, variant: &str) {
        let q = self.quant.as_view();
        match variant {
            "i8" => {
                let mut out = Tensor::<i8>::zeros(self.output.clone());
                conv_per_channel_i8(&self.params, q, self.input.view(), self.filter.view(), Some(self.bias.as_slice()), out.view_mut());
            }
            "i8-par" => {
                let mut out = Tensor::<i8>::zeros(self.output.clone());
                conv_per_channel_i8_par(&self.params, q, self.input.view(), self.filter.view(), Some(self.bias.as_slice()), out.view_mut());
            }
            "i8-offload" => {
                let mut out = Tensor::<i8>::zeros(self.output.clone());
                let mut cfu = SoftCfu::new();
                conv_per_channel_i8_offload(&self.params, q, self.input.view(), self.filter.view(), Some(self.bias.as_slice()), out.view_mut(), &mut cfu);
            }
            "i4" => {
                let mut out = Tensor::<i8>::zeros(self.output.clone());
                let mut scratch = vec![0i8; self.filter.shape.flat_size()];
                conv_per_channel_packed_i4(&self.params, q, self.input.view(), &self.filter.shape, &self.packed, &mut scratch, Some(self.bias.as_slice()), out.view_mut());
            }
            "i16" => {
                let mut out = Tensor::<i16>::zeros(self.output.clone());
                conv_per_channel_i16::<i64>(&self.wide_params, q, self.wide_input.view(), self.filter.view(), Some(self.wide_bias.as_slice()), out.view_mut());
            }
            "i16-par" => {
                let mut out = Tensor::<i16>::zeros(self.output.clone());
                conv_per_channel_i16_par::<i64>(&self.wide_params, q, self.wide_input.view(), self.filter.view(), Some(self.wide_bias.as_slice()), out.view_mut());
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.size == 0 || args.filter == 0 { bail!("--size and --filter must be positive"); }
    let variants: Vec<&str> = if args.variant == "all" {
        VARIANTS.to_vec()
    } else if VARIANTS.contains(&args.variant.as_str()) {
        vec![args.variant.as_str()]
    } else {
        bail!("unknown variant '{}'", args.variant);
    };

    let work = Workload::new(&args);
    let macs = work.output.flat_size() * args.filter * args.filter * args.depth;
    let pool = if args.threads > 0 {
        Some(rayon::ThreadPoolBuilder::new().num_threads(args.threads).build().context("build rayon pool")?)
    } else {
        None
    };
    for v in variants {
        work.run(v);
        let t0 = Instant::now();
        for _ in 0..args.iters {
            match &pool {
                Some(p) => p.install(|| work.run(v)),
                None => work.run(v),
            }
        }
        let dt = t0.elapsed().as_secs_f64();
        let per_iter = if args.iters > 0 { dt / args.iters as f64 } else { 0.0 };
        let gmacs = if per_iter > 0.0 { macs as f64 / per_iter / 1e9 } else { 0.0 };
        println!("variant={} iters={} elapsed={:.3}s per_iter={:.1}us gmacs={:.3}", v, args.iters, dt, per_iter * 1e6, gmacs);
    }
    Ok(())
}
