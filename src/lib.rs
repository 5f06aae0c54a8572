// Quantized integer 2-D convolution with an optional accelerator offload path
pub mod cfu;
pub mod error;
pub mod kernels;
pub mod menu;
pub mod params;
pub mod selftest;
pub mod shape;
pub mod tensor;

pub use error::{ConvError, ConvResult};
pub use params::{ChannelQuant, ConvParams, PaddingValues, PerChannelQuant};
pub use shape::RuntimeShape;
pub use tensor::{Tensor, TensorView, TensorViewMut};
