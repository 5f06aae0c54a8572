pub mod conv_i16;
pub mod conv_i8;
pub mod geometry;
pub mod rescale;
pub mod unpack;

pub use conv_i16::{conv_per_channel_i16, conv_per_channel_i16_par};
pub use conv_i8::{
    conv_per_channel_i8, conv_per_channel_i8_offload, conv_per_channel_i8_par, conv_per_channel_packed_i4,
    conv_per_channel_packed_i4_offload,
};
pub use geometry::{check_narrow, check_wide, ConvGeometry};
pub use rescale::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64, AccumScalar};
pub use unpack::{pack_dense_i4, unpack_dense_i4};
