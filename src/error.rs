use thiserror::Error;

/// Contract violations detected before a convolution runs.
///
/// The kernels treat any of these as fatal and panic with the message;
/// `kernels::check_narrow` / `kernels::check_wide` return them as values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvError {
    #[error("{tensor} tensor must be rank 4, got rank {rank}")]
    Rank { tensor: &'static str, rank: usize },

    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("input depth {input_depth} is not a multiple of filter input depth {filter_depth}")]
    DepthNotDivisible { input_depth: usize, filter_depth: usize },

    #[error("output depth {output_depth} is not a multiple of group count {groups}")]
    GroupsNotDivisible { output_depth: usize, groups: usize },

    #[error("grouped convolution is not supported on the 8-bit path ({groups} groups)")]
    GroupedUnsupported { groups: usize },

    #[error("dilation {height}x{width} is not supported on the 8-bit path")]
    DilationUnsupported { height: i32, width: i32 },

    #[error("stride and dilation must be positive (stride {stride_h}x{stride_w}, dilation {dilation_h}x{dilation_w})")]
    InvalidStep { stride_h: i32, stride_w: i32, dilation_h: i32, dilation_w: i32 },

    #[error("activation range [{min}, {max}] is empty or outside [{lo}, {hi}]")]
    ActivationRange { min: i32, max: i32, lo: i32, hi: i32 },

    #[error("{what} buffer too small: need {required}, have {available}")]
    BufferTooSmall { what: &'static str, required: usize, available: usize },

    #[error("{what} spans {elements} elements, beyond 32-bit indexing")]
    TooLarge { what: &'static str, elements: usize },

    #[error("output multiplier {multiplier} of channel {channel} is negative")]
    NegativeMultiplier { channel: usize, multiplier: i32 },

    #[error("output shift {shift} of channel {channel} is outside [{min}, {max}]")]
    ShiftRange { channel: usize, shift: i32, min: i32, max: i32 },

    #[error("{what} {value} is outside [{lo}, {hi}]")]
    OffsetRange { what: &'static str, value: i32, lo: i32, hi: i32 },
}

pub type ConvResult<T> = Result<T, ConvError>;
