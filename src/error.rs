use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong building, configuring, encoding with, or
/// decoding a QB3 stream.
///
/// Maps onto the four error kinds a handle-based API would track in a
/// `last_error` field (`InvalidArgument`, `Format`, `Truncation`,
/// `StateMisuse`): here each is a `Result::Err` returned directly from the
/// call that detected it, so a caller's first `?` stops the pipeline instead
/// of a handle staying "poisoned" for later calls to observe.
#[derive(Debug, Error)]
pub enum Error {
  #[error("width {0} out of range (1..=65536)")]
  InvalidWidth(usize),

  #[error("height {0} out of range (1..=65536)")]
  InvalidHeight(usize),

  #[error("band count {0} out of range (1..=QB3_MAXBANDS)")]
  InvalidBandCount(usize),

  #[error("core band map entry for band {band} points at band {target}, which is not itself a core band")]
  InvalidCoreBand { band: usize, target: usize },

  #[error("quantization step {0} is out of range for the sample type")]
  InvalidQuanta(u64),

  #[error("buffer length {got} does not match the {want} samples the image geometry requires")]
  BufferLength { got: usize, want: usize },

  #[error("missing or incorrect QB3 magic bytes")]
  BadMagic,

  #[error("input ended before the container header/chunks could be read ({available} bytes available, {needed} needed)")]
  HeaderTruncated { available: usize, needed: usize },

  #[error("unknown sample data type code {0}")]
  InvalidDataType(u8),

  #[error("unknown mode code {0}")]
  InvalidModeCode(u8),

  #[error("mode {0:?} is a recognized but unimplemented legacy variant")]
  UnsupportedMode(crate::container::ModeCode),

  #[error("unknown optional section tag {0:?}")]
  UnknownSection([u8; 2]),

  #[error("input ended before block ({x}, {y}) band {band} finished decoding")]
  Truncated { x: usize, y: usize, band: usize },

  #[error("corrupt stream decoding block ({x}, {y}) band {band}: {reason}")]
  Corrupt { x: usize, y: usize, band: usize, reason: &'static str },

  #[error("decoder method called out of order: {0}")]
  StateMisuse(&'static str),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}
