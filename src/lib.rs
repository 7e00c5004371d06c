//! QB3: a lossless, optionally quantized codec for multi-band raster integer
//! data (imagery tiles, scientific rasters, terrain).
//!
//! The core of the crate is the 4x4 block encoder/decoder (`coder`,
//! `cfmode`, `switchcode`) and the transforms that feed it (`magsign`,
//! `decorrelate`, `scan`). `encoder`/`decoder` drive those over a whole
//! raster, and `container` frames the result with a fixed header so streams
//! are self-describing on disk (§6 of the design spec). `quant` implements
//! the optional lossy pre/post step.
//!
//! Only the safe, in-process Rust API is exposed here: the C ABI, CLI,
//! image-format adapters and wasm front-end that a full QB3 distribution
//! would also ship are explicitly out of scope (see `DESIGN.md`).

pub mod bitio;
pub mod cfmode;
pub mod coder;
pub mod container;
pub mod decorrelate;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod magsign;
pub mod quant;
pub mod sample;
pub mod scan;
pub mod switchcode;

pub use container::{DataType, ModeCode};
pub use decoder::{Decoder, RawDecoder};
pub use encoder::{Encoder, Mode};
pub use error::{Error, Result};
pub use sample::Sample;
