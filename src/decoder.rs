use std::marker::PhantomData;

use crate::bitio::BitReader;
use crate::cfmode::decode_cf;
use crate::coder::decode_group;
use crate::container::{self, Chunk, DataType, ModeCode};
use crate::decorrelate::{inverse_sample, RunningState};
use crate::encoder::{for_each_block, from_signed, to_signed};
use crate::error::{Error, Result};
use crate::quant::{dequantize_signed, dequantize_unsigned};
use crate::sample::{width_mask, Sample};
use crate::scan::{GROUP_SIZE, XLUT, YLUT};
use crate::switchcode::{read_switch, Switch};

/// Geometry and mode parsed from a formatted stream's fixed header (§6.1),
/// available as soon as `read_start` returns.
struct HeaderInfo {
  width: usize,
  height: usize,
  bands: usize,
  signed: bool,
  mode: ModeCode,
}

/// Coreband map, quantization step and raw-data offset parsed from a
/// formatted stream's optional chunks, available once `read_info` runs.
struct ChunkInfo {
  cband: Vec<usize>,
  quanta: u64,
  data_offset: usize,
}

/// A QB3 decoder for a formatted stream (§6.1), walked through the same
/// `read_start` / `read_info` / `read_data` sequence as the abstract API in
/// §6.3: `read_start` only parses the fixed header, `read_info` parses the
/// optional chunks that follow it, and `read_data` decodes the raw block
/// stream. Calling `read_data` before `read_info` has run is a misuse of the
/// API (§7) rather than a malformed-input condition, since the header alone
/// can't tell a caller where the raw data begins.
pub struct Decoder<'a, T: Sample> {
  buf: &'a [u8],
  header: HeaderInfo,
  info: Option<ChunkInfo>,
  _marker: PhantomData<T>,
}

/// A decoder for a bare raw block stream (§6.2), where geometry is known out
/// of band and there is no container header or chunk sequence to walk.
pub struct RawDecoder<T: Sample> {
  width: usize,
  height: usize,
  bands: usize,
  signed: bool,
  cband: Vec<usize>,
  quanta: u64,
  mode: ModeCode,
  _marker: PhantomData<T>,
}

impl<T: Sample> RawDecoder<T> {
  /// Builds a decoder for a bare raw block stream (§6.2), where geometry is
  /// known out of band (no container header to read).
  pub fn new_raw(width: usize, height: usize, bands: usize, signed: bool) -> Result<Self> {
    if width < crate::scan::BLOCK || width > 65536 {
      return Err(Error::InvalidWidth(width));
    }
    if height < crate::scan::BLOCK || height > 65536 {
      return Err(Error::InvalidHeight(height));
    }
    if bands == 0 || bands > container::MAX_BANDS {
      return Err(Error::InvalidBandCount(bands));
    }
    Ok(Self {
      width,
      height,
      bands,
      signed,
      cband: (0..bands).collect(),
      quanta: 1,
      mode: ModeCode::Base,
      _marker: PhantomData,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }
  pub fn height(&self) -> usize {
    self.height
  }
  pub fn bands(&self) -> usize {
    self.bands
  }

  /// Decodes a raw block stream into `dst` (band-interleaved, `width *
  /// height * bands` samples).
  pub fn decode(&self, data: &[u8], dst: &mut [T]) -> Result<()> {
    decode_blocks(
      data,
      dst,
      self.width,
      self.height,
      self.bands,
      self.signed,
      self.mode,
      self.quanta,
      &self.cband,
    )
  }
}

impl<'a, T: Sample> Decoder<'a, T> {
  /// Parses a formatted stream's fixed header (§6.1) only. The returned
  /// decoder knows geometry and mode but not yet where the raw block stream
  /// begins; call `read_info` before `read_data`.
  pub fn read_start(buf: &'a [u8]) -> Result<Self> {
    let header = container::read_header(buf)?;
    if header.dtype.width() != T::WIDTH {
      return Err(Error::InvalidDataType(header.dtype.code()));
    }
    let signed = matches!(header.dtype, DataType::I8 | DataType::I16 | DataType::I32 | DataType::I64);
    Ok(Self {
      buf,
      header: HeaderInfo {
        width: header.width as usize,
        height: header.height as usize,
        bands: header.bands,
        signed,
        mode: header.mode,
      },
      info: None,
      _marker: PhantomData,
    })
  }

  /// Parses the optional chunks following the fixed header (coreband map,
  /// quantization step) up through the `DT` marker, recording where the raw
  /// block stream begins. Must be called once before `read_data`.
  pub fn read_info(&mut self) -> Result<()> {
    let bands = self.header.bands;
    let mut pos = container::HEADER_LEN;
    let mut quanta = 1u64;
    let mut cband: Vec<usize> = (0..bands).collect();
    let data_offset;
    loop {
      let (chunk, next) = container::read_chunk(self.buf, pos)?;
      match chunk {
        Chunk::Quanta(q) => quanta = q,
        Chunk::CoreBand(bytes) => {
          if bytes.len() != bands {
            return Err(Error::BufferLength { got: bytes.len(), want: bands });
          }
          cband = bytes.iter().map(|&b| (b as usize).min(bands - 1)).collect();
        }
        Chunk::Data => {
          data_offset = next;
          break;
        }
        Chunk::Unknown(tag, _) => {
          log::warn!("skipping unrecognized container section {tag:?}");
        }
      }
      pos = next;
    }
    self.info = Some(ChunkInfo { cband, quanta, data_offset });
    Ok(())
  }

  pub fn width(&self) -> usize {
    self.header.width
  }
  pub fn height(&self) -> usize {
    self.header.height
  }
  pub fn bands(&self) -> usize {
    self.header.bands
  }

  /// Decodes the raw block stream into `dst` (band-interleaved, `width *
  /// height * bands` samples). Returns `Error::StateMisuse` if `read_info`
  /// hasn't been called yet, since only it knows where the raw data starts.
  pub fn read_data(&self, dst: &mut [T]) -> Result<()> {
    let info = self.info.as_ref().ok_or(Error::StateMisuse("read_data called before read_info"))?;
    let data = &self.buf[info.data_offset..];
    decode_blocks(
      data,
      dst,
      self.header.width,
      self.header.height,
      self.header.bands,
      self.header.signed,
      self.header.mode,
      info.quanta,
      &info.cband,
    )
  }
}

#[allow(clippy::too_many_arguments)]
fn decode_blocks<T: Sample>(
  data: &[u8],
  dst: &mut [T],
  width: usize,
  height: usize,
  bands: usize,
  signed: bool,
  mode: ModeCode,
  quanta: u64,
  cband: &[usize],
) -> Result<()> {
  if !mode.is_implemented() {
    return Err(Error::UnsupportedMode(mode));
  }
  let want = width * height * bands;
  if dst.len() != want {
    return Err(Error::BufferLength { got: dst.len(), want });
  }

  let mut r = BitReader::new(data);
  let mut state = vec![RunningState::new(T::WIDTH); bands];
  let switch_bits = T::SWITCH_BITS;
  let wmask = width_mask(T::WIDTH);

  let mut decode_err: Option<Error> = None;
  for_each_block(width, height, |bx, by| {
    if decode_err.is_some() {
      return;
    }
    let mut block_vals = vec![[0u64; GROUP_SIZE]; bands];
    for c in 0..bands {
      if r.bits_remaining() == 0 {
        decode_err = Some(Error::Truncated { x: bx, y: by, band: c });
        return;
      }
      let group = match read_switch(&mut r, state[c].rung, switch_bits) {
        Switch::Rung(rung) => {
          state[c].rung = rung;
          decode_group(&mut r, rung)
        }
        Switch::Signal => match decode_cf(&mut r, state[c].rung, switch_bits) {
          Ok((group, trung)) => {
            state[c].rung = trung;
            group
          }
          Err(mut e) => {
            if let Error::Corrupt { x, y, band, .. } = &mut e {
              *x = bx;
              *y = by;
              *band = c;
            }
            decode_err = Some(e);
            return;
          }
        },
      };
      // `BitReader` zero-extends past the end of the buffer rather than
      // failing, so a truncated stream can otherwise decode "successfully"
      // into garbage; `overran()` is how the driver notices it happened.
      if r.overran() {
        decode_err = Some(Error::Truncated { x: bx, y: by, band: c });
        return;
      }
      for i in 0..GROUP_SIZE {
        block_vals[c][i] = inverse_sample(group[i], &mut state[c].prev, T::WIDTH);
      }
    }

    for c in 0..bands {
      let core = cband[c];
      if core == c {
        continue;
      }
      for i in 0..GROUP_SIZE {
        block_vals[c][i] = block_vals[c][i].wrapping_add(block_vals[core][i]) & wmask;
      }
    }

    for c in 0..bands {
      for i in 0..GROUP_SIZE {
        let px = bx + XLUT[i];
        let py = by + YLUT[i];
        let idx = (py * width + px) * bands + c;
        dst[idx] = T::from_u64(block_vals[c][i]);
      }
    }
  });
  if let Some(e) = decode_err {
    return Err(e);
  }

  if quanta >= 2 {
    dequantize_buffer::<T>(dst, signed, quanta);
  }
  Ok(())
}

fn dequantize_buffer<T: Sample>(dst: &mut [T], signed: bool, quanta: u64) {
  for v in dst.iter_mut() {
    if signed {
      let min = -(1i64 << (T::WIDTH - 1));
      let max = (1i64 << (T::WIDTH - 1)) - 1;
      let signed_v = to_signed(v.to_u64(), T::WIDTH);
      let back = dequantize_signed(signed_v, quanta as i64, min, max);
      *v = T::from_u64(from_signed(back, T::WIDTH));
    } else {
      let max = width_mask(T::WIDTH);
      let back = dequantize_unsigned(v.to_u64(), quanta, max);
      *v = T::from_u64(back);
    }
  }
}
