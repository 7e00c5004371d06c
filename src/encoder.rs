use std::marker::PhantomData;

use crate::bitio::BitWriter;
use crate::cfmode::{common_factor, encode_cf};
use crate::coder::encode_group;
use crate::container::{self, DataType, Header, ModeCode};
use crate::decorrelate::{forward_sample, RunningState};
use crate::error::{Error, Result};
use crate::quant::{quantize_signed, quantize_unsigned};
use crate::sample::{width_mask, Sample};
use crate::scan::{BLOCK, GROUP_SIZE, XLUT, YLUT};
use crate::switchcode::write_switch;

const MAX_BANDS: usize = container::MAX_BANDS;

/// Encoder strategy: whether to search for a Common-Factor block encoding
/// (§4.4, §9 "Legacy modes", §11 "encode_fast vs encode_best").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// `encode_fast`: never searches for a common factor.
  #[default]
  Fast,
  /// `encode_best`: tries CF mode for every block and keeps it whenever the
  /// data has one (CF is always no larger than the plain encoding once a
  /// real factor exists).
  Best,
}

impl Mode {
  fn code(self) -> ModeCode {
    match self {
      Mode::Fast => ModeCode::Base,
      Mode::Best => ModeCode::Best,
    }
  }
}

/// A configured QB3 encoder for a fixed raster geometry and sample type.
///
/// Mirrors the abstract `encoder_new` / `encoder_set_*` / `encode` surface
/// of §6.3, implemented as ordinary builder methods returning `Result`
/// rather than boolean/sentinel returns.
pub struct Encoder<T: Sample> {
  width: usize,
  height: usize,
  bands: usize,
  signed: bool,
  cband: Vec<usize>,
  quanta: u64,
  away_from_zero: bool,
  mode: Mode,
  _marker: PhantomData<T>,
}

impl<T: Sample> Encoder<T> {
  pub fn new(width: usize, height: usize, bands: usize, signed: bool) -> Result<Self> {
    if width < BLOCK || width > 65536 {
      return Err(Error::InvalidWidth(width));
    }
    if height < BLOCK || height > 65536 {
      return Err(Error::InvalidHeight(height));
    }
    if bands == 0 || bands > MAX_BANDS {
      return Err(Error::InvalidBandCount(bands));
    }
    Ok(Self {
      width,
      height,
      bands,
      signed,
      cband: (0..bands).collect(),
      quanta: 1,
      away_from_zero: false,
      mode: Mode::Fast,
      _marker: PhantomData,
    })
  }

  /// Sets the band each band is encoded as a difference against.
  /// Out-of-range entries are clamped to identity (self-reference); an
  /// in-range entry that doesn't point at a genuine core band is rejected.
  pub fn set_coreband(&mut self, cband: &[usize]) -> Result<()> {
    if cband.len() != self.bands {
      return Err(Error::BufferLength { got: cband.len(), want: self.bands });
    }
    let resolved: Vec<usize> = cband.iter().enumerate().map(|(c, &t)| if t >= self.bands { c } else { t }).collect();
    for (c, &t) in resolved.iter().enumerate() {
      if t != c && resolved[t] != t {
        return Err(Error::InvalidCoreBand { band: c, target: t });
      }
    }
    self.cband = resolved;
    Ok(())
  }

  pub fn set_quanta(&mut self, q: u64, away_from_zero: bool) -> Result<()> {
    let max_positive = if self.signed { (1u64 << (T::WIDTH - 1)) - 1 } else { width_mask(T::WIDTH) };
    if q < 2 || q > max_positive {
      return Err(Error::InvalidQuanta(q));
    }
    self.quanta = q;
    self.away_from_zero = away_from_zero;
    Ok(())
  }

  pub fn set_mode(&mut self, mode: Mode) {
    self.mode = mode;
  }

  /// Upper bound on encoded size in bytes, per the block-count size bound
  /// (§8 item 7): usable to size a destination buffer up front.
  pub fn max_encoded_size(&self) -> usize {
    let w4 = ceil4(self.width);
    let h4 = ceil4(self.height);
    let count = (w4 * h4 * self.bands) as u64;
    let bps = (T::WIDTH / 8) as u64;
    let bits_num = (128 * bps + 17) * count;
    let bits = (bits_num + 15) / 16;
    let bytes = (bits + 7) / 8;
    1024 + bytes as usize + container::HEADER_LEN + 16
  }

  /// Encodes `src` (band-interleaved, `width * height * bands` samples)
  /// into a formatted-mode stream (§6.1): header, optional `CB`/`QV`
  /// chunks, `DT` marker, then the raw block stream.
  pub fn encode(&mut self, src: &[T]) -> Result<Vec<u8>> {
    let want = self.width * self.height * self.bands;
    if src.len() != want {
      return Err(Error::BufferLength { got: src.len(), want });
    }

    let quantized;
    let image: &[T] = if self.quanta >= 2 {
      quantized = self.quantize_buffer(src);
      &quantized
    } else {
      src
    };

    let raw = self.encode_raw(image)?;

    let mut out = Vec::with_capacity(raw.len() + 64);
    let header = Header { width: self.width as u32, height: self.height as u32, bands: self.bands, dtype: self.dtype(), mode: self.mode.code() };
    container::write_header(&mut out, &header)?;
    if self.quanta >= 2 {
      container::write_quanta_chunk(&mut out, self.quanta)?;
    }
    if self.cband.iter().enumerate().any(|(c, &t)| t != c) {
      container::write_coreband_chunk(&mut out, &self.cband)?;
    }
    container::write_data_marker(&mut out)?;
    out.extend_from_slice(&raw);
    log::debug!("encoded {}x{}x{} ({} bytes raw, {} bytes framed)", self.width, self.height, self.bands, raw.len(), out.len());
    Ok(out)
  }

  /// Encodes `src` as a formatted-mode stream (§6.1) directly into an
  /// `io::Write` sink (a file, socket, or any other byte sink) instead of
  /// returning an owned buffer. Any write failure surfaces as
  /// [`Error::Io`].
  pub fn encode_into<W: std::io::Write>(&mut self, src: &[T], w: &mut W) -> Result<()> {
    let stream = self.encode(src)?;
    w.write_all(&stream)?;
    Ok(())
  }

  /// Encodes `src` as a bare raw block stream (§6.2), with no container
  /// framing.
  pub fn encode_raw(&self, src: &[T]) -> Result<Vec<u8>> {
    let want = self.width * self.height * self.bands;
    if src.len() != want {
      return Err(Error::BufferLength { got: src.len(), want });
    }
    let mut w = BitWriter::with_capacity(self.max_encoded_size());
    let mut state = vec![RunningState::new(T::WIDTH); self.bands];
    let wmask = width_mask(T::WIDTH);
    let switch_bits = T::SWITCH_BITS;

    for_each_block(self.width, self.height, |bx, by| {
      for c in 0..self.bands {
        let core = self.cband[c];
        let mut group = [0u64; GROUP_SIZE];
        for i in 0..GROUP_SIZE {
          let px = bx + XLUT[i];
          let py = by + YLUT[i];
          let idx = (py * self.width + px) * self.bands;
          let mut s = src[idx + c].to_u64();
          if core != c {
            let cs = src[idx + core].to_u64();
            s = s.wrapping_sub(cs) & wmask;
          }
          group[i] = forward_sample(s, &mut state[c].prev, T::WIDTH);
        }

        let rung = crate::coder::group_rung(&group);
        let mut wrote_cf = false;
        if self.mode == Mode::Best && rung >= 1 {
          let cf = common_factor(&group);
          if cf >= 2 {
            let trung = encode_cf(&mut w, &group, cf, state[c].rung, switch_bits);
            state[c].rung = trung;
            wrote_cf = true;
          }
        }
        if !wrote_cf {
          write_switch(&mut w, state[c].rung, rung, switch_bits);
          let actual = encode_group(&mut w, &group);
          state[c].rung = actual;
        }
      }
    });

    Ok(w.finalize())
  }

  fn dtype(&self) -> DataType {
    DataType::of::<T>(self.signed)
  }

  fn quantize_buffer(&self, src: &[T]) -> Vec<T> {
    src
      .iter()
      .map(|&v| {
        if self.signed {
          let signed_v = to_signed(v.to_u64(), T::WIDTH);
          let q = quantize_signed(signed_v, self.quanta as i64, self.away_from_zero);
          T::from_u64(from_signed(q, T::WIDTH))
        } else {
          let q = quantize_unsigned(v.to_u64(), self.quanta, self.away_from_zero);
          T::from_u64(q)
        }
      })
      .collect()
  }
}

fn ceil4(v: usize) -> usize {
  (v + BLOCK - 1) / BLOCK * BLOCK
}

/// Calls `f(block_x, block_y)` for every 4x4 block in raster order,
/// shifting the last row/column back so it covers a full tile when the
/// raster isn't a multiple of 4 (§4.5).
pub(crate) fn for_each_block(width: usize, height: usize, mut f: impl FnMut(usize, usize)) {
  let mut y = 0usize;
  loop {
    let by = if y + BLOCK > height { height - BLOCK } else { y };
    let mut x = 0usize;
    loop {
      let bx = if x + BLOCK > width { width - BLOCK } else { x };
      f(bx, by);
      if bx + BLOCK >= width {
        break;
      }
      x += BLOCK;
    }
    if by + BLOCK >= height {
      break;
    }
    y += BLOCK;
  }
}

pub(crate) fn to_signed(bits: u64, width: u32) -> i64 {
  let shift = 64 - width;
  ((bits << shift) as i64) >> shift
}

pub(crate) fn from_signed(v: i64, width: u32) -> u64 {
  (v as u64) & width_mask(width)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_bad_geometry() {
    assert!(matches!(Encoder::<u8>::new(0, 4, 1, false), Err(Error::InvalidWidth(0))));
    assert!(matches!(Encoder::<u8>::new(4, 4, 0, false), Err(Error::InvalidBandCount(0))));
    assert!(matches!(Encoder::<u8>::new(4, 4, 11, false), Err(Error::InvalidBandCount(11))));
  }

  #[test]
  fn coreband_clamps_out_of_range_and_rejects_bad_reference() {
    let mut enc = Encoder::<u8>::new(4, 4, 3, false).unwrap();
    enc.set_coreband(&[0, 99, 2]).unwrap();
    // entry 1 (99, out of range) clamps to identity (band 1)
    assert_eq!(enc.cband, vec![0, 1, 2]);

    let mut enc2 = Encoder::<u8>::new(4, 4, 3, false).unwrap();
    assert!(enc2.set_coreband(&[1, 2, 0]).is_err()); // none of them self-reference
  }

  #[test]
  fn block_iteration_covers_every_pixel_with_shifted_tail() {
    let (w, h) = (6usize, 5usize);
    let mut covered = vec![false; w * h];
    for_each_block(w, h, |bx, by| {
      for dy in 0..4 {
        for dx in 0..4 {
          covered[(by + dy) * w + (bx + dx)] = true;
        }
      }
    });
    assert!(covered.iter().all(|&c| c));
  }

  #[test]
  fn max_encoded_size_is_not_absurd() {
    let enc = Encoder::<u16>::new(256, 256, 3, false).unwrap();
    let size = enc.max_encoded_size();
    assert!(size > 1024);
    assert!(size < 256 * 256 * 3 * 8);
  }
}
