//! The rung-switch prefix that opens every block: a short code for
//! `delta = (new_rung - prev_rung) mod width`, plus the reserved `SIGNAL`
//! codeword that the CF mode substitutes in place of a genuine rung change
//! (§4.3 "Rung-switch prefix", §4.4 "CFMode").
//!
//! `delta = 0` is a single zero bit. Any other delta is a one bit followed
//! by a three-length codeword (reusing [`crate::coder::write_value`] at a
//! virtual rung of `switch_bits - 1`) for `delta - 1`. Since `width = 2^U`
//! for every supported sample width, that codeword's domain is exactly
//! `[0, width)`, one value wider than the `width - 1` genuine nonzero
//! deltas need — the unused top value, `delta - 1 == width - 1`, is SIGNAL.

use crate::bitio::{BitReader, BitWriter};
use crate::coder::{read_value, value_len, write_value};

/// Writes the switch prefix for a genuine rung transition.
pub fn write_switch(w: &mut BitWriter, prev_rung: u32, new_rung: u32, switch_bits: u32) {
  let width = 1u32 << switch_bits;
  let delta = (new_rung + width - prev_rung) % width;
  write_delta(w, delta, switch_bits);
}

/// Writes the reserved SIGNAL codeword in place of a rung switch. This is
/// the one payload `write_delta`'s `delta - 1` encoding never produces
/// (genuine deltas only ever need payloads `0..width-2`), so it must be
/// written directly rather than by routing `width - 1` through
/// `write_delta`, which would subtract again and collide with the payload
/// for delta `width - 1`.
pub fn write_signal(w: &mut BitWriter, switch_bits: u32) {
  let width = 1u32 << switch_bits;
  w.push_bit(1);
  write_value(w, (width - 1) as u64, switch_bits - 1);
}

fn write_delta(w: &mut BitWriter, delta: u32, switch_bits: u32) {
  if delta == 0 {
    w.push_bit(0);
    return;
  }
  w.push_bit(1);
  write_value(w, (delta - 1) as u64, switch_bits - 1);
}

/// Number of bits [`write_switch`]/[`write_signal`] would emit.
pub fn switch_len(delta: u32, switch_bits: u32) -> u32 {
  if delta == 0 {
    1
  } else {
    1 + value_len((delta - 1) as u64, switch_bits - 1)
  }
}

/// Result of reading a switch prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
  /// A genuine rung transition to the given new rung.
  Rung(u32),
  /// The reserved SIGNAL codeword (CF mode follows).
  Signal,
}

/// Reads a switch prefix and resolves it against `prev_rung`.
pub fn read_switch(r: &mut BitReader, prev_rung: u32, switch_bits: u32) -> Switch {
  let width = 1u32 << switch_bits;
  if r.get() == 0 {
    return Switch::Rung(prev_rung);
  }
  let x = read_value(r, switch_bits - 1) as u32;
  if x == width - 1 {
    return Switch::Signal;
  }
  let delta = x + 1;
  Switch::Rung((prev_rung + delta) % width)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_delta_round_trips_for_every_width() {
    for switch_bits in [3u32, 4, 5, 6] {
      let width = 1u32 << switch_bits;
      for prev in 0..width {
        for new in 0..width {
          let mut w = BitWriter::new();
          write_switch(&mut w, prev, new, switch_bits);
          let bytes = w.finalize();
          let mut r = BitReader::new(&bytes);
          assert_eq!(read_switch(&mut r, prev, switch_bits), Switch::Rung(new));
        }
      }
    }
  }

  #[test]
  fn signal_is_distinguishable_from_every_delta() {
    for switch_bits in [3u32, 4, 5, 6] {
      let width = 1u32 << switch_bits;
      let mut w = BitWriter::new();
      write_signal(&mut w, switch_bits);
      let bytes = w.finalize();
      let mut r = BitReader::new(&bytes);
      assert_eq!(read_switch(&mut r, 0, switch_bits), Switch::Signal);
      for prev in 0..width {
        let mut w2 = BitWriter::new();
        write_switch(&mut w2, prev, prev, switch_bits);
        // delta == 0 path never collides with SIGNAL (SIGNAL always sets
        // the leading bit).
        let bytes2 = w2.finalize();
        assert_eq!(bytes2.first().copied().unwrap_or(0) & 1, 0);
      }
    }
  }
}
