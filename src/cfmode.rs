//! Common-Factor (CF) mode: an alternative block encoding the encoder may
//! pick when every MagSign value in a group shares an integer factor >= 2
//! (§4.4). The group is divided down, coded at its own ("data") rung, and
//! the factor is carried alongside; the decoder multiplies back up.
//!
//! This reimplements the documented algorithm from scratch rather than
//! reusing the reference implementation's packed switch/codeword tables
//! (those exist to share lookup tables with the non-CF path at the bit
//! level; our [`crate::switchcode`] and [`crate::coder`] primitives are
//! already reusable directly, so the CF-specific framing only needs one
//! explicit flag bit to choose between the single-rung and dual-rung
//! layouts instead of stealing a bit out of the switch codeword).

use crate::bitio::{BitReader, BitWriter};
use crate::coder::{decode_group, encode_group, group_rung, read_value, topbit, write_value};
use crate::error::{Error, Result};
use crate::magsign::magsabs;
use crate::scan::GROUP_SIZE;
use crate::switchcode::{read_switch, write_signal, write_switch, Switch};

/// Greatest common factor of the absolute MagSign values in `group`,
/// ignoring zeros. Returns 1 (meaning "no usable factor") if fewer than two
/// nonzero values remain, or as soon as a value of absolute 1 is seen.
pub fn common_factor(group: &[u64; GROUP_SIZE]) -> u64 {
  let mut vals: Vec<u64> = group.iter().map(|&v| magsabs(v)).filter(|&a| a > 0).collect();
  if vals.is_empty() {
    return 1;
  }
  loop {
    let (mut m, mut idx) = (vals[0], 0usize);
    for (i, &v) in vals.iter().enumerate().skip(1) {
      if v < m {
        m = v;
        idx = i;
      }
    }
    if m == 1 {
      return 1;
    }
    vals.swap(0, idx);
    let mut next = vec![m];
    for &v in &vals[1..] {
      let r = v % m;
      if r > 0 {
        next.push(r);
      }
    }
    if next.len() == 1 {
      return next[0];
    }
    vals = next;
  }
}

fn magsdiv(val: u64, cf: u64) -> u64 {
  ((magsabs(val) / cf) << 1).wrapping_sub(val & 1)
}

fn magsmul(val: u64, cf: u64) -> u64 {
  (magsabs(val) * (cf << 1)).wrapping_sub(val & 1)
}

/// Encodes `group` in CF mode given a factor already known to be >= 2.
/// Returns the rung the running state should remember (`trung`).
pub fn encode_cf(w: &mut BitWriter, group: &[u64; GROUP_SIZE], cf: u64, prev_rung: u32, switch_bits: u32) -> u32 {
  debug_assert!(cf >= 2);
  let reduced: [u64; GROUP_SIZE] = std::array::from_fn(|i| magsdiv(group[i], cf));
  let trung = group_rung(&reduced);

  write_signal(w, switch_bits);
  write_switch(w, prev_rung, trung, switch_bits);

  let cf2 = cf - 2;
  let cfrung = topbit(cf2 | 1);
  if cfrung <= trung {
    w.push_bit(0); // single-rung layout
    if trung == 0 {
      w.push_bit(cf2);
    } else {
      write_value(w, cf2, trung);
    }
  } else {
    w.push_bit(1); // dual-rung layout
    write_switch(w, trung, cfrung, switch_bits);
    if cfrung == 0 {
      w.push_bit(cf2);
    } else {
      write_value(w, cf2, cfrung);
    }
  }

  let body_rung = encode_group(w, &reduced);
  debug_assert_eq!(body_rung, trung);
  trung
}

/// Decodes a CF-mode block body, having already consumed the SIGNAL switch
/// codeword that introduced it. Returns the reconstructed group and the
/// rung the running state should remember (`trung`).
pub fn decode_cf(r: &mut BitReader, prev_rung: u32, switch_bits: u32) -> Result<([u64; GROUP_SIZE], u32)> {
  let trung = match read_switch(r, prev_rung, switch_bits) {
    Switch::Rung(x) => x,
    Switch::Signal => return Err(contradiction("nested CF signal reading data rung")),
  };

  let dual = r.get() == 1;
  let (cfrung, cf2) = if !dual {
    let cfrung = trung;
    let cf2 = if trung == 0 { r.get() } else { read_value(r, trung) };
    (cfrung, cf2)
  } else {
    let cfrung = match read_switch(r, trung, switch_bits) {
      Switch::Rung(x) => x,
      Switch::Signal => return Err(contradiction("nested CF signal reading cf rung")),
    };
    if cfrung == trung {
      return Err(contradiction("dual-rung CF declared a cf rung equal to the data rung"));
    }
    let cf2 = if cfrung == 0 { r.get() } else { read_value(r, cfrung) };
    (cfrung, cf2)
  };
  let _ = cfrung;
  let cf = cf2 + 2;

  let reduced = decode_group(r, trung);
  let group: [u64; GROUP_SIZE] = std::array::from_fn(|i| magsmul(reduced[i], cf));
  Ok((group, trung))
}

fn contradiction(reason: &'static str) -> Error {
  Error::Corrupt { x: 0, y: 0, band: 0, reason }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn common_factor_of_uniform_evens() {
    // mags(2)=4, mags(4)=8, mags(6)=12, mags(-2)=3... pick simple positives.
    let group: [u64; GROUP_SIZE] = std::array::from_fn(|i| ((i as u64 % 4) + 1) * 4);
    let g = common_factor(&group);
    assert!(g >= 2);
    for &v in &group {
      assert_eq!(magsabs(v) % g, 0);
    }
  }

  #[test]
  fn common_factor_is_one_when_a_unit_value_present() {
    let mut group = [6u64; GROUP_SIZE];
    group[3] = 2; // magsabs(2) == 1
    assert_eq!(common_factor(&group), 1);
  }

  #[test]
  fn cf_round_trips_single_rung() {
    let group: [u64; GROUP_SIZE] = std::array::from_fn(|i| ((i as u64 % 5) + 1) * 6);
    let cf = common_factor(&group);
    assert!(cf >= 2);
    let mut w = BitWriter::new();
    let trung = encode_cf(&mut w, &group, cf, 5, 4);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    assert_eq!(read_switch(&mut r, 5, 4), Switch::Signal);
    let (back, got_trung) = decode_cf(&mut r, 5, 4).unwrap();
    assert_eq!(got_trung, trung);
    assert_eq!(back, group);
  }

  #[test]
  fn cf_round_trips_trung_zero() {
    // every reduced value in {0,1}: original values all equal to the same
    // common factor or twice it, e.g. mags domain {0,1} after division.
    let group = [8u64; GROUP_SIZE]; // magsabs(8)=4, cf=4 -> reduced magsabs=1
    let cf = common_factor(&group);
    let mut w = BitWriter::new();
    encode_cf(&mut w, &group, cf, 3, 6);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    assert_eq!(read_switch(&mut r, 3, 6), Switch::Signal);
    let (back, _) = decode_cf(&mut r, 3, 6).unwrap();
    assert_eq!(back, group);
  }

  #[test]
  fn cf_round_trips_dual_rung() {
    // force a large common factor so cf-2 needs more bits than trung carries.
    let group: [u64; GROUP_SIZE] = std::array::from_fn(|i| if i == 0 { 2000 } else { 0 });
    let cf = common_factor(&group);
    assert!(cf >= 2);
    let mut w = BitWriter::new();
    let trung = encode_cf(&mut w, &group, cf, 0, 6);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    assert_eq!(read_switch(&mut r, 0, 6), Switch::Signal);
    let (back, got_trung) = decode_cf(&mut r, 0, 6).unwrap();
    assert_eq!(got_trung, trung);
    assert_eq!(back, group);
  }
}
