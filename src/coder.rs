//! The block coder: rung selection, step-down normalization, and the
//! three-length codeword family used both for group bodies and for the
//! rung-switch prefix that opens every block.

use crate::bitio::{BitReader, BitWriter};
use crate::scan::GROUP_SIZE;

/// Index of the top set bit; `val` must be non-zero.
#[inline]
pub fn topbit(val: u64) -> u32 {
  63 - val.leading_zeros()
}

/// `topbit(max(group) | 1)`, i.e. the rung a 4x4 group of MagSign values
/// would be coded at.
pub fn group_rung(group: &[u64; GROUP_SIZE]) -> u32 {
  let maxv = group.iter().copied().max().unwrap_or(0);
  topbit(maxv | 1)
}

/// Detects a `1^k 0^(16-k)` pattern in the rung bit of every group element.
/// Returns `k` (1..=16) on a match, `16` for the degenerate all-bits-zero
/// probe used on the decode side, or `17` if no such pattern exists.
///
/// Mirrors the reference `step()`: `s == 0` is itself a valid match (the
/// all-ones pattern, `k = 16`), it is not "no step" despite how that case
/// reads in prose form.
fn step_scan(group: &[u64; GROUP_SIZE], rung: u32) -> u32 {
  let mut acc: u64 = !0u64;
  for &v in group {
    acc = (acc << 1) | ((v >> rung) & 1);
  }
  let acc = !acc;
  let s = acc.count_ones();
  if s == 0 {
    return 16;
  }
  if topbit(acc) != s - 1 {
    return 17;
  }
  16 - s
}

/// Step-down position to flip when encoding a fresh (pre-flip) group, or
/// `None` if the rung bits don't form a clean prefix of ones.
fn step_down_index(group: &[u64; GROUP_SIZE], rung: u32) -> Option<usize> {
  match step_scan(group, rung) {
    m @ 1..=16 => Some((m - 1) as usize),
    _ => None,
  }
}

/// Step-down position to undo on the decode side (probing the already
/// decoded, possibly-flipped group), or `None` if no flip was applied.
fn step_up_index(group: &[u64; GROUP_SIZE], rung: u32) -> Option<usize> {
  match step_scan(group, rung) {
    m @ 0..=15 => Some(m as usize),
    _ => None,
  }
}

/// Writes `v` (known to fit in `rung + 1` bits) using the three-length
/// codeword family: SHORT (`rung` bits), NOMINAL (`rung+1` bits), or LONG
/// (`rung+2` bits). `rung` must be >= 1.
pub fn write_value(w: &mut BitWriter, v: u64, rung: u32) {
  debug_assert!(rung >= 1 && rung <= 63);
  let top = v >> rung;
  let nxt = (v >> (rung - 1)) & 1;
  if top == 0 && nxt == 0 {
    w.push(v << 1, rung);
  } else if top == 0 {
    let code = (((v << 1) ^ (1u64 << rung)) << 1) | 1;
    w.push(code, rung + 1);
  } else if rung < 63 {
    let code = ((v ^ (1u64 << rung)) << 2) | 3;
    w.push(code, rung + 2);
  } else {
    // rung == 63: the LONG codeword needs 65 bits, one more than a u64
    // push can hold in one call, so the top bit is pushed separately.
    let rem = v ^ (1u64 << 63);
    let extra_bit = (rem >> 62) & 1;
    let low64 = (rem << 2) | 3;
    w.push(low64, 64);
    w.push_bit(extra_bit);
  }
}

/// Inverse of [`write_value`].
pub fn read_value(r: &mut BitReader, rung: u32) -> u64 {
  debug_assert!(rung >= 1 && rung <= 63);
  let mask = if rung >= 64 { u64::MAX } else { (1u64 << rung) - 1 };
  let val = r.peek();
  if val & 1 == 0 {
    r.advance(rung);
    (val & mask) >> 1
  } else if val & 2 == 0 {
    r.advance(rung + 1);
    ((val >> 2) & mask) | (1u64 << (rung - 1))
  } else if rung < 63 {
    r.advance(rung + 2);
    ((val >> 2) & mask) | (1u64 << rung)
  } else {
    r.advance(64);
    let extra_bit = r.get();
    let rem = (val >> 2) | (extra_bit << 62);
    rem | (1u64 << 63)
  }
}

/// Number of bits [`write_value`] would emit for `v` at `rung`.
pub fn value_len(v: u64, rung: u32) -> u32 {
  let top = v >> rung;
  let nxt = (v >> (rung - 1)) & 1;
  if top == 0 && nxt == 0 {
    rung
  } else if top == 0 {
    rung + 1
  } else if rung < 63 {
    rung + 2
  } else {
    65
  }
}

/// Encodes a 4x4 group of MagSign values, applying step-down when the rung
/// bit pattern permits it. Returns the rung the switch prefix must carry
/// (the *unflipped* rung, per the spec's rung definition).
pub fn encode_group(w: &mut BitWriter, group: &[u64; GROUP_SIZE]) -> u32 {
  let rung = group_rung(group);
  if rung == 0 {
    let any_one = group.iter().any(|&v| v == 1);
    w.push_bit(any_one as u64);
    if any_one {
      for &v in group {
        w.push_bit(v);
      }
    }
    return rung;
  }
  let mut g = *group;
  if let Some(k) = step_down_index(group, rung) {
    g[k] ^= 1u64 << rung;
  }
  for &v in &g {
    write_value(w, v, rung);
  }
  rung
}

/// Decodes a 4x4 group at the given rung, undoing step-down if present.
pub fn decode_group(r: &mut BitReader, rung: u32) -> [u64; GROUP_SIZE] {
  let mut g = [0u64; GROUP_SIZE];
  if rung == 0 {
    if r.get() == 1 {
      for slot in g.iter_mut() {
        *slot = r.get();
      }
    }
    return g;
  }
  for slot in g.iter_mut() {
    *slot = read_value(r, rung);
  }
  if (g[GROUP_SIZE - 1] >> rung) & 1 == 0 {
    if let Some(k) = step_up_index(&g, rung) {
      g[k] ^= 1u64 << rung;
    }
  }
  g
}

/// Worst-case bits [`encode_group`] can emit for the given rung (used for
/// `max_encoded_size`).
pub fn group_max_bits(rung: u32) -> usize {
  if rung == 0 {
    1 + GROUP_SIZE
  } else if rung == 63 {
    GROUP_SIZE * 65
  } else {
    GROUP_SIZE * (rung as usize + 2)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn value_round_trips_every_rung_and_value() {
    for rung in 1..=20u32 {
      for v in 0..(1u64 << (rung + 1)) {
        let mut w = BitWriter::new();
        write_value(&mut w, v, rung);
        assert_eq!(w.bit_len() as u32, value_len(v, rung));
        let bytes = w.finalize();
        let mut r = BitReader::new(&bytes);
        assert_eq!(read_value(&mut r, rung), v, "rung={rung} v={v}");
        assert_eq!(r.bit_pos(), value_len(v, rung) as usize);
      }
    }
  }

  #[test]
  fn value_round_trips_rung_63_overflow() {
    let rung = 63;
    for v in [0u64, 1, (1u64 << 63), u64::MAX, (1u64 << 63) | 5, (1u64 << 62) - 1] {
      let mut w = BitWriter::new();
      write_value(&mut w, v, rung);
      let bytes = w.finalize();
      let mut r = BitReader::new(&bytes);
      assert_eq!(read_value(&mut r, rung), v, "v={v:#x}");
    }
  }

  #[test]
  fn rung_zero_all_zero_round_trips() {
    let group = [0u64; GROUP_SIZE];
    let mut w = BitWriter::new();
    let rung = encode_group(&mut w, &group);
    assert_eq!(rung, 0);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    let back = decode_group(&mut r, 0);
    assert_eq!(back, group);
  }

  #[test]
  fn step_down_round_trips_monotone_ramp() {
    // rung-bit pattern 1^16 0^0 at rung 3: all values have bit 3 set.
    let group: [u64; GROUP_SIZE] = std::array::from_fn(|i| 8 + i as u64);
    let mut w = BitWriter::new();
    let rung = encode_group(&mut w, &group);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    let back = decode_group(&mut r, rung);
    assert_eq!(back, group);
  }

  #[test]
  fn step_down_round_trips_partial_prefix() {
    // first 5 elements have the rung bit set, the rest don't: 1^5 0^11.
    let rung = 4u32;
    let bit = 1u64 << rung;
    let mut group = [0u64; GROUP_SIZE];
    for i in 0..5 {
      group[i] = bit | (i as u64);
    }
    let mut w = BitWriter::new();
    let r0 = encode_group(&mut w, &group);
    assert_eq!(r0, rung);
    let bytes = w.finalize();
    let mut r = BitReader::new(&bytes);
    let back = decode_group(&mut r, rung);
    assert_eq!(back, group);
  }

  #[test]
  fn random_groups_round_trip() {
    let mut seed = 0x1234_5678_9abc_def1u64;
    let mut next = move || {
      seed ^= seed << 13;
      seed ^= seed >> 7;
      seed ^= seed << 17;
      seed
    };
    for _ in 0..200 {
      let rung = (next() % 64) as u32;
      let mask = if rung >= 63 { u64::MAX } else { (1u64 << (rung + 1)) - 1 };
      let mut group = [0u64; GROUP_SIZE];
      for slot in group.iter_mut() {
        *slot = next() & mask;
      }
      // ensure the rung invariant holds: some element has the rung bit set
      group[0] |= 1u64 << rung;
      let mut w = BitWriter::new();
      let got_rung = encode_group(&mut w, &group);
      assert_eq!(got_rung, group_rung(&group));
      let bytes = w.finalize();
      let mut r = BitReader::new(&bytes);
      let back = decode_group(&mut r, got_rung);
      assert_eq!(back, group);
    }
  }
}
