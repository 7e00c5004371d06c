//! Optional quantization (§6.4): before the lossless pipeline runs, each
//! sample is divided by `quanta` (round-to-zero or round-away-from-zero);
//! at decode, the reconstructed value is multiplied back up and clamped to
//! the type's range.

/// Rounds `v / q` for a signed value, breaking ties toward zero (`away =
/// false`) or away from zero (`away = true`). Uses a widening `i128`
/// intermediate so the division itself can never overflow, including at
/// the signed type's minimum value.
pub fn quantize_signed(v: i64, q: i64, away: bool) -> i64 {
  debug_assert!(q >= 2);
  let v = v as i128;
  let q = q as i128;
  let r = v / q;
  let m = v % q;
  let bump = if away { m.abs() * 2 >= q } else { m.abs() * 2 > q };
  let dir = if v < 0 { -1 } else { 1 };
  (r + if bump { dir } else { 0 }) as i64
}

/// Inverse of [`quantize_signed`], saturating to `[min, max]` if `v * q`
/// would overflow the type's range.
pub fn dequantize_signed(v: i64, q: i64, min: i64, max: i64) -> i64 {
  let wide = v as i128 * q as i128;
  wide.clamp(min as i128, max as i128) as i64
}

/// Unsigned counterpart of [`quantize_signed`].
pub fn quantize_unsigned(v: u64, q: u64, away: bool) -> u64 {
  debug_assert!(q >= 2);
  let r = v / q;
  let m = v % q;
  let bump = if away { m * 2 >= q } else { m * 2 > q };
  r + u64::from(bump)
}

/// Inverse of [`quantize_unsigned`], saturating at `max`.
pub fn dequantize_unsigned(v: u64, q: u64, max: u64) -> u64 {
  let wide = v as u128 * q as u128;
  wide.min(max as u128) as u64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unsigned_round_trip_error_bound() {
    let q = 3u64;
    for v in 0..=20u64 {
      let qv = quantize_unsigned(v, q, false);
      let back = dequantize_unsigned(qv, q, u64::MAX);
      assert!(back.abs_diff(v) <= q / 2, "v={v} back={back}");
    }
  }

  #[test]
  fn signed_round_trip_error_bound_both_directions() {
    let q = 5i64;
    for v in -20..=20i64 {
      for away in [false, true] {
        let qv = quantize_signed(v, q, away);
        let back = dequantize_signed(qv, q, i64::MIN, i64::MAX);
        assert!((back - v).abs() <= q / 2, "v={v} back={back} away={away}");
      }
    }
  }

  #[test]
  fn signed_minimum_does_not_overflow() {
    let q = 7i64;
    let qv = quantize_signed(i64::MIN, q, true);
    let back = dequantize_signed(qv, q, i64::MIN, i64::MAX);
    assert!((back - i64::MIN).abs() <= q / 2 + 1);
  }

  #[test]
  fn dequantize_saturates_at_type_max() {
    let back = dequantize_signed(1_000_000, 1_000_000, -100, 100);
    assert_eq!(back, 100);
  }
}
