use bytemuck::Zeroable;

/// One of the four integer sample widths QB3 can carry.
///
/// The codec's internal math (MagSign, rung tracking, the group coder)
/// always operates on `u64`; this trait is the seam between a caller's
/// native integer type and that internal representation, analogous to how
/// `tinyavif`'s `Array2D<T: Zeroable>` stays generic over sample storage
/// while its transform math works in a fixed wider accumulator type. The
/// container's own type code (§6.1) depends on signedness as well as width,
/// so it's computed by `container::DataType::of`, not carried here.
pub trait Sample: Copy + Clone + PartialEq + std::fmt::Debug + Default + Zeroable + Send + Sync + 'static {
  /// Bit width of the type (8, 16, 32 or 64).
  const WIDTH: u32;
  /// Width in bits of the rung-switch delta field (§5.3), `ceil(log2(WIDTH))+1`.
  const SWITCH_BITS: u32;

  fn to_u64(self) -> u64;
  fn from_u64(v: u64) -> Self;
}

macro_rules! impl_sample {
  ($t:ty, $width:expr, $switch:expr) => {
    impl Sample for $t {
      const WIDTH: u32 = $width;
      const SWITCH_BITS: u32 = $switch;

      #[inline]
      fn to_u64(self) -> u64 {
        self as u64
      }

      #[inline]
      fn from_u64(v: u64) -> Self {
        v as $t
      }
    }
  };
}

impl_sample!(u8, 8, 3);
impl_sample!(u16, 16, 4);
impl_sample!(u32, 32, 5);
impl_sample!(u64, 64, 6);

/// Mask with the low `width` bits set (width may be 64).
#[inline]
pub fn width_mask(width: u32) -> u64 {
  if width >= 64 {
    u64::MAX
  } else {
    (1u64 << width) - 1
  }
}
