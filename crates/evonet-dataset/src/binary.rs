//! Fixed-width binary encoding, most significant bit first.

/// The low `width` bits of `value` as `0.0`/`1.0`, most significant first.
pub fn to_bits(value: u128, width: usize) -> impl Iterator<Item = f64> {
    (0..width).rev().map(move |shift| {
        let bit = u32::try_from(shift)
            .ok()
            .and_then(|shift| value.checked_shr(shift))
            .unwrap_or(0)
            & 1;
        if bit == 1 { 1.0 } else { 0.0 }
    })
}

/// Reads bits (most significant first), rounding each value at `0.5`.
///
/// Bits beyond the 128th are shifted out.
pub fn from_bits<I>(bits: I) -> u128
where
    I: IntoIterator<Item = f64>,
{
    bits.into_iter()
        .fold(0u128, |acc, bit| (acc << 1) | u128::from(bit >= 0.5))
}
