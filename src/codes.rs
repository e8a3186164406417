//! Rice, Golomb and raw-bits symbol code engines, plus the zero/multi
//! escape mechanisms that gate outlier fallback.
//!
//! Implementations select [`rice_encode`]/[`rice_decode`] whenever the
//! Golomb parameter is a power of two, and the general [`golomb_encode`]/
//! [`golomb_decode`] otherwise, matching the performance and well-defined-
//! shift guidance of the specification.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CmpError, Result};

/// Returns `log2(g)` if `g` is an exact power of two, else `None`.
#[must_use]
pub const fn power_of_two_log2(g: u32) -> Option<u32> {
    if g != 0 && g.is_power_of_two() { Some(g.trailing_zeros()) } else { None }
}

/// Encodes `value` with the Rice code of parameter `g = 2^k`.
///
/// Quotient `q = value >> k` is written as `q` ones followed by a
/// terminating zero; the remainder `value & (g-1)` follows in `k` bits.
/// `k == 31` is the one undefined-shift trap in the underlying hardware
/// bitstream: it is only reachable when `q == 0`, in which case the
/// quotient contributes no bits and the composition below is still exact.
pub fn rice_encode(writer: &mut BitWriter<'_>, value: u32, k: u32) -> Result<()> {
    let q = value >> k;
    // `q` ones then a zero: write as `q` one-bits (split across 32-bit
    // calls if q is absurdly large) followed by an explicit zero bit.
    let mut remaining_ones = q;
    while remaining_ones > 0 {
        let chunk = remaining_ones.min(32);
        let ones = if chunk == 32 { u32::MAX } else { (1u32 << chunk) - 1 };
        writer.put(ones, chunk)?;
        remaining_ones -= chunk;
    }
    writer.put(0, 1)?;
    writer.put(value & mask_low(k), k)
}

/// Decodes a value encoded by [`rice_encode`] with parameter `k = log2(g)`.
pub fn rice_decode(reader: &mut BitReader<'_>, k: u32) -> Result<u32> {
    let q = count_unary_ones(reader)?;
    let r = reader.read(k)?;
    Ok((q << k) | r)
}

/// Encodes `value` with the general Golomb code of parameter `g`
/// (`g` not a power of two; `g == 1` and powers of two go through
/// [`rice_encode`] instead, where `L = ceil(log2(g)) >= 2` is guaranteed).
///
/// The quotient `q = value / g` is written in unary (`q` ones then a zero);
/// the remainder `r = value % g` is written in `L - 1` bits when
/// `r < cutoff = 2^L - g`, else `r + cutoff` is written in `L` bits. This is
/// the standard Gallager/Van Voorhis split that keeps the code prefix-free:
/// an `(L-1)`-bit remainder below `cutoff` can never be confused with the
/// first `L-1` bits of a wider codeword, because those always decode to a
/// value `>= cutoff`.
pub fn golomb_encode(writer: &mut BitWriter<'_>, value: u32, g: u32) -> Result<()> {
    if g == 0 {
        return Err(CmpError::ParSpecific("golomb_par"));
    }
    let l = ceil_log2(g);
    debug_assert!(l >= 1, "golomb_encode requires a non-power-of-two g");
    let cutoff = (1u32 << l) - g;

    let q = value / g;
    let r = value % g;

    let mut remaining_ones = q;
    while remaining_ones > 0 {
        let chunk = remaining_ones.min(32);
        let ones = if chunk == 32 { u32::MAX } else { (1u32 << chunk) - 1 };
        writer.put(ones, chunk)?;
        remaining_ones -= chunk;
    }
    writer.put(0, 1)?;

    if r < cutoff {
        writer.put(r, l - 1)
    } else {
        writer.put(r + cutoff, l)
    }
}

/// Decodes a value encoded by [`golomb_encode`] with parameter `g`.
pub fn golomb_decode(reader: &mut BitReader<'_>, g: u32) -> Result<u32> {
    if g == 0 {
        return Err(CmpError::ParSpecific("golomb_par"));
    }
    let l = ceil_log2(g);
    debug_assert!(l >= 1, "golomb_decode requires a non-power-of-two g");
    let cutoff = (1u32 << l) - g;

    let q = count_unary_ones(reader)?;
    let first_part = reader.read(l - 1)?;

    let r = if first_part < cutoff {
        first_part
    } else {
        let extra = reader.read(1)?;
        (first_part << 1 | extra).checked_sub(cutoff).ok_or(CmpError::IntDecoder)?
    };

    Ok(q * g + r)
}

/// Counts a run of one-bits terminated by a zero, consuming the terminator.
fn count_unary_ones(reader: &mut BitReader<'_>) -> Result<u32> {
    let mut count = 0u32;
    loop {
        let bit = reader.read(1)?;
        if bit == 0 {
            return Ok(count);
        }
        count += 1;
    }
}

const fn mask_low(n: u32) -> u32 {
    if n == 0 { 0 } else if n >= 32 { u32::MAX } else { (1u32 << n) - 1 }
}

/// `ceil(log2(g))` for `g >= 1`.
pub(crate) const fn ceil_log2(g: u32) -> u32 {
    if g <= 1 {
        0
    } else {
        32 - (g - 1).leading_zeros()
    }
}

/// A closed sum type for the two escape mechanisms, determined once from
/// `cmp_mode` and threaded through the per-sample loop as a witness
/// (spec.md §4.I / design note on escape dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapePolicy {
    /// Single reserved escape symbol (`cmp_mode` *_ZERO).
    Zero,
    /// Geometric family of escape symbols (`cmp_mode` *_MULTI).
    Multi,
}

/// Parameters shared by every sample encoded under one collection field.
#[derive(Debug, Clone, Copy)]
pub struct FieldCoder {
    pub golomb_par: u32,
    pub spill: u32,
    pub max_used_bits: u32,
}

impl FieldCoder {
    fn rice_k(&self) -> Option<u32> {
        power_of_two_log2(self.golomb_par)
    }

    fn encode_normal(&self, writer: &mut BitWriter<'_>, value: u32) -> Result<()> {
        match self.rice_k() {
            Some(k) => rice_encode(writer, value, k),
            None => golomb_encode(writer, value, self.golomb_par),
        }
    }

    fn decode_normal(&self, reader: &mut BitReader<'_>) -> Result<u32> {
        match self.rice_k() {
            Some(k) => rice_decode(reader, k),
            None => golomb_decode(reader, self.golomb_par),
        }
    }
}

impl EscapePolicy {
    /// Encodes one already-mapped (unsigned) residual `m` under this escape policy.
    pub fn encode(&self, writer: &mut BitWriter<'_>, m: u32, coder: &FieldCoder) -> Result<()> {
        match self {
            Self::Zero => encode_zero_escape(writer, m, coder),
            Self::Multi => encode_multi_escape(writer, m, coder),
        }
    }

    /// Decodes one residual previously written with [`EscapePolicy::encode`].
    pub fn decode(&self, reader: &mut BitReader<'_>, coder: &FieldCoder) -> Result<u32> {
        match self {
            Self::Zero => decode_zero_escape(reader, coder),
            Self::Multi => decode_multi_escape(reader, coder),
        }
    }
}

fn encode_zero_escape(writer: &mut BitWriter<'_>, m: u32, coder: &FieldCoder) -> Result<()> {
    if coder.spill == 0 {
        return Err(CmpError::ParSpecific("spill"));
    }
    if m < coder.spill - 1 {
        coder.encode_normal(writer, m + 1)
    } else {
        coder.encode_normal(writer, 0)?;
        writer.put(m + 1, coder.max_used_bits)
    }
}

fn decode_zero_escape(reader: &mut BitReader<'_>, coder: &FieldCoder) -> Result<u32> {
    let symbol = coder.decode_normal(reader)?;
    if symbol == 0 {
        let raw = reader.read(coder.max_used_bits)?;
        raw.checked_sub(1).ok_or(CmpError::IntDecoder)
    } else {
        Ok(symbol - 1)
    }
}

fn encode_multi_escape(writer: &mut BitWriter<'_>, m: u32, coder: &FieldCoder) -> Result<()> {
    if m < coder.spill {
        return coder.encode_normal(writer, m);
    }

    let u = m - coder.spill;
    let escape_offset = if u == 0 { 0 } else { (31 - u.leading_zeros()) / 2 };
    let escape_sym = coder
        .spill
        .checked_add(escape_offset)
        .ok_or(CmpError::DataValueTooLarge)?;
    let raw_bits = (escape_offset + 1) * 2;

    coder.encode_normal(writer, escape_sym)?;
    writer.put(u, raw_bits)
}

fn decode_multi_escape(reader: &mut BitReader<'_>, coder: &FieldCoder) -> Result<u32> {
    let symbol = coder.decode_normal(reader)?;
    if symbol < coder.spill {
        return Ok(symbol);
    }
    let escape_offset = symbol - coder.spill;
    let raw_bits = (escape_offset + 1) * 2;
    let u = reader.read(raw_bits)?;
    coder.spill.checked_add(u).ok_or(CmpError::IntDecoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_rice(values: &[u32], k: u32) {
        let mut buf = vec![0u8; 4096];
        let mut bits_written;
        {
            let mut w = BitWriter::new(&mut buf);
            for &v in values {
                rice_encode(&mut w, v, k).unwrap();
            }
            bits_written = w.bit_offset();
        }
        let _ = &mut bits_written;
        let mut r = BitReader::new(&buf);
        for &v in values {
            assert_eq!(rice_decode(&mut r, k).unwrap(), v);
        }
    }

    #[test]
    fn rice_roundtrip_small_k() {
        roundtrip_rice(&[0, 1, 2, 3, 7, 15, 100, 1000], 2);
    }

    #[test]
    fn rice_roundtrip_k_zero() {
        roundtrip_rice(&[0, 1, 2, 5, 20], 0);
    }

    #[test]
    fn rice_k_31_zero_quotient_is_well_defined() {
        let mut buf = vec![0u8; 64];
        {
            let mut w = BitWriter::new(&mut buf);
            rice_encode(&mut w, 42, 31).unwrap();
        }
        let mut r = BitReader::new(&buf);
        assert_eq!(rice_decode(&mut r, 31).unwrap(), 42);
    }

    #[test]
    fn golomb_encode_rejects_zero_par() {
        let mut buf = vec![0u8; 64];
        let mut w = BitWriter::new(&mut buf);
        assert_eq!(golomb_encode(&mut w, 5, 0).unwrap_err(), CmpError::ParSpecific("golomb_par"));
    }

    #[test]
    fn golomb_decode_rejects_zero_par() {
        let buf = vec![0u8; 64];
        let mut r = BitReader::new(&buf);
        assert_eq!(golomb_decode(&mut r, 0).unwrap_err(), CmpError::ParSpecific("golomb_par"));
    }

    #[test]
    fn golomb_roundtrip_non_power_of_two() {
        let g = 5;
        let values = [0u32, 1, 2, 3, 4, 5, 6, 7, 20, 100, 1000];
        let mut buf = vec![0u8; 4096];
        {
            let mut w = BitWriter::new(&mut buf);
            for &v in &values {
                golomb_encode(&mut w, v, g).unwrap();
            }
        }
        let mut r = BitReader::new(&buf);
        for &v in &values {
            assert_eq!(golomb_decode(&mut r, g).unwrap(), v);
        }
    }

    #[test]
    fn golomb_roundtrip_around_cutoff_boundary() {
        // g = 5 -> L = 3, cutoff = 3. Exercise values straddling the
        // remainder-space cutoff for several quotients, including q large
        // enough to span more than one byte of unary ones.
        let g = 5;
        let values: Vec<u32> = (0..40).flat_map(|q: u32| (0..g).map(move |r| q * g + r)).collect();
        let mut buf = vec![0u8; 4096];
        {
            let mut w = BitWriter::new(&mut buf);
            for &v in &values {
                golomb_encode(&mut w, v, g).unwrap();
            }
        }
        let mut r = BitReader::new(&buf);
        for &v in &values {
            assert_eq!(golomb_decode(&mut r, g).unwrap(), v);
        }
    }

    proptest::proptest! {
        #[test]
        fn golomb_law(g in 3u32..5000, q in 0u32..200, r in 0u32..5000) {
            let g = if g.is_power_of_two() { g + 1 } else { g };
            let r = r % g;
            let value = q * g + r;
            let mut buf = vec![0u8; 8192];
            {
                let mut w = BitWriter::new(&mut buf);
                golomb_encode(&mut w, value, g).unwrap();
            }
            let mut rd = BitReader::new(&buf);
            let got = golomb_decode(&mut rd, g).unwrap();
            proptest::prop_assert_eq!(got, value);
        }
    }

    #[test]
    fn zero_escape_below_spill_uses_no_raw_bits() {
        let coder = FieldCoder { golomb_par: 1, spill: 8, max_used_bits: 16 };
        let mut buf = vec![0u8; 64];
        {
            let mut w = BitWriter::new(&mut buf);
            for m in 0..7u32 {
                EscapePolicy::Zero.encode(&mut w, m, &coder).unwrap();
            }
        }
        let mut r = BitReader::new(&buf);
        for m in 0..7u32 {
            assert_eq!(EscapePolicy::Zero.decode(&mut r, &coder).unwrap(), m);
        }
    }

    #[test]
    fn zero_escape_outlier_roundtrip() {
        let coder = FieldCoder { golomb_par: 1, spill: 8, max_used_bits: 16 };
        let mut buf = vec![0u8; 64];
        {
            let mut w = BitWriter::new(&mut buf);
            EscapePolicy::Zero.encode(&mut w, 4000, &coder).unwrap();
        }
        let mut r = BitReader::new(&buf);
        assert_eq!(EscapePolicy::Zero.decode(&mut r, &coder).unwrap(), 4000);
    }

    #[test]
    fn multi_escape_corner_case_u_zero() {
        let coder = FieldCoder { golomb_par: 4, spill: 60, max_used_bits: 16 };
        let mut buf = vec![0u8; 64];
        {
            let mut w = BitWriter::new(&mut buf);
            EscapePolicy::Multi.encode(&mut w, 60, &coder).unwrap();
        }
        let mut r = BitReader::new(&buf);
        assert_eq!(EscapePolicy::Multi.decode(&mut r, &coder).unwrap(), 60);
    }

    #[test]
    fn multi_escape_roundtrip_many() {
        let coder = FieldCoder { golomb_par: 4, spill: 60, max_used_bits: 20 };
        let values = [0u32, 10, 59, 60, 61, 100, 1000, 50000];
        let mut buf = vec![0u8; 4096];
        {
            let mut w = BitWriter::new(&mut buf);
            for &v in &values {
                EscapePolicy::Multi.encode(&mut w, v, &coder).unwrap();
            }
        }
        let mut r = BitReader::new(&buf);
        for &v in &values {
            assert_eq!(EscapePolicy::Multi.decode(&mut r, &coder).unwrap(), v);
        }
    }
}
