//! The size bounder (component K): a worst-case output size for
//! `compress_chunk`, so allocating to the bound guarantees the encoder
//! never returns `SmallBuf` for well-typed input.
//!
//! The bound is deliberately loose rather than tight: it reasons about
//! the longest codeword a field's `(golomb_par, spill)` pair could ever
//! produce, not the codeword an actual sample produces, and always adds
//! the raw-payload size as a floor so a chunk of incompressible data never
//! outgrows its own raw representation plus header overhead. The
//! parameter-driven payload's leading sample-count prefix (see
//! `codec::SAMPLE_COUNT_PREFIX_SIZE`) is folded into the bound too.

use crate::chunk::COLLECTION_PREFIX_SIZE;
use crate::codec::SAMPLE_COUNT_PREFIX_SIZE;
use crate::codes::{ceil_log2, power_of_two_log2};
use crate::entity::EntityBuilder;
use crate::error::{CmpError, Result};
use crate::registry::{ChunkType, Registry};

/// Ceiling division for the byte-rounding arithmetic below (kept as a
/// free function rather than `u64::div_ceil`/`u32::div_ceil`, which postdate
/// this crate's declared MSRV).
const fn ceil_div_u64(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// An escape mechanism's normal-code symbol never exceeds `spill` by more
/// than this; derived from `encode_multi_escape`'s `escape_offset`, which
/// tops out at `(31 - 0.leading_zeros()) / 2 == 15` for the largest `u`
/// representable once bounded by a 32-bit residual.
const MAX_ESCAPE_SYMBOL_SLACK: u32 = 16;

/// The escape raw-bits trailer never exceeds this, for the same reason:
/// `raw_bits = (escape_offset + 1) * 2` with `escape_offset <= 15`.
const MAX_ESCAPE_RAW_BITS: u32 = 32;

/// Worst-case bits one sample of a field with these parameters can ever
/// occupy, across both escape policies and both code engines.
fn worst_case_field_bits(golomb_par: u32, spill: u32, max_used_bits: u32) -> u32 {
    let l = ceil_log2(golomb_par.max(1));
    let remainder_bits = if power_of_two_log2(golomb_par).is_some() { l } else { l.max(1) };

    let max_normal_symbol = spill.saturating_add(MAX_ESCAPE_SYMBOL_SLACK);
    let quotient_bits = max_normal_symbol / golomb_par.max(1);
    let terminator_bit = 1;
    let normal_code_bits = quotient_bits + terminator_bit + remainder_bits;

    let escape_raw_bits = max_used_bits.max(MAX_ESCAPE_RAW_BITS);

    normal_code_bits + escape_raw_bits
}

/// Upper bound on the compressed byte size of one collection carrying
/// `sample_count` samples of `chunk_type`, given its `(golomb_par, spill)`
/// parameters in `registry`-declared field order.
pub(crate) fn collection_cmp_size_bound(
    chunk_type: ChunkType,
    sample_count: usize,
    field_pars: &[(u32, u32)],
    registry: &Registry,
) -> Result<usize> {
    let fields = chunk_type.fields();
    let bits = registry.max_used_bits(chunk_type)?;
    if field_pars.len() != fields.len() || bits.len() != fields.len() {
        return Err(CmpError::ParBuffers);
    }

    let mut bits_per_sample_row = 0u64;
    let mut raw_bytes_per_sample_row = 0u64;
    for (idx, field) in fields.iter().enumerate() {
        let (golomb_par, spill) = field_pars[idx];
        let max_used_bits = bits[idx];
        let scalars = u64::from(field.scalar_count());
        bits_per_sample_row += scalars * u64::from(worst_case_field_bits(golomb_par, spill, max_used_bits));
        raw_bytes_per_sample_row += scalars * ceil_div_u64(u64::from(max_used_bits), 8);
    }

    let worst_encoded_bytes =
        SAMPLE_COUNT_PREFIX_SIZE as u64 + ceil_div_u64(bits_per_sample_row * sample_count as u64, 8);
    let raw_bytes = raw_bytes_per_sample_row * sample_count as u64;
    let payload_bound = worst_encoded_bytes.max(raw_bytes);

    Ok(COLLECTION_PREFIX_SIZE + payload_bound as usize)
}

/// Upper bound on the total compressed entity size for a chunk containing
/// `collections`, each `(chunk_type, sample_count, field_pars)`.
///
/// This is the building block `compress_chunk_cmp_size_bound` (in
/// `lib.rs`) calls once the caller's raw chunk bytes have been parsed into
/// per-collection sample counts; exposed here so the bound can be computed
/// without needing a real chunk buffer (e.g. by a caller sizing a
/// destination buffer ahead of time from known collection shapes).
pub fn entity_cmp_size_bound(
    collections: &[(ChunkType, usize, &[(u32, u32)])],
    registry: &Registry,
) -> Result<usize> {
    if collections.is_empty() {
        return Err(CmpError::ChunkTooSmall);
    }

    let mut total = 0usize;
    for &(chunk_type, sample_count, field_pars) in collections {
        total = total
            .checked_add(collection_cmp_size_bound(chunk_type, sample_count, field_pars, registry)?)
            .ok_or(CmpError::ChunkTooLarge(usize::MAX))?;
    }

    let header_len = EntityBuilder::header_len(collections[0].0.fields().len());
    total.checked_add(header_len).ok_or(CmpError::ChunkTooLarge(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_is_never_smaller_than_raw_payload() {
        let registry = Registry::builtin();
        let field_pars = [(1u32, 8u32)];
        let bound =
            collection_cmp_size_bound(ChunkType::NcamImagette, 100, &field_pars, &registry).unwrap();
        let raw_payload = 100 * 2; // 16-bit pixels
        assert!(bound >= COLLECTION_PREFIX_SIZE + raw_payload);
    }

    #[test]
    fn bound_grows_with_sample_count() {
        let registry = Registry::builtin();
        let field_pars = [(4u32, 60u32)];
        let small =
            collection_cmp_size_bound(ChunkType::NcamImagette, 10, &field_pars, &registry).unwrap();
        let large =
            collection_cmp_size_bound(ChunkType::NcamImagette, 1000, &field_pars, &registry).unwrap();
        assert!(large > small);
    }

    #[test]
    fn empty_chunk_has_no_bound() {
        let registry = Registry::builtin();
        assert!(entity_cmp_size_bound(&[], &registry).is_err());
    }

    #[test]
    fn multi_collection_bound_sums_parts() {
        let registry = Registry::builtin();
        let field_pars = [(1u32, 8u32)];
        let one = entity_cmp_size_bound(&[(ChunkType::NcamImagette, 36, &field_pars)], &registry).unwrap();
        let two = entity_cmp_size_bound(
            &[
                (ChunkType::NcamImagette, 36, &field_pars),
                (ChunkType::NcamImagette, 36, &field_pars),
            ],
            &registry,
        )
        .unwrap();
        assert!(two > one);
    }
}
