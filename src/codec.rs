//! Per-collection orchestration: dispatches `RAW` straight through, and
//! for every parameter-driven mode prefixes the bit-packed payload with a
//! 4-byte sample count so the decoder knows how many samples to pull back
//! out without needing any side channel.
//!
//! Grounded in the original tooling's own need for an explicit
//! `samples_used` figure alongside a collection's data (`cmp_io.c` reads
//! one from its info-file sidecar); this crate keeps the same figure but
//! inline in the payload rather than in a side file, since the entity is
//! meant to be self-describing on its own.

use crate::bitio::{BitReader, BitWriter};
use crate::codes::EscapePolicy;
use crate::collection::{
    decode_collection_fields, encode_collection_fields, pad_to_byte_boundary, CollectionParams,
};
use crate::error::{CmpError, Result};
use crate::predictor::CompressionMode;
use crate::raw::{deinterleave, interleave};
use crate::registry::{ChunkType, Registry};

/// Byte length of the sample-count prefix on a parameter-driven payload.
pub const SAMPLE_COUNT_PREFIX_SIZE: usize = 4;

/// Everything needed to encode or decode one collection's payload, besides
/// the raw bytes themselves.
#[derive(Debug, Clone, Copy)]
pub struct CodecParams<'a> {
    pub chunk_type: ChunkType,
    pub mode: CompressionMode,
    pub escape: EscapePolicy,
    pub model_value: u32,
    pub field_pars: &'a [(u32, u32)],
    pub registry: &'a Registry,
}

/// Encodes one collection's raw, sample-major payload into `out`,
/// returning the number of bytes written and (for `MODEL_*` modes) the
/// updated model, re-serialized to the same sample-major raw shape.
pub fn encode_collection_payload(
    out: &mut [u8],
    params: &CodecParams<'_>,
    raw_payload: &[u8],
    model_payload: Option<&[u8]>,
) -> Result<(usize, Vec<u8>)> {
    if matches!(params.mode, CompressionMode::Raw) {
        if out.len() < raw_payload.len() {
            return Err(CmpError::SmallBuf { needed: raw_payload.len(), available: out.len() });
        }
        out[..raw_payload.len()].copy_from_slice(raw_payload);
        return Ok((raw_payload.len(), Vec::new()));
    }

    let (sample_count, samples) = deinterleave(raw_payload, params.chunk_type, params.registry)?;
    let model_samples = model_payload
        .map(|mp| deinterleave(mp, params.chunk_type, params.registry))
        .transpose()?
        .map(|(_, v)| v);

    if out.len() < SAMPLE_COUNT_PREFIX_SIZE {
        return Err(CmpError::SmallBuf { needed: SAMPLE_COUNT_PREFIX_SIZE, available: out.len() });
    }
    out[0..SAMPLE_COUNT_PREFIX_SIZE].copy_from_slice(&(sample_count as u32).to_be_bytes());

    let samples_refs: Vec<&[u32]> = samples.iter().map(Vec::as_slice).collect();
    let model_refs: Option<Vec<&[u32]>> = model_samples.as_ref().map(|m| m.iter().map(Vec::as_slice).collect());

    let collection_params = CollectionParams {
        chunk_type: params.chunk_type,
        mode: params.mode,
        escape: params.escape,
        model_value: params.model_value,
        field_pars: params.field_pars,
        registry: params.registry,
    };

    let mut writer = BitWriter::new(&mut out[SAMPLE_COUNT_PREFIX_SIZE..]);
    let updated = encode_collection_fields(
        &mut writer,
        &collection_params,
        &samples_refs,
        model_refs.as_deref(),
    )?;
    pad_to_byte_boundary(&mut writer)?;
    let payload_len = SAMPLE_COUNT_PREFIX_SIZE + writer.byte_len();

    let updated_raw = if params.mode.is_model_relative() {
        let updated_refs: Vec<&[u32]> = updated.iter().map(Vec::as_slice).collect();
        interleave(&updated_refs, params.chunk_type, params.registry)?
    } else {
        Vec::new()
    };

    Ok((payload_len, updated_raw))
}

/// Decodes one collection's payload, returning the reconstructed
/// sample-major raw bytes and (for `MODEL_*` modes) the updated model,
/// also in sample-major raw form.
pub fn decode_collection_payload(
    payload: &[u8],
    params: &CodecParams<'_>,
    model_payload: Option<&[u8]>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    if matches!(params.mode, CompressionMode::Raw) {
        return Ok((payload.to_vec(), Vec::new()));
    }

    if payload.len() < SAMPLE_COUNT_PREFIX_SIZE {
        return Err(CmpError::ColSizeInconsistent);
    }
    let sample_count = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;

    let model_samples = model_payload
        .map(|mp| deinterleave(mp, params.chunk_type, params.registry))
        .transpose()?
        .map(|(_, v)| v);
    let model_refs: Option<Vec<&[u32]>> = model_samples.as_ref().map(|m| m.iter().map(Vec::as_slice).collect());

    let fields = params.chunk_type.fields();
    let sample_counts: Vec<usize> =
        fields.iter().map(|f| sample_count * f.scalar_count() as usize).collect();

    let collection_params = CollectionParams {
        chunk_type: params.chunk_type,
        mode: params.mode,
        escape: params.escape,
        model_value: params.model_value,
        field_pars: params.field_pars,
        registry: params.registry,
    };

    let mut reader = BitReader::new(&payload[SAMPLE_COUNT_PREFIX_SIZE..]);
    let (decoded, updated) = decode_collection_fields(
        &mut reader,
        &collection_params,
        &sample_counts,
        model_refs.as_deref(),
    )?;

    let decoded_refs: Vec<&[u32]> = decoded.iter().map(Vec::as_slice).collect();
    let raw_out = interleave(&decoded_refs, params.chunk_type, params.registry)?;

    let updated_raw = if params.mode.is_model_relative() {
        let updated_refs: Vec<&[u32]> = updated.iter().map(Vec::as_slice).collect();
        interleave(&updated_refs, params.chunk_type, params.registry)?
    } else {
        Vec::new()
    };

    Ok((raw_out, updated_raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mode_passes_through_unchanged() {
        let registry = Registry::builtin();
        let params = CodecParams {
            chunk_type: ChunkType::NcamImagette,
            mode: CompressionMode::Raw,
            escape: EscapePolicy::Zero,
            model_value: 0,
            field_pars: &[(1, 8)],
            registry: &registry,
        };
        let raw = vec![0u8, 42, 0, 23, 0, 1];
        let mut out = vec![0u8; raw.len()];
        let (len, updated) = encode_collection_payload(&mut out, &params, &raw, None).unwrap();
        assert_eq!(&out[..len], raw.as_slice());
        assert!(updated.is_empty());

        let (decoded, updated) = decode_collection_payload(&out[..len], &params, None).unwrap();
        assert_eq!(decoded, raw);
        assert!(updated.is_empty());
    }

    #[test]
    fn diff_zero_mode_roundtrips_through_raw_bytes() {
        let registry = Registry::builtin();
        let params = CodecParams {
            chunk_type: ChunkType::NcamImagette,
            mode: CompressionMode::DiffZero,
            escape: EscapePolicy::Zero,
            model_value: 0,
            field_pars: &[(1, 8)],
            registry: &registry,
        };
        let raw: Vec<u8> = vec![0, 42, 0, 23, 0, 1, 0, 13, 0, 20, 3, 232];
        let mut out = vec![0u8; 4096];
        let (len, updated) = encode_collection_payload(&mut out, &params, &raw, None).unwrap();
        assert!(updated.is_empty());

        let (decoded, updated) = decode_collection_payload(&out[..len], &params, None).unwrap();
        assert_eq!(decoded, raw);
        assert!(updated.is_empty());
    }

    #[test]
    fn model_multi_mode_reports_updated_model() {
        let registry = Registry::builtin();
        let params = CodecParams {
            chunk_type: ChunkType::NcamImagette,
            mode: CompressionMode::ModelMulti,
            escape: EscapePolicy::Multi,
            model_value: 11,
            field_pars: &[(4, 60)],
            registry: &registry,
        };
        let raw: Vec<u8> = vec![0, 42, 0, 23, 0, 1, 0, 13, 0, 20, 3, 232];
        let model: Vec<u8> = vec![0, 0, 0, 22, 0, 3, 0, 42, 0, 23, 0, 16];
        let mut out = vec![0u8; 4096];
        let (len, updated_enc) =
            encode_collection_payload(&mut out, &params, &raw, Some(&model)).unwrap();
        assert_eq!(updated_enc[2], 0);
        assert_eq!(updated_enc[3], 23);

        let (decoded, updated_dec) =
            decode_collection_payload(&out[..len], &params, Some(&model)).unwrap();
        assert_eq!(decoded, raw);
        assert_eq!(updated_dec, updated_enc);
    }
}
