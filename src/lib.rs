//! Lossless/near-lossless compression for space-science instrument
//! telemetry: imagette pixels, offset/background/smearing statistics, and
//! flux/centroid samples.
//!
//! A [`Chunk`](crate::chunk) (a caller-owned sequence of typed
//! collections) is compressed into a self-describing
//! [`Entity`](crate::entity) via [`compress_chunk`]/
//! [`compress_chunk_into_vec`], and decoded back with
//! [`decompress_cmp_entity`]. Every sample is bounded to its field's
//! `max_used_bits` (see [`registry`]), predicted via [`predictor`],
//! mapped to an unsigned residual (see [`residual`]), and entropy-coded
//! with a Rice or Golomb code (see [`codes`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]

pub mod bitio;
pub mod chunk;
pub mod codec;
pub mod codes;
pub mod collection;
pub mod entity;
pub mod error;
pub mod predictor;
pub mod raw;
pub mod registry;
pub mod residual;
pub mod size_bound;

use tracing::{debug, trace};

use chunk::{iter_collections, validate_homogeneous_chunk_type, write_framed_collection, CollectionView};
use codec::{decode_collection_payload, encode_collection_payload, CodecParams};
use entity::{EntityBuilder, EntityConfig, EntityHeader};
use error::{CmpError, Result};
use predictor::CompressionMode;
use registry::{ChunkType, Registry};
use size_bound::{collection_cmp_size_bound, entity_cmp_size_bound};

/// Everything the encoder needs besides the chunk bytes themselves.
#[derive(Debug, Clone)]
pub struct CompressParams<'a> {
    /// High bit set unconditionally: this crate only produces
    /// software-codec entities (see [`entity::VERSION_ID_SOFTWARE_BIT`]).
    pub version_id: u32,
    /// Coarse+fine onboard time of the first sample in the chunk.
    pub start_time: u64,
    /// Coarse+fine onboard time of the last sample in the chunk.
    pub end_time: u64,
    /// Identifies which model buffer generation this compression used.
    pub model_id: u8,
    /// Monotonic counter distinguishing successive updates to `model_id`.
    pub model_counter: u8,
    /// Which predictor/escape family to encode with.
    pub mode: CompressionMode,
    /// `model_value` used by `MODEL_*` modes; ignored otherwise.
    pub model_value: u32,
    /// Lossy rounding parameter recorded verbatim in the entity header.
    pub lossy_cmp_par_used: u8,
    /// The `max_used_bits` table this chunk's fields were bounded against.
    pub registry: &'a Registry,
    /// One `(golomb_par, spill)` pair per field of the chunk's resolved
    /// chunk type, shared by every collection in the chunk.
    pub field_pars: &'a [(u32, u32)],
}

/// Compresses `chunk` into `dst`, returning the number of bytes written.
///
/// `model` and `updated_model`, when present, share `chunk`'s framing
/// (the same `{header, length, payload}` collections, in the same order
/// and shapes) and are only consulted/produced for `MODEL_*` modes.
pub fn compress_chunk(
    chunk: &[u8],
    model: Option<&[u8]>,
    params: &CompressParams<'_>,
    dst: &mut [u8],
    updated_model: Option<&mut [u8]>,
) -> Result<usize> {
    let views = iter_collections(chunk)?;
    let chunk_type = validate_homogeneous_chunk_type(&views)?;
    debug!(?chunk_type, collections = views.len(), "compress_chunk");

    let fields = chunk_type.fields();
    if params.field_pars.len() != fields.len() {
        return Err(CmpError::ParBuffers);
    }

    let model_views = model.map(iter_collections).transpose()?;
    if let Some(mv) = &model_views {
        if mv.len() != views.len() {
            return Err(CmpError::ParBuffers);
        }
    }

    let escape = params.mode.escape_policy();
    let codec_params = CodecParams {
        chunk_type,
        mode: params.mode,
        escape,
        model_value: params.model_value,
        field_pars: params.field_pars,
        registry: params.registry,
    };

    let mut encoded: Vec<(CollectionView<'_>, Vec<u8>, Vec<u8>)> = Vec::with_capacity(views.len());
    for (i, view) in views.iter().enumerate() {
        let model_payload = model_views.as_ref().map(|mv| mv[i].payload);
        let sample_count = raw::row_bytes(chunk_type, params.registry)
            .ok()
            .filter(|&row| row != 0)
            .map_or(0, |row| view.payload.len() / row);
        let scratch_bound = collection_cmp_size_bound(chunk_type, sample_count, params.field_pars, params.registry)?
            - chunk::COLLECTION_PREFIX_SIZE;
        let mut scratch = vec![0u8; scratch_bound.max(view.payload.len())];
        let (len, updated) = encode_collection_payload(&mut scratch, &codec_params, view.payload, model_payload)?;
        scratch.truncate(len);
        trace!(collection = i, bytes = len, "encoded collection");
        encoded.push((*view, scratch, updated));
    }

    let header_len = EntityBuilder::header_len(fields.len());
    let payload_bytes: usize = encoded.iter().map(|(_, enc, _)| chunk::COLLECTION_PREFIX_SIZE + enc.len()).sum();
    let total_size = header_len + payload_bytes;
    if dst.len() < total_size {
        return Err(CmpError::SmallBuf { needed: total_size, available: dst.len() });
    }

    let cfg = EntityConfig {
        version_id: params.version_id,
        original_size: chunk.len() as u32,
        start_time: params.start_time,
        end_time: params.end_time,
        chunk_type,
        raw_mode: matches!(params.mode, CompressionMode::Raw),
        cmp_mode_used: params.mode.to_code(),
        model_value_used: params.model_value as u8,
        model_id: params.model_id,
        model_counter: params.model_counter,
        max_used_bits_version: params.registry.version(),
        lossy_cmp_par_used: params.lossy_cmp_par_used,
        adaptive_params: None,
    };

    let builder = EntityBuilder::new()
        .create(total_size)?
        .write_cmp_pars(cfg, params.field_pars.to_vec())?
        .set_size(total_size)?;
    builder.finish(&mut dst[..header_len])?;

    let mut offset = header_len;
    for (view, enc, _) in &encoded {
        offset += write_framed_collection(&mut dst[offset..], &view.header, enc)?;
    }

    if let Some(updated_model) = updated_model {
        write_updated_model(&encoded, updated_model)?;
    }

    Ok(total_size)
}

/// Convenience wrapper around [`compress_chunk`] that allocates its own
/// output (and, when `model` is given, its own updated-model buffer
/// discarded once copied in — use [`compress_chunk`] directly to retain it).
pub fn compress_chunk_into_vec(
    chunk: &[u8],
    model: Option<&[u8]>,
    params: &CompressParams<'_>,
) -> Result<Vec<u8>> {
    let bound = compress_chunk_cmp_size_bound(chunk)?;
    let mut dst = vec![0u8; bound];
    let mut scratch_model = model.map(|m| vec![0u8; m.len()]);
    let written = compress_chunk(chunk, model, params, &mut dst, scratch_model.as_deref_mut())?;
    dst.truncate(written);
    Ok(dst)
}

fn write_updated_model(
    encoded: &[(CollectionView<'_>, Vec<u8>, Vec<u8>)],
    updated_model: &mut [u8],
) -> Result<()> {
    let mut offset = 0usize;
    for (view, _, updated_raw) in encoded {
        if updated_raw.is_empty() {
            continue;
        }
        offset += write_framed_collection(&mut updated_model[offset..], &view.header, updated_raw)?;
    }
    Ok(())
}

/// Returns the exact decoded chunk size `decompress_cmp_entity` will
/// write, read straight from `entity`'s header: the two-phase sizing
/// call used to pre-allocate `dst`.
pub fn decompress_cmp_entity_size(entity: &[u8]) -> Result<usize> {
    let header = EntityHeader::parse(entity)?;
    Ok(header.original_size as usize)
}

/// Decodes `entity` into `dst`, returning the number of bytes written.
///
/// `model` and `updated_model` follow the same per-collection framing
/// convention as [`compress_chunk`].
pub fn decompress_cmp_entity(
    entity: &[u8],
    model: Option<&[u8]>,
    dst: &mut [u8],
    updated_model: Option<&mut [u8]>,
) -> Result<usize> {
    let header = EntityHeader::parse(entity)?;
    let header_len = EntityBuilder::header_len(header.field_pars.len());
    if entity.len() < header.total_size() {
        return Err(CmpError::EntityTooSmall);
    }
    let payload_area = &entity[header_len..header.total_size()];

    debug!(chunk_type = ?header.chunk_type, "decompress_cmp_entity");

    let mode = CompressionMode::from_code(header.cmp_mode_used)?;
    if matches!(mode, CompressionMode::Raw) != header.raw_mode {
        return Err(CmpError::EntityHeader);
    }
    if header.max_used_bits_version != 0 {
        // This build only ships the version-0 built-in table; an entity
        // produced under another version cannot be decoded here.
        return Err(CmpError::ParMaxUsedBits);
    }
    let registry = Registry::builtin();

    let views = iter_collections(payload_area)?;
    for view in &views {
        if view.header.chunk_type() != header.chunk_type {
            return Err(CmpError::ChunkSubserviceInconsistent);
        }
    }

    let model_views = model.map(iter_collections).transpose()?;
    if let Some(mv) = &model_views {
        if mv.len() != views.len() {
            return Err(CmpError::ParBuffers);
        }
    }

    let codec_params = CodecParams {
        chunk_type: header.chunk_type,
        mode,
        escape: mode.escape_policy(),
        model_value: u32::from(header.model_value_used),
        field_pars: &header.field_pars,
        registry: &registry,
    };

    let mut decoded: Vec<(CollectionView<'_>, Vec<u8>, Vec<u8>)> = Vec::with_capacity(views.len());
    let mut raw_total = 0usize;
    for (i, view) in views.iter().enumerate() {
        let model_payload = model_views.as_ref().map(|mv| mv[i].payload);
        let (raw_bytes, updated_raw) = decode_collection_payload(view.payload, &codec_params, model_payload)?;
        trace!(collection = i, bytes = raw_bytes.len(), "decoded collection");
        raw_total += chunk::COLLECTION_PREFIX_SIZE + raw_bytes.len();
        decoded.push((*view, raw_bytes, updated_raw));
    }

    if dst.len() < raw_total {
        return Err(CmpError::SmallBuf { needed: raw_total, available: dst.len() });
    }

    let mut offset = 0usize;
    for (view, raw_bytes, _) in &decoded {
        offset += write_framed_collection(&mut dst[offset..], &view.header, raw_bytes)?;
    }

    if let Some(updated_model) = updated_model {
        write_updated_model(&decoded, updated_model)?;
    }

    Ok(raw_total)
}

/// Upper bound on the compressed size of `chunk`, for sizing a
/// [`compress_chunk`] destination buffer ahead of time; see
/// [`size_bound::entity_cmp_size_bound`] for the reasoning.
pub fn compress_chunk_cmp_size_bound(chunk: &[u8]) -> Result<usize> {
    let views = iter_collections(chunk)?;
    let chunk_type = validate_homogeneous_chunk_type(&views)?;
    let registry = Registry::builtin();

    let mut collections = Vec::with_capacity(views.len());
    let mut field_pars_storage = Vec::with_capacity(views.len());
    let row = raw::row_bytes(chunk_type, &registry)?;
    if row == 0 {
        return Err(CmpError::ParMaxUsedBits);
    }
    for view in &views {
        field_pars_storage.push(worst_case_field_pars(chunk_type, &registry)?);
        let sample_count = view.payload.len() / row;
        collections.push((chunk_type, sample_count));
    }

    let collections_refs: Vec<(ChunkType, usize, &[(u32, u32)])> = collections
        .iter()
        .zip(&field_pars_storage)
        .map(|(&(ty, n), pars)| (ty, n, pars.as_slice()))
        .collect();

    entity_cmp_size_bound(&collections_refs, &registry)
}

/// Every field's worst-case `(golomb_par, spill)`: `golomb_par = 1` (Rice
/// `k = 0`, the slowest-shrinking unary code) and `spill` at its maximum
/// per-field bound, so no real parameter choice can produce a longer
/// codeword than this one bounds.
fn worst_case_field_pars(chunk_type: ChunkType, registry: &Registry) -> Result<Vec<(u32, u32)>> {
    let bits = registry.max_used_bits(chunk_type)?;
    Ok(bits.iter().map(|&b| (1u32, 1u32 << b.min(30))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection::{CollectionHeader, PKT_TYPE_SCIENCE};

    fn imagette_header(seq: u8) -> CollectionHeader {
        CollectionHeader {
            timestamp: 0x0000_1234_5678,
            configuration_id: 1,
            packet_type: PKT_TYPE_SCIENCE,
            subservice: 1, // NcamImagette
            ccd_id: 0,
            sequence_number: seq,
        }
    }

    fn framed_chunk(rows: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; chunk::COLLECTION_PREFIX_SIZE + rows.len()];
        chunk::write_framed_collection(&mut buf, &imagette_header(0), rows).unwrap();
        buf
    }

    fn sample_params<'a>(mode: CompressionMode, registry: &'a Registry, field_pars: &'a [(u32, u32)]) -> CompressParams<'a> {
        CompressParams {
            version_id: entity::VERSION_ID_SOFTWARE_BIT | 0x0001_0000,
            start_time: 1,
            end_time: 2,
            model_id: 0,
            model_counter: 0,
            mode,
            model_value: 0,
            lossy_cmp_par_used: 0,
            registry,
            field_pars,
        }
    }

    #[test]
    fn diff_zero_round_trips_through_compress_and_decompress() {
        let registry = Registry::builtin();
        let field_pars = [(1u32, 8u32)];
        let params = sample_params(CompressionMode::DiffZero, &registry, &field_pars);

        let raw: Vec<u8> = vec![0, 42, 0, 23, 0, 1, 0, 13, 0, 20, 3, 232];
        let chunk = framed_chunk(&raw);

        let entity = compress_chunk_into_vec(&chunk, None, &params).unwrap();

        let size = decompress_cmp_entity_size(&entity).unwrap();
        assert_eq!(size, chunk.len());

        let mut dst = vec![0u8; size];
        let written = decompress_cmp_entity(&entity, None, &mut dst, None).unwrap();
        assert_eq!(written, chunk.len());
        assert_eq!(dst, chunk);
    }

    #[test]
    fn model_multi_round_trip_reports_updated_model() {
        let registry = Registry::builtin();
        let field_pars = [(4u32, 60u32)];
        let params = sample_params(CompressionMode::ModelMulti, &registry, &field_pars);

        let raw: Vec<u8> = vec![0, 42, 0, 23, 0, 1, 0, 13, 0, 20, 3, 232];
        let model: Vec<u8> = vec![0, 0, 0, 22, 0, 3, 0, 42, 0, 23, 0, 16];
        let chunk = framed_chunk(&raw);
        let model_chunk = framed_chunk(&model);

        let bound = compress_chunk_cmp_size_bound(&chunk).unwrap();
        let mut entity = vec![0u8; bound];
        let mut updated_enc = vec![0u8; model_chunk.len()];
        let written =
            compress_chunk(&chunk, Some(&model_chunk), &params, &mut entity, Some(&mut updated_enc)).unwrap();
        entity.truncate(written);

        let mut dst = vec![0u8; chunk.len()];
        let mut updated_dec = vec![0u8; model_chunk.len()];
        decompress_cmp_entity(&entity, Some(&model_chunk), &mut dst, Some(&mut updated_dec)).unwrap();

        assert_eq!(dst, chunk);
        assert_eq!(updated_dec, updated_enc);
    }

    #[test]
    fn empty_chunk_is_rejected() {
        let registry = Registry::builtin();
        let field_pars = [(1u32, 8u32)];
        let params = sample_params(CompressionMode::DiffZero, &registry, &field_pars);
        let mut dst = vec![0u8; 64];
        assert_eq!(
            compress_chunk(&[], None, &params, &mut dst, None).unwrap_err(),
            CmpError::ChunkTooSmall
        );
    }

    #[test]
    fn mismatched_chunk_types_are_rejected() {
        let registry = Registry::builtin();
        let field_pars = [(1u32, 8u32)];
        let params = sample_params(CompressionMode::DiffZero, &registry, &field_pars);

        let mut buf = Vec::new();
        let first = framed_chunk(&[0, 1, 0, 2]);
        buf.extend_from_slice(&first);
        let mut second_hdr = imagette_header(1);
        second_hdr.subservice = 6; // Smearing
        let mut second = vec![0u8; chunk::COLLECTION_PREFIX_SIZE + 9];
        chunk::write_framed_collection(&mut second, &second_hdr, &[0u8; 9]).unwrap();
        buf.extend_from_slice(&second);

        let mut dst = vec![0u8; 256];
        assert_eq!(
            compress_chunk(&buf, None, &params, &mut dst, None).unwrap_err(),
            CmpError::ChunkSubserviceInconsistent
        );
    }
}

