//! One typed collection: a 12-byte header plus a length-prefixed,
//! field-major-encoded payload.
//!
//! Layout on the wire: `header (12 bytes) | length (2 bytes) | payload`.
//! `length` counts payload bytes only and is filled in after the payload is
//! written, mirroring the two-phase "write then backfill" shape of the
//! reference encoder.

use smallvec::SmallVec;

use crate::bitio::{BitReader, BitWriter};
use crate::codes::{EscapePolicy, FieldCoder};
use crate::error::{CmpError, Result};
use crate::predictor::{update_model, CompressionMode, Predictor};
use crate::registry::{ChunkType, FieldKind, Registry};
use crate::residual::{map_to_signed, map_to_unsigned};

/// Fixed-layout 12-byte collection header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionHeader {
    /// 48-bit timestamp, held in the low 48 bits.
    pub timestamp: u64,
    pub configuration_id: u16,
    /// Fixed to [`PKT_TYPE_SCIENCE`] for every collection this crate emits.
    pub packet_type: u8,
    /// Determines the chunk type via [`ChunkType::from_subservice`].
    pub subservice: u8,
    pub ccd_id: u8,
    pub sequence_number: u8,
}

/// The one packet type this codec produces and accepts.
pub const PKT_TYPE_SCIENCE: u8 = 0;

/// Byte length of [`CollectionHeader`] on the wire.
pub const COLLECTION_HDR_SIZE: usize = 12;

/// Byte length of the payload length prefix that follows the header.
pub const COLLECTION_LEN_FIELD_SIZE: usize = 2;

impl CollectionHeader {
    /// Serializes this header into the first [`COLLECTION_HDR_SIZE`] bytes of `out`.
    pub fn write(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < COLLECTION_HDR_SIZE {
            return Err(CmpError::SmallBuf { needed: COLLECTION_HDR_SIZE, available: out.len() });
        }
        let ts = self.timestamp & 0x0000_FFFF_FFFF_FFFF;
        out[0..6].copy_from_slice(&ts.to_be_bytes()[2..8]);
        out[6..8].copy_from_slice(&self.configuration_id.to_be_bytes());
        out[8] = self.packet_type;
        out[9] = self.subservice;
        out[10] = self.ccd_id;
        out[11] = self.sequence_number;
        Ok(())
    }

    /// Parses a header from the first [`COLLECTION_HDR_SIZE`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < COLLECTION_HDR_SIZE {
            return Err(CmpError::ColSizeInconsistent);
        }
        let mut ts_buf = [0u8; 8];
        ts_buf[2..8].copy_from_slice(&data[0..6]);
        Ok(Self {
            timestamp: u64::from_be_bytes(ts_buf),
            configuration_id: u16::from_be_bytes([data[6], data[7]]),
            packet_type: data[8],
            subservice: data[9],
            ccd_id: data[10],
            sequence_number: data[11],
        })
    }

    /// The chunk type this header's subservice resolves to.
    #[must_use]
    pub const fn chunk_type(&self) -> ChunkType {
        ChunkType::from_subservice(self.subservice)
    }
}

/// Per-field encode/decode parameters for every field of a chunk type, in
/// [`ChunkType::fields`] order.
#[derive(Debug, Clone)]
pub struct CollectionParams<'a> {
    pub chunk_type: ChunkType,
    pub mode: CompressionMode,
    pub escape: EscapePolicy,
    pub model_value: u32,
    /// One `(golomb_par, spill)` pair per [`FieldKind`] in `chunk_type.fields()`.
    pub field_pars: &'a [(u32, u32)],
    pub registry: &'a Registry,
}

/// Encodes one collection's samples, field-major, into `writer`.
///
/// `samples[field_index]` holds the scalar values for that field across
/// every sample, flattened (`scalar_count() * sample_count` entries, x/y or
/// variance scalars interleaved in struct-definition order). `model`, when
/// `Some`, mirrors the same flattening and is required for `MODEL_*` modes.
/// Returns the updated model for `MODEL_*` modes (empty for `DIFF_*`/`Raw`).
pub fn encode_collection_fields(
    writer: &mut BitWriter<'_>,
    params: &CollectionParams<'_>,
    samples: &[&[u32]],
    model: Option<&[&[u32]]>,
) -> Result<Vec<Vec<u32>>> {
    let fields = params.chunk_type.fields();
    if samples.len() != fields.len() || params.field_pars.len() != fields.len() {
        return Err(CmpError::ParBuffers);
    }
    let bits = params.registry.max_used_bits(params.chunk_type)?;
    if bits.len() != fields.len() {
        return Err(CmpError::ParMaxUsedBits);
    }

    let mut updated_models = Vec::with_capacity(fields.len());

    for (idx, field) in fields.iter().enumerate() {
        let (golomb_par, spill) = params.field_pars[idx];
        if golomb_par == 0 {
            return Err(CmpError::ParSpecific("golomb_par"));
        }
        let max_used_bits = bits[idx];
        let coder = FieldCoder { golomb_par, spill, max_used_bits };
        let values = samples[idx];
        debug_assert_eq!(values.len() % field.scalar_count() as usize, 0);
        let field_model = model.map(|m| m[idx]);

        let mut predictor = Predictor::new(params.mode);
        let mut updated = Vec::with_capacity(values.len());

        for (i, &x) in values.iter().enumerate() {
            if x > crate::residual::mask_for(max_used_bits) {
                return Err(CmpError::DataValueTooLarge);
            }
            let model_sample = field_model.map_or(0, |m| m[i]);
            let predictor_value = predictor.predict(model_sample);
            let residual = x.wrapping_sub(predictor_value);
            let mapped = map_to_unsigned(residual, max_used_bits);

            params.escape.encode(writer, mapped, &coder)?;
            predictor.accept(x);

            if params.mode.is_model_relative() {
                updated.push(update_model(model_sample, x, params.model_value));
            }
        }

        updated_models.push(updated);
    }

    Ok(updated_models)
}

/// Decodes one collection's samples, field-major, from `reader`.
///
/// `sample_counts[field_index]` is the flattened scalar count to read for
/// that field (must equal `scalar_count() * sample_count`). Returns the
/// decoded values and, for `MODEL_*` modes, the recomputed updated model -
/// both flattened the same way as [`encode_collection_fields`]'s inputs.
pub fn decode_collection_fields(
    reader: &mut BitReader<'_>,
    params: &CollectionParams<'_>,
    sample_counts: &[usize],
    model: Option<&[&[u32]]>,
) -> Result<(Vec<Vec<u32>>, Vec<Vec<u32>>)> {
    let fields = params.chunk_type.fields();
    if sample_counts.len() != fields.len() || params.field_pars.len() != fields.len() {
        return Err(CmpError::ParBuffers);
    }
    let bits = params.registry.max_used_bits(params.chunk_type)?;
    if bits.len() != fields.len() {
        return Err(CmpError::ParMaxUsedBits);
    }

    let mut decoded = Vec::with_capacity(fields.len());
    let mut updated_models = Vec::with_capacity(fields.len());

    for (idx, field) in fields.iter().enumerate() {
        let (golomb_par, spill) = params.field_pars[idx];
        if golomb_par == 0 {
            return Err(CmpError::ParSpecific("golomb_par"));
        }
        let max_used_bits = bits[idx];
        let coder = FieldCoder { golomb_par, spill, max_used_bits };
        let count = sample_counts[idx];
        debug_assert_eq!(count % field.scalar_count() as usize, 0);
        let field_model = model.map(|m| m[idx]);

        let mut predictor = Predictor::new(params.mode);
        let mut values: SmallVec<[u32; 16]> = SmallVec::with_capacity(count);
        let mut updated = Vec::with_capacity(count);

        for i in 0..count {
            let model_sample = field_model.map_or(0, |m| m[i]);
            let predictor_value = predictor.predict(model_sample);

            let mapped = params.escape.decode(reader, &coder)?;
            let residual = map_to_signed(mapped, max_used_bits);
            let x = predictor_value.wrapping_add(residual) & crate::residual::mask_for(max_used_bits);

            predictor.accept(x);
            values.push(x);

            if params.mode.is_model_relative() {
                updated.push(update_model(model_sample, x, params.model_value));
            }
        }

        decoded.push(values.into_vec());
        updated_models.push(updated);
    }

    Ok((decoded, updated_models))
}

/// Pads `writer` to a byte boundary, writing zero bits, matching "any
/// trailing bits within the final byte are zero and ignored" on decode.
pub fn pad_to_byte_boundary(writer: &mut BitWriter<'_>) -> Result<()> {
    let rem = writer.bit_offset() % 8;
    if rem != 0 {
        writer.put(0, (8 - rem) as u32)?;
    }
    Ok(())
}

/// One field's worth of per-field `(golomb_par, spill)` configuration,
/// named for callers building a [`CollectionParams::field_pars`] slice
/// alongside a [`FieldKind`] list for documentation purposes.
pub type NamedFieldPar = (FieldKind, u32, u32);
