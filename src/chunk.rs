//! The chunk framer: walks a chunk's back-to-back collections, validating
//! that they all agree on chunk type.
//!
//! Both the caller-supplied (uncompressed) chunk and the compressed
//! entity's payload area share one on-wire shape per collection: a
//! 12-byte [`CollectionHeader`], a 2-byte big-endian payload length, then
//! the payload itself (raw bytes on the input side, an encoded bitstream
//! inside the entity).

use crate::collection::{CollectionHeader, COLLECTION_HDR_SIZE, COLLECTION_LEN_FIELD_SIZE};
use crate::error::{CmpError, Result};
use crate::registry::ChunkType;

/// One collection's header plus a borrowed view of its payload bytes,
/// as found while walking a chunk or entity payload area.
#[derive(Debug, Clone, Copy)]
pub struct CollectionView<'a> {
    pub header: CollectionHeader,
    pub payload: &'a [u8],
    /// Byte offset of `header` within the buffer this view was taken from.
    pub offset: usize,
}

/// Byte length of one collection's header + length prefix, before payload.
pub const COLLECTION_PREFIX_SIZE: usize = COLLECTION_HDR_SIZE + COLLECTION_LEN_FIELD_SIZE;

/// Walks `bytes` as a back-to-back sequence of framed collections.
///
/// Fails with [`CmpError::ChunkTooSmall`] if `bytes` is empty or does not
/// contain at least one full collection, and with
/// [`CmpError::ChunkSizeInconsistent`] if the trailing bytes do not form a
/// whole collection.
pub fn iter_collections(bytes: &[u8]) -> Result<Vec<CollectionView<'_>>> {
    if bytes.is_empty() {
        return Err(CmpError::ChunkTooSmall);
    }
    if bytes.len() < COLLECTION_PREFIX_SIZE {
        return Err(CmpError::ChunkTooSmall);
    }

    let mut views = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        if bytes.len() - offset < COLLECTION_PREFIX_SIZE {
            return Err(CmpError::ChunkSizeInconsistent);
        }
        let header = CollectionHeader::parse(&bytes[offset..])?;
        let len_bytes = &bytes[offset + COLLECTION_HDR_SIZE..offset + COLLECTION_PREFIX_SIZE];
        let payload_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

        let payload_start = offset + COLLECTION_PREFIX_SIZE;
        let payload_end = payload_start
            .checked_add(payload_len)
            .ok_or(CmpError::ChunkSizeInconsistent)?;
        if payload_end > bytes.len() {
            return Err(CmpError::ChunkSizeInconsistent);
        }

        views.push(CollectionView { header, payload: &bytes[payload_start..payload_end], offset });
        offset = payload_end;
    }

    if offset != bytes.len() {
        return Err(CmpError::ChunkSizeInconsistent);
    }

    Ok(views)
}

/// Determines the chunk's single chunk type from its first collection and
/// validates every subsequent collection agrees.
///
/// Fails with [`CmpError::ColSubserviceUnsupported`] if that chunk type has
/// no registered field layout ([`ChunkType::is_codable`]) — a collection
/// claiming an unknown subservice is malformed, not just unregistered.
pub fn validate_homogeneous_chunk_type(views: &[CollectionView<'_>]) -> Result<ChunkType> {
    let first = views.first().ok_or(CmpError::ChunkTooSmall)?;
    let chunk_type = first.header.chunk_type();
    if !chunk_type.is_codable() {
        return Err(CmpError::ColSubserviceUnsupported);
    }
    for view in &views[1..] {
        if view.header.chunk_type() != chunk_type {
            return Err(CmpError::ChunkSubserviceInconsistent);
        }
    }
    Ok(chunk_type)
}

/// Writes one collection's header + length prefix + payload into `out` at
/// `out`'s current start, returning the number of bytes written.
pub fn write_framed_collection(out: &mut [u8], header: &CollectionHeader, payload: &[u8]) -> Result<usize> {
    let total = COLLECTION_PREFIX_SIZE + payload.len();
    if out.len() < total {
        return Err(CmpError::SmallBuf { needed: total, available: out.len() });
    }
    if payload.len() > u16::MAX as usize {
        return Err(CmpError::IntCmpColTooLarge);
    }
    header.write(&mut out[..COLLECTION_HDR_SIZE])?;
    out[COLLECTION_HDR_SIZE..COLLECTION_PREFIX_SIZE]
        .copy_from_slice(&(payload.len() as u16).to_be_bytes());
    out[COLLECTION_PREFIX_SIZE..total].copy_from_slice(payload);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PKT_TYPE_SCIENCE;

    fn sample_header(subservice: u8, seq: u8) -> CollectionHeader {
        CollectionHeader {
            timestamp: 0x1234_5678_9ABC,
            configuration_id: 7,
            packet_type: PKT_TYPE_SCIENCE,
            subservice,
            ccd_id: 0,
            sequence_number: seq,
        }
    }

    #[test]
    fn empty_chunk_is_too_small() {
        assert_eq!(iter_collections(&[]).unwrap_err(), CmpError::ChunkTooSmall);
    }

    #[test]
    fn single_collection_roundtrips() {
        let hdr = sample_header(1, 0);
        let payload = [1u8, 2, 3, 4];
        let mut buf = vec![0u8; COLLECTION_PREFIX_SIZE + payload.len()];
        let n = write_framed_collection(&mut buf, &hdr, &payload).unwrap();
        assert_eq!(n, buf.len());

        let views = iter_collections(&buf).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].header, hdr);
        assert_eq!(views[0].payload, payload);
        assert_eq!(validate_homogeneous_chunk_type(&views).unwrap(), ChunkType::NcamImagette);
    }

    #[test]
    fn mismatched_subservice_is_inconsistent() {
        let mut buf = Vec::new();
        for (subservice, seq) in [(1u8, 0u8), (6u8, 1u8)] {
            let hdr = sample_header(subservice, seq);
            let payload = [0u8; 2];
            let mut frame = vec![0u8; COLLECTION_PREFIX_SIZE + payload.len()];
            write_framed_collection(&mut frame, &hdr, &payload).unwrap();
            buf.extend_from_slice(&frame);
        }
        let views = iter_collections(&buf).unwrap();
        assert_eq!(
            validate_homogeneous_chunk_type(&views).unwrap_err(),
            CmpError::ChunkSubserviceInconsistent
        );
    }

    #[test]
    fn unknown_chunk_type_is_rejected_before_registry_lookup() {
        let hdr = sample_header(200, 0);
        let payload = [0u8; 2];
        let mut buf = vec![0u8; COLLECTION_PREFIX_SIZE + payload.len()];
        write_framed_collection(&mut buf, &hdr, &payload).unwrap();
        let views = iter_collections(&buf).unwrap();
        assert_eq!(
            validate_homogeneous_chunk_type(&views).unwrap_err(),
            CmpError::ColSubserviceUnsupported
        );
    }

    #[test]
    fn truncated_payload_is_size_inconsistent() {
        let hdr = sample_header(1, 0);
        let payload = [1u8, 2, 3, 4];
        let mut buf = vec![0u8; COLLECTION_PREFIX_SIZE + payload.len()];
        write_framed_collection(&mut buf, &hdr, &payload).unwrap();
        let truncated = &buf[..buf.len() - 1];
        assert_eq!(iter_collections(truncated).unwrap_err(), CmpError::ChunkSizeInconsistent);
    }
}
