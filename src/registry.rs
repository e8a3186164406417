//! The type registry: chunk types, their ordered field lists, and the
//! per-field bit-width (`max_used_bits`) table.
//!
//! A collection's 12-byte header carries a subservice identifier, which
//! [`ChunkType::from_subservice`] maps onto one of the closed set of chunk
//! types. Each chunk type fixes an ordered list of [`FieldKind`]s; the
//! collection codec walks that list field-major, consulting [`Registry`]
//! for the `(golomb_par, spill, max_used_bits)` triple of every field.

use crate::error::{CmpError, Result};

/// The closed enumeration of chunk types a collection's subservice may
/// resolve to; all collections sharing one chunk must agree on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    NcamImagette,
    SatImagette,
    ShortCadence,
    LongCadence,
    OffsetBackground,
    Smearing,
    FChain,
    Unknown,
}

impl ChunkType {
    /// Maps a collection header's subservice byte to a chunk type.
    ///
    /// The concrete subservice numbering the flight software used is not
    /// among the files this crate was grounded on (no kept header defines
    /// `SST_*`); this crate defines its own small, stable numbering
    /// (documented in the crate's design notes) rather than guess at the
    /// original constants.
    #[must_use]
    pub const fn from_subservice(subservice: u8) -> Self {
        match subservice {
            1 => Self::NcamImagette,
            2 => Self::SatImagette,
            3 => Self::ShortCadence,
            4 => Self::LongCadence,
            5 => Self::OffsetBackground,
            6 => Self::Smearing,
            7 => Self::FChain,
            _ => Self::Unknown,
        }
    }

    /// The ordered field list a collection of this chunk type iterates,
    /// field-major, for every sample.
    #[must_use]
    pub const fn fields(&self) -> &'static [FieldKind] {
        use FieldKind::*;
        match self {
            Self::NcamImagette | Self::SatImagette => &[Pixel],
            Self::ShortCadence => &[ExpFlags, Fx, Ncob, Efx, Ecob],
            Self::LongCadence => &[ExpFlags, Fx, Ncob, Efx, Ecob, FxCobVariance],
            Self::FChain => &[Fx, Ncob, Efx, Ecob],
            Self::OffsetBackground => {
                &[OffsetMean, OffsetVariance, BackgroundMean, BackgroundVariance, BackgroundOutlierPixels]
            }
            Self::Smearing => &[SmearingMean, SmearingVarianceMean, SmearingOutlierPixels],
            Self::Unknown => &[],
        }
    }

    /// Whether this chunk type has a registered field layout at all; a
    /// chunk of `Unknown` type can only round-trip through raw mode.
    #[must_use]
    pub const fn is_codable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// One named field slot within a chunk type's sample layout.
///
/// Most kinds carry one scalar per sample; [`FieldKind::scalar_count`]
/// reports the handful that carry more (`x`/`y` pairs, or — for
/// [`FieldKind::FxCobVariance`] — the three covariance scalars the
/// original packs under a single parameter slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Pixel,
    ExpFlags,
    Fx,
    Ncob,
    Efx,
    Ecob,
    FxCobVariance,
    OffsetMean,
    OffsetVariance,
    BackgroundMean,
    BackgroundVariance,
    BackgroundOutlierPixels,
    SmearingMean,
    SmearingVarianceMean,
    SmearingOutlierPixels,
}

impl FieldKind {
    /// How many scalar residuals one sample of this field contributes,
    /// all sharing the same `(golomb_par, spill, max_used_bits)` triple.
    #[must_use]
    pub const fn scalar_count(&self) -> u32 {
        match self {
            Self::Ncob | Self::Ecob => 2,
            Self::FxCobVariance => 3,
            _ => 1,
        }
    }
}

/// Per-field `(golomb_par, spill, max_used_bits)` parameters for one chunk
/// type, indexed in [`ChunkType::fields`] order.
#[derive(Debug, Clone)]
pub struct FieldParams {
    pub golomb_par: u32,
    pub spill: u32,
    pub max_used_bits: u32,
}

/// The `max_used_bits` table: read-only process-wide configuration,
/// versioned so producers using different versions can still be decoded
/// (the version id travels inside the entity header).
///
/// The built-in version `0` table below is this crate's own default; the
/// original flight software's bit widths were not part of the kept source
/// excerpt, so these are a documented, self-consistent choice rather than a
/// transcription (see the crate's design notes).
#[derive(Debug, Clone)]
pub struct Registry {
    version: u8,
    table: &'static [(ChunkType, &'static [u32])],
}

const BUILTIN_TABLE: &[(ChunkType, &[u32])] = &[
    (ChunkType::NcamImagette, &[16]),
    (ChunkType::SatImagette, &[16]),
    (ChunkType::ShortCadence, &[8, 32, 32, 32, 32]),
    (ChunkType::LongCadence, &[8, 32, 32, 32, 32, 32]),
    (ChunkType::FChain, &[32, 32, 32, 32]),
    (ChunkType::OffsetBackground, &[32, 32, 32, 32, 8]),
    (ChunkType::Smearing, &[32, 32, 8]),
];

impl Registry {
    /// The one built-in registry version this crate ships (version `0`).
    #[must_use]
    pub const fn builtin() -> Self {
        Self { version: 0, table: BUILTIN_TABLE }
    }

    /// Builds a registry around a caller-supplied table, for a
    /// `max_used_bits_version` other than the built-in one. Writers are
    /// expected to install a replacement atomically, at initialization
    /// time, per the concurrency model.
    #[must_use]
    pub const fn custom(version: u8, table: &'static [(ChunkType, &'static [u32])]) -> Self {
        Self { version, table }
    }

    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// The declared `max_used_bits` for every field of `chunk_type`, in
    /// [`ChunkType::fields`] order.
    pub fn max_used_bits(&self, chunk_type: ChunkType) -> Result<&'static [u32]> {
        self.table
            .iter()
            .find(|(ty, _)| *ty == chunk_type)
            .map(|(_, bits)| *bits)
            .ok_or(CmpError::ParMaxUsedBits)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subservice_maps_to_expected_chunk_type() {
        assert_eq!(ChunkType::from_subservice(1), ChunkType::NcamImagette);
        assert_eq!(ChunkType::from_subservice(6), ChunkType::Smearing);
        assert_eq!(ChunkType::from_subservice(200), ChunkType::Unknown);
    }

    #[test]
    fn every_codable_chunk_type_has_a_registry_entry() {
        let registry = Registry::builtin();
        for &(ty, expected_bits) in BUILTIN_TABLE {
            let bits = registry.max_used_bits(ty).unwrap();
            assert_eq!(bits.len(), ty.fields().len());
            assert_eq!(bits, expected_bits);
        }
    }

    #[test]
    fn unknown_chunk_type_is_not_codable_and_has_no_fields() {
        assert!(!ChunkType::Unknown.is_codable());
        assert!(ChunkType::Unknown.fields().is_empty());
        assert!(Registry::builtin().max_used_bits(ChunkType::Unknown).is_err());
    }

    #[test]
    fn ncob_and_fx_cob_variance_carry_more_than_one_scalar() {
        assert_eq!(FieldKind::Ncob.scalar_count(), 2);
        assert_eq!(FieldKind::Ecob.scalar_count(), 2);
        assert_eq!(FieldKind::FxCobVariance.scalar_count(), 3);
        assert_eq!(FieldKind::Fx.scalar_count(), 1);
    }
}
