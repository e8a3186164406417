//! The entity header: the self-describing container every compressed
//! chunk is wrapped in, plus the `Empty -> Sized -> Built -> Sealed`
//! builder state machine and its inverse parser.
//!
//! Fixed layout, big-endian, 30 bytes followed by a per-field
//! `(golomb_par, spill)` trailer:
//!
//! | Offset | Width | Field |
//! |---|---|---|
//! | 0 | 4 | version_id |
//! | 4 | 3 | total size |
//! | 7 | 3 | original data size |
//! | 10 | 6 | start_time (4 coarse + 2 fine) |
//! | 16 | 6 | end_time |
//! | 22 | 2 | data_type (15 bit) + raw flag (top bit) |
//! | 24 | 1 | cmp_mode_used |
//! | 25 | 1 | model_value_used |
//! | 26 | 1 | model_id |
//! | 27 | 1 | model_counter |
//! | 28 | 1 | max_used_bits_version |
//! | 29 | 1 | lossy_cmp_par_used |
//! | 30 | variable | per-field (golomb_par, spill) trailer |
//! | trailer end | 16, optional | adaptive imagette {ap1, ap2} entry (write-only, see [`AdaptiveImagetteParams`]) |

use bit_field::BitField;

use crate::error::{CmpError, Result};
use crate::registry::ChunkType;

/// Byte length of the fixed portion of the entity header, before the
/// per-field parameter trailer.
pub const FIXED_HEADER_SIZE: usize = 30;

/// Byte length contributed by one field's `(golomb_par, spill)` trailer
/// entry: two big-endian `u32`s.
pub const TRAILER_ENTRY_SIZE: usize = 8;

/// Set on `version_id` when this software codec produced the entity, as
/// opposed to the hardware/ICU-ASW path that shares the same major/minor
/// numbering space (see the crate's design notes: the two paths are
/// indistinguishable once produced, an ambiguity this crate carries
/// forward rather than resolves).
pub const VERSION_ID_SOFTWARE_BIT: u32 = 1 << 31;

/// Adaptive imagette parameter pair, recorded in the trailer when a
/// producer used adaptive (as opposed to fixed) Golomb parameters. This
/// crate does not implement a selection algorithm; it only carries
/// whatever the caller supplies through to the trailer.
///
/// [`EntityBuilder`] can write this extension, but [`EntityHeader::parse`]
/// can never reconstruct it (the closed `chunk_type` enumeration has no
/// separate adaptive-imagette variant to key off). [`crate::compress_chunk`]
/// therefore never sets it; a caller that needs round-trip adaptive-trailer
/// support must build/parse headers directly through this module and track
/// the trailer's extra 16 bytes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveImagetteParams {
    pub ap1_golomb_par: u32,
    pub ap1_spill: u32,
    pub ap2_golomb_par: u32,
    pub ap2_spill: u32,
}

/// Caller-supplied fields needed to build an entity header; everything
/// here is known before a single sample has been encoded.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub version_id: u32,
    pub original_size: u32,
    pub start_time: u64,
    pub end_time: u64,
    pub chunk_type: ChunkType,
    pub raw_mode: bool,
    pub cmp_mode_used: u8,
    pub model_value_used: u8,
    pub model_id: u8,
    pub model_counter: u8,
    pub max_used_bits_version: u8,
    pub lossy_cmp_par_used: u8,
    /// Extra `{ap1, ap2}` trailer entry for a producer that used adaptive
    /// (rather than fixed) imagette parameters. Only valid for
    /// `ChunkType::NcamImagette`/`SatImagette`; `write_cmp_pars` rejects it
    /// for any other chunk type.
    pub adaptive_params: Option<AdaptiveImagetteParams>,
}

/// The parsed, immutable view of an entity header, returned by
/// [`EntityHeader::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHeader {
    pub version_id: u32,
    pub total_size: u32,
    pub original_size: u32,
    pub start_time: u64,
    pub end_time: u64,
    pub chunk_type: ChunkType,
    pub raw_mode: bool,
    pub cmp_mode_used: u8,
    pub model_value_used: u8,
    pub model_id: u8,
    pub model_counter: u8,
    pub max_used_bits_version: u8,
    pub lossy_cmp_par_used: u8,
    /// One `(golomb_par, spill)` pair per field, in `chunk_type.fields()` order.
    pub field_pars: Vec<(u32, u32)>,
    /// Always `None` from [`EntityHeader::parse`]: nothing in the fixed
    /// header signals whether the trailer carries the extra
    /// adaptive-imagette entry, so it cannot be rediscovered from the
    /// entity alone. Kept on this type only so a caller building a header
    /// by hand (mirroring [`EntityConfig`]) has a matching field; see
    /// [`AdaptiveImagetteParams`]'s doc comment.
    pub adaptive_params: Option<AdaptiveImagetteParams>,
}

/// Byte length of the adaptive-imagette trailer extension: four big-endian
/// `u32`s (`ap1_golomb_par`, `ap1_spill`, `ap2_golomb_par`, `ap2_spill`).
pub const ADAPTIVE_TRAILER_SIZE: usize = 16;

impl EntityHeader {
    /// Whether the top bit of `version_id` marks this as software-codec
    /// produced (as opposed to the ICU ASW hardware path).
    #[must_use]
    pub const fn is_software_codec(&self) -> bool {
        self.version_id & VERSION_ID_SOFTWARE_BIT != 0
    }

    /// The legacy major/minor reading of `version_id`, meaningful only on
    /// the software-codec path.
    #[must_use]
    pub const fn major(&self) -> u16 {
        ((self.version_id & 0x7FFF_0000) >> 16) as u16
    }

    #[must_use]
    pub const fn minor(&self) -> u16 {
        (self.version_id & 0xFFFF) as u16
    }

    /// Total byte length this header declares for the whole entity,
    /// including the header itself.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size as usize
    }

    /// Parses a fixed header plus trailer from the front of `entity`.
    ///
    /// Rejects unsupported/`Unknown` data types and detects size
    /// inconsistencies between the declared `total_size` and the buffer
    /// actually supplied.
    pub fn parse(entity: &[u8]) -> Result<Self> {
        if entity.is_empty() {
            return Err(CmpError::EntityNull);
        }
        if entity.len() < FIXED_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall);
        }

        let version_id = u32::from_be_bytes([entity[0], entity[1], entity[2], entity[3]]);
        let total_size = read_u24(&entity[4..7]);
        let original_size = read_u24(&entity[7..10]);
        let start_time = read_time48(&entity[10..16]);
        let end_time = read_time48(&entity[16..22]);

        let data_type_field = u16::from_be_bytes([entity[22], entity[23]]);
        let raw_mode = data_type_field.get_bit(15);
        let data_type = data_type_field.get_bits(0..15);

        let cmp_mode_used = entity[24];
        let model_value_used = entity[25];
        let model_id = entity[26];
        let model_counter = entity[27];
        let max_used_bits_version = entity[28];
        let lossy_cmp_par_used = entity[29];

        let chunk_type = ChunkType::from_subservice(data_type as u8);
        if !chunk_type.is_codable() {
            return Err(CmpError::IntDataTypeUnsupported);
        }

        if end_time < start_time {
            return Err(CmpError::EntityTimestamp);
        }

        let field_count = chunk_type.fields().len();
        let trailer_size = field_count * TRAILER_ENTRY_SIZE;
        let declared_header_size = FIXED_HEADER_SIZE + trailer_size;
        if entity.len() < declared_header_size {
            return Err(CmpError::EntityHeader);
        }
        if (total_size as usize) < declared_header_size {
            return Err(CmpError::EntityHeader);
        }

        let mut field_pars = Vec::with_capacity(field_count);
        let trailer = &entity[FIXED_HEADER_SIZE..declared_header_size];
        for chunk in trailer.chunks_exact(TRAILER_ENTRY_SIZE) {
            let golomb_par = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let spill = u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            field_pars.push((golomb_par, spill));
        }

        // `parse` never reconstructs the adaptive trailer entry: nothing in
        // the fixed header signals its presence (the closed `chunk_type`
        // enumeration has no separate "adaptive imagette" variant to key
        // off, matching the original library's own adaptive-header parser,
        // which is never actually called from its main parse path either).
        // A caller that built an entity with `adaptive_params` must track
        // that fact itself to re-derive the trailer's extra 16 bytes.
        let adaptive_params = None;

        Ok(Self {
            version_id,
            total_size,
            original_size,
            start_time,
            end_time,
            chunk_type,
            raw_mode,
            cmp_mode_used,
            model_value_used,
            model_id,
            model_counter,
            max_used_bits_version,
            lossy_cmp_par_used,
            field_pars,
            adaptive_params,
        })
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

fn write_u24(out: &mut [u8], value: u32) {
    out[0] = (value >> 16) as u8;
    out[1] = (value >> 8) as u8;
    out[2] = value as u8;
}

fn read_time48(bytes: &[u8]) -> u64 {
    let coarse = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let fine = u16::from_be_bytes([bytes[4], bytes[5]]);
    (u64::from(coarse) << 16) | u64::from(fine)
}

fn write_time48(out: &mut [u8], time: u64) {
    let coarse = (time >> 16) as u32;
    let fine = (time & 0xFFFF) as u16;
    out[0..4].copy_from_slice(&coarse.to_be_bytes());
    out[4..6].copy_from_slice(&fine.to_be_bytes());
}

/// Builder for an entity header, carrying the `Empty -> Sized -> Built ->
/// Sealed` states from the specification as runtime-checked phases
/// rather than distinct types, matching the plain-struct style the rest
/// of this crate's configuration types use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Empty,
    Sized,
    Built,
    Sealed,
}

#[derive(Debug, Clone)]
pub struct EntityBuilder {
    state: BuilderState,
    size_hint: usize,
    fields: Option<(EntityConfig, Vec<(u32, u32)>)>,
    total_size: usize,
}

impl EntityBuilder {
    /// `Empty` state: no fields committed yet.
    #[must_use]
    pub fn new() -> Self {
        Self { state: BuilderState::Empty, size_hint: 0, fields: None, total_size: 0 }
    }

    /// `Empty -> Sized`: records the caller's size estimate, used to
    /// pre-size an output buffer before the exact trailer length is known.
    pub fn create(mut self, size_hint: usize) -> Result<Self> {
        if self.state != BuilderState::Empty {
            return Err(CmpError::Generic);
        }
        self.size_hint = size_hint;
        self.state = BuilderState::Sized;
        Ok(self)
    }

    /// `Sized -> Built`: commits the header fields and per-field
    /// compression parameters; the trailer length is now fixed.
    ///
    /// Rejects `cfg.adaptive_params` for any chunk type other than
    /// `NcamImagette`/`SatImagette` (the only two the adaptive trailer
    /// extension applies to).
    pub fn write_cmp_pars(mut self, cfg: EntityConfig, field_pars: Vec<(u32, u32)>) -> Result<Self> {
        if self.state != BuilderState::Sized {
            return Err(CmpError::Generic);
        }
        if field_pars.len() != cfg.chunk_type.fields().len() {
            return Err(CmpError::ParBuffers);
        }
        let is_imagette = matches!(cfg.chunk_type, ChunkType::NcamImagette | ChunkType::SatImagette);
        if cfg.adaptive_params.is_some() && !is_imagette {
            return Err(CmpError::ParBuffers);
        }
        self.fields = Some((cfg, field_pars));
        self.state = BuilderState::Built;
        Ok(self)
    }

    /// `Built -> Sealed`: fixes the final total entity size (header plus
    /// every collection that follows it).
    pub fn set_size(mut self, total_size: usize) -> Result<Self> {
        if self.state != BuilderState::Built {
            return Err(CmpError::Generic);
        }
        let (cfg, field_pars) = self.fields.as_ref().expect("Built state always carries fields");
        let mut header_len = FIXED_HEADER_SIZE + field_pars.len() * TRAILER_ENTRY_SIZE;
        if cfg.adaptive_params.is_some() {
            header_len += ADAPTIVE_TRAILER_SIZE;
        }
        if total_size < header_len {
            return Err(CmpError::EntityHeader);
        }
        if total_size > 0x00FF_FFFF {
            return Err(CmpError::ChunkTooLarge(total_size));
        }
        self.total_size = total_size;
        self.state = BuilderState::Sealed;
        Ok(self)
    }

    /// Serializes the header (`Sealed` state only) into `out`, returning
    /// the number of bytes written.
    pub fn finish(&self, out: &mut [u8]) -> Result<usize> {
        if self.state != BuilderState::Sealed {
            return Err(CmpError::Generic);
        }
        let (cfg, field_pars) = self.fields.as_ref().expect("Sealed state always carries fields");
        let trailer_end = FIXED_HEADER_SIZE + field_pars.len() * TRAILER_ENTRY_SIZE;
        let header_len = trailer_end + cfg.adaptive_params.map_or(0, |_| ADAPTIVE_TRAILER_SIZE);
        if out.len() < header_len {
            return Err(CmpError::SmallBuf { needed: header_len, available: out.len() });
        }

        out[0..4].copy_from_slice(&cfg.version_id.to_be_bytes());
        write_u24(&mut out[4..7], self.total_size as u32);
        write_u24(&mut out[7..10], cfg.original_size);
        write_time48(&mut out[10..16], cfg.start_time);
        write_time48(&mut out[16..22], cfg.end_time);

        let data_type_code = match cfg.chunk_type {
            ChunkType::NcamImagette => 1u16,
            ChunkType::SatImagette => 2,
            ChunkType::ShortCadence => 3,
            ChunkType::LongCadence => 4,
            ChunkType::OffsetBackground => 5,
            ChunkType::Smearing => 6,
            ChunkType::FChain => 7,
            ChunkType::Unknown => return Err(CmpError::IntDataTypeUnsupported),
        };
        let mut data_type_field = 0u16;
        data_type_field.set_bits(0..15, data_type_code);
        data_type_field.set_bit(15, cfg.raw_mode);
        out[22..24].copy_from_slice(&data_type_field.to_be_bytes());

        out[24] = cfg.cmp_mode_used;
        out[25] = cfg.model_value_used;
        out[26] = cfg.model_id;
        out[27] = cfg.model_counter;
        out[28] = cfg.max_used_bits_version;
        out[29] = cfg.lossy_cmp_par_used;

        let trailer = &mut out[FIXED_HEADER_SIZE..trailer_end];
        for (slot, &(golomb_par, spill)) in trailer.chunks_exact_mut(TRAILER_ENTRY_SIZE).zip(field_pars) {
            slot[0..4].copy_from_slice(&golomb_par.to_be_bytes());
            slot[4..8].copy_from_slice(&spill.to_be_bytes());
        }

        if let Some(ap) = cfg.adaptive_params {
            let a = &mut out[trailer_end..header_len];
            a[0..4].copy_from_slice(&ap.ap1_golomb_par.to_be_bytes());
            a[4..8].copy_from_slice(&ap.ap1_spill.to_be_bytes());
            a[8..12].copy_from_slice(&ap.ap2_golomb_par.to_be_bytes());
            a[12..16].copy_from_slice(&ap.ap2_spill.to_be_bytes());
        }

        Ok(header_len)
    }

    /// The header length `finish` would write, without building a header:
    /// the two-phase sizing pattern used across this crate's public API.
    #[must_use]
    pub fn header_len(field_count: usize) -> usize {
        FIXED_HEADER_SIZE + field_count * TRAILER_ENTRY_SIZE
    }

    /// Like [`Self::header_len`] but including the adaptive-imagette
    /// trailer extension, for callers that plan to supply
    /// `adaptive_params`.
    #[must_use]
    pub fn header_len_with_adaptive(field_count: usize) -> usize {
        Self::header_len(field_count) + ADAPTIVE_TRAILER_SIZE
    }
}

impl Default for EntityBuilder {
    fn default() -> Self {
        Self::new()
    }
}
