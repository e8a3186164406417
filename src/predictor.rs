//! Predictor dispatch and model update.
//!
//! `MODEL_*` compression modes predict each sample from the caller-supplied
//! model buffer and, after encoding, recompute an updated model the decoder
//! derives the same way. `DIFF_*` modes predict from the previous accepted
//! sample of the same field, with the first sample of a field predicted by
//! zero.

/// The five compression modes a collection may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Payload is copied verbatim (after per-field byte-swap); no codec runs.
    Raw,
    /// Model-relative residual, zero-escape outlier fallback.
    ModelZero,
    /// Model-relative residual, multi-escape outlier fallback.
    ModelMulti,
    /// Previous-sample-relative residual, zero-escape outlier fallback.
    DiffZero,
    /// Previous-sample-relative residual, multi-escape outlier fallback.
    DiffMulti,
}

impl CompressionMode {
    /// Whether this mode predicts from the model buffer (`true`) or from the
    /// previous accepted sample (`false`). Meaningless for `Raw`.
    #[must_use]
    pub const fn is_model_relative(&self) -> bool {
        matches!(self, Self::ModelZero | Self::ModelMulti)
    }

    /// The numeric `cmp_mode_used` stored in the entity header trailer.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::ModelZero => 1,
            Self::ModelMulti => 2,
            Self::DiffZero => 3,
            Self::DiffMulti => 4,
        }
    }

    /// Inverse of [`CompressionMode::to_code`].
    pub const fn from_code(code: u8) -> crate::error::Result<Self> {
        match code {
            0 => Ok(Self::Raw),
            1 => Ok(Self::ModelZero),
            2 => Ok(Self::ModelMulti),
            3 => Ok(Self::DiffZero),
            4 => Ok(Self::DiffMulti),
            _ => Err(crate::error::CmpError::EntityHeader),
        }
    }

    /// The escape policy this mode implies; meaningless (but harmless) for `Raw`.
    #[must_use]
    pub const fn escape_policy(self) -> crate::codes::EscapePolicy {
        match self {
            Self::ModelZero | Self::DiffZero | Self::Raw => crate::codes::EscapePolicy::Zero,
            Self::ModelMulti | Self::DiffMulti => crate::codes::EscapePolicy::Multi,
        }
    }
}

/// Per-field predictor state carried across one field's samples within a
/// collection.
///
/// `DIFF_*` modes need the previous sample; `MODEL_*` modes read the model
/// buffer directly and carry no state of their own, but a `Predictor` is
/// still constructed for them so the caller has one uniform type regardless
/// of mode.
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    mode: CompressionMode,
    previous: u32,
}

impl Predictor {
    /// Starts a fresh predictor for one field; `DIFF_*`'s first sample predicts zero.
    #[must_use]
    pub const fn new(mode: CompressionMode) -> Self {
        Self { mode, previous: 0 }
    }

    /// Returns the predictor for the next sample. `model_sample` is ignored
    /// for `DIFF_*` modes and for `Raw` (which never calls this).
    #[must_use]
    pub const fn predict(&self, model_sample: u32) -> u32 {
        if self.mode.is_model_relative() {
            model_sample
        } else {
            self.previous
        }
    }

    /// Records the most recently accepted (reconstructed) sample so the next
    /// `DIFF_*` prediction uses it. A no-op for `MODEL_*`/`Raw`.
    pub fn accept(&mut self, sample: u32) {
        if !self.mode.is_model_relative() {
            self.previous = sample;
        }
    }
}

/// `model'[i,f] = round( ((16 − v)·predictor + v·x) / 16 )`, `v = model_value
/// ∈ [0, 16]`. Computed in `u64` so the intermediate weighted sum cannot
/// overflow regardless of how wide `predictor`/`sample` are, then rounded
/// half-away-from-zero (both operands are non-negative, so "away from zero"
/// is simply the usual round-half-up).
#[must_use]
pub fn update_model(predictor: u32, sample: u32, model_value: u32) -> u32 {
    debug_assert!(model_value <= 16, "model_value out of [0, 16]");
    let v = u64::from(model_value);
    let sum = (16 - v) * u64::from(predictor) + v * u64::from(sample);
    let rounded = (sum + 8) / 16;
    rounded as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_value_zero_retains_model() {
        assert_eq!(update_model(100, 999, 0), 100);
    }

    #[test]
    fn model_value_sixteen_replaces_with_sample() {
        assert_eq!(update_model(100, 999, 16), 999);
    }

    #[test]
    fn model_value_eleven_worked_example() {
        // From the worked chunk example: predictor=22, sample=23, v=11.
        // round(((16-11)*22 + 11*23)/16) = round((110+253)/16) = round(363/16) = round(22.6875) = 23.
        assert_eq!(update_model(22, 23, 11), 23);
    }

    #[test]
    fn update_moves_toward_sample_not_past_it() {
        for v in 1u32..16 {
            let updated = update_model(10, 1000, v);
            assert!((10..=1000).contains(&updated));
        }
    }

    #[test]
    fn diff_predictor_tracks_previous_sample() {
        let mut p = Predictor::new(CompressionMode::DiffZero);
        assert_eq!(p.predict(0), 0);
        p.accept(42);
        assert_eq!(p.predict(0), 42);
        p.accept(7);
        assert_eq!(p.predict(0), 7);
    }

    #[test]
    fn model_predictor_reads_model_buffer_ignoring_previous() {
        let mut p = Predictor::new(CompressionMode::ModelMulti);
        assert_eq!(p.predict(55), 55);
        p.accept(999);
        assert_eq!(p.predict(55), 55);
    }

    #[test]
    fn mode_code_roundtrips() {
        for mode in [
            CompressionMode::Raw,
            CompressionMode::ModelZero,
            CompressionMode::ModelMulti,
            CompressionMode::DiffZero,
            CompressionMode::DiffMulti,
        ] {
            assert_eq!(CompressionMode::from_code(mode.to_code()).unwrap(), mode);
        }
        assert!(CompressionMode::from_code(200).is_err());
    }

    #[test]
    fn escape_policy_matches_mode_family() {
        use crate::codes::EscapePolicy;
        assert_eq!(CompressionMode::ModelZero.escape_policy(), EscapePolicy::Zero);
        assert_eq!(CompressionMode::DiffZero.escape_policy(), EscapePolicy::Zero);
        assert_eq!(CompressionMode::ModelMulti.escape_policy(), EscapePolicy::Multi);
        assert_eq!(CompressionMode::DiffMulti.escape_policy(), EscapePolicy::Multi);
    }

    proptest::proptest! {
        #[test]
        fn model_law(predictor in 0u32..=0xFFFF, sample in 0u32..=0xFFFF, v in 0u32..=16) {
            let updated = update_model(predictor, sample, v);
            if v > 0 {
                let dist_before = predictor.abs_diff(sample);
                let dist_after = updated.abs_diff(sample);
                proptest::prop_assert!(dist_after <= dist_before);
            } else {
                proptest::prop_assert_eq!(updated, predictor);
            }
        }
    }
}
