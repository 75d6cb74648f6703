//! Color-encoded feature ids for GPU picking.
//!
//! Every pickable triangle is drawn a second time into a hidden target
//! with a flat color that encodes which feature it belongs to:
//!
//! | channel | content |
//! |---|---|
//! | R | feature id, high byte |
//! | G | feature id, low byte |
//! | B | 8-bit hash of the style layer id |
//! | A | height / max height, quantized to 8 bits |
//!
//! Id 0 and id 65535 never appear in encoded output, so a cleared target
//! (all zeros) or a saturated pixel both read back as "no feature".

/// Smallest encodable feature id.
pub const MIN_FEATURE_ID: u16 = 1;

/// Largest encodable feature id.
pub const MAX_FEATURE_ID: u16 = 65534;

/// A feature id, layer hash and height packed into four color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureIdCode([u8; 4]);

impl FeatureIdCode {
    /// Encode a feature for the picking target.
    ///
    /// `feature_id` is clamped into `[MIN_FEATURE_ID, MAX_FEATURE_ID]`;
    /// `height / max_height` is clamped into `[0, 1]` (a non-positive
    /// `max_height` encodes zero).
    #[must_use]
    pub fn encode(feature_id: u64, layer_hash: u8, height: f64, max_height: f64) -> Self {
        let [hi, lo] = clamp_feature_id(feature_id).to_be_bytes();
        Self([hi, lo, layer_hash, quantize_height(height, max_height)])
    }

    /// Wrap four channels read back from the picking target.
    #[must_use]
    pub fn from_rgba(rgba: [u8; 4]) -> Self {
        Self(rgba)
    }

    /// Unpack a `0xRRGGBBAA` integer.
    #[must_use]
    pub fn from_u32(packed: u32) -> Self {
        Self(packed.to_be_bytes())
    }

    /// The raw channels.
    #[must_use]
    pub fn rgba(self) -> [u8; 4] {
        self.0
    }

    /// Pack as `0xRRGGBBAA`.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Channels as a normalized vertex color.
    #[must_use]
    pub fn to_normalized(self) -> [f32; 4] {
        self.0.map(|c| f32::from(c) / 255.0)
    }

    /// The encoded feature id, or `None` for a reserved value.
    #[must_use]
    pub fn feature_id(self) -> Option<u16> {
        let id = u16::from_be_bytes([self.0[0], self.0[1]]);
        (MIN_FEATURE_ID..=MAX_FEATURE_ID).contains(&id).then_some(id)
    }

    /// The encoded layer hash. Approximate: distinct layers may collide.
    #[must_use]
    pub fn layer_hash(self) -> u8 {
        self.0[2]
    }

    /// The encoded height as a fraction of the max height.
    #[must_use]
    pub fn height_fraction(self) -> f64 {
        f64::from(self.0[3]) / 255.0
    }

    /// The encoded height scaled back up by `max_height`.
    #[must_use]
    pub fn height(self, max_height: f64) -> f64 {
        self.height_fraction() * max_height.max(0.0)
    }
}

/// Clamp a tile feature id into the encodable range.
#[must_use]
pub fn clamp_feature_id(feature_id: u64) -> u16 {
    let clamped = feature_id.clamp(u64::from(MIN_FEATURE_ID), u64::from(MAX_FEATURE_ID));
    #[allow(clippy::cast_possible_truncation)]
    let id = clamped as u16;
    id
}

/// 8-bit hash of a style layer id.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn layer_hash(layer_id: &str) -> u8 {
    let hash = layer_id
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    (hash & 0xFF) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize_height(height: f64, max_height: f64) -> u8 {
    if max_height <= 0.0 || height.is_nan() {
        return 0;
    }
    ((height / max_height).clamp(0.0, 1.0) * 255.0).round() as u8
}
