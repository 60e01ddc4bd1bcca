//! Palette lookup: (key, intensity) to RGB.

use derive_more::{Display, Error};
use rgb::RGB8;
use serde::Deserialize;

/// Errors building a palette.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum PaletteError {
    #[display("palette must contain at least one color")]
    Empty,
}

/// Fixed color table indexed cyclically from a rotation offset.
///
/// Deserializes from a list of `[r, g, b]` triples; the rotation always
/// starts at 0.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<[u8; 3]>")]
pub struct PaletteMap {
    colors: Vec<RGB8>,
    rotation: i64,
}

impl TryFrom<Vec<[u8; 3]>> for PaletteMap {
    type Error = PaletteError;

    fn try_from(triples: Vec<[u8; 3]>) -> Result<Self, Self::Error> {
        Self::new(triples.into_iter().map(|[r, g, b]| RGB8::new(r, g, b)).collect())
    }
}

impl PaletteMap {
    /// Create a palette from a non-empty list of colors.
    ///
    /// # Errors
    /// Returns [`PaletteError::Empty`] if `colors` is empty.
    pub fn new(colors: Vec<RGB8>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        Ok(Self {
            colors,
            rotation: 0,
        })
    }

    /// Number of colors in the table. Never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn colors(&self) -> &[RGB8] {
        &self.colors
    }

    /// Current rotation offset, exactly as last set.
    #[must_use]
    pub fn rotation(&self) -> i64 {
        self.rotation
    }

    /// Set the rotation offset. Any value is accepted; it is reduced modulo
    /// the palette length at lookup time.
    pub fn set_rotation(&mut self, rotation: i64) {
        self.rotation = rotation;
    }

    /// Palette index used for `key` under the current rotation.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn index_for(&self, key: usize) -> usize {
        // len fits in i64 on every supported target; both operands are reduced
        // below len before adding, so the sum cannot overflow.
        let len = self.colors.len() as i64;
        let offset = self.rotation.rem_euclid(len);
        let key = (key % self.colors.len()) as i64;
        ((offset + key) % len) as usize
    }

    /// Unscaled palette color for `key`.
    #[must_use]
    pub fn base_color(&self, key: usize) -> RGB8 {
        self.colors[self.index_for(key)]
    }

    /// Color for `key` at `intensity`.
    ///
    /// Each channel is `round(intensity * channel)` with ties rounded to even,
    /// then clamped to `[0, 255]`. `intensity` is expected in `[0.0, 1.0]`
    /// but is not clamped here.
    #[must_use]
    pub fn color_for(&self, key: usize, intensity: f64) -> RGB8 {
        let base = self.base_color(key);
        RGB8::new(
            scale_channel(base.r, intensity),
            scale_channel(base.g, intensity),
            scale_channel(base.b, intensity),
        )
    }
}

#[inline]
fn scale_channel(value: u8, intensity: f64) -> u8 {
    // Clamped to [0, 255] first, so the cast cannot truncate. NaN casts to 0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = (intensity * f64::from(value)).round_ties_even().clamp(0.0, 255.0) as u8;
    scaled
}
