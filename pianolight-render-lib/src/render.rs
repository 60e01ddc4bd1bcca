//! Frame rendering from dense or sparse key intensities.

use std::ops::Range;

use derive_more::{Display, Error};

use crate::input::{level_to_intensity, KeyUpdate};
use crate::layout::{Frame, StripLayout};
use crate::palette::PaletteMap;

/// Errors rejecting a render request. The retained frame is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RenderError {
    #[display("expected {expected} key intensities, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[display("key {key} out of range (0..{keys})")]
    KeyOutOfRange { key: usize, keys: usize },
}

/// Last intensity seen for every key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyState {
    intensities: Vec<f64>,
}

impl KeyState {
    #[must_use]
    pub fn new(keys: usize) -> Self {
        Self {
            intensities: vec![0.0; keys],
        }
    }

    #[must_use]
    pub fn get(&self, key: usize) -> Option<f64> {
        self.intensities.get(key).copied()
    }

    #[must_use]
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Number of keys with a non-zero intensity.
    #[must_use]
    pub fn active(&self) -> usize {
        self.intensities.iter().filter(|&&i| i > 0.0).count()
    }

    fn reset(&mut self) {
        self.intensities.fill(0.0);
    }
}

/// Owns the palette, the per-key state and the retained frame, and keeps the
/// frame consistent with both.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    palette: PaletteMap,
    keys: KeyState,
    frame: Frame,
}

impl FrameRenderer {
    #[must_use]
    pub fn new(layout: StripLayout, palette: PaletteMap) -> Self {
        Self {
            palette,
            keys: KeyState::new(layout.keys),
            frame: Frame::new(layout),
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    #[must_use]
    pub fn layout(&self) -> StripLayout {
        self.frame.layout()
    }

    #[must_use]
    pub fn key_state(&self) -> &KeyState {
        &self.keys
    }

    #[must_use]
    pub fn palette(&self) -> &PaletteMap {
        &self.palette
    }

    /// Mutable palette access, e.g. to change the rotation. Call
    /// [`rerender`](Self::rerender) afterwards to repaint the frame.
    pub fn palette_mut(&mut self) -> &mut PaletteMap {
        &mut self.palette
    }

    /// Recompute every key from a full intensity vector.
    ///
    /// # Errors
    /// [`RenderError::LengthMismatch`] if `intensities.len()` differs from the
    /// key count.
    pub fn render_dense(&mut self, intensities: &[f64]) -> Result<(), RenderError> {
        let expected = self.layout().keys;
        if intensities.len() != expected {
            return Err(RenderError::LengthMismatch {
                expected,
                actual: intensities.len(),
            });
        }
        self.keys.intensities.copy_from_slice(intensities);
        self.rerender();
        Ok(())
    }

    /// [`render_dense`](Self::render_dense) from byte levels (0-255).
    ///
    /// # Errors
    /// Same as [`render_dense`](Self::render_dense).
    pub fn render_levels(&mut self, levels: &[u8]) -> Result<(), RenderError> {
        let intensities: Vec<f64> = levels.iter().copied().map(level_to_intensity).collect();
        self.render_dense(&intensities)
    }

    /// Update a single key and return the LED range that changed.
    ///
    /// # Errors
    /// [`RenderError::KeyOutOfRange`] if `key` is not a valid key index.
    pub fn render_sparse(&mut self, key: usize, intensity: f64) -> Result<Range<usize>, RenderError> {
        let keys = self.layout().keys;
        let Some(slot) = self.keys.intensities.get_mut(key) else {
            return Err(RenderError::KeyOutOfRange { key, keys });
        };
        *slot = intensity;
        let color = self.palette.color_for(key, intensity);
        self.frame
            .fill_key(key, color)
            .ok_or(RenderError::KeyOutOfRange { key, keys })
    }

    /// Apply a decoded MIDI key update.
    ///
    /// # Errors
    /// Same as [`render_sparse`](Self::render_sparse).
    pub fn apply(&mut self, update: KeyUpdate) -> Result<Range<usize>, RenderError> {
        self.render_sparse(update.key, update.intensity)
    }

    /// Repaint every key from the retained key state.
    pub fn rerender(&mut self) {
        for (key, &intensity) in self.keys.intensities.iter().enumerate() {
            let color = self.palette.color_for(key, intensity);
            self.frame.fill_key(key, color);
        }
    }

    /// Set every key to 0 and every LED (offset LEDs included) to black.
    pub fn blank(&mut self) {
        self.keys.reset();
        self.frame.clear();
    }
}
